//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep callers decoupled from storage details.

pub mod instance_service;
pub mod reminders;
pub mod report_service;
pub mod routine_service;
pub mod settings_service;
