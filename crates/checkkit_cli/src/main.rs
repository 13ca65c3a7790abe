//! CLI smoke entry point for the CheckKit core.
//!
//! # Responsibility
//! - Exercise the core facade outside any UI shell.
//! - Keep output deterministic for quick local sanity checks.

use checkkit_core::{
    backup_file_name, init_from_config, model::parse_date, CheckKit, CoreConfig, CoreError,
};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use log::warn;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "checkkit_cli")]
#[command(about = "Local habit and routine tracker core", version)]
struct Cli {
    /// Path to configuration file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Materialize and list the instances of a day
    Today {
        /// Day as YYYY-MM-DD (defaults to the local date)
        #[arg(value_parser = parse_day)]
        date: Option<NaiveDate>,
    },
    /// Write an encrypted backup of the whole store
    Export {
        /// Output file (defaults to checkkit-backup-YYYY-MM-DD.checkkit)
        file: Option<PathBuf>,
    },
    /// Replace the whole store with a backup file
    Import { file: PathBuf },
    /// Delete all routines and instances
    Clear,
    /// Print the core version
    Version,
}

fn parse_day(value: &str) -> Result<NaiveDate, String> {
    parse_date(value).map_err(|err| err.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CoreError> {
    match cli.command {
        Command::Today { date } => {
            let kit = open_store(cli.config)?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let routines = kit.list_routines(true)?;
            for instance in kit.today_instances(date)? {
                let name = routines
                    .iter()
                    .find(|routine| routine.id == instance.routine_id)
                    .map_or("?", |routine| routine.name.as_str());
                let mark = if instance.completed { "x" } else { " " };
                println!("[{mark}] {} {name}", instance.id);
            }
        }
        Command::Export { file } => {
            let kit = open_store(cli.config)?;
            let exported = kit.export_backup()?;
            let path = file.unwrap_or_else(|| {
                PathBuf::from(backup_file_name(Local::now().date_naive()))
            });
            write_file(&path, &exported.blob)?;
            println!("exported to {}", path.display());
        }
        Command::Import { file } => {
            let kit = open_store(cli.config)?;
            let blob = std::fs::read_to_string(&file).map_err(|source| CoreError::Io {
                path: file.clone(),
                source,
            })?;
            let summary = kit.import_backup(&blob)?;
            println!(
                "imported routines={} instances={}",
                summary.routines, summary.instances
            );
        }
        Command::Clear => {
            open_store(cli.config)?.clear_all_data()?;
            warn!("event=clear_all_data module=cli status=ok");
            println!("cleared");
        }
        Command::Version => {
            println!("checkkit_core version={}", checkkit_core::core_version());
        }
    }
    Ok(())
}

fn open_store(config_path: Option<PathBuf>) -> Result<CheckKit, CoreError> {
    let config = match config_path.or_else(CoreConfig::default_path) {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    if let Err(err) = init_from_config(&config) {
        // Logging is best effort for a smoke tool.
        eprintln!("warning: {err}");
    }
    CheckKit::open(&config)
}

fn write_file(path: &Path, content: &str) -> Result<(), CoreError> {
    std::fs::write(path, content).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
