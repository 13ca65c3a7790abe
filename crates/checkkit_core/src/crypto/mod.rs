//! Device-bound symmetric encryption.
//!
//! # Algorithms
//!
//! - **Key**: 256-bit random device key from the OS CSPRNG, generated once
//!   per installation and stored outside the database.
//! - **Encryption**: ChaCha20-Poly1305 (authenticated), fresh 96-bit nonce
//!   per message.
//!
//! # Blob format
//!
//! `base64( version:u8 || nonce[12] || ciphertext || tag[16] )`

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod cipher;
mod key_store;

pub use cipher::EncryptionService;
pub use key_store::{DeviceKey, FileKeyStore, KeyStore, MemoryKeyStore, DEVICE_KEY_LEN};

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug)]
pub enum CryptoError {
    /// Key file could not be read or written.
    KeyStore {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Stored key material is not a valid device key.
    InvalidKeyMaterial(String),
    /// Wrong key, tampered data, or a blob that is not ours.
    CannotDecrypt,
    Encrypt(String),
}

impl Display for CryptoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyStore { path, source } => {
                write!(f, "device key store `{}` failed: {source}", path.display())
            }
            Self::InvalidKeyMaterial(message) => write!(f, "invalid device key: {message}"),
            Self::CannotDecrypt => write!(f, "cannot decrypt: wrong key or corrupted data"),
            Self::Encrypt(message) => write!(f, "encryption failed: {message}"),
        }
    }
}

impl Error for CryptoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::KeyStore { source, .. } => Some(source),
            _ => None,
        }
    }
}
