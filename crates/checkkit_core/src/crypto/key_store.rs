//! Device key generation and persistence.
//!
//! # Invariants
//! - At most one key is ever produced per key file: creation goes through
//!   a no-clobber rename, and the losing writer adopts the winner's key.
//! - Key bytes are zeroized on drop and never logged.

use super::{CryptoError, CryptoResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::info;
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt::{Debug, Formatter};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Device key length (32 bytes).
pub const DEVICE_KEY_LEN: usize = 32;

/// Symmetric device key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DeviceKey([u8; DEVICE_KEY_LEN]);

impl DeviceKey {
    /// Generates a key from the OS cryptographically secure RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; DEVICE_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; DEVICE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DEVICE_KEY_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(value: &str) -> CryptoResult<Self> {
        let mut decoded = STANDARD
            .decode(value.trim())
            .map_err(|err| CryptoError::InvalidKeyMaterial(format!("not base64: {err}")))?;
        if decoded.len() != DEVICE_KEY_LEN {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "expected {DEVICE_KEY_LEN} bytes, got {len}"
            )));
        }
        let mut bytes = [0u8; DEVICE_KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }
}

impl Debug for DeviceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeviceKey(<redacted>)")
    }
}

/// Source of the per-device key.
pub trait KeyStore {
    /// Returns the stored key, generating and persisting one on first use.
    fn load_or_create(&self) -> CryptoResult<DeviceKey>;
}

/// Key persisted as base64 text in a file next to (not inside) the database.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CryptoError {
        CryptoError::KeyStore {
            path: self.path.clone(),
            source,
        }
    }

    fn read_existing(&self) -> CryptoResult<Option<DeviceKey>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => DeviceKey::from_base64(&text).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

impl KeyStore for FileKeyStore {
    fn load_or_create(&self) -> CryptoResult<DeviceKey> {
        if let Some(key) = self.read_existing()? {
            return Ok(key);
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|err| self.io_error(err))?;

        let key = DeviceKey::generate();
        let mut staged = tempfile::NamedTempFile::new_in(&dir).map_err(|err| self.io_error(err))?;
        staged
            .write_all(key.to_base64().as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|err| self.io_error(err))?;

        match staged.persist_noclobber(&self.path) {
            Ok(_) => {
                info!("event=device_key_create module=crypto status=ok");
                Ok(key)
            }
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                // Another caller won the race; its key is the device key.
                self.read_existing()?.ok_or_else(|| {
                    CryptoError::InvalidKeyMaterial("key file vanished after creation".into())
                })
            }
            Err(err) => Err(self.io_error(err.error)),
        }
    }
}

/// Process-local key store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    key: OnceCell<DeviceKey>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a known key.
    pub fn with_key(key: DeviceKey) -> Self {
        Self {
            key: OnceCell::with_value(key),
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn load_or_create(&self) -> CryptoResult<DeviceKey> {
        Ok(self.key.get_or_init(DeviceKey::generate).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceKey, FileKeyStore, KeyStore, MemoryKeyStore};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn file_store_generates_once_and_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("device.key");
        let store = FileKeyStore::new(&path);

        let first = store.load_or_create().unwrap();
        assert!(path.exists());
        let second = FileKeyStore::new(&path).load_or_create().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn concurrent_first_use_yields_one_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("device.key"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = Arc::clone(&path);
                thread::spawn(move || FileKeyStore::new(path.as_path()).load_or_create().unwrap())
            })
            .collect();
        let keys: Vec<DeviceKey> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let stored = FileKeyStore::new(path.as_path()).load_or_create().unwrap();
        assert!(keys.iter().all(|key| *key == stored));
    }

    #[test]
    fn corrupted_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.key");
        std::fs::write(&path, "c2hvcnQ=").unwrap();

        let err = FileKeyStore::new(&path).load_or_create().unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes"));
    }

    #[test]
    fn base64_roundtrip_and_redacted_debug() {
        let key = DeviceKey::generate();
        let decoded = DeviceKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key, decoded);
        assert_eq!(format!("{key:?}"), "DeviceKey(<redacted>)");
    }

    #[test]
    fn memory_store_is_stable() {
        let store = MemoryKeyStore::new();
        assert_eq!(store.load_or_create().unwrap(), store.load_or_create().unwrap());
    }
}
