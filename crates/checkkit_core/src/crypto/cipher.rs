//! ChaCha20-Poly1305 encryption service bound to the device key.
//!
//! # Invariants
//! - The key is resolved once per service; concurrent first callers block
//!   on the same initialization instead of generating competing keys.
//! - Decryption never returns unauthenticated bytes: any failure surfaces
//!   as `CryptoError::CannotDecrypt`.

use super::key_store::{DeviceKey, KeyStore};
use super::{CryptoError, CryptoResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;

/// Blob layout version byte.
const BLOB_VERSION: u8 = 1;

/// Nonce length for ChaCha20-Poly1305 (12 bytes).
pub const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 auth tag length (16 bytes).
pub const AUTH_TAG_LEN: usize = 16;

/// Symmetric encrypt/decrypt over the device key.
pub struct EncryptionService<K: KeyStore> {
    store: K,
    key: OnceCell<DeviceKey>,
}

impl<K: KeyStore> EncryptionService<K> {
    pub fn new(store: K) -> Self {
        Self {
            store,
            key: OnceCell::new(),
        }
    }

    fn key(&self) -> CryptoResult<&DeviceKey> {
        self.key.get_or_try_init(|| self.store.load_or_create())
    }

    /// Base64 form of the device key, mirrored into settings.
    pub fn key_mirror(&self) -> CryptoResult<String> {
        Ok(self.key()?.to_base64())
    }

    /// Encrypts `plaintext` into a base64 text blob.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<String> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(self.key()?.as_bytes()));

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|err| CryptoError::Encrypt(err.to_string()))?;

        let mut blob = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Decrypts a blob produced by [`EncryptionService::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::CannotDecrypt` when the blob is not valid
    /// base64, has an unknown layout, was encrypted under another key, or
    /// was tampered with.
    pub fn decrypt(&self, blob: &str) -> CryptoResult<Vec<u8>> {
        let bytes = STANDARD
            .decode(blob.trim())
            .map_err(|_| CryptoError::CannotDecrypt)?;
        if bytes.len() < 1 + NONCE_LEN + AUTH_TAG_LEN || bytes[0] != BLOB_VERSION {
            return Err(CryptoError::CannotDecrypt);
        }
        let (nonce, ciphertext) = bytes[1..].split_at(NONCE_LEN);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(self.key()?.as_bytes()));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::CannotDecrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::EncryptionService;
    use crate::crypto::{CryptoError, DeviceKey, MemoryKeyStore};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn service() -> EncryptionService<MemoryKeyStore> {
        EncryptionService::new(MemoryKeyStore::new())
    }

    #[test]
    fn encrypt_then_decrypt_returns_plaintext() {
        let svc = service();
        let blob = svc.encrypt(b"stretch at 07:00").unwrap();
        assert_eq!(svc.decrypt(&blob).unwrap(), b"stretch at 07:00");
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let svc = service();
        assert_ne!(svc.encrypt(b"x").unwrap(), svc.encrypt(b"x").unwrap());
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let blob = service().encrypt(b"secret").unwrap();
        let other = EncryptionService::new(MemoryKeyStore::with_key(DeviceKey::generate()));
        assert!(matches!(other.decrypt(&blob), Err(CryptoError::CannotDecrypt)));
    }

    #[test]
    fn tampered_or_garbage_blobs_cannot_decrypt() {
        let svc = service();
        let blob = svc.encrypt(b"secret").unwrap();
        let mut bytes = STANDARD.decode(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = STANDARD.encode(bytes);

        for input in [tampered.as_str(), "not base64 at all!", "", "AQID"] {
            assert!(
                matches!(svc.decrypt(input), Err(CryptoError::CannotDecrypt)),
                "{input}"
            );
        }
    }

    #[test]
    fn key_mirror_matches_store_key() {
        let key = DeviceKey::generate();
        let expected = key.to_base64();
        let svc = EncryptionService::new(MemoryKeyStore::with_key(key));
        assert_eq!(svc.key_mirror().unwrap(), expected);
    }
}
