//! In-process credential sealing.
//!
//! The configured password never sits in memory as plaintext between
//! connects. [`CredentialCache::update`] seals it with AES-256-GCM under a
//! random per-cache key and wipes the caller's buffer; [`reveal`] unseals it
//! for the duration of a connect attempt, handing back a buffer that wipes
//! itself on drop.
//!
//! [`reveal`]: CredentialCache::reveal

use crate::error::{Error, Result};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use parking_lot::RwLock;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// Size of the AES-256 key in bytes.
const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
const TAG_SIZE: usize = 16;

/// Process-wide cache holding the configured password sealed at rest.
///
/// Connection attempts read under a shared lock; the administrative update
/// path re-seals under the exclusive lock and publishes before releasing.
pub struct CredentialCache {
    key: Zeroizing<[u8; KEY_SIZE]>,
    sealed: RwLock<Option<Vec<u8>>>,
}

impl CredentialCache {
    /// Creates a cache with a fresh random sealing key and no credential.
    #[must_use]
    pub fn new() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        rand::thread_rng().fill_bytes(key.as_mut());
        Self {
            key,
            sealed: RwLock::new(None),
        }
    }

    /// Seals `plaintext` as the cached credential and wipes the caller's
    /// buffer.
    ///
    /// # Errors
    ///
    /// `Internal` when sealing fails; the previous credential is kept.
    pub fn update(&self, plaintext: &mut String) -> Result<()> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(self.key.as_ref()));

        // Random nonce, prepended to the ciphertext.
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| Error::internal("credential sealing failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);

        *self.sealed.write() = Some(sealed);
        plaintext.zeroize();
        Ok(())
    }

    /// Unseals the cached credential. A cache that was never updated reveals
    /// the empty password.
    ///
    /// # Errors
    ///
    /// `Internal` when the sealed bytes fail authentication or do not decode
    /// as text.
    pub fn reveal(&self) -> Result<Zeroizing<String>> {
        let guard = self.sealed.read();
        let Some(sealed) = guard.as_ref() else {
            return Ok(Zeroizing::new(String::new()));
        };
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::internal("sealed credential is truncated"));
        }

        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        let cipher = Aes256Gcm::new(GenericArray::from_slice(self.key.as_ref()));
        let plaintext = cipher
            .decrypt(nonce, &sealed[NONCE_SIZE..])
            .map_err(|_| Error::internal("credential unsealing failed"))?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| Error::internal("sealed credential is not valid text"))
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("key", &"[REDACTED]")
            .field("sealed", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_wipes_and_reveal_round_trips() {
        let cache = CredentialCache::new();
        let mut password = String::from("hunter2");
        cache.update(&mut password).unwrap();

        assert!(password.is_empty());
        assert_eq!(cache.reveal().unwrap().as_str(), "hunter2");
    }

    #[test]
    fn fresh_cache_reveals_empty_password() {
        let cache = CredentialCache::new();
        assert_eq!(cache.reveal().unwrap().as_str(), "");
    }

    #[test]
    fn update_replaces_previous_credential() {
        let cache = CredentialCache::new();
        let mut first = String::from("first");
        cache.update(&mut first).unwrap();
        let mut second = String::from("second");
        cache.update(&mut second).unwrap();

        assert_eq!(cache.reveal().unwrap().as_str(), "second");
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let cache = CredentialCache::new();
        let mut password = String::from("hunter2");
        cache.update(&mut password).unwrap();

        {
            let mut sealed = cache.sealed.write();
            let bytes = sealed.as_mut().unwrap();
            let last = bytes.len() - 1;
            bytes[last] ^= 0x01;
        }

        assert!(cache.reveal().is_err());
    }

    #[test]
    fn debug_output_redacts_key_material() {
        let cache = CredentialCache::new();
        let rendered = format!("{cache:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("hunter2"));
    }
}
