//! Process-scoped fallback secret storage
//!
//! Used only when no OS credential store is reachable. Entries live in an
//! in-memory map, sealed under a key derived from a salted machine
//! identifier, process start time and pid, and a random per-instance salt.
//! The identity-derived inputs are low entropy compared to an OS keychain;
//! the warning at construction is the operator's cue, and nothing stored
//! here survives a process restart.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use log::warn;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::keychain::Keychain;
use crate::secure_memory::SecretKey32;

const FALLBACK_KDF_DOMAIN: &[u8] = b"vortex-fallback-keychain-v1";

/// Stable-ish identifier for this machine.
///
/// Prefers the systemd machine id, then the D-Bus one, then hostname and
/// user names from the environment. Never empty; the weakest case is a
/// fixed literal shared by machines with no identity sources at all.
pub(crate) fn machine_identifier() -> String {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(id) = std::fs::read_to_string(path) {
            let id = id.trim();
            if !id.is_empty() {
                return id.to_string();
            }
        }
    }

    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown-host".to_string());
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown-user".to_string());
    format!("{}:{}", host, user)
}

/// In-process encrypted map standing in for an OS keychain.
pub struct FallbackKeychain {
    sealing_key: SecretKey32,
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl FallbackKeychain {
    pub fn new() -> Self {
        warn!(
            "fallback keychain active: secrets are process-scoped and sealed \
             with machine-derived key material only"
        );

        let start_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let mut instance_salt = [0u8; 16];
        OsRng.fill_bytes(&mut instance_salt);

        let mut hasher = blake3::Hasher::new();
        hasher.update(FALLBACK_KDF_DOMAIN);
        hasher.update(machine_identifier().as_bytes());
        hasher.update(&start_nanos.to_le_bytes());
        hasher.update(&std::process::id().to_le_bytes());
        hasher.update(&instance_salt);

        Self {
            sealing_key: SecretKey32::new(*hasher.finalize().as_bytes()),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(self.sealing_key.as_bytes().into())
    }

    fn seal(&self, key: &str, value: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);
        // Entry name as AAD ties each sealed value to its key.
        let ciphertext = self
            .cipher()
            .encrypt(
                &Nonce::from(nonce),
                Payload {
                    msg: value,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Keychain("fallback sealing failed".into()))?;

        let mut sealed = Vec::with_capacity(12 + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn unseal(&self, key: &str, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        if sealed.len() < 12 {
            return Err(CryptoError::Keychain("corrupt fallback entry".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(12);
        let nonce: [u8; 12] = nonce
            .try_into()
            .map_err(|_| CryptoError::Keychain("corrupt fallback entry".into()))?;
        self.cipher()
            .decrypt(
                &Nonce::from(nonce),
                Payload {
                    msg: ciphertext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Keychain("corrupt fallback entry".into()))
    }

    pub(super) fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FallbackKeychain {
    fn default() -> Self {
        Self::new()
    }
}

impl Keychain for FallbackKeychain {
    fn store(&self, key: &str, value: &[u8]) -> CryptoResult<()> {
        let sealed = self.seal(key, value)?;
        self.lock_entries().insert(key.to_string(), sealed);
        Ok(())
    }

    fn retrieve(&self, key: &str) -> CryptoResult<Option<Vec<u8>>> {
        let sealed = match self.lock_entries().get(key) {
            Some(sealed) => sealed.clone(),
            None => return Ok(None),
        };
        self.unseal(key, &sealed).map(Some)
    }

    fn delete(&self, key: &str) -> CryptoResult<()> {
        self.lock_entries().remove(key);
        Ok(())
    }

    fn is_available(&self) -> bool {
        // Memory-backed, always usable.
        true
    }
}
