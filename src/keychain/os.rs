//! Native credential store backend
//!
//! One implementation covers macOS (Keychain), Windows (Credential
//! Manager), and Linux (Secret Service) via the platform credential API.
//! Calls are bounded-latency local IPC; a failure surfaces immediately and
//! triggers the fallback policy, never a retry loop.

use keyring::Entry;
use log::debug;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::keychain::{Keychain, SERVICE_ID};

pub struct OsKeychain;

impl OsKeychain {
    pub fn new() -> Self {
        Self
    }

    fn entry(&self, key: &str) -> CryptoResult<Entry> {
        Entry::new(SERVICE_ID, key).map_err(|e| CryptoError::Keychain(e.to_string()))
    }
}

impl Default for OsKeychain {
    fn default() -> Self {
        Self::new()
    }
}

impl Keychain for OsKeychain {
    fn store(&self, key: &str, value: &[u8]) -> CryptoResult<()> {
        self.entry(key)?
            .set_secret(value)
            .map_err(|e| CryptoError::Keychain(e.to_string()))
    }

    fn retrieve(&self, key: &str) -> CryptoResult<Option<Vec<u8>>> {
        match self.entry(key)?.get_secret() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CryptoError::Keychain(e.to_string())),
        }
    }

    fn delete(&self, key: &str) -> CryptoResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CryptoError::Keychain(e.to_string())),
        }
    }

    fn is_available(&self) -> bool {
        // Full write/read/delete cycle on a probe entry; reachability of the
        // credential daemon alone is not enough.
        let mut probe = [0u8; 16];
        OsRng.fill_bytes(&mut probe);
        let key = "vortex-availability-probe";

        let ok = self.store(key, &probe).is_ok()
            && matches!(self.retrieve(key), Ok(Some(read)) if read == probe)
            && self.delete(key).is_ok();
        if !ok {
            debug!("OS keychain probe failed");
        }
        ok
    }
}
