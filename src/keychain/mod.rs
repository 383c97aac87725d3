//! OS keychain access with in-process fallback
//!
//! Secrets that must outlive a keypair handle (the token master secret) are
//! stored through a [`Keychain`] backend. The OS-backed implementation
//! covers the macOS Keychain, the Windows Credential Manager, and the Linux
//! Secret Service through one credential API. When no OS store is
//! reachable, a process-scoped [`FallbackKeychain`] keeps tokens usable at
//! a documented loss of strength.
//!
//! All entries are namespaced under [`SERVICE_ID`].

mod fallback;
mod os;


pub use fallback::FallbackKeychain;
pub use os::OsKeychain;

pub(crate) use fallback::machine_identifier;

use std::sync::{Arc, OnceLock};

use log::{info, warn};

use crate::error::CryptoResult;

/// Service identifier namespacing every keychain entry this crate creates.
pub const SERVICE_ID: &str = "com.vortex.image.crypto";

/// Capability contract for secret storage backends.
pub trait Keychain: Send + Sync {
    /// Store `value` under `key`, overwriting any previous value.
    fn store(&self, key: &str, value: &[u8]) -> CryptoResult<()>;

    /// Fetch the value under `key`; `Ok(None)` when no entry exists.
    fn retrieve(&self, key: &str) -> CryptoResult<Option<Vec<u8>>>;

    /// Remove the entry under `key`. Removing a missing entry is not an
    /// error.
    fn delete(&self, key: &str) -> CryptoResult<()>;

    /// Cheap, non-destructive probe for whether this backend works here.
    fn is_available(&self) -> bool;
}

/// Selected keychain backend for this process.
///
/// The OS backend is probed once; if the probe fails, every service in the
/// process shares the same [`FallbackKeychain`] so fallback-stored secrets
/// stay readable across services.
pub struct KeychainService {
    backend: Arc<dyn Keychain>,
}

impl KeychainService {
    /// Select a backend by the probe-once policy.
    pub fn new() -> Self {
        Self {
            backend: Arc::clone(selected_backend()),
        }
    }

    /// Build a service over an explicit backend.
    pub fn with_backend(backend: Arc<dyn Keychain>) -> Self {
        Self { backend }
    }

    pub fn store(&self, key: &str, value: &[u8]) -> CryptoResult<()> {
        self.backend.store(key, value)
    }

    pub fn retrieve(&self, key: &str) -> CryptoResult<Option<Vec<u8>>> {
        self.backend.retrieve(key)
    }

    pub fn delete(&self, key: &str) -> CryptoResult<()> {
        self.backend.delete(key)
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }
}

impl Default for KeychainService {
    fn default() -> Self {
        Self::new()
    }
}

fn selected_backend() -> &'static Arc<dyn Keychain> {
    static BACKEND: OnceLock<Arc<dyn Keychain>> = OnceLock::new();
    BACKEND.get_or_init(|| {
        let os = OsKeychain::new();
        if os.is_available() {
            info!("using OS keychain backend under service {}", SERVICE_ID);
            Arc::new(os)
        } else {
            warn!(
                "no OS keychain available; falling back to process-scoped storage, \
                 which is materially weaker and does not survive a restart"
            );
            Arc::new(FallbackKeychain::new())
        }
    })
}
