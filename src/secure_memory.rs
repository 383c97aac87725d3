//! Secure Memory Handling Utilities
//!
//! Zeroizing containers for raw secret material. Every secret byte buffer in
//! this crate lives in one of these types, which overwrite their contents
//! with zeros when dropped, on every exit path.
//!
//! Neither container implements `Clone`. Duplicating secret material is an
//! auditable event, so the only way to copy one is the explicitly named
//! `clone_secret`, making every duplication site visible in review.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A variable-length secret byte buffer, zeroized on drop.
///
/// # Example
///
/// ```
/// use vortex_crypto::secure_memory::SecretBytes;
///
/// let secret = SecretBytes::new(vec![0x01, 0x02, 0x03]);
/// assert_eq!(secret.len(), 3);
/// // zeroized when `secret` goes out of scope
/// ```
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes {
    bytes: Vec<u8>,
}

impl SecretBytes {
    /// Take ownership of `bytes` as secret material.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Read-only view of the secret, without copying.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the secret in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Explicit, auditable duplication of the secret material.
    ///
    /// This is the only way to copy a `SecretBytes`; there is deliberately no
    /// `Clone` impl. The copy zeroizes independently of the original.
    pub fn clone_secret(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
        }
    }
}

impl std::fmt::Debug for SecretBytes {
    // Never print the contents, only the length.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes({} bytes)", self.bytes.len())
    }
}

/// A fixed 32-byte secret, zeroized on drop.
///
/// Used for the classical key halves (X25519 static secrets, Ed25519 signing
/// keys) whose size is known at compile time.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey32 {
    bytes: [u8; 32],
}

impl SecretKey32 {
    /// Take ownership of a 32-byte secret.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Read-only view of the key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Explicit, auditable duplication. See [`SecretBytes::clone_secret`].
    pub fn clone_secret(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl std::fmt::Debug for SecretKey32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey32(32 bytes)")
    }
}

/// Run a closure over sensitive data and zeroize it afterwards.
///
/// The data is zeroized when the closure completes, returns early, or
/// panics.
///
/// # Example
///
/// ```
/// use vortex_crypto::secure_memory::with_secure_scope;
///
/// let mut key = [0x42u8; 32];
/// with_secure_scope(&mut key, |k| {
///     // use k for a derivation
///     assert_eq!(k[0], 0x42);
/// });
/// assert_eq!(key, [0u8; 32]);
/// ```
pub fn with_secure_scope<T, F, R>(data: &mut T, f: F) -> R
where
    T: Zeroize,
    F: FnOnce(&mut T) -> R,
{
    struct ScopeGuard<'a, T: Zeroize> {
        data: &'a mut T,
    }

    impl<T: Zeroize> Drop for ScopeGuard<'_, T> {
        fn drop(&mut self) {
            self.data.zeroize();
        }
    }

    let guard = ScopeGuard { data };
    f(guard.data)
}
