/*!
 * Error types for the Vortex cryptography core
 *
 * The error set is closed: every failure mode in the crate maps onto one of
 * these kinds. Messages carried across the external boundary must never
 * contain key bytes, plaintext, or internal state; `public_message` is the
 * sanctioned reduction for anything leaving the process.
 */

use thiserror::Error;

/// All error kinds produced by the cryptography core.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("key exchange failed: {0}")]
    KeyExchange(String),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not supported on this platform")]
    NotSupported,

    #[error("keypair handle {0} not found")]
    KeypairNotFound(u64),

    #[error("keychain operation failed: {0}")]
    Keychain(String),

    #[error("key rotation required before this operation")]
    KeyRotationRequired,

    #[error("associated data mismatch")]
    AadMismatch,

    #[error("unsupported token version: 0x{0:02x}")]
    UnsupportedTokenVersion(u8),
}

impl CryptoError {
    /// Generic, non-identifying message suitable for the untrusted boundary.
    ///
    /// The `Display` form may mention operation names for local diagnostics;
    /// this form deliberately does not, so a frontend error popup can never
    /// leak which key, token, or byte offset was involved.
    pub fn public_message(&self) -> &'static str {
        match self {
            CryptoError::Encrypt => "encryption failed",
            CryptoError::Decrypt(_) => "decryption failed",
            CryptoError::KeyExchange(_) => "key exchange failed",
            CryptoError::SignatureInvalid => "signature verification failed",
            CryptoError::KeyDerivation => "key derivation failed",
            CryptoError::KeyGeneration(_) => "key generation failed",
            CryptoError::InvalidInput(_) => "invalid input",
            CryptoError::NotSupported => "operation not supported",
            CryptoError::KeypairNotFound(_) => "keypair not found",
            CryptoError::Keychain(_) => "secure storage unavailable",
            CryptoError::KeyRotationRequired => "key rotation required",
            CryptoError::AadMismatch => "decryption failed",
            CryptoError::UnsupportedTokenVersion(_) => "unsupported token version",
        }
    }
}

// Serialized errors cross the IPC boundary to the frontend, so only the
// sanitized message is emitted.
impl serde::Serialize for CryptoError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.public_message())
    }
}

/// Result type alias for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
