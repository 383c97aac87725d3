/*!
 * Vortex Cryptography Core
 *
 * Hybrid classical/post-quantum cryptography for the Vortex image
 * application: keypair lifecycle behind opaque handles, hybrid encryption
 * and signatures, versioned token encryption over OS keychain material,
 * and key rotation with backward-compatible decryption.
 *
 * The algorithm pairings are:
 *
 * - ML-KEM-1024 + X25519 for key encapsulation
 * - Dilithium3 + Ed25519 for digital signatures
 * - ChaCha20-Poly1305 for all symmetric encryption
 *
 * Secret material lives in zeroizing containers and never crosses the
 * external boundary; frontends only ever see handles and public bundles.
 */

/// Boundary service consumed by the command layer
pub mod api;

/// Common error types for the cryptography core
pub mod error;

/// Hybrid encryption, signatures, and keypair serialization
pub mod hybrid;

/// Handle-based keypair storage and rotation
pub mod key_management;

/// OS keychain access with in-process fallback
pub mod keychain;

/// Secure memory handling utilities
pub mod secure_memory;

/// Versioned token encryption with legacy migration
pub mod token;

// Re-export main types for convenience
pub use api::{CryptoService, KeypairInfo};
pub use error::{CryptoError, CryptoResult};
pub use hybrid::{EncryptedPayload, HybridKeypair, PublicBundle, SafeSigner};
pub use key_management::{KeyRotator, KeypairStore, RotationPolicy};
pub use keychain::{KeychainService, SERVICE_ID};
pub use secure_memory::SecretBytes;
pub use token::{decrypt_token, encrypt_token, TokenContext, TokenEncryptor};

/// Common imports for working with the cryptography core
pub mod prelude {
    pub use crate::api::{CryptoService, KeypairInfo};
    pub use crate::error::{CryptoError, CryptoResult};
    pub use crate::hybrid::{
        decrypt, decrypt_with_aad, encrypt, encrypt_with_aad, EncryptedPayload, HybridKeypair,
        PublicBundle, SafeSigner,
    };
    pub use crate::key_management::{KeyRotator, KeypairStore, RotationOutcome, RotationPolicy};
    pub use crate::keychain::{FallbackKeychain, Keychain, KeychainService, OsKeychain, SERVICE_ID};
    pub use crate::secure_memory::{with_secure_scope, SecretBytes, SecretKey32};
    pub use crate::token::{
        decrypt_token, encrypt_token, encrypt_token_v4, TokenContext, TokenEncryptor,
        TOKEN_VERSION_V2, TOKEN_VERSION_V3, TOKEN_VERSION_V4,
    };
}
