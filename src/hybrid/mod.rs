//! Hybrid Classical/Post-Quantum Cryptography
//!
//! This module combines post-quantum and classical algorithms so that data
//! stays protected even if one family is broken:
//!
//! - ML-KEM-1024 + X25519 for key encapsulation
//! - Dilithium3 + Ed25519 for signatures
//! - ChaCha20-Poly1305 for the symmetric layer
//!
//! Secret key halves live in zeroizing containers from
//! [`crate::secure_memory`] and are never duplicated implicitly.

mod encrypt;
mod keypair;
mod password;
mod sign;


pub use encrypt::{decrypt, decrypt_with_aad, encrypt, encrypt_with_aad};
pub use keypair::{EncapsulatedKey, EncryptedPayload, HybridKeypair, PublicBundle};
pub use password::{decrypt_with_password, encrypt_with_password};
pub use sign::SafeSigner;
