//! Keypair storage and rotation
//!
//! Secret key material never crosses the API boundary; callers hold opaque
//! `u64` handles into an in-process [`KeypairStore`] and every operation
//! that needs the keys runs inside the store. Rotation keeps superseded
//! keypairs in a per-handle history so data encrypted before a rotation
//! stays readable until it has been re-encrypted.

mod rotation;
mod store;

#[cfg(test)]
mod tests;

pub use rotation::{KeyRotator, RotationOutcome, RotationPolicy};
pub use store::KeypairStore;

pub(crate) use store::lock_keypair;
