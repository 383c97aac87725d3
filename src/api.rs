//! Command-surface service layer
//!
//! [`CryptoService`] is the boundary the untrusted frontend talks to. Every
//! response carries only opaque handles and public material; secret bytes
//! never leave the store. One service instance is shared across concurrent
//! command invocations.

use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::error::CryptoResult;
use crate::hybrid::{self, EncryptedPayload, HybridKeypair, PublicBundle};
use crate::key_management::{lock_keypair, KeyRotator, KeypairStore, RotationOutcome};

/// Public description of a stored keypair, safe to serialize across the
/// boundary.
#[derive(Clone, Debug, Serialize)]
pub struct KeypairInfo {
    pub handle: u64,
    pub public_bundle: PublicBundle,
    pub created_at: u64,
    pub rotation_count: u32,
    pub key_id: String,
}

/// Boundary service over a shared keypair store.
pub struct CryptoService {
    store: Arc<KeypairStore>,
    rotator: KeyRotator,
}

impl CryptoService {
    pub fn new() -> Self {
        Self::with_store(Arc::new(KeypairStore::new()))
    }

    pub fn with_store(store: Arc<KeypairStore>) -> Self {
        let rotator = KeyRotator::new(Arc::clone(&store));
        Self { store, rotator }
    }

    /// Shared store, for boundary-level session management (idle expiry).
    pub fn store(&self) -> &Arc<KeypairStore> {
        &self.store
    }

    /// Generate a keypair, store it, and describe it by handle.
    pub fn generate_keypair(&self) -> CryptoResult<KeypairInfo> {
        let keypair = HybridKeypair::generate()?;
        let public_bundle = keypair.public_bundle();
        let created_at = keypair.created_at;
        let rotation_count = keypair.rotation_count;
        let handle = self.store.insert(keypair);

        Ok(KeypairInfo {
            handle,
            key_id: public_bundle.key_id.clone(),
            public_bundle,
            created_at,
            rotation_count,
        })
    }

    /// Encrypt `data` under the current keypair behind `handle`.
    pub fn encrypt_data(&self, handle: u64, data: &[u8]) -> CryptoResult<EncryptedPayload> {
        let bundle = self.current_bundle(handle)?;
        hybrid::encrypt(data, &bundle)
    }

    /// Encrypt with associated data bound to the ciphertext.
    pub fn encrypt_data_with_aad(
        &self,
        handle: u64,
        data: &[u8],
        aad: &[u8],
    ) -> CryptoResult<EncryptedPayload> {
        let bundle = self.current_bundle(handle)?;
        hybrid::encrypt_with_aad(data, &bundle, aad)
    }

    /// Rotation-aware decryption: tries the current keypair, then every
    /// retained generation.
    pub fn decrypt_data(&self, handle: u64, payload: &EncryptedPayload) -> CryptoResult<Vec<u8>> {
        let _ = self.store.touch(handle);
        self.rotator.decrypt_with_rotation(handle, payload)
    }

    /// Rotation-aware decryption for payloads carrying associated data.
    pub fn decrypt_data_with_aad(
        &self,
        handle: u64,
        payload: &EncryptedPayload,
        aad: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let _ = self.store.touch(handle);
        self.rotator.decrypt_with_rotation_aad(handle, payload, aad)
    }

    /// Sign `data` with the current keypair behind `handle`.
    pub fn sign_data(&self, handle: u64, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let _ = self.store.touch(handle);
        let shared = self.store.get(handle)?;
        let signature = lock_keypair(&shared).sign(data)?;
        Ok(signature)
    }

    /// Verify a signature against the current public bundle of `handle`.
    pub fn verify_data(&self, handle: u64, data: &[u8], signature: &[u8]) -> CryptoResult<()> {
        let bundle = self.current_bundle(handle)?;
        bundle.verify(data, signature)
    }

    /// Rotate the keypair behind `handle`; the handle itself is unchanged.
    pub fn rotate_keypair(&self, handle: u64) -> CryptoResult<KeypairInfo> {
        let RotationOutcome {
            public_bundle,
            created_at,
            rotation_count,
        } = self.rotator.rotate_keypair(handle)?;

        Ok(KeypairInfo {
            handle,
            key_id: public_bundle.key_id.clone(),
            public_bundle,
            created_at,
            rotation_count,
        })
    }

    /// Re-encrypt a payload so superseded keys can no longer read it.
    pub fn reencrypt_data(
        &self,
        handle: u64,
        payload: &EncryptedPayload,
    ) -> CryptoResult<EncryptedPayload> {
        self.rotator.reencrypt_after_rotation(handle, payload)
    }

    /// Whether `handle` currently resolves to a keypair.
    pub fn validate_keypair_handle(&self, handle: u64) -> bool {
        self.store.contains(handle)
    }

    /// Drop the keypair behind `handle`, rotation history included.
    pub fn release_keypair(&self, handle: u64) -> CryptoResult<()> {
        debug!("releasing keypair handle {}", handle);
        self.store.remove(handle)
    }

    fn current_bundle(&self, handle: u64) -> CryptoResult<PublicBundle> {
        let _ = self.store.touch(handle);
        let shared = self.store.get(handle)?;
        let bundle = lock_keypair(&shared).public_bundle();
        Ok(bundle)
    }
}

impl Default for CryptoService {
    fn default() -> Self {
        Self::new()
    }
}
