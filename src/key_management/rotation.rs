//! Key rotation orchestration
//!
//! Rotation replaces the keypair behind a stable handle; callers keep the
//! handle they have. [`KeyRotator`] layers the rotation-aware decryption
//! and re-encryption flows on top of [`KeypairStore`], and
//! [`RotationPolicy`] turns keypair age into a hard gate.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{CryptoError, CryptoResult};
use crate::hybrid::{self, EncryptedPayload, HybridKeypair, PublicBundle};
use crate::key_management::{lock_keypair, KeypairStore};

/// Age-based rotation policy.
#[derive(Clone, Copy, Debug)]
pub struct RotationPolicy {
    /// Maximum keypair age before rotation becomes mandatory.
    pub max_age: Duration,
}

impl RotationPolicy {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    /// Whether `keypair` has outlived the policy.
    pub fn is_due(&self, keypair: &HybridKeypair) -> bool {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now.saturating_sub(keypair.created_at) >= self.max_age.as_secs()
    }

    /// Gate an operation on keypair freshness.
    pub fn needs_rotation(&self, keypair: &HybridKeypair) -> CryptoResult<()> {
        if self.is_due(keypair) {
            warn!(
                "keypair {} exceeded rotation policy age",
                keypair.public_bundle().key_id
            );
            Err(CryptoError::KeyRotationRequired)
        } else {
            Ok(())
        }
    }
}

impl Default for RotationPolicy {
    // 90 days
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(90 * 24 * 60 * 60),
        }
    }
}

/// Result of a completed rotation: the fresh public material plus metadata.
#[derive(Clone, Debug)]
pub struct RotationOutcome {
    pub public_bundle: PublicBundle,
    pub created_at: u64,
    pub rotation_count: u32,
}

/// Rotation-aware operations over a shared [`KeypairStore`].
pub struct KeyRotator {
    store: Arc<KeypairStore>,
}

impl KeyRotator {
    pub fn new(store: Arc<KeypairStore>) -> Self {
        Self { store }
    }

    /// Rotate the keypair behind `handle` and report the fresh public half.
    pub fn rotate_keypair(&self, handle: u64) -> CryptoResult<RotationOutcome> {
        let public_bundle = self.store.rotate(handle)?;
        let current = self.store.get(handle)?;
        let (created_at, rotation_count) = {
            let keypair = lock_keypair(&current);
            (keypair.created_at, keypair.rotation_count)
        };
        Ok(RotationOutcome {
            public_bundle,
            created_at,
            rotation_count,
        })
    }

    /// Decrypt trying the current keypair first, then each superseded
    /// generation in rotation order.
    ///
    /// On total failure the error never says how far any attempt got.
    pub fn decrypt_with_rotation(
        &self,
        handle: u64,
        payload: &EncryptedPayload,
    ) -> CryptoResult<Vec<u8>> {
        self.decrypt_attempts(handle, payload, None)
    }

    /// Rotation-aware decryption for payloads carrying associated data.
    pub fn decrypt_with_rotation_aad(
        &self,
        handle: u64,
        payload: &EncryptedPayload,
        aad: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        self.decrypt_attempts(handle, payload, Some(aad))
    }

    fn decrypt_attempts(
        &self,
        handle: u64,
        payload: &EncryptedPayload,
        aad: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>> {
        let keypairs = self.store.get_all_for_decryption(handle)?;
        let generations = keypairs.len();
        for shared in keypairs {
            let keypair = lock_keypair(&shared);
            let attempt = match aad {
                Some(aad) => hybrid::decrypt_with_aad(payload, &keypair, aad),
                None => hybrid::decrypt(payload, &keypair),
            };
            if let Ok(plaintext) = attempt {
                return Ok(plaintext);
            }
        }
        debug!(
            "decryption failed against all {} generation(s) of handle {}",
            generations, handle
        );
        Err(CryptoError::Decrypt("no keypair matched".into()))
    }

    /// Re-encrypt a payload so only the current keypair can read it.
    ///
    /// Decrypts via the rotation-aware path, then encrypts the recovered
    /// plaintext against the current public bundle alone. Superseded keys
    /// cannot open the result.
    pub fn reencrypt_after_rotation(
        &self,
        handle: u64,
        payload: &EncryptedPayload,
    ) -> CryptoResult<EncryptedPayload> {
        let mut plaintext = self.decrypt_with_rotation(handle, payload)?;
        let current = self.store.get(handle)?;
        let bundle = lock_keypair(&current).public_bundle();
        let result = hybrid::encrypt(&plaintext, &bundle);
        use zeroize::Zeroize;
        plaintext.zeroize();
        result
    }
}
