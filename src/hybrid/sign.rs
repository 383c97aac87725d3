//! Safe hybrid signing
//!
//! Reconstructs the Dilithium signing key from its validated byte buffer via
//! the library's documented `from_bytes` constructor, signs with it, and
//! appends the Ed25519 classical signature. Key byte lengths are checked
//! against the algorithm's fixed sizes before any reconstruction is
//! attempted; a mismatch fails with `InvalidInput` immediately. No memory
//! reinterpretation is involved anywhere on this path.
//!
//! Combined signature wire format:
//! `[pq_sig_len: u32 LE][pq_sig][ed_sig: 64 bytes]`

use ed25519_dalek::{Signer, Verifier};
use pqcrypto_dilithium::dilithium3;
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as _, SecretKey as _,
};

use crate::error::{CryptoError, CryptoResult};
use crate::hybrid::{HybridKeypair, PublicBundle};

/// Ed25519 signatures are always this long.
const ED25519_SIGNATURE_LEN: usize = 64;

/// Minimum combined signature: length prefix + Ed25519 tail. The Dilithium
/// half can never be empty, so anything at or below this is malformed.
const MIN_COMBINED_LEN: usize = 4 + ED25519_SIGNATURE_LEN;

/// Stateless signer/verifier for the hybrid signature scheme.
pub struct SafeSigner;

impl SafeSigner {
    /// Sign `data` with both signature halves of `keypair`.
    ///
    /// Validates the stored Dilithium secret and public key lengths against
    /// the algorithm constants before reconstruction. Either mismatch is an
    /// `InvalidInput` error, returned before any key object is built.
    pub fn sign(keypair: &HybridKeypair, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let secret = keypair.pq_signing_key.as_slice();
        let public = &keypair.pq_verifying_key;

        if secret.len() != dilithium3::secret_key_bytes() {
            return Err(CryptoError::InvalidInput(format!(
                "dilithium secret key length {} != expected {}",
                secret.len(),
                dilithium3::secret_key_bytes()
            )));
        }
        if public.len() != dilithium3::public_key_bytes() {
            return Err(CryptoError::InvalidInput(format!(
                "dilithium public key length {} != expected {}",
                public.len(),
                dilithium3::public_key_bytes()
            )));
        }

        // Lengths verified; reconstruct through the documented constructor.
        let signing_key = dilithium3::SecretKey::from_bytes(secret)
            .map_err(|_| CryptoError::KeyGeneration("dilithium key reconstruction failed".into()))?;
        let pq_sig = dilithium3::detached_sign(data, &signing_key);
        let pq_sig_bytes = pq_sig.as_bytes();

        let ed_signing = ed25519_dalek::SigningKey::from_bytes(keypair.ed_signing_key.as_bytes());
        let ed_sig = ed_signing.sign(data);

        let mut combined = Vec::with_capacity(4 + pq_sig_bytes.len() + ED25519_SIGNATURE_LEN);
        combined.extend_from_slice(&(pq_sig_bytes.len() as u32).to_le_bytes());
        combined.extend_from_slice(pq_sig_bytes);
        combined.extend_from_slice(&ed_sig.to_bytes());
        Ok(combined)
    }

    /// Verify a combined hybrid signature against a public bundle.
    ///
    /// Both halves must verify; any parse failure or mismatch collapses to
    /// `SignatureInvalid` without indicating which half failed.
    pub fn verify(bundle: &PublicBundle, data: &[u8], signature: &[u8]) -> CryptoResult<()> {
        if signature.len() <= MIN_COMBINED_LEN {
            return Err(CryptoError::SignatureInvalid);
        }

        let prefix: [u8; 4] = signature[..4]
            .try_into()
            .map_err(|_| CryptoError::SignatureInvalid)?;
        let pq_sig_len = u32::from_le_bytes(prefix) as usize;
        let ed_start = 4usize
            .checked_add(pq_sig_len)
            .ok_or(CryptoError::SignatureInvalid)?;
        if signature.len() != ed_start + ED25519_SIGNATURE_LEN {
            return Err(CryptoError::SignatureInvalid);
        }
        let pq_sig_bytes = &signature[4..ed_start];
        let ed_sig_bytes = &signature[ed_start..];

        // Dilithium half
        let pq_verify_key = dilithium3::PublicKey::from_bytes(&bundle.pq_verify)
            .map_err(|_| CryptoError::SignatureInvalid)?;
        let pq_sig = dilithium3::DetachedSignature::from_bytes(pq_sig_bytes)
            .map_err(|_| CryptoError::SignatureInvalid)?;
        dilithium3::verify_detached_signature(&pq_sig, data, &pq_verify_key)
            .map_err(|_| CryptoError::SignatureInvalid)?;

        // Ed25519 half
        let ed_verify_key = ed25519_dalek::VerifyingKey::from_bytes(&bundle.ed_verify)
            .map_err(|_| CryptoError::SignatureInvalid)?;
        let ed_sig_arr: [u8; 64] = ed_sig_bytes
            .try_into()
            .map_err(|_| CryptoError::SignatureInvalid)?;
        let ed_sig = ed25519_dalek::Signature::from_bytes(&ed_sig_arr);
        ed_verify_key
            .verify(data, &ed_sig)
            .map_err(|_| CryptoError::SignatureInvalid)?;

        Ok(())
    }
}
