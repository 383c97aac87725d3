//! Hybrid keypair generation, public bundles, and serialization
//!
//! A [`HybridKeypair`] carries one post-quantum and one classical pair for
//! each of the two roles (encapsulation and signing), plus rotation
//! metadata. Secret halves are held in zeroizing containers; the struct has
//! no `Clone` impl, so keypair material can only move, never silently
//! multiply.

use pqcrypto_dilithium::dilithium3;
use pqcrypto_mlkem::mlkem1024;
use pqcrypto_traits::kem::{PublicKey as KemPublicKey, SecretKey as KemSecretKey};
use pqcrypto_traits::sign::{PublicKey as SignPublicKey, SecretKey as SignSecretKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::error::{CryptoError, CryptoResult};
use crate::secure_memory::{SecretBytes, SecretKey32};

/// Hybrid keypair combining post-quantum and classical cryptography.
///
/// - ML-KEM-1024 for key encapsulation (post-quantum)
/// - X25519 for classical key exchange (defense in depth)
/// - Dilithium3 for signatures (post-quantum)
/// - Ed25519 for classical signatures (defense in depth)
pub struct HybridKeypair {
    /// ML-KEM public encapsulation key
    pub pq_encap_key: Vec<u8>,
    /// ML-KEM secret decapsulation key
    pub pq_decap_key: SecretBytes,
    /// X25519 static secret
    pub x25519_secret: SecretKey32,
    /// X25519 public key
    pub x25519_public: [u8; 32],
    /// Dilithium secret signing key
    pub pq_signing_key: SecretBytes,
    /// Dilithium public verifying key
    pub pq_verifying_key: Vec<u8>,
    /// Ed25519 signing key seed
    pub ed_signing_key: SecretKey32,
    /// Ed25519 verifying key
    pub ed_verifying_key: [u8; 32],
    /// Unix timestamp (seconds) of generation or last rotation
    pub created_at: u64,
    /// Number of rotations this slot has seen; 0 for a fresh keypair
    pub rotation_count: u32,
}

/// Public half of a [`HybridKeypair`], safe to share with anyone.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PublicBundle {
    /// ML-KEM encapsulation key
    pub pq_encap: Vec<u8>,
    /// X25519 public key
    pub x25519: [u8; 32],
    /// Dilithium verifying key
    pub pq_verify: Vec<u8>,
    /// Ed25519 verifying key
    pub ed_verify: [u8; 32],
    /// Short hex fingerprint of the public material
    pub key_id: String,
}

/// Encapsulated key material shipped alongside a ciphertext.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncapsulatedKey {
    /// ML-KEM ciphertext
    pub pq_ciphertext: Vec<u8>,
    /// Ephemeral X25519 public key
    pub x25519_ephemeral: [u8; 32],
}

/// Everything needed to decrypt a hybrid-encrypted message.
///
/// If `aad_hash` is present, decryption recomputes the digest of the
/// supplied associated data and rejects on mismatch before touching the
/// ciphertext.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
    pub encap: EncapsulatedKey,
    pub aad_hash: Option<[u8; 32]>,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn key_id_for(pq_encap: &[u8], x25519: &[u8; 32], pq_verify: &[u8], ed_verify: &[u8; 32]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"vortex-key-id-v1");
    hasher.update(pq_encap);
    hasher.update(x25519);
    hasher.update(pq_verify);
    hasher.update(ed_verify);
    hex::encode(&hasher.finalize().as_bytes()[..8])
}

impl HybridKeypair {
    /// Generate a fresh hybrid keypair with both PQ and classical keys.
    pub fn generate() -> CryptoResult<Self> {
        let (kem_public, kem_secret) = mlkem1024::keypair();
        let (dil_public, dil_secret) = dilithium3::keypair();

        let x_secret = StaticSecret::random_from_rng(OsRng);
        let x_public = X25519Public::from(&x_secret);

        let ed_signing = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let ed_verifying = ed_signing.verifying_key();

        Ok(Self {
            pq_encap_key: kem_public.as_bytes().to_vec(),
            pq_decap_key: SecretBytes::new(kem_secret.as_bytes().to_vec()),
            x25519_secret: SecretKey32::new(x_secret.to_bytes()),
            x25519_public: x_public.to_bytes(),
            pq_signing_key: SecretBytes::new(dil_secret.as_bytes().to_vec()),
            pq_verifying_key: dil_public.as_bytes().to_vec(),
            ed_signing_key: SecretKey32::new(ed_signing.to_bytes()),
            ed_verifying_key: ed_verifying.to_bytes(),
            created_at: unix_now(),
            rotation_count: 0,
        })
    }

    /// Generate the replacement keypair for a rotation of `self`.
    ///
    /// Fresh key material, `rotation_count` bumped by one, `created_at`
    /// refreshed.
    pub fn generate_rotated(&self) -> CryptoResult<Self> {
        let mut fresh = Self::generate()?;
        fresh.rotation_count = self.rotation_count + 1;
        Ok(fresh)
    }

    /// Public half of this keypair for sharing.
    pub fn public_bundle(&self) -> PublicBundle {
        PublicBundle {
            pq_encap: self.pq_encap_key.clone(),
            x25519: self.x25519_public,
            pq_verify: self.pq_verifying_key.clone(),
            ed_verify: self.ed_verifying_key,
            key_id: key_id_for(
                &self.pq_encap_key,
                &self.x25519_public,
                &self.pq_verifying_key,
                &self.ed_verifying_key,
            ),
        }
    }

    /// Sign data with the hybrid signature scheme.
    ///
    /// Delegates to [`crate::hybrid::SafeSigner`], which validates key
    /// lengths before reconstructing the Dilithium keys.
    pub fn sign(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        crate::hybrid::SafeSigner::sign(self, data)
    }

    /// Verify a hybrid signature against this keypair's public half.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> CryptoResult<()> {
        self.public_bundle().verify(data, signature)
    }

    /// Serialize the full keypair, secret halves included.
    ///
    /// Layout: four length-prefixed PQ keys interleaved with the fixed
    /// 32-byte classical keys, then `created_at` (u64 LE) and
    /// `rotation_count` (u32 LE). Callers are responsible for protecting the
    /// output; see [`HybridKeypair::to_encrypted_bytes`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_prefixed(&mut out, &self.pq_encap_key);
        write_prefixed(&mut out, self.pq_decap_key.as_slice());
        out.extend_from_slice(self.x25519_secret.as_bytes());
        out.extend_from_slice(&self.x25519_public);
        write_prefixed(&mut out, self.pq_signing_key.as_slice());
        write_prefixed(&mut out, &self.pq_verifying_key);
        out.extend_from_slice(self.ed_signing_key.as_bytes());
        out.extend_from_slice(&self.ed_verifying_key);
        out.extend_from_slice(&self.created_at.to_le_bytes());
        out.extend_from_slice(&self.rotation_count.to_le_bytes());
        out
    }

    /// Reconstruct a keypair from [`HybridKeypair::to_bytes`] output.
    ///
    /// Every field boundary is bounds-checked; malformed input fails with
    /// `InvalidInput` rather than panicking.
    pub fn from_bytes(data: &[u8]) -> CryptoResult<Self> {
        let mut reader = ByteReader::new(data);

        let pq_encap_key = reader.read_prefixed()?;
        let pq_decap_key = reader.read_prefixed()?;
        let x25519_secret = reader.read_array32()?;
        let x25519_public = reader.read_array32()?;
        let pq_signing_key = reader.read_prefixed()?;
        let pq_verifying_key = reader.read_prefixed()?;
        let ed_signing_key = reader.read_array32()?;
        let ed_verifying_key = reader.read_array32()?;
        let created_at = reader.read_u64()?;
        let rotation_count = reader.read_u32()?;
        reader.expect_end()?;

        Ok(Self {
            pq_encap_key,
            pq_decap_key: SecretBytes::new(pq_decap_key),
            x25519_secret: SecretKey32::new(x25519_secret),
            x25519_public,
            pq_signing_key: SecretBytes::new(pq_signing_key),
            pq_verifying_key,
            ed_signing_key: SecretKey32::new(ed_signing_key),
            ed_verifying_key,
            created_at,
            rotation_count,
        })
    }

    /// Serialize and wrap with password-derived encryption for export.
    pub fn to_encrypted_bytes(&self, password: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut plain = self.to_bytes();
        let result = crate::hybrid::encrypt_with_password(&plain, password);
        use zeroize::Zeroize;
        plain.zeroize();
        result
    }

    /// Decrypt a password-wrapped export and reconstruct the keypair.
    pub fn from_encrypted_bytes(data: &[u8], password: &[u8]) -> CryptoResult<Self> {
        let mut plain = crate::hybrid::decrypt_with_password(data, password)?;
        let result = Self::from_bytes(&plain);
        use zeroize::Zeroize;
        plain.zeroize();
        result
    }
}

impl std::fmt::Debug for HybridKeypair {
    // Secret halves stay out of any debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridKeypair")
            .field("key_id", &self.public_bundle().key_id)
            .field("created_at", &self.created_at)
            .field("rotation_count", &self.rotation_count)
            .finish_non_exhaustive()
    }
}

fn write_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

/// Bounds-checked sequential reader over a serialized keypair.
struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> CryptoResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| CryptoError::InvalidInput("truncated keypair data".into()))?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> CryptoResult<u32> {
        let bytes: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("truncated keypair data".into()))?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn read_u64(&mut self) -> CryptoResult<u64> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("truncated keypair data".into()))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn read_prefixed(&mut self) -> CryptoResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        // Field lengths beyond any real key size indicate garbage input.
        if len > 1 << 20 {
            return Err(CryptoError::InvalidInput(
                "implausible field length in keypair data".into(),
            ));
        }
        Ok(self.take(len)?.to_vec())
    }

    fn read_array32(&mut self) -> CryptoResult<[u8; 32]> {
        self.take(32)?
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("truncated keypair data".into()))
    }

    fn expect_end(&self) -> CryptoResult<()> {
        if self.offset == self.data.len() {
            Ok(())
        } else {
            Err(CryptoError::InvalidInput(
                "trailing bytes after keypair data".into(),
            ))
        }
    }
}

impl PublicBundle {
    /// Verify a hybrid signature: both the Dilithium and the Ed25519 halves
    /// must check out.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> CryptoResult<()> {
        crate::hybrid::SafeSigner::verify(self, data, signature)
    }
}
