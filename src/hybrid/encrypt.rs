//! Hybrid encryption and decryption
//!
//! Key establishment runs ML-KEM-1024 encapsulation and an ephemeral X25519
//! exchange side by side; both shared secrets feed a BLAKE3 derivation whose
//! output keys a single ChaCha20-Poly1305 pass. An attacker has to break
//! both the post-quantum and the classical half to recover the symmetric
//! key.
//!
//! Associated data is bound twice: inside the AEAD tag and as a standalone
//! BLAKE3 digest carried in the payload, so a wrong-context attempt is
//! rejected with a distinct error before the ciphertext is touched.

use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use pqcrypto_mlkem::mlkem1024;
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::hybrid::{EncapsulatedKey, EncryptedPayload, HybridKeypair, PublicBundle};

/// Domain separator for the hybrid key derivation.
const HYBRID_KDF_DOMAIN: &[u8] = b"vortex-hybrid-v1";

/// Derive the symmetric key from both shared secrets.
///
/// BLAKE3 over the domain separator and the concatenated secrets; the result
/// is only as weak as the stronger surviving half.
fn derive_hybrid_key(pq_shared: &[u8], x25519_shared: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(HYBRID_KDF_DOMAIN);
    hasher.update(pq_shared);
    hasher.update(x25519_shared);
    *hasher.finalize().as_bytes()
}

/// Encrypt `data` for the holder of `recipient`'s secret keys.
pub fn encrypt(data: &[u8], recipient: &PublicBundle) -> CryptoResult<EncryptedPayload> {
    encrypt_inner(data, recipient, None)
}

/// Encrypt `data` with associated data bound into the ciphertext.
///
/// The same `aad` bytes must be presented at decryption time; any other
/// value fails with [`CryptoError::AadMismatch`].
pub fn encrypt_with_aad(
    data: &[u8],
    recipient: &PublicBundle,
    aad: &[u8],
) -> CryptoResult<EncryptedPayload> {
    encrypt_inner(data, recipient, Some(aad))
}

fn encrypt_inner(
    data: &[u8],
    recipient: &PublicBundle,
    aad: Option<&[u8]>,
) -> CryptoResult<EncryptedPayload> {
    let kem_public = mlkem1024::PublicKey::from_bytes(&recipient.pq_encap)
        .map_err(|_| CryptoError::KeyExchange("malformed ML-KEM public key".into()))?;
    let (pq_shared, pq_ciphertext) = mlkem1024::encapsulate(&kem_public);

    let eph_secret = EphemeralSecret::random_from_rng(OsRng);
    let eph_public = X25519Public::from(&eph_secret);
    let x_shared = eph_secret.diffie_hellman(&X25519Public::from(recipient.x25519));

    let mut key = derive_hybrid_key(pq_shared.as_bytes(), x_shared.as_bytes());
    let cipher = ChaCha20Poly1305::new((&key).into());

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let result = match aad {
        Some(aad) => cipher.encrypt(&nonce, Payload { msg: data, aad }),
        None => cipher.encrypt(&nonce, data),
    };
    key.zeroize();
    let ciphertext = result.map_err(|_| CryptoError::Encrypt)?;

    Ok(EncryptedPayload {
        nonce: nonce_bytes,
        ciphertext,
        encap: EncapsulatedKey {
            pq_ciphertext: pq_ciphertext.as_bytes().to_vec(),
            x25519_ephemeral: eph_public.to_bytes(),
        },
        aad_hash: aad.map(|aad| *blake3::hash(aad).as_bytes()),
    })
}

/// Decrypt a payload produced by [`encrypt`].
///
/// Fails with [`CryptoError::AadMismatch`] if the payload was encrypted with
/// associated data.
pub fn decrypt(payload: &EncryptedPayload, keypair: &HybridKeypair) -> CryptoResult<Vec<u8>> {
    decrypt_inner(payload, keypair, None)
}

/// Decrypt a payload produced by [`encrypt_with_aad`].
pub fn decrypt_with_aad(
    payload: &EncryptedPayload,
    keypair: &HybridKeypair,
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    decrypt_inner(payload, keypair, Some(aad))
}

fn decrypt_inner(
    payload: &EncryptedPayload,
    keypair: &HybridKeypair,
    aad: Option<&[u8]>,
) -> CryptoResult<Vec<u8>> {
    // Check the AAD commitment before any key agreement work.
    match (&payload.aad_hash, aad) {
        (None, None) => {}
        (Some(stored), Some(aad)) => {
            let supplied = blake3::hash(aad);
            if !constant_time_eq::constant_time_eq(stored, supplied.as_bytes()) {
                return Err(CryptoError::AadMismatch);
            }
        }
        // AAD present on exactly one side can never authenticate.
        _ => return Err(CryptoError::AadMismatch),
    }

    let kem_ciphertext = mlkem1024::Ciphertext::from_bytes(&payload.encap.pq_ciphertext)
        .map_err(|_| CryptoError::KeyExchange("malformed ML-KEM ciphertext".into()))?;
    let kem_secret = mlkem1024::SecretKey::from_bytes(keypair.pq_decap_key.as_slice())
        .map_err(|_| CryptoError::KeyExchange("malformed ML-KEM secret key".into()))?;
    let pq_shared = mlkem1024::decapsulate(&kem_ciphertext, &kem_secret);

    let x_secret = StaticSecret::from(*keypair.x25519_secret.as_bytes());
    let x_shared = x_secret.diffie_hellman(&X25519Public::from(payload.encap.x25519_ephemeral));

    let mut key = derive_hybrid_key(pq_shared.as_bytes(), x_shared.as_bytes());
    let cipher = ChaCha20Poly1305::new((&key).into());
    let nonce = Nonce::from(payload.nonce);

    let result = match aad {
        Some(aad) => cipher.decrypt(
            &nonce,
            Payload {
                msg: &payload.ciphertext,
                aad,
            },
        ),
        None => cipher.decrypt(&nonce, payload.ciphertext.as_ref()),
    };
    key.zeroize();

    result.map_err(|_| CryptoError::Decrypt("authentication failed".into()))
}
