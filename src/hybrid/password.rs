//! Password-based wrapping for keypair export
//!
//! Argon2id stretches the password into a ChaCha20-Poly1305 key. Output
//! layout: `salt (16) | nonce (12) | ciphertext+tag`.

use argon2::Argon2;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

fn derive_password_key(password: &[u8], salt: &[u8]) -> CryptoResult<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password, salt, &mut key)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}

/// Encrypt `data` under a password via Argon2id key stretching.
pub fn encrypt_with_password(data: &[u8], password: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let mut key = derive_password_key(password, &salt)?;
    let cipher = ChaCha20Poly1305::new((&key).into());
    let result = cipher.encrypt(&Nonce::from(nonce_bytes), data);
    key.zeroize();
    let ciphertext = result.map_err(|_| CryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt [`encrypt_with_password`] output. A wrong password fails the
/// AEAD tag check, not the key derivation.
pub fn decrypt_with_password(data: &[u8], password: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.len() < SALT_LEN + NONCE_LEN {
        return Err(CryptoError::InvalidInput(
            "password-wrapped data too short".into(),
        ));
    }
    let (salt, rest) = data.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
    let nonce: [u8; NONCE_LEN] = nonce_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidInput("password-wrapped data too short".into()))?;

    let mut key = derive_password_key(password, salt)?;
    let cipher = ChaCha20Poly1305::new((&key).into());
    let result = cipher.decrypt(&Nonce::from(nonce), ciphertext);
    key.zeroize();

    result.map_err(|_| CryptoError::Decrypt("authentication failed".into()))
}
