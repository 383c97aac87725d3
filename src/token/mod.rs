//! Versioned token encryption
//!
//! Tokens protect small secrets (API credentials, session material) at
//! rest. The current v4 format derives its key from a keychain-held master
//! secret via HKDF-SHA512 with a fresh 32-byte salt per encryption, and
//! binds caller context as AEAD associated data:
//!
//! `0x04 | salt(32) | nonce(12) | aad_len(2 LE) | aad | ciphertext+tag`
//!
//! Two legacy formats remain readable. v3 derived its key from a machine
//! identifier and a salt; v2 from the machine identifier alone, with no
//! salt and no AAD:
//!
//! `0x03 | salt(32) | nonce(12) | ciphertext+tag`
//! `0x02 | nonce(12) | ciphertext+tag`
//!
//! Decrypting a legacy token transparently re-encrypts the plaintext as v4
//! and hands the upgraded bytes back for the caller to persist. Any other
//! version byte is rejected outright.


use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use hkdf::Hkdf;
use log::info;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::keychain::{machine_identifier, KeychainService, SERVICE_ID};
use crate::secure_memory::SecretBytes;

pub const TOKEN_VERSION_V2: u8 = 0x02;
pub const TOKEN_VERSION_V3: u8 = 0x03;
pub const TOKEN_VERSION_V4: u8 = 0x04;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// version + salt + nonce + aad_len + empty aad + tag
const V4_MIN_LEN: usize = 1 + SALT_LEN + NONCE_LEN + 2 + TAG_LEN;
const V3_MIN_LEN: usize = 1 + SALT_LEN + NONCE_LEN + TAG_LEN;
const V2_MIN_LEN: usize = 1 + NONCE_LEN + TAG_LEN;

/// Keychain entry holding the v4 master secret.
const MASTER_SECRET_ENTRY: &str = "token-master-secret";

const V4_HKDF_INFO: &[u8] = b"vortex-token-v4";

/// Caller context bound into a v4 token as associated data.
#[derive(Clone, Debug)]
pub struct TokenContext {
    pub service_id: String,
    /// Unix seconds at context creation.
    pub timestamp: u64,
    pub additional_data: Vec<u8>,
}

impl TokenContext {
    pub fn new() -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            service_id: SERVICE_ID.to_string(),
            timestamp,
            additional_data: Vec::new(),
        }
    }

    pub fn with_additional_data(mut self, data: Vec<u8>) -> Self {
        self.additional_data = data;
        self
    }

    /// Associated-data encoding: `service_id || timestamp (u64 LE) ||
    /// additional_data`.
    pub fn to_aad(&self) -> Vec<u8> {
        let mut aad =
            Vec::with_capacity(self.service_id.len() + 8 + self.additional_data.len());
        aad.extend_from_slice(self.service_id.as_bytes());
        aad.extend_from_slice(&self.timestamp.to_le_bytes());
        aad.extend_from_slice(&self.additional_data);
        aad
    }
}

impl Default for TokenContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Token encryption over a keychain-held master secret.
pub struct TokenEncryptor {
    keychain: KeychainService,
}

impl TokenEncryptor {
    /// Encryptor over the process-selected keychain backend.
    pub fn new() -> Self {
        Self {
            keychain: KeychainService::new(),
        }
    }

    /// Encryptor over an explicit keychain service.
    pub fn with_keychain(keychain: KeychainService) -> Self {
        Self { keychain }
    }

    /// Encrypt `token` in v4 form under a fresh default context.
    pub fn encrypt_token(&self, token: &str) -> CryptoResult<Vec<u8>> {
        self.encrypt_token_v4(token, &TokenContext::new())
    }

    /// Encrypt `token` in v4 form, binding `context` as associated data.
    pub fn encrypt_token_v4(&self, token: &str, context: &TokenContext) -> CryptoResult<Vec<u8>> {
        let aad = context.to_aad();
        if aad.len() > u16::MAX as usize {
            return Err(CryptoError::InvalidInput(
                "token context too large".into(),
            ));
        }

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut key = self.derive_v4_key(&salt)?;
        let cipher = ChaCha20Poly1305::new((&key).into());
        let result = cipher.encrypt(
            &Nonce::from(nonce),
            Payload {
                msg: token.as_bytes(),
                aad: &aad,
            },
        );
        key.zeroize();
        let ciphertext = result.map_err(|_| CryptoError::Encrypt)?;

        let mut out =
            Vec::with_capacity(1 + SALT_LEN + NONCE_LEN + 2 + aad.len() + ciphertext.len());
        out.push(TOKEN_VERSION_V4);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&(aad.len() as u16).to_le_bytes());
        out.extend_from_slice(&aad);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt any supported token version.
    ///
    /// Returns the plaintext and, for legacy (v2/v3) input, the re-encrypted
    /// v4 bytes the caller must persist in place of the old token.
    pub fn decrypt_token(&self, data: &[u8]) -> CryptoResult<(String, Option<Vec<u8>>)> {
        let version = *data
            .first()
            .ok_or_else(|| CryptoError::InvalidInput("empty token".into()))?;

        match version {
            TOKEN_VERSION_V4 => Ok((self.decrypt_v4(data)?, None)),
            TOKEN_VERSION_V3 => self.migrate_legacy(decrypt_v3(data)?),
            TOKEN_VERSION_V2 => self.migrate_legacy(decrypt_v2(data)?),
            other => Err(CryptoError::UnsupportedTokenVersion(other)),
        }
    }

    fn migrate_legacy(&self, plaintext: String) -> CryptoResult<(String, Option<Vec<u8>>)> {
        let upgraded = self.encrypt_token_v4(&plaintext, &TokenContext::new())?;
        info!("migrated legacy token to v4");
        Ok((plaintext, Some(upgraded)))
    }

    fn decrypt_v4(&self, data: &[u8]) -> CryptoResult<String> {
        if data.len() < V4_MIN_LEN {
            return Err(CryptoError::Decrypt("token too short".into()));
        }

        let salt: [u8; SALT_LEN] = data[1..1 + SALT_LEN]
            .try_into()
            .map_err(|_| CryptoError::Decrypt("token too short".into()))?;
        let nonce_start = 1 + SALT_LEN;
        let nonce: [u8; NONCE_LEN] = data[nonce_start..nonce_start + NONCE_LEN]
            .try_into()
            .map_err(|_| CryptoError::Decrypt("token too short".into()))?;

        let aad_len_start = nonce_start + NONCE_LEN;
        let aad_len = u16::from_le_bytes([data[aad_len_start], data[aad_len_start + 1]]) as usize;
        let aad_start = aad_len_start + 2;
        let ct_start = aad_start
            .checked_add(aad_len)
            .filter(|start| start + TAG_LEN <= data.len())
            .ok_or_else(|| CryptoError::Decrypt("token too short".into()))?;
        let aad = &data[aad_start..ct_start];
        let ciphertext = &data[ct_start..];

        let mut key = self.derive_v4_key(&salt)?;
        let cipher = ChaCha20Poly1305::new((&key).into());
        let result = cipher.decrypt(
            &Nonce::from(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        );
        key.zeroize();

        let plaintext = result.map_err(|_| CryptoError::Decrypt("token authentication failed".into()))?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt("invalid token data".into()))
    }

    /// HKDF-SHA512 over the keychain master secret with the token's salt.
    fn derive_v4_key(&self, salt: &[u8; SALT_LEN]) -> CryptoResult<[u8; 32]> {
        let master = self.master_secret()?;
        let hkdf = Hkdf::<Sha512>::new(Some(salt.as_slice()), master.as_slice());
        let mut key = [0u8; 32];
        hkdf.expand(V4_HKDF_INFO, &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;
        Ok(key)
    }

    /// Fetch the master secret, creating and storing it on first use.
    fn master_secret(&self) -> CryptoResult<SecretBytes> {
        if let Some(existing) = self.keychain.retrieve(MASTER_SECRET_ENTRY)? {
            return Ok(SecretBytes::new(existing));
        }

        let mut fresh = vec![0u8; 32];
        OsRng.fill_bytes(&mut fresh);
        self.keychain.store(MASTER_SECRET_ENTRY, &fresh)?;
        info!("generated new token master secret");
        Ok(SecretBytes::new(fresh))
    }
}

impl Default for TokenEncryptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Machine-bound key for legacy v2 tokens.
pub(crate) fn get_machine_key() -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"vortex-machine-key-v1");
    hasher.update(machine_identifier().as_bytes());
    hasher.update(b"vortex-image-secure-storage");
    *hasher.finalize().as_bytes()
}

/// Salted machine-bound key for legacy v3 tokens.
pub(crate) fn get_machine_key_with_salt(salt: &[u8; SALT_LEN]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"vortex-machine-key-v3");
    hasher.update(&get_machine_key());
    hasher.update(salt);
    *hasher.finalize().as_bytes()
}

fn decrypt_v3(data: &[u8]) -> CryptoResult<String> {
    if data.len() < V3_MIN_LEN {
        return Err(CryptoError::Decrypt("token too short".into()));
    }

    let salt: [u8; SALT_LEN] = data[1..1 + SALT_LEN]
        .try_into()
        .map_err(|_| CryptoError::Decrypt("token too short".into()))?;
    let nonce_start = 1 + SALT_LEN;
    let nonce: [u8; NONCE_LEN] = data[nonce_start..nonce_start + NONCE_LEN]
        .try_into()
        .map_err(|_| CryptoError::Decrypt("token too short".into()))?;
    let ciphertext = &data[nonce_start + NONCE_LEN..];

    let mut key = get_machine_key_with_salt(&salt);
    let cipher = ChaCha20Poly1305::new((&key).into());
    let result = cipher.decrypt(&Nonce::from(nonce), ciphertext);
    key.zeroize();

    let plaintext = result.map_err(|_| CryptoError::Decrypt("token authentication failed".into()))?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt("invalid token data".into()))
}

fn decrypt_v2(data: &[u8]) -> CryptoResult<String> {
    if data.len() < V2_MIN_LEN {
        return Err(CryptoError::Decrypt("token too short".into()));
    }

    let nonce: [u8; NONCE_LEN] = data[1..1 + NONCE_LEN]
        .try_into()
        .map_err(|_| CryptoError::Decrypt("token too short".into()))?;
    let ciphertext = &data[1 + NONCE_LEN..];

    let mut key = get_machine_key();
    let cipher = ChaCha20Poly1305::new((&key).into());
    let result = cipher.decrypt(&Nonce::from(nonce), ciphertext);
    key.zeroize();

    let plaintext = result.map_err(|_| CryptoError::Decrypt("token authentication failed".into()))?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt("invalid token data".into()))
}

/// Encrypt a token with the process-default encryptor.
pub fn encrypt_token(token: &str) -> CryptoResult<Vec<u8>> {
    TokenEncryptor::new().encrypt_token(token)
}

/// Encrypt a token with explicit context via the process-default encryptor.
pub fn encrypt_token_v4(token: &str, context: &TokenContext) -> CryptoResult<Vec<u8>> {
    TokenEncryptor::new().encrypt_token_v4(token, context)
}

/// Decrypt a token with the process-default encryptor.
pub fn decrypt_token(data: &[u8]) -> CryptoResult<(String, Option<Vec<u8>>)> {
    TokenEncryptor::new().decrypt_token(data)
}
