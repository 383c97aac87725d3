//! End-to-end exercises of the full service surface: keypair lifecycle,
//! encryption across rotations, signing, and token migration.

use std::sync::Arc;

use vortex_crypto::keychain::{FallbackKeychain, KeychainService};
use vortex_crypto::prelude::*;

#[test]
fn full_pipeline_with_key_rotation() {
    let service = CryptoService::new();

    // Generate and encrypt under the initial key.
    let info = service.generate_keypair().expect("keypair generation");
    assert_eq!(info.rotation_count, 0);
    let payload = service
        .encrypt_data(info.handle, b"alpha")
        .expect("encryption");

    // Keep a serialized copy of the original keypair to stand in for a
    // rotated-out generation after re-encryption.
    let old_keypair = {
        let shared = service.store().get(info.handle).expect("live handle");
        let keypair = shared.lock().expect("lock");
        HybridKeypair::from_bytes(&keypair.to_bytes()).expect("deserialization")
    };

    // Rotate; the handle is unchanged, the key behind it is not.
    let rotated = service.rotate_keypair(info.handle).expect("rotation");
    assert_eq!(rotated.handle, info.handle);
    assert_eq!(rotated.rotation_count, 1);
    assert_ne!(rotated.key_id, info.key_id);

    // Pre-rotation data still decrypts through the rotation-aware path.
    let recovered = service
        .decrypt_data(info.handle, &payload)
        .expect("rotation-aware decryption");
    assert_eq!(recovered, b"alpha");

    // Re-encrypt, then confirm the superseded keypair is locked out.
    let narrowed = service
        .reencrypt_data(info.handle, &payload)
        .expect("re-encryption");
    assert_eq!(
        service
            .decrypt_data(info.handle, &narrowed)
            .expect("decryption of re-encrypted payload"),
        b"alpha"
    );
    assert!(
        vortex_crypto::hybrid::decrypt(&narrowed, &old_keypair).is_err(),
        "rotated-out keypair must not read re-encrypted data"
    );
}

#[test]
fn signing_survives_rotation_of_other_handles() {
    let service = CryptoService::new();
    let signer = service.generate_keypair().expect("signer keypair");
    let other = service.generate_keypair().expect("other keypair");

    let signature = service.sign_data(signer.handle, b"document").expect("signing");

    // Rotating an unrelated handle never affects this one.
    service.rotate_keypair(other.handle).expect("rotation");
    service
        .verify_data(signer.handle, b"document", &signature)
        .expect("verification");

    // After rotating the signer, old signatures verify against the old
    // public bundle but not the new one.
    service.rotate_keypair(signer.handle).expect("rotation");
    assert!(service
        .verify_data(signer.handle, b"document", &signature)
        .is_err());
    signer
        .public_bundle
        .verify(b"document", &signature)
        .expect("verification against retained bundle");
}

#[test]
fn concurrent_handles_are_isolated() {
    let service = Arc::new(CryptoService::new());
    let mut threads = Vec::new();

    for i in 0..4u8 {
        let service = Arc::clone(&service);
        threads.push(std::thread::spawn(move || {
            let info = service.generate_keypair().expect("keypair");
            let data = vec![i; 32];
            let payload = service.encrypt_data(info.handle, &data).expect("encrypt");

            service.rotate_keypair(info.handle).expect("rotate");
            let recovered = service.decrypt_data(info.handle, &payload).expect("decrypt");
            assert_eq!(recovered, data);

            service.release_keypair(info.handle).expect("release");
            assert!(!service.validate_keypair_handle(info.handle));
        }));
    }

    for thread in threads {
        thread.join().expect("thread");
    }
}

#[test]
fn token_lifecycle_over_one_keychain() {
    let keychain = KeychainService::with_backend(Arc::new(FallbackKeychain::new()));
    let encryptor = TokenEncryptor::with_keychain(keychain);

    let context = TokenContext::new().with_additional_data(b"account:primary".to_vec());
    let token = encryptor
        .encrypt_token_v4("api-credential-material", &context)
        .expect("token encryption");
    assert_eq!(token[0], TOKEN_VERSION_V4);

    let (plaintext, upgraded) = encryptor.decrypt_token(&token).expect("token decryption");
    assert_eq!(plaintext, "api-credential-material");
    assert!(upgraded.is_none());
}

#[test]
fn payloads_roundtrip_through_persistence() {
    let service = CryptoService::new();
    let info = service.generate_keypair().expect("keypair");

    let payload = service
        .encrypt_data_with_aad(info.handle, b"stored bytes", b"path:/images/1")
        .expect("encryption");

    // Simulate persistence to disk and reload.
    let stored = serde_json::to_vec(&payload).expect("serialization");
    let reloaded: EncryptedPayload = serde_json::from_slice(&stored).expect("deserialization");

    assert_eq!(
        service
            .decrypt_data_with_aad(info.handle, &reloaded, b"path:/images/1")
            .expect("decryption"),
        b"stored bytes"
    );
    assert!(matches!(
        service.decrypt_data_with_aad(info.handle, &reloaded, b"path:/images/2"),
        Err(CryptoError::Decrypt(_))
    ));
}
