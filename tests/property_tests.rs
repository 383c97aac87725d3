//! Property-based tests over the hybrid primitives and the token format.

use std::sync::Arc;

use proptest::prelude::*;
use vortex_crypto::keychain::{FallbackKeychain, KeychainService};
use vortex_crypto::prelude::*;

fn test_encryptor() -> TokenEncryptor {
    TokenEncryptor::with_keychain(KeychainService::with_backend(Arc::new(
        FallbackKeychain::new(),
    )))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Any byte string survives an encrypt/decrypt roundtrip.
    #[test]
    fn prop_encrypt_decrypt_roundtrip(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let keypair = HybridKeypair::generate().unwrap();
        let payload = vortex_crypto::hybrid::encrypt(&data, &keypair.public_bundle()).unwrap();
        let recovered = vortex_crypto::hybrid::decrypt(&payload, &keypair).unwrap();
        prop_assert_eq!(recovered, data);
    }

    /// AAD binding holds for arbitrary data and context bytes.
    #[test]
    fn prop_aad_roundtrip(
        data in prop::collection::vec(any::<u8>(), 1..256),
        aad in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        let keypair = HybridKeypair::generate().unwrap();
        let bundle = keypair.public_bundle();

        let payload = vortex_crypto::hybrid::encrypt_with_aad(&data, &bundle, &aad).unwrap();
        let recovered = vortex_crypto::hybrid::decrypt_with_aad(&payload, &keypair, &aad).unwrap();
        prop_assert_eq!(recovered, data);

        let mut wrong = aad.clone();
        wrong[0] = wrong[0].wrapping_add(1);
        prop_assert!(vortex_crypto::hybrid::decrypt_with_aad(&payload, &keypair, &wrong).is_err());
    }

    /// Signatures verify for the signing keypair and fail for any other.
    #[test]
    fn prop_sign_verify(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let keypair = HybridKeypair::generate().unwrap();
        let signature = keypair.sign(&data).unwrap();
        prop_assert!(keypair.verify(&data, &signature).is_ok());

        let other = HybridKeypair::generate().unwrap();
        prop_assert!(other.verify(&data, &signature).is_err());
    }

    /// Data encrypted before a rotation stays readable afterwards.
    #[test]
    fn prop_rotation_decryption_compatibility(data in prop::collection::vec(any::<u8>(), 1..256)) {
        let service = CryptoService::new();
        let info = service.generate_keypair().unwrap();

        let payload = service.encrypt_data(info.handle, &data).unwrap();
        service.rotate_keypair(info.handle).unwrap();

        let recovered = service.decrypt_data(info.handle, &payload).unwrap();
        prop_assert_eq!(recovered, data);
    }

    /// Keypair serialization preserves identity and usability.
    #[test]
    fn prop_keypair_serialization(rotations in 0u32..4) {
        let mut keypair = HybridKeypair::generate().unwrap();
        for _ in 0..rotations {
            keypair = keypair.generate_rotated().unwrap();
        }

        let restored = HybridKeypair::from_bytes(&keypair.to_bytes()).unwrap();
        prop_assert_eq!(restored.rotation_count, rotations);
        prop_assert_eq!(
            restored.public_bundle().key_id,
            keypair.public_bundle().key_id
        );
    }

    /// Token roundtrip holds for arbitrary printable plaintext.
    #[test]
    fn prop_token_roundtrip(token in "[ -~]{0,200}") {
        let enc = test_encryptor();
        let encrypted = enc.encrypt_token(&token).unwrap();
        prop_assert_eq!(encrypted[0], TOKEN_VERSION_V4);

        let (decrypted, upgraded) = enc.decrypt_token(&encrypted).unwrap();
        prop_assert_eq!(decrypted, token);
        prop_assert!(upgraded.is_none());
    }

    /// Truncating a token anywhere never panics and never succeeds.
    #[test]
    fn prop_truncated_token_rejected(cut in 1usize..63) {
        let enc = test_encryptor();
        let encrypted = enc.encrypt_token("truncation target").unwrap();
        let truncated = &encrypted[..encrypted.len().saturating_sub(cut).max(1)];
        prop_assert!(enc.decrypt_token(truncated).is_err());
    }

    /// Arbitrary garbage never panics the signature verifier.
    #[test]
    fn prop_garbage_signature_rejected(sig in prop::collection::vec(any::<u8>(), 0..300)) {
        let keypair = HybridKeypair::generate().unwrap();
        prop_assert!(keypair.verify(b"message", &sig).is_err());
    }
}
