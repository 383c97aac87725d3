use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::error::CryptoError;
use crate::hybrid::{self, HybridKeypair};

fn store_with_keypair() -> (Arc<KeypairStore>, u64) {
    let store = Arc::new(KeypairStore::new());
    let handle = store.insert(HybridKeypair::generate().unwrap());
    (store, handle)
}

#[test]
fn handles_are_unique_and_start_at_one() {
    let store = KeypairStore::new();
    let first = store.insert(HybridKeypair::generate().unwrap());
    let second = store.insert(HybridKeypair::generate().unwrap());

    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_ne!(first, second);
}

#[test]
fn handles_are_not_reused_after_removal() {
    let store = KeypairStore::new();
    let first = store.insert(HybridKeypair::generate().unwrap());
    store.remove(first).unwrap();

    let second = store.insert(HybridKeypair::generate().unwrap());
    assert!(second > first);
}

#[test]
fn get_unknown_handle_fails() {
    let store = KeypairStore::new();
    assert!(matches!(
        store.get(999),
        Err(CryptoError::KeypairNotFound(999))
    ));
    assert!(!store.contains(999));
}

#[test]
fn remove_drops_the_keypair() {
    let (store, handle) = store_with_keypair();
    assert!(store.contains(handle));

    store.remove(handle).unwrap();
    assert!(!store.contains(handle));
    assert!(store.get(handle).is_err());
    assert!(matches!(
        store.remove(handle),
        Err(CryptoError::KeypairNotFound(_))
    ));
}

#[test]
fn rotation_changes_key_id_and_increments_count() {
    let (store, handle) = store_with_keypair();
    let before = lock_test(&store, handle, |kp| kp.public_bundle().key_id);

    let bundle = store.rotate(handle).unwrap();
    assert_ne!(bundle.key_id, before);

    let count = lock_test(&store, handle, |kp| kp.rotation_count);
    assert_eq!(count, 1);

    for expected in 2..=4u32 {
        store.rotate(handle).unwrap();
        assert_eq!(lock_test(&store, handle, |kp| kp.rotation_count), expected);
    }
}

#[test]
fn rotation_preserves_history_for_decryption() {
    let (store, handle) = store_with_keypair();
    for _ in 0..3 {
        store.rotate(handle).unwrap();
    }

    let all = store.get_all_for_decryption(handle).unwrap();
    assert_eq!(all.len(), 4);

    // First entry is the current keypair.
    let current_id = lock_test(&store, handle, |kp| kp.public_bundle().key_id);
    let first_id = all[0].lock().unwrap().public_bundle().key_id.clone();
    assert_eq!(first_id, current_id);
}

#[test]
fn rotation_fails_for_unknown_handle() {
    let store = KeypairStore::new();
    assert!(matches!(
        store.rotate(999),
        Err(CryptoError::KeypairNotFound(999))
    ));
}

#[test]
fn remove_drops_rotation_history_too() {
    let (store, handle) = store_with_keypair();
    for _ in 0..3 {
        store.rotate(handle).unwrap();
    }
    assert!(store.get_all_for_decryption(handle).unwrap().len() >= 4);

    store.remove(handle).unwrap();
    assert!(store.get_all_for_decryption(handle).is_err());
    assert!(store.is_empty());
}

#[test]
fn remove_idle_expires_only_stale_handles() {
    let (store, handle) = store_with_keypair();

    assert_eq!(store.remove_idle(Duration::from_secs(60)), 0);
    assert!(store.contains(handle));

    assert_eq!(store.remove_idle(Duration::ZERO), 1);
    assert!(!store.contains(handle));
}

#[test]
fn touch_defers_idle_expiry() {
    let (store, handle) = store_with_keypair();
    store.touch(handle).unwrap();
    assert!(store.contains(handle));

    assert!(matches!(
        store.touch(999),
        Err(CryptoError::KeypairNotFound(999))
    ));
}

#[test]
fn decrypt_with_rotation_reads_pre_rotation_data() {
    let (store, handle) = store_with_keypair();
    let rotator = KeyRotator::new(Arc::clone(&store));

    let bundle = lock_test(&store, handle, |kp| kp.public_bundle());
    let payload = hybrid::encrypt(b"alpha", &bundle).unwrap();

    let outcome = rotator.rotate_keypair(handle).unwrap();
    assert_eq!(outcome.rotation_count, 1);
    assert_ne!(outcome.public_bundle.key_id, bundle.key_id);

    let recovered = rotator.decrypt_with_rotation(handle, &payload).unwrap();
    assert_eq!(recovered, b"alpha");
}

#[test]
fn decrypt_with_rotation_survives_multiple_rotations() {
    let (store, handle) = store_with_keypair();
    let rotator = KeyRotator::new(Arc::clone(&store));

    // Encrypt one payload per generation.
    let mut payloads = Vec::new();
    for i in 0..4u8 {
        let bundle = lock_test(&store, handle, |kp| kp.public_bundle());
        payloads.push((vec![i; 8], hybrid::encrypt(&[i; 8], &bundle).unwrap()));
        if i < 3 {
            rotator.rotate_keypair(handle).unwrap();
        }
    }

    for (expected, payload) in &payloads {
        let recovered = rotator.decrypt_with_rotation(handle, payload).unwrap();
        assert_eq!(&recovered, expected);
    }
}

#[test]
fn reencrypt_narrows_to_current_key_only() {
    let (store, handle) = store_with_keypair();
    let rotator = KeyRotator::new(Arc::clone(&store));

    let old_bundle = lock_test(&store, handle, |kp| kp.public_bundle());
    let payload = hybrid::encrypt(b"alpha", &old_bundle).unwrap();

    // Keep an out-of-store copy of the original keypair to stand in for a
    // rotated-out generation.
    let old_copy = {
        let shared = store.get(handle).unwrap();
        let kp = shared.lock().unwrap();
        HybridKeypair::from_bytes(&kp.to_bytes()).unwrap()
    };

    rotator.rotate_keypair(handle).unwrap();
    let reencrypted = rotator.reencrypt_after_rotation(handle, &payload).unwrap();

    // Rotation-aware path reads it, the superseded keypair alone does not.
    assert_eq!(
        rotator.decrypt_with_rotation(handle, &reencrypted).unwrap(),
        b"alpha"
    );
    assert!(hybrid::decrypt(&reencrypted, &old_copy).is_err());
}

#[test]
fn decrypt_with_rotation_fails_for_foreign_payload() {
    let (store, handle) = store_with_keypair();
    let rotator = KeyRotator::new(Arc::clone(&store));

    let foreign = HybridKeypair::generate().unwrap();
    let payload = hybrid::encrypt(b"not ours", &foreign.public_bundle()).unwrap();

    assert!(matches!(
        rotator.decrypt_with_rotation(handle, &payload),
        Err(CryptoError::Decrypt(_))
    ));
}

#[test]
fn rotation_policy_gates_on_age() {
    let mut keypair = HybridKeypair::generate().unwrap();
    let policy = RotationPolicy::new(Duration::from_secs(3600));

    assert!(!policy.is_due(&keypair));
    policy.needs_rotation(&keypair).unwrap();

    keypair.created_at -= 7200;
    assert!(policy.is_due(&keypair));
    assert!(matches!(
        policy.needs_rotation(&keypair),
        Err(CryptoError::KeyRotationRequired)
    ));
}

#[test]
fn concurrent_store_access() {
    let store = Arc::new(KeypairStore::new());
    let mut threads = Vec::new();

    for _ in 0..4 {
        let store = Arc::clone(&store);
        threads.push(std::thread::spawn(move || {
            let handle = store.insert(HybridKeypair::generate().unwrap());
            store.rotate(handle).unwrap();
            store.get(handle).unwrap();
            handle
        }));
    }

    let handles: Vec<u64> = threads.into_iter().map(|t| t.join().unwrap()).collect();
    let mut unique = handles.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), handles.len());
    assert_eq!(store.len(), 4);
}

#[test]
fn blocked_rotation_does_not_contend_with_other_handles() {
    let store = Arc::new(KeypairStore::new());
    let a = store.insert(HybridKeypair::generate().unwrap());
    let b = store.insert(HybridKeypair::generate().unwrap());

    // Hold handle a's keypair mutex, as an in-flight signing would.
    let a_keypair = store.get(a).unwrap();
    let a_guard = a_keypair.lock().unwrap();

    // This rotation must wait for a's mutex, not for the store-wide lock.
    let rotating = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || store.rotate(a))
    };
    std::thread::sleep(Duration::from_millis(50));

    // Every other-handle operation proceeds while the rotation waits.
    store.get(b).unwrap();
    store.touch(b).unwrap();
    store.rotate(b).unwrap();
    let c = store.insert(HybridKeypair::generate().unwrap());
    store.remove(c).unwrap();

    drop(a_guard);
    rotating.join().unwrap().unwrap();
    assert_eq!(lock_test(&store, a, |kp| kp.rotation_count), 1);
}

fn lock_test<R>(store: &KeypairStore, handle: u64, f: impl FnOnce(&HybridKeypair) -> R) -> R {
    let shared = store.get(handle).unwrap();
    let guard = shared.lock().unwrap();
    f(&guard)
}
