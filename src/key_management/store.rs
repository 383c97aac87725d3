//! Handle-based keypair store
//!
//! Handles are allocated from a monotonically increasing counter and never
//! reused within a process, so a stale handle can only miss, never alias a
//! newer keypair. All methods take `&self`; the store is safe to share
//! behind an `Arc` across threads.
//!
//! Operations on different handles never contend: the store-wide lock is
//! held only for map lookups and swaps, never across key generation, and
//! usage timestamps are atomics updated under the read lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{CryptoError, CryptoResult};
use crate::hybrid::{HybridKeypair, PublicBundle};

struct Entry {
    current: Arc<Mutex<HybridKeypair>>,
    /// Superseded keypairs, newest first.
    history: Vec<Arc<Mutex<HybridKeypair>>>,
    /// Nanoseconds since the store's epoch, see [`KeypairStore::clock_ns`].
    last_used_ns: AtomicU64,
}

/// Thread-safe store mapping opaque handles to hybrid keypairs.
pub struct KeypairStore {
    next_handle: AtomicU64,
    /// Epoch for the per-entry usage timestamps.
    epoch: Instant,
    entries: RwLock<HashMap<u64, Entry>>,
}

impl KeypairStore {
    /// Create an empty store. The first allocated handle is 1, so 0 is
    /// never a valid handle.
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            epoch: Instant::now(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<u64, Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<u64, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn clock_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Insert a keypair and return its freshly allocated handle.
    pub fn insert(&self, keypair: HybridKeypair) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let key_id = keypair.public_bundle().key_id;
        self.write_entries().insert(
            handle,
            Entry {
                current: Arc::new(Mutex::new(keypair)),
                history: Vec::new(),
                last_used_ns: AtomicU64::new(self.clock_ns()),
            },
        );
        info!("stored keypair {} under handle {}", key_id, handle);
        handle
    }

    /// Current keypair for `handle`.
    pub fn get(&self, handle: u64) -> CryptoResult<Arc<Mutex<HybridKeypair>>> {
        let entries = self.read_entries();
        entries
            .get(&handle)
            .map(|entry| Arc::clone(&entry.current))
            .ok_or(CryptoError::KeypairNotFound(handle))
    }

    /// Current keypair followed by its rotation history, newest first.
    ///
    /// Decryption tries these in order, so data encrypted under any still
    /// retained generation of the key can be recovered.
    pub fn get_all_for_decryption(&self, handle: u64) -> CryptoResult<Vec<Arc<Mutex<HybridKeypair>>>> {
        let entries = self.read_entries();
        let entry = entries
            .get(&handle)
            .ok_or(CryptoError::KeypairNotFound(handle))?;
        let mut all = Vec::with_capacity(1 + entry.history.len());
        all.push(Arc::clone(&entry.current));
        all.extend(entry.history.iter().map(Arc::clone));
        Ok(all)
    }

    /// Replace the keypair under `handle` with a freshly rotated one and
    /// retain the old keypair in the handle's history.
    ///
    /// Key generation runs outside the store-wide lock, holding only the
    /// handle's own keypair mutex, so a rotation in progress never blocks
    /// operations on other handles. The write lock is taken only for the
    /// final swap; a concurrent rotation of the same handle is detected
    /// there and the generation is redone against the new current keypair.
    pub fn rotate(&self, handle: u64) -> CryptoResult<PublicBundle> {
        loop {
            let base = self.get(handle)?;
            let fresh = lock_keypair(&base).generate_rotated()?;
            let bundle = fresh.public_bundle();

            let mut entries = self.write_entries();
            let entry = entries
                .get_mut(&handle)
                .ok_or(CryptoError::KeypairNotFound(handle))?;
            if !Arc::ptr_eq(&entry.current, &base) {
                // Lost a race with another rotation of this handle.
                continue;
            }

            let old = std::mem::replace(&mut entry.current, Arc::new(Mutex::new(fresh)));
            entry.history.insert(0, old);
            entry.last_used_ns.store(self.clock_ns(), Ordering::Relaxed);
            info!(
                "rotated handle {} to key {} ({} superseded generation(s) retained)",
                handle,
                bundle.key_id,
                entry.history.len()
            );
            return Ok(bundle);
        }
    }

    /// Drop the keypair under `handle`, history included. The zeroizing
    /// containers wipe the secret material once the last `Arc` is released.
    pub fn remove(&self, handle: u64) -> CryptoResult<()> {
        self.write_entries()
            .remove(&handle)
            .map(|_| debug!("removed keypair handle {}", handle))
            .ok_or(CryptoError::KeypairNotFound(handle))
    }

    /// Whether `handle` currently maps to a keypair.
    pub fn contains(&self, handle: u64) -> bool {
        self.read_entries().contains_key(&handle)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    /// Mark `handle` as recently used, deferring idle expiry.
    ///
    /// Runs entirely under the read lock; the timestamp is an atomic.
    pub fn touch(&self, handle: u64) -> CryptoResult<()> {
        let entries = self.read_entries();
        let entry = entries
            .get(&handle)
            .ok_or(CryptoError::KeypairNotFound(handle))?;
        entry.last_used_ns.store(self.clock_ns(), Ordering::Relaxed);
        Ok(())
    }

    /// Remove every handle idle for longer than `max_idle`; returns how
    /// many were dropped.
    pub fn remove_idle(&self, max_idle: Duration) -> usize {
        let max_idle_ns = max_idle.as_nanos() as u64;
        let mut entries = self.write_entries();
        let now = self.clock_ns();
        let before = entries.len();
        entries.retain(|_, entry| {
            now.saturating_sub(entry.last_used_ns.load(Ordering::Relaxed)) <= max_idle_ns
        });
        let removed = before - entries.len();
        if removed > 0 {
            info!("expired {} idle keypair handle(s)", removed);
        }
        removed
    }
}

impl Default for KeypairStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock a shared keypair, recovering from a poisoned mutex. The keypair
/// types have no invariant a panicking reader could have broken.
pub(crate) fn lock_keypair(keypair: &Arc<Mutex<HybridKeypair>>) -> MutexGuard<'_, HybridKeypair> {
    keypair.lock().unwrap_or_else(|e| e.into_inner())
}
