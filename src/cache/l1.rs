//! L1 Cache - In-Memory Hot Tier
//!
//! Bounded map of decoded entries with strict LRU eviction. Every read or
//! write of a key refreshes its recency; inserting a new key into a full
//! tier drops exactly the least recently accessed entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::entry::CacheEntry;
use super::policy::{lru_victim, Recency};

struct Slot<V> {
    entry: Arc<CacheEntry<V>>,
    seq: u64,
}

struct L1State<V> {
    slots: HashMap<String, Slot<V>>,
    next_seq: u64,
}

impl<V> L1State<V> {
    fn touch(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Result of an L1 lookup
#[derive(Debug)]
pub enum L1Lookup<V> {
    /// Live entry; recency already updated
    Hit(Arc<CacheEntry<V>>),
    /// Entry was past `expires_at` and has been removed
    Expired,
    Miss,
}

/// L1 Cache - in-memory LRU tier
pub struct L1Cache<V> {
    state: Mutex<L1State<V>>,
    max_entries: usize,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V> L1Cache<V> {
    /// Create an L1 tier holding at most `max_entries` items
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(L1State {
                slots: HashMap::with_capacity(max_entries.min(4096)),
                next_seq: 0,
            }),
            max_entries: max_entries.max(1),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Look up `key` at `now`, removing it if expired
    pub fn get(&self, key: &str, now: u64) -> L1Lookup<V> {
        let mut state = self.state.lock();

        let expired = match state.slots.get(key) {
            None => return L1Lookup::Miss,
            Some(slot) => slot.entry.is_expired(now),
        };

        if expired {
            state.slots.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            return L1Lookup::Expired;
        }

        let seq = state.touch();
        match state.slots.get_mut(key) {
            Some(slot) => {
                slot.entry.record_access(now);
                slot.seq = seq;
                L1Lookup::Hit(Arc::clone(&slot.entry))
            }
            None => L1Lookup::Miss,
        }
    }

    /// Return the entry without touching recency or expiring it
    pub fn peek(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
        self.state
            .lock()
            .slots
            .get(key)
            .map(|slot| Arc::clone(&slot.entry))
    }

    /// Insert or replace an entry, accessed at `now`.
    ///
    /// Returns the key evicted to make room, if any.
    pub fn insert(&self, entry: CacheEntry<V>, now: u64) -> Option<String> {
        entry.record_access(now);
        let key = entry.key().to_string();

        let mut state = self.state.lock();
        let seq = state.touch();

        let mut evicted = None;
        if !state.slots.contains_key(&key) && state.slots.len() >= self.max_entries {
            let victim = lru_victim(state.slots.iter().map(|(k, slot)| {
                (
                    k.as_str(),
                    Recency {
                        last_accessed: slot.entry.last_accessed(),
                        seq: slot.seq,
                    },
                )
            }))
            .map(str::to_string);

            if let Some(victim) = victim {
                state.slots.remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                evicted = Some(victim);
            }
        }

        state.slots.insert(
            key,
            Slot {
                entry: Arc::new(entry),
                seq,
            },
        );
        evicted
    }

    /// Remove an entry
    pub fn remove(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
        self.state.lock().slots.remove(key).map(|slot| slot.entry)
    }

    /// Check if the tier holds `key` (expired or not)
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().slots.contains_key(key)
    }

    /// Keys currently held, in no particular order
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().slots.keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.state.lock().slots.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Entries dropped to respect the bound
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Entries removed because they were found expired
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================
