//! Deduplicating message store
//!
//! [`MessageTable`] is a separately chained hash table keyed by message id.
//! It doubles its bucket array once the load factor would exceed 0.75 and
//! rehashes every entry in place, so a resize never drops or duplicates an
//! entry. There is no eviction; the table lives as long as the process.
//!
//! [`DedupStore`] puts the table behind a single mutex and exposes the
//! check-then-insert composition as one operation, [`DedupStore::admit`], so
//! two listeners racing on the same id cannot both see it as new.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::message::Message;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Default initial bucket count
pub const DEFAULT_STORE_CAPACITY: usize = 16;

/// Resize once `(len + 1) / capacity` exceeds this ratio
pub const MAX_LOAD_FACTOR: f64 = 0.75;

// ----------------------------------------------------------------------------
// Hashing
// ----------------------------------------------------------------------------

/// How message ids are mapped onto buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStrategy {
    /// Use the id value directly. Fine for dense, well-distributed ids.
    Identity,
    /// Run the id through a 64-bit finalizer before bucketing
    #[default]
    Mixed,
}

impl HashStrategy {
    fn hash(self, id: u64) -> u64 {
        match self {
            HashStrategy::Identity => id,
            HashStrategy::Mixed => {
                // splitmix64 finalizer
                let mut z = id.wrapping_add(0x9E37_79B9_7F4A_7C15);
                z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
                z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
                z ^ (z >> 31)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Message Table
// ----------------------------------------------------------------------------

/// Resizable id → message table with first-writer-wins inserts
#[derive(Debug, Clone)]
pub struct MessageTable {
    buckets: Vec<Vec<(u64, Message)>>,
    len: usize,
    strategy: HashStrategy,
}

impl MessageTable {
    /// Create a table with the given initial bucket count (at least one)
    pub fn with_capacity(capacity: usize, strategy: HashStrategy) -> Self {
        let capacity = capacity.max(1);
        Self {
            buckets: (0..capacity).map(|_| Vec::new()).collect(),
            len: 0,
            strategy,
        }
    }

    /// Number of stored messages
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current bucket count
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.get(id).is_some()
    }

    /// Look up the first-seen message for an id
    pub fn get(&self, id: u64) -> Option<&Message> {
        self.buckets[self.bucket_index(id)]
            .iter()
            .find(|(key, _)| *key == id)
            .map(|(_, message)| message)
    }

    /// Insert if absent. Returns `true` if the entry is new; an existing
    /// entry is left untouched.
    pub fn insert(&mut self, id: u64, message: Message) -> bool {
        if self.contains(id) {
            return false;
        }

        if (self.len as f64 + 1.0) / self.buckets.len() as f64 > MAX_LOAD_FACTOR {
            self.grow();
        }

        let index = self.bucket_index(id);
        self.buckets[index].push((id, message));
        self.len += 1;
        true
    }

    /// Iterate over all stored messages in bucket order
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.buckets.iter().flatten().map(|(_, message)| message)
    }

    fn bucket_index(&self, id: u64) -> usize {
        (self.strategy.hash(id) % self.buckets.len() as u64) as usize
    }

    fn grow(&mut self) {
        let new_capacity = self.buckets.len() * 2;
        let old = std::mem::replace(
            &mut self.buckets,
            (0..new_capacity).map(|_| Vec::new()).collect(),
        );

        for (id, message) in old.into_iter().flatten() {
            let index = self.bucket_index(id);
            self.buckets[index].push((id, message));
        }

        tracing::trace!(capacity = new_capacity, len = self.len, "Message table resized");
    }
}

impl Default for MessageTable {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_STORE_CAPACITY, HashStrategy::default())
    }
}

// ----------------------------------------------------------------------------
// Dedup Store
// ----------------------------------------------------------------------------

/// Outcome of offering a message to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First time this id was seen; the message is now stored
    New,
    /// The id was already present; the store is unchanged
    Duplicate,
}

impl Admission {
    pub fn is_new(self) -> bool {
        matches!(self, Admission::New)
    }
}

/// Thread-safe deduplicating store shared by all listener stages
#[derive(Debug, Default)]
pub struct DedupStore {
    table: Mutex<MessageTable>,
}

impl DedupStore {
    pub fn new(capacity: usize, strategy: HashStrategy) -> Self {
        Self {
            table: Mutex::new(MessageTable::with_capacity(capacity, strategy)),
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.lock().contains(id)
    }

    /// Insert if absent; returns `true` if the entry is new
    pub fn insert(&self, id: u64, message: Message) -> bool {
        self.lock().insert(id, message)
    }

    /// Number of distinct ids seen so far
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Atomically check and insert `message`. When it is new, `on_first_seen`
    /// runs before the lock is released, so whatever it does (e.g. queueing
    /// for forwarding) is ordered the same way admissions are.
    pub fn admit<F>(&self, message: Message, on_first_seen: F) -> Admission
    where
        F: FnOnce(&Message),
    {
        let mut table = self.lock();
        if table.insert(message.id, message) {
            on_first_seen(&message);
            Admission::New
        } else {
            Admission::Duplicate
        }
    }

    /// Copy of the first-seen message for an id
    pub fn get(&self, id: u64) -> Option<Message> {
        self.lock().get(id).copied()
    }

    fn lock(&self) -> MutexGuard<'_, MessageTable> {
        // The table is always left consistent, so a poisoned lock is still usable
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_first_writer_wins() {
        let mut table = MessageTable::default();

        assert!(table.insert(3, Message::new(1, 3, 10)));
        assert!(!table.insert(3, Message::new(1, 3, 99)));

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(3).map(|m| m.data), Some(10));
    }

    #[test]
    fn test_cycling_ids_count_once() {
        let mut table = MessageTable::default();

        for i in 0..10u64 {
            table.insert(i % 5, Message::new(1, i % 5, i));
        }

        assert_eq!(table.len(), 5);
        for id in 0..5 {
            assert!(table.contains(id));
        }
        assert!(!table.contains(5));
    }

    #[test]
    fn test_resize_at_load_factor() {
        let mut table = MessageTable::with_capacity(16, HashStrategy::Identity);

        // 12 / 16 == 0.75 is still allowed
        for id in 0..12 {
            table.insert(id, Message::new(1, id, 0));
        }
        assert_eq!(table.capacity(), 16);

        // 13 / 16 > 0.75 triggers a doubling
        table.insert(12, Message::new(1, 12, 0));
        assert_eq!(table.capacity(), 32);
        assert_eq!(table.len(), 13);
    }

    #[test]
    fn test_resize_preserves_every_entry() {
        for strategy in [HashStrategy::Identity, HashStrategy::Mixed] {
            let mut table = MessageTable::with_capacity(1, strategy);

            for id in 0..1000u64 {
                let key = id.wrapping_mul(0x0001_0000_0001);
                assert!(table.insert(key, Message::new(1, key, id)));
            }

            assert_eq!(table.len(), 1000);
            assert!(table.capacity() >= 1024);
            assert_eq!(table.iter().count(), 1000);

            for id in 0..1000u64 {
                let key = id.wrapping_mul(0x0001_0000_0001);
                assert_eq!(table.get(key).map(|m| m.data), Some(id));
            }
        }
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut table = MessageTable::with_capacity(0, HashStrategy::Mixed);
        assert_eq!(table.capacity(), 1);
        assert!(table.insert(u64::MAX, Message::new(1, u64::MAX, 0)));
        assert!(table.contains(u64::MAX));
    }

    #[test]
    fn test_admit_runs_callback_only_for_new_ids() {
        let store = DedupStore::default();
        let mut forwarded = Vec::new();

        let first = store.admit(Message::new(1, 3, 10), |m| forwarded.push(*m));
        let second = store.admit(Message::new(1, 3, 10), |m| forwarded.push(*m));

        assert_eq!(first, Admission::New);
        assert_eq!(second, Admission::Duplicate);
        assert_eq!(forwarded, vec![Message::new(1, 3, 10)]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_admission_single_winner() {
        const THREADS: usize = 8;
        const IDS: u64 = 500;

        let store = Arc::new(DedupStore::new(16, HashStrategy::Identity));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut won = Vec::new();
                    for id in 0..IDS {
                        if store.admit(Message::new(1, id, 10), |_| {}).is_new() {
                            won.push(id);
                        }
                    }
                    won
                })
            })
            .collect();

        let mut winners = HashSet::new();
        let mut total_wins = 0;
        for handle in handles {
            let won = handle.join().unwrap();
            total_wins += won.len();
            winners.extend(won);
        }

        assert_eq!(total_wins, IDS as usize);
        assert_eq!(winners.len(), IDS as usize);
        assert_eq!(store.len(), IDS as usize);
    }
}
