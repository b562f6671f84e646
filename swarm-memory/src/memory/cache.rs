//! Bounded read-through cache keyed by logical entry key.
//!
//! Eviction is insertion-order FIFO, not LRU: when full, the key that was
//! first inserted (and is still tracked) goes, regardless of reads. Re-setting
//! a tracked key refreshes its value and expiry but keeps its queue position.
//! Expiry is checked lazily on `get`; there is no background sweep.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::MemoryEntry;

#[derive(Debug, Clone)]
struct CacheSlot {
    entry: MemoryEntry,
    expires_at: DateTime<Utc>,
}

/// FIFO cache of entries with an absolute per-slot expiry.
#[derive(Debug)]
pub struct EntryCache {
    slots: HashMap<String, CacheSlot>,
    order: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl EntryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            slots: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up `key`, dropping the slot if it has expired.
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<&MemoryEntry> {
        let expired = match self.slots.get(key) {
            None => {
                self.misses += 1;
                return None;
            }
            Some(slot) => slot.expires_at <= now || slot.entry.is_expired(now),
        };
        if expired {
            self.remove(key);
            self.misses += 1;
            return None;
        }
        self.hits += 1;
        self.slots.get(key).map(|slot| &slot.entry)
    }

    pub fn set(&mut self, key: &str, entry: MemoryEntry, now: DateTime<Utc>) {
        if self.capacity == 0 {
            return;
        }
        let ttl = chrono::Duration::from_std(self.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let expires_at = now + ttl;
        let slot = CacheSlot { entry, expires_at };

        if let Some(existing) = self.slots.get_mut(key) {
            *existing = slot;
            return;
        }
        while self.slots.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.slots.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.to_string());
        self.slots.insert(key.to_string(), slot);
    }

    pub fn remove(&mut self, key: &str) -> bool {
        if self.slots.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    /// Drop the slot holding `entry_id`, whatever its key.
    pub fn remove_entry(&mut self, entry_id: &str) {
        let keys: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.entry.id == entry_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            self.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// (hits, misses) since creation.
    pub fn hit_stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
