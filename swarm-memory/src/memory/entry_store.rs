//! Canonical entry storage.
//!
//! Entries are kept in insertion order under a monotonic sequence number so
//! "first entry matching a key" is deterministic. Serialized sizes are cached
//! per entry and summed into a running total used by admission control.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::{EntryId, MemoryEntry};

/// Owner of every [`MemoryEntry`] in a namespace.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: BTreeMap<u64, MemoryEntry>,
    ids: HashMap<EntryId, u64>,
    keys: HashMap<String, BTreeSet<u64>>,
    sizes: HashMap<u64, u64>,
    total_bytes: u64,
    next_seq: u64,
}

impl EntryStore {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            ..Self::default()
        }
    }

    /// Rebuild from a list of entries, keeping their order.
    pub fn from_entries(entries: impl IntoIterator<Item = MemoryEntry>) -> Self {
        let mut store = Self::new();
        for entry in entries {
            store.insert(entry);
        }
        store
    }

    /// Insert a new entry, replacing any entry with the same id.
    pub fn insert(&mut self, entry: MemoryEntry) -> u64 {
        if self.ids.contains_key(&entry.id) {
            self.remove(&entry.id);
        }
        let seq = self.next_seq;
        self.next_seq += 1;

        let size = entry.serialized_size();
        self.total_bytes += size;
        self.sizes.insert(seq, size);
        self.ids.insert(entry.id.clone(), seq);
        self.keys.entry(entry.key.clone()).or_default().insert(seq);
        self.entries.insert(seq, entry);
        seq
    }

    /// Replace an existing entry in place, keeping its position.
    ///
    /// Returns false if the id is unknown.
    pub fn replace(&mut self, entry: MemoryEntry) -> bool {
        let Some(&seq) = self.ids.get(&entry.id) else {
            return false;
        };
        if let Some(old) = self.entries.get(&seq) {
            if old.key != entry.key {
                if let Some(set) = self.keys.get_mut(&old.key) {
                    set.remove(&seq);
                    if set.is_empty() {
                        self.keys.remove(&old.key);
                    }
                }
                self.keys.entry(entry.key.clone()).or_default().insert(seq);
            }
        }
        let size = entry.serialized_size();
        let old_size = self.sizes.insert(seq, size).unwrap_or(0);
        self.total_bytes = self.total_bytes - old_size + size;
        self.entries.insert(seq, entry);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<MemoryEntry> {
        let seq = self.ids.remove(id)?;
        let entry = self.entries.remove(&seq)?;
        if let Some(set) = self.keys.get_mut(&entry.key) {
            set.remove(&seq);
            if set.is_empty() {
                self.keys.remove(&entry.key);
            }
        }
        self.total_bytes -= self.sizes.remove(&seq).unwrap_or(0);
        Some(entry)
    }

    pub fn get(&self, id: &str) -> Option<&MemoryEntry> {
        self.ids.get(id).and_then(|seq| self.entries.get(seq))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// Entries with `key`, oldest first.
    pub fn with_key<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a MemoryEntry> + 'a {
        self.keys
            .get(key)
            .into_iter()
            .flat_map(|seqs| seqs.iter())
            .filter_map(|seq| self.entries.get(seq))
    }

    /// All entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.values()
    }

    /// Insertion sequence of an entry, for stable tie-breaking.
    pub fn seq_of(&self, id: &str) -> Option<u64> {
        self.ids.get(id).copied()
    }

    pub fn size_of(&self, id: &str) -> u64 {
        self.ids
            .get(id)
            .and_then(|seq| self.sizes.get(seq))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of serialized sizes of every stored entry.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deep copy of every entry, oldest first.
    pub fn snapshot(&self) -> Vec<MemoryEntry> {
        self.entries.values().cloned().collect()
    }
}
