//! Mutable state guarded by the manager's lock.

use crate::memory::{EntryCache, EntryStore, PartitionRegistry, SearchIndex};
use crate::types::{EntryId, MemoryEntry, Partition};

#[derive(Debug)]
pub(crate) struct MemoryState {
    pub entries: EntryStore,
    pub partitions: PartitionRegistry,
    pub index: SearchIndex,
    /// `None` when caching is disabled.
    pub cache: Option<EntryCache>,
}

impl MemoryState {
    pub fn new(cache: Option<EntryCache>) -> Self {
        Self {
            entries: EntryStore::new(),
            partitions: PartitionRegistry::new(),
            index: SearchIndex::new(),
            cache,
        }
    }

    /// Id of the oldest entry with `key`, restricted to members of
    /// `partition` when one is given.
    pub fn first_match(&self, key: &str, partition: Option<&str>) -> Option<EntryId> {
        self.entries
            .with_key(key)
            .find(|e| partition.map_or(true, |p| self.partitions.contains_entry(p, &e.id)))
            .map(|e| e.id.clone())
    }

    /// Whether entries of partition `name` belong in the search index.
    pub fn is_indexed(&self, name: &str) -> bool {
        self.partitions.get(name).map_or(true, |p| p.indexed)
    }

    /// Swap in a complete entry and partition set, dropping cached reads.
    pub fn replace_all(&mut self, entries: Vec<MemoryEntry>, partitions: Vec<Partition>) {
        self.entries = EntryStore::from_entries(entries);
        self.partitions = PartitionRegistry::from_partitions(partitions);
        self.rebuild_index();
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    pub fn rebuild_index(&mut self) {
        let Self {
            entries,
            partitions,
            index,
            ..
        } = self;
        index.rebuild(
            entries
                .iter()
                .filter(|e| partitions.get(&e.partition).map_or(true, |p| p.indexed)),
        );
    }
}
