//! Partition registry: named, non-owning groupings of entry ids.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{MemoryError, MemoryResult};
use crate::types::{Partition, PartitionOptions};

/// Partitions of one namespace, keyed by unique name.
#[derive(Debug, Default)]
pub struct PartitionRegistry {
    partitions: BTreeMap<String, Partition>,
}

impl PartitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_partitions(partitions: impl IntoIterator<Item = Partition>) -> Self {
        Self {
            partitions: partitions
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
        }
    }

    /// Create a partition, failing if the name is taken.
    pub fn create(
        &mut self,
        name: &str,
        opts: &PartitionOptions,
        now: DateTime<Utc>,
    ) -> MemoryResult<&Partition> {
        if self.partitions.contains_key(name) {
            return Err(MemoryError::AlreadyExists(name.to_string()));
        }
        Ok(self
            .partitions
            .entry(name.to_string())
            .or_insert_with(|| Partition::new(name, opts, now)))
    }

    /// Return the named partition, creating it first if needed.
    ///
    /// The flag is true when the partition was created by this call.
    pub fn get_or_create(
        &mut self,
        name: &str,
        opts: &PartitionOptions,
        now: DateTime<Utc>,
    ) -> (&Partition, bool) {
        let created = !self.partitions.contains_key(name);
        let partition = self
            .partitions
            .entry(name.to_string())
            .or_insert_with(|| Partition::new(name, opts, now));
        (partition, created)
    }

    pub fn get(&self, name: &str) -> Option<&Partition> {
        self.partitions.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Partition> {
        self.partitions.remove(name)
    }

    pub fn add_entry(&mut self, name: &str, entry_id: &str) -> bool {
        match self.partitions.get_mut(name) {
            Some(p) => p.entries.insert(entry_id.to_string()),
            None => false,
        }
    }

    /// Drop an entry id from every partition's membership set.
    pub fn remove_entry(&mut self, entry_id: &str) {
        for partition in self.partitions.values_mut() {
            partition.entries.remove(entry_id);
        }
    }

    /// Whether `entry_id` is a member of partition `name`.
    pub fn contains_entry(&self, name: &str, entry_id: &str) -> bool {
        self.partitions
            .get(name)
            .is_some_and(|p| p.entries.contains(entry_id))
    }

    /// Partitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.partitions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Deep copy of every partition, in name order.
    pub fn snapshot(&self) -> Vec<Partition> {
        self.partitions.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rejects_duplicate() {
        let mut reg = PartitionRegistry::new();
        reg.create("p", &PartitionOptions::default(), Utc::now())
            .unwrap();
        let err = reg
            .create("p", &PartitionOptions::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, MemoryError::AlreadyExists(name) if name == "p"));
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut reg = PartitionRegistry::new();
        let (first, created) = reg.get_or_create("p", &PartitionOptions::default(), Utc::now());
        let first_id = first.id.clone();
        assert!(created);

        let (second, created) = reg.get_or_create("p", &PartitionOptions::default(), Utc::now());
        assert!(!created);
        assert_eq!(second.id, first_id);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_membership() {
        let mut reg = PartitionRegistry::new();
        reg.get_or_create("a", &PartitionOptions::default(), Utc::now());
        reg.get_or_create("b", &PartitionOptions::default(), Utc::now());

        assert!(reg.add_entry("a", "e1"));
        assert!(reg.add_entry("b", "e1"));
        assert!(!reg.add_entry("missing", "e1"));
        assert!(reg.contains_entry("a", "e1"));

        reg.remove_entry("e1");
        assert!(!reg.contains_entry("a", "e1"));
        assert!(!reg.contains_entry("b", "e1"));
    }
}
