//! Access-control seam.

use crate::types::{MemoryEntry, Partition};

/// Decides whether an agent may act on an entry or partition.
///
/// Calls without an actor are not checked.
pub trait AccessPolicy: Send + Sync {
    fn can_read(&self, actor: &str, entry: &MemoryEntry) -> bool;

    fn can_write(&self, actor: &str, partition: &Partition, entry: Option<&MemoryEntry>) -> bool;

    fn can_delete(&self, actor: &str, entry: &MemoryEntry) -> bool;
}

/// Policy that permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_read(&self, _actor: &str, _entry: &MemoryEntry) -> bool {
        true
    }

    fn can_write(&self, _actor: &str, _partition: &Partition, _entry: Option<&MemoryEntry>) -> bool {
        true
    }

    fn can_delete(&self, _actor: &str, _entry: &MemoryEntry) -> bool {
        true
    }
}
