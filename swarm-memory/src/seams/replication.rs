//! Replication seam.
//!
//! The manager hands every mutated entry to [`ReplicationHook::replicate`]
//! right after the in-memory change. That call must not block: transports
//! queue the entry and ship it on their own schedule. Failures are logged by
//! the manager and never roll back the local write.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::types::MemoryEntry;

/// Options for an on-demand sync with one node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Only exchange entries in these partitions (empty = all).
    pub partitions: Vec<String>,
    /// Send local state only, without pulling remote changes.
    pub push_only: bool,
}

/// Outcome of a sync with one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub node: String,
    pub entries_sent: usize,
    pub entries_received: usize,
}

#[async_trait]
pub trait ReplicationHook: Send + Sync {
    /// Queue `entry` for propagation.
    fn replicate(&self, entry: &MemoryEntry) -> MemoryResult<()>;

    /// Exchange state with `node`. `entries` is the local live set.
    async fn synchronize_with(
        &self,
        node: &str,
        entries: Vec<MemoryEntry>,
        opts: &SyncOptions,
    ) -> MemoryResult<SyncReport>;

    /// Flush and release transport resources.
    async fn shutdown(&self) -> MemoryResult<()> {
        Ok(())
    }
}

/// Replication disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReplication;

#[async_trait]
impl ReplicationHook for NoopReplication {
    fn replicate(&self, _entry: &MemoryEntry) -> MemoryResult<()> {
        Ok(())
    }

    async fn synchronize_with(
        &self,
        node: &str,
        _entries: Vec<MemoryEntry>,
        _opts: &SyncOptions,
    ) -> MemoryResult<SyncReport> {
        Ok(SyncReport {
            node: node.to_string(),
            ..SyncReport::default()
        })
    }
}

/// Records every replicated entry in memory. Useful as a test double and
/// as an outbox for transports that drain it themselves.
#[derive(Debug, Default)]
pub struct RecordingReplication {
    outbox: Mutex<Vec<MemoryEntry>>,
    fail: bool,
}

impl RecordingReplication {
    pub fn new() -> Self {
        Self::default()
    }

    /// A hook whose every call fails.
    pub fn failing() -> Self {
        Self {
            outbox: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Take everything queued so far.
    pub fn drain(&self) -> Vec<MemoryEntry> {
        self.outbox
            .lock()
            .map(|mut q| std::mem::take(&mut *q))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.outbox.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReplicationHook for RecordingReplication {
    fn replicate(&self, entry: &MemoryEntry) -> MemoryResult<()> {
        if self.fail {
            return Err(MemoryError::Replication("transport unavailable".to_string()));
        }
        self.outbox
            .lock()
            .map_err(|_| MemoryError::LockPoisoned)?
            .push(entry.clone());
        Ok(())
    }

    async fn synchronize_with(
        &self,
        node: &str,
        entries: Vec<MemoryEntry>,
        opts: &SyncOptions,
    ) -> MemoryResult<SyncReport> {
        if self.fail {
            return Err(MemoryError::Replication(format!("{} unreachable", node)));
        }
        let selected: Vec<_> = entries
            .into_iter()
            .filter(|e| opts.partitions.is_empty() || opts.partitions.contains(&e.partition))
            .collect();
        let sent = selected.len();
        self.outbox
            .lock()
            .map_err(|_| MemoryError::LockPoisoned)?
            .extend(selected);
        Ok(SyncReport {
            node: node.to_string(),
            entries_sent: sent,
            entries_received: 0,
        })
    }
}
