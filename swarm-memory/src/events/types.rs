//! Memory audit events
//!
//! Every mutating operation and lifecycle transition publishes one of these,
//! carrying the ids and actor needed to reconstruct an audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgentId, BackupId, EntryId, PartitionId};

/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteReason {
    /// `delete` called by a client
    Explicit,
    /// TTL elapsed (read path or cleanup sweep)
    Expired,
    /// Admission control made room for a new write
    Evicted,
    /// Owning partition was deleted
    PartitionDropped,
}

/// All memory events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryEvent {
    EntryStored {
        entry_id: EntryId,
        key: String,
        partition: String,
        actor: Option<AgentId>,
        timestamp: DateTime<Utc>,
    },

    EntryRetrieved {
        entry_id: EntryId,
        key: String,
        actor: Option<AgentId>,
        from_cache: bool,
        timestamp: DateTime<Utc>,
    },

    EntryUpdated {
        entry_id: EntryId,
        key: String,
        version: u64,
        actor: Option<AgentId>,
        timestamp: DateTime<Utc>,
    },

    EntryDeleted {
        entry_id: EntryId,
        key: String,
        actor: Option<AgentId>,
        reason: DeleteReason,
        timestamp: DateTime<Utc>,
    },

    PartitionCreated {
        partition_id: PartitionId,
        name: String,
        timestamp: DateTime<Utc>,
    },

    PartitionDeleted {
        partition_id: PartitionId,
        name: String,
        entries_removed: usize,
        timestamp: DateTime<Utc>,
    },

    BackupCreated {
        backup_id: BackupId,
        entry_count: usize,
        checksum: String,
        timestamp: DateTime<Utc>,
    },

    BackupRestored {
        backup_id: BackupId,
        entry_count: usize,
        timestamp: DateTime<Utc>,
    },

    MemoryShared {
        source_id: EntryId,
        entry_id: EntryId,
        target: AgentId,
        actor: Option<AgentId>,
        timestamp: DateTime<Utc>,
    },

    MemoryBroadcasted {
        source_id: EntryId,
        entry_ids: Vec<EntryId>,
        targets: Vec<AgentId>,
        actor: Option<AgentId>,
        timestamp: DateTime<Utc>,
    },

    ReplicationReceived {
        entry_id: EntryId,
        from_node: String,
        applied: bool,
        timestamp: DateTime<Utc>,
    },

    ManagerInitialized {
        namespace: String,
        entries_loaded: usize,
        timestamp: DateTime<Utc>,
    },

    ManagerShutdown {
        namespace: String,
        timestamp: DateTime<Utc>,
    },
}

impl MemoryEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MemoryEvent::EntryStored { timestamp, .. }
            | MemoryEvent::EntryRetrieved { timestamp, .. }
            | MemoryEvent::EntryUpdated { timestamp, .. }
            | MemoryEvent::EntryDeleted { timestamp, .. }
            | MemoryEvent::PartitionCreated { timestamp, .. }
            | MemoryEvent::PartitionDeleted { timestamp, .. }
            | MemoryEvent::BackupCreated { timestamp, .. }
            | MemoryEvent::BackupRestored { timestamp, .. }
            | MemoryEvent::MemoryShared { timestamp, .. }
            | MemoryEvent::MemoryBroadcasted { timestamp, .. }
            | MemoryEvent::ReplicationReceived { timestamp, .. }
            | MemoryEvent::ManagerInitialized { timestamp, .. }
            | MemoryEvent::ManagerShutdown { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            MemoryEvent::EntryStored { .. } => "entry_stored",
            MemoryEvent::EntryRetrieved { .. } => "entry_retrieved",
            MemoryEvent::EntryUpdated { .. } => "entry_updated",
            MemoryEvent::EntryDeleted { .. } => "entry_deleted",
            MemoryEvent::PartitionCreated { .. } => "partition_created",
            MemoryEvent::PartitionDeleted { .. } => "partition_deleted",
            MemoryEvent::BackupCreated { .. } => "backup_created",
            MemoryEvent::BackupRestored { .. } => "backup_restored",
            MemoryEvent::MemoryShared { .. } => "memory_shared",
            MemoryEvent::MemoryBroadcasted { .. } => "memory_broadcasted",
            MemoryEvent::ReplicationReceived { .. } => "replication_received",
            MemoryEvent::ManagerInitialized { .. } => "manager_initialized",
            MemoryEvent::ManagerShutdown { .. } => "manager_shutdown",
        }
    }

    /// Get the entry ID if this event is entry-scoped
    pub fn entry_id(&self) -> Option<&str> {
        match self {
            MemoryEvent::EntryStored { entry_id, .. }
            | MemoryEvent::EntryRetrieved { entry_id, .. }
            | MemoryEvent::EntryUpdated { entry_id, .. }
            | MemoryEvent::EntryDeleted { entry_id, .. }
            | MemoryEvent::MemoryShared { entry_id, .. }
            | MemoryEvent::ReplicationReceived { entry_id, .. } => Some(entry_id),
            MemoryEvent::MemoryBroadcasted { source_id, .. } => Some(source_id),
            _ => None,
        }
    }

    /// Get the acting agent, if one was supplied
    pub fn actor(&self) -> Option<&str> {
        match self {
            MemoryEvent::EntryStored { actor, .. }
            | MemoryEvent::EntryRetrieved { actor, .. }
            | MemoryEvent::EntryUpdated { actor, .. }
            | MemoryEvent::EntryDeleted { actor, .. }
            | MemoryEvent::MemoryShared { actor, .. }
            | MemoryEvent::MemoryBroadcasted { actor, .. } => actor.as_deref(),
            _ => None,
        }
    }
}
