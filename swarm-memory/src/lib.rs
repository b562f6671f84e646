//! Swarm Memory Library
//!
//! Shared, namespaced memory for agent swarms:
//! - Versioned key/value entries with TTL, tags, ownership, and access levels
//! - Partitions grouping entries, with cascading delete
//! - Read-through FIFO cache and an inverted term index for search
//! - Admission control that keeps every namespace under its byte budget
//! - Checksum-verified backups and a periodically synced state file
//! - Sharing and broadcasting entries between agents as independent copies
//!
//! # Seams
//!
//! Access control ([`AccessPolicy`]), value codecs ([`CompressionCodec`],
//! [`EncryptionCodec`]), and replication ([`ReplicationHook`]) are traits
//! with permissive/identity defaults. Install your own through
//! [`MemoryManager::builder`].
//!
//! # Usage
//!
//! ```no_run
//! use swarm_memory::{MemoryConfig, MemoryManager, RetrieveOptions, StoreOptions};
//!
//! # async fn run() -> swarm_memory::MemoryResult<()> {
//! let manager = MemoryManager::new(MemoryConfig::for_namespace("ns1"))?;
//! manager.initialize().await?;
//!
//! manager.store("cfg", &serde_json::json!({"a": 1}), StoreOptions::new())?;
//! let value = manager.retrieve("cfg", RetrieveOptions::new())?;
//! assert_eq!(value, Some(serde_json::json!({"a": 1})));
//!
//! manager.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod memory;
pub mod persistence;
pub mod seams;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConsistencyLevel, MemoryConfig};
pub use error::{MemoryError, MemoryErrorKind, MemoryResult};

// Re-export manager API
pub use manager::{
    DeleteOptions, ExportFormat, MemoryExport, MemoryManager, MemoryManagerBuilder,
    RetrieveOptions, ShareOptions, StoreOptions, UpdateOptions,
};

// Re-export query, search, and statistics types
pub use memory::{MemoryQuery, MemorySearchOptions, MemoryStatistics, SortField, SortOrder};

// Re-export events
pub use events::{DeleteReason, EventBus, EventBusExt, EventFilter, MemoryEvent, SharedEventBus};

// Re-export persistence types
pub use persistence::{Backup, BackupSummary};

// Re-export seams
pub use seams::{
    AccessPolicy, AllowAll, CompressionCodec, EncryptionCodec, IdentityCodec, NoopReplication,
    RecordingReplication, ReplicationHook, SyncOptions, SyncReport,
};

pub use types::{
    AccessLevel, AgentId, BackupId, EntryId, EntrySnapshot, EntryType, MemoryEntry,
    NamespaceInfo, Partition, PartitionId, PartitionOptions, DEFAULT_PARTITION,
    MAX_PREVIOUS_VERSIONS,
};
