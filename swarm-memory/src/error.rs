//! Memory error taxonomy.
//!
//! One typed variant per failure class of the memory layer. "Not found" on
//! update/delete is reported as `Ok(false)` by the manager, not as an error;
//! share and restore of a missing source return [`MemoryError::NotFound`].

use serde::{Deserialize, Serialize};

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

/// High-level classification of a [`MemoryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryErrorKind {
    /// Operation called before `initialize`.
    NotInitialized,
    /// Key, partition, or backup does not exist.
    NotFound,
    /// Serialized entry is larger than `max_entry_size`.
    SizeExceeded,
    /// Admission control could not free enough space.
    MemoryFull,
    /// Partition name already taken.
    AlreadyExists,
    /// Partition still holds entries and deletion was not forced.
    NotEmpty,
    /// Backup checksum did not re-validate.
    IntegrityError,
    /// Access policy denied the actor.
    AccessDenied,
    /// Write into a read-only partition.
    PartitionReadOnly,
    /// Partition entry cap reached.
    PartitionFull,
    /// Configuration rejected by validation.
    InvalidConfig,
    /// Encryption/compression or payload decoding failed.
    Codec,
    /// JSON (de)serialization failed.
    Serialization,
    /// Filesystem failure.
    Io,
    /// Replication transport failure.
    Replication,
    /// Internal lock poisoned by a panicking thread.
    LockPoisoned,
}

impl MemoryErrorKind {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::MemoryFull | Self::Io | Self::Replication | Self::LockPoisoned
        )
    }

    /// Suggested action for this error kind.
    pub fn suggested_action(self) -> &'static str {
        match self {
            Self::NotInitialized => "call initialize() before using the manager",
            Self::NotFound => "check the key, partition, or backup id",
            Self::SizeExceeded => "split the value or raise max_entry_size",
            Self::MemoryFull => "delete system entries or raise max_memory_size",
            Self::AlreadyExists => "use get_or_create_partition or pick another name",
            Self::NotEmpty => "delete the entries first or pass force=true",
            Self::IntegrityError => "restore from a different backup",
            Self::AccessDenied => "retry as an actor the access policy allows",
            Self::PartitionReadOnly => "write to a different partition",
            Self::PartitionFull => "delete entries from the partition or raise max_size",
            Self::InvalidConfig => "fix the configuration and recreate the manager",
            Self::Codec => "check the encryption key and codec configuration",
            Self::Serialization => "check that the value is JSON-serializable",
            Self::Io => "check storage health and retry",
            Self::Replication => "retry on the next sync or check the remote node",
            Self::LockPoisoned => "restart the manager",
        }
    }
}

impl std::fmt::Display for MemoryErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotInitialized => "not_initialized",
            Self::NotFound => "not_found",
            Self::SizeExceeded => "size_exceeded",
            Self::MemoryFull => "memory_full",
            Self::AlreadyExists => "already_exists",
            Self::NotEmpty => "not_empty",
            Self::IntegrityError => "integrity_error",
            Self::AccessDenied => "access_denied",
            Self::PartitionReadOnly => "partition_read_only",
            Self::PartitionFull => "partition_full",
            Self::InvalidConfig => "invalid_config",
            Self::Codec => "codec",
            Self::Serialization => "serialization",
            Self::Io => "io",
            Self::Replication => "replication",
            Self::LockPoisoned => "lock_poisoned",
        };
        write!(f, "{}", s)
    }
}

/// Error type for memory operations
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("memory namespace '{0}' is not initialized")]
    NotInitialized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("entry size {size} bytes exceeds limit of {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("memory full: need {required} bytes, budget is {limit} bytes")]
    MemoryFull { required: u64, limit: u64 },

    #[error("partition already exists: {0}")]
    AlreadyExists(String),

    #[error("partition '{partition}' still holds {entries} entries")]
    NotEmpty { partition: String, entries: usize },

    #[error("backup {backup_id} failed integrity check (expected {expected}, computed {actual})")]
    IntegrityError {
        backup_id: String,
        expected: String,
        actual: String,
    },

    #[error("access denied: {actor} may not {action} {target}")]
    AccessDenied {
        actor: String,
        action: String,
        target: String,
    },

    #[error("partition '{0}' is read-only")]
    PartitionReadOnly(String),

    #[error("partition '{partition}' is full ({max_size} entries)")]
    PartitionFull { partition: String, max_size: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("replication error: {0}")]
    Replication(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

impl MemoryError {
    /// Classify this error.
    pub fn kind(&self) -> MemoryErrorKind {
        match self {
            Self::NotInitialized(_) => MemoryErrorKind::NotInitialized,
            Self::NotFound(_) => MemoryErrorKind::NotFound,
            Self::SizeExceeded { .. } => MemoryErrorKind::SizeExceeded,
            Self::MemoryFull { .. } => MemoryErrorKind::MemoryFull,
            Self::AlreadyExists(_) => MemoryErrorKind::AlreadyExists,
            Self::NotEmpty { .. } => MemoryErrorKind::NotEmpty,
            Self::IntegrityError { .. } => MemoryErrorKind::IntegrityError,
            Self::AccessDenied { .. } => MemoryErrorKind::AccessDenied,
            Self::PartitionReadOnly(_) => MemoryErrorKind::PartitionReadOnly,
            Self::PartitionFull { .. } => MemoryErrorKind::PartitionFull,
            Self::InvalidConfig(_) => MemoryErrorKind::InvalidConfig,
            Self::Codec(_) => MemoryErrorKind::Codec,
            Self::Serialization(_) => MemoryErrorKind::Serialization,
            Self::Io(_) => MemoryErrorKind::Io,
            Self::Replication(_) => MemoryErrorKind::Replication,
            Self::LockPoisoned => MemoryErrorKind::LockPoisoned,
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub(crate) fn access_denied(actor: &str, action: &str, target: &str) -> Self {
        Self::AccessDenied {
            actor: actor.to_string(),
            action: action.to_string(),
            target: target.to_string(),
        }
    }
}
