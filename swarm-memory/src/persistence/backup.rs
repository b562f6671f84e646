//! Backup documents and content checksums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::types::{BackupId, MemoryEntry, Partition};

/// Version tag written into every persisted document.
pub const FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Descriptive fields stored alongside a backup. Not covered by the checksum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub namespace: String,
    pub entry_count: usize,
    pub partition_count: usize,
    pub total_size: u64,
}

/// Full deep copy of a namespace at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub id: BackupId,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    /// BLAKE3 hex digest, see [`compute_checksum`].
    pub checksum: String,
    pub metadata: BackupMetadata,
    pub entries: Vec<MemoryEntry>,
    pub partitions: Vec<Partition>,
}

impl Backup {
    /// Build a backup and stamp its checksum.
    pub fn new(
        namespace: &str,
        timestamp: DateTime<Utc>,
        entries: Vec<MemoryEntry>,
        partitions: Vec<Partition>,
    ) -> MemoryResult<Self> {
        let checksum = compute_checksum(&entries, &partitions)?;
        let metadata = BackupMetadata {
            namespace: namespace.to_string(),
            entry_count: entries.len(),
            partition_count: partitions.len(),
            total_size: entries.iter().map(MemoryEntry::serialized_size).sum(),
        };
        Ok(Self {
            id: new_backup_id(timestamp),
            timestamp,
            version: FORMAT_VERSION.to_string(),
            checksum,
            metadata,
            entries,
            partitions,
        })
    }

    /// Recompute the checksum and compare it with the stored one.
    pub fn verify(&self) -> MemoryResult<()> {
        let actual = compute_checksum(&self.entries, &self.partitions)?;
        if actual != self.checksum {
            return Err(MemoryError::IntegrityError {
                backup_id: self.id.clone(),
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn summary(&self) -> BackupSummary {
        BackupSummary {
            id: self.id.clone(),
            timestamp: self.timestamp,
            version: self.version.clone(),
            checksum: self.checksum.clone(),
            entry_count: self.entries.len(),
            partition_count: self.partitions.len(),
        }
    }
}

/// Listing row for a stored backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSummary {
    pub id: BackupId,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub checksum: String,
    pub entry_count: usize,
    pub partition_count: usize,
}

/// BLAKE3 over the JSON of entries sorted by id and partitions sorted by
/// name, so the digest does not depend on in-memory ordering.
pub fn compute_checksum(entries: &[MemoryEntry], partitions: &[Partition]) -> MemoryResult<String> {
    let mut entries: Vec<&MemoryEntry> = entries.iter().collect();
    entries.sort_by(|a, b| a.id.cmp(&b.id));
    let mut partitions: Vec<&Partition> = partitions.iter().collect();
    partitions.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = blake3::Hasher::new();
    hasher.update(&serde_json::to_vec(&entries)?);
    hasher.update(&serde_json::to_vec(&partitions)?);
    Ok(hasher.finalize().to_hex().to_string())
}

/// Ids sort lexically in creation order.
fn new_backup_id(timestamp: DateTime<Utc>) -> BackupId {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "backup-{}-{}",
        timestamp.format("%Y%m%dT%H%M%S%3fZ"),
        &suffix[..8]
    )
}
