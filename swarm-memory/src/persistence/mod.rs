//! Durable state: the current-state snapshot and checksum-verified backups.

pub mod backup;
pub mod store;

pub use backup::{compute_checksum, Backup, BackupMetadata, BackupSummary, FORMAT_VERSION};
pub use store::{PersistenceStore, StateDocument};
