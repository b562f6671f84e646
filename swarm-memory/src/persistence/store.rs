//! File-backed persistence: one current-state document plus one document per
//! backup.
//!
//! ```text
//! <root>/
//!   state.json            overwritten on every sync
//!   backups/<id>.json     one per backup, never rewritten
//! ```
//!
//! There is no write-ahead log. `state.json` is replaced via a temporary
//! sibling and a rename, so a crash leaves either the old or the new
//! document, but the most recent sync can be lost.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::backup::{Backup, BackupSummary, FORMAT_VERSION};
use crate::error::{MemoryError, MemoryResult};
use crate::types::{BackupId, MemoryEntry, Partition};

const STATE_FILE: &str = "state.json";
const BACKUP_DIR: &str = "backups";

/// Current-state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub namespace: String,
    pub version: String,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<MemoryEntry>,
    pub partitions: Vec<Partition>,
}

impl StateDocument {
    pub fn new(
        namespace: &str,
        saved_at: DateTime<Utc>,
        entries: Vec<MemoryEntry>,
        partitions: Vec<Partition>,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            version: FORMAT_VERSION.to_string(),
            saved_at,
            entries,
            partitions,
        }
    }
}

/// Reads and writes persisted documents under one root directory.
#[derive(Debug)]
pub struct PersistenceStore {
    root: PathBuf,
    closed: AtomicBool,
}

impl PersistenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    /// Path of a backup document. Ids with path separators are rejected.
    pub fn backup_path(&self, id: &str) -> MemoryResult<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(MemoryError::NotFound(format!("backup {}", id)));
        }
        Ok(self.backup_dir().join(format!("{}.json", id)))
    }

    /// Overwrite `state.json`.
    pub async fn save_state(&self, doc: &StateDocument) -> MemoryResult<()> {
        self.ensure_open()?;
        tokio::fs::create_dir_all(&self.root).await?;

        let json = serde_json::to_vec_pretty(doc)?;
        let target = self.state_path();
        let tmp = self.root.join(format!("{}.tmp", STATE_FILE));
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &target).await?;

        debug!(
            path = %target.display(),
            entries = doc.entries.len(),
            bytes = json.len(),
            "State saved"
        );
        Ok(())
    }

    /// Load `state.json`, or `None` if it has never been written.
    pub async fn load_state(&self) -> MemoryResult<Option<StateDocument>> {
        let path = self.state_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc: StateDocument = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), entries = doc.entries.len(), "State loaded");
        Ok(Some(doc))
    }

    pub async fn save_backup(&self, backup: &Backup) -> MemoryResult<PathBuf> {
        self.ensure_open()?;
        tokio::fs::create_dir_all(self.backup_dir()).await?;

        let path = self.backup_path(&backup.id)?;
        let json = serde_json::to_vec_pretty(backup)?;
        tokio::fs::write(&path, json).await?;

        info!(backup_id = %backup.id, path = %path.display(), "Backup written");
        Ok(path)
    }

    pub async fn load_backup(&self, id: &str) -> MemoryResult<Backup> {
        let path = self.backup_path(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MemoryError::NotFound(format!("backup {}", id)))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Summaries of every readable backup, newest first.
    pub async fn list_backups(&self) -> MemoryResult<Vec<BackupSummary>> {
        let mut dir = match tokio::fs::read_dir(self.backup_dir()).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(MemoryError::from)
                .and_then(|bytes| serde_json::from_slice::<Backup>(&bytes).map_err(MemoryError::from));
            match parsed {
                Ok(backup) => summaries.push(backup.summary()),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable backup"),
            }
        }

        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(summaries)
    }

    /// Remove a backup document. Returns false if it did not exist.
    pub async fn delete_backup(&self, id: &str) -> MemoryResult<bool> {
        let path = self.backup_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete all but the newest `keep` backups. Returns the deleted ids.
    pub async fn prune_backups(&self, keep: usize) -> MemoryResult<Vec<BackupId>> {
        let backups = self.list_backups().await?;
        let mut deleted = Vec::new();
        for summary in backups.into_iter().skip(keep) {
            if self.delete_backup(&summary.id).await? {
                deleted.push(summary.id);
            }
        }
        if !deleted.is_empty() {
            info!(count = deleted.len(), keep, "Pruned old backups");
        }
        Ok(deleted)
    }

    /// Refuse further writes. Reads stay available.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> MemoryResult<()> {
        if self.is_closed() {
            return Err(MemoryError::Io(std::io::Error::other(format!(
                "persistence store at {} is closed",
                self.root.display()
            ))));
        }
        Ok(())
    }
}
