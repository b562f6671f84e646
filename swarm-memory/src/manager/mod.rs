//! Memory manager: the public API of one namespace.
//!
//! All in-memory operations are synchronous and run under a single lock.
//! Only persistence, backup, and replication I/O is async. Admission control
//! runs inside every write, so the byte budget holds even when the cleanup
//! loop lags behind.
//!
//! Write path: access check → partition → encode → size check → admission
//! control → insert → index → cache → replicate → event.
//! Read path: cache → entry store (partition filter) → expiry → access check
//! → cache fill → event.

mod builder;
pub mod export;
pub mod options;
pub mod scheduler;
mod state;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

pub use builder::MemoryManagerBuilder;
pub use export::{ExportFormat, MemoryExport};
pub use options::{DeleteOptions, RetrieveOptions, ShareOptions, StoreOptions, UpdateOptions};
pub use scheduler::{SchedulePlan, Scheduler};

use self::state::MemoryState;
use crate::clock::SharedClock;
use crate::config::{ConsistencyLevel, MemoryConfig};
use crate::error::{MemoryError, MemoryResult};
use crate::events::{DeleteReason, MemoryEvent, SharedEventBus};
use crate::memory::{MatchMode, MemoryQuery, MemorySearchOptions, MemoryStatistics};
use crate::persistence::{Backup, BackupSummary, PersistenceStore, StateDocument};
use crate::seams::{AccessPolicy, ReplicationHook, SyncOptions, SyncReport, ValueCodec};
use crate::types::{
    AccessLevel, AgentId, BackupId, EntryId, EntrySnapshot, EntryType, MemoryEntry,
    NamespaceInfo, Partition, PartitionOptions, DEFAULT_PARTITION,
};

/// Prefix of the per-agent partitions that receive shared copies.
pub const SHARED_PARTITION_PREFIX: &str = "shared_";

/// Name of the partition holding copies shared with `agent`.
pub fn shared_partition_name(agent: &str) -> String {
    format!("{}{}", SHARED_PARTITION_PREFIX, agent)
}

/// Partition settings that shape a write.
#[derive(Debug, Clone, Copy)]
struct WriteRules {
    partition_type: EntryType,
    ttl_ms: Option<u64>,
    compressed: bool,
    indexed: bool,
}

impl WriteRules {
    fn of(partition: &Partition) -> Self {
        Self {
            partition_type: partition.partition_type,
            ttl_ms: partition.ttl_ms,
            compressed: partition.compressed,
            indexed: partition.indexed,
        }
    }
}

/// Shared memory for one namespace.
pub struct MemoryManager {
    config: MemoryConfig,
    clock: SharedClock,
    codec: ValueCodec,
    access: Arc<dyn AccessPolicy>,
    replication: Arc<dyn ReplicationHook>,
    persistence: Option<PersistenceStore>,
    events: SharedEventBus,
    state: Mutex<MemoryState>,
    initialized: AtomicBool,
    scheduler: Mutex<Option<Scheduler>>,
}

impl MemoryManager {
    pub fn builder(config: MemoryConfig) -> MemoryManagerBuilder {
        MemoryManagerBuilder::new(config)
    }

    /// Build with default seams.
    pub fn new(config: MemoryConfig) -> MemoryResult<Arc<Self>> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load persisted state, seed the default partitions, and start the
    /// background loops. Calling it again is a no-op.
    pub async fn initialize(self: &Arc<Self>) -> MemoryResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let namespace = self.config.namespace.as_str();

        if self.config.consistency_level == ConsistencyLevel::Strong {
            warn!(
                namespace,
                "Strong consistency requested; only eventual consistency is enforced"
            );
        }

        let mut entries_loaded = 0;
        if let Some(store) = &self.persistence {
            if let Some(doc) = store.load_state().await? {
                if doc.namespace != self.config.namespace {
                    return Err(MemoryError::InvalidConfig(format!(
                        "state at {} belongs to namespace '{}'",
                        store.state_path().display(),
                        doc.namespace
                    )));
                }
                entries_loaded = doc.entries.len();
                self.lock()?.replace_all(doc.entries, doc.partitions);
            }
        }

        self.get_or_create_partition(
            DEFAULT_PARTITION,
            self.implicit_partition(EntryType::Knowledge),
        )?;
        for entry_type in EntryType::ALL {
            self.get_or_create_partition(entry_type.as_str(), self.implicit_partition(entry_type))?;
        }

        self.initialized.store(true, Ordering::SeqCst);

        let persistent = self.persistence.is_some();
        let plan = SchedulePlan::from_periods(
            if persistent { self.config.sync_interval() } else { Duration::ZERO },
            if persistent { self.config.backup_interval() } else { Duration::ZERO },
            self.config.cleanup_interval(),
        );
        let scheduler = Scheduler::start(Arc::downgrade(self), plan);
        *self.scheduler.lock().map_err(|_| MemoryError::LockPoisoned)? = Some(scheduler);

        self.events.publish(MemoryEvent::ManagerInitialized {
            namespace: namespace.to_string(),
            entries_loaded,
            timestamp: self.clock.now(),
        });
        info!(namespace, entries_loaded, persistent, "Memory manager initialized");
        Ok(())
    }

    /// Stop the background loops, persist once more, then release the
    /// replication hook, persistence store, and codecs in that order.
    ///
    /// Every step runs even if an earlier one fails; the first error is
    /// returned.
    pub async fn shutdown(&self) -> MemoryResult<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        let namespace = self.config.namespace.as_str();

        let scheduler = self
            .scheduler
            .lock()
            .map_err(|_| MemoryError::LockPoisoned)?
            .take();
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }

        let mut first_error = None;
        if let Err(e) = self.sync_now().await {
            warn!(namespace, error = %e, "Final persist failed");
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.replication.shutdown().await {
            warn!(namespace, error = %e, "Replication shutdown failed");
            first_error.get_or_insert(e);
        }
        if let Some(store) = &self.persistence {
            store.close();
        }
        self.codec.close();

        self.initialized.store(false, Ordering::SeqCst);
        self.events.publish(MemoryEvent::ManagerShutdown {
            namespace: namespace.to_string(),
            timestamp: self.clock.now(),
        });
        info!(namespace, "Memory manager shut down");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Entries
    // ========================================================================

    /// Store `value` under `key` and return the new entry id.
    pub fn store<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        opts: StoreOptions,
    ) -> MemoryResult<EntryId> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let partition_name = opts.partition.as_deref().unwrap_or(DEFAULT_PARTITION);
        let lazy = self.implicit_partition(opts.entry_type.unwrap_or(EntryType::Knowledge));

        let mut guard = self.lock()?;
        let state = &mut *guard;

        let rules = self.resolve_rules(
            state,
            partition_name,
            opts.owner.as_deref(),
            None,
            &lazy,
            true,
            now,
        )?;
        let encoded = self.codec.encode(value, rules.compressed)?;
        let ttl = opts
            .ttl
            .or(rules.ttl_ms.map(Duration::from_millis))
            .or(self.config.default_ttl());

        let entry = MemoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.to_string(),
            value: encoded.bytes,
            entry_type: opts.entry_type.unwrap_or(rules.partition_type),
            tags: opts.tags.into_iter().collect(),
            owner: opts.owner.clone(),
            access_level: opts
                .access_level
                .unwrap_or(self.config.default_access_level),
            partition: partition_name.to_string(),
            created_at: now,
            updated_at: now,
            expires_at: ttl.map(|ttl| expiry_after(now, ttl)),
            version: 1,
            previous_versions: VecDeque::new(),
            references: opts.references,
            dependencies: opts.dependencies,
            compressed: encoded.compressed,
            encrypted: encoded.encrypted,
        };

        let size = self.check_entry_size(&entry)?;
        self.make_room(state, size, 0, None, now)?;

        let entry_id = entry.id.clone();
        self.insert_locked(state, entry.clone(), &lazy, rules.indexed, now);
        if let Some(cache) = state.cache.as_mut() {
            cache.set(key, entry.clone(), now);
        }
        self.replicate(&entry);

        debug!(
            namespace = %self.config.namespace,
            entry_id = %entry_id,
            key,
            partition = partition_name,
            size,
            "Entry stored"
        );
        self.events.publish(MemoryEvent::EntryStored {
            entry_id: entry_id.clone(),
            key: key.to_string(),
            partition: partition_name.to_string(),
            actor: opts.owner,
            timestamp: now,
        });
        Ok(entry_id)
    }

    /// Decoded value of the first entry with `key`, or `None`.
    ///
    /// With `include_metadata` the whole entry is returned as JSON, its
    /// `value` field decoded. A cache hit is returned without applying the
    /// partition filter.
    pub fn retrieve(&self, key: &str, opts: RetrieveOptions) -> MemoryResult<Option<Value>> {
        let Some(entry) =
            self.lookup(key, opts.partition.as_deref(), opts.requester.as_deref())?
        else {
            return Ok(None);
        };
        let value: Value = self.decode(&entry)?;
        if !opts.include_metadata {
            return Ok(Some(value));
        }
        let mut doc = serde_json::to_value(&entry)?;
        if let Some(fields) = doc.as_object_mut() {
            fields.insert("value".to_string(), value);
        }
        Ok(Some(doc))
    }

    /// Like [`retrieve`](Self::retrieve), deserializing into `T`.
    pub fn retrieve_as<T: DeserializeOwned>(
        &self,
        key: &str,
        opts: RetrieveOptions,
    ) -> MemoryResult<Option<T>> {
        match self.lookup(key, opts.partition.as_deref(), opts.requester.as_deref())? {
            Some(entry) => Ok(Some(self.decode(&entry)?)),
            None => Ok(None),
        }
    }

    /// The stored entry, value still encoded.
    pub fn retrieve_entry(
        &self,
        key: &str,
        opts: RetrieveOptions,
    ) -> MemoryResult<Option<MemoryEntry>> {
        self.lookup(key, opts.partition.as_deref(), opts.requester.as_deref())
    }

    /// Replace the value of the first entry with `key`. Returns false if
    /// there is none.
    pub fn update<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        opts: UpdateOptions,
    ) -> MemoryResult<bool> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let Some(id) = state.first_match(key, opts.partition.as_deref()) else {
            return Ok(false);
        };
        let Some(current) = state.entries.get(&id).cloned() else {
            return Ok(false);
        };
        if current.is_expired(now) {
            self.remove_entry_locked(state, &id, DeleteReason::Expired, None);
            return Ok(false);
        }

        let lazy = self.implicit_partition(current.entry_type);
        let rules = self.resolve_rules(
            state,
            &current.partition,
            opts.updater.as_deref(),
            Some(&current),
            &lazy,
            false,
            now,
        )?;
        let encoded = self.codec.encode(value, rules.compressed)?;

        let mut next = current;
        if opts.increment_version {
            next.push_version();
        }
        next.value = encoded.bytes;
        next.compressed = encoded.compressed;
        next.encrypted = encoded.encrypted;
        next.updated_at = now;

        let size = self.check_entry_size(&next)?;
        let reclaim = state.entries.size_of(&id);
        self.make_room(state, size, reclaim, Some(&id), now)?;

        state.entries.replace(next.clone());
        if rules.indexed {
            state.index.update_entry(&next);
        }
        if let Some(cache) = state.cache.as_mut() {
            cache.set(key, next.clone(), now);
        }
        self.replicate(&next);

        debug!(
            namespace = %self.config.namespace,
            entry_id = %id,
            key,
            version = next.version,
            "Entry updated"
        );
        self.events.publish(MemoryEvent::EntryUpdated {
            entry_id: id,
            key: key.to_string(),
            version: next.version,
            actor: opts.updater,
            timestamp: now,
        });
        Ok(true)
    }

    /// Delete the first entry with `key`. Returns false if there is none.
    pub fn delete(&self, key: &str, opts: DeleteOptions) -> MemoryResult<bool> {
        self.ensure_initialized()?;
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let Some(id) = state.first_match(key, opts.partition.as_deref()) else {
            return Ok(false);
        };
        if !opts.force {
            if let (Some(actor), Some(entry)) = (opts.deleter.as_deref(), state.entries.get(&id)) {
                if !self.access.can_delete(actor, entry) {
                    return Err(MemoryError::access_denied(actor, "delete", &id));
                }
            }
        }
        self.remove_entry_locked(state, &id, DeleteReason::Explicit, opts.deleter.as_deref());
        Ok(true)
    }

    /// Prior versions of the first entry with `key`, oldest first.
    pub fn history(&self, key: &str, partition: Option<&str>) -> MemoryResult<Vec<EntrySnapshot>> {
        self.ensure_initialized()?;
        let guard = self.lock()?;
        guard
            .first_match(key, partition)
            .and_then(|id| guard.entries.get(&id))
            .map(|e| e.previous_versions.iter().cloned().collect())
            .ok_or_else(|| MemoryError::NotFound(key.to_string()))
    }

    /// Filter, sort, and page over live entries.
    pub fn query(&self, query: &MemoryQuery) -> MemoryResult<Vec<MemoryEntry>> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let matched = {
            let guard = self.lock()?;
            guard
                .entries
                .iter()
                .filter(|e| !e.is_expired(now) && query.matches(e))
                .filter(|e| {
                    query
                        .partition
                        .as_deref()
                        .map_or(true, |p| guard.partitions.contains_entry(p, &e.id))
                })
                .cloned()
                .collect()
        };
        Ok(query.sort_and_page(matched))
    }

    /// Term search over key, tags, and type. Best matches first; ties keep
    /// insertion order.
    pub fn search(&self, opts: &MemorySearchOptions) -> MemoryResult<Vec<MemoryEntry>> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let mode = if opts.fuzzy {
            MatchMode::Fuzzy
        } else {
            MatchMode::Substring
        };

        let guard = self.lock()?;
        let mut hits: Vec<(usize, u64, &MemoryEntry)> = guard
            .index
            .search(&opts.query, mode)
            .into_iter()
            .filter_map(|(id, score)| {
                let entry = guard.entries.get(&id)?;
                let keep = !entry.is_expired(now)
                    && opts
                        .partition
                        .as_deref()
                        .map_or(true, |p| guard.partitions.contains_entry(p, &id))
                    && opts.entry_type.map_or(true, |t| entry.entry_type == t)
                    && opts
                        .owner
                        .as_deref()
                        .map_or(true, |o| entry.owner.as_deref() == Some(o));
                keep.then(|| (score, guard.entries.seq_of(&id).unwrap_or(u64::MAX), entry))
            })
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        Ok(hits
            .into_iter()
            .take(opts.limit.unwrap_or(usize::MAX))
            .map(|(_, _, entry)| entry.clone())
            .collect())
    }

    // ========================================================================
    // Sharing
    // ========================================================================

    /// Copy the first entry with `key` into `target`'s shared partition.
    ///
    /// The copy is independent: new id, owned by `target`, referencing the
    /// source. Deleting either leaves the other in place.
    pub fn share_memory(&self, key: &str, target: &str, opts: ShareOptions) -> MemoryResult<EntryId> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let source = state
            .first_match(key, opts.partition.as_deref())
            .and_then(|id| state.entries.get(&id))
            .filter(|e| !e.is_expired(now))
            .cloned()
            .ok_or_else(|| MemoryError::NotFound(key.to_string()))?;
        if let Some(actor) = opts.actor.as_deref() {
            if !self.access.can_read(actor, &source) {
                return Err(MemoryError::access_denied(actor, "read", &source.id));
            }
        }

        let partition_name = shared_partition_name(target);
        let lazy = PartitionOptions {
            shared: true,
            ..self.implicit_partition(source.entry_type)
        };
        let rules = self.resolve_rules(
            state,
            &partition_name,
            opts.actor.as_deref(),
            None,
            &lazy,
            true,
            now,
        )?;

        let mut references = source.references.clone();
        if !references.contains(&source.id) {
            references.push(source.id.clone());
        }
        let copy = MemoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            owner: Some(target.to_string()),
            access_level: opts.access_level.unwrap_or(source.access_level),
            partition: partition_name.clone(),
            created_at: now,
            updated_at: now,
            version: 1,
            previous_versions: VecDeque::new(),
            references,
            ..source.clone()
        };

        let size = self.check_entry_size(&copy)?;
        self.make_room(state, size, 0, Some(&source.id), now)?;

        let copy_id = copy.id.clone();
        self.insert_locked(state, copy.clone(), &lazy, rules.indexed, now);
        self.replicate(&copy);

        debug!(
            namespace = %self.config.namespace,
            source_id = %source.id,
            entry_id = %copy_id,
            target,
            partition = %partition_name,
            "Entry shared"
        );
        self.events.publish(MemoryEvent::MemoryShared {
            source_id: source.id,
            entry_id: copy_id.clone(),
            target: target.to_string(),
            actor: opts.actor,
            timestamp: now,
        });
        Ok(copy_id)
    }

    /// Share with each target independently. Failures are logged and
    /// skipped; the ids of the copies that were made are returned.
    pub fn broadcast_memory<S: AsRef<str>>(
        &self,
        key: &str,
        targets: &[S],
        opts: ShareOptions,
    ) -> MemoryResult<Vec<EntryId>> {
        self.ensure_initialized()?;
        let source_id = self.lock()?.first_match(key, opts.partition.as_deref());

        let mut entry_ids = Vec::new();
        let mut reached: Vec<AgentId> = Vec::new();
        for target in targets {
            let target = target.as_ref();
            match self.share_memory(key, target, opts.clone()) {
                Ok(id) => {
                    entry_ids.push(id);
                    reached.push(target.to_string());
                }
                Err(e) => warn!(
                    namespace = %self.config.namespace,
                    key,
                    target,
                    error = %e,
                    "Broadcast to target failed"
                ),
            }
        }

        if let Some(source_id) = source_id.filter(|_| !entry_ids.is_empty()) {
            self.events.publish(MemoryEvent::MemoryBroadcasted {
                source_id,
                entry_ids: entry_ids.clone(),
                targets: reached,
                actor: opts.actor,
                timestamp: self.clock.now(),
            });
        }
        Ok(entry_ids)
    }

    // ========================================================================
    // Partitions
    // ========================================================================

    /// Create a partition. Fails with `AlreadyExists` on a duplicate name.
    pub fn create_partition(&self, name: &str, opts: PartitionOptions) -> MemoryResult<Partition> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let partition = self.lock()?.partitions.create(name, &opts, now)?.clone();
        self.partition_created(&partition);
        Ok(partition)
    }

    /// Return the named partition, creating it if needed. Usable before
    /// [`initialize`](Self::initialize) so callers can seed partitions.
    pub fn get_or_create_partition(
        &self,
        name: &str,
        opts: PartitionOptions,
    ) -> MemoryResult<Partition> {
        let now = self.clock.now();
        let (partition, created) = {
            let mut guard = self.lock()?;
            let (partition, created) = guard.partitions.get_or_create(name, &opts, now);
            (partition.clone(), created)
        };
        if created {
            self.partition_created(&partition);
        }
        Ok(partition)
    }

    /// Delete a partition and every entry in it. A non-empty partition
    /// needs `force`. Returns the number of entries removed.
    pub fn delete_partition(&self, name: &str, force: bool) -> MemoryResult<usize> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let Some(partition) = state.partitions.get(name) else {
            return Err(MemoryError::NotFound(format!("partition {}", name)));
        };
        let partition_id = partition.id.clone();
        let members: Vec<EntryId> = partition.entries.iter().cloned().collect();
        if !members.is_empty() && !force {
            return Err(MemoryError::NotEmpty {
                partition: name.to_string(),
                entries: members.len(),
            });
        }

        let removed = members
            .iter()
            .filter(|id| {
                self.remove_entry_locked(state, id, DeleteReason::PartitionDropped, None)
                    .is_some()
            })
            .count();
        state.partitions.remove(name);

        info!(
            namespace = %self.config.namespace,
            partition = name,
            entries_removed = removed,
            "Partition deleted"
        );
        self.events.publish(MemoryEvent::PartitionDeleted {
            partition_id,
            name: name.to_string(),
            entries_removed: removed,
            timestamp: now,
        });
        Ok(removed)
    }

    pub fn get_partition(&self, name: &str) -> MemoryResult<Option<Partition>> {
        Ok(self.lock()?.partitions.get(name).cloned())
    }

    /// All partitions, in name order.
    pub fn list_partitions(&self) -> MemoryResult<Vec<Partition>> {
        Ok(self.lock()?.partitions.snapshot())
    }

    // ========================================================================
    // Backups and persistence
    // ========================================================================

    /// Snapshot every entry and partition into a checksummed backup.
    pub async fn create_backup(&self) -> MemoryResult<BackupId> {
        self.ensure_initialized()?;
        let store = self.persistence_store()?;
        let now = self.clock.now();

        let (entries, partitions) = {
            let guard = self.lock()?;
            (guard.entries.snapshot(), guard.partitions.snapshot())
        };
        let backup = Backup::new(&self.config.namespace, now, entries, partitions)?;
        store.save_backup(&backup).await?;

        if self.config.max_backups > 0 {
            if let Err(e) = store.prune_backups(self.config.max_backups).await {
                warn!(namespace = %self.config.namespace, error = %e, "Backup pruning failed");
            }
        }

        info!(
            namespace = %self.config.namespace,
            backup_id = %backup.id,
            entries = backup.entries.len(),
            "Backup created"
        );
        self.events.publish(MemoryEvent::BackupCreated {
            backup_id: backup.id.clone(),
            entry_count: backup.entries.len(),
            checksum: backup.checksum.clone(),
            timestamp: now,
        });
        Ok(backup.id)
    }

    /// Replace all entries and partitions with the contents of a backup.
    ///
    /// The checksum is verified first; on mismatch nothing changes. This
    /// discards current state: take a backup first to keep it.
    pub async fn restore_from_backup(&self, backup_id: &str) -> MemoryResult<usize> {
        self.ensure_initialized()?;
        let store = self.persistence_store()?;
        let backup = store.load_backup(backup_id).await?;
        backup.verify()?;

        let Backup {
            id,
            entries,
            partitions,
            ..
        } = backup;
        let entry_count = entries.len();
        self.lock()?.replace_all(entries, partitions);

        warn!(
            namespace = %self.config.namespace,
            backup_id = %id,
            entries = entry_count,
            "State replaced from backup"
        );
        self.events.publish(MemoryEvent::BackupRestored {
            backup_id: id,
            entry_count,
            timestamp: self.clock.now(),
        });
        Ok(entry_count)
    }

    /// Stored backups, newest first. Empty without persistence.
    pub async fn list_backups(&self) -> MemoryResult<Vec<BackupSummary>> {
        match &self.persistence {
            Some(store) => store.list_backups().await,
            None => Ok(Vec::new()),
        }
    }

    /// Write the full current state to `state.json`. No-op without
    /// persistence.
    pub async fn sync_now(&self) -> MemoryResult<()> {
        self.ensure_initialized()?;
        let Some(store) = &self.persistence else {
            return Ok(());
        };
        let doc = {
            let guard = self.lock()?;
            StateDocument::new(
                &self.config.namespace,
                self.clock.now(),
                guard.entries.snapshot(),
                guard.partitions.snapshot(),
            )
        };
        store.save_state(&doc).await
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn cleanup_expired(&self) -> MemoryResult<usize> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let expired: Vec<EntryId> = state
            .entries
            .iter()
            .filter(|e| e.is_expired(now))
            .map(|e| e.id.clone())
            .collect();
        for id in &expired {
            self.remove_entry_locked(state, id, DeleteReason::Expired, None);
        }
        if !expired.is_empty() {
            info!(namespace = %self.config.namespace, count = expired.len(), "Expired entries removed");
        }
        Ok(expired.len())
    }

    // ========================================================================
    // Replication
    // ========================================================================

    /// Apply an entry received from another node. Newer (`version`, then
    /// `updated_at`) wins; returns whether it was applied.
    pub fn receive_replicated(&self, entry: MemoryEntry, from_node: &str) -> MemoryResult<bool> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let existing = state
            .entries
            .get(&entry.id)
            .map(|e| (e.version, e.updated_at));
        let applied = existing.map_or(true, |current| (entry.version, entry.updated_at) > current);

        if applied {
            let size = self.check_entry_size(&entry)?;
            let reclaim = state.entries.size_of(&entry.id);
            self.make_room(state, size, reclaim, Some(&entry.id), now)?;

            let lazy = self.implicit_partition(entry.entry_type);
            let indexed = state.is_indexed(&entry.partition);
            if existing.is_some() {
                state.index.remove_entry(&entry.id);
                state.partitions.remove_entry(&entry.id);
                if let Some(cache) = state.cache.as_mut() {
                    cache.remove_entry(&entry.id);
                }
                state.entries.remove(&entry.id);
            }
            self.insert_locked(state, entry.clone(), &lazy, indexed, now);
        }

        debug!(
            namespace = %self.config.namespace,
            entry_id = %entry.id,
            from_node,
            applied,
            "Replicated entry received"
        );
        self.events.publish(MemoryEvent::ReplicationReceived {
            entry_id: entry.id,
            from_node: from_node.to_string(),
            applied,
            timestamp: now,
        });
        Ok(applied)
    }

    /// Exchange state with `node` through the replication hook. Returns an
    /// empty report when distribution is disabled.
    pub async fn synchronize_with(&self, node: &str, opts: SyncOptions) -> MemoryResult<SyncReport> {
        self.ensure_initialized()?;
        if !self.config.enable_distribution {
            debug!(namespace = %self.config.namespace, node, "Distribution disabled, skipping sync");
            return Ok(SyncReport {
                node: node.to_string(),
                ..SyncReport::default()
            });
        }

        let now = self.clock.now();
        let entries: Vec<MemoryEntry> = {
            let guard = self.lock()?;
            guard
                .entries
                .iter()
                .filter(|e| !e.is_expired(now))
                .cloned()
                .collect()
        };
        let report = self.replication.synchronize_with(node, entries, &opts).await?;
        info!(
            namespace = %self.config.namespace,
            node,
            sent = report.entries_sent,
            received = report.entries_received,
            "Synchronized with node"
        );
        Ok(report)
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Usage over live entries.
    pub fn get_statistics(&self) -> MemoryResult<MemoryStatistics> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let guard = self.lock()?;

        let mut stats = MemoryStatistics::collect(
            guard
                .entries
                .iter()
                .map(|e| (e, guard.entries.size_of(&e.id))),
            now,
        );
        stats.partition_count = guard.partitions.len();
        if let Some(cache) = guard.cache.as_ref() {
            stats.cache_entries = cache.len();
            (stats.cache_hits, stats.cache_misses) = cache.hit_stats();
        }
        Ok(stats)
    }

    /// Render live entries as JSON (full fidelity) or CSV (no values).
    pub fn export_memory(&self, format: ExportFormat) -> MemoryResult<String> {
        let statistics = self.get_statistics()?;
        let now = self.clock.now();
        let (entries, partitions) = {
            let guard = self.lock()?;
            let entries: Vec<MemoryEntry> = guard
                .entries
                .iter()
                .filter(|e| !e.is_expired(now))
                .cloned()
                .collect();
            (entries, guard.partitions.snapshot())
        };

        match format {
            ExportFormat::Json => export::to_json(&MemoryExport::new(
                &self.config.namespace,
                now,
                statistics,
                partitions,
                entries,
            )),
            ExportFormat::Csv => Ok(export::to_csv(&entries)),
        }
    }

    /// Configuration snapshot of this namespace.
    pub fn namespace(&self) -> MemoryResult<NamespaceInfo> {
        let partitions = self.lock()?.partitions.names();
        Ok(NamespaceInfo {
            name: self.config.namespace.clone(),
            partitions,
            default_access_level: self.config.default_access_level,
            persistent: self.config.is_persistent(),
            distributed: self.config.enable_distribution,
            consistency: self.config.consistency_level,
            cache_enabled: self.config.enable_caching,
            compression_enabled: self.config.enable_compression,
            encryption_enabled: self.config.enable_encryption,
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lock(&self) -> MemoryResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| MemoryError::LockPoisoned)
    }

    fn ensure_initialized(&self) -> MemoryResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(MemoryError::NotInitialized(self.config.namespace.clone()))
        }
    }

    fn persistence_store(&self) -> MemoryResult<&PersistenceStore> {
        self.persistence.as_ref().ok_or_else(|| {
            MemoryError::InvalidConfig("persistence_path is not set".to_string())
        })
    }

    fn decode<T: DeserializeOwned>(&self, entry: &MemoryEntry) -> MemoryResult<T> {
        self.codec.decode(&entry.value, entry.compressed, entry.encrypted)
    }

    /// Cache, then entry store. Expired matches are removed.
    fn lookup(
        &self,
        key: &str,
        partition: Option<&str>,
        requester: Option<&str>,
    ) -> MemoryResult<Option<MemoryEntry>> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let mut guard = self.lock()?;
        let state = &mut *guard;

        // Cache hits skip the partition filter.
        if let Some(hit) = state.cache.as_mut().and_then(|c| c.get(key, now)).cloned() {
            self.check_readable(&hit, requester)?;
            self.entry_retrieved(&hit, requester, true, now);
            return Ok(Some(hit));
        }

        let Some(entry) = state
            .first_match(key, partition)
            .and_then(|id| state.entries.get(&id))
            .cloned()
        else {
            return Ok(None);
        };
        if entry.is_expired(now) {
            self.remove_entry_locked(state, &entry.id, DeleteReason::Expired, None);
            return Ok(None);
        }
        self.check_readable(&entry, requester)?;

        if let Some(cache) = state.cache.as_mut() {
            cache.set(key, entry.clone(), now);
        }
        self.entry_retrieved(&entry, requester, false, now);
        Ok(Some(entry))
    }

    fn check_readable(&self, entry: &MemoryEntry, requester: Option<&str>) -> MemoryResult<()> {
        match requester {
            Some(actor) if !self.access.can_read(actor, entry) => {
                Err(MemoryError::access_denied(actor, "read", &entry.id))
            }
            _ => Ok(()),
        }
    }

    /// Validate a write into partition `name` and return its rules. A
    /// missing partition is checked as if created with `lazy`.
    #[allow(clippy::too_many_arguments)]
    fn resolve_rules(
        &self,
        state: &MemoryState,
        name: &str,
        actor: Option<&str>,
        entry: Option<&MemoryEntry>,
        lazy: &PartitionOptions,
        adding: bool,
        now: DateTime<Utc>,
    ) -> MemoryResult<WriteRules> {
        let fresh;
        let partition = match state.partitions.get(name) {
            Some(p) => p,
            None => {
                fresh = Partition::new(name, lazy, now);
                &fresh
            }
        };

        if let Some(actor) = actor {
            if !self.access.can_write(actor, partition, entry) {
                return Err(MemoryError::access_denied(actor, "write to", name));
            }
        }
        if partition.read_only {
            return Err(MemoryError::PartitionReadOnly(name.to_string()));
        }
        if adding && partition.entries.len() >= partition.max_size {
            return Err(MemoryError::PartitionFull {
                partition: name.to_string(),
                max_size: partition.max_size,
            });
        }
        Ok(WriteRules::of(partition))
    }

    /// Options for partitions the manager creates on its own: the seeded
    /// ones and those made on first write. No count cap; compression follows
    /// the namespace config.
    fn implicit_partition(&self, entry_type: EntryType) -> PartitionOptions {
        PartitionOptions {
            compressed: self.config.enable_compression,
            ..PartitionOptions::of_type(entry_type)
        }
    }

    /// Applies `max_entry_size` to the entry without its version history and
    /// returns the full stored size for the byte budget.
    fn check_entry_size(&self, entry: &MemoryEntry) -> MemoryResult<u64> {
        let payload = entry.payload_size();
        if payload > self.config.max_entry_size {
            return Err(MemoryError::SizeExceeded {
                size: payload,
                limit: self.config.max_entry_size,
            });
        }
        Ok(entry.serialized_size())
    }

    /// Admission control. Ensures `incoming` bytes fit once `reclaim` bytes
    /// (the entry being replaced) are released: expired entries go first,
    /// then the oldest non-system entries. `protect` is never evicted.
    ///
    /// Fails with `MemoryFull` before touching anything if even evicting
    /// every candidate would not be enough.
    fn make_room(
        &self,
        state: &mut MemoryState,
        incoming: u64,
        reclaim: u64,
        protect: Option<&str>,
        now: DateTime<Utc>,
    ) -> MemoryResult<()> {
        let limit = self.config.max_memory_size;
        let fits = |total: u64| total.saturating_sub(reclaim) + incoming <= limit;
        if fits(state.entries.total_bytes()) {
            return Ok(());
        }

        let mut expired = Vec::new();
        let mut candidates = Vec::new();
        for entry in state.entries.iter() {
            if Some(entry.id.as_str()) == protect {
                continue;
            }
            let size = state.entries.size_of(&entry.id);
            if entry.is_expired(now) {
                expired.push((entry.id.clone(), size));
            } else if entry.access_level != AccessLevel::System {
                let seq = state.entries.seq_of(&entry.id).unwrap_or(u64::MAX);
                candidates.push((entry.created_at, seq, entry.id.clone(), size));
            }
        }

        let freeable: u64 = expired.iter().map(|(_, s)| s).sum::<u64>()
            + candidates.iter().map(|(_, _, _, s)| s).sum::<u64>();
        if !fits(state.entries.total_bytes().saturating_sub(freeable)) {
            return Err(MemoryError::MemoryFull {
                required: incoming,
                limit,
            });
        }

        for (id, _) in &expired {
            self.remove_entry_locked(state, id, DeleteReason::Expired, None);
        }

        candidates.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        let mut evicted = 0usize;
        for (_, _, id, _) in &candidates {
            if fits(state.entries.total_bytes()) {
                break;
            }
            self.remove_entry_locked(state, id, DeleteReason::Evicted, None);
            evicted += 1;
        }

        info!(
            namespace = %self.config.namespace,
            purged = expired.len(),
            evicted,
            total_bytes = state.entries.total_bytes(),
            "Admission control freed memory"
        );
        Ok(())
    }

    /// Insert a new entry, attach it to its partition (creating the
    /// partition from `lazy` if missing), and index it.
    fn insert_locked(
        &self,
        state: &mut MemoryState,
        entry: MemoryEntry,
        lazy: &PartitionOptions,
        indexed: bool,
        now: DateTime<Utc>,
    ) {
        let (partition, created) = state.partitions.get_or_create(&entry.partition, lazy, now);
        if created {
            let partition = partition.clone();
            self.partition_created(&partition);
        }
        state.partitions.add_entry(&entry.partition, &entry.id);
        if indexed {
            state.index.add_entry(&entry);
        }
        state.entries.insert(entry);
    }

    /// Remove an entry from the store, every partition, the index, and the
    /// cache. Every deletion goes through here.
    fn remove_entry_locked(
        &self,
        state: &mut MemoryState,
        id: &str,
        reason: DeleteReason,
        actor: Option<&str>,
    ) -> Option<MemoryEntry> {
        let entry = state.entries.remove(id)?;
        state.partitions.remove_entry(id);
        state.index.remove_entry(id);
        if let Some(cache) = state.cache.as_mut() {
            cache.remove_entry(id);
        }

        debug!(
            namespace = %self.config.namespace,
            entry_id = id,
            key = %entry.key,
            ?reason,
            "Entry removed"
        );
        self.events.publish(MemoryEvent::EntryDeleted {
            entry_id: id.to_string(),
            key: entry.key.clone(),
            actor: actor.map(String::from),
            reason,
            timestamp: self.clock.now(),
        });
        Some(entry)
    }

    /// Best-effort: failures are logged and the local write stands.
    fn replicate(&self, entry: &MemoryEntry) {
        if !self.config.enable_distribution {
            return;
        }
        if let Err(e) = self.replication.replicate(entry) {
            warn!(
                namespace = %self.config.namespace,
                entry_id = %entry.id,
                error = %e,
                "Replication failed"
            );
        }
    }

    fn partition_created(&self, partition: &Partition) {
        info!(
            namespace = %self.config.namespace,
            partition = %partition.name,
            partition_type = %partition.partition_type,
            "Partition created"
        );
        self.events.publish(MemoryEvent::PartitionCreated {
            partition_id: partition.id.clone(),
            name: partition.name.clone(),
            timestamp: partition.created_at,
        });
    }

    fn entry_retrieved(
        &self,
        entry: &MemoryEntry,
        requester: Option<&str>,
        from_cache: bool,
        now: DateTime<Utc>,
    ) {
        self.events.publish(MemoryEvent::EntryRetrieved {
            entry_id: entry.id.clone(),
            key: entry.key.clone(),
            actor: requester.map(String::from),
            from_cache,
            timestamp: now,
        });
    }
}

/// Absolute expiry for a TTL. Always strictly after `now`.
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl)
        .unwrap_or_else(|_| chrono::Duration::days(36_500))
        .min(chrono::Duration::days(36_500))
        .max(chrono::Duration::milliseconds(1));
    now + ttl
}
