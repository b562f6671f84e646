use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::state::MemoryState;
use super::MemoryManager;
use crate::clock::{Clock, SharedClock, SystemClock};
use crate::config::MemoryConfig;
use crate::error::MemoryResult;
use crate::events::{EventBus, SharedEventBus};
use crate::memory::EntryCache;
use crate::persistence::PersistenceStore;
use crate::seams::{
    AccessPolicy, AllowAll, CompressionCodec, EncryptionCodec, IdentityCodec, NoopReplication,
    ReplicationHook, ValueCodec,
};

/// Assembles a [`MemoryManager`] with optional custom seams.
///
/// Anything not supplied falls back to the permissive/identity default.
pub struct MemoryManagerBuilder {
    config: MemoryConfig,
    clock: Option<SharedClock>,
    compression: Option<Arc<dyn CompressionCodec>>,
    encryption: Option<Arc<dyn EncryptionCodec>>,
    access: Option<Arc<dyn AccessPolicy>>,
    replication: Option<Arc<dyn ReplicationHook>>,
    events: Option<SharedEventBus>,
}

impl MemoryManagerBuilder {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            clock: None,
            compression: None,
            encryption: None,
            access: None,
            replication: None,
            events: None,
        }
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn compression(mut self, codec: impl CompressionCodec + 'static) -> Self {
        self.compression = Some(Arc::new(codec));
        self
    }

    pub fn encryption(mut self, codec: impl EncryptionCodec + 'static) -> Self {
        self.encryption = Some(Arc::new(codec));
        self
    }

    pub fn access_policy(mut self, policy: impl AccessPolicy + 'static) -> Self {
        self.access = Some(Arc::new(policy));
        self
    }

    /// Takes an `Arc` so callers can keep a handle to the hook.
    pub fn replication(mut self, hook: Arc<dyn ReplicationHook>) -> Self {
        self.replication = Some(hook);
        self
    }

    /// Publish onto an existing bus instead of a private one.
    pub fn event_bus(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the configuration and build the manager. Call
    /// [`MemoryManager::initialize`] before use.
    pub fn build(self) -> MemoryResult<Arc<MemoryManager>> {
        let config = self.config;
        config.validate()?;

        let codec = ValueCodec::new(
            self.compression.unwrap_or_else(|| Arc::new(IdentityCodec)),
            self.encryption.unwrap_or_else(|| Arc::new(IdentityCodec)),
            config.enable_compression,
            config.enable_encryption,
        );
        let cache = config
            .enable_caching
            .then(|| EntryCache::new(config.cache_size, config.cache_ttl()));
        let persistence = config
            .persistence_path
            .as_ref()
            .map(|root| PersistenceStore::new(root.clone()));

        debug!(
            namespace = %config.namespace,
            persistent = persistence.is_some(),
            caching = cache.is_some(),
            ?codec,
            "Memory manager built"
        );

        Ok(Arc::new(MemoryManager {
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            codec,
            access: self.access.unwrap_or_else(|| Arc::new(AllowAll)),
            replication: self
                .replication
                .unwrap_or_else(|| Arc::new(NoopReplication)),
            persistence,
            events: self.events.unwrap_or_else(|| EventBus::new().shared()),
            state: Mutex::new(MemoryState::new(cache)),
            initialized: AtomicBool::new(false),
            scheduler: Mutex::new(None),
            config,
        }))
    }
}
