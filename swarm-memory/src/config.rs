//! Memory namespace configuration
//!
//! Defaults, then an optional TOML file, then `SWARM_MEMORY_*` environment
//! variables. The binary applies its CLI flags last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::types::AccessLevel;

/// Requested replica consistency.
///
/// Only `Eventual` is enforced; `Strong` is accepted and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    #[default]
    Eventual,
    Strong,
}

impl std::str::FromStr for ConsistencyLevel {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eventual" => Ok(Self::Eventual),
            "strong" => Ok(Self::Strong),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown consistency level: {}",
                other
            ))),
        }
    }
}

/// Construction-time configuration for one memory namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Namespace served by this manager.
    pub namespace: String,
    /// Directory holding `state.json` and `backups/`. `None` disables persistence.
    pub persistence_path: Option<PathBuf>,
    /// Total byte budget across all entries.
    pub max_memory_size: u64,
    /// Byte limit for one serialized entry.
    pub max_entry_size: u64,
    /// TTL applied when neither the call nor the partition supplies one.
    pub default_ttl_ms: Option<u64>,
    /// Access level for entries stored without one.
    pub default_access_level: AccessLevel,
    /// Compress values in the partitions the manager creates itself.
    /// Partitions made with `create_partition` set their own flag.
    pub enable_compression: bool,
    pub enable_encryption: bool,
    pub encryption_key: Option<String>,
    pub consistency_level: ConsistencyLevel,
    pub sync_interval_secs: u64,
    pub backup_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    /// Backups kept on disk; older ones are pruned after each backup.
    pub max_backups: usize,
    pub enable_distribution: bool,
    pub distribution_nodes: Vec<String>,
    pub replication_factor: u32,
    pub enable_caching: bool,
    pub cache_size: usize,
    pub cache_ttl_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            persistence_path: None,
            max_memory_size: 100 * 1024 * 1024,
            max_entry_size: 1024 * 1024,
            default_ttl_ms: None,
            default_access_level: AccessLevel::Team,
            enable_compression: false,
            enable_encryption: false,
            encryption_key: None,
            consistency_level: ConsistencyLevel::Eventual,
            sync_interval_secs: 60,
            backup_interval_secs: 3600,
            cleanup_interval_secs: 300,
            max_backups: 10,
            enable_distribution: false,
            distribution_nodes: Vec::new(),
            replication_factor: 1,
            enable_caching: true,
            cache_size: 1000,
            cache_ttl_ms: 300_000,
        }
    }
}

impl MemoryConfig {
    /// Create a config for `namespace` with all other fields defaulted.
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Create config from defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a TOML file; missing fields take their defaults.
    pub fn from_toml_file(path: &Path) -> MemoryResult<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| {
            MemoryError::InvalidConfig(format!("{}: {}", path.display(), e))
        })
    }

    /// Override fields from `SWARM_MEMORY_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(ns) = std::env::var("SWARM_MEMORY_NAMESPACE") {
            self.namespace = ns;
        }
        if let Ok(path) = std::env::var("SWARM_MEMORY_PATH") {
            self.persistence_path = Some(PathBuf::from(path));
        }
        if let Some(n) = env_parse("SWARM_MEMORY_MAX_SIZE") {
            self.max_memory_size = n;
        }
        if let Some(n) = env_parse("SWARM_MEMORY_MAX_ENTRY_SIZE") {
            self.max_entry_size = n;
        }
        if let Some(n) = env_parse("SWARM_MEMORY_DEFAULT_TTL_MS") {
            self.default_ttl_ms = Some(n);
        }
        if let Some(v) = env_bool("SWARM_MEMORY_COMPRESSION") {
            self.enable_compression = v;
        }
        if let Some(v) = env_bool("SWARM_MEMORY_ENCRYPTION") {
            self.enable_encryption = v;
        }
        if let Ok(key) = std::env::var("SWARM_MEMORY_ENCRYPTION_KEY") {
            self.encryption_key = Some(key);
        }
        if let Ok(level) = std::env::var("SWARM_MEMORY_CONSISTENCY") {
            if let Ok(level) = level.parse() {
                self.consistency_level = level;
            }
        }
        if let Some(n) = env_parse("SWARM_MEMORY_SYNC_INTERVAL_SECS") {
            self.sync_interval_secs = n;
        }
        if let Some(n) = env_parse("SWARM_MEMORY_BACKUP_INTERVAL_SECS") {
            self.backup_interval_secs = n;
        }
        if let Some(n) = env_parse("SWARM_MEMORY_CLEANUP_INTERVAL_SECS") {
            self.cleanup_interval_secs = n;
        }
        if let Some(n) = env_parse("SWARM_MEMORY_MAX_BACKUPS") {
            self.max_backups = n;
        }
        if let Some(v) = env_bool("SWARM_MEMORY_DISTRIBUTION") {
            self.enable_distribution = v;
        }
        if let Ok(nodes) = std::env::var("SWARM_MEMORY_NODES") {
            self.distribution_nodes = nodes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(n) = env_parse("SWARM_MEMORY_REPLICATION_FACTOR") {
            self.replication_factor = n;
        }
        if let Some(v) = env_bool("SWARM_MEMORY_CACHE") {
            self.enable_caching = v;
        }
        if let Some(n) = env_parse("SWARM_MEMORY_CACHE_SIZE") {
            self.cache_size = n;
        }
        if let Some(n) = env_parse("SWARM_MEMORY_CACHE_TTL_MS") {
            self.cache_ttl_ms = n;
        }
    }

    /// Reject configurations the manager cannot honor.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.namespace.trim().is_empty() {
            return Err(MemoryError::InvalidConfig(
                "namespace must not be empty".to_string(),
            ));
        }
        if self.max_memory_size == 0 || self.max_entry_size == 0 {
            return Err(MemoryError::InvalidConfig(
                "max_memory_size and max_entry_size must be non-zero".to_string(),
            ));
        }
        if self.max_entry_size > self.max_memory_size {
            return Err(MemoryError::InvalidConfig(format!(
                "max_entry_size ({}) must not exceed max_memory_size ({})",
                self.max_entry_size, self.max_memory_size
            )));
        }
        if self.enable_encryption
            && self.encryption_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(MemoryError::InvalidConfig(
                "enable_encryption requires encryption_key".to_string(),
            ));
        }
        if self.enable_distribution && self.replication_factor == 0 {
            return Err(MemoryError::InvalidConfig(
                "replication_factor must be at least 1 when distribution is enabled".to_string(),
            ));
        }
        if self.enable_caching && self.cache_size == 0 {
            return Err(MemoryError::InvalidConfig(
                "cache_size must be non-zero when caching is enabled".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_ms.map(Duration::from_millis)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Whether state is written to disk.
    pub fn is_persistent(&self) -> bool {
        self.persistence_path.is_some()
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn env_bool(var: &str) -> Option<bool> {
    std::env::var(var)
        .ok()
        .map(|v| v.to_lowercase() == "true" || v == "1")
}
