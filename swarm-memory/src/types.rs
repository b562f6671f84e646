//! Core data model: entries, partitions, and the namespace snapshot.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConsistencyLevel;

/// Identity of an agent acting on the memory.
pub type AgentId = String;

/// Unique identifier for entries
pub type EntryId = String;

/// Unique identifier for partitions
pub type PartitionId = String;

/// Unique identifier for backups
pub type BackupId = String;

/// Number of prior versions retained per entry.
pub const MAX_PREVIOUS_VERSIONS: usize = 10;

/// Name of the partition used when a call does not name one.
pub const DEFAULT_PARTITION: &str = "default";

/// What an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Knowledge,
    State,
    Cache,
    Logs,
    Results,
    Communication,
    Configuration,
    Metrics,
}

impl EntryType {
    pub const ALL: [EntryType; 8] = [
        EntryType::Knowledge,
        EntryType::State,
        EntryType::Cache,
        EntryType::Logs,
        EntryType::Results,
        EntryType::Communication,
        EntryType::Configuration,
        EntryType::Metrics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::State => "state",
            Self::Cache => "cache",
            Self::Logs => "logs",
            Self::Results => "results",
            Self::Communication => "communication",
            Self::Configuration => "configuration",
            Self::Metrics => "metrics",
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown entry type: {}", s))
    }
}

/// Who may see an entry. `System` entries are never evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Private,
    Team,
    Swarm,
    Public,
    System,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Team => "team",
            Self::Swarm => "swarm",
            Self::Public => "public",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "team" => Ok(Self::Team),
            "swarm" => Ok(Self::Swarm),
            "public" => Ok(Self::Public),
            "system" => Ok(Self::System),
            other => Err(format!("unknown access level: {}", other)),
        }
    }
}

/// Prior state of an entry, kept in its version ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub version: u64,
    #[serde(with = "payload")]
    pub value: Vec<u8>,
    pub tags: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
    pub compressed: bool,
    pub encrypted: bool,
}

/// A stored key/value record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: EntryId,
    /// Logical name. Not unique: several partitions may hold the same key.
    pub key: String,
    /// Encoded payload (JSON, then optionally compressed and encrypted).
    #[serde(with = "payload")]
    pub value: Vec<u8>,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub tags: BTreeSet<String>,
    pub owner: Option<AgentId>,
    pub access_level: AccessLevel,
    /// Partition the entry was stored into.
    pub partition: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Starts at 1, bumped by every versioned update.
    pub version: u64,
    /// Most recent prior states, oldest first, at most [`MAX_PREVIOUS_VERSIONS`].
    pub previous_versions: VecDeque<EntrySnapshot>,
    /// Ids of entries this one was derived from.
    #[serde(default)]
    pub references: Vec<EntryId>,
    #[serde(default)]
    pub dependencies: Vec<EntryId>,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub encrypted: bool,
}

impl MemoryEntry {
    /// Whether the entry is past its TTL at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Size of the entry as persisted, version history included.
    pub fn serialized_size(&self) -> u64 {
        serde_json::to_vec(self).map(|b| b.len() as u64).unwrap_or(0)
    }

    /// Size of the entry as persisted with an empty version history. This is
    /// what the per-entry limit applies to, so history never blocks an update.
    pub fn payload_size(&self) -> u64 {
        let history = serde_json::to_vec(&self.previous_versions)
            .map(|b| b.len() as u64)
            .unwrap_or(0);
        // An empty history still serializes as `[]`
        self.serialized_size()
            .saturating_sub(history.saturating_sub(2))
    }

    /// Push the current state into the version ring and bump the version.
    pub(crate) fn push_version(&mut self) {
        self.previous_versions.push_back(EntrySnapshot {
            version: self.version,
            value: self.value.clone(),
            tags: self.tags.clone(),
            updated_at: self.updated_at,
            compressed: self.compressed,
            encrypted: self.encrypted,
        });
        while self.previous_versions.len() > MAX_PREVIOUS_VERSIONS {
            self.previous_versions.pop_front();
        }
        self.version += 1;
    }
}

/// Named grouping of entry references within a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub id: PartitionId,
    pub name: String,
    #[serde(rename = "type")]
    pub partition_type: EntryType,
    /// Member entry ids. References only; entries live in the entry store.
    pub entries: BTreeSet<EntryId>,
    /// Entry count cap. `usize::MAX` when none was requested.
    pub max_size: usize,
    /// Default TTL for entries stored without one.
    pub ttl_ms: Option<u64>,
    pub read_only: bool,
    pub shared: bool,
    pub indexed: bool,
    pub compressed: bool,
    pub created_at: DateTime<Utc>,
}

/// Options for creating a partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionOptions {
    pub partition_type: EntryType,
    pub max_size: usize,
    pub ttl_ms: Option<u64>,
    pub read_only: bool,
    pub shared: bool,
    pub indexed: bool,
    pub compressed: bool,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            partition_type: EntryType::Knowledge,
            max_size: usize::MAX,
            ttl_ms: None,
            read_only: false,
            shared: false,
            indexed: true,
            compressed: false,
        }
    }
}

impl PartitionOptions {
    pub fn of_type(partition_type: EntryType) -> Self {
        Self {
            partition_type,
            ..Self::default()
        }
    }
}

impl Partition {
    pub(crate) fn new(name: &str, opts: &PartitionOptions, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            partition_type: opts.partition_type,
            entries: BTreeSet::new(),
            max_size: opts.max_size,
            ttl_ms: opts.ttl_ms,
            read_only: opts.read_only,
            shared: opts.shared,
            indexed: opts.indexed,
            compressed: opts.compressed,
            created_at: now,
        }
    }
}

/// Configuration snapshot of one namespace (not persisted on its own).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub partitions: Vec<String>,
    pub default_access_level: AccessLevel,
    pub persistent: bool,
    pub distributed: bool,
    pub consistency: ConsistencyLevel,
    pub cache_enabled: bool,
    pub compression_enabled: bool,
    pub encryption_enabled: bool,
}

/// Base64 text encoding for payload bytes.
pub(crate) mod payload {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::entry;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_version_caps_ring() {
        let mut e = entry("k", json!(0));
        for i in 1..=15 {
            e.push_version();
            e.value = serde_json::to_vec(&json!(i)).unwrap();
        }
        assert_eq!(e.version, 16);
        assert_eq!(e.previous_versions.len(), MAX_PREVIOUS_VERSIONS);
        // Oldest retained is version 6, newest is 15
        assert_eq!(e.previous_versions.front().unwrap().version, 6);
        assert_eq!(e.previous_versions.back().unwrap().version, 15);
    }

    #[test]
    fn test_payload_size_ignores_history() {
        let mut e = entry("k", json!("v".repeat(64)));
        let fresh = e.serialized_size();
        assert_eq!(e.payload_size(), fresh);

        for _ in 0..5 {
            e.push_version();
        }
        assert!(e.serialized_size() > fresh);
        // Only the version number changed, and it is still one digit
        assert_eq!(e.payload_size(), fresh);
    }

    #[test]
    fn test_expiry() {
        let mut e = entry("k", json!(1));
        let now = Utc::now();
        assert!(!e.is_expired(now));
        e.expires_at = Some(now);
        assert!(e.is_expired(now));
        assert!(!e.is_expired(now - chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn test_entry_serde_payload_is_base64() {
        let e = entry("k", json!({"a": 1}));
        let json = serde_json::to_value(&e).unwrap();
        assert!(json["value"].is_string());
        assert_eq!(json["type"], "knowledge");

        let parsed: MemoryEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, e);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!(
            "Configuration".parse::<EntryType>().unwrap(),
            EntryType::Configuration
        );
        assert!("nope".parse::<EntryType>().is_err());
        assert_eq!("system".parse::<AccessLevel>().unwrap(), AccessLevel::System);
        assert_eq!(AccessLevel::Swarm.to_string(), "swarm");
    }
}
