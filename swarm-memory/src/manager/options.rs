//! Per-call options for the manager API.

use std::time::Duration;

use crate::types::{AccessLevel, AgentId, EntryId, EntryType};

#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Target partition; `default` when unset.
    pub partition: Option<String>,
    /// Defaults to the partition's type.
    pub entry_type: Option<EntryType>,
    pub tags: Vec<String>,
    pub owner: Option<AgentId>,
    pub access_level: Option<AccessLevel>,
    pub ttl: Option<Duration>,
    pub references: Vec<EntryId>,
    pub dependencies: Vec<EntryId>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(mut self, partition: &str) -> Self {
        self.partition = Some(partition.to_string());
        self
    }

    pub fn entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn tags(mut self, tags: Vec<&str>) -> Self {
        self.tags = tags.into_iter().map(String::from).collect();
        self
    }

    pub fn owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn access_level(mut self, level: AccessLevel) -> Self {
        self.access_level = Some(level);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn references(mut self, ids: Vec<EntryId>) -> Self {
        self.references = ids;
        self
    }

    pub fn dependencies(mut self, ids: Vec<EntryId>) -> Self {
        self.dependencies = ids;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    pub partition: Option<String>,
    pub requester: Option<AgentId>,
    /// Return the whole entry instead of only its value.
    pub include_metadata: bool,
}

impl RetrieveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(mut self, partition: &str) -> Self {
        self.partition = Some(partition.to_string());
        self
    }

    pub fn requester(mut self, requester: &str) -> Self {
        self.requester = Some(requester.to_string());
        self
    }

    pub fn with_metadata(mut self) -> Self {
        self.include_metadata = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub partition: Option<String>,
    pub updater: Option<AgentId>,
    /// When false the value is replaced without recording a version.
    pub increment_version: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            partition: None,
            updater: None,
            increment_version: true,
        }
    }
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(mut self, partition: &str) -> Self {
        self.partition = Some(partition.to_string());
        self
    }

    pub fn updater(mut self, updater: &str) -> Self {
        self.updater = Some(updater.to_string());
        self
    }

    pub fn without_version(mut self) -> Self {
        self.increment_version = false;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub partition: Option<String>,
    pub deleter: Option<AgentId>,
    /// Skip the delete access check.
    pub force: bool,
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(mut self, partition: &str) -> Self {
        self.partition = Some(partition.to_string());
        self
    }

    pub fn deleter(mut self, deleter: &str) -> Self {
        self.deleter = Some(deleter.to_string());
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShareOptions {
    /// Partition holding the source entry.
    pub partition: Option<String>,
    /// Agent performing the share; checked for read access to the source.
    pub actor: Option<AgentId>,
    /// Overrides the source's access level on the copy.
    pub access_level: Option<AccessLevel>,
}

impl ShareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(mut self, partition: &str) -> Self {
        self.partition = Some(partition.to_string());
        self
    }

    pub fn actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn access_level(mut self, level: AccessLevel) -> Self {
        self.access_level = Some(level);
        self
    }
}
