//! Filter / sort / paginate over entries, and search options.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AccessLevel, AgentId, EntryType, MemoryEntry};

/// Field used to order query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Structured query. Every supplied predicate must hold, except `tags`
/// which matches if the entry carries any one of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryQuery {
    pub partition: Option<String>,
    pub key: Option<String>,
    pub entry_type: Option<EntryType>,
    pub owner: Option<AgentId>,
    pub access_level: Option<AccessLevel>,
    pub tags: Vec<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub expires_after: Option<DateTime<Utc>>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl MemoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(mut self, partition: &str) -> Self {
        self.partition = Some(partition.to_string());
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
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

    pub fn tags(mut self, tags: Vec<&str>) -> Self {
        self.tags = tags.into_iter().map(String::from).collect();
        self
    }

    pub fn sort(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_by = field;
        self.sort_order = order;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Check every predicate except `partition`, which needs the registry.
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(ref key) = self.key {
            if &entry.key != key {
                return false;
            }
        }
        if let Some(t) = self.entry_type {
            if entry.entry_type != t {
                return false;
            }
        }
        if let Some(ref owner) = self.owner {
            if entry.owner.as_ref() != Some(owner) {
                return false;
            }
        }
        if let Some(level) = self.access_level {
            if entry.access_level != level {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| entry.tags.contains(t)) {
            return false;
        }
        if let Some(after) = self.created_after {
            if entry.created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if entry.created_at >= before {
                return false;
            }
        }
        if let Some(after) = self.expires_after {
            match entry.expires_at {
                Some(exp) if exp > after => {}
                _ => return false,
            }
        }
        true
    }

    /// Sort (stable) and paginate already-filtered entries.
    pub fn sort_and_page(&self, mut entries: Vec<MemoryEntry>) -> Vec<MemoryEntry> {
        entries.sort_by(|a, b| {
            let ord = compare(a, b, self.sort_by);
            match self.sort_order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });
        let page = entries.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        }
    }
}

fn compare(a: &MemoryEntry, b: &MemoryEntry, field: SortField) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Key => a.key.cmp(&b.key),
    }
}

/// Options for term search over key, tags, and type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySearchOptions {
    pub query: String,
    pub partition: Option<String>,
    pub entry_type: Option<EntryType>,
    pub owner: Option<AgentId>,
    /// Also accept indexed terms within one edit of a query token.
    pub fuzzy: bool,
    pub limit: Option<usize>,
}

impl MemorySearchOptions {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::default()
        }
    }

    pub fn fuzzy(mut self) -> Self {
        self.fuzzy = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
