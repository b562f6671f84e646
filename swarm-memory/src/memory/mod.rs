//! In-memory building blocks of a namespace.
//!
//! # Modules
//!
//! - [`entry_store`]: canonical id → entry map with size accounting
//! - [`partitions`]: named, non-owning groupings of entry ids
//! - [`cache`]: bounded FIFO read-through cache with lazy TTL
//! - [`index`]: inverted term index over key, tags, and type
//! - [`query`]: filter/sort/paginate and search options
//! - [`stats`]: usage statistics over live entries

pub mod cache;
pub mod entry_store;
pub mod index;
pub mod partitions;
pub mod query;
pub mod stats;

pub use cache::EntryCache;
pub use entry_store::EntryStore;
pub use index::{MatchMode, SearchIndex};
pub use partitions::PartitionRegistry;
pub use query::{MemoryQuery, MemorySearchOptions, SortField, SortOrder};
pub use stats::MemoryStatistics;
