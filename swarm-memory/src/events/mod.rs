//! Observability events for the memory layer
//!
//! Components:
//!
//! 1. **Event Types** (`types.rs`): one variant per audited operation, each
//!    carrying the entry/partition/backup ids and the acting agent.
//!
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub with filtered
//!    subscriptions.
//!
//! ```text
//! ┌───────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ MemoryManager │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)    │     │  (broadcast) │     │   (recv)     │
//! └───────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Delivery is best-effort: a subscriber that falls more than the channel
//! capacity behind misses the oldest events (a raw receiver sees
//! `RecvError::Lagged`; a `FilteredReceiver` logs and moves on). Anything that
//! needs every mutation should read state from the manager, not the bus.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusExt, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::{DeleteReason, MemoryEvent};
