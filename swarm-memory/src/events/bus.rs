//! Audit event fan-out
//!
//! A Tokio broadcast channel. Publishing never blocks and never fails a
//! memory operation; a subscriber that falls behind loses the oldest events.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{trace, warn};

use super::types::MemoryEvent;

/// Events buffered per subscriber before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 1024;

pub type SharedEventBus = Arc<EventBus>;

pub struct EventBus {
    sender: broadcast::Sender<MemoryEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Deliver `event` to current subscribers; returns how many there were.
    pub fn publish(&self, event: MemoryEvent) -> usize {
        let event_type = event.event_type();
        let reached = self.sender.send(event).unwrap_or(0);
        trace!(event_type, reached, "Memory event published");
        reached
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoryEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Selects events by type, entry, and actor. Unset criteria match anything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_types: BTreeSet<String>,
    pub entry_id: Option<String>,
    pub actor: Option<String>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only these event types (as returned by [`MemoryEvent::event_type`]).
    pub fn types<I, S>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types.extend(event_types.into_iter().map(Into::into));
        self
    }

    pub fn entry(mut self, entry_id: &str) -> Self {
        self.entry_id = Some(entry_id.to_string());
        self
    }

    pub fn actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn matches(&self, event: &MemoryEvent) -> bool {
        (self.event_types.is_empty() || self.event_types.contains(event.event_type()))
            && self
                .entry_id
                .as_deref()
                .map_or(true, |id| event.entry_id() == Some(id))
            && self
                .actor
                .as_deref()
                .map_or(true, |actor| event.actor() == Some(actor))
    }
}

/// Receiver yielding only events accepted by its filter.
///
/// Lag is logged and skipped rather than surfaced, so an audit consumer
/// keeps reading after a burst.
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<MemoryEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<MemoryEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Wait for the next matching event. Fails only once the bus is gone.
    pub async fn recv(&mut self) -> Result<MemoryEvent, RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event subscriber lagged"),
                Err(closed) => return Err(closed),
            }
        }
    }

    /// Next matching event already queued, without waiting.
    pub fn try_recv(&mut self) -> Result<MemoryEvent, TryRecvError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(missed)) => warn!(missed, "Event subscriber lagged"),
                Err(other) => return Err(other),
            }
        }
    }
}

/// Filtered subscription. Also reachable through a [`SharedEventBus`] by
/// auto-deref.
pub trait EventBusExt {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}
