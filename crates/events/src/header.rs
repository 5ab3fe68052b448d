use chrono::{DateTime, Utc};
use common::{AggregateId, CorrelationId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EventKind;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fields common to every integration event.
///
/// Flattened into each event's JSON object rather than nested, so the wire
/// shape is `{event_id, event_type, aggregate_id, occurred_at,
/// correlation_id, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The event's tag, also its routing key.
    pub event_type: EventKind,

    /// The aggregate this event is about (the order).
    pub aggregate_id: AggregateId,

    /// When the event was created, UTC.
    pub occurred_at: DateTime<Utc>,

    /// Correlation ID of the business flow the event belongs to.
    pub correlation_id: CorrelationId,
}

impl EventHeader {
    /// Creates a header with a fresh event ID stamped with the current time.
    pub fn new(kind: EventKind, aggregate_id: AggregateId, correlation_id: CorrelationId) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: kind,
            aggregate_id,
            occurred_at: Utc::now(),
            correlation_id,
        }
    }
}
