use thiserror::Error;

use crate::EventKind;

/// Errors raised while encoding or decoding integration events.
#[derive(Debug, Error)]
pub enum EventError {
    /// The body is not JSON or lacks the fields the event requires.
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The `event_type` tag names no event in the catalog.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// The body decoded, but carries a different tag than requested.
    #[error("Event type mismatch: expected {expected}, found {actual}")]
    KindMismatch {
        expected: EventKind,
        actual: EventKind,
    },
}
