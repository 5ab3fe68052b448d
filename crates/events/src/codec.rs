//! Two-stage wire codec.

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{EventError, EventHeader, EventKind};

/// An event that can travel over the broker.
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync {
    /// Tag (and routing key) of this event type.
    const KIND: EventKind;

    /// Returns the shared header fields.
    fn header(&self) -> &EventHeader;

    /// Serializes the event to its canonical JSON encoding.
    fn encode(&self) -> Result<Vec<u8>, EventError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Lightweight view of a message used to read only its tag.
#[derive(Deserialize)]
struct TagProbe {
    event_type: String,
}

/// Reads the raw `event_type` tag without decoding the rest of the body.
///
/// Fails with [`EventError::Malformed`] when the body is not a JSON object
/// with a string `event_type` field. Unknown tags are returned as-is; mapping
/// them to an [`EventKind`] is left to the caller.
pub fn peek_event_type(body: &[u8]) -> Result<String, EventError> {
    let probe: TagProbe = serde_json::from_slice(body)?;
    Ok(probe.event_type)
}

/// Decodes a body as one specific event type.
///
/// The tag is checked first so that, for example, a `payment.processed`
/// body that happens to share fields with an `order.created` is refused.
pub fn decode<E: IntegrationEvent>(body: &[u8]) -> Result<E, EventError> {
    let actual: EventKind = peek_event_type(body)?.parse()?;
    if actual != E::KIND {
        return Err(EventError::KindMismatch {
            expected: E::KIND,
            actual,
        });
    }
    Ok(serde_json::from_slice(body)?)
}
