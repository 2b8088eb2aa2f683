//! Webhook event decoding.
//!
//! Turns a verified request body into an [`EventBatch`].
//!
//! ## Decoding Flow
//!
//! ```text
//! raw bytes → JSON document → shape check → EventBatch
//! ```
//!
//! Only syntax errors and a wrong top-level shape are failures. Missing
//! optional fields never are.

pub mod types;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

pub use types::{
    ContentProvider, DeliveryContext, Event, EventBatch, ImageSet, Message, Source,
};

/// Why a webhook body could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("body is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unexpected payload shape: {0}")]
    Shape(String),
}

/// Decode a webhook body into an event batch.
///
/// The top level must be an object with an `events` array whose elements
/// are objects. Everything else about the payload is optional.
pub fn decode_events(raw: &[u8]) -> Result<EventBatch, DecodeError> {
    let document: Value = serde_json::from_slice(raw).map_err(DecodeError::Malformed)?;

    check_shape(&document)?;

    let batch: EventBatch =
        serde_json::from_value(document).map_err(|e| DecodeError::Shape(e.to_string()))?;

    info!(
        destination = %batch.destination,
        event_count = batch.events.len(),
        "line_events_decoded"
    );

    Ok(batch)
}

/// Reject documents that are not `{"events": [{...}, ...]}`.
fn check_shape(document: &Value) -> Result<(), DecodeError> {
    let root = document
        .as_object()
        .ok_or_else(|| DecodeError::Shape("top level is not an object".to_string()))?;

    let events = match root.get("events") {
        Some(Value::Array(events)) => events,
        Some(_) => return Err(DecodeError::Shape("`events` is not an array".to_string())),
        None => return Err(DecodeError::Shape("missing `events`".to_string())),
    };

    if let Some(index) = events.iter().position(|e| !e.is_object()) {
        debug!(index = index, "line_event_not_object");
        return Err(DecodeError::Shape(format!("event {} is not an object", index)));
    }

    Ok(())
}
