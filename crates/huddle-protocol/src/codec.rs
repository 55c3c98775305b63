//! Codec trait and implementations for serializing/deserializing messages.
//!
//! Chat events travel as WebSocket *text* frames, so a codec here turns a
//! Rust value into a `String` rather than raw bytes. The room engine encodes
//! an event once and hands the same string to every recipient.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to text and decode text back.
///
/// `Send + Sync + 'static` lets a codec live inside long-lived tasks that
/// Tokio may move between worker threads.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text payload.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a text payload back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is malformed or doesn't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use huddle_protocol::{Codec, Event, JsonCodec, ParticipantId};
///
/// let codec = JsonCodec;
/// let text = codec.encode(&Event::Leave { id: ParticipantId(3) }).unwrap();
/// assert_eq!(text, r#"{"type":"leave","data":{"id":3}}"#);
///
/// let decoded: Event = codec.decode(&text).unwrap();
/// assert_eq!(decoded, Event::Leave { id: ParticipantId(3) });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}
