//! Client wire messages
//!
//! Inbound requests are JSON objects such as
//!
//! ```json
//! {"type": "subscribe", "resource": "order", "resourceID": "17"}
//! ```
//!
//! Outbound traffic is either a broker payload passed through untouched or
//! the heartbeat `{"type":"ping","connectionID":"<id>"}`.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// JSON pointer of the text field hashed for delivery tracing
pub const TRACE_TEXT_POINTER: &str = "/content/new/data/attributes/text";

/// Request type of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Subscribe,
    Unsubscribe,
    /// Any other or missing `type`; ignored by the coordinator
    #[default]
    #[serde(other)]
    Other,
}

/// Parsed client request
///
/// Selector fields accept strings as well as numbers and booleans, which
/// are rendered in their JSON text form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type", default, deserialize_with = "kind")]
    pub kind: MessageKind,

    #[serde(default, deserialize_with = "selector")]
    pub method: Option<String>,

    #[serde(default, deserialize_with = "selector")]
    pub resource: Option<String>,

    #[serde(rename = "resourceID", default, deserialize_with = "selector")]
    pub resource_id: Option<String>,

    #[serde(rename = "contextType", default, deserialize_with = "selector")]
    pub context_type: Option<String>,

    #[serde(rename = "contextID", default, deserialize_with = "selector")]
    pub context_id: Option<String>,
}

impl InboundMessage {
    /// Parse a raw frame. Returns `None` for anything that is not a JSON
    /// object of the expected shape.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        match Self::decode(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    data = %String::from_utf8_lossy(raw),
                    "Could not parse client message"
                );
                None
            }
        }
    }

    fn decode(raw: &[u8]) -> serde_json::Result<Self> {
        match serde_json::from_slice::<serde_json::Value>(raw)? {
            value @ serde_json::Value::Object(_) => serde_json::from_value(value),
            _ => Err(serde::de::Error::custom("expected a JSON object")),
        }
    }
}

/// Non-string and unknown `type` values all mean [`MessageKind::Other`]
fn kind<'de, D>(deserializer: D) -> Result<MessageKind, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(v @ serde_json::Value::String(_)) => MessageKind::deserialize(v).unwrap_or_default(),
        _ => MessageKind::Other,
    })
}

fn selector<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => {
            Some(v.to_string())
        }
        _ => None,
    })
}

/// Liveness probe pushed to every client by the pool
#[derive(Debug, Serialize)]
struct Heartbeat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "connectionID")]
    connection_id: &'a str,
}

/// Encode the heartbeat frame for a connection
pub fn heartbeat(connection_id: &str) -> Bytes {
    let ping = Heartbeat {
        kind: "ping",
        connection_id,
    };
    // Serializing two string fields cannot fail
    Bytes::from(serde_json::to_vec(&ping).unwrap_or_default())
}

/// Extract the text at [`TRACE_TEXT_POINTER`] from a delivered payload.
///
/// Objects, arrays, null and empty strings yield `None`.
pub fn trace_text(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    match value.pointer(TRACE_TEXT_POINTER)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_)) => Some(v.to_string()),
        _ => None,
    }
}

/// Hex encoded SHA-256 of a string
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subscribe() {
        let raw = br#"{"type":"subscribe","resource":"order","resourceID":"17"}"#;
        let message = InboundMessage::parse(raw).unwrap();

        assert_eq!(message.kind, MessageKind::Subscribe);
        assert_eq!(message.resource.as_deref(), Some("order"));
        assert_eq!(message.resource_id.as_deref(), Some("17"));
        assert!(message.method.is_none());
        assert!(message.context_type.is_none());
        assert!(message.context_id.is_none());
    }

    #[test]
    fn test_parse_unknown_type() {
        let message = InboundMessage::parse(br#"{"type":"hello"}"#).unwrap();
        assert_eq!(message.kind, MessageKind::Other);

        let message = InboundMessage::parse(br#"{"resource":"order"}"#).unwrap();
        assert_eq!(message.kind, MessageKind::Other);
    }

    #[test]
    fn test_parse_numeric_selectors() {
        let raw = br#"{"type":"unsubscribe","resourceID":17,"contextID":null}"#;
        let message = InboundMessage::parse(raw).unwrap();

        assert_eq!(message.kind, MessageKind::Unsubscribe);
        assert_eq!(message.resource_id.as_deref(), Some("17"));
        assert!(message.context_id.is_none());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(InboundMessage::parse(b"not json").is_none());
        assert!(InboundMessage::parse(b"").is_none());
        assert!(InboundMessage::parse(b"[1,2,3]").is_none());
        assert!(InboundMessage::parse(b"\"subscribe\"").is_none());
    }

    #[test]
    fn test_parse_array_rejected() {
        assert!(InboundMessage::parse(br#"["subscribe","a","b"]"#).is_none());
        assert!(InboundMessage::parse(br#"[{"type":"subscribe"}]"#).is_none());
    }

    #[test]
    fn test_parse_non_string_type() {
        let message = InboundMessage::parse(br#"{"type":5}"#).unwrap();
        assert_eq!(message.kind, MessageKind::Other);

        let message = InboundMessage::parse(br#"{"type":null,"resource":"x"}"#).unwrap();
        assert_eq!(message.kind, MessageKind::Other);
        assert_eq!(message.resource.as_deref(), Some("x"));

        let message = InboundMessage::parse(br#"{"type":{"name":"subscribe"}}"#).unwrap();
        assert_eq!(message.kind, MessageKind::Other);
    }

    #[test]
    fn test_heartbeat_shape() {
        let frame = heartbeat("abc==");
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();

        assert_eq!(value["type"], "ping");
        assert_eq!(value["connectionID"], "abc==");
    }

    #[test]
    fn test_trace_text() {
        let payload = br#"{"content":{"new":{"data":{"attributes":{"text":"random text"}}}}}"#;
        assert_eq!(trace_text(payload).as_deref(), Some("random text"));
    }

    #[test]
    fn test_trace_text_missing() {
        assert!(trace_text(b"{}").is_none());
        assert!(trace_text(b"plain text").is_none());

        let nested = br#"{"content":{"new":{"data":{"attributes":{"text":{"a":1}}}}}}"#;
        assert!(trace_text(nested).is_none());
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
