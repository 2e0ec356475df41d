//! The `{ "event": ..., "data": ... }` wire envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use mp_core::error::MpResult;

/// One message on the wire, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name selecting the dispatch target.
    pub event: String,
    /// Payload, passed through to handlers unchanged.
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize to a single JSON text frame.
    pub fn encode(&self) -> MpResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an inbound text frame.
    ///
    /// Returns `Err` when the frame is not JSON at all, and `Ok(None)` when it
    /// is JSON but not envelope-shaped (missing or empty `event`, or no `data`
    /// key). A `null` data value still counts as present.
    pub fn decode(frame: &str) -> MpResult<Option<Self>> {
        let value: Value = serde_json::from_str(frame)?;
        Ok(Self::from_value(value))
    }

    /// Take an already-parsed JSON value apart into an envelope.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };
        let event = match map.remove("event") {
            Some(Value::String(event)) if !event.is_empty() => event,
            _ => return None,
        };
        let data = map.remove("data")?;
        Some(Self { event, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_shape() {
        let env = Envelope::new("join_chat", json!({"chat_id": 7}));
        let text = env.encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"event": "join_chat", "data": {"chat_id": 7}}));
    }

    #[test]
    fn test_decode_valid_frame() {
        let env = Envelope::decode(r#"{"event":"chat_message","data":{"text":"hi"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(env.event, "chat_message");
        assert_eq!(env.data, json!({"text": "hi"}));
    }

    #[test]
    fn test_decode_not_json_is_error() {
        assert!(Envelope::decode("not json").is_err());
    }

    #[test]
    fn test_decode_wrong_shape_is_ignored() {
        assert_eq!(Envelope::decode(r#"{"event":"x"}"#).unwrap(), None);
        assert_eq!(Envelope::decode(r#"{"data":1}"#).unwrap(), None);
        assert_eq!(Envelope::decode(r#"{"event":"","data":1}"#).unwrap(), None);
        assert_eq!(Envelope::decode(r#"{"event":5,"data":1}"#).unwrap(), None);
        assert_eq!(Envelope::decode(r#"[1,2,3]"#).unwrap(), None);
        assert_eq!(Envelope::decode(r#""hello""#).unwrap(), None);
    }

    #[test]
    fn test_decode_null_data_is_present() {
        let env = Envelope::decode(r#"{"event":"ping","data":null}"#).unwrap().unwrap();
        assert_eq!(env.data, Value::Null);
    }
}
