//! Message abstraction: headers + opaque payload, with JSON and length-prefixed
//! binary codecs (§4.2).
//!
//! `serialize`/`deserialize` are pure functions over [`Message`], sans-I/O,
//! so they can be unit tested (and property tested) without a transport.

use crate::error::MessageError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A scalar header value — the Rust stand-in for "mapping string→scalar."
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// A string.
    String(String),
    /// A number (stored as f64, matching JSON's single numeric type).
    Number(f64),
    /// A boolean.
    Bool(bool),
    /// An explicit null.
    Null,
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::String(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::String(s)
    }
}

impl From<bool> for HeaderValue {
    fn from(b: bool) -> Self {
        HeaderValue::Bool(b)
    }
}

impl From<f64> for HeaderValue {
    fn from(n: f64) -> Self {
        HeaderValue::Number(n)
    }
}

impl HeaderValue {
    fn to_json(&self) -> Value {
        match self {
            HeaderValue::String(s) => Value::String(s.clone()),
            HeaderValue::Number(n) => {
                serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null)
            }
            HeaderValue::Bool(b) => Value::Bool(*b),
            HeaderValue::Null => Value::Null,
        }
    }

    fn from_json(value: &Value) -> Result<Self, MessageError> {
        match value {
            Value::String(s) => Ok(HeaderValue::String(s.clone())),
            Value::Number(n) => n
                .as_f64()
                .map(HeaderValue::Number)
                .ok_or_else(|| MessageError::Deserialization("non-finite header number".into())),
            Value::Bool(b) => Ok(HeaderValue::Bool(*b)),
            Value::Null => Ok(HeaderValue::Null),
            other => Err(MessageError::Deserialization(format!(
                "header values must be scalar, got {other}"
            ))),
        }
    }
}

/// Headers plus an opaque payload — the unit of exchange over any [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Header fields.
    pub headers: BTreeMap<String, HeaderValue>,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

impl Message {
    /// Construct a message with no headers.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: BTreeMap::new(),
            payload: payload.into(),
        }
    }

    /// Builder-style header insertion.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Serialize a message as a single JSON object with reserved `headers`/`payload`
/// keys. `payload` bytes are embedded as a JSON array of integers (there is no
/// standard opaque-byte type in JSON) so the round-trip law holds exactly.
pub fn serialize_json(message: &Message) -> Result<Vec<u8>, MessageError> {
    let mut headers = Map::new();
    for (k, v) in &message.headers {
        headers.insert(k.clone(), v.to_json());
    }
    let payload: Vec<Value> = message
        .payload
        .iter()
        .map(|b| Value::Number((*b).into()))
        .collect();
    let root = Value::Object(Map::from_iter([
        ("headers".to_string(), Value::Object(headers)),
        ("payload".to_string(), Value::Array(payload)),
    ]));
    serde_json::to_vec(&root).map_err(|e| MessageError::Serialization(e.to_string()))
}

/// Deserialize a message from its JSON representation. Rejects non-object roots.
pub fn deserialize_json(bytes: &[u8]) -> Result<Message, MessageError> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|e| MessageError::Deserialization(e.to_string()))?;
    let obj = root
        .as_object()
        .ok_or_else(|| MessageError::Deserialization("JSON message root must be an object".into()))?;

    let mut headers = BTreeMap::new();
    if let Some(Value::Object(h)) = obj.get("headers") {
        for (k, v) in h {
            headers.insert(k.clone(), HeaderValue::from_json(v)?);
        }
    } else if obj.contains_key("headers") {
        return Err(MessageError::Deserialization(
            "headers field must be an object".into(),
        ));
    }

    let payload = match obj.get("payload") {
        Some(Value::Array(items)) => {
            let mut bytes = Vec::with_capacity(items.len());
            for item in items {
                let n = item
                    .as_u64()
                    .filter(|n| *n <= u8::MAX as u64)
                    .ok_or_else(|| {
                        MessageError::Deserialization("payload bytes must be u8 integers".into())
                    })?;
                bytes.push(n as u8);
            }
            bytes
        }
        Some(_) => {
            return Err(MessageError::Deserialization(
                "payload field must be an array of bytes".into(),
            ))
        }
        None => Vec::new(),
    };

    Ok(Message { headers, payload })
}

/// Serialize a message in the length-prefixed binary framing:
/// `hdr_len:u32_be || hdr_json_bytes || pl_len:u32_be || payload_bytes`.
pub fn serialize_binary(message: &Message) -> Result<Vec<u8>, MessageError> {
    let mut headers = Map::new();
    for (k, v) in &message.headers {
        headers.insert(k.clone(), v.to_json());
    }
    let header_bytes = serde_json::to_vec(&Value::Object(headers))
        .map_err(|e| MessageError::Serialization(e.to_string()))?;

    let mut out = Vec::with_capacity(8 + header_bytes.len() + message.payload.len());
    out.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&(message.payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&message.payload);
    Ok(out)
}

/// Deserialize a message from the binary framing. Reads exactly
/// `4 + hdr_len + 4 + pl_len` bytes; any shortfall is a [`MessageError::Deserialization`].
pub fn deserialize_binary(bytes: &[u8]) -> Result<Message, MessageError> {
    fn take<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], MessageError> {
        let end = cursor
            .checked_add(len)
            .ok_or_else(|| MessageError::Deserialization("frame length overflow".into()))?;
        bytes
            .get(*cursor..end)
            .map(|slice| {
                *cursor = end;
                slice
            })
            .ok_or_else(|| MessageError::Deserialization("truncated binary message frame".into()))
    }

    let mut cursor = 0usize;
    let hdr_len_bytes = take(bytes, &mut cursor, 4)?;
    let hdr_len = u32::from_be_bytes(hdr_len_bytes.try_into().unwrap()) as usize;
    let hdr_bytes = take(bytes, &mut cursor, hdr_len)?;

    let pl_len_bytes = take(bytes, &mut cursor, 4)?;
    let pl_len = u32::from_be_bytes(pl_len_bytes.try_into().unwrap()) as usize;
    let payload = take(bytes, &mut cursor, pl_len)?;

    let header_value: Value =
        serde_json::from_slice(hdr_bytes).map_err(|e| MessageError::Deserialization(e.to_string()))?;
    let header_obj = header_value
        .as_object()
        .ok_or_else(|| MessageError::Deserialization("binary header block must be an object".into()))?;

    let mut headers = BTreeMap::new();
    for (k, v) in header_obj {
        headers.insert(k.clone(), HeaderValue::from_json(v)?);
    }

    Ok(Message {
        headers,
        payload: payload.to_vec(),
    })
}

/// Which codec a message was (de)serialized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// UTF-8 JSON object with `headers`/`payload` keys.
    Json,
    /// 4-byte big-endian length-prefixed binary framing.
    Binary,
}

impl Codec {
    /// Serialize per this codec.
    pub fn serialize(self, message: &Message) -> Result<Vec<u8>, MessageError> {
        match self {
            Codec::Json => serialize_json(message),
            Codec::Binary => serialize_binary(message),
        }
    }

    /// Deserialize per this codec.
    pub fn deserialize(self, bytes: &[u8]) -> Result<Message, MessageError> {
        match self {
            Codec::Json => deserialize_json(bytes),
            Codec::Binary => deserialize_binary(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_round_trip_concrete_scenario() {
        // Scenario 1 from the testable properties: specific headers + payload.
        let message = Message::new(vec![0x00, 0xff, 0x10])
            .with_header("content-type", "application/octet-stream");
        let bytes = serialize_binary(&message).unwrap();

        let hdr_len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let expected_len = 4 + hdr_len + 4 + 3;
        assert_eq!(bytes.len(), expected_len);

        let decoded = deserialize_binary(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_json_round_trip() {
        let message = Message::new(b"hello".to_vec())
            .with_header("x-request-id", "abc123")
            .with_header("retries", 2.0)
            .with_header("ok", true)
            .with_header("nothing", HeaderValue::Null);
        let bytes = serialize_json(&message).unwrap();
        let decoded = deserialize_json(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_json_rejects_non_object_root() {
        let err = deserialize_json(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, MessageError::Deserialization(_)));

        let err = deserialize_json(b"\"just a string\"").unwrap_err();
        assert!(matches!(err, MessageError::Deserialization(_)));
    }

    #[test]
    fn test_json_missing_headers_defaults_empty() {
        let bytes = br#"{"payload": [1,2,3]}"#;
        let decoded = deserialize_json(bytes).unwrap();
        assert!(decoded.headers.is_empty());
        assert_eq!(decoded.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_binary_truncated_header_is_error() {
        // claims an 100-byte header block but body is empty
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100u32.to_be_bytes());
        let err = deserialize_binary(&bytes).unwrap_err();
        assert!(matches!(err, MessageError::Deserialization(_)));
    }

    #[test]
    fn test_binary_truncated_payload_is_error() {
        let message = Message::new(vec![1, 2, 3, 4, 5]);
        let mut bytes = serialize_binary(&message).unwrap();
        bytes.truncate(bytes.len() - 2); // drop the last 2 payload bytes
        let err = deserialize_binary(&bytes).unwrap_err();
        assert!(matches!(err, MessageError::Deserialization(_)));
    }

    #[test]
    fn test_binary_empty_payload_and_headers() {
        let message = Message::new(Vec::new());
        let bytes = serialize_binary(&message).unwrap();
        let decoded = deserialize_binary(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_codec_enum_dispatch() {
        let message = Message::new(b"abc".to_vec()).with_header("k", "v");
        for codec in [Codec::Json, Codec::Binary] {
            let bytes = codec.serialize(&message).unwrap();
            let decoded = codec.deserialize(&bytes).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[cfg(test)]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_header_value() -> impl Strategy<Value = HeaderValue> {
            prop_oneof![
                ".*".prop_map(HeaderValue::String),
                any::<bool>().prop_map(HeaderValue::Bool),
                (-1.0e6f64..1.0e6f64).prop_map(HeaderValue::Number),
                Just(HeaderValue::Null),
            ]
        }

        fn arb_message() -> impl Strategy<Value = Message> {
            (
                prop::collection::vec(("[a-z][a-z0-9_-]{0,12}", arb_header_value()), 0..6),
                prop::collection::vec(any::<u8>(), 0..64),
            )
                .prop_map(|(headers, payload)| Message {
                    headers: headers.into_iter().collect(),
                    payload,
                })
        }

        proptest! {
            #[test]
            fn json_round_trip_holds(message in arb_message()) {
                let bytes = serialize_json(&message).unwrap();
                let decoded = deserialize_json(&bytes).unwrap();
                prop_assert_eq!(decoded, message);
            }

            #[test]
            fn binary_round_trip_holds(message in arb_message()) {
                let bytes = serialize_binary(&message).unwrap();
                let decoded = deserialize_binary(&bytes).unwrap();
                prop_assert_eq!(decoded, message);
            }
        }
    }
}
