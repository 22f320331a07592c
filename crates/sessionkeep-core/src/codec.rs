//! Tag-and-base64 text encoding for credential payloads.
//!
//! Stores only hold text, but credential payloads carry raw key bytes. Every
//! `AuthValue::Bytes` leaf is written as `{"type":"Buffer","data":"<base64>"}`
//! and revived on decode. Decoding also accepts `data` as an array of byte
//! values, which is how other tooling serializes the same buffers.
//!
//! An object whose only keys are `type: "Buffer"` and `data` is always read
//! back as bytes, so such an object cannot be stored as a plain object.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};

use sessionkeep_types::credential::AuthValue;
use sessionkeep_types::error::CodecError;

const BUFFER_TAG: &str = "Buffer";

/// Encode a payload into its stored text form.
pub fn encode(value: &AuthValue) -> String {
    to_json(value).to_string()
}

/// Decode stored text back into a payload.
pub fn decode(text: &str) -> Result<AuthValue, CodecError> {
    let json: Value = serde_json::from_str(text).map_err(|e| CodecError::Json(e.to_string()))?;
    from_json(json)
}

/// Convert a payload into a JSON value, tagging byte leaves.
pub fn to_json(value: &AuthValue) -> Value {
    match value {
        AuthValue::Null => Value::Null,
        AuthValue::Bool(b) => Value::Bool(*b),
        AuthValue::Number(n) => Value::Number(n.clone()),
        AuthValue::String(s) => Value::String(s.clone()),
        AuthValue::Bytes(bytes) => {
            let mut tagged = Map::new();
            tagged.insert("type".to_string(), Value::String(BUFFER_TAG.to_string()));
            tagged.insert("data".to_string(), Value::String(STANDARD.encode(bytes)));
            Value::Object(tagged)
        }
        AuthValue::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        AuthValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
    }
}

/// Convert a JSON value into a payload, reviving tagged buffers.
pub fn from_json(value: Value) -> Result<AuthValue, CodecError> {
    Ok(match value {
        Value::Null => AuthValue::Null,
        Value::Bool(b) => AuthValue::Bool(b),
        Value::Number(n) => AuthValue::Number(n),
        Value::String(s) => AuthValue::String(s),
        Value::Array(items) => AuthValue::Array(
            items
                .into_iter()
                .map(from_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Object(fields) => {
            if is_buffer_tag(&fields) {
                return revive_buffer(fields);
            }
            let mut out = BTreeMap::new();
            for (k, v) in fields {
                out.insert(k, from_json(v)?);
            }
            AuthValue::Object(out)
        }
    })
}

fn is_buffer_tag(fields: &Map<String, Value>) -> bool {
    fields.len() == 2
        && fields.get("type").and_then(Value::as_str) == Some(BUFFER_TAG)
        && fields.contains_key("data")
}

fn revive_buffer(mut fields: Map<String, Value>) -> Result<AuthValue, CodecError> {
    match fields.remove("data") {
        Some(Value::String(encoded)) => STANDARD
            .decode(encoded.as_bytes())
            .map(AuthValue::Bytes)
            .map_err(|e| CodecError::InvalidBase64(e.to_string())),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| CodecError::InvalidBufferTag(format!("not a byte: {item}")))
            })
            .collect::<Result<Vec<u8>, _>>()
            .map(AuthValue::Bytes),
        other => Err(CodecError::InvalidBufferTag(format!(
            "unsupported data field: {}",
            other.unwrap_or(Value::Null)
        ))),
    }
}
