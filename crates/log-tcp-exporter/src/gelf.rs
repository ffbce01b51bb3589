//! GELF message shape and wire framing.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to marshal message to JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("final message contains invalid UTF-8 characters")]
    InvalidUtf8,
}

/// One log record in GELF shape. `extra` fields are not serialised directly;
/// [`GelfMessage::encode`] re-keys each one under a leading underscore.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GelfMessage {
    pub version: String,
    pub host: String,
    pub short_message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub full_message: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub timestamp: i64,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub level: u32,
    #[serde(skip)]
    pub extra: HashMap<String, String>,
}

fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

fn is_zero_u32(value: &u32) -> bool {
    *value == 0
}

impl GelfMessage {
    /// Produces the framed wire bytes: the JSON object with every extra
    /// re-keyed as `_<k>`, terminated by exactly one NUL byte.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            for (key, extra_value) in &self.extra {
                object.insert(format!("_{key}"), JsonValue::String(extra_value.clone()));
            }
        }

        let mut data = serde_json::to_vec(&value)?;
        if data.last() != Some(&0) {
            data.push(0);
        }
        if std::str::from_utf8(&data[..data.len() - 1]).is_err() {
            return Err(EncodeError::InvalidUtf8);
        }
        Ok(data)
    }
}
