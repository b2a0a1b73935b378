//! Value codec: how stored bytes are shown to callers, and how caller
//! values are written.
//!
//! Values are always written as JSON. Reading goes through a decode function
//! chosen once at startup: plain text by default, or a protobuf message
//! decoded through compiled descriptor sets and rendered as JSON.

use crate::config::SchemaConfig;
use crate::error::{Result, StoreError};
use prost_reflect::{DescriptorPool, DynamicMessage};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// The decode capability: raw value bytes in, display string out.
pub type DecodeFn = dyn Fn(&[u8]) -> String + Send + Sync;

/// Immutable, shareable value decoder.
#[derive(Clone)]
pub struct ValueCodec {
    decode: Arc<DecodeFn>,
    description: String,
}

impl ValueCodec {
    /// Show values as (lossy) UTF-8 text.
    pub fn passthrough() -> Self {
        Self::from_fn("text", |raw| String::from_utf8_lossy(raw).into_owned())
    }

    /// Wrap an arbitrary decode function.
    pub fn from_fn(
        description: impl Into<String>,
        decode: impl Fn(&[u8]) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            decode: Arc::new(decode),
            description: description.into(),
        }
    }

    /// Decode values as `message_type`, looked up across every descriptor
    /// set in `descriptor_sets` (files produced by
    /// `protoc --descriptor_set_out`).
    pub fn protobuf(descriptor_sets: &[PathBuf], message_type: &str) -> Result<Self> {
        let mut pool = DescriptorPool::new();
        for path in descriptor_sets {
            let bytes = fs::read(path).map_err(|e| {
                StoreError::Schema(format!("failed to read {}: {}", path.display(), e))
            })?;
            pool.decode_file_descriptor_set(bytes.as_slice())
                .map_err(|e| {
                    StoreError::Schema(format!("failed to parse {}: {}", path.display(), e))
                })?;
        }

        let name = message_type.trim_start_matches('.');
        let descriptor = pool.get_message_by_name(name).ok_or_else(|| {
            StoreError::Schema(format!("failed to find the specified type ({name})"))
        })?;

        Ok(Self::from_fn(format!("protobuf:{name}"), move |raw| {
            match DynamicMessage::decode(descriptor.clone(), raw) {
                Ok(message) => serde_json::to_string(&message)
                    .unwrap_or_else(|e| format!("failed to marshal message: {e}")),
                Err(e) => format!("failed to unmarshal message: {e}"),
            }
        }))
    }

    /// Pick the codec for a configuration: schema decode when a schema is
    /// configured, text otherwise.
    pub fn from_schema(schema: Option<&SchemaConfig>) -> Result<Self> {
        match schema {
            Some(schema) => Self::protobuf(&schema.descriptor_sets, &schema.message_type),
            None => Ok(Self::passthrough()),
        }
    }

    /// Render a stored value. Never fails; decode errors become the string.
    pub fn decode(&self, raw: &[u8]) -> String {
        (self.decode)(raw)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::passthrough()
    }
}

impl fmt::Debug for ValueCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueCodec({})", self.description)
    }
}

/// Encode a caller value for storage.
pub fn encode_value(value: &serde_json::Value) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| StoreError::Serialization(format!("unable to marshal the value {value}: {e}")))
}
