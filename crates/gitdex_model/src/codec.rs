//! Record serialization.

use crate::error::{ModelError, ModelResult};
use crate::record::Record;
use crate::runtime::RuntimeInfo;
use crate::schema::Schema;
use crate::types::RecordId;
use serde_json::Value;
use std::sync::Arc;

/// Converts records to and from the bytes stored in a working tree.
///
/// `deserialize(serialize(r))` must round-trip the id and fields.
pub trait RecordCodec: Send + Sync {
    /// File suffix (without the dot) for records written by this codec.
    fn suffix(&self) -> &str;

    /// Serializes a record, stamping it with `runtime`.
    fn serialize(&self, record: &Record, runtime: &RuntimeInfo) -> ModelResult<Vec<u8>>;

    /// Deserializes and validates a record of the given schema.
    fn deserialize(&self, schema: &Arc<Schema>, bytes: &[u8]) -> ModelResult<Record>;
}

/// Pretty-printed UTF-8 JSON codec.
///
/// The stored object holds the fields in schema order followed by
/// `"uuid"` and `"version"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Creates a JSON codec.
    pub fn new() -> Self {
        Self
    }

    /// Builds a record from an already parsed JSON document, as served by
    /// mirrors and search backends.
    pub fn decode_value(&self, schema: &Arc<Schema>, value: Value) -> ModelResult<Record> {
        let Value::Object(mut object) = value else {
            return Err(ModelError::decoding_failed("expected a JSON object"));
        };

        let id = match object.remove("uuid") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(RecordId::new(id)?),
            Some(other) => {
                return Err(ModelError::decoding_failed(format!(
                    "uuid must be a string, got {other}"
                )))
            }
        };
        // Stamps written by other tools may not follow our layout.
        let version = object
            .remove("version")
            .and_then(|v| serde_json::from_value::<RuntimeInfo>(v).ok());

        let mut record = Record::new(schema, object)?;
        if let Some(id) = id {
            record = record.with_id(id);
        }
        if let Some(version) = version {
            record.set_version(version);
        }
        Ok(record)
    }
}

impl RecordCodec for JsonCodec {
    fn suffix(&self) -> &str {
        "json"
    }

    fn serialize(&self, record: &Record, runtime: &RuntimeInfo) -> ModelResult<Vec<u8>> {
        let mut object = record.to_document();
        object.insert("version".into(), serde_json::to_value(runtime)?);
        Ok(serde_json::to_vec_pretty(&Value::Object(object))?)
    }

    fn deserialize(&self, schema: &Arc<Schema>, bytes: &[u8]) -> ModelResult<Record> {
        self.decode_value(schema, serde_json::from_slice(bytes)?)
    }
}
