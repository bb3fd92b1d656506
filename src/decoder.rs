//! Avro record decoder.
//!
//! Payloads are schemaless Avro datums: no container header, no embedded
//! schema and no field tags, so decoding relies entirely on the field order
//! and types of the schema the consumer resolved at construction.

use crate::error::{Error, Result};
use apache_avro::types::Value;
use apache_avro::Schema;
use base64::Engine;
use std::io::{Cursor, Read, Seek, SeekFrom};

/// A decoded alert record
#[derive(Debug, Clone, PartialEq)]
pub struct Record(Value);

impl Record {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up a top-level field by name.
    ///
    /// Returns `None` when the field is absent or the decoded value is not
    /// an Avro record.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match &self.0 {
            Value::Record(fields) => fields
                .iter()
                .find(|(name, _)| name == field)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Field names in schema order
    pub fn field_names(&self) -> Vec<&str> {
        match &self.0 {
            Value::Record(fields) => fields.iter().map(|(name, _)| name.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Convert to JSON. Bytes are base64 encoded and unions collapse to the
    /// value of their selected branch.
    pub fn to_json(&self) -> serde_json::Value {
        avro_to_json(&self.0)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.0
    }
}

/// Decodes schemaless Avro datums with a fixed schema.
#[derive(Debug, Clone)]
pub struct AlertDecoder {
    schema: Schema,
}

impl AlertDecoder {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Decode one record from a byte slice.
    pub fn decode(&self, data: &[u8]) -> Result<Record> {
        self.decode_reader(&mut Cursor::new(data))
    }

    /// Rewind `reader` to its start and decode one record from it.
    pub fn decode_reader<R: Read + Seek>(&self, reader: &mut R) -> Result<Record> {
        reader.seek(SeekFrom::Start(0))?;
        let value = apache_avro::from_avro_datum(&self.schema, reader, None).map_err(Error::Decode)?;
        Ok(Record(value))
    }
}

fn avro_to_json(value: &Value) -> serde_json::Value {
    let base64 = base64::engine::general_purpose::STANDARD;
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::json!(i),
        Value::Long(l) => serde_json::json!(l),
        Value::Float(f) => serde_json::json!(f),
        Value::Double(d) => serde_json::json!(d),
        Value::Bytes(b) | Value::Fixed(_, b) => serde_json::Value::String(base64.encode(b)),
        Value::String(s) | Value::Enum(_, s) => serde_json::Value::String(s.clone()),
        Value::Union(_, inner) => avro_to_json(inner),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(avro_to_json).collect()),
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), avro_to_json(v)))
                .collect(),
        ),
        Value::Record(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), avro_to_json(v)))
                .collect(),
        ),
        Value::Date(d) => serde_json::json!(d),
        Value::TimeMillis(t) => serde_json::json!(t),
        Value::TimeMicros(t) => serde_json::json!(t),
        Value::TimestampMillis(t) => serde_json::json!(t),
        Value::TimestampMicros(t) => serde_json::json!(t),
        Value::TimestampNanos(t) => serde_json::json!(t),
        Value::LocalTimestampMillis(t) => serde_json::json!(t),
        Value::LocalTimestampMicros(t) => serde_json::json!(t),
        Value::LocalTimestampNanos(t) => serde_json::json!(t),
        Value::Decimal(d) => {
            let bytes: Vec<u8> = d.try_into().unwrap_or_default();
            serde_json::Value::String(base64.encode(bytes))
        }
        Value::BigDecimal(d) => serde_json::Value::String(d.to_string()),
        Value::Uuid(u) => serde_json::Value::String(u.to_string()),
        // Avro durations have no natural JSON form
        Value::Duration(_) => serde_json::Value::Null,
    }
}
