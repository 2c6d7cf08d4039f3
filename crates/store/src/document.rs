//! Document representation shared by every backend.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::Cursor;
use crate::types::{StoreError, StoreResult};

/// A stored document: store-assigned id plus its JSON fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Decode into a typed entity. The document id is exposed to the entity
    /// as an `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// Cursor positioned at this document for the given order-by field.
    pub fn cursor(&self, field: &str) -> Option<Cursor> {
        self.get(field)
            .map(|value| Cursor::new(value.clone(), self.id.clone()))
    }
}

/// Fields for a document that has not been written yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDocument {
    pub fields: Map<String, Value>,
    /// Field the store fills with its own commit time.
    pub server_timestamp: Option<String>,
}

impl NewDocument {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            server_timestamp: None,
        }
    }

    /// Build from a JSON object value, typically produced by `serde_json::json!`.
    pub fn from_value(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self::new(fields)),
            other => Err(StoreError::invalid_document(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    pub fn with_server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.server_timestamp = Some(field.into());
        self
    }

    /// Materialize with the store-assigned id and commit time (microseconds).
    pub(crate) fn into_document(self, id: String, committed_at: i64) -> Document {
        let mut fields = self.fields;
        fields.remove("id");
        if let Some(field) = self.server_timestamp {
            fields.insert(field, Value::from(committed_at));
        }
        Document::new(id, fields)
    }
}
