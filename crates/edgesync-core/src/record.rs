//! # Records
//!
//! A record is one row of an entity as exchanged with the master: an ordered
//! JSON object mapping field names to scalar or JSON values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, ValidationError};
use crate::timestamp::Timestamp;
use crate::{CREATED_AT, DATE_FIELDS, ID_FIELD, UPDATED_AT};

/// One row of an entity. Field order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Record(Map::new())
    }

    /// Wraps an existing JSON object.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Record(fields)
    }

    /// Converts a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(fields) => Ok(Record(fields)),
            other => Err(CoreError::NotAnObject(json_kind(&other).to_string())),
        }
    }

    /// Returns the record's id as text, or why it has none.
    ///
    /// Missing, `null`, `false` and blank strings count as missing.
    /// Numbers are accepted and rendered without quotes.
    pub fn id(&self) -> Result<String, ValidationError> {
        match self.0.get(ID_FIELD) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Err(ValidationError::MissingId),
            Some(Value::String(s)) if s.trim().is_empty() => Err(ValidationError::MissingId),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(ValidationError::InvalidId(json_kind(other).to_string())),
        }
    }

    /// Raw value of the field the staleness check looks at:
    /// `updated_at` when non-null, else `created_at` when non-null.
    pub fn effective_date_value(&self) -> Option<&Value> {
        [UPDATED_AT, CREATED_AT]
            .into_iter()
            .filter_map(|field| self.0.get(field))
            .find(|value| !value.is_null())
    }

    /// Parsed effective timestamp, `None` when absent or unparseable.
    pub fn effective_timestamp(&self) -> Option<Timestamp> {
        self.effective_date_value().and_then(Timestamp::from_json)
    }

    /// Rewrites every non-null date field to canonical form.
    ///
    /// Returns the names of fields that could not be parsed; those fields
    /// are removed from the record.
    pub fn normalize_dates(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();

        for field in DATE_FIELDS {
            let Some(value) = self.0.get(field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }

            match Timestamp::from_json(value) {
                Some(ts) => {
                    self.0.insert(field.to_string(), Value::String(ts.to_canonical()));
                }
                None => {
                    self.0.remove(field);
                    dropped.push(field.to_string());
                }
            }
        }

        dropped
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns a field value if it is a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Sets a field value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Removes a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Iterates fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwraps into the underlying JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

/// Short name of a JSON value's type, for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
