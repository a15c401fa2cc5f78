//! Sample data model: values, the field schema, and one captured record.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use thiserror::Error;

/// Version of the field order produced by the assembler. Bump whenever probe
/// order or field naming changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Name of the capture-time field, always first in a schema.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Rendering of [`Value::Absent`] in the store.
pub const ABSENT_MARKER: &str = "NA";

/// Timestamp rendering used in the store.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single metric value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Timestamp(DateTime<Local>),
    Absent,
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Number(v as f64)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<DateTime<Local>> for Value {
    fn from(v: DateTime<Local>) -> Self {
        Value::Timestamp(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) if n.is_finite() => write!(f, "{}", n),
            Value::Number(_) => f.write_str(ABSENT_MARKER),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Value::Absent => f.write_str(ABSENT_MARKER),
        }
    }
}

/// Schema construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("field {0:?} declared more than once")]
    DuplicateField(String),
    #[error("field name must not be empty")]
    EmptyField,
}

/// Ordered, duplicate-free list of field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<String>,
}

impl Schema {
    pub fn new(fields: Vec<String>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.is_empty() {
                return Err(SchemaError::EmptyField);
            }
            if !seen.insert(field.as_str()) {
                return Err(SchemaError::DuplicateField(field.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }
}

/// One captured record: exactly one value per schema field.
#[derive(Debug, Clone)]
pub struct Sample {
    schema: Arc<Schema>,
    captured_at: DateTime<Local>,
    values: Vec<Value>,
}

impl Sample {
    /// Builds a sample. Returns `None` if `values` does not match the schema
    /// length.
    pub fn new(
        schema: Arc<Schema>,
        captured_at: DateTime<Local>,
        values: Vec<Value>,
    ) -> Option<Self> {
        (values.len() == schema.len()).then_some(Self {
            schema,
            captured_at,
            values,
        })
    }

    /// Builds a sample whose length the caller has already matched to the
    /// schema.
    pub(crate) fn from_parts(
        schema: Arc<Schema>,
        captured_at: DateTime<Local>,
        values: Vec<Value>,
    ) -> Self {
        debug_assert_eq!(values.len(), schema.len());
        Self {
            schema,
            captured_at,
            values,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema.position(field).map(|i| &self.values[i])
    }

    /// Iterates `(field, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Number of fields that carry a value.
    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_absent()).count()
    }
}
