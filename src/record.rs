//! Record — one item in a remote document collection.
//!
//! DESIGN
//! ======
//! Field values are backend-defined and opaque to this crate: a record is
//! just an id plus a JSON object, like a document in any schemaless store.
//! The only interpretation we perform is ordering by a configured sort
//! field, so this module also owns the total order over JSON values used
//! by sorting and pagination cursors.

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Field values for one record, keyed by field name.
pub type FieldMap = serde_json::Map<String, Value>;

static NULL: Value = Value::Null;

// =============================================================================
// RECORD
// =============================================================================

/// One document: a backend-assigned id plus arbitrary fields.
///
/// The id is immutable once assigned; field values are never interpreted
/// beyond sort ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub fields: FieldMap,
}

impl Record {
    #[must_use]
    pub fn new(id: Uuid, fields: FieldMap) -> Self {
        Self { id, fields }
    }

    /// Value of the named field, if present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Value this record sorts under for the given field.
    /// Records missing the field sort as JSON null.
    #[must_use]
    pub fn sort_key(&self, sort_field: &str) -> &Value {
        self.fields.get(sort_field).unwrap_or(&NULL)
    }
}

// =============================================================================
// SORT ORDER
// =============================================================================

/// Total order over JSON values: null < bool < number < string < array < object.
///
/// Within a type, natural ordering applies. Numbers compare through
/// `f64::total_cmp`; arrays and objects compare by canonical serialization,
/// which is arbitrary but stable — sort fields are expected to hold
/// scalars (timestamps, counters, names) in practice.
#[must_use]
pub fn cmp_sort_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_) | Value::Object(_), _) if rank(a) == rank(b) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
