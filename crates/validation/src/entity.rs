//! Untyped entity snapshots, as seen by business rules.

use serde_json::{Map, Value};

use erpguard_core::RecordId;

/// JSON object form of a candidate entity.
pub type EntitySnapshot = Map<String, Value>;

/// Key holding a record's own id.
pub const ID_FIELD: &str = "id";

/// Resolve a dotted field path (`address.city`) inside `entity`.
pub fn field_value<'a>(entity: &'a EntitySnapshot, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = entity.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// The record id carried by the snapshot itself, if any.
pub fn record_id(entity: &EntitySnapshot) -> Option<RecordId> {
    entity.get(ID_FIELD)?.as_str()?.parse().ok()
}

/// Null, empty or whitespace-only string, empty array or empty object.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
