//! Normalized entity records and the reserved identifiers used around them.

use serde_json::{Map, Value};

/// One normalized cache entity: field name to scalar/object/array value.
///
/// Records are plain JSON maps so they round-trip through any host-provided
/// serializer without a schema.
pub type EntityRecord = Map<String, Value>;

/// Reserved data identifier for the query root entity.
pub const ROOT_ID: &str = "ROOT_QUERY";

/// Synthetic marker field attached to records and result nodes that should
/// be persisted.
pub const PERSIST_FIELD: &str = "__persist";

/// Default name of the query directive that marks persistable selections.
pub const PERSIST_DIRECTIVE: &str = "persist";

/// JS-style truthiness for JSON values.
///
/// The marker field is written as a boolean by the annotator, but records
/// can arrive from arbitrary host serializers, so the predicate accepts any
/// truthy value the way the original protocol did.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Whether a record carries a truthy persistence marker.
pub fn is_marked(record: &EntityRecord) -> bool {
    record.get(PERSIST_FIELD).map(is_truthy).unwrap_or(false)
}

/// Shallow-merge `incoming` over `base`: incoming fields win, base fields
/// not present in incoming survive. Used by bulk restore so a restored
/// snapshot does not wipe previously persisted fields.
pub fn merge_records(base: Option<EntityRecord>, incoming: &EntityRecord) -> EntityRecord {
    let mut merged = base.unwrap_or_default();
    for (key, value) in incoming {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> EntityRecord {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn test_is_truthy_covers_json_kinds() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!(true)));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn test_is_marked() {
        assert!(is_marked(&record(json!({ "__persist": true, "id": 1 }))));
        assert!(!is_marked(&record(json!({ "__persist": false }))));
        assert!(!is_marked(&record(json!({ "id": 1 }))));
    }

    #[test]
    fn test_merge_records_preserves_base_fields() {
        let base = record(json!({ "a": 1, "b": 2 }));
        let incoming = record(json!({ "b": 3, "c": 4 }));
        let merged = merge_records(Some(base), &incoming);
        assert_eq!(Value::Object(merged), json!({ "a": 1, "b": 3, "c": 4 }));
    }

    #[test]
    fn test_merge_records_without_base() {
        let incoming = record(json!({ "a": 1 }));
        let merged = merge_records(None, &incoming);
        assert_eq!(Value::Object(merged), json!({ "a": 1 }));
    }
}
