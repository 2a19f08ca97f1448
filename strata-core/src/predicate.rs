//! Persistence predicates and the serializer callables consumed by the
//! storage adapter.

use crate::error::StoreError;
use crate::record::EntityRecord;
use std::sync::Arc;

/// Operation kinds the persistence predicate is consulted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Set,
    Delete,
}

/// Decides whether a given operation may touch the persistent store.
///
/// The signature is deliberately asymmetric: `Get` and `Delete` carry no
/// record (there is nothing to inspect yet), `Set` carries the record being
/// written. Multiple call sites depend on this shape.
pub type PersistPredicate =
    Arc<dyn Fn(StoreOp, &str, Option<&EntityRecord>) -> bool + Send + Sync>;

/// Serializes a record before it is written to the medium. Receives the data
/// identifier as context.
pub type Normalizer =
    Arc<dyn Fn(&EntityRecord, &str) -> Result<String, StoreError> + Send + Sync>;

/// Deserializes a raw stored value back into a record. Receives the data
/// identifier as context. Failures propagate to the caller untouched.
pub type Denormalizer =
    Arc<dyn Fn(&str, &str) -> Result<EntityRecord, StoreError> + Send + Sync>;

/// Predicate that persists everything.
pub fn always_persist() -> PersistPredicate {
    Arc::new(|_, _, _| true)
}

/// Default serializer: compact JSON.
pub fn default_normalizer() -> Normalizer {
    Arc::new(|record, data_id| {
        serde_json::to_string(record).map_err(|e| StoreError::Serialize {
            data_id: data_id.to_string(),
            reason: e.to_string(),
        })
    })
}

/// Default deserializer: JSON object.
pub fn default_denormalizer() -> Denormalizer {
    Arc::new(|value, data_id| {
        serde_json::from_str(value).map_err(|e| StoreError::Deserialize {
            data_id: data_id.to_string(),
            reason: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_serializers_round_trip() {
        let record = json!({ "id": 1, "name": "n" })
            .as_object()
            .cloned()
            .unwrap();

        let encoded = default_normalizer()(&record, "Post:1").unwrap();
        let decoded = default_denormalizer()(&encoded, "Post:1").unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_default_denormalizer_propagates_malformed_input() {
        let err = default_denormalizer()("not json", "Post:1").unwrap_err();
        assert!(matches!(err, StoreError::Deserialize { .. }));
        assert!(format!("{err}").contains("Post:1"));
    }

    #[test]
    fn test_always_persist() {
        let predicate = always_persist();
        assert!(predicate(StoreOp::Get, "x", None));
        assert!(predicate(StoreOp::Set, "x", None));
        assert!(predicate(StoreOp::Delete, "x", None));
    }
}
