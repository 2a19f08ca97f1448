//! End-to-end flow: directive in the query, link rewriting + annotation,
//! marker-gated normalized writes, and cross-tab reconciliation.

use std::sync::Arc;

use async_graphql_parser::parse_query;
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};

use strata_core::{EntityRecord, ROOT_ID};
use strata_graphql::{has_persist_directive, Operation, OperationResult, PersistLink, ResultStream};
use strata_storage::{AdapterConfig, MemoryMedium, NormalizedStore, StorageAdapter, StorageMedium};

fn record(value: Value) -> EntityRecord {
    value.as_object().cloned().expect("object literal")
}

fn marker_gated_adapter(medium: Arc<MemoryMedium>, prefix: &str) -> StorageAdapter {
    StorageAdapter::new(
        AdapterConfig::new()
            .with_storage(medium)
            .with_prefix(prefix)
            .with_should_persist(PersistLink::persist_predicate()),
    )
    .unwrap()
}

#[tokio::test]
async fn directive_drives_selective_persistence() {
    // The application asks to persist the profile subtree but not the feed.
    let query = parse_query(
        "query {
            profile @persist { id name }
            feed { id }
        }",
    )
    .unwrap();

    let link = PersistLink::new();
    let response = json!({
        "profile": { "id": "Profile:1", "name": "Ada" },
        "feed": { "id": "Feed:1" },
    });

    let forward = |operation: Operation| -> ResultStream {
        // The server must never see the directive.
        assert!(!has_persist_directive(&operation.query, "persist"));
        Box::pin(stream::iter(vec![OperationResult {
            data: Some(response.clone()),
        }]))
    };

    let results: Vec<_> = link
        .request(Operation::new(query), forward)
        .unwrap()
        .collect()
        .await;
    let data = results[0].data.as_ref().unwrap();

    assert_eq!(data["profile"]["__persist"], json!(true));
    assert_eq!(data["feed"]["__persist"], json!(false));

    // The normalized write path hands each annotated entity to the adapter;
    // the marker-aware predicate decides what reaches the medium.
    let medium = Arc::new(MemoryMedium::new());
    let adapter = marker_gated_adapter(medium.clone(), "app:");

    adapter
        .set(ROOT_ID, record(json!({ "profile": "Profile:1", "feed": "Feed:1" })))
        .unwrap();
    adapter
        .set("Profile:1", record(data["profile"].clone()))
        .unwrap();
    adapter
        .set("Feed:1", record(data["feed"].clone()))
        .unwrap();

    // Root always persists, marked entities persist, unmarked ones do not.
    assert!(medium.get_item("app:ROOT_QUERY").is_some());
    assert!(medium.get_item("app:Profile:1").is_some());
    assert!(medium.get_item("app:Feed:1").is_none());

    // The overlay still serves the unmarked entity.
    assert_eq!(
        adapter.get("Feed:1").unwrap(),
        Some(record(json!({ "id": "Feed:1", "__persist": false })))
    );
}

#[tokio::test]
async fn persisted_entities_survive_a_new_session() {
    let medium = Arc::new(MemoryMedium::new());

    {
        let adapter = marker_gated_adapter(medium.clone(), "app:");
        adapter
            .set(
                "Profile:1",
                record(json!({ "id": "Profile:1", "__persist": true })),
            )
            .unwrap();
    }

    // A fresh adapter over the same medium sees the prior session's data.
    let adapter = marker_gated_adapter(medium, "app:");
    let restored = adapter.get("Profile:1").unwrap().unwrap();
    assert_eq!(restored["id"], json!("Profile:1"));
}

#[test]
fn misconfigured_adapter_fails_fast() {
    let err = StorageAdapter::new(AdapterConfig::new()).unwrap_err();
    assert!(format!("{err}").contains("storage"));
}
