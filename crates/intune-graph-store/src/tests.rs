//! Job state tests: key namespace, find-or-insert, endpoint validation, snapshots

use super::*;
use serde_json::json;
use tempfile::tempdir;

fn device(key: &str) -> Entity {
    Entity::new(key, "user_endpoint", &["Device", "Host"])
}

fn app(key: &str) -> Entity {
    Entity::new(key, "intune_detected_application", &["Application"])
}

fn installed(from: &str, to: &str, key: &str) -> Relationship {
    Relationship {
        key: key.to_string(),
        relationship_type: "user_endpoint_installed_intune_detected_application".to_string(),
        class: RelationshipClass::Installed,
        from_key: from.to_string(),
        to_key: to.to_string(),
        properties: Properties::new(),
    }
}

#[tokio::test]
async fn test_add_entity_rejects_duplicate_key() {
    let state = InMemoryJobState::new();
    state.add_entity(device("device-0001")).await.unwrap();

    let err = state.add_entity(device("device-0001")).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { ref key } if key == "device-0001"));
    assert_eq!(state.entity_count(), 1);
}

#[tokio::test]
async fn test_find_or_insert_returns_existing_entity() {
    let state = InMemoryJobState::new();

    let mut first = app("IntuneDetected:slack");
    first
        .properties
        .insert("version".to_string(), json!("4.0.0"));
    let created = state.find_or_insert_entity(first).await.unwrap();
    assert!(created.was_inserted());

    let mut second = app("IntuneDetected:slack");
    second
        .properties
        .insert("version".to_string(), json!("5.0.0"));
    let found = state.find_or_insert_entity(second).await.unwrap();
    assert!(!found.was_inserted());
    // The first observation wins; entities are never mutated.
    assert_eq!(found.entity().str_property("version"), Some("4.0.0"));
    assert_eq!(state.entity_count(), 1);
}

#[tokio::test]
async fn test_find_or_insert_is_atomic_across_tasks() {
    let state = InMemoryJobState::new();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            state
                .find_or_insert_entity(app("IntuneDetected:zoom"))
                .await
                .unwrap()
                .was_inserted()
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1, "exactly one caller creates the entity");
    assert_eq!(state.entity_count(), 1);
}

#[tokio::test]
async fn test_relationship_and_entity_keys_share_namespace() {
    let state = InMemoryJobState::new();
    state.add_entity(device("device-0001")).await.unwrap();
    state.add_entity(app("IntuneDetected:slack")).await.unwrap();
    state
        .add_relationship(installed(
            "device-0001",
            "IntuneDetected:slack",
            "INSTALLED|device-0001|IntuneDetected:slack|A",
        ))
        .await
        .unwrap();

    assert!(state
        .has_key("INSTALLED|device-0001|IntuneDetected:slack|A")
        .await
        .unwrap());
    assert!(state.has_key("device-0001").await.unwrap());
    assert!(!state.has_key("device-0002").await.unwrap());

    let err = state
        .add_entity(device("INSTALLED|device-0001|IntuneDetected:slack|A"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));
}

#[tokio::test]
async fn test_relationship_with_missing_endpoint_is_rejected() {
    let state = InMemoryJobState::new();
    state.add_entity(app("IntuneDetected:slack")).await.unwrap();

    let err = state
        .add_relationship(installed(
            "device-missing",
            "IntuneDetected:slack",
            "INSTALLED|device-missing|IntuneDetected:slack",
        ))
        .await
        .unwrap_err();
    assert!(
        matches!(err, StoreError::MissingEndpoint { ref endpoint_key, .. } if endpoint_key == "device-missing")
    );
    assert_eq!(state.relationship_count(), 0);
    assert!(!state
        .has_key("INSTALLED|device-missing|IntuneDetected:slack")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_mapped_relationship_requires_local_source() {
    let state = InMemoryJobState::new();

    let mut filter = Properties::new();
    filter.insert("email".to_string(), json!("alice@example.com"));
    let mapped = MappedRelationship {
        key: "device-0001|has|FORWARD:azure_user:email=alice@example.com".to_string(),
        relationship_type: "azure_user_has_user_endpoint".to_string(),
        class: RelationshipClass::Has,
        mapping: RelationshipMapping {
            direction: RelationshipDirection::Reverse,
            source_entity_key: "device-0001".to_string(),
            target_type: "azure_user".to_string(),
            target_filter_properties: filter,
            skip_target_creation: true,
        },
        properties: Properties::new(),
    };

    let err = state
        .add_mapped_relationship(mapped.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingEndpoint { .. }));

    state.add_entity(device("device-0001")).await.unwrap();
    state.add_mapped_relationship(mapped).await.unwrap();
    assert_eq!(state.relationship_count(), 1);
}

#[tokio::test]
async fn test_entities_of_type_preserves_insertion_order() {
    let state = InMemoryJobState::new();
    for key in ["device-0003", "device-0001", "device-0002"] {
        state.add_entity(device(key)).await.unwrap();
    }
    state.add_entity(app("IntuneDetected:slack")).await.unwrap();

    let keys: Vec<String> = state
        .entities_of_type("user_endpoint")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.key)
        .collect();
    assert_eq!(keys, vec!["device-0003", "device-0001", "device-0002"]);
    assert!(state.entities_of_type("server").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_snapshot_roundtrips_through_file() {
    let dir = tempdir().unwrap();
    let state = InMemoryJobState::new();
    state
        .add_entity(device("device-0001").with_raw_data(json!({ "id": "device-0001" })))
        .await
        .unwrap();
    state.add_entity(app("IntuneDetected:slack")).await.unwrap();
    state
        .add_relationship(installed(
            "device-0001",
            "IntuneDetected:slack",
            "INSTALLED|device-0001|IntuneDetected:slack|A",
        ))
        .await
        .unwrap();

    let snapshot = state.snapshot().await.unwrap();
    let path = dir.path().join("out").join("graph.json");
    snapshot.write_to(&path).unwrap();

    let loaded = GraphSnapshot::read_from(&path).unwrap();
    assert_eq!(loaded.run_id, state.run_id());
    assert_eq!(loaded.entities, snapshot.entities);
    assert_eq!(loaded.relationships, snapshot.relationships);
    assert_eq!(loaded.digest().unwrap(), snapshot.digest().unwrap());
    assert_eq!(loaded.entity_counts().get("user_endpoint"), Some(&1));
}

#[tokio::test]
async fn test_digest_ignores_run_identity() {
    let first = InMemoryJobState::new();
    let second = InMemoryJobState::new();
    for state in [&first, &second] {
        state.add_entity(device("device-0001")).await.unwrap();
    }

    let a = first.snapshot().await.unwrap();
    let b = second.snapshot().await.unwrap();
    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    assert!(a.digest().unwrap().starts_with(snapshot::SNAPSHOT_DIGEST_PREFIX));
}
