//! Property-based tests for identity and conversion
//!
//! 1. Conversion is deterministic
//! 2. Same-name detections fold into one entity but keep one edge each
//! 3. Version resolution never yields an empty version

use intune_graph_ingest::converters::{
    create_detected_application_entity, create_managed_application_entity, resolve_version,
    UNVERSIONED,
};
use intune_graph_ingest::keys;
use intune_graph_ingest::records::{DetectedApp, LobApp, ManagedApp, ManagedAppKind};
use intune_graph_ingest::relationships::device_installed_application;
use intune_graph_store::Entity;
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Strategies
// ============================================================================

fn app_name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 .]{0,24}"
}

fn detection_id_strategy() -> impl Strategy<Value = String> {
    "[a-f0-9]{8,32}"
}

fn version_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        "[0-9]{1,3}(\\.[0-9]{1,3}){0,2}".prop_map(Some),
    ]
}

fn odata_type_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("#microsoft.graph.webApp".to_string())),
        Just(Some("#microsoft.graph.androidLobApp".to_string())),
        Just(Some("#microsoft.graph.iosStoreApp".to_string())),
        Just(Some("#microsoft.graph.win32LobApp".to_string())),
        Just(Some("#microsoft.graph.officeSuiteApp".to_string())),
    ]
}

fn device() -> Entity {
    Entity::new("2d5f3b1e-0000-4000-8000-00000000d001", "user_endpoint", &["Device", "Host"])
}

fn lob(
    version_name: Option<String>,
    version_code: Option<String>,
    version: Option<String>,
) -> ManagedAppKind {
    ManagedAppKind::LineOfBusiness(LobApp {
        version_name,
        version_code,
        version,
        ..Default::default()
    })
}

proptest! {
    #[test]
    fn prop_detected_conversion_is_deterministic(
        id in detection_id_strategy(),
        name in proptest::option::of(app_name_strategy()),
        version in version_strategy(),
    ) {
        let app = DetectedApp { id, display_name: name, version, ..Default::default() };
        prop_assert_eq!(
            create_detected_application_entity(&app),
            create_detected_application_entity(&app)
        );
        prop_assert_eq!(keys::detected_app_key(&app), keys::detected_app_key(&app));
    }

    #[test]
    fn prop_managed_conversion_is_deterministic(
        odata_type in odata_type_strategy(),
        name in proptest::option::of(app_name_strategy()),
        version_name in version_strategy(),
        version_code in version_strategy(),
    ) {
        let app = ManagedApp {
            id: "5e1c9a44-0000-4000-8000-0000000000a1".to_string(),
            odata_type,
            display_name: name,
            kind: lob(version_name, version_code, None),
            ..Default::default()
        };
        prop_assert_eq!(
            create_managed_application_entity(&app),
            create_managed_application_entity(&app)
        );
    }

    #[test]
    fn prop_same_name_detections_fold_but_keep_edges(
        name in app_name_strategy(),
        ids in proptest::collection::hash_set(detection_id_strategy(), 1..8),
    ) {
        let device = device();
        let mut entity_keys = HashSet::new();
        let mut edge_keys = HashSet::new();
        for (i, id) in ids.iter().enumerate() {
            // Alternate case to exercise case folding.
            let display = if i % 2 == 0 { name.to_uppercase() } else { name.to_lowercase() };
            let app = DetectedApp { id: id.clone(), display_name: Some(display), ..Default::default() };
            let entity = create_detected_application_entity(&app);
            edge_keys.insert(device_installed_application(&device, &entity, &app).key);
            entity_keys.insert(entity.key);
        }
        prop_assert_eq!(entity_keys.len(), 1);
        prop_assert_eq!(edge_keys.len(), ids.len());
    }

    #[test]
    fn prop_resolved_version_is_never_blank(
        version_name in version_strategy(),
        version_code in version_strategy(),
        version in version_strategy(),
    ) {
        let app = ManagedApp {
            kind: lob(version_name.clone(), version_code, version),
            ..Default::default()
        };
        let resolved = resolve_version(&app);
        prop_assert!(!resolved.trim().is_empty());
        if let Some(name) = version_name.filter(|v| !v.is_empty()) {
            prop_assert_eq!(resolved, name);
        } else if resolved != UNVERSIONED {
            prop_assert!(resolved.chars().all(|c| c.is_ascii_digit() || c == '.'));
        }
    }
}
