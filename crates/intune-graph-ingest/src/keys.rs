//! Entity and relationship key builder.
//!
//! Every key written to or looked up in the job state is computed here, so a
//! step that creates an entity and a later step that references it always
//! agree on its key.
//!
//! Rules:
//! - id-addressed entities use the source id verbatim, unless it is shorter
//!   than [`MIN_KEY_LENGTH`]; short ids are prefixed with their key namespace.
//! - detected applications are name-addressed: every observation with the
//!   same display name (case-insensitive) folds into one entity.
//! - relationship keys are `<CLASS>|<from key>|<to key>`, optionally followed
//!   by `|<disambiguator>` when one edge per event is wanted.

use crate::records::DetectedApp;
use intune_graph_store::{Properties, RelationshipClass, RelationshipDirection};

/// Keys shorter than this could collide with platform-reserved short keys.
pub const MIN_KEY_LENGTH: usize = 10;

pub const DETECTED_APP_KEY_PREFIX: &str = "IntuneDetected:";
pub const DETECTED_APP_ID_KEY_PREFIX: &str = "IntuneDetectedId:";

/// Namespaces used when an id-addressed key needs padding.
pub const USER_NAMESPACE: &str = "azure_user";
pub const DEVICE_NAMESPACE: &str = "intune_device";
pub const MANAGED_APP_NAMESPACE: &str = "intune_managed_application";
pub const COMPLIANCE_POLICY_NAMESPACE: &str = "intune_compliance_policy";
pub const DEVICE_CONFIGURATION_NAMESPACE: &str = "intune_device_configuration";

/// Returns the trimmed id, or `None` for a blank one.
pub fn natural_id(id: &str) -> Option<&str> {
    let id = id.trim();
    (!id.is_empty()).then_some(id)
}

/// Key for an entity addressed by the source system's own id. Surrounding
/// whitespace is not part of the id.
pub fn id_key(namespace: &str, id: &str) -> String {
    let id = id.trim();
    if id.chars().count() >= MIN_KEY_LENGTH {
        id.to_string()
    } else {
        format!("{namespace}:{id}")
    }
}

pub fn account_key(tenant: &str) -> String {
    format!("intune_account:{tenant}")
}

pub fn user_key(user_id: &str) -> String {
    id_key(USER_NAMESPACE, user_id)
}

/// Device key. Independent of the device `_type` so status and state records
/// that only carry a device id can find the device.
pub fn device_key(device_id: &str) -> String {
    id_key(DEVICE_NAMESPACE, device_id)
}

pub fn host_agent_key(device_id: &str) -> String {
    format!("intune_host_agent:{}", device_id.trim())
}

pub fn managed_app_key(app_id: &str) -> String {
    id_key(MANAGED_APP_NAMESPACE, app_id)
}

pub fn compliance_policy_key(policy_id: &str) -> String {
    id_key(COMPLIANCE_POLICY_NAMESPACE, policy_id)
}

pub fn device_configuration_key(configuration_id: &str) -> String {
    id_key(DEVICE_CONFIGURATION_NAMESPACE, configuration_id)
}

/// Policy state findings are per device: the state's own id is the policy id
/// and repeats on every device the policy applies to.
pub fn policy_state_key(state_type: &str, device_id: &str, policy_id: &str) -> String {
    format!("{state_type}:{}|{}", device_id.trim(), policy_id.trim())
}

/// Lowercased display name used for name-addressed application identity.
pub fn normalized_app_name(display_name: Option<&str>) -> Option<String> {
    display_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_lowercase)
}

/// Detected applications are keyed by name so every device reporting the same
/// application points at one entity. A nameless detection falls back to its
/// detection id under a separate prefix, so it can never fold into a named one.
pub fn detected_app_key(detected_app: &DetectedApp) -> String {
    match normalized_app_name(detected_app.display_name.as_deref()) {
        Some(name) => format!("{DETECTED_APP_KEY_PREFIX}{name}"),
        None => format!("{DETECTED_APP_ID_KEY_PREFIX}{}", detected_app.id),
    }
}

pub fn relationship_key(class: RelationshipClass, from_key: &str, to_key: &str) -> String {
    format!("{}|{}|{}", class.as_str(), from_key, to_key)
}

/// Key of one of several parallel edges between the same two entities.
pub fn append_disambiguator(base_key: &str, disambiguator: &str) -> String {
    format!("{base_key}|{disambiguator}")
}

/// Key of a mapped relationship: the local source key, class, direction,
/// target type and the target filter in key order.
pub fn mapped_relationship_key(
    class: RelationshipClass,
    source_key: &str,
    direction: RelationshipDirection,
    target_type: &str,
    filter: &Properties,
) -> String {
    let direction = match direction {
        RelationshipDirection::Forward => "FORWARD",
        RelationshipDirection::Reverse => "REVERSE",
    };
    let filter = filter
        .iter()
        .map(|(k, v)| match v.as_str() {
            Some(s) => format!("{k}={s}"),
            None => format!("{k}={v}"),
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{}|{}|{}:{}:{}",
        source_key,
        class.as_str().to_ascii_lowercase(),
        direction,
        target_type,
        filter
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn detected(id: &str, name: Option<&str>) -> DetectedApp {
        DetectedApp {
            id: id.to_string(),
            display_name: name.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn long_ids_are_used_verbatim() {
        let id = "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0";
        assert_eq!(device_key(id), id);
        assert_eq!(managed_app_key(id), id);
    }

    #[test]
    fn short_ids_are_prefixed_to_minimum_length() {
        assert_eq!(device_key("d1"), "intune_device:d1");
        assert_eq!(user_key("u-42"), "azure_user:u-42");
        assert!(device_key("d1").len() >= MIN_KEY_LENGTH);
        assert_eq!(id_key("ns", "exactly10!"), "exactly10!");
    }

    #[test]
    fn surrounding_whitespace_is_not_part_of_the_key() {
        let id = "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0";
        assert_eq!(device_key(&format!(" {id}\t")), id);
        assert_eq!(device_key(" d1 "), "intune_device:d1");
        assert_eq!(host_agent_key(&format!("{id} ")), format!("intune_host_agent:{id}"));
    }

    #[test]
    fn detected_app_key_is_lowercased_name() {
        assert_eq!(
            detected_app_key(&detected("A", Some("Slack"))),
            "IntuneDetected:slack"
        );
    }

    #[test]
    fn detected_app_key_falls_back_to_id_without_name() {
        assert_eq!(
            detected_app_key(&detected("xyz123", None)),
            "IntuneDetectedId:xyz123"
        );
        // A blank name is not a usable identity either.
        assert_eq!(
            detected_app_key(&detected("xyz123", Some("  "))),
            "IntuneDetectedId:xyz123"
        );
    }

    #[test]
    fn nameless_fallback_cannot_collide_with_named_app() {
        let named = detected_app_key(&detected("A", Some("id:xyz123")));
        let nameless = detected_app_key(&detected("xyz123", None));
        assert_ne!(named, nameless);
    }

    #[test]
    fn relationship_keys_append_disambiguator() {
        let base = relationship_key(
            RelationshipClass::Installed,
            "device-0001",
            "IntuneDetected:slack",
        );
        assert_eq!(base, "INSTALLED|device-0001|IntuneDetected:slack");
        assert_eq!(
            append_disambiguator(&base, "A"),
            "INSTALLED|device-0001|IntuneDetected:slack|A"
        );
    }

    #[test]
    fn mapped_key_lists_filter_in_key_order() {
        let mut filter = Properties::new();
        filter.insert("email".to_string(), json!("alice@example.com"));
        filter.insert("active".to_string(), json!(true));
        let key = mapped_relationship_key(
            RelationshipClass::Has,
            "device-0001",
            RelationshipDirection::Reverse,
            "azure_user",
            &filter,
        );
        assert_eq!(
            key,
            "device-0001|has|REVERSE:azure_user:active=true,email=alice@example.com"
        );
    }

    proptest! {
        #[test]
        fn detected_key_is_deterministic(id in "[a-z0-9]{1,12}", name in proptest::option::of("[A-Za-z ]{1,20}")) {
            let app = detected(&id, name.as_deref());
            prop_assert_eq!(detected_app_key(&app), detected_app_key(&app.clone()));
        }

        #[test]
        fn same_name_any_case_collapses(name in "[A-Za-z]{1,20}", a in "[a-z0-9]{4}", b in "[a-z0-9]{4}") {
            let upper = detected(&a, Some(&name.to_uppercase()));
            let lower = detected(&b, Some(&name.to_lowercase()));
            prop_assert_eq!(detected_app_key(&upper), detected_app_key(&lower));
        }

        #[test]
        fn id_keys_meet_minimum_length(id in "[a-zA-Z0-9-]{1,40}") {
            prop_assert!(device_key(&id).chars().count() >= MIN_KEY_LENGTH);
        }
    }
}
