//! Relationship builders.
//!
//! Builders are pure: they take endpoints by reference and return a new value.
//! [`build_relationship`] always produces the default key
//! `<CLASS>|<from>|<to>`; kinds that allow several parallel edges between the
//! same two entities derive their final key with [`with_disambiguator`].

use crate::converters::{resolve_version, UNVERSIONED};
use crate::keys;
use crate::records::{DetectedApp, ManagedApp, ManagedAppDeviceStatus};
use crate::schema::{relationship_type, MICROSOFT_TENANT_TYPE, USER};
use intune_graph_store::{
    Entity, MappedRelationship, Properties, Relationship, RelationshipClass,
    RelationshipDirection, RelationshipMapping,
};
use serde_json::{json, Value};

pub fn build_relationship(
    class: RelationshipClass,
    from: &Entity,
    to: &Entity,
    properties: Properties,
) -> Relationship {
    Relationship {
        key: keys::relationship_key(class, &from.key, &to.key),
        relationship_type: relationship_type(&from.entity_type, class, &to.entity_type),
        class,
        from_key: from.key.clone(),
        to_key: to.key.clone(),
        properties,
    }
}

/// The same relationship under `<default key>|<disambiguator>`.
pub fn with_disambiguator(relationship: Relationship, disambiguator: &str) -> Relationship {
    Relationship {
        key: keys::append_disambiguator(&relationship.key, disambiguator),
        ..relationship
    }
}

/// `<device> INSTALLED intune_detected_application`, one edge per detection.
pub fn device_installed_application(
    device: &Entity,
    detected_app_entity: &Entity,
    detected_app: &DetectedApp,
) -> Relationship {
    let mut properties = Properties::new();
    properties.insert(
        "version".to_string(),
        json!(detected_app.version.as_deref().unwrap_or(UNVERSIONED)),
    );
    properties.insert("detectionId".to_string(), json!(detected_app.id));
    with_disambiguator(
        build_relationship(
            RelationshipClass::Installed,
            device,
            detected_app_entity,
            properties,
        ),
        &detected_app.id,
    )
}

/// `<device> ASSIGNED intune_managed_application`, one edge per device status.
pub fn device_assigned_application(
    device: &Entity,
    managed_app_entity: &Entity,
    managed_app: &ManagedApp,
    status: &ManagedAppDeviceStatus,
) -> Relationship {
    let installed_version = resolve_version(managed_app);
    let mut properties = Properties::new();
    let mut set = |name: &str, value: Option<Value>| {
        if let Some(value) = value {
            properties.insert(name.to_string(), value);
        }
    };
    // installed, failed, notInstalled, uninstallFailed, pendingInstall, unknown
    set("installState", status.install_state.clone().map(Value::from));
    set("installStateDetail", status.install_state_detail.clone().map(Value::from));
    set("errorCode", status.error_code.map(Value::from));
    set("installedVersion", Some(Value::from(installed_version)));
    with_disambiguator(
        build_relationship(
            RelationshipClass::Assigned,
            device,
            managed_app_entity,
            properties,
        ),
        &status.id,
    )
}

fn mapped(
    class: RelationshipClass,
    source: &Entity,
    direction: RelationshipDirection,
    target_type: &str,
    filter: Properties,
    properties: Properties,
) -> MappedRelationship {
    let relationship_type = match direction {
        RelationshipDirection::Forward => relationship_type(&source.entity_type, class, target_type),
        RelationshipDirection::Reverse => relationship_type(target_type, class, &source.entity_type),
    };
    MappedRelationship {
        key: keys::mapped_relationship_key(class, &source.key, direction, target_type, &filter),
        relationship_type,
        class,
        mapping: RelationshipMapping {
            direction,
            source_entity_key: source.key.clone(),
            target_type: target_type.to_string(),
            target_filter_properties: filter,
            skip_target_creation: true,
        },
        properties,
    }
}

/// `azure_user HAS <device>` for an owner that is not in this run, resolved
/// later by email. `None` when there is no usable email.
pub fn user_device_mapped(
    device: &Entity,
    user_id: Option<&str>,
    email: Option<&str>,
) -> Option<MappedRelationship> {
    let email = email.map(str::trim).filter(|e| !e.is_empty())?.to_lowercase();
    let mut filter = Properties::new();
    filter.insert("email".to_string(), json!(email));
    let mut properties = Properties::new();
    if let Some(user_id) = user_id.filter(|id| !id.is_empty()) {
        properties.insert("userId".to_string(), json!(user_id));
    }
    Some(mapped(
        RelationshipClass::Has,
        device,
        RelationshipDirection::Reverse,
        USER.entity_type,
        filter,
        properties,
    ))
}

/// `microsoft_tenant HAS intune_account`, resolved against the tenant entity
/// another integration owns.
pub fn tenant_has_account(account: &Entity, tenant: &str) -> MappedRelationship {
    let mut filter = Properties::new();
    filter.insert("_type".to_string(), json!(MICROSOFT_TENANT_TYPE));
    filter.insert("tenantId".to_string(), json!(tenant));
    mapped(
        RelationshipClass::Has,
        account,
        RelationshipDirection::Reverse,
        MICROSOFT_TENANT_TYPE,
        filter,
        Properties::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{LobApp, ManagedAppKind};

    fn device() -> Entity {
        Entity::new("device-0001", "user_endpoint", &["Device", "Host"])
    }

    fn detected_entity() -> Entity {
        Entity::new("IntuneDetected:slack", "intune_detected_application", &["Application"])
    }

    fn detection(id: &str, version: Option<&str>) -> DetectedApp {
        DetectedApp {
            id: id.to_string(),
            display_name: Some("Slack".to_string()),
            version: version.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn default_key_and_type() {
        let rel = build_relationship(
            RelationshipClass::Has,
            &Entity::new("intune_account:t", "intune_account", &["Account"]),
            &device(),
            Properties::new(),
        );
        assert_eq!(rel.key, "HAS|intune_account:t|device-0001");
        assert_eq!(rel.relationship_type, "intune_account_has_user_endpoint");
    }

    #[test]
    fn detections_of_one_app_get_distinct_keys() {
        let a = device_installed_application(&device(), &detected_entity(), &detection("A", Some("4.1")));
        let b = device_installed_application(&device(), &detected_entity(), &detection("B", None));
        assert_eq!(a.to_key, b.to_key);
        assert!(a.key.ends_with("|A"));
        assert!(b.key.ends_with("|B"));
        assert_ne!(a.key, b.key);
        assert_eq!(b.properties.get("version"), Some(&json!("unversioned")));
        assert_eq!(a.properties.get("detectionId"), Some(&json!("A")));
    }

    #[test]
    fn disambiguator_leaves_input_untouched() {
        let base = build_relationship(
            RelationshipClass::Installed,
            &device(),
            &detected_entity(),
            Properties::new(),
        );
        let derived = with_disambiguator(base.clone(), "X");
        assert_eq!(derived.key, format!("{}|X", base.key));
        assert_eq!(derived.from_key, base.from_key);
    }

    #[test]
    fn assigned_edge_carries_install_state() {
        let app = ManagedApp {
            id: "app-0000001".to_string(),
            kind: ManagedAppKind::LineOfBusiness(LobApp {
                version_name: Some("2.1.0".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let app_entity = Entity::new("app-0000001", "intune_managed_application", &["Application"]);
        let status = ManagedAppDeviceStatus {
            id: "status-1".to_string(),
            install_state: Some("failed".to_string()),
            error_code: Some(-2016345060),
            ..Default::default()
        };
        let rel = device_assigned_application(&device(), &app_entity, &app, &status);
        assert_eq!(rel.key, "ASSIGNED|device-0001|app-0000001|status-1");
        assert_eq!(rel.properties.get("installState"), Some(&json!("failed")));
        assert_eq!(rel.properties.get("installedVersion"), Some(&json!("2.1.0")));
        assert!(!rel.properties.contains_key("installStateDetail"));
    }

    #[test]
    fn mapped_user_needs_email() {
        assert!(user_device_mapped(&device(), Some("u1"), None).is_none());
        assert!(user_device_mapped(&device(), Some("u1"), Some(" ")).is_none());

        let rel = user_device_mapped(&device(), Some("u1"), Some("Alice@Example.com")).unwrap();
        assert_eq!(rel.relationship_type, "azure_user_has_user_endpoint");
        assert_eq!(rel.mapping.direction, RelationshipDirection::Reverse);
        assert_eq!(
            rel.mapping.target_filter_properties.get("email"),
            Some(&json!("alice@example.com"))
        );
        assert_eq!(rel.properties.get("userId"), Some(&json!("u1")));
    }

    #[test]
    fn tenant_mapping_targets_microsoft_tenant() {
        let account = Entity::new("intune_account:t1", "intune_account", &["Account"]);
        let rel = tenant_has_account(&account, "t1");
        assert_eq!(rel.relationship_type, "microsoft_tenant_has_intune_account");
        assert_eq!(rel.mapping.target_type, "microsoft_tenant");
        assert_eq!(rel.mapping.source_entity_key, "intune_account:t1");
    }
}
