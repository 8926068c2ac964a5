//! Entity and relationship vocabulary emitted by the Intune steps.

use intune_graph_store::RelationshipClass;

/// A declared entity kind: its `_type` and taxonomy classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDef {
    pub resource_name: &'static str,
    pub entity_type: &'static str,
    pub class: &'static [&'static str],
}

pub const ACCOUNT: EntityDef = EntityDef {
    resource_name: "Account",
    entity_type: "intune_account",
    class: &["Account"],
};

pub const USER: EntityDef = EntityDef {
    resource_name: "User",
    entity_type: "azure_user",
    class: &["User"],
};

pub const USER_ENDPOINT: EntityDef = EntityDef {
    resource_name: "Managed Device",
    entity_type: "user_endpoint",
    class: &["Device", "Host"],
};

pub const SMARTPHONE: EntityDef = EntityDef {
    resource_name: "Managed Device",
    entity_type: "smartphone",
    class: &["Device"],
};

pub const SERVER: EntityDef = EntityDef {
    resource_name: "Managed Device",
    entity_type: "server",
    class: &["Device", "Host"],
};

pub const MANAGED_DEVICE: EntityDef = EntityDef {
    resource_name: "Managed Device",
    entity_type: "intune_managed_device",
    class: &["Device"],
};

/// Every `_type` a managed device can be emitted as.
pub const DEVICE_TYPES: [EntityDef; 4] = [USER_ENDPOINT, SMARTPHONE, SERVER, MANAGED_DEVICE];

pub const HOST_AGENT: EntityDef = EntityDef {
    resource_name: "Intune Host Agent",
    entity_type: "intune_host_agent",
    class: &["HostAgent"],
};

pub const MANAGED_APPLICATION: EntityDef = EntityDef {
    resource_name: "Managed Application",
    entity_type: "intune_managed_application",
    class: &["Application"],
};

pub const DETECTED_APPLICATION: EntityDef = EntityDef {
    resource_name: "Detected Application",
    entity_type: "intune_detected_application",
    class: &["Application"],
};

pub const COMPLIANCE_POLICY: EntityDef = EntityDef {
    resource_name: "Compliance Policy",
    entity_type: "intune_compliance_policy",
    class: &["Configuration", "ControlPolicy"],
};

pub const DEVICE_CONFIGURATION: EntityDef = EntityDef {
    resource_name: "Device Configuration",
    entity_type: "intune_device_configuration",
    class: &["Configuration", "ControlPolicy"],
};

pub const COMPLIANCE_POLICY_STATE: EntityDef = EntityDef {
    resource_name: "Compliance Policy State",
    entity_type: "intune_compliance_policy_state",
    class: &["Finding"],
};

pub const DEVICE_CONFIGURATION_STATE: EntityDef = EntityDef {
    resource_name: "Device Configuration State",
    entity_type: "intune_device_configuration_state",
    class: &["Finding"],
};

/// External entity types targeted by mapped relationships.
pub const MICROSOFT_TENANT_TYPE: &str = "microsoft_tenant";

/// `_type` of a relationship: `<from type>_<class>_<to type>`.
pub fn relationship_type(from_type: &str, class: RelationshipClass, to_type: &str) -> String {
    format!(
        "{}_{}_{}",
        from_type,
        class.as_str().to_ascii_lowercase(),
        to_type
    )
}

/// Relationship `_type`s for one edge kind fanned out over every device type.
pub fn device_relationship_types(
    class: RelationshipClass,
    from: Option<&EntityDef>,
    to: Option<&EntityDef>,
) -> Vec<String> {
    DEVICE_TYPES
        .iter()
        .map(|device| {
            let from = from.unwrap_or(device);
            let to = to.unwrap_or(device);
            relationship_type(from.entity_type, class, to.entity_type)
        })
        .collect()
}
