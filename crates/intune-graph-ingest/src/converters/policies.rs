//! Compliance policies, device configurations and their per-device states.
//!
//! Both policy families have the same shape: a tenant-level policy entity and
//! one `Finding` per (device, policy) pair describing how that device fares.

use super::{parse_timestamp, PropertyBuilder};
use crate::keys;
use crate::records::{DevicePolicy, PolicyState, SettingState};
use crate::schema::{
    EntityDef, COMPLIANCE_POLICY, COMPLIANCE_POLICY_STATE, DEVICE_CONFIGURATION,
    DEVICE_CONFIGURATION_STATE,
};
use intune_graph_store::Entity;

/// Which policy family a policy or state record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStateKind {
    Compliance,
    Configuration,
}

impl PolicyStateKind {
    pub fn policy_def(&self) -> &'static EntityDef {
        match self {
            PolicyStateKind::Compliance => &COMPLIANCE_POLICY,
            PolicyStateKind::Configuration => &DEVICE_CONFIGURATION,
        }
    }

    pub fn state_def(&self) -> &'static EntityDef {
        match self {
            PolicyStateKind::Compliance => &COMPLIANCE_POLICY_STATE,
            PolicyStateKind::Configuration => &DEVICE_CONFIGURATION_STATE,
        }
    }

    pub fn policy_key(&self, policy_id: &str) -> String {
        match self {
            PolicyStateKind::Compliance => keys::compliance_policy_key(policy_id),
            PolicyStateKind::Configuration => keys::device_configuration_key(policy_id),
        }
    }

    pub fn state_key(&self, device_id: &str, policy_id: &str) -> String {
        keys::policy_state_key(self.state_def().entity_type, device_id, policy_id)
    }

    fn category(&self) -> &'static str {
        match self {
            PolicyStateKind::Compliance => "Endpoint Compliance",
            PolicyStateKind::Configuration => "Endpoint Configuration",
        }
    }
}

/// Severity of a policy state value as `(label, numeric)`.
///
/// | state                                  | severity      | numeric |
/// |----------------------------------------|---------------|---------|
/// | compliant, remediated                  | none          | 0       |
/// | notApplicable, notAssigned             | none          | 0       |
/// | unknown (and unrecognised values)      | informational | 1       |
/// | conflict, error                        | medium        | 5       |
/// | nonCompliant                           | high          | 7       |
pub fn state_severity(state: Option<&str>) -> (&'static str, u8) {
    match state.map(str::to_ascii_lowercase).as_deref() {
        Some("compliant") | Some("remediated") => ("none", 0),
        Some("notapplicable") | Some("notassigned") => ("none", 0),
        Some("conflict") | Some("error") => ("medium", 5),
        Some("noncompliant") => ("high", 7),
        _ => ("informational", 1),
    }
}

fn is_compliant(state: Option<&str>) -> bool {
    matches!(
        state.map(str::to_ascii_lowercase).as_deref(),
        Some("compliant") | Some("remediated")
    )
}

fn is_not_applicable(state: Option<&str>) -> bool {
    matches!(
        state.map(str::to_ascii_lowercase).as_deref(),
        Some("notapplicable") | Some("notassigned")
    )
}

fn failing_settings(settings: &[SettingState]) -> Vec<String> {
    settings
        .iter()
        .filter(|setting| {
            let (_, severity) = state_severity(setting.state.as_deref());
            severity >= 5
        })
        .filter_map(|setting| {
            setting
                .setting_name
                .clone()
                .or_else(|| setting.setting.clone())
        })
        .collect()
}

pub fn create_policy_entity(kind: PolicyStateKind, policy: &DevicePolicy) -> Entity {
    let def = kind.policy_def();
    let properties = PropertyBuilder::new()
        .set("id", policy.id.as_str())
        .set_opt("name", policy.display_name.clone())
        .set_opt("displayName", policy.display_name.clone())
        .set_opt("description", policy.description.clone())
        .set_opt(
            "policyType",
            policy
                .odata_type
                .as_deref()
                .map(|t| t.trim_start_matches("#microsoft.graph.").to_string()),
        )
        .set_opt("version", policy.version)
        .set_opt("createdOn", parse_timestamp(policy.created_date_time.as_deref()))
        .set_opt("lastUpdatedOn", parse_timestamp(policy.last_modified_date_time.as_deref()))
        .build();
    Entity::new(kind.policy_key(&policy.id), def.entity_type, def.class).with_properties(properties)
}

/// Finding for one policy on one device. `state.id` is the policy id.
pub fn create_policy_state_entity(
    kind: PolicyStateKind,
    device_id: &str,
    state: &PolicyState,
) -> Entity {
    let def = kind.state_def();
    let value = state.state.as_deref();
    let compliant = is_compliant(value);
    let (severity, numeric_severity) = state_severity(value);

    let properties = PropertyBuilder::new()
        .set("id", format!("{}|{}", device_id, state.id))
        .set("policyId", state.id.as_str())
        .set("deviceId", device_id)
        .set_opt("name", state.display_name.clone())
        .set_opt("displayName", state.display_name.clone())
        .set("category", kind.category())
        .set_opt("state", state.state.clone())
        .set("compliant", compliant)
        .set("open", !compliant && !is_not_applicable(value))
        .set("severity", severity)
        .set("numericSeverity", numeric_severity)
        .set_opt("platformType", state.platform_type.clone())
        .set_opt("settingCount", state.setting_count)
        .set_opt("version", state.version)
        .set("failingSettings", failing_settings(&state.setting_states))
        .build();
    Entity::new(kind.state_key(device_id, &state.id), def.entity_type, def.class)
        .with_properties(properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: &str) -> PolicyState {
        PolicyState {
            id: "c0ffee00-0000-4000-8000-0000000000p1".to_string(),
            display_name: Some("Require BitLocker".to_string()),
            state: Some(value.to_string()),
            setting_states: vec![
                SettingState {
                    setting_name: Some("BitLocker".to_string()),
                    state: Some("nonCompliant".to_string()),
                    ..Default::default()
                },
                SettingState {
                    setting_name: Some("Firewall".to_string()),
                    state: Some("compliant".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn non_compliant_state_is_open_and_high() {
        let entity =
            create_policy_state_entity(PolicyStateKind::Compliance, "device-0001", &state("nonCompliant"));
        assert_eq!(
            entity.key,
            "intune_compliance_policy_state:device-0001|c0ffee00-0000-4000-8000-0000000000p1"
        );
        assert_eq!(entity.bool_property("compliant"), Some(false));
        assert_eq!(entity.bool_property("open"), Some(true));
        assert_eq!(entity.str_property("severity"), Some("high"));
        assert_eq!(entity.property("numericSeverity"), Some(&json!(7)));
        assert_eq!(entity.property("failingSettings"), Some(&json!(["BitLocker"])));
    }

    #[test]
    fn not_applicable_state_is_closed() {
        let entity = create_policy_state_entity(
            PolicyStateKind::Configuration,
            "device-0001",
            &state("notApplicable"),
        );
        assert_eq!(entity.entity_type, "intune_device_configuration_state");
        assert_eq!(entity.bool_property("compliant"), Some(false));
        assert_eq!(entity.bool_property("open"), Some(false));
    }

    #[test]
    fn unknown_state_is_informational() {
        assert_eq!(state_severity(Some("unknown")), ("informational", 1));
        assert_eq!(state_severity(None), ("informational", 1));
        assert_eq!(state_severity(Some("Remediated")), ("none", 0));
    }

    #[test]
    fn policy_entity_strips_odata_namespace() {
        let policy = DevicePolicy {
            id: "p1".to_string(),
            odata_type: Some("#microsoft.graph.windows10CompliancePolicy".to_string()),
            ..Default::default()
        };
        let entity = create_policy_entity(PolicyStateKind::Compliance, &policy);
        assert_eq!(entity.key, "intune_compliance_policy:p1");
        assert_eq!(
            entity.str_property("policyType"),
            Some("windows10CompliancePolicy")
        );
    }
}
