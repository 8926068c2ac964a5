//! Managed devices and their Intune host agents.
//!
//! A managed device is two things: the physical or virtual machine, which
//! other integrations may also report, and the Intune agent running on it,
//! which only this integration knows about. They are emitted as separate
//! entities joined by `intune_host_agent MANAGES <device>`.

use super::{parse_timestamp, PropertyBuilder};
use crate::keys;
use crate::records::ManagedDevice;
use crate::schema::{EntityDef, HOST_AGENT, MANAGED_DEVICE, SERVER, SMARTPHONE, USER_ENDPOINT};
use intune_graph_store::Entity;

const SERVER_KEYWORDS: &[&str] = &["server"];
const SMARTPHONE_KEYWORDS: &[&str] = &["ios", "ipados", "android", "windows mobile", "windowsmobile"];
const ENDPOINT_KEYWORDS: &[&str] = &["windows", "macos", "mac os", "linux", "chrome"];

fn matches_any(value: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| value.contains(keyword))
}

/// Pick the device `_type` from the reported operating system.
///
/// Order matters: "Windows Server" is a server, "Windows Mobile" a smartphone.
pub fn classify_device(device: &ManagedDevice) -> &'static EntityDef {
    let os = device
        .operating_system
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    if matches_any(&os, SERVER_KEYWORDS) {
        &SERVER
    } else if matches_any(&os, SMARTPHONE_KEYWORDS) {
        &SMARTPHONE
    } else if matches_any(&os, ENDPOINT_KEYWORDS) {
        &USER_ENDPOINT
    } else {
        &MANAGED_DEVICE
    }
}

fn is_compliant(compliance_state: Option<&str>) -> Option<bool> {
    compliance_state.map(|state| state.eq_ignore_ascii_case("compliant"))
}

pub fn create_managed_device_entity(device: &ManagedDevice) -> Entity {
    let kind = classify_device(device);
    let mac_address = device
        .wi_fi_mac_address
        .clone()
        .or_else(|| device.ethernet_mac_address.clone())
        .filter(|mac| !mac.is_empty());
    let jail_broken = device
        .jail_broken
        .as_deref()
        .and_then(|value| match value.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        });

    let properties = PropertyBuilder::new()
        .set("id", device.id.as_str())
        .set_opt("name", device.device_name.clone())
        .set_opt("displayName", device.device_name.clone())
        .set_opt("deviceId", device.azure_ad_device_id.clone())
        .set_opt("userId", device.user_id.clone())
        .set_opt("userDisplayName", device.user_display_name.clone())
        .set_opt("email", device.email_address.as_deref().map(str::to_lowercase))
        .set_opt("platform", device.operating_system.as_deref().map(str::to_lowercase))
        .set_opt("osName", device.operating_system.clone())
        .set_opt("osVersion", device.os_version.clone())
        .set_opt("deviceType", device.device_type.clone())
        .set_opt("make", device.manufacturer.clone())
        .set_opt("model", device.model.clone())
        .set_opt("serial", device.serial_number.clone().filter(|s| !s.is_empty()))
        .set_opt("macAddress", mac_address)
        .set_opt("complianceState", device.compliance_state.clone())
        .set_opt("compliant", is_compliant(device.compliance_state.as_deref()))
        .set_opt("encrypted", device.is_encrypted)
        .set_opt("supervised", device.is_supervised)
        .set_opt("jailBroken", jail_broken)
        .set_opt("ownerType", device.managed_device_owner_type.clone())
        .set_opt("managementAgent", device.management_agent.clone())
        .set_opt("physicalMemoryInBytes", device.physical_memory_in_bytes)
        .set_opt("totalStorageSpaceInBytes", device.total_storage_space_in_bytes)
        .set_opt("freeStorageSpaceInBytes", device.free_storage_space_in_bytes)
        .set_opt("enrolledOn", parse_timestamp(device.enrolled_date_time.as_deref()))
        .set_opt("lastSeenOn", parse_timestamp(device.last_sync_date_time.as_deref()))
        .build();

    Entity::new(keys::device_key(&device.id), kind.entity_type, kind.class)
        .with_properties(properties)
}

pub fn create_host_agent_entity(device: &ManagedDevice) -> Entity {
    let display_name = match device.device_name.as_deref() {
        Some(name) if !name.trim().is_empty() => format!("Intune Agent on {name}"),
        _ => "Intune Agent".to_string(),
    };
    let properties = PropertyBuilder::new()
        .set("id", device.id.as_str())
        .set("name", "Intune Agent")
        .set("displayName", display_name)
        .set("function", vec!["endpoint-configuration", "endpoint-compliance"])
        .set_opt("managementAgent", device.management_agent.clone())
        .set_opt("complianceState", device.compliance_state.clone())
        .set_opt("compliant", is_compliant(device.compliance_state.as_deref()))
        .set_opt("lastSeenOn", parse_timestamp(device.last_sync_date_time.as_deref()))
        .build();
    Entity::new(
        keys::host_agent_key(&device.id),
        HOST_AGENT.entity_type,
        HOST_AGENT.class,
    )
    .with_properties(properties)
}
