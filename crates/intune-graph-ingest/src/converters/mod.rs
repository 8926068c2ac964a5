//! Entity converters: Graph source record → entity.
//!
//! Every converter is pure and total: a missing optional field leaves the
//! matching property absent, it never fails the conversion. Raw data is
//! attached by the calling step, which holds the untouched source payload.

pub mod account;
pub mod applications;
pub mod devices;
pub mod policies;
pub mod users;

pub use account::create_account_entity;
pub use applications::{
    create_detected_application_entity, create_managed_application_entity, resolve_version,
    AppDiscriminator, UNVERSIONED,
};
pub use devices::{classify_device, create_host_agent_entity, create_managed_device_entity};
pub use policies::{
    create_policy_entity, create_policy_state_entity, state_severity, PolicyStateKind,
};
pub use users::create_user_entity;

use chrono::{DateTime, Datelike};
use intune_graph_store::Properties;
use serde_json::Value;

/// Canonical temporal representation: milliseconds since the Unix epoch.
///
/// Graph reports "never" as `0001-01-01T00:00:00Z`; that and anything
/// unparseable become `None`.
pub fn parse_timestamp(value: Option<&str>) -> Option<i64> {
    let parsed = DateTime::parse_from_rfc3339(value?.trim()).ok()?;
    if parsed.year() <= 1 {
        return None;
    }
    Some(parsed.timestamp_millis())
}

/// Lowercased display name, absent when the display name is absent or blank.
pub fn lowercase_name(display_name: Option<&str>) -> Option<String> {
    crate::keys::normalized_app_name(display_name)
}

/// Accumulates entity properties, dropping absent values.
#[derive(Debug, Default)]
pub struct PropertyBuilder {
    properties: Properties,
}

impl PropertyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn set_opt<V: Into<Value>>(mut self, name: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.properties.insert(name.to_string(), value.into());
        }
        self
    }

    pub fn build(self) -> Properties {
        self.properties
    }
}
