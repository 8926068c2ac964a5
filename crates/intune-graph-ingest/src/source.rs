//! Paginated record source.
//!
//! Steps never talk to the Graph API directly; they ask a [`GraphSource`] for
//! one page of a [`Resource`] at a time and follow `next_cursor` until it is
//! absent. Records arrive as raw JSON so the caller keeps the untouched
//! payload for raw data and decides how to treat records it cannot decode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Default number of records per page (the Graph API's default `$top`).
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A listable Graph collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    ManagedDevices,
    ManagedApps,
    ManagedAppDeviceStatuses { app_id: String },
    DetectedApps { device_id: String },
    CompliancePolicies,
    DeviceConfigurations,
    CompliancePolicyStates { device_id: String },
    DeviceConfigurationStates { device_id: String },
}

impl Resource {
    /// Graph API path of the collection.
    pub fn path(&self) -> String {
        match self {
            Resource::Users => "/users".to_string(),
            Resource::ManagedDevices => "/deviceManagement/managedDevices".to_string(),
            Resource::ManagedApps => "/deviceAppManagement/mobileApps".to_string(),
            Resource::ManagedAppDeviceStatuses { app_id } => {
                format!("/deviceAppManagement/mobileApps/{app_id}/deviceStatuses")
            }
            Resource::DetectedApps { device_id } => {
                format!("/deviceManagement/managedDevices/{device_id}/detectedApps")
            }
            Resource::CompliancePolicies => "/deviceManagement/deviceCompliancePolicies".to_string(),
            Resource::DeviceConfigurations => "/deviceManagement/deviceConfigurations".to_string(),
            Resource::CompliancePolicyStates { device_id } => {
                format!("/deviceManagement/managedDevices/{device_id}/deviceCompliancePolicyStates")
            }
            Resource::DeviceConfigurationStates { device_id } => {
                format!("/deviceManagement/managedDevices/{device_id}/deviceConfigurationStates")
            }
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// One page of raw records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("invalid cursor {cursor:?} for {resource}")]
    InvalidCursor { resource: String, cursor: String },
    #[error("request for {resource} failed: {message}")]
    Request { resource: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type SourceResult<T> = Result<T, SourceError>;

#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Fetch the page of `resource` starting at `cursor` (`None` = first page).
    async fn fetch_page(&self, resource: &Resource, cursor: Option<&str>) -> SourceResult<Page>;
}

// ============================================================================
// Fixture-backed source
// ============================================================================

/// Tenant contents as one JSON document. Child collections are keyed by the
/// id of their parent (device id or managed app id).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantFixture {
    pub users: Vec<Value>,
    pub managed_devices: Vec<Value>,
    pub managed_apps: Vec<Value>,
    pub managed_app_device_statuses: BTreeMap<String, Vec<Value>>,
    pub detected_apps: BTreeMap<String, Vec<Value>>,
    pub compliance_policies: Vec<Value>,
    pub device_configurations: Vec<Value>,
    pub compliance_policy_states: BTreeMap<String, Vec<Value>>,
    pub device_configuration_states: BTreeMap<String, Vec<Value>>,
}

impl TenantFixture {
    fn records(&self, resource: &Resource) -> &[Value] {
        fn child<'a>(map: &'a BTreeMap<String, Vec<Value>>, id: &str) -> &'a [Value] {
            map.get(id).map(Vec::as_slice).unwrap_or_default()
        }
        match resource {
            Resource::Users => self.users.as_slice(),
            Resource::ManagedDevices => self.managed_devices.as_slice(),
            Resource::ManagedApps => self.managed_apps.as_slice(),
            Resource::ManagedAppDeviceStatuses { app_id } => {
                child(&self.managed_app_device_statuses, app_id)
            }
            Resource::DetectedApps { device_id } => child(&self.detected_apps, device_id),
            Resource::CompliancePolicies => self.compliance_policies.as_slice(),
            Resource::DeviceConfigurations => self.device_configurations.as_slice(),
            Resource::CompliancePolicyStates { device_id } => {
                child(&self.compliance_policy_states, device_id)
            }
            Resource::DeviceConfigurationStates { device_id } => {
                child(&self.device_configuration_states, device_id)
            }
        }
    }
}

/// Serves a [`TenantFixture`] page by page. The cursor is the offset of the
/// next record.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    fixture: TenantFixture,
    page_size: usize,
}

impl FixtureSource {
    pub fn new(fixture: TenantFixture) -> Self {
        Self {
            fixture,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let fixture: TenantFixture = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded tenant fixture");
        Ok(Self::new(fixture))
    }

    /// Page size; zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn fixture(&self) -> &TenantFixture {
        &self.fixture
    }
}

#[async_trait]
impl GraphSource for FixtureSource {
    async fn fetch_page(&self, resource: &Resource, cursor: Option<&str>) -> SourceResult<Page> {
        let records = self.fixture.records(resource);
        let start = match cursor {
            None => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .ok()
                .filter(|offset| *offset <= records.len())
                .ok_or_else(|| SourceError::InvalidCursor {
                    resource: resource.path(),
                    cursor: cursor.to_string(),
                })?,
        };
        let end = (start + self.page_size).min(records.len());
        let next_cursor = (end < records.len()).then(|| end.to_string());

        tracing::trace!(resource = %resource, start, end, "Serving fixture page");
        Ok(Page {
            records: records[start..end].to_vec(),
            next_cursor,
        })
    }
}
