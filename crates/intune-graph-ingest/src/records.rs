//! Microsoft Graph source records (device management, beta shapes).
//!
//! Only the fields the converters read are modelled; everything else is
//! ignored on input and survives only in an entity's raw data.

use serde::de::DeserializeOwned;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

/// A decoded Graph record with its own id.
pub trait SourceRecord: DeserializeOwned {
    fn record_id(&self) -> &str;

    fn record_id_mut(&mut self) -> &mut String;

    /// Strip surrounding whitespace from the id, so the entity key and the
    /// `id` property match the keys other records compute for it.
    fn normalize_id(&mut self) {
        let id = self.record_id_mut();
        let trimmed = id.trim();
        if trimmed.len() != id.len() {
            *id = trimmed.to_string();
        }
    }
}

macro_rules! impl_source_record {
    ($($record:ty),* $(,)?) => {
        $(impl SourceRecord for $record {
            fn record_id(&self) -> &str {
                &self.id
            }

            fn record_id_mut(&mut self) -> &mut String {
                &mut self.id
            }
        })*
    };
}

impl_source_record!(
    User,
    ManagedDevice,
    ManagedApp,
    ManagedAppDeviceStatus,
    DetectedApp,
    DevicePolicy,
    PolicyState,
);

/// Accepts a string, number or boolean and keeps it as a string.
///
/// Version fields are strings on some app subtypes and integers on others.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub mail: Option<String>,
    pub account_enabled: Option<bool>,
    pub job_title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDevice {
    pub id: String,
    pub user_id: Option<String>,
    pub device_name: Option<String>,
    pub user_display_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub email_address: Option<String>,
    pub operating_system: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<String>,
    pub compliance_state: Option<String>,
    pub managed_device_owner_type: Option<String>,
    pub management_agent: Option<String>,
    pub enrolled_date_time: Option<String>,
    pub last_sync_date_time: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub is_encrypted: Option<bool>,
    pub is_supervised: Option<bool>,
    /// `"True"`, `"False"` or `"Unknown"`.
    pub jail_broken: Option<String>,
    #[serde(rename = "azureADDeviceId")]
    pub azure_ad_device_id: Option<String>,
    pub wi_fi_mac_address: Option<String>,
    pub ethernet_mac_address: Option<String>,
    pub physical_memory_in_bytes: Option<i64>,
    pub total_storage_space_in_bytes: Option<i64>,
    pub free_storage_space_in_bytes: Option<i64>,
}

/// A managed app of any subtype.
///
/// The Graph API returns one list whose elements are distinguished by
/// `@odata.type`. Fields every subtype carries live here; subtype-only fields
/// live in [`ManagedAppKind`], chosen by the tag.
#[derive(Debug, Clone, Default)]
pub struct ManagedApp {
    pub id: String,
    pub odata_type: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub notes: Option<String>,
    pub owner: Option<String>,
    pub developer: Option<String>,
    pub publishing_state: Option<String>,
    pub is_featured: Option<bool>,
    pub privacy_information_url: Option<String>,
    pub information_url: Option<String>,
    pub created_date_time: Option<String>,
    pub last_modified_date_time: Option<String>,
    pub kind: ManagedAppKind,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedAppFields {
    id: String,
    #[serde(rename = "@odata.type")]
    odata_type: Option<String>,
    display_name: Option<String>,
    description: Option<String>,
    publisher: Option<String>,
    notes: Option<String>,
    owner: Option<String>,
    developer: Option<String>,
    publishing_state: Option<String>,
    is_featured: Option<bool>,
    privacy_information_url: Option<String>,
    information_url: Option<String>,
    created_date_time: Option<String>,
    last_modified_date_time: Option<String>,
}

impl<'de> Deserialize<'de> for ManagedApp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let fields = ManagedAppFields::deserialize(&value).map_err(<D::Error as de::Error>::custom)?;
        // An untagged record is the common case.
        let kind = match fields.odata_type {
            Some(_) => ManagedAppKind::deserialize(&value).map_err(<D::Error as de::Error>::custom)?,
            None => ManagedAppKind::Other,
        };
        Ok(ManagedApp {
            id: fields.id,
            odata_type: fields.odata_type,
            display_name: fields.display_name,
            description: fields.description,
            publisher: fields.publisher,
            notes: fields.notes,
            owner: fields.owner,
            developer: fields.developer,
            publishing_state: fields.publishing_state,
            is_featured: fields.is_featured,
            privacy_information_url: fields.privacy_information_url,
            information_url: fields.information_url,
            created_date_time: fields.created_date_time,
            last_modified_date_time: fields.last_modified_date_time,
            kind,
        })
    }
}

/// Subtype-specific shape of a managed app, selected by `@odata.type`.
///
/// Tags not listed here decode as [`ManagedAppKind::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "@odata.type")]
pub enum ManagedAppKind {
    #[serde(rename = "#microsoft.graph.webApp")]
    Web(WebApp),
    #[serde(
        rename = "#microsoft.graph.iosStoreApp",
        alias = "#microsoft.graph.androidStoreApp",
        alias = "#microsoft.graph.androidManagedStoreApp",
        alias = "#microsoft.graph.managedIOSStoreApp",
        alias = "#microsoft.graph.managedAndroidStoreApp",
        alias = "#microsoft.graph.microsoftStoreForBusinessApp",
        alias = "#microsoft.graph.winGetApp"
    )]
    Store(StoreApp),
    #[serde(
        rename = "#microsoft.graph.androidLobApp",
        alias = "#microsoft.graph.iosLobApp",
        alias = "#microsoft.graph.macOSLobApp",
        alias = "#microsoft.graph.win32LobApp",
        alias = "#microsoft.graph.managedAndroidLobApp",
        alias = "#microsoft.graph.managedIOSLobApp",
        alias = "#microsoft.graph.windowsMobileMSI",
        alias = "#microsoft.graph.windowsUniversalAppX"
    )]
    LineOfBusiness(LobApp),
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebApp {
    pub app_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreApp {
    pub app_store_url: Option<String>,
    pub package_id: Option<String>,
    pub bundle_id: Option<String>,
}

/// Uploaded app package. Each platform reports its version under a different
/// field, and some as integers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobApp {
    #[serde(default, deserialize_with = "lenient_string")]
    pub version_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub identity_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: Option<String>,
    pub committed_content_version: Option<String>,
    pub package_id: Option<String>,
    pub bundle_id: Option<String>,
}

impl ManagedAppKind {
    /// Version candidates in preference order: name-style before numeric
    /// codes before the raw version string.
    pub fn version_candidates(&self) -> Vec<&str> {
        match self {
            ManagedAppKind::LineOfBusiness(app) => [
                &app.version_name,
                &app.version_code,
                &app.version_number,
                &app.identity_version,
                &app.version,
            ]
            .into_iter()
            .filter_map(|candidate| candidate.as_deref())
            .collect(),
            ManagedAppKind::Web(_) | ManagedAppKind::Store(_) | ManagedAppKind::Other => Vec::new(),
        }
    }

    /// Where users get the app: the site of a web app, the store listing of a
    /// store app.
    pub fn production_url(&self) -> Option<&str> {
        match self {
            ManagedAppKind::Web(app) => app.app_url.as_deref(),
            ManagedAppKind::Store(app) => app.app_store_url.as_deref(),
            ManagedAppKind::LineOfBusiness(_) | ManagedAppKind::Other => None,
        }
    }

    pub fn package_id(&self) -> Option<&str> {
        match self {
            ManagedAppKind::Store(app) => app.package_id.as_deref(),
            ManagedAppKind::LineOfBusiness(app) => app.package_id.as_deref(),
            ManagedAppKind::Web(_) | ManagedAppKind::Other => None,
        }
    }

    pub fn bundle_id(&self) -> Option<&str> {
        match self {
            ManagedAppKind::Store(app) => app.bundle_id.as_deref(),
            ManagedAppKind::LineOfBusiness(app) => app.bundle_id.as_deref(),
            ManagedAppKind::Web(_) | ManagedAppKind::Other => None,
        }
    }

    pub fn committed_content_version(&self) -> Option<&str> {
        match self {
            ManagedAppKind::LineOfBusiness(app) => app.committed_content_version.as_deref(),
            _ => None,
        }
    }
}

/// Install status of a managed app on one device (`mobileAppInstallStatus`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedAppDeviceStatus {
    pub id: String,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub install_state: Option<String>,
    pub install_state_detail: Option<String>,
    pub error_code: Option<i64>,
    pub user_principal_name: Option<String>,
    pub last_sync_date_time: Option<String>,
}

/// An application observed on a device. `id` is unique per detection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedApp {
    pub id: String,
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: Option<String>,
    pub size_in_byte: Option<i64>,
    pub device_count: Option<i64>,
    pub platform: Option<String>,
    pub publisher: Option<String>,
}

/// A compliance policy or a device configuration profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePolicy {
    pub id: String,
    #[serde(rename = "@odata.type")]
    pub odata_type: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub created_date_time: Option<String>,
    pub last_modified_date_time: Option<String>,
    pub version: Option<i64>,
}

/// State of one policy on one device. `id` is the policy's id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyState {
    pub id: String,
    pub display_name: Option<String>,
    pub state: Option<String>,
    pub platform_type: Option<String>,
    pub setting_count: Option<i64>,
    pub version: Option<i64>,
    #[serde(default)]
    pub setting_states: Vec<SettingState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingState {
    pub setting: Option<String>,
    pub setting_name: Option<String>,
    pub state: Option<String>,
    pub current_value: Option<String>,
    pub error_description: Option<String>,
}
