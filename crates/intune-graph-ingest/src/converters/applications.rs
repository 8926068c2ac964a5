//! Managed and detected applications.
//!
//! ```text
//!   managed app (per tenant, id-addressed)      detected app (per name)
//!   ┌───────────────────────────────┐           ┌──────────────────────┐
//!   │ @odata.type ► AppDiscriminator│           │ IntuneDetected:<name>│
//!   │   lob?  mobile?               │  MANAGES  │                      │
//!   │ version ► resolve_version     │──────────►│ one per display name │
//!   └───────────────────────────────┘           └──────────────────────┘
//! ```

use super::{lowercase_name, parse_timestamp, PropertyBuilder};
use crate::keys;
use crate::records::{DetectedApp, ManagedApp};
use crate::schema::{DETECTED_APPLICATION, MANAGED_APPLICATION};
use intune_graph_store::Entity;

/// Version reported when no candidate version field is present.
pub const UNVERSIONED: &str = "unversioned";

const ODATA_TYPE_PREFIX: &str = "#microsoft.graph.";

/// Substrings of the lowercased discriminator marking a line-of-business app
/// (uploaded by the tenant rather than pulled from a store).
const LINE_OF_BUSINESS_KEYWORDS: &[&str] = &["lob"];

/// Substrings marking an app that targets mobile platforms. Web apps run on
/// mobile and desktop alike and count as mobile.
const MOBILE_KEYWORDS: &[&str] = &["ios", "android", "mobile", "webapp"];

/// The `@odata.type` tag of a managed app, e.g. `#microsoft.graph.androidLobApp`.
///
/// An absent tag classifies as the common case: not line-of-business, not mobile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppDiscriminator<'a>(Option<&'a str>);

impl<'a> AppDiscriminator<'a> {
    pub fn new(odata_type: Option<&'a str>) -> Self {
        Self(odata_type)
    }

    pub fn of(app: &'a ManagedApp) -> Self {
        Self(app.odata_type.as_deref())
    }

    /// Subtype name without the namespace, e.g. `androidLobApp`.
    pub fn subtype(&self) -> Option<&'a str> {
        self.0
            .map(|tag| tag.strip_prefix(ODATA_TYPE_PREFIX).unwrap_or(tag))
            .filter(|subtype| !subtype.is_empty())
    }

    fn matches(&self, keywords: &[&str]) -> bool {
        match self.0 {
            Some(tag) => {
                let tag = tag.to_lowercase();
                keywords.iter().any(|keyword| tag.contains(keyword))
            }
            None => false,
        }
    }

    pub fn is_line_of_business(&self) -> bool {
        self.matches(LINE_OF_BUSINESS_KEYWORDS)
    }

    pub fn is_mobile(&self) -> bool {
        self.matches(MOBILE_KEYWORDS)
    }
}

/// Best available version of a managed app.
///
/// Only line-of-business packages report a version; their candidates are
/// tried in the order [`crate::records::ManagedAppKind::version_candidates`] gives, skipping
/// blank values.
pub fn resolve_version(app: &ManagedApp) -> String {
    app.kind
        .version_candidates()
        .into_iter()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(UNVERSIONED)
        .to_string()
}

/// Tenant-level record of an app Intune deploys. Carries nothing specific to
/// one device installation.
pub fn create_managed_application_entity(app: &ManagedApp) -> Entity {
    let discriminator = AppDiscriminator::of(app);
    let line_of_business = discriminator.is_line_of_business();
    let notes: Vec<String> = app.notes.iter().filter(|n| !n.is_empty()).cloned().collect();

    let properties = PropertyBuilder::new()
        .set("id", app.id.as_str())
        .set_opt("name", lowercase_name(app.display_name.as_deref()))
        .set_opt("displayName", app.display_name.clone())
        .set_opt("description", app.description.clone())
        .set("notes", notes)
        .set_opt("appType", discriminator.subtype())
        .set("COTS", !line_of_business)
        .set("external", !line_of_business)
        .set("mobile", discriminator.is_mobile())
        .set_opt("productionURL", app.kind.production_url())
        .set_opt("publisher", app.publisher.clone())
        .set("isPublished", app.publishing_state.as_deref() == Some("published"))
        .set_opt("createdOn", parse_timestamp(app.created_date_time.as_deref()))
        .set_opt("lastUpdatedOn", parse_timestamp(app.last_modified_date_time.as_deref()))
        .set_opt("featured", app.is_featured)
        .set_opt("privacyInformationURL", app.privacy_information_url.clone())
        .set_opt("informationURL", app.information_url.clone())
        .set_opt("owner", app.owner.clone().filter(|o| !o.is_empty()))
        .set_opt("developer", app.developer.clone())
        .set("version", resolve_version(app))
        .set_opt("committedContentVersion", app.kind.committed_content_version())
        .set_opt("packageId", app.kind.package_id())
        .set_opt("bundleId", app.kind.bundle_id())
        .build();

    Entity::new(
        keys::managed_app_key(&app.id),
        MANAGED_APPLICATION.entity_type,
        MANAGED_APPLICATION.class,
    )
    .with_properties(properties)
}

/// Global application entity shared by every device reporting the same name.
///
/// Holds nothing device- or detection-specific beyond the first observation's
/// version; per-device versions live on the `INSTALLED` edges.
pub fn create_detected_application_entity(app: &DetectedApp) -> Entity {
    let properties = PropertyBuilder::new()
        .set_opt("name", lowercase_name(app.display_name.as_deref()))
        .set_opt("displayName", app.display_name.clone())
        .set_opt("version", app.version.clone())
        .set_opt("sizeInByte", app.size_in_byte)
        .set_opt("platform", app.platform.clone())
        .set_opt("publisher", app.publisher.clone())
        .build();
    Entity::new(
        keys::detected_app_key(app),
        DETECTED_APPLICATION.entity_type,
        DETECTED_APPLICATION.class,
    )
    .with_properties(properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{LobApp, ManagedAppKind, StoreApp, WebApp};

    fn managed(odata_type: Option<&str>) -> ManagedApp {
        ManagedApp {
            id: "5e1c9a44-0000-4000-8000-0000000000a1".to_string(),
            odata_type: odata_type.map(str::to_string),
            display_name: Some("Company Portal".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn web_app_is_mobile_and_not_line_of_business() {
        let d = AppDiscriminator::new(Some("#microsoft.graph.webApp"));
        assert!(!d.is_line_of_business());
        assert!(d.is_mobile());
        assert_eq!(d.subtype(), Some("webApp"));
    }

    #[test]
    fn lob_discriminator_is_line_of_business() {
        let d = AppDiscriminator::new(Some("#microsoft.graph.androidLobApp"));
        assert!(d.is_line_of_business());
        assert!(d.is_mobile());
        assert!(!AppDiscriminator::new(Some("#microsoft.graph.win32LobApp")).is_mobile());
    }

    #[test]
    fn absent_discriminator_is_common_case() {
        let d = AppDiscriminator::new(None);
        assert!(!d.is_line_of_business());
        assert!(!d.is_mobile());
        assert_eq!(d.subtype(), None);
    }

    fn lob(version_name: Option<&str>, version_code: Option<&str>) -> ManagedApp {
        ManagedApp {
            kind: ManagedAppKind::LineOfBusiness(LobApp {
                version_name: version_name.map(str::to_string),
                version_code: version_code.map(str::to_string),
                ..Default::default()
            }),
            ..managed(Some("#microsoft.graph.androidLobApp"))
        }
    }

    #[test]
    fn version_prefers_name_over_code() {
        assert_eq!(resolve_version(&lob(Some("2.1.0"), Some("210"))), "2.1.0");
        assert_eq!(resolve_version(&lob(Some("  "), Some("210"))), "210");
    }

    #[test]
    fn store_and_web_apps_are_unversioned() {
        let web = ManagedApp {
            kind: ManagedAppKind::Web(WebApp {
                app_url: Some("https://intranet.contoso.com".to_string()),
            }),
            ..managed(Some("#microsoft.graph.webApp"))
        };
        assert_eq!(resolve_version(&web), UNVERSIONED);
        let entity = create_managed_application_entity(&web);
        assert_eq!(
            entity.str_property("productionURL"),
            Some("https://intranet.contoso.com")
        );

        let store = ManagedApp {
            kind: ManagedAppKind::Store(StoreApp {
                app_store_url: Some("https://apps.apple.com/app/id618783545".to_string()),
                bundle_id: Some("com.tinyspeck.chatlyio".to_string()),
                ..Default::default()
            }),
            ..managed(Some("#microsoft.graph.iosStoreApp"))
        };
        let entity = create_managed_application_entity(&store);
        assert_eq!(entity.str_property("version"), Some(UNVERSIONED));
        assert_eq!(entity.str_property("bundleId"), Some("com.tinyspeck.chatlyio"));
        assert!(entity.property("packageId").is_none());
    }

    #[test]
    fn version_defaults_to_sentinel() {
        assert_eq!(resolve_version(&managed(None)), UNVERSIONED);
    }

    #[test]
    fn managed_app_entity_flags() {
        let entity = create_managed_application_entity(&managed(Some("#microsoft.graph.iosLobApp")));
        assert_eq!(entity.bool_property("COTS"), Some(false));
        assert_eq!(entity.bool_property("external"), Some(false));
        assert_eq!(entity.bool_property("mobile"), Some(true));
        assert_eq!(entity.str_property("name"), Some("company portal"));
        assert_eq!(entity.str_property("version"), Some(UNVERSIONED));
        assert_eq!(entity.bool_property("isPublished"), Some(false));
    }

    #[test]
    fn detected_app_without_name_leaves_name_absent() {
        let app = DetectedApp {
            id: "xyz123".to_string(),
            ..Default::default()
        };
        let entity = create_detected_application_entity(&app);
        assert_eq!(entity.key, "IntuneDetectedId:xyz123");
        assert!(entity.property("name").is_none());
        assert!(entity.property("displayName").is_none());
    }

    #[test]
    fn conversion_is_deterministic() {
        let app = DetectedApp {
            id: "A".to_string(),
            display_name: Some("Slack".to_string()),
            version: Some("4.29".to_string()),
            ..Default::default()
        };
        assert_eq!(
            create_detected_application_entity(&app),
            create_detected_application_entity(&app)
        );
    }
}
