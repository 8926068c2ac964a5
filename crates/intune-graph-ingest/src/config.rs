//! Integration configuration and the errors raised before a run starts.

use std::fmt;

pub const CLIENT_ID_ENV: &str = "CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "CLIENT_SECRET";
pub const TENANT_ENV: &str = "TENANT";

// ============================================================================
// Configuration
// ============================================================================

/// Credentials and tenant of the Microsoft Graph application the run acts as.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct IntegrationConfig {
    pub client_id: String,
    pub client_secret: String,
    pub tenant: String,
}

impl IntegrationConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tenant: tenant.into(),
        }
    }

    /// Load from environment variables. Unset variables are left empty and
    /// reported by [`IntegrationConfig::validate`].
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            client_id: var(CLIENT_ID_ENV),
            client_secret: var(CLIENT_SECRET_ENV),
            tenant: var(TENANT_ENV),
        }
    }

    /// Check that every field is present. Runs before any step executes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        tracing::info!(
            client_id = %self.client_id,
            tenant_id = %self.tenant,
            "Configured to make Microsoft Graph API calls to tenant acting as client"
        );

        let missing: Vec<&'static str> = [
            ("clientId", &self.client_id),
            ("clientSecret", &self.client_secret),
            ("tenant", &self.tenant),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }
}

impl fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant", &self.tenant)
            .finish()
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config requires all of {{clientId, clientSecret, tenant}}; missing: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },
    #[error("Step {0} is declared more than once")]
    DuplicateStep(String),
    #[error("Step dependencies form a cycle through: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("Unknown step: {0}")]
    UnknownStep(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_config_validates() {
        let config = IntegrationConfig::new("client", "secret", "contoso.onmicrosoft.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_fields_are_listed() {
        let config = IntegrationConfig::new("client", "  ", "");
        match config.validate() {
            Err(ConfigError::Missing(fields)) => assert_eq!(fields, vec!["clientSecret", "tenant"]),
            other => panic!("expected missing fields, got {other:?}"),
        }
    }

    #[test]
    fn debug_redacts_secret() {
        let config = IntegrationConfig::new("client", "hunter2", "tenant");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
