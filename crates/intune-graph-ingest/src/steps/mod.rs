//! Ingestion steps.
//!
//! Every step follows the same reconciliation loop:
//!
//! ```text
//!   source page ──► decode ──► convert ──► find-or-create entity
//!                    │                          │
//!                    └─ malformed: warn, skip   ▼
//!                                   for each referenced endpoint:
//!                                     lookup by key ── absent ──► warn, drop edge
//!                                        │
//!                                        ▼
//!                                     build relationship
//!                                        │
//!                                     key taken? ── yes ──► warn, skip write
//!                                        │
//!                                        ▼
//!                                     insert
//! ```
//!
//! [`StepContext`] owns the check-then-act helpers and the step's report; the
//! step modules only decide what to emit.

pub mod account;
pub mod applications;
pub mod devices;
pub mod policies;
pub mod users;

use crate::config::{ConfigError, IntegrationConfig};
use crate::converters::PolicyStateKind;
use crate::keys;
use crate::outcome::{Outcome, StepReport, Warning, WarningKind};
use crate::records::SourceRecord;
use crate::schema::{
    device_relationship_types, relationship_type, EntityDef, ACCOUNT, DETECTED_APPLICATION,
    DEVICE_TYPES, HOST_AGENT, MANAGED_APPLICATION, MICROSOFT_TENANT_TYPE, USER,
};
use crate::source::{GraphSource, Resource};
use crate::{IngestError, IngestResult};
use crate::relationships::build_relationship;
use intune_graph_store::{
    Entity, JobState, MappedRelationship, Properties, Relationship, RelationshipClass, StoreError,
};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Step ids and declarations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepId {
    CreateAccount,
    FetchUsers,
    FetchManagedDevices,
    BuildDeviceHostAgentRelationships,
    FetchManagedApplications,
    FetchDetectedApplications,
    FetchCompliancePolicies,
    FetchDeviceConfigurations,
    FetchCompliancePolicyStates,
    FetchDeviceConfigurationStates,
}

impl StepId {
    pub const ALL: [StepId; 10] = [
        StepId::CreateAccount,
        StepId::FetchUsers,
        StepId::FetchManagedDevices,
        StepId::BuildDeviceHostAgentRelationships,
        StepId::FetchManagedApplications,
        StepId::FetchDetectedApplications,
        StepId::FetchCompliancePolicies,
        StepId::FetchDeviceConfigurations,
        StepId::FetchCompliancePolicyStates,
        StepId::FetchDeviceConfigurationStates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::CreateAccount => "create-account",
            StepId::FetchUsers => "fetch-users",
            StepId::FetchManagedDevices => "fetch-managed-devices",
            StepId::BuildDeviceHostAgentRelationships => "build-device-host-agent-relationships",
            StepId::FetchManagedApplications => "fetch-managed-applications",
            StepId::FetchDetectedApplications => "fetch-detected-applications",
            StepId::FetchCompliancePolicies => "fetch-compliance-policies",
            StepId::FetchDeviceConfigurations => "fetch-device-configurations",
            StepId::FetchCompliancePolicyStates => "fetch-compliance-policy-states",
            StepId::FetchDeviceConfigurationStates => "fetch-device-configuration-states",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownStep(s.to_string()))
    }
}

/// What a step may produce and which steps must finish before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub entity_types: Vec<&'static str>,
    pub relationship_types: Vec<String>,
    pub mapped_relationship_types: Vec<String>,
    pub depends_on: Vec<&'static str>,
}

impl StepDefinition {
    fn new(id: StepId, name: &'static str) -> Self {
        Self {
            id: id.as_str(),
            name,
            entity_types: Vec::new(),
            relationship_types: Vec::new(),
            mapped_relationship_types: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    fn entities(mut self, defs: &[EntityDef]) -> Self {
        self.entity_types.extend(defs.iter().map(|d| d.entity_type));
        self
    }

    fn relationships(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.relationship_types.extend(types);
        self
    }

    fn mapped(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.mapped_relationship_types.extend(types);
        self
    }

    fn after(mut self, deps: &[StepId]) -> Self {
        self.depends_on.extend(deps.iter().map(StepId::as_str));
        self
    }
}

fn policy_step(kind: PolicyStateKind, id: StepId, name: &'static str) -> StepDefinition {
    let policy = kind.policy_def();
    StepDefinition::new(id, name)
        .entities(&[*policy])
        .relationships([relationship_type(
            ACCOUNT.entity_type,
            RelationshipClass::Has,
            policy.entity_type,
        )])
        .after(&[StepId::CreateAccount])
}

fn policy_state_step(
    kind: PolicyStateKind,
    id: StepId,
    name: &'static str,
    policy_step_id: StepId,
) -> StepDefinition {
    let state = kind.state_def();
    StepDefinition::new(id, name)
        .entities(&[*state])
        .relationships(device_relationship_types(RelationshipClass::Has, None, Some(state)))
        .relationships([relationship_type(
            kind.policy_def().entity_type,
            RelationshipClass::Identified,
            state.entity_type,
        )])
        .after(&[StepId::FetchManagedDevices, policy_step_id])
}

/// Declarations of every Intune step, in declaration order.
pub fn integration_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new(StepId::CreateAccount, "Create Account")
            .entities(&[ACCOUNT])
            .mapped([relationship_type(
                MICROSOFT_TENANT_TYPE,
                RelationshipClass::Has,
                ACCOUNT.entity_type,
            )]),
        StepDefinition::new(StepId::FetchUsers, "Fetch Users").entities(&[USER]),
        StepDefinition::new(StepId::FetchManagedDevices, "Managed Devices")
            .entities(&DEVICE_TYPES)
            .relationships(device_relationship_types(RelationshipClass::Has, Some(&ACCOUNT), None))
            .relationships(device_relationship_types(RelationshipClass::Has, Some(&USER), None))
            .mapped(device_relationship_types(RelationshipClass::Has, Some(&USER), None))
            .after(&[StepId::CreateAccount, StepId::FetchUsers]),
        StepDefinition::new(
            StepId::BuildDeviceHostAgentRelationships,
            "Build Device to Host Agent Relationships",
        )
        .entities(&[HOST_AGENT])
        .relationships(device_relationship_types(
            RelationshipClass::Manages,
            Some(&HOST_AGENT),
            None,
        ))
        .after(&[StepId::FetchManagedDevices]),
        StepDefinition::new(StepId::FetchManagedApplications, "Managed Applications")
            .entities(&[MANAGED_APPLICATION])
            .relationships([relationship_type(
                ACCOUNT.entity_type,
                RelationshipClass::Has,
                MANAGED_APPLICATION.entity_type,
            )])
            .relationships(device_relationship_types(
                RelationshipClass::Assigned,
                None,
                Some(&MANAGED_APPLICATION),
            ))
            .after(&[StepId::CreateAccount, StepId::FetchManagedDevices]),
        StepDefinition::new(StepId::FetchDetectedApplications, "Detected Applications")
            .entities(&[DETECTED_APPLICATION])
            .relationships(device_relationship_types(
                RelationshipClass::Installed,
                None,
                Some(&DETECTED_APPLICATION),
            ))
            .relationships([relationship_type(
                MANAGED_APPLICATION.entity_type,
                RelationshipClass::Manages,
                DETECTED_APPLICATION.entity_type,
            )])
            .after(&[StepId::FetchManagedDevices, StepId::FetchManagedApplications]),
        policy_step(
            PolicyStateKind::Compliance,
            StepId::FetchCompliancePolicies,
            "Fetch Compliance Policies",
        ),
        policy_step(
            PolicyStateKind::Configuration,
            StepId::FetchDeviceConfigurations,
            "Fetch Device Configurations",
        ),
        policy_state_step(
            PolicyStateKind::Compliance,
            StepId::FetchCompliancePolicyStates,
            "Fetch Compliance Policy States",
            StepId::FetchCompliancePolicies,
        ),
        policy_state_step(
            PolicyStateKind::Configuration,
            StepId::FetchDeviceConfigurationStates,
            "Fetch Device Configuration States",
            StepId::FetchDeviceConfigurations,
        ),
    ]
}

/// Run one step's handler.
pub async fn execute(step: StepId, ctx: &mut StepContext<'_>) -> IngestResult<()> {
    match step {
        StepId::CreateAccount => account::create_account(ctx).await,
        StepId::FetchUsers => users::fetch_users(ctx).await,
        StepId::FetchManagedDevices => devices::fetch_managed_devices(ctx).await,
        StepId::BuildDeviceHostAgentRelationships => {
            devices::build_device_host_agent_relationships(ctx).await
        }
        StepId::FetchManagedApplications => applications::fetch_managed_applications(ctx).await,
        StepId::FetchDetectedApplications => applications::fetch_detected_applications(ctx).await,
        StepId::FetchCompliancePolicies => {
            policies::fetch_policies(ctx, PolicyStateKind::Compliance).await
        }
        StepId::FetchDeviceConfigurations => {
            policies::fetch_policies(ctx, PolicyStateKind::Configuration).await
        }
        StepId::FetchCompliancePolicyStates => {
            policies::fetch_policy_states(ctx, PolicyStateKind::Compliance).await
        }
        StepId::FetchDeviceConfigurationStates => {
            policies::fetch_policy_states(ctx, PolicyStateKind::Configuration).await
        }
    }
}

// ============================================================================
// Step context
// ============================================================================

/// Everything a step handler touches, plus the report it fills in.
///
/// The helpers return [`Outcome`]s for tolerable anomalies; a skipped outcome
/// has already been logged and recorded by the time the caller sees it.
/// Unexpected store failures come back as `Err`.
pub struct StepContext<'a> {
    pub step_id: &'static str,
    pub config: &'a IntegrationConfig,
    pub source: &'a dyn GraphSource,
    pub job_state: &'a dyn JobState,
    report: StepReport,
}

impl<'a> StepContext<'a> {
    pub fn new(
        step_id: &'static str,
        config: &'a IntegrationConfig,
        source: &'a dyn GraphSource,
        job_state: &'a dyn JobState,
    ) -> Self {
        Self {
            step_id,
            config,
            source,
            job_state,
            report: StepReport::new(step_id),
        }
    }

    pub fn report(&self) -> &StepReport {
        &self.report
    }

    pub fn into_report(self) -> StepReport {
        self.report
    }

    /// Log a skipped unit and keep it in the report.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(
            step = self.step_id,
            kind = %warning.kind,
            context = %warning.context_string(),
            "{}",
            warning.message
        );
        self.report.warnings.push(warning);
    }

    fn skip<T>(&mut self, warning: Warning) -> Outcome<T> {
        self.warn(warning.clone());
        Outcome::Skipped(warning)
    }

    /// Decode a raw source record, skipping it when it is malformed or has no
    /// id. The id comes back trimmed.
    pub fn decode<T: SourceRecord>(&mut self, resource: &Resource, raw: &Value) -> Outcome<T> {
        let mut record = match serde_json::from_value::<T>(raw.clone()) {
            Ok(record) => record,
            Err(err) => {
                return self.skip(
                    Warning::new(WarningKind::MalformedRecord, "Could not decode source record")
                        .with("resource", resource)
                        .with("error", err),
                )
            }
        };
        if keys::natural_id(record.record_id()).is_none() {
            return self.skip(
                Warning::new(WarningKind::MissingIdentifier, "Source record has no id")
                    .with("resource", resource),
            );
        }
        record.normalize_id();
        Outcome::Success(record)
    }

    pub async fn find_entity(&self, key: &str) -> IngestResult<Option<Entity>> {
        Ok(self.job_state.find_entity(key).await?)
    }

    /// Look up a relationship endpoint; a miss is recorded as `warning`.
    pub async fn require_endpoint(
        &mut self,
        key: &str,
        warning: Warning,
    ) -> IngestResult<Outcome<Entity>> {
        match self.job_state.find_entity(key).await? {
            Some(entity) => Ok(Outcome::Success(entity)),
            None => Ok(self.skip(warning.with("endpointKey", key))),
        }
    }

    /// `intune_account HAS <entity>`. Without the account entity the edge is
    /// dropped with a warning.
    pub async fn link_to_account(&mut self, entity: &Entity) -> IngestResult<Outcome> {
        let account_key = keys::account_key(&self.config.tenant);
        let missing_account =
            Warning::new(WarningKind::MissingEndpoint, "Account entity does not exist")
                .with("_key", &entity.key)
                .with("_type", &entity.entity_type);
        match self.require_endpoint(&account_key, missing_account).await? {
            Outcome::Success(account) => {
                self.add_relationship(build_relationship(
                    RelationshipClass::Has,
                    &account,
                    entity,
                    Properties::new(),
                ))
                .await
            }
            Outcome::Skipped(warning) => Ok(Outcome::Skipped(warning)),
        }
    }

    /// Insert an entity whose key must not exist yet.
    pub async fn add_entity(&mut self, entity: Entity) -> IngestResult<Outcome<Entity>> {
        if self.job_state.has_key(&entity.key).await? {
            return Ok(self.skip(duplicate_entity(&entity)));
        }
        match self.job_state.add_entity(entity.clone()).await {
            Ok(stored) => {
                self.report.entities_created += 1;
                Ok(Outcome::Success(stored))
            }
            Err(StoreError::DuplicateKey { .. }) => Ok(self.skip(duplicate_entity(&entity))),
            Err(err) => Err(err.into()),
        }
    }

    /// Return the canonical entity for `candidate.key`, creating it from
    /// `candidate` if this is the first observation.
    pub async fn find_or_create_entity(&mut self, candidate: Entity) -> IngestResult<Outcome<Entity>> {
        match self.job_state.find_or_insert_entity(candidate.clone()).await {
            Ok(result) => {
                if result.was_inserted() {
                    self.report.entities_created += 1;
                }
                Ok(Outcome::Success(result.into_entity()))
            }
            // The key belongs to a relationship.
            Err(StoreError::DuplicateKey { .. }) => Ok(self.skip(duplicate_entity(&candidate))),
            Err(err) => Err(err.into()),
        }
    }

    /// Insert a relationship unless its key is already taken.
    pub async fn add_relationship(&mut self, relationship: Relationship) -> IngestResult<Outcome> {
        if self.job_state.has_key(&relationship.key).await? {
            return Ok(self.skip(duplicate_relationship(&relationship)));
        }
        let warning = duplicate_relationship(&relationship);
        match self.job_state.add_relationship(relationship).await {
            Ok(()) => {
                self.report.relationships_created += 1;
                Ok(Outcome::Success(()))
            }
            Err(StoreError::DuplicateKey { .. }) => Ok(self.skip(warning)),
            Err(StoreError::MissingEndpoint {
                relationship_key,
                endpoint_key,
            }) => Ok(self.skip(
                Warning::new(
                    WarningKind::MissingEndpoint,
                    "Relationship endpoint does not exist",
                )
                .with("relationshipKey", relationship_key)
                .with("endpointKey", endpoint_key),
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Insert a relationship that many units may derive; an existing key is
    /// expected and not a warning. Returns whether it was inserted.
    pub async fn add_relationship_once(&mut self, relationship: Relationship) -> IngestResult<bool> {
        if self.job_state.has_key(&relationship.key).await? {
            return Ok(false);
        }
        Ok(self.add_relationship(relationship).await?.is_success())
    }

    pub async fn add_mapped_relationship(
        &mut self,
        relationship: MappedRelationship,
    ) -> IngestResult<Outcome> {
        let warning = Warning::new(WarningKind::DuplicateKey, "Possible duplicate mapped relationship key")
            .with("relationshipKey", &relationship.key)
            .with("sourceKey", &relationship.mapping.source_entity_key)
            .with("targetType", &relationship.mapping.target_type);
        if self.job_state.has_key(&relationship.key).await? {
            return Ok(self.skip(warning));
        }
        match self.job_state.add_mapped_relationship(relationship).await {
            Ok(()) => {
                self.report.mapped_relationships_created += 1;
                Ok(Outcome::Success(()))
            }
            Err(StoreError::DuplicateKey { .. }) => Ok(self.skip(warning)),
            Err(StoreError::MissingEndpoint { endpoint_key, .. }) => Ok(self.skip(
                Warning::new(WarningKind::MissingEndpoint, "Mapped relationship source does not exist")
                    .with("endpointKey", endpoint_key),
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Every managed device entity from an earlier step with its source id,
    /// once per id across all device types.
    pub async fn managed_devices(&mut self) -> IngestResult<Vec<(String, Entity)>> {
        let mut seen = HashSet::new();
        let mut devices = Vec::new();
        for def in DEVICE_TYPES.iter() {
            for entity in self.job_state.entities_of_type(def.entity_type).await? {
                let Some(device_id) = entity.str_property("id").and_then(keys::natural_id) else {
                    self.warn(
                        Warning::new(WarningKind::MissingIdentifier, "Device entity has no id")
                            .with("_key", &entity.key),
                    );
                    continue;
                };
                let device_id = device_id.to_string();
                if !seen.insert(device_id.clone()) {
                    tracing::debug!(device_id = %device_id, "Found duplicate device entity ID");
                    continue;
                }
                devices.push((device_id, entity));
            }
        }
        Ok(devices)
    }
}

fn duplicate_entity(entity: &Entity) -> Warning {
    Warning::new(WarningKind::DuplicateKey, "Possible duplicate entity key")
        .with("_key", &entity.key)
        .with("_type", &entity.entity_type)
}

fn duplicate_relationship(relationship: &Relationship) -> Warning {
    Warning::new(WarningKind::DuplicateKey, "Possible duplicate relationship key")
        .with("relationshipKey", &relationship.key)
        .with("fromKey", &relationship.from_key)
        .with("toKey", &relationship.to_key)
        .with("relationshipClass", relationship.class)
}

// ============================================================================
// Pagination
// ============================================================================

/// Walks one resource page by page until the source stops returning a cursor.
pub struct Pager<'s> {
    source: &'s dyn GraphSource,
    resource: Resource,
    cursor: Option<String>,
    done: bool,
}

impl<'s> Pager<'s> {
    pub fn new(source: &'s dyn GraphSource, resource: Resource) -> Self {
        Self {
            source,
            resource,
            cursor: None,
            done: false,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Next page of raw records, or `None` once the last page was returned.
    pub async fn next_page(&mut self) -> IngestResult<Option<Vec<Value>>> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .source
            .fetch_page(&self.resource, self.cursor.as_deref())
            .await
            .map_err(IngestError::from)?;
        self.cursor = page.next_cursor;
        self.done = self.cursor.is_none();
        Ok(Some(page.records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_ids_round_trip_through_strings() {
        for id in StepId::ALL {
            assert_eq!(id.as_str().parse::<StepId>().unwrap(), id);
        }
        assert!(matches!(
            "fetch-everything".parse::<StepId>(),
            Err(ConfigError::UnknownStep(_))
        ));
    }

    #[test]
    fn declarations_cover_every_step_once() {
        let steps = integration_steps();
        let ids: Vec<_> = steps.iter().map(|s| s.id).collect();
        let expected: Vec<_> = StepId::ALL.iter().map(StepId::as_str).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn device_step_declares_every_device_type() {
        let steps = integration_steps();
        let devices = steps
            .iter()
            .find(|s| s.id == "fetch-managed-devices")
            .unwrap();
        assert_eq!(devices.entity_types.len(), DEVICE_TYPES.len());
        assert!(devices
            .relationship_types
            .contains(&"azure_user_has_smartphone".to_string()));
        assert!(devices
            .mapped_relationship_types
            .contains(&"azure_user_has_server".to_string()));
        assert_eq!(devices.depends_on, vec!["create-account", "fetch-users"]);
    }

    #[test]
    fn policy_state_steps_depend_on_their_policy_step() {
        let steps = integration_steps();
        let states = steps
            .iter()
            .find(|s| s.id == "fetch-device-configuration-states")
            .unwrap();
        assert!(states.depends_on.contains(&"fetch-device-configurations"));
        assert!(states.relationship_types.contains(
            &"intune_device_configuration_identified_intune_device_configuration_state".to_string()
        ));
    }
}
