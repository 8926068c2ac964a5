//! Compliance policies and device configurations share one shape, so both
//! families run through the same two handlers parameterised by
//! [`PolicyStateKind`].

use super::{Pager, StepContext};
use crate::converters::{create_policy_entity, create_policy_state_entity, PolicyStateKind};
use crate::outcome::{Warning, WarningKind};
use crate::records::{DevicePolicy, PolicyState};
use crate::relationships::build_relationship;
use crate::source::Resource;
use crate::IngestResult;
use intune_graph_store::{Properties, RelationshipClass};

fn policy_resource(kind: PolicyStateKind) -> Resource {
    match kind {
        PolicyStateKind::Compliance => Resource::CompliancePolicies,
        PolicyStateKind::Configuration => Resource::DeviceConfigurations,
    }
}

fn state_resource(kind: PolicyStateKind, device_id: String) -> Resource {
    match kind {
        PolicyStateKind::Compliance => Resource::CompliancePolicyStates { device_id },
        PolicyStateKind::Configuration => Resource::DeviceConfigurationStates { device_id },
    }
}

pub async fn fetch_policies(ctx: &mut StepContext<'_>, kind: PolicyStateKind) -> IngestResult<()> {
    let mut pager = Pager::new(ctx.source, policy_resource(kind));
    while let Some(records) = pager.next_page().await? {
        for raw in records {
            let Some(policy) = ctx.decode::<DevicePolicy>(pager.resource(), &raw).success() else {
                continue;
            };
            let entity = create_policy_entity(kind, &policy).with_raw_data(raw);
            let Some(entity) = ctx.add_entity(entity).await?.success() else {
                continue;
            };
            ctx.link_to_account(&entity).await?;
        }
    }
    Ok(())
}

/// Per-device policy states: `<device> HAS state` and `policy IDENTIFIED state`.
pub async fn fetch_policy_states(
    ctx: &mut StepContext<'_>,
    kind: PolicyStateKind,
) -> IngestResult<()> {
    for (device_id, device) in ctx.managed_devices().await? {
        let mut pager = Pager::new(ctx.source, state_resource(kind, device_id.clone()));
        while let Some(records) = pager.next_page().await? {
            for raw in records {
                let Some(state) = ctx.decode::<PolicyState>(pager.resource(), &raw).success()
                else {
                    continue;
                };
                let entity = create_policy_state_entity(kind, &device_id, &state).with_raw_data(raw);
                let Some(entity) = ctx.add_entity(entity).await?.success() else {
                    continue;
                };

                ctx.add_relationship(build_relationship(
                    RelationshipClass::Has,
                    &device,
                    &entity,
                    Properties::new(),
                ))
                .await?;

                let missing_policy = Warning::new(
                    WarningKind::MissingEndpoint,
                    "Policy for device state does not exist",
                )
                .with("policyId", &state.id)
                .with("deviceId", &device_id)
                .with("stateKey", &entity.key);
                let Some(policy) = ctx
                    .require_endpoint(&kind.policy_key(&state.id), missing_policy)
                    .await?
                    .success()
                else {
                    continue;
                };
                ctx.add_relationship(build_relationship(
                    RelationshipClass::Identified,
                    &policy,
                    &entity,
                    Properties::new(),
                ))
                .await?;
            }
        }
    }
    Ok(())
}
