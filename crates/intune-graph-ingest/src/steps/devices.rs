//! Managed devices, their owners and their host agents.

use super::{Pager, StepContext};
use crate::converters::{create_host_agent_entity, create_managed_device_entity};
use crate::keys;
use crate::outcome::{Outcome, Warning, WarningKind};
use crate::records::{ManagedDevice, SourceRecord};
use crate::relationships::{build_relationship, user_device_mapped};
use crate::schema::DEVICE_TYPES;
use crate::source::Resource;
use crate::IngestResult;
use intune_graph_store::{Entity, Properties, RelationshipClass};

pub async fn fetch_managed_devices(ctx: &mut StepContext<'_>) -> IngestResult<()> {
    let mut pager = Pager::new(ctx.source, Resource::ManagedDevices);
    while let Some(records) = pager.next_page().await? {
        for raw in records {
            let Some(device) = ctx.decode::<ManagedDevice>(pager.resource(), &raw).success() else {
                continue;
            };
            let entity = create_managed_device_entity(&device).with_raw_data(raw);
            let Some(entity) = ctx.add_entity(entity).await?.success() else {
                continue;
            };

            ctx.link_to_account(&entity).await?;
            link_owner(ctx, &device, &entity).await?;
        }
    }
    Ok(())
}

/// `azure_user HAS <device>`: direct when the user was ingested, mapped by
/// email when it was not, dropped with a warning when neither is possible,
/// including a device with no owner at all.
async fn link_owner(
    ctx: &mut StepContext<'_>,
    device: &ManagedDevice,
    entity: &Entity,
) -> IngestResult<Outcome> {
    let user_id = device.user_id.as_deref().and_then(keys::natural_id);
    let email = device.email_address.as_deref();

    if let Some(user_id) = user_id {
        if let Some(user) = ctx.find_entity(&keys::user_key(user_id)).await? {
            return ctx
                .add_relationship(build_relationship(
                    RelationshipClass::Has,
                    &user,
                    entity,
                    Properties::new(),
                ))
                .await;
        }
    }

    match user_device_mapped(entity, user_id, email) {
        Some(mapped) => ctx.add_mapped_relationship(mapped).await,
        None => {
            let message = match user_id {
                Some(_) => "Device owner is not ingested and has no email to map by",
                None => "Device has neither an owner id nor an email",
            };
            let warning = Warning::new(WarningKind::UnidentifiableEndpoint, message)
                .with("deviceKey", &entity.key)
                .with("userId", user_id.unwrap_or_default());
            Ok(ctx.skip(warning))
        }
    }
}

/// One host agent per managed device, derived from the device's raw data.
pub async fn build_device_host_agent_relationships(ctx: &mut StepContext<'_>) -> IngestResult<()> {
    for def in DEVICE_TYPES.iter() {
        for device_entity in ctx.job_state.entities_of_type(def.entity_type).await? {
            let Some(mut device) = device_entity.raw_data_as::<ManagedDevice>() else {
                ctx.warn(
                    Warning::new(WarningKind::MissingRawData, "Raw data was not found for device.")
                        .with("_key", &device_entity.key),
                );
                continue;
            };

            device.normalize_id();
            let agent = create_host_agent_entity(&device);
            let Some(agent) = ctx.add_entity(agent).await?.success() else {
                continue;
            };
            ctx.add_relationship(build_relationship(
                RelationshipClass::Manages,
                &agent,
                &device_entity,
                Properties::new(),
            ))
            .await?;
        }
    }
    Ok(())
}
