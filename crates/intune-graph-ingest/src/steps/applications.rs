//! Managed applications and the applications detected on devices.

use super::{Pager, StepContext};
use crate::converters::{create_detected_application_entity, create_managed_application_entity};
use crate::keys;
use crate::outcome::{Warning, WarningKind};
use crate::records::{DetectedApp, ManagedApp, ManagedAppDeviceStatus};
use crate::relationships::{
    build_relationship, device_assigned_application, device_installed_application,
};
use crate::schema::MANAGED_APPLICATION;
use crate::source::Resource;
use crate::IngestResult;
use intune_graph_store::{Entity, Properties, RelationshipClass};
use std::collections::HashMap;

/// Every managed app is ingested whether or not a device has it yet; device
/// statuses become `ASSIGNED` edges.
pub async fn fetch_managed_applications(ctx: &mut StepContext<'_>) -> IngestResult<()> {
    let mut pager = Pager::new(ctx.source, Resource::ManagedApps);
    while let Some(records) = pager.next_page().await? {
        for raw in records {
            let Some(app) = ctx.decode::<ManagedApp>(pager.resource(), &raw).success() else {
                continue;
            };
            let entity = create_managed_application_entity(&app).with_raw_data(raw);
            let Some(entity) = ctx.add_entity(entity).await?.success() else {
                continue;
            };
            ctx.link_to_account(&entity).await?;
            assign_to_devices(ctx, &app, &entity).await?;
        }
    }
    Ok(())
}

async fn assign_to_devices(
    ctx: &mut StepContext<'_>,
    app: &ManagedApp,
    app_entity: &Entity,
) -> IngestResult<()> {
    let mut pager = Pager::new(
        ctx.source,
        Resource::ManagedAppDeviceStatuses {
            app_id: app.id.clone(),
        },
    );
    while let Some(records) = pager.next_page().await? {
        for raw in records {
            let Some(status) = ctx
                .decode::<ManagedAppDeviceStatus>(pager.resource(), &raw)
                .success()
            else {
                continue;
            };
            let missing_device = Warning::new(
                WarningKind::MissingEndpoint,
                "Device for managed app status does not exist",
            )
            .with("deviceStatusId", &status.id)
            .with("managedAppId", &app.id)
            .with("deviceId", status.device_id.as_deref().unwrap_or_default());

            let Some(device_id) = status.device_id.as_deref().and_then(keys::natural_id) else {
                ctx.warn(missing_device);
                continue;
            };
            let Some(device) = ctx
                .require_endpoint(&keys::device_key(device_id), missing_device)
                .await?
                .success()
            else {
                continue;
            };
            ctx.add_relationship(device_assigned_application(&device, app_entity, app, &status))
                .await?;
        }
    }
    Ok(())
}

/// One `intune_detected_application` per display name, shared by every device
/// that reports it; one `INSTALLED` edge per detection.
pub async fn fetch_detected_applications(ctx: &mut StepContext<'_>) -> IngestResult<()> {
    let managed_by_name = managed_apps_by_name(ctx).await?;

    for (device_id, device) in ctx.managed_devices().await? {
        let mut pager = Pager::new(ctx.source, Resource::DetectedApps { device_id });
        while let Some(records) = pager.next_page().await? {
            for raw in records {
                let Some(detected) = ctx.decode::<DetectedApp>(pager.resource(), &raw).success()
                else {
                    continue;
                };
                // Find-or-create happens under one store call, so two
                // detections of the same name can never both create it.
                let Some(app_entity) = ctx
                    .find_or_create_entity(create_detected_application_entity(&detected))
                    .await?
                    .success()
                else {
                    continue;
                };

                ctx.add_relationship(device_installed_application(&device, &app_entity, &detected))
                    .await?;

                let managed = keys::normalized_app_name(detected.display_name.as_deref())
                    .and_then(|name| managed_by_name.get(&name));
                if let Some(managed) = managed {
                    ctx.add_relationship_once(build_relationship(
                        RelationshipClass::Manages,
                        managed,
                        &app_entity,
                        Properties::new(),
                    ))
                    .await?;
                }
            }
        }
    }
    Ok(())
}

/// Managed application entities by lowercased name; the first one wins.
async fn managed_apps_by_name(ctx: &StepContext<'_>) -> IngestResult<HashMap<String, Entity>> {
    let mut by_name = HashMap::new();
    for entity in ctx
        .job_state
        .entities_of_type(MANAGED_APPLICATION.entity_type)
        .await?
    {
        if let Some(name) = entity.str_property("name").map(str::to_string) {
            by_name.entry(name).or_insert(entity);
        }
    }
    Ok(by_name)
}
