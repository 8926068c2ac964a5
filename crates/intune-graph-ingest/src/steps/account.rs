use super::StepContext;
use crate::converters::create_account_entity;
use crate::relationships::tenant_has_account;
use crate::IngestResult;

/// Singleton account for the configured tenant, linked to the tenant entity
/// owned by the directory integration.
pub async fn create_account(ctx: &mut StepContext<'_>) -> IngestResult<()> {
    let tenant = ctx.config.tenant.clone();
    let Some(account) = ctx.add_entity(create_account_entity(&tenant)).await?.success() else {
        return Ok(());
    };
    ctx.add_mapped_relationship(tenant_has_account(&account, &tenant))
        .await?;
    Ok(())
}
