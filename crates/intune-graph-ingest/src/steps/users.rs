use super::{Pager, StepContext};
use crate::converters::create_user_entity;
use crate::records::User;
use crate::source::Resource;
use crate::IngestResult;

/// Directory users, so device owners resolve to local entities.
pub async fn fetch_users(ctx: &mut StepContext<'_>) -> IngestResult<()> {
    let mut pager = Pager::new(ctx.source, Resource::Users);
    while let Some(records) = pager.next_page().await? {
        for raw in records {
            let Some(user) = ctx.decode::<User>(pager.resource(), &raw).success() else {
                continue;
            };
            ctx.add_entity(create_user_entity(&user).with_raw_data(raw))
                .await?;
        }
    }
    Ok(())
}
