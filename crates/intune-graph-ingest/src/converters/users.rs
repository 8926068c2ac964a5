use super::PropertyBuilder;
use crate::keys;
use crate::records::User;
use crate::schema::USER;
use intune_graph_store::Entity;

pub fn create_user_entity(user: &User) -> Entity {
    let email = user
        .mail
        .clone()
        .or_else(|| user.user_principal_name.clone());
    let properties = PropertyBuilder::new()
        .set("id", user.id.as_str())
        .set_opt("name", user.display_name.clone())
        .set_opt("displayName", user.display_name.clone())
        .set_opt("userPrincipalName", user.user_principal_name.clone())
        .set_opt("email", email.map(|e| e.to_lowercase()))
        .set_opt("active", user.account_enabled)
        .set_opt("jobTitle", user.job_title.clone())
        .build();
    Entity::new(keys::user_key(&user.id), USER.entity_type, USER.class).with_properties(properties)
}
