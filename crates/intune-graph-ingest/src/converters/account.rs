use super::PropertyBuilder;
use crate::keys;
use crate::schema::ACCOUNT;
use intune_graph_store::Entity;

/// The tenant's Intune account; root of every `HAS` fan-out.
pub fn create_account_entity(tenant: &str) -> Entity {
    let properties = PropertyBuilder::new()
        .set("id", tenant)
        .set("tenantId", tenant)
        .set("name", "Intune")
        .set("displayName", format!("Intune ({tenant})"))
        .build();
    Entity::new(keys::account_key(tenant), ACCOUNT.entity_type, ACCOUNT.class)
        .with_properties(properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_is_keyed_by_tenant() {
        let account = create_account_entity("contoso.onmicrosoft.com");
        assert_eq!(account.key, "intune_account:contoso.onmicrosoft.com");
        assert_eq!(account.entity_type, "intune_account");
        assert_eq!(
            account.str_property("tenantId"),
            Some("contoso.onmicrosoft.com")
        );
    }
}
