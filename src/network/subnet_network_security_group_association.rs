//! `azurerm_subnet_network_security_group_association`
//!
//! The association has no ARM identity of its own; its ID is the subnet ID
//! and it lives in the subnet's `networkSecurityGroup` reference.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::subnet::{self, Subnet, lock_subnet};
use super::{SubResource, get_existing, network_security_group, put_and_wait, remove_from_state, set_all};
use crate::azure::ids::{IdParseError, NetworkSecurityGroupId, ResourceIdentifier, SubnetId};
use crate::locks;
use crate::resource::{Clients, Resource, ResourceData, ResourceError};
use crate::schema::{Attribute, Schema};
use crate::validate;

pub const RESOURCE_TYPE: &str = "azurerm_subnet_network_security_group_association";

pub struct SubnetNetworkSecurityGroupAssociationResource;

fn flatten(id: &SubnetId, nsg_id: &str) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("subnet_id".into(), id.id().into());
    attrs.insert("network_security_group_id".into(), nsg_id.into());
    attrs
}

async fn get_subnet(clients: &Clients, id: &SubnetId) -> Result<Option<Subnet>, ResourceError> {
    get_existing::<Subnet>(clients, &id.id(), subnet::API_VERSION)
        .await
        .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))
}

#[async_trait]
impl Resource for SubnetNetworkSecurityGroupAssociationResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute(
                Attribute::string("subnet_id")
                    .required()
                    .force_new()
                    .validate_with(validate::arm_resource_id),
            )
            .attribute(
                Attribute::string("network_security_group_id")
                    .required()
                    .force_new()
                    .validate_with(validate::arm_resource_id),
            )
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        SubnetId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let subnet_id = SubnetId::parse(d.require_str("subnet_id")?)?;
        let nsg_id = NetworkSecurityGroupId::parse(d.require_str("network_security_group_id")?)?;

        let _nsg_lock =
            locks::by_name(&nsg_id.network_security_group_name, network_security_group::RESOURCE_TYPE)
                .await;
        let _subnet_locks = lock_subnet(&subnet_id).await;

        let mut model = get_subnet(clients, &subnet_id)
            .await?
            .ok_or_else(|| ResourceError::Remote(format!("{} was not found", subnet_id.describe())))?;

        if model.properties.network_security_group.is_some() {
            return Err(ResourceError::AlreadyExists {
                resource_type: RESOURCE_TYPE.to_string(),
                id: subnet_id.id(),
            });
        }

        model.properties.network_security_group = Some(SubResource::new(nsg_id.id()));
        model.properties.provisioning_state = None;

        put_and_wait(
            clients,
            &subnet_id.id(),
            subnet::API_VERSION,
            &model,
            "updating",
            &subnet_id.describe(),
        )
        .await?;

        d.set_id(subnet_id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = SubnetId::parse(d.id())?;

        let Some(model) = get_subnet(clients, &id).await? else {
            remove_from_state(d, &id.describe());
            return Ok(());
        };

        match &model.properties.network_security_group {
            Some(nsg) => set_all(d, flatten(&id, &nsg.id)),
            None => remove_from_state(d, &format!("Network Security Group association for {}", id.describe())),
        }
        Ok(())
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = SubnetId::parse(d.id())?;

        let Some(model) = get_subnet(clients, &id).await? else {
            return Ok(());
        };
        let Some(nsg) = model.properties.network_security_group else {
            return Ok(());
        };
        let nsg_id = NetworkSecurityGroupId::parse(&nsg.id)?;

        let _nsg_lock =
            locks::by_name(&nsg_id.network_security_group_name, network_security_group::RESOURCE_TYPE)
                .await;
        let _subnet_locks = lock_subnet(&id).await;

        // Re-read under the locks so a concurrent change is not overwritten.
        let Some(mut model) = get_subnet(clients, &id).await? else {
            return Ok(());
        };
        model.properties.network_security_group = None;
        model.properties.provisioning_state = None;

        put_and_wait(
            clients,
            &id.id(),
            subnet::API_VERSION,
            &model,
            "removing Network Security Group association from",
            &id.describe(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_id_is_a_subnet_id() {
        let resource = SubnetNetworkSecurityGroupAssociationResource;
        assert!(
            resource
                .validate_import_id("/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/subnet1")
                .is_ok()
        );
        assert!(
            resource
                .validate_import_id("/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1")
                .is_err()
        );
    }

    #[test]
    fn test_flatten() {
        let id = SubnetId::new("sub", "rg1", "vnet1", "subnet1");
        let attrs = flatten(&id, "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/networkSecurityGroups/nsg1");
        assert_eq!(attrs["subnet_id"], Value::from(id.id()));
        assert!(attrs["network_security_group_id"].as_str().unwrap().ends_with("/nsg1"));
    }
}
