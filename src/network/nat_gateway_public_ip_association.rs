//! `azurerm_nat_gateway_public_ip_association`
//!
//! A virtual resource: membership of a public IP in the NAT gateway's
//! `publicIpAddresses` collection. Every change is a read-modify-write of the
//! gateway under its named lock.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::nat_gateway::{self, NatGateway};
use super::{SubResource, contains_id, get_existing, put_and_wait, remove_from_state, set_all};
use crate::azure::ids::{
    AssociationId, IdParseError, NatGatewayId, PublicIpAddressId, ResourceIdentifier,
};
use crate::locks;
use crate::resource::{Clients, Resource, ResourceData, ResourceError};
use crate::schema::{Attribute, Schema};
use crate::validate;

pub const RESOURCE_TYPE: &str = "azurerm_nat_gateway_public_ip_association";

pub type NatGatewayPublicIpAssociationId = AssociationId<NatGatewayId, PublicIpAddressId>;

pub struct NatGatewayPublicIpAssociationResource;

fn flatten(id: &NatGatewayPublicIpAssociationId) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("nat_gateway_id".into(), id.parent.id().into());
    attrs.insert("public_ip_address_id".into(), id.child.id().into());
    attrs
}

async fn get_gateway(clients: &Clients, id: &NatGatewayId) -> Result<NatGateway, ResourceError> {
    clients
        .arm
        .get::<NatGateway>(&id.id(), nat_gateway::API_VERSION)
        .await
        .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))
}

fn prepare_for_put(model: &mut NatGateway) {
    model.properties.subnets = None;
    model.properties.provisioning_state = None;
}

#[async_trait]
impl Resource for NatGatewayPublicIpAssociationResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute(
                Attribute::string("nat_gateway_id")
                    .required()
                    .force_new()
                    .validate_with(validate::arm_resource_id),
            )
            .attribute(
                Attribute::string("public_ip_address_id")
                    .required()
                    .force_new()
                    .validate_with(validate::arm_resource_id),
            )
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        NatGatewayPublicIpAssociationId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let gateway_id = NatGatewayId::parse(d.require_str("nat_gateway_id")?)?;
        let public_ip_id = PublicIpAddressId::parse(d.require_str("public_ip_address_id")?)?;
        let id = NatGatewayPublicIpAssociationId::new(gateway_id.clone(), public_ip_id.clone());

        let _lock = locks::by_name(&gateway_id.nat_gateway_name, nat_gateway::RESOURCE_TYPE).await;

        let mut gateway = get_gateway(clients, &gateway_id).await?;

        let public_ips = gateway.properties.public_ip_addresses.get_or_insert_with(Vec::new);
        if contains_id(Some(&*public_ips), &public_ip_id.id()) {
            return Err(ResourceError::AlreadyExists {
                resource_type: RESOURCE_TYPE.to_string(),
                id: id.id(),
            });
        }
        public_ips.push(SubResource::new(public_ip_id.id()));
        prepare_for_put(&mut gateway);

        put_and_wait(
            clients,
            &gateway_id.id(),
            nat_gateway::API_VERSION,
            &gateway,
            "updating",
            &gateway_id.describe(),
        )
        .await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = NatGatewayPublicIpAssociationId::parse(d.id())?;

        let gateway = get_existing::<NatGateway>(clients, &id.parent.id(), nat_gateway::API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.parent.describe()), e))?;

        let Some(gateway) = gateway else {
            remove_from_state(d, &id.parent.describe());
            return Ok(());
        };

        if !contains_id(gateway.properties.public_ip_addresses.as_ref(), &id.child.id()) {
            remove_from_state(
                d,
                &format!("association between {} and {}", id.parent.describe(), id.child.describe()),
            );
            return Ok(());
        }

        set_all(d, flatten(&id));
        Ok(())
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = NatGatewayPublicIpAssociationId::parse(d.id())?;

        let _lock = locks::by_name(&id.parent.nat_gateway_name, nat_gateway::RESOURCE_TYPE).await;

        let gateway = get_existing::<NatGateway>(clients, &id.parent.id(), nat_gateway::API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.parent.describe()), e))?;
        let Some(mut gateway) = gateway else {
            return Ok(());
        };

        let child = id.child.id();
        if let Some(public_ips) = gateway.properties.public_ip_addresses.as_mut() {
            public_ips.retain(|ip| !ip.id.eq_ignore_ascii_case(&child));
        }
        prepare_for_put(&mut gateway);

        put_and_wait(
            clients,
            &id.parent.id(),
            nat_gateway::API_VERSION,
            &gateway,
            "removing Public IP association from",
            &id.parent.describe(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/natGateways/gw1|/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/publicIPAddresses/pip1";

    #[test]
    fn test_import_id_must_be_composite() {
        let resource = NatGatewayPublicIpAssociationResource;
        assert!(resource.validate_import_id(ID).is_ok());
        assert!(matches!(
            resource.validate_import_id(
                "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/natGateways/gw1"
            ),
            Err(IdParseError::InvalidComposite { .. })
        ));
    }

    #[test]
    fn test_flatten_uses_both_halves() {
        let id = NatGatewayPublicIpAssociationId::parse(ID).unwrap();
        let attrs = flatten(&id);
        assert_eq!(
            attrs["nat_gateway_id"],
            "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/natGateways/gw1"
        );
        assert_eq!(
            attrs["public_ip_address_id"],
            "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/publicIPAddresses/pip1"
        );
    }

    #[test]
    fn test_has_no_in_place_update() {
        assert!(!NatGatewayPublicIpAssociationResource.schema().supports_update());
    }
}
