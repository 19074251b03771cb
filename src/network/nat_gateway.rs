use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    Sku, SubResource, TrackedResource, delete_and_wait, ensure_absent, expand_location,
    expand_tags, expand_zones, flatten_location, flatten_tags, flatten_zones, get_existing,
    put_and_wait, remove_from_state, set_all,
};
use crate::azure::ids::{IdParseError, NatGatewayId, ResourceIdentifier};
use crate::locks;
use crate::resource::{Clients, Resource, ResourceData, ResourceError};
use crate::schema::{Attribute, Schema};
use crate::validate;

pub const RESOURCE_TYPE: &str = "azurerm_nat_gateway";
pub(crate) const API_VERSION: &str = "2023-11-01";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatGatewayProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_in_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip_addresses: Option<Vec<SubResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip_prefixes: Option<Vec<SubResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnets: Option<Vec<SubResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

pub type NatGateway = TrackedResource<NatGatewayProperties>;

pub struct NatGatewayResource;

fn expand_sku(d: &ResourceData) -> Sku {
    Sku {
        name: Some(d.get_str("sku_name").unwrap_or("Standard").to_string()),
        tier: None,
    }
}

pub fn expand(d: &ResourceData) -> Result<NatGateway, ResourceError> {
    Ok(NatGateway {
        location: Some(expand_location(d)?),
        tags: expand_tags(d),
        zones: expand_zones(d),
        sku: Some(expand_sku(d)),
        properties: NatGatewayProperties {
            idle_timeout_in_minutes: Some(d.get_i64("idle_timeout_in_minutes").unwrap_or(4)),
            ..Default::default()
        },
        ..Default::default()
    })
}

pub fn flatten(id: &NatGatewayId, model: &NatGateway) -> Map<String, Value> {
    let props = &model.properties;

    let mut attrs = Map::new();
    attrs.insert("name".into(), id.nat_gateway_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("location".into(), flatten_location(model.location.as_deref()));
    attrs.insert(
        "sku_name".into(),
        model
            .sku
            .as_ref()
            .and_then(|s| s.name.clone())
            .unwrap_or_else(|| "Standard".to_string())
            .into(),
    );
    attrs.insert(
        "idle_timeout_in_minutes".into(),
        props.idle_timeout_in_minutes.unwrap_or(4).into(),
    );
    attrs.insert("resource_guid".into(), props.resource_guid.clone().unwrap_or_default().into());
    attrs.insert("zones".into(), flatten_zones(model.zones.as_ref()));
    attrs.insert("tags".into(), flatten_tags(model.tags.as_ref()));
    attrs
}

#[async_trait]
impl Resource for NatGatewayResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute(
                Attribute::string("name")
                    .required()
                    .force_new()
                    .validate_with(validate::network_resource_name),
            )
            .attribute(
                Attribute::string("resource_group_name")
                    .required()
                    .force_new()
                    .validate_with(validate::resource_group_name),
            )
            .attribute(Attribute::string("location").required().force_new())
            .attribute(
                Attribute::string("sku_name")
                    .optional()
                    .default("Standard")
                    .allowed(&["Standard"]),
            )
            .attribute(
                Attribute::int("idle_timeout_in_minutes")
                    .optional()
                    .default(4)
                    .between(4, 120),
            )
            .attribute(Attribute::string_set("zones").optional().force_new())
            .attribute(Attribute::string("resource_guid").computed())
            .attribute(Attribute::map("tags").optional())
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        NatGatewayId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = NatGatewayId::new(
            clients.subscription_id(),
            d.require_str("resource_group_name")?,
            d.require_str("name")?,
        );

        ensure_absent(clients, RESOURCE_TYPE, &id.id(), &id.describe(), API_VERSION).await?;

        let model = expand(d)?;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "creating", &id.describe()).await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = NatGatewayId::parse(d.id())?;

        let model = get_existing::<NatGateway>(clients, &id.id(), API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;

        match model {
            Some(model) => set_all(d, flatten(&id, &model)),
            None => remove_from_state(d, &id.describe()),
        }
        Ok(())
    }

    async fn update(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = NatGatewayId::parse(d.id())?;

        let _lock = locks::by_name(&id.nat_gateway_name, RESOURCE_TYPE).await;

        // Public IP and prefix associations are owned by association
        // resources; only the gateway's own settings are replaced.
        let mut model = clients
            .arm
            .get::<NatGateway>(&id.id(), API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;

        if d.has_change("sku_name") {
            model.sku = Some(expand_sku(d));
        }
        if d.has_change("idle_timeout_in_minutes") {
            model.properties.idle_timeout_in_minutes = d.get_i64("idle_timeout_in_minutes");
        }
        if d.has_change("tags") {
            model.tags = expand_tags(d);
        }
        model.properties.subnets = None;
        model.properties.provisioning_state = None;

        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = NatGatewayId::parse(d.id())?;

        let _lock = locks::by_name(&id.nat_gateway_name, RESOURCE_TYPE).await;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}
