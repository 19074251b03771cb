//! `azurerm_route`, plus the route model shared with the inline `route`
//! blocks of `azurerm_route_table`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    ChildResource, delete_and_wait, ensure_absent, get_existing, put_and_wait, remove_from_state,
    route_table, set_all,
};
use crate::azure::ids::{IdParseError, ResourceIdentifier, RouteId};
use crate::locks;
use crate::resource::{Clients, Resource, ResourceData, ResourceError, str_field};
use crate::schema::{Attribute, Schema};
use crate::validate::{self, ValidationError};

pub const RESOURCE_TYPE: &str = "azurerm_route";
const API_VERSION: &str = "2023-11-01";

pub const VIRTUAL_APPLIANCE: &str = "VirtualAppliance";
pub const NEXT_HOP_TYPES: &[&str] = &[
    "VirtualNetworkGateway",
    "VnetLocal",
    "Internet",
    VIRTUAL_APPLIANCE,
    "None",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteProperties {
    pub address_prefix: String,
    pub next_hop_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_hop_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

pub type Route = ChildResource<RouteProperties>;

pub struct RouteResource;

pub(crate) fn route_schema() -> Schema {
    Schema::new()
        .attribute(Attribute::string("address_prefix").required().validate_with(validate::string_not_empty))
        .attribute(Attribute::string("next_hop_type").required().allowed(NEXT_HOP_TYPES))
        .attribute(
            Attribute::string("next_hop_in_ip_address")
                .optional()
                .validate_with(validate::ipv4_address),
        )
}

/// A next hop address goes with, and only with, a virtual appliance.
pub fn validate_next_hop(route: &Map<String, Value>) -> Result<(), ValidationError> {
    let appliance = str_field(route, "next_hop_type") == Some(VIRTUAL_APPLIANCE);
    let has_address = validate::is_set(route, "next_hop_in_ip_address");

    match (appliance, has_address) {
        (false, true) => Err(ValidationError::single(format!(
            "`next_hop_in_ip_address` is only allowed when `next_hop_type` is `{}`",
            VIRTUAL_APPLIANCE
        ))),
        (true, false) => Err(ValidationError::single(format!(
            "`next_hop_in_ip_address` is required when `next_hop_type` is `{}`",
            VIRTUAL_APPLIANCE
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn expand_route_properties(route: &Map<String, Value>) -> RouteProperties {
    RouteProperties {
        address_prefix: str_field(route, "address_prefix").unwrap_or_default().to_string(),
        next_hop_type: str_field(route, "next_hop_type").unwrap_or_default().to_string(),
        next_hop_ip_address: str_field(route, "next_hop_in_ip_address").map(str::to_string),
        provisioning_state: None,
    }
}

pub(crate) fn flatten_route_properties(props: &RouteProperties) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("address_prefix".into(), props.address_prefix.clone().into());
    attrs.insert("next_hop_type".into(), props.next_hop_type.clone().into());
    attrs.insert(
        "next_hop_in_ip_address".into(),
        props.next_hop_ip_address.clone().unwrap_or_default().into(),
    );
    attrs
}

fn flatten(id: &RouteId, model: &Route) -> Map<String, Value> {
    let mut attrs = flatten_route_properties(&model.properties);
    attrs.insert("name".into(), id.route_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("route_table_name".into(), id.route_table_name.clone().into());
    attrs
}

fn expand(id: &RouteId, d: &ResourceData) -> Route {
    Route {
        name: Some(id.route_name.clone()),
        properties: expand_route_properties(d.attributes()),
        ..Default::default()
    }
}

#[async_trait]
impl Resource for RouteResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> Schema {
        let mut schema = Schema::new()
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
            .attribute(
                Attribute::string("route_table_name")
                    .required()
                    .force_new()
                    .validate_with(validate::network_resource_name),
            );
        for attribute in route_schema().attributes() {
            schema = schema.attribute(attribute.clone());
        }
        schema
    }

    fn validate(&self, d: &ResourceData) -> Result<(), ValidationError> {
        validate_next_hop(d.attributes())
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        RouteId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        self.validate(d)?;

        let id = RouteId::new(
            clients.subscription_id(),
            d.require_str("resource_group_name")?,
            d.require_str("route_table_name")?,
            d.require_str("name")?,
        );

        let _lock = locks::by_name(&id.route_table_name, route_table::RESOURCE_TYPE).await;

        ensure_absent(clients, RESOURCE_TYPE, &id.id(), &id.describe(), API_VERSION).await?;

        put_and_wait(clients, &id.id(), API_VERSION, &expand(&id, d), "creating", &id.describe())
            .await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = RouteId::parse(d.id())?;

        let model = get_existing::<Route>(clients, &id.id(), API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;

        match model {
            Some(model) => set_all(d, flatten(&id, &model)),
            None => remove_from_state(d, &id.describe()),
        }
        Ok(())
    }

    async fn update(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        self.validate(d)?;
        let id = RouteId::parse(d.id())?;

        let _lock = locks::by_name(&id.route_table_name, route_table::RESOURCE_TYPE).await;

        put_and_wait(clients, &id.id(), API_VERSION, &expand(&id, d), "updating", &id.describe())
            .await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = RouteId::parse(d.id())?;

        let _lock = locks::by_name(&id.route_table_name, route_table::RESOURCE_TYPE).await;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}
