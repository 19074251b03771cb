use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::route::{Route, expand_route_properties, flatten_route_properties, route_schema, validate_next_hop};
use super::{
    SubResource, TrackedResource, delete_and_wait, ensure_absent, expand_location, expand_tags,
    flatten_location, flatten_tags, get_existing, put_and_wait, remove_from_state, set_all,
    sub_resource_ids,
};
use crate::azure::ids::{IdParseError, ResourceIdentifier, RouteTableId};
use crate::locks;
use crate::resource::{Clients, Resource, ResourceData, ResourceError, str_field};
use crate::schema::{Attribute, Schema};
use crate::validate::{self, ValidationError};

pub const RESOURCE_TYPE: &str = "azurerm_route_table";
const API_VERSION: &str = "2023-11-01";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteTableProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<Route>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_bgp_route_propagation: Option<bool>,
    #[serde(skip_serializing)]
    pub subnets: Option<Vec<SubResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

pub type RouteTable = TrackedResource<RouteTableProperties>;

pub struct RouteTableResource;

/// `None` leaves routes managed by `azurerm_route` untouched.
fn expand_routes(d: &ResourceData) -> Option<Vec<Route>> {
    d.get("route")?;

    Some(
        d.get_blocks("route")
            .into_iter()
            .map(|block| Route {
                name: str_field(block, "name").map(str::to_string),
                properties: expand_route_properties(block),
                ..Default::default()
            })
            .collect(),
    )
}

fn flatten_routes(routes: Option<&Vec<Route>>) -> Value {
    let items: Vec<Value> = routes
        .map(|routes| {
            routes
                .iter()
                .map(|route| {
                    let mut attrs = flatten_route_properties(&route.properties);
                    attrs.insert("name".into(), route.name.clone().unwrap_or_default().into());
                    Value::Object(attrs)
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Array(items)
}

pub fn expand(d: &ResourceData) -> Result<RouteTable, ResourceError> {
    let propagation = d
        .get("bgp_route_propagation_enabled")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    Ok(RouteTable {
        location: Some(expand_location(d)?),
        tags: expand_tags(d),
        properties: RouteTableProperties {
            routes: expand_routes(d),
            disable_bgp_route_propagation: Some(!propagation),
            ..Default::default()
        },
        ..Default::default()
    })
}

pub fn flatten(id: &RouteTableId, model: &RouteTable) -> Map<String, Value> {
    let props = &model.properties;

    let mut attrs = Map::new();
    attrs.insert("name".into(), id.route_table_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("location".into(), flatten_location(model.location.as_deref()));
    attrs.insert("route".into(), flatten_routes(props.routes.as_ref()));
    attrs.insert(
        "bgp_route_propagation_enabled".into(),
        (!props.disable_bgp_route_propagation.unwrap_or(false)).into(),
    );
    attrs.insert("subnets".into(), sub_resource_ids(props.subnets.as_ref()));
    attrs.insert("tags".into(), flatten_tags(model.tags.as_ref()));
    attrs
}

#[async_trait]
impl Resource for RouteTableResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> Schema {
        let mut route = Schema::new().attribute(
            Attribute::string("name")
                .required()
                .validate_with(validate::network_resource_name),
        );
        for attribute in route_schema().attributes() {
            route = route.attribute(attribute.clone());
        }

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
            .attribute(Attribute::block("route", route).optional().computed())
            .attribute(
                Attribute::bool("bgp_route_propagation_enabled")
                    .optional()
                    .default(true),
            )
            .attribute(Attribute::string_set("subnets").computed())
            .attribute(Attribute::map("tags").optional())
    }

    fn validate(&self, d: &ResourceData) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        for (i, block) in d.get_blocks("route").into_iter().enumerate() {
            if let Err(e) = validate_next_hop(block) {
                for message in e.errors {
                    errors.push(format!("route.{}: {}", i, message));
                }
            }
        }
        errors.into_result()
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        RouteTableId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        self.validate(d)?;

        let id = RouteTableId::new(
            clients.subscription_id(),
            d.require_str("resource_group_name")?,
            d.require_str("name")?,
        );

        ensure_absent(clients, RESOURCE_TYPE, &id.id(), &id.describe(), API_VERSION).await?;

        let model = expand(d)?;

        let _lock = locks::by_name(&id.route_table_name, RESOURCE_TYPE).await;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "creating", &id.describe()).await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = RouteTableId::parse(d.id())?;

        let model = get_existing::<RouteTable>(clients, &id.id(), API_VERSION)
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
        let id = RouteTableId::parse(d.id())?;

        let _lock = locks::by_name(&id.route_table_name, RESOURCE_TYPE).await;

        let mut model = expand(d)?;
        if model.properties.routes.is_none() {
            let existing = clients
                .arm
                .get::<RouteTable>(&id.id(), API_VERSION)
                .await
                .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;
            model.properties.routes = existing.properties.routes;
        }

        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = RouteTableId::parse(d.id())?;

        let _lock = locks::by_name(&id.route_table_name, RESOURCE_TYPE).await;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}
