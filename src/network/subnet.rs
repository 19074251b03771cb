use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{
    ChildResource, SubResource, delete_and_wait, ensure_absent, expand_sub_resources,
    flatten_string_list, get_existing, put_and_wait, remove_from_state, set_all,
    sub_resource_ids, virtual_network,
};
use crate::azure::ids::{IdParseError, ResourceIdentifier, SubnetId};
use crate::locks::{self, NamedLock};
use crate::resource::{Clients, Resource, ResourceData, ResourceError, str_field, string_list_field};
use crate::schema::{Attribute, Schema};
use crate::validate;

pub const RESOURCE_TYPE: &str = "azurerm_subnet";
pub(crate) const API_VERSION: &str = "2023-11-01";

const PRIVATE_ENDPOINT_POLICIES: &[&str] = &[
    "Disabled",
    "Enabled",
    "NetworkSecurityGroupEnabled",
    "RouteTableEnabled",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubnetProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_prefixes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_security_group: Option<SubResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_table: Option<SubResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_gateway: Option<SubResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_endpoints: Option<Vec<ServiceEndpoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_endpoint_policies: Option<Vec<SubResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Vec<Delegation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_endpoint_network_policies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_link_service_network_policies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_outbound_access: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceEndpoint {
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelegationProperties {
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
}

pub type Delegation = ChildResource<DelegationProperties>;
pub type Subnet = ChildResource<SubnetProperties>;

pub struct SubnetResource;

/// Locks the parent virtual network, then the subnet itself.
pub(crate) async fn lock_subnet(id: &SubnetId) -> (NamedLock, NamedLock) {
    let vnet = locks::by_name(&id.virtual_network_name, virtual_network::RESOURCE_TYPE).await;
    let subnet = locks::by_name(&id.subnet_name, RESOURCE_TYPE).await;
    (vnet, subnet)
}

fn policies_flag(enabled: bool) -> String {
    if enabled { "Enabled" } else { "Disabled" }.to_string()
}

fn expand_delegations(d: &ResourceData) -> Option<Vec<Delegation>> {
    let blocks = d.get_blocks("delegation");
    if blocks.is_empty() {
        return None;
    }

    Some(
        blocks
            .into_iter()
            .map(|block| {
                let service = block
                    .get("service_delegation")
                    .and_then(Value::as_array)
                    .and_then(|items| items.first())
                    .and_then(Value::as_object);
                let actions = service.map(|s| string_list_field(s, "actions")).unwrap_or_default();

                Delegation {
                    name: str_field(block, "name").map(str::to_string),
                    properties: DelegationProperties {
                        service_name: service
                            .and_then(|s| str_field(s, "name"))
                            .unwrap_or_default()
                            .to_string(),
                        actions: if actions.is_empty() { None } else { Some(actions) },
                    },
                    ..Default::default()
                }
            })
            .collect(),
    )
}

fn flatten_delegations(delegations: Option<&Vec<Delegation>>) -> Value {
    let items: Vec<Value> = delegations
        .map(|delegations| {
            delegations
                .iter()
                .map(|d| {
                    json!({
                        "name": d.name.clone().unwrap_or_default(),
                        "service_delegation": [{
                            "name": d.properties.service_name,
                            "actions": d.properties.actions.clone().unwrap_or_default(),
                        }],
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Array(items)
}

pub fn expand(d: &ResourceData) -> Subnet {
    let service_endpoints = d.get_string_list("service_endpoints");

    Subnet {
        name: d.get_string("name"),
        properties: SubnetProperties {
            address_prefixes: Some(d.get_string_list("address_prefixes")),
            service_endpoints: if service_endpoints.is_empty() {
                None
            } else {
                Some(
                    service_endpoints
                        .into_iter()
                        .map(|service| ServiceEndpoint {
                            service,
                            locations: None,
                        })
                        .collect(),
                )
            },
            service_endpoint_policies: expand_sub_resources(
                d.get_string_list("service_endpoint_policy_ids"),
            ),
            delegations: expand_delegations(d),
            private_endpoint_network_policies: Some(
                d.get_str("private_endpoint_network_policies")
                    .unwrap_or("Disabled")
                    .to_string(),
            ),
            private_link_service_network_policies: Some(policies_flag(
                d.get("private_link_service_network_policies_enabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            )),
            default_outbound_access: Some(
                d.get("default_outbound_access_enabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn flatten(id: &SubnetId, model: &Subnet) -> Map<String, Value> {
    let props = &model.properties;

    let address_prefixes = match (&props.address_prefixes, &props.address_prefix) {
        (Some(prefixes), _) if !prefixes.is_empty() => prefixes.clone(),
        (_, Some(prefix)) => vec![prefix.clone()],
        _ => Vec::new(),
    };

    let service_endpoints: Vec<String> = props
        .service_endpoints
        .as_ref()
        .map(|eps| eps.iter().map(|e| e.service.clone()).collect())
        .unwrap_or_default();

    let mut attrs = Map::new();
    attrs.insert("name".into(), id.subnet_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("virtual_network_name".into(), id.virtual_network_name.clone().into());
    attrs.insert("address_prefixes".into(), address_prefixes.into());
    attrs.insert("service_endpoints".into(), flatten_string_list(Some(&service_endpoints)));
    attrs.insert(
        "service_endpoint_policy_ids".into(),
        sub_resource_ids(props.service_endpoint_policies.as_ref()),
    );
    attrs.insert("delegation".into(), flatten_delegations(props.delegations.as_ref()));
    attrs.insert(
        "private_endpoint_network_policies".into(),
        props
            .private_endpoint_network_policies
            .clone()
            .unwrap_or_else(|| "Disabled".to_string())
            .into(),
    );
    attrs.insert(
        "private_link_service_network_policies_enabled".into(),
        props
            .private_link_service_network_policies
            .as_deref()
            .is_none_or(|p| p.eq_ignore_ascii_case("Enabled"))
            .into(),
    );
    attrs.insert(
        "default_outbound_access_enabled".into(),
        props.default_outbound_access.unwrap_or(true).into(),
    );
    attrs
}

#[async_trait]
impl Resource for SubnetResource {
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
            .attribute(
                Attribute::string("virtual_network_name")
                    .required()
                    .force_new()
                    .validate_with(validate::network_resource_name),
            )
            .attribute(
                Attribute::string_list("address_prefixes")
                    .required()
                    .min_items(1)
                    .validate_with(validate::cidr),
            )
            .attribute(Attribute::string_set("service_endpoints").optional())
            .attribute(
                Attribute::string_set("service_endpoint_policy_ids")
                    .optional()
                    .validate_with(validate::arm_resource_id),
            )
            .attribute(
                Attribute::block(
                    "delegation",
                    Schema::new()
                        .attribute(Attribute::string("name").required())
                        .attribute(
                            Attribute::block(
                                "service_delegation",
                                Schema::new()
                                    .attribute(
                                        Attribute::string("name")
                                            .required()
                                            .validate_with(validate::string_not_empty),
                                    )
                                    .attribute(Attribute::string_set("actions").optional()),
                            )
                            .required()
                            .min_items(1)
                            .max_items(1),
                        ),
                )
                .optional(),
            )
            .attribute(
                Attribute::string("private_endpoint_network_policies")
                    .optional()
                    .default("Disabled")
                    .allowed(PRIVATE_ENDPOINT_POLICIES),
            )
            .attribute(
                Attribute::bool("private_link_service_network_policies_enabled")
                    .optional()
                    .default(true),
            )
            .attribute(
                Attribute::bool("default_outbound_access_enabled")
                    .optional()
                    .default(true),
            )
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        SubnetId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = SubnetId::new(
            clients.subscription_id(),
            d.require_str("resource_group_name")?,
            d.require_str("virtual_network_name")?,
            d.require_str("name")?,
        );

        let _locks = lock_subnet(&id).await;

        ensure_absent(clients, RESOURCE_TYPE, &id.id(), &id.describe(), API_VERSION).await?;

        let model = expand(d);
        put_and_wait(clients, &id.id(), API_VERSION, &model, "creating", &id.describe()).await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = SubnetId::parse(d.id())?;

        let model = get_existing::<Subnet>(clients, &id.id(), API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;

        match model {
            Some(model) => set_all(d, flatten(&id, &model)),
            None => remove_from_state(d, &id.describe()),
        }
        Ok(())
    }

    async fn update(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = SubnetId::parse(d.id())?;

        let _locks = lock_subnet(&id).await;

        // Start from the remote object so associations managed by other
        // resources (security group, route table, NAT gateway) survive.
        let mut model = clients
            .arm
            .get::<Subnet>(&id.id(), API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;
        let desired = expand(d).properties;
        let props = &mut model.properties;

        if d.has_change("address_prefixes") {
            props.address_prefix = None;
            props.address_prefixes = desired.address_prefixes;
        }
        if d.has_change("service_endpoints") {
            props.service_endpoints = Some(desired.service_endpoints.unwrap_or_default());
        }
        if d.has_change("service_endpoint_policy_ids") {
            props.service_endpoint_policies = Some(desired.service_endpoint_policies.unwrap_or_default());
        }
        if d.has_change("delegation") {
            props.delegations = Some(desired.delegations.unwrap_or_default());
        }
        if d.has_change("private_endpoint_network_policies") {
            props.private_endpoint_network_policies = desired.private_endpoint_network_policies;
        }
        if d.has_change("private_link_service_network_policies_enabled") {
            props.private_link_service_network_policies = desired.private_link_service_network_policies;
        }
        if d.has_change("default_outbound_access_enabled") {
            props.default_outbound_access = desired.default_outbound_access;
        }
        props.provisioning_state = None;

        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = SubnetId::parse(d.id())?;

        let _locks = lock_subnet(&id).await;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}
