//! `azurerm_private_endpoint`
//!
//! Creating an endpoint changes the target subnet and, for Cosmos DB targets,
//! the database account's private endpoint connections. Both are serialized
//! through named locks: Cosmos DB account IDs first (sorted), then the
//! virtual network and the subnet.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::subnet::lock_subnet;
use super::{
    ChildResource, SubResource, TrackedResource, delete_and_wait, ensure_absent, expand_location,
    expand_tags, flatten_location, flatten_string_list, flatten_tags, get_existing, put_and_wait,
    remove_from_state, set_all,
};
use crate::azure::ids::{IdParseError, PrivateEndpointId, ResourceId, ResourceIdentifier, SubnetId};
use crate::locks::{self, NamedLock, NamedLocks};
use crate::resource::{
    Clients, Resource, ResourceData, ResourceError, bool_field, str_field, string_list_field,
};
use crate::schema::{Attribute, Schema};
use crate::validate::{self, ValidationError};

pub const RESOURCE_TYPE: &str = "azurerm_private_endpoint";
const API_VERSION: &str = "2023-11-01";

const COSMOS_DB_PROVIDER: &str = "Microsoft.DocumentDB";
const COSMOS_DB_ACCOUNTS: &str = "databaseAccounts";
const MAX_REQUEST_MESSAGE: usize = 140;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivateEndpointProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet: Option<SubResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_link_service_connections: Option<Vec<PrivateLinkServiceConnection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_private_link_service_connections: Option<Vec<PrivateLinkServiceConnection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_network_interface_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_configurations: Option<Vec<PrivateEndpointIpConfiguration>>,
    #[serde(skip_serializing)]
    pub custom_dns_configs: Option<Vec<CustomDnsConfig>>,
    #[serde(skip_serializing)]
    pub network_interfaces: Option<Vec<SubResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivateLinkServiceConnectionProperties {
    pub private_link_service_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_message: Option<String>,
    #[serde(skip_serializing)]
    pub private_link_service_connection_state: Option<ConnectionState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionState {
    pub status: Option<String>,
    pub description: Option<String>,
}

pub type PrivateLinkServiceConnection = ChildResource<PrivateLinkServiceConnectionProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivateEndpointIpConfigurationProperties {
    #[serde(rename = "privateIPAddress")]
    pub private_ip_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_name: Option<String>,
}

pub type PrivateEndpointIpConfiguration = ChildResource<PrivateEndpointIpConfigurationProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomDnsConfig {
    pub fqdn: Option<String>,
    pub ip_addresses: Vec<String>,
}

pub type PrivateEndpoint = TrackedResource<PrivateEndpointProperties>;

pub struct PrivateEndpointResource;

/// Checks one `private_service_connection` block. Pure.
pub fn validate_private_service_connection(
    connection: &Map<String, Value>,
) -> Result<(), ValidationError> {
    let mut errors = ValidationError::new();
    let has_id = validate::is_set(connection, "private_connection_resource_id");
    let has_alias = validate::is_set(connection, "private_connection_resource_alias");
    let manual = bool_field(connection, "is_manual_connection");

    match (has_id, has_alias) {
        (true, true) => errors.push(
            "only one of `private_connection_resource_id` and `private_connection_resource_alias` can be used",
        ),
        (false, false) => errors.push(
            "one of `private_connection_resource_id` or `private_connection_resource_alias` must be specified",
        ),
        _ => {}
    }

    if let Some(message) = str_field(connection, "request_message") {
        if !manual {
            errors.push(
                "`request_message` is only valid when `is_manual_connection` is set to `true`",
            );
        }
        if message.chars().count() > MAX_REQUEST_MESSAGE {
            errors.push(format!(
                "`request_message` must not exceed {} characters, got {}",
                MAX_REQUEST_MESSAGE,
                message.chars().count()
            ));
        }
    }

    errors.into_result()
}

/// Sorted, de-duplicated Cosmos DB account IDs targeted by the connections.
pub fn cosmos_db_account_ids(d: &ResourceData) -> Vec<String> {
    let mut ids: Vec<String> = d
        .get_blocks("private_service_connection")
        .into_iter()
        .filter_map(|c| str_field(c, "private_connection_resource_id"))
        .filter(|id| {
            ResourceId::parse(id).is_ok_and(|parsed| parsed.is_type(COSMOS_DB_PROVIDER, COSMOS_DB_ACCOUNTS))
        })
        .map(str::to_string)
        .collect();
    ids.sort_by_key(|id| id.to_lowercase());
    ids.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    ids
}

struct EndpointLocks {
    _cosmos: NamedLocks,
    _subnet: (NamedLock, NamedLock),
}

async fn lock_endpoint(d: &ResourceData) -> Result<EndpointLocks, ResourceError> {
    let subnet_id = SubnetId::parse(d.require_str("subnet_id")?)?;
    let cosmos = locks::by_ids(&cosmos_db_account_ids(d)).await;
    let subnet = lock_subnet(&subnet_id).await;
    Ok(EndpointLocks {
        _cosmos: cosmos,
        _subnet: subnet,
    })
}

fn expand_connection(connection: &Map<String, Value>) -> (bool, PrivateLinkServiceConnection) {
    let manual = bool_field(connection, "is_manual_connection");
    let target = str_field(connection, "private_connection_resource_id")
        .or_else(|| str_field(connection, "private_connection_resource_alias"))
        .unwrap_or_default();
    let group_ids = string_list_field(connection, "subresource_names");

    let model = PrivateLinkServiceConnection {
        name: str_field(connection, "name").map(str::to_string),
        properties: PrivateLinkServiceConnectionProperties {
            private_link_service_id: target.to_string(),
            group_ids: if group_ids.is_empty() { None } else { Some(group_ids) },
            request_message: if manual {
                str_field(connection, "request_message").map(str::to_string)
            } else {
                None
            },
            private_link_service_connection_state: None,
        },
        ..Default::default()
    };
    (manual, model)
}

fn expand_ip_configurations(d: &ResourceData) -> Option<Vec<PrivateEndpointIpConfiguration>> {
    let blocks = d.get_blocks("ip_configuration");
    if blocks.is_empty() {
        return None;
    }

    Some(
        blocks
            .into_iter()
            .map(|block| PrivateEndpointIpConfiguration {
                name: str_field(block, "name").map(str::to_string),
                properties: PrivateEndpointIpConfigurationProperties {
                    private_ip_address: str_field(block, "private_ip_address")
                        .unwrap_or_default()
                        .to_string(),
                    group_id: str_field(block, "subresource_name").map(str::to_string),
                    member_name: str_field(block, "member_name").map(str::to_string),
                },
                ..Default::default()
            })
            .collect(),
    )
}

pub fn expand(d: &ResourceData) -> Result<PrivateEndpoint, ResourceError> {
    let mut automatic = Vec::new();
    let mut manual = Vec::new();
    for block in d.get_blocks("private_service_connection") {
        match expand_connection(block) {
            (true, connection) => manual.push(connection),
            (false, connection) => automatic.push(connection),
        }
    }

    Ok(PrivateEndpoint {
        location: Some(expand_location(d)?),
        tags: expand_tags(d),
        properties: PrivateEndpointProperties {
            subnet: d.get_str("subnet_id").map(SubResource::new),
            private_link_service_connections: Some(automatic),
            manual_private_link_service_connections: Some(manual),
            custom_network_interface_name: d.get_string("custom_network_interface_name"),
            ip_configurations: expand_ip_configurations(d),
            ..Default::default()
        },
        ..Default::default()
    })
}

fn flatten_connections(props: &PrivateEndpointProperties, private_ip_address: &str) -> Value {
    let automatic = props.private_link_service_connections.iter().flatten().map(|c| (false, c));
    let manual = props
        .manual_private_link_service_connections
        .iter()
        .flatten()
        .map(|c| (true, c));

    let items: Vec<Value> = automatic
        .chain(manual)
        .map(|(is_manual, c)| {
            let target = &c.properties.private_link_service_id;
            let (resource_id, alias) = if target.starts_with('/') {
                (target.clone(), String::new())
            } else {
                (String::new(), target.clone())
            };

            json!({
                "name": c.name.clone().unwrap_or_default(),
                "is_manual_connection": is_manual,
                "private_connection_resource_id": resource_id,
                "private_connection_resource_alias": alias,
                "subresource_names": flatten_string_list(c.properties.group_ids.as_ref()),
                "request_message": c.properties.request_message.clone().unwrap_or_default(),
                "private_ip_address": private_ip_address,
            })
        })
        .collect();
    Value::Array(items)
}

pub fn flatten(id: &PrivateEndpointId, model: &PrivateEndpoint) -> Map<String, Value> {
    let props = &model.properties;

    let custom_dns_configs: Vec<Value> = props
        .custom_dns_configs
        .iter()
        .flatten()
        .map(|c| json!({"fqdn": c.fqdn.clone().unwrap_or_default(), "ip_addresses": c.ip_addresses}))
        .collect();
    let private_ip_address = props
        .custom_dns_configs
        .iter()
        .flatten()
        .flat_map(|c| c.ip_addresses.first())
        .next()
        .cloned()
        .unwrap_or_default();

    let ip_configurations: Vec<Value> = props
        .ip_configurations
        .iter()
        .flatten()
        .map(|c| {
            json!({
                "name": c.name.clone().unwrap_or_default(),
                "private_ip_address": c.properties.private_ip_address,
                "subresource_name": c.properties.group_id.clone().unwrap_or_default(),
                "member_name": c.properties.member_name.clone().unwrap_or_default(),
            })
        })
        .collect();

    let mut attrs = Map::new();
    attrs.insert("name".into(), id.private_endpoint_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("location".into(), flatten_location(model.location.as_deref()));
    attrs.insert(
        "subnet_id".into(),
        props.subnet.as_ref().map(|s| s.id.clone()).unwrap_or_default().into(),
    );
    attrs.insert(
        "custom_network_interface_name".into(),
        props
            .custom_network_interface_name
            .clone()
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    attrs.insert(
        "private_service_connection".into(),
        flatten_connections(props, &private_ip_address),
    );
    attrs.insert("ip_configuration".into(), Value::Array(ip_configurations));
    attrs.insert("custom_dns_configs".into(), Value::Array(custom_dns_configs));
    attrs.insert("tags".into(), flatten_tags(model.tags.as_ref()));
    attrs
}

#[async_trait]
impl Resource for PrivateEndpointResource {
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
                Attribute::string("subnet_id")
                    .required()
                    .force_new()
                    .validate_with(validate::arm_resource_id),
            )
            .attribute(
                Attribute::string("custom_network_interface_name")
                    .optional()
                    .force_new()
                    .validate_with(validate::network_resource_name),
            )
            .attribute(
                Attribute::block(
                    "private_service_connection",
                    Schema::new()
                        .attribute(
                            Attribute::string("name")
                                .required()
                                .force_new()
                                .validate_with(validate::network_resource_name),
                        )
                        .attribute(Attribute::bool("is_manual_connection").required().force_new())
                        .attribute(
                            Attribute::string("private_connection_resource_id")
                                .optional()
                                .force_new()
                                .validate_with(validate::arm_resource_id),
                        )
                        .attribute(
                            Attribute::string("private_connection_resource_alias")
                                .optional()
                                .force_new(),
                        )
                        .attribute(Attribute::string_list("subresource_names").optional().force_new())
                        .attribute(Attribute::string("request_message").optional())
                        .attribute(Attribute::string("private_ip_address").computed()),
                )
                .required()
                .min_items(1)
                .max_items(1),
            )
            .attribute(
                Attribute::block(
                    "ip_configuration",
                    Schema::new()
                        .attribute(Attribute::string("name").required().force_new())
                        .attribute(
                            Attribute::string("private_ip_address")
                                .required()
                                .force_new()
                                .validate_with(validate::ipv4_address),
                        )
                        .attribute(Attribute::string("subresource_name").optional().force_new())
                        .attribute(Attribute::string("member_name").optional().force_new()),
                )
                .optional()
                .force_new(),
            )
            .attribute(Attribute::block("custom_dns_configs", Schema::new()).computed())
            .attribute(Attribute::map("tags").optional())
    }

    fn validate(&self, d: &ResourceData) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        for connection in d.get_blocks("private_service_connection") {
            if let Err(e) = validate_private_service_connection(connection) {
                errors.extend(e);
            }
        }
        errors.into_result()
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        PrivateEndpointId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        self.validate(d)?;

        let id = PrivateEndpointId::new(
            clients.subscription_id(),
            d.require_str("resource_group_name")?,
            d.require_str("name")?,
        );

        ensure_absent(clients, RESOURCE_TYPE, &id.id(), &id.describe(), API_VERSION).await?;

        let model = expand(d)?;

        let _locks = lock_endpoint(d).await?;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "creating", &id.describe()).await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = PrivateEndpointId::parse(d.id())?;

        let model = get_existing::<PrivateEndpoint>(clients, &id.id(), API_VERSION)
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
        let id = PrivateEndpointId::parse(d.id())?;

        let model = expand(d)?;

        let _locks = lock_endpoint(d).await?;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = PrivateEndpointId::parse(d.id())?;

        let _locks = lock_endpoint(d).await?;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBNET: &str = "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/endpoints";
    const STORAGE: &str = "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Storage/storageAccounts/store1";
    const COSMOS_A: &str = "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.DocumentDB/databaseAccounts/alpha";
    const COSMOS_B: &str = "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.DocumentDB/databaseAccounts/beta";

    fn connection(extra: Value) -> Map<String, Value> {
        let mut base = json!({
            "name": "psc",
            "is_manual_connection": false,
            "private_connection_resource_id": STORAGE,
            "subresource_names": ["blob"]
        });
        for (k, v) in extra.as_object().cloned().unwrap() {
            base[k] = v;
        }
        base.as_object().cloned().unwrap()
    }

    fn config(connections: Vec<Map<String, Value>>) -> ResourceData {
        ResourceData::new(
            json!({
                "name": "pe1",
                "resource_group_name": "rg1",
                "location": "westeurope",
                "subnet_id": SUBNET,
                "private_service_connection": connections
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
    }

    #[test]
    fn test_connection_needs_exactly_one_target() {
        assert!(validate_private_service_connection(&connection(json!({}))).is_ok());

        let both = connection(json!({"private_connection_resource_alias": "svc.guid.westeurope.azure.privatelinkservice"}));
        assert!(validate_private_service_connection(&both).unwrap_err().to_string().contains("only one of"));

        let neither = connection(json!({"private_connection_resource_id": null}));
        assert!(validate_private_service_connection(&neither).unwrap_err().to_string().contains("must be specified"));
    }

    #[test]
    fn test_request_message_rules() {
        let automatic = connection(json!({"request_message": "please"}));
        assert!(validate_private_service_connection(&automatic).is_err());

        let manual = connection(json!({"is_manual_connection": true, "request_message": "please"}));
        assert!(validate_private_service_connection(&manual).is_ok());

        let long = connection(json!({"is_manual_connection": true, "request_message": "x".repeat(141)}));
        let err = validate_private_service_connection(&long).unwrap_err();
        assert!(err.to_string().contains("must not exceed 140 characters"));
    }

    #[test]
    fn test_cosmos_db_targets_are_sorted_and_deduplicated() {
        let d = config(vec![
            connection(json!({"private_connection_resource_id": COSMOS_B})),
            connection(json!({})),
            connection(json!({"private_connection_resource_id": COSMOS_A})),
            connection(json!({"private_connection_resource_id": COSMOS_B.to_uppercase()})),
        ]);
        let ids = cosmos_db_account_ids(&d);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], COSMOS_A);
        assert!(ids[1].eq_ignore_ascii_case(COSMOS_B));
    }

    #[test]
    fn test_manual_connections_go_to_their_own_collection() {
        let d = config(vec![connection(json!({"is_manual_connection": true, "request_message": "hi"}))]);
        let body = serde_json::to_value(expand(&d).unwrap()).unwrap();
        assert_eq!(body["properties"]["privateLinkServiceConnections"], json!([]));
        assert_eq!(
            body["properties"]["manualPrivateLinkServiceConnections"][0]["properties"],
            json!({"privateLinkServiceId": STORAGE, "groupIds": ["blob"], "requestMessage": "hi"})
        );
    }

    #[test]
    fn test_expand_flatten_roundtrip() {
        for conn in [
            connection(json!({})),
            connection(json!({"is_manual_connection": true, "request_message": "approve me"})),
            connection(json!({
                "private_connection_resource_id": null,
                "private_connection_resource_alias": "svc.00000000.westeurope.azure.privatelinkservice"
            })),
        ] {
            let d = config(vec![conn.clone()]);
            let wire: PrivateEndpoint =
                serde_json::from_value(serde_json::to_value(expand(&d).unwrap()).unwrap()).unwrap();
            let flattened = flatten(&PrivateEndpointId::new("sub", "rg1", "pe1"), &wire);

            assert_eq!(flattened["subnet_id"], json!(SUBNET));
            let block = flattened["private_service_connection"][0].as_object().unwrap();
            for (key, value) in &conn {
                if value.is_null() {
                    assert_eq!(block[key], json!(""), "attribute {}", key);
                } else {
                    assert_eq!(&block[key], value, "attribute {}", key);
                }
            }
        }
    }
}
