use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{
    SubResource, TrackedResource, delete_and_wait, ensure_absent, expand_location, expand_tags,
    flatten_location, flatten_string_list, flatten_tags, get_existing, put_and_wait,
    remove_from_state, set_all,
};
use crate::azure::ids::{IdParseError, ResourceIdentifier, VirtualNetworkId};
use crate::locks;
use crate::resource::{Clients, Resource, ResourceData, ResourceError, bool_field, str_field};
use crate::schema::{Attribute, Schema};
use crate::validate;

pub const RESOURCE_TYPE: &str = "azurerm_virtual_network";
pub(crate) const API_VERSION: &str = "2023-11-01";

const ENCRYPTION_ENFORCEMENT: &[&str] = &["AllowUnencrypted", "DropUnencrypted"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualNetworkProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_space: Option<AddressSpace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp_options: Option<DhcpOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bgp_communities: Option<BgpCommunities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_timeout_in_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ddos_protection_plan: Option<SubResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_ddos_protection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<Encryption>,
    /// Kept verbatim so an update never drops subnets managed elsewhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnets: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressSpace {
    pub address_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DhcpOptions {
    pub dns_servers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BgpCommunities {
    pub virtual_network_community: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Encryption {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforcement: Option<String>,
}

pub type VirtualNetwork = TrackedResource<VirtualNetworkProperties>;

pub struct VirtualNetworkResource;

pub fn expand(d: &ResourceData) -> Result<VirtualNetwork, ResourceError> {
    let mut props = VirtualNetworkProperties {
        address_space: Some(AddressSpace {
            address_prefixes: d.get_string_list("address_space"),
        }),
        dhcp_options: Some(DhcpOptions {
            dns_servers: d.get_string_list("dns_servers"),
        }),
        bgp_communities: d.get_str("bgp_community").map(|c| BgpCommunities {
            virtual_network_community: c.to_string(),
        }),
        flow_timeout_in_minutes: d.get_i64("flow_timeout_in_minutes"),
        ..Default::default()
    };

    if let Some(plan) = d.get_blocks("ddos_protection_plan").first() {
        props.ddos_protection_plan = str_field(plan, "id").map(SubResource::new);
        props.enable_ddos_protection = Some(bool_field(plan, "enable"));
    }

    if let Some(encryption) = d.get_blocks("encryption").first() {
        props.encryption = Some(Encryption {
            enabled: true,
            enforcement: str_field(encryption, "enforcement").map(str::to_string),
        });
    }

    Ok(VirtualNetwork {
        location: Some(expand_location(d)?),
        tags: expand_tags(d),
        properties: props,
        ..Default::default()
    })
}

pub fn flatten(id: &VirtualNetworkId, model: &VirtualNetwork) -> Map<String, Value> {
    let props = &model.properties;

    let ddos = match &props.ddos_protection_plan {
        Some(plan) => json!([{
            "id": plan.id,
            "enable": props.enable_ddos_protection.unwrap_or(false),
        }]),
        None => json!([]),
    };

    let encryption = match &props.encryption {
        Some(e) if e.enabled => json!([{ "enforcement": e.enforcement.clone().unwrap_or_default() }]),
        _ => json!([]),
    };

    let mut attrs = Map::new();
    attrs.insert("name".into(), id.virtual_network_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("location".into(), flatten_location(model.location.as_deref()));
    attrs.insert(
        "address_space".into(),
        flatten_string_list(props.address_space.as_ref().map(|a| &a.address_prefixes)),
    );
    attrs.insert(
        "dns_servers".into(),
        flatten_string_list(props.dhcp_options.as_ref().map(|o| &o.dns_servers)),
    );
    attrs.insert(
        "bgp_community".into(),
        props
            .bgp_communities
            .as_ref()
            .map(|c| Value::from(c.virtual_network_community.clone()))
            .unwrap_or(Value::Null),
    );
    attrs.insert(
        "flow_timeout_in_minutes".into(),
        props.flow_timeout_in_minutes.map(Value::from).unwrap_or(Value::Null),
    );
    attrs.insert("ddos_protection_plan".into(), ddos);
    attrs.insert("encryption".into(), encryption);
    attrs.insert("guid".into(), props.resource_guid.clone().unwrap_or_default().into());
    attrs.insert("tags".into(), flatten_tags(model.tags.as_ref()));
    attrs
}

#[async_trait]
impl Resource for VirtualNetworkResource {
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
                Attribute::string_list("address_space")
                    .required()
                    .min_items(1)
                    .validate_with(validate::cidr),
            )
            .attribute(
                Attribute::string_list("dns_servers")
                    .optional()
                    .validate_with(validate::ipv4_address),
            )
            .attribute(Attribute::string("bgp_community").optional())
            .attribute(Attribute::int("flow_timeout_in_minutes").optional().between(4, 30))
            .attribute(
                Attribute::block(
                    "ddos_protection_plan",
                    Schema::new()
                        .attribute(
                            Attribute::string("id")
                                .required()
                                .validate_with(validate::arm_resource_id),
                        )
                        .attribute(Attribute::bool("enable").required()),
                )
                .optional()
                .max_items(1),
            )
            .attribute(
                Attribute::block(
                    "encryption",
                    Schema::new().attribute(
                        Attribute::string("enforcement")
                            .required()
                            .allowed(ENCRYPTION_ENFORCEMENT),
                    ),
                )
                .optional()
                .max_items(1),
            )
            .attribute(Attribute::string("guid").computed())
            .attribute(Attribute::map("tags").optional())
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        VirtualNetworkId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = VirtualNetworkId::new(
            clients.subscription_id(),
            d.require_str("resource_group_name")?,
            d.require_str("name")?,
        );

        ensure_absent(clients, RESOURCE_TYPE, &id.id(), &id.describe(), API_VERSION).await?;

        let model = expand(d)?;

        let _lock = locks::by_name(&id.virtual_network_name, RESOURCE_TYPE).await;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "creating", &id.describe()).await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = VirtualNetworkId::parse(d.id())?;

        let model = get_existing::<VirtualNetwork>(clients, &id.id(), API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;

        match model {
            Some(model) => set_all(d, flatten(&id, &model)),
            None => remove_from_state(d, &id.describe()),
        }
        Ok(())
    }

    async fn update(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = VirtualNetworkId::parse(d.id())?;

        let _lock = locks::by_name(&id.virtual_network_name, RESOURCE_TYPE).await;

        let existing = clients
            .arm
            .get::<VirtualNetwork>(&id.id(), API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;

        let mut model = expand(d)?;
        model.properties.subnets = existing.properties.subnets;

        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = VirtualNetworkId::parse(d.id())?;

        let _lock = locks::by_name(&id.virtual_network_name, RESOURCE_TYPE).await;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: Value) -> ResourceData {
        let mut base = json!({
            "name": "vnet1",
            "resource_group_name": "rg1",
            "location": "westeurope",
            "address_space": ["10.0.0.0/16"]
        });
        for (k, v) in extra.as_object().cloned().unwrap() {
            base[k] = v;
        }
        ResourceData::new(base.as_object().cloned().unwrap())
    }

    #[test]
    fn test_expand_flatten_roundtrip() {
        let combinations = [
            json!({}),
            json!({"dns_servers": ["10.0.0.4", "10.0.0.5"], "tags": {"env": "prod"}}),
            json!({"bgp_community": "12076:20000", "flow_timeout_in_minutes": 10}),
            json!({
                "ddos_protection_plan": [{
                    "id": "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/ddosProtectionPlans/plan1",
                    "enable": true
                }],
                "encryption": [{"enforcement": "AllowUnencrypted"}]
            }),
        ];

        for extra in combinations {
            let d = config(extra);
            let model = expand(&d).unwrap();
            let wire: VirtualNetwork =
                serde_json::from_value(serde_json::to_value(&model).unwrap()).unwrap();
            let flattened = flatten(&VirtualNetworkId::new("sub", "rg1", "vnet1"), &wire);

            for (key, value) in d.attributes() {
                assert_eq!(&flattened[key], value, "attribute {}", key);
            }
        }
    }

    #[test]
    fn test_optional_objects_are_omitted() {
        let body = serde_json::to_value(expand(&config(json!({}))).unwrap()).unwrap();
        let props = body["properties"].as_object().unwrap();
        assert!(!props.contains_key("bgpCommunities"));
        assert!(!props.contains_key("ddosProtectionPlan"));
        assert!(!props.contains_key("encryption"));
        assert!(!props.contains_key("subnets"));
        assert_eq!(body["properties"]["dhcpOptions"], json!({"dnsServers": []}));
    }

    #[test]
    fn test_schema_rejects_bad_address_space() {
        let attrs = json!({
            "name": "vnet1",
            "resource_group_name": "rg1",
            "location": "westeurope",
            "address_space": ["10.0.0.0"],
            "flow_timeout_in_minutes": 1
        });
        let err = VirtualNetworkResource
            .schema()
            .validate(attrs.as_object().unwrap())
            .unwrap_err();
        assert_eq!(err.len(), 2);
    }
}
