//! `azurerm_vpn_gateway`: a site-to-site gateway inside a Virtual WAN hub.
//!
//! Hub child resources are provisioned one at a time by ARM, so every
//! mutation holds the hub's named lock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{
    SubResource, TrackedResource, delete_and_wait, ensure_absent, expand_location, expand_tags,
    flatten_location, flatten_string_list, flatten_tags, get_existing, put_and_wait,
    remove_from_state, set_all,
};
use crate::azure::ids::{IdParseError, ResourceIdentifier, VirtualHubId, VpnGatewayId};
use crate::locks;
use crate::resource::{
    Clients, Resource, ResourceData, ResourceError, Timeouts, blocks_field, i64_field,
    string_list_field,
};
use crate::schema::{Attribute, Schema};
use crate::validate;

pub const RESOURCE_TYPE: &str = "azurerm_vpn_gateway";
pub const VIRTUAL_HUB_RESOURCE_TYPE: &str = "azurerm_virtual_hub";
const API_VERSION: &str = "2023-11-01";

const ROUTING_PREFERENCES: &[&str] = &["Microsoft Network", "Internet"];
const INSTANCES: [(&str, &str); 2] = [
    ("instance_0_bgp_peering_address", "Instance0"),
    ("instance_1_bgp_peering_address", "Instance1"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VpnGatewayProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_hub: Option<SubResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bgp_settings: Option<BgpSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpn_gateway_scale_unit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_routing_preference_internet: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_bgp_route_translation_for_nat: Option<bool>,
    /// Connections and NAT rules are separate resources; kept verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_rules: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BgpSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_weight: Option<i64>,
    #[serde(skip_serializing)]
    pub bgp_peering_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bgp_peering_addresses: Option<Vec<BgpPeeringAddress>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BgpPeeringAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipconfiguration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_bgp_ip_addresses: Option<Vec<String>>,
    #[serde(skip_serializing)]
    pub default_bgp_ip_addresses: Option<Vec<String>>,
    #[serde(skip_serializing)]
    pub tunnel_ip_addresses: Option<Vec<String>>,
}

pub type VpnGateway = TrackedResource<VpnGatewayProperties>;

pub struct VpnGatewayResource;

fn expand_bgp_settings(d: &ResourceData) -> Option<BgpSettings> {
    let settings = *d.get_blocks("bgp_settings").first()?;

    let addresses: Vec<BgpPeeringAddress> = INSTANCES
        .iter()
        .filter_map(|(key, instance)| {
            let block = *blocks_field(settings, key).first()?;
            Some(BgpPeeringAddress {
                ipconfiguration_id: Some(instance.to_string()),
                custom_bgp_ip_addresses: Some(string_list_field(block, "custom_ips")),
                ..Default::default()
            })
        })
        .collect();

    Some(BgpSettings {
        asn: i64_field(settings, "asn"),
        peer_weight: i64_field(settings, "peer_weight"),
        bgp_peering_addresses: if addresses.is_empty() { None } else { Some(addresses) },
        ..Default::default()
    })
}

fn flatten_bgp_settings(settings: Option<&BgpSettings>) -> Value {
    let Some(settings) = settings else {
        return json!([]);
    };

    let mut block = Map::new();
    block.insert("asn".into(), settings.asn.unwrap_or_default().into());
    block.insert("peer_weight".into(), settings.peer_weight.unwrap_or_default().into());
    block.insert(
        "bgp_peering_address".into(),
        settings.bgp_peering_address.clone().unwrap_or_default().into(),
    );

    for (key, instance) in INSTANCES {
        let address = settings.bgp_peering_addresses.iter().flatten().find(|a| {
            a.ipconfiguration_id
                .as_deref()
                .is_some_and(|id| id.eq_ignore_ascii_case(instance) || id.ends_with(&format!("/{}", instance)))
        });
        let value = match address {
            Some(a) => json!([{
                "ip_configuration_id": a.ipconfiguration_id.clone().unwrap_or_default(),
                "custom_ips": flatten_string_list(a.custom_bgp_ip_addresses.as_ref()),
                "default_ips": flatten_string_list(a.default_bgp_ip_addresses.as_ref()),
                "tunnel_ips": flatten_string_list(a.tunnel_ip_addresses.as_ref()),
            }]),
            None => json!([]),
        };
        block.insert(key.into(), value);
    }

    Value::Array(vec![Value::Object(block)])
}

pub fn expand(d: &ResourceData) -> Result<VpnGateway, ResourceError> {
    Ok(VpnGateway {
        location: Some(expand_location(d)?),
        tags: expand_tags(d),
        properties: VpnGatewayProperties {
            virtual_hub: d.get_str("virtual_hub_id").map(SubResource::new),
            bgp_settings: expand_bgp_settings(d),
            vpn_gateway_scale_unit: Some(d.get_i64("scale_unit").unwrap_or(1)),
            is_routing_preference_internet: Some(d.get_str("routing_preference") == Some("Internet")),
            enable_bgp_route_translation_for_nat: Some(
                d.get_bool("bgp_route_translation_for_nat_enabled"),
            ),
            ..Default::default()
        },
        ..Default::default()
    })
}

pub fn flatten(id: &VpnGatewayId, model: &VpnGateway) -> Map<String, Value> {
    let props = &model.properties;
    let routing_preference = if props.is_routing_preference_internet.unwrap_or(false) {
        "Internet"
    } else {
        "Microsoft Network"
    };

    let mut attrs = Map::new();
    attrs.insert("name".into(), id.vpn_gateway_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("location".into(), flatten_location(model.location.as_deref()));
    attrs.insert(
        "virtual_hub_id".into(),
        props.virtual_hub.as_ref().map(|h| h.id.clone()).unwrap_or_default().into(),
    );
    attrs.insert("bgp_settings".into(), flatten_bgp_settings(props.bgp_settings.as_ref()));
    attrs.insert("scale_unit".into(), props.vpn_gateway_scale_unit.unwrap_or(1).into());
    attrs.insert("routing_preference".into(), routing_preference.into());
    attrs.insert(
        "bgp_route_translation_for_nat_enabled".into(),
        props.enable_bgp_route_translation_for_nat.unwrap_or(false).into(),
    );
    attrs.insert("tags".into(), flatten_tags(model.tags.as_ref()));
    attrs
}

fn virtual_hub_name(d: &ResourceData) -> Result<String, ResourceError> {
    let hub = VirtualHubId::parse(d.require_str("virtual_hub_id")?)?;
    Ok(hub.virtual_hub_name)
}

#[async_trait]
impl Resource for VpnGatewayResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> Schema {
        let instance = |name: &'static str| {
            Attribute::block(
                name,
                Schema::new()
                    .attribute(
                        Attribute::string_set("custom_ips")
                            .required()
                            .validate_with(validate::ipv4_address),
                    )
                    .attribute(Attribute::string("ip_configuration_id").computed())
                    .attribute(Attribute::string_set("default_ips").computed())
                    .attribute(Attribute::string_set("tunnel_ips").computed()),
            )
            .optional()
            .max_items(1)
        };

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
                Attribute::string("virtual_hub_id")
                    .required()
                    .force_new()
                    .validate_with(validate::arm_resource_id),
            )
            .attribute(
                Attribute::block(
                    "bgp_settings",
                    Schema::new()
                        .attribute(Attribute::int("asn").required().force_new())
                        .attribute(Attribute::int("peer_weight").required().force_new().between(0, 100))
                        .attribute(Attribute::string("bgp_peering_address").computed())
                        .attribute(instance("instance_0_bgp_peering_address"))
                        .attribute(instance("instance_1_bgp_peering_address")),
                )
                .optional()
                .max_items(1),
            )
            .attribute(Attribute::int("scale_unit").optional().default(1).between(1, 100))
            .attribute(
                Attribute::string("routing_preference")
                    .optional()
                    .force_new()
                    .default("Microsoft Network")
                    .allowed(ROUTING_PREFERENCES),
            )
            .attribute(
                Attribute::bool("bgp_route_translation_for_nat_enabled")
                    .optional()
                    .default(false),
            )
            .attribute(Attribute::map("tags").optional())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(90, 5, 90, 90)
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        VpnGatewayId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = VpnGatewayId::new(
            clients.subscription_id(),
            d.require_str("resource_group_name")?,
            d.require_str("name")?,
        );

        let _lock = locks::by_name(&virtual_hub_name(d)?, VIRTUAL_HUB_RESOURCE_TYPE).await;

        ensure_absent(clients, RESOURCE_TYPE, &id.id(), &id.describe(), API_VERSION).await?;

        let model = expand(d)?;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "creating", &id.describe()).await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = VpnGatewayId::parse(d.id())?;

        let model = get_existing::<VpnGateway>(clients, &id.id(), API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;

        match model {
            Some(model) => set_all(d, flatten(&id, &model)),
            None => remove_from_state(d, &id.describe()),
        }
        Ok(())
    }

    async fn update(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = VpnGatewayId::parse(d.id())?;

        let _lock = locks::by_name(&virtual_hub_name(d)?, VIRTUAL_HUB_RESOURCE_TYPE).await;

        let mut model = clients
            .arm
            .get::<VpnGateway>(&id.id(), API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;
        let desired = expand(d)?;

        if d.has_change("scale_unit") {
            model.properties.vpn_gateway_scale_unit = desired.properties.vpn_gateway_scale_unit;
        }
        if d.has_change("bgp_route_translation_for_nat_enabled") {
            model.properties.enable_bgp_route_translation_for_nat =
                desired.properties.enable_bgp_route_translation_for_nat;
        }
        if d.has_change("bgp_settings") {
            model.properties.bgp_settings = desired.properties.bgp_settings;
        }
        if d.has_change("tags") {
            model.tags = desired.tags;
        }
        model.properties.provisioning_state = None;

        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = VpnGatewayId::parse(d.id())?;

        let _lock = locks::by_name(&virtual_hub_name(d)?, VIRTUAL_HUB_RESOURCE_TYPE).await;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUB: &str = "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/virtualHubs/hub1";

    fn config(extra: Value) -> ResourceData {
        let mut base = json!({
            "name": "vpngw1",
            "resource_group_name": "rg1",
            "location": "westeurope",
            "virtual_hub_id": HUB
        });
        for (k, v) in extra.as_object().cloned().unwrap() {
            base[k] = v;
        }
        let mut attrs = base.as_object().cloned().unwrap();
        VpnGatewayResource.schema().apply_defaults(&mut attrs);
        ResourceData::new(attrs)
    }

    #[test]
    fn test_timeouts_are_ninety_minutes() {
        let t = VpnGatewayResource.timeouts();
        assert_eq!(t.create, std::time::Duration::from_secs(90 * 60));
        assert_eq!(t.update, t.create);
        assert_eq!(t.delete, t.create);
    }

    #[test]
    fn test_expand_flatten_roundtrip() {
        let combinations = [
            json!({}),
            json!({"scale_unit": 2, "routing_preference": "Internet", "tags": {"env": "prod"}}),
            json!({"bgp_route_translation_for_nat_enabled": true}),
        ];

        for extra in combinations {
            let d = config(extra);
            let wire: VpnGateway =
                serde_json::from_value(serde_json::to_value(expand(&d).unwrap()).unwrap()).unwrap();
            let flattened = flatten(&VpnGatewayId::new("sub", "rg1", "vpngw1"), &wire);
            for (key, value) in d.attributes() {
                assert_eq!(&flattened[key], value, "attribute {}", key);
            }
        }
    }

    #[test]
    fn test_bgp_instances_roundtrip() {
        let d = config(json!({"bgp_settings": [{
            "asn": 65515,
            "peer_weight": 0,
            "instance_0_bgp_peering_address": [{"custom_ips": ["169.254.21.5"]}]
        }]}));

        let body = serde_json::to_value(expand(&d).unwrap()).unwrap();
        assert_eq!(
            body["properties"]["bgpSettings"]["bgpPeeringAddresses"],
            json!([{"ipconfigurationId": "Instance0", "customBgpIpAddresses": ["169.254.21.5"]}])
        );

        let mut wire: VpnGateway = serde_json::from_value(body).unwrap();
        if let Some(settings) = wire.properties.bgp_settings.as_mut() {
            settings.bgp_peering_addresses.iter_mut().flatten().for_each(|a| {
                a.ipconfiguration_id = Some(format!("{}/ipConfigurations/Instance0", HUB));
                a.tunnel_ip_addresses = Some(vec!["20.1.1.1".to_string()]);
            });
        }
        let flattened = flatten(&VpnGatewayId::new("sub", "rg1", "vpngw1"), &wire);
        let bgp = &flattened["bgp_settings"][0];
        assert_eq!(bgp["asn"], json!(65515));
        assert_eq!(bgp["instance_0_bgp_peering_address"][0]["custom_ips"], json!(["169.254.21.5"]));
        assert_eq!(bgp["instance_0_bgp_peering_address"][0]["tunnel_ips"], json!(["20.1.1.1"]));
        assert_eq!(bgp["instance_1_bgp_peering_address"], json!([]));
    }

    #[tokio::test]
    async fn test_update_locks_the_virtual_hub() {
        let d = config(json!({}));
        let name = virtual_hub_name(&d).unwrap();
        let lock = locks::by_name(&name, VIRTUAL_HUB_RESOURCE_TYPE).await;
        assert_eq!(lock.key(), "azurerm_virtual_hub.hub1");
    }
}
