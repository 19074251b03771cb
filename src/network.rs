//! Azure networking resources.
//!
//! Every resource follows the same lifecycle: validate pre-flight, expand the
//! configuration into an ARM model, PUT it, wait for the long-running
//! operation, then read the object back and flatten it into state.

pub mod application_security_group;
pub mod bastion_host;
pub mod nat_gateway;
pub mod nat_gateway_public_ip_association;
pub mod network_interface_application_security_group_association;
pub mod network_security_group;
pub mod network_security_rule;
pub mod private_endpoint;
pub mod public_ip;
pub mod route;
pub mod route_table;
pub mod subnet;
pub mod subnet_network_security_group_association;
pub mod virtual_network;
pub mod vpn_gateway;
pub mod web_application_firewall_policy;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::azure::{ArmError, normalize_location};
use crate::resource::{Clients, Resource, ResourceData, ResourceError};

/// Every resource type this crate manages.
pub fn resources() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(application_security_group::ApplicationSecurityGroupResource),
        Box::new(bastion_host::BastionHostResource),
        Box::new(nat_gateway::NatGatewayResource),
        Box::new(nat_gateway_public_ip_association::NatGatewayPublicIpAssociationResource),
        Box::new(
            network_interface_application_security_group_association::NetworkInterfaceApplicationSecurityGroupAssociationResource,
        ),
        Box::new(network_security_group::NetworkSecurityGroupResource),
        Box::new(network_security_rule::NetworkSecurityRuleResource),
        Box::new(private_endpoint::PrivateEndpointResource),
        Box::new(public_ip::PublicIpResource),
        Box::new(route::RouteResource),
        Box::new(route_table::RouteTableResource),
        Box::new(subnet::SubnetResource),
        Box::new(subnet_network_security_group_association::SubnetNetworkSecurityGroupAssociationResource),
        Box::new(virtual_network::VirtualNetworkResource),
        Box::new(vpn_gateway::VpnGatewayResource),
        Box::new(web_application_firewall_policy::WebApplicationFirewallPolicyResource),
    ]
}

/// Top-level ARM envelope shared by tracked (regional) resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    default,
    bound(
        serialize = "P: Serialize",
        deserialize = "P: Deserialize<'de> + Default"
    )
)]
pub struct TrackedResource<P> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    pub properties: P,
}

/// ARM envelope for child objects (subnets, security rules, routes, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    default,
    bound(
        serialize = "P: Serialize",
        deserialize = "P: Deserialize<'de> + Default"
    )
)]
pub struct ChildResource<P> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub properties: P,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sku {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

/// A reference to another ARM object by ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubResource {
    pub id: String,
}

impl SubResource {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

pub(crate) fn expand_location(d: &ResourceData) -> Result<String, ResourceError> {
    Ok(normalize_location(d.require_str("location")?))
}

pub(crate) fn flatten_location(location: Option<&str>) -> Value {
    location.map(normalize_location).map(Value::from).unwrap_or(Value::Null)
}

pub(crate) fn expand_tags(d: &ResourceData) -> Option<BTreeMap<String, String>> {
    let tags = d
        .get("tags")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Some(tags)
}

pub(crate) fn flatten_tags(tags: Option<&BTreeMap<String, String>>) -> Value {
    let map: Map<String, Value> = tags
        .map(|t| {
            t.iter()
                .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                .collect()
        })
        .unwrap_or_default();
    Value::Object(map)
}

pub(crate) fn expand_zones(d: &ResourceData) -> Option<Vec<String>> {
    let zones = d.get_string_list("zones");
    if zones.is_empty() { None } else { Some(zones) }
}

pub(crate) fn flatten_zones(zones: Option<&Vec<String>>) -> Value {
    let mut zones = zones.cloned().unwrap_or_default();
    zones.sort();
    Value::from(zones)
}

pub(crate) fn flatten_string_list(values: Option<&Vec<String>>) -> Value {
    Value::from(values.cloned().unwrap_or_default())
}

pub(crate) fn sub_resource_ids(refs: Option<&Vec<SubResource>>) -> Value {
    Value::from(
        refs.map(|r| r.iter().map(|s| s.id.clone()).collect::<Vec<_>>())
            .unwrap_or_default(),
    )
}

pub(crate) fn expand_sub_resources(ids: Vec<String>) -> Option<Vec<SubResource>> {
    if ids.is_empty() {
        None
    } else {
        Some(ids.into_iter().map(SubResource::new).collect())
    }
}

/// Membership test for ID references. ARM IDs compare case-insensitively.
pub(crate) fn contains_id(refs: Option<&Vec<SubResource>>, id: &str) -> bool {
    refs.is_some_and(|refs| refs.iter().any(|r| r.id.eq_ignore_ascii_case(id)))
}

/// Fetches `id`, mapping a 404 to `Ok(None)`.
pub(crate) async fn get_existing<T: DeserializeOwned>(
    clients: &Clients,
    id: &str,
    api_version: &str,
) -> Result<Option<T>, ArmError> {
    match clients.arm.get::<T>(id, api_version).await {
        Ok(model) => Ok(Some(model)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Import collision check run before a create.
pub(crate) async fn ensure_absent(
    clients: &Clients,
    resource_type: &str,
    id: &str,
    description: &str,
    api_version: &str,
) -> Result<(), ResourceError> {
    let existing = get_existing::<Value>(clients, id, api_version)
        .await
        .map_err(|e| {
            ResourceError::arm(format!("checking for presence of existing {}", description), e)
        })?;

    match existing {
        Some(_) => Err(ResourceError::AlreadyExists {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }),
        None => Ok(()),
    }
}

/// Drops the resource from state after it vanished remotely.
pub(crate) fn remove_from_state(d: &mut ResourceData, description: &str) {
    tracing::warn!(id = %d.id(), "{} was not found - removing from state", description);
    d.set_id("");
}

pub(crate) async fn put_and_wait<B: Serialize + ?Sized>(
    clients: &Clients,
    id: &str,
    api_version: &str,
    body: &B,
    action: &str,
    description: &str,
) -> Result<(), ResourceError> {
    tracing::info!(%id, "{} {}", action, description);
    clients
        .arm
        .create_or_update_and_wait(id, api_version, body)
        .await
        .map_err(|e| ResourceError::arm(format!("{} {}", action, description), e))
}

/// Deletes `id`, treating "already gone" as success.
pub(crate) async fn delete_and_wait(
    clients: &Clients,
    id: &str,
    api_version: &str,
    description: &str,
) -> Result<(), ResourceError> {
    tracing::info!(%id, "deleting {}", description);
    match clients.arm.delete_and_wait(id, api_version).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            tracing::debug!(%id, "{} was already gone", description);
            Ok(())
        }
        Err(e) => Err(ResourceError::arm(format!("deleting {}", description), e)),
    }
}

/// Copies flattened attributes into `d`.
pub(crate) fn set_all(d: &mut ResourceData, attrs: Map<String, Value>) {
    for (k, v) in attrs {
        d.set(&k, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_resource_type_is_unique() {
        let mut names: Vec<_> = resources().iter().map(|r| r.type_name()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 16);
    }

    #[test]
    fn test_every_schema_has_defaults_that_validate() {
        for resource in resources() {
            let schema = resource.schema();
            for attribute in schema.attributes() {
                if let Some(default) = &attribute.default {
                    let mut attrs = Map::new();
                    attrs.insert(attribute.name.to_string(), default.clone());
                    let errors = schema.validate(&attrs).err().unwrap_or_default();
                    assert!(
                        !errors.errors.iter().any(|e| e.contains(&format!("`{}`", attribute.name))),
                        "default for {}.{} fails its own validation",
                        resource.type_name(),
                        attribute.name
                    );
                }
            }
        }
    }

    #[test]
    fn test_tags_roundtrip() {
        let d = ResourceData::new(
            json!({"tags": {"env": "prod", "team": "net"}})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let tags = expand_tags(&d);
        assert_eq!(flatten_tags(tags.as_ref()), json!({"env": "prod", "team": "net"}));
    }

    #[test]
    fn test_missing_tags_expand_to_empty_map() {
        let d = ResourceData::new(Map::new());
        assert_eq!(expand_tags(&d), Some(BTreeMap::new()));
        assert_eq!(flatten_tags(None), json!({}));
    }

    #[test]
    fn test_contains_id_ignores_case() {
        let refs = vec![SubResource::new("/subscriptions/s/resourceGroups/RG/providers/Microsoft.Network/publicIPAddresses/PIP")];
        assert!(contains_id(
            Some(&refs),
            "/subscriptions/s/resourcegroups/rg/providers/microsoft.network/publicipaddresses/pip"
        ));
        assert!(!contains_id(Some(&refs), "/subscriptions/s/other"));
        assert!(!contains_id(None, "/subscriptions/s/other"));
    }

    #[test]
    fn test_zones_are_sorted_on_flatten() {
        let zones = vec!["3".to_string(), "1".to_string()];
        assert_eq!(flatten_zones(Some(&zones)), json!(["1", "3"]));
        assert_eq!(flatten_zones(None), json!([]));
    }

    #[test]
    fn test_tracked_resource_tolerates_missing_fields() {
        #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
        struct Props {
            #[serde(default)]
            value: Option<String>,
        }

        let model: TrackedResource<Props> =
            serde_json::from_value(json!({"name": "x", "unknown": 1})).unwrap();
        assert_eq!(model.name.as_deref(), Some("x"));
        assert_eq!(model.properties, Props::default());

        let body = serde_json::to_value(&TrackedResource {
            location: Some("westeurope".to_string()),
            properties: Props::default(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, json!({"location": "westeurope", "properties": {"value": null}}));
    }
}
