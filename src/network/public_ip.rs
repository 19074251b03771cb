use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    Sku, SubResource, TrackedResource, delete_and_wait, ensure_absent, expand_location,
    expand_tags, expand_zones, flatten_location, flatten_tags, flatten_zones, get_existing,
    put_and_wait, remove_from_state, set_all,
};
use crate::azure::ids::{IdParseError, PublicIpAddressId, ResourceIdentifier};
use crate::resource::{Clients, Resource, ResourceData, ResourceError};
use crate::schema::{Attribute, Schema};
use crate::validate::{self, ValidationError};

pub const RESOURCE_TYPE: &str = "azurerm_public_ip";
const API_VERSION: &str = "2023-11-01";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicIpAddressProperties {
    #[serde(rename = "publicIPAllocationMethod", skip_serializing_if = "Option::is_none")]
    pub public_ip_allocation_method: Option<String>,
    #[serde(rename = "publicIPAddressVersion", skip_serializing_if = "Option::is_none")]
    pub public_ip_address_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_in_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_settings: Option<DnsSettings>,
    #[serde(rename = "publicIPPrefix", skip_serializing_if = "Option::is_none")]
    pub public_ip_prefix: Option<SubResource>,
    #[serde(skip_serializing)]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_name_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_fqdn: Option<String>,
    #[serde(skip_serializing)]
    pub fqdn: Option<String>,
}

pub type PublicIpAddress = TrackedResource<PublicIpAddressProperties>;

pub struct PublicIpResource;

/// Standard public IPs only support static allocation; the Global tier only
/// exists for the Standard SKU.
pub fn validate_sku(d: &ResourceData) -> Result<(), ValidationError> {
    let sku = d.get_str("sku").unwrap_or("Standard");
    let mut errors = ValidationError::new();

    if sku == "Standard" && d.get_str("allocation_method") != Some("Static") {
        errors.push("Static IP allocation must be used when creating Standard SKU public IP addresses.");
    }
    if sku != "Standard" && d.get_str("sku_tier") == Some("Global") {
        errors.push("`sku_tier` can only be `Global` when `sku` is `Standard`");
    }

    errors.into_result()
}

pub fn expand(d: &ResourceData) -> Result<PublicIpAddress, ResourceError> {
    let domain_name_label = d.get_string("domain_name_label");
    let reverse_fqdn = d.get_string("reverse_fqdn");
    let dns_settings = if domain_name_label.is_some() || reverse_fqdn.is_some() {
        Some(DnsSettings {
            domain_name_label,
            reverse_fqdn,
            fqdn: None,
        })
    } else {
        None
    };

    Ok(PublicIpAddress {
        location: Some(expand_location(d)?),
        tags: expand_tags(d),
        zones: expand_zones(d),
        sku: Some(Sku {
            name: Some(d.get_str("sku").unwrap_or("Standard").to_string()),
            tier: Some(d.get_str("sku_tier").unwrap_or("Regional").to_string()),
        }),
        properties: PublicIpAddressProperties {
            public_ip_allocation_method: d.get_string("allocation_method"),
            public_ip_address_version: Some(d.get_str("ip_version").unwrap_or("IPv4").to_string()),
            idle_timeout_in_minutes: Some(d.get_i64("idle_timeout_in_minutes").unwrap_or(4)),
            dns_settings,
            public_ip_prefix: d.get_str("public_ip_prefix_id").map(SubResource::new),
            ..Default::default()
        },
        ..Default::default()
    })
}

pub fn flatten(id: &PublicIpAddressId, model: &PublicIpAddress) -> Map<String, Value> {
    let props = &model.properties;
    let dns = props.dns_settings.clone().unwrap_or_default();
    let sku = model.sku.clone().unwrap_or_default();
    let optional = |v: Option<String>| v.map(Value::from).unwrap_or(Value::Null);

    let mut attrs = Map::new();
    attrs.insert("name".into(), id.public_ip_address_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("location".into(), flatten_location(model.location.as_deref()));
    attrs.insert("allocation_method".into(), optional(props.public_ip_allocation_method.clone()));
    attrs.insert("sku".into(), sku.name.unwrap_or_else(|| "Standard".to_string()).into());
    attrs.insert("sku_tier".into(), sku.tier.unwrap_or_else(|| "Regional".to_string()).into());
    attrs.insert(
        "ip_version".into(),
        props.public_ip_address_version.clone().unwrap_or_else(|| "IPv4".to_string()).into(),
    );
    attrs.insert(
        "idle_timeout_in_minutes".into(),
        props.idle_timeout_in_minutes.unwrap_or(4).into(),
    );
    attrs.insert("domain_name_label".into(), optional(dns.domain_name_label));
    attrs.insert("reverse_fqdn".into(), optional(dns.reverse_fqdn));
    attrs.insert("fqdn".into(), dns.fqdn.unwrap_or_default().into());
    attrs.insert(
        "public_ip_prefix_id".into(),
        optional(props.public_ip_prefix.as_ref().map(|p| p.id.clone())),
    );
    attrs.insert("ip_address".into(), props.ip_address.clone().unwrap_or_default().into());
    attrs.insert("zones".into(), flatten_zones(model.zones.as_ref()));
    attrs.insert("tags".into(), flatten_tags(model.tags.as_ref()));
    attrs
}

#[async_trait]
impl Resource for PublicIpResource {
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
                Attribute::string("allocation_method")
                    .required()
                    .allowed(&["Static", "Dynamic"]),
            )
            .attribute(
                Attribute::string("sku")
                    .optional()
                    .force_new()
                    .default("Standard")
                    .allowed(&["Basic", "Standard"]),
            )
            .attribute(
                Attribute::string("sku_tier")
                    .optional()
                    .force_new()
                    .default("Regional")
                    .allowed(&["Global", "Regional"]),
            )
            .attribute(
                Attribute::string("ip_version")
                    .optional()
                    .force_new()
                    .default("IPv4")
                    .allowed(&["IPv4", "IPv6"]),
            )
            .attribute(
                Attribute::int("idle_timeout_in_minutes")
                    .optional()
                    .default(4)
                    .between(4, 30),
            )
            .attribute(Attribute::string("domain_name_label").optional())
            .attribute(Attribute::string("reverse_fqdn").optional())
            .attribute(
                Attribute::string("public_ip_prefix_id")
                    .optional()
                    .force_new()
                    .validate_with(validate::arm_resource_id),
            )
            .attribute(Attribute::string_set("zones").optional().force_new())
            .attribute(Attribute::string("fqdn").computed())
            .attribute(Attribute::string("ip_address").computed())
            .attribute(Attribute::map("tags").optional())
    }

    fn validate(&self, d: &ResourceData) -> Result<(), ValidationError> {
        validate_sku(d)
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        PublicIpAddressId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        self.validate(d)?;

        let id = PublicIpAddressId::new(
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
        let id = PublicIpAddressId::parse(d.id())?;

        let model = get_existing::<PublicIpAddress>(clients, &id.id(), API_VERSION)
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
        let id = PublicIpAddressId::parse(d.id())?;

        let model = expand(d)?;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = PublicIpAddressId::parse(d.id())?;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(extra: Value) -> ResourceData {
        let mut base = json!({
            "name": "pip1",
            "resource_group_name": "rg1",
            "location": "westeurope",
            "allocation_method": "Static"
        });
        for (k, v) in extra.as_object().cloned().unwrap() {
            base[k] = v;
        }
        let mut attrs = base.as_object().cloned().unwrap();
        PublicIpResource.schema().apply_defaults(&mut attrs);
        ResourceData::new(attrs)
    }

    #[test]
    fn test_standard_requires_static() {
        assert!(validate_sku(&config(json!({}))).is_ok());

        let err = validate_sku(&config(json!({"allocation_method": "Dynamic"}))).unwrap_err();
        assert!(err.to_string().contains("Static IP allocation must be used"));

        assert!(validate_sku(&config(json!({"sku": "Basic", "allocation_method": "Dynamic"}))).is_ok());
    }

    #[test]
    fn test_global_tier_requires_standard() {
        let err = validate_sku(&config(json!({"sku": "Basic", "sku_tier": "Global"}))).unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn test_expand_flatten_roundtrip() {
        let combinations = [
            json!({}),
            json!({"domain_name_label": "myapp", "idle_timeout_in_minutes": 15, "zones": ["3", "1", "2"]}),
            json!({"sku": "Basic", "allocation_method": "Dynamic", "ip_version": "IPv6", "tags": {"a": "b"}}),
        ];

        for extra in combinations {
            let d = config(extra);
            let wire: PublicIpAddress =
                serde_json::from_value(serde_json::to_value(expand(&d).unwrap()).unwrap()).unwrap();
            let flattened = flatten(&PublicIpAddressId::new("sub", "rg1", "pip1"), &wire);

            for (key, value) in d.attributes() {
                if key == "zones" {
                    assert_eq!(flattened[key], json!(["1", "2", "3"]));
                    continue;
                }
                assert_eq!(&flattened[key], value, "attribute {}", key);
            }
        }
    }

    #[test]
    fn test_wire_names() {
        let body = serde_json::to_value(expand(&config(json!({}))).unwrap()).unwrap();
        assert_eq!(body["properties"]["publicIPAllocationMethod"], json!("Static"));
        assert_eq!(body["properties"]["publicIPAddressVersion"], json!("IPv4"));
        assert_eq!(body["sku"], json!({"name": "Standard", "tier": "Regional"}));
        assert!(body["properties"].get("ipAddress").is_none());
    }
}
