//! `azurerm_bastion_host`
//!
//! Most connectivity features are gated on the SKU. The gating is checked
//! before any request is made so a misconfigured host never reaches ARM.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    ChildResource, Sku, SubResource, TrackedResource, delete_and_wait, ensure_absent,
    expand_location, expand_tags, expand_zones, flatten_location, flatten_tags, flatten_zones,
    get_existing, put_and_wait, remove_from_state, set_all,
};
use crate::azure::ids::{BastionHostId, IdParseError, ResourceIdentifier};
use crate::resource::{
    Clients, Resource, ResourceData, ResourceError, Timeouts, str_field,
};
use crate::schema::{Attribute, Schema};
use crate::validate::{self, ValidationError};

pub const RESOURCE_TYPE: &str = "azurerm_bastion_host";
const API_VERSION: &str = "2023-11-01";

pub const SKU_BASIC: &str = "Basic";
pub const SKU_DEVELOPER: &str = "Developer";
pub const SKU_PREMIUM: &str = "Premium";
pub const SKU_STANDARD: &str = "Standard";

/// Features that need at least the Standard SKU.
const STANDARD_FEATURES: &[&str] = &[
    "file_copy_enabled",
    "ip_connect_enabled",
    "kerberos_enabled",
    "shareable_link_enabled",
    "tunneling_enabled",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BastionHostProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_configurations: Option<Vec<BastionHostIpConfiguration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_network: Option<SubResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_units: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_copy_paste: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_file_copy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_ip_connect: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_kerberos: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_shareable_link: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_tunneling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_session_recording: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BastionHostIpConfigurationProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet: Option<SubResource>,
    #[serde(rename = "publicIPAddress", skip_serializing_if = "Option::is_none")]
    pub public_ip_address: Option<SubResource>,
}

pub type BastionHostIpConfiguration = ChildResource<BastionHostIpConfigurationProperties>;
pub type BastionHost = TrackedResource<BastionHostProperties>;

pub struct BastionHostResource;

/// SKU gating. Pure: inspects configuration only.
pub fn validate_sku_features(d: &ResourceData) -> Result<(), ValidationError> {
    let sku = d.get_str("sku").unwrap_or(SKU_BASIC);
    let mut errors = ValidationError::new();

    if sku == SKU_BASIC || sku == SKU_DEVELOPER {
        for feature in STANDARD_FEATURES {
            if d.get_bool(feature) {
                errors.push(format!(
                    "`{}` is only supported when `sku` is `{}` or `{}`",
                    feature, SKU_STANDARD, SKU_PREMIUM
                ));
            }
        }

        if d.get_i64("scale_units").unwrap_or(2) > 2 {
            errors.push(format!(
                "`scale_units` only can be changed when `sku` is `{}` or `{}`. `scale_units` is always `2` when `sku` is `{}` or `{}`",
                SKU_STANDARD, SKU_PREMIUM, SKU_BASIC, SKU_DEVELOPER
            ));
        }
    }

    if sku != SKU_PREMIUM && d.get_bool("session_recording_enabled") {
        errors.push(format!(
            "`session_recording_enabled` is only supported when `sku` is `{}`",
            SKU_PREMIUM
        ));
    }

    let has_ip_configuration = !d.get_blocks("ip_configuration").is_empty();
    if sku == SKU_DEVELOPER {
        if d.get_str("virtual_network_id").is_none() {
            errors.push(format!(
                "`virtual_network_id` is required when `sku` is `{}`",
                SKU_DEVELOPER
            ));
        }
        if has_ip_configuration {
            errors.push(format!(
                "`ip_configuration` is not supported when `sku` is `{}`",
                SKU_DEVELOPER
            ));
        }
    } else if !has_ip_configuration {
        errors.push(format!(
            "`ip_configuration` is required when `sku` is not `{}`",
            SKU_DEVELOPER
        ));
    }

    errors.into_result()
}

fn expand_ip_configurations(d: &ResourceData) -> Option<Vec<BastionHostIpConfiguration>> {
    let blocks = d.get_blocks("ip_configuration");
    if blocks.is_empty() {
        return None;
    }

    Some(
        blocks
            .into_iter()
            .map(|block| BastionHostIpConfiguration {
                name: str_field(block, "name").map(str::to_string),
                properties: BastionHostIpConfigurationProperties {
                    subnet: str_field(block, "subnet_id").map(SubResource::new),
                    public_ip_address: str_field(block, "public_ip_address_id")
                        .map(SubResource::new),
                },
                ..Default::default()
            })
            .collect(),
    )
}

fn flatten_ip_configurations(configs: Option<&Vec<BastionHostIpConfiguration>>) -> Value {
    let items: Vec<Value> = configs
        .map(|configs| {
            configs
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "name": c.name.clone().unwrap_or_default(),
                        "subnet_id": c.properties.subnet.as_ref().map(|s| s.id.clone()).unwrap_or_default(),
                        "public_ip_address_id": c.properties.public_ip_address.as_ref().map(|s| s.id.clone()).unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Array(items)
}

pub fn expand(d: &ResourceData) -> Result<BastionHost, ResourceError> {
    let sku = d.get_str("sku").unwrap_or(SKU_BASIC).to_string();

    Ok(BastionHost {
        location: Some(expand_location(d)?),
        tags: expand_tags(d),
        zones: expand_zones(d),
        sku: Some(Sku {
            name: Some(sku),
            tier: None,
        }),
        properties: BastionHostProperties {
            ip_configurations: expand_ip_configurations(d),
            virtual_network: d.get_str("virtual_network_id").map(SubResource::new),
            scale_units: Some(d.get_i64("scale_units").unwrap_or(2)),
            disable_copy_paste: Some(!d.get("copy_paste_enabled").and_then(Value::as_bool).unwrap_or(true)),
            enable_file_copy: Some(d.get_bool("file_copy_enabled")),
            enable_ip_connect: Some(d.get_bool("ip_connect_enabled")),
            enable_kerberos: Some(d.get_bool("kerberos_enabled")),
            enable_shareable_link: Some(d.get_bool("shareable_link_enabled")),
            enable_tunneling: Some(d.get_bool("tunneling_enabled")),
            enable_session_recording: Some(d.get_bool("session_recording_enabled")),
            ..Default::default()
        },
        ..Default::default()
    })
}

pub fn flatten(id: &BastionHostId, model: &BastionHost) -> Map<String, Value> {
    let props = &model.properties;
    let sku = model
        .sku
        .as_ref()
        .and_then(|s| s.name.clone())
        .unwrap_or_else(|| SKU_BASIC.to_string());

    let mut attrs = Map::new();
    attrs.insert("name".into(), id.bastion_host_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("location".into(), flatten_location(model.location.as_deref()));
    attrs.insert("sku".into(), sku.into());
    attrs.insert("ip_configuration".into(), flatten_ip_configurations(props.ip_configurations.as_ref()));
    attrs.insert(
        "virtual_network_id".into(),
        props.virtual_network.as_ref().map(|v| Value::from(v.id.clone())).unwrap_or(Value::Null),
    );
    attrs.insert("dns_name".into(), props.dns_name.clone().unwrap_or_default().into());
    attrs.insert("scale_units".into(), props.scale_units.unwrap_or(2).into());
    attrs.insert("copy_paste_enabled".into(), (!props.disable_copy_paste.unwrap_or(false)).into());
    attrs.insert("file_copy_enabled".into(), props.enable_file_copy.unwrap_or(false).into());
    attrs.insert("ip_connect_enabled".into(), props.enable_ip_connect.unwrap_or(false).into());
    attrs.insert("kerberos_enabled".into(), props.enable_kerberos.unwrap_or(false).into());
    attrs.insert("shareable_link_enabled".into(), props.enable_shareable_link.unwrap_or(false).into());
    attrs.insert("tunneling_enabled".into(), props.enable_tunneling.unwrap_or(false).into());
    attrs.insert(
        "session_recording_enabled".into(),
        props.enable_session_recording.unwrap_or(false).into(),
    );
    attrs.insert("zones".into(), flatten_zones(model.zones.as_ref()));
    attrs.insert("tags".into(), flatten_tags(model.tags.as_ref()));
    attrs
}

#[async_trait]
impl Resource for BastionHostResource {
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
                Attribute::string("sku")
                    .optional()
                    .default(SKU_BASIC)
                    .allowed(&[SKU_BASIC, SKU_DEVELOPER, SKU_PREMIUM, SKU_STANDARD]),
            )
            .attribute(
                Attribute::block(
                    "ip_configuration",
                    Schema::new()
                        .attribute(Attribute::string("name").required().force_new())
                        .attribute(
                            Attribute::string("subnet_id")
                                .required()
                                .force_new()
                                .validate_with(validate::arm_resource_id),
                        )
                        .attribute(
                            Attribute::string("public_ip_address_id")
                                .required()
                                .force_new()
                                .validate_with(validate::arm_resource_id),
                        ),
                )
                .optional()
                .force_new()
                .max_items(1),
            )
            .attribute(
                Attribute::string("virtual_network_id")
                    .optional()
                    .force_new()
                    .validate_with(validate::arm_resource_id),
            )
            .attribute(Attribute::bool("copy_paste_enabled").optional().default(true))
            .attribute(Attribute::bool("file_copy_enabled").optional().default(false))
            .attribute(Attribute::bool("ip_connect_enabled").optional().default(false))
            .attribute(Attribute::bool("kerberos_enabled").optional().default(false))
            .attribute(Attribute::bool("shareable_link_enabled").optional().default(false))
            .attribute(Attribute::bool("tunneling_enabled").optional().default(false))
            .attribute(Attribute::bool("session_recording_enabled").optional().default(false))
            .attribute(Attribute::int("scale_units").optional().default(2).between(2, 50))
            .attribute(Attribute::string("dns_name").computed())
            .attribute(Attribute::string_set("zones").optional().force_new())
            .attribute(Attribute::map("tags").optional())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(90, 5, 90, 90)
    }

    fn validate(&self, d: &ResourceData) -> Result<(), ValidationError> {
        validate_sku_features(d)
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        BastionHostId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        self.validate(d)?;

        let id = BastionHostId::new(
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
        let id = BastionHostId::parse(d.id())?;

        let model = get_existing::<BastionHost>(clients, &id.id(), API_VERSION)
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
        let id = BastionHostId::parse(d.id())?;

        let model = expand(d)?;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = BastionHostId::parse(d.id())?;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}
