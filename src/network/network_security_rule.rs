//! `azurerm_network_security_rule`, plus the rule model shared with the
//! inline `security_rule` blocks of `azurerm_network_security_group`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    ChildResource, SubResource, delete_and_wait, ensure_absent, expand_sub_resources, get_existing,
    network_security_group, put_and_wait, remove_from_state, set_all, sub_resource_ids,
};
use crate::azure::ids::{IdParseError, ResourceIdentifier, SecurityRuleId};
use crate::locks;
use crate::resource::{
    Clients, Resource, ResourceData, ResourceError, i64_field, str_field, string_list_field,
};
use crate::schema::{Attribute, Schema};
use crate::validate::{self, ValidationError};

pub const RESOURCE_TYPE: &str = "azurerm_network_security_rule";
const API_VERSION: &str = "2023-11-01";

pub const PROTOCOLS: &[&str] = &["Tcp", "Udp", "Icmp", "Esp", "Ah", "*"];
pub const ACCESS: &[&str] = &["Allow", "Deny"];
pub const DIRECTIONS: &[&str] = &["Inbound", "Outbound"];

/// Attribute pairs where at most one side may be set.
pub const EXCLUSIVE_PAIRS: &[(&str, &str)] = &[
    ("source_port_range", "source_port_ranges"),
    ("destination_port_range", "destination_port_ranges"),
    ("source_address_prefix", "source_address_prefixes"),
    ("destination_address_prefix", "destination_address_prefixes"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityRuleProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_port_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_port_ranges: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_port_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_port_ranges: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_address_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_address_prefixes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_application_security_groups: Option<Vec<SubResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_address_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_address_prefixes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_application_security_groups: Option<Vec<SubResource>>,
    pub access: String,
    pub priority: i64,
    pub direction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

pub type SecurityRule = ChildResource<SecurityRuleProperties>;

pub struct NetworkSecurityRuleResource;

/// Rule arguments, shared between the standalone resource and inline blocks.
pub(crate) fn rule_schema() -> Schema {
    Schema::new()
        .attribute(Attribute::string("description").optional())
        .attribute(Attribute::string("protocol").required().allowed(PROTOCOLS))
        .attribute(
            Attribute::string("source_port_range")
                .optional()
                .validate_with(validate::port_or_range),
        )
        .attribute(
            Attribute::string_set("source_port_ranges")
                .optional()
                .validate_with(validate::port_or_range),
        )
        .attribute(
            Attribute::string("destination_port_range")
                .optional()
                .validate_with(validate::port_or_range),
        )
        .attribute(
            Attribute::string_set("destination_port_ranges")
                .optional()
                .validate_with(validate::port_or_range),
        )
        .attribute(Attribute::string("source_address_prefix").optional())
        .attribute(Attribute::string_set("source_address_prefixes").optional())
        .attribute(
            Attribute::string_set("source_application_security_group_ids")
                .optional()
                .max_items(10)
                .validate_with(validate::arm_resource_id),
        )
        .attribute(Attribute::string("destination_address_prefix").optional())
        .attribute(Attribute::string_set("destination_address_prefixes").optional())
        .attribute(
            Attribute::string_set("destination_application_security_group_ids")
                .optional()
                .max_items(10)
                .validate_with(validate::arm_resource_id),
        )
        .attribute(Attribute::string("access").required().allowed(ACCESS))
        .attribute(Attribute::int("priority").required().between(100, 4096))
        .attribute(Attribute::string("direction").required().allowed(DIRECTIONS))
}

/// Every mutually exclusive pair set at once, aggregated.
pub fn validate_rule(rule: &Map<String, Value>) -> Result<(), ValidationError> {
    validate::conflicting_pairs(rule, EXCLUSIVE_PAIRS).into_result()
}

fn non_empty_list(list: Vec<String>) -> Option<Vec<String>> {
    if list.is_empty() { None } else { Some(list) }
}

pub(crate) fn expand_rule_properties(rule: &Map<String, Value>) -> SecurityRuleProperties {
    let string = |key: &str| str_field(rule, key).map(str::to_string);
    let list = |key: &str| non_empty_list(string_list_field(rule, key));

    SecurityRuleProperties {
        description: string("description"),
        protocol: string("protocol").unwrap_or_default(),
        source_port_range: string("source_port_range"),
        source_port_ranges: list("source_port_ranges"),
        destination_port_range: string("destination_port_range"),
        destination_port_ranges: list("destination_port_ranges"),
        source_address_prefix: string("source_address_prefix"),
        source_address_prefixes: list("source_address_prefixes"),
        source_application_security_groups: expand_sub_resources(string_list_field(
            rule,
            "source_application_security_group_ids",
        )),
        destination_address_prefix: string("destination_address_prefix"),
        destination_address_prefixes: list("destination_address_prefixes"),
        destination_application_security_groups: expand_sub_resources(string_list_field(
            rule,
            "destination_application_security_group_ids",
        )),
        access: string("access").unwrap_or_default(),
        priority: i64_field(rule, "priority").unwrap_or_default(),
        direction: string("direction").unwrap_or_default(),
        provisioning_state: None,
    }
}

pub(crate) fn flatten_rule_properties(props: &SecurityRuleProperties) -> Map<String, Value> {
    let string = |v: &Option<String>| Value::from(v.clone().unwrap_or_default());
    let list = |v: &Option<Vec<String>>| Value::from(v.clone().unwrap_or_default());

    let mut attrs = Map::new();
    attrs.insert("description".into(), string(&props.description));
    attrs.insert("protocol".into(), props.protocol.clone().into());
    attrs.insert("source_port_range".into(), string(&props.source_port_range));
    attrs.insert("source_port_ranges".into(), list(&props.source_port_ranges));
    attrs.insert("destination_port_range".into(), string(&props.destination_port_range));
    attrs.insert("destination_port_ranges".into(), list(&props.destination_port_ranges));
    attrs.insert("source_address_prefix".into(), string(&props.source_address_prefix));
    attrs.insert("source_address_prefixes".into(), list(&props.source_address_prefixes));
    attrs.insert(
        "source_application_security_group_ids".into(),
        sub_resource_ids(props.source_application_security_groups.as_ref()),
    );
    attrs.insert("destination_address_prefix".into(), string(&props.destination_address_prefix));
    attrs.insert(
        "destination_address_prefixes".into(),
        list(&props.destination_address_prefixes),
    );
    attrs.insert(
        "destination_application_security_group_ids".into(),
        sub_resource_ids(props.destination_application_security_groups.as_ref()),
    );
    attrs.insert("access".into(), props.access.clone().into());
    attrs.insert("priority".into(), props.priority.into());
    attrs.insert("direction".into(), props.direction.clone().into());
    attrs
}

fn flatten(id: &SecurityRuleId, model: &SecurityRule) -> Map<String, Value> {
    let mut attrs = flatten_rule_properties(&model.properties);
    attrs.insert("name".into(), id.security_rule_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert(
        "network_security_group_name".into(),
        id.network_security_group_name.clone().into(),
    );
    attrs
}

#[async_trait]
impl Resource for NetworkSecurityRuleResource {
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
                Attribute::string("network_security_group_name")
                    .required()
                    .force_new()
                    .validate_with(validate::network_resource_name),
            );
        for attribute in rule_schema().attributes() {
            schema = schema.attribute(attribute.clone());
        }
        schema
    }

    fn validate(&self, d: &ResourceData) -> Result<(), ValidationError> {
        validate_rule(d.attributes())
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        SecurityRuleId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        self.validate(d)?;

        let id = SecurityRuleId::new(
            clients.subscription_id(),
            d.require_str("resource_group_name")?,
            d.require_str("network_security_group_name")?,
            d.require_str("name")?,
        );

        let _lock =
            locks::by_name(&id.network_security_group_name, network_security_group::RESOURCE_TYPE)
                .await;

        ensure_absent(clients, RESOURCE_TYPE, &id.id(), &id.describe(), API_VERSION).await?;

        let model = SecurityRule {
            name: Some(id.security_rule_name.clone()),
            properties: expand_rule_properties(d.attributes()),
            ..Default::default()
        };
        put_and_wait(clients, &id.id(), API_VERSION, &model, "creating", &id.describe()).await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = SecurityRuleId::parse(d.id())?;

        let model = get_existing::<SecurityRule>(clients, &id.id(), API_VERSION)
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
        let id = SecurityRuleId::parse(d.id())?;

        let _lock =
            locks::by_name(&id.network_security_group_name, network_security_group::RESOURCE_TYPE)
                .await;

        let model = SecurityRule {
            name: Some(id.security_rule_name.clone()),
            properties: expand_rule_properties(d.attributes()),
            ..Default::default()
        };
        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = SecurityRuleId::parse(d.id())?;

        let _lock =
            locks::by_name(&id.network_security_group_name, network_security_group::RESOURCE_TYPE)
                .await;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}
