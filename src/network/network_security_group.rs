use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::network_security_rule::{
    SecurityRule, expand_rule_properties, flatten_rule_properties, rule_schema, validate_rule,
};
use super::{
    TrackedResource, delete_and_wait, ensure_absent, expand_location, expand_tags,
    flatten_location, flatten_tags, get_existing, put_and_wait, remove_from_state, set_all,
};
use crate::azure::ids::{IdParseError, NetworkSecurityGroupId, ResourceIdentifier};
use crate::locks;
use crate::resource::{Clients, Resource, ResourceData, ResourceError, str_field};
use crate::schema::{Attribute, Schema};
use crate::validate::{self, ValidationError};

pub const RESOURCE_TYPE: &str = "azurerm_network_security_group";
pub(crate) const API_VERSION: &str = "2023-11-01";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSecurityGroupProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_rules: Option<Vec<SecurityRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

pub type NetworkSecurityGroup = TrackedResource<NetworkSecurityGroupProperties>;

pub struct NetworkSecurityGroupResource;

/// `None` when the configuration leaves `security_rule` out entirely, so
/// rules managed by `azurerm_network_security_rule` are left alone.
fn expand_security_rules(d: &ResourceData) -> Option<Vec<SecurityRule>> {
    d.get("security_rule")?;

    Some(
        d.get_blocks("security_rule")
            .into_iter()
            .map(|block| SecurityRule {
                name: str_field(block, "name").map(str::to_string),
                properties: expand_rule_properties(block),
                ..Default::default()
            })
            .collect(),
    )
}

fn flatten_security_rules(rules: Option<&Vec<SecurityRule>>) -> Value {
    let items: Vec<Value> = rules
        .map(|rules| {
            rules
                .iter()
                .map(|rule| {
                    let mut attrs = flatten_rule_properties(&rule.properties);
                    attrs.insert("name".into(), rule.name.clone().unwrap_or_default().into());
                    Value::Object(attrs)
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Array(items)
}

pub fn expand(d: &ResourceData) -> Result<NetworkSecurityGroup, ResourceError> {
    Ok(NetworkSecurityGroup {
        location: Some(expand_location(d)?),
        tags: expand_tags(d),
        properties: NetworkSecurityGroupProperties {
            security_rules: expand_security_rules(d),
            ..Default::default()
        },
        ..Default::default()
    })
}

pub fn flatten(id: &NetworkSecurityGroupId, model: &NetworkSecurityGroup) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("name".into(), id.network_security_group_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("location".into(), flatten_location(model.location.as_deref()));
    attrs.insert(
        "security_rule".into(),
        flatten_security_rules(model.properties.security_rules.as_ref()),
    );
    attrs.insert("tags".into(), flatten_tags(model.tags.as_ref()));
    attrs
}

#[async_trait]
impl Resource for NetworkSecurityGroupResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> Schema {
        let mut rule = Schema::new().attribute(
            Attribute::string("name")
                .required()
                .validate_with(validate::network_resource_name),
        );
        for attribute in rule_schema().attributes() {
            rule = rule.attribute(attribute.clone());
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
            .attribute(Attribute::block("security_rule", rule).optional().computed())
            .attribute(Attribute::map("tags").optional())
    }

    fn validate(&self, d: &ResourceData) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        for (i, block) in d.get_blocks("security_rule").into_iter().enumerate() {
            if let Err(e) = validate_rule(block) {
                for message in e.errors {
                    errors.push(format!("security_rule.{}: {}", i, message));
                }
            }
        }
        errors.into_result()
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        NetworkSecurityGroupId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        self.validate(d)?;

        let id = NetworkSecurityGroupId::new(
            clients.subscription_id(),
            d.require_str("resource_group_name")?,
            d.require_str("name")?,
        );

        ensure_absent(clients, RESOURCE_TYPE, &id.id(), &id.describe(), API_VERSION).await?;

        let model = expand(d)?;

        let _lock = locks::by_name(&id.network_security_group_name, RESOURCE_TYPE).await;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "creating", &id.describe()).await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = NetworkSecurityGroupId::parse(d.id())?;

        let model = get_existing::<NetworkSecurityGroup>(clients, &id.id(), API_VERSION)
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
        let id = NetworkSecurityGroupId::parse(d.id())?;

        let _lock = locks::by_name(&id.network_security_group_name, RESOURCE_TYPE).await;

        let mut model = expand(d)?;
        if model.properties.security_rules.is_none() {
            let existing = clients
                .arm
                .get::<NetworkSecurityGroup>(&id.id(), API_VERSION)
                .await
                .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;
            model.properties.security_rules = existing.properties.security_rules;
        }

        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = NetworkSecurityGroupId::parse(d.id())?;

        let _lock = locks::by_name(&id.network_security_group_name, RESOURCE_TYPE).await;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(extra: Value) -> ResourceData {
        let mut base = json!({
            "name": "nsg1",
            "resource_group_name": "rg1",
            "location": "westeurope"
        });
        for (k, v) in extra.as_object().cloned().unwrap() {
            base[k] = v;
        }
        ResourceData::new(base.as_object().cloned().unwrap())
    }

    fn https_rule() -> Value {
        json!({
            "name": "allow-https",
            "protocol": "Tcp",
            "source_port_range": "*",
            "destination_port_range": "443",
            "source_address_prefix": "*",
            "destination_address_prefix": "*",
            "access": "Allow",
            "priority": 100,
            "direction": "Inbound"
        })
    }

    #[test]
    fn test_absent_rules_are_not_sent() {
        let model = expand(&config(json!({}))).unwrap();
        assert!(model.properties.security_rules.is_none());

        let model = expand(&config(json!({"security_rule": []}))).unwrap();
        assert_eq!(model.properties.security_rules, Some(Vec::new()));
    }

    #[test]
    fn test_inline_rules_roundtrip() {
        let d = config(json!({"security_rule": [https_rule()], "tags": {"env": "prod"}}));
        let model = expand(&d).unwrap();
        let wire: NetworkSecurityGroup =
            serde_json::from_value(serde_json::to_value(&model).unwrap()).unwrap();
        let flattened = flatten(&NetworkSecurityGroupId::new("sub", "rg1", "nsg1"), &wire);

        assert_eq!(flattened["tags"], json!({"env": "prod"}));
        let rule = flattened["security_rule"][0].as_object().unwrap();
        for (key, value) in https_rule().as_object().unwrap() {
            assert_eq!(&rule[key], value, "attribute {}", key);
        }
        assert_eq!(rule["source_port_ranges"], json!([]));
    }

    #[test]
    fn test_inline_conflicts_are_prefixed_and_aggregated() {
        let mut bad = https_rule();
        bad["source_port_ranges"] = json!(["80"]);
        bad["destination_address_prefixes"] = json!(["10.0.0.0/8"]);
        let d = config(json!({"security_rule": [https_rule(), bad]}));

        let err = NetworkSecurityGroupResource.validate(&d).unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.errors.iter().all(|e| e.starts_with("security_rule.1: ")));
    }

    #[test]
    fn test_schema_validates_inline_rules() {
        let mut rule = https_rule();
        rule["priority"] = json!(50);
        let attrs = json!({
            "name": "nsg1",
            "resource_group_name": "rg1",
            "location": "westeurope",
            "security_rule": [rule]
        });
        let err = NetworkSecurityGroupResource
            .schema()
            .validate(attrs.as_object().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("expected `security_rule.0.priority` to be in the range (100 - 4096), got 50"));
    }
}
