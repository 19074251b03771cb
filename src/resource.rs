use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::azure::ids::IdParseError;
use crate::azure::{ArmClient, ArmError, normalize_location};
use crate::schema::Schema;
use crate::validate::{self, ValidationError};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(
        "A resource with the ID {id:?} already exists - to be managed via Terraform this resource needs to be imported into the State. Please see the resource documentation for {resource_type:?} for more information."
    )]
    AlreadyExists { resource_type: String, id: String },

    #[error(transparent)]
    InvalidId(#[from] IdParseError),

    #[error("{context}: {source}")]
    Arm { context: String, source: ArmError },

    #[error("{operation}: timeout after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("missing required attribute `{0}`")]
    MissingAttribute(String),

    #[error("{0}")]
    Remote(String),

    #[error("{0} does not support in-place updates")]
    UpdateNotSupported(String),
}

impl ResourceError {
    pub fn arm(context: impl Into<String>, source: ArmError) -> Self {
        ResourceError::Arm {
            context: context.into(),
            source,
        }
    }
}

/// Per-operation deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn minutes(create: u64, read: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            read: Duration::from_secs(read * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::minutes(30, 5, 30, 30)
    }
}

/// Shared client bundle handed to every resource.
#[derive(Debug, Clone)]
pub struct Clients {
    pub arm: ArmClient,
}

impl Clients {
    pub fn new(arm: ArmClient) -> Self {
        Self { arm }
    }

    pub fn subscription_id(&self) -> &str {
        self.arm.subscription_id()
    }
}

/// The attribute bag for one resource instance during a single operation.
///
/// `prior` holds the last known state when the resource already exists and is
/// used for change detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    id: String,
    attrs: Map<String, Value>,
    prior: Option<Map<String, Value>>,
}

impl ResourceData {
    pub fn new(config: Map<String, Value>) -> Self {
        Self {
            id: String::new(),
            attrs: config,
            prior: None,
        }
    }

    pub fn from_state(id: impl Into<String>, attrs: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            prior: Some(attrs.clone()),
            attrs,
        }
    }

    /// The new configuration checked against the prior state.
    ///
    /// Only computed attributes the configuration leaves out keep their prior
    /// value. Any other argument missing from the configuration is unset.
    /// An optional computed argument that is left out counts as unchanged.
    /// Locations compare in normalised form.
    pub fn for_update(
        id: impl Into<String>,
        mut prior: Map<String, Value>,
        config: Map<String, Value>,
        schema: &Schema,
    ) -> Self {
        let mut attrs = config;
        if let Some(Value::String(location)) = attrs.get_mut("location") {
            *location = normalize_location(location);
        }
        for attribute in schema.attributes().iter().filter(|a| a.computed) {
            if attrs.get(attribute.name).is_some_and(|v| !v.is_null()) {
                continue;
            }
            if attribute.is_read_only() {
                if let Some(value) = prior.get(attribute.name) {
                    attrs.insert(attribute.name.to_string(), value.clone());
                }
            } else {
                prior.remove(attribute.name);
            }
        }
        Self {
            id: id.into(),
            attrs,
            prior: Some(prior),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// An empty ID removes the resource from state.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn is_new_resource(&self) -> bool {
        self.prior.is_none()
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attrs
    }

    pub fn into_attributes(self) -> Map<String, Value> {
        self.attrs
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        str_field(&self.attrs, key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get_str(key).map(str::to_string)
    }

    pub fn require_str(&self, key: &str) -> Result<&str, ResourceError> {
        self.get_str(key)
            .ok_or_else(|| ResourceError::MissingAttribute(key.to_string()))
    }

    pub fn get_bool(&self, key: &str) -> bool {
        bool_field(&self.attrs, key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        i64_field(&self.attrs, key)
    }

    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        string_list_field(&self.attrs, key)
    }

    pub fn get_blocks(&self, key: &str) -> Vec<&Map<String, Value>> {
        blocks_field(&self.attrs, key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    /// Null, `""`, `[]` and `{}` all count as absent.
    pub fn has_change(&self, key: &str) -> bool {
        match &self.prior {
            None => true,
            Some(prior) => {
                let before = prior.get(key).filter(|v| validate::is_present(v));
                let after = self.attrs.get(key).filter(|v| validate::is_present(v));
                before != after
            }
        }
    }

    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.has_change(k))
    }
}

pub fn str_field<'a>(m: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    m.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn bool_field(m: &Map<String, Value>, key: &str) -> bool {
    m.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn i64_field(m: &Map<String, Value>, key: &str) -> Option<i64> {
    m.get(key).and_then(Value::as_i64)
}

pub fn string_list_field(m: &Map<String, Value>, key: &str) -> Vec<String> {
    m.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn blocks_field<'a>(m: &'a Map<String, Value>, key: &str) -> Vec<&'a Map<String, Value>> {
    m.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

/// A managed resource type and its lifecycle.
#[async_trait]
pub trait Resource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Cross-field checks the schema cannot express. Must not touch the network.
    fn validate(&self, _d: &ResourceData) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Rejects import IDs that do not belong to this resource type.
    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError>;

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError>;

    /// Refreshes `d` from ARM. A missing remote object clears the ID instead of failing.
    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError>;

    async fn update(&self, _clients: &Clients, _d: &mut ResourceData) -> Result<(), ResourceError> {
        Err(ResourceError::UpdateNotSupported(self.type_name().to_string()))
    }

    /// Deletes the remote object. Already being gone is success.
    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_getters() {
        let d = ResourceData::new(attrs(json!({
            "name": "vnet1",
            "empty": "",
            "enabled": true,
            "count": 3,
            "list": ["a", "", "b"],
            "blocks": [{"name": "x"}, 5],
            "null": null
        })));
        assert_eq!(d.get_str("name"), Some("vnet1"));
        assert_eq!(d.get_str("empty"), None);
        assert!(d.get_bool("enabled"));
        assert!(!d.get_bool("missing"));
        assert_eq!(d.get_i64("count"), Some(3));
        assert_eq!(d.get_string_list("list"), vec!["a", "b"]);
        assert_eq!(d.get_blocks("blocks").len(), 1);
        assert!(d.get("null").is_none());
    }

    #[test]
    fn test_require_str_reports_missing_attribute() {
        let d = ResourceData::new(Map::new());
        let err = d.require_str("name").unwrap_err();
        assert_eq!(err.to_string(), "missing required attribute `name`");
    }

    #[test]
    fn test_new_resource_has_every_change() {
        let d = ResourceData::new(attrs(json!({"name": "a"})));
        assert!(d.is_new_resource());
        assert!(d.has_change("name"));
    }

    fn update_schema() -> Schema {
        Schema::new()
            .attribute(Attribute::string("name").required().force_new())
            .attribute(Attribute::string_list("dns_servers").optional())
            .attribute(Attribute::map("tags").optional())
            .attribute(Attribute::string_set("zones").optional().force_new())
            .attribute(Attribute::block("rule", Schema::new()).optional().computed())
            .attribute(Attribute::string("guid").computed())
    }

    #[test]
    fn test_has_change_against_prior_state() {
        let prior = attrs(json!({"name": "a", "tags": {"env": "dev"}, "dns_servers": []}));
        let config = attrs(json!({"name": "a", "tags": {"env": "prod"}, "dns_servers": null}));
        let d = ResourceData::for_update("/id", prior, config, &update_schema());

        assert!(!d.is_new_resource());
        assert!(d.has_change("tags"));
        assert!(!d.has_change("name"));
        assert!(!d.has_change("dns_servers"));
        assert!(d.has_changes(&["name", "tags"]));
    }

    #[test]
    fn test_removed_argument_is_unset() {
        let prior = attrs(json!({"name": "a", "tags": {"env": "old"}, "zones": ["1"]}));
        let config = attrs(json!({"name": "a"}));
        let d = ResourceData::for_update("/id", prior, config, &update_schema());

        assert!(d.has_change("tags"));
        assert!(d.get("tags").is_none());
        assert!(d.has_change("zones"));
    }

    #[test]
    fn test_update_keeps_only_computed_prior_values() {
        let prior = attrs(json!({
            "name": "a",
            "guid": "1234",
            "rule": [{"name": "r1"}]
        }));
        let config = attrs(json!({"name": "a"}));
        let d = ResourceData::for_update("/id", prior, config, &update_schema());

        assert_eq!(d.get_str("guid"), Some("1234"));
        assert!(d.get_blocks("rule").is_empty());
        assert!(!d.has_change("rule"));
        assert!(!d.has_change("guid"));
    }

    #[test]
    fn test_location_spelling_is_not_a_change() {
        let schema = Schema::new().attribute(Attribute::string("location").required().force_new());
        let prior = attrs(json!({"location": "westeurope"}));
        let config = attrs(json!({"location": "West Europe"}));
        let d = ResourceData::for_update("/id", prior, config, &schema);

        assert!(!d.has_change("location"));
    }

    #[test]
    fn test_clearing_id() {
        let mut d = ResourceData::from_state("/some/id", Map::new());
        d.set_id("");
        assert_eq!(d.id(), "");
    }

    #[test]
    fn test_default_timeouts() {
        let t = Timeouts::default();
        assert_eq!(t.create, Duration::from_secs(30 * 60));
        assert_eq!(t.read, Duration::from_secs(5 * 60));
    }

    #[test]
    fn test_already_exists_message_points_to_import() {
        let err = ResourceError::AlreadyExists {
            resource_type: "azurerm_bastion_host".to_string(),
            id: "/subscriptions/s".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("needs to be imported into the State"));
        assert!(msg.contains("\"azurerm_bastion_host\""));
    }

    #[test]
    fn test_arm_error_keeps_context() {
        let err = ResourceError::arm(
            "creating Bastion Host",
            ArmError::Api {
                status: 400,
                code: "BadRequest".to_string(),
                message: "nope".to_string(),
            },
        );
        assert_eq!(err.to_string(), "creating Bastion Host: API error (400) BadRequest: nope");
    }
}
