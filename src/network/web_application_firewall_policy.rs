use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{
    SubResource, TrackedResource, delete_and_wait, ensure_absent, expand_location, expand_tags,
    flatten_location, flatten_string_list, flatten_tags, get_existing, put_and_wait,
    remove_from_state, set_all, sub_resource_ids,
};
use crate::azure::ids::{IdParseError, ResourceIdentifier, WebApplicationFirewallPolicyId};
use crate::resource::{
    Clients, Resource, ResourceData, ResourceError, blocks_field, bool_field, i64_field, str_field,
    string_list_field,
};
use crate::schema::{Attribute, Schema};
use crate::validate::{self, ValidationError};

pub const RESOURCE_TYPE: &str = "azurerm_web_application_firewall_policy";
const API_VERSION: &str = "2023-11-01";

const RATE_LIMIT_RULE: &str = "RateLimitRule";
const RULE_TYPES: &[&str] = &["MatchRule", RATE_LIMIT_RULE, "Invalid"];
const RATE_LIMIT_DURATIONS: &[&str] = &["OneMin", "FiveMins"];
const ACTIONS: &[&str] = &["Allow", "Block", "Log", "JSChallenge"];
const MATCH_VARIABLES: &[&str] = &[
    "RemoteAddr",
    "RequestMethod",
    "QueryString",
    "PostArgs",
    "RequestUri",
    "RequestHeaders",
    "RequestBody",
    "RequestCookies",
];
const OPERATORS: &[&str] = &[
    "Any",
    "IPMatch",
    "GeoMatch",
    "Equal",
    "Contains",
    "LessThan",
    "GreaterThan",
    "LessThanOrEqual",
    "GreaterThanOrEqual",
    "BeginsWith",
    "EndsWith",
    "Regex",
];
const TRANSFORMS: &[&str] = &[
    "HtmlEntityDecode",
    "Lowercase",
    "RemoveNulls",
    "Trim",
    "Uppercase",
    "UrlDecode",
    "UrlEncode",
];
const MODES: &[&str] = &["Prevention", "Detection"];
const EXCLUSION_VARIABLES: &[&str] = &[
    "RequestArgKeys",
    "RequestArgNames",
    "RequestArgValues",
    "RequestCookieKeys",
    "RequestCookieNames",
    "RequestCookieValues",
    "RequestHeaderKeys",
    "RequestHeaderNames",
    "RequestHeaderValues",
];
const SELECTOR_OPERATORS: &[&str] = &["Contains", "EndsWith", "Equals", "EqualsAny", "StartsWith"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebApplicationFirewallPolicyProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_rules: Option<Vec<CustomRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_settings: Option<PolicySettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed_rules: Option<ManagedRules>,
    #[serde(skip_serializing)]
    pub http_listeners: Option<Vec<SubResource>>,
    #[serde(skip_serializing)]
    pub path_based_rules: Option<Vec<SubResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub priority: i64,
    pub rule_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_threshold: Option<i64>,
    pub match_conditions: Vec<MatchCondition>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchCondition {
    pub match_variables: Vec<MatchVariable>,
    pub operator: String,
    /// The ARM property name carries this spelling.
    #[serde(rename = "negationConditon", skip_serializing_if = "Option::is_none")]
    pub negation_condition: Option<bool>,
    pub match_values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transforms: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchVariable {
    pub variable_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicySettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body_check: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_upload_limit_in_mb: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_request_body_size_in_kb: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagedRules {
    pub managed_rule_sets: Vec<ManagedRuleSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusions: Option<Vec<Exclusion>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagedRuleSet {
    pub rule_set_type: String,
    pub rule_set_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_group_overrides: Option<Vec<RuleGroupOverride>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleGroupOverride {
    pub rule_group_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<ManagedRuleOverride>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagedRuleOverride {
    pub rule_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Exclusion {
    pub match_variable: String,
    pub selector_match_operator: String,
    pub selector: String,
}

pub type WebApplicationFirewallPolicy = TrackedResource<WebApplicationFirewallPolicyProperties>;

pub struct WebApplicationFirewallPolicyResource;

fn enabled_state(enabled: bool) -> String {
    if enabled { "Enabled" } else { "Disabled" }.to_string()
}

fn is_enabled(state: Option<&str>, default: bool) -> bool {
    state.map_or(default, |s| s.eq_ignore_ascii_case("Enabled"))
}

fn bool_or(m: &Map<String, Value>, key: &str, default: bool) -> bool {
    m.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Rate limit settings belong to, and are required by, rate limit rules.
pub fn validate_custom_rules(d: &ResourceData) -> Result<(), ValidationError> {
    let mut errors = ValidationError::new();

    for (i, rule) in d.get_blocks("custom_rules").into_iter().enumerate() {
        let rate_limited = str_field(rule, "rule_type") == Some(RATE_LIMIT_RULE);
        for key in ["rate_limit_duration", "rate_limit_threshold"] {
            match (rate_limited, validate::is_set(rule, key)) {
                (true, false) => errors.push(format!(
                    "custom_rules.{}: `{}` is required when `rule_type` is `{}`",
                    i, key, RATE_LIMIT_RULE
                )),
                (false, true) => errors.push(format!(
                    "custom_rules.{}: `{}` can only be set when `rule_type` is `{}`",
                    i, key, RATE_LIMIT_RULE
                )),
                _ => {}
            }
        }
    }

    errors.into_result()
}

fn expand_custom_rules(d: &ResourceData) -> Vec<CustomRule> {
    d.get_blocks("custom_rules")
        .into_iter()
        .map(|rule| CustomRule {
            name: str_field(rule, "name").map(str::to_string),
            priority: i64_field(rule, "priority").unwrap_or_default(),
            rule_type: str_field(rule, "rule_type").unwrap_or_default().to_string(),
            rate_limit_duration: str_field(rule, "rate_limit_duration").map(str::to_string),
            rate_limit_threshold: i64_field(rule, "rate_limit_threshold"),
            match_conditions: blocks_field(rule, "match_conditions")
                .into_iter()
                .map(expand_match_condition)
                .collect(),
            action: str_field(rule, "action").unwrap_or_default().to_string(),
            state: Some(enabled_state(bool_or(rule, "enabled", true))),
        })
        .collect()
}

fn expand_match_condition(condition: &Map<String, Value>) -> MatchCondition {
    let transforms = string_list_field(condition, "transforms");
    MatchCondition {
        match_variables: blocks_field(condition, "match_variables")
            .into_iter()
            .map(|v| MatchVariable {
                variable_name: str_field(v, "variable_name").unwrap_or_default().to_string(),
                selector: str_field(v, "selector").map(str::to_string),
            })
            .collect(),
        operator: str_field(condition, "operator").unwrap_or_default().to_string(),
        negation_condition: Some(bool_field(condition, "negation_condition")),
        match_values: string_list_field(condition, "match_values"),
        transforms: if transforms.is_empty() { None } else { Some(transforms) },
    }
}

fn expand_policy_settings(d: &ResourceData) -> PolicySettings {
    let empty = Map::new();
    let settings = d.get_blocks("policy_settings").first().copied().unwrap_or(&empty);

    PolicySettings {
        state: Some(enabled_state(bool_or(settings, "enabled", true))),
        mode: Some(str_field(settings, "mode").unwrap_or("Prevention").to_string()),
        request_body_check: Some(bool_or(settings, "request_body_check", true)),
        file_upload_limit_in_mb: Some(i64_field(settings, "file_upload_limit_in_mb").unwrap_or(100)),
        max_request_body_size_in_kb: Some(
            i64_field(settings, "max_request_body_size_in_kb").unwrap_or(128),
        ),
    }
}

fn expand_managed_rules(d: &ResourceData) -> ManagedRules {
    let empty = Map::new();
    let managed = d.get_blocks("managed_rules").first().copied().unwrap_or(&empty);

    let exclusions: Vec<Exclusion> = blocks_field(managed, "exclusion")
        .into_iter()
        .map(|e| Exclusion {
            match_variable: str_field(e, "match_variable").unwrap_or_default().to_string(),
            selector_match_operator: str_field(e, "selector_match_operator")
                .unwrap_or_default()
                .to_string(),
            selector: str_field(e, "selector").unwrap_or_default().to_string(),
        })
        .collect();

    let managed_rule_sets = blocks_field(managed, "managed_rule_set")
        .into_iter()
        .map(|set| {
            let overrides: Vec<RuleGroupOverride> = blocks_field(set, "rule_group_override")
                .into_iter()
                .map(|group| {
                    let rules: Vec<ManagedRuleOverride> = blocks_field(group, "rule")
                        .into_iter()
                        .map(|rule| ManagedRuleOverride {
                            rule_id: str_field(rule, "id").unwrap_or_default().to_string(),
                            state: Some(enabled_state(bool_field(rule, "enabled"))),
                            action: str_field(rule, "action").map(str::to_string),
                        })
                        .collect();
                    RuleGroupOverride {
                        rule_group_name: str_field(group, "rule_group_name")
                            .unwrap_or_default()
                            .to_string(),
                        rules: if rules.is_empty() { None } else { Some(rules) },
                    }
                })
                .collect();

            ManagedRuleSet {
                rule_set_type: str_field(set, "type").unwrap_or("OWASP").to_string(),
                rule_set_version: str_field(set, "version").unwrap_or_default().to_string(),
                rule_group_overrides: if overrides.is_empty() { None } else { Some(overrides) },
            }
        })
        .collect();

    ManagedRules {
        managed_rule_sets,
        exclusions: if exclusions.is_empty() { None } else { Some(exclusions) },
    }
}

pub fn expand(d: &ResourceData) -> Result<WebApplicationFirewallPolicy, ResourceError> {
    Ok(WebApplicationFirewallPolicy {
        location: Some(expand_location(d)?),
        tags: expand_tags(d),
        properties: WebApplicationFirewallPolicyProperties {
            custom_rules: Some(expand_custom_rules(d)),
            policy_settings: Some(expand_policy_settings(d)),
            managed_rules: Some(expand_managed_rules(d)),
            ..Default::default()
        },
        ..Default::default()
    })
}

fn flatten_custom_rules(rules: Option<&Vec<CustomRule>>) -> Value {
    let items: Vec<Value> = rules
        .into_iter()
        .flatten()
        .map(|rule| {
            let conditions: Vec<Value> = rule
                .match_conditions
                .iter()
                .map(|c| {
                    let variables: Vec<Value> = c
                        .match_variables
                        .iter()
                        .map(|v| {
                            json!({
                                "variable_name": v.variable_name,
                                "selector": v.selector.clone().unwrap_or_default(),
                            })
                        })
                        .collect();
                    json!({
                        "match_variables": variables,
                        "operator": c.operator,
                        "negation_condition": c.negation_condition.unwrap_or(false),
                        "match_values": c.match_values,
                        "transforms": flatten_string_list(c.transforms.as_ref()),
                    })
                })
                .collect();

            json!({
                "name": rule.name.clone().unwrap_or_default(),
                "priority": rule.priority,
                "rule_type": rule.rule_type,
                "rate_limit_duration": rule.rate_limit_duration.clone().map(Value::from).unwrap_or(Value::Null),
                "rate_limit_threshold": rule.rate_limit_threshold.map(Value::from).unwrap_or(Value::Null),
                "match_conditions": conditions,
                "action": rule.action,
                "enabled": is_enabled(rule.state.as_deref(), true),
            })
        })
        .collect();
    Value::Array(items)
}

fn flatten_policy_settings(settings: Option<&PolicySettings>) -> Value {
    let Some(s) = settings else {
        return json!([]);
    };
    json!([{
        "enabled": is_enabled(s.state.as_deref(), true),
        "mode": s.mode.clone().unwrap_or_else(|| "Prevention".to_string()),
        "request_body_check": s.request_body_check.unwrap_or(true),
        "file_upload_limit_in_mb": s.file_upload_limit_in_mb.unwrap_or(100),
        "max_request_body_size_in_kb": s.max_request_body_size_in_kb.unwrap_or(128),
    }])
}

fn flatten_managed_rules(managed: Option<&ManagedRules>) -> Value {
    let Some(managed) = managed else {
        return json!([]);
    };

    let exclusions: Vec<Value> = managed
        .exclusions
        .iter()
        .flatten()
        .map(|e| {
            json!({
                "match_variable": e.match_variable,
                "selector_match_operator": e.selector_match_operator,
                "selector": e.selector,
            })
        })
        .collect();

    let sets: Vec<Value> = managed
        .managed_rule_sets
        .iter()
        .map(|set| {
            let overrides: Vec<Value> = set
                .rule_group_overrides
                .iter()
                .flatten()
                .map(|group| {
                    let rules: Vec<Value> = group
                        .rules
                        .iter()
                        .flatten()
                        .map(|r| {
                            json!({
                                "id": r.rule_id,
                                "enabled": is_enabled(r.state.as_deref(), false),
                                "action": r.action.clone().unwrap_or_default(),
                            })
                        })
                        .collect();
                    json!({"rule_group_name": group.rule_group_name, "rule": rules})
                })
                .collect();
            json!({
                "type": set.rule_set_type,
                "version": set.rule_set_version,
                "rule_group_override": overrides,
            })
        })
        .collect();

    json!([{"exclusion": exclusions, "managed_rule_set": sets}])
}

pub fn flatten(
    id: &WebApplicationFirewallPolicyId,
    model: &WebApplicationFirewallPolicy,
) -> Map<String, Value> {
    let props = &model.properties;

    let mut attrs = Map::new();
    attrs.insert("name".into(), id.policy_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("location".into(), flatten_location(model.location.as_deref()));
    attrs.insert("custom_rules".into(), flatten_custom_rules(props.custom_rules.as_ref()));
    attrs.insert(
        "policy_settings".into(),
        flatten_policy_settings(props.policy_settings.as_ref()),
    );
    attrs.insert("managed_rules".into(), flatten_managed_rules(props.managed_rules.as_ref()));
    attrs.insert("http_listener_ids".into(), sub_resource_ids(props.http_listeners.as_ref()));
    attrs.insert("path_based_rule_ids".into(), sub_resource_ids(props.path_based_rules.as_ref()));
    attrs.insert("tags".into(), flatten_tags(model.tags.as_ref()));
    attrs
}

fn custom_rule_schema() -> Schema {
    let match_variable = Schema::new()
        .attribute(
            Attribute::string("variable_name")
                .required()
                .allowed(MATCH_VARIABLES),
        )
        .attribute(Attribute::string("selector").optional());

    let match_condition = Schema::new()
        .attribute(
            Attribute::block("match_variables", match_variable)
                .required()
                .min_items(1),
        )
        .attribute(Attribute::string("operator").required().allowed(OPERATORS))
        .attribute(Attribute::bool("negation_condition").optional())
        .attribute(Attribute::string_list("match_values").optional())
        .attribute(Attribute::string_set("transforms").optional().allowed(TRANSFORMS));

    Schema::new()
        .attribute(Attribute::string("name").optional())
        .attribute(Attribute::int("priority").required().between(1, 100))
        .attribute(Attribute::string("rule_type").required().allowed(RULE_TYPES))
        .attribute(
            Attribute::string("rate_limit_duration")
                .optional()
                .allowed(RATE_LIMIT_DURATIONS),
        )
        .attribute(Attribute::int("rate_limit_threshold").optional().between(1, i64::from(i32::MAX)))
        .attribute(
            Attribute::block("match_conditions", match_condition)
                .required()
                .min_items(1),
        )
        .attribute(Attribute::string("action").required().allowed(ACTIONS))
        .attribute(Attribute::bool("enabled").optional().default(true))
}

fn managed_rules_schema() -> Schema {
    let rule = Schema::new()
        .attribute(Attribute::string("id").required().validate_with(validate::string_not_empty))
        .attribute(Attribute::bool("enabled").optional().default(false))
        .attribute(Attribute::string("action").optional().allowed(ACTIONS));

    let rule_group_override = Schema::new()
        .attribute(
            Attribute::string("rule_group_name")
                .required()
                .validate_with(validate::string_not_empty),
        )
        .attribute(Attribute::block("rule", rule).optional());

    let managed_rule_set = Schema::new()
        .attribute(
            Attribute::string("type")
                .optional()
                .default("OWASP")
                .allowed(&["OWASP", "Microsoft_BotManagerRuleSet", "Microsoft_DefaultRuleSet"]),
        )
        .attribute(Attribute::string("version").required().validate_with(validate::string_not_empty))
        .attribute(Attribute::block("rule_group_override", rule_group_override).optional());

    let exclusion = Schema::new()
        .attribute(
            Attribute::string("match_variable")
                .required()
                .allowed(EXCLUSION_VARIABLES),
        )
        .attribute(Attribute::string("selector").required())
        .attribute(
            Attribute::string("selector_match_operator")
                .required()
                .allowed(SELECTOR_OPERATORS),
        );

    Schema::new()
        .attribute(Attribute::block("exclusion", exclusion).optional())
        .attribute(
            Attribute::block("managed_rule_set", managed_rule_set)
                .required()
                .min_items(1),
        )
}

#[async_trait]
impl Resource for WebApplicationFirewallPolicyResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> Schema {
        let policy_settings = Schema::new()
            .attribute(Attribute::bool("enabled").optional().default(true))
            .attribute(Attribute::string("mode").optional().default("Prevention").allowed(MODES))
            .attribute(Attribute::bool("request_body_check").optional().default(true))
            .attribute(
                Attribute::int("file_upload_limit_in_mb")
                    .optional()
                    .default(100)
                    .between(1, 4000),
            )
            .attribute(
                Attribute::int("max_request_body_size_in_kb")
                    .optional()
                    .default(128)
                    .between(8, 2000),
            );

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
            .attribute(Attribute::block("custom_rules", custom_rule_schema()).optional())
            .attribute(
                Attribute::block("policy_settings", policy_settings)
                    .optional()
                    .max_items(1),
            )
            .attribute(
                Attribute::block("managed_rules", managed_rules_schema())
                    .required()
                    .min_items(1)
                    .max_items(1),
            )
            .attribute(Attribute::string_list("http_listener_ids").computed())
            .attribute(Attribute::string_list("path_based_rule_ids").computed())
            .attribute(Attribute::map("tags").optional())
    }

    fn validate(&self, d: &ResourceData) -> Result<(), ValidationError> {
        validate_custom_rules(d)
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        WebApplicationFirewallPolicyId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        self.validate(d)?;

        let id = WebApplicationFirewallPolicyId::new(
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
        let id = WebApplicationFirewallPolicyId::parse(d.id())?;

        let model = get_existing::<WebApplicationFirewallPolicy>(clients, &id.id(), API_VERSION)
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
        let id = WebApplicationFirewallPolicyId::parse(d.id())?;

        let model = expand(d)?;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = WebApplicationFirewallPolicyId::parse(d.id())?;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn managed_rules() -> Value {
        json!([{
            "exclusion": [{
                "match_variable": "RequestHeaderNames",
                "selector": "x-company-secret-header",
                "selector_match_operator": "Equals"
            }],
            "managed_rule_set": [{
                "type": "OWASP",
                "version": "3.2",
                "rule_group_override": [{
                    "rule_group_name": "REQUEST-920-PROTOCOL-ENFORCEMENT",
                    "rule": [{"id": "920300", "enabled": true, "action": "Log"}]
                }]
            }]
        }])
    }

    fn rate_limit_rule() -> Value {
        json!({
            "name": "ratelimit",
            "priority": 2,
            "rule_type": "RateLimitRule",
            "rate_limit_duration": "OneMin",
            "rate_limit_threshold": 100,
            "match_conditions": [{
                "match_variables": [{"variable_name": "RemoteAddr", "selector": ""}],
                "operator": "IPMatch",
                "negation_condition": false,
                "match_values": ["192.168.1.0/24"],
                "transforms": []
            }],
            "action": "Block",
            "enabled": true
        })
    }

    fn config(extra: Value) -> ResourceData {
        let mut base = json!({
            "name": "wafpolicy1",
            "resource_group_name": "rg1",
            "location": "westeurope",
            "managed_rules": managed_rules()
        });
        for (k, v) in extra.as_object().cloned().unwrap() {
            base[k] = v;
        }
        let mut attrs = base.as_object().cloned().unwrap();
        WebApplicationFirewallPolicyResource.schema().apply_defaults(&mut attrs);
        ResourceData::new(attrs)
    }

    #[test]
    fn test_rate_limit_rule_needs_duration_and_threshold() {
        let mut rule = rate_limit_rule();
        rule["rate_limit_duration"] = Value::Null;
        rule["rate_limit_threshold"] = Value::Null;
        let err = validate_custom_rules(&config(json!({"custom_rules": [rule]}))).unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.errors[0].contains("`rate_limit_duration` is required"));
    }

    #[test]
    fn test_match_rule_rejects_rate_limit_settings() {
        let mut rule = rate_limit_rule();
        rule["rule_type"] = json!("MatchRule");
        let err = validate_custom_rules(&config(json!({"custom_rules": [rule]}))).unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.errors[1].contains("`rate_limit_threshold` can only be set"));
    }

    #[test]
    fn test_negation_condition_uses_arm_spelling() {
        let d = config(json!({"custom_rules": [rate_limit_rule()]}));
        let body = serde_json::to_value(expand(&d).unwrap()).unwrap();
        let condition = &body["properties"]["customRules"][0]["matchConditions"][0];
        assert_eq!(condition["negationConditon"], json!(false));
        assert_eq!(body["properties"]["customRules"][0]["state"], json!("Enabled"));
    }

    #[test]
    fn test_expand_flatten_roundtrip() {
        let combinations = [
            json!({}),
            json!({"custom_rules": [rate_limit_rule()], "tags": {"env": "prod"}}),
            json!({"policy_settings": [{
                "enabled": false,
                "mode": "Detection",
                "request_body_check": false,
                "file_upload_limit_in_mb": 50,
                "max_request_body_size_in_kb": 256
            }]}),
        ];

        for extra in combinations {
            let d = config(extra);
            let wire: WebApplicationFirewallPolicy =
                serde_json::from_value(serde_json::to_value(expand(&d).unwrap()).unwrap()).unwrap();
            let flattened = flatten(&WebApplicationFirewallPolicyId::new("sub", "rg1", "wafpolicy1"), &wire);
            for (key, value) in d.attributes() {
                assert_eq!(&flattened[key], value, "attribute {}", key);
            }
        }
    }

    #[test]
    fn test_schema_requires_managed_rules() {
        let attrs = json!({"name": "wafpolicy1", "resource_group_name": "rg1", "location": "westeurope"});
        let err = WebApplicationFirewallPolicyResource
            .schema()
            .validate(attrs.as_object().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("\"managed_rules\" is required"));
    }
}
