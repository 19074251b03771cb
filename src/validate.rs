//! Pre-flight validation helpers.
//!
//! Every check here runs before any request is sent. Failures are collected
//! into a single [`ValidationError`] so users see all problems at once.

use std::net::Ipv4Addr;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::azure::ids::ResourceId;

/// One or more validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Default, Error)]
#[error("{}", format_errors(.errors))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn extend(&mut self, other: ValidationError) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn format_errors(errors: &[String]) -> String {
    match errors {
        [] => "validation failed".to_string(),
        [only] => format!("1 error occurred:\n\t* {}", only),
        errors => {
            let mut message = format!("{} errors occurred:", errors.len());
            for e in errors {
                message.push_str("\n\t* ");
                message.push_str(e);
            }
            message
        }
    }
}

/// True for anything other than null, `""`, `[]` or `{}`.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

/// True when the attribute holds a present value.
pub fn is_set(attrs: &Map<String, Value>, key: &str) -> bool {
    attrs.get(key).is_some_and(is_present)
}

/// Reports every `(a, b)` pair where both attributes are set.
pub fn conflicting_pairs(attrs: &Map<String, Value>, pairs: &[(&str, &str)]) -> ValidationError {
    let mut errors = ValidationError::new();
    for (a, b) in pairs {
        if is_set(attrs, a) && is_set(attrs, b) {
            errors.push(format!("only one of `{}` and `{}` can be used", a, b));
        }
    }
    errors
}

pub fn string_in_slice(key: &str, value: &str, allowed: &[&str]) -> Result<(), String> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "expected `{}` to be one of [{}], got {:?}",
            key,
            allowed
                .iter()
                .map(|a| format!("{:?}", a))
                .collect::<Vec<_>>()
                .join(", "),
            value
        ))
    }
}

pub fn int_between(key: &str, value: i64, min: i64, max: i64) -> Result<(), String> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "expected `{}` to be in the range ({} - {}), got {}",
            key, min, max, value
        ))
    }
}

pub fn string_not_empty(key: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("`{}` must not be empty", key))
    } else {
        Ok(())
    }
}

/// ARM network resource names: 1-80 chars, alphanumeric first, alphanumeric
/// or `_` last, and `.`, `-`, `_` in between.
pub fn network_resource_name(key: &str, value: &str) -> Result<(), String> {
    let valid_len = (1..=80).contains(&value.len());
    let mut chars = value.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let last_ok = value
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    let body_ok = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));

    if valid_len && first_ok && last_ok && body_ok {
        Ok(())
    } else {
        Err(format!(
            "`{}` must be 1-80 characters, start with a letter or number, end with a letter, number or underscore, and may contain only letters, numbers, underscores, periods or hyphens, got {:?}",
            key, value
        ))
    }
}

pub fn resource_group_name(key: &str, value: &str) -> Result<(), String> {
    let valid_len = (1..=90).contains(&value.len());
    let valid_chars = value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | '(' | ')'));
    if valid_len && valid_chars && !value.ends_with('.') {
        Ok(())
    } else {
        Err(format!(
            "`{}` may only contain alphanumeric characters, dash, underscores, parentheses and periods, may not end in a period and must be 1-90 characters, got {:?}",
            key, value
        ))
    }
}

pub fn ipv4_address(key: &str, value: &str) -> Result<(), String> {
    value
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| format!("expected `{}` to contain a valid IPv4 address, got {:?}", key, value))
}

/// IPv4 or IPv6 CIDR such as `10.0.0.0/16` or `ace:cab:deca::/48`.
pub fn cidr(key: &str, value: &str) -> Result<(), String> {
    let invalid = || format!("expected `{}` to be a valid CIDR, got {:?}", key, value);
    let (addr, prefix) = value.split_once('/').ok_or_else(invalid)?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let max = match addr.parse::<std::net::IpAddr>().map_err(|_| invalid())? {
        std::net::IpAddr::V4(_) => 32,
        std::net::IpAddr::V6(_) => 128,
    };
    if prefix > max {
        return Err(invalid());
    }
    Ok(())
}

/// Port or port range: `*`, `80` or `1024-65535`.
pub fn port_or_range(key: &str, value: &str) -> Result<(), String> {
    if value == "*" {
        return Ok(());
    }
    let invalid = || {
        format!(
            "`{}` must be `*`, a port (0-65535) or a range like `1024-2048`, got {:?}",
            key, value
        )
    };
    let parse = |s: &str| s.trim().parse::<u16>().map_err(|_| invalid());
    match value.split_once('-') {
        Some((lo, hi)) => {
            if parse(lo)? > parse(hi)? {
                return Err(invalid());
            }
            Ok(())
        }
        None => parse(value).map(|_| ()),
    }
}

pub fn arm_resource_id(key: &str, value: &str) -> Result<(), String> {
    match ResourceId::parse(value) {
        Ok(id) if id.resource_group.is_some() && id.provider.is_some() => Ok(()),
        Ok(_) => Err(format!("expected `{}` to be a resource ID, got {:?}", key, value)),
        Err(e) => Err(format!("expected `{}` to be a resource ID: {}", key, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_empty_error_display() {
        let err: Box<dyn std::error::Error> = Box::new(ValidationError::new());
        assert_eq!(err.to_string(), "validation failed");
    }

    #[test]
    fn test_single_error_display() {
        let err = ValidationError::single("bad value");
        assert_eq!(err.to_string(), "1 error occurred:\n\t* bad value");
    }

    #[test]
    fn test_multiple_errors_display() {
        let mut err = ValidationError::new();
        err.push("first");
        err.push("second");
        assert_eq!(err.to_string(), "2 errors occurred:\n\t* first\n\t* second");
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationError::new().into_result().is_ok());
        assert!(ValidationError::single("x").into_result().is_err());
    }

    #[test]
    fn test_is_set_treats_empty_values_as_unset() {
        let a = attrs(json!({"s": "", "l": [], "m": {}, "n": null, "b": false, "v": "x"}));
        assert!(!is_set(&a, "s"));
        assert!(!is_set(&a, "l"));
        assert!(!is_set(&a, "m"));
        assert!(!is_set(&a, "n"));
        assert!(!is_set(&a, "missing"));
        assert!(is_set(&a, "b"));
        assert!(is_set(&a, "v"));
    }

    #[test]
    fn test_conflicting_pairs_reports_every_violation() {
        let a = attrs(json!({
            "source_port_range": "22",
            "source_port_ranges": ["80", "443"],
            "destination_port_range": "*",
            "destination_port_ranges": ["8080"],
            "source_address_prefix": "*",
        }));
        let err = conflicting_pairs(
            &a,
            &[
                ("source_port_range", "source_port_ranges"),
                ("destination_port_range", "destination_port_ranges"),
                ("source_address_prefix", "source_address_prefixes"),
            ],
        );
        assert_eq!(err.len(), 2);
        assert!(err.errors[0].contains("`source_port_range` and `source_port_ranges`"));
        assert!(err.errors[1].contains("`destination_port_range` and `destination_port_ranges`"));
    }

    #[test]
    fn test_string_in_slice() {
        assert!(string_in_slice("sku", "Basic", &["Basic", "Standard"]).is_ok());
        let err = string_in_slice("sku", "basic", &["Basic", "Standard"]).unwrap_err();
        assert!(err.contains("\"Basic\", \"Standard\""));
    }

    #[test]
    fn test_int_between() {
        assert!(int_between("scale_units", 2, 2, 50).is_ok());
        assert!(int_between("scale_units", 50, 2, 50).is_ok());
        assert!(int_between("scale_units", 51, 2, 50).is_err());
    }

    #[test]
    fn test_network_resource_name() {
        assert!(network_resource_name("name", "vnet-prod_01").is_ok());
        assert!(network_resource_name("name", "a").is_ok());
        assert!(network_resource_name("name", "-leading").is_err());
        assert!(network_resource_name("name", "trailing-").is_err());
        assert!(network_resource_name("name", "has space").is_err());
        assert!(network_resource_name("name", "").is_err());
        assert!(network_resource_name("name", &"a".repeat(81)).is_err());
    }

    #[test]
    fn test_resource_group_name() {
        assert!(resource_group_name("resource_group_name", "rg-(prod).1").is_ok());
        assert!(resource_group_name("resource_group_name", "rg.").is_err());
        assert!(resource_group_name("resource_group_name", "").is_err());
    }

    #[test]
    fn test_cidr() {
        assert!(cidr("address_space", "10.0.0.0/16").is_ok());
        assert!(cidr("address_space", "ace:cab:deca::/48").is_ok());
        assert!(cidr("address_space", "10.0.0.0/33").is_err());
        assert!(cidr("address_space", "10.0.0.0").is_err());
        assert!(cidr("address_space", "banana/8").is_err());
    }

    #[test]
    fn test_port_or_range() {
        assert!(port_or_range("p", "*").is_ok());
        assert!(port_or_range("p", "22").is_ok());
        assert!(port_or_range("p", "1024-65535").is_ok());
        assert!(port_or_range("p", "65536").is_err());
        assert!(port_or_range("p", "200-100").is_err());
        assert!(port_or_range("p", "http").is_err());
    }

    #[test]
    fn test_ipv4_address() {
        assert!(ipv4_address("next_hop_in_ip_address", "10.0.0.4").is_ok());
        assert!(ipv4_address("next_hop_in_ip_address", "10.0.0").is_err());
    }

    #[test]
    fn test_arm_resource_id() {
        assert!(
            arm_resource_id(
                "subnet_id",
                "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/v/subnets/s"
            )
            .is_ok()
        );
        assert!(arm_resource_id("subnet_id", "/subscriptions/s/resourceGroups/rg").is_err());
        assert!(arm_resource_id("subnet_id", "not-an-id").is_err());
    }
}
