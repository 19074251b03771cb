//! Declarative attribute schemas.
//!
//! A deliberately small description of each resource's arguments: enough to
//! reject bad configuration pre-flight (types, required arguments, allow-lists,
//! ranges) and to know which changes force a replacement.

use serde_json::{Map, Value};

use crate::validate::{self, ValidationError};

/// Validates a single string value. Receives the attribute path and the value.
pub type StringValidator = fn(&str, &str) -> Result<(), String>;

#[derive(Debug, Clone)]
pub enum AttributeType {
    String,
    Bool,
    Int,
    List(Box<AttributeType>),
    Set(Box<AttributeType>),
    Map,
    Block(Schema),
}

impl AttributeType {
    fn describe(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Bool => "bool",
            AttributeType::Int => "number",
            AttributeType::List(_) => "list",
            AttributeType::Set(_) => "set",
            AttributeType::Map => "map of string",
            AttributeType::Block(_) => "block list",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: &'static str,
    pub kind: AttributeType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    pub default: Option<Value>,
    pub allowed: Option<&'static [&'static str]>,
    pub int_range: Option<(i64, i64)>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub validators: Vec<StringValidator>,
}

impl Attribute {
    pub fn new(name: &'static str, kind: AttributeType) -> Self {
        Self {
            name,
            kind,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            default: None,
            allowed: None,
            int_range: None,
            min_items: None,
            max_items: None,
            validators: Vec::new(),
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, AttributeType::String)
    }

    pub fn bool(name: &'static str) -> Self {
        Self::new(name, AttributeType::Bool)
    }

    pub fn int(name: &'static str) -> Self {
        Self::new(name, AttributeType::Int)
    }

    pub fn string_list(name: &'static str) -> Self {
        Self::new(name, AttributeType::List(Box::new(AttributeType::String)))
    }

    pub fn string_set(name: &'static str) -> Self {
        Self::new(name, AttributeType::Set(Box::new(AttributeType::String)))
    }

    pub fn map(name: &'static str) -> Self {
        Self::new(name, AttributeType::Map)
    }

    pub fn block(name: &'static str, schema: Schema) -> Self {
        Self::new(name, AttributeType::Block(schema))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn allowed(mut self, values: &'static [&'static str]) -> Self {
        self.allowed = Some(values);
        self
    }

    pub fn between(mut self, min: i64, max: i64) -> Self {
        self.int_range = Some((min, max));
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn validate_with(mut self, validator: StringValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Read-only attributes are filled from the remote object and never
    /// validated as input.
    pub fn is_read_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn force_new_attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes
            .iter()
            .filter(|a| a.force_new)
            .map(|a| a.name)
    }

    /// Whether any argument can change without replacing the resource.
    pub fn supports_update(&self) -> bool {
        self.attributes
            .iter()
            .any(|a| !a.force_new && !a.is_read_only())
    }

    /// Inserts defaults for arguments the configuration leaves out.
    pub fn apply_defaults(&self, attrs: &mut Map<String, Value>) {
        for attribute in &self.attributes {
            let missing = attrs.get(attribute.name).map_or(true, Value::is_null);
            if missing {
                if let Some(default) = &attribute.default {
                    attrs.insert(attribute.name.to_string(), default.clone());
                }
                continue;
            }

            if let (AttributeType::Block(schema), Some(Value::Array(items))) =
                (&attribute.kind, attrs.get_mut(attribute.name))
            {
                for item in items.iter_mut() {
                    if let Value::Object(obj) = item {
                        schema.apply_defaults(obj);
                    }
                }
            }
        }
    }

    pub fn validate(&self, attrs: &Map<String, Value>) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        self.validate_into("", attrs, &mut errors);
        errors.into_result()
    }

    fn validate_into(&self, prefix: &str, attrs: &Map<String, Value>, errors: &mut ValidationError) {
        for key in attrs.keys() {
            if key != "id" && self.get(key).is_none() {
                errors.push(format!(
                    "An argument named {:?} is not expected here.",
                    format!("{}{}", prefix, key)
                ));
            }
        }

        for attribute in &self.attributes {
            let path = format!("{}{}", prefix, attribute.name);
            let value = attrs.get(attribute.name).filter(|v| !v.is_null());

            let Some(value) = value else {
                if attribute.required {
                    errors.push(format!(
                        "The argument {:?} is required, but no definition was found.",
                        path
                    ));
                }
                continue;
            };

            if attribute.is_read_only() {
                continue;
            }

            attribute.validate_value(&path, &attribute.kind, value, errors);
        }
    }
}

impl Attribute {
    fn validate_value(&self, path: &str, kind: &AttributeType, value: &Value, errors: &mut ValidationError) {
        let type_error = |errors: &mut ValidationError| {
            errors.push(format!(
                "Inappropriate value for {:?}: {} required.",
                path,
                kind.describe()
            ));
        };

        match (kind, value) {
            (AttributeType::String, Value::String(s)) => {
                if let Some(allowed) = self.allowed {
                    if let Err(e) = validate::string_in_slice(path, s, allowed) {
                        errors.push(e);
                    }
                }
                for validator in &self.validators {
                    if let Err(e) = validator(path, s) {
                        errors.push(e);
                    }
                }
            }
            (AttributeType::Bool, Value::Bool(_)) => {}
            (AttributeType::Int, Value::Number(n)) => match n.as_i64() {
                Some(i) => {
                    if let Some((min, max)) = self.int_range {
                        if let Err(e) = validate::int_between(path, i, min, max) {
                            errors.push(e);
                        }
                    }
                }
                None => type_error(errors),
            },
            (AttributeType::List(inner) | AttributeType::Set(inner), Value::Array(items)) => {
                self.validate_count(path, items.len(), errors);
                for (i, item) in items.iter().enumerate() {
                    self.validate_value(&format!("{}.{}", path, i), inner, item, errors);
                }
            }
            (AttributeType::Map, Value::Object(obj)) => {
                for (k, v) in obj {
                    if !v.is_string() {
                        errors.push(format!(
                            "Inappropriate value for {:?}: element {:?}: string required.",
                            path, k
                        ));
                    }
                }
            }
            (AttributeType::Block(schema), Value::Array(items)) => {
                self.validate_count(path, items.len(), errors);
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::Object(obj) => {
                            schema.validate_into(&format!("{}.{}.", path, i), obj, errors)
                        }
                        _ => errors.push(format!(
                            "Inappropriate value for \"{}.{}\": object required.",
                            path, i
                        )),
                    }
                }
            }
            _ => type_error(errors),
        }
    }

    fn validate_count(&self, path: &str, count: usize, errors: &mut ValidationError) {
        if let Some(min) = self.min_items {
            if count < min {
                errors.push(format!(
                    "Attribute {:?} requires {} item minimum, but config has only {} declared.",
                    path, min, count
                ));
            }
        }
        if let Some(max) = self.max_items {
            if count > max {
                errors.push(format!(
                    "Attribute {:?} supports {} item maximum, but config has {} declared.",
                    path, max, count
                ));
            }
        }
    }
}
