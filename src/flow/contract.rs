// SPDX-License-Identifier: MIT

//! Data contracts declared by nodes
//!
//! A contract is a named JSON schema. The engine only needs a
//! validate-or-error call, so the schema language sits behind
//! `ContractValidator`; `SchemaValidator` covers the subset schemars emits
//! for plain data types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ValidationError;

/// A named schema a value must satisfy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Contract {
    pub name: String,
    pub schema: Value,
    /// Whether a missing value is itself a violation
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl Contract {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
        }
    }

    /// Contract whose schema is derived from a Rust type
    pub fn of<T: JsonSchema>() -> Self {
        let root = schemars::schema_for!(T);
        let schema = serde_json::to_value(&root).unwrap_or(Value::Bool(true));
        Self::new(T::schema_name(), schema)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Contracts keyed by the store key they apply to
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ContractSet(BTreeMap<String, Contract>);

impl ContractSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, contract: Contract) -> Self {
        self.0.insert(key.into(), contract);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Contract> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Input and output contracts of one node
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NodeContracts {
    #[serde(default)]
    pub inputs: ContractSet,
    #[serde(default)]
    pub outputs: ContractSet,
}

/// Validate-or-error hook the engine calls on contract-bound payloads
pub trait ContractValidator: Send + Sync {
    fn validate(&self, value: &Value, contract: &Contract) -> Result<(), ValidationError>;
}

/// Structural validator for a JSON-schema subset: `type`, `enum`, `const`,
/// `properties`, `required`, `items`, `$ref` into `definitions`, `allOf`,
/// `anyOf`, `oneOf`. Unknown keywords are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl ContractValidator for SchemaValidator {
    fn validate(&self, value: &Value, contract: &Contract) -> Result<(), ValidationError> {
        check(value, &contract.schema, &contract.schema, "$")
            .map_err(|message| ValidationError::new(&contract.name, message))
    }
}

fn check(value: &Value, schema: &Value, root: &Value, path: &str) -> Result<(), String> {
    let schema = match schema {
        Value::Bool(true) => return Ok(()),
        Value::Bool(false) => return Err(format!("{}: no value is allowed", path)),
        Value::Object(obj) => obj,
        _ => return Ok(()),
    };

    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        let target = resolve_ref(root, reference)
            .ok_or_else(|| format!("{}: unresolved reference '{}'", path, reference))?;
        check(value, target, root, path)?;
    }

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => vec![],
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| has_type(value, t)) {
            return Err(format!(
                "{}: expected {}, found {}",
                path,
                allowed.join(" or "),
                type_name(value)
            ));
        }
    }

    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            return Err(format!("{}: {} is not one of the allowed values", path, value));
        }
    }

    if let Some(constant) = schema.get("const") {
        if constant != value {
            return Err(format!("{}: expected constant {}", path, constant));
        }
    }

    if let Some(all) = schema.get("allOf").and_then(Value::as_array) {
        for sub in all {
            check(value, sub, root, path)?;
        }
    }

    for keyword in ["anyOf", "oneOf"] {
        if let Some(options) = schema.get(keyword).and_then(Value::as_array) {
            if !options.iter().any(|sub| check(value, sub, root, path).is_ok()) {
                return Err(format!("{}: matches none of the {} alternatives", path, keyword));
            }
        }
    }

    if let Value::Object(fields) = value {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(name) {
                    return Err(format!("{}: missing required property '{}'", path, name));
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, sub) in properties {
                if let Some(field) = fields.get(name) {
                    check(field, sub, root, &format!("{}.{}", path, name))?;
                }
            }
        }
    }

    if let (Value::Array(elements), Some(items)) = (value, schema.get("items")) {
        for (index, element) in elements.iter().enumerate() {
            check(element, items, root, &format!("{}[{}]", path, index))?;
        }
    }

    Ok(())
}

fn resolve_ref<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    root.pointer(pointer)
}

fn has_type(value: &Value, name: &str) -> bool {
    match name {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(JsonSchema, Serialize)]
    #[allow(dead_code)]
    struct Greeting {
        text: String,
        audience: Option<Audience>,
        tags: Vec<String>,
    }

    #[derive(JsonSchema, Serialize)]
    #[allow(dead_code)]
    struct Audience {
        size: u32,
    }

    fn validate(value: Value, contract: &Contract) -> Result<(), ValidationError> {
        SchemaValidator.validate(&value, contract)
    }

    #[test]
    fn test_simple_type() {
        let contract = Contract::new("Text", json!({"type": "string"}));
        assert!(validate(json!("hello"), &contract).is_ok());

        let err = validate(json!(42), &contract).unwrap_err();
        assert_eq!(err.contract, "Text");
        assert!(err.message.contains("expected string, found number"));
    }

    #[test]
    fn test_integer_and_enum() {
        let count = Contract::new("Count", json!({"type": "integer"}));
        assert!(validate(json!(3), &count).is_ok());
        assert!(validate(json!(3.5), &count).is_err());

        let level = Contract::new("Level", json!({"enum": ["low", "high"]}));
        assert!(validate(json!("low"), &level).is_ok());
        assert!(validate(json!("medium"), &level).is_err());
    }

    #[test]
    fn test_object_properties_and_required() {
        let contract = Contract::new(
            "Person",
            json!({
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": {"type": "string"},
                    "age": {"type": "integer"}
                }
            }),
        );
        assert!(validate(json!({"name": "Ada", "age": 36}), &contract).is_ok());

        let err = validate(json!({"age": 36}), &contract).unwrap_err();
        assert!(err.message.contains("missing required property 'name'"));

        let err = validate(json!({"name": "Ada", "age": "old"}), &contract).unwrap_err();
        assert!(err.message.starts_with("$.age"));
    }

    #[test]
    fn test_array_items() {
        let contract = Contract::new(
            "Scores",
            json!({"type": "array", "items": {"type": "number"}}),
        );
        assert!(validate(json!([1, 2.5]), &contract).is_ok());
        let err = validate(json!([1, "x"]), &contract).unwrap_err();
        assert!(err.message.starts_with("$[1]"));
    }

    #[test]
    fn test_schemars_derived_contract() {
        let contract = Contract::of::<Greeting>();
        assert_eq!(contract.name, "Greeting");
        assert!(contract.required);

        assert!(validate(
            json!({"text": "hi", "audience": {"size": 3}, "tags": ["a"]}),
            &contract
        )
        .is_ok());
        assert!(validate(json!({"text": "hi", "audience": null, "tags": []}), &contract).is_ok());

        // Missing required field
        assert!(validate(json!({"audience": null, "tags": []}), &contract).is_err());
        // Nested definition is checked through $ref
        assert!(validate(
            json!({"text": "hi", "audience": {"size": "big"}, "tags": []}),
            &contract
        )
        .is_err());
    }

    #[test]
    fn test_contract_set_serde() {
        let yaml = r#"
            greeting:
              name: Text
              schema: { type: string }
            note:
              name: Note
              schema: true
              required: false
        "#;
        let set: ContractSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(set.keys().count(), 2);
        assert!(set.get("greeting").unwrap().required);
        assert!(!set.get("note").unwrap().required);
    }
}
