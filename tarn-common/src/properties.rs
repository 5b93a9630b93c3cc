use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tagged variant of primitive/container values. Properties on graph objects and relationships are
/// stored losslessly as a tree of these, and schema coercion is the
/// only thing allowed to change a value's variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    String(String),
    Number(f64),
    Boolean(bool),
    /// Always normalized to ISO-8601 UTC once it has passed through a
    /// schema's `date` coercion.
    Date(String),
    Array(Vec<PropertyValue>),
    Object(PropertyMap),
    Null,
}

pub type PropertyMap = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "string",
            PropertyValue::Number(_) => "number",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Date(_) => "date",
            PropertyValue::Array(_) => "array",
            PropertyValue::Object(_) => "object",
            PropertyValue::Null => "null",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Convenience conversion from an untyped `serde_json::Value`, used at the
/// boundary where extraction agents or ingestion requests hand over raw
/// JSON that hasn't been schema-validated yet.
impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PropertyValue::Null,
            serde_json::Value::Bool(b) => PropertyValue::Boolean(b),
            serde_json::Value::Number(n) => {
                PropertyValue::Number(n.as_f64().unwrap_or_default())
            }
            serde_json::Value::String(s) => PropertyValue::String(s),
            serde_json::Value::Array(items) => {
                PropertyValue::Array(items.into_iter().map(PropertyValue::from).collect())
            }
            serde_json::Value::Object(map) => PropertyValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, PropertyValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<PropertyValue> for serde_json::Value {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Null => serde_json::Value::Null,
            PropertyValue::Boolean(b) => serde_json::Value::Bool(b),
            PropertyValue::Number(n) => serde_json::json!(n),
            PropertyValue::String(s) | PropertyValue::Date(s) => serde_json::Value::String(s),
            PropertyValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            PropertyValue::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}
