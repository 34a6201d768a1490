//! Typed process variables

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Variables keyed by name, as exchanged with the engine
pub type Variables = HashMap<String, Variable>;

/// Engine value type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueType {
    Boolean,
    String,
    Integer,
    Short,
    Long,
    Double,
    Date,
    Json,
    Object,
    Null,
    Bytes,
    File,
    Xml,
    /// Any type tag this client does not know about
    Other(String),
}

impl ValueType {
    /// Wire name of the type tag
    pub fn as_str(&self) -> &str {
        match self {
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Short => "Short",
            Self::Long => "Long",
            Self::Double => "Double",
            Self::Date => "Date",
            Self::Json => "Json",
            Self::Object => "Object",
            Self::Null => "Null",
            Self::Bytes => "Bytes",
            Self::File => "File",
            Self::Xml => "Xml",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl From<String> for ValueType {
    // The engine matches type names case-insensitively
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "boolean" => Self::Boolean,
            "string" => Self::String,
            "integer" => Self::Integer,
            "short" => Self::Short,
            "long" => Self::Long,
            "double" => Self::Double,
            "date" => Self::Date,
            "json" => Self::Json,
            "object" => Self::Object,
            "null" => Self::Null,
            "bytes" => Self::Bytes,
            "file" => Self::File,
            "xml" => Self::Xml,
            _ => Self::Other(value),
        }
    }
}

impl From<ValueType> for String {
    fn from(value: ValueType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra metadata attached to a variable value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueInfo {
    /// Type name of a serialized object value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type_name: Option<String>,

    /// Serialization format of an object value (e.g. `application/json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialization_data_format: Option<String>,
}

impl ValueInfo {
    fn is_empty(&self) -> bool {
        self.object_type_name.is_none() && self.serialization_data_format.is_none()
    }
}

/// A typed variable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Raw value
    #[serde(default)]
    value: serde_json::Value,

    /// Type tag
    #[serde(rename = "type")]
    value_type: ValueType,

    /// Optional metadata
    #[serde(default, skip_serializing_if = "ValueInfo::is_empty")]
    value_info: ValueInfo,
}

impl Variable {
    /// Create a variable from its parts
    pub fn new(value: serde_json::Value, value_type: ValueType) -> Self {
        Self {
            value,
            value_type,
            value_info: ValueInfo::default(),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(value.into(), ValueType::Boolean)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(serde_json::Value::String(value.into()), ValueType::String)
    }

    pub fn integer(value: i32) -> Self {
        Self::new(value.into(), ValueType::Integer)
    }

    pub fn long(value: i64) -> Self {
        Self::new(value.into(), ValueType::Long)
    }

    pub fn double(value: f64) -> Self {
        Self::new(value.into(), ValueType::Double)
    }

    pub fn null() -> Self {
        Self::new(serde_json::Value::Null, ValueType::Null)
    }

    /// A `Json` variable holding the serialized form of `value`
    ///
    /// The engine stores `Json` values as strings.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let raw = serde_json::to_string(value)?;
        Ok(Self::new(serde_json::Value::String(raw), ValueType::Json))
    }

    /// An `Object` variable serialized as JSON with the given type name
    pub fn object<T: Serialize>(
        value: &T,
        object_type_name: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        let raw = serde_json::to_string(value)?;
        Ok(Self::new(serde_json::Value::String(raw), ValueType::Object).with_value_info(
            ValueInfo {
                object_type_name: Some(object_type_name.into()),
                serialization_data_format: Some("application/json".to_string()),
            },
        ))
    }

    /// Attach value metadata
    pub fn with_value_info(mut self, info: ValueInfo) -> Self {
        self.value_info = info;
        self
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn value_info(&self) -> &ValueInfo {
        &self.value_info
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.value.as_i64()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_f64()
    }

    /// Deserialize the value into `T`
    ///
    /// String payloads of `Json` and `Object` variables are parsed first.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match (&self.value_type, &self.value) {
            (ValueType::Json | ValueType::Object, serde_json::Value::String(raw)) => {
                serde_json::from_str(raw)
            }
            _ => serde_json::from_value(self.value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let variable = Variable::boolean(true);
        let json = serde_json::to_value(&variable).unwrap();
        assert_eq!(json, json!({"value": true, "type": "Boolean"}));
    }

    #[test]
    fn test_type_tag_is_case_insensitive() {
        let variable: Variable =
            serde_json::from_value(json!({"value": false, "type": "boolean"})).unwrap();
        assert_eq!(variable.value_type(), &ValueType::Boolean);
        assert_eq!(variable.as_bool(), Some(false));
    }

    #[test]
    fn test_unknown_type_preserved() {
        let variable: Variable =
            serde_json::from_value(json!({"value": "x", "type": "Spin"})).unwrap();
        assert_eq!(variable.value_type(), &ValueType::Other("Spin".to_string()));

        let json = serde_json::to_value(&variable).unwrap();
        assert_eq!(json["type"], "Spin");
    }

    #[test]
    fn test_value_info() {
        let variable: Variable = serde_json::from_value(json!({
            "value": "{\"id\":7}",
            "type": "Object",
            "valueInfo": {
                "objectTypeName": "com.example.Order",
                "serializationDataFormat": "application/json"
            }
        }))
        .unwrap();

        assert_eq!(
            variable.value_info().object_type_name.as_deref(),
            Some("com.example.Order")
        );

        #[derive(Deserialize)]
        struct Order {
            id: u32,
        }
        let order: Order = variable.deserialize().unwrap();
        assert_eq!(order.id, 7);
    }

    #[test]
    fn test_json_variable() {
        let variable = Variable::json(&json!({"items": [1, 2]})).unwrap();
        assert_eq!(variable.value_type(), &ValueType::Json);
        let parsed: serde_json::Value = variable.deserialize().unwrap();
        assert_eq!(parsed, json!({"items": [1, 2]}));
    }

    #[test]
    fn test_missing_value_is_null() {
        let variable: Variable = serde_json::from_value(json!({"type": "Null"})).unwrap();
        assert_eq!(variable, Variable::null());
    }
}
