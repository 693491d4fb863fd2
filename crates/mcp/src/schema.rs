//! Typed description of a tool's accepted arguments.
//!
//! Schemas serialize to the JSON Schema subset clients expect in
//! `tools/list`, and [`InputSchema::validate`] checks call arguments against
//! them before any handler runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Primitive JSON types a property may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl SchemaType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Schema of a single property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: SchemaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
    fn of(kind: SchemaType, description: &str) -> Self {
        Self {
            kind,
            description: Some(description.to_string()),
            minimum: None,
            maximum: None,
            items: None,
        }
    }

    pub fn string(description: &str) -> Self {
        Self::of(SchemaType::String, description)
    }

    pub fn number(description: &str) -> Self {
        Self::of(SchemaType::Number, description)
    }

    pub fn integer(description: &str) -> Self {
        Self::of(SchemaType::Integer, description)
    }

    pub fn boolean(description: &str) -> Self {
        Self::of(SchemaType::Boolean, description)
    }

    pub fn array(items: PropertySchema, description: &str) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of(SchemaType::Array, description)
        }
    }

    pub fn with_minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn with_maximum(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    fn check(&self, field: &str) -> Result<(), SchemaError> {
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                return Err(SchemaError::InvalidRange {
                    field: field.to_string(),
                });
            }
        }
        if (self.minimum.is_some() || self.maximum.is_some())
            && !matches!(self.kind, SchemaType::Number | SchemaType::Integer)
        {
            return Err(SchemaError::InvalidRange {
                field: field.to_string(),
            });
        }
        match (&self.kind, &self.items) {
            (SchemaType::Array, None) => Err(SchemaError::MissingItems {
                field: field.to_string(),
            }),
            (SchemaType::Array, Some(items)) => items.check(&format!("{}[]", field)),
            _ => Ok(()),
        }
    }

    fn validate(&self, field: &str, value: &Value, violations: &mut Vec<Violation>) {
        if !self.kind.matches(value) {
            violations.push(Violation::WrongType {
                field: field.to_string(),
                expected: self.kind,
                found: json_type_name(value),
            });
            return;
        }

        if let Some(number) = value.as_f64() {
            let below = self.minimum.is_some_and(|min| number < min);
            let above = self.maximum.is_some_and(|max| number > max);
            if below || above {
                violations.push(Violation::OutOfRange {
                    field: field.to_string(),
                    value: number,
                    minimum: self.minimum,
                    maximum: self.maximum,
                });
            }
        }

        if let (Some(items), Some(elements)) = (&self.items, value.as_array()) {
            for (index, element) in elements.iter().enumerate() {
                items.validate(&format!("{}[{}]", field, index), element, violations);
            }
        }
    }
}

/// Schema of a tool's whole argument object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub kind: SchemaType,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl InputSchema {
    /// An object schema with no properties yet
    pub fn object() -> Self {
        Self {
            kind: SchemaType::Object,
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// Add an optional property
    pub fn optional(mut self, name: &str, schema: PropertySchema) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    /// Add a required property
    pub fn required(mut self, name: &str, schema: PropertySchema) -> Self {
        self.properties.insert(name.to_string(), schema);
        if !self.required.iter().any(|r| r == name) {
            self.required.push(name.to_string());
        }
        self
    }

    /// Check the schema itself is well formed
    pub fn check(&self) -> Result<(), SchemaError> {
        if self.kind != SchemaType::Object {
            return Err(SchemaError::NotAnObject(self.kind));
        }
        for (name, property) in &self.properties {
            if name.trim().is_empty() {
                return Err(SchemaError::EmptyPropertyName);
            }
            property.check(name)?;
        }
        for name in &self.required {
            if !self.properties.contains_key(name) {
                return Err(SchemaError::UndeclaredRequired(name.clone()));
            }
        }
        Ok(())
    }

    /// Check call arguments, returning every violation found.
    ///
    /// Required fields are checked first in declaration order, then declared
    /// properties by name. Undeclared properties are ignored, and `null` counts
    /// as absent.
    pub fn validate(&self, arguments: &Value) -> Vec<Violation> {
        let Some(object) = arguments.as_object() else {
            return vec![Violation::NotAnObject {
                found: json_type_name(arguments),
            }];
        };

        let mut violations = Vec::new();

        for name in &self.required {
            if object.get(name).map_or(true, Value::is_null) {
                violations.push(Violation::MissingField {
                    field: name.clone(),
                });
            }
        }

        for (name, property) in &self.properties {
            match object.get(name) {
                None | Some(Value::Null) => {}
                Some(value) => property.validate(name, value, &mut violations),
            }
        }

        violations
    }
}

/// A reason call arguments were rejected
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    NotAnObject {
        found: &'static str,
    },
    MissingField {
        field: String,
    },
    WrongType {
        field: String,
        expected: SchemaType,
        found: &'static str,
    },
    OutOfRange {
        field: String,
        value: f64,
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject { found } => {
                write!(f, "arguments must be an object, got {}", found)
            }
            Self::MissingField { field } => write!(f, "missing required field '{}'", field),
            Self::WrongType {
                field,
                expected,
                found,
            } => write!(f, "field '{}' must be {}, got {}", field, expected, found),
            Self::OutOfRange {
                field,
                value,
                minimum,
                maximum,
            } => match (minimum, maximum) {
                (Some(min), Some(max)) => write!(
                    f,
                    "field '{}' must be between {} and {}, got {}",
                    field, min, max, value
                ),
                (Some(min), None) => write!(f, "field '{}' must be >= {}, got {}", field, min, value),
                (None, Some(max)) => write!(f, "field '{}' must be <= {}, got {}", field, max, value),
                (None, None) => write!(f, "field '{}' is out of range: {}", field, value),
            },
        }
    }
}

/// A malformed schema, caught at registration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("input schema must be an object schema, got {0}")]
    NotAnObject(SchemaType),

    #[error("property names must not be empty")]
    EmptyPropertyName,

    #[error("required field '{0}' is not declared in properties")]
    UndeclaredRequired(String),

    #[error("invalid range on field '{field}'")]
    InvalidRange { field: String },

    #[error("array field '{field}' has no item schema")]
    MissingItems { field: String },
}
