//! Declarative parameter schemas for tools and structured output.
//!
//! A [`Schema`] is an ordered property list. It compiles to a JSON Schema
//! object for the wire and validates/coerces decoded argument maps on the
//! way back.

use crate::error::SchemaViolation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    /// An integer strictly greater than zero.
    PosInteger,
    Float,
    /// Any numeric value (integer or float).
    Number,
    Boolean,
    List(Box<FieldType>),
    Map,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            default: None,
            doc: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

/// An ordered property list. Field order is preserved through JSON Schema
/// emission.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Compile to a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required: Vec<Value> = Vec::new();
        for field in &self.fields {
            let mut prop = type_to_json_schema(&field.ty);
            if let Some(doc) = &field.doc {
                prop["description"] = Value::String(doc.clone());
            }
            if let Some(default) = &field.default {
                prop["default"] = default.clone();
            }
            properties.insert(field.name.clone(), prop);
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }
        let mut schema = serde_json::json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = Value::Array(required);
        }
        schema
    }

    /// Validate `value` against this schema. An empty violation list means
    /// the value conforms.
    pub fn validate(&self, value: &Value) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        let Some(obj) = value.as_object() else {
            violations.push(SchemaViolation::new("$", "expected an object"));
            return violations;
        };
        for field in &self.fields {
            match obj.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required && field.default.is_none() {
                        violations.push(SchemaViolation::new(
                            &field.name,
                            "required field is missing",
                        ));
                    }
                }
                Some(v) => check_type(&field.name, &field.ty, v, &mut violations),
            }
        }
        violations
    }

    /// Validate and coerce: fill declared defaults for absent fields, admit
    /// integer-valued floats for integer fields, and validate list items
    /// recursively. Unknown keys pass through untouched.
    pub fn coerce(&self, value: Value) -> Result<Value, Vec<SchemaViolation>> {
        let violations = self.validate(&value);
        if !violations.is_empty() {
            return Err(violations);
        }
        let mut obj = match value {
            Value::Object(m) => m,
            // validate() already rejected non-objects.
            other => return Ok(other),
        };
        for field in &self.fields {
            let missing = matches!(obj.get(&field.name), None | Some(Value::Null));
            if missing {
                if let Some(default) = &field.default {
                    obj.insert(field.name.clone(), default.clone());
                }
                continue;
            }
            if let Some(v) = obj.get_mut(&field.name) {
                coerce_in_place(&field.ty, v);
            }
        }
        Ok(Value::Object(obj))
    }
}

fn type_to_json_schema(ty: &FieldType) -> Value {
    match ty {
        FieldType::String => serde_json::json!({"type": "string"}),
        FieldType::Integer => serde_json::json!({"type": "integer"}),
        FieldType::PosInteger => serde_json::json!({"type": "integer", "minimum": 1}),
        FieldType::Float | FieldType::Number => serde_json::json!({"type": "number"}),
        FieldType::Boolean => serde_json::json!({"type": "boolean"}),
        FieldType::List(item) => serde_json::json!({
            "type": "array",
            "items": type_to_json_schema(item),
        }),
        FieldType::Map => serde_json::json!({"type": "object"}),
    }
}

fn check_type(path: &str, ty: &FieldType, v: &Value, out: &mut Vec<SchemaViolation>) {
    match ty {
        FieldType::String => {
            if !v.is_string() {
                out.push(SchemaViolation::new(path, "expected a string"));
            }
        }
        FieldType::Integer => {
            if !is_integerish(v) {
                out.push(SchemaViolation::new(path, "expected an integer"));
            }
        }
        FieldType::PosInteger => {
            if !is_integerish(v) {
                out.push(SchemaViolation::new(path, "expected a positive integer"));
            } else if integer_value(v).is_none_or(|n| n <= 0) {
                out.push(SchemaViolation::new(path, "expected a value > 0"));
            }
        }
        FieldType::Float | FieldType::Number => {
            if !v.is_number() {
                out.push(SchemaViolation::new(path, "expected a number"));
            }
        }
        FieldType::Boolean => {
            if !v.is_boolean() {
                out.push(SchemaViolation::new(path, "expected a boolean"));
            }
        }
        FieldType::List(item) => match v.as_array() {
            Some(items) => {
                for (i, it) in items.iter().enumerate() {
                    check_type(&format!("{path}[{i}]"), item, it, out);
                }
            }
            None => out.push(SchemaViolation::new(path, "expected an array")),
        },
        FieldType::Map => {
            if !v.is_object() {
                out.push(SchemaViolation::new(path, "expected an object"));
            }
        }
    }
}

/// Integers proper, plus floats with no fractional part (models frequently
/// emit `3.0` for integer fields).
fn is_integerish(v: &Value) -> bool {
    match v {
        Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => false,
    }
}

fn integer_value(v: &Value) -> Option<i64> {
    let n = v.as_number()?;
    n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))
}

fn coerce_in_place(ty: &FieldType, v: &mut Value) {
    match ty {
        FieldType::Integer | FieldType::PosInteger => {
            if let Some(f) = v.as_f64() {
                if v.as_i64().is_none() && f.fract() == 0.0 {
                    *v = Value::from(f as i64);
                }
            }
        }
        FieldType::List(item) => {
            if let Some(items) = v.as_array_mut() {
                for it in items {
                    coerce_in_place(item, it);
                }
            }
        }
        _ => {}
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
