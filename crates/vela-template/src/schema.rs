//! Parameter schema declared by a template and the validation pass that
//! runs before evaluation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RenderError;
use crate::expr::type_name;

/// Declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    String,
    Integer,
    Number,
    Boolean,
    Any,
    Array,
    Map,
    Object,
}

impl SchemaKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Any => "any",
            Self::Array => "array",
            Self::Map => "map",
            Self::Object => "object",
        }
    }
}

/// Schema for a single parameter field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamSchema {
    #[serde(rename = "type")]
    pub kind: SchemaKind,

    /// Element schema for `array`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParamSchema>>,

    /// Value schema for `map`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Box<ParamSchema>>,

    /// Field schemas for `object`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, ParamSchema>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,

    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

impl ParamSchema {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            items: None,
            values: None,
            properties: BTreeMap::new(),
            default: None,
            optional: false,
            allowed: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn with_items(mut self, items: ParamSchema) -> Self {
        self.items = Some(Box::new(items));
        self
    }
}

/// Validates `params` against the declared fields and returns the
/// parameter object with defaults filled in.
///
/// Values are never coerced: `"3"` is not an integer. Fields the schema
/// does not declare are rejected. A `null` value counts as absent.
pub fn validate_parameters(
    fields: &BTreeMap<String, ParamSchema>,
    params: &Value,
) -> Result<Value, RenderError> {
    let empty = Map::new();
    let supplied = match params {
        Value::Null => &empty,
        Value::Object(map) => map,
        other => {
            return Err(RenderError::type_mismatch(
                "parameter",
                "object",
                type_name(other),
            ));
        }
    };
    validate_fields(fields, supplied, "")
}

fn validate_fields(
    fields: &BTreeMap<String, ParamSchema>,
    supplied: &Map<String, Value>,
    prefix: &str,
) -> Result<Value, RenderError> {
    if let Some(unknown) = supplied.keys().find(|k| !fields.contains_key(k.as_str())) {
        return Err(RenderError::UnknownParameter {
            path: join(prefix, unknown),
        });
    }

    let mut out = Map::new();
    for (name, schema) in fields {
        let path = join(prefix, name);
        match supplied.get(name).filter(|v| !v.is_null()) {
            Some(value) => {
                out.insert(name.clone(), validate_value(schema, value, &path)?);
            }
            None => match &schema.default {
                Some(default) => {
                    out.insert(name.clone(), default.clone());
                }
                None if schema.optional => {}
                None => return Err(RenderError::MissingParameter { path }),
            },
        }
    }
    Ok(Value::Object(out))
}

fn validate_value(schema: &ParamSchema, value: &Value, path: &str) -> Result<Value, RenderError> {
    let mismatch = || RenderError::type_mismatch(path, schema.kind.as_str(), type_name(value));

    let checked = match schema.kind {
        SchemaKind::Any => value.clone(),
        SchemaKind::String if value.is_string() => value.clone(),
        SchemaKind::Integer if value.is_i64() || value.is_u64() => value.clone(),
        SchemaKind::Number if value.is_number() => value.clone(),
        SchemaKind::Boolean if value.is_boolean() => value.clone(),
        SchemaKind::Array => {
            let items = value.as_array().ok_or_else(mismatch)?;
            match &schema.items {
                Some(item_schema) => Value::Array(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| validate_value(item_schema, item, &format!("{path}[{i}]")))
                        .collect::<Result<_, _>>()?,
                ),
                None => value.clone(),
            }
        }
        SchemaKind::Map => {
            let entries = value.as_object().ok_or_else(mismatch)?;
            match &schema.values {
                Some(value_schema) => Value::Object(
                    entries
                        .iter()
                        .map(|(k, v)| {
                            validate_value(value_schema, v, &join(path, k)).map(|v| (k.clone(), v))
                        })
                        .collect::<Result<_, _>>()?,
                ),
                None => value.clone(),
            }
        }
        SchemaKind::Object => {
            let entries = value.as_object().ok_or_else(mismatch)?;
            validate_fields(&schema.properties, entries, path)?
        }
        _ => return Err(mismatch()),
    };

    if let Some(allowed) = &schema.allowed {
        if !allowed.contains(&checked) {
            let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Err(RenderError::InvalidParameter {
                path: path.to_string(),
                message: format!("value {checked} is not one of [{}]", options.join(", ")),
            });
        }
    }
    Ok(checked)
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
