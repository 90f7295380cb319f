//! Port schemas and payload validation.
//!
//! A schema declares what a port carries: its kind (streaming or value) and
//! its shape (an atomic tag or a flat struct of named atomic fields).
//! Payloads are [`serde_json::Value`]s validated against the shape at the
//! call site that introduces them (emit, feed, set_value).

use crate::error::{Result, WeftError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of data a port carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// An unbounded sequence of chunks terminated by end-of-stream.
    Streaming,
    /// A single latched value.
    Value,
}

impl PortKind {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Value => "value",
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Atomic payload tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomType {
    /// UTF-8 text.
    String,
    /// Whole number.
    Integer,
    /// Floating point (also accepts whole numbers).
    Float,
    /// True / false.
    Boolean,
    /// Binary data, rendered in JSON as a string or an array of bytes.
    Bytes,
    /// A mapping with arbitrary keys.
    Dict,
    /// An ordered sequence.
    List,
    /// Anything.
    Any,
}

impl AtomType {
    /// Get the string representation used in descriptions and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Bytes => "bytes",
            Self::Dict => "dict",
            Self::List => "list",
            Self::Any => "any",
        }
    }

    /// Check whether a payload satisfies this tag.
    ///
    /// `null` is accepted by every tag: absence of data is legal wherever
    /// data itself would be.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Bytes => match value {
                Value::String(_) => true,
                Value::Array(items) => items
                    .iter()
                    .all(|v| v.as_u64().map(|n| n <= u64::from(u8::MAX)).unwrap_or(false)),
                _ => false,
            },
            Self::Dict => value.is_object(),
            Self::List => value.is_array(),
            Self::Any => true,
        }
    }

    /// Structural tag equality with `any` acting as a wildcard on either side.
    pub fn matches(&self, other: &Self) -> bool {
        self == other || *self == Self::Any || *other == Self::Any
    }
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shape of a port's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaShape {
    /// A single atomic tag.
    Atom(AtomType),
    /// A flat struct: field name to atomic tag. Extra fields are rejected.
    Struct(BTreeMap<String, AtomType>),
}

impl fmt::Display for SchemaShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(tag) => write!(f, "{tag}"),
            Self::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (name, tag)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{name}\": {tag}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Full declaration of what a port carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSchema {
    /// Streaming or value.
    pub kind: PortKind,
    /// Payload shape.
    pub shape: SchemaShape,
}

impl PortSchema {
    /// Create a streaming schema with an atomic shape.
    pub fn streaming(tag: AtomType) -> Self {
        Self {
            kind: PortKind::Streaming,
            shape: SchemaShape::Atom(tag),
        }
    }

    /// Create a value schema with an atomic shape.
    pub fn value(tag: AtomType) -> Self {
        Self {
            kind: PortKind::Value,
            shape: SchemaShape::Atom(tag),
        }
    }

    /// Create a streaming schema with a struct shape.
    pub fn streaming_struct<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, AtomType)>,
        S: Into<String>,
    {
        Self {
            kind: PortKind::Streaming,
            shape: struct_shape(fields),
        }
    }

    /// Create a value schema with a struct shape.
    pub fn value_struct<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, AtomType)>,
        S: Into<String>,
    {
        Self {
            kind: PortKind::Value,
            shape: struct_shape(fields),
        }
    }

    /// Check whether this schema carries streams.
    pub fn is_streaming(&self) -> bool {
        self.kind == PortKind::Streaming
    }

    /// Validate a payload against this schema's shape.
    ///
    /// Returns a rendered cause on failure; callers attach node/port context.
    pub fn validate(&self, payload: &Value) -> std::result::Result<(), String> {
        match &self.shape {
            SchemaShape::Atom(tag) => {
                if tag.accepts(payload) {
                    Ok(())
                } else {
                    Err(format!(
                        "expected {tag}, got {}",
                        value_type_name(payload)
                    ))
                }
            }
            SchemaShape::Struct(fields) => {
                let map = payload.as_object().ok_or_else(|| {
                    format!("expected a mapping, got {}", value_type_name(payload))
                })?;
                for (name, tag) in fields {
                    let field = map
                        .get(name)
                        .ok_or_else(|| format!("missing required field '{name}'"))?;
                    if !tag.accepts(field) {
                        return Err(format!(
                            "field '{name}': expected {tag}, got {}",
                            value_type_name(field)
                        ));
                    }
                }
                for name in map.keys() {
                    if !fields.contains_key(name) {
                        return Err(format!("unexpected field '{name}'"));
                    }
                }
                Ok(())
            }
        }
    }

    /// Validate a payload, attaching node and port context to the error.
    pub fn validate_for(&self, payload: &Value, node_id: &str, port: &str) -> Result<()> {
        self.validate(payload).map_err(|cause| WeftError::Validation {
            node_id: node_id.to_string(),
            port: port.to_string(),
            cause,
        })
    }

    /// Structural schema equality.
    ///
    /// Kinds must be equal. Atomic shapes match with `any` as a wildcard;
    /// struct shapes must have identical field sets and per-field tags.
    pub fn matches(&self, other: &Self) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match (&self.shape, &other.shape) {
            (SchemaShape::Atom(a), SchemaShape::Atom(b)) => a.matches(b),
            (SchemaShape::Struct(a), SchemaShape::Struct(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for PortSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.shape)
    }
}

fn struct_shape<I, S>(fields: I) -> SchemaShape
where
    I: IntoIterator<Item = (S, AtomType)>,
    S: Into<String>,
{
    SchemaShape::Struct(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
