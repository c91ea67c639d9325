use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Generic runtime value type for item attributes.
///
/// Supports all JSON-compatible types plus binary data. Used as the
/// attribute value type in [`Item`] and as the source for typed key
/// scalars ([`KeyValue`](crate::key::KeyValue)).
///
/// Serializes via serde for both JSON fixtures and `MsgPack` cursor
/// tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// Binary data (not directly representable in JSON).
    Bytes(Vec<u8>),
    /// JSON array (ordered sequence of values).
    Array(Vec<Value>),
    /// JSON object (ordered map of string keys to values).
    /// Uses `BTreeMap` for deterministic serialization order.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Short name of this value's type, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Renders this value as a `serde_json::Value`.
    ///
    /// Binary data becomes a standard-base64 string; non-finite floats
    /// become JSON null, since JSON has no representation for them.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(STANDARD.encode(b)),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Converts a `serde_json::Value` into a [`Value`].
    ///
    /// Numbers that fit in `i64` become [`Value::Int`]; all other numbers
    /// become [`Value::Float`].
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_i64().map_or_else(
                || Value::Float(n.as_f64().unwrap_or(f64::NAN)),
                Value::Int,
            ),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// A stored item: mapping from attribute name to typed value.
///
/// `BTreeMap` keeps attribute order deterministic across serialization.
pub type Item = BTreeMap<String, Value>;
