//! Back-end neutral SQL values, named parameters and result records.
//!
//! # Responsibility
//! - Give the execution engine one value shape to bind and return.
//! - Bridge SQL values and `serde_json::Value` for entity field access.
//!
//! # Invariants
//! - Parameter names are stored without a prefix; drivers add `@`/`:`/`$`.
//! - `Record` keeps columns in the order the engine returned them.

use crate::error::{Error, Result};
use crate::schema::FieldKind;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number};
use uuid::Uuid;

/// One SQL value as bound to a statement or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts a serde field value into a bindable SQL value.
    ///
    /// Arrays and objects are stored as their JSON text. Integers beyond the
    /// `i64` range are a mapping error.
    pub fn from_json(value: &serde_json::Value) -> Result<Value> {
        let converted = match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(flag) => Value::Integer(i64::from(*flag)),
            serde_json::Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Value::Integer(int)
                } else if number.is_u64() {
                    return Err(Error::Mapping(format!(
                        "integer {number} does not fit a signed 64-bit column"
                    )));
                } else {
                    Value::Real(number.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(text) => Value::Text(text.clone()),
            other => Value::Text(other.to_string()),
        };
        Ok(converted)
    }

    /// [`Value::from_json`] for a field declared with `kind`.
    pub fn from_json_as(value: &serde_json::Value, kind: FieldKind) -> Result<Value> {
        match (kind, value) {
            (FieldKind::Blob, serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|byte| u8::try_from(byte).ok())
                        .ok_or_else(|| {
                            Error::Mapping(format!("blob element {item} is not a byte"))
                        })
                })
                .collect::<Result<Vec<u8>>>()
                .map(Value::Blob),
            _ => Self::from_json(value),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(int) => serde_json::Value::Number(Number::from(*int)),
            Value::Real(real) => Number::from_f64(*real)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(text) => serde_json::Value::String(text.clone()),
            Value::Blob(bytes) => serde_json::Value::Array(
                bytes
                    .iter()
                    .map(|byte| serde_json::Value::Number(Number::from(*byte)))
                    .collect(),
            ),
        }
    }

    /// [`Value::to_json`] for a field declared with `kind`.
    pub fn to_json_as(&self, kind: FieldKind) -> serde_json::Value {
        match (kind, self) {
            (FieldKind::Bool, Value::Integer(int)) => serde_json::Value::Bool(*int != 0),
            _ => self.to_json(),
        }
    }

    /// Decodes this value into any deserializable type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(Error::from)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Text(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Ordered named parameters for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<(String, Value)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces one named parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(current, _)| *current == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(current, _)| current == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One result row as returned by the execution engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.columns.push((column.into(), value));
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value.into());
        self
    }

    /// Looks up a column by name, ignoring ASCII case.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn first_value(&self) -> Option<&Value> {
        self.columns.first().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Decodes the row by column name into any deserializable type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let object = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<Map<_, _>>();
        serde_json::from_value(serde_json::Value::Object(object)).map_err(Error::from)
    }

    pub(crate) fn into_columns(self) -> Vec<(String, Value)> {
        self.columns
    }
}
