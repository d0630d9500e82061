//! Native values produced by unmarshalling and consumed by marshalling.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::types::TypeRef;

/// A hashable mapping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{}", b),
            Key::Int(i) => write!(f, "{}", i),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Key::Bool(value)
    }
}

/// An instance of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    ty: TypeRef,
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new(ty: &TypeRef) -> Self {
        Self {
            ty: ty.clone(),
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn from_fields(ty: &TypeRef, fields: IndexMap<String, Value>) -> Self {
        Self {
            ty: ty.clone(),
            fields,
        }
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> IndexMap<String, Value> {
        self.fields
    }
}

/// A native value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<Key, Value>),
    Record(Record),
}

impl Value {
    /// Runtime type name, used in marshal errors.
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Record(record) => record.ty().name(),
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to a mapping key when the value is hashable.
    pub fn to_key(&self) -> Option<Key> {
        match self {
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Str(s) => Some(Key::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(value)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Bool(b) => Value::Bool(b),
            Key::Int(i) => Value::Int(i),
            Key::Str(s) => Value::Str(s),
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

impl FromIterator<(Key, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        let ty = TypeRef::record("Point").build();
        assert_eq!(Value::Record(Record::new(&ty)).type_name(), "Point");
        assert_eq!(Value::from(vec![1, 2]).type_name(), "list");
        assert_eq!(Value::None.type_name(), "None");
    }

    #[test]
    fn test_record_builder() {
        let ty = TypeRef::record("Point").build();
        let record = Record::new(&ty).with("x", 1).with("y", 2.5);
        assert_eq!(record.get("x"), Some(&Value::Int(1)));
        assert_eq!(record.get("y"), Some(&Value::Float(2.5)));
        assert_eq!(record.get("z"), None);
    }

    #[test]
    fn test_records_of_different_types_differ() {
        let a = TypeRef::record("A").build();
        let b = TypeRef::record("B").build();
        assert_ne!(Record::new(&a), Record::new(&b));
    }

    #[test]
    fn test_keys() {
        assert_eq!(Value::from("k").to_key(), Some(Key::from("k")));
        assert_eq!(Value::Float(1.0).to_key(), None);
    }
}
