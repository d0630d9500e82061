//! Bridges between [`Element`] and external tree representations.
//!
//! The core never reads files. Callers parse JSON or YAML themselves and hand
//! over the resulting tree; these conversions turn it into an `Element`.

use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use yaml_rust2::Yaml;

use crate::element::{Element, Mapping};
use crate::error::ElementError;
use crate::path::Path;

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Element::Missing => Err(serde::ser::Error::custom(
                "missing values cannot be serialized",
            )),
            Element::Null => serializer.serialize_unit(),
            Element::Bool(b) => serializer.serialize_bool(*b),
            Element::Int(i) => serializer.serialize_i64(*i),
            Element::Float(x) => serializer.serialize_f64(*x),
            Element::Str(s) => serializer.serialize_str(s),
            Element::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Element::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

struct ElementVisitor;

impl<'de> Visitor<'de> for ElementVisitor {
    type Value = Element;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a JSON-like value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Element, E> {
        Ok(Element::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Element, E> {
        Ok(Element::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Element, D::Error> {
        Deserialize::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Element, E> {
        Ok(Element::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Element, E> {
        Ok(Element::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Element, E> {
        match i64::try_from(v) {
            Ok(i) => Ok(Element::Int(i)),
            Err(_) => Ok(Element::Float(v as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Element, E> {
        Ok(Element::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Element, E> {
        Ok(Element::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Element, E> {
        Ok(Element::Str(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Element, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Element::Seq(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Element, A::Error> {
        let mut map = Mapping::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, Element>()? {
            map.insert(key, value);
        }
        Ok(Element::Map(map))
    }
}

impl<'de> Deserialize<'de> for Element {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ElementVisitor)
    }
}

impl From<serde_json::Value> for Element {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Element::Null,
            serde_json::Value::Bool(b) => Element::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Element::Int(i),
                None => Element::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Element::Str(s),
            serde_json::Value::Array(items) => {
                Element::Seq(items.into_iter().map(Element::from).collect())
            }
            serde_json::Value::Object(map) => {
                Element::Map(map.into_iter().map(|(k, v)| (k, Element::from(v))).collect())
            }
        }
    }
}

impl TryFrom<&Element> for serde_json::Value {
    type Error = ElementError;

    fn try_from(element: &Element) -> Result<Self, Self::Error> {
        to_json(element, &mut Path::root())
    }
}

fn to_json(element: &Element, path: &mut Path) -> Result<serde_json::Value, ElementError> {
    Ok(match element {
        Element::Missing => {
            return Err(ElementError::Conversion {
                path: path.clone(),
                message: "missing values have no JSON representation".to_string(),
            });
        }
        Element::Null => serde_json::Value::Null,
        Element::Bool(b) => serde_json::Value::Bool(*b),
        Element::Int(i) => serde_json::Value::from(*i),
        Element::Float(x) => serde_json::Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .ok_or_else(|| ElementError::Conversion {
                path: path.clone(),
                message: format!("{} is not a finite number", x),
            })?,
        Element::Str(s) => serde_json::Value::String(s.clone()),
        Element::Seq(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                path.push(i.to_string());
                let value = to_json(item, path);
                path.pop();
                out.push(value?);
            }
            serde_json::Value::Array(out)
        }
        Element::Map(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                path.push(key.clone());
                let converted = to_json(value, path);
                path.pop();
                out.insert(key.clone(), converted?);
            }
            serde_json::Value::Object(out)
        }
    })
}

impl Element {
    /// Convert an already-parsed YAML document into an element tree.
    ///
    /// Non-string keys are rendered to their textual form. Aliases and bad
    /// values are rejected.
    pub fn from_yaml(yaml: &Yaml) -> Result<Element, ElementError> {
        from_yaml_at(yaml, &mut Path::root())
    }
}

fn from_yaml_at(yaml: &Yaml, path: &mut Path) -> Result<Element, ElementError> {
    Ok(match yaml {
        Yaml::Null => Element::Null,
        Yaml::Boolean(b) => Element::Bool(*b),
        Yaml::Integer(i) => Element::Int(*i),
        Yaml::Real(_) => match yaml.as_f64() {
            Some(x) => Element::Float(x),
            None => {
                return Err(ElementError::Conversion {
                    path: path.clone(),
                    message: format!("invalid real number {:?}", yaml),
                });
            }
        },
        Yaml::String(s) => Element::Str(s.clone()),
        Yaml::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                path.push(i.to_string());
                let converted = from_yaml_at(item, path);
                path.pop();
                out.push(converted?);
            }
            Element::Seq(out)
        }
        Yaml::Hash(hash) => {
            let mut map = Mapping::with_capacity(hash.len());
            for (key, value) in hash {
                let key = yaml_key(key, path)?;
                path.push(key.clone());
                let converted = from_yaml_at(value, path);
                path.pop();
                map.insert(key, converted?);
            }
            Element::Map(map)
        }
        Yaml::Alias(_) | Yaml::BadValue => {
            return Err(ElementError::Conversion {
                path: path.clone(),
                message: "YAML aliases and invalid values are not supported".to_string(),
            });
        }
    })
}

fn yaml_key(key: &Yaml, path: &Path) -> Result<String, ElementError> {
    match key {
        Yaml::String(s) | Yaml::Real(s) => Ok(s.clone()),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Boolean(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        other => Err(ElementError::Conversion {
            path: path.clone(),
            message: format!("unsupported mapping key {:?}", other),
        }),
    }
}
