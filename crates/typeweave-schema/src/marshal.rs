//! Built-in marshal schemas.

use std::sync::Arc;

use typeweave_element::{Element, Mapping};

use crate::error::{ConversionResult, ResultExt};
use crate::namespace::NamespaceMarshalSchema;
use crate::priority::Registration;
use crate::registry::{MarshalContext, MarshalSchema};
use crate::unmarshal::NAMESPACE_PRIORITY;
use crate::value::Value;

struct NoneSchema;

impl MarshalSchema for NoneSchema {
    fn matches(&self, value: &Value) -> bool {
        matches!(value, Value::None)
    }

    fn marshal(&self, _value: &Value, _cx: &MarshalContext<'_>) -> ConversionResult<Element> {
        Ok(Element::Null)
    }
}

struct PrimitiveSchema;

impl MarshalSchema for PrimitiveSchema {
    fn matches(&self, value: &Value) -> bool {
        matches!(
            value,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        )
    }

    fn marshal(&self, value: &Value, cx: &MarshalContext<'_>) -> ConversionResult<Element> {
        Ok(match value {
            Value::Bool(b) => Element::Bool(*b),
            Value::Int(i) => Element::Int(*i),
            Value::Float(f) => Element::Float(*f),
            Value::Str(s) => Element::Str(s.clone()),
            other => return cx.marshal_inner(other),
        })
    }
}

struct ListSchema;

impl MarshalSchema for ListSchema {
    fn matches(&self, value: &Value) -> bool {
        matches!(value, Value::List(_))
    }

    fn marshal(&self, value: &Value, cx: &MarshalContext<'_>) -> ConversionResult<Element> {
        let Value::List(items) = value else {
            return cx.marshal_inner(value);
        };
        let mut elements = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            elements.push(cx.marshal(item).at(i.to_string())?);
        }
        Ok(Element::Seq(elements))
    }
}

/// Mappings marshal with stringified keys.
struct MapSchema;

impl MarshalSchema for MapSchema {
    fn matches(&self, value: &Value) -> bool {
        matches!(value, Value::Map(_))
    }

    fn marshal(&self, value: &Value, cx: &MarshalContext<'_>) -> ConversionResult<Element> {
        let Value::Map(map) = value else {
            return cx.marshal_inner(value);
        };
        let mut out = Mapping::with_capacity(map.len());
        for (key, item) in map {
            let key = key.to_string();
            let element = cx.marshal(item).at(key.as_str())?;
            out.insert(key, element);
        }
        Ok(Element::Map(out))
    }
}

/// Records marshal to a mapping of their fields in declaration order.
struct RecordSchema;

impl MarshalSchema for RecordSchema {
    fn matches(&self, value: &Value) -> bool {
        matches!(value, Value::Record(_))
    }

    fn marshal(&self, value: &Value, cx: &MarshalContext<'_>) -> ConversionResult<Element> {
        let Value::Record(record) = value else {
            return cx.marshal_inner(value);
        };
        let mut out = Mapping::with_capacity(record.fields().len());
        for (name, item) in record.fields() {
            out.insert(name.clone(), cx.marshal(item).at(name.as_str())?);
        }
        Ok(Element::Map(out))
    }
}

fn entry(
    registration: Registration,
    schema: impl MarshalSchema + 'static,
) -> (Registration, Arc<dyn MarshalSchema>) {
    (registration, Arc::new(schema))
}

pub(crate) fn builtins() -> Vec<(Registration, Arc<dyn MarshalSchema>)> {
    vec![
        entry(
            Registration::new("namespace").priority(NAMESPACE_PRIORITY),
            NamespaceMarshalSchema,
        ),
        entry(Registration::new("none"), NoneSchema),
        entry(Registration::new("primitive"), PrimitiveSchema),
        entry(Registration::new("list"), ListSchema),
        entry(Registration::new("map"), MapSchema),
        entry(Registration::new("record"), RecordSchema),
    ]
}

#[cfg(test)]
mod tests {
    use crate::{Engine, Field, Key, Record, TypeRef, Value};
    use typeweave_element::{Element, element_map};

    #[test]
    fn test_record_fields_in_order() {
        let ty = TypeRef::record("Server")
            .field(Field::new("host", &TypeRef::str()))
            .field(Field::new("port", &TypeRef::int()))
            .build();
        let record = Record::new(&ty).with("host", "localhost").with("port", 8080);
        let element = Engine::with_builtins().marshal(&record.into()).unwrap();
        insta::assert_snapshot!(element.to_string(), @r#"{"host": "localhost", "port": 8080}"#);
        let keys: Vec<_> = element.as_map().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["host", "port"]);
    }

    #[test]
    fn test_map_keys_stringified() {
        let value: Value = [(Key::Int(1), Value::from("a")), (Key::Bool(true), Value::None)]
            .into_iter()
            .collect();
        let element = Engine::with_builtins().marshal(&value).unwrap();
        assert_eq!(element, element_map! { "1" => "a", "true" => Element::Null });
    }

    #[test]
    fn test_nested_list() {
        let value = Value::from(vec![Value::from(vec![1, 2]), Value::None]);
        let element = Engine::with_builtins().marshal(&value).unwrap();
        assert_eq!(
            element,
            Element::from(vec![Element::from(vec![1, 2]), Element::Null])
        );
    }
}
