//! Sequence, tuple and mapping schemas.

use std::sync::Arc;

use indexmap::IndexMap;
use typeweave_element::Element;

use super::{doc_of, unsupported};
use crate::doc::Doc;
use crate::engine::Engine;
use crate::error::{ConversionError, ConversionResult, ResultExt};
use crate::registry::{SchemaRef, UnmarshalContext, UnmarshalSchema, UnmarshalSchemaKind};
use crate::types::{TypeKind, TypeRef};
use crate::value::Value;

/// Claims `list[T]`.
pub struct SequenceKind;

struct SequenceSchema {
    target: TypeRef,
    item: TypeRef,
}

impl UnmarshalSchemaKind for SequenceKind {
    fn matches(&self, ty: &TypeRef) -> bool {
        matches!(ty.kind(), TypeKind::Sequence(_))
    }

    fn build(
        &self,
        ty: &TypeRef,
        _inner: Option<SchemaRef>,
        _: &Engine,
    ) -> ConversionResult<SchemaRef> {
        let TypeKind::Sequence(item) = ty.kind() else {
            return Err(unsupported(ty, "not a sequence type"));
        };
        Ok(Arc::new(SequenceSchema {
            target: ty.clone(),
            item: item.clone(),
        }))
    }
}

impl UnmarshalSchema for SequenceSchema {
    fn target(&self) -> &TypeRef {
        &self.target
    }

    fn unmarshal(&self, element: &Element, cx: &UnmarshalContext<'_>) -> ConversionResult<Value> {
        let items = match element {
            Element::Missing => return Ok(Value::List(Vec::new())),
            Element::Seq(items) => items,
            other => {
                return Err(ConversionError::type_mismatch(
                    self.target.name(),
                    other.kind_name(),
                ));
            }
        };
        let mut values = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            values.push(cx.unmarshal(&self.item, item, None).at(i.to_string())?);
        }
        Ok(Value::List(values))
    }

    fn doc(&self, engine: &Engine, depth: usize) -> Doc {
        let doc = Doc::new(self.target.name());
        if depth == 0 {
            return doc;
        }
        doc.with_member(doc_of(engine, &self.item, depth - 1))
    }

    fn child(&self, segment: &str, _: &Engine) -> Option<TypeRef> {
        segment.parse::<i64>().ok().map(|_| self.item.clone())
    }
}

/// Claims fixed-length `tuple[A, B, ...]`.
pub struct TupleKind;

struct TupleSchema {
    target: TypeRef,
    items: Vec<TypeRef>,
}

impl UnmarshalSchemaKind for TupleKind {
    fn matches(&self, ty: &TypeRef) -> bool {
        matches!(ty.kind(), TypeKind::Tuple(_))
    }

    fn build(
        &self,
        ty: &TypeRef,
        _inner: Option<SchemaRef>,
        _: &Engine,
    ) -> ConversionResult<SchemaRef> {
        let TypeKind::Tuple(items) = ty.kind() else {
            return Err(unsupported(ty, "not a tuple type"));
        };
        Ok(Arc::new(TupleSchema {
            target: ty.clone(),
            items: items.clone(),
        }))
    }
}

impl UnmarshalSchema for TupleSchema {
    fn target(&self) -> &TypeRef {
        &self.target
    }

    fn unmarshal(&self, element: &Element, cx: &UnmarshalContext<'_>) -> ConversionResult<Value> {
        let items = match element {
            Element::Missing => return Err(ConversionError::missing(self.target.name())),
            Element::Seq(items) => items,
            other => {
                return Err(ConversionError::type_mismatch(
                    self.target.name(),
                    other.kind_name(),
                ));
            }
        };
        if items.len() != self.items.len() {
            return Err(ConversionError::conversion(
                self.target.name(),
                format!("expected {} items, got {}", self.items.len(), items.len()),
            ));
        }
        let mut values = Vec::with_capacity(items.len());
        for (i, (ty, item)) in self.items.iter().zip(items).enumerate() {
            values.push(cx.unmarshal(ty, item, None).at(i.to_string())?);
        }
        Ok(Value::List(values))
    }

    fn doc(&self, engine: &Engine, depth: usize) -> Doc {
        let mut doc = Doc::new(self.target.name());
        if depth > 0 {
            for item in &self.items {
                doc = doc.with_member(doc_of(engine, item, depth - 1));
            }
        }
        doc
    }

    fn child(&self, segment: &str, _: &Engine) -> Option<TypeRef> {
        let index = segment.parse::<usize>().ok()?;
        self.items.get(index).cloned()
    }
}

/// Claims `dict[K, V]`. Keys arrive as strings and are converted with the
/// key type, so `dict[int, str]` accepts `{"1": "a"}`.
pub struct MappingKind;

struct MappingSchema {
    target: TypeRef,
    key: TypeRef,
    value: TypeRef,
}

impl UnmarshalSchemaKind for MappingKind {
    fn matches(&self, ty: &TypeRef) -> bool {
        matches!(ty.kind(), TypeKind::Mapping { .. })
    }

    fn build(
        &self,
        ty: &TypeRef,
        _inner: Option<SchemaRef>,
        _: &Engine,
    ) -> ConversionResult<SchemaRef> {
        let TypeKind::Mapping { key, value } = ty.kind() else {
            return Err(unsupported(ty, "not a mapping type"));
        };
        Ok(Arc::new(MappingSchema {
            target: ty.clone(),
            key: key.clone(),
            value: value.clone(),
        }))
    }
}

impl UnmarshalSchema for MappingSchema {
    fn target(&self) -> &TypeRef {
        &self.target
    }

    fn unmarshal(&self, element: &Element, cx: &UnmarshalContext<'_>) -> ConversionResult<Value> {
        let map = match element {
            Element::Missing => return Ok(Value::Map(IndexMap::new())),
            Element::Map(map) => map,
            other => {
                return Err(ConversionError::type_mismatch(
                    self.target.name(),
                    other.kind_name(),
                ));
            }
        };
        let mut values = IndexMap::with_capacity(map.len());
        for (raw_key, item) in map {
            let key = cx
                .unmarshal(&self.key, &Element::Str(raw_key.clone()), None)
                .at(raw_key.as_str())?;
            let key = key.to_key().ok_or_else(|| {
                ConversionError::conversion(
                    self.key.name(),
                    format!("{} cannot be used as a mapping key", key.type_name()),
                )
                .at(raw_key.as_str())
            })?;
            let value = cx.unmarshal(&self.value, item, None).at(raw_key.as_str())?;
            values.insert(key, value);
        }
        Ok(Value::Map(values))
    }

    fn doc(&self, engine: &Engine, depth: usize) -> Doc {
        let doc = Doc::new(self.target.name());
        if depth == 0 {
            return doc;
        }
        doc.with_member(doc_of(engine, &self.value, depth - 1))
    }

    fn child(&self, _segment: &str, _: &Engine) -> Option<TypeRef> {
        Some(self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Engine, ErrorKind, Key, TypeRef, Value};
    use typeweave_element::{Element, element_map};

    #[test]
    fn test_sequence_items_and_paths() {
        let engine = Engine::with_builtins();
        let ty = TypeRef::sequence(&TypeRef::int());
        assert_eq!(
            engine.unmarshal(&ty, &Element::from(vec!["1", "2"])).unwrap(),
            Value::from(vec![1, 2])
        );
        let err = engine
            .unmarshal(&ty, &Element::from(vec![Element::from(1), Element::from("x")]))
            .unwrap_err();
        assert_eq!(err.path.to_string(), "1");
    }

    #[test]
    fn test_missing_collections_are_empty() {
        let engine = Engine::with_builtins();
        let list = TypeRef::sequence(&TypeRef::str());
        let dict = TypeRef::mapping(&TypeRef::str(), &TypeRef::int());
        assert_eq!(engine.unmarshal(&list, &Element::Missing).unwrap(), Value::List(Vec::new()));
        assert_eq!(
            engine.unmarshal(&dict, &Element::Missing).unwrap(),
            Value::Map(Default::default())
        );
    }

    #[test]
    fn test_tuple_length_checked() {
        let engine = Engine::with_builtins();
        let ty = TypeRef::tuple(&[TypeRef::str(), TypeRef::int()]);
        let value = engine.unmarshal(&ty, &Element::from(vec!["a", "3"])).unwrap();
        assert_eq!(value, Value::List(vec![Value::from("a"), Value::Int(3)]));

        let err = engine.unmarshal(&ty, &Element::from(vec!["a"])).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Unmarshal error at (root): Cannot convert to tuple[str, int]: expected 2 items, got 1"
        );
    }

    #[test]
    fn test_mapping_keys_use_key_type() {
        let engine = Engine::with_builtins();
        let ty = TypeRef::mapping(&TypeRef::int(), &TypeRef::str());
        let value = engine.unmarshal(&ty, &element_map! { "1" => "one" }).unwrap();
        let Value::Map(map) = value else {
            panic!("expected a map");
        };
        assert_eq!(map.get(&Key::Int(1)), Some(&Value::from("one")));

        let err = engine.unmarshal(&ty, &element_map! { "x" => "one" }).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ConversionFailure { .. }));
        assert_eq!(err.path.to_string(), "x");
    }

    #[test]
    fn test_mapping_rejects_sequence() {
        let engine = Engine::with_builtins();
        let ty = TypeRef::mapping(&TypeRef::str(), &TypeRef::int());
        let err = engine.unmarshal(&ty, &Element::from(vec![1])).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::TypeMismatch {
                expected: "dict[str, int]".to_string(),
                got: "sequence".to_string(),
            }
        );
    }
}
