//! Schemas for `None`, primitives, `Any` and string choices.
//!
//! Primitive conversion is lenient in the way configuration files need:
//! `"3"` is an int, `1` is a float, `yes` is a bool. Anything that cannot
//! be read losslessly is a conversion failure.

use std::sync::Arc;

use indexmap::IndexMap;
use typeweave_element::Element;

use super::unsupported;
use crate::doc::Doc;
use crate::engine::Engine;
use crate::error::{ConversionError, ConversionResult, ErrorKind};
use crate::registry::{SchemaRef, UnmarshalContext, UnmarshalSchema, UnmarshalSchemaKind};
use crate::suggest;
use crate::types::{TypeKind, TypeRef};
use crate::value::{Key, Value};

/// Claims the `None` type.
pub struct NoneKind;

struct NoneSchema {
    target: TypeRef,
}

impl UnmarshalSchemaKind for NoneKind {
    fn matches(&self, ty: &TypeRef) -> bool {
        matches!(ty.kind(), TypeKind::None)
    }

    fn build(
        &self,
        ty: &TypeRef,
        _inner: Option<SchemaRef>,
        _: &Engine,
    ) -> ConversionResult<SchemaRef> {
        Ok(Arc::new(NoneSchema { target: ty.clone() }))
    }
}

impl UnmarshalSchema for NoneSchema {
    fn target(&self) -> &TypeRef {
        &self.target
    }

    fn unmarshal(&self, element: &Element, _cx: &UnmarshalContext<'_>) -> ConversionResult<Value> {
        match element {
            Element::Missing | Element::Null => Ok(Value::None),
            other => Err(ConversionError::type_mismatch("None", other.kind_name())),
        }
    }

    fn doc(&self, _: &Engine, _depth: usize) -> Doc {
        Doc::new("None")
    }
}

/// Claims `bool`, `int`, `float` and `str`.
pub struct PrimitiveKind;

#[derive(Clone, Copy)]
enum Primitive {
    Bool,
    Int,
    Float,
    Str,
}

struct PrimitiveSchema {
    target: TypeRef,
    primitive: Primitive,
}

impl UnmarshalSchemaKind for PrimitiveKind {
    fn matches(&self, ty: &TypeRef) -> bool {
        matches!(
            ty.kind(),
            TypeKind::Bool | TypeKind::Int | TypeKind::Float | TypeKind::Str
        )
    }

    fn build(
        &self,
        ty: &TypeRef,
        _inner: Option<SchemaRef>,
        _: &Engine,
    ) -> ConversionResult<SchemaRef> {
        let primitive = match ty.kind() {
            TypeKind::Bool => Primitive::Bool,
            TypeKind::Int => Primitive::Int,
            TypeKind::Float => Primitive::Float,
            TypeKind::Str => Primitive::Str,
            _ => return Err(unsupported(ty, "not a primitive type")),
        };
        Ok(Arc::new(PrimitiveSchema {
            target: ty.clone(),
            primitive,
        }))
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "y" | "yes" | "on" => Some(true),
        "false" | "0" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn integral(f: f64) -> Option<i64> {
    // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive.
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().and_then(integral))
}

impl PrimitiveSchema {
    fn convert(&self, element: &Element) -> Result<Value, String> {
        let fail = || format!("cannot read {} as {}", element, self.target.name());
        match (self.primitive, element) {
            (Primitive::Bool, Element::Bool(b)) => Ok(Value::Bool(*b)),
            (Primitive::Bool, Element::Int(0)) => Ok(Value::Bool(false)),
            (Primitive::Bool, Element::Int(1)) => Ok(Value::Bool(true)),
            (Primitive::Bool, Element::Str(s)) => parse_bool(s).map(Value::Bool).ok_or_else(fail),

            (Primitive::Int, Element::Int(i)) => Ok(Value::Int(*i)),
            (Primitive::Int, Element::Float(f)) => integral(*f).map(Value::Int).ok_or_else(fail),
            (Primitive::Int, Element::Str(s)) => parse_int(s).map(Value::Int).ok_or_else(fail),

            (Primitive::Float, Element::Float(f)) => Ok(Value::Float(*f)),
            (Primitive::Float, Element::Int(i)) => Ok(Value::Float(*i as f64)),
            (Primitive::Float, Element::Str(s)) => {
                s.trim().parse::<f64>().map(Value::Float).map_err(|_| fail())
            }

            (Primitive::Str, Element::Str(s)) => Ok(Value::Str(s.clone())),
            (Primitive::Str, Element::Bool(b)) => Ok(Value::Str(b.to_string())),
            (Primitive::Str, Element::Int(i)) => Ok(Value::Str(i.to_string())),
            (Primitive::Str, Element::Float(f)) => Ok(Value::Str(f.to_string())),

            _ => Err(fail()),
        }
    }
}

impl UnmarshalSchema for PrimitiveSchema {
    fn target(&self) -> &TypeRef {
        &self.target
    }

    fn unmarshal(&self, element: &Element, _cx: &UnmarshalContext<'_>) -> ConversionResult<Value> {
        match element {
            Element::Missing => Err(ConversionError::missing(self.target.name())),
            Element::Null | Element::Seq(_) | Element::Map(_) => Err(
                ConversionError::type_mismatch(self.target.name(), element.kind_name()),
            ),
            scalar => self
                .convert(scalar)
                .map_err(|reason| ConversionError::conversion(self.target.name(), reason)),
        }
    }

    fn doc(&self, _: &Engine, _depth: usize) -> Doc {
        Doc::new(self.target.name())
    }
}

/// Claims `Any`: the element is returned as an untyped value.
pub struct AnyKind;

struct AnySchema {
    target: TypeRef,
}

impl UnmarshalSchemaKind for AnyKind {
    fn matches(&self, ty: &TypeRef) -> bool {
        matches!(ty.kind(), TypeKind::Any)
    }

    fn build(
        &self,
        ty: &TypeRef,
        _inner: Option<SchemaRef>,
        _: &Engine,
    ) -> ConversionResult<SchemaRef> {
        Ok(Arc::new(AnySchema { target: ty.clone() }))
    }
}

fn untyped(element: &Element) -> ConversionResult<Value> {
    let value = match element {
        Element::Missing => return Err(ConversionError::missing("Any")),
        Element::Null => Value::None,
        Element::Bool(b) => Value::Bool(*b),
        Element::Int(i) => Value::Int(*i),
        Element::Float(f) => Value::Float(*f),
        Element::Str(s) => Value::Str(s.clone()),
        Element::Seq(items) => {
            let mut list = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                list.push(untyped(item).map_err(|err| err.at(i.to_string()))?);
            }
            Value::List(list)
        }
        Element::Map(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (key, item) in map {
                let item = untyped(item).map_err(|err| err.at(key.as_str()))?;
                out.insert(Key::Str(key.clone()), item);
            }
            Value::Map(out)
        }
    };
    Ok(value)
}

impl UnmarshalSchema for AnySchema {
    fn target(&self) -> &TypeRef {
        &self.target
    }

    fn unmarshal(&self, element: &Element, _cx: &UnmarshalContext<'_>) -> ConversionResult<Value> {
        untyped(element)
    }

    fn doc(&self, _: &Engine, _depth: usize) -> Doc {
        Doc::new("Any")
    }
}

/// Claims literal choices.
pub struct ChoiceKind;

struct ChoiceSchema {
    target: TypeRef,
    allowed: Vec<String>,
}

impl UnmarshalSchemaKind for ChoiceKind {
    fn matches(&self, ty: &TypeRef) -> bool {
        matches!(ty.kind(), TypeKind::Choice(_))
    }

    fn build(
        &self,
        ty: &TypeRef,
        _inner: Option<SchemaRef>,
        _: &Engine,
    ) -> ConversionResult<SchemaRef> {
        let TypeKind::Choice(allowed) = ty.kind() else {
            return Err(unsupported(ty, "not a choice type"));
        };
        Ok(Arc::new(ChoiceSchema {
            target: ty.clone(),
            allowed: allowed.clone(),
        }))
    }
}

impl UnmarshalSchema for ChoiceSchema {
    fn target(&self) -> &TypeRef {
        &self.target
    }

    fn unmarshal(&self, element: &Element, _cx: &UnmarshalContext<'_>) -> ConversionResult<Value> {
        let value = match element {
            Element::Missing => return Err(ConversionError::missing(self.target.name())),
            Element::Str(s) => s.clone(),
            Element::Bool(_) | Element::Int(_) | Element::Float(_) => element.to_string(),
            other => {
                return Err(ConversionError::type_mismatch(
                    self.target.name(),
                    other.kind_name(),
                ));
            }
        };
        if self.allowed.contains(&value) {
            return Ok(Value::Str(value));
        }
        let suggestion = suggest::closest(&value, self.allowed.iter().map(String::as_str));
        Err(ConversionError::new(ErrorKind::InvalidChoice {
            value,
            allowed: self.allowed.clone(),
            suggestion,
        }))
    }

    fn doc(&self, _: &Engine, _depth: usize) -> Doc {
        Doc::new(self.target.name())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Engine, ErrorKind, Key, TypeRef, Value};
    use typeweave_element::{Element, element_map};

    fn engine() -> Engine {
        Engine::with_builtins()
    }

    #[test]
    fn test_lenient_primitives() {
        let engine = engine();
        let cases = [
            (TypeRef::int(), Element::from("3"), Value::Int(3)),
            (TypeRef::int(), Element::from(4.0), Value::Int(4)),
            (TypeRef::float(), Element::from(2), Value::Float(2.0)),
            (TypeRef::bool(), Element::from("Yes"), Value::Bool(true)),
            (TypeRef::bool(), Element::from(0), Value::Bool(false)),
            (TypeRef::str(), Element::from(12), Value::from("12")),
        ];
        for (ty, element, expected) in cases {
            assert_eq!(engine.unmarshal(&ty, &element).unwrap(), expected, "{}", element);
        }
    }

    #[test]
    fn test_lossy_int_rejected() {
        let err = engine().unmarshal(&TypeRef::int(), &Element::from(2.5)).unwrap_err();
        assert_eq!(err.error_code(), "TW-2-03");
    }

    #[test]
    fn test_null_is_a_type_mismatch() {
        let err = engine().unmarshal(&TypeRef::int(), &Element::Null).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Unmarshal error at (root): Expected int, got null"
        );
    }

    #[test]
    fn test_missing_primitive() {
        let err = engine().unmarshal(&TypeRef::str(), &Element::Missing).unwrap_err();
        assert!(err.is_missing());
    }

    #[test]
    fn test_none() {
        let engine = engine();
        assert_eq!(engine.unmarshal(&TypeRef::none(), &Element::Null).unwrap(), Value::None);
        assert_eq!(engine.unmarshal(&TypeRef::none(), &Element::Missing).unwrap(), Value::None);
        assert!(engine.unmarshal(&TypeRef::none(), &Element::from(1)).is_err());
    }

    #[test]
    fn test_any_keeps_structure() {
        let element = element_map! { "a" => vec![1, 2], "b" => Element::Null };
        let value = engine().unmarshal(&TypeRef::any(), &element).unwrap();
        let Value::Map(map) = value else {
            panic!("expected a map, got {:?}", value);
        };
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&Key::from("a")), Some(&Value::from(vec![1, 2])));
    }

    #[test]
    fn test_choice_suggests_closest() {
        let ty = TypeRef::choice(["relu", "tanh", "sigmoid"]);
        let engine = engine();
        assert_eq!(engine.unmarshal(&ty, &Element::from("tanh")).unwrap(), Value::from("tanh"));
        let err = engine.unmarshal(&ty, &Element::from("rleu")).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::InvalidChoice { suggestion: Some(ref s), .. } if s == "relu"
        ));
    }
}
