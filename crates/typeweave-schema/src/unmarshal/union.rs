//! Unions and optionals.
//!
//! Members are tried left to right and the first success wins. When every
//! member fails and exactly one of them failed below its own top level,
//! that deeper error is reported as is; otherwise the member errors are
//! attached as causes.
//!
//! An optional (`Optional[T]`, or a union of one type and `None`) reads
//! null and missing input as `None` and reports errors from `T` unchanged.

use std::sync::Arc;

use typeweave_element::Element;

use super::{doc_of, unsupported};
use crate::doc::Doc;
use crate::engine::Engine;
use crate::error::{ConversionError, ConversionResult, ErrorKind};
use crate::registry::{SchemaRef, UnmarshalContext, UnmarshalSchema, UnmarshalSchemaKind};
use crate::types::{TypeKind, TypeRef};
use crate::value::Value;

/// Claims `Union[...]` and `Optional[T]`.
pub struct UnionKind;

struct UnionSchema {
    target: TypeRef,
    members: Vec<TypeRef>,
    /// The single non-`None` member when the union is an optional.
    optional: Option<TypeRef>,
}

impl UnmarshalSchemaKind for UnionKind {
    fn matches(&self, ty: &TypeRef) -> bool {
        matches!(ty.kind(), TypeKind::Union(_) | TypeKind::Optional(_))
    }

    fn build(
        &self,
        ty: &TypeRef,
        _inner: Option<SchemaRef>,
        _: &Engine,
    ) -> ConversionResult<SchemaRef> {
        let members = match ty.kind() {
            TypeKind::Union(members) => members.clone(),
            TypeKind::Optional(inner) => vec![inner.clone(), TypeRef::none()],
            _ => return Err(unsupported(ty, "not a union type")),
        };
        let mut others = members
            .iter()
            .filter(|member| !matches!(member.kind(), TypeKind::None));
        let optional = match (others.next(), others.next()) {
            (Some(only), None) if members.len() > 1 => Some(only.clone()),
            _ => None,
        };
        Ok(Arc::new(UnionSchema {
            target: ty.clone(),
            members,
            optional,
        }))
    }
}

impl UnmarshalSchema for UnionSchema {
    fn target(&self) -> &TypeRef {
        &self.target
    }

    fn unmarshal(&self, element: &Element, cx: &UnmarshalContext<'_>) -> ConversionResult<Value> {
        if let Some(inner) = &self.optional {
            if element.is_missing() || element.is_null() {
                return Ok(Value::None);
            }
            return cx.unmarshal(inner, element, None);
        }

        // Stops recursion through optional self-references.
        if element.is_missing() && self.target.accepts_none() {
            return Ok(Value::None);
        }

        let mut causes = Vec::with_capacity(self.members.len());
        for member in &self.members {
            match cx.unmarshal(member, element, None) {
                Ok(value) => return Ok(value),
                Err(err) => causes.push(err),
            }
        }

        let deep: Vec<usize> = causes
            .iter()
            .enumerate()
            .filter(|(_, cause)| !cause.path.is_root())
            .map(|(index, _)| index)
            .collect();
        if let [index] = deep[..] {
            return Err(causes.swap_remove(index));
        }

        let kind = if element.is_missing() {
            ErrorKind::MissingValue {
                expected: self.target.name().to_string(),
            }
        } else {
            ErrorKind::NoMatchingMember {
                target: self.target.name().to_string(),
            }
        };
        Err(ConversionError::new(kind).with_causes(causes))
    }

    fn doc(&self, engine: &Engine, depth: usize) -> Doc {
        let mut doc = Doc::new(self.target.name());
        if depth > 0 {
            for member in &self.members {
                doc = doc.with_member(doc_of(engine, member, depth - 1));
            }
        }
        doc
    }

    /// Only optionals can be traversed; a general union has no single route.
    fn child(&self, segment: &str, engine: &Engine) -> Option<TypeRef> {
        let inner = self.optional.as_ref()?;
        engine.schema_for(inner).ok()?.child(segment, engine)
    }
}
