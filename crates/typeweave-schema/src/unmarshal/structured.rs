//! Record and callable schemas.
//!
//! Both read a mapping of named fields. Absent fields are unmarshalled from
//! `Missing`, which yields the field default when there is one. Keys that
//! name no field are rejected unless the engine allows them.

use std::sync::Arc;

use indexmap::IndexMap;
use typeweave_element::{Element, MISSING};

use super::{doc_of, unsupported};
use crate::doc::Doc;
use crate::engine::Engine;
use crate::error::{ConversionError, ConversionResult, ErrorKind, ResultExt};
use crate::registry::{SchemaRef, UnmarshalContext, UnmarshalSchema, UnmarshalSchemaKind};
use crate::suggest;
use crate::types::{Field, TypeKind, TypeRef};
use crate::value::{Record, Value};

fn check_recursion(ty: &TypeRef, engine: &Engine) -> ConversionResult<()> {
    match engine.unguarded_cycle(ty) {
        Some(cycle) => Err(unsupported(
            ty,
            &format!("recursive without a base case: {}", cycle.join(" -> ")),
        )),
        None => Ok(()),
    }
}

fn unmarshal_fields(
    target: &TypeRef,
    fields: &[Field],
    element: &Element,
    cx: &UnmarshalContext<'_>,
) -> ConversionResult<IndexMap<String, Value>> {
    let empty = IndexMap::new();
    let map = match element {
        Element::Missing => &empty,
        Element::Map(map) => map,
        other => {
            return Err(ConversionError::type_mismatch(
                target.name(),
                other.kind_name(),
            ));
        }
    };

    if cx.engine().options().reject_unknown_fields {
        let unknown = map
            .keys()
            .find(|key| !fields.iter().any(|field| &field.name == *key));
        if let Some(key) = unknown {
            let suggestion = suggest::closest(key, fields.iter().map(|f| f.name.as_str()));
            return Err(ConversionError::new(ErrorKind::UnknownField {
                field: key.clone(),
                target: target.name().to_string(),
                suggestion,
            })
            .at(key.as_str()));
        }
    }

    let mut values = IndexMap::with_capacity(fields.len());
    for field in fields {
        let item = map.get(&field.name).unwrap_or(&MISSING);
        let default = if item.is_missing() {
            field.default_value()
        } else {
            None
        };
        let value = cx
            .unmarshal(&field.ty, item, default.as_ref())
            .at(field.name.as_str())?;
        values.insert(field.name.clone(), value);
    }
    Ok(values)
}

fn fields_doc(engine: &Engine, target: &TypeRef, fields: &[Field], depth: usize) -> Doc {
    let mut doc = Doc::new(target.name());
    if depth == 0 {
        return doc;
    }
    for field in fields {
        let mut field_doc = doc_of(engine, &field.ty, depth - 1);
        field_doc.description = field.doc.clone();
        field_doc.default = field.default_value().map(|value| match engine.marshal(&value) {
            Ok(element) => element.to_string(),
            Err(_) => format!("{:?}", value),
        });
        doc.fields.insert(field.name.clone(), field_doc);
    }
    doc
}

fn field_type(fields: &[Field], segment: &str) -> Option<TypeRef> {
    fields
        .iter()
        .find(|field| field.name == segment)
        .map(|field| field.ty.clone())
}

/// Claims record types.
pub struct RecordKind;

struct RecordSchema {
    target: TypeRef,
    fields: Arc<[Field]>,
}

impl UnmarshalSchemaKind for RecordKind {
    fn matches(&self, ty: &TypeRef) -> bool {
        ty.is_record()
    }

    fn build(
        &self,
        ty: &TypeRef,
        _inner: Option<SchemaRef>,
        engine: &Engine,
    ) -> ConversionResult<SchemaRef> {
        check_recursion(ty, engine)?;
        Ok(Arc::new(RecordSchema {
            target: ty.clone(),
            fields: engine.fields_of(ty),
        }))
    }
}

impl UnmarshalSchema for RecordSchema {
    fn target(&self) -> &TypeRef {
        &self.target
    }

    fn unmarshal(&self, element: &Element, cx: &UnmarshalContext<'_>) -> ConversionResult<Value> {
        if self.target.is_abstract() {
            return Err(ConversionError::new(ErrorKind::NamespaceResolution {
                target: self.target.name().to_string(),
                name: None,
                suggestion: None,
            }));
        }
        let values = unmarshal_fields(&self.target, &self.fields, element, cx)?;
        Ok(Value::Record(Record::from_fields(&self.target, values)))
    }

    fn doc(&self, engine: &Engine, depth: usize) -> Doc {
        fields_doc(engine, &self.target, &self.fields, depth)
    }

    fn child(&self, segment: &str, _: &Engine) -> Option<TypeRef> {
        field_type(&self.fields, segment)
    }
}

/// Claims callables: the mapping supplies named arguments.
pub struct CallableKind;

struct CallableSchema {
    target: TypeRef,
    params: Arc<[Field]>,
}

impl UnmarshalSchemaKind for CallableKind {
    fn matches(&self, ty: &TypeRef) -> bool {
        matches!(ty.kind(), TypeKind::Callable(_))
    }

    fn build(
        &self,
        ty: &TypeRef,
        _inner: Option<SchemaRef>,
        engine: &Engine,
    ) -> ConversionResult<SchemaRef> {
        check_recursion(ty, engine)?;
        Ok(Arc::new(CallableSchema {
            target: ty.clone(),
            params: engine.fields_of(ty),
        }))
    }
}

impl UnmarshalSchema for CallableSchema {
    fn target(&self) -> &TypeRef {
        &self.target
    }

    fn unmarshal(&self, element: &Element, cx: &UnmarshalContext<'_>) -> ConversionResult<Value> {
        let TypeKind::Callable(def) = self.target.kind() else {
            return Err(unsupported(&self.target, "not a callable type"));
        };
        let args = unmarshal_fields(&self.target, &self.params, element, cx)?;
        def.call(&args)
            .map_err(|reason| ConversionError::conversion(self.target.name(), reason))
    }

    fn doc(&self, engine: &Engine, depth: usize) -> Doc {
        fields_doc(engine, &self.target, &self.params, depth)
    }

    fn child(&self, segment: &str, _: &Engine) -> Option<TypeRef> {
        field_type(&self.params, segment)
    }
}
