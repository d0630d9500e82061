//! Covariant namespaces.
//!
//! A namespace maps names to subtypes of its base. When the target type is
//! `T` and the input mapping carries the discriminator key (`name` by
//! default), the name is looked up in every namespace that applies to `T`
//! and the selected subtype is unmarshalled instead of `T`, with the
//! discriminator removed. A namespace applies to `T` when its base is `T`
//! or a supertype of `T`; only members that are subtypes of `T` are
//! candidates.
//!
//! ```text
//! Model (namespace "model")
//!   "a" -> ModelA
//!   "b" -> ModelB
//!
//! unmarshal(Model, {name: a, layers: 3}) -> ModelA { layers: 3 }
//! unmarshal(Model, {})                   -> Model {}
//! unmarshal(Model, {name: z})            -> error: 'z' is not a registered Model
//! ```
//!
//! Marshalling is symmetric: a record whose type is registered in a
//! namespace gets the discriminator inserted as its first key.

use std::sync::Arc;

use indexmap::IndexMap;
use typeweave_element::Element;

use crate::doc::Doc;
use crate::engine::{Candidates, Engine};
use crate::error::{ConversionError, ConversionResult, ErrorKind, RegistrationError, ResultExt};
use crate::registry::{
    MarshalContext, MarshalSchema, SchemaRef, UnmarshalContext, UnmarshalSchema,
    UnmarshalSchemaKind,
};
use crate::suggest;
use crate::types::TypeRef;
use crate::value::Value;

#[derive(Debug)]
pub(crate) struct NamespaceEntry {
    base: TypeRef,
    members: IndexMap<String, TypeRef>,
}

/// Every namespace, in creation order.
#[derive(Debug, Default)]
pub(crate) struct NamespaceTable {
    spaces: IndexMap<String, NamespaceEntry>,
}

impl NamespaceTable {
    pub(crate) fn create(&mut self, name: &str, base: &TypeRef) -> Result<(), RegistrationError> {
        if self.spaces.contains_key(name) {
            return Err(RegistrationError::DuplicateNamespace {
                name: name.to_string(),
            });
        }
        self.spaces.insert(
            name.to_string(),
            NamespaceEntry {
                base: base.clone(),
                members: IndexMap::new(),
            },
        );
        Ok(())
    }

    pub(crate) fn base(&self, namespace: &str) -> Option<TypeRef> {
        self.spaces.get(namespace).map(|entry| entry.base.clone())
    }

    /// The name a type is registered under, searching namespaces in
    /// creation order.
    fn name_of(&self, ty: &TypeRef) -> Option<String> {
        self.spaces.values().find_map(|entry| {
            entry
                .members
                .iter()
                .find(|(_, member)| *member == ty)
                .map(|(name, _)| name.clone())
        })
    }
}

/// Names usable as discriminators when unmarshalling `ty`.
pub(crate) fn candidates_for(table: &NamespaceTable, ty: &TypeRef) -> Candidates {
    let mut candidates = Candidates::default();
    for entry in table.spaces.values() {
        if !ty.is_subtype_of(&entry.base) {
            continue;
        }
        for (name, member) in &entry.members {
            if !member.is_subtype_of(ty) {
                continue;
            }
            match candidates.names.get(name) {
                Some(existing) if existing != member => {
                    let names = candidates
                        .collisions
                        .entry(name.clone())
                        .or_insert_with(|| vec![existing.name().to_string()]);
                    if !names.iter().any(|n| n == member.name()) {
                        names.push(member.name().to_string());
                    }
                }
                Some(_) => {}
                None => {
                    candidates.names.insert(name.clone(), member.clone());
                }
            }
        }
    }
    candidates
}

/// Handle to a namespace registered in an [`Engine`].
#[derive(Clone)]
pub struct Namespace<'e> {
    engine: &'e Engine,
    name: String,
    base: TypeRef,
}

impl<'e> Namespace<'e> {
    pub(crate) fn new(engine: &'e Engine, name: String, base: TypeRef) -> Self {
        Self { engine, name, base }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> &TypeRef {
        &self.base
    }

    /// Register `subtype` under `name`.
    ///
    /// The subtype must derive from the namespace base and must not recurse
    /// into itself without a way to stop on missing input.
    pub fn register(
        &self,
        name: impl Into<String>,
        subtype: &TypeRef,
    ) -> Result<(), RegistrationError> {
        let name = name.into();
        if !subtype.is_subtype_of(&self.base) {
            return Err(RegistrationError::NotASubtype {
                namespace: self.name.clone(),
                subtype: subtype.name().to_string(),
                base: self.base.name().to_string(),
            });
        }
        if let Some(cycle) = self.engine.unguarded_cycle(subtype) {
            return Err(RegistrationError::UnguardedRecursion {
                type_name: subtype.name().to_string(),
                cycle,
            });
        }

        let mut table = self.engine.namespace_table_mut();
        let Some(entry) = table.spaces.get_mut(&self.name) else {
            return Err(RegistrationError::InvalidDefinition {
                type_name: self.base.name().to_string(),
                message: format!("namespace `{}` does not exist", self.name),
            });
        };
        if entry.members.contains_key(&name) {
            return Err(RegistrationError::DuplicateName {
                namespace: self.name.clone(),
                name,
            });
        }
        entry.members.insert(name.clone(), subtype.clone());
        drop(table);

        tracing::debug!(
            namespace = %self.name,
            name = %name,
            subtype = subtype.name(),
            "Registered namespace member"
        );
        self.engine.clear_caches();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<TypeRef> {
        self.engine
            .namespace_table()
            .spaces
            .get(&self.name)
            .and_then(|entry| entry.members.get(name).cloned())
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.engine
            .namespace_table()
            .spaces
            .get(&self.name)
            .map(|entry| entry.members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Unmarshal `element` as the type registered under `name`.
    pub fn build(&self, name: &str, element: &Element) -> ConversionResult<Value> {
        let Some(ty) = self.get(name) else {
            let names = self.names();
            return Err(ConversionError::new(ErrorKind::NamespaceResolution {
                target: self.base.name().to_string(),
                name: Some(name.to_string()),
                suggestion: suggest::closest(name, names.iter().map(String::as_str)),
            }));
        };
        self.engine.unmarshal(&ty, element)
    }
}

/// Wraps record schemas so a discriminator can select a subtype.
pub(crate) struct NamespaceUnmarshalKind;

struct NamespaceSchema {
    target: TypeRef,
    inner: SchemaRef,
    discriminator: String,
}

impl UnmarshalSchemaKind for NamespaceUnmarshalKind {
    fn matches(&self, ty: &TypeRef) -> bool {
        ty.is_record()
    }

    fn is_wrapper(&self) -> bool {
        true
    }

    fn build(
        &self,
        ty: &TypeRef,
        inner: Option<SchemaRef>,
        engine: &Engine,
    ) -> ConversionResult<SchemaRef> {
        let Some(inner) = inner else {
            return Err(ConversionError::new(ErrorKind::UnsupportedType {
                type_name: ty.name().to_string(),
                reason: "namespace dispatch needs a schema to wrap".to_string(),
            }));
        };
        Ok(Arc::new(NamespaceSchema {
            target: ty.clone(),
            inner,
            discriminator: engine.options().discriminator.clone(),
        }))
    }
}

impl UnmarshalSchema for NamespaceSchema {
    fn target(&self) -> &TypeRef {
        &self.target
    }

    fn unmarshal(&self, element: &Element, cx: &UnmarshalContext<'_>) -> ConversionResult<Value> {
        let Element::Map(map) = element else {
            return self.inner.unmarshal(element, cx);
        };
        let Some(raw) = map.get(&self.discriminator) else {
            return self.inner.unmarshal(element, cx);
        };
        let engine = cx.engine();
        let candidates = engine.namespace_candidates(&self.target);
        if candidates.names.is_empty() {
            // No namespace applies: the key is an ordinary field.
            return self.inner.unmarshal(element, cx);
        }

        let disc = self.discriminator.as_str();
        let Element::Str(name) = raw else {
            return Err(ConversionError::type_mismatch("str", raw.kind_name()).at(disc));
        };
        let Some(subtype) = engine.resolve_name(&self.target, name).at(disc)? else {
            return Err(ConversionError::new(ErrorKind::NamespaceResolution {
                target: self.target.name().to_string(),
                name: Some(name.clone()),
                suggestion: suggest::closest(name, candidates.names.keys().map(String::as_str)),
            })
            .at(disc));
        };
        tracing::trace!(
            target_type = self.target.name(),
            name = %name,
            subtype = subtype.name(),
            "Resolved namespace name"
        );

        let mut rest = map.clone();
        rest.shift_remove(disc);
        let rest = Element::Map(rest);
        if subtype == self.target {
            self.inner.unmarshal(&rest, cx)
        } else {
            cx.unmarshal(&subtype, &rest, None)
        }
    }

    fn doc(&self, engine: &Engine, depth: usize) -> Doc {
        let mut doc = self.inner.doc(engine, depth);
        let candidates = engine.namespace_candidates(&self.target);
        doc.variants = candidates
            .names
            .iter()
            .map(|(name, ty)| (name.clone(), ty.name().to_string()))
            .collect();
        doc
    }

    fn child(&self, segment: &str, engine: &Engine) -> Option<TypeRef> {
        self.inner.child(segment, engine).or_else(|| {
            engine
                .namespace_candidates(&self.target)
                .names
                .get(segment)
                .cloned()
        })
    }
}

/// Adds the discriminator when marshalling records registered in a
/// namespace.
pub(crate) struct NamespaceMarshalSchema;

impl MarshalSchema for NamespaceMarshalSchema {
    fn matches(&self, value: &Value) -> bool {
        matches!(value, Value::Record(_))
    }

    fn is_wrapper(&self) -> bool {
        true
    }

    fn marshal(&self, value: &Value, cx: &MarshalContext<'_>) -> ConversionResult<Element> {
        let Value::Record(record) = value else {
            return cx.marshal_inner(value);
        };
        let engine = cx.engine();
        let Some(name) = engine.namespace_table().name_of(record.ty()) else {
            return cx.marshal_inner(value);
        };

        let disc = &engine.options().discriminator;
        let marshal_error = |reason: String| {
            ConversionError::new(ErrorKind::Marshal {
                value_type: record.ty().name().to_string(),
                reason,
            })
        };
        let Element::Map(mut map) = cx.marshal_inner(value)? else {
            return Err(marshal_error("namespaced records must marshal to a mapping".to_string()));
        };
        if map.contains_key(disc) {
            return Err(marshal_error(format!(
                "field `{}` collides with the namespace discriminator",
                disc
            )));
        }
        map.shift_insert(0, disc.clone(), Element::Str(name));
        Ok(Element::Map(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;
    use crate::value::Record;
    use typeweave_element::element_map;

    struct Models {
        model: TypeRef,
        model_a: TypeRef,
    }

    fn models(engine: &Engine) -> Models {
        let model = TypeRef::record("Model").build();
        let model_a = TypeRef::record("ModelA")
            .base(&model)
            .field(Field::new("layers", &TypeRef::int()))
            .build();
        let ns = engine.new_namespace("model", &model).unwrap();
        ns.register("a", &model_a).unwrap();
        Models { model, model_a }
    }

    #[test]
    fn test_discriminator_selects_subtype() {
        let engine = Engine::with_builtins();
        let Models { model, model_a } = models(&engine);
        let value = engine
            .unmarshal(&model, &element_map! { "name" => "a", "layers" => 3 })
            .unwrap();
        assert_eq!(value, Value::Record(Record::new(&model_a).with("layers", 3)));
    }

    #[test]
    fn test_no_discriminator_uses_target() {
        let engine = Engine::with_builtins();
        let Models { model, .. } = models(&engine);
        let value = engine.unmarshal(&model, &Element::map()).unwrap();
        assert_eq!(value.as_record().map(|r| r.ty().clone()), Some(model));
    }

    #[test]
    fn test_unknown_name() {
        let engine = Engine::with_builtins();
        let Models { model, .. } = models(&engine);
        let err = engine
            .unmarshal(&model, &element_map! { "name" => "z" })
            .unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Unmarshal error at name: 'z' is not a registered Model"
        );
    }

    #[test]
    fn test_non_string_discriminator() {
        let engine = Engine::with_builtins();
        let Models { model, .. } = models(&engine);
        let err = engine
            .unmarshal(&model, &element_map! { "name" => 1 })
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn test_registration_checks() {
        let engine = Engine::with_builtins();
        let Models { model, model_a } = models(&engine);
        let ns = engine.namespace("model").unwrap();
        assert!(matches!(
            ns.register("a", &model_a).unwrap_err(),
            RegistrationError::DuplicateName { .. }
        ));
        let stranger = TypeRef::record("Stranger").build();
        assert!(matches!(
            ns.register("s", &stranger).unwrap_err(),
            RegistrationError::NotASubtype { .. }
        ));
        assert!(matches!(
            engine.new_namespace("model", &model).err().unwrap(),
            RegistrationError::DuplicateNamespace { .. }
        ));
        assert_eq!(ns.names(), ["a"]);
    }

    #[test]
    fn test_marshal_adds_discriminator_first() {
        let engine = Engine::with_builtins();
        let Models { model_a, .. } = models(&engine);
        let element = engine
            .marshal(&Record::new(&model_a).with("layers", 2).into())
            .unwrap();
        assert_eq!(element.to_string(), r#"{"name": "a", "layers": 2}"#);
    }

    #[test]
    fn test_marshal_rejects_own_name_field() {
        let engine = Engine::with_builtins();
        let base = TypeRef::record("Base").build();
        let named = TypeRef::record("Named")
            .base(&base)
            .field(Field::new("name", &TypeRef::str()))
            .build();
        engine.new_namespace("base", &base).unwrap().register("n", &named).unwrap();
        let err = engine
            .marshal(&Record::new(&named).with("name", "x").into())
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Marshal { .. }));
    }

    #[test]
    fn test_collision_across_namespaces() {
        let engine = Engine::with_builtins();
        let base = TypeRef::record("Base").build();
        let left = TypeRef::record("Left").base(&base).build();
        let right = TypeRef::record("Right").base(&base).build();
        engine.new_namespace("one", &base).unwrap().register("x", &left).unwrap();
        engine.new_namespace("two", &base).unwrap().register("x", &right).unwrap();
        let err = engine
            .unmarshal(&base, &element_map! { "name" => "x" })
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NamespaceCollision { .. }));
        assert_eq!(err.path.to_string(), "name");

        // Same type under the same name in two namespaces is fine.
        engine.new_namespace("three", &base).unwrap().register("l", &left).unwrap();
        engine.new_namespace("four", &base).unwrap().register("l", &left).unwrap();
        let value = engine.unmarshal(&base, &element_map! { "name" => "l" }).unwrap();
        assert_eq!(value.as_record().map(|r| r.ty().clone()), Some(left));
    }

    #[test]
    fn test_build_by_name() {
        let engine = Engine::with_builtins();
        let Models { model_a, .. } = models(&engine);
        let ns = engine.namespace("model").unwrap();
        let value = ns.build("a", &element_map! { "layers" => 1 }).unwrap();
        assert_eq!(value.as_record().map(|r| r.ty().clone()), Some(model_a));
        let err = ns.build("b", &Element::map()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NamespaceResolution { .. }));
    }

    #[test]
    fn test_abstract_target_needs_name() {
        let engine = Engine::with_builtins();
        let shape = TypeRef::record("Shape").abstract_type().build();
        let circle = TypeRef::record("Circle")
            .base(&shape)
            .field(Field::new("r", &TypeRef::float()))
            .build();
        engine.new_namespace("shape", &shape).unwrap().register("circle", &circle).unwrap();
        assert!(engine
            .unmarshal(&shape, &element_map! { "name" => "circle", "r" => 1 })
            .is_ok());
        let err = engine.unmarshal(&shape, &element_map! { "r" => 1 }).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Unmarshal error at (root): Shape is abstract; a registered `name` is required"
        );
    }

    #[test]
    fn test_doc_lists_variants() {
        let engine = Engine::with_builtins();
        let Models { model, .. } = models(&engine);
        let doc = engine.doc(&model, 1).unwrap();
        assert_eq!(doc.variants.get("a").map(String::as_str), Some("ModelA"));
    }
}
