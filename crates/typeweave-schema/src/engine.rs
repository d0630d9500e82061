//! The dispatch engine: registries, namespaces and caches.
//!
//! An [`Engine`] owns both schema registries, the namespace table and every
//! cache. All state sits behind locks, so a shared `&Engine` can convert
//! values on many threads at once while registration stays possible.
//! Registration invalidates the caches.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use typeweave_element::{Element, Override, Path};

use crate::cache::{Cache, CacheInfo, CacheKey};
use crate::doc::Doc;
use crate::error::{ConversionError, ConversionResult, Error, ErrorKind, RegistrationError};
use crate::namespace::{self, Namespace, NamespaceTable};
use crate::priority::{PriorityOrder, Registration};
use crate::recursion;
use crate::registry::{
    MarshalContext, MarshalSchema, SchemaRef, UnmarshalContext, UnmarshalSchemaKind,
};
use crate::types::{Field, TypeRef};
use crate::value::Value;

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Mapping key that selects a namespace subtype (default: `name`).
    pub discriminator: String,

    /// Top-level key stripped by [`Engine::unmarshal_document`] (default: `_meta_`).
    pub meta_key: String,

    /// Maximum nesting depth (default: 256).
    ///
    /// Conversion fails with [`ErrorKind::NestingTooDeep`] beyond this depth.
    pub max_depth: usize,

    /// Reject mapping keys that name no field of the target record
    /// (default: true).
    pub reject_unknown_fields: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            discriminator: "name".to_string(),
            meta_key: typeweave_element::META_KEY.to_string(),
            max_depth: 256,
            reject_unknown_fields: true,
        }
    }
}

impl EngineOptions {
    pub fn with_discriminator(mut self, key: impl Into<String>) -> Self {
        self.discriminator = key.into();
        self
    }

    pub fn with_meta_key(mut self, key: impl Into<String>) -> Self {
        self.meta_key = key.into();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_unknown_fields_allowed(mut self) -> Self {
        self.reject_unknown_fields = false;
        self
    }
}

/// Namespace subtypes applicable to one target type.
#[derive(Debug, Default)]
pub(crate) struct Candidates {
    pub(crate) names: IndexMap<String, TypeRef>,
    pub(crate) collisions: IndexMap<String, Vec<String>>,
}

struct Caches {
    schemas: Cache<CacheKey, SchemaRef>,
    fields: Cache<CacheKey, Arc<[Field]>>,
    candidates: Cache<CacheKey, Arc<Candidates>>,
    resolved: Cache<CacheKey, Option<TypeRef>>,
    recursion: Cache<CacheKey, Option<Vec<String>>>,
}

impl Caches {
    fn new() -> Self {
        Self {
            schemas: Cache::new("schemas"),
            fields: Cache::new("fields"),
            candidates: Cache::new("namespace_candidates"),
            resolved: Cache::new("namespace_names"),
            recursion: Cache::new("recursion_checks"),
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Registries, namespaces and caches for type-directed conversion.
pub struct Engine {
    options: EngineOptions,
    marshal_schemas: RwLock<PriorityOrder<Arc<dyn MarshalSchema>>>,
    unmarshal_kinds: RwLock<PriorityOrder<Arc<dyn UnmarshalSchemaKind>>>,
    namespaces: RwLock<NamespaceTable>,
    caches: Caches,
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl Engine {
    /// An engine with no schemas registered.
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            marshal_schemas: RwLock::new(PriorityOrder::default()),
            unmarshal_kinds: RwLock::new(PriorityOrder::default()),
            namespaces: RwLock::new(NamespaceTable::default()),
            caches: Caches::new(),
        }
    }

    /// An engine with the built-in schemas and default options.
    pub fn with_builtins() -> Self {
        Self::with_builtins_and_options(EngineOptions::default())
    }

    pub fn with_builtins_and_options(options: EngineOptions) -> Self {
        Self {
            options,
            marshal_schemas: RwLock::new(PriorityOrder::unconstrained(crate::marshal::builtins())),
            unmarshal_kinds: RwLock::new(PriorityOrder::unconstrained(
                crate::unmarshal::builtins(),
            )),
            namespaces: RwLock::new(NamespaceTable::default()),
            caches: Caches::new(),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn register_marshal_schema(
        &self,
        registration: Registration,
        schema: impl MarshalSchema + 'static,
    ) -> Result<(), RegistrationError> {
        let name = registration.name.clone();
        let priority = registration.priority;
        let mut schemas = write(&self.marshal_schemas);
        schemas.insert(registration, Arc::new(schema))?;
        tracing::debug!(
            schema = %name,
            priority,
            registered = schemas.len(),
            "Registered marshal schema"
        );
        drop(schemas);
        self.clear_caches();
        Ok(())
    }

    pub fn register_unmarshal_schema(
        &self,
        registration: Registration,
        kind: impl UnmarshalSchemaKind + 'static,
    ) -> Result<(), RegistrationError> {
        let name = registration.name.clone();
        let priority = registration.priority;
        let mut kinds = write(&self.unmarshal_kinds);
        kinds.insert(registration, Arc::new(kind))?;
        tracing::debug!(
            schema = %name,
            priority,
            registered = kinds.len(),
            "Registered unmarshal schema"
        );
        drop(kinds);
        self.clear_caches();
        Ok(())
    }

    /// Names of the marshal schemas in dispatch order.
    pub fn marshal_schema_names(&self) -> Vec<String> {
        read(&self.marshal_schemas).names()
    }

    /// Names of the unmarshal schema kinds in dispatch order.
    pub fn unmarshal_schema_names(&self) -> Vec<String> {
        read(&self.unmarshal_kinds).names()
    }

    /// Create a namespace whose members must be subtypes of `base`.
    pub fn new_namespace(
        &self,
        name: impl Into<String>,
        base: &TypeRef,
    ) -> Result<Namespace<'_>, RegistrationError> {
        let name = name.into();
        write(&self.namespaces).create(&name, base)?;
        tracing::debug!(namespace = %name, base = base.name(), "Created namespace");
        self.clear_caches();
        Ok(Namespace::new(self, name, base.clone()))
    }

    /// Look up an existing namespace.
    pub fn namespace(&self, name: &str) -> Option<Namespace<'_>> {
        let base = read(&self.namespaces).base(name)?;
        Some(Namespace::new(self, name.to_string(), base))
    }

    pub(crate) fn namespace_table(&self) -> RwLockReadGuard<'_, NamespaceTable> {
        read(&self.namespaces)
    }

    pub(crate) fn namespace_table_mut(&self) -> RwLockWriteGuard<'_, NamespaceTable> {
        write(&self.namespaces)
    }

    /// Convert a native value into an element.
    pub fn marshal(&self, value: &Value) -> ConversionResult<Element> {
        self.marshal_at_depth(value, 0)
    }

    pub(crate) fn marshal_at_depth(
        &self,
        value: &Value,
        depth: usize,
    ) -> ConversionResult<Element> {
        let max_depth = self.options.max_depth;
        if depth >= max_depth {
            return Err(ConversionError::new(ErrorKind::NestingTooDeep { max_depth }));
        }

        let mut chain: Vec<Arc<dyn MarshalSchema>> = Vec::new();
        let mut claimed_by = None;
        for (registration, schema) in read(&self.marshal_schemas).iter() {
            if !schema.matches(value) {
                continue;
            }
            chain.push(Arc::clone(schema));
            if !schema.is_wrapper() {
                claimed_by = Some(registration.name.clone());
                break;
            }
        }

        let Some(claimed_by) = claimed_by else {
            return Err(ConversionError::new(ErrorKind::Marshal {
                value_type: value.type_name().to_string(),
                reason: "no marshal schema accepts this value".to_string(),
            }));
        };
        tracing::trace!(value_type = value.type_name(), schema = %claimed_by, "Marshalling");

        let (first, rest) = chain.split_at(1);
        first[0].marshal(value, &MarshalContext::new(self, rest, depth))
    }

    /// Convert an element into a value of type `ty`.
    pub fn unmarshal(&self, ty: &TypeRef, element: &Element) -> ConversionResult<Value> {
        self.unmarshal_with_default(ty, element, None)
    }

    /// Like [`Engine::unmarshal`], returning `default` when `element` is missing.
    pub fn unmarshal_with_default(
        &self,
        ty: &TypeRef,
        element: &Element,
        default: Option<&Value>,
    ) -> ConversionResult<Value> {
        UnmarshalContext::new(self).unmarshal(ty, element, default)
    }

    /// Standardize `element`, strip the metadata key, then unmarshal.
    pub fn unmarshal_document(&self, ty: &TypeRef, element: &Element) -> ConversionResult<Value> {
        let resolved =
            typeweave_element::resolve_with_key(element, &self.options.meta_key).map_err(|err| {
                let mut error = ConversionError::conversion(ty.name(), err.to_string());
                if let Some(path) = err.path() {
                    error.path = path.clone();
                }
                error
            })?;
        self.unmarshal(ty, &resolved)
    }

    /// Apply `overrides` (`a.b=1`, `a+=[2]`, `~a.c`) to `base` in order, then
    /// unmarshal the result as a document.
    pub fn unmarshal_with_overrides<S: AsRef<str>>(
        &self,
        ty: &TypeRef,
        base: &Element,
        overrides: &[S],
    ) -> Result<Value, Error> {
        let overrides = overrides
            .iter()
            .map(|text| Override::parse(text.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let tree = typeweave_element::apply_overrides(base, &overrides)?;
        Ok(self.unmarshal_document(ty, &tree)?)
    }

    /// The unmarshal schema for `ty`, built on first use and cached.
    pub fn schema_for(&self, ty: &TypeRef) -> ConversionResult<SchemaRef> {
        self.caches
            .schemas
            .get_or_try_insert_with(&CacheKey::of(ty.id()), || self.build_schema(ty))
    }

    fn build_schema(&self, ty: &TypeRef) -> ConversionResult<SchemaRef> {
        let mut wrappers: Vec<(String, Arc<dyn UnmarshalSchemaKind>)> = Vec::new();
        let mut base = None;
        for (registration, kind) in read(&self.unmarshal_kinds).iter() {
            if !kind.matches(ty) {
                continue;
            }
            let entry = (registration.name.clone(), Arc::clone(kind));
            if kind.is_wrapper() {
                wrappers.push(entry);
            } else {
                base = Some(entry);
                break;
            }
        }

        let Some((base_name, base_kind)) = base else {
            return Err(ConversionError::new(ErrorKind::UnsupportedType {
                type_name: ty.name().to_string(),
                reason: "no unmarshal schema accepts this type".to_string(),
            }));
        };
        tracing::trace!(
            target_type = ty.name(),
            schema = %base_name,
            wrappers = wrappers.len(),
            "Building unmarshal schema"
        );

        let mut schema = base_kind.build(ty, None, self)?;
        for (_, wrapper) in wrappers.into_iter().rev() {
            schema = wrapper.build(ty, Some(schema), self)?;
        }
        Ok(schema)
    }

    /// The schema reached by following `path` from `ty`: record fields,
    /// mapping values and sequence items.
    pub fn select_schema(&self, ty: &TypeRef, path: &Path) -> ConversionResult<SchemaRef> {
        let mut current = ty.clone();
        for (depth, segment) in path.segments().iter().enumerate() {
            let schema = self.schema_for(&current)?;
            current = schema.child(segment, self).ok_or_else(|| {
                let mut err = ConversionError::new(ErrorKind::InvalidPath {
                    segment: segment.clone(),
                    type_name: current.name().to_string(),
                });
                err.path = path.prefix(depth + 1);
                err
            })?;
        }
        self.schema_for(&current)
    }

    /// Structured documentation for `ty`, `depth` levels deep.
    pub fn doc(&self, ty: &TypeRef, depth: usize) -> ConversionResult<Doc> {
        Ok(self.schema_for(ty)?.doc(self, depth))
    }

    /// Fields of a record or callable including inherited ones, cached.
    pub fn fields_of(&self, ty: &TypeRef) -> Arc<[Field]> {
        self.caches
            .fields
            .get_or_insert_with(&CacheKey::of(ty.id()), || ty.collect_fields().into())
    }

    /// The first cycle through `ty` that never stops on missing input.
    pub(crate) fn unguarded_cycle(&self, ty: &TypeRef) -> Option<Vec<String>> {
        self.caches
            .recursion
            .get_or_insert_with(&CacheKey::of(ty.id()), || {
                recursion::find_unguarded_cycle(ty)
            })
    }

    pub(crate) fn namespace_candidates(&self, ty: &TypeRef) -> Arc<Candidates> {
        self.caches
            .candidates
            .get_or_insert_with(&CacheKey::of(ty.id()), || {
                Arc::new(namespace::candidates_for(&self.namespace_table(), ty))
            })
    }

    /// Resolve a discriminator value to a subtype of `ty`.
    pub(crate) fn resolve_name(
        &self,
        ty: &TypeRef,
        name: &str,
    ) -> ConversionResult<Option<TypeRef>> {
        self.caches
            .resolved
            .get_or_try_insert_with(&CacheKey::with(ty.id(), name), || {
                let candidates = self.namespace_candidates(ty);
                if let Some(types) = candidates.collisions.get(name) {
                    return Err(ConversionError::new(ErrorKind::NamespaceCollision {
                        name: name.to_string(),
                        candidates: types.clone(),
                    }));
                }
                Ok(candidates.names.get(name).cloned())
            })
    }

    /// Hit/miss counters and sizes of every cache.
    pub fn cache_info(&self) -> Vec<CacheInfo> {
        vec![
            self.caches.schemas.info(),
            self.caches.fields.info(),
            self.caches.candidates.info(),
            self.caches.resolved.info(),
            self.caches.recursion.info(),
        ]
    }

    /// Empty every cache. Called automatically on registration.
    pub fn clear_caches(&self) {
        self.caches.schemas.clear();
        self.caches.fields.clear();
        self.caches.candidates.clear();
        self.caches.resolved.clear();
        self.caches.recursion.clear();
        tracing::debug!("Cleared schema caches");
    }
}

static GLOBAL: Lazy<Engine> = Lazy::new(Engine::with_builtins);

/// The process-wide engine with the built-in schemas, created on first use.
pub fn global() -> &'static Engine {
    &GLOBAL
}

/// [`Engine::marshal`] on the global engine.
pub fn marshal(value: &Value) -> ConversionResult<Element> {
    global().marshal(value)
}

/// [`Engine::unmarshal`] on the global engine.
pub fn unmarshal(ty: &TypeRef, element: &Element) -> ConversionResult<Value> {
    global().unmarshal(ty, element)
}

/// [`Engine::new_namespace`] on the global engine.
pub fn new_namespace(
    name: impl Into<String>,
    base: &TypeRef,
) -> Result<Namespace<'static>, RegistrationError> {
    global().new_namespace(name, base)
}

/// [`Engine::register_marshal_schema`] on the global engine.
pub fn register_marshal_schema(
    registration: Registration,
    schema: impl MarshalSchema + 'static,
) -> Result<(), RegistrationError> {
    global().register_marshal_schema(registration, schema)
}

/// [`Engine::register_unmarshal_schema`] on the global engine.
pub fn register_unmarshal_schema(
    registration: Registration,
    kind: impl UnmarshalSchemaKind + 'static,
) -> Result<(), RegistrationError> {
    global().register_unmarshal_schema(registration, kind)
}

/// [`Engine::clear_caches`] on the global engine.
pub fn clear_caches() {
    global().clear_caches()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    struct Uppercase;

    impl MarshalSchema for Uppercase {
        fn matches(&self, value: &Value) -> bool {
            matches!(value, Value::Str(_))
        }

        fn marshal(&self, value: &Value, _cx: &MarshalContext<'_>) -> ConversionResult<Element> {
            Ok(Element::Str(value.as_str().unwrap_or_default().to_uppercase()))
        }
    }

    #[test]
    fn test_empty_engine_rejects_everything() {
        let engine = Engine::new(EngineOptions::default());
        let err = engine.marshal(&Value::Int(1)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Marshal { .. }));
        let err = engine.unmarshal(&TypeRef::int(), &Element::Int(1)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnsupportedType { .. }));
    }

    #[test]
    fn test_priority_decides_marshal_dispatch() {
        let engine = Engine::with_builtins();
        assert_eq!(engine.marshal(&Value::from("x")).unwrap(), Element::from("x"));

        engine
            .register_marshal_schema(Registration::new("upper").priority(1), Uppercase)
            .unwrap();
        assert_eq!(engine.marshal(&Value::from("x")).unwrap(), Element::from("X"));
    }

    #[test]
    fn test_registration_order_breaks_ties_against_builtins() {
        let engine = Engine::with_builtins();
        engine
            .register_marshal_schema(Registration::new("upper"), Uppercase)
            .unwrap();
        // Same base priority as the primitive schema, registered later.
        assert_eq!(engine.marshal(&Value::from("x")).unwrap(), Element::from("x"));

        let engine = Engine::with_builtins();
        engine
            .register_marshal_schema(Registration::new("upper").before("primitive"), Uppercase)
            .unwrap();
        assert_eq!(engine.marshal(&Value::from("x")).unwrap(), Element::from("X"));
    }

    #[test]
    fn test_schema_cache_and_clear() {
        let engine = Engine::with_builtins();
        let list = TypeRef::sequence(&TypeRef::int());
        engine.unmarshal(&list, &Element::from(vec![1, 2])).unwrap();
        engine.unmarshal(&list, &Element::from(vec![3])).unwrap();
        let schemas = engine.cache_info().into_iter().find(|c| c.name == "schemas").unwrap();
        assert!(schemas.hits >= 1);
        assert_eq!(schemas.size, 2);

        engine.clear_caches();
        let schemas = engine.cache_info().into_iter().find(|c| c.name == "schemas").unwrap();
        assert_eq!(schemas.size, 0);
    }

    #[test]
    fn test_depth_limit() {
        let engine = Engine::with_builtins_and_options(EngineOptions::default().with_max_depth(2));
        let nested = TypeRef::sequence(&TypeRef::sequence(&TypeRef::sequence(&TypeRef::int())));
        let element = Element::from(vec![Element::from(vec![Element::from(vec![1])])]);
        let err = engine.unmarshal(&nested, &element).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NestingTooDeep { max_depth: 2 });
        assert_eq!(err.path.to_string(), "0.0");
    }

    #[test]
    fn test_select_schema() {
        let engine = Engine::with_builtins();
        let inner = TypeRef::record("Inner")
            .field(Field::new("port", &TypeRef::int()))
            .build();
        let outer = TypeRef::record("Outer")
            .field(Field::new("servers", &TypeRef::sequence(&inner)))
            .build();
        let schema = engine
            .select_schema(&outer, &Path::parse("servers.0.port").unwrap())
            .unwrap();
        assert!(matches!(schema.target().kind(), TypeKind::Int));

        let err = engine
            .select_schema(&outer, &Path::parse("servers.0.host").unwrap())
            .err().unwrap();
        assert_eq!(err.path.to_string(), "servers.0.host");
    }

    #[test]
    fn test_unmarshal_document_strips_meta() {
        let engine = Engine::with_builtins();
        let point = TypeRef::record("Point")
            .field(Field::new("x", &TypeRef::int()))
            .build();
        let element = typeweave_element::element_map! {
            "_meta_" => typeweave_element::element_map! { "origin" => "cli" },
            "x" => 3,
        };
        let value = engine.unmarshal_document(&point, &element).unwrap();
        assert_eq!(value.as_record().unwrap().get("x"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_unmarshal_with_overrides() {
        let engine = Engine::with_builtins();
        let server = TypeRef::record("Server")
            .field(Field::new("host", &TypeRef::str()))
            .field(Field::new("ports", &TypeRef::sequence(&TypeRef::int())))
            .build();
        let base = typeweave_element::element_map! { "host" => "localhost", "ports" => vec![80] };
        let value = engine
            .unmarshal_with_overrides(&server, &base, &["ports+=[443]", "host=example.org"])
            .unwrap();
        let record = value.as_record().unwrap();
        assert_eq!(record.get("host"), Some(&Value::from("example.org")));
        assert_eq!(record.get("ports"), Some(&Value::from(vec![80, 443])));

        let err = engine
            .unmarshal_with_overrides(&server, &base, &["host+=x"])
            .unwrap_err();
        assert!(matches!(err, Error::Element(_)));
        let err = engine
            .unmarshal_with_overrides(&server, &base, &["ports=oops"])
            .unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }

    #[test]
    fn test_global_engine_is_shared() {
        assert!(std::ptr::eq(global(), global()));
        assert!(global().unmarshal_schema_names().contains(&"record".to_string()));
    }
}
