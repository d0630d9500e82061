//! Runtime type descriptors.
//!
//! A [`TypeRef`] is the target of unmarshalling: it describes the shape a
//! value must take (a primitive, a collection, a union, a record with
//! fields, ...). Type identity is nominal: every constructor call creates a
//! new type with a process-unique [`TypeId`], so build each type once and
//! clone the handle.
//!
//! Records may declare bases, which defines the "is-a" relation used by
//! namespaces, and may be declared before their fields are known so that
//! they can refer to themselves.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::error::RegistrationError;
use crate::value::Value;

/// Process-unique identity of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u64);

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

impl TypeId {
    fn fresh() -> Self {
        TypeId(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Signature of a callable target. Receives the unmarshalled arguments by
/// name and returns the constructed value.
pub type CallableFn = dyn Fn(&IndexMap<String, Value>) -> Result<Value, String> + Send + Sync;

/// Signature of a field default factory.
pub type DefaultFactory = dyn Fn() -> Value + Send + Sync;

/// Default for a record field or callable parameter.
#[derive(Clone)]
pub enum FieldDefault {
    /// A fixed value, cloned on use.
    Value(Value),
    /// A factory called every time the default is needed.
    Factory(Arc<DefaultFactory>),
}

impl FieldDefault {
    pub fn get(&self) -> Value {
        match self {
            FieldDefault::Value(value) => value.clone(),
            FieldDefault::Factory(factory) => factory(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FieldDefault::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// A named, typed slot of a record or callable.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<FieldDefault>,
    pub doc: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: &TypeRef) -> Self {
        Self {
            name: name.into(),
            ty: ty.clone(),
            default: None,
            doc: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    pub fn with_factory(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(FieldDefault::Factory(Arc::new(factory)));
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(FieldDefault::get)
    }
}

/// Record layout: bases plus own fields.
pub struct RecordDef {
    bases: Vec<TypeRef>,
    fields: OnceLock<Vec<Field>>,
    is_abstract: bool,
}

/// A typed constructor invoked with named arguments.
pub struct CallableDef {
    params: Vec<Field>,
    func: Arc<CallableFn>,
}

impl CallableDef {
    pub fn params(&self) -> &[Field] {
        &self.params
    }

    pub fn call(&self, args: &IndexMap<String, Value>) -> Result<Value, String> {
        (self.func)(args)
    }
}

/// The shape described by a type.
pub enum TypeKind {
    /// Accepts any element and returns it as an untyped value.
    Any,
    None,
    Bool,
    Int,
    Float,
    Str,
    /// A closed set of string literals.
    Choice(Vec<String>),
    /// `T` or `None`.
    Optional(TypeRef),
    Sequence(TypeRef),
    /// Fixed-length heterogeneous sequence.
    Tuple(Vec<TypeRef>),
    Mapping {
        key: TypeRef,
        value: TypeRef,
    },
    /// Members are tried left to right.
    Union(Vec<TypeRef>),
    Record(RecordDef),
    Callable(CallableDef),
    /// A named type that only custom schemas understand.
    Opaque,
}

struct TypeDef {
    id: TypeId,
    name: String,
    kind: TypeKind,
}

/// Shared handle to a type descriptor. Equality and hashing use identity.
#[derive(Clone)]
pub struct TypeRef(Arc<TypeDef>);

macro_rules! primitive {
    ($static_name:ident, $fn_name:ident, $label:literal, $kind:expr) => {
        static $static_name: Lazy<TypeRef> = Lazy::new(|| TypeRef::new($label, $kind));

        impl TypeRef {
            pub fn $fn_name() -> TypeRef {
                $static_name.clone()
            }
        }
    };
}

primitive!(ANY, any, "Any", TypeKind::Any);
primitive!(NONE, none, "None", TypeKind::None);
primitive!(BOOL, bool, "bool", TypeKind::Bool);
primitive!(INT, int, "int", TypeKind::Int);
primitive!(FLOAT, float, "float", TypeKind::Float);
primitive!(STR, str, "str", TypeKind::Str);

fn join_names(types: &[TypeRef]) -> String {
    types
        .iter()
        .map(|t| t.name().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl TypeRef {
    fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        TypeRef(Arc::new(TypeDef {
            id: TypeId::fresh(),
            name: name.into(),
            kind,
        }))
    }

    pub fn choice<I, S>(values: I) -> TypeRef
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let name = format!(
            "Literal[{}]",
            values
                .iter()
                .map(|v| format!("{:?}", v))
                .collect::<Vec<_>>()
                .join(", ")
        );
        TypeRef::new(name, TypeKind::Choice(values))
    }

    pub fn optional(inner: &TypeRef) -> TypeRef {
        TypeRef::new(
            format!("Optional[{}]", inner.name()),
            TypeKind::Optional(inner.clone()),
        )
    }

    pub fn sequence(item: &TypeRef) -> TypeRef {
        TypeRef::new(
            format!("list[{}]", item.name()),
            TypeKind::Sequence(item.clone()),
        )
    }

    pub fn tuple(items: &[TypeRef]) -> TypeRef {
        TypeRef::new(
            format!("tuple[{}]", join_names(items)),
            TypeKind::Tuple(items.to_vec()),
        )
    }

    pub fn mapping(key: &TypeRef, value: &TypeRef) -> TypeRef {
        TypeRef::new(
            format!("dict[{}, {}]", key.name(), value.name()),
            TypeKind::Mapping {
                key: key.clone(),
                value: value.clone(),
            },
        )
    }

    pub fn union(members: &[TypeRef]) -> TypeRef {
        TypeRef::new(
            format!("Union[{}]", join_names(members)),
            TypeKind::Union(members.to_vec()),
        )
    }

    /// Start describing a record type.
    pub fn record(name: impl Into<String>) -> RecordBuilder {
        RecordBuilder {
            name: name.into(),
            bases: Vec::new(),
            fields: Vec::new(),
            is_abstract: false,
        }
    }

    pub fn callable(
        name: impl Into<String>,
        params: Vec<Field>,
        func: impl Fn(&IndexMap<String, Value>) -> Result<Value, String> + Send + Sync + 'static,
    ) -> TypeRef {
        TypeRef::new(
            name,
            TypeKind::Callable(CallableDef {
                params,
                func: Arc::new(func),
            }),
        )
    }

    pub fn opaque(name: impl Into<String>) -> TypeRef {
        TypeRef::new(name, TypeKind::Opaque)
    }

    pub fn id(&self) -> TypeId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0.kind
    }

    pub fn is_record(&self) -> bool {
        matches!(self.kind(), TypeKind::Record(_))
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.kind(), TypeKind::Record(def) if def.is_abstract)
    }

    /// Direct bases of a record. Empty for every other kind.
    pub fn bases(&self) -> &[TypeRef] {
        match self.kind() {
            TypeKind::Record(def) => &def.bases,
            _ => &[],
        }
    }

    /// Fields declared on this record itself, excluding inherited ones.
    pub fn own_fields(&self) -> &[Field] {
        match self.kind() {
            TypeKind::Record(def) => def.fields.get().map(Vec::as_slice).unwrap_or(&[]),
            TypeKind::Callable(def) => &def.params,
            _ => &[],
        }
    }

    /// Supply the fields of a record created with [`RecordBuilder::declare`].
    pub fn define_fields(&self, fields: Vec<Field>) -> Result<(), RegistrationError> {
        let TypeKind::Record(def) = self.kind() else {
            return Err(RegistrationError::InvalidDefinition {
                type_name: self.name().to_string(),
                message: "only record types have fields".to_string(),
            });
        };
        def.fields
            .set(fields)
            .map_err(|_| RegistrationError::InvalidDefinition {
                type_name: self.name().to_string(),
                message: "fields are already defined".to_string(),
            })
    }

    /// Nominal subtyping: a type is a subtype of itself, of `Any`, and of
    /// every base reachable through record inheritance.
    pub fn is_subtype_of(&self, other: &TypeRef) -> bool {
        if self == other || matches!(other.kind(), TypeKind::Any) {
            return true;
        }
        self.bases().iter().any(|base| base.is_subtype_of(other))
    }

    /// Fields of a record or callable including inherited ones.
    ///
    /// Bases contribute first, in declaration order. A field redeclared by a
    /// subtype keeps the position where it first appeared.
    pub fn collect_fields(&self) -> Vec<Field> {
        let mut fields: IndexMap<String, Field> = IndexMap::new();
        self.collect_fields_into(&mut fields);
        fields.into_values().collect()
    }

    fn collect_fields_into(&self, fields: &mut IndexMap<String, Field>) {
        for base in self.bases() {
            base.collect_fields_into(fields);
        }
        for field in self.own_fields() {
            fields.insert(field.name.clone(), field.clone());
        }
    }

    /// True when `Missing` unmarshals to `None` for this type.
    pub fn accepts_none(&self) -> bool {
        match self.kind() {
            TypeKind::None | TypeKind::Optional(_) => true,
            TypeKind::Union(members) => members.iter().any(TypeRef::accepts_none),
            _ => false,
        }
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TypeRef {}

impl std::hash::Hash for TypeRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.name())
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builder returned by [`TypeRef::record`].
#[derive(Debug)]
pub struct RecordBuilder {
    name: String,
    bases: Vec<TypeRef>,
    fields: Vec<Field>,
    is_abstract: bool,
}

impl RecordBuilder {
    pub fn base(mut self, base: &TypeRef) -> Self {
        self.bases.push(base.clone());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Abstract records can only be unmarshalled through a namespace.
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Create the record with the fields given so far.
    pub fn build(self) -> TypeRef {
        TypeRef::new(
            self.name,
            TypeKind::Record(RecordDef {
                bases: self.bases,
                fields: OnceLock::from(self.fields),
                is_abstract: self.is_abstract,
            }),
        )
    }

    /// Create the record without fields; supply them later with
    /// [`TypeRef::define_fields`]. Used for self-referencing types.
    pub fn declare(self) -> TypeRef {
        TypeRef::new(
            self.name,
            TypeKind::Record(RecordDef {
                bases: self.bases,
                fields: OnceLock::new(),
                is_abstract: self.is_abstract,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_shared() {
        assert_eq!(TypeRef::int(), TypeRef::int());
        assert_ne!(TypeRef::int(), TypeRef::float());
    }

    #[test]
    fn test_composite_names() {
        let ty = TypeRef::mapping(&TypeRef::str(), &TypeRef::sequence(&TypeRef::int()));
        assert_eq!(ty.name(), "dict[str, list[int]]");
        let ty = TypeRef::union(&[TypeRef::int(), TypeRef::none()]);
        assert_eq!(ty.name(), "Union[int, None]");
        assert_eq!(TypeRef::choice(["a", "b"]).name(), r#"Literal["a", "b"]"#);
    }

    #[test]
    fn test_subtyping_through_bases() {
        let base = TypeRef::record("Base").build();
        let mid = TypeRef::record("Mid").base(&base).build();
        let leaf = TypeRef::record("Leaf").base(&mid).build();
        assert!(leaf.is_subtype_of(&base));
        assert!(leaf.is_subtype_of(&TypeRef::any()));
        assert!(!base.is_subtype_of(&leaf));
    }

    #[test]
    fn test_inherited_fields_keep_position() {
        let base = TypeRef::record("Base")
            .field(Field::new("a", &TypeRef::int()))
            .field(Field::new("b", &TypeRef::int()))
            .build();
        let child = TypeRef::record("Child")
            .base(&base)
            .field(Field::new("c", &TypeRef::str()))
            .field(Field::new("a", &TypeRef::int()).with_default(1))
            .build();
        let fields = child.collect_fields();
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(fields[0].default.is_some());
    }

    #[test]
    fn test_declare_then_define() {
        let node = TypeRef::record("Node").declare();
        assert!(node.own_fields().is_empty());
        node.define_fields(vec![Field::new("next", &TypeRef::optional(&node))])
            .unwrap();
        assert_eq!(node.own_fields().len(), 1);
        assert!(node.define_fields(Vec::new()).is_err());
    }

    #[test]
    fn test_factory_default_called_each_time() {
        let field = Field::new("items", &TypeRef::sequence(&TypeRef::int()))
            .with_factory(|| Value::List(Vec::new()));
        assert_eq!(field.default_value(), Some(Value::List(Vec::new())));
    }

    #[test]
    fn test_accepts_none() {
        assert!(TypeRef::optional(&TypeRef::int()).accepts_none());
        assert!(TypeRef::union(&[TypeRef::str(), TypeRef::none()]).accepts_none());
        assert!(!TypeRef::int().accepts_none());
    }
}
