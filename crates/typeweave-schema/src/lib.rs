//! Type-directed marshalling and unmarshalling of element trees.
//!
//! This crate converts between [`typeweave_element::Element`] trees and
//! native [`Value`]s, guided by runtime type descriptors ([`TypeRef`]).
//!
//! # Architecture
//!
//! - [`Engine`] owns two priority-ordered registries: marshal schemas claim
//!   values, unmarshal schema kinds claim target types and build a schema
//!   per type. Built schemas are cached per type.
//! - Namespaces map names to subtypes of a base record. An input mapping
//!   with a `name` key is unmarshalled as the registered subtype.
//! - Errors carry the root-to-leaf [`typeweave_element::Path`] of the
//!   failing element and a structured [`ErrorKind`].
//!
//! # Example
//!
//! ```rust
//! use typeweave_element::element_map;
//! use typeweave_schema::{Engine, Field, TypeRef, Value};
//!
//! let engine = Engine::with_builtins();
//! let model = TypeRef::record("Model").build();
//! let model_a = TypeRef::record("ModelA")
//!     .base(&model)
//!     .field(Field::new("layers", &TypeRef::int()).with_default(1))
//!     .build();
//! engine.new_namespace("model", &model).unwrap().register("a", &model_a).unwrap();
//!
//! let value = engine
//!     .unmarshal(&model, &element_map! { "name" => "a", "layers" => 3 })
//!     .unwrap();
//! let record = value.as_record().unwrap();
//! assert_eq!(record.ty(), &model_a);
//! assert_eq!(record.get("layers"), Some(&Value::Int(3)));
//! ```

mod cache;
mod doc;
mod engine;
mod error;
mod marshal;
mod namespace;
mod priority;
mod recursion;
mod registry;
mod suggest;
mod types;
pub mod unmarshal;
mod value;

pub use cache::{CacheInfo, CacheKey};
pub use doc::Doc;
pub use engine::{
    Engine, EngineOptions, clear_caches, global, marshal, new_namespace, register_marshal_schema,
    register_unmarshal_schema, unmarshal,
};
pub use error::{ConversionError, ConversionResult, Error, ErrorKind, RegistrationError, ResultExt};
pub use namespace::Namespace;
pub use priority::Registration;
pub use registry::{
    MarshalContext, MarshalSchema, SchemaRef, UnmarshalContext, UnmarshalSchema,
    UnmarshalSchemaKind,
};
pub use types::{
    CallableDef, CallableFn, DefaultFactory, Field, FieldDefault, RecordBuilder, RecordDef,
    TypeId, TypeKind, TypeRef,
};
pub use value::{Key, Record, Value};
