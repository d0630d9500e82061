//! Built-in unmarshal schema kinds.

mod collection;
mod scalar;
mod structured;
mod union;

use std::sync::Arc;

pub use collection::{MappingKind, SequenceKind, TupleKind};
pub use scalar::{AnyKind, ChoiceKind, NoneKind, PrimitiveKind};
pub use structured::{CallableKind, RecordKind};
pub use union::UnionKind;

use crate::doc::Doc;
use crate::engine::Engine;
use crate::error::{ConversionError, ErrorKind};
use crate::namespace::NamespaceUnmarshalKind;
use crate::priority::Registration;
use crate::registry::UnmarshalSchemaKind;
use crate::types::TypeRef;

/// Priority of the namespace wrappers: above every built-in base schema.
pub(crate) const NAMESPACE_PRIORITY: i64 = 10;

fn entry(
    registration: Registration,
    kind: impl UnmarshalSchemaKind + 'static,
) -> (Registration, Arc<dyn UnmarshalSchemaKind>) {
    (registration, Arc::new(kind))
}

pub(crate) fn builtins() -> Vec<(Registration, Arc<dyn UnmarshalSchemaKind>)> {
    vec![
        entry(
            Registration::new("namespace").priority(NAMESPACE_PRIORITY),
            NamespaceUnmarshalKind,
        ),
        entry(Registration::new("none"), NoneKind),
        entry(Registration::new("primitive"), PrimitiveKind),
        entry(Registration::new("any"), AnyKind),
        entry(Registration::new("choice"), ChoiceKind),
        entry(Registration::new("union"), UnionKind),
        entry(Registration::new("sequence"), SequenceKind),
        entry(Registration::new("tuple"), TupleKind),
        entry(Registration::new("mapping"), MappingKind),
        entry(Registration::new("record"), RecordKind),
        entry(Registration::new("callable"), CallableKind),
    ]
}

/// Documentation for a nested type, or just its name when no schema fits.
pub(crate) fn doc_of(engine: &Engine, ty: &TypeRef, depth: usize) -> Doc {
    engine
        .doc(ty, depth)
        .unwrap_or_else(|_| Doc::new(ty.name()))
}

pub(crate) fn unsupported(ty: &TypeRef, reason: &str) -> ConversionError {
    ConversionError::new(ErrorKind::UnsupportedType {
        type_name: ty.name().to_string(),
        reason: reason.to_string(),
    })
}
