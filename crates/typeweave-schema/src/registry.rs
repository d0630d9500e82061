//! Schema traits and the contexts passed through dispatch.
//!
//! There are two independent registries:
//!
//! - marshal schemas claim *values* and turn them into elements
//! - unmarshal schema kinds claim *types* and build a schema for one target
//!   type, which then turns elements into values
//!
//! Either kind of schema may be a *wrapper*. Dispatch collects every
//! matching wrapper in priority order until it reaches the first matching
//! non-wrapper, then nests them: the first wrapper found is the outermost.

use std::sync::Arc;

use typeweave_element::Element;

use crate::doc::Doc;
use crate::engine::Engine;
use crate::error::{ConversionError, ConversionResult, ErrorKind};
use crate::types::TypeRef;
use crate::value::Value;

/// A built unmarshal schema, shared through the engine's cache.
pub type SchemaRef = Arc<dyn UnmarshalSchema>;

/// Turns elements into values for one target type.
pub trait UnmarshalSchema: Send + Sync {
    /// The type this schema was built for.
    fn target(&self) -> &TypeRef;

    /// Convert `element`. Defaults for `Missing` are applied by the caller,
    /// so a `Missing` reaching this method has no default.
    fn unmarshal(&self, element: &Element, cx: &UnmarshalContext<'_>) -> ConversionResult<Value>;

    /// Describe the accepted input, descending at most `depth` levels.
    fn doc(&self, engine: &Engine, depth: usize) -> Doc;

    /// The type selected by one path segment, for schema path selection.
    fn child(&self, _segment: &str, _engine: &Engine) -> Option<TypeRef> {
        None
    }
}

/// Claims target types and builds unmarshal schemas for them.
pub trait UnmarshalSchemaKind: Send + Sync {
    fn matches(&self, ty: &TypeRef) -> bool;

    fn is_wrapper(&self) -> bool {
        false
    }

    /// Build the schema for `ty`. Wrappers receive the schema they wrap.
    fn build(
        &self,
        ty: &TypeRef,
        inner: Option<SchemaRef>,
        engine: &Engine,
    ) -> ConversionResult<SchemaRef>;
}

/// Claims runtime values and converts them into elements.
pub trait MarshalSchema: Send + Sync {
    fn matches(&self, value: &Value) -> bool;

    fn is_wrapper(&self) -> bool {
        false
    }

    fn marshal(&self, value: &Value, cx: &MarshalContext<'_>) -> ConversionResult<Element>;
}

/// State threaded through a single unmarshal call.
#[derive(Clone, Copy)]
pub struct UnmarshalContext<'a> {
    engine: &'a Engine,
    depth: usize,
}

impl<'a> UnmarshalContext<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine, depth: 0 }
    }

    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Unmarshal a nested element.
    ///
    /// `Missing` with a default yields the default. Anything else is handed
    /// to the schema registered for `ty`.
    pub fn unmarshal(
        &self,
        ty: &TypeRef,
        element: &Element,
        default: Option<&Value>,
    ) -> ConversionResult<Value> {
        if element.is_missing()
            && let Some(default) = default
        {
            return Ok(default.clone());
        }
        let max_depth = self.engine.options().max_depth;
        if self.depth >= max_depth {
            return Err(ConversionError::new(ErrorKind::NestingTooDeep { max_depth }));
        }
        let schema = self.engine.schema_for(ty)?;
        tracing::trace!(target_type = ty.name(), depth = self.depth, "Unmarshalling");
        schema.unmarshal(
            element,
            &UnmarshalContext {
                engine: self.engine,
                depth: self.depth + 1,
            },
        )
    }
}

/// State threaded through a single marshal call.
pub struct MarshalContext<'a> {
    engine: &'a Engine,
    inner: &'a [Arc<dyn MarshalSchema>],
    depth: usize,
}

impl<'a> MarshalContext<'a> {
    pub(crate) fn new(
        engine: &'a Engine,
        inner: &'a [Arc<dyn MarshalSchema>],
        depth: usize,
    ) -> Self {
        Self {
            engine,
            inner,
            depth,
        }
    }

    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    /// Marshal a nested value with a fresh dispatch.
    pub fn marshal(&self, value: &Value) -> ConversionResult<Element> {
        self.engine.marshal_at_depth(value, self.depth + 1)
    }

    /// Hand `value` to the schema this wrapper wraps.
    pub fn marshal_inner(&self, value: &Value) -> ConversionResult<Element> {
        let Some((next, rest)) = self.inner.split_first() else {
            return Err(ConversionError::new(ErrorKind::Marshal {
                value_type: value.type_name().to_string(),
                reason: "wrapper has no inner schema".to_string(),
            }));
        };
        next.marshal(value, &MarshalContext::new(self.engine, rest, self.depth))
    }
}
