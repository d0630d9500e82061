//! Errors raised by the element algebra.

use thiserror::Error;

use crate::path::Path;

/// An error raised while addressing or combining element trees.
///
/// Every variant carries the path at which the operation failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElementError {
    /// A segment named a mapping key or sequence index that does not exist.
    #[error("No such path: {path} ({message})")]
    NoSuchPath { path: Path, message: String },

    /// A segment that should index a sequence is not an integer.
    #[error("Invalid sequence index `{index}` at path: {path}")]
    InvalidIndex { path: Path, index: String },

    /// A segment tried to descend into a scalar.
    #[error("Cannot traverse into {kind} at path: {path}")]
    NotTraversable { path: Path, kind: &'static str },

    /// Two values of incompatible shape were combined.
    #[error("Cannot combine {existing} with {incoming} at path: {path}")]
    ShapeConflict {
        path: Path,
        existing: &'static str,
        incoming: &'static str,
    },

    /// The root of a tree cannot be removed.
    #[error("Cannot remove the root element")]
    RootRemoval,

    /// The textual path could not be parsed.
    #[error("Malformed path `{path}`: {message}")]
    MalformedPath { path: String, message: String },

    /// An override in a sequence failed; the whole sequence is aborted.
    #[error("Override #{index} (`{text}`) failed: {source}")]
    Override {
        index: usize,
        text: String,
        #[source]
        source: Box<ElementError>,
    },

    /// A foreign value could not be represented as an element.
    #[error("Cannot convert value at path {path}: {message}")]
    Conversion { path: Path, message: String },

    /// An override could not be parsed from its textual form.
    #[error("Malformed override `{text}`: {message}")]
    MalformedOverride { text: String, message: String },
}

impl ElementError {
    /// The path at which this error occurred, if it carries one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ElementError::NoSuchPath { path, .. }
            | ElementError::InvalidIndex { path, .. }
            | ElementError::NotTraversable { path, .. }
            | ElementError::ShapeConflict { path, .. }
            | ElementError::Conversion { path, .. } => Some(path),
            ElementError::Override { source, .. } => source.path(),
            ElementError::RootRemoval
            | ElementError::MalformedPath { .. }
            | ElementError::MalformedOverride { .. } => None,
        }
    }
}
