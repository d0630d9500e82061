// Error types for marshalling, unmarshalling and registration

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use typeweave_element::{ElementError, Path};

/// Result type for conversion operations
pub type ConversionResult<T> = Result<T, ConversionError>;

/// Structured conversion error kinds
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ErrorKind {
    /// No value was provided and the target has no default
    MissingValue { expected: String },

    /// The element has the wrong shape for the target type
    TypeMismatch { expected: String, got: String },

    /// The element has the right shape but its content cannot be converted
    ConversionFailure { target: String, reason: String },

    /// A string is not one of the allowed literals
    InvalidChoice {
        value: String,
        allowed: Vec<String>,
        suggestion: Option<String>,
    },

    /// A mapping key does not name a field of the target record
    UnknownField {
        field: String,
        target: String,
        suggestion: Option<String>,
    },

    /// No member of a union accepted the element
    NoMatchingMember { target: String },

    /// A namespace discriminator could not be resolved, or an abstract
    /// target was given without one
    NamespaceResolution {
        target: String,
        name: Option<String>,
        suggestion: Option<String>,
    },

    /// Two applicable namespaces register different types under one name
    NamespaceCollision { name: String, candidates: Vec<String> },

    /// No schema can handle the target type
    UnsupportedType { type_name: String, reason: String },

    /// A path does not lead anywhere inside a type
    InvalidPath { segment: String, type_name: String },

    /// No marshal schema accepts the runtime value
    Marshal { value_type: String, reason: String },

    /// Nested conversion exceeded the configured depth
    NestingTooDeep { max_depth: usize },
}

impl ErrorKind {
    /// Get the error code for this error kind
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorKind::MissingValue { .. } => "TW-2-01",
            ErrorKind::TypeMismatch { .. } => "TW-2-02",
            ErrorKind::ConversionFailure { .. } => "TW-2-03",
            ErrorKind::InvalidChoice { .. } => "TW-2-04",
            ErrorKind::UnknownField { .. } => "TW-2-05",
            ErrorKind::NoMatchingMember { .. } => "TW-2-06",
            ErrorKind::NamespaceResolution { .. } => "TW-2-07",
            ErrorKind::NamespaceCollision { .. } => "TW-2-08",
            ErrorKind::UnsupportedType { .. } => "TW-2-09",
            ErrorKind::InvalidPath { .. } => "TW-2-10",
            ErrorKind::Marshal { .. } => "TW-2-11",
            ErrorKind::NestingTooDeep { .. } => "TW-2-12",
        }
    }

    /// Format a human-readable message from this error kind
    pub fn message(&self) -> String {
        match self {
            ErrorKind::MissingValue { expected } => {
                format!("Missing value for {}", expected)
            }
            ErrorKind::TypeMismatch { expected, got } => {
                format!("Expected {}, got {}", expected, got)
            }
            ErrorKind::ConversionFailure { target, reason } => {
                format!("Cannot convert to {}: {}", target, reason)
            }
            ErrorKind::InvalidChoice {
                value,
                allowed,
                suggestion,
            } => {
                let mut message = format!(
                    "Value must be one of: {}, got '{}'",
                    allowed.join(", "),
                    value
                );
                if let Some(suggestion) = suggestion {
                    message.push_str(&format!(" (did you mean '{}'?)", suggestion));
                }
                message
            }
            ErrorKind::UnknownField {
                field,
                target,
                suggestion,
            } => match suggestion {
                Some(suggestion) => format!(
                    "Unknown field '{}' for {} (did you mean '{}'?)",
                    field, target, suggestion
                ),
                None => format!("Unknown field '{}' for {}", field, target),
            },
            ErrorKind::NoMatchingMember { target } => {
                format!("No member of {} accepted the value", target)
            }
            ErrorKind::NamespaceResolution {
                target,
                name,
                suggestion,
            } => match (name, suggestion) {
                (None, _) => format!(
                    "{} is abstract; a registered `name` is required",
                    target
                ),
                (Some(name), Some(suggestion)) => format!(
                    "'{}' is not a registered {} (did you mean '{}'?)",
                    name, target, suggestion
                ),
                (Some(name), None) => format!("'{}' is not a registered {}", name, target),
            },
            ErrorKind::NamespaceCollision { name, candidates } => format!(
                "Name '{}' is ambiguous between: {}",
                name,
                candidates.join(", ")
            ),
            ErrorKind::UnsupportedType { type_name, reason } => {
                format!("Unsupported type {}: {}", type_name, reason)
            }
            ErrorKind::InvalidPath { segment, type_name } => {
                format!("'{}' does not select anything inside {}", segment, type_name)
            }
            ErrorKind::Marshal { value_type, reason } => {
                format!("Cannot marshal {}: {}", value_type, reason)
            }
            ErrorKind::NestingTooDeep { max_depth } => {
                format!("Nesting too deep (max depth: {})", max_depth)
            }
        }
    }
}

/// A conversion error with the path where it occurred.
///
/// Paths are relative while the error unwinds; each enclosing field, key or
/// index prepends its segment so that the outermost error names the full
/// root-to-leaf path.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub struct ConversionError {
    /// The structured error kind
    pub kind: ErrorKind,
    /// Location inside the element tree
    pub path: Path,
    /// Underlying failures, e.g. one per rejected union member
    pub causes: Vec<ConversionError>,
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = if self.path.is_root() {
            "(root)".to_string()
        } else {
            self.path.to_string()
        };
        let stage = if matches!(self.kind, ErrorKind::Marshal { .. }) {
            "Marshal"
        } else {
            "Unmarshal"
        };
        write!(f, "{} error at {}: {}", stage, at, self.kind.message())
    }
}

impl ConversionError {
    /// Create a new error at the current (relative root) position
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: Path::root(),
            causes: Vec::new(),
        }
    }

    pub fn missing(expected: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingValue {
            expected: expected.into(),
        })
    }

    pub fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        })
    }

    pub fn conversion(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConversionFailure {
            target: target.into(),
            reason: reason.into(),
        })
    }

    pub fn with_causes(mut self, causes: Vec<ConversionError>) -> Self {
        self.causes = causes;
        self
    }

    /// Prepend a path segment
    pub fn at(mut self, segment: impl Into<String>) -> Self {
        self.path.prepend(segment);
        self
    }

    /// Get the human-readable message for this error
    pub fn message(&self) -> String {
        self.kind.message()
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        self.kind.error_code()
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.kind, ErrorKind::MissingValue { .. })
    }

    /// The innermost error, following the first cause at each level.
    pub fn root_cause(&self) -> &ConversionError {
        self.causes.first().map_or(self, ConversionError::root_cause)
    }
}

/// Prepend path segments to errors flowing out of nested conversions.
pub trait ResultExt<T> {
    fn at(self, segment: impl Into<String>) -> ConversionResult<T>;
}

impl<T> ResultExt<T> for ConversionResult<T> {
    fn at(self, segment: impl Into<String>) -> ConversionResult<T> {
        self.map_err(|err| err.at(segment))
    }
}

/// Errors raised when registering schemas, namespaces or types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// A schema with the same name is already registered.
    #[error("Schema `{name}` is already registered")]
    DuplicateSchema { name: String },

    /// The before/after constraints of a new schema form a cycle.
    #[error("Ordering constraints for `{name}` form a cycle between: {}", cycle.join(", "))]
    CyclicOrder { name: String, cycle: Vec<String> },

    /// A namespace with the same name already exists.
    #[error("Namespace `{name}` already exists")]
    DuplicateNamespace { name: String },

    /// The name is already taken inside the namespace.
    #[error("Name `{name}` is already registered in namespace `{namespace}`")]
    DuplicateName { namespace: String, name: String },

    /// The type does not satisfy the namespace's base.
    #[error("`{subtype}` is not a subtype of `{base}` (namespace `{namespace}`)")]
    NotASubtype {
        namespace: String,
        subtype: String,
        base: String,
    },

    /// The type refers to itself without a way to stop.
    #[error("Type `{type_name}` is recursive without a base case: {}", cycle.join(" -> "))]
    UnguardedRecursion { type_name: String, cycle: Vec<String> },

    /// A type definition was used incorrectly.
    #[error("Invalid definition of `{type_name}`: {message}")]
    InvalidDefinition { type_name: String, message: String },
}

/// Any failure of a load that edits a tree and then unmarshals it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Element(#[from] ElementError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}
