//! Introspectable description of what a schema accepts.

use indexmap::IndexMap;
use serde::Serialize;

/// Structured documentation for a schema.
///
/// Produced by [`crate::UnmarshalSchema::doc`]. Rendering is left to the
/// caller; the structure serializes to JSON for tooling.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Doc {
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Record fields or callable parameters.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, Doc>,
    /// Union members, sequence items, mapping values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Doc>,
    /// Namespace names accepted for the `name` discriminator, with the type
    /// each one selects.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub variants: IndexMap<String, String>,
}

impl Doc {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn with_member(mut self, member: Doc) -> Self {
        self.members.push(member);
        self
    }

    /// Follow a dotted list of field names.
    pub fn field(&self, path: &[&str]) -> Option<&Doc> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        self.fields.get(*first)?.field(rest)
    }
}
