//! Ordered, path-addressed overrides.
//!
//! Three operations are supported, written textually as:
//!
//! - `path=value` replaces the value at `path`
//! - `path+=value` combines `value` with the existing value at `path`
//! - `~path` removes the value at `path`
//!
//! Values are parsed as YAML flow scalars or collections (`3`, `[1, 2]`,
//! `{k: v}`). Overrides apply strictly in order, each against the result of
//! every earlier one.

use std::fmt;

use yaml_rust2::YamlLoader;

use crate::algebra;
use crate::element::Element;
use crate::error::ElementError;
use crate::path::Path;

/// What an override does at its path.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideOp {
    /// Replace the sub-tree.
    Set(Element),
    /// Merge into the existing sub-tree.
    Combine(Element),
    /// Delete the sub-tree.
    Remove,
}

/// A single override.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub path: Path,
    pub op: OverrideOp,
}

impl Override {
    pub fn set(path: Path, value: impl Into<Element>) -> Self {
        Self {
            path,
            op: OverrideOp::Set(value.into()),
        }
    }

    pub fn combine(path: Path, value: impl Into<Element>) -> Self {
        Self {
            path,
            op: OverrideOp::Combine(value.into()),
        }
    }

    pub fn remove(path: Path) -> Self {
        Self {
            path,
            op: OverrideOp::Remove,
        }
    }

    /// Parse the textual form (`a.b=1`, `a+=[2]`, `~a.b`).
    pub fn parse(text: &str) -> Result<Self, ElementError> {
        if let Some(path) = text.strip_prefix('~') {
            return Ok(Override::remove(Path::parse(path)?));
        }

        let Some(eq) = find_assignment(text) else {
            return Err(ElementError::MalformedOverride {
                text: text.to_string(),
                message: "expected `path=value`, `path+=value` or `~path`".to_string(),
            });
        };
        let (lhs, rhs) = (&text[..eq], &text[eq + 1..]);
        let value = parse_value(text, rhs)?;
        match lhs.strip_suffix('+') {
            Some(path) => Ok(Override::combine(Path::parse(path)?, value)),
            None => Ok(Override::set(Path::parse(lhs)?, value)),
        }
    }

    /// Apply this override to `tree`, returning the new tree.
    pub fn apply(&self, tree: &Element) -> Result<Element, ElementError> {
        match &self.op {
            OverrideOp::Set(value) => algebra::override_at(tree, &self.path, value.clone()),
            OverrideOp::Combine(value) => algebra::combine_at(tree, &self.path, value.clone()),
            OverrideOp::Remove => algebra::remove(tree, &self.path),
        }
    }
}

/// Byte offset of the first `=` outside quotes and escapes.
fn find_assignment(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
        } else if ch == '"' || ch == '\'' {
            quote = Some(ch);
        } else if ch == '=' {
            return Some(i);
        }
    }
    None
}

fn parse_value(text: &str, raw: &str) -> Result<Element, ElementError> {
    if raw.trim().is_empty() {
        return Ok(Element::Null);
    }
    let docs = YamlLoader::load_from_str(raw).map_err(|e| ElementError::MalformedOverride {
        text: text.to_string(),
        message: e.to_string(),
    })?;
    match docs.first() {
        Some(doc) => Element::from_yaml(doc),
        None => Ok(Element::Null),
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            OverrideOp::Set(value) => write!(f, "{}={}", self.path, value),
            OverrideOp::Combine(value) => write!(f, "{}+={}", self.path, value),
            OverrideOp::Remove => write!(f, "~{}", self.path),
        }
    }
}

/// Apply overrides in order. The first failure aborts the whole sequence and
/// reports which override failed.
pub fn apply_overrides(tree: &Element, overrides: &[Override]) -> Result<Element, ElementError> {
    let mut current = tree.clone();
    for (index, item) in overrides.iter().enumerate() {
        tracing::trace!(index, text = %item, "Applying override");
        current = item.apply(&current).map_err(|source| ElementError::Override {
            index,
            text: item.to_string(),
            source: Box::new(source),
        })?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element_map;

    fn parse_all(texts: &[&str]) -> Vec<Override> {
        texts.iter().map(|t| Override::parse(t).unwrap()).collect()
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            Override::parse("a.b=1").unwrap(),
            Override::set(Path::parse("a.b").unwrap(), 1)
        );
        assert_eq!(
            Override::parse("a+=[2, 3]").unwrap(),
            Override::combine(Path::parse("a").unwrap(), vec![2, 3])
        );
        assert_eq!(
            Override::parse("~a.b").unwrap(),
            Override::remove(Path::parse("a.b").unwrap())
        );
    }

    #[test]
    fn test_parse_quoted_equals_in_path() {
        let parsed = Override::parse("'x=y'=ok").unwrap();
        assert_eq!(parsed.path.segments(), ["x=y"]);
        assert_eq!(parsed.op, OverrideOp::Set(Element::from("ok")));
    }

    #[test]
    fn test_parse_empty_value_is_null() {
        assert_eq!(Override::parse("a=").unwrap().op, OverrideOp::Set(Element::Null));
    }

    #[test]
    fn test_parse_without_assignment() {
        assert!(matches!(
            Override::parse("a.b").unwrap_err(),
            ElementError::MalformedOverride { .. }
        ));
    }

    #[test]
    fn test_sequence_set_set_remove() {
        let overrides = parse_all(&["a.b=1", "a.c=2", "~a.b"]);
        let out = apply_overrides(&Element::map(), &overrides).unwrap();
        assert_eq!(out, element_map! { "a" => element_map! { "c" => 2 } });
    }

    #[test]
    fn test_combine_on_scalar_aborts_sequence() {
        let overrides = parse_all(&["a=1", "a+=2", "b=3"]);
        let err = apply_overrides(&Element::map(), &overrides).unwrap_err();
        let ElementError::Override { index, source, .. } = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(*index, 1);
        assert!(matches!(**source, ElementError::ShapeConflict { .. }));
        insta::assert_snapshot!(
            err.to_string(),
            @"Override #1 (`a+=2`) failed: Cannot combine int with int at path: a"
        );
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let item = Override::combine(Path::parse("m").unwrap(), element_map! { "k" => "v" });
        assert_eq!(Override::parse(&item.to_string()).unwrap(), item);
    }
}
