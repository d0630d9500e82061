//! Dotted paths into element trees.
//!
//! A path is an ordered list of string segments. The textual form joins the
//! segments with `.`; a segment may contain a literal `.` (or a quote) either
//! by escaping it with `\` or by wrapping it in `'...'` / `"..."`.
//!
//! ```rust
//! use typeweave_element::Path;
//!
//! let path = Path::parse(r#"servers."eu.west".port"#).unwrap();
//! assert_eq!(path.segments(), ["servers", "eu.west", "port"]);
//! assert_eq!(path.to_string(), r"servers.eu\.west.port");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::ElementError;

/// Delimiter between path segments.
pub const DELIMITER: char = '.';

/// A location inside an element tree.
///
/// The empty path addresses the root. Segments are never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a textual path.
    ///
    /// `""` and `"."` both parse to the root. Leading, trailing and repeated
    /// delimiters are collapsed.
    pub fn parse(text: &str) -> Result<Self, ElementError> {
        let mut segments = Vec::new();
        let mut field = String::new();
        let mut quote: Option<char> = None;
        let mut escaped = false;

        for ch in text.chars() {
            if escaped {
                field.push(ch);
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if let Some(q) = quote {
                if ch == q {
                    quote = None;
                } else {
                    field.push(ch);
                }
            } else if ch == '"' || ch == '\'' {
                quote = Some(ch);
            } else if ch == DELIMITER {
                if !field.is_empty() {
                    segments.push(std::mem::take(&mut field));
                }
            } else {
                field.push(ch);
            }
        }

        if let Some(q) = quote {
            return Err(ElementError::MalformedPath {
                path: text.to_string(),
                message: format!("closing quote `{}` missing from path", q),
            });
        }
        if escaped {
            return Err(ElementError::MalformedPath {
                path: text.to_string(),
                message: "escape character can not be last character of path".to_string(),
            });
        }
        if !field.is_empty() {
            segments.push(field);
        }
        Ok(Self { segments })
    }

    /// Build a path from already-split segments. Empty segments are dropped.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    /// Split off the first segment.
    pub fn head(&self) -> Option<(&str, Path)> {
        let (first, rest) = self.segments.split_first()?;
        Some((first.as_str(), Path::from_segments(rest.iter().cloned())))
    }

    /// Split off the last segment.
    pub fn tail(&self) -> Option<(Path, &str)> {
        let (last, rest) = self.segments.split_last()?;
        Some((Path::from_segments(rest.iter().cloned()), last.as_str()))
    }

    /// Prefix of the first `n` segments.
    pub fn prefix(&self, n: usize) -> Path {
        Path::from_segments(self.segments.iter().take(n).cloned())
    }

    /// Everything after the first `n` segments.
    pub fn suffix(&self, n: usize) -> Path {
        Path::from_segments(self.segments.iter().skip(n).cloned())
    }

    /// Return a new path with `segment` added at the end.
    pub fn child(&self, segment: impl Into<String>) -> Path {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        let segment = segment.into();
        if !segment.is_empty() {
            self.segments.push(segment);
        }
    }

    pub fn pop(&mut self) -> Option<String> {
        self.segments.pop()
    }

    /// Add `segment` at the front. Used when errors unwind out of nested values.
    pub fn prepend(&mut self, segment: impl Into<String>) {
        let segment = segment.into();
        if !segment.is_empty() {
            self.segments.insert(0, segment);
        }
    }

    /// Concatenate two paths.
    pub fn join(&self, other: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Path { segments }
    }
}

/// Escape delimiters, quotes and backslashes in a single field.
pub fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for ch in field.chars() {
        if matches!(ch, '"' | '\'' | '\\' | DELIMITER) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "{}", DELIMITER);
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", DELIMITER)?;
            }
            write!(f, "{}", escape_field(segment))?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = ElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl<S: Into<String>> FromIterator<S> for Path {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Path::from_segments(iter)
    }
}

impl From<Vec<String>> for Path {
    fn from(segments: Vec<String>) -> Self {
        Path::from_segments(segments)
    }
}

impl From<&[&str]> for Path {
    fn from(segments: &[&str]) -> Self {
        Path::from_segments(segments.iter().copied())
    }
}

impl serde::Serialize for Path {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
