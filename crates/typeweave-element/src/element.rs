//! The generic tree representation.

use std::fmt;

use indexmap::IndexMap;

/// Mapping storage. Insertion order is kept for display; equality ignores it.
pub type Mapping = IndexMap<String, Element>;

/// A JSON-like tree value.
///
/// `Missing` marks a value that was never provided. It is distinct from
/// `Null` (an explicit "nothing") and never compares equal to it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Element {
    #[default]
    Missing,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Element>),
    Map(Mapping),
}

/// The "never provided" sentinel.
pub const MISSING: Element = Element::Missing;

impl Element {
    /// Empty mapping.
    pub fn map() -> Self {
        Element::Map(Mapping::new())
    }

    /// Empty sequence.
    pub fn seq() -> Self {
        Element::Seq(Vec::new())
    }

    /// Human-readable name of this element's shape, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Element::Missing => "missing",
            Element::Null => "null",
            Element::Bool(_) => "bool",
            Element::Int(_) => "int",
            Element::Float(_) => "float",
            Element::Str(_) => "str",
            Element::Seq(_) => "sequence",
            Element::Map(_) => "mapping",
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Element::Missing)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Element::Null)
    }

    /// True for anything that is not a sequence or a mapping.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Element::Seq(_) | Element::Map(_))
    }

    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Element::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Element::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Element]> {
        match self {
            Element::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Element::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a key in a mapping element.
    pub fn get(&self, key: &str) -> Option<&Element> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl From<bool> for Element {
    fn from(value: bool) -> Self {
        Element::Bool(value)
    }
}

impl From<i64> for Element {
    fn from(value: i64) -> Self {
        Element::Int(value)
    }
}

impl From<i32> for Element {
    fn from(value: i32) -> Self {
        Element::Int(i64::from(value))
    }
}

impl From<f64> for Element {
    fn from(value: f64) -> Self {
        Element::Float(value)
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::Str(value.to_string())
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        Element::Str(value)
    }
}

impl<T: Into<Element>> From<Vec<T>> for Element {
    fn from(items: Vec<T>) -> Self {
        Element::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl From<Mapping> for Element {
    fn from(map: Mapping) -> Self {
        Element::Map(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Element)> for Element {
    fn from_iter<I: IntoIterator<Item = (K, Element)>>(iter: I) -> Self {
        Element::Map(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Missing => write!(f, "???"),
            Element::Null => write!(f, "null"),
            Element::Bool(b) => write!(f, "{}", b),
            Element::Int(i) => write!(f, "{}", i),
            Element::Float(x) => write!(f, "{:?}", x),
            Element::Str(s) => write!(f, "{:?}", s),
            Element::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Element::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Build an [`Element::Map`] from `key => value` pairs.
///
/// ```rust
/// use typeweave_element::{element_map, Element};
///
/// let tree = element_map! { "a" => 1, "b" => element_map! { "c" => "x" } };
/// assert_eq!(tree.get("a"), Some(&Element::Int(1)));
/// ```
#[macro_export]
macro_rules! element_map {
    () => { $crate::Element::map() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Mapping::new();
        $( map.insert(::std::string::String::from($key), $crate::Element::from($value)); )+
        $crate::Element::Map(map)
    }};
}
