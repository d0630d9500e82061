//! Generic element trees for typeweave.
//!
//! An [`Element`] is a JSON-like tree (null, bool, int, float, string,
//! sequence, mapping) extended with a distinct [`Element::Missing`] marker
//! for values that were never provided. This crate owns the tree model and
//! the path-addressed algebra over it; typed conversion lives in
//! `typeweave-schema`.
//!
//! # Key operations
//!
//! - [`select`] / [`iterative_select`]: address sub-trees by [`Path`]
//! - [`merge`]: deep union of two trees, controlled by [`MergeOp`]
//! - [`override_at`], [`combine_at`], [`remove`]: pure path edits
//! - [`apply_overrides`]: an ordered list of [`Override`]s (`=`, `+=`, `~`)
//! - [`standardize`], [`resolve`], [`has_missing`]: normalisation helpers
//!
//! # Example
//!
//! ```rust
//! use typeweave_element::{apply_overrides, element_map, select, Element, Override, Path};
//!
//! let base = element_map! { "a" => element_map! { "b" => 1 } };
//! let overrides = ["a.c=2", "~a.b"].map(|text| Override::parse(text).unwrap());
//! let tree = apply_overrides(&base, &overrides).unwrap();
//!
//! assert_eq!(tree, element_map! { "a" => element_map! { "c" => 2 } });
//! assert_eq!(select(&tree, &Path::parse("a.c").unwrap()).unwrap(), &Element::Int(2));
//! ```

mod algebra;
mod convert;
mod element;
mod error;
mod overrides;
mod path;

pub use algebra::{
    META_KEY, MergeOp, Selection, Selections, combine_at, has_missing, iterative_select, merge,
    merge_all, merge_with, override_at, remove, resolve, resolve_with_key, select, standardize,
};
pub use element::{Element, MISSING, Mapping};
pub use error::ElementError;
pub use overrides::{Override, OverrideOp, apply_overrides};
pub use path::{DELIMITER, Path, escape_field};
