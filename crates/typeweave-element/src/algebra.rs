//! Pure operations over element trees.
//!
//! None of these functions mutate their input: each returns a new tree (or a
//! borrowed sub-tree for selection).
//!
//! Sequence segments are decimal indices. Negative indices count from the end
//! of the sequence, so `items.-1` addresses the last item.

use crate::element::{Element, Mapping};
use crate::error::ElementError;
use crate::path::Path;

/// Reserved top-level key holding metadata that `resolve` strips.
pub const META_KEY: &str = "_meta_";

/// How sequences behave when two trees are merged.
///
/// Mappings are always merged key by key and scalars are always replaced by
/// the later value; only sequences differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeOp {
    /// Later sequences replace earlier ones.
    Prefer,

    /// Later sequences are appended to earlier ones.
    #[default]
    Concat,
}

/// One step of an [`iterative_select`] walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<'a> {
    /// Element found at `path`.
    pub element: &'a Element,
    /// Segments traversed so far.
    pub path: Path,
    /// Segments still to traverse.
    pub remaining: Path,
}

enum Index {
    At(usize),
    End,
    OutOfRange,
}

fn sequence_index(segment: &str, len: usize, at: &Path) -> Result<Index, ElementError> {
    let raw: i64 = segment.parse().map_err(|_| ElementError::InvalidIndex {
        path: at.clone(),
        index: segment.to_string(),
    })?;
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let index = if raw < 0 { raw + len_i } else { raw };
    Ok(if index < 0 || index > len_i {
        Index::OutOfRange
    } else if index == len_i {
        Index::End
    } else {
        Index::At(index as usize)
    })
}

fn step<'a>(element: &'a Element, segment: &str, at: &Path) -> Result<&'a Element, ElementError> {
    match element {
        Element::Map(map) => map.get(segment).ok_or_else(|| ElementError::NoSuchPath {
            path: at.clone(),
            message: format!("key `{}` not found", segment),
        }),
        Element::Seq(items) => match sequence_index(segment, items.len(), at)? {
            Index::At(i) => Ok(&items[i]),
            Index::End | Index::OutOfRange => Err(ElementError::NoSuchPath {
                path: at.clone(),
                message: format!("index {} out of range for length {}", segment, items.len()),
            }),
        },
        other => Err(ElementError::NoSuchPath {
            path: at.clone(),
            message: format!("cannot index into {}", other.kind_name()),
        }),
    }
}

#[derive(Clone)]
enum WalkState<'a> {
    At(&'a Element),
    Failed(ElementError),
    Done,
}

/// Lazy walk over every prefix of a path. See [`iterative_select`].
#[derive(Clone)]
pub struct Selections<'a> {
    path: Path,
    depth: usize,
    state: WalkState<'a>,
}

impl<'a> Iterator for Selections<'a> {
    type Item = Result<Selection<'a>, ElementError>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, WalkState::Done) {
            WalkState::Done => None,
            WalkState::Failed(err) => Some(Err(err)),
            WalkState::At(element) => {
                let depth = self.depth;
                let selection = Selection {
                    element,
                    path: self.path.prefix(depth),
                    remaining: self.path.suffix(depth),
                };
                if let Some(segment) = self.path.segments().get(depth) {
                    let at = self.path.prefix(depth + 1);
                    self.state = match step(element, segment, &at) {
                        Ok(child) => WalkState::At(child),
                        Err(err) => WalkState::Failed(err),
                    };
                    self.depth += 1;
                }
                Some(Ok(selection))
            }
        }
    }
}

/// Walk `path` from the root, yielding the element at every prefix.
///
/// The first item is always the root itself. If a segment cannot be
/// resolved, the walk yields one error and ends. The iterator can be cloned
/// to restart from any point.
pub fn iterative_select<'a>(tree: &'a Element, path: &Path) -> Selections<'a> {
    Selections {
        path: path.clone(),
        depth: 0,
        state: WalkState::At(tree),
    }
}

/// Return the sub-tree at `path`. The root path returns `tree` itself.
pub fn select<'a>(tree: &'a Element, path: &Path) -> Result<&'a Element, ElementError> {
    let mut found = tree;
    for selection in iterative_select(tree, path) {
        found = selection?.element;
    }
    Ok(found)
}

/// Deep-merge `b` into `a` with the default [`MergeOp::Concat`].
///
/// Mappings merge recursively, sequences concatenate, scalars are replaced by
/// `b`, and `Missing` on either side yields the other side. A mapping
/// meeting a sequence is a [`ElementError::ShapeConflict`].
pub fn merge(a: &Element, b: &Element) -> Result<Element, ElementError> {
    merge_with(a, b, MergeOp::Concat)
}

pub fn merge_with(a: &Element, b: &Element, op: MergeOp) -> Result<Element, ElementError> {
    merge_at(a, b, op, &mut Path::root())
}

/// Fold several layers left to right. An empty input yields `Missing`.
pub fn merge_all<'a, I>(layers: I, op: MergeOp) -> Result<Element, ElementError>
where
    I: IntoIterator<Item = &'a Element>,
{
    let mut merged = Element::Missing;
    for layer in layers {
        merged = merge_with(&merged, layer, op)?;
    }
    Ok(merged)
}

fn merge_at(
    a: &Element,
    b: &Element,
    op: MergeOp,
    at: &mut Path,
) -> Result<Element, ElementError> {
    match (a, b) {
        (_, Element::Missing) => Ok(a.clone()),
        (Element::Missing, _) => Ok(b.clone()),
        (Element::Map(left), Element::Map(right)) => {
            let mut out = left.clone();
            for (key, value) in right {
                at.push(key.clone());
                let merged = match left.get(key) {
                    Some(existing) => merge_at(existing, value, op, at),
                    None => Ok(value.clone()),
                };
                at.pop();
                out.insert(key.clone(), merged?);
            }
            Ok(Element::Map(out))
        }
        (Element::Seq(left), Element::Seq(right)) => match op {
            MergeOp::Concat => Ok(Element::Seq(left.iter().chain(right).cloned().collect())),
            MergeOp::Prefer => Ok(b.clone()),
        },
        (Element::Map(_), Element::Seq(_)) | (Element::Seq(_), Element::Map(_)) => {
            Err(ElementError::ShapeConflict {
                path: at.clone(),
                existing: a.kind_name(),
                incoming: b.kind_name(),
            })
        }
        _ => Ok(b.clone()),
    }
}

#[derive(Debug, Clone, Copy)]
enum Write {
    Set,
    Combine,
}

/// Replace the sub-tree at `path` with `value`.
///
/// Missing or absent intermediate keys become empty mappings. Sequences are
/// never created implicitly; an index equal to the sequence length appends.
pub fn override_at(tree: &Element, path: &Path, value: Element) -> Result<Element, ElementError> {
    let mut out = tree.clone();
    write_at(&mut out, path.segments(), value, Write::Set, &mut Path::root())?;
    Ok(out)
}

/// Combine `value` with whatever currently sits at `path`.
///
/// An absent target is simply set. Two mappings deep-merge with `value`
/// winning on conflicting keys; two sequences concatenate. Any other pairing
/// (including an existing scalar) is a [`ElementError::ShapeConflict`].
pub fn combine_at(tree: &Element, path: &Path, value: Element) -> Result<Element, ElementError> {
    let mut out = tree.clone();
    write_at(&mut out, path.segments(), value, Write::Combine, &mut Path::root())?;
    Ok(out)
}

fn write_at(
    slot: &mut Element,
    segments: &[String],
    value: Element,
    mode: Write,
    at: &mut Path,
) -> Result<(), ElementError> {
    let Some((field, rest)) = segments.split_first() else {
        *slot = match mode {
            Write::Set => value,
            Write::Combine => combine(slot, value, at)?,
        };
        return Ok(());
    };

    if slot.is_missing() {
        *slot = Element::map();
    }
    let kind = slot.kind_name();
    at.push(field.clone());
    let result = match slot {
        Element::Map(map) => {
            let child = map.entry(field.clone()).or_insert(Element::Missing);
            write_at(child, rest, value, mode, at)
        }
        Element::Seq(items) => match sequence_index(field, items.len(), at)? {
            Index::At(i) => write_at(&mut items[i], rest, value, mode, at),
            Index::End => {
                items.push(Element::Missing);
                let last = items.len() - 1;
                write_at(&mut items[last], rest, value, mode, at)
            }
            Index::OutOfRange => Err(ElementError::NoSuchPath {
                path: at.clone(),
                message: format!("index {} out of range for length {}", field, items.len()),
            }),
        },
        _ => {
            at.pop();
            return Err(ElementError::NotTraversable {
                path: at.clone(),
                kind,
            });
        }
    };
    at.pop();
    result
}

fn combine(existing: &Element, incoming: Element, at: &mut Path) -> Result<Element, ElementError> {
    match (existing, &incoming) {
        (Element::Missing, _) => Ok(incoming),
        (_, Element::Missing) => Ok(existing.clone()),
        (Element::Map(_), Element::Map(_)) | (Element::Seq(_), Element::Seq(_)) => {
            merge_at(existing, &incoming, MergeOp::Concat, at)
        }
        _ => Err(ElementError::ShapeConflict {
            path: at.clone(),
            existing: existing.kind_name(),
            incoming: incoming.kind_name(),
        }),
    }
}

/// Delete the key or index at `path` from its parent.
///
/// Removing something that is not there is a no-op, which makes the
/// operation idempotent. Traversing through a scalar, or using a non-numeric
/// segment on a sequence, is an error, as is removing the root.
pub fn remove(tree: &Element, path: &Path) -> Result<Element, ElementError> {
    if path.is_root() {
        return Err(ElementError::RootRemoval);
    }
    let mut out = tree.clone();
    remove_in(&mut out, path.segments(), &mut Path::root())?;
    Ok(out)
}

fn remove_in(slot: &mut Element, segments: &[String], at: &mut Path) -> Result<(), ElementError> {
    let Some((field, rest)) = segments.split_first() else {
        return Ok(());
    };
    match slot {
        Element::Missing => Ok(()),
        Element::Map(map) => {
            if rest.is_empty() {
                map.shift_remove(field);
                return Ok(());
            }
            match map.get_mut(field) {
                Some(child) => {
                    at.push(field.clone());
                    let result = remove_in(child, rest, at);
                    at.pop();
                    result
                }
                None => Ok(()),
            }
        }
        Element::Seq(items) => {
            at.push(field.clone());
            let result = match sequence_index(field, items.len(), at) {
                Ok(Index::At(i)) if rest.is_empty() => {
                    items.remove(i);
                    Ok(())
                }
                Ok(Index::At(i)) => remove_in(&mut items[i], rest, at),
                Ok(Index::End | Index::OutOfRange) => Ok(()),
                Err(err) => Err(err),
            };
            at.pop();
            result
        }
        other => Err(ElementError::NotTraversable {
            path: at.clone(),
            kind: other.kind_name(),
        }),
    }
}

/// Canonicalise representation-equivalent forms.
///
/// Mapping keys that spell a dotted path (`"a.b": 1`) are expanded into
/// nested mappings (`a: {b: 1}`) and merged with their siblings. A key that
/// addresses the root (`"."`) merges its value into the enclosing mapping.
/// An expanded key that meets a scalar sibling (`a: 1` next to `"a.b": 2`)
/// is a [`ElementError::ShapeConflict`].
pub fn standardize(tree: &Element) -> Result<Element, ElementError> {
    standardize_at(tree, &mut Path::root())
}

fn standardize_at(tree: &Element, at: &mut Path) -> Result<Element, ElementError> {
    match tree {
        Element::Map(map) => {
            let mut out = Element::map();
            for (key, value) in map {
                at.push(key.clone());
                let value = standardize_at(value, at);
                at.pop();
                let value = value?;

                let key_path =
                    Path::parse(key).unwrap_or_else(|_| Path::from_segments([key.clone()]));
                if key_path.is_root() && !matches!(value, Element::Map(_)) {
                    if map.len() == 1 {
                        return Ok(value);
                    }
                    return Err(ElementError::ShapeConflict {
                        path: at.clone(),
                        existing: "mapping",
                        incoming: value.kind_name(),
                    });
                }
                let nested = key_path
                    .segments()
                    .iter()
                    .rev()
                    .fold(value, |inner, segment| {
                        let mut wrapper = Mapping::new();
                        wrapper.insert(segment.clone(), inner);
                        Element::Map(wrapper)
                    });
                out = merge_expanded(&out, &nested, at)?;
            }
            Ok(out)
        }
        Element::Seq(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                at.push(i.to_string());
                let converted = standardize_at(item, at);
                at.pop();
                out.push(converted?);
            }
            Ok(Element::Seq(out))
        }
        other => Ok(other.clone()),
    }
}

/// Merge an expanded dotted key into its siblings. A mapping never silently
/// replaces a scalar or the other way round.
fn merge_expanded(a: &Element, b: &Element, at: &mut Path) -> Result<Element, ElementError> {
    match (a, b) {
        (_, Element::Missing) => Ok(a.clone()),
        (Element::Missing, _) => Ok(b.clone()),
        (Element::Map(left), Element::Map(right)) => {
            let mut out = left.clone();
            for (key, value) in right {
                at.push(key.clone());
                let merged = match left.get(key) {
                    Some(existing) => merge_expanded(existing, value, at),
                    None => Ok(value.clone()),
                };
                at.pop();
                out.insert(key.clone(), merged?);
            }
            Ok(Element::Map(out))
        }
        (Element::Map(_), _) | (_, Element::Map(_)) => Err(ElementError::ShapeConflict {
            path: at.clone(),
            existing: a.kind_name(),
            incoming: b.kind_name(),
        }),
        _ => Ok(b.clone()),
    }
}

/// True if the tree is `Missing` or contains a `Missing` anywhere.
pub fn has_missing(tree: &Element) -> bool {
    match tree {
        Element::Missing => true,
        Element::Seq(items) => items.iter().any(has_missing),
        Element::Map(map) => map.values().any(has_missing),
        _ => false,
    }
}

/// Standardize the tree and strip the reserved [`META_KEY`] from the top
/// level mapping.
pub fn resolve(tree: &Element) -> Result<Element, ElementError> {
    resolve_with_key(tree, META_KEY)
}

pub fn resolve_with_key(tree: &Element, meta_key: &str) -> Result<Element, ElementError> {
    let mut out = standardize(tree)?;
    if let Element::Map(map) = &mut out {
        map.shift_remove(meta_key);
    }
    Ok(out)
}
