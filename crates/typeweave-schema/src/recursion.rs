//! Detection of type cycles that would recurse forever on missing input.
//!
//! Unmarshalling `Missing` into a record unmarshals every field from
//! `Missing` as well. If a record reaches itself that way, the conversion
//! never terminates. A cycle is safe when it passes through an edge that
//! stops on `Missing`:
//!
//! - a field with a default
//! - an optional, or a union with a `None` member
//! - a sequence or mapping (empty on `Missing`)
//!
//! Every other kind either terminates or fails on `Missing`.

use std::collections::HashSet;

use crate::types::{TypeId, TypeKind, TypeRef};

fn unguarded_edges(ty: &TypeRef) -> Vec<TypeRef> {
    match ty.kind() {
        TypeKind::Record(_) | TypeKind::Callable(_) => ty
            .collect_fields()
            .into_iter()
            .filter(|field| field.default.is_none())
            .map(|field| field.ty)
            .collect(),
        TypeKind::Union(members) if !ty.accepts_none() => members.clone(),
        _ => Vec::new(),
    }
}

/// Names along the first unguarded cycle reachable from `root`, if any.
pub(crate) fn find_unguarded_cycle(root: &TypeRef) -> Option<Vec<String>> {
    let mut stack = Vec::new();
    let mut finished = HashSet::new();
    visit(root, &mut stack, &mut finished)
}

fn visit(
    ty: &TypeRef,
    stack: &mut Vec<TypeRef>,
    finished: &mut HashSet<TypeId>,
) -> Option<Vec<String>> {
    if let Some(start) = stack.iter().position(|seen| seen == ty) {
        let mut cycle: Vec<String> = stack[start..].iter().map(|t| t.name().to_string()).collect();
        cycle.push(ty.name().to_string());
        return Some(cycle);
    }
    if finished.contains(&ty.id()) {
        return None;
    }

    stack.push(ty.clone());
    for next in unguarded_edges(ty) {
        if let Some(cycle) = visit(&next, stack, finished) {
            return Some(cycle);
        }
    }
    stack.pop();
    finished.insert(ty.id());
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;

    #[test]
    fn test_direct_self_reference_rejected() {
        let node = TypeRef::record("Node").declare();
        node.define_fields(vec![Field::new("next", &node)]).unwrap();
        assert_eq!(
            find_unguarded_cycle(&node),
            Some(vec!["Node".to_string(), "Node".to_string()])
        );
    }

    #[test]
    fn test_optional_guards_cycle() {
        let node = TypeRef::record("Node").declare();
        node.define_fields(vec![Field::new("next", &TypeRef::optional(&node))])
            .unwrap();
        assert_eq!(find_unguarded_cycle(&node), None);
    }

    #[test]
    fn test_default_guards_cycle() {
        let node = TypeRef::record("Node").declare();
        node.define_fields(vec![Field::new("next", &node).with_default(crate::Value::None)])
            .unwrap();
        assert_eq!(find_unguarded_cycle(&node), None);
    }

    #[test]
    fn test_container_guards_cycle() {
        let tree = TypeRef::record("Tree").declare();
        tree.define_fields(vec![Field::new("children", &TypeRef::sequence(&tree))])
            .unwrap();
        assert_eq!(find_unguarded_cycle(&tree), None);
    }

    #[test]
    fn test_indirect_cycle_through_union() {
        let a = TypeRef::record("A").declare();
        let b = TypeRef::record("B")
            .field(Field::new("back", &TypeRef::union(&[TypeRef::int(), a.clone()])))
            .build();
        a.define_fields(vec![Field::new("b", &b)]).unwrap();
        let cycle = find_unguarded_cycle(&a).unwrap();
        assert_eq!(cycle.first().map(String::as_str), Some("A"));
        assert_eq!(cycle.last().map(String::as_str), Some("A"));
    }
}
