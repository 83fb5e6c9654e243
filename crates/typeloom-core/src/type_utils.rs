//! Queries over unions and intersections shared by the passes

use std::collections::{BTreeMap, BTreeSet};

use crate::attributes::{Combination, TypeAttributes};
use crate::graph::TypeGraph;
use crate::types::{PrimitiveKind, Type, TypeKind, TypeRef};

/// Members of a set of unions (or intersections), flattened through nested
/// set operations of the same kind.
///
/// When `combination` is given, the attributes of the set operations
/// themselves are merged and returned. Inside intersections `any` is the
/// neutral element and is left out of the members.
pub fn set_operation_members_recursively(
    graph: &TypeGraph,
    set_operations: &[TypeRef],
    combination: Option<Combination>,
) -> (BTreeSet<TypeRef>, TypeAttributes) {
    let Some(first) = set_operations.first() else {
        return (BTreeSet::new(), TypeAttributes::new());
    };
    let kind = graph.kind_of(*first);
    assert!(
        kind.is_set_operation(),
        "{:?} is a {}, not a set operation",
        first,
        kind
    );
    let include_any = kind != TypeKind::Intersection;

    let mut processed = BTreeSet::new();
    let mut members = BTreeSet::new();
    let mut attributes = Vec::new();
    let mut stack: Vec<TypeRef> = set_operations.iter().rev().copied().collect();
    while let Some(r) = stack.pop() {
        let ty = graph.type_at(r);
        if ty.kind() == kind {
            if !processed.insert(r) {
                continue;
            }
            if combination.is_some() {
                attributes.push(graph.attributes_of(r));
            }
            if let Some(nested) = ty.members() {
                stack.extend(nested.iter().rev().copied());
            }
        } else if include_any || ty.kind() != TypeKind::Primitive(PrimitiveKind::Any) {
            members.insert(r);
        } else if combination.is_some() {
            attributes.push(graph.attributes_of(r));
        }
    }

    let attributes = match combination {
        Some(combination) => TypeAttributes::combine(combination, attributes),
        None => TypeAttributes::new(),
    };
    (members, attributes)
}

/// Group set operations whose recursive member sets are equal, so each
/// group can be replaced by a single type.
///
/// A set operation with only one member is grouped together with that
/// member: the member gets replaced by whatever the group turns into.
pub fn make_groups_to_flatten(
    graph: &TypeGraph,
    set_operations: &[TypeRef],
    mut include: impl FnMut(&BTreeSet<TypeRef>) -> bool,
) -> Vec<Vec<TypeRef>> {
    let mut by_members: BTreeMap<BTreeSet<TypeRef>, BTreeSet<TypeRef>> = BTreeMap::new();
    for &r in set_operations {
        let (members, _) = set_operation_members_recursively(graph, &[r], None);
        if !include(&members) {
            continue;
        }
        let group = by_members.entry(members.clone()).or_default();
        group.insert(r);
        if members.len() == 1 {
            group.extend(members);
        }
    }

    // A single member may also head a group of its own; keep it in the
    // first group only.
    let mut placed = BTreeSet::new();
    by_members
        .into_values()
        .map(|group| {
            group
                .into_iter()
                .filter(|r| placed.insert(*r))
                .collect::<Vec<_>>()
        })
        .filter(|group| !group.is_empty())
        .collect()
}

/// A union that needs no further flattening.
pub fn is_canonical_union(graph: &TypeGraph, r: TypeRef) -> bool {
    let Type::Union { members } = graph.type_at(r) else {
        return false;
    };
    if members.len() <= 1 {
        return false;
    }
    let mut kinds = BTreeSet::new();
    for member in members {
        let kind = graph.kind_of(*member);
        if kind.is_set_operation()
            || matches!(
                kind,
                TypeKind::Primitive(PrimitiveKind::Any) | TypeKind::Primitive(PrimitiveKind::None)
            )
        {
            return false;
        }
        if !kinds.insert(kind) {
            return false;
        }
    }
    if kinds.contains(&TypeKind::Primitive(PrimitiveKind::String)) && kinds.contains(&TypeKind::Enum)
    {
        return false;
    }
    kinds.iter().filter(|k| k.is_object_family()).count() <= 1
}

/// The member of a union with the given kind.
pub fn find_member(graph: &TypeGraph, union: TypeRef, kind: TypeKind) -> Option<TypeRef> {
    graph
        .type_at(union)
        .members()?
        .iter()
        .copied()
        .find(|m| graph.kind_of(*m) == kind)
}

/// Split a union into its `null` member and the rest.
pub fn remove_null_from_union(graph: &TypeGraph, union: TypeRef) -> (Option<TypeRef>, BTreeSet<TypeRef>) {
    let null = find_member(graph, union, TypeKind::Primitive(PrimitiveKind::Null));
    let rest = graph
        .type_at(union)
        .members()
        .map(|members| {
            members
                .iter()
                .copied()
                .filter(|m| Some(*m) != null)
                .collect()
        })
        .unwrap_or_default();
    (null, rest)
}

/// For `T | null`, the `T`.
pub fn nullable_from_union(graph: &TypeGraph, union: TypeRef) -> Option<TypeRef> {
    let (null, rest) = remove_null_from_union(graph, union);
    null?;
    if rest.len() != 1 {
        return None;
    }
    rest.into_iter().next()
}

/// Members that are strings on the wire: plain and transformed strings and
/// enums.
pub fn string_like_members(graph: &TypeGraph, members: &BTreeSet<TypeRef>) -> BTreeSet<TypeRef> {
    members
        .iter()
        .copied()
        .filter(|m| graph.kind_of(*m).is_string_like())
        .collect()
}
