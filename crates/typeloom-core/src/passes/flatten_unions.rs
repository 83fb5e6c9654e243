use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::attributes::TypeAttributes;
use crate::graph::TypeGraph;
use crate::rewrite::{GraphRewriteBuilder, Replacer};
use crate::type_utils::{is_canonical_union, make_groups_to_flatten};
use crate::types::{TypeKind, TypeRef};
use crate::unify::{unify_types, NestedUnification, UnifyUnionBuilder};

use super::reachable_of_kind;

struct UnionFlattener {
    conflate_numbers: bool,
    make_object_types: bool,
    nested: NestedUnification,
    needs_repeat: bool,
}

impl Replacer for UnionFlattener {
    fn replace(
        &mut self,
        group: &[TypeRef],
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let types: BTreeSet<TypeRef> = group.iter().copied().collect();
        let (conflate_numbers, make_object_types, nested) =
            (self.conflate_numbers, self.make_object_types, self.nested);
        let mut unifier = UnifyUnionBuilder::new(self, conflate_numbers, make_object_types, nested);
        let result = unify_types(
            &types,
            TypeAttributes::new(),
            builder,
            &mut unifier,
            Some(forwarding_ref),
        );
        if unifier.created_nested_unions() {
            self.needs_repeat = true;
        }
        result
    }
}

/// Replace every non-canonical union by its unification.
///
/// Unions that still contain intersections are left for
/// [`resolve_intersections`](super::resolve_intersections) and keep the
/// pass from reporting done. With [`NestedUnification::Shallow`] nested
/// unions created for properties and items also require another run.
#[instrument(skip(graph), fields(types = graph.len()), level = "debug")]
pub fn flatten_unions(
    graph: &Arc<TypeGraph>,
    conflate_numbers: bool,
    make_object_types: bool,
    nested: NestedUnification,
) -> (Arc<TypeGraph>, bool) {
    let unions: Vec<TypeRef> = reachable_of_kind(graph, TypeKind::Union)
        .into_iter()
        .filter(|u| !is_canonical_union(graph, *u))
        .collect();
    if unions.is_empty() {
        return (Arc::clone(graph), true);
    }

    let mut found_intersection = false;
    let groups = make_groups_to_flatten(graph, &unions, |members| {
        let has_intersection = members
            .iter()
            .any(|m| graph.kind_of(*m) == TypeKind::Intersection);
        found_intersection |= has_intersection;
        !has_intersection
    });
    debug!(
        unions = unions.len(),
        groups = groups.len(),
        found_intersection,
        "flattening unions"
    );

    let mut flattener = UnionFlattener {
        conflate_numbers,
        make_object_types,
        nested,
        needs_repeat: false,
    };
    let next = graph.rewrite("flatten unions", groups, &mut flattener, false);
    (next, !flattener.needs_repeat && !found_intersection)
}
