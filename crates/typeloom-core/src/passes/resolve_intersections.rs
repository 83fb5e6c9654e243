use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::attributes::{Combination, TypeAttributes};
use crate::graph::TypeGraph;
use crate::intersection::{can_resolve, IntersectionAccumulator, IntersectionUnionBuilder};
use crate::rewrite::{GraphRewriteBuilder, Replacer};
use crate::type_utils::{make_groups_to_flatten, set_operation_members_recursively};
use crate::types::{PrimitiveKind, TypeKind, TypeRef};
use crate::unify::{build_union, reconstitute_member_kinds, UnionTypeProvider};

use super::reachable_of_kind;

struct IntersectionResolver {
    conflate_numbers: bool,
    needs_repeat: bool,
}

impl Replacer for IntersectionResolver {
    fn replace(
        &mut self,
        group: &[TypeRef],
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let graph = builder.original_graph();
        let intersections: Vec<TypeRef> = group
            .iter()
            .copied()
            .filter(|r| graph.kind_of(*r) == TypeKind::Intersection)
            .collect();
        let (members, intersection_attributes) =
            set_operation_members_recursively(graph, &intersections, Some(Combination::Intersect));
        let intersection_attributes = builder.reconstitute_attributes(&intersection_attributes, self);

        if members.is_empty() {
            // Only `any` was intersected.
            return builder.get_primitive_type(
                PrimitiveKind::Any,
                intersection_attributes,
                Some(forwarding_ref),
            );
        }
        if members.len() == 1 {
            if let Some(member) = members.first() {
                return builder.reconstitute_type_ref_with(
                    *member,
                    Some(intersection_attributes),
                    Some(forwarding_ref),
                    self,
                );
            }
        }

        let mut accumulator = IntersectionAccumulator::new(self.conflate_numbers);
        let member_attributes: Vec<TypeAttributes> = members
            .iter()
            .map(|m| accumulator.add_type(graph, *m))
            .collect();
        let extra = TypeAttributes::combine(Combination::Intersect, &member_attributes).make_inferred();
        let extra = builder.reconstitute_attributes(&extra, self);
        let attributes = intersection_attributes.intersect(&extra);

        let kinds = reconstitute_member_kinds(builder, accumulator.member_kinds(), self);
        let mut payload = IntersectionUnionBuilder::new(self);
        let result = build_union(
            &accumulator,
            kinds,
            &mut payload,
            builder,
            attributes,
            true,
            Some(forwarding_ref),
        );
        if payload.created_new_intersections() {
            self.needs_repeat = true;
        }
        result
    }
}

/// Narrow every intersection whose members are ready.
///
/// Not done while an intersection waits for union flattening or while
/// narrowing produced new intersections between property or item types.
#[instrument(skip(graph), fields(types = graph.len()), level = "debug")]
pub fn resolve_intersections(graph: &Arc<TypeGraph>, conflate_numbers: bool) -> (Arc<TypeGraph>, bool) {
    let intersections = reachable_of_kind(graph, TypeKind::Intersection);
    if intersections.is_empty() {
        return (Arc::clone(graph), true);
    }
    let resolvable: Vec<TypeRef> = intersections
        .iter()
        .copied()
        .filter(|r| can_resolve(graph, *r))
        .collect();
    let all_resolvable = resolvable.len() == intersections.len();
    debug!(
        intersections = intersections.len(),
        resolvable = resolvable.len(),
        "resolving intersections"
    );

    let groups = make_groups_to_flatten(graph, &resolvable, |_: &BTreeSet<TypeRef>| true);
    let mut resolver = IntersectionResolver {
        conflate_numbers,
        needs_repeat: false,
    };
    let next = graph.rewrite("resolve intersections", groups, &mut resolver, false);
    (next, all_resolvable && !resolver.needs_repeat)
}
