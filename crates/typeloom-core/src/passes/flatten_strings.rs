use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::attributes::{Combination, StringTypes, TypeAttributes};
use crate::graph::TypeGraph;
use crate::rewrite::{GraphRewriteBuilder, Replacer};
use crate::type_utils::{find_member, string_like_members};
use crate::types::{PrimitiveKind, TypeKind, TypeRef};

use super::singleton_groups;

/// String-like members of `union` that an unrestricted string member
/// subsumes, if there is one.
fn subsumed_string_members(graph: &TypeGraph, union: TypeRef) -> Option<BTreeSet<TypeRef>> {
    let members = graph.type_at(union).members()?;
    let string_members = string_like_members(graph, members);
    if string_members.len() <= 1 {
        return None;
    }
    let string = find_member(graph, union, TypeKind::Primitive(PrimitiveKind::String))?;
    let restricted = graph
        .attributes_of(string)
        .get::<StringTypes>()
        .is_some_and(StringTypes::is_restricted);
    (!restricted).then_some(string_members)
}

struct StringFlattener;

impl Replacer for StringFlattener {
    fn replace(
        &mut self,
        group: &[TypeRef],
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let graph = builder.original_graph();
        let [union] = group else {
            panic!("unions are flattened one at a time, got {:?}", group);
        };
        let Some(string_members) = subsumed_string_members(graph, *union) else {
            panic!("union {:?} has no strings to flatten", union);
        };
        let string_attributes = TypeAttributes::combine(
            Combination::Union,
            string_members.iter().map(|m| graph.attributes_of(*m)),
        );
        let string_attributes = builder.reconstitute_attributes(&string_attributes, self);
        let union_attributes = builder.reconstitute_attributes(graph.attributes_of(*union), self);

        let mut members = BTreeSet::new();
        for member in graph.type_at(*union).members().into_iter().flatten() {
            if !string_members.contains(member) {
                members.insert(builder.reconstitute_type_ref(*member, self));
            }
        }
        let unrestricted = Some(StringTypes::unrestricted());
        if members.is_empty() {
            return builder.get_string_type(
                string_attributes.union(&union_attributes).without::<StringTypes>(),
                unrestricted,
                Some(forwarding_ref),
            );
        }
        members.insert(builder.get_string_type(
            string_attributes.without::<StringTypes>(),
            unrestricted,
            None,
        ));
        builder.get_union_type(union_attributes, members, Some(forwarding_ref))
    }
}

/// Collapse the string-like members of unions that also hold an
/// unrestricted string into that string.
#[instrument(skip(graph), fields(types = graph.len()), level = "debug")]
pub fn flatten_strings(graph: &Arc<TypeGraph>) -> Arc<TypeGraph> {
    let groups = singleton_groups(graph, |r| {
        graph.kind_of(r) == TypeKind::Union && subsumed_string_members(graph, r).is_some()
    });
    debug!(unions = groups.len(), "flattening strings");
    graph.rewrite("flatten strings", groups, &mut StringFlattener, false)
}
