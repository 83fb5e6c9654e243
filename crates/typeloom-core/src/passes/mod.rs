//! Graph-level rewrite passes
//!
//! Every pass selects types with a predicate over the frozen graph, groups
//! them and hands the groups to [`TypeGraph::rewrite`](crate::TypeGraph::rewrite).
//! A pass that matches nothing returns the very same graph. Passes that may
//! leave work behind return `(graph, done)` so the driver can run them
//! again.

mod expand_strings;
mod flatten_strings;
mod flatten_unions;
mod make_transformations;
mod none_to_any;
mod replace_object_type;
mod resolve_intersections;

pub use expand_strings::{expand_strings, EnumInference};
pub use flatten_strings::flatten_strings;
pub use flatten_unions::flatten_unions;
pub use make_transformations::{make_transformations, Session, TransformationPolicy};
pub use none_to_any::none_to_any;
pub use replace_object_type::replace_object_type;
pub use resolve_intersections::resolve_intersections;

use crate::graph::TypeGraph;
use crate::types::{TypeKind, TypeRef};

/// Reachable types matching `predicate`, each in a group of its own.
fn singleton_groups(
    graph: &TypeGraph,
    mut predicate: impl FnMut(TypeRef) -> bool,
) -> Vec<Vec<TypeRef>> {
    graph
        .all_types()
        .into_iter()
        .filter(|r| predicate(*r))
        .map(|r| vec![r])
        .collect()
}

fn reachable_of_kind(graph: &TypeGraph, kind: TypeKind) -> Vec<TypeRef> {
    graph.types_of_kind(kind)
}
