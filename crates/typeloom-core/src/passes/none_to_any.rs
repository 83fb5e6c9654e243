use std::sync::Arc;

use tracing::{debug, instrument};

use crate::graph::TypeGraph;
use crate::rewrite::{GraphRewriteBuilder, Replacer};
use crate::types::{PrimitiveKind, TypeKind, TypeRef};

use super::singleton_groups;

struct NoneReplacer;

impl Replacer for NoneReplacer {
    fn replace(
        &mut self,
        group: &[TypeRef],
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let graph = builder.original_graph();
        let [none] = group else {
            panic!("none types are replaced one at a time, got {:?}", group);
        };
        let attributes = builder.reconstitute_attributes(graph.attributes_of(*none), self);
        builder.get_primitive_type(PrimitiveKind::Any, attributes, Some(forwarding_ref))
    }
}

/// Replace every remaining `none` by `any`; no target language can express
/// an uninhabited type.
#[instrument(skip(graph), fields(types = graph.len()), level = "debug")]
pub fn none_to_any(graph: &Arc<TypeGraph>) -> Arc<TypeGraph> {
    let groups = singleton_groups(graph, |r| {
        graph.kind_of(r) == TypeKind::Primitive(PrimitiveKind::None)
    });
    debug!(nones = groups.len(), "replacing none with any");
    graph.rewrite("none to any", groups, &mut NoneReplacer, false)
}
