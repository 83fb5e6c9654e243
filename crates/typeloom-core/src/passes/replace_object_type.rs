use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::attributes::TypeAttributes;
use crate::graph::TypeGraph;
use crate::rewrite::{GraphRewriteBuilder, Replacer};
use crate::types::{PrimitiveKind, Type, TypeKind, TypeRef};

use super::singleton_groups;

struct ObjectReplacer;

impl Replacer for ObjectReplacer {
    fn replace(
        &mut self,
        group: &[TypeRef],
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let graph = builder.original_graph();
        let [object] = group else {
            panic!("objects are replaced one at a time, got {:?}", group);
        };
        let Type::Object {
            properties,
            additional_properties,
        } = graph.type_at(*object)
        else {
            panic!("{:?} is not an object", object);
        };
        let attributes = builder.reconstitute_attributes(graph.attributes_of(*object), self);

        let Some(additional) = *additional_properties else {
            let properties = builder.reconstitute_properties(properties, self);
            return builder.get_unique_class_type(attributes, Some(properties), Some(forwarding_ref));
        };

        if properties.is_empty() {
            let values = builder.reconstitute_type_ref(additional, self);
            return builder.get_map_type(attributes, values, Some(forwarding_ref));
        }

        if graph.kind_of(additional) == TypeKind::Primitive(PrimitiveKind::Any) {
            warn!(object = ?object, "additional properties dropped in favor of a class");
            builder.set_lost_type_attributes();
            let properties = builder.reconstitute_properties(properties, self);
            return builder.get_unique_class_type(attributes, Some(properties), Some(forwarding_ref));
        }

        // Mixed form: a map over every property type.
        warn!(object = ?object, "fixed properties dropped in favor of a map");
        let value_types: BTreeSet<TypeRef> = properties
            .values()
            .map(|p| p.ty)
            .chain([additional])
            .collect();
        let refs: Vec<TypeRef> = value_types.iter().copied().collect();
        let values = match builder.lookup_type_refs(&refs, None) {
            Some(existing) => existing,
            None => {
                let members = builder.reconstitute_set(&value_types, self);
                builder.get_union_type(TypeAttributes::new(), members, None)
            }
        };
        builder.get_map_type(attributes, values, Some(forwarding_ref))
    }
}

/// Turn transient objects into classes or maps.
#[instrument(skip(graph), fields(types = graph.len()), level = "debug")]
pub fn replace_object_type(graph: &Arc<TypeGraph>) -> Arc<TypeGraph> {
    let groups = singleton_groups(graph, |r| graph.kind_of(r) == TypeKind::Object);
    debug!(objects = groups.len(), "replacing object types");
    graph.rewrite("replace object type", groups, &mut ObjectReplacer, false)
}
