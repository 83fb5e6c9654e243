use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::attributes::{StringTypes, TypeAttributes};
use crate::graph::TypeGraph;
use crate::rewrite::{GraphRewriteBuilder, Replacer};
use crate::types::{PrimitiveKind, Type, TypeRef};

use super::singleton_groups;

const MIN_OBSERVATIONS_FOR_ENUM: usize = 10;

/// Which restricted strings become enums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumInference {
    /// Never; every restricted string becomes a plain string.
    None,
    /// Every restricted string.
    All,
    /// Only strings with few distinct values among many observations.
    #[default]
    Infer,
}

impl EnumInference {
    fn wants_enum(self, cases: &BTreeMap<String, usize>) -> bool {
        if cases.is_empty() || cases.keys().all(String::is_empty) {
            return false;
        }
        match self {
            EnumInference::None => false,
            EnumInference::All => true,
            EnumInference::Infer => {
                let observations: usize = cases.values().sum();
                observations >= MIN_OBSERVATIONS_FOR_ENUM
                    && (cases.len() as f64) < (observations as f64).sqrt()
            }
        }
    }
}

fn needs_expansion(graph: &TypeGraph, r: TypeRef) -> bool {
    if graph.type_at(r) != &Type::Primitive(PrimitiveKind::String) {
        return false;
    }
    graph
        .attributes_of(r)
        .get::<StringTypes>()
        .is_some_and(|s| s.is_restricted() || !s.transformations().is_empty())
}

struct StringExpander {
    inference: EnumInference,
}

impl Replacer for StringExpander {
    fn replace(
        &mut self,
        group: &[TypeRef],
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let graph = builder.original_graph();
        let [string] = group else {
            panic!("strings are expanded one at a time, got {:?}", group);
        };
        let attributes = graph.attributes_of(*string);
        let Some(string_types) = attributes.get::<StringTypes>() else {
            panic!("string {:?} has nothing to expand", string);
        };
        let attributes = builder.reconstitute_attributes(&attributes.without::<StringTypes>(), self);
        let unrestricted = Some(StringTypes::unrestricted());

        let enum_cases: Option<BTreeSet<String>> = match string_types.cases() {
            Some(cases) if !self.inference.wants_enum(cases) => {
                return builder.get_string_type(attributes, unrestricted, Some(forwarding_ref));
            }
            Some(cases) => Some(cases.keys().cloned().collect()),
            None => None,
        };
        let transformations = string_types.transformations();

        if transformations.is_empty() {
            if let Some(cases) = enum_cases {
                return builder.get_enum_type(attributes, cases, Some(forwarding_ref));
            }
        }
        if enum_cases.is_none() && transformations.len() == 1 {
            if let Some(kind) = transformations.first() {
                return builder.get_primitive_type(*kind, attributes, Some(forwarding_ref));
            }
        }

        let mut types = BTreeSet::new();
        if let Some(cases) = enum_cases {
            types.insert(builder.get_enum_type(TypeAttributes::new(), cases, None));
        }
        for kind in transformations {
            types.insert(builder.get_primitive_type(*kind, TypeAttributes::new(), None));
        }
        assert!(types.len() > 1, "string {:?} expanded to fewer than two types", string);
        builder.get_union_type(attributes, types, Some(forwarding_ref))
    }
}

/// Replace strings with recorded cases or formats by enums and
/// transformed-string kinds.
#[instrument(skip(graph), fields(types = graph.len()), level = "debug")]
pub fn expand_strings(graph: &Arc<TypeGraph>, inference: EnumInference) -> Arc<TypeGraph> {
    let groups = singleton_groups(graph, |r| needs_expansion(graph, r));
    debug!(strings = groups.len(), ?inference, "expanding strings");
    graph.rewrite(
        "expand strings",
        groups,
        &mut StringExpander { inference },
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::TypeNames;
    use crate::builder::TypeBuilder;
    use crate::types::TypeKind;

    fn string_graph(string_types: StringTypes) -> Arc<TypeGraph> {
        let mut builder = TypeBuilder::new();
        let string = builder.get_string_type(
            TypeAttributes::of(TypeNames::given(["Color"])),
            Some(string_types),
            None,
        );
        builder.add_top_level("Color", string);
        Arc::new(builder.finish())
    }

    #[test]
    fn test_frequent_cases_become_enum() {
        let graph = string_graph(StringTypes::from_cases([("red", 8), ("blue", 7)]));
        let graph = expand_strings(&graph, EnumInference::Infer);
        let top = graph.top_level("Color").unwrap();
        let Type::Enum { cases } = graph.type_at(top) else {
            panic!("expected an enum, got {}", graph.describe());
        };
        assert_eq!(cases.len(), 2);
        assert!(graph.attributes_of(top).contains::<TypeNames>());
    }

    #[test]
    fn test_rare_cases_stay_string() {
        let graph = string_graph(StringTypes::from_cases([("a", 1), ("b", 1), ("c", 1)]));
        let inferred = expand_strings(&graph, EnumInference::Infer);
        let top = inferred.top_level("Color").unwrap();
        assert_eq!(inferred.kind_of(top), TypeKind::Primitive(PrimitiveKind::String));
        let string_types = inferred.attributes_of(top).get::<StringTypes>().unwrap();
        assert!(!string_types.is_restricted());

        let all = expand_strings(&graph, EnumInference::All);
        let top = all.top_level("Color").unwrap();
        assert_eq!(all.kind_of(top), TypeKind::Enum);
    }

    #[test]
    fn test_single_transformation_becomes_its_kind() {
        let graph = string_graph(StringTypes::from_transformations([PrimitiveKind::DateTime]));
        let graph = expand_strings(&graph, EnumInference::None);
        let top = graph.top_level("Color").unwrap();
        assert_eq!(graph.kind_of(top), TypeKind::Primitive(PrimitiveKind::DateTime));
    }

    #[test]
    fn test_plain_strings_are_untouched() {
        let graph = string_graph(StringTypes::unrestricted());
        assert!(Arc::ptr_eq(&graph, &expand_strings(&graph, EnumInference::All)));
    }

    #[test]
    fn test_inference_reads_from_toml_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            inference: EnumInference,
        }
        let parsed: Wrapper = toml::from_str("inference = \"all\"").unwrap();
        assert_eq!(parsed.inference, EnumInference::All);
    }
}
