//! Properties of the pipeline over generated graphs

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use typeloom_core::{
    ClassProperty, PipelineOptions, PrimitiveKind, PropertyMap, TypeAttributes, TypeBuilder,
    TypeGraph, TypeKind, TypePipeline, TypeRef,
};

/// Blueprint of a type, built into a fresh builder for every run.
#[derive(Debug, Clone)]
enum Shape {
    Primitive(PrimitiveKind),
    Array(Box<Shape>),
    Class(Vec<(String, Shape, bool)>),
    Union(Vec<Shape>),
    Intersection(Vec<Shape>),
}

fn leaf_kind() -> impl Strategy<Value = PrimitiveKind> {
    prop_oneof![
        Just(PrimitiveKind::Null),
        Just(PrimitiveKind::Bool),
        Just(PrimitiveKind::Integer),
        Just(PrimitiveKind::Double),
        Just(PrimitiveKind::String),
        Just(PrimitiveKind::Any),
        Just(PrimitiveKind::Date),
        Just(PrimitiveKind::IntegerString),
    ]
}

fn property_name() -> impl Strategy<Value = String> {
    prop_oneof![Just("id"), Just("name"), Just("value"), Just("items")].prop_map(String::from)
}

/// Intersections only narrow flat members, the way schema `allOf` shows up.
fn intersection_member() -> impl Strategy<Value = Shape> {
    let primitive = prop_oneof![
        Just(PrimitiveKind::Integer),
        Just(PrimitiveKind::Double),
        Just(PrimitiveKind::Bool),
        Just(PrimitiveKind::String),
        Just(PrimitiveKind::Any),
    ]
    .prop_map(Shape::Primitive);
    let class = prop::collection::vec(
        (property_name(), leaf_kind().prop_map(Shape::Primitive), any::<bool>()),
        0..3,
    )
    .prop_map(Shape::Class);
    prop_oneof![primitive, class]
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = leaf_kind().prop_map(Shape::Primitive);
    leaf.prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(|s| Shape::Array(Box::new(s))),
            prop::collection::vec((property_name(), inner.clone(), any::<bool>()), 0..4)
                .prop_map(Shape::Class),
            prop::collection::vec(inner, 1..4).prop_map(Shape::Union),
            prop::collection::vec(intersection_member(), 1..3).prop_map(Shape::Intersection),
        ]
    })
}

fn build(builder: &mut TypeBuilder, shape: &Shape) -> TypeRef {
    match shape {
        Shape::Primitive(kind) => builder.get_primitive_type(*kind, TypeAttributes::new(), None),
        Shape::Array(items) => {
            let items = build(builder, items);
            builder.get_array_type(TypeAttributes::new(), items, None)
        }
        Shape::Class(properties) => {
            let mut map = PropertyMap::new();
            for (name, shape, optional) in properties {
                let ty = build(builder, shape);
                map.insert(name.clone(), ClassProperty::new(ty, *optional));
            }
            builder.get_class_type(TypeAttributes::new(), map, None)
        }
        Shape::Union(members) => {
            let members: BTreeSet<TypeRef> = members.iter().map(|m| build(builder, m)).collect();
            builder.get_union_type(TypeAttributes::new(), members, None)
        }
        Shape::Intersection(members) => {
            let members: BTreeSet<TypeRef> = members.iter().map(|m| build(builder, m)).collect();
            builder.get_intersection_type(TypeAttributes::new(), members, None)
        }
    }
}

fn graph_of(tops: &[Shape]) -> TypeGraph {
    let mut builder = TypeBuilder::new();
    for (index, shape) in tops.iter().enumerate() {
        let r = build(&mut builder, shape);
        builder.add_top_level(format!("Top{}", index), r);
    }
    builder.finish()
}

fn run(tops: &[Shape], options: PipelineOptions) -> Arc<TypeGraph> {
    TypePipeline::new(options)
        .run(graph_of(tops))
        .unwrap_or_else(|e| panic!("pipeline failed on {:?}: {}", tops, e))
        .graph
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pipeline_leaves_only_renderable_kinds(tops in prop::collection::vec(shape(), 1..3)) {
        let graph = run(&tops, PipelineOptions::default());
        for r in graph.all_types() {
            let kind = graph.kind_of(r);
            prop_assert!(!kind.is_set_operation() || kind == TypeKind::Union, "{} left:\n{}", kind, graph.describe());
            prop_assert_ne!(kind, TypeKind::Object);
            prop_assert_ne!(kind, TypeKind::Primitive(PrimitiveKind::None));
        }
    }

    #[test]
    fn pipeline_is_deterministic(tops in prop::collection::vec(shape(), 1..3)) {
        let first = run(&tops, PipelineOptions::default());
        let second = run(&tops, PipelineOptions::default());
        prop_assert_eq!(first.describe(), second.describe());
        prop_assert_eq!(first.len(), second.len());
    }

    #[test]
    fn pipeline_output_is_stable(tops in prop::collection::vec(shape(), 1..3)) {
        let graph = run(&tops, PipelineOptions::default().with_conflate_numbers(false));
        let again = graph.rewrite_fixed_point().garbage_collect();
        prop_assert_eq!(again.len(), graph.len());
        prop_assert_eq!(again.describe(), graph.describe());
    }

    #[test]
    fn unions_in_output_are_canonical(tops in prop::collection::vec(shape(), 1..3)) {
        let graph = run(&tops, PipelineOptions::default().with_make_transformations(false));
        for r in graph.types_of_kind(TypeKind::Union) {
            prop_assert!(
                typeloom_core::type_utils::is_canonical_union(&graph, r),
                "non-canonical union {:?}:\n{}", r, graph.describe()
            );
        }
    }
}
