//! Naming pipeline output and generated name sets

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use typeloom_core::{
    ClassProperty, PipelineOptions, PrimitiveKind, PropertyMap, Type, TypeAttributes, TypeBuilder,
    TypeNames, TypePipeline,
};
use typeloom_naming::{assign_names, fun_prefix_namer, GraphNamer, NameGraph, NameId, NameStyle};

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

#[test]
fn test_pipeline_output_gets_distinct_names() {
    let mut builder = TypeBuilder::new();
    let text = builder.get_primitive_type(PrimitiveKind::String, TypeAttributes::new(), None);
    let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new(), None);
    let address = builder.get_class_type(
        TypeAttributes::of(TypeNames::inferred(["address"])),
        PropertyMap::from([("street".to_string(), ClassProperty::required(text))]),
        None,
    );
    let billing = builder.get_class_type(
        TypeAttributes::of(TypeNames::inferred(["address"])),
        PropertyMap::from([("iban".to_string(), ClassProperty::required(text))]),
        None,
    );
    let status = builder.get_enum_type(
        TypeAttributes::of(TypeNames::given(["status"])),
        BTreeSet::from(["active".to_string(), "on-hold".to_string()]),
        None,
    );
    let customer = builder.get_class_type(
        TypeAttributes::of(TypeNames::given(["customer"])),
        PropertyMap::from([
            ("address".to_string(), ClassProperty::required(address)),
            ("billing-address".to_string(), ClassProperty::new(billing, true)),
            ("status".to_string(), ClassProperty::required(status)),
            ("id".to_string(), ClassProperty::required(int)),
        ]),
        None,
    );
    builder.add_top_level("Customer", customer);

    let output = TypePipeline::new(PipelineOptions::default().with_make_transformations(false))
        .run(builder.finish())
        .unwrap();
    let graph = &output.graph;
    let namer = GraphNamer::new().with_keywords(["type", "impl"]);
    let naming = namer.name_graph(graph).unwrap();

    let names: BTreeSet<&str> = naming.types().values().map(String::as_str).collect();
    assert_eq!(names.len(), naming.types().len());
    assert_eq!(
        names,
        BTreeSet::from(["Address", "Customer", "PurpleAddress", "Status"])
    );
    assert!(names.iter().all(|n| is_identifier(n)));

    let customer = graph.top_level("Customer").unwrap();
    assert_eq!(naming.type_name(customer), Some("Customer"));
    let Type::Class { properties } = graph.type_at(customer) else {
        panic!("expected a class:\n{}", graph.describe());
    };
    assert_eq!(naming.type_name(properties["address"].ty), Some("Address"));
    assert_eq!(naming.property_name(customer, "billing-address"), Some("billingAddress"));
    let status = properties["status"].ty;
    assert_eq!(naming.case_name(status, "on-hold"), Some("OnHold"));

    assert_eq!(namer.name_graph(graph).unwrap(), naming);
}

fn assign_siblings(raw: &[String], style: NameStyle) -> Vec<String> {
    let mut graph = NameGraph::new();
    let keywords = graph.keyword_namespace("keywords", ["type"]);
    let ns = graph.add_namespace("siblings", None);
    graph.forbid_namespace(ns, keywords);
    let namer = graph.add_namer(fun_prefix_namer("siblings", style));
    let ids: Vec<NameId> = raw.iter().map(|r| graph.add_simple(ns, namer, [r.clone()], 0)).collect();
    let assignments = assign_names(&graph).unwrap();
    ids.iter()
        .map(|id| assignments.get(*id).unwrap_or_default().to_string())
        .collect()
}

fn raw_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("id".to_string()),
        Just("ID".to_string()),
        Just("type".to_string()),
        Just("user_name".to_string()),
        Just("userName".to_string()),
        "[a-zA-Z0-9 _-]{0,8}",
    ]
}

proptest! {
    #[test]
    fn siblings_get_distinct_legal_names(raw in prop::collection::vec(raw_name(), 1..24)) {
        for style in [NameStyle::Pascal, NameStyle::Camel, NameStyle::Snake, NameStyle::UpperSnake] {
            let names = assign_siblings(&raw, style);
            prop_assert_eq!(names.len(), raw.len());
            let distinct: BTreeSet<&String> = names.iter().collect();
            prop_assert_eq!(distinct.len(), names.len(), "{:?}", names);
            prop_assert!(names.iter().all(|n| is_identifier(n) && n != "type"), "{:?}", names);
            prop_assert_eq!(assign_siblings(&raw, style), names);
        }
    }
}
