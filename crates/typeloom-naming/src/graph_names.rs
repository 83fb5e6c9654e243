//! Names for everything a renderer declares from a finished type graph.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};
use typeloom_core::{Type, TypeGraph, TypeNames, TypeRef};

use crate::assign::assign_names;
use crate::error::NamingError;
use crate::name::{NameId, NamespaceId};
use crate::namer::fun_prefix_namer;
use crate::namespace::NameGraph;
use crate::style::NameStyle;

/// Resolved identifiers, keyed by the type that owns them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphNaming {
    types: BTreeMap<TypeRef, String>,
    properties: BTreeMap<TypeRef, BTreeMap<String, String>>,
    cases: BTreeMap<TypeRef, BTreeMap<String, String>>,
    members: BTreeMap<TypeRef, BTreeMap<TypeRef, String>>,
}

impl GraphNaming {
    pub fn type_name(&self, ty: TypeRef) -> Option<&str> {
        self.types.get(&ty).map(String::as_str)
    }

    /// Identifier of the class property serialized as `property`.
    pub fn property_name(&self, class: TypeRef, property: &str) -> Option<&str> {
        self.properties.get(&class)?.get(property).map(String::as_str)
    }

    pub fn case_name(&self, enumeration: TypeRef, case: &str) -> Option<&str> {
        self.cases.get(&enumeration)?.get(case).map(String::as_str)
    }

    pub fn member_name(&self, union: TypeRef, member: TypeRef) -> Option<&str> {
        self.members.get(&union)?.get(&member).map(String::as_str)
    }

    pub fn types(&self) -> &BTreeMap<TypeRef, String> {
        &self.types
    }
}

/// Target-specific naming conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNamer {
    type_style: NameStyle,
    property_style: NameStyle,
    case_style: NameStyle,
    member_style: NameStyle,
    keywords: Vec<String>,
}

impl Default for GraphNamer {
    fn default() -> Self {
        Self {
            type_style: NameStyle::Pascal,
            property_style: NameStyle::Camel,
            case_style: NameStyle::Pascal,
            member_style: NameStyle::Pascal,
            keywords: Vec::new(),
        }
    }
}

enum Owner {
    Type(TypeRef),
    Property(TypeRef, String),
    Case(TypeRef, String),
    Member(TypeRef, TypeRef),
}

/// Candidates for a type name and their order: top-level names beat given
/// names, which beat inferred ones, which beat the kind.
fn type_candidates(graph: &TypeGraph, ty: TypeRef, top_levels: &BTreeMap<TypeRef, Vec<String>>) -> (Vec<String>, u32) {
    let mut candidates = top_levels.get(&ty).cloned().unwrap_or_default();
    let names = graph.attributes_of(ty).get::<TypeNames>();
    if let Some(names) = names {
        candidates.extend(names.proposed_names());
    }
    let order = match names {
        _ if top_levels.contains_key(&ty) => 0,
        Some(names) if !names.is_inferred() => 1,
        Some(names) => 2 + names.distance(),
        None => u32::MAX,
    };
    if candidates.is_empty() {
        candidates.push(graph.kind_of(ty).to_string());
    }
    (candidates, order)
}

impl GraphNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type_style(mut self, style: NameStyle) -> Self {
        self.type_style = style;
        self
    }

    pub fn with_property_style(mut self, style: NameStyle) -> Self {
        self.property_style = style;
        self
    }

    pub fn with_case_style(mut self, style: NameStyle) -> Self {
        self.case_style = style;
        self
    }

    pub fn with_member_style(mut self, style: NameStyle) -> Self {
        self.member_style = style;
        self
    }

    /// Identifiers no generated name may take.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    /// Name every named type of `graph` plus the properties, enum cases and
    /// union members a renderer spells out.
    #[instrument(skip_all, fields(types = graph.len()), level = "debug")]
    pub fn name_graph(&self, graph: &TypeGraph) -> Result<GraphNaming, NamingError> {
        let mut names = NameGraph::new();
        let keywords = names.keyword_namespace("keywords", self.keywords.iter().cloned());
        let global = names.add_namespace("types", None);
        names.forbid_namespace(global, keywords);

        let type_namer = names.add_namer(fun_prefix_namer("types", self.type_style));
        let property_namer = names.add_namer(fun_prefix_namer("properties", self.property_style));
        let case_namer = names.add_namer(fun_prefix_namer("cases", self.case_style));
        let member_namer = names.add_namer(fun_prefix_namer("members", self.member_style));

        let mut top_levels: BTreeMap<TypeRef, Vec<String>> = BTreeMap::new();
        for (name, ty) in graph.top_levels() {
            top_levels.entry(*ty).or_default().push(name.clone());
        }

        let named = graph.all_named_types();
        let mut owners: Vec<(NameId, Owner)> = Vec::new();
        let mut type_ids: BTreeMap<TypeRef, NameId> = BTreeMap::new();
        for &ty in &named {
            let (candidates, order) = type_candidates(graph, ty, &top_levels);
            let id = names.add_simple(global, type_namer, candidates, order);
            type_ids.insert(ty, id);
            owners.push((id, Owner::Type(ty)));
        }

        let scope = |names: &mut NameGraph, label: String| -> NamespaceId {
            let ns = names.add_namespace(label, Some(global));
            names.forbid_namespace(ns, keywords);
            ns
        };
        for &ty in &named {
            match graph.type_at(ty) {
                Type::Class { properties } | Type::Object { properties, .. } => {
                    let ns = scope(&mut names, format!("properties of {}", ty));
                    for property in properties.keys() {
                        let id = names.add_simple(ns, property_namer, [property.clone()], 0);
                        owners.push((id, Owner::Property(ty, property.clone())));
                    }
                }
                Type::Enum { cases } => {
                    let ns = scope(&mut names, format!("cases of {}", ty));
                    for case in cases {
                        let id = names.add_simple(ns, case_namer, [case.clone()], 0);
                        owners.push((id, Owner::Case(ty, case.clone())));
                    }
                }
                Type::Union { members } => {
                    let ns = scope(&mut names, format!("members of {}", ty));
                    for &member in members {
                        let id = match type_ids.get(&member) {
                            Some(&dependency) => names.add_dependency(
                                ns,
                                member_namer,
                                vec![dependency],
                                Arc::new(|parts: &[&str]| parts[0].to_string()),
                                0,
                            ),
                            None => names.add_simple(ns, member_namer, [graph.kind_of(member).to_string()], 0),
                        };
                        owners.push((id, Owner::Member(ty, member)));
                    }
                }
                _ => {}
            }
        }

        let assignments = assign_names(&names)?;
        let mut naming = GraphNaming::default();
        for (id, owner) in owners {
            let Some(name) = assignments.get(id) else {
                continue;
            };
            let name = name.to_string();
            match owner {
                Owner::Type(ty) => {
                    naming.types.insert(ty, name);
                }
                Owner::Property(ty, property) => {
                    naming.properties.entry(ty).or_default().insert(property, name);
                }
                Owner::Case(ty, case) => {
                    naming.cases.entry(ty).or_default().insert(case, name);
                }
                Owner::Member(ty, member) => {
                    naming.members.entry(ty).or_default().insert(member, name);
                }
            }
        }
        debug!(types = naming.types.len(), "graph named");
        Ok(naming)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use pretty_assertions::assert_eq;
    use typeloom_core::{ClassProperty, PrimitiveKind, PropertyMap, TypeAttributes, TypeBuilder};

    fn named(names: &[&str]) -> TypeAttributes {
        TypeAttributes::of(TypeNames::given(names.iter().copied()))
    }

    fn class(builder: &mut TypeBuilder, attributes: TypeAttributes, properties: &[(&str, TypeRef)]) -> TypeRef {
        let properties: PropertyMap = properties
            .iter()
            .map(|(name, ty)| (name.to_string(), ClassProperty::required(*ty)))
            .collect();
        builder.get_class_type(attributes, properties, None)
    }

    #[test]
    fn test_names_for_a_small_graph() {
        let mut builder = TypeBuilder::new();
        let text = builder.get_primitive_type(PrimitiveKind::String, TypeAttributes::new(), None);
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new(), None);
        let flag = builder.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new(), None);
        let null = builder.get_primitive_type(PrimitiveKind::Null, TypeAttributes::new(), None);
        let color = builder.get_enum_type(
            named(&["Color"]),
            BTreeSet::from(["red".to_string(), "RED".to_string()]),
            None,
        );
        let lead = class(&mut builder, named(&["User"]), &[("name", text)]);
        let member = class(&mut builder, named(&["User"]), &[("name", text), ("age", int)]);
        let value = builder.get_union_type(TypeAttributes::new(), BTreeSet::from([member, int, null]), None);
        let team = class(
            &mut builder,
            named(&["Squad"]),
            &[
                ("Id", text),
                ("class", flag),
                ("color", color),
                ("id", int),
                ("lead", lead),
                ("member", member),
                ("value", value),
            ],
        );
        builder.add_top_level("Team", team);
        let graph = builder.finish();
        let team = graph.top_level("Team").unwrap();
        let properties = match graph.type_at(team) {
            Type::Class { properties } => properties.clone(),
            other => panic!("unexpected {:?}", other),
        };

        let naming = GraphNamer::new().with_keywords(["class"]).name_graph(&graph).unwrap();
        let types: Vec<&str> = naming.types().values().map(String::as_str).collect();
        assert_eq!(types.len(), 5);
        assert_eq!(naming.type_name(team), Some("Team"));
        assert_eq!(naming.type_name(properties["color"].ty), Some("Color"));
        assert_eq!(naming.type_name(properties["lead"].ty), Some("User"));
        assert_eq!(naming.type_name(properties["member"].ty), Some("PurpleUser"));
        let value = properties["value"].ty;
        assert_eq!(naming.type_name(value), Some("Union"));

        assert_eq!(naming.property_name(team, "Id"), Some("id"));
        assert_eq!(naming.property_name(team, "id"), Some("purpleId"));
        assert_eq!(naming.property_name(team, "class"), Some("purpleClass"));
        assert_eq!(naming.property_name(team, "lead"), Some("lead"));

        let color = properties["color"].ty;
        assert_eq!(naming.case_name(color, "RED"), Some("Red"));
        assert_eq!(naming.case_name(color, "red"), Some("PurpleRed"));

        let member = properties["member"].ty;
        assert_eq!(naming.member_name(value, member), Some("PurpleUser"));
        let int = properties["id"].ty;
        assert_eq!(naming.member_name(value, int), Some("Integer"));
    }

    #[test]
    fn test_top_level_name_beats_given_names() {
        let mut builder = TypeBuilder::new();
        let flag = builder.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new(), None);
        let inner = class(&mut builder, named(&["Settings"]), &[("on", flag)]);
        let outer = class(&mut builder, named(&["Wrapper"]), &[("settings", inner)]);
        builder.add_top_level("Settings", outer);
        let graph = builder.finish();
        let outer = graph.top_level("Settings").unwrap();

        let naming = GraphNamer::new().name_graph(&graph).unwrap();
        assert_eq!(naming.type_name(outer), Some("Settings"));
        let inner = graph.children(outer)[0];
        assert_eq!(naming.type_name(inner), Some("PurpleSettings"));
    }
}
