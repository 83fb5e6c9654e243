use std::collections::BTreeSet;
use std::sync::Arc;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::attributes::{MinMax, MinMaxLength, StringTypes, TypeAttributes, UnionIdentifier};
use crate::graph::TypeGraph;
use crate::rewrite::{GraphRewriteBuilder, Replacer};
use crate::transformers::{Transformation, Transformer};
use crate::type_utils::string_like_members;
use crate::types::{PrimitiveKind, Type, TypeRef};

/// Which types get an explicit codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationPolicy {
    pub transform_enums: bool,
    pub transform_arrays: bool,
    /// Transformed-string kinds decoded from plain strings.
    pub transformed_strings: BTreeSet<PrimitiveKind>,
    pub check_bounds: bool,
}

impl Default for TransformationPolicy {
    fn default() -> Self {
        Self {
            transform_enums: true,
            transform_arrays: false,
            transformed_strings: BTreeSet::from([
                PrimitiveKind::IntegerString,
                PrimitiveKind::BoolString,
            ]),
            check_bounds: false,
        }
    }
}

/// State of one pipeline run. A run starts from a fresh session.
#[derive(Debug, Default)]
pub struct Session {
    next_union_identifier: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh identifier; every call returns a different one.
    pub fn next_union_identifier(&mut self) -> UnionIdentifier {
        let id = self.next_union_identifier;
        self.next_union_identifier += 1;
        UnionIdentifier::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Union,
    Enum,
    TransformedString(PrimitiveKind),
    Bounds,
    Array,
}

struct Categorizer<'a> {
    graph: &'a TypeGraph,
    policy: &'a TransformationPolicy,
}

impl Categorizer<'_> {
    fn category(&self, r: TypeRef) -> Option<Category> {
        let graph = self.graph;
        let attributes = graph.attributes_of(r);
        match graph.type_at(r) {
            Type::Union { members } if string_like_members(graph, members).len() > 1 => {
                Some(Category::Union)
            }
            Type::Enum { .. } if self.policy.transform_enums => Some(Category::Enum),
            Type::Primitive(kind) if self.policy.transformed_strings.contains(kind) => {
                Some(Category::TransformedString(*kind))
            }
            Type::Primitive(PrimitiveKind::Integer | PrimitiveKind::Double)
                if self.policy.check_bounds && attributes.contains::<MinMax>() =>
            {
                Some(Category::Bounds)
            }
            Type::Primitive(PrimitiveKind::String)
                if self.policy.check_bounds && attributes.contains::<MinMaxLength>() =>
            {
                Some(Category::Bounds)
            }
            Type::Array { items } if self.policy.transform_arrays && self.is_transformed_item(*items) => {
                Some(Category::Array)
            }
            _ => None,
        }
    }

    fn is_transformed_item(&self, items: TypeRef) -> bool {
        match self.graph.type_at(items) {
            Type::Enum { .. } => true,
            Type::Primitive(kind) => self.policy.transformed_strings.contains(kind),
            _ => false,
        }
    }
}

fn without_bounds(attributes: &TypeAttributes) -> TypeAttributes {
    attributes.without::<MinMax>().without::<MinMaxLength>()
}

/// A check of the bounds in `attributes` on values of `source`, numeric
/// bounds first.
fn bounds_check(
    attributes: &TypeAttributes,
    source: TypeRef,
    consumer: Option<Transformer>,
) -> Option<Transformer> {
    if let Some(bounds) = attributes.get::<MinMax>() {
        return Some(Transformer::MinMaxValueCheck {
            source,
            min: bounds.min().map(OrderedFloat),
            max: bounds.max().map(OrderedFloat),
            consumer: consumer.map(Box::new),
        });
    }
    attributes
        .get::<MinMaxLength>()
        .map(|bounds| Transformer::MinMaxLengthCheck {
            source,
            min: bounds.min(),
            max: bounds.max(),
            consumer: consumer.map(Box::new),
        })
}

/// Types that already carry a codec, together with everything their
/// codecs refer to.
fn already_transformed(graph: &TypeGraph) -> BTreeSet<TypeRef> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<TypeRef> = Vec::new();
    for r in graph.all_types() {
        if let Some(transformation) = graph.attributes_of(r).get::<Transformation>() {
            seen.insert(r);
            stack.push(transformation.source());
            stack.push(transformation.target());
            stack.extend(transformation.transformer().children());
        }
    }
    while let Some(r) = stack.pop() {
        if seen.insert(r) {
            stack.extend(graph.children(r));
        }
    }
    seen
}

struct TransformationMaker<'a> {
    policy: &'a TransformationPolicy,
    session: &'a mut Session,
    created: usize,
}

impl TransformationMaker<'_> {
    fn with_transformation(&mut self, transformation: Transformation) -> TypeAttributes {
        self.created += 1;
        TypeAttributes::of(transformation)
    }

    fn plain_string(builder: &mut GraphRewriteBuilder<'_>) -> TypeRef {
        builder.get_string_type(TypeAttributes::new(), Some(StringTypes::unrestricted()), None)
    }

    /// The type a transformed string parses into, and what follows the
    /// parse: a bounds check when bounds are checked, then `then`. A checked
    /// target loses its bounds.
    fn parsed_target(
        &self,
        kind: PrimitiveKind,
        attributes: TypeAttributes,
        builder: &mut GraphRewriteBuilder<'_>,
        then: impl FnOnce(TypeRef) -> Option<Transformer>,
    ) -> (TypeRef, Option<Transformer>) {
        let target_kind = kind.transformation_target();
        if !self.policy.check_bounds {
            let target = builder.get_primitive_type(target_kind, attributes, None);
            return (target, then(target));
        }
        let target = builder.get_primitive_type(target_kind, without_bounds(&attributes), None);
        let consumer = then(target);
        match bounds_check(&attributes, target, consumer.clone()) {
            Some(check) => (target, Some(check)),
            None => (target, consumer),
        }
    }

    /// String matches for every case of an enum, each producing its case
    /// and handing it to `then`.
    fn case_matches(
        string: TypeRef,
        cases: &BTreeSet<String>,
        then: impl Fn() -> Option<Transformer>,
    ) -> Vec<Transformer> {
        cases
            .iter()
            .map(|case| {
                Transformer::string_match(
                    string,
                    case.clone(),
                    Transformer::string_producer(string, case.clone(), then()),
                )
            })
            .collect()
    }

    fn replace_union(
        &mut self,
        union: TypeRef,
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let graph = builder.original_graph();
        let Some(members) = graph.type_at(union).members() else {
            panic!("{:?} is not a union", union);
        };
        let string_members = string_like_members(graph, members);
        let attributes = builder.reconstitute_attributes(graph.attributes_of(union), self);
        let string = Self::plain_string(builder);

        let mut raw_members = BTreeSet::new();
        let mut target_members = BTreeSet::new();
        let mut alternatives = Vec::new();
        for member in members.iter().filter(|m| !string_members.contains(*m)) {
            let reconstituted = builder.reconstitute_type_ref(*member, self);
            raw_members.insert(reconstituted);
            target_members.insert(reconstituted);
            alternatives.push(Transformer::decode(
                reconstituted,
                Some(Transformer::UnionInstantiation {
                    source: reconstituted,
                }),
            ));
        }

        let mut string_choices = Vec::new();
        let mut plain_string_member = None;
        for member in &string_members {
            let member_attributes = builder.reconstitute_attributes(graph.attributes_of(*member), self);
            match graph.type_at(*member) {
                Type::Enum { cases } => {
                    let target = builder.get_enum_type(member_attributes, cases.clone(), None);
                    target_members.insert(target);
                    string_choices.extend(Self::case_matches(string, cases, || {
                        Some(Transformer::UnionInstantiation { source: target })
                    }));
                }
                Type::Primitive(PrimitiveKind::String) => {
                    let target = builder.get_string_type(
                        member_attributes.without::<StringTypes>(),
                        Some(StringTypes::unrestricted()),
                        None,
                    );
                    target_members.insert(target);
                    plain_string_member = Some(target);
                }
                Type::Primitive(kind) => {
                    let instantiate = |target| Some(Transformer::UnionInstantiation { source: target });
                    let (target, consumer) =
                        self.parsed_target(*kind, member_attributes, builder, instantiate);
                    target_members.insert(target);
                    string_choices.push(Transformer::parse_string(string, consumer));
                }
                other => panic!("{:?} is not string-like", other.kind()),
            }
        }
        // The unrestricted string accepts anything, so it is tried last.
        if let Some(target) = plain_string_member {
            string_choices.push(Transformer::UnionInstantiation { source: target });
        }
        alternatives.push(Transformer::decode(
            string,
            Some(Transformer::Choice {
                source: string,
                transformers: string_choices,
            }),
        ));

        let target_attributes = attributes.with(self.session.next_union_identifier());
        let target = builder.get_union_type(target_attributes, target_members, None);

        if raw_members.is_empty() {
            let transformer = Transformer::DecodingChoice {
                source: string,
                alternatives,
            };
            let attributes = self.with_transformation(Transformation::new(string, target, transformer));
            return builder.get_string_type(attributes, None, Some(forwarding_ref));
        }

        raw_members.insert(string);
        let raw = builder.get_union_type(TypeAttributes::new(), raw_members.clone(), None);
        let transformer = Transformer::DecodingChoice {
            source: raw,
            alternatives,
        };
        let attributes = self.with_transformation(Transformation::new(raw, target, transformer));
        builder.get_union_type(attributes, raw_members, Some(forwarding_ref))
    }

    fn replace_enum(
        &mut self,
        enum_ref: TypeRef,
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let graph = builder.original_graph();
        let Type::Enum { cases } = graph.type_at(enum_ref) else {
            panic!("{:?} is not an enum", enum_ref);
        };
        let attributes = builder.reconstitute_attributes(graph.attributes_of(enum_ref), self);
        let target = builder.get_enum_type(attributes, cases.clone(), None);
        let string = Self::plain_string(builder);
        let transformer = Transformer::decode(
            string,
            Some(Transformer::Choice {
                source: string,
                transformers: Self::case_matches(string, cases, || None),
            }),
        );
        let attributes = self.with_transformation(Transformation::new(string, target, transformer));
        builder.get_string_type(attributes, None, Some(forwarding_ref))
    }

    fn replace_transformed_string(
        &mut self,
        original: TypeRef,
        kind: PrimitiveKind,
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let graph = builder.original_graph();
        let attributes = builder.reconstitute_attributes(graph.attributes_of(original), self);
        let (target, check) = self.parsed_target(kind, attributes, builder, |_| None);
        let string = Self::plain_string(builder);
        let transformer = Transformer::decode(string, Some(Transformer::parse_string(string, check)));
        let attributes = self.with_transformation(Transformation::new(string, target, transformer));
        builder.get_string_type(attributes, None, Some(forwarding_ref))
    }

    fn replace_bounds(
        &mut self,
        original: TypeRef,
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let graph = builder.original_graph();
        let Some(kind) = graph.type_at(original).primitive_kind() else {
            panic!("{:?} is not a primitive", original);
        };
        let attributes = builder.reconstitute_attributes(graph.attributes_of(original), self);
        let plain = builder.get_primitive_type(kind, without_bounds(&attributes), None);
        let Some(check) = bounds_check(&attributes, plain, None) else {
            panic!("{:?} has no bounds to check", original);
        };
        let transformer = Transformer::decode(plain, Some(check));
        let transformation = self.with_transformation(Transformation::new(plain, plain, transformer));
        let attributes = attributes.union(&transformation);
        builder.get_primitive_type(kind, attributes, Some(forwarding_ref))
    }

    fn replace_array(
        &mut self,
        array: TypeRef,
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let graph = builder.original_graph();
        let Type::Array { items } = graph.type_at(array) else {
            panic!("{:?} is not an array", array);
        };
        let attributes = builder.reconstitute_attributes(graph.attributes_of(array), self);
        let item_attributes = builder.reconstitute_attributes(graph.attributes_of(*items), self);
        let string = Self::plain_string(builder);
        let (item_target, item_transformer) = match graph.type_at(*items) {
            Type::Enum { cases } => (
                builder.get_enum_type(item_attributes, cases.clone(), None),
                Transformer::Choice {
                    source: string,
                    transformers: Self::case_matches(string, cases, || None),
                },
            ),
            Type::Primitive(kind) => (
                builder.get_primitive_type(kind.transformation_target(), item_attributes, None),
                Transformer::parse_string(string, None),
            ),
            other => panic!("array items of kind {:?} are not transformed", other.kind()),
        };
        let target = builder.get_array_type(attributes, item_target, None);
        let raw = builder.get_array_type(TypeAttributes::new(), string, None);
        let transformer = Transformer::ArrayDecode {
            source: raw,
            item_target,
            item_transformer: Box::new(item_transformer),
            consumer: None,
        };
        let attributes = self.with_transformation(Transformation::new(raw, target, transformer));
        builder.get_array_type(attributes, string, Some(forwarding_ref))
    }
}

impl Replacer for TransformationMaker<'_> {
    fn replace(
        &mut self,
        group: &[TypeRef],
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef {
        let [original] = group else {
            panic!("transformations are made one type at a time, got {:?}", group);
        };
        let categorizer = Categorizer {
            graph: builder.original_graph(),
            policy: self.policy,
        };
        match categorizer.category(*original) {
            Some(Category::Union) => self.replace_union(*original, builder, forwarding_ref),
            Some(Category::Enum) => self.replace_enum(*original, builder, forwarding_ref),
            Some(Category::TransformedString(kind)) => {
                self.replace_transformed_string(*original, kind, builder, forwarding_ref)
            }
            Some(Category::Bounds) => self.replace_bounds(*original, builder, forwarding_ref),
            Some(Category::Array) => self.replace_array(*original, builder, forwarding_ref),
            None => panic!("{:?} needs no transformation", original),
        }
    }
}

/// Attach explicit codecs to every type whose wire form differs from its
/// target form.
///
/// The replacement of a type is its wire form carrying a [`Transformation`]
/// to the target form. Types that already carry one, and the types their
/// codecs mention, are left alone, so running the pass twice changes
/// nothing.
#[instrument(skip(graph, session), fields(types = graph.len()), level = "debug")]
pub fn make_transformations(
    graph: &Arc<TypeGraph>,
    policy: &TransformationPolicy,
    session: &mut Session,
) -> Arc<TypeGraph> {
    let skip = already_transformed(graph);
    let categorizer = Categorizer { graph, policy };
    let groups: Vec<Vec<TypeRef>> = graph
        .all_types()
        .into_iter()
        .filter(|r| !skip.contains(r) && categorizer.category(*r).is_some())
        .map(|r| vec![r])
        .collect();
    debug!(candidates = groups.len(), "making transformations");

    let mut maker = TransformationMaker {
        policy,
        session,
        created: 0,
    };
    let next = graph.rewrite("make transformations", groups, &mut maker, false);
    debug!(created = maker.created, "transformations made");
    next
}
