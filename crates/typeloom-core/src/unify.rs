//! Unification of several types into one
//!
//! A [`UnionAccumulator`] sorts candidate types into per-kind buckets and
//! applies the merge rules (number conflation, `any` poisoning, string and
//! enum folding). [`build_union`] then turns the surviving kinds into either
//! a single type or a real union, asking a [`UnionPayloadBuilder`] how to
//! build arrays and objects.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{trace, warn};

use crate::attributes::{Combination, StringTypes, TypeAttributes};
use crate::graph::TypeGraph;
use crate::rewrite::{GraphRewriteBuilder, Replacer};
use crate::types::{ClassProperty, PrimitiveKind, PropertyMap, Type, TypeKind, TypeRef};

/// Source of the reduced member kinds a union is built from.
pub trait UnionTypeProvider {
    type ArrayData;
    type ObjectData;

    /// Kind to attributes, after all merge rules have been applied.
    fn member_kinds(&self) -> BTreeMap<TypeKind, TypeAttributes>;
    fn array_data(&self) -> &Self::ArrayData;
    fn object_data(&self) -> &Self::ObjectData;
    fn enum_cases(&self) -> &BTreeSet<String>;
    fn lost_type_attributes(&self) -> bool;
}

/// Strategy for the kinds that carry children.
pub trait UnionPayloadBuilder<P: UnionTypeProvider + ?Sized> {
    fn make_array(
        &mut self,
        builder: &mut GraphRewriteBuilder<'_>,
        data: &P::ArrayData,
        attributes: TypeAttributes,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef;

    fn make_object(
        &mut self,
        builder: &mut GraphRewriteBuilder<'_>,
        data: &P::ObjectData,
        attributes: TypeAttributes,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef;
}

const ANY: TypeKind = TypeKind::Primitive(PrimitiveKind::Any);
const NONE: TypeKind = TypeKind::Primitive(PrimitiveKind::None);
const STRING: TypeKind = TypeKind::Primitive(PrimitiveKind::String);
const INTEGER: TypeKind = TypeKind::Primitive(PrimitiveKind::Integer);
const DOUBLE: TypeKind = TypeKind::Primitive(PrimitiveKind::Double);

/// Buckets candidates of a union by kind.
#[derive(Debug, Clone)]
pub struct UnionAccumulator {
    conflate_numbers: bool,
    kinds: BTreeMap<TypeKind, TypeAttributes>,
    enum_cases: BTreeSet<String>,
    array_items: BTreeSet<TypeRef>,
    objects: BTreeSet<TypeRef>,
}

impl UnionAccumulator {
    pub fn new(conflate_numbers: bool) -> Self {
        Self {
            conflate_numbers,
            kinds: BTreeMap::new(),
            enum_cases: BTreeSet::new(),
            array_items: BTreeSet::new(),
            objects: BTreeSet::new(),
        }
    }

    fn add_kind(&mut self, kind: TypeKind, attributes: &TypeAttributes) {
        let merged = match self.kinds.get(&kind) {
            Some(existing) => existing.union(attributes),
            None => attributes.clone(),
        };
        self.kinds.insert(kind, merged);
    }

    fn add_string(&mut self, attributes: &TypeAttributes) {
        let attributes = if attributes.contains::<StringTypes>() {
            attributes.clone()
        } else {
            attributes.clone().with(StringTypes::unrestricted())
        };
        self.add_kind(STRING, &attributes);
        self.fold_enum_into_string();
    }

    fn add_enum(&mut self, cases: &BTreeSet<String>, attributes: &TypeAttributes) {
        self.enum_cases.extend(cases.iter().cloned());
        self.add_kind(TypeKind::Enum, attributes);
        if self.kinds.contains_key(&STRING) {
            self.fold_enum_into_string();
        }
    }

    /// An enum next to a string is just a restricted string: the cases join
    /// the string's case set.
    fn fold_enum_into_string(&mut self) {
        let Some(enum_attributes) = self.kinds.remove(&TypeKind::Enum) else {
            return;
        };
        let cases = std::mem::take(&mut self.enum_cases);
        let enum_attributes =
            enum_attributes.with(StringTypes::from_cases(cases.into_iter().map(|c| (c, 1))));
        self.add_kind(STRING, &enum_attributes);
    }

    /// Add one non-union type.
    pub fn add_type(&mut self, graph: &TypeGraph, r: TypeRef) {
        let attributes = graph.attributes_of(r);
        match graph.type_at(r) {
            Type::Primitive(PrimitiveKind::String) => self.add_string(attributes),
            Type::Primitive(kind) => self.add_kind(TypeKind::Primitive(*kind), attributes),
            Type::Enum { cases } => self.add_enum(cases, attributes),
            Type::Array { items } => {
                self.array_items.insert(*items);
                self.add_kind(TypeKind::Array, attributes);
            }
            ty @ (Type::Class { .. } | Type::Map { .. } | Type::Object { .. }) => {
                self.objects.insert(r);
                self.add_kind(ty.kind(), attributes);
            }
            Type::Union { .. } => panic!("union {:?} must be flattened before accumulation", r),
            Type::Intersection { .. } => {
                panic!("intersection {:?} cannot be a union member", r)
            }
        }
    }

    /// Add types, flattening nested unions. Returns the combined
    /// attributes of the unions themselves.
    pub fn add_types(
        &mut self,
        graph: &TypeGraph,
        types: impl IntoIterator<Item = TypeRef>,
    ) -> TypeAttributes {
        let types: Vec<TypeRef> = types.into_iter().collect();
        let unions: Vec<TypeRef> = types
            .iter()
            .copied()
            .filter(|r| graph.kind_of(*r) == TypeKind::Union)
            .collect();
        let (members, union_attributes) = crate::type_utils::set_operation_members_recursively(
            graph,
            &unions,
            Some(Combination::Union),
        );
        for r in types
            .into_iter()
            .filter(|r| graph.kind_of(*r) != TypeKind::Union)
            .chain(members)
        {
            self.add_type(graph, r);
        }
        union_attributes
    }

    pub fn array_items(&self) -> &BTreeSet<TypeRef> {
        &self.array_items
    }

    pub fn objects(&self) -> &BTreeSet<TypeRef> {
        &self.objects
    }
}

impl UnionTypeProvider for UnionAccumulator {
    type ArrayData = BTreeSet<TypeRef>;
    type ObjectData = BTreeSet<TypeRef>;

    fn member_kinds(&self) -> BTreeMap<TypeKind, TypeAttributes> {
        let mut merged = self.kinds.clone();
        if merged.is_empty() {
            return BTreeMap::from([(NONE, TypeAttributes::new())]);
        }

        if merged.contains_key(&ANY) {
            let all = TypeAttributes::combine(Combination::Union, merged.values());
            return BTreeMap::from([(ANY, all.without::<StringTypes>())]);
        }

        if merged.len() > 1 {
            if let Some(none) = merged.remove(&NONE) {
                if !none.is_empty() {
                    trace!("dropping attributes of none next to other kinds");
                }
            }
        }

        if self.conflate_numbers && merged.contains_key(&INTEGER) && merged.contains_key(&DOUBLE) {
            if let Some(integer) = merged.remove(&INTEGER) {
                let double = merged.remove(&DOUBLE).unwrap_or_default();
                merged.insert(DOUBLE, double.union(&integer));
            }
        }

        if merged.contains_key(&TypeKind::Map) && merged.contains_key(&TypeKind::Class) {
            if let Some(map) = merged.remove(&TypeKind::Map) {
                let class = merged.remove(&TypeKind::Class).unwrap_or_default();
                merged.insert(TypeKind::Class, class.union(&map));
            }
        }

        if merged.contains_key(&TypeKind::Object) {
            for kind in [TypeKind::Class, TypeKind::Map] {
                if let Some(other) = merged.remove(&kind) {
                    let object = merged.remove(&TypeKind::Object).unwrap_or_default();
                    merged.insert(TypeKind::Object, object.union(&other));
                }
            }
        }

        merged
    }

    fn array_data(&self) -> &BTreeSet<TypeRef> {
        &self.array_items
    }

    fn object_data(&self) -> &BTreeSet<TypeRef> {
        &self.objects
    }

    fn enum_cases(&self) -> &BTreeSet<String> {
        &self.enum_cases
    }

    fn lost_type_attributes(&self) -> bool {
        self.kinds.contains_key(&ANY) && self.kinds.len() > 1
    }
}

/// Build the type for the reduced member kinds of a provider.
///
/// `kinds` is the provider's [`UnionTypeProvider::member_kinds`] with the
/// attributes already mapped into the new generation. A single surviving
/// kind becomes that type directly, with the inferred distance of its
/// attributes increased. Otherwise a union of one type per kind is built;
/// `unique` keeps it from being deduplicated.
pub fn build_union<P, B>(
    provider: &P,
    mut kinds: BTreeMap<TypeKind, TypeAttributes>,
    payload: &mut B,
    builder: &mut GraphRewriteBuilder<'_>,
    attributes: TypeAttributes,
    unique: bool,
    forwarding_ref: Option<TypeRef>,
) -> TypeRef
where
    P: UnionTypeProvider + ?Sized,
    B: UnionPayloadBuilder<P> + ?Sized,
{
    if provider.lost_type_attributes() {
        warn!("type attributes lost while building a union");
        builder.set_lost_type_attributes();
    }

    if kinds.len() == 1 {
        if let Some((kind, member_attributes)) = kinds.pop_first() {
            let all = attributes.union(&member_attributes.increase_distance());
            return make_type_of_kind(provider, payload, builder, kind, all, forwarding_ref);
        }
    }

    let union = unique.then(|| builder.get_unique_union_type(attributes.clone(), None, forwarding_ref));
    let members: BTreeSet<TypeRef> = kinds
        .into_iter()
        .map(|(kind, member_attributes)| {
            make_type_of_kind(provider, payload, builder, kind, member_attributes, None)
        })
        .collect();
    match union {
        Some(union) => {
            builder.set_set_operation_members(union, members);
            union
        }
        None => builder.get_union_type(attributes, members, forwarding_ref),
    }
}

/// Map the attributes of reduced member kinds into the new generation.
pub fn reconstitute_member_kinds<R: Replacer + ?Sized>(
    builder: &mut GraphRewriteBuilder<'_>,
    kinds: BTreeMap<TypeKind, TypeAttributes>,
    replacer: &mut R,
) -> BTreeMap<TypeKind, TypeAttributes> {
    kinds
        .into_iter()
        .map(|(kind, attributes)| (kind, builder.reconstitute_attributes(&attributes, &mut *replacer)))
        .collect()
}

fn make_type_of_kind<P, B>(
    provider: &P,
    payload: &mut B,
    builder: &mut GraphRewriteBuilder<'_>,
    kind: TypeKind,
    attributes: TypeAttributes,
    forwarding_ref: Option<TypeRef>,
) -> TypeRef
where
    P: UnionTypeProvider + ?Sized,
    B: UnionPayloadBuilder<P> + ?Sized,
{
    match kind {
        TypeKind::Primitive(primitive) => {
            builder.get_primitive_type(primitive, attributes, forwarding_ref)
        }
        TypeKind::Enum => {
            builder.get_enum_type(attributes, provider.enum_cases().clone(), forwarding_ref)
        }
        TypeKind::Array => {
            payload.make_array(builder, provider.array_data(), attributes, forwarding_ref)
        }
        TypeKind::Class | TypeKind::Map | TypeKind::Object => {
            payload.make_object(builder, provider.object_data(), attributes, forwarding_ref)
        }
        TypeKind::Union | TypeKind::Intersection => {
            panic!("a union member cannot be of kind {}", kind)
        }
    }
}

/// How the children of unified arrays and objects are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedUnification {
    /// Full unification, using the rewrite memo to cut cycles.
    Recursive,
    /// A plain union of the reconstituted candidates; the pass has to run
    /// again to flatten it.
    Shallow,
}

/// Payload builder used by union unification.
pub struct UnifyUnionBuilder<'r, R: Replacer + ?Sized> {
    replacer: &'r mut R,
    conflate_numbers: bool,
    make_object_types: bool,
    nested: NestedUnification,
    created_nested_unions: bool,
}

impl<'r, R: Replacer + ?Sized> UnifyUnionBuilder<'r, R> {
    pub fn new(
        replacer: &'r mut R,
        conflate_numbers: bool,
        make_object_types: bool,
        nested: NestedUnification,
    ) -> Self {
        Self {
            replacer,
            conflate_numbers,
            make_object_types,
            nested,
            created_nested_unions: false,
        }
    }

    pub fn conflate_numbers(&self) -> bool {
        self.conflate_numbers
    }

    /// Whether a shallow union was created that still needs flattening.
    pub fn created_nested_unions(&self) -> bool {
        self.created_nested_unions
    }

    fn unify_nested(&mut self, builder: &mut GraphRewriteBuilder<'_>, refs: &BTreeSet<TypeRef>) -> TypeRef {
        match self.nested {
            NestedUnification::Recursive => {
                unify_types(refs, TypeAttributes::new(), builder, self, None)
            }
            NestedUnification::Shallow => {
                let mut members: BTreeSet<TypeRef> = refs
                    .iter()
                    .map(|r| builder.reconstitute_type_ref(*r, &mut *self.replacer))
                    .collect();
                if members.len() == 1 {
                    if let Some(single) = members.pop_first() {
                        return single;
                    }
                }
                self.created_nested_unions = true;
                builder.get_union_type(TypeAttributes::new(), members, None)
            }
        }
    }
}

/// Properties shared by a set of object-family types.
///
/// A property is optional if any object lacks it or marks it optional.
/// Additional property types of maps and objects contribute to every
/// property.
pub(crate) struct CliqueProperties {
    pub properties: BTreeMap<String, (BTreeSet<TypeRef>, bool)>,
    pub additional: Option<BTreeSet<TypeRef>>,
}

pub(crate) fn clique_properties(graph: &TypeGraph, objects: &BTreeSet<TypeRef>) -> CliqueProperties {
    let views: Vec<_> = objects
        .iter()
        .filter_map(|o| graph.type_at(*o).object_view())
        .collect();
    let names: BTreeSet<&String> = views.iter().flat_map(|(properties, _)| properties.keys()).collect();

    let mut properties = BTreeMap::new();
    for name in names {
        let mut types = BTreeSet::new();
        let mut optional = false;
        for (object_properties, additional) in &views {
            match (object_properties.get(name), additional) {
                (Some(property), _) => {
                    types.insert(property.ty);
                    optional |= property.optional;
                }
                (None, Some(additional)) => {
                    types.insert(*additional);
                    optional = true;
                }
                (None, None) => optional = true,
            }
        }
        properties.insert(name.clone(), (types, optional));
    }

    let additional: BTreeSet<TypeRef> = views.iter().filter_map(|(_, additional)| *additional).collect();
    CliqueProperties {
        properties,
        additional: (!additional.is_empty()).then_some(additional),
    }
}

impl<R: Replacer + ?Sized> UnionPayloadBuilder<UnionAccumulator> for UnifyUnionBuilder<'_, R> {
    fn make_array(
        &mut self,
        builder: &mut GraphRewriteBuilder<'_>,
        items: &BTreeSet<TypeRef>,
        attributes: TypeAttributes,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        let items = self.unify_nested(builder, items);
        builder.get_array_type(attributes, items, forwarding_ref)
    }

    fn make_object(
        &mut self,
        builder: &mut GraphRewriteBuilder<'_>,
        objects: &BTreeSet<TypeRef>,
        attributes: TypeAttributes,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        let refs: Vec<TypeRef> = objects.iter().copied().collect();
        if let Some(existing) = builder.lookup_type_refs(&refs, forwarding_ref) {
            builder.add_attributes(existing, attributes);
            return existing;
        }
        if let [single] = refs.as_slice() {
            return builder.reconstitute_type_ref_with(
                *single,
                Some(attributes),
                forwarding_ref,
                &mut *self.replacer,
            );
        }

        let graph = builder.original_graph();
        let all_maps = refs
            .iter()
            .all(|r| matches!(graph.type_at(*r), Type::Map { .. }));
        let clique = clique_properties(graph, objects);

        if all_maps && !self.make_object_types {
            let values = clique.additional.unwrap_or_default();
            let values = self.unify_nested(builder, &values);
            return builder.get_map_type(attributes, values, forwarding_ref);
        }

        let mut properties = PropertyMap::new();
        for (name, (types, optional)) in &clique.properties {
            let ty = self.unify_nested(builder, types);
            properties.insert(name.clone(), ClassProperty::new(ty, *optional));
        }

        if self.make_object_types {
            let additional = clique
                .additional
                .map(|additional| self.unify_nested(builder, &additional));
            builder.get_unique_object_type(attributes, Some(properties), additional, forwarding_ref)
        } else {
            if clique.additional.is_some() {
                // Keys of the merged maps beyond the known properties.
                builder.set_lost_type_attributes();
            }
            builder.get_class_type(attributes, properties, forwarding_ref)
        }
    }
}

/// Unify a set of old types into one new type.
pub fn unify_types<R: Replacer + ?Sized>(
    types: &BTreeSet<TypeRef>,
    attributes: TypeAttributes,
    builder: &mut GraphRewriteBuilder<'_>,
    unifier: &mut UnifyUnionBuilder<'_, R>,
    forwarding_ref: Option<TypeRef>,
) -> TypeRef {
    assert!(!types.is_empty(), "cannot unify an empty set of types");
    let graph = builder.original_graph();
    let refs: Vec<TypeRef> = types.iter().copied().collect();

    if let [single] = refs.as_slice() {
        if graph.kind_of(*single) != TypeKind::Union {
            return builder.reconstitute_type_ref_with(
                *single,
                Some(attributes),
                forwarding_ref,
                &mut *unifier.replacer,
            );
        }
    }

    if let Some(existing) = builder.lookup_type_refs(&refs, forwarding_ref) {
        builder.add_attributes(existing, attributes);
        return existing;
    }

    let mut accumulator = UnionAccumulator::new(unifier.conflate_numbers);
    let union_attributes = accumulator.add_types(graph, refs.iter().copied());
    let union_attributes = builder.reconstitute_attributes(&union_attributes, &mut *unifier.replacer);
    let attributes = attributes.union(&union_attributes);

    let forwarding = forwarding_ref.unwrap_or_else(|| builder.reserve_type_ref());
    builder.register_union(&refs, forwarding);
    trace!(types = ?refs, forwarding = ?forwarding, "unify");

    let kinds = reconstitute_member_kinds(builder, accumulator.member_kinds(), &mut *unifier.replacer);
    build_union(&accumulator, kinds, unifier, builder, attributes, false, Some(forwarding))
}
