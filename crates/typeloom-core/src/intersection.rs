//! Narrowing of intersections
//!
//! Every member of an intersection is itself treated as a union of
//! alternatives (a plain type is a union of one). The accumulator keeps,
//! per kind, only what all members admit: primitive kinds shrink, object
//! properties must be admitted by every member, array items collect into
//! an item intersection.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::attributes::{Combination, TypeAttributes};
use crate::graph::TypeGraph;
use crate::rewrite::{GraphRewriteBuilder, Replacer};
use crate::type_utils::{is_canonical_union, set_operation_members_recursively};
use crate::types::{ClassProperty, PrimitiveKind, PropertyMap, Type, TypeKind, TypeRef};
use crate::unify::{UnionPayloadBuilder, UnionTypeProvider};

/// Array items admitted so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayItems {
    /// No member has constrained arrays yet.
    Unconstrained,
    /// Arrays whose items satisfy all of these.
    Items(BTreeSet<TypeRef>),
    /// Some member rules arrays out.
    Excluded,
}

/// Narrowed object shape: property types to intersect and whether the
/// property is optional, plus additional property types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectShape {
    pub properties: BTreeMap<String, (BTreeSet<TypeRef>, bool)>,
    pub additional: Option<BTreeSet<TypeRef>>,
}

#[derive(Debug, Clone)]
pub struct IntersectionAccumulator {
    conflate_numbers: bool,
    /// `None` until a member constrains primitives.
    primitives: Option<BTreeSet<PrimitiveKind>>,
    primitive_attributes: BTreeMap<PrimitiveKind, TypeAttributes>,
    array_items: ArrayItems,
    array_attributes: TypeAttributes,
    /// `None` once objects are ruled out. Before the first member an empty
    /// shape with unrestricted additional properties admits everything.
    object: Option<ObjectShape>,
    object_constrained: bool,
    object_attributes: TypeAttributes,
    lost_type_attributes: bool,
}

impl IntersectionAccumulator {
    pub fn new(conflate_numbers: bool) -> Self {
        Self {
            conflate_numbers,
            primitives: None,
            primitive_attributes: BTreeMap::new(),
            array_items: ArrayItems::Unconstrained,
            array_attributes: TypeAttributes::new(),
            object: Some(ObjectShape {
                properties: BTreeMap::new(),
                additional: Some(BTreeSet::new()),
            }),
            object_constrained: false,
            object_attributes: TypeAttributes::new(),
            lost_type_attributes: false,
        }
    }

    /// Intersect with one member. Returns the attributes of the member
    /// itself when it is a union, to be intersected by the caller.
    pub fn add_type(&mut self, graph: &TypeGraph, r: TypeRef) -> TypeAttributes {
        match graph.type_at(r) {
            Type::Union { members } => {
                let members: Vec<TypeRef> = members.iter().copied().collect();
                self.add_alternatives(graph, &members);
                graph.attributes_of(r).clone()
            }
            Type::Intersection { .. } => {
                panic!("intersection {:?} must be flattened before narrowing", r)
            }
            Type::Primitive(PrimitiveKind::Any) | Type::Primitive(PrimitiveKind::None) => {
                panic!("{:?} cannot be narrowed", graph.kind_of(r))
            }
            Type::Enum { .. } => panic!("enums in intersections are not supported ({:?})", r),
            _ => {
                self.add_alternatives(graph, &[r]);
                TypeAttributes::new()
            }
        }
    }

    fn add_alternatives(&mut self, graph: &TypeGraph, alternatives: &[TypeRef]) {
        self.update_primitives(graph, alternatives);
        self.update_array_items(graph, alternatives);
        self.update_objects(graph, alternatives);
    }

    fn update_primitives(&mut self, graph: &TypeGraph, alternatives: &[TypeRef]) {
        let mut kinds = BTreeSet::new();
        for r in alternatives {
            if let Type::Primitive(kind) = graph.type_at(*r) {
                kinds.insert(*kind);
                let merged = match self.primitive_attributes.get(kind) {
                    Some(existing) => existing.intersect(graph.attributes_of(*r)),
                    None => graph.attributes_of(*r).clone(),
                };
                self.primitive_attributes.insert(*kind, merged);
            }
        }

        let narrowed = match &self.primitives {
            None => kinds,
            Some(current) => {
                let mut narrowed: BTreeSet<PrimitiveKind> =
                    current.intersection(&kinds).copied().collect();
                let had_number = current.iter().any(|k| k.is_number());
                let has_number = kinds.iter().any(|k| k.is_number());
                if had_number && has_number && !narrowed.iter().any(|k| k.is_number()) {
                    // integer on one side, double on the other
                    let kind = if self.conflate_numbers {
                        PrimitiveKind::Double
                    } else {
                        PrimitiveKind::Integer
                    };
                    narrowed.insert(kind);
                    let attributes = TypeAttributes::combine(
                        Combination::Intersect,
                        [PrimitiveKind::Integer, PrimitiveKind::Double]
                            .iter()
                            .filter_map(|k| self.primitive_attributes.get(k)),
                    );
                    self.primitive_attributes.insert(kind, attributes);
                }
                narrowed
            }
        };
        self.primitives = Some(narrowed);
    }

    fn update_array_items(&mut self, graph: &TypeGraph, alternatives: &[TypeRef]) {
        let array = alternatives
            .iter()
            .copied()
            .find_map(|r| match graph.type_at(r) {
                Type::Array { items } => Some((r, *items)),
                _ => None,
            });
        match array {
            None => self.array_items = ArrayItems::Excluded,
            Some((r, items)) => {
                self.array_attributes = self.array_attributes.intersect(graph.attributes_of(r));
                match &mut self.array_items {
                    ArrayItems::Unconstrained => {
                        self.array_items = ArrayItems::Items(BTreeSet::from([items]));
                    }
                    ArrayItems::Items(existing) => {
                        existing.insert(items);
                    }
                    ArrayItems::Excluded => {}
                }
            }
        }
    }

    fn update_objects(&mut self, graph: &TypeGraph, alternatives: &[TypeRef]) {
        let object = alternatives
            .iter()
            .copied()
            .find(|r| graph.kind_of(*r).is_object_family());
        let Some(object) = object else {
            self.object = None;
            return;
        };
        self.object_attributes = self.object_attributes.intersect(graph.attributes_of(object));
        let Some(shape) = self.object.as_mut() else {
            return;
        };
        let Some((properties, additional)) = graph.type_at(object).object_view() else {
            return;
        };
        self.object_constrained = true;

        let names: BTreeSet<String> = shape
            .properties
            .keys()
            .chain(properties.keys())
            .cloned()
            .collect();
        for name in names {
            let existing = shape.properties.remove(&name);
            let next = match (existing, properties.get(&name)) {
                (Some((mut types, optional)), Some(property)) => {
                    types.insert(property.ty);
                    Some((types, optional && property.optional))
                }
                (Some((mut types, optional)), None) => additional.map(|additional| {
                    types.insert(additional);
                    (types, optional)
                }),
                (None, Some(property)) => shape.additional.as_ref().map(|accumulated| {
                    let mut types = accumulated.clone();
                    types.insert(property.ty);
                    (types, property.optional)
                }),
                (None, None) => None,
            };
            if let Some(next) = next {
                shape.properties.insert(name, next);
            }
        }

        shape.additional = match (shape.additional.take(), additional) {
            (Some(mut accumulated), Some(additional)) => {
                accumulated.insert(additional);
                Some(accumulated)
            }
            (Some(accumulated), None) => {
                if !accumulated.is_empty() {
                    self.lost_type_attributes = true;
                }
                None
            }
            (None, _) => None,
        };
    }

    /// Whether a kind was ruled out by some member.
    pub fn is_excluded(&self, kind: TypeKind) -> bool {
        match kind {
            TypeKind::Primitive(primitive) => self
                .primitives
                .as_ref()
                .is_some_and(|kinds| !kinds.contains(&primitive)),
            TypeKind::Array => self.array_items == ArrayItems::Excluded,
            TypeKind::Class | TypeKind::Map | TypeKind::Object => self.object.is_none(),
            TypeKind::Enum | TypeKind::Union | TypeKind::Intersection => true,
        }
    }
}

impl UnionTypeProvider for IntersectionAccumulator {
    type ArrayData = ArrayItems;
    type ObjectData = Option<ObjectShape>;

    fn member_kinds(&self) -> BTreeMap<TypeKind, TypeAttributes> {
        let mut kinds = BTreeMap::new();
        for kind in self.primitives.iter().flatten() {
            let attributes = self
                .primitive_attributes
                .get(kind)
                .cloned()
                .unwrap_or_default();
            kinds.insert(TypeKind::Primitive(*kind), attributes);
        }
        if matches!(self.array_items, ArrayItems::Items(_)) {
            kinds.insert(TypeKind::Array, self.array_attributes.clone());
        }
        if self.object.is_some() && self.object_constrained {
            kinds.insert(TypeKind::Object, self.object_attributes.clone());
        }
        if kinds.is_empty() {
            kinds.insert(TypeKind::Primitive(PrimitiveKind::None), TypeAttributes::new());
        }
        kinds
    }

    fn array_data(&self) -> &ArrayItems {
        &self.array_items
    }

    fn object_data(&self) -> &Option<ObjectShape> {
        &self.object
    }

    fn enum_cases(&self) -> &BTreeSet<String> {
        panic!("enums are never the result of an intersection")
    }

    fn lost_type_attributes(&self) -> bool {
        self.lost_type_attributes
    }
}

/// Payload builder for narrowed intersections. Property and item sets with
/// more than one type become new intersections, to be resolved by another
/// run of the pass.
pub struct IntersectionUnionBuilder<'r, R: Replacer + ?Sized> {
    replacer: &'r mut R,
    created_new_intersections: bool,
}

impl<'r, R: Replacer + ?Sized> IntersectionUnionBuilder<'r, R> {
    pub fn new(replacer: &'r mut R) -> Self {
        Self {
            replacer,
            created_new_intersections: false,
        }
    }

    pub fn created_new_intersections(&self) -> bool {
        self.created_new_intersections
    }

    fn make_intersection(
        &mut self,
        builder: &mut GraphRewriteBuilder<'_>,
        members: &BTreeSet<TypeRef>,
    ) -> TypeRef {
        let mut reconstituted: BTreeSet<TypeRef> = members
            .iter()
            .map(|m| builder.reconstitute_type_ref(*m, &mut *self.replacer))
            .collect();
        if reconstituted.len() == 1 {
            if let Some(single) = reconstituted.pop_first() {
                return single;
            }
        }
        if reconstituted.is_empty() {
            return builder.get_primitive_type(PrimitiveKind::Any, TypeAttributes::new(), None);
        }
        self.created_new_intersections = true;
        builder.get_unique_intersection_type(TypeAttributes::new(), Some(reconstituted), None)
    }
}

impl<R: Replacer + ?Sized> UnionPayloadBuilder<IntersectionAccumulator> for IntersectionUnionBuilder<'_, R> {
    fn make_array(
        &mut self,
        builder: &mut GraphRewriteBuilder<'_>,
        items: &ArrayItems,
        attributes: TypeAttributes,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        let ArrayItems::Items(items) = items else {
            panic!("no array items to intersect");
        };
        let items = self.make_intersection(builder, items);
        builder.get_array_type(attributes, items, forwarding_ref)
    }

    fn make_object(
        &mut self,
        builder: &mut GraphRewriteBuilder<'_>,
        shape: &Option<ObjectShape>,
        attributes: TypeAttributes,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        let Some(shape) = shape else {
            panic!("objects were ruled out of the intersection");
        };
        let mut properties = PropertyMap::new();
        for (name, (types, optional)) in &shape.properties {
            let ty = self.make_intersection(builder, types);
            properties.insert(name.clone(), ClassProperty::new(ty, *optional));
        }
        let additional = shape
            .additional
            .as_ref()
            .map(|additional| self.make_intersection(builder, additional));
        builder.get_unique_object_type(attributes, Some(properties), additional, forwarding_ref)
    }
}

/// An intersection can be narrowed once none of its members is a union
/// that still needs flattening.
pub fn can_resolve(graph: &TypeGraph, intersection: TypeRef) -> bool {
    let (members, _) = set_operation_members_recursively(graph, &[intersection], None);
    if members.len() <= 1 {
        return true;
    }
    let resolvable = members
        .iter()
        .all(|m| graph.kind_of(*m) != TypeKind::Union || is_canonical_union(graph, *m));
    if !resolvable {
        trace!(intersection = ?intersection, "intersection waits for union flattening");
    }
    resolvable
}
