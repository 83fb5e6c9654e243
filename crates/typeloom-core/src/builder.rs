//! Construction of a single graph generation

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::trace;

use crate::attributes::{StringTypes, TypeAttribute, TypeAttributes};
use crate::graph::TypeGraph;
use crate::types::{PrimitiveKind, PropertyMap, Type, TypeIdentity, TypeRef};

/// What a reserved unique ref is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Class,
    Object,
    Union,
    Intersection,
}

/// Mutable builder for one graph generation.
///
/// Structurally equal types are deduplicated through [`TypeIdentity`]; the
/// `get_unique_*` helpers bypass that for types that must stay distinct or
/// whose contents are only known after their ref has been handed out.
#[derive(Debug)]
pub struct TypeBuilder {
    serial: u32,
    types: Vec<Option<Type>>,
    attributes: Vec<TypeAttributes>,
    has_identity: Vec<bool>,
    identities: HashMap<TypeIdentity, TypeRef>,
    pending: HashMap<usize, Pending>,
    top_levels: BTreeMap<String, TypeRef>,
    lost_type_attributes: bool,
    added_forwarding_intersection: bool,
}

impl Default for TypeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeBuilder {
    pub fn new() -> Self {
        Self::with_serial(0)
    }

    pub fn with_serial(serial: u32) -> Self {
        Self {
            serial,
            types: Vec::new(),
            attributes: Vec::new(),
            has_identity: Vec::new(),
            identities: HashMap::new(),
            pending: HashMap::new(),
            top_levels: BTreeMap::new(),
            lost_type_attributes: false,
            added_forwarding_intersection: false,
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Number of allocated refs, committed or not.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The committed type at `r`, `None` while it is only reserved.
    pub fn type_at(&self, r: TypeRef) -> Option<&Type> {
        self.check_ref(r);
        self.types[r.index()].as_ref()
    }

    pub fn attributes_of(&self, r: TypeRef) -> &TypeAttributes {
        self.check_ref(r);
        &self.attributes[r.index()]
    }

    pub fn reserve_type_ref(&mut self) -> TypeRef {
        let r = TypeRef::new(self.serial, self.types.len());
        self.types.push(None);
        self.attributes.push(TypeAttributes::new());
        self.has_identity.push(false);
        r
    }

    /// Bind a reserved ref. Committing twice aborts.
    pub fn commit_type(&mut self, r: TypeRef, ty: Type) {
        self.check_ref(r);
        for child in ty.children() {
            self.check_ref(child);
        }
        let slot = &mut self.types[r.index()];
        assert!(slot.is_none(), "type {:?} committed twice", r);
        trace!(type_ref = ?r, kind = %ty.kind(), "commit");
        *slot = Some(ty);
    }

    /// Central deduplication point.
    ///
    /// On an identity hit the attributes are merged into the existing type.
    /// If a forwarding ref was reserved for the result it must end up
    /// holding the type, so it is committed as a single-member intersection
    /// pointing at the existing one.
    pub fn get_or_add_type(
        &mut self,
        ty: Type,
        attributes: TypeAttributes,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        let Some(identity) = TypeIdentity::new(&ty, &attributes) else {
            return self.commit_new(ty, attributes, forwarding_ref);
        };
        if let Some(&existing) = self.identities.get(&identity) {
            self.add_attributes(existing, attributes.without_identity());
            return self.forward_if_necessary(forwarding_ref, existing);
        }
        let r = self.commit_new(ty, attributes, forwarding_ref);
        self.has_identity[r.index()] = true;
        self.identities.insert(identity, r);
        r
    }

    fn commit_new(
        &mut self,
        ty: Type,
        attributes: TypeAttributes,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        let r = forwarding_ref.unwrap_or_else(|| self.reserve_type_ref());
        self.commit_type(r, ty);
        let index = r.index();
        self.attributes[index] = self.attributes[index].union(&attributes);
        r
    }

    /// Make `forwarding_ref` stand for `target`, or just return `target`.
    pub(crate) fn forward_if_necessary(
        &mut self,
        forwarding_ref: Option<TypeRef>,
        target: TypeRef,
    ) -> TypeRef {
        match forwarding_ref {
            None => target,
            Some(forwarding) => {
                assert_ne!(forwarding, target, "a type cannot forward to itself");
                self.commit_type(
                    forwarding,
                    Type::Intersection {
                        members: BTreeSet::from([target]),
                    },
                );
                self.added_forwarding_intersection = true;
                forwarding
            }
        }
    }

    /// Union-combine attributes into `r`.
    ///
    /// Deduplicated types are keyed by their identity attributes, so those
    /// can only be re-added with equal values.
    pub fn add_attributes(&mut self, r: TypeRef, attributes: TypeAttributes) {
        self.check_ref(r);
        if attributes.is_empty() {
            return;
        }
        let index = r.index();
        if self.has_identity[index] {
            if let Some(kind) = self.attributes[index].identity_conflict(&attributes) {
                panic!(
                    "attribute {} would change the identity of deduplicated type {:?}",
                    kind, r
                );
            }
        }
        self.attributes[index] = self.attributes[index].union(&attributes);
    }

    pub fn add_top_level(&mut self, name: impl Into<String>, r: TypeRef) {
        self.check_ref(r);
        let name = name.into();
        assert!(
            !self.top_levels.contains_key(&name),
            "duplicate top-level {}",
            name
        );
        self.top_levels.insert(name, r);
    }

    pub fn top_levels(&self) -> &BTreeMap<String, TypeRef> {
        &self.top_levels
    }

    pub fn set_lost_type_attributes(&mut self) {
        self.lost_type_attributes = true;
    }

    pub fn lost_type_attributes(&self) -> bool {
        self.lost_type_attributes
    }

    pub fn get_primitive_type(
        &mut self,
        kind: PrimitiveKind,
        attributes: TypeAttributes,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        if kind == PrimitiveKind::String {
            return self.get_string_type(attributes, None, forwarding_ref);
        }
        self.get_or_add_type(Type::Primitive(kind), attributes, forwarding_ref)
    }

    /// Plain strings always carry a [`StringTypes`] value so that restricted
    /// and unrestricted strings never deduplicate into each other.
    pub fn get_string_type(
        &mut self,
        attributes: TypeAttributes,
        string_types: Option<StringTypes>,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        let string_types = match (attributes.get::<StringTypes>(), string_types) {
            (Some(existing), Some(given)) => existing
                .combine(&given)
                .unwrap_or_else(StringTypes::unrestricted),
            (Some(existing), None) => existing.clone(),
            (None, Some(given)) => given,
            (None, None) => StringTypes::unrestricted(),
        };
        let attributes = attributes.with(string_types);
        self.get_or_add_type(
            Type::Primitive(PrimitiveKind::String),
            attributes,
            forwarding_ref,
        )
    }

    pub fn get_enum_type(
        &mut self,
        attributes: TypeAttributes,
        cases: BTreeSet<String>,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        self.get_or_add_type(Type::Enum { cases }, attributes, forwarding_ref)
    }

    pub fn get_array_type(
        &mut self,
        attributes: TypeAttributes,
        items: TypeRef,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        self.get_or_add_type(Type::Array { items }, attributes, forwarding_ref)
    }

    pub fn get_class_type(
        &mut self,
        attributes: TypeAttributes,
        properties: PropertyMap,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        self.get_or_add_type(Type::Class { properties }, attributes, forwarding_ref)
    }

    /// A class that is never deduplicated. Without properties the ref is
    /// reserved and must be completed with [`Self::set_object_properties`].
    pub fn get_unique_class_type(
        &mut self,
        attributes: TypeAttributes,
        properties: Option<PropertyMap>,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        match properties {
            Some(properties) => {
                self.commit_new(Type::Class { properties }, attributes, forwarding_ref)
            }
            None => self.reserve_pending(Pending::Class, attributes, forwarding_ref),
        }
    }

    pub fn get_map_type(
        &mut self,
        attributes: TypeAttributes,
        values: TypeRef,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        self.get_or_add_type(Type::Map { values }, attributes, forwarding_ref)
    }

    pub fn get_unique_object_type(
        &mut self,
        attributes: TypeAttributes,
        properties: Option<PropertyMap>,
        additional_properties: Option<TypeRef>,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        match properties {
            Some(properties) => self.commit_new(
                Type::Object {
                    properties,
                    additional_properties,
                },
                attributes,
                forwarding_ref,
            ),
            None => {
                assert!(
                    additional_properties.is_none(),
                    "additional properties of a reserved object are set together with its properties"
                );
                self.reserve_pending(Pending::Object, attributes, forwarding_ref)
            }
        }
    }

    /// Complete a reserved unique class or object.
    pub fn set_object_properties(
        &mut self,
        r: TypeRef,
        properties: PropertyMap,
        additional_properties: Option<TypeRef>,
    ) {
        let ty = match self.pending.remove(&r.index()) {
            Some(Pending::Class) => {
                assert!(
                    additional_properties.is_none(),
                    "class {:?} cannot have additional properties",
                    r
                );
                Type::Class { properties }
            }
            Some(Pending::Object) => Type::Object {
                properties,
                additional_properties,
            },
            other => panic!("properties of {:?} already set or not an object ({:?})", r, other),
        };
        self.commit_type(r, ty);
    }

    pub fn get_union_type(
        &mut self,
        attributes: TypeAttributes,
        members: BTreeSet<TypeRef>,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        self.get_or_add_type(Type::Union { members }, attributes, forwarding_ref)
    }

    pub fn get_unique_union_type(
        &mut self,
        attributes: TypeAttributes,
        members: Option<BTreeSet<TypeRef>>,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        match members {
            Some(members) => self.commit_new(Type::Union { members }, attributes, forwarding_ref),
            None => self.reserve_pending(Pending::Union, attributes, forwarding_ref),
        }
    }

    pub fn get_intersection_type(
        &mut self,
        attributes: TypeAttributes,
        members: BTreeSet<TypeRef>,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        self.get_or_add_type(Type::Intersection { members }, attributes, forwarding_ref)
    }

    pub fn get_unique_intersection_type(
        &mut self,
        attributes: TypeAttributes,
        members: Option<BTreeSet<TypeRef>>,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        match members {
            Some(members) => {
                self.commit_new(Type::Intersection { members }, attributes, forwarding_ref)
            }
            None => self.reserve_pending(Pending::Intersection, attributes, forwarding_ref),
        }
    }

    /// Complete a reserved unique union or intersection.
    pub fn set_set_operation_members(&mut self, r: TypeRef, members: BTreeSet<TypeRef>) {
        let ty = match self.pending.remove(&r.index()) {
            Some(Pending::Union) => Type::Union { members },
            Some(Pending::Intersection) => Type::Intersection { members },
            other => panic!(
                "members of {:?} already set or not a set operation ({:?})",
                r, other
            ),
        };
        self.commit_type(r, ty);
    }

    fn reserve_pending(
        &mut self,
        pending: Pending,
        attributes: TypeAttributes,
        forwarding_ref: Option<TypeRef>,
    ) -> TypeRef {
        let r = forwarding_ref.unwrap_or_else(|| self.reserve_type_ref());
        self.check_ref(r);
        assert!(self.types[r.index()].is_none(), "type {:?} committed twice", r);
        self.pending.insert(r.index(), pending);
        let index = r.index();
        self.attributes[index] = self.attributes[index].union(&attributes);
        r
    }

    fn check_ref(&self, r: TypeRef) {
        r.assert_serial(self.serial);
        assert!(
            r.index() < self.types.len(),
            "type ref {:?} out of range ({} allocated)",
            r,
            self.types.len()
        );
    }

    /// Freeze the generation. Every reserved ref must have been committed.
    pub fn finish(self) -> TypeGraph {
        self.finish_with_forwarding().0
    }

    pub(crate) fn finish_with_forwarding(self) -> (TypeGraph, bool) {
        let serial = self.serial;
        let types: Vec<Type> = self
            .types
            .into_iter()
            .enumerate()
            .map(|(index, ty)| match ty {
                Some(ty) => ty,
                None => panic!("type #{} was reserved but never committed", index),
            })
            .collect();
        let graph = TypeGraph::from_parts(
            serial,
            types,
            self.attributes,
            self.top_levels,
            self.lost_type_attributes,
        );
        (graph, self.added_forwarding_intersection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{Description, MinMax, MinMaxLength, TypeNames};
    use crate::types::ClassProperty;

    #[test]
    fn test_equal_identity_returns_same_ref() {
        let mut builder = TypeBuilder::new();
        let a = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new(), None);
        let b = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new(), None);
        let c = builder.get_primitive_type(PrimitiveKind::Double, TypeAttributes::new(), None);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_dedup_merges_non_identity_attributes() {
        let mut builder = TypeBuilder::new();
        let a = builder.get_primitive_type(
            PrimitiveKind::Bool,
            TypeAttributes::of(TypeNames::given(["Flag"])),
            None,
        );
        let b = builder.get_primitive_type(
            PrimitiveKind::Bool,
            TypeAttributes::of(Description::new("a flag")),
            None,
        );
        assert_eq!(a, b);
        let attributes = builder.attributes_of(a);
        assert!(attributes.contains::<TypeNames>());
        assert!(attributes.contains::<Description>());
    }

    #[test]
    fn test_restricted_strings_stay_distinct() {
        let mut builder = TypeBuilder::new();
        let plain = builder.get_string_type(TypeAttributes::new(), None, None);
        let restricted = builder.get_string_type(
            TypeAttributes::new(),
            Some(StringTypes::from_cases([("on", 1)])),
            None,
        );
        let plain_again =
            builder.get_primitive_type(PrimitiveKind::String, TypeAttributes::new(), None);
        assert_ne!(plain, restricted);
        assert_eq!(plain, plain_again);
    }

    #[test]
    fn test_forwarding_ref_on_hit_becomes_intersection() {
        let mut builder = TypeBuilder::new();
        let existing = builder.get_primitive_type(PrimitiveKind::Null, TypeAttributes::new(), None);
        let forwarding = builder.reserve_type_ref();
        let result = builder.get_primitive_type(
            PrimitiveKind::Null,
            TypeAttributes::new(),
            Some(forwarding),
        );
        assert_eq!(result, forwarding);
        assert_eq!(
            builder.type_at(forwarding),
            Some(&Type::Intersection {
                members: BTreeSet::from([existing])
            })
        );
        let (_, forwarded) = builder.finish_with_forwarding();
        assert!(forwarded);
    }

    #[test]
    fn test_unique_class_is_completed_later() {
        let mut builder = TypeBuilder::new();
        let class = builder.get_unique_class_type(TypeAttributes::new(), None, None);
        assert!(builder.type_at(class).is_none());
        let mut properties = PropertyMap::new();
        properties.insert("next".to_string(), ClassProperty::new(class, true));
        builder.set_object_properties(class, properties.clone(), None);
        builder.add_top_level("Node", class);
        let graph = builder.finish();
        assert_eq!(graph.type_at(class), &Type::Class { properties });
    }

    #[test]
    fn test_unique_types_are_not_deduplicated() {
        let mut builder = TypeBuilder::new();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new(), None);
        let members = BTreeSet::from([int]);
        let a = builder.get_unique_union_type(TypeAttributes::new(), Some(members.clone()), None);
        let b = builder.get_unique_union_type(TypeAttributes::new(), Some(members.clone()), None);
        let c = builder.get_union_type(TypeAttributes::new(), members.clone(), None);
        let d = builder.get_union_type(TypeAttributes::new(), members, None);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(c, d);
    }

    #[test]
    fn test_bounds_keep_types_apart() {
        let mut builder = TypeBuilder::new();
        let plain = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new(), None);
        let bounded = builder.get_primitive_type(
            PrimitiveKind::Integer,
            TypeAttributes::of(MinMax::new(Some(0.0), Some(10.0))),
            None,
        );
        let again = builder.get_primitive_type(
            PrimitiveKind::Integer,
            TypeAttributes::of(MinMax::new(Some(0.0), Some(10.0))),
            None,
        );
        assert_ne!(plain, bounded);
        assert_eq!(bounded, again);
        assert!(!builder.attributes_of(plain).contains::<MinMax>());

        let short = builder.get_string_type(TypeAttributes::of(MinMaxLength::new(None, Some(8))), None, None);
        let text = builder.get_string_type(TypeAttributes::new(), None, None);
        assert_ne!(short, text);
        assert!(!builder.attributes_of(text).contains::<MinMaxLength>());
    }

    #[test]
    #[should_panic(expected = "committed twice")]
    fn test_double_commit_panics() {
        let mut builder = TypeBuilder::new();
        let r = builder.reserve_type_ref();
        builder.commit_type(r, Type::Primitive(PrimitiveKind::Null));
        builder.commit_type(r, Type::Primitive(PrimitiveKind::Bool));
    }

    #[test]
    #[should_panic(expected = "reserved but never committed")]
    fn test_finish_with_open_reservation_panics() {
        let mut builder = TypeBuilder::new();
        builder.reserve_type_ref();
        builder.finish();
    }

    #[test]
    #[should_panic(expected = "duplicate top-level")]
    fn test_duplicate_top_level_panics() {
        let mut builder = TypeBuilder::new();
        let r = builder.get_primitive_type(PrimitiveKind::Any, TypeAttributes::new(), None);
        builder.add_top_level("Root", r);
        builder.add_top_level("Root", r);
    }

    #[test]
    #[should_panic(expected = "would change the identity")]
    fn test_identity_attribute_change_panics() {
        let mut builder = TypeBuilder::new();
        let s = builder.get_string_type(TypeAttributes::new(), None, None);
        builder.add_attributes(s, TypeAttributes::of(StringTypes::from_cases([("x", 1)])));
    }

    #[test]
    #[should_panic(expected = "used in generation")]
    fn test_foreign_generation_ref_panics() {
        let mut old = TypeBuilder::with_serial(3);
        let r = old.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new(), None);
        let mut builder = TypeBuilder::with_serial(4);
        builder.get_array_type(TypeAttributes::new(), r, None);
    }
}
