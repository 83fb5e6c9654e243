//! Type attributes
//!
//! Attributes are extensible side information carried by every type. Each
//! attribute kind is a plain Rust type implementing [`TypeAttribute`]; a
//! [`TypeAttributes`] map stores them type-erased, keyed by the kind's token.
//! Union-combination happens when types are unified, intersection when they
//! are narrowed. A kind whose combination fails is dropped from the result.

mod constraints;
mod names;
mod strings;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::types::TypeRef;

pub use constraints::{Description, MinMax, MinMaxLength, Provenance, UnionIdentifier, UriFacts};
pub use names::TypeNames;
pub use strings::StringTypes;

/// How attributes of several types are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    Union,
    Intersect,
}

/// One attribute kind.
pub trait TypeAttribute: Any + Clone + fmt::Debug + Eq + Hash + Send + Sync {
    /// Token under which the kind is stored.
    const KIND: &'static str;

    /// Whether the value participates in the owning type's identity.
    const IN_IDENTITY: bool = false;

    /// Merge for unions. `None` drops the attribute from the result.
    fn combine(&self, other: &Self) -> Option<Self>;

    /// Merge for intersections.
    fn intersect(&self, other: &Self) -> Option<Self> {
        self.combine(other)
    }

    /// A `true` here makes the owning type exempt from deduplication.
    fn requires_unique_identity(&self) -> bool {
        false
    }

    /// Called when a type is derived from this one by inference, e.g. the
    /// single surviving kind of a union.
    fn increase_distance(&self) -> Option<Self> {
        Some(self.clone())
    }

    fn make_inferred(&self) -> Option<Self> {
        Some(self.clone())
    }

    /// Type refs embedded in the value.
    fn children(&self) -> Vec<TypeRef> {
        Vec::new()
    }

    /// Rebuild the value with every embedded ref mapped into a new
    /// generation.
    fn reconstitute(&self, _map: &mut dyn FnMut(TypeRef) -> TypeRef) -> Self {
        self.clone()
    }

    fn stringify(&self) -> Option<String> {
        None
    }
}

trait ErasedAttribute: fmt::Debug + Send + Sync {
    fn in_identity(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn ErasedAttribute) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
    fn dyn_combine(
        &self,
        other: &dyn ErasedAttribute,
        combination: Combination,
    ) -> Option<Arc<dyn ErasedAttribute>>;
    fn requires_unique_identity(&self) -> bool;
    fn dyn_increase_distance(&self) -> Option<Arc<dyn ErasedAttribute>>;
    fn dyn_make_inferred(&self) -> Option<Arc<dyn ErasedAttribute>>;
    fn children(&self) -> Vec<TypeRef>;
    fn dyn_reconstitute(
        &self,
        map: &mut dyn FnMut(TypeRef) -> TypeRef,
    ) -> Arc<dyn ErasedAttribute>;
    fn stringify(&self) -> Option<String>;
}

impl<T: TypeAttribute> ErasedAttribute for T {
    fn in_identity(&self) -> bool {
        T::IN_IDENTITY
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn ErasedAttribute) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        T::KIND.hash(&mut state);
        self.hash(&mut state);
    }

    fn dyn_combine(
        &self,
        other: &dyn ErasedAttribute,
        combination: Combination,
    ) -> Option<Arc<dyn ErasedAttribute>> {
        let Some(other) = other.as_any().downcast_ref::<T>() else {
            panic!("attribute kind {} stored under a foreign token", T::KIND);
        };
        let combined = match combination {
            Combination::Union => self.combine(other),
            Combination::Intersect => self.intersect(other),
        };
        combined.map(|value| Arc::new(value) as Arc<dyn ErasedAttribute>)
    }

    fn requires_unique_identity(&self) -> bool {
        TypeAttribute::requires_unique_identity(self)
    }

    fn dyn_increase_distance(&self) -> Option<Arc<dyn ErasedAttribute>> {
        self.increase_distance()
            .map(|value| Arc::new(value) as Arc<dyn ErasedAttribute>)
    }

    fn dyn_make_inferred(&self) -> Option<Arc<dyn ErasedAttribute>> {
        self.make_inferred()
            .map(|value| Arc::new(value) as Arc<dyn ErasedAttribute>)
    }

    fn children(&self) -> Vec<TypeRef> {
        TypeAttribute::children(self)
    }

    fn dyn_reconstitute(
        &self,
        map: &mut dyn FnMut(TypeRef) -> TypeRef,
    ) -> Arc<dyn ErasedAttribute> {
        Arc::new(self.reconstitute(map))
    }

    fn stringify(&self) -> Option<String> {
        TypeAttribute::stringify(self)
    }
}

/// Attribute map of one type.
#[derive(Clone, Default)]
pub struct TypeAttributes {
    entries: BTreeMap<&'static str, Arc<dyn ErasedAttribute>>,
}

impl TypeAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of<T: TypeAttribute>(value: T) -> Self {
        Self::new().with(value)
    }

    pub fn with<T: TypeAttribute>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Set a kind, replacing any previous value.
    pub fn insert<T: TypeAttribute>(&mut self, value: T) {
        self.entries.insert(T::KIND, Arc::new(value));
    }

    pub fn get<T: TypeAttribute>(&self) -> Option<&T> {
        self.entries.get(T::KIND)?.as_any().downcast_ref::<T>()
    }

    pub fn contains<T: TypeAttribute>(&self) -> bool {
        self.entries.contains_key(T::KIND)
    }

    pub fn without<T: TypeAttribute>(&self) -> Self {
        let mut result = self.clone();
        result.entries.remove(T::KIND);
        result
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Merge any number of attribute maps kind by kind. Kinds that fail to
    /// combine are dropped.
    pub fn combine<'a>(
        combination: Combination,
        all: impl IntoIterator<Item = &'a TypeAttributes>,
    ) -> TypeAttributes {
        let mut merged: BTreeMap<&'static str, Option<Arc<dyn ErasedAttribute>>> =
            BTreeMap::new();
        for attributes in all {
            for (kind, value) in &attributes.entries {
                match merged.get_mut(kind) {
                    None => {
                        merged.insert(*kind, Some(Arc::clone(value)));
                    }
                    // Once a kind has failed to combine it stays dropped.
                    Some(slot) => {
                        if let Some(current) = slot.take() {
                            *slot = current.dyn_combine(value.as_ref(), combination);
                        }
                    }
                }
            }
        }
        TypeAttributes {
            entries: merged
                .into_iter()
                .filter_map(|(kind, value)| value.map(|value| (kind, value)))
                .collect(),
        }
    }

    pub fn union(&self, other: &TypeAttributes) -> TypeAttributes {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        Self::combine(Combination::Union, [self, other])
    }

    pub fn intersect(&self, other: &TypeAttributes) -> TypeAttributes {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        Self::combine(Combination::Intersect, [self, other])
    }

    pub fn requires_unique_identity(&self) -> bool {
        self.entries
            .values()
            .any(|value| value.requires_unique_identity())
    }

    /// Identity-relevant part, or `None` when the type must stay unique.
    pub fn identity(&self) -> Option<IdentityAttributes> {
        if self.requires_unique_identity() {
            return None;
        }
        Some(IdentityAttributes(
            self.entries
                .values()
                .filter(|value| value.in_identity())
                .cloned()
                .collect(),
        ))
    }

    pub fn without_identity(&self) -> TypeAttributes {
        TypeAttributes {
            entries: self
                .entries
                .iter()
                .filter(|(_, value)| !value.in_identity())
                .map(|(kind, value)| (*kind, Arc::clone(value)))
                .collect(),
        }
    }

    /// Whether adding `other` would change identity-relevant values already
    /// present here.
    pub(crate) fn identity_conflict(&self, other: &TypeAttributes) -> Option<&'static str> {
        other
            .entries
            .iter()
            .filter(|(_, value)| value.in_identity())
            .find(|(kind, value)| match self.entries.get(*kind) {
                Some(existing) => !existing.dyn_eq(value.as_ref()),
                None => true,
            })
            .map(|(kind, _)| *kind)
    }

    pub fn increase_distance(&self) -> TypeAttributes {
        TypeAttributes {
            entries: self
                .entries
                .iter()
                .filter_map(|(kind, value)| value.dyn_increase_distance().map(|v| (*kind, v)))
                .collect(),
        }
    }

    pub fn make_inferred(&self) -> TypeAttributes {
        TypeAttributes {
            entries: self
                .entries
                .iter()
                .filter_map(|(kind, value)| value.dyn_make_inferred().map(|v| (*kind, v)))
                .collect(),
        }
    }

    /// Every type ref embedded in any attribute.
    pub fn children(&self) -> Vec<TypeRef> {
        self.entries
            .values()
            .flat_map(|value| value.children())
            .collect()
    }

    pub fn reconstitute(&self, map: &mut dyn FnMut(TypeRef) -> TypeRef) -> TypeAttributes {
        TypeAttributes {
            entries: self
                .entries
                .iter()
                .map(|(kind, value)| {
                    let value = if value.children().is_empty() {
                        Arc::clone(value)
                    } else {
                        value.dyn_reconstitute(map)
                    };
                    (*kind, value)
                })
                .collect(),
        }
    }

    /// `kind: value` strings for every kind that can describe itself.
    pub fn describe(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|(kind, value)| value.stringify().map(|s| format!("{}: {}", kind, s)))
            .collect()
    }
}

impl PartialEq for TypeAttributes {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.dyn_eq(vb.as_ref()))
    }
}

impl Eq for TypeAttributes {}

impl fmt::Debug for TypeAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

/// Identity-relevant attribute values of one type, in kind order.
#[derive(Clone, Default)]
pub struct IdentityAttributes(Vec<Arc<dyn ErasedAttribute>>);

impl PartialEq for IdentityAttributes {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.dyn_eq(b.as_ref()))
    }
}

impl Eq for IdentityAttributes {}

impl Hash for IdentityAttributes {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for value in &self.0 {
            value.dyn_hash(state);
        }
    }
}

impl fmt::Debug for IdentityAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_get_returns_typed_value() {
        let attributes = TypeAttributes::of(TypeNames::given(["User"]));
        let names = attributes.get::<TypeNames>().unwrap();
        assert!(names.names().contains("User"));
        assert!(attributes.get::<Description>().is_none());
    }

    #[test]
    fn test_union_combines_per_kind() {
        let a = TypeAttributes::of(Description::new("first"));
        let b = TypeAttributes::of(Description::new("second")).with(Provenance::single(3));
        let merged = a.union(&b);
        assert_eq!(merged.len(), 2);
        let description = merged.get::<Description>().unwrap();
        assert_eq!(
            description.lines().iter().cloned().collect::<Vec<_>>(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn test_failed_combination_drops_kind() {
        let a = TypeAttributes::of(UnionIdentifier::new(1));
        let b = TypeAttributes::of(UnionIdentifier::new(2));
        let c = TypeAttributes::of(UnionIdentifier::new(2));
        let merged = TypeAttributes::combine(Combination::Intersect, [&a, &b, &c]);
        assert!(!merged.contains::<UnionIdentifier>());
    }

    #[test]
    fn test_identity_only_covers_identity_kinds() {
        let plain = TypeAttributes::of(TypeNames::given(["A"]));
        let other = TypeAttributes::of(TypeNames::given(["B"]));
        assert!(plain.identity() == other.identity());

        let restricted = plain.with(StringTypes::from_cases([("a", 1)]));
        assert!(restricted.identity() != other.identity());
        assert!(restricted.without_identity().identity() == other.identity());
    }

    #[test]
    fn test_bounds_are_identity_kinds() {
        let bounded = TypeAttributes::of(MinMax::new(Some(0.0), None)).with(Description::new("count"));
        assert_eq!(bounded.kinds().collect::<Vec<_>>(), vec!["description", "minMax"]);
        assert!(bounded.identity() != TypeAttributes::new().identity());
        assert_eq!(
            bounded.without_identity().kinds().collect::<Vec<_>>(),
            vec!["description"]
        );

        let short = TypeAttributes::of(MinMaxLength::new(None, Some(3)));
        assert_eq!(short.without_identity().len(), 0);
    }

    #[test]
    fn test_identity_conflict_detection() {
        let existing = TypeAttributes::of(StringTypes::unrestricted());
        assert_eq!(
            existing.identity_conflict(&TypeAttributes::of(StringTypes::unrestricted())),
            None
        );
        assert_eq!(
            existing.identity_conflict(&TypeAttributes::of(StringTypes::from_cases([("x", 1)]))),
            Some(StringTypes::KIND)
        );
        assert_eq!(
            existing.identity_conflict(&TypeAttributes::of(Description::new("ignored"))),
            None
        );
    }

    #[test]
    fn test_increase_distance_only_touches_inferred_names() {
        let given = TypeAttributes::of(TypeNames::given(["Given"]));
        assert_eq!(given.increase_distance(), given);

        let inferred = TypeAttributes::of(TypeNames::inferred(["Guess"]));
        let bumped = inferred.increase_distance();
        assert_eq!(bumped.get::<TypeNames>().unwrap().distance(), 1);
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let a = TypeAttributes::new()
            .with(Description::new("d"))
            .with(Provenance::from_indices(BTreeSet::from([1, 2])));
        let b = TypeAttributes::new()
            .with(Provenance::from_indices(BTreeSet::from([1, 2])))
            .with(Description::new("d"));
        assert_eq!(a, b);
    }
}
