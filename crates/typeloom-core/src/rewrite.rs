//! Rewriting one generation into the next
//!
//! A rewrite walks everything reachable from the top-levels of the old
//! graph and rebuilds it in a fresh [`TypeBuilder`]. Types that belong to a
//! replacement group are handed to a [`Replacer`] instead of being copied.
//! Cycles are cut by reserving a forwarding ref for a type before any of its
//! children are visited.

use std::collections::{BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::attributes::TypeAttributes;
use crate::builder::TypeBuilder;
use crate::graph::TypeGraph;
use crate::types::{ClassProperty, PropertyMap, Type, TypeRef};

/// Produces the replacement for one group of old types.
///
/// The result must be committed at `forwarding_ref`: every member of the
/// group has already been mapped to it, so types referring back into the
/// group see it before the replacement is done.
pub trait Replacer {
    fn replace(
        &mut self,
        group: &[TypeRef],
        builder: &mut GraphRewriteBuilder<'_>,
        forwarding_ref: TypeRef,
    ) -> TypeRef;
}

/// Replacer for rewrites without groups.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReplacement;

impl Replacer for NoReplacement {
    fn replace(
        &mut self,
        group: &[TypeRef],
        _builder: &mut GraphRewriteBuilder<'_>,
        _forwarding_ref: TypeRef,
    ) -> TypeRef {
        panic!("no replacer registered for group {:?}", group)
    }
}

/// Builder for the generation following `original`.
///
/// Dereferences to the underlying [`TypeBuilder`], so replacers create new
/// types with the usual `get_*` helpers.
pub struct GraphRewriteBuilder<'g> {
    original: &'g TypeGraph,
    builder: TypeBuilder,
    reconstituted: HashMap<usize, TypeRef>,
    group_of: HashMap<usize, usize>,
    groups: Vec<Vec<TypeRef>>,
    aliases: HashMap<usize, TypeRef>,
    alias_attributes: HashMap<usize, TypeAttributes>,
    unions: HashMap<BTreeSet<TypeRef>, TypeRef>,
}

impl<'g> GraphRewriteBuilder<'g> {
    pub(crate) fn new(
        original: &'g TypeGraph,
        groups: Vec<Vec<TypeRef>>,
        aliases: HashMap<TypeRef, TypeRef>,
    ) -> Self {
        let mut group_of = HashMap::new();
        for (index, group) in groups.iter().enumerate() {
            for r in group {
                r.assert_serial(original.serial());
                let previous = group_of.insert(r.index(), index);
                assert!(
                    previous.is_none(),
                    "type {:?} is in more than one replacement group",
                    r
                );
            }
        }

        let mut builder = Self {
            original,
            builder: TypeBuilder::with_serial(original.serial() + 1),
            reconstituted: HashMap::new(),
            group_of,
            groups,
            aliases: aliases
                .iter()
                .map(|(from, to)| {
                    from.assert_serial(original.serial());
                    to.assert_serial(original.serial());
                    (from.index(), *to)
                })
                .collect(),
            alias_attributes: HashMap::new(),
            unions: HashMap::new(),
        };
        for from in aliases.keys() {
            let target = builder.resolve_alias(*from);
            let merged = builder
                .alias_attributes
                .get(&target.index())
                .cloned()
                .unwrap_or_default()
                .union(original.attributes_of(*from));
            builder.alias_attributes.insert(target.index(), merged);
        }
        if original.lost_type_attributes() {
            builder.builder.set_lost_type_attributes();
        }
        builder
    }

    /// The generation being rewritten.
    pub fn original_graph(&self) -> &'g TypeGraph {
        self.original
    }

    fn resolve_alias(&self, r: TypeRef) -> TypeRef {
        let mut current = r;
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(&current.index()) {
                Some(&next) if next != current => current = next,
                _ => return current,
            }
        }
        panic!("alias cycle through {:?}", r)
    }

    pub fn reconstitute_type_ref<R: Replacer + ?Sized>(
        &mut self,
        original: TypeRef,
        replacer: &mut R,
    ) -> TypeRef {
        self.reconstitute_type_ref_with(original, None, None, replacer)
    }

    /// Map an old ref into the new generation, optionally adding
    /// attributes and honoring a forwarding ref.
    pub fn reconstitute_type_ref_with<R: Replacer + ?Sized>(
        &mut self,
        original: TypeRef,
        attributes: Option<TypeAttributes>,
        forwarding_ref: Option<TypeRef>,
        replacer: &mut R,
    ) -> TypeRef {
        original.assert_serial(self.original.serial());
        let original = self.resolve_alias(original);
        let index = original.index();

        // A group member reconstituted into its own forwarding ref is built
        // here rather than returned uncommitted.
        if let Some(&done) = self.reconstituted.get(&index) {
            if Some(done) != forwarding_ref {
                if let Some(attributes) = attributes {
                    self.builder.add_attributes(done, attributes);
                }
                return self.builder.forward_if_necessary(forwarding_ref, done);
            }
        }

        if let Some(&group) = self.group_of.get(&index) {
            let result = self.replace_group(group, forwarding_ref, replacer);
            if let Some(attributes) = attributes {
                self.builder.add_attributes(result, attributes);
            }
            return result;
        }

        self.force_reconstitute(original, attributes, forwarding_ref, replacer)
    }

    fn replace_group<R: Replacer + ?Sized>(
        &mut self,
        group: usize,
        forwarding_ref: Option<TypeRef>,
        replacer: &mut R,
    ) -> TypeRef {
        let members = std::mem::take(&mut self.groups[group]);
        let forwarding = forwarding_ref.unwrap_or_else(|| self.builder.reserve_type_ref());
        for r in &members {
            self.group_of.remove(&r.index());
            self.reconstituted.insert(r.index(), forwarding);
        }
        trace!(group = ?members, forwarding = ?forwarding, "replace group");
        let result = replacer.replace(&members, self, forwarding);
        assert_eq!(
            result, forwarding,
            "replacement of {:?} was not committed at its forwarding ref",
            members
        );
        result
    }

    fn force_reconstitute<R: Replacer + ?Sized>(
        &mut self,
        original: TypeRef,
        extra: Option<TypeAttributes>,
        forwarding_ref: Option<TypeRef>,
        replacer: &mut R,
    ) -> TypeRef {
        let graph = self.original;
        let index = original.index();
        let ty = graph.type_at(original);

        let mut attributes = graph.attributes_of(original).clone();
        if let Some(alias) = self.alias_attributes.get(&index) {
            attributes = attributes.union(alias);
        }
        if let Some(extra) = extra {
            attributes = attributes.union(&extra);
        }

        // Leaves cannot take part in a cycle unless an attribute refers
        // back into the graph.
        if attributes.children().is_empty() {
            let leaf = match ty {
                Type::Primitive(kind) => {
                    Some(self.builder.get_primitive_type(*kind, attributes.clone(), forwarding_ref))
                }
                Type::Enum { cases } => {
                    Some(self.builder.get_enum_type(attributes.clone(), cases.clone(), forwarding_ref))
                }
                _ => None,
            };
            if let Some(result) = leaf {
                self.reconstituted.insert(index, result);
                return result;
            }
        }

        let forwarding = forwarding_ref.unwrap_or_else(|| self.builder.reserve_type_ref());
        self.reconstituted.insert(index, forwarding);
        let attributes = self.reconstitute_attributes(&attributes, replacer);
        let ty = self.reconstitute_structure(ty, replacer);
        self.builder.get_or_add_type(ty, attributes, Some(forwarding))
    }

    fn reconstitute_structure<R: Replacer + ?Sized>(&mut self, ty: &Type, replacer: &mut R) -> Type {
        match ty {
            Type::Primitive(kind) => Type::Primitive(*kind),
            Type::Enum { cases } => Type::Enum {
                cases: cases.clone(),
            },
            Type::Array { items } => Type::Array {
                items: self.reconstitute_type_ref(*items, replacer),
            },
            Type::Class { properties } => Type::Class {
                properties: self.reconstitute_properties(properties, replacer),
            },
            Type::Map { values } => Type::Map {
                values: self.reconstitute_type_ref(*values, replacer),
            },
            Type::Object {
                properties,
                additional_properties,
            } => Type::Object {
                properties: self.reconstitute_properties(properties, replacer),
                additional_properties: additional_properties
                    .map(|a| self.reconstitute_type_ref(a, &mut *replacer)),
            },
            Type::Union { members } => Type::Union {
                members: self.reconstitute_set(members, replacer),
            },
            Type::Intersection { members } => Type::Intersection {
                members: self.reconstitute_set(members, replacer),
            },
        }
    }

    pub fn reconstitute_properties<R: Replacer + ?Sized>(
        &mut self,
        properties: &PropertyMap,
        replacer: &mut R,
    ) -> PropertyMap {
        properties
            .iter()
            .map(|(name, property)| {
                let ty = self.reconstitute_type_ref(property.ty, &mut *replacer);
                (name.clone(), ClassProperty::new(ty, property.optional))
            })
            .collect()
    }

    pub fn reconstitute_set<R: Replacer + ?Sized>(
        &mut self,
        members: &BTreeSet<TypeRef>,
        replacer: &mut R,
    ) -> BTreeSet<TypeRef> {
        members
            .iter()
            .map(|m| self.reconstitute_type_ref(*m, &mut *replacer))
            .collect()
    }

    /// Map the refs embedded in old attributes into the new generation.
    pub fn reconstitute_attributes<R: Replacer + ?Sized>(
        &mut self,
        attributes: &TypeAttributes,
        replacer: &mut R,
    ) -> TypeAttributes {
        if attributes.children().is_empty() {
            return attributes.clone();
        }
        attributes.reconstitute(&mut |r| self.reconstitute_type_ref(r, &mut *replacer))
    }

    /// The new ref a set of old refs was already unified into, if any.
    pub fn lookup_type_refs(
        &mut self,
        refs: &[TypeRef],
        forwarding_ref: Option<TypeRef>,
    ) -> Option<TypeRef> {
        assert!(!refs.is_empty(), "cannot look up an empty set of types");
        let resolved: Vec<TypeRef> = refs.iter().map(|r| self.resolve_alias(*r)).collect();

        let first = self.reconstituted.get(&resolved[0].index()).copied();
        if let Some(first) = first.filter(|first| Some(*first) != forwarding_ref) {
            if resolved
                .iter()
                .all(|r| self.reconstituted.get(&r.index()) == Some(&first))
            {
                return Some(self.builder.forward_if_necessary(forwarding_ref, first));
            }
        }

        let key: BTreeSet<TypeRef> = resolved.into_iter().collect();
        let unified = self
            .unions
            .get(&key)
            .copied()
            .filter(|unified| Some(*unified) != forwarding_ref)?;
        Some(self.builder.forward_if_necessary(forwarding_ref, unified))
    }

    /// Remember that `refs` are being unified into `result`.
    pub fn register_union(&mut self, refs: &[TypeRef], result: TypeRef) {
        let key: BTreeSet<TypeRef> = refs.iter().map(|r| self.resolve_alias(*r)).collect();
        let previous = self.unions.insert(key, result);
        assert!(previous.is_none(), "types {:?} unified twice", refs);
    }

    pub(crate) fn reconstitute_top_levels<R: Replacer + ?Sized>(&mut self, replacer: &mut R) {
        for (name, r) in self.original.top_levels() {
            let reconstituted = self.reconstitute_type_ref(*r, replacer);
            self.builder.add_top_level(name.clone(), reconstituted);
        }
    }

    pub(crate) fn finish(self) -> (TypeGraph, bool) {
        self.builder.finish_with_forwarding()
    }
}

impl Deref for GraphRewriteBuilder<'_> {
    type Target = TypeBuilder;

    fn deref(&self) -> &TypeBuilder {
        &self.builder
    }
}

impl DerefMut for GraphRewriteBuilder<'_> {
    fn deref_mut(&mut self) -> &mut TypeBuilder {
        &mut self.builder
    }
}

impl TypeGraph {
    /// Rebuild the graph, replacing each group through `replacer`.
    ///
    /// Without groups and without `force` the same graph is returned.
    pub fn rewrite<R: Replacer + ?Sized>(
        self: &Arc<Self>,
        label: &str,
        groups: Vec<Vec<TypeRef>>,
        replacer: &mut R,
        force: bool,
    ) -> Arc<TypeGraph> {
        if groups.is_empty() && !force {
            return Arc::clone(self);
        }
        debug!(pass = label, groups = groups.len(), types = self.len(), "rewrite");
        let (graph, forwarded) = self.rebuild(groups, HashMap::new(), replacer);
        let graph = finish_rewrite(graph, forwarded);
        debug!(pass = label, types = graph.len(), "rewrite done");
        graph
    }

    /// Rewrite in which every key of `map` is replaced by its value.
    pub fn remap(self: &Arc<Self>, label: &str, map: HashMap<TypeRef, TypeRef>) -> Arc<TypeGraph> {
        debug!(pass = label, aliases = map.len(), "remap");
        let (graph, forwarded) = self.rebuild(Vec::new(), map, &mut NoReplacement);
        finish_rewrite(graph, forwarded)
    }

    fn rebuild<R: Replacer + ?Sized>(
        &self,
        groups: Vec<Vec<TypeRef>>,
        aliases: HashMap<TypeRef, TypeRef>,
        replacer: &mut R,
    ) -> (TypeGraph, bool) {
        let mut builder = GraphRewriteBuilder::new(self, groups, aliases);
        builder.reconstitute_top_levels(replacer);
        builder.finish()
    }

    /// Collapse chains of single-member intersections onto their end.
    pub fn remove_indirection_intersections(self: &Arc<Self>) -> Arc<TypeGraph> {
        let map = self.indirection_map();
        if map.is_empty() {
            return Arc::clone(self);
        }
        self.remap("remove indirection intersections", map)
    }

    fn indirection_map(&self) -> HashMap<TypeRef, TypeRef> {
        let mut map = HashMap::new();
        for r in self.all_types() {
            let mut seen = BTreeSet::from([r]);
            let mut current = r;
            while let Some(member) = single_intersection_member(self.type_at(current)) {
                if !matches!(self.type_at(member), Type::Intersection { .. }) {
                    map.insert(r, member);
                    break;
                }
                if !seen.insert(member) {
                    warn!(start = ?r, "cycle of single-member intersections");
                    break;
                }
                current = member;
            }
        }
        map
    }

    /// Forced self-rewrites until the type count stops shrinking.
    pub fn rewrite_fixed_point(self: &Arc<Self>) -> Arc<TypeGraph> {
        let mut graph = Arc::clone(self);
        loop {
            let next = graph.rewrite("fixed point", Vec::new(), &mut NoReplacement, true);
            if next.len() >= graph.len() {
                return graph;
            }
            graph = next;
        }
    }

    /// Keep only reachable types, renumbered from zero in canonical order.
    pub fn garbage_collect(self: &Arc<Self>) -> Arc<TypeGraph> {
        let collected = self.rewrite("garbage collect", Vec::new(), &mut NoReplacement, true);
        debug!(
            before = self.len(),
            after = collected.len(),
            "garbage collected"
        );
        collected
    }
}

fn single_intersection_member(ty: &Type) -> Option<TypeRef> {
    match ty {
        Type::Intersection { members } if members.len() == 1 => members.iter().next().copied(),
        _ => None,
    }
}

fn finish_rewrite(graph: TypeGraph, forwarded: bool) -> Arc<TypeGraph> {
    let mut graph = Arc::new(graph);
    let mut forwarded = forwarded;
    while forwarded {
        let map = graph.indirection_map();
        if map.is_empty() {
            break;
        }
        let (next, again) = graph.rebuild(Vec::new(), map, &mut NoReplacement);
        graph = Arc::new(next);
        forwarded = again;
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::TypeNames;
    use crate::types::{PrimitiveKind, TypeKind};

    fn class_graph() -> Arc<TypeGraph> {
        let mut builder = TypeBuilder::new();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new(), None);
        let flag = builder.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new(), None);
        let mut properties = PropertyMap::new();
        properties.insert("a".to_string(), ClassProperty::required(int));
        properties.insert("b".to_string(), ClassProperty::required(flag));
        let class = builder.get_class_type(TypeAttributes::of(TypeNames::given(["Root"])), properties, None);
        builder.add_top_level("Root", class);
        Arc::new(builder.finish())
    }

    struct IntoInteger;

    impl Replacer for IntoInteger {
        fn replace(
            &mut self,
            _group: &[TypeRef],
            builder: &mut GraphRewriteBuilder<'_>,
            forwarding_ref: TypeRef,
        ) -> TypeRef {
            builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new(), Some(forwarding_ref))
        }
    }

    #[test]
    fn test_rewrite_without_groups_returns_same_graph() {
        let graph = class_graph();
        let same = graph.rewrite("noop", Vec::new(), &mut NoReplacement, false);
        assert!(Arc::ptr_eq(&graph, &same));
    }

    #[test]
    fn test_forced_rewrite_advances_generation() {
        let graph = class_graph();
        let next = graph.rewrite("copy", Vec::new(), &mut NoReplacement, true);
        assert!(!Arc::ptr_eq(&graph, &next));
        assert_eq!(next.serial(), graph.serial() + 1);
        assert_eq!(next.len(), graph.len());
        let root = next.top_level("Root").unwrap();
        assert!(next.attributes_of(root).contains::<TypeNames>());
    }

    #[test]
    fn test_replacement_hitting_existing_type_leaves_no_forwarding() {
        let graph = class_graph();
        let root = graph.top_level("Root").unwrap();
        let Type::Class { properties } = graph.type_at(root) else {
            panic!("expected a class");
        };
        let flag = properties["b"].ty;

        let next = graph.rewrite("bool to int", vec![vec![flag]], &mut IntoInteger, false);
        let root = next.top_level("Root").unwrap();
        let Type::Class { properties } = next.type_at(root) else {
            panic!("expected a class");
        };
        assert_eq!(properties["a"].ty, properties["b"].ty);
        assert_eq!(next.kind_of(properties["b"].ty), TypeKind::Primitive(PrimitiveKind::Integer));
        assert!(next
            .all_types()
            .iter()
            .all(|r| next.kind_of(*r) != TypeKind::Intersection));
    }

    #[test]
    fn test_cycles_survive_rewrite() {
        let mut builder = TypeBuilder::new();
        let node = builder.get_unique_class_type(TypeAttributes::new(), None, None);
        let children = builder.get_array_type(TypeAttributes::new(), node, None);
        let mut properties = PropertyMap::new();
        properties.insert("children".to_string(), ClassProperty::required(children));
        builder.set_object_properties(node, properties, None);
        builder.add_top_level("Node", node);
        let graph = Arc::new(builder.finish());

        let next = graph.rewrite("copy", Vec::new(), &mut NoReplacement, true);
        let node = next.top_level("Node").unwrap();
        let Type::Class { properties } = next.type_at(node) else {
            panic!("expected a class");
        };
        assert_eq!(next.type_at(properties["children"].ty), &Type::Array { items: node });
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn test_remap_merges_alias_attributes() {
        let mut builder = TypeBuilder::new();
        let a = builder.get_primitive_type(
            PrimitiveKind::Integer,
            TypeAttributes::of(TypeNames::given(["A"])),
            None,
        );
        let b = builder.get_primitive_type(
            PrimitiveKind::Double,
            TypeAttributes::of(TypeNames::given(["B"])),
            None,
        );
        builder.add_top_level("a", a);
        builder.add_top_level("b", b);
        let graph = Arc::new(builder.finish());

        let next = graph.remap("alias", HashMap::from([(a, b)]));
        let a = next.top_level("a").unwrap();
        assert_eq!(next.top_level("b"), Some(a));
        let names = next.attributes_of(a).get::<TypeNames>().unwrap();
        assert_eq!(names.names().len(), 2);
    }

    #[test]
    fn test_garbage_collect_renumbers_from_zero() {
        let mut builder = TypeBuilder::new();
        for kind in [PrimitiveKind::Bool, PrimitiveKind::Null, PrimitiveKind::Double] {
            builder.get_primitive_type(kind, TypeAttributes::new(), None);
        }
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new(), None);
        builder.add_top_level("Count", int);
        let graph = Arc::new(builder.finish());
        assert_eq!(graph.len(), 4);

        let collected = graph.garbage_collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected.top_level("Count").map(TypeRef::index), Some(0));
    }

    #[test]
    fn test_fixed_point_is_stable() {
        let graph = class_graph();
        let fixed = graph.rewrite_fixed_point();
        let again = fixed.rewrite_fixed_point();
        assert!(Arc::ptr_eq(&fixed, &again));
    }

    #[test]
    #[should_panic(expected = "more than one replacement group")]
    fn test_overlapping_groups_panic() {
        let graph = class_graph();
        let root = graph.top_level("Root").unwrap();
        graph.rewrite("bad", vec![vec![root], vec![root]], &mut IntoInteger, false);
    }
}
