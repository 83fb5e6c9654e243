//! Scopes of names and the arena holding them.

use std::collections::BTreeSet;

use crate::name::{DeriveFn, Name, NameId, NameKind, NamerId, NamespaceId, ProposeFn};
use crate::namer::Namer;

/// A scope: every member must end up with a distinct identifier, and none
/// may take an identifier of a forbidden name.
#[derive(Debug, Clone)]
pub struct Namespace {
    label: String,
    parent: Option<NamespaceId>,
    children: Vec<NamespaceId>,
    members: BTreeSet<NameId>,
    forbidden_names: BTreeSet<NameId>,
    forbidden_namespaces: BTreeSet<NamespaceId>,
}

impl Namespace {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn parent(&self) -> Option<NamespaceId> {
        self.parent
    }

    pub fn children(&self) -> &[NamespaceId] {
        &self.children
    }

    pub fn members(&self) -> &BTreeSet<NameId> {
        &self.members
    }
}

/// Every name, namespace and namer taking part in one assignment.
#[derive(Debug, Clone, Default)]
pub struct NameGraph {
    namespaces: Vec<Namespace>,
    names: Vec<Name>,
    namers: Vec<Namer>,
}

impl NameGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_namer(&mut self, namer: Namer) -> NamerId {
        self.namers.push(namer);
        NamerId(self.namers.len() - 1)
    }

    pub fn namer(&self, id: NamerId) -> &Namer {
        &self.namers[id.0]
    }

    pub fn add_namespace(&mut self, label: impl Into<String>, parent: Option<NamespaceId>) -> NamespaceId {
        let id = NamespaceId(self.namespaces.len());
        self.namespaces.push(Namespace {
            label: label.into(),
            parent,
            children: Vec::new(),
            members: BTreeSet::new(),
            forbidden_names: BTreeSet::new(),
            forbidden_namespaces: BTreeSet::new(),
        });
        if let Some(parent) = parent {
            self.namespaces[parent.0].children.push(id);
        }
        id
    }

    /// A root namespace holding one fixed name per keyword.
    pub fn keyword_namespace<I, S>(&mut self, label: impl Into<String>, keywords: I) -> NamespaceId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let namespace = self.add_namespace(label, None);
        let keywords: BTreeSet<String> = keywords.into_iter().map(Into::into).collect();
        for keyword in keywords {
            self.add_fixed(namespace, keyword);
        }
        namespace
    }

    pub fn namespace(&self, id: NamespaceId) -> &Namespace {
        &self.namespaces[id.0]
    }

    pub fn namespace_ids(&self) -> impl Iterator<Item = NamespaceId> {
        (0..self.namespaces.len()).map(NamespaceId)
    }

    pub fn name(&self, id: NameId) -> &Name {
        &self.names[id.0]
    }

    pub fn name_ids(&self) -> impl Iterator<Item = NameId> {
        (0..self.names.len()).map(NameId)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Members of `forbidden` become off-limits inside `namespace`.
    pub fn forbid_namespace(&mut self, namespace: NamespaceId, forbidden: NamespaceId) {
        self.namespaces[namespace.0].forbidden_namespaces.insert(forbidden);
    }

    pub fn forbid_name(&mut self, namespace: NamespaceId, forbidden: NameId) {
        self.namespaces[namespace.0].forbidden_names.insert(forbidden);
    }

    /// Own forbidden names plus the direct members of every forbidden
    /// namespace.
    pub fn forbidden_set(&self, namespace: NamespaceId) -> BTreeSet<NameId> {
        let ns = self.namespace(namespace);
        let mut forbidden = ns.forbidden_names.clone();
        for other in &ns.forbidden_namespaces {
            forbidden.extend(self.namespace(*other).members.iter().copied());
        }
        forbidden
    }

    /// Associated names sponsored by `sponsor`, in creation order.
    pub fn associates(&self, sponsor: NameId) -> Vec<NameId> {
        self.name_ids()
            .filter(|id| {
                matches!(&self.name(*id).kind, NameKind::Associated { sponsor: s, .. } if *s == sponsor)
            })
            .collect()
    }

    fn add_name(&mut self, namespace: NamespaceId, kind: NameKind, order: u32) -> NameId {
        let id = NameId(self.names.len());
        self.names.push(Name {
            kind,
            namespace,
            order,
        });
        self.namespaces[namespace.0].members.insert(id);
        id
    }

    pub fn add_fixed(&mut self, namespace: NamespaceId, name: impl Into<String>) -> NameId {
        self.add_name(namespace, NameKind::Fixed(name.into()), 0)
    }

    /// Duplicate candidates are dropped, keeping the first occurrence.
    pub fn add_simple<I, S>(&mut self, namespace: NamespaceId, namer: NamerId, candidates: I, order: u32) -> NameId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let candidates = candidates
            .into_iter()
            .map(Into::into)
            .filter(|c: &String| seen.insert(c.clone()))
            .collect();
        self.add_name(namespace, NameKind::Simple { namer, candidates }, order)
    }

    pub fn add_dependency(
        &mut self,
        namespace: NamespaceId,
        namer: NamerId,
        dependencies: Vec<NameId>,
        propose: ProposeFn,
        order: u32,
    ) -> NameId {
        self.add_name(
            namespace,
            NameKind::Dependency {
                namer,
                dependencies,
                propose,
            },
            order,
        )
    }

    pub fn add_associated(&mut self, namespace: NamespaceId, sponsor: NameId, derive: DeriveFn) -> NameId {
        let order = self.name(sponsor).order;
        self.add_name(namespace, NameKind::Associated { sponsor, derive }, order)
    }
}
