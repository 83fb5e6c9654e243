//! Names waiting for an identifier.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamespaceId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamerId(pub(crate) usize);

/// Proposes a name from the identifiers its dependencies resolved to.
pub type ProposeFn = Arc<dyn Fn(&[&str]) -> String + Send + Sync>;

/// Derives an associated identifier from its sponsor's.
pub type DeriveFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone)]
pub enum NameKind {
    /// Taken verbatim: keywords, names dictated by a runtime library.
    Fixed(String),
    /// Candidates in preference order.
    Simple {
        namer: NamerId,
        candidates: Vec<String>,
    },
    /// Proposed once every dependency has an identifier.
    Dependency {
        namer: NamerId,
        dependencies: Vec<NameId>,
        propose: ProposeFn,
    },
    /// Resolved together with its sponsor, never on its own.
    Associated { sponsor: NameId, derive: DeriveFn },
}

impl fmt::Debug for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Fixed(name) => f.debug_tuple("Fixed").field(name).finish(),
            NameKind::Simple { namer, candidates } => f
                .debug_struct("Simple")
                .field("namer", namer)
                .field("candidates", candidates)
                .finish(),
            NameKind::Dependency {
                namer,
                dependencies,
                ..
            } => f
                .debug_struct("Dependency")
                .field("namer", namer)
                .field("dependencies", dependencies)
                .finish_non_exhaustive(),
            NameKind::Associated { sponsor, .. } => f
                .debug_struct("Associated")
                .field("sponsor", sponsor)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Name {
    pub(crate) kind: NameKind,
    pub(crate) namespace: NamespaceId,
    /// Lower orders are named first and win contested identifiers.
    pub(crate) order: u32,
}

impl Name {
    pub fn kind(&self) -> &NameKind {
        &self.kind
    }

    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn namer(&self) -> Option<NamerId> {
        match &self.kind {
            NameKind::Simple { namer, .. } | NameKind::Dependency { namer, .. } => Some(*namer),
            NameKind::Fixed(_) | NameKind::Associated { .. } => None,
        }
    }

    /// Names that must be resolved before this one.
    pub fn dependencies(&self) -> Vec<NameId> {
        match &self.kind {
            NameKind::Dependency { dependencies, .. } => dependencies.clone(),
            NameKind::Associated { sponsor, .. } => vec![*sponsor],
            NameKind::Fixed(_) | NameKind::Simple { .. } => Vec::new(),
        }
    }

    /// Unstyled candidates given the identifiers resolved so far. A
    /// dependency name proposes exactly one.
    pub(crate) fn candidates(&self, resolved: &BTreeMap<NameId, String>) -> Vec<String> {
        match &self.kind {
            NameKind::Fixed(name) => vec![name.clone()],
            NameKind::Simple { candidates, .. } => candidates.clone(),
            NameKind::Dependency {
                dependencies,
                propose,
                ..
            } => {
                let parts: Vec<&str> = dependencies
                    .iter()
                    .map(|d| match resolved.get(d) {
                        Some(name) => name.as_str(),
                        None => panic!("dependency {:?} proposed before it was named", d),
                    })
                    .collect();
                vec![propose(&parts)]
            }
            NameKind::Associated { sponsor, derive } => match resolved.get(sponsor) {
                Some(name) => vec![derive(name)],
                None => Vec::new(),
            },
        }
    }

    /// Short text for error reports.
    pub(crate) fn describe(&self) -> String {
        match &self.kind {
            NameKind::Fixed(name) => name.clone(),
            NameKind::Simple { candidates, .. } => candidates
                .first()
                .cloned()
                .unwrap_or_else(|| "<no candidates>".to_string()),
            NameKind::Dependency { dependencies, .. } => {
                format!("<depends on {} names>", dependencies.len())
            }
            NameKind::Associated { sponsor, .. } => format!("<associated with {:?}>", sponsor),
        }
    }
}
