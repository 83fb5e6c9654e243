//! Resolving every name of a [`NameGraph`] to an identifier.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument, trace};

use crate::error::NamingError;
use crate::name::{NameId, NameKind, NamerId, NamespaceId};
use crate::namer::Request;
use crate::namespace::NameGraph;

/// Identifiers chosen for the names of one [`NameGraph`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameAssignments {
    names: BTreeMap<NameId, String>,
}

impl NameAssignments {
    pub fn get(&self, id: NameId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NameId, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }
}

struct Context<'g> {
    graph: &'g NameGraph,
    assigned: BTreeMap<NameId, String>,
}

impl<'g> Context<'g> {
    fn is_assigned(&self, id: NameId) -> bool {
        self.assigned.contains_key(&id)
    }

    /// Names whose identifiers are off-limits in `namespace`.
    fn scope(&self, namespace: NamespaceId) -> BTreeSet<NameId> {
        let mut scope = self.graph.forbidden_set(namespace);
        scope.extend(self.graph.namespace(namespace).members().iter().copied());
        scope
    }

    fn taken(&self, namespace: NamespaceId) -> BTreeSet<String> {
        self.scope(namespace)
            .into_iter()
            .filter_map(|id| self.assigned.get(&id).cloned())
            .collect()
    }

    fn conflicts(&self, namespace: NamespaceId, name: &str) -> bool {
        self.scope(namespace)
            .iter()
            .any(|id| self.assigned.get(id).is_some_and(|taken| taken == name))
    }

    /// Record `name` for `id` and for everything it sponsors.
    fn assign(&mut self, id: NameId, name: String) {
        assert!(!self.is_assigned(id), "name {:?} assigned twice", id);
        let namespace = self.graph.name(id).namespace();
        assert!(
            !self.conflicts(namespace, &name),
            "{:?} is already taken in namespace {}",
            name,
            self.graph.namespace(namespace).label()
        );
        trace!(?id, name = %name, "assigned");
        self.assigned.insert(id, name.clone());
        let graph = self.graph;
        for associate in graph.associates(id) {
            if let NameKind::Associated { derive, .. } = graph.name(associate).kind() {
                self.assign(associate, derive(&name));
            }
        }
    }

    /// Whether every name sponsored by `id` could take its derived
    /// identifier if `id` took `name`.
    fn sponsors_fit(&self, id: NameId, name: &str) -> bool {
        self.graph.associates(id).into_iter().all(|associate| {
            let associated = self.graph.name(associate);
            match associated.kind() {
                NameKind::Associated { derive, .. } => {
                    let derived = derive(name);
                    !self.conflicts(associated.namespace(), &derived) && self.sponsors_fit(associate, &derived)
                }
                _ => true,
            }
        })
    }

    fn is_name_ready(&self, id: NameId) -> bool {
        let name = self.graph.name(id);
        !self.is_assigned(id)
            && matches!(name.kind(), NameKind::Simple { .. } | NameKind::Dependency { .. })
            && name.dependencies().iter().all(|d| self.is_assigned(*d))
    }

    fn is_namespace_ready(&self, namespace: NamespaceId) -> bool {
        self.graph
            .forbidden_set(namespace)
            .iter()
            .all(|id| self.is_assigned(*id))
            && self
                .graph
                .namespace(namespace)
                .members()
                .iter()
                .any(|id| self.is_name_ready(*id))
    }

    fn name_namespace(&mut self, namespace: NamespaceId) {
        loop {
            let ready: Vec<NameId> = self
                .graph
                .namespace(namespace)
                .members()
                .iter()
                .copied()
                .filter(|id| self.is_name_ready(*id))
                .collect();
            let Some(order) = ready.iter().map(|id| self.graph.name(*id).order()).min() else {
                return;
            };

            // Names proposing the same styled identifier through the same
            // namer compete with each other and form one batch.
            let mut batches: BTreeMap<(NamerId, String), Vec<(NameId, Vec<String>)>> = BTreeMap::new();
            for id in ready {
                let name = self.graph.name(id);
                if name.order() != order {
                    continue;
                }
                let Some(namer) = name.namer() else { continue };
                let candidates = name.candidates(&self.assigned);
                let first = self.graph.namer(namer).styled(&candidates[0]);
                batches.entry((namer, first)).or_default().push((id, candidates));
            }

            for ((namer, _), batch) in batches {
                let names = {
                    let this: &Context<'g> = self;
                    let checks: Vec<_> = batch
                        .iter()
                        .map(|(id, _)| {
                            let id = *id;
                            move |name: &str| this.sponsors_fit(id, name)
                        })
                        .collect();
                    let requests: Vec<Request<'_>> = batch
                        .iter()
                        .zip(&checks)
                        .map(|((_, candidates), check)| Request {
                            candidates,
                            acceptable: check,
                        })
                        .collect();
                    let mut taken = this.taken(namespace);
                    this.graph.namer(namer).assign_batch(&requests, &mut taken)
                };
                for ((id, _), name) in batch.into_iter().zip(names) {
                    self.assign(id, name);
                }
            }
        }
    }
}

/// Give every name in `graph` an identifier.
///
/// Fixed names are taken first. After that, the first namespace whose
/// forbidden names are all resolved and that has a name ready for naming is
/// processed lowest order first, batch by batch, until nothing is ready.
/// Names still open at that point form a cycle or wait on a forbidden name
/// that never resolves.
#[instrument(skip(graph), fields(names = graph.len()), level = "debug")]
pub fn assign_names(graph: &NameGraph) -> Result<NameAssignments, NamingError> {
    for id in graph.name_ids() {
        if let NameKind::Simple { candidates, .. } = graph.name(id).kind() {
            if candidates.is_empty() {
                return Err(NamingError::NoCandidates {
                    namespace: graph.namespace(graph.name(id).namespace()).label().to_string(),
                });
            }
        }
    }

    let mut context = Context {
        graph,
        assigned: BTreeMap::new(),
    };
    for id in graph.name_ids() {
        if let NameKind::Fixed(name) = graph.name(id).kind() {
            context.assign(id, name.clone());
        }
    }

    let mut rounds = 0usize;
    while let Some(namespace) = graph
        .namespace_ids()
        .find(|ns| context.is_namespace_ready(*ns))
    {
        context.name_namespace(namespace);
        rounds += 1;
    }

    let unresolved: Vec<String> = graph
        .name_ids()
        .filter(|id| !context.is_assigned(*id))
        .map(|id| graph.name(id).describe())
        .collect();
    if !unresolved.is_empty() {
        return Err(NamingError::UnresolvedNames {
            count: unresolved.len(),
            names: unresolved,
        });
    }

    debug!(assigned = context.assigned.len(), rounds, "names assigned");
    Ok(NameAssignments {
        names: context.assigned,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::namer::{fun_prefix_namer, Namer};
    use crate::style::NameStyle;
    use pretty_assertions::assert_eq;

    fn resolved(assignments: &NameAssignments, ids: &[NameId]) -> Vec<String> {
        ids.iter()
            .map(|id| assignments.get(*id).unwrap_or("<unassigned>").to_string())
            .collect()
    }

    #[test]
    fn test_sibling_properties_get_fun_prefixes() {
        let mut graph = NameGraph::new();
        let ns = graph.add_namespace("properties", None);
        let namer = graph.add_namer(fun_prefix_namer("properties", NameStyle::Pascal));
        let ids: Vec<NameId> = (0..3).map(|_| graph.add_simple(ns, namer, ["id"], 0)).collect();

        let assignments = assign_names(&graph).unwrap();
        assert_eq!(resolved(&assignments, &ids), vec!["Id", "PurpleId", "FluffyId"]);
        assert_eq!(assign_names(&graph).unwrap(), assignments);
    }

    #[test]
    fn test_fixed_names_are_never_altered() {
        let mut graph = NameGraph::new();
        let ns = graph.add_namespace("types", None);
        let namer = graph.add_namer(fun_prefix_namer("types", NameStyle::Pascal));
        let simple = graph.add_simple(ns, namer, ["id"], 0);
        let fixed = graph.add_fixed(ns, "Id");

        let assignments = assign_names(&graph).unwrap();
        assert_eq!(assignments.get(fixed), Some("Id"));
        assert_eq!(assignments.get(simple), Some("PurpleId"));
    }

    #[test]
    fn test_keywords_are_avoided() {
        let mut graph = NameGraph::new();
        let keywords = graph.keyword_namespace("keywords", ["type", "Type"]);
        let ns = graph.add_namespace("properties", None);
        graph.forbid_namespace(ns, keywords);
        let namer = graph.add_namer(fun_prefix_namer("properties", NameStyle::Camel));
        let kind = graph.add_simple(ns, namer, ["type"], 0);
        let other = graph.add_namespace("other", None);
        let free = graph.add_simple(other, namer, ["type"], 0);

        let assignments = assign_names(&graph).unwrap();
        assert_eq!(assignments.get(kind), Some("purpleType"));
        assert_eq!(assignments.get(free), Some("type"));
    }

    #[test]
    fn test_lower_order_wins_the_contested_name() {
        let mut graph = NameGraph::new();
        let ns = graph.add_namespace("types", None);
        let namer = graph.add_namer(fun_prefix_namer("types", NameStyle::Pascal));
        let inferred = graph.add_simple(ns, namer, ["user"], 1);
        let given = graph.add_simple(ns, namer, ["user"], 0);

        let assignments = assign_names(&graph).unwrap();
        assert_eq!(resolved(&assignments, &[given, inferred]), vec!["User", "PurpleUser"]);
    }

    #[test]
    fn test_dependency_and_associated_names() {
        let mut graph = NameGraph::new();
        let types = graph.add_namespace("types", None);
        let functions = graph.add_namespace("functions", None);
        let type_namer = graph.add_namer(fun_prefix_namer("types", NameStyle::Pascal));
        let member_namer = graph.add_namer(Namer::new("functions", NameStyle::Pascal, ["other"]));

        let user = graph.add_simple(types, type_namer, ["user"], 0);
        let field = graph.add_dependency(
            types,
            type_namer,
            vec![user],
            Arc::new(|parts: &[&str]| format!("{} field", parts[0])),
            1,
        );
        let from_json = graph.add_associated(functions, user, Arc::new(|name: &str| format!("{}FromJson", name)));
        let taken = graph.add_simple(functions, member_namer, ["UserFromJson"], 0);

        let assignments = assign_names(&graph).unwrap();
        assert_eq!(assignments.get(user), Some("User"));
        assert_eq!(assignments.get(field), Some("UserField"));
        assert_eq!(assignments.get(from_json), Some("UserFromJson"));
        assert_eq!(assignments.get(taken), Some("OtherUserFromJson"));
        assert_eq!(assignments.len(), 4);
    }

    #[test]
    fn test_sponsor_avoids_a_name_its_associate_cannot_take() {
        let mut graph = NameGraph::new();
        let types = graph.add_namespace("types", None);
        let functions = graph.add_namespace("functions", None);
        graph.add_fixed(functions, "parseUser");
        let namer = graph.add_namer(fun_prefix_namer("types", NameStyle::Pascal));
        let user = graph.add_simple(types, namer, ["user"], 0);
        let parser = graph.add_associated(functions, user, Arc::new(|name: &str| format!("parse{}", name)));

        let assignments = assign_names(&graph).unwrap();
        assert_eq!(assignments.get(user), Some("PurpleUser"));
        assert_eq!(assignments.get(parser), Some("parsePurpleUser"));
    }

    #[test]
    fn test_dependency_cycle_is_reported() {
        let mut graph = NameGraph::new();
        let ns = graph.add_namespace("types", None);
        let namer = graph.add_namer(fun_prefix_namer("types", NameStyle::Pascal));
        let propose = Arc::new(|parts: &[&str]| parts.concat());
        // Each depends on the next id, which is the other one.
        let first = graph.add_dependency(ns, namer, vec![NameId(1)], propose.clone(), 0);
        let second = graph.add_dependency(ns, namer, vec![first], propose, 0);
        assert_eq!(second, NameId(1));
        graph.add_simple(ns, namer, ["fine"], 0);

        let error = assign_names(&graph).unwrap_err();
        assert!(matches!(error, NamingError::UnresolvedNames { count: 2, .. }), "{}", error);
    }

    #[test]
    fn test_name_without_candidates_is_an_error() {
        let mut graph = NameGraph::new();
        let ns = graph.add_namespace("cases", None);
        let namer = graph.add_namer(fun_prefix_namer("cases", NameStyle::UpperSnake));
        graph.add_simple(ns, namer, Vec::<String>::new(), 0);
        assert_eq!(
            assign_names(&graph).unwrap_err(),
            NamingError::NoCandidates {
                namespace: "cases".to_string()
            }
        );
    }

    #[test]
    #[should_panic(expected = "already taken")]
    fn test_clashing_fixed_names_are_a_bug() {
        let mut graph = NameGraph::new();
        let ns = graph.add_namespace("types", None);
        graph.add_fixed(ns, "Id");
        graph.add_fixed(ns, "Id");
        let _ = assign_names(&graph);
    }
}
