//! Ordering named types into declarations
//!
//! Renderers emit types in the order given here. Cycles between types are
//! broken either by forward declarations, for targets that have them, or
//! by defining every type of the cycle in one go.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::condensation;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::graph::TypeGraph;
use crate::types::TypeRef;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("cycle of {} types contains no type that can be forward-declared: {types:?}", types.len())]
    NoForwardDeclarableTypeInCycle { types: Vec<TypeRef> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Forward,
    Define,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub ty: TypeRef,
}

impl Declaration {
    pub fn forward(ty: TypeRef) -> Self {
        Self {
            kind: DeclarationKind::Forward,
            ty,
        }
    }

    pub fn define(ty: TypeRef) -> Self {
        Self {
            kind: DeclarationKind::Define,
            ty,
        }
    }
}

/// Declarations in emission order and the types that were forward-declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationIr {
    pub declarations: Vec<Declaration>,
    pub forwarded: BTreeSet<TypeRef>,
}

type Components = DiGraph<Vec<TypeRef>, ()>;

struct Declarer<'a> {
    graph: &'a TypeGraph,
    can_be_forward_declared: Option<&'a dyn Fn(TypeRef) -> bool>,
    needs_declaration: &'a dyn Fn(TypeRef) -> bool,
    rank: HashMap<TypeRef, usize>,
    ir: DeclarationIr,
}

impl Declarer<'_> {
    fn rank_of(&self, component: &[TypeRef]) -> usize {
        component
            .iter()
            .filter_map(|r| self.rank.get(r))
            .copied()
            .min()
            .unwrap_or(usize::MAX)
    }

    /// Strongly connected components of `nodes` under the child relation,
    /// each sorted in canonical order.
    fn components(&self, nodes: &[TypeRef]) -> Components {
        let mut dependencies: DiGraph<TypeRef, ()> = DiGraph::new();
        let index: HashMap<TypeRef, NodeIndex> = nodes
            .iter()
            .map(|r| (*r, dependencies.add_node(*r)))
            .collect();
        for r in nodes {
            for child in self.graph.type_at(*r).children() {
                if let Some(&to) = index.get(&child) {
                    dependencies.add_edge(index[r], to, ());
                }
            }
        }
        let mut components = condensation(dependencies, true);
        for component in components.node_weights_mut() {
            component.sort_by_key(|r| self.rank.get(r).copied().unwrap_or(usize::MAX));
        }
        components
    }

    fn process(&mut self, nodes: &[TypeRef]) -> Result<(), DeclarationError> {
        let components = self.components(nodes);
        let mut roots: Vec<NodeIndex> = components
            .node_indices()
            .filter(|c| {
                components
                    .neighbors_directed(*c, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect();
        roots.sort_by_key(|c| self.rank_of(&components[*c]));

        let mut visited = vec![false; components.node_count()];
        for root in roots {
            self.visit(&components, root, &mut visited)?;
        }
        Ok(())
    }

    /// Depth-first over the component DAG: parents before children when
    /// there are no forward declarations, children first otherwise.
    fn visit(
        &mut self,
        components: &Components,
        component: NodeIndex,
        visited: &mut [bool],
    ) -> Result<(), DeclarationError> {
        if std::mem::replace(&mut visited[component.index()], true) {
            return Ok(());
        }
        let top_down = self.can_be_forward_declared.is_none();
        if top_down {
            self.declare_component(&components[component])?;
        }
        let mut children: Vec<NodeIndex> = components.neighbors(component).collect();
        children.sort_by_key(|c| self.rank_of(&components[*c]));
        children.dedup();
        for child in children {
            self.visit(components, child, visited)?;
        }
        if !top_down {
            self.declare_component(&components[component])?;
        }
        Ok(())
    }

    fn declare_component(&mut self, component: &[TypeRef]) -> Result<(), DeclarationError> {
        let needed: Vec<TypeRef> = component
            .iter()
            .copied()
            .filter(|r| (self.needs_declaration)(*r))
            .collect();

        // The only type needing a declaration breaks the cycle on its own.
        if let [single] = needed.as_slice() {
            self.ir.declarations.push(Declaration::define(*single));
            return Ok(());
        }
        if needed.is_empty() {
            if let [first, _, ..] = component {
                self.ir.declarations.push(Declaration::define(*first));
            }
            return Ok(());
        }
        let Some(can_be_forward_declared) = self.can_be_forward_declared else {
            self.ir
                .declarations
                .extend(needed.into_iter().map(Declaration::define));
            return Ok(());
        };

        let forwardable: Vec<TypeRef> = component
            .iter()
            .copied()
            .filter(|r| can_be_forward_declared(*r))
            .collect();
        if forwardable.is_empty() {
            return Err(DeclarationError::NoForwardDeclarableTypeInCycle {
                types: component.to_vec(),
            });
        }
        self.ir
            .declarations
            .extend(forwardable.iter().copied().map(Declaration::forward));
        self.ir.forwarded.extend(forwardable.iter().copied());

        let rest: Vec<TypeRef> = component
            .iter()
            .copied()
            .filter(|r| !forwardable.contains(r))
            .collect();
        self.process(&rest)?;

        self.ir
            .declarations
            .extend(forwardable.into_iter().map(Declaration::define));
        Ok(())
    }
}

/// Linearize the reachable types of `graph` into declarations.
///
/// Without `can_be_forward_declared` the target has no forward
/// declarations: types come out top-down and every type of a cycle is
/// defined together. With it, types come out bottom-up and cycles are
/// broken by forward-declaring the types it accepts.
#[instrument(skip_all, fields(types = graph.len()), level = "debug")]
pub fn declarations_for_graph(
    graph: &TypeGraph,
    can_be_forward_declared: Option<&dyn Fn(TypeRef) -> bool>,
    needs_declaration: &dyn Fn(TypeRef) -> bool,
) -> Result<DeclarationIr, DeclarationError> {
    let nodes = graph.all_types();
    let mut declarer = Declarer {
        graph,
        can_be_forward_declared,
        needs_declaration,
        rank: nodes.iter().enumerate().map(|(i, r)| (*r, i)).collect(),
        ir: DeclarationIr::default(),
    };
    declarer.process(&nodes)?;
    debug!(
        declarations = declarer.ir.declarations.len(),
        forwarded = declarer.ir.forwarded.len(),
        "declarations computed"
    );
    Ok(declarer.ir)
}
