//! Collision-free identifiers for typeloom renderers
//!
//! Renderers describe what needs a name as a [`NameGraph`]: names grouped
//! into [`Namespace`]s, each name carrying its candidates and the [`Namer`]
//! that styles them. [`assign_names`] resolves the whole graph at once and
//! deterministically, so regenerating from the same input yields the same
//! identifiers. [`GraphNamer`] builds and resolves such a graph for a
//! finished type graph.

pub mod assign;
pub mod error;
pub mod graph_names;
pub mod name;
pub mod namer;
pub mod namespace;
pub mod style;

pub use assign::{assign_names, NameAssignments};
pub use error::NamingError;
pub use graph_names::{GraphNamer, GraphNaming};
pub use name::{DeriveFn, Name, NameId, NameKind, NamerId, NamespaceId, ProposeFn};
pub use namer::{fun_prefix_namer, Namer, FUN_PREFIXES};
pub use namespace::{NameGraph, Namespace};
pub use style::{camel_case, legalize, pascal_case, snake_case, split_into_words, upper_snake_case, NameStyle};
