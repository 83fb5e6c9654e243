//! Type graph engine for typeloom
//!
//! A [`TypeGraph`] is one immutable generation of structurally
//! deduplicated types. Ingestion builds the first generation with a
//! [`TypeBuilder`]; the [`TypePipeline`] then rewrites it through a fixed
//! sequence of passes into a graph renderers can consume, together with
//! [`declarations_for_graph`] for emission order.

pub mod attributes;
pub mod builder;
pub mod declarations;
pub mod error;
pub mod graph;
pub mod intersection;
pub mod passes;
pub mod pipeline;
pub mod rewrite;
pub mod transformers;
pub mod type_utils;
pub mod types;
pub mod unify;

pub use attributes::{
    Combination, MinMax, MinMaxLength, StringTypes, TypeAttribute, TypeAttributes, TypeNames,
};
pub use builder::TypeBuilder;
pub use declarations::{
    declarations_for_graph, Declaration, DeclarationError, DeclarationIr, DeclarationKind,
};
pub use error::CoreError;
pub use graph::{is_named_kind, TypeGraph};
pub use pipeline::{PassRecord, PipelineOptions, PipelineOutput, TypePipeline};
pub use rewrite::{GraphRewriteBuilder, NoReplacement, Replacer};
pub use transformers::{Transformation, Transformer};
pub use types::{ClassProperty, PrimitiveKind, PropertyMap, Type, TypeKind, TypeRef};
pub use unify::NestedUnification;
