//! Driver running the rewrite passes in order
//!
//! ```text
//! intersections <-> unions -> objects -> unions -> strings -> unions
//!   -> string flattening -> none to any -> transformations -> collect
//! ```
//!
//! Every arrow is a rewrite producing a new generation; loops run until
//! the passes involved report done.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};

use crate::error::CoreError;
use crate::graph::TypeGraph;
use crate::passes::{
    expand_strings, flatten_strings, flatten_unions, make_transformations, none_to_any,
    replace_object_type, resolve_intersections, EnumInference, Session, TransformationPolicy,
};
use crate::types::PrimitiveKind;
use crate::unify::NestedUnification;

/// Tripwire for the fixed-point loops. The loops end on their passes'
/// own done flags; hitting this bound means a pass is buggy and keeps
/// asking for another round without making progress.
const MAX_ROUNDS: usize = 64;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Unify integers and doubles into doubles.
    pub conflate_numbers: bool,
    pub make_transformations: bool,
    pub transform_arrays: bool,
    pub transform_enums: bool,
    /// Emit range and length checks as codecs.
    pub check_bounds: bool,
    /// Transformed-string kinds that get a parsing codec.
    pub transformed_strings: BTreeSet<PrimitiveKind>,
    pub enum_inference: EnumInference,
    /// Dump every generation at `trace` level.
    pub debug_print_graphs: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let policy = TransformationPolicy::default();
        Self {
            conflate_numbers: true,
            make_transformations: true,
            transform_arrays: policy.transform_arrays,
            transform_enums: policy.transform_enums,
            check_bounds: policy.check_bounds,
            transformed_strings: policy.transformed_strings,
            enum_inference: EnumInference::default(),
            debug_print_graphs: false,
        }
    }
}

impl PipelineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options from a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        let options: PipelineOptions = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_conflate_numbers(mut self, enabled: bool) -> Self {
        self.conflate_numbers = enabled;
        self
    }

    pub fn with_make_transformations(mut self, enabled: bool) -> Self {
        self.make_transformations = enabled;
        self
    }

    pub fn with_transform_arrays(mut self, enabled: bool) -> Self {
        self.transform_arrays = enabled;
        self
    }

    pub fn with_transform_enums(mut self, enabled: bool) -> Self {
        self.transform_enums = enabled;
        self
    }

    pub fn with_check_bounds(mut self, enabled: bool) -> Self {
        self.check_bounds = enabled;
        self
    }

    pub fn with_transformed_strings(mut self, kinds: impl IntoIterator<Item = PrimitiveKind>) -> Self {
        self.transformed_strings = kinds.into_iter().collect();
        self
    }

    pub fn with_enum_inference(mut self, inference: EnumInference) -> Self {
        self.enum_inference = inference;
        self
    }

    pub fn with_debug_print_graphs(mut self, enabled: bool) -> Self {
        self.debug_print_graphs = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(kind) = self
            .transformed_strings
            .iter()
            .find(|kind| !kind.is_transformed_string())
        {
            return Err(CoreError::Config(format!(
                "{} is not a transformed string kind",
                kind
            )));
        }
        if !self.make_transformations && (self.transform_arrays || self.check_bounds) {
            return Err(CoreError::Config(
                "transform_arrays and check_bounds require make_transformations".to_string(),
            ));
        }
        Ok(())
    }

    pub fn transformation_policy(&self) -> TransformationPolicy {
        TransformationPolicy {
            transform_enums: self.transform_enums,
            transform_arrays: self.transform_arrays,
            transformed_strings: self.transformed_strings.clone(),
            check_bounds: self.check_bounds,
        }
    }
}

/// Size of the graph around one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassRecord {
    pub pass: &'static str,
    pub types_before: usize,
    pub types_after: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub graph: Arc<TypeGraph>,
    /// Whether any pass had to drop type information.
    pub lost_type_attributes: bool,
    pub passes: Vec<PassRecord>,
}

pub struct TypePipeline {
    options: PipelineOptions,
    session: Session,
    passes: Vec<PassRecord>,
}

impl TypePipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            session: Session::new(),
            passes: Vec::new(),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn record(&mut self, pass: &'static str, before: &Arc<TypeGraph>, after: &Arc<TypeGraph>) {
        debug!(
            pass,
            types_before = before.len(),
            types_after = after.len(),
            changed = !Arc::ptr_eq(before, after),
            "pass finished"
        );
        if self.options.debug_print_graphs {
            trace!(pass, graph = %after.describe(), "graph after pass");
        }
        self.passes.push(PassRecord {
            pass,
            types_before: before.len(),
            types_after: after.len(),
        });
    }

    fn too_many_rounds(pass: &str) -> CoreError {
        CoreError::Pipeline {
            pass: pass.to_string(),
            message: format!("no fixed point after {} rounds", MAX_ROUNDS),
        }
    }

    /// Resolve intersections and flatten unions until neither has work
    /// left; each may wait on the other.
    fn resolve_set_operations(&mut self, graph: Arc<TypeGraph>) -> Result<Arc<TypeGraph>, CoreError> {
        let conflate = self.options.conflate_numbers;
        let mut graph = graph;
        for round in 0..MAX_ROUNDS {
            let (next, intersections_done) = resolve_intersections(&graph, conflate);
            self.record("resolve intersections", &graph, &next);
            let (after, unions_done) =
                flatten_unions(&next, conflate, true, NestedUnification::Shallow);
            self.record("flatten unions", &next, &after);
            graph = after;
            if intersections_done && unions_done {
                debug!(rounds = round + 1, "set operations resolved");
                return Ok(graph);
            }
        }
        Err(Self::too_many_rounds("resolve intersections"))
    }

    fn flatten_unions_fully(&mut self, graph: Arc<TypeGraph>) -> Result<Arc<TypeGraph>, CoreError> {
        let mut graph = graph;
        for _ in 0..MAX_ROUNDS {
            let (next, done) = flatten_unions(
                &graph,
                self.options.conflate_numbers,
                false,
                NestedUnification::Recursive,
            );
            self.record("flatten unions", &graph, &next);
            graph = next;
            if done {
                return Ok(graph);
            }
        }
        Err(Self::too_many_rounds("flatten unions"))
    }

    fn step(
        &mut self,
        pass: &'static str,
        graph: Arc<TypeGraph>,
        run: impl FnOnce(&Arc<TypeGraph>, &mut Session) -> Arc<TypeGraph>,
    ) -> Arc<TypeGraph> {
        let next = run(&graph, &mut self.session);
        self.record(pass, &graph, &next);
        next
    }

    /// Run every pass over `graph`.
    #[instrument(skip_all, fields(types = graph.len()))]
    pub fn run(&mut self, graph: TypeGraph) -> Result<PipelineOutput, CoreError> {
        self.options.validate()?;
        self.passes.clear();
        self.session = Session::new();
        let options = self.options.clone();

        let graph = Arc::new(graph);
        let graph = self.step("remove indirection intersections", graph, |g, _| {
            g.remove_indirection_intersections()
        });
        let graph = self.resolve_set_operations(graph)?;
        let graph = self.step("replace object type", graph, |g, _| replace_object_type(g));
        let graph = self.flatten_unions_fully(graph)?;
        let graph = self.step("expand strings", graph, |g, _| {
            expand_strings(g, options.enum_inference)
        });
        let graph = self.flatten_unions_fully(graph)?;
        let graph = self.step("flatten strings", graph, |g, _| flatten_strings(g));
        let graph = self.step("none to any", graph, |g, _| none_to_any(g));
        let graph = if options.make_transformations {
            let policy = options.transformation_policy();
            self.step("make transformations", graph, |g, session| {
                make_transformations(g, &policy, session)
            })
        } else {
            graph
        };
        let graph = self.step("rewrite fixed point", graph, |g, _| g.rewrite_fixed_point());
        let graph = self.step("garbage collect", graph, |g, _| g.garbage_collect());

        let lost_type_attributes = graph.lost_type_attributes();
        info!(
            types = graph.len(),
            passes = self.passes.len(),
            lost_type_attributes,
            "pipeline finished"
        );
        Ok(PipelineOutput {
            graph,
            lost_type_attributes,
            passes: std::mem::take(&mut self.passes),
        })
    }
}
