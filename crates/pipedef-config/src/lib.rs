//! YAML pipeline definitions: loading, trait merging and job validation.
//!
//! This crate handles:
//! - Parsing definition documents (`.ci/pipeline_definitions`)
//! - Merging base definition, inherit blocks and job overrides
//! - Validating references and dependency cycles of resolved jobs

pub mod error;
pub mod graph;
pub mod loader;
pub mod merge;
mod resolve;
pub mod traits;
pub mod validate;
mod value;

pub use error::{ConfigError, ConfigResult};
pub use graph::StepGraph;
pub use loader::{DEFAULT_DEFINITION_PATH, load_definition, parse_definition};
pub use merge::{MERGE_KEY, ResolvedJobs, deep_merge, merge, merge_pipeline};
pub use traits::trait_order;
pub use validate::{ValidationOptions, validate, validate_all, validate_with};

use pipedef_core::ResolvedJob;

/// Steps of a job, each after the steps it needs.
pub fn step_order(job: &ResolvedJob) -> Vec<String> {
    StepGraph::from_job(job).topological_order()
}
