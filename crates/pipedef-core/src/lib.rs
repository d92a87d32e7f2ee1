//! Core domain types for pipeline definitions.
//!
//! This crate contains:
//! - Raw definition documents (inherit blocks, base definition, jobs)
//! - Resolved jobs with their steps and traits
//! - Validation diagnostics

pub mod definition;
pub mod job;
pub mod violation;

pub use definition::{Definition, PipelineDefinition};
pub use job::{
    DEFAULT_REPOSITORY_NAME, ON_ERROR_DIR, PrivilegeMode, PublishTarget, ResolvedJob, Step, Trait,
};
pub use violation::{Severity, Violation, ViolationKind, has_errors};
