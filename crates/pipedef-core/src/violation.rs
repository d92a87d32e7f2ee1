//! Diagnostics produced by job validation.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How serious a violation is. Warnings never block a job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[display("warning")]
    Warning,
    #[display("error")]
    Error,
}

/// What is wrong with a resolved job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// `step` is the referencing step, or the published image for
    /// `dockerimages.*.inputs.steps`.
    #[error("'{step}' references unknown step '{reference}'")]
    UnknownStepReference { step: String, reference: String },

    #[error("cyclic step dependency: {}", .cycle.join(" -> "))]
    CyclicStepDependency { cycle: Vec<String> },

    #[error("step '{step}' depends on trait '{reference}' which is not active")]
    UnknownTraitReference { step: String, reference: String },

    #[error("unknown registry alias '{alias}'")]
    UnknownRegistryAlias { alias: String },

    #[error("step '{step}' consumes unknown output '{output}'")]
    UnknownOutputReference { step: String, output: String },

    #[error("step '{step}' has invalid image reference '{image}': {reason}")]
    InvalidImageReference {
        step: String,
        image: String,
        reason: String,
    },

    #[error("step '{step}' publishes to unknown repository '{repository}'")]
    UnknownRepository { step: String, repository: String },

    #[error("trait '{name}' requires trait '{requires}'")]
    MissingTraitPrerequisite { name: String, requires: String },
}

/// A single finding for a job, located by a dotted key path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub job: String,
    /// Key path inside the resolved job, e.g. `steps.release.trait_depends`.
    pub path: String,
    pub severity: Severity,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl Violation {
    pub fn error(job: impl Into<String>, path: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            job: job.into(),
            path: path.into(),
            severity: Severity::Error,
            kind,
        }
    }

    pub fn warning(job: impl Into<String>, path: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            job: job.into(),
            path: path.into(),
            severity: Severity::Warning,
            kind,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] job '{}' at {}: {}",
            self.severity, self.job, self.path, self.kind
        )
    }
}

/// Whether any violation is hard-severity.
pub fn has_errors(violations: &[Violation]) -> bool {
    violations.iter().any(Violation::is_error)
}
