//! Raw pipeline definition documents.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A whole definition document, keyed by top-level repository name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub pipelines: IndexMap<String, PipelineDefinition>,
    /// Top-level entries that are not pipelines (shared fragments, schema
    /// markers), kept verbatim.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl Definition {
    /// Look up a pipeline by its top-level name.
    pub fn pipeline(&self, name: &str) -> Option<&PipelineDefinition> {
        self.pipelines.get(name)
    }

    /// Total number of jobs across all pipelines.
    pub fn job_count(&self) -> usize {
        self.pipelines.values().map(|p| p.jobs.len()).sum()
    }
}

/// One `inherit` + `base_definition` + `jobs` entry of a definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Named fragments that jobs (and other fragments) splice in via `<<`.
    pub inherit: IndexMap<String, Map<String, Value>>,
    /// Defaults applied to every job before its own keys.
    pub base_definition: Map<String, Value>,
    /// Job definitions as written, in declaration order.
    pub jobs: IndexMap<String, Map<String, Value>>,
    /// Keys not interpreted by the merger, kept verbatim.
    pub extra: Map<String, Value>,
}
