//! Loading definition documents from YAML.

use crate::value::{kind_of, mapping_or_empty};
use crate::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use pipedef_core::{Definition, PipelineDefinition};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Where pipeline definitions live inside a repository.
pub const DEFAULT_DEFINITION_PATH: &str = ".ci/pipeline_definitions";

/// Read and parse a definition file.
pub fn load_definition(path: impl AsRef<Path>) -> ConfigResult<Definition> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let definition = parse_definition(&content)?;
    debug!(
        path = %path.as_ref().display(),
        pipelines = definition.pipelines.len(),
        jobs = definition.job_count(),
        "Loaded definition"
    );
    Ok(definition)
}

/// Parse a definition from YAML text.
///
/// Anchors and aliases are expanded by the YAML parser; `<<` keys are kept
/// as written and interpreted by the merger.
pub fn parse_definition(yaml: &str) -> ConfigResult<Definition> {
    let doc: Value = serde_yml::from_str(yaml)?;

    let root = match doc {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(ConfigError::invalid(
                "definition",
                format!("expected a mapping, found {}", kind_of(&other)),
            ));
        }
    };

    let mut definition = Definition::default();
    for (name, value) in root {
        if is_pipeline(&name, &value)? {
            let pipeline = parse_pipeline(&name, &value)?;
            definition.pipelines.insert(name, pipeline);
        } else {
            debug!(key = %name, "Keeping top-level entry uninterpreted");
            definition.extra.insert(name, value);
        }
    }

    Ok(definition)
}

/// A top-level entry is a pipeline when it is a mapping with `jobs`. A mapping
/// carrying `inherit` or `base_definition` without `jobs` is an incomplete one.
fn is_pipeline(name: &str, value: &Value) -> ConfigResult<bool> {
    let Value::Object(entry) = value else {
        return Ok(false);
    };
    if entry.contains_key("jobs") {
        return Ok(true);
    }
    if entry.contains_key("inherit") || entry.contains_key("base_definition") {
        return Err(ConfigError::MissingField(format!("{}.jobs", name)));
    }
    Ok(false)
}

fn parse_pipeline(name: &str, value: &Value) -> ConfigResult<PipelineDefinition> {
    let entry = mapping_or_empty(value, name)?;

    let mut pipeline = PipelineDefinition::default();

    for (key, value) in &entry {
        let field = format!("{}.{}", name, key);
        match key.as_str() {
            "inherit" => pipeline.inherit = named_mappings(value, &field)?,
            "base_definition" => pipeline.base_definition = mapping_or_empty(value, &field)?,
            "jobs" => pipeline.jobs = named_mappings(value, &field)?,
            _ => {
                pipeline.extra.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(pipeline)
}

fn named_mappings(value: &Value, field: &str) -> ConfigResult<IndexMap<String, Map<String, Value>>> {
    mapping_or_empty(value, field)?
        .iter()
        .map(|(name, entry)| {
            let entry = mapping_or_empty(entry, &format!("{}.{}", field, name))?;
            Ok((name.clone(), entry))
        })
        .collect()
}
