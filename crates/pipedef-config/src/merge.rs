//! Trait merging: inherit blocks and base definition folded into each job.
//!
//! Merge order for a job is fixed:
//! 1. a copy of `base_definition`
//! 2. every inherit splice referenced by the job's `<<` key, in order
//! 3. the job's own keys
//!
//! Each layer is applied with [`deep_merge`].

use crate::resolve::build_job;
use crate::value::kind_of;
use crate::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use pipedef_core::{Definition, PipelineDefinition, ResolvedJob};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Key marking inherit splices inside a job or inherit block.
pub const MERGE_KEY: &str = "<<";

/// Resolved jobs of one pipeline, keyed by job name.
pub type ResolvedJobs = IndexMap<String, ResolvedJob>;

/// Deep-merge `overlay` onto `base`. Mappings merge key by key, recursively;
/// every other value (scalar, sequence, null) replaces what was there.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => merge_maps(base_map, overlay_map),
        (base, overlay) => *base = overlay.clone(),
    }
}

/// [`deep_merge`] for two mappings.
pub fn merge_maps(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Resolve every job of every pipeline in a definition.
pub fn merge(definition: &Definition) -> ConfigResult<IndexMap<String, ResolvedJobs>> {
    definition
        .pipelines
        .iter()
        .map(|(name, pipeline)| merge_pipeline(pipeline).map(|jobs| (name.clone(), jobs)))
        .collect()
}

/// Resolve every job of a single pipeline.
pub fn merge_pipeline(pipeline: &PipelineDefinition) -> ConfigResult<ResolvedJobs> {
    let mut registry = InheritRegistry::new(&pipeline.inherit);
    registry.resolve_all()?;

    let base = registry.resolve_mapping(&pipeline.base_definition, "base_definition")?;

    let mut jobs = IndexMap::new();
    for (name, job) in &pipeline.jobs {
        let mut merged = base.clone();
        registry.apply(&mut merged, job, &format!("jobs.{}", name))?;

        let resolved = build_job(name, merged)?;
        debug!(
            job = %name,
            steps = resolved.steps.len(),
            traits = resolved.traits.len(),
            "Resolved job"
        );
        jobs.insert(name.clone(), resolved);
    }

    Ok(jobs)
}

/// Named inherit blocks, resolved by reference lookup.
///
/// A block's own `<<` references are expanded once; every use gets a clone
/// of the resolved fragment.
struct InheritRegistry<'a> {
    blocks: &'a IndexMap<String, Map<String, Value>>,
    resolved: HashMap<String, Map<String, Value>>,
    /// Blocks currently being resolved, outermost first.
    stack: Vec<String>,
}

impl<'a> InheritRegistry<'a> {
    fn new(blocks: &'a IndexMap<String, Map<String, Value>>) -> Self {
        Self {
            blocks,
            resolved: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Resolve all blocks up front, so broken blocks fail even when unused.
    fn resolve_all(&mut self) -> ConfigResult<()> {
        let blocks = self.blocks;
        for name in blocks.keys() {
            self.block(name, "inherit")?;
        }
        Ok(())
    }

    fn block(&mut self, name: &str, location: &str) -> ConfigResult<Map<String, Value>> {
        if let Some(resolved) = self.resolved.get(name) {
            return Ok(resolved.clone());
        }

        if let Some(pos) = self.stack.iter().position(|n| n == name) {
            let mut chain = self.stack[pos..].to_vec();
            chain.push(name.to_string());
            return Err(ConfigError::CyclicInheritance {
                location: location.to_string(),
                chain,
            });
        }

        let blocks = self.blocks;
        let raw = blocks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownInheritReference {
                location: location.to_string(),
                name: name.to_string(),
            })?;

        self.stack.push(name.to_string());
        let result = self.resolve_mapping(raw, &format!("inherit.{}", name));
        self.stack.pop();

        let resolved = result?;
        self.resolved.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Resolve a mapping on its own (splices, then own keys, onto nothing).
    fn resolve_mapping(
        &mut self,
        map: &Map<String, Value>,
        location: &str,
    ) -> ConfigResult<Map<String, Value>> {
        let mut target = Map::new();
        self.apply(&mut target, map, location)?;
        Ok(target)
    }

    /// Apply `map` onto `target`: its splices first, in order, then its own
    /// keys with nested `<<` keys expanded.
    fn apply(
        &mut self,
        target: &mut Map<String, Value>,
        map: &Map<String, Value>,
        location: &str,
    ) -> ConfigResult<()> {
        if let Some(splices) = map.get(MERGE_KEY) {
            for fragment in self.splices(splices, location)? {
                merge_maps(target, &fragment);
            }
        }

        for (key, value) in map {
            if key == MERGE_KEY {
                continue;
            }
            let value = self.expand(value, &format!("{}.{}", location, key))?;
            match target.get_mut(key) {
                Some(existing) => deep_merge(existing, &value),
                None => {
                    target.insert(key.clone(), value);
                }
            }
        }

        Ok(())
    }

    /// The fragments named by a `<<` value: a block name, an inline mapping
    /// (an expanded YAML alias), or a sequence of either.
    fn splices(&mut self, value: &Value, location: &str) -> ConfigResult<Vec<Map<String, Value>>> {
        match value {
            Value::String(name) => Ok(vec![self.block(name, location)?]),
            Value::Object(inline) => Ok(vec![self.resolve_mapping(inline, location)?]),
            Value::Array(items) => {
                let mut fragments = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Array(_) => {
                            return Err(ConfigError::invalid(
                                format!("{}.{}", location, MERGE_KEY),
                                "nested sequences cannot be spliced",
                            ));
                        }
                        _ => fragments.extend(self.splices(item, location)?),
                    }
                }
                Ok(fragments)
            }
            Value::Null => Ok(Vec::new()),
            other => Err(ConfigError::invalid(
                format!("{}.{}", location, MERGE_KEY),
                format!(
                    "expected a block name or mapping, found {}",
                    kind_of(other)
                ),
            )),
        }
    }

    /// Expand `<<` keys anywhere below a value.
    fn expand(&mut self, value: &Value, location: &str) -> ConfigResult<Value> {
        match value {
            Value::Object(map) => Ok(Value::Object(self.resolve_mapping(map, location)?)),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.expand(item, &format!("{}[{}]", location, i)))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_definition;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pipeline(yaml: &str) -> PipelineDefinition {
        parse_definition(yaml)
            .unwrap()
            .pipelines
            .into_values()
            .next()
            .unwrap()
    }

    #[test]
    fn test_deep_merge_maps_recursively() {
        let mut base = json!({
            "options": {"public_build_logs": false, "retain": 7},
            "notifications": {"default": {"on_event": "error"}}
        });
        deep_merge(&mut base, &json!({"options": {"public_build_logs": true}}));

        assert_eq!(
            base,
            json!({
                "options": {"public_build_logs": true, "retain": 7},
                "notifications": {"default": {"on_event": "error"}}
            })
        );
    }

    #[test]
    fn test_deep_merge_replaces_leaves() {
        let mut base = json!({"branches": ["main", "develop"], "version": {"preprocess": "inc"}});
        deep_merge(&mut base, &json!({"branches": ["main"], "version": null}));
        assert_eq!(base, json!({"branches": ["main"], "version": null}));
    }

    #[test]
    fn test_base_traits_are_overridden_by_job() {
        let jobs = merge_pipeline(&pipeline(
            r#"
cc-utils:
  base_definition:
    traits:
      version: ~
      options:
        public_build_logs: false
        retain_builds: 10
  jobs:
    head-update:
      traits:
        options:
          public_build_logs: true
"#,
        ))
        .unwrap();

        let job = &jobs["head-update"];
        assert_eq!(
            job.traits["options"].params,
            json!({"public_build_logs": true, "retain_builds": 10})
        );
        assert!(job.traits["version"].is_default());
    }

    #[test]
    fn test_empty_marker_versus_absent() {
        let jobs = merge_pipeline(&pipeline(
            r#"
cc-utils:
  jobs:
    head-update:
      steps:
        test: ~
        lint: ~
    pull-request:
      steps:
        test: ~
"#,
        ))
        .unwrap();

        let lint = jobs["head-update"].step("lint").unwrap();
        assert!(lint.is_default());
        assert_eq!(lint.execute, vec!["lint"]);
        assert!(!jobs["pull-request"].has_step("lint"));
    }

    #[test]
    fn test_yaml_alias_splice() {
        let jobs = merge_pipeline(&pipeline(
            r#"
cc-utils:
  inherit:
    gh_pages_repo: &gh_pages_repo
      repos:
        - name: gh_pages
          path: gardener/cc-utils
          branch: gh-pages
  jobs:
    release_job:
      <<: *gh_pages_repo
      steps:
        generate_documentation:
          publish_to: [gh_pages]
"#,
        ))
        .unwrap();

        let job = &jobs["release_job"];
        assert_eq!(job.repository_names(), vec!["source", "gh_pages"]);
        assert!(!job.settings.contains_key(MERGE_KEY));
    }

    #[test]
    fn test_named_splices_apply_in_order() {
        let jobs = merge_pipeline(&pipeline(
            r#"
cc-utils:
  inherit:
    first:
      traits:
        cronjob:
          interval: 24h
    second:
      traits:
        cronjob:
          interval: 7d
        pull-request: ~
  base_definition:
    traits:
      cronjob:
        interval: 1h
  jobs:
    nightly:
      <<: [first, second]
      traits:
        version: ~
"#,
        ))
        .unwrap();

        let job = &jobs["nightly"];
        assert_eq!(job.traits["cronjob"].params, json!({"interval": "7d"}));
        let names: Vec<&String> = job.traits.keys().collect();
        assert_eq!(names, vec!["cronjob", "pull-request", "version"]);
    }

    #[test]
    fn test_blocks_reference_other_blocks() {
        let jobs = merge_pipeline(&pipeline(
            r#"
cc-utils:
  inherit:
    base_repos:
      repos:
        - name: gh_pages
    docs:
      <<: base_repos
      steps:
        generate_documentation:
          publish_to: [gh_pages]
  jobs:
    docs-job:
      <<: docs
"#,
        ))
        .unwrap();

        let job = &jobs["docs-job"];
        assert!(job.has_step("generate_documentation"));
        assert_eq!(job.repository_names(), vec!["source", "gh_pages"]);
    }

    #[test]
    fn test_unknown_inherit_reference() {
        let result = merge_pipeline(&pipeline(
            r#"
cc-utils:
  jobs:
    head-update:
      <<: missing_block
"#,
        ));

        match result {
            Err(ConfigError::UnknownInheritReference { location, name }) => {
                assert_eq!(location, "jobs.head-update");
                assert_eq!(name, "missing_block");
            }
            other => panic!("expected unknown inherit reference, got {:?}", other),
        }
    }

    #[test]
    fn test_cyclic_inheritance() {
        let result = merge_pipeline(&pipeline(
            r#"
cc-utils:
  inherit:
    a:
      <<: b
    b:
      <<: c
    c:
      <<: a
  jobs: {}
"#,
        ));

        match result {
            Err(ConfigError::CyclicInheritance { chain, .. }) => {
                assert_eq!(chain, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected cyclic inheritance, got {:?}", other),
        }
    }

    #[test]
    fn test_self_inheritance() {
        let result = merge_pipeline(&pipeline(
            r#"
cc-utils:
  inherit:
    loop:
      <<: loop
  jobs: {}
"#,
        ));
        assert!(matches!(
            result,
            Err(ConfigError::CyclicInheritance { chain, .. }) if chain == vec!["loop", "loop"]
        ));
    }

    #[test]
    fn test_nested_splice_inside_traits() {
        let jobs = merge_pipeline(&pipeline(
            r#"
cc-utils:
  inherit:
    default_notifications:
      default:
        on_event: error
  jobs:
    head-update:
      traits:
        notifications:
          <<: default_notifications
          cfg_name: team
"#,
        ))
        .unwrap();

        assert_eq!(
            jobs["head-update"].traits["notifications"].params,
            json!({"default": {"on_event": "error"}, "cfg_name": "team"})
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let jobs = merge_pipeline(&pipeline(
            r#"
cc-utils:
  inherit:
    gh_pages_repo:
      repos:
        - name: gh_pages
  base_definition:
    repo:
      disable_ci_skip: true
    traits:
      version: ~
      options:
        public_build_logs: false
  jobs:
    release_job:
      <<: gh_pages_repo
      traits:
        release:
          nextversion: bump_minor
      steps:
        build_python_packages:
          output_dir: dist
        release_to_pypi:
          trait_depends: [release]
          inputs:
            DIST_DIR: dist
"#,
        ))
        .unwrap();

        let reinjected = PipelineDefinition {
            jobs: jobs
                .iter()
                .map(|(name, job)| {
                    let value = job.to_value();
                    (name.clone(), value.as_object().cloned().unwrap())
                })
                .collect(),
            ..Default::default()
        };

        assert_eq!(merge_pipeline(&reinjected).unwrap(), jobs);
    }

    #[test]
    fn test_merge_walks_all_pipelines() {
        let definition = parse_definition(
            r#"
first:
  jobs:
    a:
      steps:
        test: ~
second:
  jobs:
    b:
      steps:
        lint: ~
"#,
        )
        .unwrap();

        let merged = merge(&definition).unwrap();
        assert!(merged["first"]["a"].has_step("test"));
        assert!(merged["second"]["b"].has_step("lint"));
    }
}
