//! Resolved jobs, steps and traits.

use derive_more::Display;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Name of the main repository when `repo.name` is not set.
pub const DEFAULT_REPOSITORY_NAME: &str = "source";

/// Output every step produces, for passing custom error notification config.
pub const ON_ERROR_DIR: &str = "on_error_dir";

/// A job after base definition, inherit blocks and local overrides were merged.
///
/// Serializes as the job mapping it was resolved to, so the output can be
/// fed back in as an already-resolved job.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedJob {
    /// Job name.
    pub name: String,
    /// Enabled steps, in declaration order.
    pub steps: IndexMap<String, Step>,
    /// Active traits, in declaration order.
    pub traits: IndexMap<String, Trait>,
    /// Every other job-level key (`repo`, `repos`, ...), merged but not interpreted.
    pub settings: Map<String, Value>,
}

impl ResolvedJob {
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    pub fn has_step(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.contains_key(name)
    }

    pub fn get_trait(&self, name: &str) -> Option<&Trait> {
        self.traits.get(name)
    }

    /// Names of all repositories available to this job: the main repository
    /// first, then every named entry of `repos`.
    pub fn repository_names(&self) -> Vec<&str> {
        let main = self
            .settings
            .get("repo")
            .and_then(|repo| repo.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_REPOSITORY_NAME);

        let mut names = vec![main];
        if let Some(Value::Array(repos)) = self.settings.get("repos") {
            names.extend(
                repos
                    .iter()
                    .filter_map(|repo| repo.get("name"))
                    .filter_map(Value::as_str),
            );
        }
        names
    }

    /// Map of output name to the step producing it. [`ON_ERROR_DIR`] has no
    /// single producer and is left out.
    pub fn outputs(&self) -> IndexMap<String, &str> {
        let mut outputs = IndexMap::new();
        for step in self.steps.values() {
            for output in step.outputs() {
                if output != ON_ERROR_DIR {
                    outputs.insert(output, step.name.as_str());
                }
            }
        }
        outputs
    }

    /// Whether some step of the job produces `output`.
    pub fn has_output(&self, output: &str) -> bool {
        output == ON_ERROR_DIR || self.outputs().contains_key(output)
    }

    /// Render the job back into a job mapping.
    pub fn to_value(&self) -> Value {
        let mut job = self.settings.clone();

        let steps: Map<String, Value> = self
            .steps
            .iter()
            .map(|(name, step)| (name.clone(), step.params.clone()))
            .collect();
        job.insert("steps".to_string(), Value::Object(steps));

        let traits: Map<String, Value> = self
            .traits
            .iter()
            .map(|(name, t)| (name.clone(), t.params.clone()))
            .collect();
        job.insert("traits".to_string(), Value::Object(traits));

        Value::Object(job)
    }
}

impl Serialize for ResolvedJob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// A step of a resolved job.
///
/// `params` holds the merged parameters exactly as they will be handed on
/// (`Value::Null` for a step declared with `~`); the remaining fields are the
/// keys interpreted during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    pub params: Value,
    /// Traits that must be active for this step to run.
    pub trait_depends: Vec<String>,
    /// Explicit step dependencies.
    pub depends: Vec<String>,
    /// Steps whose outputs this step consumes (`inputs.steps`).
    pub input_steps: Vec<String>,
    /// Named inputs: environment variable name to output name.
    pub inputs: IndexMap<String, String>,
    pub output_dir: Option<String>,
    pub image: Option<String>,
    /// Registry alias used to pull `image`.
    pub registry: Option<String>,
    /// Repositories commits created by this step are pushed to.
    pub publish_to: IndexMap<String, PublishTarget>,
    /// Executable and arguments. Defaults to the step name.
    pub execute: Vec<String>,
    pub privilege_mode: PrivilegeMode,
}

impl Step {
    /// A step enabled with default parameters (`name: ~`).
    pub fn with_defaults(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            execute: vec![name.clone()],
            name,
            params: Value::Null,
            trait_depends: Vec::new(),
            depends: Vec::new(),
            input_steps: Vec::new(),
            inputs: IndexMap::new(),
            output_dir: None,
            image: None,
            registry: None,
            publish_to: IndexMap::new(),
            privilege_mode: PrivilegeMode::default(),
        }
    }

    /// Whether the step was declared without parameters.
    pub fn is_default(&self) -> bool {
        self.params.is_null()
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Outputs produced by this step. `output_dir: dist` yields `dist` and
    /// `dist_path`; every step also yields [`ON_ERROR_DIR`].
    pub fn outputs(&self) -> Vec<String> {
        let mut outputs = match &self.output_dir {
            Some(dir) => vec![dir.clone(), format!("{}_path", dir)],
            None => Vec::new(),
        };
        outputs.push(ON_ERROR_DIR.to_string());
        outputs
    }

    /// All steps this step depends on by name, deduplicated, in the order
    /// `inputs.steps` then `depends`.
    pub fn step_dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        for dep in self.input_steps.iter().chain(self.depends.iter()) {
            if !deps.contains(&dep.as_str()) {
                deps.push(dep);
            }
        }
        deps
    }
}

/// Options for a `publish_to` target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    #[serde(default)]
    pub force_push: bool,
}

/// Container privilege mode of a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeMode {
    #[display("privileged")]
    Privileged,
    #[default]
    #[display("unprivileged")]
    Unprivileged,
}

impl std::str::FromStr for PrivilegeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "privileged" => Ok(PrivilegeMode::Privileged),
            "unprivileged" => Ok(PrivilegeMode::Unprivileged),
            _ => Err(format!("unknown privilege mode: {}", s)),
        }
    }
}

/// An active trait of a resolved job.
#[derive(Debug, Clone, PartialEq)]
pub struct Trait {
    pub name: String,
    /// Merged parameters; `Value::Null` when enabled with defaults (`name: ~`).
    pub params: Value,
}

impl Trait {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn is_default(&self) -> bool {
        self.params.is_null()
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}
