//! Job validation: referential integrity of a resolved job.
//!
//! Every check runs and reports at most its first finding, so callers get
//! one violation per kind of problem.

use crate::graph::StepGraph;
use crate::traits::prerequisites;
use indexmap::IndexMap;
use pipedef_core::{ResolvedJob, Violation, ViolationKind};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::warn;

// Characters allowed in an OCI image reference
static IMAGE_REFERENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._/:@-]+$").unwrap());

/// Validation settings supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Known container registry aliases. `None` when the caller has no alias
    /// set; registry references then only produce warnings.
    pub registry_aliases: Option<BTreeSet<String>>,
}

impl ValidationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry_aliases = Some(aliases.into_iter().map(Into::into).collect());
        self
    }
}

type Check = fn(&ResolvedJob, &ValidationOptions) -> Option<Violation>;

const CHECKS: &[Check] = &[
    check_step_references,
    check_step_cycles,
    check_trait_references,
    check_registry_aliases,
    check_output_references,
    check_image_references,
    check_publish_targets,
    check_trait_prerequisites,
];

/// Validate a job without a registry alias set.
pub fn validate(job: &ResolvedJob) -> Vec<Violation> {
    validate_with(job, &ValidationOptions::default())
}

/// Validate a job. An empty result means every reference resolves and the
/// step graph is acyclic.
pub fn validate_with(job: &ResolvedJob, options: &ValidationOptions) -> Vec<Violation> {
    CHECKS.iter().filter_map(|check| check(job, options)).collect()
}

/// Validate every job, keyed by job name. Jobs without findings are omitted.
pub fn validate_all(
    jobs: &IndexMap<String, ResolvedJob>,
    options: &ValidationOptions,
) -> IndexMap<String, Vec<Violation>> {
    jobs.iter()
        .map(|(name, job)| (name.clone(), validate_with(job, options)))
        .filter(|(_, violations)| !violations.is_empty())
        .collect()
}

fn check_step_references(job: &ResolvedJob, _: &ValidationOptions) -> Option<Violation> {
    for step in job.steps.values() {
        let references = step
            .input_steps
            .iter()
            .map(|r| (r, "inputs.steps"))
            .chain(step.depends.iter().map(|r| (r, "depends")));

        for (reference, key) in references {
            if !job.has_step(reference) {
                return Some(Violation::error(
                    &job.name,
                    format!("steps.{}.{}", step.name, key),
                    ViolationKind::UnknownStepReference {
                        step: step.name.clone(),
                        reference: reference.clone(),
                    },
                ));
            }
        }
    }

    image_step_references(job)
        .into_iter()
        .find(|(_, _, reference)| !job.has_step(reference))
        .map(|(path, image, reference)| {
            Violation::error(
                &job.name,
                path,
                ViolationKind::UnknownStepReference {
                    step: image,
                    reference,
                },
            )
        })
}

/// Images of the `publish` trait, keyed by image name.
fn published_images(job: &ResolvedJob) -> Option<&Map<String, Value>> {
    job.get_trait("publish")?
        .param("dockerimages")?
        .as_object()
}

/// Steps whose outputs a published image consumes, as
/// `(path, image, step)`. `inputs.steps` is a list or a mapping of names.
fn image_step_references(job: &ResolvedJob) -> Vec<(String, String, String)> {
    let mut references = Vec::new();

    for (image, cfg) in published_images(job).into_iter().flatten() {
        let path = format!("traits.publish.dockerimages.{}.inputs.steps", image);
        let names: Vec<&str> = match cfg.get("inputs").and_then(|i| i.get("steps")) {
            Some(Value::Object(steps)) => steps.keys().map(String::as_str).collect(),
            Some(Value::Array(steps)) => steps.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(step)) => vec![step.as_str()],
            _ => Vec::new(),
        };
        references.extend(
            names
                .into_iter()
                .map(|name| (path.clone(), image.clone(), name.to_string())),
        );
    }

    references
}

fn check_step_cycles(job: &ResolvedJob, _: &ValidationOptions) -> Option<Violation> {
    let cycle = StepGraph::from_job(job).find_cycle()?;
    Some(Violation::error(
        &job.name,
        format!("steps.{}", cycle[0]),
        ViolationKind::CyclicStepDependency { cycle },
    ))
}

fn check_trait_references(job: &ResolvedJob, _: &ValidationOptions) -> Option<Violation> {
    for step in job.steps.values() {
        if let Some(missing) = step.trait_depends.iter().find(|t| !job.has_trait(t)) {
            return Some(Violation::error(
                &job.name,
                format!("steps.{}.trait_depends", step.name),
                ViolationKind::UnknownTraitReference {
                    step: step.name.clone(),
                    reference: missing.clone(),
                },
            ));
        }
    }
    None
}

/// Registry aliases referenced by the job, with their key paths: the
/// `publish` trait's `dockerimages.*.registry` entries, then step `registry`.
pub fn registry_references(job: &ResolvedJob) -> Vec<(String, String)> {
    let mut references = Vec::new();

    for (image, cfg) in published_images(job).into_iter().flatten() {
        if let Some(alias) = cfg.get("registry").and_then(Value::as_str) {
            references.push((
                format!("traits.publish.dockerimages.{}.registry", image),
                alias.to_string(),
            ));
        }
    }

    for step in job.steps.values() {
        if let Some(alias) = &step.registry {
            references.push((format!("steps.{}.registry", step.name), alias.clone()));
        }
    }

    references
}

fn check_registry_aliases(job: &ResolvedJob, options: &ValidationOptions) -> Option<Violation> {
    let references = registry_references(job);

    match &options.registry_aliases {
        Some(known) => references
            .into_iter()
            .find(|(_, alias)| !known.contains(alias))
            .map(|(path, alias)| {
                Violation::error(&job.name, path, ViolationKind::UnknownRegistryAlias { alias })
            }),
        None => {
            let (path, alias) = references.into_iter().next()?;
            warn!(
                job = %job.name,
                %alias,
                "No registry alias set supplied; registry reference not verified"
            );
            Some(Violation::warning(
                &job.name,
                path,
                ViolationKind::UnknownRegistryAlias { alias },
            ))
        }
    }
}

fn check_output_references(job: &ResolvedJob, _: &ValidationOptions) -> Option<Violation> {
    for step in job.steps.values() {
        for (input, output) in &step.inputs {
            if !job.has_output(output) {
                return Some(Violation::error(
                    &job.name,
                    format!("steps.{}.inputs.{}", step.name, input),
                    ViolationKind::UnknownOutputReference {
                        step: step.name.clone(),
                        output: output.clone(),
                    },
                ));
            }
        }
    }
    None
}

/// Why an image reference is invalid, if it is.
pub fn image_reference_error(image: &str) -> Option<&'static str> {
    if !IMAGE_REFERENCE_REGEX.is_match(image) {
        Some("forbidden character in image reference")
    } else if !image.contains(':') {
        Some("image reference must contain a colon character")
    } else {
        None
    }
}

fn check_image_references(job: &ResolvedJob, _: &ValidationOptions) -> Option<Violation> {
    job.steps.values().find_map(|step| {
        let image = step.image.as_ref()?;
        let reason = image_reference_error(image)?;
        Some(Violation::error(
            &job.name,
            format!("steps.{}.image", step.name),
            ViolationKind::InvalidImageReference {
                step: step.name.clone(),
                image: image.clone(),
                reason: reason.to_string(),
            },
        ))
    })
}

fn check_publish_targets(job: &ResolvedJob, _: &ValidationOptions) -> Option<Violation> {
    let repositories = job.repository_names();

    for step in job.steps.values() {
        if let Some(repository) = step
            .publish_to
            .keys()
            .find(|r| !repositories.contains(&r.as_str()))
        {
            return Some(Violation::error(
                &job.name,
                format!("steps.{}.publish_to", step.name),
                ViolationKind::UnknownRepository {
                    step: step.name.clone(),
                    repository: repository.clone(),
                },
            ));
        }
    }
    None
}

fn check_trait_prerequisites(job: &ResolvedJob, _: &ValidationOptions) -> Option<Violation> {
    for name in job.traits.keys() {
        if let Some(requires) = prerequisites(name).find(|r| !job.has_trait(r)) {
            return Some(Violation::error(
                &job.name,
                format!("traits.{}", name),
                ViolationKind::MissingTraitPrerequisite {
                    name: name.clone(),
                    requires: requires.to_string(),
                },
            ));
        }
    }
    None
}
