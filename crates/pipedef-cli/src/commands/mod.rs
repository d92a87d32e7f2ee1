//! CLI command implementations.

pub mod resolve;
pub mod validate;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use pipedef_config::{ResolvedJobs, load_definition, merge, step_order, trait_order};
use std::path::Path;
use tracing::info;

/// Resolved jobs per pipeline, optionally narrowed to one job name.
pub(crate) fn load_jobs(path: &Path, job: Option<&str>) -> Result<IndexMap<String, ResolvedJobs>> {
    let definition = load_definition(path)
        .with_context(|| format!("Failed to load pipeline definition: {}", path.display()))?;

    let mut pipelines = merge(&definition)
        .with_context(|| format!("Failed to resolve pipeline definition: {}", path.display()))?;

    if let Some(name) = job {
        for jobs in pipelines.values_mut() {
            jobs.retain(|job_name, _| job_name == name);
        }
        pipelines.retain(|_, jobs| !jobs.is_empty());
        if pipelines.is_empty() {
            anyhow::bail!("No job named '{}' in {}", name, path.display());
        }
    }

    info!(
        path = %path.display(),
        pipelines = pipelines.len(),
        jobs = pipelines.values().map(|jobs| jobs.len()).sum::<usize>(),
        "Resolved pipeline definition"
    );

    Ok(pipelines)
}

pub fn jobs(path: &Path, job: Option<&str>) -> Result<()> {
    let pipelines = load_jobs(path, job)?;

    for (pipeline, jobs) in &pipelines {
        for (name, job) in jobs {
            println!("{}/{}", pipeline, name);
            println!("  steps:  {}", step_order(job).join(" -> "));
            println!("  traits: {}", trait_order(job).join(", "));
        }
    }

    Ok(())
}
