//! Print resolved jobs.

use super::load_jobs;
use crate::OutputFormat;
use anyhow::{Context, Result};
use std::path::Path;

pub fn run(path: &Path, job: Option<&str>, format: OutputFormat) -> Result<()> {
    let pipelines = load_jobs(path, job)?;

    let rendered = match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&pipelines).context("Failed to render JSON")?
        }
        OutputFormat::Yaml => serde_yml::to_string(&pipelines).context("Failed to render YAML")?,
    };

    println!("{}", rendered);
    Ok(())
}
