//! Validate resolved jobs.

use super::load_jobs;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use pipedef_config::{ResolvedJobs, ValidationOptions, validate_with};
use pipedef_core::{Severity, Violation};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct Finding {
    pipeline: String,
    #[serde(flatten)]
    violation: Violation,
}

/// Findings across every checked job.
#[derive(Debug, Default)]
struct Report {
    checked: usize,
    findings: Vec<Finding>,
}

impl Report {
    fn collect(pipelines: &IndexMap<String, ResolvedJobs>, options: &ValidationOptions) -> Self {
        let mut report = Report::default();
        for (pipeline, jobs) in pipelines {
            for job in jobs.values() {
                report.checked += 1;
                report
                    .findings
                    .extend(validate_with(job, options).into_iter().map(|violation| Finding {
                        pipeline: pipeline.clone(),
                        violation,
                    }));
            }
        }
        report
    }

    fn errors(&self) -> usize {
        self.findings.iter().filter(|f| f.violation.is_error()).count()
    }

    fn warnings(&self) -> usize {
        self.findings.len() - self.errors()
    }

    /// Whether the run should exit non-zero. `strict` fails on warnings too.
    fn failed(&self, strict: bool) -> bool {
        self.errors() > 0 || (strict && self.warnings() > 0)
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.findings).context("Failed to render JSON")
    }

    fn print(&self) {
        for Finding { pipeline, violation } in &self.findings {
            let marker = match violation.severity {
                Severity::Error => "✗",
                Severity::Warning => "!",
            };
            println!(
                "{} {}/{} {}: {}",
                marker, pipeline, violation.job, violation.path, violation.kind
            );
        }
        println!(
            "{} job(s) checked, {} error(s), {} warning(s)",
            self.checked,
            self.errors(),
            self.warnings()
        );
    }
}

pub fn run(
    path: &Path,
    job: Option<&str>,
    registry_aliases: Vec<String>,
    strict: bool,
    json: bool,
) -> Result<()> {
    let pipelines = load_jobs(path, job)?;

    let options = if registry_aliases.is_empty() {
        ValidationOptions::new()
    } else {
        ValidationOptions::new().with_registry_aliases(registry_aliases)
    };

    let report = Report::collect(&pipelines, &options);
    if json {
        println!("{}", report.to_json()?);
    } else {
        report.print();
    }

    if report.failed(strict) {
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipedef_config::{merge, parse_definition};
    use serde_json::json;

    const DEFINITION: &str = r#"
cc-utils:
  base_definition:
    traits:
      version: ~
      publish:
        dockerimages:
          job-image:
            registry: gcr-readwrite
            image: eu.gcr.io/gardener-project/cc/job-image
  jobs:
    head-update:
      steps:
        test: ~
    pull-request:
      steps:
        lint:
          depends: [format]
"#;

    fn pipelines() -> IndexMap<String, ResolvedJobs> {
        merge(&parse_definition(DEFINITION).unwrap()).unwrap()
    }

    #[test]
    fn test_warnings_fail_only_when_strict() {
        let mut pipelines = pipelines();
        pipelines["cc-utils"].shift_remove("pull-request");

        let report = Report::collect(&pipelines, &ValidationOptions::new());
        assert_eq!(report.checked, 1);
        assert_eq!(report.errors(), 0);
        assert_eq!(report.warnings(), 1);
        assert!(!report.failed(false));
        assert!(report.failed(true));
    }

    #[test]
    fn test_errors_always_fail() {
        let options = ValidationOptions::new().with_registry_aliases(["gcr-readwrite"]);
        let report = Report::collect(&pipelines(), &options);

        assert_eq!(report.checked, 2);
        assert_eq!(report.errors(), 1);
        assert_eq!(report.warnings(), 0);
        assert!(report.failed(false));
    }

    #[test]
    fn test_json_report() {
        let options = ValidationOptions::new().with_registry_aliases(["gcr-readwrite"]);
        let report = Report::collect(&pipelines(), &options);

        let rendered: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(
            rendered,
            json!([{
                "pipeline": "cc-utils",
                "job": "pull-request",
                "path": "steps.lint.depends",
                "severity": "error",
                "kind": "unknown_step_reference",
                "step": "lint",
                "reference": "format"
            }])
        );
    }
}
