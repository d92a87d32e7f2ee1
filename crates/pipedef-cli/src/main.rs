//! pipedef CLI tool.

use clap::{Args, Parser, Subcommand, ValueEnum};
use pipedef_config::DEFAULT_DEFINITION_PATH;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "pipedef")]
#[command(about = "Resolve and validate CI pipeline definitions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    /// Path to the pipeline definition file
    #[arg(env = "PIPEDEF_DEFINITION", default_value = DEFAULT_DEFINITION_PATH)]
    path: PathBuf,

    /// Only consider this job
    #[arg(long)]
    job: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate resolved jobs
    Validate {
        #[command(flatten)]
        source: Source,
        /// Known container registry alias (repeatable, or comma separated)
        #[arg(
            long = "registry-alias",
            env = "PIPEDEF_REGISTRY_ALIASES",
            value_delimiter = ','
        )]
        registry_aliases: Vec<String>,
        /// Fail on warnings too
        #[arg(long)]
        strict: bool,
        /// Print violations as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print resolved jobs
    Resolve {
        #[command(flatten)]
        source: Source,
        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },
    /// List jobs with their step and trait order
    Jobs {
        #[command(flatten)]
        source: Source,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr, results to stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            source,
            registry_aliases,
            strict,
            json,
        } => {
            commands::validate::run(
                &source.path,
                source.job.as_deref(),
                registry_aliases,
                strict,
                json,
            )?;
        }
        Commands::Resolve { source, format } => {
            commands::resolve::run(&source.path, source.job.as_deref(), format)?;
        }
        Commands::Jobs { source } => {
            commands::jobs(&source.path, source.job.as_deref())?;
        }
    }

    Ok(())
}
