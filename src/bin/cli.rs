use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cluster_test_pipeline::cluster::naming::{cluster_name, DEFAULT_BUILD_TAG_PREFIX};
use cluster_test_pipeline::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cluster-test-pipeline")]
#[command(about = "Run hardware test stages on capacity-reserved clusters", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage of a pipeline file
    Run {
        /// Path to the pipeline YAML file
        #[arg(value_name = "FILE")]
        config: PathBuf,

        /// Build identifier used in cluster names
        #[arg(short, long, env = "BUILD_TAG")]
        build_tag: Option<String>,

        /// Only run stages whose name starts with this prefix
        #[arg(short = 'F', long)]
        filter: Option<String>,

        /// Write a JSON summary of the run to this path
        #[arg(short, long)]
        summary: Option<PathBuf>,

        /// Do not download or install the orchestrator
        #[arg(long)]
        skip_setup: bool,
    },

    /// List the stages of a pipeline file
    List {
        /// Path to the pipeline YAML file
        #[arg(value_name = "FILE")]
        config: PathBuf,
    },

    /// Validate a pipeline file without running it
    Validate {
        /// Path to the pipeline YAML file
        #[arg(value_name = "FILE")]
        config: PathBuf,
    },

    /// Print a cluster name for the given build
    Name {
        #[arg(short, long, env = "BUILD_TAG")]
        build_tag: String,

        #[arg(short, long)]
        os: String,

        #[arg(short, long)]
        instance_type: String,

        /// CI prefix stripped from the build tag
        #[arg(long, default_value = DEFAULT_BUILD_TAG_PREFIX)]
        prefix: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "cluster_test_pipeline=debug"
    } else {
        "cluster_test_pipeline=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(verdict) => ExitCode::from(verdict.exit_code()),
        Err(e) => {
            tracing::error!(error = %e, "Pipeline failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<PipelineVerdict> {
    match cli.command {
        Commands::Run {
            config,
            build_tag,
            filter,
            summary,
            skip_setup,
        } => run_pipeline(config, build_tag, filter, summary, skip_setup).await,
        Commands::List { config } => list_stages(config),
        Commands::Validate { config } => validate(config),
        Commands::Name {
            build_tag,
            os,
            instance_type,
            prefix,
        } => {
            println!("{}", cluster_name(&prefix, &build_tag, &os, &instance_type));
            Ok(PipelineVerdict::Success)
        }
    }
}

async fn run_pipeline(
    path: PathBuf,
    build_tag: Option<String>,
    filter: Option<String>,
    summary: Option<PathBuf>,
    skip_setup: bool,
) -> anyhow::Result<PipelineVerdict> {
    let config = PipelineConfig::load(&path)?;

    let mut runner = PipelineRunner::new(config, Arc::new(ShellExecutor::new())).skip_setup(skip_setup);
    if let Some(tag) = build_tag {
        runner = runner.build_tag(tag);
    }
    if let Some(prefix) = filter {
        runner = runner.filter(prefix);
    }

    let report = runner.run().await?;

    println!();
    for stage in &report.stages {
        let icon = match stage.status {
            StageStatus::Success => "✓",
            StageStatus::Unstable => "!",
            StageStatus::Failed => "✗",
        };
        let detail = stage.message.as_deref().unwrap_or("");
        println!("  {} {} {}", icon, stage.stage_name, detail);
    }
    println!();
    println!("Result: {}", report.verdict);

    if let Some(path) = summary {
        report.write_summary(&path)?;
        println!("Summary written to {}", path.display());
    }

    Ok(report.verdict)
}

fn list_stages(path: PathBuf) -> anyhow::Result<PipelineVerdict> {
    let config = PipelineConfig::load(&path)?;

    println!("Stages in {}:", path.display());
    for stage in &config.stages {
        println!(
            "  {} ({} on {} in {}, lock {} x{})",
            stage.name, stage.os, stage.instance_type, stage.region, stage.lock.label, stage.lock.quantity
        );
    }
    println!("\nTotal: {} stage(s)", config.stages.len());

    Ok(PipelineVerdict::Success)
}

fn validate(path: PathBuf) -> anyhow::Result<PipelineVerdict> {
    match PipelineConfig::load(&path) {
        Ok(config) => {
            println!("✓ {} ({} stage(s))", path.display(), config.stages.len());
            Ok(PipelineVerdict::Success)
        }
        Err(e) => {
            println!("✗ {}: {}", path.display(), e);
            Ok(PipelineVerdict::Failed)
        }
    }
}
