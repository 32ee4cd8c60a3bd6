mod cli;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use investicat_core::{IngestOutput, IngestPipeline, PipelineConfig, RelationType};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.no_ai)?;
    tracing::debug!(files = cli.files.len(), ai = config.ai.enabled, "starting extraction");
    let pipeline = Arc::new(IngestPipeline::from_config(config)?);

    if let [path] = cli.files.as_slice() {
        run_single(&pipeline, path, cli.output.as_deref(), cli.quiet).await
    } else {
        run_batch(pipeline, cli.files, cli.output.as_deref(), cli.quiet).await
    }
}

fn load_config(path: Option<&Path>, no_ai: bool) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => {
            let mut config = PipelineConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => PipelineConfig::from_env()?,
    };

    if no_ai {
        config.ai.enabled = false;
    }
    config.validate()?;
    Ok(config)
}

async fn run_single(
    pipeline: &IngestPipeline,
    path: &Path,
    output: Option<&Path>,
    quiet: bool,
) -> Result<ExitCode> {
    let result = match pipeline.ingest_file(path).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed: {}: {e}", path.display());
            return Ok(ExitCode::FAILURE);
        }
    };

    let json = result.graph.to_json_pretty()?;
    match output {
        Some(out) => {
            std::fs::write(out, json)
                .with_context(|| format!("failed to write {}", out.display()))?;
        }
        None => println!("{json}"),
    }

    if !quiet {
        print_summary(&result);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_batch(
    pipeline: Arc<IngestPipeline>,
    paths: Vec<PathBuf>,
    output: Option<&Path>,
    quiet: bool,
) -> Result<ExitCode> {
    let batch = pipeline.ingest_files(paths).await;

    match output {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let mut taken = HashSet::new();
            for result in &batch.successful {
                let dest = dir.join(output_name(&result.report.filename, &mut taken));
                std::fs::write(&dest, result.graph.to_json_pretty()?)
                    .with_context(|| format!("failed to write {}", dest.display()))?;
            }
        }
        None => {
            let graphs: Vec<_> = batch.successful.iter().map(|r| &r.graph).collect();
            println!("{}", serde_json::to_string_pretty(&graphs)?);
        }
    }

    if !quiet {
        for result in &batch.successful {
            print_summary(result);
        }
    }
    for (path, error) in &batch.failed {
        eprintln!("Failed: {path}: {error}");
    }
    eprintln!(
        "{} succeeded, {} failed, {} events",
        batch.success_count(),
        batch.failure_count(),
        batch.total_events()
    );

    Ok(if batch.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// `<filename>.json`, or `<filename>.<n>.json` when an earlier document in
/// the batch already claimed that name.
fn output_name(filename: &str, taken: &mut HashSet<String>) -> String {
    let mut name = format!("{filename}.json");
    let mut n = 2;
    while !taken.insert(name.clone()) {
        name = format!("{filename}.{n}.json");
        n += 1;
    }
    name
}

fn print_summary(result: &IngestOutput) {
    let report = &result.report;
    let stats = &report.stats;

    eprintln!("{} ({} extraction)", report.filename, report.strategy);
    if let Some(reason) = &report.fallback_reason {
        eprintln!("  AI unavailable: {reason}");
    }
    eprintln!(
        "  Nodes: {} events, {} dates, {} locations, {} entities",
        stats.events, stats.dates, stats.locations, stats.entities
    );
    let relationships: Vec<String> = RelationType::ALL
        .iter()
        .map(|rt| format!("{rt}={}", stats.count(*rt)))
        .collect();
    eprintln!("  Relationships: {}", relationships.join(", "));
}
