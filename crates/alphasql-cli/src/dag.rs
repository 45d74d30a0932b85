//! `alphadag`: discovers script files, extracts identifiers, and emits the
//! file-level dependency DAG (spec.md §6).

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use alphasql_core::extractor::{self, ExtractionWarning};
use alphasql_core::graph::{self, GraphOptions};

/// Builds the dependency DAG for a pipeline's SQL scripts.
#[derive(Parser, Debug)]
#[command(name = "alphadag")]
#[command(about = "Build a file-level dependency DAG from a BigQuery SQL pipeline")]
#[command(version)]
pub struct Args {
    /// Directories or files to scan for `.sql`/`.bq` scripts.
    #[arg(value_name = "PATHS", required = true)]
    pub paths: Vec<PathBuf>,

    /// DAG destination (default: stdout).
    #[arg(long = "output_path", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Destination for the external-required-tables list (default: stdout).
    #[arg(long = "external_required_tables_output_path", value_name = "FILE")]
    pub external_required_tables_output_path: Option<PathBuf>,

    /// Add table nodes to the DAG.
    #[arg(long = "with_tables")]
    pub with_tables: bool,

    /// Add function nodes to the DAG.
    #[arg(long = "with_functions")]
    pub with_functions: bool,

    /// Order writers ahead of all readers of a table, not just the creator.
    #[arg(long = "side_effect_first")]
    pub side_effect_first: bool,

    /// Upgrade cycle and idempotency warnings to fatal errors.
    #[arg(long = "warning_as_error")]
    pub warning_as_error: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Runs `alphadag`. Returns `Ok(true)` if the run should exit with status 1
/// (a strict-mode warning was escalated), `Ok(false)` on a clean run.
pub fn run(args: &Args) -> Result<bool> {
    let options = GraphOptions {
        with_tables: args.with_tables,
        with_functions: args.with_functions,
        side_effect_first: args.side_effect_first,
        warning_as_error: args.warning_as_error,
    };

    let files = alphasql_core::discover(&args.paths).context("failed to discover input files")?;

    let mut had_strict_failure = false;
    let mut per_file = Vec::with_capacity(files.len());
    for path in &files {
        println!("Reading {}", path.display());
        tracing::debug!(file = %path.display(), "extracting identifiers");
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let nodes = alphasql_core::parse_script(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let result = extractor::extract(&nodes).with_context(|| path.display().to_string())?;
        for warning in &result.warnings {
            report_extraction_warning(warning, path, args.warning_as_error, &mut had_strict_failure);
        }
        per_file.push((path.clone(), result.info));
    }

    println!("Analyzing {} file(s)", per_file.len());
    tracing::info!(files = per_file.len(), "building dependency graph");
    let graph = graph::build(&per_file, &options)?;

    if let Some(cycle) = graph.find_cycle() {
        let message = format!("cycle detected: {} -> {}", cycle.from, cycle.to);
        if args.warning_as_error {
            eprintln!("ERROR: {message}");
            had_strict_failure = true;
        } else {
            eprintln!("WARNING: {message}");
        }
    }

    let dot = graph::render_dot(&graph);
    write_text_output(&args.output_path, &dot)?;

    let external = if graph.external_required_tables.is_empty() {
        String::new()
    } else {
        graph
            .external_required_tables
            .iter()
            .map(|q| q.display())
            .collect::<Vec<_>>()
            .join("\n")
    };
    write_external_required_tables(&args.external_required_tables_output_path, &external)?;

    Ok(had_strict_failure)
}

fn report_extraction_warning(
    warning: &ExtractionWarning,
    path: &std::path::Path,
    warning_as_error: bool,
    had_strict_failure: &mut bool,
) {
    let ExtractionWarning::NotIdempotent { table } = warning;
    let message = format!(
        "{}: `{}` is written but not created in this script; re-running is not idempotent",
        path.display(),
        table.display()
    );
    if warning_as_error {
        eprintln!("ERROR: {message}");
        *had_strict_failure = true;
    } else {
        eprintln!("WARNING: {message}");
    }
}

fn write_text_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display())),
        None => io::stdout()
            .write_all(content.as_bytes())
            .context("failed to write to stdout"),
    }
}

fn write_external_required_tables(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("EXTERNAL REQUIRED TABLES:");
            println!("{content}");
            Ok(())
        }
    }
}
