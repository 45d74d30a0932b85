//! `alphabeam`: after a successful catalog check, emits a scaffolded
//! `pipeline.rs` with one stage function per pipeline step (spec.md §4.5).

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use alphasql_core::catalog::{self, schema, Catalog};
use alphasql_core::extractor;
use alphasql_core::graph::parse_dot;
use alphasql_core::script::ScriptNode;
use alphasql_core::types::IdentifierInfo;

/// Emits a Rust scaffold with one stage per pipeline step, after verifying
/// the pipeline still type-checks.
#[derive(Parser, Debug)]
#[command(name = "alphabeam")]
#[command(about = "Scaffold a Rust pipeline runner from a checked BigQuery SQL DAG")]
#[command(version)]
pub struct Args {
    /// Path to a DAG file (Graphviz DOT) produced by `alphadag`.
    #[arg(value_name = "DAG")]
    pub dag_path: PathBuf,

    /// JSON schema file used to seed the catalog for the check pass.
    #[arg(long = "json_schema_path", value_name = "FILE")]
    pub json_schema_path: Option<PathBuf>,

    /// Destination for the generated scaffold (default: `pipeline.rs`).
    #[arg(long = "output_path", value_name = "FILE", default_value = "pipeline.rs")]
    pub output_path: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub fn run(args: &Args) -> anyhow::Result<()> {
    println!("Reading {}", args.dag_path.display());
    let dag_text = fs::read_to_string(&args.dag_path)
        .with_context(|| format!("failed to read {}", args.dag_path.display()))?;
    let graph = parse_dot(&dag_text).context("failed to parse DAG")?;
    let order = graph.topological_order().context("DAG contains a cycle")?;

    let initial = match &args.json_schema_path {
        Some(path) => Catalog::seeded(schema::load(path)?),
        None => Catalog::new(),
    };

    let mut files: Vec<(PathBuf, Vec<ScriptNode>)> = Vec::with_capacity(order.len());
    let mut infos: Vec<(PathBuf, IdentifierInfo)> = Vec::with_capacity(order.len());
    for name in &order {
        let path = PathBuf::from(name);
        println!("Reading {}", path.display());
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let nodes = alphasql_core::parse_script(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let extracted = extractor::extract(&nodes)
            .with_context(|| format!("failed to extract {}", path.display()))?;
        infos.push((path.clone(), extracted.info));
        files.push((path, nodes));
    }

    println!("Analyzing {} file(s)", files.len());
    tracing::info!(files = files.len(), "checking pipeline before scaffolding");
    catalog::run(&files, initial).context("pipeline type-check failed")?;

    let scaffold = render_scaffold(&infos);
    fs::write(&args.output_path, scaffold)
        .with_context(|| format!("failed to write {}", args.output_path.display()))?;
    println!("Wrote {}", args.output_path.display());
    Ok(())
}

fn sanitize_stem(path: &std::path::Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "stage".to_string());
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

fn render_scaffold(infos: &[(PathBuf, IdentifierInfo)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// Generated scaffold: one stage per pipeline step.");
    let _ = writeln!(out, "// Fill in each stage with the code that actually runs its script.\n");

    let mut fn_names = Vec::with_capacity(infos.len());
    for (path, info) in infos {
        let fn_name = format!("run_{}", sanitize_stem(path));
        let _ = writeln!(out, "/// Source: `{}`", path.display());
        if !info.tables.created.is_empty() {
            let created: Vec<String> = info.tables.created.iter().map(|q| q.display()).collect();
            let _ = writeln!(out, "/// Creates: {}", created.join(", "));
        }
        if !info.tables.referenced.is_empty() {
            let referenced: Vec<String> =
                info.tables.referenced.iter().map(|q| q.display()).collect();
            let _ = writeln!(out, "/// Reads: {}", referenced.join(", "));
        }
        let _ = writeln!(out, "fn {fn_name}() -> Result<(), Box<dyn std::error::Error>> {{");
        let _ = writeln!(out, "    todo!(\"run {}\")", path.display());
        let _ = writeln!(out, "}}\n");
        fn_names.push(fn_name);
    }

    let _ = writeln!(out, "fn main() -> Result<(), Box<dyn std::error::Error>> {{");
    for fn_name in &fn_names {
        let _ = writeln!(out, "    {fn_name}()?;");
    }
    let _ = writeln!(out, "    Ok(())");
    let _ = writeln!(out, "}}");

    out
}
