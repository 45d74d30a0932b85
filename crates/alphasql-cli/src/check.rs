//! `alphacheck`: replays a DAG's scripts against a catalog, seeded
//! optionally from a JSON schema (spec.md §6).

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use alphasql_core::catalog::{self, schema, Catalog};
use alphasql_core::graph::parse_dot;
use alphasql_core::script::ScriptNode;

/// Type-checks a pipeline's scripts against an evolving catalog.
#[derive(Parser, Debug)]
#[command(name = "alphacheck")]
#[command(about = "Replay a BigQuery SQL pipeline's scripts against a catalog")]
#[command(version)]
pub struct Args {
    /// Path to a DAG file (Graphviz DOT) produced by `alphadag`.
    #[arg(value_name = "DAG")]
    pub dag_path: PathBuf,

    /// JSON schema file used to seed the catalog.
    #[arg(long = "json_schema_path", value_name = "FILE")]
    pub json_schema_path: Option<PathBuf>,

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
        Some(path) => {
            println!("Reading {}", path.display());
            Catalog::seeded(schema::load(path)?)
        }
        None => Catalog::new(),
    };

    let mut files: Vec<(PathBuf, Vec<ScriptNode>)> = Vec::with_capacity(order.len());
    for name in &order {
        let path = PathBuf::from(name);
        println!("Reading {}", path.display());
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let nodes = alphasql_core::parse_script(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        files.push((path, nodes));
    }

    println!("Analyzing {} file(s)", files.len());
    tracing::info!(files = files.len(), "replaying pipeline against catalog");
    let final_catalog = catalog::run(&files, initial).context("pipeline type-check failed")?;

    println!(
        "OK: catalog has {} table(s)",
        final_catalog.sorted_table_names().len()
    );
    Ok(())
}
