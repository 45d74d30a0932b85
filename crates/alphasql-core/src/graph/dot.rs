//! Graphviz DOT read/write for the dependency DAG, per spec.md §6's
//! per-vertex attribute contract: `label`, `type` ∈ {`query`, `table`,
//! `function`}, optional `shape` (`box` for tables, `cds` for functions).
//!
//! Writing uses `petgraph::dot::Dot::with_attr_getters`, the same pattern
//! the corpus's execution-graph DOT export uses. Reading is a small
//! line-oriented parser rather than a full grammar, since the only DOT this
//! tool ever reads back is its own `render_dot` output.

use std::collections::HashMap;
use std::sync::OnceLock;

use petgraph::dot::{Config, Dot};
use petgraph::graph::DiGraph;
use regex::Regex;

use crate::error::EngineError;

use super::{DependencyGraph, VertexKind};

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn shape_attr(kind: VertexKind) -> Option<&'static str> {
    match kind {
        VertexKind::Query => None,
        VertexKind::Table => Some("box"),
        VertexKind::Function => Some("cds"),
    }
}

fn kind_name(kind: VertexKind) -> &'static str {
    match kind {
        VertexKind::Query => "query",
        VertexKind::Table => "table",
        VertexKind::Function => "function",
    }
}

/// Renders the graph as DOT text with per-vertex `label`/`type`/`shape`
/// attributes. Vertex and edge order follow the underlying `DiGraph`'s
/// insertion order, which `build` seeds deterministically (spec.md §8,
/// property 5).
pub fn render_dot(graph: &DependencyGraph) -> String {
    let dot = Dot::with_attr_getters(
        &graph.inner,
        &[Config::EdgeNoLabel, Config::NodeNoLabel],
        &|_, _edge| String::new(),
        &|_, (_, vertex)| {
            let mut attrs = format!(
                "label = \"{}\" type = \"{}\"",
                escape(&vertex.name),
                kind_name(vertex.kind)
            );
            if let Some(shape) = shape_attr(vertex.kind) {
                attrs.push_str(&format!(" shape = {shape}"));
            }
            attrs
        },
    );
    format!("{dot:?}")
}

fn node_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+)\s*\[(.*)\]\s*;?\s*$").expect("valid regex"))
}

fn edge_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+)\s*->\s*(\d+)\s*(?:\[.*\])?\s*;?\s*$").expect("valid regex"))
}

fn attr_pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\w+)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|(\S+))"#).expect("valid regex")
    })
}

fn parse_attrs(body: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for caps in attr_pair_regex().captures_iter(body) {
        let key = caps.get(1).expect("group 1 always matches").as_str().to_string();
        let value = if let Some(quoted) = caps.get(2) {
            quoted.as_str().replace("\\\"", "\"").replace("\\\\", "\\")
        } else {
            caps.get(3).expect("alternation guarantees 2 or 3").as_str().to_string()
        };
        attrs.insert(key, value);
    }
    attrs
}

/// Reads a DAG file back, per spec.md §6: only vertices whose `type ==
/// "query"` are kept; edges touching any other vertex are ignored along
/// with the vertex itself.
pub fn parse_dot(text: &str) -> Result<DependencyGraph, EngineError> {
    // Preserves DOT-file order for determinism (spec.md §8, property 5);
    // `query_id_to_name` is the lookup used to resolve edge endpoints.
    let mut query_order: Vec<u32> = Vec::new();
    let mut query_id_to_name: HashMap<u32, String> = HashMap::new();
    let mut edges: Vec<(u32, u32)> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = node_line_regex().captures(line) {
            let id: u32 = caps[1].parse().map_err(|_| schema_error(line))?;
            let attrs = parse_attrs(&caps[2]);
            if attrs.get("type").map(String::as_str) == Some("query") {
                let label = attrs.get("label").cloned().unwrap_or_default();
                query_order.push(id);
                query_id_to_name.insert(id, label);
            }
            continue;
        }
        if let Some(caps) = edge_line_regex().captures(line) {
            let from: u32 = caps[1].parse().map_err(|_| schema_error(line))?;
            let to: u32 = caps[2].parse().map_err(|_| schema_error(line))?;
            edges.push((from, to));
        }
    }

    let mut graph = DependencyGraph {
        inner: DiGraph::new(),
        index_of: HashMap::new(),
        external_required_tables: Vec::new(),
    };

    for id in &query_order {
        let name = query_id_to_name[id].clone();
        graph.vertex_index(name, VertexKind::Query);
    }
    for (from, to) in edges {
        let (Some(from_name), Some(to_name)) =
            (query_id_to_name.get(&from), query_id_to_name.get(&to))
        else {
            continue;
        };
        let from_idx = graph.vertex_index(from_name.clone(), VertexKind::Query);
        let to_idx = graph.vertex_index(to_name.clone(), VertexKind::Query);
        graph.add_edge(from_idx, to_idx);
    }

    Ok(graph)
}

fn schema_error(line: &str) -> EngineError {
    EngineError::Schema {
        path: "<dag>".into(),
        message: format!("malformed DOT line: {line}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build, GraphOptions};
    use crate::types::{IdentifierInfo, QualifiedName};
    use std::path::PathBuf;

    #[test]
    fn render_then_parse_round_trips_query_vertices() {
        let mut a = IdentifierInfo::default();
        a.tables.created.insert(QualifiedName::single("A"));
        let mut b = IdentifierInfo::default();
        b.tables.referenced.insert(QualifiedName::single("A"));

        let files = vec![(PathBuf::from("a.sql"), a), (PathBuf::from("b.sql"), b)];
        let graph = build(&files, &GraphOptions::default()).unwrap();

        let text = render_dot(&graph);
        assert!(text.contains("type = \"query\""));

        let parsed = parse_dot(&text).unwrap();
        let order = parsed.topological_order().unwrap();
        assert_eq!(order, vec!["a.sql".to_string(), "b.sql".to_string()]);
    }

    #[test]
    fn parse_dot_ignores_non_query_vertices() {
        let text = r#"digraph {
    0 [ label = "a.sql" type = "query" ]
    1 [ label = "T" type = "table" shape = box ]
    0 -> 1 [ ]
}"#;
        let parsed = parse_dot(text).unwrap();
        assert_eq!(parsed.inner.node_count(), 1);
        assert_eq!(parsed.inner.edge_count(), 0);
    }
}
