//! Folds per-file extraction results into a file-level dependency DAG.
//!
//! Vertices are files by default; `with_tables`/`with_functions` add table
//! and function nodes to the same graph. Built on `petgraph::DiGraph`, with
//! a `name -> NodeIndex` side table for first-seen-wins deduplication (the
//! `add_if_absent` pattern used for execution graphs elsewhere in the
//! corpus).

mod dot;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::EngineError;
use crate::types::{CanonicalName, IdentifierInfo, QualifiedName};

pub use dot::{parse_dot, render_dot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexKind {
    Query,
    Table,
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphVertex {
    pub name: String,
    pub kind: VertexKind,
}

/// Edge policy + diagnostic options from `alphadag`'s flags (spec.md §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphOptions {
    pub with_tables: bool,
    pub with_functions: bool,
    pub side_effect_first: bool,
    pub warning_as_error: bool,
}

#[derive(Debug, Default)]
struct EntityQueries {
    create: Option<PathBuf>,
    inserts: Vec<PathBuf>,
    updates: Vec<PathBuf>,
    others: Vec<PathBuf>,
}

/// The built dependency DAG plus everything derived from it.
#[derive(Debug)]
pub struct DependencyGraph {
    pub inner: DiGraph<GraphVertex, ()>,
    index_of: HashMap<String, NodeIndex>,
    pub external_required_tables: Vec<QualifiedName>,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub from: String,
    pub to: String,
}

impl DependencyGraph {
    fn vertex_index(&mut self, name: String, kind: VertexKind) -> NodeIndex {
        *self
            .index_of
            .entry(name.clone())
            .or_insert_with(|| self.inner.add_node(GraphVertex { name, kind }))
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        if from == to {
            return;
        }
        if self.inner.find_edge(from, to).is_none() {
            self.inner.add_edge(from, to, ());
        }
    }

    /// Depth-first cycle detection that reports the back edge's endpoints,
    /// unlike `petgraph::algo::toposort`'s `Cycle` error which names only
    /// one node.
    pub fn find_cycle(&self) -> Option<CycleReport> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let mut color = vec![Color::White; self.inner.node_count()];
        let mut stack: Vec<NodeIndex> = Vec::new();

        fn visit(
            node: NodeIndex,
            graph: &DiGraph<GraphVertex, ()>,
            color: &mut Vec<Color>,
            stack: &mut Vec<NodeIndex>,
        ) -> Option<(NodeIndex, NodeIndex)> {
            color[node.index()] = Color::Gray;
            stack.push(node);
            for neighbor in graph.neighbors_directed(node, Direction::Outgoing) {
                match color[neighbor.index()] {
                    Color::White => {
                        if let Some(cycle) = visit(neighbor, graph, color, stack) {
                            return Some(cycle);
                        }
                    }
                    Color::Gray => return Some((node, neighbor)),
                    Color::Black => {}
                }
            }
            stack.pop();
            color[node.index()] = Color::Black;
            None
        }

        for start in self.inner.node_indices() {
            if color[start.index()] == Color::White {
                if let Some((from, to)) = visit(start, &self.inner, &mut color, &mut stack) {
                    return Some(CycleReport {
                        from: self.inner[from].name.clone(),
                        to: self.inner[to].name.clone(),
                    });
                }
            }
        }
        None
    }

    /// Topological order of `Query` vertices (files), ties broken by
    /// insertion order per spec.md §4.2.
    pub fn topological_order(&self) -> Result<Vec<String>, EngineError> {
        let sorted = toposort(&self.inner, None).map_err(|cycle| {
            let node = cycle.node_id();
            EngineError::CycleDetected(self.inner[node].name.clone())
        })?;
        Ok(sorted
            .into_iter()
            .filter(|idx| self.inner[*idx].kind == VertexKind::Query)
            .map(|idx| self.inner[idx].name.clone())
            .collect())
    }
}

/// Builds the dependency DAG from per-file extraction results, per spec.md
/// §4.2's populating rules and edge policies.
pub fn build(
    files: &[(PathBuf, IdentifierInfo)],
    options: &GraphOptions,
) -> Result<DependencyGraph, EngineError> {
    let mut tables: HashMap<CanonicalName, (QualifiedName, EntityQueries)> = HashMap::new();
    let mut functions: HashMap<CanonicalName, (QualifiedName, EntityQueries)> = HashMap::new();

    for (path, info) in files {
        for name in &info.tables.created {
            let entry = tables
                .entry(name.canonical())
                .or_insert_with(|| (name.clone(), EntityQueries::default()));
            if let Some(existing) = &entry.1.create {
                if existing != path {
                    return Err(EngineError::DuplicateDefinition {
                        name: name.display(),
                        first: existing.clone(),
                        second: path.clone(),
                    });
                }
            } else {
                entry.1.create = Some(path.clone());
            }
        }
        for name in &info.tables.dropped {
            tables
                .entry(name.canonical())
                .or_insert_with(|| (name.clone(), EntityQueries::default()))
                .1
                .others
                .push(path.clone());
        }
        for name in &info.tables.referenced {
            let entry = tables
                .entry(name.canonical())
                .or_insert_with(|| (name.clone(), EntityQueries::default()));
            if entry.1.create.as_deref() != Some(path.as_path()) {
                entry.1.others.push(path.clone());
            }
        }
        for name in &info.tables.inserted {
            tables
                .entry(name.canonical())
                .or_insert_with(|| (name.clone(), EntityQueries::default()))
                .1
                .inserts
                .push(path.clone());
        }
        for name in &info.tables.updated {
            tables
                .entry(name.canonical())
                .or_insert_with(|| (name.clone(), EntityQueries::default()))
                .1
                .updates
                .push(path.clone());
        }

        for name in &info.functions.defined {
            let entry = functions
                .entry(name.canonical())
                .or_insert_with(|| (name.clone(), EntityQueries::default()));
            if let Some(existing) = &entry.1.create {
                if existing != path {
                    return Err(EngineError::DuplicateDefinition {
                        name: name.display(),
                        first: existing.clone(),
                        second: path.clone(),
                    });
                }
            } else {
                entry.1.create = Some(path.clone());
            }
        }
        for name in info.functions.called.iter().chain(info.functions.dropped.iter()) {
            functions
                .entry(name.canonical())
                .or_insert_with(|| (name.clone(), EntityQueries::default()))
                .1
                .others
                .push(path.clone());
        }
    }

    let mut graph = DependencyGraph {
        inner: DiGraph::new(),
        index_of: HashMap::new(),
        external_required_tables: Vec::new(),
    };

    // Insertion order of file vertices is seeded up front so ties among
    // files with no edges between them still resolve deterministically.
    for (path, _) in files {
        graph.vertex_index(display_path(path), VertexKind::Query);
    }

    let mut external_required_tables = Vec::new();
    for (name, queries) in tables.values() {
        if queries.create.is_none() {
            external_required_tables.push(name.clone());
        }
        apply_entity_edges(&mut graph, queries, options, true);
        if options.with_tables {
            add_typed_node(&mut graph, name, VertexKind::Table, queries, options);
        }
    }
    for (name, queries) in functions.values() {
        apply_entity_edges(&mut graph, queries, options, false);
        // Built-in functions (`SUM`, `CONCAT`, ...) have no `create` file and
        // never get a `Function` vertex of their own, even under
        // `--with_functions` (original_source/alphasql/alphadag.cc:137,
        // "Skip default functions").
        if options.with_functions && queries.create.is_some() {
            add_typed_node(&mut graph, name, VertexKind::Function, queries, options);
        }
    }
    external_required_tables.sort();
    graph.external_required_tables = external_required_tables;

    Ok(graph)
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

/// Default and `side_effect_first` edge policies operate directly on file
/// vertices; `with_tables`/`with_functions` additionally route through a
/// type node (handled by `add_typed_node`), per spec.md §4.2's table.
fn apply_entity_edges(
    graph: &mut DependencyGraph,
    queries: &EntityQueries,
    options: &GraphOptions,
    is_table: bool,
) {
    let routed_through_type_node = if is_table {
        options.with_tables
    } else {
        // A function only gets its own vertex (and thus skips these direct
        // edges) when it has a `create` file; built-ins never do, per
        // `add_typed_node`'s caller.
        options.with_functions && queries.create.is_some()
    };
    if routed_through_type_node {
        return;
    }

    let creator = queries.create.as_ref();

    if options.side_effect_first {
        // Writer-to-reader edges never need a creator vertex, so they still
        // apply to externally-required entities (no `create` file at all).
        for writer_group in [&queries.inserts, &queries.updates] {
            for writer in writer_group {
                if Some(writer) == creator {
                    continue;
                }
                let writer_idx = graph.vertex_index(display_path(writer), VertexKind::Query);
                for other in &queries.others {
                    let other_idx = graph.vertex_index(display_path(other), VertexKind::Query);
                    graph.add_edge(writer_idx, other_idx);
                }
            }
        }
        if let Some(creator) = creator {
            let creator_idx = graph.vertex_index(display_path(creator), VertexKind::Query);
            for writer_group in [&queries.inserts, &queries.updates] {
                for writer in writer_group {
                    if writer == creator {
                        continue;
                    }
                    let writer_idx = graph.vertex_index(display_path(writer), VertexKind::Query);
                    graph.add_edge(creator_idx, writer_idx);
                }
            }
            for other in &queries.others {
                let other_idx = graph.vertex_index(display_path(other), VertexKind::Query);
                graph.add_edge(creator_idx, other_idx);
            }
        }
    } else if let Some(creator) = creator {
        let creator_idx = graph.vertex_index(display_path(creator), VertexKind::Query);
        for other in &queries.others {
            let other_idx = graph.vertex_index(display_path(other), VertexKind::Query);
            graph.add_edge(creator_idx, other_idx);
        }
        for group in [&queries.inserts, &queries.updates] {
            for writer in group {
                let writer_idx = graph.vertex_index(display_path(writer), VertexKind::Query);
                graph.add_edge(creator_idx, writer_idx);
            }
        }
    }
}

fn add_typed_node(
    graph: &mut DependencyGraph,
    name: &QualifiedName,
    kind: VertexKind,
    queries: &EntityQueries,
    options: &GraphOptions,
) {
    let type_idx = graph.vertex_index(name.display(), kind);

    if let Some(creator) = &queries.create {
        let creator_idx = graph.vertex_index(display_path(creator), VertexKind::Query);
        graph.add_edge(creator_idx, type_idx);
    }

    let mut readers: Vec<&PathBuf> = queries.others.iter().collect();
    if kind != VertexKind::Table || !options.side_effect_first {
        readers.extend(queries.inserts.iter());
        readers.extend(queries.updates.iter());
    }
    for reader in readers {
        let reader_idx = graph.vertex_index(display_path(reader), VertexKind::Query);
        graph.add_edge(type_idx, reader_idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_with(created: &[&str], referenced: &[&str]) -> IdentifierInfo {
        let mut info = IdentifierInfo::default();
        for c in created {
            info.tables.created.insert(QualifiedName::single(*c));
        }
        for r in referenced {
            info.tables.referenced.insert(QualifiedName::single(*r));
        }
        info
    }

    #[test]
    fn linear_pipeline_orders_creator_before_reader() {
        let files = vec![
            (PathBuf::from("a.sql"), info_with(&["a"], &[])),
            (PathBuf::from("b.sql"), info_with(&["b"], &["a"])),
        ];
        let graph = build(&files, &GraphOptions::default()).unwrap();
        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec!["a.sql".to_string(), "b.sql".to_string()]);
        assert!(graph.external_required_tables.is_empty());
    }

    #[test]
    fn duplicate_create_is_an_error() {
        let files = vec![
            (PathBuf::from("a.sql"), info_with(&["t"], &[])),
            (PathBuf::from("b.sql"), info_with(&["t"], &[])),
        ];
        let err = build(&files, &GraphOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateDefinition { .. }));
    }

    #[test]
    fn cycle_is_detected() {
        let files = vec![
            (PathBuf::from("a.sql"), info_with(&["a"], &["b"])),
            (PathBuf::from("b.sql"), info_with(&["b"], &["a"])),
        ];
        let graph = build(&files, &GraphOptions::default()).unwrap();
        assert!(graph.find_cycle().is_some());
        assert!(graph.topological_order().is_err());
    }

    #[test]
    fn external_dependency_has_no_creator() {
        let files = vec![(PathBuf::from("only.sql"), info_with(&[], &["ext.raw"]))];
        let graph = build(&files, &GraphOptions::default()).unwrap();
        assert_eq!(
            graph.external_required_tables,
            vec![QualifiedName::single("ext.raw")]
        );
    }

    #[test]
    fn side_effect_first_orders_writer_before_reader_even_without_a_creator() {
        let mut reader = IdentifierInfo::default();
        reader.tables.referenced.insert(QualifiedName::single("ext"));
        let mut writer = IdentifierInfo::default();
        writer.tables.inserted.insert(QualifiedName::single("ext"));

        // File order puts the reader first, so only a real writer-before-reader
        // edge (not vertex insertion order) can put "w.sql" ahead of "r.sql".
        let files = vec![(PathBuf::from("r.sql"), reader), (PathBuf::from("w.sql"), writer)];
        let options = GraphOptions {
            side_effect_first: true,
            ..GraphOptions::default()
        };
        let graph = build(&files, &options).unwrap();
        assert_eq!(
            graph.external_required_tables,
            vec![QualifiedName::single("ext")]
        );
        assert_eq!(
            graph.topological_order().unwrap(),
            vec!["w.sql".to_string(), "r.sql".to_string()]
        );
    }

    #[test]
    fn with_functions_skips_vertices_for_built_in_functions() {
        let mut info = IdentifierInfo::default();
        info.functions.called.insert(QualifiedName::single("SUM"));
        let files = vec![(PathBuf::from("q.sql"), info)];
        let options = GraphOptions {
            with_functions: true,
            ..GraphOptions::default()
        };
        let graph = build(&files, &options).unwrap();
        // Only the file vertex exists; "SUM" has no `create`, so it never gets
        // its own Function vertex even under --with_functions.
        assert_eq!(graph.inner.node_count(), 1);
    }
}
