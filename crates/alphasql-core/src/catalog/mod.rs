//! Replays a pipeline's scripts in topological order against a shared
//! catalog, per spec.md §4.3. The single owning map keyed by lowercase
//! name (rather than the source system's borrowed/owned pointer split) is
//! the redesign spec.md §9's DESIGN NOTES calls for.

mod analyzer;
pub mod schema;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{AnalyzerError, EngineError};
use crate::script::ScriptNode;
use crate::types::{CanonicalName, FunctionSignature, ProcedureBody, QualifiedName, TableSchema};

use analyzer::{Analysis, Effect};

/// The pipeline's accumulated table/function/procedure definitions.
/// `drop` removes an entry unconditionally; there is no separate "owned vs.
/// borrowed" distinction (spec.md §9).
#[derive(Debug, Default)]
pub struct Catalog {
    tables: HashMap<CanonicalName, TableSchema>,
    functions: HashMap<CanonicalName, FunctionSignature>,
    procedures: HashMap<CanonicalName, ProcedureBody>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the catalog from a JSON schema's table map (spec.md §4.4).
    pub fn seeded(tables: HashMap<String, TableSchema>) -> Self {
        let mut catalog = Self::new();
        for (name, schema) in tables {
            catalog.tables.insert(CanonicalName::from(name.as_str()), schema);
        }
        catalog
    }

    pub fn table(&self, name: &CanonicalName) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn function(&self, name: &CanonicalName) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }

    pub fn procedure(&self, name: &CanonicalName) -> Option<&ProcedureBody> {
        self.procedures.get(name)
    }

    /// Table names in lexicographic order, for the catalog dump printed
    /// alongside a fatal `AnalyzerError` (spec.md §4.3 "Determinism").
    pub fn sorted_table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().map(|n| n.as_str().to_string()).collect();
        names.sort();
        names
    }
}

/// Runs `CatalogDriver` over every file in topological order, mutating and
/// returning the final catalog, or the first `AnalyzerError` annotated with
/// its source file.
pub fn run(
    files: &[(PathBuf, Vec<ScriptNode>)],
    mut catalog: Catalog,
) -> Result<Catalog, EngineError> {
    for (path, nodes) in files {
        #[cfg(feature = "tracing")]
        tracing::info!(file = %path.display(), "replaying script against catalog");

        let mut temp_tables: HashSet<CanonicalName> = HashSet::new();
        let mut temp_functions: HashSet<CanonicalName> = HashSet::new();
        for node in nodes {
            process_node(node, &mut catalog, path, &mut temp_tables, &mut temp_functions)?;
        }
        for name in temp_tables.drain() {
            catalog.tables.remove(&name);
        }
        for name in temp_functions.drain() {
            catalog.functions.remove(&name);
        }
    }
    Ok(catalog)
}

fn process_node(
    node: &ScriptNode,
    catalog: &mut Catalog,
    path: &Path,
    temp_tables: &mut HashSet<CanonicalName>,
    temp_functions: &mut HashSet<CanonicalName>,
) -> Result<(), EngineError> {
    match node {
        ScriptNode::Stmt(stmt) => process_statement(stmt, catalog, path, temp_tables, temp_functions),
        ScriptNode::Begin { body, exception } => {
            for n in body {
                process_node(n, catalog, path, temp_tables, temp_functions)?;
            }
            if let Some(handler) = exception {
                for n in handler {
                    process_node(n, catalog, path, temp_tables, temp_functions)?;
                }
            }
            Ok(())
        }
        ScriptNode::CreateProcedure { header, is_temporary, body, exception } => {
            register_procedure(header, *is_temporary, body, exception, catalog, temp_functions)
        }
    }
}

fn register_procedure(
    header: &str,
    is_temporary: bool,
    body: &[ScriptNode],
    exception: &Option<Vec<ScriptNode>>,
    catalog: &mut Catalog,
    temp_functions: &mut HashSet<CanonicalName>,
) -> Result<(), EngineError> {
    let Some((name, params)) = parse_procedure_signature(header) else {
        return Ok(());
    };
    let procedure = ProcedureBody {
        name: name.clone(),
        params,
        sql_text: header.to_string(),
        body: body.to_vec(),
    };
    catalog.procedures.insert(name.canonical(), procedure);
    if is_temporary {
        temp_functions.insert(name.canonical());
    }
    let _ = exception;
    Ok(())
}

/// `header` is `CREATE [OR REPLACE] [TEMP] PROCEDURE name(arg1 TYPE1, ...)`.
/// Splits the parenthesized argument list on top-level commas (tracking
/// nesting for `STRUCT<...>`/`ARRAY<...>` argument types) and keeps each
/// argument's leading identifier.
fn parse_procedure_signature(header: &str) -> Option<(QualifiedName, Vec<String>)> {
    let lower = header.to_lowercase();
    let keyword = "procedure";
    let idx = lower.find(keyword)?;
    let rest = &header[idx + keyword.len()..];
    let rest_trimmed_start = rest.trim_start();
    let leading_ws = rest.len() - rest_trimmed_start.len();
    let name_end = rest_trimmed_start.find(|c: char| c == '(' || c.is_whitespace())?;
    let name = rest_trimmed_start[..name_end].trim();
    if name.is_empty() {
        return None;
    }
    let qualified = QualifiedName::new(name.split('.').map(|s| s.to_string()).collect());

    let after_name = &rest[leading_ws + name_end..];
    let params = after_name
        .find('(')
        .map(|open| split_top_level_args(&after_name[open + 1..]))
        .unwrap_or_default();

    Some((qualified, params))
}

fn split_top_level_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0usize;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'<' => depth += 1,
            b')' if depth == 0 => {
                push_arg_name(&text[start..i], &mut args);
                return args;
            }
            b')' => depth -= 1,
            b'>' => depth = (depth - 1).max(0),
            b',' if depth == 0 => {
                push_arg_name(&text[start..i], &mut args);
                start = i + 1;
            }
            _ => {}
        }
    }
    push_arg_name(&text[start..], &mut args);
    args
}

fn push_arg_name(segment: &str, args: &mut Vec<String>) {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return;
    }
    let name_end = trimmed
        .find(|c: char| c.is_whitespace())
        .unwrap_or(trimmed.len());
    args.push(trimmed[..name_end].to_string());
}

fn process_statement(
    stmt: &sqlparser::ast::Statement,
    catalog: &mut Catalog,
    path: &Path,
    temp_tables: &mut HashSet<CanonicalName>,
    temp_functions: &mut HashSet<CanonicalName>,
) -> Result<(), EngineError> {
    match analyzer::resolve_statement(stmt, catalog) {
        Ok(Analysis::Unsupported(kind)) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(file = %path.display(), statement = %kind, "statement not supported");
            #[cfg(not(feature = "tracing"))]
            let _ = kind;
            Ok(())
        }
        Ok(Analysis::Applied(effect)) => apply_effect(effect, catalog, path, temp_tables, temp_functions),
        Err(source) => Err(EngineError::Analyzer { file: path.to_path_buf(), source: annotate(source, catalog) }),
    }
}

/// Attaches the sorted catalog dump to an otherwise-plain analyzer error's
/// message, per spec.md §4.3's "abort ... printing ... the current catalog
/// for debugging".
fn annotate(err: AnalyzerError, catalog: &Catalog) -> AnalyzerError {
    let dump = catalog.sorted_table_names().join(", ");
    AnalyzerError::Other(format!("{err} (catalog tables: [{dump}])"))
}

fn apply_effect(
    effect: Effect,
    catalog: &mut Catalog,
    path: &Path,
    temp_tables: &mut HashSet<CanonicalName>,
    temp_functions: &mut HashSet<CanonicalName>,
) -> Result<(), EngineError> {
    match effect {
        Effect::CreateTable { name, schema, temporary } => {
            catalog.tables.insert(name.canonical(), schema);
            if temporary {
                temp_tables.insert(name.canonical());
            }
            Ok(())
        }
        Effect::CreateFunction { name, signature, temporary } => {
            catalog.functions.insert(name.canonical(), signature);
            if temporary {
                temp_functions.insert(name.canonical());
            }
            Ok(())
        }
        Effect::Call { name } => call_procedure(&name, catalog, path, temp_tables, temp_functions),
        Effect::DropTable { name, if_exists } => {
            let existed = catalog.tables.remove(&name.canonical()).is_some();
            if !existed && !if_exists {
                return Err(EngineError::Analyzer {
                    file: path.to_path_buf(),
                    source: annotate(AnalyzerError::TableDoesNotExist(name.display()), catalog),
                });
            }
            Ok(())
        }
        Effect::NoOp => Ok(()),
    }
}

fn call_procedure(
    name: &QualifiedName,
    catalog: &mut Catalog,
    path: &Path,
    temp_tables: &mut HashSet<CanonicalName>,
    temp_functions: &mut HashSet<CanonicalName>,
) -> Result<(), EngineError> {
    let Some(procedure) = catalog.procedures.get(&name.canonical()) else {
        return Err(EngineError::Analyzer {
            file: path.to_path_buf(),
            source: annotate(AnalyzerError::UnknownFunction(name.display()), catalog),
        });
    };
    let body = procedure.body.clone();
    for node in &body {
        process_node(node, catalog, path, temp_tables, temp_functions)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_script;

    fn run_sql(sql: &str, catalog: Catalog) -> Result<Catalog, EngineError> {
        let nodes = parse_script(sql).expect("should parse");
        run(&[(PathBuf::from("a.sql"), nodes)], catalog)
    }

    #[test]
    fn create_table_as_select_with_explicit_columns() {
        let catalog = run_sql("CREATE TABLE t (x INT64, y STRING);", Catalog::new()).unwrap();
        let schema = catalog.table(&CanonicalName::from("t")).unwrap();
        assert_eq!(schema.columns.len(), 2);
    }

    #[test]
    fn ctas_propagates_source_column_types() {
        let sql = "CREATE TABLE a (x INT64); CREATE TABLE b AS SELECT x FROM a;";
        let catalog = run_sql(sql, Catalog::new()).unwrap();
        let b = catalog.table(&CanonicalName::from("b")).unwrap();
        assert_eq!(b.column("x").unwrap().ty, crate::types::ColumnType::Int64);
    }

    #[test]
    fn drop_table_removes_entry() {
        let sql = "CREATE TABLE t (x INT64); DROP TABLE t;";
        let catalog = run_sql(sql, Catalog::new()).unwrap();
        assert!(catalog.table(&CanonicalName::from("t")).is_none());
    }

    #[test]
    fn drop_missing_table_without_if_exists_is_an_error() {
        let err = run_sql("DROP TABLE missing;", Catalog::new()).unwrap_err();
        assert!(matches!(err, EngineError::Analyzer { .. }));
    }

    #[test]
    fn temp_table_does_not_survive_end_of_file() {
        let sql = "CREATE TEMP TABLE t AS SELECT 1;";
        let catalog = run_sql(sql, Catalog::new()).unwrap();
        assert!(catalog.table(&CanonicalName::from("t")).is_none());
    }

    #[test]
    fn call_hoists_procedure_artifact_into_catalog() {
        let sql = "CREATE PROCEDURE p() BEGIN CREATE TABLE art AS SELECT 1; END; CALL p();";
        let catalog = run_sql(sql, Catalog::new()).unwrap();
        assert!(catalog.table(&CanonicalName::from("art")).is_some());
    }
}
