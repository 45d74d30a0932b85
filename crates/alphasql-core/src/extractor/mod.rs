//! Walks one script's parse tree and classifies every table/function
//! reference it contains (`IdentifierInfo`).
//!
//! A tagged-sum traversal over [`crate::script::ScriptNode`] and
//! `sqlparser::ast::Statement`, not a double-dispatch visitor: `walk`
//! matches on node kind, with node-specific handlers as free functions and
//! default-recurse as the fallthrough arm.

mod references;

use std::collections::HashMap;

use sqlparser::ast::{
    Assignment, CreateTable, Delete, FromTable, Insert, MergeAction, Statement, TableFactor,
    TableWithJoins,
};

use crate::error::ParseError;
use crate::script::ScriptNode;
use crate::types::{CanonicalName, IdentifierInfo, QualifiedName};

/// Non-fatal finding surfaced alongside a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionWarning {
    /// `INSERT`/`UPDATE`/`MERGE` targets a table the script does not itself
    /// create — re-running the script is not idempotent (spec.md §4.1).
    NotIdempotent { table: QualifiedName },
}

/// Result of extracting one script, including any non-fatal findings.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub info: IdentifierInfo,
    pub warnings: Vec<ExtractionWarning>,
}

/// Script-local state threaded through the traversal; never exported.
#[derive(Debug, Default)]
struct ExtractionState {
    info: IdentifierInfo,
    warnings: Vec<ExtractionWarning>,
    temporary_tables: std::collections::HashSet<CanonicalName>,
    /// For each procedure defined in this script, the tables it creates.
    /// A later `CALL` hoists these into the caller's `tables.created`.
    procedure_artifacts: HashMap<CanonicalName, std::collections::BTreeSet<QualifiedName>>,
    inside_procedure: Option<QualifiedName>,
}

/// Extracts `IdentifierInfo` from an already-split script.
///
/// Never fails on unresolved identifiers — resolution is the catalog
/// phase's job. The only failure mode left to the caller is the parse
/// step that produced `nodes` in the first place.
pub fn extract(nodes: &[ScriptNode]) -> Result<ExtractionResult, ParseError> {
    let mut state = ExtractionState::default();
    for node in nodes {
        walk(node, &mut state);
    }

    let referenced = references::resolve(nodes);
    for name in referenced {
        if !state.temporary_tables.contains(&name.canonical()) {
            state.info.tables.referenced.insert(name);
        }
    }

    Ok(ExtractionResult {
        info: state.info,
        warnings: state.warnings,
    })
}

fn walk(node: &ScriptNode, state: &mut ExtractionState) {
    match node {
        ScriptNode::Stmt(stmt) => walk_statement(stmt, state),
        ScriptNode::Begin { body, exception } => {
            for n in body {
                walk(n, state);
            }
            if let Some(handler) = exception {
                for n in handler {
                    walk(n, state);
                }
            }
        }
        ScriptNode::CreateProcedure {
            header,
            is_temporary,
            body,
            exception,
        } => walk_create_procedure(header, *is_temporary, body, exception, state),
    }
}

fn walk_create_procedure(
    header: &str,
    is_temporary: bool,
    body: &[ScriptNode],
    exception: &Option<Vec<ScriptNode>>,
    state: &mut ExtractionState,
) {
    if is_temporary {
        for n in body {
            walk(n, state);
        }
        if let Some(handler) = exception {
            for n in handler {
                walk(n, state);
            }
        }
        return;
    }

    let Some(name) = parse_procedure_name(header) else {
        return;
    };
    state.info.functions.defined.insert(name.clone());
    state
        .procedure_artifacts
        .entry(name.canonical())
        .or_default();

    let previous = state.inside_procedure.replace(name);
    for n in body {
        walk(n, state);
    }
    if let Some(handler) = exception {
        for n in handler {
            walk(n, state);
        }
    }
    state.inside_procedure = previous;
}

/// `header` is the unparsed `CREATE [OR REPLACE] [TEMP] PROCEDURE name(...)`
/// text kept by the script splitter. Only the name is needed here.
fn parse_procedure_name(header: &str) -> Option<QualifiedName> {
    let lower = header.to_lowercase();
    let keyword = "procedure";
    let idx = lower.find(keyword)?;
    let rest = header[idx + keyword.len()..].trim_start();
    let name_end = rest.find(|c: char| c == '(' || c.is_whitespace())?;
    let name = rest[..name_end].trim();
    if name.is_empty() {
        return None;
    }
    Some(QualifiedName::new(
        name.split('.').map(|s| s.to_string()).collect(),
    ))
}

fn walk_statement(stmt: &Statement, state: &mut ExtractionState) {
    match stmt {
        Statement::Query(query) => {
            for name in references::function_calls_in_query(query) {
                state.info.functions.called.insert(name);
            }
        }
        Statement::CreateTable(create) => walk_create_table(create, state),
        Statement::CreateView { name, query, .. } => {
            // Treated like CTAS: a view binds a name later scripts depend on.
            record_created_table(QualifiedName::from_object_name(name), state);
            for n in references::function_calls_in_query(query) {
                state.info.functions.called.insert(n);
            }
        }
        Statement::Drop {
            object_type, names, ..
        } => walk_drop(*object_type, names, state),
        Statement::Insert(insert) => walk_insert(insert, state),
        Statement::Update {
            table,
            assignments,
            from,
            selection,
            ..
        } => walk_update(table, assignments, from, selection, state),
        Statement::Delete(delete) => walk_delete(delete, state),
        Statement::Merge {
            table,
            source,
            clauses,
            ..
        } => walk_merge(table, source, clauses, state),
        Statement::CreateFunction(create_fn) => walk_create_function(create_fn, state),
        Statement::DropFunction { func_desc, .. } => {
            for f in func_desc {
                state
                    .info
                    .functions
                    .dropped
                    .insert(QualifiedName::from_object_name(&f.name));
            }
        }
        Statement::Call(function) => walk_call(function, state),
        Statement::CreateSchema { .. } => {}
        _ => {
            for name in references::function_calls_in_statement(stmt) {
                state.info.functions.called.insert(name);
            }
        }
    }
}

fn walk_create_table(create: &CreateTable, state: &mut ExtractionState) {
    let name = QualifiedName::from_object_name(&create.name);
    if create.temporary {
        state.temporary_tables.insert(name.canonical());
    } else {
        record_created_table(name, state);
    }
    if let Some(query) = &create.query {
        for n in references::function_calls_in_query(query) {
            state.info.functions.called.insert(n);
        }
    }
}

fn record_created_table(name: QualifiedName, state: &mut ExtractionState) {
    if let Some(proc_name) = &state.inside_procedure {
        state
            .procedure_artifacts
            .entry(proc_name.canonical())
            .or_default()
            .insert(name);
    } else {
        state.info.tables.created.insert(name);
    }
}

fn walk_drop(
    object_type: sqlparser::ast::ObjectType,
    names: &[sqlparser::ast::ObjectName],
    state: &mut ExtractionState,
) {
    use sqlparser::ast::ObjectType;
    match object_type {
        ObjectType::Table => {
            for n in names {
                let q = QualifiedName::from_object_name(n);
                if !state.temporary_tables.contains(&q.canonical()) {
                    state.info.tables.dropped.insert(q);
                }
            }
        }
        ObjectType::View => {
            for n in names {
                let q = QualifiedName::from_object_name(n);
                if !state.temporary_tables.contains(&q.canonical()) {
                    state.info.tables.dropped.insert(q);
                }
            }
        }
        _ => {}
    }
}

fn target_name_from_table_with_joins(table: &TableWithJoins) -> Option<QualifiedName> {
    table_factor_name(&table.relation)
}

fn table_factor_name(factor: &TableFactor) -> Option<QualifiedName> {
    match factor {
        TableFactor::Table { name, .. } => Some(QualifiedName::from_object_name(name)),
        _ => None,
    }
}

fn walk_insert(insert: &Insert, state: &mut ExtractionState) {
    let object_name = match &insert.table {
        sqlparser::ast::TableObject::TableName(name) => name,
        sqlparser::ast::TableObject::TableFunction(_) => return,
    };
    let name = QualifiedName::from_object_name(object_name);
    if !state.temporary_tables.contains(&name.canonical()) {
        state.info.tables.inserted.insert(name.clone());
        if !state.info.tables.created.contains(&name) {
            state
                .warnings
                .push(ExtractionWarning::NotIdempotent { table: name });
        }
    }
    if let Some(source) = &insert.source {
        for n in references::function_calls_in_query(source) {
            state.info.functions.called.insert(n);
        }
    }
}

fn walk_update(
    table: &TableWithJoins,
    assignments: &[Assignment],
    from: &Option<sqlparser::ast::UpdateTableFromKind>,
    selection: &Option<sqlparser::ast::Expr>,
    state: &mut ExtractionState,
) {
    if let Some(name) = target_name_from_table_with_joins(table) {
        if !state.temporary_tables.contains(&name.canonical()) {
            state.info.tables.updated.insert(name.clone());
            if !state.info.tables.created.contains(&name) {
                state
                    .warnings
                    .push(ExtractionWarning::NotIdempotent { table: name });
            }
        }
    }
    for assignment in assignments {
        for n in references::function_calls_in_expr(&assignment.value) {
            state.info.functions.called.insert(n);
        }
    }
    if let Some(sqlparser::ast::UpdateTableFromKind::BeforeSet(tables))
    | Some(sqlparser::ast::UpdateTableFromKind::AfterSet(tables)) = from
    {
        for t in tables {
            for n in references::function_calls_in_table_with_joins(t) {
                state.info.functions.called.insert(n);
            }
        }
    }
    if let Some(expr) = selection {
        for n in references::function_calls_in_expr(expr) {
            state.info.functions.called.insert(n);
        }
    }
}

fn walk_delete(delete: &Delete, state: &mut ExtractionState) {
    let tables = match &delete.from {
        FromTable::WithFromKeyword(tables) => tables,
        FromTable::WithoutKeyword(tables) => tables,
    };
    for table in tables {
        if let Some(name) = target_name_from_table_with_joins(table) {
            // DROP/DELETE targets are treated as references per spec.md §3.
            if !state.temporary_tables.contains(&name.canonical()) {
                state.info.tables.referenced.insert(name);
            }
        }
    }
    if let Some(expr) = &delete.selection {
        for n in references::function_calls_in_expr(expr) {
            state.info.functions.called.insert(n);
        }
    }
}

fn walk_merge(
    table: &TableFactor,
    source: &TableFactor,
    clauses: &[sqlparser::ast::MergeClause],
    state: &mut ExtractionState,
) {
    if let Some(name) = table_factor_name(table) {
        if !state.temporary_tables.contains(&name.canonical()) {
            state.info.tables.updated.insert(name.clone());
            if !state.info.tables.created.contains(&name) {
                state
                    .warnings
                    .push(ExtractionWarning::NotIdempotent { table: name });
            }
        }
    }
    if let Some(name) = table_factor_name(source) {
        if !state.temporary_tables.contains(&name.canonical()) {
            state.info.tables.referenced.insert(name);
        }
    }
    for clause in clauses {
        if let MergeAction::Update { assignments } = &clause.action {
            for assignment in assignments {
                for n in references::function_calls_in_expr(&assignment.value) {
                    state.info.functions.called.insert(n);
                }
            }
        }
    }
}

fn walk_create_function(create_fn: &sqlparser::ast::CreateFunction, state: &mut ExtractionState) {
    if create_fn.temporary {
        return;
    }
    let name = QualifiedName::from_object_name(&create_fn.name);
    state.info.functions.defined.insert(name);
    if let Some(body) = &create_fn.function_body {
        for n in references::function_calls_in_function_body(body) {
            state.info.functions.called.insert(n);
        }
    }
}

fn walk_call(function: &sqlparser::ast::Function, state: &mut ExtractionState) {
    let name = QualifiedName::from_object_name(&function.name);
    state.info.functions.called.insert(name.clone());
    if let Some(artifacts) = state.procedure_artifacts.get(&name.canonical()).cloned() {
        for table in artifacts {
            state.info.tables.created.insert(table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_script;

    fn extract_sql(sql: &str) -> ExtractionResult {
        let nodes = parse_script(sql).expect("parses");
        extract(&nodes).expect("extracts")
    }

    #[test]
    fn create_table_as_select_is_created_and_referenced() {
        let r = extract_sql("CREATE TABLE b AS SELECT x FROM a;");
        assert!(r.info.tables.created.contains(&QualifiedName::single("b")));
        assert!(r.info.tables.referenced.contains(&QualifiedName::single("a")));
    }

    #[test]
    fn temp_table_is_isolated() {
        let r = extract_sql("CREATE TEMP TABLE t AS SELECT 1; INSERT INTO t VALUES (2);");
        assert!(r.info.tables.created.is_empty());
        assert!(r.info.tables.inserted.is_empty());
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn insert_without_local_create_warns_not_idempotent() {
        let r = extract_sql("INSERT INTO downstream SELECT * FROM upstream;");
        assert!(r.info.tables.inserted.contains(&QualifiedName::single("downstream")));
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn drop_table_is_recorded_unless_temporary() {
        let r = extract_sql("DROP TABLE old_t;");
        assert!(r.info.tables.dropped.contains(&QualifiedName::single("old_t")));
    }

    #[test]
    fn call_hoists_procedure_artifacts_into_caller() {
        let r = extract_sql(
            "CREATE PROCEDURE p() BEGIN CREATE TABLE art AS SELECT 1; END; CALL p();",
        );
        assert!(r.info.tables.created.contains(&QualifiedName::single("art")));
        assert!(r.info.functions.called.contains(&QualifiedName::single("p")));
    }

    #[test]
    fn merge_updates_target_and_references_source() {
        let r = extract_sql(
            "MERGE INTO target t USING source s ON t.id = s.id WHEN MATCHED THEN UPDATE SET t.x = s.x;",
        );
        assert!(r.info.tables.updated.contains(&QualifiedName::single("target")));
        assert!(r.info.tables.referenced.contains(&QualifiedName::single("source")));
    }
}
