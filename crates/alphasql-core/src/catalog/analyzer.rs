//! The scoped semantic analyzer `CatalogDriver` replays statements against.
//!
//! `spec.md` §1 puts the full BigQuery semantic analyzer out of scope; this
//! module resolves only what the driver needs to observe side effects:
//! table schemas from `CREATE TABLE [AS SELECT]`, function/procedure
//! signatures, and which statement kinds it has no case for. Column
//! resolution mirrors `pondpilot-flowscope`'s `analyzer::ddl`/`query`
//! projection mechanics (name-only propagation from a single source table),
//! without its multi-dialect lineage-graph bookkeeping.

use std::collections::HashMap;

use sqlparser::ast::{
    ColumnDef, CreateFunctionBody, CreateTable, DataType, Expr, Query, Select, SelectItem,
    SetExpr, Statement, TableFactor, TableWithJoins,
};

use crate::error::AnalyzerError;
use crate::types::{ColumnSchema, ColumnType, FunctionKind, FunctionSignature, QualifiedName, TableSchema};

use super::Catalog;

/// What `CatalogDriver` should do after a statement is resolved.
pub enum Effect {
    CreateTable {
        name: QualifiedName,
        schema: TableSchema,
        temporary: bool,
    },
    CreateFunction {
        name: QualifiedName,
        signature: FunctionSignature,
        temporary: bool,
    },
    Call {
        name: QualifiedName,
    },
    DropTable {
        name: QualifiedName,
        if_exists: bool,
    },
    NoOp,
}

/// Either the statement was recognized and resolved to an [`Effect`], or
/// its kind has no case here — which the driver downgrades to a warning
/// (spec.md §4.3 step 2 / §7 `UnsupportedStatement`).
pub enum Analysis {
    Applied(Effect),
    Unsupported(String),
}

pub fn resolve_statement(stmt: &Statement, catalog: &Catalog) -> Result<Analysis, AnalyzerError> {
    match stmt {
        Statement::CreateTable(create) => Ok(Analysis::Applied(resolve_create_table(create, catalog))),
        Statement::CreateView { name, query, temporary, .. } => {
            Ok(Analysis::Applied(Effect::CreateTable {
                name: QualifiedName::from_object_name(name),
                schema: resolve_query_schema(query, catalog),
                temporary: *temporary,
            }))
        }
        Statement::CreateFunction(create_fn) => {
            Ok(Analysis::Applied(resolve_create_function(create_fn)))
        }
        Statement::Call(function) => Ok(Analysis::Applied(Effect::Call {
            name: QualifiedName::from_object_name(&function.name),
        })),
        Statement::Drop { object_type, names, if_exists, .. } => {
            if !matches!(object_type, sqlparser::ast::ObjectType::Table | sqlparser::ast::ObjectType::View) {
                return Ok(Analysis::Unsupported(format!("DROP {object_type:?}")));
            }
            let Some(name) = names.first() else {
                return Ok(Analysis::Unsupported("DROP with no target".to_string()));
            };
            Ok(Analysis::Applied(Effect::DropTable {
                name: QualifiedName::from_object_name(name),
                if_exists: *if_exists,
            }))
        }
        // Merges never create tables; their target schema is presumed to
        // already exist (SPEC_FULL.md §4.3 supplement).
        Statement::Merge { .. } => Ok(Analysis::Applied(Effect::NoOp)),
        Statement::Insert(_) | Statement::Update { .. } | Statement::Delete(_) | Statement::Query(_) => {
            Ok(Analysis::Applied(Effect::NoOp))
        }
        other => Ok(Analysis::Unsupported(statement_kind_name(other))),
    }
}

fn statement_kind_name(stmt: &Statement) -> String {
    format!("{stmt:?}")
        .split(|c: char| c == '(' || c == '{')
        .next()
        .unwrap_or("statement")
        .trim()
        .to_string()
}

fn resolve_create_table(create: &CreateTable, catalog: &Catalog) -> Effect {
    let name = QualifiedName::from_object_name(&create.name);
    let schema = if !create.columns.is_empty() {
        schema_from_column_defs(&create.columns)
    } else if let Some(query) = &create.query {
        resolve_query_schema(query, catalog)
    } else {
        TableSchema::default()
    };
    Effect::CreateTable {
        name,
        schema,
        temporary: create.temporary,
    }
}

fn schema_from_column_defs(columns: &[ColumnDef]) -> TableSchema {
    TableSchema::new(
        columns
            .iter()
            .map(|c| ColumnSchema::new(c.name.value.clone(), data_type_to_column_type(&c.data_type)))
            .collect(),
    )
}

/// Resolves a `CREATE TABLE AS SELECT`/`CREATE VIEW` query's output schema.
/// Only single-`SELECT` bodies with a resolvable source table get real
/// types; anything else (set operations, multi-table joins without an
/// unambiguous source) falls back to `ColumnType::Unknown` per column.
fn resolve_query_schema(query: &Query, catalog: &Catalog) -> TableSchema {
    match query.body.as_ref() {
        SetExpr::Select(select) => resolve_select_schema(select, catalog),
        SetExpr::Query(inner) => resolve_query_schema(inner, catalog),
        _ => TableSchema::default(),
    }
}

fn resolve_select_schema(select: &Select, catalog: &Catalog) -> TableSchema {
    let sources = source_tables(&select.from, catalog);

    let mut columns = Vec::new();
    for item in &select.projection {
        match item {
            SelectItem::Wildcard(_) => {
                columns.extend(expand_wildcard(&sources, None));
            }
            SelectItem::QualifiedWildcard(kind, _) => {
                let qualifier = qualified_wildcard_name(kind);
                columns.extend(expand_wildcard(&sources, qualifier.as_deref()));
            }
            SelectItem::UnnamedExpr(expr) => {
                columns.push(resolve_projection_column(expr, None, &sources));
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                columns.push(resolve_projection_column(expr, Some(&alias.value), &sources));
            }
        }
    }
    TableSchema::new(columns)
}

fn qualified_wildcard_name(kind: &sqlparser::ast::SelectItemQualifiedWildcardKind) -> Option<String> {
    match kind {
        sqlparser::ast::SelectItemQualifiedWildcardKind::ObjectName(name) => {
            name.0.last().map(|p| p.to_string())
        }
        _ => None,
    }
}

/// Maps each visible alias (or bare table name when unaliased) in a
/// `FROM`/`JOIN` list to its resolved schema, when known.
fn source_tables<'a>(
    from: &[TableWithJoins],
    catalog: &'a Catalog,
) -> HashMap<String, &'a TableSchema> {
    let mut out = HashMap::new();
    for twj in from {
        collect_source_table(&twj.relation, catalog, &mut out);
        for join in &twj.joins {
            collect_source_table(&join.relation, catalog, &mut out);
        }
    }
    out
}

fn collect_source_table<'a>(
    factor: &TableFactor,
    catalog: &'a Catalog,
    out: &mut HashMap<String, &'a TableSchema>,
) {
    if let TableFactor::Table { name, alias, .. } = factor {
        let qname = QualifiedName::from_object_name(name);
        if let Some(schema) = catalog.table(&qname.canonical()) {
            let key = alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| qname.last_part().to_string());
            out.insert(key, schema);
        }
    }
}

fn expand_wildcard(sources: &HashMap<String, &TableSchema>, qualifier: Option<&str>) -> Vec<ColumnSchema> {
    match qualifier {
        Some(q) => sources.get(q).map(|s| s.columns.clone()).unwrap_or_default(),
        None => sources.values().flat_map(|s| s.columns.clone()).collect(),
    }
}

/// Resolves one non-wildcard projection item to a named, best-effort-typed
/// column. A bare (possibly table-qualified) column reference inherits its
/// source's type; anything else yields `ColumnType::Unknown` (spec.md §4.3
/// supplement: "a computed expression or an unresolvable source yields
/// Unknown").
fn resolve_projection_column(
    expr: &Expr,
    alias: Option<&str>,
    sources: &HashMap<String, &TableSchema>,
) -> ColumnSchema {
    let (default_name, ty) = match expr {
        Expr::Identifier(ident) => (
            ident.value.clone(),
            sources
                .values()
                .find_map(|s| s.column(&ident.value))
                .map(|c| c.ty.clone())
                .unwrap_or(ColumnType::Unknown),
        ),
        Expr::CompoundIdentifier(parts) => {
            let column_name = parts.last().map(|p| p.value.clone()).unwrap_or_default();
            let ty = match parts.as_slice() {
                [qualifier, column] => sources
                    .get(&qualifier.value)
                    .and_then(|s| s.column(&column.value))
                    .map(|c| c.ty.clone())
                    .unwrap_or(ColumnType::Unknown),
                _ => ColumnType::Unknown,
            };
            (column_name, ty)
        }
        other => (other.to_string(), ColumnType::Unknown),
    };
    ColumnSchema::new(alias.map(str::to_string).unwrap_or(default_name), ty)
}

fn data_type_to_column_type(data_type: &DataType) -> ColumnType {
    match data_type {
        DataType::Int(_)
        | DataType::Integer(_)
        | DataType::BigInt(_)
        | DataType::SmallInt(_)
        | DataType::TinyInt(_)
        | DataType::Int64 => ColumnType::Int64,
        DataType::Float(_) | DataType::Double(_) | DataType::DoublePrecision | DataType::Real => {
            ColumnType::Float64
        }
        DataType::Numeric(_) | DataType::Decimal(_) => ColumnType::Numeric,
        DataType::Char(_) | DataType::Varchar(_) | DataType::Text | DataType::String(_) => {
            ColumnType::String
        }
        DataType::Boolean => ColumnType::Bool,
        DataType::Date => ColumnType::Date,
        DataType::Time(_, _) => ColumnType::Time,
        DataType::Timestamp(_, _) | DataType::Datetime(_) => ColumnType::Timestamp,
        DataType::Array(_) => ColumnType::Array(Box::new(ColumnType::Unknown)),
        DataType::Custom(name, _) => custom_type_name_to_column_type(&name.to_string()),
        _ => ColumnType::Unknown,
    }
}

fn custom_type_name_to_column_type(name: &str) -> ColumnType {
    match name.to_ascii_uppercase().as_str() {
        "BYTES" => ColumnType::Bytes,
        "GEOGRAPHY" => ColumnType::Geography,
        "NUMERIC" | "BIGNUMERIC" => ColumnType::Numeric,
        "FLOAT64" => ColumnType::Float64,
        "INT64" => ColumnType::Int64,
        "STRING" => ColumnType::String,
        "BOOL" => ColumnType::Bool,
        "DATETIME" => ColumnType::DateTime,
        _ => ColumnType::Unknown,
    }
}

/// `CREATE FUNCTION`/`CREATE TABLE FUNCTION` signature. Parameter names are
/// left empty: the pinned parser version's argument-list field shape isn't
/// exercised anywhere in the corpus closely enough to ground it, and
/// parameter types are ignored by the extraction algorithm regardless
/// (spec.md §4.1) — see DESIGN.md.
fn resolve_create_function(create_fn: &sqlparser::ast::CreateFunction) -> Effect {
    let name = QualifiedName::from_object_name(&create_fn.name);
    let kind = match &create_fn.function_body {
        Some(CreateFunctionBody::AsBeforeOptions(expr) | CreateFunctionBody::AsAfterOptions(expr)) => {
            FunctionKind::Plain {
                return_shape: Some(crate::types::ReturnShape::Scalar(expr_literal_type(expr))),
            }
        }
        Some(other) => FunctionKind::Templated { body: format!("{other:?}") },
        None => FunctionKind::Plain { return_shape: None },
    };
    Effect::CreateFunction {
        name: name.clone(),
        signature: FunctionSignature { name, params: Vec::new(), kind },
        temporary: create_fn.temporary,
    }
}

/// Best-effort scalar type for a function body expression, without a
/// surrounding column/table scope to resolve references against.
fn expr_literal_type(expr: &Expr) -> ColumnType {
    match expr {
        Expr::Value(value) => match &value.value {
            sqlparser::ast::Value::Number(_, _) => ColumnType::Float64,
            sqlparser::ast::Value::SingleQuotedString(_) | sqlparser::ast::Value::DoubleQuotedString(_) => {
                ColumnType::String
            }
            sqlparser::ast::Value::Boolean(_) => ColumnType::Bool,
            _ => ColumnType::Unknown,
        },
        _ => ColumnType::Unknown,
    }
}
