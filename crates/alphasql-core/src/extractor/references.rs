//! Generic AST traversal collecting table reads and function calls.
//!
//! Adapted from the statement/query/expr recursion used by the semantic
//! lint rules: walk `Query -> SetExpr -> Select -> TableWithJoins ->
//! TableFactor` for table reads, and `Expr -> Function` for calls,
//! recursing into every subquery-bearing position (`WHERE`, `HAVING`,
//! join conditions, scalar subqueries, `IN`/`EXISTS`).

use std::collections::BTreeSet;

use sqlparser::ast::{
    CreateFunctionBody, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, Join,
    JoinConstraint, JoinOperator, Query, Select, SelectItem, SetExpr, Statement, TableFactor,
    TableWithJoins, WindowType,
};

use crate::script::ScriptNode;
use crate::types::QualifiedName;

/// Resolves every distinct table path read (not written) across a script's
/// statements, per spec.md §4.1's "referenced-table resolution" pass.
/// Temporary filtering happens in the caller.
pub fn resolve(nodes: &[ScriptNode]) -> BTreeSet<QualifiedName> {
    let mut tables = BTreeSet::new();
    let mut cte_names = BTreeSet::new();
    for node in nodes {
        collect_tables_in_node(node, &mut tables);
        collect_cte_names_in_node(node, &mut cte_names);
    }
    // CTEs are scoped names, not table reads; a `SELECT ... FROM with_name`
    // would otherwise be misreported as an external dependency.
    tables.retain(|name| !cte_names.contains(&name.canonical()));
    tables
}

fn collect_cte_names_in_node(node: &ScriptNode, out: &mut BTreeSet<crate::types::CanonicalName>) {
    match node {
        ScriptNode::Stmt(stmt) => collect_cte_names_in_statement(stmt, out),
        ScriptNode::Begin { body, exception } | ScriptNode::CreateProcedure { body, exception, .. } => {
            for n in body {
                collect_cte_names_in_node(n, out);
            }
            if let Some(handler) = exception {
                for n in handler {
                    collect_cte_names_in_node(n, out);
                }
            }
        }
    }
}

fn collect_cte_names_in_statement(stmt: &Statement, out: &mut BTreeSet<crate::types::CanonicalName>) {
    match stmt {
        Statement::Query(query) => collect_cte_names_in_query(query, out),
        Statement::Insert(insert) => {
            if let Some(source) = &insert.source {
                collect_cte_names_in_query(source, out);
            }
        }
        Statement::CreateView { query, .. } => collect_cte_names_in_query(query, out),
        Statement::CreateTable(create) => {
            if let Some(query) = &create.query {
                collect_cte_names_in_query(query, out);
            }
        }
        _ => {}
    }
}

fn collect_cte_names_in_query(query: &Query, out: &mut BTreeSet<crate::types::CanonicalName>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            out.insert(QualifiedName::single(cte.alias.name.value.clone()).canonical());
            collect_cte_names_in_query(&cte.query, out);
        }
    }
    if let SetExpr::Query(inner) = query.body.as_ref() {
        collect_cte_names_in_query(inner, out);
    }
}

fn collect_tables_in_node(node: &ScriptNode, out: &mut BTreeSet<QualifiedName>) {
    match node {
        ScriptNode::Stmt(stmt) => collect_tables_in_statement(stmt, out),
        ScriptNode::Begin { body, exception } => {
            for n in body {
                collect_tables_in_node(n, out);
            }
            if let Some(handler) = exception {
                for n in handler {
                    collect_tables_in_node(n, out);
                }
            }
        }
        ScriptNode::CreateProcedure { body, exception, .. } => {
            for n in body {
                collect_tables_in_node(n, out);
            }
            if let Some(handler) = exception {
                for n in handler {
                    collect_tables_in_node(n, out);
                }
            }
        }
    }
}

fn collect_tables_in_statement(stmt: &Statement, out: &mut BTreeSet<QualifiedName>) {
    match stmt {
        Statement::Query(query) => collect_tables_in_query(query, out),
        Statement::Insert(insert) => {
            if let Some(source) = &insert.source {
                collect_tables_in_query(source, out);
            }
        }
        Statement::CreateView { query, .. } => collect_tables_in_query(query, out),
        Statement::CreateTable(create) => {
            if let Some(query) = &create.query {
                collect_tables_in_query(query, out);
            }
        }
        Statement::Update {
            table,
            from,
            selection,
            ..
        } => {
            if let Some(sqlparser::ast::UpdateTableFromKind::BeforeSet(tables))
            | Some(sqlparser::ast::UpdateTableFromKind::AfterSet(tables)) = from
            {
                for t in tables {
                    collect_tables_in_table_with_joins(t, out);
                }
            }
            let _ = table;
            if let Some(expr) = selection {
                collect_tables_in_expr(expr, out);
            }
        }
        Statement::Delete(delete) => {
            let tables = match &delete.from {
                sqlparser::ast::FromTable::WithFromKeyword(t) => t,
                sqlparser::ast::FromTable::WithoutKeyword(t) => t,
            };
            for t in tables {
                collect_tables_in_table_with_joins(t, out);
            }
            if let Some(using) = &delete.using {
                for t in using {
                    collect_tables_in_table_with_joins(t, out);
                }
            }
            if let Some(expr) = &delete.selection {
                collect_tables_in_expr(expr, out);
            }
        }
        Statement::Merge {
            source, on, clauses, ..
        } => {
            collect_tables_in_table_factor(source, out);
            collect_tables_in_expr(on, out);
            for clause in clauses {
                if let Some(expr) = &clause.predicate {
                    collect_tables_in_expr(expr, out);
                }
                if let sqlparser::ast::MergeAction::Update { assignments } = &clause.action {
                    for a in assignments {
                        collect_tables_in_expr(&a.value, out);
                    }
                }
            }
        }
        _ => {}
    }
}

fn collect_tables_in_query(query: &Query, out: &mut BTreeSet<QualifiedName>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            collect_tables_in_query(&cte.query, out);
        }
    }
    collect_tables_in_set_expr(&query.body, out);
}

fn collect_tables_in_set_expr(set_expr: &SetExpr, out: &mut BTreeSet<QualifiedName>) {
    match set_expr {
        SetExpr::Select(select) => collect_tables_in_select(select, out),
        SetExpr::Query(query) => collect_tables_in_query(query, out),
        SetExpr::SetOperation { left, right, .. } => {
            collect_tables_in_set_expr(left, out);
            collect_tables_in_set_expr(right, out);
        }
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) | SetExpr::Delete(stmt) | SetExpr::Merge(stmt) => {
            collect_tables_in_statement(stmt, out)
        }
        _ => {}
    }
}

fn collect_tables_in_select(select: &Select, out: &mut BTreeSet<QualifiedName>) {
    for table in &select.from {
        collect_tables_in_table_with_joins(table, out);
    }
    for item in &select.projection {
        if let SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } = item {
            collect_tables_in_expr(expr, out);
        }
    }
    if let Some(selection) = &select.selection {
        collect_tables_in_expr(selection, out);
    }
    if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
        for expr in exprs {
            collect_tables_in_expr(expr, out);
        }
    }
    if let Some(having) = &select.having {
        collect_tables_in_expr(having, out);
    }
    if let Some(qualify) = &select.qualify {
        collect_tables_in_expr(qualify, out);
    }
}

fn collect_tables_in_table_with_joins(table: &TableWithJoins, out: &mut BTreeSet<QualifiedName>) {
    collect_tables_in_table_factor(&table.relation, out);
    for join in &table.joins {
        collect_tables_in_table_factor(&join.relation, out);
        if let Some(expr) = join_on_expr(join) {
            collect_tables_in_expr(expr, out);
        }
    }
}

fn collect_tables_in_table_factor(factor: &TableFactor, out: &mut BTreeSet<QualifiedName>) {
    match factor {
        TableFactor::Table { name, args, .. } => {
            // A bare name with call-argument syntax is a TVF invocation, not
            // a table read — its argument tables are still reads though.
            out.insert(QualifiedName::from_object_name(name));
            if let Some(table_args) = args {
                for arg in &table_args.args {
                    if let FunctionArg::Unnamed(FunctionArgExpr::Expr(expr))
                    | FunctionArg::Named {
                        arg: FunctionArgExpr::Expr(expr),
                        ..
                    } = arg
                    {
                        collect_tables_in_expr(expr, out);
                    }
                }
            }
        }
        TableFactor::Derived { subquery, .. } => collect_tables_in_query(subquery, out),
        TableFactor::TableFunction { expr, .. } => collect_tables_in_expr(expr, out),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_tables_in_table_with_joins(table_with_joins, out),
        TableFactor::Pivot { table, .. }
        | TableFactor::Unpivot { table, .. }
        | TableFactor::MatchRecognize { table, .. } => collect_tables_in_table_factor(table, out),
        _ => {}
    }
}

fn join_on_expr(join: &Join) -> Option<&Expr> {
    let constraint = match &join.join_operator {
        JoinOperator::Join(c)
        | JoinOperator::Inner(c)
        | JoinOperator::Left(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::Right(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::FullOuter(c)
        | JoinOperator::CrossJoin(c)
        | JoinOperator::Semi(c)
        | JoinOperator::LeftSemi(c)
        | JoinOperator::RightSemi(c)
        | JoinOperator::Anti(c)
        | JoinOperator::LeftAnti(c)
        | JoinOperator::RightAnti(c)
        | JoinOperator::StraightJoin(c) => c,
        JoinOperator::AsOf { constraint, .. } => constraint,
        JoinOperator::CrossApply | JoinOperator::OuterApply => return None,
    };
    if let JoinConstraint::On(expr) = constraint {
        Some(expr)
    } else {
        None
    }
}

fn collect_tables_in_expr(expr: &Expr, out: &mut BTreeSet<QualifiedName>) {
    match expr {
        Expr::Subquery(query) | Expr::Exists { subquery: query, .. } => {
            collect_tables_in_query(query, out)
        }
        Expr::InSubquery { expr: inner, subquery, .. } => {
            collect_tables_in_expr(inner, out);
            collect_tables_in_query(subquery, out);
        }
        Expr::BinaryOp { left, right, .. }
        | Expr::AnyOp { left, right, .. }
        | Expr::AllOp { left, right, .. } => {
            collect_tables_in_expr(left, out);
            collect_tables_in_expr(right, out);
        }
        Expr::UnaryOp { expr: inner, .. }
        | Expr::Nested(inner)
        | Expr::IsNull(inner)
        | Expr::IsNotNull(inner)
        | Expr::Cast { expr: inner, .. } => collect_tables_in_expr(inner, out),
        Expr::InList { expr, list, .. } => {
            collect_tables_in_expr(expr, out);
            for item in list {
                collect_tables_in_expr(item, out);
            }
        }
        Expr::Between { expr, low, high, .. } => {
            collect_tables_in_expr(expr, out);
            collect_tables_in_expr(low, out);
            collect_tables_in_expr(high, out);
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                collect_tables_in_expr(operand, out);
            }
            for when in conditions {
                collect_tables_in_expr(&when.condition, out);
                collect_tables_in_expr(&when.result, out);
            }
            if let Some(otherwise) = else_result {
                collect_tables_in_expr(otherwise, out);
            }
        }
        Expr::Function(function) => {
            if let FunctionArguments::List(arguments) = &function.args {
                for arg in &arguments.args {
                    if let FunctionArg::Unnamed(FunctionArgExpr::Expr(inner))
                    | FunctionArg::Named {
                        arg: FunctionArgExpr::Expr(inner),
                        ..
                    } = arg
                    {
                        collect_tables_in_expr(inner, out);
                    }
                }
            }
            if let Some(WindowType::WindowSpec(spec)) = &function.over {
                for expr in &spec.partition_by {
                    collect_tables_in_expr(expr, out);
                }
            }
        }
        _ => {}
    }
}

/// Every `Expr::Function` call name reachable from a query, used to credit
/// `functions.called` wherever a `CREATE TABLE AS SELECT`/view/insert body
/// is walked.
pub fn function_calls_in_query(query: &Query) -> Vec<QualifiedName> {
    let mut out = Vec::new();
    collect_functions_in_query(query, &mut out);
    out
}

pub fn function_calls_in_expr(expr: &Expr) -> Vec<QualifiedName> {
    let mut out = Vec::new();
    collect_functions_in_expr(expr, &mut out);
    out
}

pub fn function_calls_in_table_with_joins(table: &TableWithJoins) -> Vec<QualifiedName> {
    let mut out = Vec::new();
    collect_functions_in_table_with_joins(table, &mut out);
    out
}

pub fn function_calls_in_statement(stmt: &Statement) -> Vec<QualifiedName> {
    let mut out = Vec::new();
    match stmt {
        Statement::Query(query) => collect_functions_in_query(query, &mut out),
        _ => {}
    }
    out
}

pub fn function_calls_in_function_body(body: &CreateFunctionBody) -> Vec<QualifiedName> {
    let mut out = Vec::new();
    if let CreateFunctionBody::AsBeforeOptions(expr) | CreateFunctionBody::AsAfterOptions(expr) = body {
        collect_functions_in_expr(expr, &mut out);
    }
    out
}

fn collect_functions_in_query(query: &Query, out: &mut Vec<QualifiedName>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            collect_functions_in_query(&cte.query, out);
        }
    }
    collect_functions_in_set_expr(&query.body, out);
}

fn collect_functions_in_set_expr(set_expr: &SetExpr, out: &mut Vec<QualifiedName>) {
    match set_expr {
        SetExpr::Select(select) => {
            for table in &select.from {
                collect_functions_in_table_with_joins(table, out);
            }
            for item in &select.projection {
                if let SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } = item {
                    collect_functions_in_expr(expr, out);
                }
            }
            if let Some(selection) = &select.selection {
                collect_functions_in_expr(selection, out);
            }
            if let Some(having) = &select.having {
                collect_functions_in_expr(having, out);
            }
        }
        SetExpr::Query(query) => collect_functions_in_query(query, out),
        SetExpr::SetOperation { left, right, .. } => {
            collect_functions_in_set_expr(left, out);
            collect_functions_in_set_expr(right, out);
        }
        _ => {}
    }
}

fn collect_functions_in_table_with_joins(table: &TableWithJoins, out: &mut Vec<QualifiedName>) {
    collect_functions_in_table_factor(&table.relation, out);
    for join in &table.joins {
        collect_functions_in_table_factor(&join.relation, out);
    }
}

fn collect_functions_in_table_factor(factor: &TableFactor, out: &mut Vec<QualifiedName>) {
    match factor {
        TableFactor::Table { name, args, .. } => {
            if args.is_some() {
                // Call syntax on a bare name is a table-valued function.
                out.push(QualifiedName::from_object_name(name));
            }
        }
        TableFactor::Derived { subquery, .. } => collect_functions_in_query(subquery, out),
        TableFactor::TableFunction { expr, .. } => collect_functions_in_expr(expr, out),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_functions_in_table_with_joins(table_with_joins, out),
        _ => {}
    }
}

fn collect_functions_in_expr(expr: &Expr, out: &mut Vec<QualifiedName>) {
    match expr {
        Expr::Function(function) => {
            out.push(QualifiedName::from_object_name(&function.name));
            if let FunctionArguments::List(arguments) = &function.args {
                for arg in &arguments.args {
                    if let FunctionArg::Unnamed(FunctionArgExpr::Expr(inner))
                    | FunctionArg::Named {
                        arg: FunctionArgExpr::Expr(inner),
                        ..
                    } = arg
                    {
                        collect_functions_in_expr(inner, out);
                    }
                }
            }
        }
        Expr::Subquery(query) | Expr::Exists { subquery: query, .. } => {
            collect_functions_in_query(query, out)
        }
        Expr::InSubquery { expr: inner, subquery, .. } => {
            collect_functions_in_expr(inner, out);
            collect_functions_in_query(subquery, out);
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_functions_in_expr(left, out);
            collect_functions_in_expr(right, out);
        }
        Expr::UnaryOp { expr: inner, .. }
        | Expr::Nested(inner)
        | Expr::IsNull(inner)
        | Expr::IsNotNull(inner)
        | Expr::Cast { expr: inner, .. } => collect_functions_in_expr(inner, out),
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                collect_functions_in_expr(operand, out);
            }
            for when in conditions {
                collect_functions_in_expr(&when.condition, out);
                collect_functions_in_expr(&when.result, out);
            }
            if let Some(otherwise) = else_result {
                collect_functions_in_expr(otherwise, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_script;

    fn resolve_sql(sql: &str) -> BTreeSet<QualifiedName> {
        let nodes = parse_script(sql).unwrap();
        resolve(&nodes)
    }

    #[test]
    fn select_from_join_collects_both_sides() {
        let refs = resolve_sql("SELECT * FROM a JOIN b ON a.id = b.id;");
        assert!(refs.contains(&QualifiedName::single("a")));
        assert!(refs.contains(&QualifiedName::single("b")));
    }

    #[test]
    fn subquery_in_where_is_collected() {
        let refs = resolve_sql("SELECT * FROM a WHERE id IN (SELECT id FROM b);");
        assert!(refs.contains(&QualifiedName::single("b")));
    }

    #[test]
    fn cte_source_is_collected() {
        let refs = resolve_sql("WITH c AS (SELECT * FROM base) SELECT * FROM c;");
        assert!(refs.contains(&QualifiedName::single("base")));
    }
}
