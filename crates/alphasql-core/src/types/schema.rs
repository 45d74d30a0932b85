//! Logical column types and the catalog's per-entry shapes.
//!
//! This is deliberately a narrow type system: enough to carry schemas
//! created by `CREATE TABLE [AS SELECT]` forward into the catalog and to
//! seed it from JSON, not a full BigQuery expression type checker (that
//! analyzer is an external collaborator this crate does not re-implement).

use std::fmt;

use crate::types::QualifiedName;

/// A BigQuery logical column type, per the JSON-schema type mapping table.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    String,
    Int64,
    Bool,
    Float64,
    Numeric,
    Bytes,
    Timestamp,
    Date,
    Time,
    DateTime,
    Geography,
    Struct(Vec<ColumnSchema>),
    Array(Box<ColumnType>),
    /// Could not be statically determined by the scoped analyzer (e.g. a
    /// computed expression with no resolvable source column).
    Unknown,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::String => write!(f, "STRING"),
            ColumnType::Int64 => write!(f, "INT64"),
            ColumnType::Bool => write!(f, "BOOL"),
            ColumnType::Float64 => write!(f, "FLOAT64"),
            ColumnType::Numeric => write!(f, "NUMERIC"),
            ColumnType::Bytes => write!(f, "BYTES"),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
            ColumnType::Date => write!(f, "DATE"),
            ColumnType::Time => write!(f, "TIME"),
            ColumnType::DateTime => write!(f, "DATETIME"),
            ColumnType::Geography => write!(f, "GEOGRAPHY"),
            ColumnType::Struct(_) => write!(f, "STRUCT"),
            ColumnType::Array(inner) => write!(f, "ARRAY<{inner}>"),
            ColumnType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// One column of a [`TableSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// A table's resolved column list, as stored in the catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Self { columns }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// What a function call or table function invocation yields.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnShape {
    Scalar(ColumnType),
    Table(TableSchema),
}

/// How a `CREATE FUNCTION` / `CREATE TABLE FUNCTION` body is represented.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionKind {
    /// A SQL function whose return shape could be resolved.
    Plain { return_shape: Option<ReturnShape> },
    /// A function whose body is not resolvable as plain SQL (`LANGUAGE js`,
    /// or a macro/templated body) — recorded as-is per spec.md's "register
    /// a templated-SQL function keyed by name with its argument names and
    /// body text".
    Templated { body: String },
}

/// A registered function or table function signature. Parameter *types*
/// are ignored per the extraction algorithm; only argument names are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: QualifiedName,
    pub params: Vec<String>,
    pub kind: FunctionKind,
}

/// A registered procedure: its signature plus enough to re-enter it on
/// `CALL` (owned SQL text + a freshly re-parsed body, never a borrowed AST
/// pointer into a freed parser arena — see DESIGN NOTES on procedure
/// re-entry).
#[derive(Debug, Clone)]
pub struct ProcedureBody {
    pub name: QualifiedName,
    pub params: Vec<String>,
    pub sql_text: String,
    pub body: Vec<crate::script::ScriptNode>,
}
