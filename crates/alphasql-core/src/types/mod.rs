//! Shared data model: qualified names, the logical column type system,
//! catalog schema/signature shapes, and the per-script `IdentifierInfo`.

mod identifier;
mod name;
mod schema;

pub use identifier::{FunctionFacts, IdentifierInfo, TableFacts};
pub use name::{CanonicalName, QualifiedName};
pub use schema::{
    ColumnSchema, ColumnType, FunctionKind, FunctionSignature, ProcedureBody, ReturnShape,
    TableSchema,
};
