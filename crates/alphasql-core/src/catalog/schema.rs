//! JSON-schema seeding for the catalog, per spec.md §4.4.
//!
//! Wire format: `{ table_name: [ { name, type, mode, fields? }, … ] }`,
//! deserialized with `serde`'s derive macros the way the corpus's request
//! DTOs are declared.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;
use crate::types::{ColumnSchema, ColumnType, TableSchema};

#[derive(Debug, Deserialize)]
pub struct JsonSchemaFile(HashMap<String, Vec<JsonSchemaField>>);

#[derive(Debug, Deserialize)]
pub struct JsonSchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<JsonSchemaField>>,
}

/// Reads a JSON schema file and seeds a fresh set of table schemas from it.
pub fn load(path: &Path) -> Result<HashMap<String, TableSchema>, EngineError> {
    let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text, path)
}

fn parse(text: &str, path: &Path) -> Result<HashMap<String, TableSchema>, EngineError> {
    let file: JsonSchemaFile = serde_json::from_str(text).map_err(|e| EngineError::Schema {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut tables = HashMap::new();
    for (table_name, fields) in file.0 {
        let columns = fields
            .iter()
            .map(|f| field_to_column(f, path))
            .collect::<Result<Vec<_>, _>>()?;
        tables.insert(table_name, TableSchema::new(columns));
    }
    Ok(tables)
}

fn field_to_column(field: &JsonSchemaField, path: &Path) -> Result<ColumnSchema, EngineError> {
    let mut ty = bigquery_type_to_column_type(&field.type_, field, path)?;
    if matches!(field.mode.as_deref(), Some(mode) if mode.eq_ignore_ascii_case("repeated")) {
        ty = ColumnType::Array(Box::new(ty));
    }
    Ok(ColumnSchema::new(field.name.clone(), ty))
}

fn bigquery_type_to_column_type(
    type_name: &str,
    field: &JsonSchemaField,
    path: &Path,
) -> Result<ColumnType, EngineError> {
    let upper = type_name.to_ascii_uppercase();
    Ok(match upper.as_str() {
        "STRING" => ColumnType::String,
        "INT64" | "INTEGER" => ColumnType::Int64,
        "BOOL" | "BOOLEAN" => ColumnType::Bool,
        "FLOAT64" | "FLOAT" => ColumnType::Float64,
        "NUMERIC" => ColumnType::Numeric,
        "BYTES" => ColumnType::Bytes,
        "TIMESTAMP" => ColumnType::Timestamp,
        "DATE" => ColumnType::Date,
        "TIME" => ColumnType::Time,
        "DATETIME" => ColumnType::DateTime,
        "GEOGRAPHY" => ColumnType::Geography,
        "RECORD" | "STRUCT" => {
            let fields = field.fields.as_deref().unwrap_or_default();
            let columns = fields
                .iter()
                .map(|f| field_to_column(f, path))
                .collect::<Result<Vec<_>, _>>()?;
            ColumnType::Struct(columns)
        }
        other => {
            return Err(EngineError::Schema {
                path: path.to_path_buf(),
                message: format!("unknown JSON schema type `{other}` for field `{}`", field.name),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_table_parses() {
        let text = r#"{
            "orders": [
                { "name": "id", "type": "INT64" },
                { "name": "total", "type": "FLOAT64" }
            ]
        }"#;
        let tables = parse(text, Path::new("schema.json")).unwrap();
        let orders = tables.get("orders").unwrap();
        assert_eq!(orders.column("id").unwrap().ty, ColumnType::Int64);
        assert_eq!(orders.column("total").unwrap().ty, ColumnType::Float64);
    }

    #[test]
    fn repeated_mode_wraps_in_array() {
        let text = r#"{
            "t": [ { "name": "tags", "type": "STRING", "mode": "REPEATED" } ]
        }"#;
        let tables = parse(text, Path::new("schema.json")).unwrap();
        let col = tables["t"].column("tags").unwrap();
        assert_eq!(col.ty, ColumnType::Array(Box::new(ColumnType::String)));
    }

    #[test]
    fn record_recurses_into_fields() {
        let text = r#"{
            "t": [ { "name": "addr", "type": "RECORD", "fields": [
                { "name": "city", "type": "STRING" }
            ] } ]
        }"#;
        let tables = parse(text, Path::new("schema.json")).unwrap();
        let col = tables["t"].column("addr").unwrap();
        match &col.ty {
            ColumnType::Struct(fields) => {
                assert_eq!(fields[0].name, "city");
                assert_eq!(fields[0].ty, ColumnType::String);
            }
            other => panic!("expected Struct, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_fatal() {
        let text = r#"{ "t": [ { "name": "x", "type": "WEIRD" } ] }"#;
        let err = parse(text, Path::new("schema.json")).unwrap_err();
        assert!(matches!(err, EngineError::Schema { .. }));
    }
}
