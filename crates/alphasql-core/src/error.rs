//! Error types for SQL parsing, extraction, graph construction, and the
//! pipeline type-checker.
//!
//! # Error handling strategy
//!
//! - [`ParseError`]: the lexer/parser rejected the SQL. Fatal — extraction
//!   and the catalog driver both propagate it immediately.
//! - [`EngineError`]: everything else in spec.md §7's taxonomy
//!   (`DuplicateDefinition`, `CycleDetected`, `MissingTemporaryCreation`,
//!   `IOError`, `SchemaError`, and the analyzer-facing variants). Most are
//!   fatal; `UnsupportedStatement` is the one class the catalog driver
//!   downgrades to a warning and continues past (spec.md §7).

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Error encountered during SQL parsing.
///
/// Preserves structured information from the underlying parser, including
/// position information when the message exposes it.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub position: Option<Position>,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseErrorKind {
    #[default]
    SyntaxError,
    MissingClause,
    UnexpectedEof,
    UnsupportedFeature,
    LexerError,
    /// A script-level construct (`BEGIN`/`END`, `EXCEPTION WHEN`) had no
    /// matching close, or closed something that was never opened.
    MalformedBlock,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
            kind: ParseErrorKind::SyntaxError,
        }
    }

    pub fn with_position(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            position: Some(Position { line, column }),
            kind: ParseErrorKind::SyntaxError,
        }
    }

    pub fn with_kind(mut self, kind: ParseErrorKind) -> Self {
        self.kind = kind;
        self
    }

    fn parse_position_from_message(message: &str) -> Option<Position> {
        static POSITION_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = POSITION_REGEX
            .get_or_init(|| Regex::new(r"Line:\s*(\d+)\s*,\s*Column:\s*(\d+)").expect("valid regex"));

        re.captures(message).and_then(|caps| {
            let line: usize = caps.get(1)?.as_str().parse().ok()?;
            let column: usize = caps.get(2)?.as_str().parse().ok()?;
            Some(Position { line, column })
        })
    }

    fn infer_kind_from_message(message: &str) -> ParseErrorKind {
        let lower = message.to_lowercase();
        if lower.contains("unexpected end") || lower.contains("eof") {
            ParseErrorKind::UnexpectedEof
        } else if lower.contains("expected") {
            ParseErrorKind::MissingClause
        } else if lower.contains("not supported") || lower.contains("unsupported") {
            ParseErrorKind::UnsupportedFeature
        } else if lower.contains("lexer") || lower.contains("token") {
            ParseErrorKind::LexerError
        } else {
            ParseErrorKind::SyntaxError
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error")?;
        if let Some(pos) = self.position {
            write!(f, " at line {}, column {}", pos.line, pos.column)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        let message = err.to_string();
        let position = Self::parse_position_from_message(&message);
        let kind = Self::infer_kind_from_message(&message);
        Self { message, position, kind }
    }
}

/// The full engine error taxonomy from spec.md §7, beyond plain parse
/// failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{file}: {source}")]
    Analyzer {
        file: PathBuf,
        #[source]
        source: AnalyzerError,
    },

    #[error("duplicate definition of `{name}`: first defined in {first}, redefined in {second}")]
    DuplicateDefinition {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("{file}: `{table}` is written by INSERT/UPDATE but not created in the same script; re-running this script is not idempotent")]
    MissingTemporaryCreation { file: PathBuf, table: String },

    #[error("cycle detected: {0}")]
    CycleDetected(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema error in {path}: {message}")]
    Schema { path: PathBuf, message: String },
}

/// Semantic-analysis failure for one statement, wrapping the file location
/// it occurred at (per spec.md §4.3's "abort with file + catalog dump").
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("unknown function or procedure `{0}`")]
    UnknownFunction(String),

    #[error("table `{0}` already exists")]
    TableExists(String),

    #[error("table `{0}` does not exist")]
    TableDoesNotExist(String),

    #[error("function `{0}` is already defined")]
    FunctionExists(String),

    #[error("{0}")]
    Other(String),
}

/// Not a fatal error: the analyzer has no case for this statement kind.
/// spec.md §4.3/§7: logged as a warning, execution continues.
#[derive(Debug, Clone)]
pub struct UnsupportedStatement(pub String);

impl fmt::Display for UnsupportedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "statement not supported: {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_with_position() {
        let err = ParseError::with_position("bad token", 4, 9);
        assert_eq!(err.to_string(), "parse error at line 4, column 9: bad token");
    }

    #[test]
    fn infer_kind_from_message_eof() {
        assert_eq!(
            ParseError::infer_kind_from_message("Unexpected end of input"),
            ParseErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn duplicate_definition_message() {
        let err = EngineError::DuplicateDefinition {
            name: "T".into(),
            first: PathBuf::from("a.sql"),
            second: PathBuf::from("b.sql"),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.sql"));
        assert!(msg.contains("b.sql"));
    }
}
