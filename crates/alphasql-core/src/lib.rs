//! Core library shared by `alphadag`, `alphacheck`, and `alphabeam`:
//! extracting table/function identifiers from a script, folding them into
//! a file-level dependency DAG, and replaying a pipeline against a catalog
//! to resolve table schemas.

pub mod catalog;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod script;
pub mod types;

pub use discovery::discover;
pub use error::{AnalyzerError, EngineError, ParseError};
pub use extractor::{extract, ExtractionResult, ExtractionWarning};
pub use graph::{build, parse_dot, render_dot, DependencyGraph, GraphOptions};
pub use script::{parse_script, ScriptNode};
