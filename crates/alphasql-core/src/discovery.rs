//! Resolves the positional path arguments shared by `alphadag` into a
//! deterministic, filtered list of script files (spec.md §6).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::error::EngineError;

fn vcs_dir_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\.git/|\.hg/|\.svn/)").expect("valid regex"))
}

fn is_script_extension(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("sql") | Some("bq"))
}

fn is_vcs_path(path: &Path) -> bool {
    vcs_dir_regex().is_match(&path.to_string_lossy())
}

/// Walks every positional path, returning every `.sql`/`.bq` file found
/// (case-sensitive extension match) outside of `.git`/`.hg`/`.svn`
/// directories, in a stable order: inputs in argument order, each
/// directory's contents in `WalkDir`'s sorted-by-name order.
pub fn discover(paths: &[PathBuf]) -> Result<Vec<PathBuf>, EngineError> {
    let mut files = Vec::new();
    for root in paths {
        let metadata = std::fs::metadata(root).map_err(|source| EngineError::Io {
            path: root.clone(),
            source,
        })?;
        if metadata.is_file() {
            if is_script_extension(root) && !is_vcs_path(root) {
                files.push(root.clone());
            }
            continue;
        }

        let mut entries: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_script_extension(p) && !is_vcs_path(p))
            .collect();
        entries.sort();
        files.extend(entries);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_sql_and_bq_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("b.bq"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("c.txt"), "not sql").unwrap();

        let files = discover(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn skips_vcs_directories() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        fs::create_dir(&git_dir).unwrap();
        fs::write(git_dir.join("hooks.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("real.sql"), "SELECT 1;").unwrap();

        let files = discover(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name().unwrap(), "real.sql");
    }

    #[test]
    fn missing_path_is_an_io_error() {
        let err = discover(&[PathBuf::from("/nonexistent/path")]).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
