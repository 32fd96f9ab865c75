//! Directory scanner for discovering delimited input files

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions picked up by the scanner (compared case-insensitively)
pub const INPUT_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Result of scanning directories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    /// Root directories that were scanned
    pub roots: Vec<PathBuf>,
    /// Input files found, sorted by path
    pub files: Vec<PathBuf>,
}

impl ScanResult {
    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// True if the path has one of the [`INPUT_EXTENSIONS`]
pub fn is_input_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            INPUT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Scan one or more directories for input files
///
/// Files are returned sorted and without duplicates, so that overlapping
/// roots load every file once and in a stable order. An unreadable root is
/// an error.
pub fn scan_inputs<P: AsRef<Path>>(roots: &[P]) -> Result<ScanResult> {
    let mut files = Vec::new();

    for root in roots {
        for entry in WalkDir::new(root.as_ref()).follow_links(true) {
            let entry = entry?;
            if entry.file_type().is_file() && is_input_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();

    Ok(ScanResult {
        roots: roots.iter().map(|r| r.as_ref().to_path_buf()).collect(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_input_file() {
        assert!(is_input_file(Path::new("a/b.csv")));
        assert!(is_input_file(Path::new("b.TSV")));
        assert!(is_input_file(Path::new("notes.txt")));
        assert!(!is_input_file(Path::new("b.json")));
        assert!(!is_input_file(Path::new("csv")));
    }

    #[test]
    fn test_scan_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(dir.path().join("b.csv"), "ID,A\n").unwrap();
        fs::write(dir.path().join("a.tsv"), "ID\tA\n").unwrap();
        fs::write(dir.path().join("skip.json"), "{}").unwrap();
        fs::write(nested.join("c.txt"), "ID,A\n").unwrap();

        let result = scan_inputs(&[dir.path(), nested.as_path()]).unwrap();
        let names: Vec<String> = result
            .files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(result.total_files(), 3);
        assert_eq!(names[0], "a.tsv");
        assert_eq!(names[1], "b.csv");
        assert!(names[2].ends_with("c.txt"));
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_inputs(&[dir.path().join("missing")]).is_err());
    }
}
