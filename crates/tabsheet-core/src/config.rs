//! Reserved-name conventions shared by every sheet

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Names and markers reserved by the engine
///
/// Every [`Sheet`](crate::Sheet) carries one of these. Files written with
/// one set of names are read back correctly only with the same set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    /// Key of the row that holds the column labels
    pub header_key: String,
    /// Prefix marking a column (or row ID) as locked
    pub lock_prefix: String,
    /// Header of the column flagging rows for exclusion
    pub exclude_header: String,
    /// Header of the synthetic ID column appended when IDs are auto-generated
    pub auto_id_header: String,
    /// Minimum number of fields for an input line to be kept
    pub min_line_len: usize,
    /// Input lines whose first field starts with this are discarded
    pub comment_prefix: String,
    /// Separator used when appending values in consolidated cells
    pub append_separator: String,
    /// Placeholder marking a row that failed a query predicate
    pub filter_marker: String,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            header_key: "__header__".to_string(),
            lock_prefix: "__".to_string(),
            exclude_header: "__exclude__".to_string(),
            auto_id_header: "__AutoID__".to_string(),
            min_line_len: 2,
            comment_prefix: "#".to_string(),
            append_separator: ";".to_string(),
            filter_marker: "__flag__".to_string(),
        }
    }
}

impl SheetConfig {
    /// Load a configuration from JSON; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// True if a header or ID carries the lock prefix
    pub fn is_locked(&self, name: &str) -> bool {
        !self.lock_prefix.is_empty() && name.starts_with(&self.lock_prefix)
    }

    /// Add the lock prefix to a name unless it is already there
    pub fn locked_name(&self, name: &str) -> String {
        let name = name.trim();
        if self.is_locked(name) {
            name.to_string()
        } else {
            format!("{}{}", self.lock_prefix, name)
        }
    }

    /// Remove every occurrence of the lock marker, for display
    pub fn strip_lock(&self, name: &str) -> String {
        if self.lock_prefix.is_empty() {
            name.to_string()
        } else {
            name.replace(&self.lock_prefix, "")
        }
    }

    /// Lower-cased, trimmed, lock-marker-free form used to compare headers
    pub fn normalize_header(&self, name: &str) -> String {
        self.strip_lock(&normalize_key(name))
    }
}

/// Canonical form of a row ID: trimmed and lower-cased
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        let config = SheetConfig::default();
        assert_eq!(config.normalize_header(" __Exclude__ "), "exclude");
        assert_eq!(config.normalize_header("H1"), "h1");
    }

    #[test]
    fn test_locked_name() {
        let config = SheetConfig::default();
        assert_eq!(config.locked_name("Note"), "__Note");
        assert_eq!(config.locked_name("__Note"), "__Note");
        assert!(config.is_locked("__AutoID__"));
        assert!(!config.is_locked("ID"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SheetConfig = serde_json::from_str(r#"{"append_separator": "|"}"#).unwrap();
        assert_eq!(config.append_separator, "|");
        assert_eq!(config.header_key, "__header__");
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.json");
        let config = SheetConfig {
            comment_prefix: "//".to_string(),
            ..SheetConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SheetConfig::load(&path).unwrap(), config);
    }
}
