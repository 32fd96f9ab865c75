//! Cell edits: single-cell writes, reads and removals, and JSON edit scripts
//! that bundle them
//!
//! On the command line edits arrive as flat token lists (`ID HEADER VALUE
//! ...` for writes, `ID HEADER ...` for reads and removals). A header of
//! `none` addresses the whole row.

use crate::error::{Error, Result};
use crate::extract::Grab;
use crate::policy::MergeMode;
use crate::table::{Removed, Sheet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Header placeholder that targets a whole row
pub const WHOLE_ROW: &str = "none";

/// Separator used when a whole row is printed as one value
pub const ROW_JOIN: &str = "|";

/// A single edit to a cell or a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellEdit {
    /// Row ID
    pub id: String,
    /// Column; `None` (or `"none"`) addresses the whole row
    #[serde(default)]
    pub header: Option<String>,
    /// New value, only meaningful for writes
    #[serde(default)]
    pub value: Option<String>,
}

impl CellEdit {
    /// Create a new edit
    pub fn new(id: impl Into<String>, header: Option<&str>, value: Option<&str>) -> Self {
        Self {
            id: id.into(),
            header: header.map(str::to_string),
            value: value.map(str::to_string),
        }
    }

    /// The addressed header, or `None` for the whole row
    pub fn target(&self) -> Option<&str> {
        self.header
            .as_deref()
            .filter(|h| !h.trim().eq_ignore_ascii_case(WHOLE_ROW))
    }
}

fn chunk<S: AsRef<str>>(tokens: &[S], size: usize, form: &str) -> Result<Vec<CellEdit>> {
    if tokens.len() % size != 0 {
        let given: Vec<&str> = tokens.iter().map(AsRef::as_ref).collect();
        return Err(Error::InvalidCellEdit(format!(
            "cell entries must be of the form '{}': {}",
            form,
            given.join(" ")
        )));
    }
    Ok(tokens
        .chunks(size)
        .map(|c| {
            CellEdit::new(
                c[0].as_ref(),
                Some(c[1].as_ref()),
                c.get(2).map(AsRef::as_ref),
            )
        })
        .collect())
}

/// Split `ID HEADER VALUE ...` into write edits
pub fn chunk_writes<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<CellEdit>> {
    chunk(tokens, 3, "ID header value")
}

/// Split `ID HEADER ...` into read or removal edits
pub fn chunk_pairs<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<CellEdit>> {
    chunk(tokens, 2, "ID header")
}

/// Read one cell, or a whole row joined with `|`
pub fn read_cell(sheet: &Sheet, edit: &CellEdit) -> Result<Option<String>> {
    Ok(match sheet.grab(Some(&edit.id), edit.target(), None)? {
        Some(Grab::Cell(value)) => Some(value),
        Some(Grab::Row(row)) => Some(row.join(ROW_JOIN)),
        Some(Grab::Ids(ids)) => Some(ids.join(ROW_JOIN)),
        None => None,
    })
}

/// Render what a removal took out the way a read would print it
pub fn removed_text(removed: &Removed) -> String {
    match removed {
        Removed::Cell(value) => value.clone(),
        Removed::Row(row) => row.join(ROW_JOIN),
    }
}

/// A set of writes and removals, stored as JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditScript {
    #[serde(default)]
    pub writes: Vec<CellEdit>,
    #[serde(default)]
    pub removals: Vec<CellEdit>,
}

/// Outcome of applying an [`EditScript`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditReport {
    pub written: usize,
    /// What each successful removal took out, in order
    pub removed: Vec<Removed>,
    /// Removals whose row or header did not exist
    pub missing: usize,
}

impl EditScript {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.removals.is_empty()
    }

    /// Load an edit script from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the edit script to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Append another script's edits to this one
    pub fn extend(&mut self, other: EditScript) {
        self.writes.extend(other.writes);
        self.removals.extend(other.removals);
    }

    /// Apply removals, then writes
    ///
    /// Either every edit is applied or, on error, none is.
    pub fn apply(&self, sheet: &mut Sheet, mode: MergeMode) -> Result<EditReport> {
        let mut staged = sheet.clone();
        let mut report = EditReport::default();

        for edit in &self.removals {
            match staged.remove_cell(&edit.id, edit.target())? {
                Some(removed) => report.removed.push(removed),
                None => report.missing += 1,
            }
        }
        for edit in &self.writes {
            staged.add_cell(&edit.id, edit.target(), edit.value.as_deref(), mode)?;
            report.written += 1;
        }

        info!(
            written = report.written,
            removed = report.removed.len(),
            missing = report.missing,
            "applied cell edits"
        );
        *sheet = staged;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> Sheet {
        Sheet::from_rows(vec![
            vec!["ID", "Age", "Gender"],
            vec!["ID001", "38", "F"],
            vec!["ID002", "", "M"],
        ])
        .unwrap()
    }

    #[test]
    fn test_chunk_tokens() {
        let writes = chunk_writes(&["ID001", "Age", "38", "ID002", "none", "x"]).unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], CellEdit::new("ID001", Some("Age"), Some("38")));
        assert_eq!(writes[1].target(), None);

        let pairs = chunk_pairs(&["a", "b", "c", "NONE"]).unwrap();
        assert_eq!(pairs[1].target(), None);
        assert_eq!(pairs[0].value, None);

        assert!(matches!(
            chunk_writes(&["ID001", "Age"]),
            Err(Error::InvalidCellEdit(_))
        ));
        assert!(matches!(chunk_pairs(&["ID001"]), Err(Error::InvalidCellEdit(_))));
        assert!(chunk_pairs::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_read_cells() {
        let sheet = sheet();
        let edits = chunk_pairs(&["id001", "age", "ID002", "none", "ID003", "Age", "ID001", "Height"])
            .unwrap();
        let read: Vec<Option<String>> = edits
            .iter()
            .map(|e| read_cell(&sheet, e).unwrap())
            .collect();
        assert_eq!(
            read,
            vec![
                Some("38".to_string()),
                Some("ID002||M".to_string()),
                None,
                None,
            ]
        );
    }

    #[test]
    fn test_apply_script() {
        let mut sheet = sheet();
        let script = EditScript {
            writes: chunk_writes(&["ID003", "Age", "41", "ID001", "Age", "39", "ID004", "none", ""])
                .unwrap(),
            removals: chunk_pairs(&["ID002", "Gender", "ID009", "Age"]).unwrap(),
        };
        let report = script.apply(&mut sheet, MergeMode::Overwrite).unwrap();

        assert_eq!(report.written, 3);
        assert_eq!(report.removed, vec![Removed::Cell("M".to_string())]);
        assert_eq!(report.missing, 1);
        assert_eq!(sheet.get("ID001").unwrap(), &["ID001", "39", "F"]);
        assert_eq!(sheet.get("ID002").unwrap(), &["ID002", "", ""]);
        assert_eq!(sheet.get("ID003").unwrap(), &["ID003", "41", ""]);
        assert_eq!(sheet.get("ID004").unwrap(), &["ID004", "", ""]);
    }

    #[test]
    fn test_failed_script_changes_nothing() {
        let mut sheet = sheet();
        let script = EditScript {
            writes: chunk_writes(&["ID001", "Age", "40", "ID002", "ID", "x"]).unwrap(),
            removals: vec![],
        };
        assert!(script.apply(&mut sheet, MergeMode::Overwrite).is_err());
        assert_eq!(sheet.get("ID001").unwrap(), &["ID001", "38", "F"]);
    }

    #[test]
    fn test_script_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edits.json");
        let script = EditScript {
            writes: vec![CellEdit::new("r1", Some("Match"), Some("yes"))],
            removals: vec![CellEdit::new("r2", None, None)],
        };
        script.save(&path).unwrap();
        assert_eq!(EditScript::load(&path).unwrap(), script);

        let partial: EditScript =
            serde_json::from_str(r#"{"writes": [{"id": "r1", "header": "A", "value": "1"}]}"#)
                .unwrap();
        assert!(partial.removals.is_empty());
        assert!(EditScript::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_removed_text() {
        assert_eq!(removed_text(&Removed::Cell("x".into())), "x");
        assert_eq!(
            removed_text(&Removed::Row(vec!["a".into(), "".into(), "b".into()])),
            "a||b"
        );
    }
}
