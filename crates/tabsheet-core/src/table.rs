//! The row store: an ID-indexed, rectangular sheet of string cells
//!
//! Rows live in an arena of slots addressed by a stable index; the map from
//! normalized row ID to slot is kept as a separate layer. Slot 0 always holds
//! the header row under the configured header key.

use crate::config::{normalize_key, SheetConfig};
use crate::error::{Error, Result};
use crate::policy::{merged_value, MergeMode};
use crate::value::is_blank;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// One row of cells; its length always equals the header length
pub type Row = Vec<String>;

static SHEET_SEQ: AtomicUsize = AtomicUsize::new(1);

/// A row stored in the arena together with its normalized key
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) key: String,
    pub(crate) cells: Row,
}

/// What [`Sheet::remove_cell`] took out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removed {
    /// The previous value of a single cell
    Cell(String),
    /// A whole row
    Row(Row),
}

/// An ID-indexed table of string cells
#[derive(Debug, Clone)]
pub struct Sheet {
    pub(crate) config: SheetConfig,
    pub(crate) slots: Vec<Option<Slot>>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) id_column: usize,
    /// Suffix appended to synthesized headers and IDs so that independent
    /// sheets do not collide when merged
    pub(crate) tag: String,
}

impl Default for Sheet {
    fn default() -> Self {
        Self::new()
    }
}

impl Sheet {
    /// Create an empty sheet with a single `ID` column
    pub fn new() -> Self {
        Self::with_config(SheetConfig::default())
    }

    /// Create an empty sheet using the given reserved names
    pub fn with_config(config: SheetConfig) -> Self {
        let seq = SHEET_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut sheet = Self {
            config,
            slots: Vec::new(),
            index: HashMap::new(),
            id_column: 0,
            tag: format!("_s{:04}", seq),
        };
        sheet.clear();
        sheet
    }

    /// Reset to a single header row holding `ID`
    pub fn clear(&mut self) {
        let key = normalize_key(&self.config.header_key);
        self.slots = vec![Some(Slot {
            key: key.clone(),
            cells: vec!["ID".to_string()],
        })];
        self.index = HashMap::from([(key, 0)]);
        self.id_column = 0;
    }

    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    /// Index of the column holding each row's own ID
    pub fn id_column(&self) -> usize {
        self.id_column
    }

    /// Tag used for synthesized headers and IDs of this sheet
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.headers().len()
    }

    /// Get the number of data rows (the header row is not counted)
    pub fn row_count(&self) -> usize {
        self.index.len() - 1
    }

    /// True if the sheet holds nothing but the default header
    pub fn is_empty(&self) -> bool {
        self.column_count() <= 1 && self.row_count() == 0
    }

    /// The header row
    pub fn headers(&self) -> &[String] {
        &self.header_slot().cells
    }

    /// Headers that do not carry the lock prefix, with their indices
    pub fn visible_headers(&self) -> Vec<(usize, &str)> {
        self.headers()
            .iter()
            .enumerate()
            .filter(|(_, h)| !self.config.is_locked(h))
            .map(|(i, h)| (i, h.as_str()))
            .collect()
    }

    fn header_slot(&self) -> &Slot {
        match self.slots.first() {
            Some(Some(slot)) => slot,
            _ => unreachable!("slot 0 always holds the header row"),
        }
    }

    pub(crate) fn headers_mut(&mut self) -> &mut Row {
        match self.slots.first_mut() {
            Some(Some(slot)) => &mut slot.cells,
            _ => unreachable!("slot 0 always holds the header row"),
        }
    }

    /// Iterate over `(key, row)` pairs in insertion order, header first
    pub fn rows(&self) -> impl Iterator<Item = (&str, &Row)> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| (slot.key.as_str(), &slot.cells))
    }

    /// Iterate over data rows only
    pub fn data_rows(&self) -> impl Iterator<Item = (&str, &Row)> {
        self.rows().skip(1)
    }

    pub(crate) fn rows_mut(&mut self) -> impl Iterator<Item = &mut Row> {
        self.slots.iter_mut().flatten().map(|slot| &mut slot.cells)
    }

    /// Normalized keys of all rows, header first
    pub(crate) fn row_keys(&self) -> Vec<String> {
        self.rows().map(|(key, _)| key.to_string()).collect()
    }

    pub(crate) fn is_header_key(&self, key: &str) -> bool {
        normalize_key(key) == normalize_key(&self.config.header_key)
    }

    /// Get the row of an ID
    pub fn get(&self, id: &str) -> Option<&Row> {
        let slot = *self.index.get(&normalize_key(id))?;
        self.slots[slot].as_ref().map(|s| &s.cells)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Row> {
        let slot = *self.index.get(&normalize_key(id))?;
        self.slots[slot].as_mut().map(|s| &mut s.cells)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(&normalize_key(id))
    }

    /// Store a row verbatim under the normalized ID, replacing any previous row
    ///
    /// The caller is responsible for the row's width.
    pub fn set(&mut self, id: &str, row: Row) -> Result<()> {
        if self.is_header_key(id) {
            return Err(Error::structural(format!(
                "'{}' is reserved for the header row",
                id.trim()
            )));
        }
        self.insert_slot(normalize_key(id), row);
        Ok(())
    }

    pub(crate) fn insert_slot(&mut self, key: String, row: Row) {
        match self.index.get(&key) {
            Some(&slot) => {
                if let Some(s) = self.slots[slot].as_mut() {
                    s.cells = row;
                }
            }
            None => {
                self.index.insert(key.clone(), self.slots.len());
                self.slots.push(Some(Slot { key, cells: row }));
            }
        }
    }

    /// Remove a row; absent IDs are a no-op
    pub fn delete(&mut self, id: &str) -> Result<Option<Row>> {
        if self.is_header_key(id) {
            return Err(Error::structural("the header row cannot be deleted"));
        }
        let row = self.remove_slot(&normalize_key(id));
        Ok(row)
    }

    pub(crate) fn remove_slot(&mut self, key: &str) -> Option<Row> {
        let slot = self.index.remove(key)?;
        let row = self.slots[slot].take().map(|s| s.cells);
        if self.slots.len() > 32 && self.index.len() * 2 < self.slots.len() {
            self.compact();
        }
        row
    }

    /// Drop tombstoned slots and rebuild the ID map
    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        self.index = self
            .slots
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, slot)| (slot.key.clone(), i))
            .collect();
    }

    /// IDs (as stored in the ID column) of the rows, in insertion order
    ///
    /// `headers` includes the header row, `exclude` skips rows flagged in the
    /// exclude column, `locked_rows` includes rows whose key carries the lock
    /// prefix.
    pub fn keys(&self, headers: bool, exclude: bool, locked_rows: bool) -> Vec<String> {
        self.rows()
            .filter(|(key, _)| headers || !self.is_header_key(key))
            .filter(|(key, _)| locked_rows || !self.config.is_locked(key))
            .filter(|(key, _)| !exclude || !self.excluded(key))
            .filter_map(|(_, row)| row.get(self.id_column).cloned())
            .collect()
    }

    /// IDs of all visible data rows
    pub fn ids(&self) -> Vec<String> {
        self.keys(false, true, false)
    }

    /// Position of a column by name (case and lock-marker insensitive)
    fn find_header(&self, name: &str) -> Option<usize> {
        let wanted = self.config.normalize_header(name);
        self.headers()
            .iter()
            .position(|h| self.config.normalize_header(h) == wanted)
    }

    /// Resolve a column reference given either as a header name or as an index
    ///
    /// Names take precedence; a non-negative integer string in range is taken
    /// as an index. Returns `None` for anything else.
    pub fn header_index(&self, name_or_index: &str) -> Option<usize> {
        if let Some(index) = self.find_header(name_or_index) {
            return Some(index);
        }
        let trimmed = name_or_index.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = trimmed.parse::<usize>() {
                if index < self.column_count() {
                    return Some(index);
                }
            }
        }
        None
    }

    pub fn contains_column(&self, name_or_index: &str) -> bool {
        self.header_index(name_or_index).is_some()
    }

    /// Insert a blank locked column
    ///
    /// If a column with the same normalized name exists, nothing changes and
    /// its index is returned. Without an index, the column goes to the first
    /// position after the ID column that does not already hold a locked column.
    pub fn insert_column(&mut self, name: &str, index: Option<usize>) -> Result<usize> {
        self.check_rectangular()?;
        if let Some(existing) = self.find_header(name) {
            return Ok(existing);
        }
        let width = self.column_count();
        let index = match index {
            Some(index) if index > width => {
                return Err(Error::structural(format!(
                    "column index {} is not in a valid range [0-{}]",
                    index, width
                )));
            }
            Some(index) => index,
            None => {
                let mut index = self.id_column + 1;
                while index < width && self.config.is_locked(&self.headers()[index]) {
                    index += 1;
                }
                index
            }
        };

        let header = self.config.locked_name(name);
        self.headers_mut().insert(index, header);
        for row in self.rows_mut().skip(1) {
            row.insert(index, String::new());
        }
        if index <= self.id_column {
            self.id_column += 1;
        }
        Ok(index)
    }

    /// Append a visible column at the end of the sheet
    pub fn append_column(&mut self, name: &str) -> Result<usize> {
        if let Some(existing) = self.find_header(name) {
            return Ok(existing);
        }
        self.headers_mut().push(name.trim().to_string());
        self.expand()?;
        Ok(self.column_count() - 1)
    }

    /// Remove columns by index
    ///
    /// Nothing is removed if any index is the ID column or out of range, or
    /// if the sheet is not rectangular.
    pub fn remove_columns(&mut self, indices: &[usize]) -> Result<()> {
        self.check_rectangular()?;
        let width = self.column_count();
        let mut cols = indices.to_vec();
        cols.sort_unstable_by(|a, b| b.cmp(a));
        cols.dedup();
        if cols.len() != indices.len() {
            warn!("non-unique columns requested for removal; make sure all headers are unique and non-blank");
        }
        for &c in &cols {
            if c == self.id_column {
                return Err(Error::structural("cannot remove the ID column"));
            }
            if c >= width {
                return Err(Error::structural(format!(
                    "column {} is not in a valid range [0-{}]",
                    c,
                    width.saturating_sub(1)
                )));
            }
        }

        let shift = cols.iter().filter(|&&c| c < self.id_column).count();
        self.id_column -= shift;
        for row in self.rows_mut() {
            for &c in &cols {
                row.remove(c);
            }
        }
        Ok(())
    }

    /// Blank-pad every row to the header length
    pub fn expand(&mut self) -> Result<()> {
        self.check_not_wider()?;
        let width = self.column_count();
        for row in self.rows_mut() {
            row.resize(width, String::new());
        }
        Ok(())
    }

    fn check_not_wider(&self) -> Result<()> {
        let width = self.column_count();
        match self.data_rows().find(|(_, row)| row.len() > width) {
            Some((key, row)) => Err(Error::structural(format!(
                "row '{}' has {} cells, more than the {} headers",
                key,
                row.len(),
                width
            ))),
            None => Ok(()),
        }
    }

    /// Fail unless every row has exactly the header's length
    pub fn check_rectangular(&self) -> Result<()> {
        let width = self.column_count();
        match self.data_rows().find(|(_, row)| row.len() != width) {
            Some((key, row)) => Err(Error::structural(format!(
                "row '{}' has {} cells but there are {} headers",
                key,
                row.len(),
                width
            ))),
            None if self.id_column >= width => Err(Error::structural(format!(
                "ID column {} is out of range (maximum is {})",
                self.id_column,
                width.saturating_sub(1)
            ))),
            None => Ok(()),
        }
    }

    /// Rename a column header
    pub fn rename_header(&mut self, header: &str, new_name: &str) -> Result<()> {
        let index = self.header_index(header).ok_or_else(|| {
            Error::structural(format!("cannot rename, no such header: {}", header))
        })?;
        if let Some(other) = self.find_header(new_name) {
            if other != index {
                return Err(Error::structural(format!(
                    "cannot rename '{}' to '{}', the header already exists",
                    header, new_name
                )));
            }
        }
        self.headers_mut()[index] = new_name.trim().to_string();
        Ok(())
    }

    /// Re-key a row and store `new_id` in its ID cell
    pub fn rename_key(&mut self, key: &str, new_id: &str) -> Result<()> {
        if self.is_header_key(key) || self.is_header_key(new_id) {
            return Err(Error::structural("the header row cannot be re-keyed"));
        }
        let old_key = normalize_key(key);
        let new_key = normalize_key(new_id);
        let slot = *self
            .index
            .get(&old_key)
            .ok_or_else(|| Error::structural(format!("cannot rename, no such key: {}", key)))?;
        if old_key == new_key {
            return Ok(());
        }
        if self.index.contains_key(&new_key) {
            return Err(Error::structural(format!(
                "cannot rename '{}' to '{}', the key already exists",
                key, new_id
            )));
        }

        self.index.remove(&old_key);
        self.index.insert(new_key.clone(), slot);
        let id_column = self.id_column;
        if let Some(s) = self.slots[slot].as_mut() {
            s.key = new_key;
            if let Some(cell) = s.cells.get_mut(id_column) {
                *cell = new_id.to_string();
            }
        }
        Ok(())
    }

    /// Write a single cell, creating the row and the column when needed
    ///
    /// Unknown visible headers are appended at the end; unknown locked headers
    /// are inserted next to the other locked columns. The value is merged into
    /// the existing cell with `mode`. Without a header only the row is created.
    pub fn add_cell(
        &mut self,
        id: &str,
        header: Option<&str>,
        value: Option<&str>,
        mode: MergeMode,
    ) -> Result<()> {
        self.check_rectangular()?;
        if self.is_header_key(id) {
            return Err(Error::structural(format!(
                "'{}' is reserved for the header row",
                id.trim()
            )));
        }
        if !self.contains(id) {
            let mut row = vec![String::new(); self.column_count()];
            row[self.id_column] = id.trim().to_string();
            self.set(id, row)?;
        }
        let Some(header) = header else {
            return Ok(());
        };

        let header = header.trim();
        let column = match self.header_index(header) {
            Some(column) => column,
            None if self.config.is_locked(header) => self.insert_column(header, None)?,
            None => self.append_column(header)?,
        };
        if column == self.id_column {
            return Err(Error::structural(format!(
                "cannot write '{}' into the ID column; rename the row instead",
                value.unwrap_or_default()
            )));
        }

        let separator = self.config.append_separator.clone();
        if let Some(row) = self.get_mut(id) {
            row[column] = merged_value(&row[column], value.unwrap_or_default(), mode, &separator);
        }
        Ok(())
    }

    /// Blank a cell and return its previous value, or remove the whole row
    /// when no header is given
    ///
    /// Unknown rows or headers return `None`.
    pub fn remove_cell(&mut self, id: &str, header: Option<&str>) -> Result<Option<Removed>> {
        self.check_rectangular()?;
        if !self.contains(id) {
            return Ok(None);
        }
        match header {
            Some(header) => {
                let Some(column) = self.header_index(header.trim()) else {
                    return Ok(None);
                };
                if column == self.id_column {
                    return Err(Error::structural(
                        "cannot blank the ID column; remove the row instead",
                    ));
                }
                Ok(self
                    .get_mut(id)
                    .map(|row| Removed::Cell(std::mem::take(&mut row[column]))))
            }
            None => Ok(self.delete(id)?.map(Removed::Row)),
        }
    }

    /// Fill every blank data cell with `zero`
    pub fn zero_fill(&mut self, zero: &str) {
        for row in self.rows_mut().skip(1) {
            for cell in row.iter_mut().filter(|c| is_blank(c)) {
                *cell = zero.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sheet {
        Sheet::from_rows(vec![
            vec!["ID", "H1"],
            vec!["1", "a"],
            vec!["2", "b"],
        ])
        .unwrap()
    }

    fn assert_rectangular(sheet: &Sheet) {
        sheet.check_rectangular().unwrap();
    }

    #[test]
    fn test_new_sheet() {
        let sheet = Sheet::new();
        assert_eq!(sheet.headers(), &["ID".to_string()]);
        assert!(sheet.is_empty());
        assert_eq!(sheet.row_count(), 0);
    }

    #[test]
    fn test_header_index_and_get() {
        let sheet = sample();
        assert_eq!(sheet.header_index("h1"), Some(1));
        assert_eq!(sheet.header_index("__H1"), Some(1));
        assert_eq!(sheet.header_index("1"), Some(1));
        assert_eq!(sheet.header_index("2"), None);
        assert_eq!(sheet.header_index("nope"), None);
        assert_eq!(sheet.get("1"), Some(&vec!["1".to_string(), "a".to_string()]));
        assert_eq!(sheet.get(" 2 "), Some(&vec!["2".to_string(), "b".to_string()]));
        assert_eq!(sheet.get("3"), None);
    }

    #[test]
    fn test_insert_column_at_index() {
        let mut sheet = sample();
        assert_eq!(sheet.insert_column("Note", Some(1)).unwrap(), 1);
        assert_eq!(sheet.headers(), &["ID", "__Note", "H1"]);
        assert_eq!(sheet.get("1").unwrap(), &["1", "", "a"]);
        assert_eq!(sheet.get("2").unwrap(), &["2", "", "b"]);
        assert_rectangular(&sheet);

        // Same normalized name is a no-op
        assert_eq!(sheet.insert_column("note", None).unwrap(), 1);
        assert_eq!(sheet.column_count(), 3);
    }

    #[test]
    fn test_insert_column_default_position_skips_locked() {
        let mut sheet = sample();
        sheet.insert_column("A", None).unwrap();
        sheet.insert_column("B", None).unwrap();
        assert_eq!(sheet.headers(), &["ID", "__A", "__B", "H1"]);
    }

    #[test]
    fn test_insert_before_id_column_shifts_it() {
        let mut sheet = sample();
        sheet.insert_column("Front", Some(0)).unwrap();
        assert_eq!(sheet.id_column(), 1);
        assert_eq!(sheet.headers()[1], "ID");
        assert!(sheet.insert_column("Far", Some(10)).is_err());
    }

    #[test]
    fn test_remove_columns() {
        let mut sheet = Sheet::from_rows(vec![
            vec!["A", "ID", "B", "C"],
            vec!["a", "1", "b", "c"],
        ])
        .unwrap();
        sheet.id_column = 1;
        assert!(sheet.remove_columns(&[3, 1]).is_err());
        assert_eq!(sheet.column_count(), 4);

        sheet.remove_columns(&[0, 3, 3]).unwrap();
        assert_eq!(sheet.headers(), &["ID", "B"]);
        assert_eq!(sheet.id_column(), 0);
        assert_rectangular(&sheet);
        assert!(sheet.remove_columns(&[5]).is_err());
    }

    #[test]
    fn test_expand_pads_and_rejects_wide_rows() {
        let mut sheet = sample();
        sheet.set("3", vec!["3".to_string()]).unwrap();
        sheet.expand().unwrap();
        assert_eq!(sheet.get("3").unwrap(), &["3", ""]);

        sheet
            .set("4", vec!["4".into(), "x".into(), "y".into()])
            .unwrap();
        assert!(matches!(sheet.expand(), Err(Error::Structural(_))));
    }

    #[test]
    fn test_set_and_delete() {
        let mut sheet = sample();
        assert!(sheet.set("__HEADER__", vec![]).is_err());
        assert!(sheet.delete("__header__").is_err());
        assert_eq!(sheet.delete("42").unwrap(), None);
        assert!(sheet.delete("1").unwrap().is_some());
        assert_eq!(sheet.row_count(), 1);
        assert_eq!(sheet.ids(), vec!["2"]);
    }

    #[test]
    fn test_rename() {
        let mut sheet = sample();
        sheet.rename_header("h1", "Letter").unwrap();
        assert_eq!(sheet.headers(), &["ID", "Letter"]);
        assert!(sheet.rename_header("missing", "x").is_err());
        assert!(sheet.rename_header("letter", "id").is_err());

        sheet.rename_key("1", "One").unwrap();
        assert!(sheet.get("1").is_none());
        assert_eq!(sheet.get("one").unwrap(), &["One", "a"]);
        assert!(sheet.rename_key("one", "2").is_err());
        assert!(sheet.rename_key("nope", "3").is_err());
        assert!(sheet.rename_key("__header__", "3").is_err());
    }

    #[test]
    fn test_add_and_remove_cells() {
        let mut sheet = sample();
        sheet
            .add_cell("3", Some("Age"), Some("38"), MergeMode::Overwrite)
            .unwrap();
        assert_eq!(sheet.headers(), &["ID", "H1", "Age"]);
        assert_eq!(sheet.get("3").unwrap(), &["3", "", "38"]);
        assert_rectangular(&sheet);

        sheet
            .add_cell("3", Some("age"), Some("39"), MergeMode::Append)
            .unwrap();
        assert_eq!(sheet.get("3").unwrap()[2], "38;39");

        sheet
            .add_cell("1", Some("__exclude__"), Some("x"), MergeMode::Overwrite)
            .unwrap();
        assert_eq!(sheet.headers(), &["ID", "__exclude__", "H1", "Age"]);

        assert_eq!(
            sheet.remove_cell("3", Some("Age")).unwrap(),
            Some(Removed::Cell("38;39".to_string()))
        );
        assert_eq!(sheet.remove_cell("3", Some("Nope")).unwrap(), None);
        assert!(sheet.remove_cell("3", Some("ID")).is_err());
        assert!(matches!(
            sheet.remove_cell("3", None).unwrap(),
            Some(Removed::Row(_))
        ));
        assert_eq!(sheet.remove_cell("3", None).unwrap(), None);
    }

    #[test]
    fn test_ragged_sheet_is_a_structural_error() {
        let mut sheet = sample();
        sheet.set("2", vec!["2".to_string()]).unwrap();

        assert!(matches!(sheet.insert_column("N", Some(2)), Err(Error::Structural(_))));
        assert!(matches!(
            sheet.add_cell("2", Some("H1"), Some("x"), MergeMode::Overwrite),
            Err(Error::Structural(_))
        ));
        assert!(matches!(sheet.remove_cell("2", Some("H1")), Err(Error::Structural(_))));
        assert!(matches!(sheet.remove_columns(&[1]), Err(Error::Structural(_))));
        assert_eq!(sheet.headers(), &["ID", "H1"]);
        assert_eq!(sheet.get("1").unwrap(), &["1", "a"]);

        sheet.expand().unwrap();
        sheet.insert_column("N", Some(2)).unwrap();
        assert_eq!(sheet.get("2").unwrap(), &["2", "", ""]);
    }

    #[test]
    fn test_zero_fill() {
        let mut sheet = sample();
        sheet.insert_column("Z", None).unwrap();
        sheet.zero_fill("0");
        assert_eq!(sheet.get("1").unwrap(), &["1", "0", "a"]);
        assert_eq!(sheet.headers(), &["ID", "__Z", "H1"]);
    }

    #[test]
    fn test_compaction_keeps_order() {
        let mut sheet = Sheet::new();
        for i in 0..100 {
            sheet.set(&i.to_string(), vec![i.to_string()]).unwrap();
        }
        for i in 0..80 {
            sheet.delete(&i.to_string()).unwrap();
        }
        let keys: Vec<String> = sheet.data_rows().map(|(k, _)| k.to_string()).collect();
        let expected: Vec<String> = (80..100).map(|i| i.to_string()).collect();
        assert_eq!(keys, expected);
        assert_eq!(sheet.get("95").unwrap(), &["95"]);
        assert_eq!(sheet.headers(), &["ID"]);
    }
}
