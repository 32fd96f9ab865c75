//! Merge engine: structural union of two sheets and folding of related
//! columns
//!
//! Every public operation works on a staged copy of the sheet and only
//! replaces it once the whole operation succeeded, so a failure never leaves
//! a half-merged sheet behind.

use crate::config::normalize_key;
use crate::error::{Error, Result};
use crate::parser::LoadOptions;
use crate::policy::{merged_value, MergeMode};
use crate::table::{Row, Sheet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Something that can be merged into a sheet
#[derive(Debug, Clone)]
pub enum MergeInput {
    Sheet(Sheet),
    /// Raw records, header first, loaded with default options
    RawRows(Vec<Vec<String>>),
}

impl From<Sheet> for MergeInput {
    fn from(sheet: Sheet) -> Self {
        MergeInput::Sheet(sheet)
    }
}

impl From<Vec<Vec<String>>> for MergeInput {
    fn from(rows: Vec<Vec<String>>) -> Self {
        MergeInput::RawRows(rows)
    }
}

impl MergeInput {
    fn into_sheet(self, like: &Sheet) -> Result<Sheet> {
        match self {
            MergeInput::Sheet(sheet) => Ok(sheet),
            MergeInput::RawRows(rows) => {
                let mut sheet = Sheet::with_config(like.config.clone());
                sheet.load(rows, &LoadOptions::default())?;
                Ok(sheet)
            }
        }
    }
}

/// A target column and the keywords of the headers folded into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationGroup {
    pub header: String,
    pub keywords: Vec<String>,
}

impl ConsolidationGroup {
    /// Without keywords the header itself is the keyword
    pub fn new(header: &str, keywords: &[&str]) -> Self {
        let header = header.trim().to_string();
        let keywords = if keywords.is_empty() {
            vec![header.to_lowercase()]
        } else {
            keywords.iter().map(|k| k.to_lowercase()).collect()
        };
        Self { header, keywords }
    }

    /// Build a group from `[header, keyword...]`
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        let (header, keywords) = tokens.split_first().ok_or_else(|| {
            Error::InvalidCall("a consolidation needs at least a header".to_string())
        })?;
        let keywords: Vec<&str> = keywords.iter().map(AsRef::as_ref).collect();
        Ok(Self::new(header.as_ref(), &keywords))
    }

    fn matches(&self, header: &str) -> bool {
        let header = header.to_lowercase();
        self.keywords.iter().any(|k| header.contains(k.as_str()))
    }
}

impl Sheet {
    /// Union another sheet into this one
    ///
    /// Rows present on both sides are concatenated, rows only present in
    /// `other` are added left-padded with blanks, and rows only present here
    /// are padded on the right. When anything was merged, the other side's ID
    /// header is renamed to this sheet's ID header so that a following
    /// [`Sheet::contract`] unifies the two ID columns.
    pub fn combine(&mut self, other: impl Into<MergeInput>) -> Result<()> {
        let other = other.into().into_sheet(self)?;
        let mut staged = self.clone();
        staged.combine_in_place(other)?;
        *self = staged;
        Ok(())
    }

    fn combine_in_place(&mut self, other: Sheet) -> Result<()> {
        let old_width = self.column_count();
        let other_id_column = other.id_column;

        let mut other_rows = other.slots.into_iter().flatten();
        let other_header = other_rows.next().map(|slot| slot.cells).unwrap_or_default();
        let mut order: Vec<String> = Vec::new();
        let mut pending: HashMap<String, Row> = HashMap::new();
        for slot in other_rows {
            if pending.insert(slot.key.clone(), slot.cells).is_none() {
                order.push(slot.key);
            }
        }

        let mut merged = false;
        if !other_header.is_empty() {
            self.headers_mut().extend(other_header);
            merged = true;
        }
        for key in self.row_keys().into_iter().skip(1) {
            let Some(cells) = pending.remove(&key) else {
                continue;
            };
            if cells.is_empty() {
                continue;
            }
            if let Some(row) = self.get_mut(&key) {
                row.resize(old_width, String::new());
                row.extend(cells);
                merged = true;
            }
        }
        for key in order {
            if let Some(cells) = pending.remove(&key) {
                let mut row = vec![String::new(); old_width];
                row.extend(cells);
                self.insert_slot(key, row);
                merged = true;
            }
        }

        self.expand()?;
        if merged {
            let id_header = self.headers()[self.id_column].clone();
            if let Some(header) = self.headers_mut().get_mut(old_width + other_id_column) {
                *header = id_header;
            }
        }
        debug!(
            columns = self.column_count(),
            rows = self.row_count(),
            "combined sheets"
        );
        Ok(())
    }

    /// Fold together columns whose headers are equal once normalized
    ///
    /// The leftmost column of each set keeps the merged values, the others are
    /// removed. The ID column always merges in overwrite mode and re-keys its
    /// rows. Applying it twice changes nothing.
    pub fn contract(&mut self, mode: MergeMode) -> Result<()> {
        let mut staged = self.clone();
        staged.contract_in_place(mode)?;
        *self = staged;
        Ok(())
    }

    fn contract_in_place(&mut self, mode: MergeMode) -> Result<()> {
        self.check_rectangular()?;
        let names: Vec<String> = self
            .headers()
            .iter()
            .map(|h| self.config.normalize_header(h))
            .collect();
        let mut folded = vec![false; names.len()];
        let mut pairs = Vec::new();
        for i in 0..names.len() {
            if folded[i] {
                continue;
            }
            for j in i + 1..names.len() {
                if !folded[j] && names[i] == names[j] {
                    if j == self.id_column {
                        return Err(Error::structural(format!(
                            "column '{}' duplicates the ID column header and would replace it",
                            self.headers()[i]
                        )));
                    }
                    folded[j] = true;
                    pairs.push((i, j));
                }
            }
        }
        if pairs.is_empty() {
            return Ok(());
        }

        let separator = self.config.append_separator.clone();
        for &(i, j) in &pairs {
            debug!(into = i, from = j, "contracting column");
            for key in self.row_keys().into_iter().skip(1) {
                if i == self.id_column {
                    let id = match self.get(&key) {
                        Some(row) => merged_value(&row[i], &row[j], MergeMode::Overwrite, &separator),
                        None => continue,
                    };
                    if id.is_empty() {
                        continue;
                    }
                    if normalize_key(&id) == key {
                        if let Some(row) = self.get_mut(&key) {
                            row[i] = id;
                        }
                    } else {
                        self.rename_key(&key, &id)?;
                    }
                } else if let Some(row) = self.get_mut(&key) {
                    row[i] = merged_value(&row[i], &row[j], mode, &separator);
                }
            }
        }

        let removed: Vec<usize> = pairs.iter().map(|&(_, j)| j).collect();
        self.remove_columns(&removed)
    }

    /// Fold related columns into new locked target columns
    ///
    /// The sheet is contracted first. Then one locked column per group is
    /// inserted, and every visible column whose header contains one of a
    /// group's keywords is merged into that group's target for all visible
    /// rows; the first matching group wins. With `clean_up` the folded
    /// columns are removed afterwards.
    pub fn consolidate(
        &mut self,
        groups: &[ConsolidationGroup],
        clean_up: bool,
        mode: MergeMode,
    ) -> Result<()> {
        let mut staged = self.clone();
        staged.contract_in_place(mode)?;
        if !groups.is_empty() {
            staged.consolidate_in_place(groups, clean_up, mode)?;
        }
        *self = staged;
        Ok(())
    }

    fn consolidate_in_place(
        &mut self,
        groups: &[ConsolidationGroup],
        clean_up: bool,
        mode: MergeMode,
    ) -> Result<()> {
        self.check_rectangular()?;
        for group in groups {
            self.insert_column(&group.header, None)?;
        }
        let targets = groups
            .iter()
            .map(|group| {
                self.header_index(&group.header).ok_or_else(|| {
                    Error::structural(format!("consolidation column '{}' is missing", group.header))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        let rows: Vec<String> = self
            .data_rows()
            .map(|(key, _)| key)
            .filter(|key| !self.config.is_locked(key) && !self.excluded(key))
            .map(str::to_string)
            .collect();
        let separator = self.config.append_separator.clone();

        let mut folded = Vec::new();
        for column in 0..self.column_count() {
            let header = &self.headers()[column];
            if column == self.id_column || self.config.is_locked(header) {
                continue;
            }
            let target = groups
                .iter()
                .zip(targets.iter().copied())
                .find(|(group, target)| *target != column && group.matches(header))
                .map(|(_, target)| target);
            let Some(target) = target else {
                continue;
            };

            debug!(from = column, into = target, "consolidating column");
            for key in &rows {
                if let Some(row) = self.get_mut(key) {
                    row[target] = merged_value(&row[target], &row[column], mode, &separator);
                }
            }
            folded.push(column);
        }

        if clean_up && !folded.is_empty() {
            self.remove_columns(&folded)?;
        }
        Ok(())
    }
}
