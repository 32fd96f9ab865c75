//! Column and row extraction: hybrid columns, filtered column sets, single
//! cell lookups and column levels

use crate::colspec::{ColumnSpec, Operator, Selection};
use crate::config::normalize_key;
use crate::error::{Error, Result};
use crate::table::{Row, Sheet};
use crate::value::{is_blank, CellValue};
use std::collections::HashSet;

const LEVEL_ALL: &str = "all";

/// IDs paired with the joined values of one or more columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HybridColumn {
    pub ids: Vec<String>,
    pub values: Vec<String>,
}

impl HybridColumn {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over `(id, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ids
            .iter()
            .zip(self.values.iter())
            .map(|(id, value)| (id.as_str(), value.as_str()))
    }
}

/// Result of [`Sheet::grab`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grab {
    /// A whole row
    Row(Row),
    /// A single cell
    Cell(String),
    /// IDs matching a level
    Ids(Vec<String>),
}

/// The distinct non-blank values of a column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Levels {
    /// Values in first-seen order
    pub values: Vec<CellValue>,
    /// True when every level is a number
    pub numeric: bool,
}

impl Levels {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Sheet {
    fn exclude_column(&self) -> Option<usize> {
        self.header_index(&self.config.exclude_header)
    }

    /// True if the row's exclude cell is non-blank. The header row is never
    /// excluded.
    pub fn excluded(&self, id: &str) -> bool {
        if self.is_header_key(id) {
            return false;
        }
        let Some(column) = self.exclude_column() else {
            return false;
        };
        self.get(id)
            .and_then(|row| row.get(column))
            .is_some_and(|cell| !is_blank(cell))
    }

    /// Data rows in insertion order, skipping excluded rows when asked
    fn selected_rows(&self, exclude: bool) -> impl Iterator<Item = &Row> {
        let exclude_column = if exclude { self.exclude_column() } else { None };
        self.data_rows()
            .map(|(_, row)| row)
            .filter(move |row| match exclude_column {
                Some(column) => row.get(column).map_or(true, |cell| is_blank(cell)),
                None => true,
            })
    }

    /// Join the selected cells of every row into a single value
    ///
    /// A cell contributes when its selection has no predicate or the
    /// predicate holds, otherwise it contributes a blank. Blank contributions
    /// are left out of the join (`_`), and drop the row entirely when `blanks`
    /// is false.
    pub fn produce_column<S: AsRef<str>>(
        &self,
        tokens: &[S],
        blanks: bool,
        exclude: bool,
    ) -> Result<HybridColumn> {
        let spec = ColumnSpec::parse(tokens, self)?;
        Ok(self.hybrid_column(&spec, blanks, exclude))
    }

    /// [`Sheet::produce_column`] for an already parsed specification
    pub fn hybrid_column(&self, spec: &ColumnSpec, blanks: bool, exclude: bool) -> HybridColumn {
        let mut column = HybridColumn::default();
        for row in self.selected_rows(exclude) {
            let id = row.get(self.id_column).cloned().unwrap_or_default();
            let parts: Vec<&str> = spec
                .iter()
                .map(|selection| {
                    let cell = row.get(selection.index).map_or("", String::as_str);
                    match &selection.predicate {
                        Some((operator, argument)) if !operator.holds(cell, argument) => "",
                        _ => cell,
                    }
                })
                .collect();
            if !spec.is_empty() && !blanks && parts.iter().any(|p| is_blank(p)) {
                continue;
            }
            let joined = parts
                .into_iter()
                .filter(|p| !is_blank(p))
                .collect::<Vec<_>>()
                .join("_");
            column.ids.push(id);
            column.values.push(joined);
        }
        column
    }

    /// Extract columns row by row, header record first
    ///
    /// Each record starts with the row's ID. Rows where a predicate fails are
    /// dropped, except for `+` selections which transform the cell instead.
    /// An argument of `UNIQUE` keeps only the first accepted row for each
    /// value. With `blanks` false, rows with any blank value are dropped too.
    /// No tokens selects every column but the ID column.
    pub fn get_columns<S: AsRef<str>>(
        &self,
        tokens: &[S],
        blanks: bool,
        exclude: bool,
    ) -> Result<Vec<Row>> {
        let spec = match ColumnSpec::parse(tokens, self)? {
            spec if spec.is_empty() => ColumnSpec::all(self),
            spec => spec,
        };
        Ok(self.extract(&spec, blanks, exclude))
    }

    /// [`Sheet::get_columns`] for an already parsed, non-empty specification
    pub fn extract(&self, spec: &ColumnSpec, blanks: bool, exclude: bool) -> Vec<Row> {
        let marker = self.config.filter_marker.as_str();
        let mut records = vec![self.header_record(spec)];
        let mut seen: Vec<HashSet<String>> = vec![HashSet::new(); spec.len()];

        for row in self.selected_rows(exclude) {
            let values: Row = spec
                .iter()
                .zip(seen.iter())
                .map(|(selection, seen)| {
                    let cell = row.get(selection.index).map_or("", String::as_str);
                    select_value(selection, cell, seen, marker)
                })
                .collect();

            if values.iter().any(|v| v == marker) {
                continue;
            }
            if !blanks && values.iter().any(|v| is_blank(v)) {
                continue;
            }
            for (seen, value) in seen.iter_mut().zip(values.iter()) {
                seen.insert(value.clone());
            }
            let mut record = Vec::with_capacity(values.len() + 1);
            record.push(row.get(self.id_column).cloned().unwrap_or_default());
            record.extend(values);
            records.push(record);
        }
        records
    }

    fn header_record(&self, spec: &ColumnSpec) -> Row {
        let headers = self.headers();
        let mut record = vec![self.config.strip_lock(&headers[self.id_column])];
        for selection in spec.iter() {
            let mut name = self.config.strip_lock(&headers[selection.index]);
            if let Some((operator, argument)) = &selection.predicate {
                name.push(operator.symbol());
                name.push_str(&self.config.strip_lock(&argument.raw));
            }
            record.push(name);
        }
        record
    }

    /// Look up a row, a cell, or the IDs whose value in a column matches a level
    ///
    /// - `key` alone: the whole row
    /// - `key` and `header`: one cell, `None` if the header is unknown
    /// - `header` and `level`: the IDs of rows (excluded rows skipped) whose
    ///   value equals the level, case-insensitively and numerically when both
    ///   sides are numbers. The level `all` matches every non-blank value of
    ///   a row whose ID is not locked.
    pub fn grab(
        &self,
        key: Option<&str>,
        header: Option<&str>,
        level: Option<&str>,
    ) -> Result<Option<Grab>> {
        match (key, header, level) {
            (Some(key), header, _) => {
                let Some(row) = self.get(key) else {
                    return Ok(None);
                };
                match header {
                    None => Ok(Some(Grab::Row(row.clone()))),
                    Some(header) => Ok(self
                        .header_index(header.trim())
                        .and_then(|column| row.get(column))
                        .map(|cell| Grab::Cell(cell.clone()))),
                }
            }
            (None, Some(header), Some(level)) => {
                let Some(column) = self.header_index(header.trim()) else {
                    return Ok(None);
                };
                let spec = ColumnSpec {
                    selections: vec![Selection::column(column)],
                };
                let values = self.hybrid_column(&spec, true, true);
                let level = normalize_key(level);
                let wanted = CellValue::parse(&level);
                let ids = values
                    .iter()
                    .filter(|(id, value)| {
                        if level == LEVEL_ALL {
                            !is_blank(value) && !self.config.is_locked(id)
                        } else {
                            CellValue::parse(&value.to_lowercase()).loose_eq(&wanted)
                        }
                    })
                    .map(|(id, _)| id.to_string())
                    .collect();
                Ok(Some(Grab::Ids(ids)))
            }
            _ => Err(Error::InvalidCall(
                "grab requires either a key, or a header and a level".to_string(),
            )),
        }
    }

    /// Distinct non-blank values of a column, with numeric detection
    ///
    /// An unknown column has no levels.
    pub fn levels(&self, column: &str) -> Levels {
        let Some(index) = self.header_index(column) else {
            return Levels::default();
        };
        let spec = ColumnSpec {
            selections: vec![Selection::column(index)],
        };
        let mut seen = HashSet::new();
        let mut values = Vec::new();
        for value in self.hybrid_column(&spec, true, true).values {
            if is_blank(&value) {
                continue;
            }
            let parsed = CellValue::parse(&value);
            // 1 and 1.0 are the same level
            if seen.insert(parsed.to_string()) {
                values.push(parsed);
            }
        }
        let numeric = !values.is_empty() && values.iter().all(CellValue::is_numeric);
        Levels { values, numeric }
    }
}

fn select_value(selection: &Selection, cell: &str, seen: &HashSet<String>, marker: &str) -> String {
    let Some((operator, argument)) = &selection.predicate else {
        return cell.to_string();
    };
    if operator.holds(cell, argument) || (argument.is_unique() && !seen.contains(cell)) {
        cell.to_string()
    } else if *operator == Operator::Add {
        Operator::transform(cell, argument)
    } else {
        marker.to_string()
    }
}
