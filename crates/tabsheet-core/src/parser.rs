//! Loading sheets from delimited text or from rows of string fields

use crate::config::normalize_key;
use crate::error::{Error, Result};
use crate::table::{Row, Sheet};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Which column holds the row IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdColumn {
    /// An existing column, counted from 0
    Index(usize),
    /// Generate sequential IDs in an appended synthetic column
    Auto,
}

impl Default for IdColumn {
    fn default() -> Self {
        IdColumn::Index(0)
    }
}

impl IdColumn {
    /// Negative numbers request auto-generated IDs
    pub fn from_signed(index: i64) -> Self {
        match usize::try_from(index) {
            Ok(index) => IdColumn::Index(index),
            Err(_) => IdColumn::Auto,
        }
    }
}

/// Options controlling how input rows become a sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Field delimiter (single byte)
    pub delimiter: u8,
    pub id_column: IdColumn,
    /// Number of leading rows to discard
    pub skip: usize,
    /// The input has no header row; headers are synthesized as `C001`, `C002`, ...
    pub no_header: bool,
    /// Swap rows and columns before anything else
    pub transpose: bool,
    /// Input is one of several files stacked by rows (implies `no_header`)
    pub vstack: bool,
    /// Input is one of several files stacked by columns (implies auto IDs)
    pub hstack: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            id_column: IdColumn::default(),
            skip: 0,
            no_header: false,
            transpose: false,
            vstack: false,
            hstack: false,
        }
    }
}

/// Summary of a load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Data rows kept
    pub rows: usize,
    /// Columns, synthetic ID column included
    pub columns: usize,
    /// Rows that replaced an earlier row with the same ID
    pub duplicates: usize,
    /// Lines dropped for being too short or commented out
    pub discarded: usize,
    /// Lines cut down to the header length
    pub truncated: usize,
}

/// Turn a delimiter argument into a byte; `\t` and `\s` stand for tab and space
pub fn parse_delimiter(s: &str) -> Result<u8> {
    match s {
        "\\t" | "\t" => Ok(b'\t'),
        "\\s" | " " => Ok(b' '),
        _ if s.len() == 1 => Ok(s.as_bytes()[0]),
        _ => Err(Error::InvalidCall(format!(
            "delimiter must be a single character, got '{}'",
            s
        ))),
    }
}

/// Parse a delimited file into a sheet with the default configuration
pub fn parse_csv<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Sheet> {
    let mut sheet = Sheet::new();
    sheet.read_csv(path, options)?;
    Ok(sheet)
}

/// Parse delimited text from a string (useful for testing)
pub fn parse_csv_str(content: &str, options: &LoadOptions) -> Result<Sheet> {
    let mut sheet = Sheet::new();
    sheet.read_from(content.as_bytes(), options, "<string>")?;
    Ok(sheet)
}

/// Swap rows and columns, blank-padding ragged rows
pub fn transpose_rows(rows: Vec<Row>) -> Vec<Row> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut columns: Vec<Row> = vec![Vec::with_capacity(rows.len()); width];
    for row in rows {
        let len = row.len();
        for (i, cell) in row.into_iter().enumerate() {
            columns[i].push(cell);
        }
        for column in columns.iter_mut().skip(len) {
            column.push(String::new());
        }
    }
    columns
}

fn read_records<R: Read>(reader: R, delimiter: u8, path: &Path) -> Result<Vec<Row>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // Allow varying number of fields
        .delimiter(delimiter)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result.map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

impl Sheet {
    /// Build a sheet from literal rows, the first one holding the headers
    pub fn from_rows<I, R, S>(rows: I) -> Result<Sheet>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sheet = Sheet::new();
        sheet.load(rows, &LoadOptions::default())?;
        Ok(sheet)
    }

    /// Replace the contents of this sheet with a delimited file
    pub fn read_csv<P: AsRef<Path>>(&mut self, path: P, options: &LoadOptions) -> Result<LoadReport> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let rows = read_records(BufReader::new(file), options.delimiter, path)?;
        self.load_named(rows, options, &name)
    }

    /// Replace the contents of this sheet with delimited text from a reader
    pub fn read_from<R: Read>(&mut self, reader: R, options: &LoadOptions, name: &str) -> Result<LoadReport> {
        let rows = read_records(reader, options.delimiter, &PathBuf::from(name))?;
        self.load_named(rows, options, name)
    }

    /// Replace the contents of this sheet with rows of string fields
    ///
    /// On error the sheet is left as it was.
    pub fn load<I, R, S>(&mut self, rows: I, options: &LoadOptions) -> Result<LoadReport>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = self.tag.trim_start_matches('_').to_string();
        self.load_named(rows, options, &name)
    }

    fn load_named<I, R, S>(&mut self, rows: I, options: &LoadOptions, name: &str) -> Result<LoadReport>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let no_header = options.no_header || options.vstack;
        let id_column = if options.hstack {
            IdColumn::Auto
        } else {
            options.id_column
        };
        let auto_ids = id_column == IdColumn::Auto;
        let min_len = if auto_ids {
            self.config.min_line_len.saturating_sub(1)
        } else {
            self.config.min_line_len
        }
        .max(1);

        let mut staged = self.clone();
        staged.clear();
        let mut report = LoadReport::default();

        let mut lines = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect::<Row>());
        for _ in 0..options.skip {
            if lines.next().is_none() {
                break;
            }
        }
        let lines: Vec<Row> = if options.transpose {
            let kept: Vec<Row> = lines
                .filter(|line| staged.keep_line(line, min_len))
                .collect();
            transpose_rows(kept)
        } else {
            lines.collect()
        };

        let mut head_len: Option<usize> = None;
        let mut data_no = 0usize;
        let mut saw_line = false;
        for line in lines {
            saw_line = true;
            if !staged.keep_line(&line, min_len) {
                report.discarded += 1;
                continue;
            }

            let width = match head_len {
                Some(width) => width,
                None => {
                    let width = line.len();
                    if let IdColumn::Index(index) = id_column {
                        if index >= width {
                            return Err(Error::structural(format!(
                                "invalid id column {}, maximum is {} (starting from 0)",
                                index,
                                width - 1
                            )));
                        }
                    }
                    let mut headers: Row = if no_header {
                        (1..=width)
                            .map(|c| {
                                if options.vstack {
                                    format!("C{:03}", c)
                                } else {
                                    format!("C{:03}{}", c, staged.tag)
                                }
                            })
                            .collect()
                    } else {
                        line.iter().map(|h| h.trim().to_string()).collect()
                    };
                    if auto_ids {
                        headers.push(staged.config.auto_id_header.clone());
                    }
                    *staged.headers_mut() = headers;
                    head_len = Some(width);
                    if !no_header {
                        continue;
                    }
                    width
                }
            };

            data_no += 1;
            let mut row = line;
            if row.len() > width {
                warn!(
                    "{}: line {} is longer than the header line ({} vs {}) and will be truncated",
                    name,
                    data_no,
                    row.len(),
                    width
                );
                report.truncated += 1;
                row.truncate(width);
            }
            row.resize(width, String::new());
            if auto_ids {
                if options.hstack {
                    row.push(format!("R{:05}", data_no));
                } else {
                    row.push(format!("R{:05}{}", data_no, staged.tag));
                }
            }

            let id_index = match id_column {
                IdColumn::Index(index) => index,
                IdColumn::Auto => width,
            };
            let key = normalize_key(&row[id_index]);
            if staged.is_header_key(&key) {
                warn!("{}: line {} uses the reserved header key as its ID, skipping", name, data_no);
                report.discarded += 1;
                continue;
            }
            if staged.index.contains_key(&key) {
                report.duplicates += 1;
            }
            staged.insert_slot(key, row);
        }

        match head_len {
            Some(width) => {
                staged.id_column = match id_column {
                    IdColumn::Index(index) => index,
                    IdColumn::Auto => width,
                };
                report.rows = staged.row_count();
                report.columns = staged.column_count();
                if report.duplicates > 0 {
                    warn!(
                        "{}: {} rows ({} discarded: duplicate ids), {} columns",
                        name, report.rows, report.duplicates, width
                    );
                } else {
                    info!("{}: {} rows, {} columns", name, report.rows, width);
                }
            }
            None if saw_line => warn!("{}: empty (wrong delimiter or too few columns)", name),
            None => info!("{}: empty", name),
        }

        *self = staged;
        Ok(report)
    }

    fn keep_line(&self, line: &[String], min_len: usize) -> bool {
        match line.first() {
            Some(first) => {
                line.len() >= min_len
                    && (self.config.comment_prefix.is_empty()
                        || !first.starts_with(&self.config.comment_prefix))
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<Vec<&'static str>> {
        vec![
            vec!["ID", "H1", "H2", "H3"],
            vec!["1", "a", "b", "c"],
            vec!["2", "aa", "bb", "cc"],
            vec!["99", "", "", ""],
            vec!["88", "", "8", "8"],
        ]
    }

    #[test]
    fn test_parse_simple_csv() {
        let csv = "ID,Name,Value\n1,foo,100\n2,bar,200\n";
        let sheet = parse_csv_str(csv, &LoadOptions::default()).unwrap();

        assert_eq!(sheet.headers(), &["ID", "Name", "Value"]);
        assert_eq!(sheet.row_count(), 2);
        assert_eq!(sheet.get("1").unwrap(), &["1", "foo", "100"]);
        assert_eq!(sheet.get("2").unwrap(), &["2", "bar", "200"]);
    }

    #[test]
    fn test_parse_pads_and_truncates() {
        let csv = "ID,Name,Value\n1,,100\n2,bar\n3,x,y,z\n";
        let mut sheet = Sheet::new();
        let report = sheet
            .read_from(csv.as_bytes(), &LoadOptions::default(), "test.csv")
            .unwrap();

        assert_eq!(sheet.get("1").unwrap()[1], "");
        assert_eq!(sheet.get("2").unwrap(), &["2", "bar", ""]);
        assert_eq!(sheet.get("3").unwrap(), &["3", "x", "y"]);
        assert_eq!(report.truncated, 1);
        sheet.check_rectangular().unwrap();
    }

    #[test]
    fn test_duplicate_ids_keep_the_later_row() {
        let csv = "ID,V\nA,1\nb,2\n a ,3\n";
        let mut sheet = Sheet::new();
        let report = sheet
            .read_from(csv.as_bytes(), &LoadOptions::default(), "dup.csv")
            .unwrap();

        assert_eq!(report.duplicates, 1);
        assert_eq!(sheet.row_count(), 2);
        assert_eq!(sheet.get("a").unwrap(), &[" a ", "3"]);
    }

    #[test]
    fn test_comments_short_lines_and_skip() {
        let csv = "junk line\nID,V\n# note,x\nlonely\n1,x\n";
        let options = LoadOptions {
            skip: 1,
            ..LoadOptions::default()
        };
        let mut sheet = Sheet::new();
        let report = sheet.read_from(csv.as_bytes(), &options, "c.csv").unwrap();

        assert_eq!(report.discarded, 2);
        assert_eq!(sheet.ids(), vec!["1"]);
    }

    #[test]
    fn test_tab_delimiter() {
        let options = LoadOptions {
            delimiter: parse_delimiter("\\t").unwrap(),
            ..LoadOptions::default()
        };
        let sheet = parse_csv_str("ID\tName\n7\tseven, eight\n", &options).unwrap();
        assert_eq!(sheet.get("7").unwrap()[1], "seven, eight");
        assert!(parse_delimiter("ab").is_err());
        assert_eq!(parse_delimiter(";").unwrap(), b';');
    }

    #[test]
    fn test_invalid_id_column() {
        let options = LoadOptions {
            id_column: IdColumn::Index(4),
            ..LoadOptions::default()
        };
        let mut sheet = Sheet::from_rows(table()).unwrap();
        assert!(matches!(sheet.load(table(), &options), Err(Error::Structural(_))));
        // The failed load left the sheet untouched
        assert_eq!(sheet.row_count(), 4);
    }

    #[test]
    fn test_explicit_id_column() {
        let options = LoadOptions {
            id_column: IdColumn::Index(1),
            ..LoadOptions::default()
        };
        let mut sheet = Sheet::new();
        sheet.load(vec![vec!["A", "Key"], vec!["x", "k1"]], &options).unwrap();
        assert_eq!(sheet.id_column(), 1);
        assert_eq!(sheet.get("K1").unwrap(), &["x", "k1"]);
    }

    #[test]
    fn test_auto_ids_and_no_header() {
        let options = LoadOptions {
            id_column: IdColumn::from_signed(-1),
            no_header: true,
            ..LoadOptions::default()
        };
        let mut sheet = Sheet::new();
        sheet.load(vec![vec!["x"], vec!["y"]], &options).unwrap();

        let tag = sheet.tag().to_string();
        assert_eq!(sheet.headers(), &[format!("C001{}", tag), "__AutoID__".to_string()]);
        assert_eq!(sheet.id_column(), 1);
        assert_eq!(sheet.keys(false, false, true), vec![format!("R00001{}", tag), format!("R00002{}", tag)]);
    }

    #[test]
    fn test_stacking_hints_drop_the_tag() {
        let mut sheet = Sheet::new();
        let vstack = LoadOptions {
            vstack: true,
            ..LoadOptions::default()
        };
        sheet.load(vec![vec!["1", "a"]], &vstack).unwrap();
        assert_eq!(sheet.headers(), &["C001", "C002"]);
        assert_eq!(sheet.ids(), vec!["1"]);

        let hstack = LoadOptions {
            hstack: true,
            ..LoadOptions::default()
        };
        sheet.load(vec![vec!["H"], vec!["a"], vec!["b"]], &hstack).unwrap();
        assert_eq!(sheet.headers(), &["H", "__AutoID__"]);
        assert_eq!(sheet.get("r00002").unwrap(), &["b", "R00002"]);
    }

    #[test]
    fn test_transpose() {
        let options = LoadOptions {
            transpose: true,
            ..LoadOptions::default()
        };
        let mut sheet = Sheet::new();
        sheet.load(table(), &options).unwrap();
        assert_eq!(sheet.headers(), &["ID", "1", "2", "99", "88"]);
        assert_eq!(sheet.get("h3").unwrap(), &["H3", "c", "cc", "", "8"]);
    }

    #[test]
    fn test_empty_input_clears() {
        let mut sheet = Sheet::from_rows(table()).unwrap();
        let report = sheet
            .load(Vec::<Vec<String>>::new(), &LoadOptions::default())
            .unwrap();
        assert_eq!(report, LoadReport::default());
        assert!(sheet.is_empty());
        assert_eq!(sheet.headers(), &["ID"]);
    }

    #[test]
    fn test_read_missing_file() {
        let result = parse_csv("/nonexistent/sheet.csv", &LoadOptions::default());
        assert!(matches!(result, Err(Error::FileRead { .. })));
    }

    #[test]
    fn test_transpose_rows_pads() {
        let rows = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
        ];
        assert_eq!(
            transpose_rows(rows),
            vec![vec!["a", "c"], vec!["b", ""]]
        );
    }
}
