//! Writing sheets back out as delimited text

use crate::error::{Error, Result};
use crate::parser::transpose_rows;
use crate::table::{Row, Sheet};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Options controlling how a sheet is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Field delimiter (single byte)
    pub delimiter: u8,
    /// Write the header record
    pub headers: bool,
    /// Headers to write instead of the sheet's own; the count must match
    pub replace_headers: Option<Vec<String>>,
    /// Swap rows and columns on output
    pub transpose: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            headers: true,
            replace_headers: None,
            transpose: false,
        }
    }
}

impl Sheet {
    /// Index of the synthesized ID column, which is never written out
    fn auto_id_column(&self) -> Option<usize> {
        (self.headers().get(self.id_column) == Some(&self.config.auto_id_header))
            .then_some(self.id_column)
    }

    /// The records that [`Sheet::save`] writes: the header (unless
    /// suppressed) followed by the data rows sorted by ID
    pub fn to_records(&self, options: &SaveOptions) -> Result<Vec<Row>> {
        let skip = self.auto_id_column();
        let strip = |row: &[String]| -> Row {
            row.iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .map(|(_, cell)| cell.clone())
                .collect()
        };

        let mut records = Vec::with_capacity(self.row_count() + 1);
        if options.headers {
            let header = strip(self.headers());
            match &options.replace_headers {
                Some(replacement) if replacement.len() != header.len() => {
                    return Err(Error::HeaderMismatch {
                        expected: header.len(),
                        found: replacement.len(),
                    });
                }
                Some(replacement) => records.push(replacement.clone()),
                None => records.push(header),
            }
        }

        let mut rows: Vec<(&str, &Row)> = self.data_rows().collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        records.extend(rows.into_iter().map(|(_, row)| strip(row)));

        if options.transpose {
            records = transpose_rows(records);
        }
        Ok(records)
    }

    /// Write the sheet as delimited text to any writer
    pub fn write_to<W: Write>(&self, writer: W, options: &SaveOptions) -> Result<()> {
        let records = self.to_records(options)?;
        write_records(writer, &records, options.delimiter, Path::new("<output>"))
    }

    /// Write the sheet to a file
    ///
    /// Nothing is created if the records cannot be built (for example on a
    /// header count mismatch).
    pub fn save<P: AsRef<Path>>(&self, path: P, options: &SaveOptions) -> Result<()> {
        let path = path.as_ref();
        let records = self.to_records(options)?;
        let file = File::create(path)?;
        write_records(BufWriter::new(file), &records, options.delimiter, path)?;
        debug!(path = %path.display(), records = records.len(), "saved sheet");
        Ok(())
    }
}

fn write_records<W: Write>(writer: W, records: &[Row], delimiter: u8, path: &Path) -> Result<()> {
    let csv_error = |source: csv::Error| Error::Csv {
        path: PathBuf::from(path),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(writer);
    for record in records {
        writer.write_record(record).map_err(csv_error)?;
    }
    writer.flush()?;
    Ok(())
}
