//! tabsheet-core: an in-memory engine for ID-indexed delimited-text sheets
//!
//! This library provides functionality to:
//! - Load delimited text (or literal rows) into a rectangular, ID-indexed sheet
//! - Select and filter columns with a small column-specification language
//! - Union sheets, fold duplicate columns and consolidate related columns
//! - Write, read and remove single cells, alone or through JSON edit scripts
//! - Save sheets back as delimited text
//! - Scan directories for input files

pub mod colspec;
pub mod config;
pub mod edit;
pub mod error;
pub mod export;
pub mod extract;
pub mod merger;
pub mod parser;
pub mod policy;
pub mod scanner;
pub mod table;
pub mod value;

pub use colspec::{Argument, ColumnSpec, Operator, Selection, Term};
pub use config::{normalize_key, SheetConfig};
pub use edit::{chunk_pairs, chunk_writes, read_cell, removed_text, CellEdit, EditReport, EditScript};
pub use error::{Error, Result};
pub use export::SaveOptions;
pub use extract::{Grab, HybridColumn, Levels};
pub use merger::{ConsolidationGroup, MergeInput};
pub use parser::{parse_csv, parse_csv_str, parse_delimiter, IdColumn, LoadOptions, LoadReport};
pub use policy::{merged_value, MergeMode};
pub use scanner::{scan_inputs, ScanResult};
pub use table::{Removed, Row, Sheet};
pub use value::{is_blank, CellValue};
