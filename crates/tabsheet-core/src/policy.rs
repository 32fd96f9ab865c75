//! Cell-by-cell merge modes used when columns are folded together

use crate::error::{Error, Result};
use crate::value::{is_blank, CellValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a new value is merged into an existing cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Replace the old value with a non-blank new one
    Overwrite,
    /// `old;new`
    Append,
    /// `old;new` unless `new` is already one of the components of `old`
    #[default]
    SmartAppend,
    /// Numeric addition
    Add,
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMode::Overwrite => "overwrite",
            MergeMode::Append => "append",
            MergeMode::SmartAppend => "smart_append",
            MergeMode::Add => "add",
        }
    }
}

impl FromStr for MergeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "overwrite" => Ok(MergeMode::Overwrite),
            "append" => Ok(MergeMode::Append),
            "smart_append" => Ok(MergeMode::SmartAppend),
            "add" => Ok(MergeMode::Add),
            _ => Err(Error::InvalidMergeMode(s.to_string())),
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merge `new` into `old` according to `mode`
///
/// A blank `old` always takes `new` verbatim, and a blank `new` always leaves
/// `old` untouched, whatever the mode.
pub fn merged_value(old: &str, new: &str, mode: MergeMode, separator: &str) -> String {
    if is_blank(old) {
        return new.to_string();
    }
    if is_blank(new) {
        return old.to_string();
    }
    match mode {
        MergeMode::Overwrite => new.to_string(),
        MergeMode::Append => format!("{}{}{}", old, separator, new),
        MergeMode::SmartAppend => {
            if old.split(separator).any(|part| part == new) {
                old.to_string()
            } else {
                format!("{}{}{}", old, separator, new)
            }
        }
        MergeMode::Add => CellValue::parse(old)
            .add(&CellValue::parse(new))
            .to_string(),
    }
}
