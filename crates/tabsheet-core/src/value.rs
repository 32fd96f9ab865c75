//! Cell values and on-demand numeric coercion
//!
//! Cells are stored as plain strings. A [`CellValue`] is produced only when a
//! comparison or an arithmetic operation needs one, and is never written back.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// True if a cell is blank. Whitespace is content, not blank.
pub fn is_blank(cell: &str) -> bool {
    cell.is_empty()
}

/// A cell as seen by comparisons and arithmetic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Integer(i64),
    Float(f64),
    /// Anything that is not a number, surrounding whitespace included
    String(String),
    Empty,
}

impl CellValue {
    /// Coerce a cell: integers first, then floats, then text
    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            return CellValue::Empty;
        }
        let number = s.trim();
        number
            .parse::<i64>()
            .map(CellValue::Integer)
            .or_else(|_| number.parse::<f64>().map(CellValue::Float))
            .unwrap_or_else(|_| CellValue::String(s.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        *self == CellValue::Empty
    }

    /// Check if the value coerced to a number
    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Integer(_) | CellValue::Float(_))
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            CellValue::Empty => Some(""),
            _ => None,
        }
    }

    /// Order two values of the same kind. Numbers compare numerically and
    /// text lexicographically; a number and a text never compare.
    pub fn compare(&self, other: &CellValue) -> Option<Ordering> {
        match (self, other) {
            (CellValue::Integer(a), CellValue::Integer(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
            (a, b) => match (a.as_text(), b.as_text()) {
                (Some(a), Some(b)) => Some(a.cmp(b)),
                _ => None,
            },
        }
    }

    /// Equality across representations, so `1`, `1.0` and ` 1` are equal
    pub fn loose_eq(&self, other: &CellValue) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Numeric sum when both sides are numbers, concatenation otherwise
    pub fn add(&self, other: &CellValue) -> CellValue {
        match (self, other) {
            (CellValue::Integer(a), CellValue::Integer(b)) => match a.checked_add(*b) {
                Some(sum) => CellValue::Integer(sum),
                None => CellValue::Float(*a as f64 + *b as f64),
            },
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => CellValue::Float(a + b),
                _ => CellValue::Empty,
            },
            (a, b) => CellValue::String(format!("{}{}", a, b)),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(i) => fmt::Display::fmt(i, f),
            CellValue::Float(x) => fmt::Display::fmt(x, f),
            CellValue::String(s) => f.write_str(s),
            CellValue::Empty => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coercion() {
        let cases = [
            ("7", CellValue::Integer(7)),
            (" -40 ", CellValue::Integer(-40)),
            ("1e3", CellValue::Float(1000.0)),
            ("0.25", CellValue::Float(0.25)),
            ("12a", CellValue::String("12a".to_string())),
            (" x ", CellValue::String(" x ".to_string())),
            ("   ", CellValue::String("   ".to_string())),
        ];
        for (input, expected) in cases {
            assert_eq!(CellValue::parse(input), expected, "parsing {:?}", input);
        }
        assert_eq!(CellValue::Float(2.0).to_string(), "2");
        assert_eq!(CellValue::Empty.to_string(), "");
    }

    #[test]
    fn test_blank_is_not_zero() {
        assert!(is_blank(""));
        assert!(!is_blank("0"));
        assert!(!is_blank(" "));
        assert!(CellValue::parse("").is_empty());
        assert!(!CellValue::parse("0").is_empty());
    }

    #[test]
    fn test_compare_mixed_kinds() {
        let twenty = CellValue::Integer(20);
        assert_eq!(CellValue::parse("25").compare(&twenty), Some(Ordering::Greater));
        assert_eq!(CellValue::parse("19.5").compare(&twenty), Some(Ordering::Less));
        assert_eq!(CellValue::parse("abc").compare(&twenty), None);
        assert_eq!(CellValue::parse("").compare(&twenty), None);
        assert!(CellValue::parse("1.0").loose_eq(&CellValue::Integer(1)));
        assert!(CellValue::parse("b").compare(&CellValue::parse("a")) == Some(Ordering::Greater));
    }

    #[test]
    fn test_add() {
        assert_eq!(
            CellValue::Integer(2).add(&CellValue::Integer(3)),
            CellValue::Integer(5)
        );
        assert_eq!(
            CellValue::Integer(2).add(&CellValue::Float(0.5)),
            CellValue::Float(2.5)
        );
        assert_eq!(
            CellValue::parse("ab").add(&CellValue::Integer(1)).to_string(),
            "ab1"
        );
        assert_eq!(
            CellValue::Integer(i64::MAX).add(&CellValue::Integer(1)),
            CellValue::Float(i64::MAX as f64 + 1.0)
        );
    }
}
