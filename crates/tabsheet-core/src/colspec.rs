//! Column specifications: the small expression language used to pick and
//! filter columns
//!
//! A specification is a list of tokens. Each token is one of
//! - `ALL`: every column except the ID column
//! - a header name or a column index (`Age`, `3`)
//! - a range of indices (`1-3`, or `2-` for "from 2 to the last column")
//! - a predicate `<column><op><argument>` with `op` one of `< > = ! ~ +`
//!
//! Tokens are first parsed into [`Term`]s and then flattened into an ordered
//! list of [`Selection`]s.

use crate::error::{Error, Result};
use crate::table::Sheet;
use crate::value::CellValue;
use std::cmp::Ordering;
use std::fmt;
use std::ops::RangeInclusive;

const ALL_TOKEN: &str = "ALL";
const UNIQUE_ARGUMENT: &str = "UNIQUE";

/// Operator of a predicate term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `=`
    Equal,
    /// `!`
    NotEqual,
    /// `~` (argument is a substring of the cell)
    Contains,
    /// `+` (sum or concatenation, only meaningful when extracting columns)
    Add,
}

impl Operator {
    pub const SYMBOLS: [char; 6] = ['<', '>', '=', '!', '~', '+'];

    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            '<' => Some(Operator::Less),
            '>' => Some(Operator::Greater),
            '=' => Some(Operator::Equal),
            '!' => Some(Operator::NotEqual),
            '~' => Some(Operator::Contains),
            '+' => Some(Operator::Add),
            _ => None,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Operator::Less => '<',
            Operator::Greater => '>',
            Operator::Equal => '=',
            Operator::NotEqual => '!',
            Operator::Contains => '~',
            Operator::Add => '+',
        }
    }

    /// Test a cell against the argument. `+` is a transform, not a test, and
    /// never holds.
    pub fn holds(&self, cell: &str, argument: &Argument) -> bool {
        let value = CellValue::parse(cell);
        match self {
            Operator::Less => value.compare(&argument.value) == Some(Ordering::Less),
            Operator::Greater => value.compare(&argument.value) == Some(Ordering::Greater),
            Operator::Equal => value.loose_eq(&argument.value),
            Operator::NotEqual => !value.loose_eq(&argument.value),
            Operator::Contains => cell.contains(argument.raw.as_str()),
            Operator::Add => false,
        }
    }

    /// The `+` transform: numeric sum when both sides are numbers,
    /// concatenation otherwise
    pub fn transform(cell: &str, argument: &Argument) -> String {
        CellValue::parse(cell).add(&argument.value).to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Right-hand side of a predicate, kept both verbatim and coerced
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub raw: String,
    pub value: CellValue,
}

impl Argument {
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            value: CellValue::parse(raw),
        }
    }

    /// True for the `UNIQUE` keyword (keep only the first row of each value)
    pub fn is_unique(&self) -> bool {
        self.raw == UNIQUE_ARGUMENT
    }
}

/// A single parsed token
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// `ALL`
    All,
    /// A header name or an index
    Column(usize),
    /// `A-B` or `A-`
    Range(RangeInclusive<usize>),
    /// `<column><op><argument>`
    Predicate {
        column: usize,
        operator: Operator,
        argument: Argument,
    },
}

/// A resolved column with an optional predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub index: usize,
    pub predicate: Option<(Operator, Argument)>,
}

impl Selection {
    pub fn column(index: usize) -> Self {
        Self {
            index,
            predicate: None,
        }
    }

    /// `+` applied to the cell, when this selection is a `+` term
    pub(crate) fn addend(&self) -> Option<&Argument> {
        match &self.predicate {
            Some((Operator::Add, argument)) => Some(argument),
            _ => None,
        }
    }
}

/// An ordered list of selected columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnSpec {
    pub selections: Vec<Selection>,
}

impl ColumnSpec {
    /// Parse tokens against the headers of `sheet`
    ///
    /// Any token that cannot be parsed rejects the whole specification.
    pub fn parse<S: AsRef<str>>(tokens: &[S], sheet: &Sheet) -> Result<Self> {
        let mut terms = Vec::with_capacity(tokens.len());
        let mut seen_all = false;
        for token in tokens {
            let token = token.as_ref();
            if token == ALL_TOKEN && !seen_all {
                // ALL columns always lead, wherever the keyword appears
                seen_all = true;
                terms.insert(0, Term::All);
            } else {
                terms.push(parse_term(token, sheet)?);
            }
        }
        Ok(Self::from_terms(terms, sheet))
    }

    /// Every column except the ID column, unfiltered
    pub fn all(sheet: &Sheet) -> Self {
        Self::from_terms(vec![Term::All], sheet)
    }

    fn from_terms(terms: Vec<Term>, sheet: &Sheet) -> Self {
        let mut selections = Vec::new();
        for term in terms {
            match term {
                Term::All => selections.extend(
                    (0..sheet.column_count())
                        .filter(|&i| i != sheet.id_column())
                        .map(Selection::column),
                ),
                Term::Column(index) => selections.push(Selection::column(index)),
                Term::Range(range) => selections.extend(range.map(Selection::column)),
                Term::Predicate {
                    column,
                    operator,
                    argument,
                } => selections.push(Selection {
                    index: column,
                    predicate: Some((operator, argument)),
                }),
            }
        }
        Self { selections }
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selection> {
        self.selections.iter()
    }
}

/// Parse one token, trying header lookup, then ranges, then predicates
pub fn parse_term(token: &str, sheet: &Sheet) -> Result<Term> {
    if let Some(index) = sheet.header_index(token) {
        return Ok(Term::Column(index));
    }
    if let Some(range) = parse_range(token, sheet.column_count()) {
        return Ok(Term::Range(range));
    }
    parse_predicate(token, sheet).ok_or_else(|| Error::InvalidColumn(token.to_string()))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn parse_range(token: &str, width: usize) -> Option<RangeInclusive<usize>> {
    let (from, to) = token.split_once('-')?;
    if !is_digits(from) {
        return None;
    }
    let from: usize = from.parse().ok()?;
    if from >= width {
        return None;
    }
    if to.is_empty() {
        return Some(from..=width - 1);
    }
    if !is_digits(to) {
        return None;
    }
    let to: usize = to.parse().ok()?;
    (to >= from && to < width).then_some(from..=to)
}

fn parse_predicate(token: &str, sheet: &Sheet) -> Option<Term> {
    let mut found = Operator::SYMBOLS.iter().filter(|&&c| token.contains(c));
    let symbol = *found.next()?;
    if found.next().is_some() {
        return None;
    }

    let (column, argument) = token.split_once(symbol)?;
    if argument.is_empty() {
        return None;
    }
    Some(Term::Predicate {
        column: sheet.header_index(column)?,
        operator: Operator::from_symbol(symbol)?,
        argument: Argument::parse(argument),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> Sheet {
        Sheet::from_rows(vec![
            vec!["ID", "Name", "Age", "City", "Score"],
            vec!["1", "ann", "34", "Oslo", "7"],
        ])
        .unwrap()
    }

    fn indices(spec: &ColumnSpec) -> Vec<usize> {
        spec.iter().map(|s| s.index).collect()
    }

    #[test]
    fn test_names_indices_and_ranges() {
        let sheet = sheet();
        let spec = ColumnSpec::parse(&["4", "age", "1-2", "3-"], &sheet).unwrap();
        assert_eq!(indices(&spec), vec![4, 2, 1, 2, 3, 4]);
        assert!(spec.iter().all(|s| s.predicate.is_none()));
    }

    #[test]
    fn test_all_expands_first() {
        let sheet = sheet();
        let spec = ColumnSpec::parse(&["Age>5", "ALL"], &sheet).unwrap();
        assert_eq!(indices(&spec), vec![1, 2, 3, 4, 2]);
        assert_eq!(spec.selections[4].predicate.as_ref().unwrap().0, Operator::Greater);
    }

    #[test]
    fn test_predicates() {
        let sheet = sheet();
        let term = parse_term("Age>20", &sheet).unwrap();
        assert_eq!(
            term,
            Term::Predicate {
                column: 2,
                operator: Operator::Greater,
                argument: Argument {
                    raw: "20".to_string(),
                    value: CellValue::Integer(20),
                },
            }
        );

        match parse_term("City~sl", &sheet).unwrap() {
            Term::Predicate { argument, .. } => assert_eq!(argument.value, CellValue::String("sl".into())),
            other => panic!("unexpected term {:?}", other),
        }
        assert!(parse_term("Name=UNIQUE", &sheet).is_ok());
    }

    #[test]
    fn test_rejected_tokens() {
        let sheet = sheet();
        for token in ["Nope", "Age>=3", "Age>", "Nope<3", "3-1", "9-", "2-9"] {
            match ColumnSpec::parse(&["Name", token], &sheet) {
                Err(Error::InvalidColumn(t)) => assert_eq!(t, token),
                other => panic!("{} should not parse: {:?}", token, other),
            }
        }
    }

    #[test]
    fn test_operator_semantics() {
        let twenty = Argument::parse("20");
        assert!(Operator::Greater.holds("21", &twenty));
        assert!(!Operator::Greater.holds("", &twenty));
        assert!(!Operator::Greater.holds("abc", &twenty));
        assert!(Operator::Less.holds("3.5", &twenty));
        assert!(Operator::Equal.holds("20.0", &twenty));
        assert!(Operator::NotEqual.holds("x", &twenty));
        assert!(Operator::Contains.holds("x200", &twenty));
        assert!(!Operator::Add.holds("20", &twenty));
        assert_eq!(Operator::transform("22", &twenty), "42");
        assert_eq!(Operator::transform("ab", &twenty), "ab20");
        assert_eq!(Operator::transform("", &twenty), "20");
    }

    #[test]
    fn test_empty_and_all_spec() {
        let sheet = sheet();
        assert!(ColumnSpec::parse::<&str>(&[], &sheet).unwrap().is_empty());
        assert_eq!(indices(&ColumnSpec::all(&sheet)), vec![1, 2, 3, 4]);
    }
}
