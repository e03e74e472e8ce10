//! Typed tabular records handed over by the table source.
//!
//! A record is a mapping of column name to [`Cell`]. Sources that only know
//! text (CSV, pipe-delimited extracts) store [`Cell::Text`]; the typed
//! accessors coerce text on read and report the offending column on failure.

use std::collections::BTreeMap;

use time::{macros::format_description, Date, Month, Time};

use crate::ModelError;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Flag(bool),
    Date(Date),
    Time(Time),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn render(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Flag(b) => b.to_string(),
            Cell::Date(d) => d.to_string(),
            Cell::Time(t) => t.to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::from(s.as_str())
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<i32> for Cell {
    fn from(n: i32) -> Self {
        Cell::Number(f64::from(n))
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Flag(b)
    }
}

impl From<Date> for Cell {
    fn from(d: Date) -> Self {
        Cell::Date(d)
    }
}

impl From<Time> for Cell {
    fn from(t: Time) -> Self {
        Cell::Time(t)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Cell::Empty, Into::into)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRecord {
    cells: BTreeMap<String, Cell>,
}

static EMPTY: Cell = Cell::Empty;

impl TableRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Cell>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Cell>) {
        self.cells.insert(column.trim().to_string(), value.into());
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn cell(&self, column: &str) -> &Cell {
        self.cells.get(column).unwrap_or(&EMPTY)
    }

    /// Text rendering of the cell; `None` for missing or empty cells.
    pub fn text(&self, column: &str) -> Option<String> {
        match self.cell(column) {
            Cell::Empty => None,
            other => Some(other.render()),
        }
    }

    pub fn require_text(&self, column: &str) -> Result<String, ModelError> {
        self.text(column).ok_or_else(|| self.invalid(column, "non-empty text"))
    }

    pub fn number(&self, column: &str) -> Result<Option<f64>, ModelError> {
        match self.cell(column) {
            Cell::Empty => Ok(None),
            Cell::Number(n) => Ok(Some(*n)),
            Cell::Text(s) => s
                .replace(',', "")
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(column, "number")),
            _ => Err(self.invalid(column, "number")),
        }
    }

    /// Whole number in `0..=255`; fractional, negative or larger values are errors.
    pub fn small_int(&self, column: &str) -> Result<Option<u8>, ModelError> {
        let Some(n) = self.number(column)? else {
            return Ok(None);
        };
        if n.fract() != 0.0 {
            return Err(self.invalid(column, "whole number 0..=255"));
        }
        u8::try_from(n as i64)
            .map(Some)
            .map_err(|_| self.invalid(column, "whole number 0..=255"))
    }

    pub fn flag(&self, column: &str) -> Result<Option<bool>, ModelError> {
        match self.cell(column) {
            Cell::Empty => Ok(None),
            Cell::Flag(b) => Ok(Some(*b)),
            Cell::Number(n) => Ok(Some(*n != 0.0)),
            Cell::Text(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(Some(true)),
                "false" | "no" | "n" | "0" => Ok(Some(false)),
                _ => Err(self.invalid(column, "flag")),
            },
            _ => Err(self.invalid(column, "flag")),
        }
    }

    /// Month number 1..=12, from a number or an English month name.
    pub fn month(&self, column: &str) -> Result<Option<u8>, ModelError> {
        let parsed = match self.cell(column) {
            Cell::Empty => return Ok(None),
            Cell::Number(n) if n.fract() == 0.0 && (1.0..=12.0).contains(n) => Some(*n as u8),
            Cell::Text(s) => s
                .parse::<u8>()
                .ok()
                .filter(|m| (1..=12).contains(m))
                .or_else(|| month_from_name(s)),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| self.invalid(column, "month"))
    }

    /// Weekday index with Monday = 0, from a number or an English day name.
    pub fn weekday(&self, column: &str) -> Result<Option<u8>, ModelError> {
        let parsed = match self.cell(column) {
            Cell::Empty => return Ok(None),
            Cell::Number(n) if n.fract() == 0.0 && (0.0..=6.0).contains(n) => Some(*n as u8),
            Cell::Text(s) => s
                .parse::<u8>()
                .ok()
                .filter(|d| *d <= 6)
                .or_else(|| weekday_from_name(s)),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| self.invalid(column, "weekday"))
    }

    pub fn date(&self, column: &str) -> Result<Option<Date>, ModelError> {
        match self.cell(column) {
            Cell::Empty => Ok(None),
            Cell::Date(d) => Ok(Some(*d)),
            Cell::Text(s) => Date::parse(s, format_description!("[year]-[month]-[day]"))
                .map(Some)
                .map_err(|_| self.invalid(column, "date (YYYY-MM-DD)")),
            _ => Err(self.invalid(column, "date (YYYY-MM-DD)")),
        }
    }

    /// Time of day from `H:MM` or `H:MM:SS`; `24:00` is not a valid start.
    pub fn time_of_day(&self, column: &str) -> Result<Option<Time>, ModelError> {
        match self.cell(column) {
            Cell::Empty => Ok(None),
            Cell::Time(t) => Ok(Some(*t)),
            Cell::Text(s) => parse_time(s)
                .map(Some)
                .ok_or_else(|| self.invalid(column, "time (HH:MM)")),
            _ => Err(self.invalid(column, "time (HH:MM)")),
        }
    }

    fn invalid(&self, column: &str, expected: &'static str) -> ModelError {
        ModelError::Cell {
            column: column.to_string(),
            value: self.cell(column).render(),
            expected,
        }
    }
}

fn parse_time(s: &str) -> Option<Time> {
    let mut parts = s.trim().split(':');
    let hour: u8 = parts.next()?.parse().ok()?;
    let minute: u8 = parts.next()?.parse().ok()?;
    let second: u8 = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Time::from_hms(hour, minute, second).ok()
}

fn month_from_name(s: &str) -> Option<u8> {
    let lower = s.trim().to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    let month = match prefix {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    };
    Some(u8::from(month))
}

fn weekday_from_name(s: &str) -> Option<u8> {
    let lower = s.trim().to_ascii_lowercase();
    let idx = match lower.get(..3)? {
        "mon" => 0,
        "tue" => 1,
        "wed" => 2,
        "thu" => 3,
        "fri" => 4,
        "sat" => 5,
        "sun" => 6,
        _ => return None,
    };
    Some(idx)
}
