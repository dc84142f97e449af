use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// A single parsed cell. Missing values live as `None` at the table layer,
/// never as empty strings or NaN sentinels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Cell {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl Cell {
    pub fn as_display(&self) -> String {
        match self {
            Cell::String(s) => s.clone(),
            Cell::Integer(i) => i.to_string(),
            Cell::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Cell::Boolean(b) => b.to_string(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(*d),
            Cell::String(s) => parse_naive_date(s).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Normalizes a raw column name or alias into a comparable snake_case token:
/// diacritics folded to ASCII, lowercased, any other non-alphanumeric
/// character replaced with `_`, leading/trailing underscores trimmed.
pub fn normalize_token(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let folded = match fold_diacritic(ch) {
            Some(ascii) => ascii,
            None if ch.is_ascii() => ch.to_ascii_lowercase(),
            // Unfoldable non-ASCII characters are dropped, not replaced.
            None => continue,
        };
        if folded.is_ascii_alphanumeric() {
            out.push(folded);
        } else {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

fn fold_diacritic(ch: char) -> Option<char> {
    let folded = match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'Á' | 'À' | 'Â' | 'Ä' | 'Ã' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        _ => return None,
    };
    Some(folded)
}

const YES_TOKENS: &[&str] = &["si", "yes", "true", "1", "y"];
const NO_TOKENS: &[&str] = &["no", "false", "0", "n"];

/// Maps a yes/no token to a boolean, case- and diacritic-insensitively.
/// Unrecognized tokens degrade to missing rather than erroring.
pub fn coerce_boolean(cell: &Cell) -> Option<bool> {
    if let Cell::Boolean(b) = cell {
        return Some(*b);
    }
    let token = normalize_token(&cell.as_display());
    if YES_TOKENS.contains(&token.as_str()) {
        Some(true)
    } else if NO_TOKENS.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Lenient numeric coercion: strips thousands separators, currency symbols,
/// and whitespace before parsing. Unparsable input degrades to missing.
pub fn coerce_numeric(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Integer(i) => Some(*i as f64),
        Cell::Float(f) => Some(*f),
        Cell::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Cell::Date(_) => None,
        Cell::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | '$') && !c.is_whitespace())
                .collect();
            if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("nan") || cleaned == "None" {
                return None;
            }
            // NaN/infinity tokens parse as f64 but carry no value; they
            // must degrade to missing, not survive as non-finite cells.
            cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
        }
    }
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    let trimmed = value.trim();
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(parsed);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(parsed.date());
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

/// Derives an hour-of-day from an `HH:MM` token, truncating longer strings
/// since some exports pad times with seconds. Unparsable → missing.
pub fn hour_from_time(cell: &Cell) -> Option<i64> {
    let display = cell.as_display();
    let truncated: String = display.chars().take(5).collect();
    NaiveTime::parse_from_str(&truncated, "%H:%M")
        .ok()
        .map(|t| i64::from(t.hour()))
}
