//! Kind inference for raw metadata text.
//!
//! [`coerce`] is total: every string maps to some [`Value`], falling back to
//! [`Value::String`]. Each attempt either consumes the whole input or fails,
//! so `"12abc"` never becomes `Int(12)`.
//!
//! # Precedence
//!
//! 1. `false`/`no`/`off` and `true`/`yes`/`on` (case-insensitive) → `Bool`
//! 2. text wrapped in one matching pair of `'` or `"` → `String`, unquoted
//! 3. optional sign followed by digits → `Int`
//! 4. finite floating-point literal → `Float`
//! 5. `YYYY-MM-DD` → `Date`
//! 6. ISO-like date/time, UTC when no offset is given → `DateTime`
//! 7. anything else → `String`

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::value::{Value, DATE_FORMAT};

const FALSE_LITERALS: &[&str] = &["false", "no", "off"];
const TRUE_LITERALS: &[&str] = &["true", "yes", "on"];

/// Formats carrying an explicit offset, tried after RFC 3339.
const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Offset-less formats; the caller decides which timezone they belong to.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A parsed date/time literal, before a timezone policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedDateTime {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl ParsedDateTime {
    /// Attaches `tz` to naive values and converts aware values into `tz`.
    pub fn in_timezone(self, tz: &FixedOffset) -> Option<DateTime<FixedOffset>> {
        match self {
            ParsedDateTime::Aware(dt) => Some(dt.with_timezone(tz)),
            ParsedDateTime::Naive(naive) => tz.from_local_datetime(&naive).single(),
        }
    }

    /// Aware values keep their offset; naive values are taken as UTC.
    pub fn assume_utc(self) -> DateTime<FixedOffset> {
        match self {
            ParsedDateTime::Aware(dt) => dt,
            ParsedDateTime::Naive(naive) => Utc.from_utc_datetime(&naive).into(),
        }
    }
}

/// Infers the kind of `text`. Never fails.
pub fn coerce(text: &str) -> Value {
    let lowered = text.to_lowercase();
    if FALSE_LITERALS.contains(&lowered.as_str()) {
        return Value::Bool(false);
    }
    if TRUE_LITERALS.contains(&lowered.as_str()) {
        return Value::Bool(true);
    }

    if let Some(inner) = unquote(text) {
        return Value::String(inner.to_string());
    }

    if let Some(i) = parse_int(text) {
        return Value::Int(i);
    }

    if let Some(f) = parse_float(text) {
        return Value::Float(f);
    }

    if let Some(d) = parse_date(text) {
        return Value::Date(d);
    }

    if let Some(dt) = parse_datetime(text) {
        return Value::DateTime(dt.assume_utc());
    }

    Value::String(text.to_string())
}

/// Strips one matching pair of single or double quotes.
fn unquote(text: &str) -> Option<&str> {
    let first = text.chars().next()?;
    if (first == '"' || first == '\'') && text.len() >= 2 && text.ends_with(first) {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<i64>().ok()
}

fn parse_float(text: &str) -> Option<f64> {
    let plausible = text.bytes().any(|b| b.is_ascii_digit())
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !plausible {
        return None;
    }
    text.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

/// Parses the ISO-like date/time forms accepted in metadata headers.
pub fn parse_datetime(text: &str) -> Option<ParsedDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(ParsedDateTime::Aware(dt));
    }
    for format in AWARE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(ParsedDateTime::Aware(dt));
        }
    }
    if let Some(naive) = text.strip_suffix(['Z', 'z']).and_then(parse_naive) {
        return Some(ParsedDateTime::Aware(Utc.from_utc_datetime(&naive).into()));
    }
    parse_naive(text).map(ParsedDateTime::Naive)
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}
