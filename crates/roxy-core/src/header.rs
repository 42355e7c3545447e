//! Header block parsing.
//!
//! A document starts with `key: value` lines and ends its header at the first
//! whitespace-only line. Lines without a colon continue the previous key,
//! turning its value into a list:
//!
//! ```text
//! Title: Hello
//! Tags:
//!     rust
//!     storage
//!
//! Body starts here.
//! ```
//!
//! Values stay raw text here; typing happens in [`normalize`](crate::normalize).

use crate::error::{Error, Result};

/// A header value before any kind inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Scalar(String),
    List(Vec<String>),
}

impl RawValue {
    /// Appends a continuation line, promoting a scalar to a one-element list.
    fn push(&mut self, line: String) {
        match self {
            RawValue::List(items) => items.push(line),
            RawValue::Scalar(first) => {
                let first = std::mem::take(first);
                *self = RawValue::List(vec![first, line]);
            }
        }
    }
}

/// Ordered raw pairs; keys are lower-cased and unique.
pub type RawPairs = Vec<(String, RawValue)>;

/// Splits a document into its header lines and its verbatim body.
///
/// With no blank line the whole document is header and the body is empty.
pub fn split(text: &str) -> (Vec<&str>, &str) {
    let mut header = Vec::new();
    let mut offset = 0;
    for raw in text.split_inclusive('\n') {
        offset += raw.len();
        let line = raw.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return (header, &text[offset..]);
        }
        header.push(line);
    }
    (header, "")
}

/// Parses header lines into ordered raw pairs.
///
/// Parsing stops at the first blank line. A repeated key replaces the earlier
/// value but keeps its position.
pub fn parse(lines: &[&str]) -> Result<RawPairs> {
    let mut pairs: RawPairs = Vec::new();
    let mut current: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            break;
        }

        match line.split_once(':') {
            Some((key, value)) => {
                let key = key.trim().to_lowercase();
                let value = value.trim();
                let raw = if value.is_empty() {
                    RawValue::List(Vec::new())
                } else {
                    RawValue::Scalar(value.to_string())
                };

                let idx = match pairs.iter().position(|(k, _)| *k == key) {
                    Some(idx) => {
                        pairs[idx].1 = raw;
                        idx
                    }
                    None => {
                        pairs.push((key, raw));
                        pairs.len() - 1
                    }
                };
                current = Some(idx);
            }
            None => {
                let idx = current.ok_or_else(|| Error::MalformedHeader {
                    line: i + 1,
                    text: line.to_string(),
                })?;
                pairs[idx].1.push(line.trim().to_string());
            }
        }
    }

    Ok(pairs)
}

/// Splits and parses a whole document, returning its pairs and body.
pub fn parse_document(text: &str) -> Result<(RawPairs, &str)> {
    let (lines, body) = split(text);
    let pairs = parse(&lines)?;
    Ok((pairs, body))
}
