//! Filter criteria and their compilation into plan predicates.
//!
//! | Target | Scalar | List | Operators |
//! |--------|--------|------|-----------|
//! | bool | equality | | |
//! | int, float | equality | membership | `eq neq gt gteq lt lteq` |
//! | date, datetime | equality | membership | `is isnot after on_after before on_before` |
//! | text | equality | membership | `is in contains startswith endswith insensitive` |
//! | key field | equality | membership | |
//!
//! The target kind is the native field's kind, or for a property the kind of
//! the first criteria value, with two adjustments that follow how ingest
//! stores values:
//!
//! - dates and datetimes against a `time`/`date`-named property target the
//!   datetime slot;
//! - numeric property criteria match int and float values alike, and target
//!   the float slot when any criteria value is a float.

use chrono::{FixedOffset, Utc};

use crate::coerce::{coerce, parse_date, parse_datetime};
use crate::error::{Error, Result};
use crate::models::{slugify, FieldKind};
use crate::normalize::{date_at_midnight, is_temporal_key};
use crate::value::{Value, ValueKind};

use super::plan::{Attribute, CmpOp, Condition, Predicate, TextOp};

/// A filter specification: a value, a list of values, or an operator map.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Scalar(Value),
    List(Vec<Value>),
    Ops(Vec<(String, Criteria)>),
}

impl Criteria {
    /// Builds an operator map from `(op, criteria)` pairs.
    pub fn ops<K, C, I>(ops: I) -> Self
    where
        K: Into<String>,
        C: Into<Criteria>,
        I: IntoIterator<Item = (K, C)>,
    {
        Criteria::Ops(ops.into_iter().map(|(k, c)| (k.into(), c.into())).collect())
    }

    /// Converts JSON criteria; JSON strings go through [`coerce`].
    pub fn from_json(attribute: &str, json: &serde_json::Value) -> Result<Self> {
        use serde_json::Value as Json;
        match json {
            Json::Array(items) => items
                .iter()
                .map(|item| json_scalar(attribute, item))
                .collect::<Result<Vec<_>>>()
                .map(Criteria::List),
            Json::Object(map) => {
                let mut ops = Vec::with_capacity(map.len());
                for (op, value) in map {
                    let inner = match value {
                        Json::Object(_) => {
                            return Err(Error::ambiguous(attribute, "nested operator map"))
                        }
                        other => Criteria::from_json(attribute, other)?,
                    };
                    ops.push((op.clone(), inner));
                }
                Ok(Criteria::Ops(ops))
            }
            scalar => json_scalar(attribute, scalar).map(Criteria::Scalar),
        }
    }

    /// Typed values in order, skipping the `insensitive` flag.
    fn values(&self) -> Vec<&Value> {
        match self {
            Criteria::Scalar(v) => vec![v],
            Criteria::List(values) => values.iter().collect(),
            Criteria::Ops(ops) => ops
                .iter()
                .filter(|(op, _)| op != "insensitive")
                .flat_map(|(_, c)| match c {
                    Criteria::Ops(_) => Vec::new(),
                    c => c.values(),
                })
                .collect(),
        }
    }

    /// Kind of the first typed value, ignoring the `insensitive` flag.
    fn first_kind(&self) -> Option<ValueKind> {
        self.values()
            .first()
            .map(|v| v.kind())
            .filter(|k| *k != ValueKind::Null)
    }
}

fn json_scalar(attribute: &str, json: &serde_json::Value) -> Result<Value> {
    use serde_json::Value as Json;
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| Error::ambiguous(attribute, format!("unrepresentable number {n}"))),
        },
        Json::String(s) => Ok(coerce(s)),
        Json::Array(_) | Json::Object(_) => {
            Err(Error::ambiguous(attribute, "nested structure in criteria"))
        }
    }
}

macro_rules! scalar_criteria {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Criteria {
                fn from(v: $ty) -> Self {
                    Criteria::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_criteria!(
    Value,
    bool,
    i64,
    i32,
    f64,
    &str,
    String,
    chrono::NaiveDate,
    chrono::DateTime<chrono::FixedOffset>,
    chrono::DateTime<Utc>,
);

impl<T: Into<Value>> From<Vec<T>> for Criteria {
    fn from(values: Vec<T>) -> Self {
        Criteria::List(values.into_iter().map(Into::into).collect())
    }
}

/// Compiles criteria on a resolved attribute into a [`Condition`].
///
/// Dates given against a datetime slot become midnight in `tz`.
pub(crate) fn compile(attribute: Attribute, criteria: Criteria, tz: &FixedOffset) -> Result<Condition> {
    let name = attribute.name().to_string();
    let (slot, field_kind) = match &attribute {
        Attribute::Native(def) => (def.kind.value_kind(), Some(def.kind)),
        Attribute::Property(_) => (property_slot(&name, &criteria)?, None),
    };

    let predicates = match (field_kind, slot) {
        (Some(FieldKind::Key), _) => key_predicates(&name, criteria)?,
        (_, ValueKind::Bool) => bool_predicates(&name, criteria)?,
        (_, ValueKind::String) => text_predicates(&name, criteria)?,
        (_, ValueKind::Int | ValueKind::Float) => {
            ordered_predicates(&name, slot, criteria, numeric_op, tz)?
        }
        (_, ValueKind::Date | ValueKind::DateTime) => {
            ordered_predicates(&name, slot, criteria, temporal_op, tz)?
        }
        (_, ValueKind::Null) => return Err(Error::ambiguous(&name, "null criteria")),
    };

    Ok(Condition {
        attribute,
        slot,
        predicates,
    })
}

fn property_slot(name: &str, criteria: &Criteria) -> Result<ValueKind> {
    let kind = criteria
        .first_kind()
        .ok_or_else(|| Error::ambiguous(name, "cannot determine value kind"))?;
    let any_float = || criteria.values().iter().any(|v| v.kind() == ValueKind::Float);
    Ok(match kind {
        k if k.is_temporal() && is_temporal_key(name) => ValueKind::DateTime,
        ValueKind::Int if any_float() => ValueKind::Float,
        k => k,
    })
}

/// Compiles `tags` criteria into the list of slugs an entity must carry.
pub(crate) fn compile_tags(criteria: Criteria) -> Result<Vec<String>> {
    let names = match criteria {
        Criteria::Scalar(v) => vec![v],
        Criteria::List(values) => values,
        Criteria::Ops(_) => return Err(Error::ambiguous("tags", "operators are not supported")),
    };

    let mut slugs: Vec<String> = Vec::with_capacity(names.len());
    for value in names {
        let slug = match value {
            Value::String(s) => slugify(&s),
            Value::Null => return Err(Error::ambiguous("tags", "null tag name")),
            other => slugify(&other.to_string()),
        };
        if !slug.is_empty() && !slugs.contains(&slug) {
            slugs.push(slug);
        }
    }
    if slugs.is_empty() {
        return Err(Error::ambiguous("tags", "no tag names given"));
    }
    Ok(slugs)
}

fn numeric_op(op: &str) -> Option<CmpOp> {
    match op {
        "eq" => Some(CmpOp::Eq),
        "neq" => Some(CmpOp::Ne),
        "gt" => Some(CmpOp::Gt),
        "gteq" => Some(CmpOp::Ge),
        "lt" => Some(CmpOp::Lt),
        "lteq" => Some(CmpOp::Le),
        _ => None,
    }
}

fn temporal_op(op: &str) -> Option<CmpOp> {
    match op {
        "is" => Some(CmpOp::Eq),
        "isnot" => Some(CmpOp::Ne),
        "after" => Some(CmpOp::Gt),
        "on_after" => Some(CmpOp::Ge),
        "before" => Some(CmpOp::Lt),
        "on_before" => Some(CmpOp::Le),
        _ => None,
    }
}

fn unknown_op(name: &str, op: &str, slot: ValueKind) -> Error {
    Error::ambiguous(name, format!("unknown operator `{op}` for {slot} values"))
}

fn non_empty(name: &str, values: Vec<Value>) -> Result<Vec<Value>> {
    if values.is_empty() {
        Err(Error::ambiguous(name, "empty list"))
    } else {
        Ok(values)
    }
}

fn local_midnight(name: &str, date: chrono::NaiveDate, tz: &FixedOffset) -> Result<Value> {
    date_at_midnight(date, tz)
        .map(Value::DateTime)
        .ok_or_else(|| Error::ambiguous(name, format!("no local midnight on {date}")))
}

/// Fits a criteria value to `slot`: ints widen to floats, dates become
/// midnight in `tz` against datetimes, and text is parsed against datetimes.
fn fit(name: &str, value: Value, slot: ValueKind, tz: &FixedOffset) -> Result<Value> {
    if value.kind() == slot {
        return Ok(value);
    }
    match (slot, value) {
        (_, Value::Null) => Err(Error::ambiguous(name, "null criteria value")),
        (ValueKind::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (ValueKind::DateTime, Value::Date(d)) => local_midnight(name, d, tz),
        (ValueKind::DateTime, Value::String(s)) => match parse_datetime(&s) {
            Some(parsed) => Ok(Value::DateTime(parsed.assume_utc())),
            None => match parse_date(&s) {
                Some(d) => local_midnight(name, d, tz),
                None => Err(Error::mismatch(ValueKind::DateTime, ValueKind::String)),
            },
        },
        (_, other) => Err(Error::mismatch(slot, other.kind())),
    }
}

fn fit_text(name: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Err(Error::ambiguous(name, "null criteria value")),
        other => Err(Error::mismatch(ValueKind::String, other.kind())),
    }
}

fn fit_all(name: &str, values: Vec<Value>, slot: ValueKind, tz: &FixedOffset) -> Result<Vec<Value>> {
    non_empty(name, values)?
        .into_iter()
        .map(|v| fit(name, v, slot, tz))
        .collect()
}

fn key_predicates(name: &str, criteria: Criteria) -> Result<Vec<Predicate>> {
    match criteria {
        Criteria::Scalar(v) => Ok(vec![Predicate::Text {
            op: TextOp::Is,
            value: fit_text(name, v)?,
            insensitive: false,
        }]),
        Criteria::List(values) => Ok(vec![Predicate::TextIn {
            values: non_empty(name, values)?
                .into_iter()
                .map(|v| fit_text(name, v))
                .collect::<Result<_>>()?,
            insensitive: false,
        }]),
        Criteria::Ops(_) => Err(Error::ambiguous(
            name,
            "key fields support equality and membership only",
        )),
    }
}

fn bool_predicates(name: &str, criteria: Criteria) -> Result<Vec<Predicate>> {
    match criteria {
        Criteria::Scalar(Value::Bool(b)) => Ok(vec![Predicate::Compare {
            op: CmpOp::Eq,
            value: Value::Bool(b),
        }]),
        Criteria::Scalar(Value::Null) => Err(Error::ambiguous(name, "null criteria value")),
        Criteria::Scalar(other) => Err(Error::mismatch(ValueKind::Bool, other.kind())),
        _ => Err(Error::ambiguous(name, "bool values support equality only")),
    }
}

fn ordered_predicates(
    name: &str,
    slot: ValueKind,
    criteria: Criteria,
    op_for: fn(&str) -> Option<CmpOp>,
    tz: &FixedOffset,
) -> Result<Vec<Predicate>> {
    match criteria {
        Criteria::Scalar(v) => Ok(vec![Predicate::Compare {
            op: CmpOp::Eq,
            value: fit(name, v, slot, tz)?,
        }]),
        Criteria::List(values) => Ok(vec![Predicate::In(fit_all(name, values, slot, tz)?)]),
        Criteria::Ops(ops) => {
            if ops.is_empty() {
                return Err(Error::ambiguous(name, "empty operator map"));
            }
            ops.into_iter()
                .map(|(op, inner)| {
                    let cmp = op_for(&op).ok_or_else(|| unknown_op(name, &op, slot))?;
                    match inner {
                        Criteria::Scalar(v) => Ok(Predicate::Compare {
                            op: cmp,
                            value: fit(name, v, slot, tz)?,
                        }),
                        _ => Err(Error::ambiguous(name, format!("`{op}` takes a single value"))),
                    }
                })
                .collect()
        }
    }
}

fn text_predicates(name: &str, criteria: Criteria) -> Result<Vec<Predicate>> {
    match criteria {
        Criteria::Scalar(v) => Ok(vec![Predicate::Text {
            op: TextOp::Is,
            value: fit_text(name, v)?,
            insensitive: false,
        }]),
        Criteria::List(values) => Ok(vec![Predicate::TextIn {
            values: non_empty(name, values)?
                .into_iter()
                .map(|v| fit_text(name, v))
                .collect::<Result<_>>()?,
            insensitive: false,
        }]),
        Criteria::Ops(ops) => {
            let mut insensitive = false;
            let mut rest = Vec::with_capacity(ops.len());
            for (op, inner) in ops {
                if op == "insensitive" {
                    insensitive = match inner {
                        Criteria::Scalar(Value::Bool(b)) => b,
                        Criteria::Scalar(other) => {
                            return Err(Error::mismatch(ValueKind::Bool, other.kind()))
                        }
                        _ => return Err(Error::ambiguous(name, "`insensitive` takes a boolean")),
                    };
                } else {
                    rest.push((op, inner));
                }
            }
            if rest.is_empty() {
                return Err(Error::ambiguous(name, "no text operator given"));
            }

            rest.into_iter()
                .map(|(op, inner)| {
                    let text_op = match op.as_str() {
                        "is" => TextOp::Is,
                        "contains" => TextOp::Contains,
                        "startswith" => TextOp::StartsWith,
                        "endswith" => TextOp::EndsWith,
                        "in" => {
                            let values = match inner {
                                Criteria::Scalar(v) => vec![v],
                                Criteria::List(values) => non_empty(name, values)?,
                                Criteria::Ops(_) => {
                                    return Err(Error::ambiguous(name, "nested operator map"))
                                }
                            };
                            return Ok(Predicate::TextIn {
                                values: values
                                    .into_iter()
                                    .map(|v| fit_text(name, v))
                                    .collect::<Result<_>>()?,
                                insensitive,
                            });
                        }
                        _ => return Err(unknown_op(name, &op, ValueKind::String)),
                    };
                    match inner {
                        Criteria::Scalar(v) => Ok(Predicate::Text {
                            op: text_op,
                            value: fit_text(name, v)?,
                            insensitive,
                        }),
                        _ => Err(Error::ambiguous(name, format!("`{op}` takes a single value"))),
                    }
                })
                .collect()
        }
    }
}
