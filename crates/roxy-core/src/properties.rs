//! Free-form typed properties attached to Sites, Contents and Assets.

use std::collections::BTreeMap;

use anyhow::anyhow;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::value::{
    format_date, format_datetime, parse_stored_date, parse_stored_datetime, Value, ValueKind,
};

/// Per-entity mapping from property name to [`Value`].
///
/// Values are stored exactly as given; nothing is coerced on the way in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PropertyStore {
    values: BTreeMap<String, Value>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Inserts or replaces a property, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterates properties in name order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for PropertyStore {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Slot columns in coalesce order.
pub const SLOT_COLUMNS: [&str; 6] = [
    "bool_value",
    "int_value",
    "float_value",
    "date_value",
    "datetime_value",
    "str_value",
];

/// The persisted form of a property value: one nullable column per kind.
///
/// Dates and datetimes are kept in their storage text form so that every
/// backend orders them the same way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySlots {
    pub bool_value: Option<bool>,
    pub int_value: Option<i64>,
    pub float_value: Option<f64>,
    pub date_value: Option<String>,
    pub datetime_value: Option<String>,
    pub str_value: Option<String>,
}

impl PropertySlots {
    /// Column holding values of `kind`. `Null` has none.
    pub fn column(kind: ValueKind) -> Option<&'static str> {
        match kind {
            ValueKind::Null => None,
            ValueKind::Bool => Some("bool_value"),
            ValueKind::Int => Some("int_value"),
            ValueKind::Float => Some("float_value"),
            ValueKind::Date => Some("date_value"),
            ValueKind::DateTime => Some("datetime_value"),
            ValueKind::String => Some("str_value"),
        }
    }

    pub fn populated(&self) -> usize {
        [
            self.bool_value.is_some(),
            self.int_value.is_some(),
            self.float_value.is_some(),
            self.date_value.is_some(),
            self.datetime_value.is_some(),
            self.str_value.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    /// Rebuilds the value of property `name`.
    ///
    /// A row with no populated slot is `Null`; more than one is
    /// [`Error::InvalidSlots`].
    pub fn into_value(self, name: &str) -> Result<Value> {
        let populated = self.populated();
        if populated > 1 {
            return Err(Error::InvalidSlots {
                name: name.to_string(),
                populated,
            });
        }

        if let Some(b) = self.bool_value {
            return Ok(Value::Bool(b));
        }
        if let Some(i) = self.int_value {
            return Ok(Value::Int(i));
        }
        if let Some(f) = self.float_value {
            return Ok(Value::Float(f));
        }
        if let Some(text) = self.date_value {
            return parse_stored_date(&text)
                .map(Value::Date)
                .ok_or_else(|| anyhow!("property `{name}`: bad stored date {text:?}").into());
        }
        if let Some(text) = self.datetime_value {
            return parse_stored_datetime(&text)
                .map(Value::DateTime)
                .ok_or_else(|| anyhow!("property `{name}`: bad stored datetime {text:?}").into());
        }
        Ok(self.str_value.map(Value::String).unwrap_or(Value::Null))
    }
}

impl From<&Value> for PropertySlots {
    fn from(value: &Value) -> Self {
        let mut slots = PropertySlots::default();
        match value {
            Value::Null => {}
            Value::Bool(b) => slots.bool_value = Some(*b),
            Value::Int(i) => slots.int_value = Some(*i),
            Value::Float(f) => slots.float_value = Some(*f),
            Value::Date(d) => slots.date_value = Some(format_date(d)),
            Value::DateTime(dt) => slots.datetime_value = Some(format_datetime(dt)),
            Value::String(s) => slots.str_value = Some(s.clone()),
        }
        slots
    }
}
