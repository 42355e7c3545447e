//! Field-name-driven typing of raw header pairs.
//!
//! | Key | Result |
//! |-----|--------|
//! | `time`, `*_time` | date/time in the configured timezone |
//! | `date`, `*_date` | `YYYY-MM-DD` at midnight in the configured timezone |
//! | `tags` | resolved [`Tag`] list (lookup-or-create by slug) |
//! | native text field of the target kind | raw text |
//! | anything else | [`coerce`] |
//!
//! When `publish_time` is absent, the first present of `time`, `date` and
//! `publish_date` is renamed to `publish_time`.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use tracing::warn;

use crate::coerce::{coerce, parse_date, parse_datetime};
use crate::error::Result;
use crate::header::{RawPairs, RawValue};
use crate::models::{slugify, EntityKind, FieldKind, Record, Tag};
use crate::value::Value;

const PUBLISH_TIME: &str = "publish_time";
const PUBLISH_ALIASES: [&str; 3] = ["time", "date", "publish_date"];

/// Lookup-or-create of tags by slug.
#[async_trait]
pub trait TagRegistry: Send + Sync {
    /// Returns the tag whose slug is `slugify(name)`, creating it if needed.
    async fn get_or_create_tag(&self, name: &str) -> Result<Tag>;
}

/// Typed metadata ready to be assigned onto a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Header order is preserved.
    pub fields: Vec<(String, Value)>,
    /// `Some` when the header carried a `tags` key.
    pub tags: Option<Vec<Tag>>,
}

impl Metadata {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Assigns every field onto `record` and replaces its tags when present.
    pub fn apply<R: Record>(self, record: &mut R) -> Result<()> {
        for (name, value) in self.fields {
            record.set(&name, value)?;
        }
        if let Some(tags) = self.tags {
            record.set_tags(tags)?;
        }
        Ok(())
    }
}

fn is_time_key(key: &str) -> bool {
    key == "time" || key.ends_with("_time")
}

fn is_date_key(key: &str) -> bool {
    key == "date" || key.ends_with("_date")
}

/// Whether a parsable value under `key` is stored as a DateTime.
pub(crate) fn is_temporal_key(key: &str) -> bool {
    is_time_key(key) || is_date_key(key)
}

/// Midnight of `date` in `tz`.
pub(crate) fn date_at_midnight(date: NaiveDate, tz: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN)).single()
}

fn midnight(text: &str, tz: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    date_at_midnight(parse_date(text)?, tz)
}

/// Types raw header pairs for an entity of `kind`.
pub async fn normalize(
    pairs: RawPairs,
    kind: EntityKind,
    tz: &FixedOffset,
    registry: &dyn TagRegistry,
) -> Result<Metadata> {
    let mut meta = Metadata::default();

    for (key, raw) in pairs {
        if key == "tags" {
            meta.tags = Some(resolve_tags(raw, registry).await?);
            continue;
        }

        let text = match raw {
            RawValue::Scalar(s) => s,
            RawValue::List(items) if items.is_empty() => {
                meta.fields.push((key, Value::Null));
                continue;
            }
            RawValue::List(items) => items.join("\n"),
        };

        let value = if is_time_key(&key) {
            match parse_datetime(&text).and_then(|p| p.in_timezone(tz)) {
                Some(dt) => Value::DateTime(dt),
                None => {
                    warn!(key = %key, value = %text, "unparsable time, falling back to coercion");
                    coerce(&text)
                }
            }
        } else if is_date_key(&key) {
            match midnight(&text, tz) {
                Some(dt) => Value::DateTime(dt),
                None => {
                    warn!(key = %key, value = %text, "unparsable date, falling back to coercion");
                    coerce(&text)
                }
            }
        } else if kind
            .field(&key)
            .is_some_and(|def| def.kind == FieldKind::Text)
        {
            Value::String(text)
        } else {
            coerce(&text)
        };

        meta.fields.push((key, value));
    }

    if !meta.contains(PUBLISH_TIME) {
        let alias = PUBLISH_ALIASES
            .iter()
            .find_map(|alias| meta.fields.iter().position(|(k, _)| k == alias));
        if let Some(idx) = alias {
            meta.fields[idx].0 = PUBLISH_TIME.to_string();
        }
    }

    Ok(meta)
}

async fn resolve_tags(raw: RawValue, registry: &dyn TagRegistry) -> Result<Vec<Tag>> {
    let tokens: Vec<String> = match raw {
        RawValue::Scalar(s) => s.split(',').map(|t| t.trim().to_string()).collect(),
        RawValue::List(items) => items,
    };

    let mut tags: Vec<Tag> = Vec::new();
    for token in tokens {
        if slugify(&token).is_empty() {
            continue;
        }
        let tag = registry.get_or_create_tag(&token).await?;
        if !tags.iter().any(|t| t.key == tag.key) {
            tags.push(tag);
        }
    }
    Ok(tags)
}
