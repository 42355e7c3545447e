//! In-process execution of a [`QueryPlan`].
//!
//! Ordering mirrors SQLite storage classes so that every backend returns the
//! same sequence: numbers (bool, int, float) sort before text (date,
//! datetime and string storage text, compared byte-wise).

use std::cmp::Ordering;

use crate::models::Entity;
use crate::value::{cmp_f64, Value};

use super::plan::{Attribute, Condition, Filter, Predicate, QueryPlan, SortOrder, TextOp};

/// Filters, sorts and paginates `entities` according to `plan`.
pub fn execute(plan: &QueryPlan, entities: impl IntoIterator<Item = Entity>) -> Vec<Entity> {
    let mut rows: Vec<Entity> = entities
        .into_iter()
        .filter(|e| e.kind() == plan.kind)
        .filter(|e| in_site(e, plan.site_key.as_deref()))
        .filter(|e| plan.filters.iter().all(|f| matches(e, f)))
        .collect();
    sort(&mut rows, &plan.order);
    paginate(rows, plan.limit, plan.offset)
}

fn in_site(entity: &Entity, site_key: Option<&str>) -> bool {
    match site_key {
        None => true,
        Some(key) => matches!(entity.get("site_key"), Some(Value::String(s)) if s == key),
    }
}

fn attribute_value(entity: &Entity, attribute: &Attribute) -> Value {
    entity.get(attribute.name()).unwrap_or(Value::Null)
}

pub fn matches(entity: &Entity, filter: &Filter) -> bool {
    match filter {
        Filter::Tags(slugs) => slugs
            .iter()
            .all(|slug| entity.tags().iter().any(|t| &t.slug == slug)),
        Filter::Attribute(condition) => condition_holds(entity, condition),
    }
}

fn condition_holds(entity: &Entity, condition: &Condition) -> bool {
    let value = attribute_value(entity, &condition.attribute);
    if value.is_null() || !condition.accepts(value.kind()) {
        return false;
    }
    condition
        .predicates
        .iter()
        .all(|p| predicate_holds(&value, p))
}

fn fold(s: &str, insensitive: bool) -> String {
    if insensitive {
        s.to_ascii_lowercase()
    } else {
        s.to_string()
    }
}

/// Same-kind ordering, plus ints against floats the way SQLite compares
/// INTEGER with REAL.
fn compare(value: &Value, target: &Value) -> Option<Ordering> {
    match (value, target) {
        (Value::Int(a), Value::Float(b)) => Some(cmp_f64(*a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Some(cmp_f64(*a, *b as f64)),
        _ => value.try_cmp(target).ok(),
    }
}

fn predicate_holds(value: &Value, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Compare { op, value: target } => {
            compare(value, target).is_some_and(|ord| op.holds(ord))
        }
        Predicate::In(targets) => targets
            .iter()
            .any(|t| compare(value, t) == Some(Ordering::Equal)),
        Predicate::Text {
            op,
            value: target,
            insensitive,
        } => {
            let Some(text) = value.as_str() else {
                return false;
            };
            let text = fold(text, *insensitive);
            let target = fold(target, *insensitive);
            match op {
                TextOp::Is => text == target,
                TextOp::Contains => text.contains(&target),
                TextOp::StartsWith => text.starts_with(&target),
                TextOp::EndsWith => text.ends_with(&target),
            }
        }
        Predicate::TextIn {
            values,
            insensitive,
        } => {
            let Some(text) = value.as_str() else {
                return false;
            };
            let text = fold(text, *insensitive);
            values.iter().any(|v| fold(v, *insensitive) == text)
        }
    }
}

/// Single sortable key per row, modelled on SQLite's comparison of
/// INTEGER/REAL against TEXT values.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Int(i64),
    Real(f64),
    Text(String),
}

impl SortKey {
    fn of(value: &Value) -> Option<SortKey> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(SortKey::Int(i64::from(*b))),
            Value::Int(i) => Some(SortKey::Int(*i)),
            Value::Float(f) => Some(SortKey::Real(*f)),
            other => other.storage_text().map(SortKey::Text),
        }
    }

    fn cmp(&self, other: &SortKey) -> Ordering {
        use SortKey::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Int(a), Real(b)) => cmp_f64(*a as f64, *b),
            (Real(a), Int(b)) => cmp_f64(*a, *b as f64),
            (Real(a), Real(b)) => cmp_f64(*a, *b),
            (Text(a), Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Text(_), _) => Ordering::Greater,
            (_, Text(_)) => Ordering::Less,
        }
    }
}

/// Null/absent sorts last ascending and first descending.
fn compare_keys(a: &Option<SortKey>, b: &Option<SortKey>, descending: bool) -> Ordering {
    let ord = match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(b),
    };
    if descending {
        ord.reverse()
    } else {
        ord
    }
}

pub fn sort(entities: &mut [Entity], order: &[SortOrder]) {
    let mut keyed: Vec<(Vec<Option<SortKey>>, usize)> = entities
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let keys = order
                .iter()
                .map(|o| SortKey::of(&attribute_value(e, &o.attribute)))
                .collect();
            (keys, i)
        })
        .collect();

    keyed.sort_by(|(ka, ia), (kb, ib)| {
        for ((a, b), o) in ka.iter().zip(kb.iter()).zip(order) {
            let ord = compare_keys(a, b, o.descending);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        entities[*ia].key().cmp(entities[*ib].key())
    });

    let permutation: Vec<usize> = keyed.into_iter().map(|(_, i)| i).collect();
    let sorted: Vec<Entity> = permutation.iter().map(|&i| entities[i].clone()).collect();
    for (slot, entity) in entities.iter_mut().zip(sorted) {
        *slot = entity;
    }
}

pub fn paginate(entities: Vec<Entity>, limit: Option<u64>, offset: u64) -> Vec<Entity> {
    let skip = usize::try_from(offset).unwrap_or(usize::MAX);
    let take = limit
        .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    entities.into_iter().skip(skip).take(take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Content, EntityKind, Record, Tag};
    use crate::query::plan::CmpOp;
    use crate::value::ValueKind;

    fn content(key: &str, props: &[(&str, Value)]) -> Entity {
        let mut c = Content::new("site", &format!("{key}.md"));
        c.key = key.to_string();
        c.title = key.to_uppercase();
        for (name, value) in props {
            c.properties.set(*name, value.clone());
        }
        c.into_entity()
    }

    fn keys(entities: &[Entity]) -> Vec<&str> {
        entities.iter().map(|e| e.key()).collect()
    }

    fn by(name: &str, descending: bool) -> SortOrder {
        SortOrder {
            attribute: Attribute::Property(name.to_string()),
            descending,
        }
    }

    #[test]
    fn test_absent_sorts_last_ascending_first_descending() {
        let mut rows = vec![
            content("a", &[("n", Value::Int(2))]),
            content("b", &[]),
            content("c", &[("n", Value::Int(1))]),
        ];
        sort(&mut rows, &[by("n", false)]);
        assert_eq!(keys(&rows), vec!["c", "a", "b"]);

        sort(&mut rows, &[by("n", true)]);
        assert_eq!(keys(&rows), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_mixed_kinds_numbers_before_text() {
        let mut rows = vec![
            content("a", &[("v", Value::from("apple"))]),
            content("b", &[("v", Value::Float(2.5))]),
            content("c", &[("v", Value::Bool(true))]),
            content("d", &[("v", Value::Int(2))]),
        ];
        sort(&mut rows, &[by("v", false)]);
        assert_eq!(keys(&rows), vec!["c", "d", "b", "a"]);
    }

    #[test]
    fn test_key_breaks_ties() {
        let mut rows = vec![
            content("z", &[("n", Value::Int(1))]),
            content("m", &[("n", Value::Int(1))]),
        ];
        sort(&mut rows, &[by("n", true)]);
        assert_eq!(keys(&rows), vec!["m", "z"]);
    }

    #[test]
    fn test_range_filter() {
        let condition = Condition {
            attribute: Attribute::Property("n".into()),
            slot: ValueKind::Int,
            predicates: vec![
                Predicate::Compare {
                    op: CmpOp::Gt,
                    value: Value::Int(5),
                },
                Predicate::Compare {
                    op: CmpOp::Le,
                    value: Value::Int(10),
                },
            ],
        };
        let filter = Filter::Attribute(condition);
        let hits: Vec<i64> = [4, 5, 6, 10, 11]
            .into_iter()
            .filter(|n| matches(&content("x", &[("n", Value::Int(*n))]), &filter))
            .collect();
        assert_eq!(hits, vec![6, 10]);

        // floats compare numerically; text and absent never match
        assert!(matches(&content("x", &[("n", Value::Float(7.5))]), &filter));
        assert!(!matches(&content("x", &[("n", Value::Float(5.0))]), &filter));
        assert!(!matches(&content("x", &[("n", Value::from("7"))]), &filter));
        assert!(!matches(&content("x", &[]), &filter));
    }

    #[test]
    fn test_absent_property_never_matches() {
        let filter = Filter::Attribute(Condition {
            attribute: Attribute::Property("color".into()),
            slot: ValueKind::String,
            predicates: vec![Predicate::Text {
                op: TextOp::Is,
                value: "red".into(),
                insensitive: false,
            }],
        });
        assert!(matches(&content("x", &[("color", "red".into())]), &filter));
        assert!(!matches(&content("x", &[]), &filter));
    }

    #[test]
    fn test_text_insensitive() {
        let filter = Filter::Attribute(Condition {
            attribute: Attribute::Native(EntityKind::Content.field("title").unwrap()),
            slot: ValueKind::String,
            predicates: vec![Predicate::Text {
                op: TextOp::EndsWith,
                value: "LO".into(),
                insensitive: true,
            }],
        });
        assert!(matches(&content("hello", &[]), &filter));
        assert!(!matches(&content("help", &[]), &filter));
    }

    #[test]
    fn test_tags_require_all() {
        let mut c = Content::new("site", "a.md");
        c.tags = vec![Tag::new("a"), Tag::new("b")];
        let both = c.clone().into_entity();
        c.tags.truncate(1);
        let only_a = c.into_entity();

        let filter = Filter::Tags(vec!["a".into(), "b".into()]);
        assert!(matches(&both, &filter));
        assert!(!matches(&only_a, &filter));
        assert!(!matches(&both, &Filter::Tags(vec!["nope".into()])));
    }

    #[test]
    fn test_execute_paginates_after_sorting() {
        let rows: Vec<Entity> = (1..=5)
            .map(|i| content(&format!("k{i}"), &[("n", Value::Int(i))]))
            .collect();
        let mut plan = QueryPlan::new(EntityKind::Content);
        plan.order = vec![by("n", true)];
        plan.offset = 1;
        plan.limit = Some(2);
        let page = execute(&plan, rows);
        assert_eq!(keys(&page), vec!["k4", "k3"]);
    }
}
