//! Translation of a [`QueryPlan`] into one SQLite statement.
//!
//! The statement selects entity keys only:
//!
//! ```sql
//! SELECT e.key FROM content AS e
//!   LEFT JOIN content_property AS s0 ON s0.owner_key = e.key AND s0.name = ?
//! WHERE e.site_key = ?
//!   AND EXISTS (SELECT 1 FROM content_property AS p
//!               WHERE p.owner_key = e.key AND p.name = ? AND p.str_value = ?)
//!   AND EXISTS (SELECT 1 FROM content_tag AS lt JOIN tag AS t ON t.key = lt.tag_key
//!               WHERE lt.owner_key = e.key AND t.slug = ?)
//! ORDER BY (COALESCE(s0.bool_value, ...) IS NULL) ASC, COALESCE(s0.bool_value, ...) ASC, e.key ASC
//! LIMIT ? OFFSET ?
//! ```
//!
//! Binds are collected in the order their placeholders appear.

use roxy_core::properties::{PropertySlots, SLOT_COLUMNS};
use roxy_core::query::{Attribute, Condition, Filter, Predicate, QueryPlan, TextOp};
use roxy_core::value::Value;

/// A bind parameter in SQLite's storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<&Value> for Bind {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Bind::Null,
            Value::Bool(b) => Bind::Int(i64::from(*b)),
            Value::Int(i) => Bind::Int(*i),
            Value::Float(f) => Bind::Real(*f),
            other => other.storage_text().map(Bind::Text).unwrap_or(Bind::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub binds: Vec<Bind>,
}

fn coalesce(alias: &str) -> String {
    let slots: Vec<String> = SLOT_COLUMNS
        .iter()
        .map(|col| format!("{alias}.{col}"))
        .collect();
    format!("COALESCE({})", slots.join(", "))
}

fn native_column(name: &str) -> String {
    format!("e.\"{name}\"")
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Appends the SQL for one predicate on `column` to `clauses`.
fn predicate_sql(column: &str, predicate: &Predicate, clauses: &mut Vec<String>, binds: &mut Vec<Bind>) {
    let folded = |insensitive: bool| {
        if insensitive {
            format!("lower({column})")
        } else {
            column.to_string()
        }
    };
    let needle = |s: &str, insensitive: bool| {
        if insensitive {
            Bind::Text(s.to_ascii_lowercase())
        } else {
            Bind::Text(s.to_string())
        }
    };

    match predicate {
        Predicate::Compare { op, value } => {
            clauses.push(format!("{column} {} ?", op.sql()));
            binds.push(Bind::from(value));
        }
        Predicate::In(values) => {
            clauses.push(format!("{column} IN ({})", placeholders(values.len())));
            binds.extend(values.iter().map(Bind::from));
        }
        Predicate::Text {
            op,
            value,
            insensitive,
        } => {
            let c = folded(*insensitive);
            let n = needle(value, *insensitive);
            match op {
                TextOp::Is => {
                    clauses.push(format!("{c} = ?"));
                    binds.push(n);
                }
                TextOp::Contains => {
                    clauses.push(format!("instr({c}, ?) > 0"));
                    binds.push(n);
                }
                TextOp::StartsWith => {
                    clauses.push(format!("substr({c}, 1, length(?)) = ?"));
                    binds.extend([n.clone(), n]);
                }
                TextOp::EndsWith => {
                    clauses.push(format!(
                        "length({c}) >= length(?) AND substr({c}, length({c}) - length(?) + 1) = ?"
                    ));
                    binds.extend([n.clone(), n.clone(), n]);
                }
            }
        }
        Predicate::TextIn {
            values,
            insensitive,
        } => {
            let c = folded(*insensitive);
            clauses.push(format!("{c} IN ({})", placeholders(values.len())));
            binds.extend(values.iter().map(|v| needle(v, *insensitive)));
        }
    }
}

fn condition_sql(table: &str, condition: &Condition, binds: &mut Vec<Bind>) -> String {
    match &condition.attribute {
        Attribute::Native(def) => {
            let column = native_column(def.name);
            let mut clauses = vec![format!("{column} IS NOT NULL")];
            for p in &condition.predicates {
                predicate_sql(&column, p, &mut clauses, binds);
            }
            clauses.join(" AND ")
        }
        Attribute::Property(name) => {
            binds.push(Bind::Text(name.clone()));
            let mut clauses = Vec::new();
            let column = if condition.spans_numbers() {
                Some("COALESCE(p.int_value, p.float_value)".to_string())
            } else {
                PropertySlots::column(condition.slot).map(|slot| format!("p.{slot}"))
            };
            match column {
                Some(column) => {
                    clauses.push(format!("{column} IS NOT NULL"));
                    for p in &condition.predicates {
                        predicate_sql(&column, p, &mut clauses, binds);
                    }
                }
                None => clauses.push("0".to_string()),
            }
            format!(
                "EXISTS (SELECT 1 FROM {table}_property AS p WHERE p.owner_key = e.key AND p.name = ? AND {})",
                clauses.join(" AND ")
            )
        }
    }
}

fn tag_sql(table: &str, slug: &str, binds: &mut Vec<Bind>) -> String {
    binds.push(Bind::Text(slug.to_string()));
    format!(
        "EXISTS (SELECT 1 FROM {table}_tag AS lt JOIN tag AS t ON t.key = lt.tag_key \
         WHERE lt.owner_key = e.key AND t.slug = ?)"
    )
}

/// Builds the key-selecting statement for `plan`.
pub fn build(plan: &QueryPlan) -> SqlQuery {
    let table = plan.kind.as_str();
    let mut binds = Vec::new();

    let mut joins = Vec::new();
    let mut order_terms = Vec::new();
    for (i, sort) in plan.order.iter().enumerate() {
        let expr = match &sort.attribute {
            Attribute::Native(def) => native_column(def.name),
            Attribute::Property(name) => {
                let alias = format!("s{i}");
                joins.push(format!(
                    "LEFT JOIN {table}_property AS {alias} ON {alias}.owner_key = e.key AND {alias}.name = ?"
                ));
                binds.push(Bind::Text(name.clone()));
                coalesce(&alias)
            }
        };
        let dir = if sort.descending { "DESC" } else { "ASC" };
        order_terms.push(format!("({expr} IS NULL) {dir}"));
        order_terms.push(format!("{expr} {dir}"));
    }
    order_terms.push("e.key ASC".to_string());

    let mut wheres = Vec::new();
    if let Some(site_key) = &plan.site_key {
        wheres.push("e.site_key = ?".to_string());
        binds.push(Bind::Text(site_key.clone()));
    }
    for filter in &plan.filters {
        match filter {
            Filter::Attribute(condition) => {
                wheres.push(format!("({})", condition_sql(table, condition, &mut binds)))
            }
            Filter::Tags(slugs) => {
                for slug in slugs {
                    wheres.push(tag_sql(table, slug, &mut binds));
                }
            }
        }
    }

    let mut sql = format!("SELECT e.key FROM {table} AS e");
    for join in &joins {
        sql.push(' ');
        sql.push_str(join);
    }
    if !wheres.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&wheres.join(" AND "));
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(&order_terms.join(", "));

    if plan.limit.is_some() || plan.offset > 0 {
        sql.push_str(" LIMIT ? OFFSET ?");
        let limit = plan
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        binds.push(Bind::Int(limit));
        binds.push(Bind::Int(i64::try_from(plan.offset).unwrap_or(i64::MAX)));
    }

    SqlQuery { sql, binds }
}
