//! Resolved, backend-neutral query plans.
//!
//! A [`QueryPlan`] is what [`Query`](super::Query) hands to a
//! [`Store`](crate::store::Store). Every attribute in it has already been
//! resolved to a native field or a property slot, and every criteria value
//! has been fitted to that slot, so backends only translate.

use std::cmp::Ordering;

use crate::models::{EntityKind, FieldDef};
use crate::value::{Value, ValueKind};

/// Where an attribute lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    Native(&'static FieldDef),
    Property(String),
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::Native(def) => def.name,
            Attribute::Property(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    pub fn holds(&self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Is,
    Contains,
    StartsWith,
    EndsWith,
}

/// One test against an attribute value. All predicates of a
/// [`Condition`] must hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        op: CmpOp,
        value: Value,
    },
    In(Vec<Value>),
    Text {
        op: TextOp,
        value: String,
        /// ASCII case folding of both sides.
        insensitive: bool,
    },
    TextIn {
        values: Vec<String>,
        insensitive: bool,
    },
}

/// Conjunction of predicates on one attribute.
///
/// `slot` is the kind the stored value must have: a property stored under a
/// different kind, or an absent/null value, never matches. Numeric property
/// conditions are the exception and accept ints and floats alike.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub attribute: Attribute,
    pub slot: ValueKind,
    pub predicates: Vec<Predicate>,
}

impl Condition {
    /// Property condition reading both the int and float slots.
    pub fn spans_numbers(&self) -> bool {
        matches!(self.attribute, Attribute::Property(_)) && self.slot.is_numeric()
    }

    pub fn accepts(&self, kind: ValueKind) -> bool {
        kind == self.slot || (self.spans_numbers() && kind.is_numeric())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Attribute(Condition),
    /// Entity carries every listed tag slug.
    Tags(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortOrder {
    pub attribute: Attribute,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub kind: EntityKind,
    /// Restricts Content and Asset plans to one site.
    pub site_key: Option<String>,
    pub filters: Vec<Filter>,
    /// Applied in order; entity key ascending breaks remaining ties.
    pub order: Vec<SortOrder>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl QueryPlan {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            site_key: None,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
        }
    }
}
