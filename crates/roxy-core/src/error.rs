//! Error taxonomy shared by every Roxy component.
//!
//! Parsing and coercion of scalar text never fail; only structural problems
//! (a malformed header), invalid query construction, failed lookups and
//! storage failures surface as [`Error`].

use thiserror::Error;

use crate::models::EntityKind;
use crate::value::ValueKind;

/// Errors raised by the core and by [`Store`](crate::store::Store) backends.
#[derive(Error, Debug)]
pub enum Error {
    /// A continuation line appeared before any `key:` line.
    #[error("malformed header at line {line}: continuation {text:?} before any key")]
    MalformedHeader { line: usize, text: String },

    /// Unknown operator key, or a criteria value whose kind cannot be determined.
    #[error("ambiguous criteria for `{attribute}`: {reason}")]
    AmbiguousCriteria { attribute: String, reason: String },

    /// Two values of different kinds were compared or assigned.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValueKind, found: ValueKind },

    /// The attribute is neither a native field nor a property of this kind.
    #[error("unknown attribute `{attribute}` for {kind}")]
    UnknownAttribute { kind: EntityKind, attribute: String },

    /// The native field exists but cannot be assigned from metadata.
    #[error("field `{field}` of {kind} is read-only")]
    ReadOnlyField { kind: EntityKind, field: String },

    /// A persisted property row has more than one populated slot.
    #[error("property `{name}` has {populated} populated value slots")]
    InvalidSlots { name: String, populated: usize },

    /// `one()` matched nothing.
    #[error("no {kind} matched the query")]
    NotFound { kind: EntityKind },

    /// `one()` matched more than one row.
    #[error("more than one {kind} matched the query")]
    MultipleMatches { kind: EntityKind },

    /// Another entity of the same kind already carries this non-empty slug.
    #[error("{kind} slug `{slug}` is already taken")]
    DuplicateSlug { kind: EntityKind, slug: String },

    /// A concurrent writer created the tag first. Recovered by re-selecting.
    #[error("tag `{slug}` already exists")]
    DuplicateTag { slug: String },

    /// Storage backend failure.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn ambiguous(attribute: &str, reason: impl Into<String>) -> Self {
        Self::AmbiguousCriteria {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(expected: ValueKind, found: ValueKind) -> Self {
        Self::TypeMismatch { expected, found }
    }
}
