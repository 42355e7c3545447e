//! # Roxy Core
//!
//! Storage-and-query logic for Roxy: typed values, kind inference, header
//! parsing, metadata normalization, the entity model, the query engine and
//! the store abstraction.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. The SQLite backend and the ingestion pipeline
//! live in the `roxy` application crate.
//!
//! ```text
//! document ─► header::parse_document ─► normalize::normalize ─► Metadata::apply
//!                                                                   │
//!                                       Store::save_* ◄─────────────┘
//!                                            │
//!                 Query::filter/order_by ─► QueryPlan ─► Store::fetch
//! ```

pub mod coerce;
pub mod error;
pub mod header;
pub mod models;
pub mod normalize;
pub mod properties;
pub mod query;
pub mod store;
pub mod value;

pub use error::{Error, Result};
pub use models::{Asset, Content, Entity, EntityKind, Record, Site, Tag};
pub use query::{lookup, Criteria, Query};
pub use store::Store;
pub use value::{Value, ValueKind};
