//! # Roxy
//!
//! A schema-on-read content store. Documents carry a free-form `key: value`
//! header; known fields land in typed columns, everything else becomes a
//! typed property. Queries filter, sort and page over both alike.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │ Filesystem  │──▶│ Header parse │──▶│   SQLite    │
//! │ content +   │   │ + normalize  │   │ typed slots │
//! │ assets      │   │ (roxy-core)  │   └─────┬──────┘
//! └─────────────┘   └──────────────┘         │
//!                                            ▼
//!                                     ┌────────────┐
//!                                     │ Query plan │──▶ CLI (JSON)
//!                                     └────────────┘
//! ```
//!
//! The pure model (values, parsing, normalization, query plans, the `Store`
//! trait and an in-memory store) lives in the `roxy-core` crate. This crate
//! adds configuration, SQLite persistence, filesystem discovery, ingestion
//! and the CLI commands.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite [`Store`](roxy_core::Store) backend |
//! | [`query_sql`] | Query plan → SQL translation |
//! | [`connector_fs`] | Filesystem discovery |
//! | [`ingest`] | Sync pipeline |
//! | [`get`] | `roxy get` |
//! | [`query_cmd`] | `roxy query` and `roxy tags` |

pub mod config;
pub mod connector_fs;
pub mod db;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod query_cmd;
pub mod query_sql;
pub mod sqlite_store;
