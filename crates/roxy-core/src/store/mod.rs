//! Storage abstraction for Roxy.
//!
//! The [`Store`] trait is everything ingestion and the query engine need from
//! a backend. Backends receive fully resolved [`QueryPlan`]s and must return
//! the same rows in the same order as the in-process evaluator
//! ([`query::eval`](crate::query::eval)).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Asset, Content, Entity, EntityKind, Site, Tag};
use crate::normalize::TagRegistry;
use crate::query::QueryPlan;

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save_site`](Store::save_site) | Insert or replace a site and its properties |
/// | [`save_content`](Store::save_content) | Insert or replace content, its tags and properties |
/// | [`save_asset`](Store::save_asset) | Insert or replace an asset, its tags and properties |
/// | [`delete`](Store::delete) | Remove an entity and everything it owns |
/// | [`fetch`](Store::fetch) | Execute a query plan |
/// | [`site_tags`](Store::site_tags) | Tags used by a site's content |
/// | [`get_or_create_tag`](TagRegistry::get_or_create_tag) | Race-safe tag creation |
#[async_trait]
pub trait Store: TagRegistry {
    async fn save_site(&self, site: &Site) -> Result<()>;

    /// Tags must already exist (see [`TagRegistry`]).
    async fn save_content(&self, content: &Content) -> Result<()>;

    async fn save_asset(&self, asset: &Asset) -> Result<()>;

    /// Deletes by key, cascading to properties and tag links. Deleting a
    /// site also deletes its contents and assets. Returns whether a row
    /// existed.
    async fn delete(&self, kind: EntityKind, key: &str) -> Result<bool>;

    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<Entity>>;

    /// Distinct tags referenced by the site's content, ordered by name.
    async fn site_tags(&self, site_key: &str) -> Result<Vec<Tag>>;
}
