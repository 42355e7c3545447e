//! Entity retrieval by key or slug.
//!
//! Backs the `roxy get <kind> <ident>` command.

use anyhow::{Context, Result};

use roxy_core::models::{Asset, Content, EntityKind, Record, Site, Tag};
use roxy_core::{lookup, Store};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Finds one entity of `kind` by key, then by slug, rendered as JSON.
pub async fn get_entity<S: Store>(
    store: &S,
    kind: EntityKind,
    ident: &str,
) -> Result<serde_json::Value> {
    let json = match kind {
        EntityKind::Site => lookup::<Site>(store, ident).await?.to_json(),
        EntityKind::Content => lookup::<Content>(store, ident).await?.to_json(),
        EntityKind::Asset => lookup::<Asset>(store, ident).await?.to_json(),
        EntityKind::Tag => lookup::<Tag>(store, ident).await?.to_json(),
    };
    Ok(json)
}

pub async fn run_get(config: &Config, kind: EntityKind, ident: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let json = get_entity(&store, kind, ident)
        .await
        .with_context(|| format!("{kind} {ident:?}"))?;
    println!("{}", serde_json::to_string_pretty(&json)?);

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxy_core::store::memory::InMemoryStore;
    use roxy_core::Error;

    #[tokio::test]
    async fn test_get_by_slug_and_key() {
        let store = InMemoryStore::new();
        let site = Site::new("blog", "Blog");
        store.save_site(&site).await.unwrap();

        let by_slug = get_entity(&store, EntityKind::Site, "blog").await.unwrap();
        let by_key = get_entity(&store, EntityKind::Site, &site.key).await.unwrap();
        assert_eq!(by_slug, by_key);
        assert_eq!(by_slug["name"], "Blog");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryStore::new();
        let err = get_entity(&store, EntityKind::Content, "nope").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NotFound { .. })
        ));
    }
}
