//! SQLite implementation of [`Store`].
//!
//! Wraps a [`SqlitePool`] and implements every storage operation using the
//! schema from [`crate::migrate`]. Query plans are translated to SQL by
//! [`crate::query_sql`]; only the matching keys are selected, then each
//! entity is loaded with its tags and properties.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};

use roxy_core::models::{slugify, Asset, Content, Entity, EntityKind, Site, Tag};
use roxy_core::normalize::TagRegistry;
use roxy_core::properties::{PropertySlots, PropertyStore};
use roxy_core::query::QueryPlan;
use roxy_core::store::Store;
use roxy_core::value::{format_datetime, parse_stored_datetime};
use roxy_core::{Error, Result};

use crate::query_sql::{self, Bind};

/// Attempts at inserting a tag before giving up on a slug that keeps
/// colliding without becoming visible.
const TAG_INSERT_ATTEMPTS: usize = 3;

/// SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn tag_by_slug(&self, slug: &str) -> anyhow::Result<Option<Tag>> {
        let row = sqlx::query("SELECT key, slug, name FROM tag WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| tag_from_row(&r)))
    }

    async fn load_tags(&self, owner: &str, key: &str) -> anyhow::Result<Vec<Tag>> {
        let rows = sqlx::query(&format!(
            "SELECT t.key, t.slug, t.name FROM {owner}_tag lt \
             JOIN tag t ON t.key = lt.tag_key \
             WHERE lt.owner_key = ? ORDER BY lt.position"
        ))
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(tag_from_row).collect())
    }

    async fn load_properties(&self, owner: &str, key: &str) -> anyhow::Result<PropertyStore> {
        let rows = sqlx::query(&format!(
            "SELECT name, bool_value, int_value, float_value, date_value, datetime_value, str_value \
             FROM {owner}_property WHERE owner_key = ?"
        ))
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        let mut properties = PropertyStore::new();
        for row in rows {
            let name: String = row.try_get("name")?;
            let slots = PropertySlots {
                bool_value: row.try_get("bool_value")?,
                int_value: row.try_get("int_value")?,
                float_value: row.try_get("float_value")?,
                date_value: row.try_get("date_value")?,
                datetime_value: row.try_get("datetime_value")?,
                str_value: row.try_get("str_value")?,
            };
            let value = slots.into_value(&name)?;
            properties.set(name, value);
        }
        Ok(properties)
    }

    async fn load_site(&self, key: &str) -> anyhow::Result<Option<Site>> {
        let Some(row) = sqlx::query("SELECT key, slug, name, url FROM site WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(Site {
            key: row.try_get("key")?,
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            url: row.try_get("url")?,
            properties: self.load_properties("site", key).await?,
        }))
    }

    async fn load_content(&self, key: &str) -> anyhow::Result<Option<Content>> {
        let Some(row) = sqlx::query(
            "SELECT key, site_key, slug, title, body, publish_time, path FROM content WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let publish_time = match row.try_get::<Option<String>, _>("publish_time")? {
            Some(text) => Some(
                parse_stored_datetime(&text)
                    .with_context(|| format!("content {key}: bad stored publish_time {text:?}"))?,
            ),
            None => None,
        };

        Ok(Some(Content {
            key: row.try_get("key")?,
            site_key: row.try_get("site_key")?,
            slug: row.try_get("slug")?,
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            publish_time,
            path: row.try_get("path")?,
            tags: self.load_tags("content", key).await?,
            properties: self.load_properties("content", key).await?,
        }))
    }

    async fn load_asset(&self, key: &str) -> anyhow::Result<Option<Asset>> {
        let Some(row) = sqlx::query(
            "SELECT key, site_key, slug, type, body, path, checksum FROM asset WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        Ok(Some(Asset {
            key: row.try_get("key")?,
            site_key: row.try_get("site_key")?,
            slug: row.try_get("slug")?,
            asset_type: row.try_get("type")?,
            body: row.try_get("body")?,
            path: row.try_get("path")?,
            checksum: row.try_get("checksum")?,
            tags: self.load_tags("asset", key).await?,
            properties: self.load_properties("asset", key).await?,
        }))
    }

    async fn load_tag(&self, key: &str) -> anyhow::Result<Option<Tag>> {
        let row = sqlx::query("SELECT key, slug, name FROM tag WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| tag_from_row(&r)))
    }

    async fn load(&self, kind: EntityKind, key: &str) -> anyhow::Result<Option<Entity>> {
        Ok(match kind {
            EntityKind::Site => self.load_site(key).await?.map(Entity::Site),
            EntityKind::Content => self.load_content(key).await?.map(Entity::Content),
            EntityKind::Asset => self.load_asset(key).await?.map(Entity::Asset),
            EntityKind::Tag => self.load_tag(key).await?.map(Entity::Tag),
        })
    }

    async fn write_site(&self, site: &Site) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO site (key, slug, name, url)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                slug = excluded.slug,
                name = excluded.name,
                url = excluded.url
            "#,
        )
        .bind(&site.key)
        .bind(&site.slug)
        .bind(&site.name)
        .bind(&site.url)
        .execute(&mut *tx)
        .await?;

        replace_properties(&mut tx, "site", &site.key, &site.properties).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn write_content(&self, content: &Content) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO content (key, site_key, slug, title, body, publish_time, path)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                site_key = excluded.site_key,
                slug = excluded.slug,
                title = excluded.title,
                body = excluded.body,
                publish_time = excluded.publish_time,
                path = excluded.path
            "#,
        )
        .bind(&content.key)
        .bind(&content.site_key)
        .bind(&content.slug)
        .bind(&content.title)
        .bind(&content.body)
        .bind(content.publish_time.as_ref().map(format_datetime))
        .bind(&content.path)
        .execute(&mut *tx)
        .await?;

        replace_tags(&mut tx, "content", &content.key, &content.tags).await?;
        replace_properties(&mut tx, "content", &content.key, &content.properties).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn write_asset(&self, asset: &Asset) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO asset (key, site_key, slug, type, body, path, checksum)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                site_key = excluded.site_key,
                slug = excluded.slug,
                type = excluded.type,
                body = excluded.body,
                path = excluded.path,
                checksum = excluded.checksum
            "#,
        )
        .bind(&asset.key)
        .bind(&asset.site_key)
        .bind(&asset.slug)
        .bind(&asset.asset_type)
        .bind(&asset.body)
        .bind(&asset.path)
        .bind(asset.checksum)
        .execute(&mut *tx)
        .await?;

        replace_tags(&mut tx, "asset", &asset.key, &asset.tags).await?;
        replace_properties(&mut tx, "asset", &asset.key, &asset.properties).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn select_keys(&self, plan: &QueryPlan) -> anyhow::Result<Vec<String>> {
        let statement = query_sql::build(plan);
        tracing::debug!(sql = %statement.sql, binds = statement.binds.len(), "query plan");

        let mut query = sqlx::query(&statement.sql);
        for bind in statement.binds {
            query = match bind {
                Bind::Null => query.bind(None::<String>),
                Bind::Int(i) => query.bind(i),
                Bind::Real(f) => query.bind(f),
                Bind::Text(s) => query.bind(s),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("key").map_err(Into::into))
            .collect()
    }
}

fn tag_from_row(row: &SqliteRow) -> Tag {
    Tag {
        key: row.get("key"),
        slug: row.get("slug"),
        name: row.get("name"),
    }
}

async fn replace_tags(
    tx: &mut Transaction<'_, Sqlite>,
    owner: &str,
    key: &str,
    tags: &[Tag],
) -> anyhow::Result<()> {
    sqlx::query(&format!("DELETE FROM {owner}_tag WHERE owner_key = ?"))
        .bind(key)
        .execute(&mut **tx)
        .await?;

    for (position, tag) in tags.iter().enumerate() {
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {owner}_tag (owner_key, tag_key, position) VALUES (?, ?, ?)"
        ))
        .bind(key)
        .bind(&tag.key)
        .bind(position as i64)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("linking tag {:?} to {owner} {key}", tag.slug))?;
    }
    Ok(())
}

async fn replace_properties(
    tx: &mut Transaction<'_, Sqlite>,
    owner: &str,
    key: &str,
    properties: &PropertyStore,
) -> anyhow::Result<()> {
    sqlx::query(&format!("DELETE FROM {owner}_property WHERE owner_key = ?"))
        .bind(key)
        .execute(&mut **tx)
        .await?;

    for (name, value) in properties.items() {
        let slots = PropertySlots::from(value);
        sqlx::query(&format!(
            r#"
            INSERT INTO {owner}_property
                (owner_key, name, bool_value, int_value, float_value, date_value, datetime_value, str_value)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#
        ))
        .bind(key)
        .bind(name)
        .bind(slots.bool_value)
        .bind(slots.int_value)
        .bind(slots.float_value)
        .bind(slots.date_value)
        .bind(slots.datetime_value)
        .bind(slots.str_value)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Turns a unique violation on `<kind>.slug` into [`Error::DuplicateSlug`].
fn save_error(err: anyhow::Error, kind: EntityKind, slug: &str) -> Error {
    let column = format!("{}.slug", kind.as_str());
    let slug_taken = err
        .downcast_ref::<sqlx::Error>()
        .and_then(sqlx::Error::as_database_error)
        .is_some_and(|db| db.is_unique_violation() && db.message().contains(&column));
    if slug_taken {
        Error::DuplicateSlug {
            kind,
            slug: slug.to_string(),
        }
    } else {
        Error::Backend(err)
    }
}

#[async_trait]
impl TagRegistry for SqliteStore {
    async fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(anyhow::anyhow!("tag name {name:?} has an empty slug").into());
        }

        for attempt in 1..=TAG_INSERT_ATTEMPTS {
            if let Some(tag) = self.tag_by_slug(&slug).await? {
                return Ok(tag);
            }

            let tag = Tag::new(name);
            let inserted = sqlx::query("INSERT INTO tag (key, slug, name) VALUES (?, ?, ?)")
                .bind(&tag.key)
                .bind(&tag.slug)
                .bind(&tag.name)
                .execute(&self.pool)
                .await;

            match inserted {
                Ok(_) => return Ok(tag),
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    let err = Error::DuplicateTag { slug: slug.clone() };
                    tracing::debug!(%err, attempt, "tag created concurrently, re-selecting");
                }
                Err(e) => return Err(anyhow::Error::from(e).into()),
            }
        }

        Err(Error::DuplicateTag { slug })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_site(&self, site: &Site) -> Result<()> {
        self.write_site(site)
            .await
            .map_err(|e| save_error(e, EntityKind::Site, &site.slug))
    }

    async fn save_content(&self, content: &Content) -> Result<()> {
        self.write_content(content)
            .await
            .map_err(|e| save_error(e, EntityKind::Content, &content.slug))
    }

    async fn save_asset(&self, asset: &Asset) -> Result<()> {
        self.write_asset(asset)
            .await
            .map_err(|e| save_error(e, EntityKind::Asset, &asset.slug))
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE key = ?", kind.as_str()))
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<Entity>> {
        let keys = self.select_keys(plan).await?;
        let mut entities = Vec::with_capacity(keys.len());
        for key in keys {
            // A concurrent delete between the two statements drops the row.
            if let Some(entity) = self.load(plan.kind, &key).await? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn site_tags(&self, site_key: &str) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT t.key, t.slug, t.name
            FROM tag t
            JOIN content_tag lt ON lt.tag_key = t.key
            JOIN content c ON c.key = lt.owner_key
            WHERE c.site_key = ?
            ORDER BY t.name, t.key
            "#,
        )
        .bind(site_key)
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(rows.iter().map(tag_from_row).collect())
    }
}
