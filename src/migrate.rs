use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Entity tables that own a property table, named `<owner>_property`.
pub const PROPERTY_OWNERS: [&str; 3] = ["site", "content", "asset"];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS site (
            key TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            url TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content (
            key TEXT PRIMARY KEY,
            site_key TEXT NOT NULL,
            slug TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            publish_time TEXT,
            path TEXT NOT NULL,
            UNIQUE(site_key, path),
            FOREIGN KEY (site_key) REFERENCES site(key) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS asset (
            key TEXT PRIMARY KEY,
            site_key TEXT NOT NULL,
            slug TEXT NOT NULL,
            type TEXT,
            body TEXT,
            path TEXT NOT NULL,
            checksum INTEGER NOT NULL,
            UNIQUE(site_key, path),
            FOREIGN KEY (site_key) REFERENCES site(key) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tag (
            key TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Slugs are unique per kind; unslugged rows keep the empty string.
    for owner in ["content", "asset"] {
        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_{owner}_slug ON {owner}(slug) WHERE slug <> ''"
        ))
        .execute(pool)
        .await?;
    }

    // Tag links keep the order tags were listed in the document header.
    for owner in ["content", "asset"] {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {owner}_tag (
                owner_key TEXT NOT NULL,
                tag_key TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (owner_key, tag_key),
                FOREIGN KEY (owner_key) REFERENCES {owner}(key) ON DELETE CASCADE,
                FOREIGN KEY (tag_key) REFERENCES tag(key) ON DELETE CASCADE
            )
            "#
        ))
        .execute(pool)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{owner}_tag_tag_key ON {owner}_tag(tag_key)"
        ))
        .execute(pool)
        .await?;
    }

    // One typed slot per value kind; at most one may be populated.
    for owner in PROPERTY_OWNERS {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {owner}_property (
                owner_key TEXT NOT NULL,
                name TEXT NOT NULL,
                bool_value INTEGER CHECK (bool_value IN (0, 1)),
                int_value INTEGER,
                float_value REAL,
                date_value TEXT,
                datetime_value TEXT,
                str_value TEXT,
                PRIMARY KEY (owner_key, name),
                FOREIGN KEY (owner_key) REFERENCES {owner}(key) ON DELETE CASCADE,
                CHECK (
                    (bool_value IS NOT NULL) + (int_value IS NOT NULL) +
                    (float_value IS NOT NULL) + (date_value IS NOT NULL) +
                    (datetime_value IS NOT NULL) + (str_value IS NOT NULL) <= 1
                )
            )
            "#
        ))
        .execute(pool)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{owner}_property_name ON {owner}_property(name)"
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_site_key ON content(site_key)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_asset_site_key ON asset(site_key)")
        .execute(pool)
        .await?;

    Ok(())
}
