//! Ingestion pipeline orchestration.
//!
//! Coordinates the sync flow: discovery → header parsing → normalization →
//! storage. Documents are processed concurrently, bounded by
//! `ingest.concurrency`. A file that fails is reported and skipped; the sync
//! as a whole fails once every file has been attempted.

use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use roxy_core::header;
use roxy_core::models::{slugify, Asset, Content, EntityKind, Site};
use roxy_core::normalize::{normalize, Metadata};
use roxy_core::{lookup, Error, Query, Store};

use crate::config::{Config, SiteConfig};
use crate::connector_fs::{self, SourceFile};
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Slug candidates tried (`slug`, `slug-2`, ...) before a save gives up.
const SLUG_ATTEMPTS: usize = 100;

/// Outcome of one sync run.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub contents: usize,
    pub assets: usize,
    pub pruned: usize,
    /// `(relative path, error)` for every file that could not be ingested.
    pub failures: Vec<(String, String)>,
}

pub async fn run_sync(config: &Config, dry_run: bool, prune: bool) -> Result<()> {
    let content_files = connector_fs::scan_content(config)?;
    let asset_files = connector_fs::scan_assets(config)?;

    if dry_run {
        println!("sync {} (dry-run)", config.site.slug);
        println!("  content files: {}", content_files.len());
        println!("  asset files: {}", asset_files.len());
        let mut malformed = 0usize;
        for file in &content_files {
            let text = std::fs::read_to_string(&file.path)
                .with_context(|| format!("Failed to read {}", file.path.display()))?;
            if let Err(e) = header::parse_document(&text) {
                println!("  {}: {}", file.relative, e);
                malformed += 1;
            }
        }
        println!("  malformed headers: {}", malformed);
        return Ok(());
    }

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let site = ensure_site(store.as_ref(), &config.site).await?;
    let tz = config.site.offset()?;
    let report = sync_site(
        store.clone(),
        &site,
        tz,
        content_files,
        asset_files,
        config.ingest.concurrency,
        prune,
    )
    .await?;

    println!("sync {}", site.slug);
    println!("  content upserted: {}", report.contents);
    println!("  assets upserted: {}", report.assets);
    if prune {
        println!("  pruned: {}", report.pruned);
    }
    for (path, error) in &report.failures {
        println!("  failed {}: {}", path, error);
    }

    store.pool().close().await;

    if !report.failures.is_empty() {
        bail!("{} file(s) failed to ingest", report.failures.len());
    }
    println!("ok");
    Ok(())
}

/// Returns the configured site, creating it or refreshing its name and url.
pub async fn ensure_site<S: Store>(store: &S, config: &SiteConfig) -> Result<Site> {
    let site = match lookup::<Site>(store, &config.slug).await {
        Ok(mut site) => {
            if site.name == config.name && site.url == config.url {
                return Ok(site);
            }
            site.name = config.name.clone();
            site.url = config.url.clone();
            site
        }
        Err(Error::NotFound { .. }) => {
            let mut site = Site::new(&config.slug, &config.name);
            site.url = config.url.clone();
            tracing::info!(slug = %site.slug, key = %site.key, "registering site");
            site
        }
        Err(e) => return Err(e.into()),
    };
    store.save_site(&site).await?;
    Ok(site)
}

/// Ingests every file for `site`, optionally pruning entities whose files
/// are gone.
pub async fn sync_site<S: Store + 'static>(
    store: Arc<S>,
    site: &Site,
    tz: FixedOffset,
    content_files: Vec<SourceFile>,
    asset_files: Vec<SourceFile>,
    concurrency: usize,
    prune: bool,
) -> Result<SyncReport> {
    let content_paths: HashSet<String> = content_files.iter().map(|f| f.relative.clone()).collect();
    let asset_paths: HashSet<String> = asset_files.iter().map(|f| f.relative.clone()).collect();

    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    let jobs = content_files
        .into_iter()
        .map(|f| (EntityKind::Content, f))
        .chain(asset_files.into_iter().map(|f| (EntityKind::Asset, f)));
    for (kind, file) in jobs {
        let store = store.clone();
        let site = site.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            let relative = file.relative.clone();
            let result = match permits.acquire_owned().await {
                Ok(_permit) => match kind {
                    EntityKind::Asset => ingest_asset(store.as_ref(), &site, tz, &file).await,
                    _ => ingest_content(store.as_ref(), &site, tz, &file).await,
                },
                Err(e) => Err(e.into()),
            };
            (kind, relative, result)
        });
    }

    let mut report = SyncReport::default();
    while let Some(joined) = tasks.join_next().await {
        let (kind, relative, result) = joined?;
        match result {
            Ok(key) => {
                tracing::debug!(%kind, path = %relative, %key, "ingested");
                match kind {
                    EntityKind::Asset => report.assets += 1,
                    _ => report.contents += 1,
                }
            }
            Err(e) => {
                tracing::warn!(%kind, path = %relative, error = %format!("{e:#}"), "ingest failed");
                report.failures.push((relative, format!("{e:#}")));
            }
        }
    }
    report.failures.sort();

    if prune {
        report.pruned = prune_missing(store.as_ref(), site, &content_paths, &asset_paths).await?;
    }

    tracing::info!(
        site = %site.slug,
        contents = report.contents,
        assets = report.assets,
        failures = report.failures.len(),
        "sync finished"
    );
    Ok(report)
}

async fn prune_missing<S: Store>(
    store: &S,
    site: &Site,
    content_paths: &HashSet<String>,
    asset_paths: &HashSet<String>,
) -> Result<usize> {
    let mut pruned = 0;

    let contents = Query::<Content>::new(store).within(site).all().await?;
    for content in contents {
        if !content_paths.contains(&content.path) {
            tracing::info!(path = %content.path, "pruning content");
            store.delete(EntityKind::Content, &content.key).await?;
            pruned += 1;
        }
    }

    let assets = Query::<Asset>::new(store).within(site).all().await?;
    for asset in assets {
        if !asset_paths.contains(&asset.path) {
            tracing::info!(path = %asset.path, "pruning asset");
            store.delete(EntityKind::Asset, &asset.key).await?;
            pruned += 1;
        }
    }

    Ok(pruned)
}

/// Parses, normalizes and saves one content document. Returns its key.
///
/// A document already stored under the same path keeps its key; everything
/// else is rebuilt from the file.
pub async fn ingest_content<S: Store>(
    store: &S,
    site: &Site,
    tz: FixedOffset,
    file: &SourceFile,
) -> Result<String> {
    let text = tokio::fs::read_to_string(&file.path)
        .await
        .with_context(|| format!("Failed to read {}", file.path.display()))?;
    let (pairs, body) = header::parse_document(&text)?;
    let metadata = normalize(pairs, EntityKind::Content, &tz, store).await?;

    let mut content = Content::new(&site.key, &file.relative);
    if let Some(existing) = Query::<Content>::new(store)
        .within(site)
        .filter("path", file.relative.as_str())?
        .optional()
        .await?
    {
        content.key = existing.key;
    }
    content.body = body.to_string();
    metadata.apply(&mut content)?;

    if content.slug.is_empty() {
        content.slug = if content.title.is_empty() {
            slugify(&file.stem())
        } else {
            slugify(&content.title)
        };
    }

    let slug = save_with_free_slug(EntityKind::Content, &content.slug, |slug| {
        let mut content = content.clone();
        content.slug = slug;
        async move { store.save_content(&content).await }
    })
    .await?;
    if slug != content.slug {
        tracing::info!(path = %file.relative, %slug, "slug already taken, saved with a suffix");
    }
    Ok(content.key)
}

/// Hashes, types and saves one asset, reading metadata from its
/// `<stem>.metadata` sidecar when present. Returns its key.
pub async fn ingest_asset<S: Store>(
    store: &S,
    site: &Site,
    tz: FixedOffset,
    file: &SourceFile,
) -> Result<String> {
    let bytes = tokio::fs::read(&file.path)
        .await
        .with_context(|| format!("Failed to read {}", file.path.display()))?;

    let sidecar = file.sidecar();
    let (metadata, body) = if tokio::fs::try_exists(&sidecar).await? {
        let text = tokio::fs::read_to_string(&sidecar)
            .await
            .with_context(|| format!("Failed to read {}", sidecar.display()))?;
        let (pairs, body) = header::parse_document(&text)?;
        let metadata = normalize(pairs, EntityKind::Asset, &tz, store).await?;
        (metadata, body.to_string())
    } else {
        (Metadata::default(), String::new())
    };

    let mut asset = Asset::new(&site.key, &file.relative);
    if let Some(existing) = Query::<Asset>::new(store)
        .within(site)
        .filter("path", file.relative.as_str())?
        .optional()
        .await?
    {
        asset.key = existing.key;
    }
    asset.checksum = checksum(&bytes);
    asset.asset_type = file
        .extension()
        .and_then(|ext| major_type(&ext))
        .map(str::to_string);
    if !body.trim().is_empty() {
        asset.body = Some(body);
    }
    metadata.apply(&mut asset)?;

    if asset.slug.is_empty() {
        asset.slug = slugify(&file.stem());
    }

    let slug = save_with_free_slug(EntityKind::Asset, &asset.slug, |slug| {
        let mut asset = asset.clone();
        asset.slug = slug;
        async move { store.save_asset(&asset).await }
    })
    .await?;
    if slug != asset.slug {
        tracing::info!(path = %file.relative, %slug, "slug already taken, saved with a suffix");
    }
    Ok(asset.key)
}

/// Saves under `base`, moving to `base-2`, `base-3`, ... while another
/// entity of `kind` holds the slug. Returns the slug that was saved.
async fn save_with_free_slug<F, Fut>(kind: EntityKind, base: &str, mut save: F) -> Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = roxy_core::Result<()>>,
{
    let candidates =
        std::iter::once(base.to_string()).chain((2..=SLUG_ATTEMPTS).map(|n| format!("{base}-{n}")));
    for slug in candidates {
        match save(slug.clone()).await {
            Ok(()) => return Ok(slug),
            Err(Error::DuplicateSlug { .. }) => {
                tracing::debug!(%kind, %slug, "slug taken, trying the next suffix");
            }
            Err(e) => return Err(e.into()),
        }
    }
    bail!("no free slug for {kind} {base:?} after {SLUG_ATTEMPTS} attempts")
}

/// First four bytes of the SHA-256 digest, big-endian.
pub fn checksum(bytes: &[u8]) -> i64 {
    let digest = Sha256::digest(bytes);
    i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

/// Major MIME type for a lower-cased file extension.
pub fn major_type(extension: &str) -> Option<&'static str> {
    let major = match extension {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp" | "ico" | "avif" | "tif"
        | "tiff" => "image",
        "txt" | "md" | "markdown" | "html" | "htm" | "css" | "csv" | "xml" | "ics" => "text",
        "mp3" | "wav" | "ogg" | "oga" | "flac" | "m4a" | "aac" => "audio",
        "mp4" | "webm" | "mov" | "avi" | "mkv" | "m4v" => "video",
        "woff" | "woff2" | "ttf" | "otf" => "font",
        "pdf" | "zip" | "gz" | "tar" | "json" | "js" | "wasm" | "epub" => "application",
        _ => return None,
    };
    Some(major)
}
