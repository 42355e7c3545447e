//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Plans run through the
//! in-process evaluator, so results match the SQLite backend row for row.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{slugify, Asset, Content, Entity, EntityKind, Site, Tag};
use crate::normalize::TagRegistry;
use crate::query::{eval, QueryPlan};

use super::Store;

/// In-memory store.
pub struct InMemoryStore {
    sites: RwLock<HashMap<String, Site>>,
    contents: RwLock<HashMap<String, Content>>,
    assets: RwLock<HashMap<String, Asset>>,
    /// Keyed by slug.
    tags: RwLock<HashMap<String, Tag>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sites: RwLock::new(HashMap::new()),
            contents: RwLock::new(HashMap::new()),
            assets: RwLock::new(HashMap::new()),
            tags: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    anyhow!("in-memory store lock poisoned").into()
}

fn duplicate_path(kind: EntityKind, path: &str) -> Error {
    anyhow!("{kind} with path {path:?} already exists in this site").into()
}

/// Slugs are unique per kind; the empty slug is exempt.
fn check_slug<'a>(
    kind: EntityKind,
    key: &str,
    slug: &str,
    mut others: impl Iterator<Item = (&'a String, &'a String)>,
) -> Result<()> {
    if !slug.is_empty() && others.any(|(k, s)| k != key && s == slug) {
        return Err(Error::DuplicateSlug {
            kind,
            slug: slug.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl TagRegistry for InMemoryStore {
    async fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(anyhow!("tag name {name:?} has an empty slug").into());
        }
        let mut tags = self.tags.write().map_err(poisoned)?;
        let tag = tags.entry(slug).or_insert_with(|| Tag::new(name));
        Ok(tag.clone())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_site(&self, site: &Site) -> Result<()> {
        let mut sites = self.sites.write().map_err(poisoned)?;
        check_slug(
            EntityKind::Site,
            &site.key,
            &site.slug,
            sites.values().map(|s| (&s.key, &s.slug)),
        )?;
        sites.insert(site.key.clone(), site.clone());
        Ok(())
    }

    async fn save_content(&self, content: &Content) -> Result<()> {
        let mut contents = self.contents.write().map_err(poisoned)?;
        let clash = contents.values().any(|c| {
            c.key != content.key && c.site_key == content.site_key && c.path == content.path
        });
        if clash {
            return Err(duplicate_path(EntityKind::Content, &content.path));
        }
        check_slug(
            EntityKind::Content,
            &content.key,
            &content.slug,
            contents.values().map(|c| (&c.key, &c.slug)),
        )?;
        contents.insert(content.key.clone(), content.clone());
        Ok(())
    }

    async fn save_asset(&self, asset: &Asset) -> Result<()> {
        let mut assets = self.assets.write().map_err(poisoned)?;
        let clash = assets
            .values()
            .any(|a| a.key != asset.key && a.site_key == asset.site_key && a.path == asset.path);
        if clash {
            return Err(duplicate_path(EntityKind::Asset, &asset.path));
        }
        check_slug(
            EntityKind::Asset,
            &asset.key,
            &asset.slug,
            assets.values().map(|a| (&a.key, &a.slug)),
        )?;
        assets.insert(asset.key.clone(), asset.clone());
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<bool> {
        match kind {
            EntityKind::Site => {
                let existed = self.sites.write().map_err(poisoned)?.remove(key).is_some();
                self.contents
                    .write()
                    .map_err(poisoned)?
                    .retain(|_, c| c.site_key != key);
                self.assets
                    .write()
                    .map_err(poisoned)?
                    .retain(|_, a| a.site_key != key);
                Ok(existed)
            }
            EntityKind::Content => Ok(self
                .contents
                .write()
                .map_err(poisoned)?
                .remove(key)
                .is_some()),
            EntityKind::Asset => Ok(self
                .assets
                .write()
                .map_err(poisoned)?
                .remove(key)
                .is_some()),
            EntityKind::Tag => {
                let mut tags = self.tags.write().map_err(poisoned)?;
                let before = tags.len();
                tags.retain(|_, t| t.key != key);
                let existed = tags.len() != before;
                drop(tags);
                for c in self.contents.write().map_err(poisoned)?.values_mut() {
                    c.tags.retain(|t| t.key != key);
                }
                for a in self.assets.write().map_err(poisoned)?.values_mut() {
                    a.tags.retain(|t| t.key != key);
                }
                Ok(existed)
            }
        }
    }

    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<Entity>> {
        let rows: Vec<Entity> = match plan.kind {
            EntityKind::Site => {
                let sites = self.sites.read().map_err(poisoned)?;
                sites.values().cloned().map(Entity::Site).collect()
            }
            EntityKind::Content => {
                let contents = self.contents.read().map_err(poisoned)?;
                contents.values().cloned().map(Entity::Content).collect()
            }
            EntityKind::Asset => {
                let assets = self.assets.read().map_err(poisoned)?;
                assets.values().cloned().map(Entity::Asset).collect()
            }
            EntityKind::Tag => {
                let tags = self.tags.read().map_err(poisoned)?;
                tags.values().cloned().map(Entity::Tag).collect()
            }
        };
        Ok(eval::execute(plan, rows))
    }

    async fn site_tags(&self, site_key: &str) -> Result<Vec<Tag>> {
        let contents = self.contents.read().map_err(poisoned)?;
        let mut tags: HashMap<String, Tag> = HashMap::new();
        for c in contents.values().filter(|c| c.site_key == site_key) {
            for t in &c.tags {
                tags.entry(t.key.clone()).or_insert_with(|| t.clone());
            }
        }
        let mut tags: Vec<Tag> = tags.into_values().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.key.cmp(&b.key)));
        Ok(tags)
    }
}
