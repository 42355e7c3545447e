//! Entity model: Sites, Contents, Assets and Tags.
//!
//! Each kind declares its native fields in a static [`FieldDef`] table. Any
//! other attribute name on a Site, Content or Asset lives in its
//! [`PropertyStore`]. A name that matches a native field always resolves to
//! the native field.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::properties::PropertyStore;
use crate::value::{Value, ValueKind};

/// The four entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Site,
    Content,
    Asset,
    Tag,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Site => "site",
            EntityKind::Content => "content",
            EntityKind::Asset => "asset",
            EntityKind::Tag => "tag",
        }
    }

    /// Native field table, in declaration order.
    pub fn fields(&self) -> &'static [FieldDef] {
        match self {
            EntityKind::Site => SITE_FIELDS,
            EntityKind::Content => CONTENT_FIELDS,
            EntityKind::Asset => ASSET_FIELDS,
            EntityKind::Tag => TAG_FIELDS,
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields().iter().find(|f| f.name == name)
    }

    pub fn has_properties(&self) -> bool {
        !matches!(self, EntityKind::Tag)
    }

    pub fn has_tags(&self) -> bool {
        matches!(self, EntityKind::Content | EntityKind::Asset)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage kind of a native field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Identity or foreign key; equality and membership only.
    Key,
    Text,
    DateTime,
    Integer,
}

impl FieldKind {
    pub fn value_kind(&self) -> ValueKind {
        match self {
            FieldKind::Key | FieldKind::Text => ValueKind::String,
            FieldKind::DateTime => ValueKind::DateTime,
            FieldKind::Integer => ValueKind::Int,
        }
    }
}

/// One row of a native field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Assignable from document metadata.
    pub writable: bool,
    pub nullable: bool,
}

const fn field(name: &'static str, kind: FieldKind, writable: bool, nullable: bool) -> FieldDef {
    FieldDef {
        name,
        kind,
        writable,
        nullable,
    }
}

static SITE_FIELDS: &[FieldDef] = &[
    field("key", FieldKind::Key, false, false),
    field("slug", FieldKind::Text, true, false),
    field("name", FieldKind::Text, true, false),
    field("url", FieldKind::Text, true, true),
];

static CONTENT_FIELDS: &[FieldDef] = &[
    field("key", FieldKind::Key, false, false),
    field("site_key", FieldKind::Key, false, false),
    field("slug", FieldKind::Text, true, false),
    field("title", FieldKind::Text, true, false),
    field("body", FieldKind::Text, true, false),
    field("publish_time", FieldKind::DateTime, true, true),
    field("path", FieldKind::Text, false, false),
];

static ASSET_FIELDS: &[FieldDef] = &[
    field("key", FieldKind::Key, false, false),
    field("site_key", FieldKind::Key, false, false),
    field("slug", FieldKind::Text, true, false),
    field("type", FieldKind::Text, true, true),
    field("body", FieldKind::Text, true, true),
    field("path", FieldKind::Text, false, false),
    field("checksum", FieldKind::Integer, false, false),
];

static TAG_FIELDS: &[FieldDef] = &[
    field("key", FieldKind::Key, false, false),
    field("slug", FieldKind::Text, false, false),
    field("name", FieldKind::Text, false, false),
];

/// Lower-cases `name` and collapses runs of non-alphanumerics into `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn new_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub key: String,
    pub slug: String,
    pub name: String,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self {
            key: new_key(),
            slug: slugify(name),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub key: String,
    pub slug: String,
    pub name: String,
    pub url: Option<String>,
    pub properties: PropertyStore,
}

impl Site {
    pub fn new(slug: &str, name: &str) -> Self {
        Self {
            key: new_key(),
            slug: slug.to_string(),
            name: name.to_string(),
            url: None,
            properties: PropertyStore::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub key: String,
    pub site_key: String,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub publish_time: Option<DateTime<FixedOffset>>,
    /// Path relative to the content root; unique per site.
    pub path: String,
    pub tags: Vec<Tag>,
    pub properties: PropertyStore,
}

impl Content {
    pub fn new(site_key: &str, path: &str) -> Self {
        Self {
            key: new_key(),
            site_key: site_key.to_string(),
            slug: String::new(),
            title: String::new(),
            body: String::new(),
            publish_time: None,
            path: path.to_string(),
            tags: Vec::new(),
            properties: PropertyStore::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub key: String,
    pub site_key: String,
    pub slug: String,
    /// Major MIME type, e.g. `image`.
    pub asset_type: Option<String>,
    pub body: Option<String>,
    /// Path relative to the asset root; unique per site.
    pub path: String,
    pub checksum: i64,
    pub tags: Vec<Tag>,
    pub properties: PropertyStore,
}

impl Asset {
    pub fn new(site_key: &str, path: &str) -> Self {
        Self {
            key: new_key(),
            site_key: site_key.to_string(),
            slug: String::new(),
            asset_type: None,
            body: None,
            path: path.to_string(),
            checksum: 0,
            tags: Vec::new(),
            properties: PropertyStore::new(),
        }
    }
}

/// Any stored entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Site(Site),
    Content(Content),
    Asset(Asset),
    Tag(Tag),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Site(_) => EntityKind::Site,
            Entity::Content(_) => EntityKind::Content,
            Entity::Asset(_) => EntityKind::Asset,
            Entity::Tag(_) => EntityKind::Tag,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Entity::Site(r) => r.key(),
            Entity::Content(r) => r.key(),
            Entity::Asset(r) => r.key(),
            Entity::Tag(r) => r.key(),
        }
    }

    /// Native field value or property value.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            Entity::Site(r) => r.get(name),
            Entity::Content(r) => r.get(name),
            Entity::Asset(r) => r.get(name),
            Entity::Tag(r) => r.get(name),
        }
    }

    pub fn tags(&self) -> &[Tag] {
        match self {
            Entity::Site(r) => r.tags(),
            Entity::Content(r) => r.tags(),
            Entity::Asset(r) => r.tags(),
            Entity::Tag(r) => r.tags(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Entity::Site(r) => r.to_json(),
            Entity::Content(r) => r.to_json(),
            Entity::Asset(r) => r.to_json(),
            Entity::Tag(r) => r.to_json(),
        }
    }
}

/// Uniform attribute access over the entity structs.
pub trait Record: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn key(&self) -> &str;

    /// Value of a native field; `None` when `name` is not native.
    fn field(&self, name: &str) -> Option<Value>;

    /// Assigns a writable native field. Callers go through [`Record::set`].
    fn assign(&mut self, field: &FieldDef, value: Value) -> Result<()>;

    fn properties(&self) -> Option<&PropertyStore> {
        None
    }

    fn properties_mut(&mut self) -> Option<&mut PropertyStore> {
        None
    }

    fn tags(&self) -> &[Tag] {
        &[]
    }

    fn set_tags(&mut self, _tags: Vec<Tag>) -> Result<()> {
        Err(Error::UnknownAttribute {
            kind: Self::KIND,
            attribute: "tags".to_string(),
        })
    }

    fn from_entity(entity: Entity) -> Option<Self>;

    fn into_entity(self) -> Entity;

    /// Native field first, then property.
    fn get(&self, name: &str) -> Option<Value> {
        self.field(name)
            .or_else(|| self.properties().and_then(|p| p.get(name).cloned()))
    }

    /// Assigns a native field (type-checked) or a property.
    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        if let Some(def) = Self::KIND.field(name) {
            if !def.writable {
                return Err(Error::ReadOnlyField {
                    kind: Self::KIND,
                    field: name.to_string(),
                });
            }
            return self.assign(def, value);
        }
        match self.properties_mut() {
            Some(props) => {
                props.set(name, value);
                Ok(())
            }
            None => Err(Error::UnknownAttribute {
                kind: Self::KIND,
                attribute: name.to_string(),
            }),
        }
    }

    /// Native fields, then tag names and properties where the kind has them.
    fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for def in Self::KIND.fields() {
            let value = self.field(def.name).unwrap_or(Value::Null);
            map.insert(
                def.name.to_string(),
                serde_json::to_value(value).unwrap_or_default(),
            );
        }
        if Self::KIND.has_tags() {
            let names = self
                .tags()
                .iter()
                .map(|t| serde_json::Value::String(t.name.clone()))
                .collect();
            map.insert("tags".to_string(), serde_json::Value::Array(names));
        }
        if let Some(props) = self.properties() {
            map.insert(
                "properties".to_string(),
                serde_json::to_value(props).unwrap_or_default(),
            );
        }
        serde_json::Value::Object(map)
    }
}

/// Kinds that belong to a site and can be scoped with
/// [`Query::within`](crate::query::Query::within).
pub trait SiteScoped: Record {
    fn site_key(&self) -> &str;
}

fn required_text(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(Error::mismatch(ValueKind::String, other.kind())),
    }
}

fn optional_text(value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        other => required_text(other).map(Some),
    }
}

fn optional_datetime(value: Value) -> Result<Option<DateTime<FixedOffset>>> {
    match value {
        Value::Null => Ok(None),
        Value::DateTime(dt) => Ok(Some(dt)),
        other => Err(Error::mismatch(ValueKind::DateTime, other.kind())),
    }
}

fn read_only<R: Record>(def: &FieldDef) -> Error {
    Error::ReadOnlyField {
        kind: R::KIND,
        field: def.name.to_string(),
    }
}

impl Record for Site {
    const KIND: EntityKind = EntityKind::Site;

    fn key(&self) -> &str {
        &self.key
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "key" => Some(self.key.as_str().into()),
            "slug" => Some(self.slug.as_str().into()),
            "name" => Some(self.name.as_str().into()),
            "url" => Some(self.url.clone().into()),
            _ => None,
        }
    }

    fn assign(&mut self, def: &FieldDef, value: Value) -> Result<()> {
        match def.name {
            "slug" => self.slug = required_text(value)?,
            "name" => self.name = required_text(value)?,
            "url" => self.url = optional_text(value)?,
            _ => return Err(read_only::<Self>(def)),
        }
        Ok(())
    }

    fn properties(&self) -> Option<&PropertyStore> {
        Some(&self.properties)
    }

    fn properties_mut(&mut self) -> Option<&mut PropertyStore> {
        Some(&mut self.properties)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Site(s) => Some(s),
            _ => None,
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Site(self)
    }
}

impl Record for Content {
    const KIND: EntityKind = EntityKind::Content;

    fn key(&self) -> &str {
        &self.key
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "key" => Some(self.key.as_str().into()),
            "site_key" => Some(self.site_key.as_str().into()),
            "slug" => Some(self.slug.as_str().into()),
            "title" => Some(self.title.as_str().into()),
            "body" => Some(self.body.as_str().into()),
            "publish_time" => Some(self.publish_time.into()),
            "path" => Some(self.path.as_str().into()),
            _ => None,
        }
    }

    fn assign(&mut self, def: &FieldDef, value: Value) -> Result<()> {
        match def.name {
            "slug" => self.slug = required_text(value)?,
            "title" => self.title = required_text(value)?,
            "body" => self.body = required_text(value)?,
            "publish_time" => self.publish_time = optional_datetime(value)?,
            _ => return Err(read_only::<Self>(def)),
        }
        Ok(())
    }

    fn properties(&self) -> Option<&PropertyStore> {
        Some(&self.properties)
    }

    fn properties_mut(&mut self) -> Option<&mut PropertyStore> {
        Some(&mut self.properties)
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn set_tags(&mut self, tags: Vec<Tag>) -> Result<()> {
        self.tags = tags;
        Ok(())
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Content(c) => Some(c),
            _ => None,
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Content(self)
    }
}

impl SiteScoped for Content {
    fn site_key(&self) -> &str {
        &self.site_key
    }
}

impl Record for Asset {
    const KIND: EntityKind = EntityKind::Asset;

    fn key(&self) -> &str {
        &self.key
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "key" => Some(self.key.as_str().into()),
            "site_key" => Some(self.site_key.as_str().into()),
            "slug" => Some(self.slug.as_str().into()),
            "type" => Some(self.asset_type.clone().into()),
            "body" => Some(self.body.clone().into()),
            "path" => Some(self.path.as_str().into()),
            "checksum" => Some(Value::Int(self.checksum)),
            _ => None,
        }
    }

    fn assign(&mut self, def: &FieldDef, value: Value) -> Result<()> {
        match def.name {
            "slug" => self.slug = required_text(value)?,
            "type" => self.asset_type = optional_text(value)?,
            "body" => self.body = optional_text(value)?,
            _ => return Err(read_only::<Self>(def)),
        }
        Ok(())
    }

    fn properties(&self) -> Option<&PropertyStore> {
        Some(&self.properties)
    }

    fn properties_mut(&mut self) -> Option<&mut PropertyStore> {
        Some(&mut self.properties)
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn set_tags(&mut self, tags: Vec<Tag>) -> Result<()> {
        self.tags = tags;
        Ok(())
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Asset(a) => Some(a),
            _ => None,
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Asset(self)
    }
}

impl SiteScoped for Asset {
    fn site_key(&self) -> &str {
        &self.site_key
    }
}

impl Record for Tag {
    const KIND: EntityKind = EntityKind::Tag;

    fn key(&self) -> &str {
        &self.key
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "key" => Some(self.key.as_str().into()),
            "slug" => Some(self.slug.as_str().into()),
            "name" => Some(self.name.as_str().into()),
            _ => None,
        }
    }

    fn assign(&mut self, def: &FieldDef, _value: Value) -> Result<()> {
        Err(read_only::<Self>(def))
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Tag(t) => Some(t),
            _ => None,
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Tag(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust  &  SQL  "), "rust-sql");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify("Ça va"), "ça-va");
    }

    #[test]
    fn test_native_field_wins_over_property() {
        let mut c = Content::new("site", "a.md");
        c.set("title", "Hello".into()).unwrap();
        assert_eq!(c.title, "Hello");
        assert!(!c.properties.contains("title"));

        c.set("rating", Value::Int(4)).unwrap();
        assert_eq!(c.get("rating"), Some(Value::Int(4)));
        assert_eq!(c.get("missing"), None);
    }

    #[test]
    fn test_native_type_checked() {
        let mut c = Content::new("site", "a.md");
        let err = c.set("publish_time", Value::from("tomorrow")).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: ValueKind::DateTime,
                found: ValueKind::String
            }
        ));
        let err = c.set("title", Value::Null).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        let when = Value::from(chrono::Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        c.set("publish_time", when.clone()).unwrap();
        assert_eq!(c.get("publish_time"), Some(when));
        c.set("publish_time", Value::Null).unwrap();
        assert_eq!(c.publish_time, None);
    }

    #[test]
    fn test_read_only_fields() {
        let mut a = Asset::new("site", "img.png");
        for name in ["key", "site_key", "path", "checksum"] {
            let err = a.set(name, Value::from("x")).unwrap_err();
            assert!(matches!(err, Error::ReadOnlyField { .. }), "{name}");
        }
        let mut t = Tag::new("Rust");
        assert!(matches!(
            t.set("name", "Go".into()).unwrap_err(),
            Error::ReadOnlyField { .. }
        ));
        assert!(matches!(
            t.set("color", "red".into()).unwrap_err(),
            Error::UnknownAttribute { .. }
        ));
    }

    #[test]
    fn test_site_has_no_tags() {
        let mut s = Site::new("blog", "Blog");
        assert!(s.set_tags(vec![Tag::new("x")]).is_err());
        assert!(s.tags().is_empty());
    }

    #[test]
    fn test_to_json_shape() {
        let mut a = Asset::new("site", "img/cat.png");
        a.slug = "cat".into();
        a.asset_type = Some("image".into());
        a.checksum = 42;
        a.tags = vec![Tag::new("Cats")];
        a.properties.set("width", 640i64);

        let json = a.to_json();
        assert_eq!(json["type"], "image");
        assert_eq!(json["checksum"], 42);
        assert_eq!(json["body"], serde_json::Value::Null);
        assert_eq!(json["tags"], serde_json::json!(["Cats"]));
        assert_eq!(json["properties"]["width"], 640);

        let tag = Tag::new("Cats").to_json();
        assert_eq!(tag["slug"], "cats");
        assert!(tag.get("properties").is_none());
        assert!(tag.get("tags").is_none());
    }

    #[test]
    fn test_entity_round_trip() {
        let c = Content::new("site", "a.md");
        let entity = c.clone().into_entity();
        assert_eq!(entity.kind(), EntityKind::Content);
        assert_eq!(entity.key(), c.key);
        assert_eq!(Content::from_entity(entity.clone()), Some(c));
        assert_eq!(Asset::from_entity(entity), None);
    }

    #[test]
    fn test_field_tables() {
        assert_eq!(EntityKind::Asset.field("type").unwrap().kind, FieldKind::Text);
        assert!(EntityKind::Content.field("tags").is_none());
        assert!(EntityKind::Site.has_properties());
        assert!(!EntityKind::Tag.has_properties());
        assert!(EntityKind::Asset.has_tags());
        assert!(!EntityKind::Site.has_tags());
    }
}
