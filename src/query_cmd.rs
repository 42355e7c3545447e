//! The `roxy query` and `roxy tags` commands.
//!
//! Filters arrive as `NAME=EXPR`. An `EXPR` starting with `{` or `[` is JSON
//! criteria (operator map or membership list, strings coerced); anything
//! else is a single value. Native text and key fields take the text as is,
//! every other attribute gets it coerced. A bare date against a datetime
//! attribute means midnight in the site's timezone.

use anyhow::{bail, Context, Result};
use chrono::FixedOffset;

use roxy_core::coerce::coerce;
use roxy_core::models::{Asset, Content, EntityKind, FieldKind, Record, Site, Tag};
use roxy_core::{lookup, Criteria, Query, Store};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    pub filters: Vec<String>,
    pub asc: Vec<String>,
    pub desc: Vec<String>,
    pub limit: Option<u64>,
    pub offset: u64,
    pub one: bool,
}

/// Parses one `NAME=EXPR` filter for entities of `kind`.
pub fn parse_filter(kind: EntityKind, arg: &str) -> Result<(String, Criteria)> {
    let Some((name, expr)) = arg.split_once('=') else {
        bail!("filter {arg:?} is not NAME=EXPR");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("filter {arg:?} has an empty name");
    }

    let trimmed = expr.trim_start();
    let criteria = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let json: serde_json::Value = serde_json::from_str(trimmed)
            .with_context(|| format!("filter `{name}`: invalid JSON criteria"))?;
        Criteria::from_json(name, &json)?
    } else {
        match kind.field(name).map(|def| def.kind) {
            Some(FieldKind::Text | FieldKind::Key) => Criteria::from(expr),
            _ => Criteria::Scalar(coerce(expr)),
        }
    };
    Ok((name.to_string(), criteria))
}

fn configure<'s, R: Record>(
    query: Query<'s, R>,
    tz: FixedOffset,
    args: &QueryArgs,
) -> Result<Query<'s, R>> {
    let mut query = query.in_timezone(tz);
    for arg in &args.filters {
        let (name, criteria) = parse_filter(R::KIND, arg)?;
        query = query.filter(&name, criteria)?;
    }
    if !args.asc.is_empty() || !args.desc.is_empty() {
        let asc: Vec<&str> = args.asc.iter().map(String::as_str).collect();
        let desc: Vec<&str> = args.desc.iter().map(String::as_str).collect();
        query = query.order_by(&asc, &desc)?;
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    Ok(query.offset(args.offset))
}

async fn render<R: Record>(query: Query<'_, R>, one: bool) -> Result<serde_json::Value> {
    if one {
        return Ok(query.one().await?.to_json());
    }
    let rows = query.all().await?;
    Ok(serde_json::Value::Array(
        rows.iter().map(Record::to_json).collect(),
    ))
}

/// Runs a query for `kind`, scoping content and assets to `site`.
pub async fn query_entities<S: Store>(
    store: &S,
    site: &Site,
    tz: FixedOffset,
    kind: EntityKind,
    args: &QueryArgs,
) -> Result<serde_json::Value> {
    match kind {
        EntityKind::Content => {
            let query = Query::<Content>::new(store).within(site);
            render(configure(query, tz, args)?, args.one).await
        }
        EntityKind::Asset => {
            let query = Query::<Asset>::new(store).within(site);
            render(configure(query, tz, args)?, args.one).await
        }
        EntityKind::Site => render(configure(Query::<Site>::new(store), tz, args)?, args.one).await,
        EntityKind::Tag => render(configure(Query::<Tag>::new(store), tz, args)?, args.one).await,
    }
}

async fn open_site(config: &Config) -> Result<(SqliteStore, Site)> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let site = lookup::<Site>(&store, &config.site.slug)
        .await
        .with_context(|| {
            format!(
                "site {:?} is not registered; run `roxy init` first",
                config.site.slug
            )
        })?;
    Ok((store, site))
}

pub async fn run_query(config: &Config, kind: EntityKind, args: &QueryArgs) -> Result<()> {
    let tz = config.site.offset()?;
    let (store, site) = open_site(config).await?;
    let json = query_entities(&store, &site, tz, kind, args).await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    store.pool().close().await;
    Ok(())
}

pub async fn run_tags(config: &Config) -> Result<()> {
    let (store, site) = open_site(config).await?;
    let tags = store.site_tags(&site.key).await?;

    if tags.is_empty() {
        println!("No tags.");
    }
    for tag in &tags {
        println!("{}\t{}", tag.slug, tag.name);
    }

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use roxy_core::header::parse_document;
    use roxy_core::normalize::normalize;
    use roxy_core::store::memory::InMemoryStore;
    use roxy_core::Value;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn paths(json: &serde_json::Value) -> Vec<String> {
        json.as_array()
            .unwrap()
            .iter()
            .map(|row| row["path"].as_str().unwrap().to_string())
            .collect()
    }

    /// Ingests `doc` the way sync does: parse, normalize in `tz`, apply.
    async fn ingest(store: &InMemoryStore, site: &Site, path: &str, doc: &str, tz: &FixedOffset) {
        let (pairs, body) = parse_document(doc).unwrap();
        let meta = normalize(pairs, EntityKind::Content, tz, store).await.unwrap();
        let mut content = Content::new(&site.key, path);
        content.body = body.to_string();
        meta.apply(&mut content).unwrap();
        store.save_content(&content).await.unwrap();
    }

    #[test]
    fn test_parse_filter_forms() {
        let (name, criteria) = parse_filter(EntityKind::Content, "rating=4").unwrap();
        assert_eq!(name, "rating");
        assert_eq!(criteria, Criteria::Scalar(Value::Int(4)));

        // Native text fields are not coerced.
        let (_, criteria) = parse_filter(EntityKind::Content, "title=2020").unwrap();
        assert_eq!(criteria, Criteria::Scalar(Value::String("2020".into())));

        let (_, criteria) =
            parse_filter(EntityKind::Content, r#"rating={"gt": 5, "lteq": "10"}"#).unwrap();
        assert_eq!(
            criteria,
            Criteria::Ops(vec![
                ("gt".into(), Criteria::Scalar(Value::Int(5))),
                ("lteq".into(), Criteria::Scalar(Value::Int(10))),
            ])
        );

        let (_, criteria) = parse_filter(EntityKind::Content, r#"tags=["a","b"]"#).unwrap();
        assert_eq!(
            criteria,
            Criteria::List(vec![Value::String("a".into()), Value::String("b".into())])
        );

        assert!(parse_filter(EntityKind::Content, "rating").is_err());
        assert!(parse_filter(EntityKind::Content, "=4").is_err());
        assert!(parse_filter(EntityKind::Content, "rating={oops").is_err());
    }

    #[tokio::test]
    async fn test_query_entities_renders_json() {
        let store = InMemoryStore::new();
        let site = Site::new("blog", "Blog");
        store.save_site(&site).await.unwrap();
        for (path, rating) in [("a.md", 3i64), ("b.md", 7), ("c.md", 9)] {
            let mut content = Content::new(&site.key, path);
            content.title = path.to_string();
            content.set("rating", Value::Int(rating)).unwrap();
            store.save_content(&content).await.unwrap();
        }

        let args = QueryArgs {
            filters: vec![r#"rating={"gt": 5}"#.into()],
            desc: vec!["rating".into()],
            ..Default::default()
        };
        let json = query_entities(&store, &site, utc(), EntityKind::Content, &args)
            .await
            .unwrap();
        assert_eq!(paths(&json), vec!["c.md", "b.md"]);

        let args = QueryArgs {
            filters: vec!["path=a.md".into()],
            one: true,
            ..Default::default()
        };
        let json = query_entities(&store, &site, utc(), EntityKind::Content, &args)
            .await
            .unwrap();
        assert_eq!(json["properties"]["rating"], 3);
    }

    async fn filter_paths(store: &InMemoryStore, site: &Site, tz: FixedOffset, filter: &str) -> Vec<String> {
        let args = QueryArgs {
            filters: vec![filter.into()],
            asc: vec!["path".into()],
            ..Default::default()
        };
        paths(&query_entities(store, site, tz, EntityKind::Content, &args).await.unwrap())
    }

    #[tokio::test]
    async fn test_date_filters_match_ingested_dates() {
        let store = InMemoryStore::new();
        let site = Site::new("blog", "Blog");
        store.save_site(&site).await.unwrap();
        let tz = FixedOffset::east_opt(3600).unwrap();

        ingest(&store, &site, "a.md", "event_date: 2020-01-05\npublish_date: 2021-03-04\n\nA", &tz).await;
        ingest(&store, &site, "b.md", "event_date: 2019-06-30\n\nB", &tz).await;

        assert_eq!(filter_paths(&store, &site, tz, "event_date=2020-01-05").await, vec!["a.md"]);
        assert_eq!(
            filter_paths(&store, &site, tz, r#"event_date={"on_after": "2020-01-01"}"#).await,
            vec!["a.md"]
        );
        assert_eq!(
            filter_paths(&store, &site, tz, r#"event_date=["2019-06-30", "2020-01-05"]"#).await,
            vec!["a.md", "b.md"]
        );
        assert_eq!(filter_paths(&store, &site, tz, "publish_time=2021-03-04").await, vec!["a.md"]);

        // The same date read as UTC midnight is an hour off.
        assert!(filter_paths(&store, &site, utc(), "publish_time=2021-03-04").await.is_empty());
    }

    #[tokio::test]
    async fn test_numeric_filters_span_ints_and_floats() {
        let store = InMemoryStore::new();
        let site = Site::new("blog", "Blog");
        store.save_site(&site).await.unwrap();
        for (path, rating) in [("a.md", "3"), ("b.md", "5"), ("c.md", "4.5")] {
            let mut content = Content::new(&site.key, path);
            content.set("rating", coerce(rating)).unwrap();
            store.save_content(&content).await.unwrap();
        }

        assert_eq!(
            filter_paths(&store, &site, utc(), r#"rating={"gteq": 4}"#).await,
            vec!["b.md", "c.md"]
        );
        assert_eq!(filter_paths(&store, &site, utc(), "rating=4.5").await, vec!["c.md"]);
        assert_eq!(filter_paths(&store, &site, utc(), "rating=[3, 4.5]").await, vec!["a.md", "c.md"]);
    }

    #[test]
    fn test_bare_date_filter_is_a_date() {
        let (_, criteria) = parse_filter(EntityKind::Content, "event_date=2020-01-05").unwrap();
        let day = NaiveDate::from_ymd_opt(2020, 1, 5).unwrap();
        assert_eq!(criteria, Criteria::Scalar(Value::Date(day)));
    }
}
