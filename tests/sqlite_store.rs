//! SQLite store behaviour, checked against the in-memory store where the two
//! must agree.

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, TimeZone};
use tempfile::TempDir;

use roxy::sqlite_store::SqliteStore;
use roxy::{db, migrate};
use roxy_core::models::{Asset, Content, EntityKind, Record, Site, Tag};
use roxy_core::normalize::TagRegistry;
use roxy_core::store::memory::InMemoryStore;
use roxy_core::{lookup, Criteria, Error, Query, Store, Value};

async fn open_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let pool = db::open(&tmp.path().join("roxy.sqlite")).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    (tmp, SqliteStore::new(pool))
}

/// Saves the same fixture into `store`: three posts with assorted
/// properties and tags.
async fn seed<S: Store>(store: &S) -> Site {
    let site = Site::new("blog", "Blog");
    store.save_site(&site).await.unwrap();

    let rust = store.get_or_create_tag("Rust").await.unwrap();
    let sqlite = store.get_or_create_tag("SQLite").await.unwrap();

    let rows: [(&str, &str, Option<i64>, Vec<Tag>); 4] = [
        ("a.md", "Hello World", Some(9), vec![rust.clone(), sqlite.clone()]),
        ("b.md", "hello again", Some(5), vec![rust.clone()]),
        ("c.md", "Goodbye", None, vec![sqlite]),
        ("d.md", "Other", Some(7), vec![]),
    ];
    for (path, title, rating, tags) in rows {
        let mut content = Content::new(&site.key, path);
        content.title = title.to_string();
        content.slug = roxy_core::models::slugify(title);
        content.tags = tags;
        if let Some(r) = rating {
            content.set("rating", Value::Int(r)).unwrap();
        }
        store.save_content(&content).await.unwrap();
    }
    site
}

fn paths(rows: &[Content]) -> Vec<&str> {
    rows.iter().map(|c| c.path.as_str()).collect()
}

#[tokio::test]
async fn test_property_round_trip_every_kind() {
    let (_tmp, store) = open_store().await;
    let site = Site::new("blog", "Blog");
    store.save_site(&site).await.unwrap();

    let tz = FixedOffset::east_opt(3600).unwrap();
    let when = tz.with_ymd_and_hms(2020, 1, 5, 12, 30, 0).unwrap();
    let date = NaiveDate::from_ymd_opt(2019, 12, 31).unwrap();

    let mut content = Content::new(&site.key, "a.md");
    content.title = "A".into();
    content.slug = "a".into();
    content.publish_time = Some(when);
    content.set("flag", Value::from(true)).unwrap();
    content.set("count", Value::from(42i64)).unwrap();
    content.set("ratio", Value::from(0.25f64)).unwrap();
    content.set("day", Value::from(date)).unwrap();
    content.set("at", Value::from(when)).unwrap();
    content.set("label", Value::from("hi")).unwrap();
    content.set("nothing", Value::Null).unwrap();
    store.save_content(&content).await.unwrap();

    let loaded: Content = lookup(&store, &content.key).await.unwrap();
    assert_eq!(loaded.get("flag"), Some(Value::Bool(true)));
    assert_eq!(loaded.get("count"), Some(Value::Int(42)));
    assert_eq!(loaded.get("ratio"), Some(Value::Float(0.25)));
    assert_eq!(loaded.get("day"), Some(Value::Date(date)));
    assert_eq!(loaded.get("label"), Some(Value::String("hi".into())));
    assert_eq!(loaded.get("nothing"), Some(Value::Null));

    // Same instant, normalized to UTC.
    match loaded.get("at") {
        Some(Value::DateTime(dt)) => assert_eq!(dt, when),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(loaded.publish_time, Some(when));
}

#[tokio::test]
async fn test_save_replaces_properties_and_tags() {
    let (_tmp, store) = open_store().await;
    let site = seed(&store).await;

    let mut content = Query::<Content>::new(&store)
        .filter("path", "a.md")
        .unwrap()
        .one()
        .await
        .unwrap();
    content.properties.remove("rating");
    content.set("rating", Value::from("high")).unwrap();
    content.tags.truncate(1);
    store.save_content(&content).await.unwrap();

    let loaded: Content = lookup(&store, &content.key).await.unwrap();
    assert_eq!(loaded.get("rating"), Some(Value::String("high".into())));
    assert_eq!(loaded.tags.len(), 1);
    assert_eq!(loaded.tags[0].slug, "rust");
    assert_eq!(loaded.site_key, site.key);
}

#[tokio::test]
async fn test_range_tags_and_ordering_match_memory() {
    let (_tmp, sqlite) = open_store().await;
    let memory = InMemoryStore::new();
    seed(&sqlite).await;
    seed(&memory).await;

    async fn run<S: Store>(store: &S) -> Vec<Vec<String>> {
        let queries = [
            Query::<Content>::new(store)
                .filter("rating", Criteria::ops([("gt", 5i64), ("lteq", 10i64)]))
                .unwrap()
                .order_by(&["path"], &[])
                .unwrap(),
            Query::<Content>::new(store)
                .filter("tags", vec!["rust", "sqlite"])
                .unwrap(),
            Query::<Content>::new(store).order_by(&["rating"], &[]).unwrap(),
            Query::<Content>::new(store).order_by(&[], &["rating"]).unwrap(),
            Query::<Content>::new(store)
                .filter(
                    "title",
                    Criteria::ops([
                        ("startswith", Criteria::from("HELLO")),
                        ("insensitive", Criteria::from(true)),
                    ]),
                )
                .unwrap()
                .order_by(&["title"], &[])
                .unwrap(),
            Query::<Content>::new(store)
                .filter("title", Criteria::ops([("endswith", "bye")]))
                .unwrap(),
            Query::<Content>::new(store)
                .filter("title", Criteria::ops([("contains", "o")]))
                .unwrap()
                .order_by(&["title"], &[])
                .unwrap()
                .limit(2)
                .offset(1),
            Query::<Content>::new(store)
                .filter("rating", vec![5i64, 7])
                .unwrap()
                .order_by(&[], &["rating"])
                .unwrap(),
        ];
        let mut out = Vec::new();
        for q in queries {
            let rows = q.all().await.unwrap();
            out.push(paths(&rows).into_iter().map(String::from).collect());
        }
        out
    }

    let from_sqlite = run(&sqlite).await;
    let from_memory = run(&memory).await;
    assert_eq!(from_sqlite, from_memory);

    assert_eq!(from_sqlite[0], vec!["a.md", "d.md"]);
    assert_eq!(from_sqlite[1], vec!["a.md"]);
    assert_eq!(from_sqlite[2], vec!["b.md", "d.md", "a.md", "c.md"]);
    assert_eq!(from_sqlite[3], vec!["c.md", "a.md", "d.md", "b.md"]);
    assert_eq!(from_sqlite[4], vec!["a.md", "b.md"]);
    assert_eq!(from_sqlite[5], vec!["c.md"]);
    assert_eq!(from_sqlite[6], vec!["a.md", "b.md"]);
    assert_eq!(from_sqlite[7], vec!["d.md", "b.md"]);
}

/// Two sites; dates and datetimes stored the way ingest types them at +01:00.
async fn seed_typed<S: Store>(store: &S, tz: FixedOffset) -> Site {
    let blog = Site::new("blog", "Blog");
    let other = Site::new("other", "Other");
    store.save_site(&blog).await.unwrap();
    store.save_site(&other).await.unwrap();

    let at = |y, m, d, h| Some(tz.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap());
    let day = |y, m, d| Some(NaiveDate::from_ymd_opt(y, m, d).unwrap());
    let rows = [
        ("a.md", &blog, at(2020, 1, 5, 0), at(2020, 1, 5, 0), day(2019, 12, 31), Some(true), Value::Int(5)),
        ("b.md", &blog, at(2021, 3, 4, 12), at(2019, 6, 30, 0), day(2020, 6, 1), Some(false), Value::Float(4.5)),
        ("c.md", &blog, None, None, None, None, Value::Int(3)),
        ("d.md", &other, at(2020, 1, 5, 0), at(2020, 1, 5, 0), day(2019, 12, 31), Some(true), Value::Float(9.25)),
    ];
    for (path, site, publish, event, released, draft, score) in rows {
        let mut content = Content::new(&site.key, path);
        content.publish_time = publish;
        if let Some(event) = event {
            content.set("event_date", Value::DateTime(event)).unwrap();
        }
        if let Some(released) = released {
            content.set("released", Value::Date(released)).unwrap();
        }
        if let Some(draft) = draft {
            content.set("draft", Value::Bool(draft)).unwrap();
        }
        content.set("score", score).unwrap();
        store.save_content(&content).await.unwrap();
    }
    blog
}

#[tokio::test]
async fn test_temporal_bool_and_numeric_queries_match_memory() {
    let tz = FixedOffset::east_opt(3600).unwrap();
    let (_tmp, sqlite) = open_store().await;
    let memory = InMemoryStore::new();
    let blog = seed_typed(&sqlite, tz).await;
    let memory_blog = seed_typed(&memory, tz).await;

    async fn run<S: Store>(store: &S, blog: &Site, tz: FixedOffset) -> Vec<Vec<String>> {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let by_path = |name: &str, criteria: Criteria| {
            Query::<Content>::new(store)
                .in_timezone(tz)
                .filter(name, criteria)
                .unwrap()
                .order_by(&["path"], &[])
                .unwrap()
        };
        let queries = [
            by_path("publish_time", Criteria::ops([("on_after", date(2020, 1, 5))])),
            by_path("publish_time", Criteria::from(date(2020, 1, 5))),
            by_path("event_date", Criteria::from(date(2020, 1, 5))),
            by_path("event_date", Criteria::ops([("before", date(2020, 1, 1))])),
            by_path("released", Criteria::ops([("on_before", date(2019, 12, 31))])),
            by_path("draft", Criteria::from(true)),
            by_path("draft", Criteria::from(false)),
            by_path("score", Criteria::ops([("gteq", 4i64)])),
            by_path("score", Criteria::from(vec![Value::Int(3), Value::Float(4.5)])),
            Query::<Content>::new(store)
                .within(blog)
                .order_by(&[], &["score"])
                .unwrap()
                .limit(2),
            Query::<Content>::new(store)
                .within(blog)
                .order_by(&["event_date"], &[])
                .unwrap(),
            Query::<Content>::new(store)
                .within(blog)
                .order_by(&[], &["publish_time"])
                .unwrap(),
        ];
        let mut out = Vec::new();
        for q in queries {
            let rows = q.all().await.unwrap();
            out.push(paths(&rows).into_iter().map(String::from).collect());
        }
        out
    }

    let from_sqlite = run(&sqlite, &blog, tz).await;
    let from_memory = run(&memory, &memory_blog, tz).await;
    assert_eq!(from_sqlite, from_memory);

    let expected: [&[&str]; 12] = [
        &["a.md", "b.md", "d.md"],
        &["a.md", "d.md"],
        &["a.md", "d.md"],
        &["b.md"],
        &["a.md", "d.md"],
        &["a.md", "d.md"],
        &["b.md"],
        &["a.md", "b.md", "d.md"],
        &["b.md", "c.md"],
        &["a.md", "b.md"],
        &["b.md", "a.md", "c.md"],
        &["c.md", "b.md", "a.md"],
    ];
    for (got, want) in from_sqlite.iter().zip(expected) {
        assert_eq!(got, want);
    }
}

#[tokio::test]
async fn test_duplicate_slug_is_rejected() {
    let (_tmp, store) = open_store().await;
    let site = Site::new("blog", "Blog");
    store.save_site(&site).await.unwrap();

    let mut first = Content::new(&site.key, "a.md");
    first.slug = "hello".into();
    store.save_content(&first).await.unwrap();

    let mut second = Content::new(&site.key, "b.md");
    second.slug = "hello".into();
    let err = store.save_content(&second).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateSlug { kind: EntityKind::Content, .. }));

    // Re-saving the owner and saving unslugged rows are fine.
    store.save_content(&first).await.unwrap();
    store.save_content(&Content::new(&site.key, "c.md")).await.unwrap();
    store.save_content(&Content::new(&site.key, "d.md")).await.unwrap();
    let found: Content = lookup(&store, "hello").await.unwrap();
    assert_eq!(found.key, first.key);
}

#[tokio::test]
async fn test_mixed_kind_property_sort() {
    let (_tmp, store) = open_store().await;
    let site = Site::new("blog", "Blog");
    store.save_site(&site).await.unwrap();

    for (path, value) in [
        ("text.md", Value::String("abc".into())),
        ("int.md", Value::Int(3)),
        ("float.md", Value::Float(2.5)),
        ("none.md", Value::Null),
    ] {
        let mut content = Content::new(&site.key, path);
        content.set("mixed", value).unwrap();
        store.save_content(&content).await.unwrap();
    }

    let rows = Query::<Content>::new(&store)
        .order_by(&["mixed"], &[])
        .unwrap()
        .all()
        .await
        .unwrap();
    assert_eq!(paths(&rows), vec!["float.md", "int.md", "text.md", "none.md"]);
}

#[tokio::test]
async fn test_one_and_optional() {
    let (_tmp, store) = open_store().await;
    seed(&store).await;

    let err = Query::<Content>::new(&store)
        .filter("tags", "rust")
        .unwrap()
        .one()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MultipleMatches { .. }));

    let none = Query::<Content>::new(&store)
        .filter("path", "zzz.md")
        .unwrap()
        .optional()
        .await
        .unwrap();
    assert!(none.is_none());

    let err = lookup::<Site>(&store, "missing").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_delete_cascades() {
    let (_tmp, store) = open_store().await;
    let site = seed(&store).await;

    let content = Query::<Content>::new(&store)
        .filter("path", "a.md")
        .unwrap()
        .one()
        .await
        .unwrap();
    assert!(store.delete(EntityKind::Content, &content.key).await.unwrap());
    assert!(!store.delete(EntityKind::Content, &content.key).await.unwrap());

    let (props,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM content_property WHERE owner_key = ?")
            .bind(&content.key)
            .fetch_one(store.pool())
            .await
            .unwrap();
    let (links,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM content_tag WHERE owner_key = ?")
        .bind(&content.key)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!((props, links), (0, 0));

    // Deleting a tag unlinks it everywhere.
    let rust: Tag = lookup(&store, "rust").await.unwrap();
    assert!(store.delete(EntityKind::Tag, &rust.key).await.unwrap());
    let tagged = Query::<Content>::new(&store)
        .filter("tags", "rust")
        .unwrap()
        .all()
        .await
        .unwrap();
    assert!(tagged.is_empty());

    // Deleting the site takes its content with it.
    let mut asset = Asset::new(&site.key, "logo.png");
    asset.slug = "logo".into();
    store.save_asset(&asset).await.unwrap();
    assert!(store.delete(EntityKind::Site, &site.key).await.unwrap());
    assert!(Query::<Content>::new(&store).all().await.unwrap().is_empty());
    assert!(Query::<Asset>::new(&store).all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_site_tags_distinct_by_name() {
    let (_tmp, store) = open_store().await;
    let site = seed(&store).await;

    let tags = store.site_tags(&site.key).await.unwrap();
    let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Rust", "SQLite"]);
}

#[tokio::test]
async fn test_concurrent_tag_creation_yields_one_row() {
    let (_tmp, store) = open_store().await;
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.get_or_create_tag("Concurrency").await.unwrap()
        }));
    }
    let mut keys = Vec::new();
    for handle in handles {
        keys.push(handle.await.unwrap().key);
    }
    keys.dedup();
    assert_eq!(keys.len(), 1);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tag WHERE slug = 'concurrency'")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_duplicate_path_is_rejected() {
    let (_tmp, store) = open_store().await;
    let site = Site::new("blog", "Blog");
    store.save_site(&site).await.unwrap();

    store.save_content(&Content::new(&site.key, "a.md")).await.unwrap();
    let err = store
        .save_content(&Content::new(&site.key, "a.md"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
}

#[tokio::test]
async fn test_within_scopes_to_site() {
    let (_tmp, store) = open_store().await;
    let blog = seed(&store).await;

    let other = Site::new("other", "Other");
    store.save_site(&other).await.unwrap();
    store.save_content(&Content::new(&other.key, "a.md")).await.unwrap();

    let rows = Query::<Content>::new(&store).within(&blog).all().await.unwrap();
    assert_eq!(rows.len(), 4);
    let rows = Query::<Content>::new(&store).within(&other).all().await.unwrap();
    assert_eq!(paths(&rows), vec!["a.md"]);
}
