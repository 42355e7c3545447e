//! # Roxy CLI (`roxy`)
//!
//! Drives ingestion and queries against the SQLite store.
//!
//! ```bash
//! roxy --config ./roxy.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `roxy init` | Create the schema and register the configured site |
//! | `roxy sync` | Ingest content documents and assets |
//! | `roxy query <kind>` | Filter, sort and page entities, printed as JSON |
//! | `roxy get <kind> <ident>` | Print one entity by key or slug |
//! | `roxy tags` | List the tags used by the site's content |
//!
//! ## Examples
//!
//! ```bash
//! roxy sync --prune
//! roxy query content --filter 'tags=["rust","sqlite"]' --desc publish_time --limit 5
//! roxy query content --filter 'rating={"gteq": 4}' --filter 'title={"contains": "guide", "insensitive": true}'
//! roxy get content hello-world
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG` (default
//! `roxy=info`).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roxy::query_cmd::QueryArgs;
use roxy::sqlite_store::SqliteStore;
use roxy::{config, db, get, ingest, migrate, query_cmd};
use roxy_core::EntityKind;

/// Roxy: a schema-on-read content store.
#[derive(Parser)]
#[command(
    name = "roxy",
    about = "Ingest documents with free-form metadata and query them with typed filters",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./roxy.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and register the configured site.
    ///
    /// Idempotent: running it again only refreshes the site's name and url.
    Init,

    /// Ingest content documents and assets.
    Sync {
        /// Count files and check headers without writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Delete content and assets whose files no longer exist.
        #[arg(long)]
        prune: bool,
    },

    /// Query entities and print them as JSON.
    Query {
        kind: KindArg,

        /// `NAME=EXPR`. EXPR starting with `{` or `[` is JSON criteria.
        ///
        /// Numeric properties match ints and floats alike. A bare date
        /// against a datetime means midnight in the site's timezone.
        #[arg(long = "filter", value_name = "NAME=EXPR")]
        filters: Vec<String>,

        /// Sort ascending by this attribute (repeatable).
        #[arg(long, value_name = "NAME")]
        asc: Vec<String>,

        /// Sort descending by this attribute (repeatable, after `--asc`).
        #[arg(long, value_name = "NAME")]
        desc: Vec<String>,

        #[arg(long)]
        limit: Option<u64>,

        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Require exactly one match and print it as an object.
        #[arg(long)]
        one: bool,
    },

    /// Print one entity by key or slug.
    Get { kind: KindArg, ident: String },

    /// List the tags used by the site's content.
    Tags,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Site,
    Content,
    Asset,
    Tag,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Site => EntityKind::Site,
            KindArg::Content => EntityKind::Content,
            KindArg::Asset => EntityKind::Asset,
            KindArg::Tag => EntityKind::Tag,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roxy=info,roxy_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            let store = SqliteStore::new(db::connect(&cfg).await?);
            let site = ingest::ensure_site(&store, &cfg.site).await?;
            store.pool().close().await;
            println!("Database initialized successfully.");
            println!("  site: {} ({})", site.slug, site.key);
        }
        Commands::Sync { dry_run, prune } => {
            ingest::run_sync(&cfg, dry_run, prune).await?;
        }
        Commands::Query {
            kind,
            filters,
            asc,
            desc,
            limit,
            offset,
            one,
        } => {
            let args = QueryArgs {
                filters,
                asc,
                desc,
                limit,
                offset,
                one,
            };
            query_cmd::run_query(&cfg, kind.into(), &args).await?;
        }
        Commands::Get { kind, ident } => {
            get::run_get(&cfg, kind.into(), &ident).await?;
        }
        Commands::Tags => {
            query_cmd::run_tags(&cfg).await?;
        }
    }

    Ok(())
}
