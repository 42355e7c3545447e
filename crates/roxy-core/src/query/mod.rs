//! Fluent, lazy queries over stored entities.
//!
//! A [`Query`] only accumulates a [`QueryPlan`]; nothing touches the store
//! until a terminal ([`all`](Query::all), [`one`](Query::one),
//! [`optional`](Query::optional)) runs. Attribute names and criteria are
//! resolved eagerly, so mistakes surface from [`filter`](Query::filter) and
//! [`order_by`](Query::order_by) rather than at execution.
//!
//! ```rust,ignore
//! let posts: Vec<Content> = Query::new(&store)
//!     .within(&site)
//!     .filter("tags", vec!["rust"])?
//!     .filter("rating", Criteria::ops([("gteq", 4i64)]))?
//!     .order_by(&[], &["publish_time"])?
//!     .limit(10)
//!     .all()
//!     .await?;
//! ```

pub mod criteria;
pub mod eval;
pub mod plan;

use std::marker::PhantomData;

use anyhow::anyhow;
use chrono::{FixedOffset, Offset, Utc};

use crate::error::{Error, Result};
use crate::models::{EntityKind, Record, Site, SiteScoped};
use crate::store::Store;

pub use criteria::Criteria;
pub use plan::{Attribute, CmpOp, Condition, Filter, Predicate, QueryPlan, SortOrder, TextOp};

/// Resolves `name` to a native field or a property of `kind`.
pub fn resolve(kind: EntityKind, name: &str) -> Result<Attribute> {
    if let Some(def) = kind.field(name) {
        return Ok(Attribute::Native(def));
    }
    if kind.has_properties() {
        return Ok(Attribute::Property(name.to_string()));
    }
    Err(Error::UnknownAttribute {
        kind,
        attribute: name.to_string(),
    })
}

/// A lazily executed query for records of type `R`.
pub struct Query<'s, R: Record> {
    store: &'s dyn Store,
    plan: QueryPlan,
    tz: FixedOffset,
    _record: PhantomData<fn() -> R>,
}

impl<'s, R: Record> Query<'s, R> {
    pub fn new(store: &'s dyn Store) -> Self {
        Self {
            store,
            plan: QueryPlan::new(R::KIND),
            tz: Utc.fix(),
            _record: PhantomData,
        }
    }

    /// Timezone whose midnight a bare date means against datetime
    /// attributes. UTC unless set; applies to later [`filter`](Query::filter)
    /// calls.
    pub fn in_timezone(mut self, tz: FixedOffset) -> Self {
        self.tz = tz;
        self
    }

    /// Adds a filter. Successive filters are combined with AND.
    pub fn filter(mut self, name: &str, criteria: impl Into<Criteria>) -> Result<Self> {
        let criteria = criteria.into();
        let filter = if name == "tags" && R::KIND.has_tags() {
            Filter::Tags(criteria::compile_tags(criteria)?)
        } else {
            Filter::Attribute(criteria::compile(resolve(R::KIND, name)?, criteria, &self.tz)?)
        };
        self.plan.filters.push(filter);
        Ok(self)
    }

    /// Replaces the ordering: `asc` names first, then `desc` names.
    pub fn order_by(mut self, asc: &[&str], desc: &[&str]) -> Result<Self> {
        let mut order = Vec::with_capacity(asc.len() + desc.len());
        for (names, descending) in [(asc, false), (desc, true)] {
            for name in names {
                if asc.contains(name) && desc.contains(name) {
                    return Err(Error::ambiguous(name, "ordered both ascending and descending"));
                }
                if *name == "tags" && R::KIND.has_tags() {
                    return Err(Error::ambiguous(name, "cannot order by tags"));
                }
                order.push(SortOrder {
                    attribute: resolve(R::KIND, name)?,
                    descending,
                });
            }
        }
        self.plan.order = order;
        Ok(self)
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.plan.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.plan.offset = n;
        self
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    async fn run(&self, plan: &QueryPlan) -> Result<Vec<R>> {
        self.store
            .fetch(plan)
            .await?
            .into_iter()
            .map(|entity| {
                let kind = entity.kind();
                R::from_entity(entity).ok_or_else(|| {
                    Error::from(anyhow!("store returned a {kind} for a {} query", R::KIND))
                })
            })
            .collect()
    }

    pub async fn all(&self) -> Result<Vec<R>> {
        self.run(&self.plan).await
    }

    /// Exactly one match, else [`Error::NotFound`] or [`Error::MultipleMatches`].
    pub async fn one(&self) -> Result<R> {
        self.optional().await?.ok_or(Error::NotFound { kind: R::KIND })
    }

    /// Zero or one match; more than one is [`Error::MultipleMatches`].
    pub async fn optional(&self) -> Result<Option<R>> {
        let mut plan = self.plan.clone();
        plan.limit = Some(plan.limit.map_or(2, |l| l.min(2)));
        let mut rows = self.run(&plan).await?;
        if rows.len() > 1 {
            return Err(Error::MultipleMatches { kind: R::KIND });
        }
        Ok(rows.pop())
    }
}

impl<'s, R: SiteScoped> Query<'s, R> {
    /// Restricts the query to one site's entities.
    pub fn within(mut self, site: &Site) -> Self {
        self.plan.site_key = Some(site.key.clone());
        self
    }
}

/// Finds one record by key, falling back to slug.
pub async fn lookup<R: Record>(store: &dyn Store, ident: &str) -> Result<R> {
    if let Some(found) = Query::<R>::new(store).filter("key", ident)?.optional().await? {
        return Ok(found);
    }
    Query::<R>::new(store).filter("slug", ident)?.one().await
}
