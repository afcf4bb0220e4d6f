use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::time::Instant;

use serde::Serialize;

use crate::database::collection::{Collection, Document, FindQuery};
use crate::database::manager::DatabaseError;

use super::policy::QueryPolicy;
use super::query_order::QueryOrder;
use super::query_where::QueryWhere;
use super::raw::RawQuery;
use super::types::{DropReason, DroppedParam, PaginationMeta, Projection, QuerySpec};

/// Turns one request's raw query into a whitelisted, paginated read.
///
/// Each step consumes and returns the builder, so a request owns exactly one
/// `QuerySpec` and nothing is shared between requests:
///
/// ```ignore
/// let builder = QueryBuilder::new(collection, &raw, &policy)
///     .filter()
///     .sort()
///     .limit_fields()
///     .paginate();
/// let records = builder.build().await?;
/// let total = builder.count_documents().await?;
/// let meta = builder.pagination_meta(total);
/// ```
pub struct QueryBuilder<'a> {
    collection: &'a dyn Collection,
    query: &'a RawQuery,
    policy: &'a QueryPolicy,
    spec: QuerySpec,
    dropped: Vec<DroppedParam>,
    log_drops: bool,
    slow_query_threshold_ms: Option<u64>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(collection: &'a dyn Collection, query: &'a RawQuery, policy: &'a QueryPolicy) -> Self {
        Self {
            collection,
            query,
            policy,
            spec: QuerySpec::new(policy.default_page_size),
            dropped: vec![],
            log_drops: false,
            slow_query_threshold_ms: None,
        }
    }

    /// Logs every dropped parameter at debug level as it is recorded.
    pub fn log_drops(mut self, enabled: bool) -> Self {
        self.log_drops = enabled;
        self
    }

    /// Warns when a find runs longer than `ms`.
    pub fn slow_query_threshold_ms(mut self, ms: u64) -> Self {
        self.slow_query_threshold_ms = Some(ms);
        self
    }

    /// Adds a predicate for every whitelisted filter parameter. Calling it
    /// again appends, it never replaces earlier predicates.
    pub fn filter(mut self) -> Self {
        let query = self.query;
        for (key, value) in query.filter_entries() {
            for raw in value.values() {
                match QueryWhere::evaluate(key, raw, self.policy) {
                    Ok(predicate) => self.spec.predicates.push(predicate),
                    Err(reason) => self.record_drop(key.to_string(), reason),
                }
            }
        }
        self
    }

    /// Applies `sort=field:dir,...`, or the policy default when the parameter is absent or blank.
    pub fn sort(mut self) -> Self {
        let query = self.query;
        match query.first("sort").filter(|s| !s.trim().is_empty()) {
            Some(sort) => {
                let (fields, dropped) = QueryOrder::parse(sort, self.policy);
                self.spec.sort = fields;
                for d in dropped {
                    self.record_drop(d.key, d.reason);
                }
            }
            None => self.spec.sort = self.policy.default_sort.clone(),
        }
        self
    }

    /// Applies `select=` (or `fields=`). An empty whitelisted selection means all fields.
    pub fn limit_fields(mut self) -> Self {
        let query = self.query;
        let param = ["select", "fields"]
            .iter()
            .find_map(|key| query.first(key).filter(|v| !v.trim().is_empty()));

        let Some(param) = param else {
            self.spec.projection = Projection::All;
            return self;
        };

        let mut selected: Vec<String> = Vec::new();
        for field in param.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            if !self.policy.allows_field(field) {
                self.record_drop(format!("select={}", field), DropReason::ProjectionFieldNotAllowed);
                continue;
            }
            if !selected.iter().any(|s| s == field) {
                selected.push(field.to_string());
            }
        }

        self.spec.projection = if selected.is_empty() {
            Projection::All
        } else {
            Projection::Fields(selected)
        };
        self
    }

    /// Reads `page` (floor 1) and `limit` (policy default, clamped to the policy max).
    pub fn paginate(mut self) -> Self {
        let page = parse_int_prefix(self.query.first("page")).unwrap_or(1).max(1) as u64;
        let limit = parse_int_prefix(self.query.first("limit"))
            .filter(|n| *n > 0)
            .map(|n| n as u64)
            .unwrap_or(self.policy.default_page_size);

        let page_size = if limit > self.policy.max_page_size {
            tracing::debug!(
                "Limit {} exceeds max {} for '{}', capping to max",
                limit,
                self.policy.max_page_size,
                self.policy.entity
            );
            self.policy.max_page_size
        } else {
            limit
        };

        self.spec.page = page;
        self.spec.page_size = page_size;
        self.spec.skip = (page - 1).saturating_mul(page_size);
        self
    }

    /// The lazily executed read. Nothing touches storage until it is awaited.
    pub fn build(&self) -> PreparedQuery<'a> {
        let find = FindQuery::new(self.spec.predicates.clone())
            .sort(self.spec.sort.clone())
            .select(self.spec.projection.clone())
            .skip(self.spec.skip)
            .limit(self.spec.page_size);
        PreparedQuery {
            collection: self.collection,
            find,
            slow_query_threshold_ms: self.slow_query_threshold_ms,
        }
    }

    /// Counts documents matching the filter only; sort, projection and window are ignored.
    pub async fn count_documents(&self) -> Result<u64, DatabaseError> {
        self.collection.count_documents(&self.spec.predicates).await
    }

    pub fn pagination_meta(&self, total: u64) -> PaginationMeta {
        PaginationMeta::new(self.spec.page, self.spec.page_size, total)
    }

    /// Runs the data read and the count concurrently.
    pub async fn fetch_page(&self) -> Result<Page, DatabaseError> {
        let (data, total) = futures::try_join!(self.build().execute(), self.count_documents())?;
        Ok(Page { data, pagination: self.pagination_meta(total) })
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn dropped(&self) -> &[DroppedParam] {
        &self.dropped
    }

    pub fn into_parts(self) -> (QuerySpec, Vec<DroppedParam>) {
        (self.spec, self.dropped)
    }

    fn record_drop(&mut self, key: String, reason: DropReason) {
        if self.log_drops {
            tracing::debug!(entity = %self.policy.entity, key = %key, reason = %reason, "dropped query parameter");
        }
        self.dropped.push(DroppedParam { key, reason });
    }
}

/// A built read bound to its collection. Await it (or call `execute`) to run it.
pub struct PreparedQuery<'a> {
    collection: &'a dyn Collection,
    find: FindQuery,
    slow_query_threshold_ms: Option<u64>,
}

impl<'a> PreparedQuery<'a> {
    pub fn find_query(&self) -> &FindQuery {
        &self.find
    }

    pub fn slow_query_threshold_ms(&self) -> Option<u64> {
        self.slow_query_threshold_ms
    }

    pub async fn execute(self) -> Result<Vec<Document>, DatabaseError> {
        let started = Instant::now();
        let result = self.collection.find(&self.find).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            collection = self.collection.name(),
            predicates = self.find.filter.len() as u64,
            elapsed_ms,
            "executed find"
        );
        if self.slow_query_threshold_ms.is_some_and(|threshold| elapsed_ms > threshold) {
            tracing::warn!("Slow find on '{}': {}ms", self.collection.name(), elapsed_ms);
        }
        result
    }
}

impl<'a> IntoFuture for PreparedQuery<'a> {
    type Output = Result<Vec<Document>, DatabaseError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}

/// One page of records with its pagination envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub data: Vec<Document>,
    pub pagination: PaginationMeta,
}

/// Leading-integer parse: optional whitespace and sign, then digits.
/// Trailing junk is ignored and overflow saturates.
fn parse_int_prefix(raw: Option<&str>) -> Option<i64> {
    let s = raw?.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    let mut seen = false;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        seen = true;
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }

    if !seen {
        return None;
    }
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryCollection;
    use crate::query::types::{FieldPredicate, Operand, QueryOp, QueryValue, SortField};
    use crate::testing;

    fn materials_policy() -> QueryPolicy {
        testing::scenario_materials_policy()
    }

    fn build(query: &str) -> QuerySpec {
        let collection = MemoryCollection::new("materials");
        let raw = RawQuery::parse(query);
        let policy = materials_policy();
        QueryBuilder::new(&collection, &raw, &policy)
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .into_parts()
            .0
    }

    #[test]
    fn end_to_end_materials_query() {
        let spec = build(
            "category[in]=cement,steel&quantity[gte]=50&ecoFriendly=true&sort=quantity:desc&page=2&limit=20&select=name,quantity,category",
        );

        assert_eq!(
            spec.predicates,
            vec![
                FieldPredicate {
                    field: "category".into(),
                    op: QueryOp::In,
                    operand: Operand::List(vec![
                        QueryValue::String("cement".into()),
                        QueryValue::String("steel".into()),
                    ]),
                },
                FieldPredicate {
                    field: "quantity".into(),
                    op: QueryOp::Gte,
                    operand: Operand::Value(QueryValue::Number(50.0)),
                },
                FieldPredicate {
                    field: "ecoFriendly".into(),
                    op: QueryOp::Eq,
                    operand: Operand::Value(QueryValue::Bool(true)),
                },
            ]
        );
        assert_eq!(spec.sort, vec![SortField::desc("quantity")]);
        assert_eq!(
            spec.projection,
            Projection::Fields(vec!["name".into(), "quantity".into(), "category".into()])
        );
        assert_eq!((spec.page, spec.page_size, spec.skip), (2, 20, 20));
    }

    #[test]
    fn forbidden_field_and_operator_add_nothing() {
        let collection = MemoryCollection::new("materials");
        let raw = RawQuery::parse("unauthorizedField=x&quantity[badop]=5");
        let policy = materials_policy();
        let builder = QueryBuilder::new(&collection, &raw, &policy).filter();
        assert!(builder.spec().predicates.is_empty());
        assert_eq!(
            builder.dropped(),
            &[
                DroppedParam::new("unauthorizedField", DropReason::FieldNotAllowed),
                DroppedParam::new("quantity[badop]", DropReason::UnknownOperator),
            ]
        );
    }

    #[test]
    fn building_twice_is_identical() {
        let query = "name[contains]=a.b*c&createdAt[gte]=2024-01-01&sort=name&page=3&limit=7&fields=name";
        assert_eq!(build(query), build(query));
    }

    #[test]
    fn filter_twice_appends() {
        let collection = MemoryCollection::new("materials");
        let raw = RawQuery::parse("quantity[gt]=5");
        let policy = materials_policy();
        let builder = QueryBuilder::new(&collection, &raw, &policy).filter().filter();
        assert_eq!(builder.spec().predicates.len(), 2);
    }

    #[test]
    fn repeated_filter_keys_each_add_a_predicate() {
        let spec = build("quantity[gte]=50&quantity[gte]=10&category=steel");
        assert_eq!(spec.predicates.len(), 3);
    }

    #[test]
    fn limit_is_clamped_to_policy_max() {
        let spec = build("limit=500");
        assert_eq!(spec.page_size, 100);
    }

    #[test]
    fn page_below_one_is_clamped() {
        assert_eq!(build("page=0").page, 1);
        assert_eq!(build("page=-4").page, 1);
        assert_eq!(build("page=abc").page, 1);
        assert_eq!(build("page=3.9").page, 3);
    }

    #[test]
    fn missing_or_non_positive_limit_uses_default() {
        assert_eq!(build("").page_size, 50);
        assert_eq!(build("limit=0").page_size, 50);
        assert_eq!(build("limit=-10").page_size, 50);
        assert_eq!(build("limit=ten").page_size, 50);
    }

    #[test]
    fn skip_follows_page_and_size() {
        let spec = build("page=4&limit=25");
        assert_eq!(spec.skip, 75);
    }

    #[test]
    fn huge_page_does_not_overflow() {
        let spec = build("page=99999999999999999999999&limit=100");
        assert_eq!(spec.page, i64::MAX as u64);
        assert!(spec.skip > 0);
    }

    #[test]
    fn absent_sort_uses_policy_default() {
        assert_eq!(build("").sort, vec![SortField::desc("createdAt")]);
        assert_eq!(build("sort=").sort, vec![SortField::desc("createdAt")]);
    }

    #[test]
    fn invalid_sort_fields_are_dropped() {
        assert_eq!(build("sort=price:desc,name:asc").sort, vec![SortField::asc("name")]);
        assert!(build("sort=price:desc").sort.is_empty());
    }

    #[test]
    fn signed_sort_token_is_dropped() {
        let collection = MemoryCollection::new("materials");
        let raw = RawQuery::parse("sort=-createdAt");
        let policy = materials_policy();
        let (spec, dropped) = QueryBuilder::new(&collection, &raw, &policy).sort().into_parts();
        assert!(spec.sort.is_empty());
        assert_eq!(dropped, vec![DroppedParam::new("sort=-createdAt", DropReason::SortFieldNotAllowed)]);

        assert_eq!(build("sort=createdAt:DESC").sort, vec![SortField::asc("createdAt")]);
    }

    #[test]
    fn projection_without_allowed_fields_means_all() {
        assert_eq!(build("select=password,secret").projection, Projection::All);
        assert_eq!(build("select=").projection, Projection::All);
        assert_eq!(build("").projection, Projection::All);
    }

    #[test]
    fn select_wins_over_fields_and_dedupes() {
        let spec = build("fields=category&select=name,name,quantity");
        assert_eq!(spec.projection, Projection::Fields(vec!["name".into(), "quantity".into()]));

        let spec = build("fields=category");
        assert_eq!(spec.projection, Projection::Fields(vec!["category".into()]));
    }

    #[test]
    fn prepared_query_carries_the_window() {
        let collection = MemoryCollection::new("materials");
        let raw = RawQuery::parse("page=2&limit=20&sort=name");
        let policy = materials_policy();
        let builder = QueryBuilder::new(&collection, &raw, &policy).sort().paginate();
        let prepared = builder.build();
        let find = prepared.find_query();
        assert_eq!(find.skip, 20);
        assert_eq!(find.limit, Some(20));
        assert_eq!(find.sort, vec![SortField::asc("name")]);
        assert_eq!(prepared.slow_query_threshold_ms(), None);
    }

    #[test]
    fn runtime_settings_come_from_the_caller() {
        let collection = MemoryCollection::new("materials");
        let raw = RawQuery::parse("secret=x");
        let policy = materials_policy();
        let builder = QueryBuilder::new(&collection, &raw, &policy)
            .log_drops(true)
            .slow_query_threshold_ms(250)
            .filter();
        assert_eq!(builder.build().slow_query_threshold_ms(), Some(250));
        assert_eq!(builder.dropped(), &[DroppedParam::new("secret", DropReason::FieldNotAllowed)]);
    }

    #[test]
    fn parse_int_prefix_reads_leading_digits() {
        assert_eq!(parse_int_prefix(Some("42")), Some(42));
        assert_eq!(parse_int_prefix(Some("  7px")), Some(7));
        assert_eq!(parse_int_prefix(Some("-3")), Some(-3));
        assert_eq!(parse_int_prefix(Some("x1")), None);
        assert_eq!(parse_int_prefix(Some("")), None);
        assert_eq!(parse_int_prefix(None), None);
    }

    #[tokio::test]
    async fn executes_page_and_count_against_a_collection() {
        let collection = testing::seeded_materials().await;
        let raw = RawQuery::parse("category[in]=cement,steel&sort=quantity:desc&limit=2&select=name,quantity");
        let policy = materials_policy();
        let builder = QueryBuilder::new(&collection, &raw, &policy)
            .filter()
            .sort()
            .limit_fields()
            .paginate();

        let records = builder.build().await.unwrap();
        let total = builder.count_documents().await.unwrap();

        assert_eq!(total, 4);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "Rebar 16mm");
        assert!(records[0].get("category").is_none());

        let meta = builder.pagination_meta(total);
        assert_eq!(meta.total_pages, 2);
        assert!(meta.has_next_page);
    }

    #[tokio::test]
    async fn page_beyond_the_end_is_empty_with_accurate_meta() {
        let collection = testing::seeded_materials().await;
        let raw = RawQuery::parse("page=10&limit=5");
        let policy = materials_policy();
        let page = QueryBuilder::new(&collection, &raw, &policy)
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .fetch_page()
            .await
            .unwrap();

        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total, 6);
        assert_eq!(page.pagination.total_pages, 2);
        assert!(!page.pagination.has_next_page);
        assert!(page.pagination.has_prev_page);
    }

    #[tokio::test]
    async fn storage_failures_propagate() {
        let collection = testing::FailingCollection;
        let raw = RawQuery::parse("");
        let policy = materials_policy();
        let builder = QueryBuilder::new(&collection, &raw, &policy).paginate();
        assert!(matches!(builder.build().await, Err(DatabaseError::QueryError(_))));
        assert!(matches!(builder.count_documents().await, Err(DatabaseError::QueryError(_))));
        assert!(builder.fetch_page().await.is_err());
    }
}
