//! Chainable, cached table queries
//!
//! A `Table` is a cheap handle that can be shared freely. Every chain
//! call produces an owned `Query` that is moved through the chain and
//! consumed by exactly one terminal operation, so two requests using the
//! same `Table` can never mix their predicates.
//!
//! ```ignore
//! let users = state.table("users");
//! let user = users.where_eq("id", 5).first().await?;
//! let recent = users
//!     .where_in("role", ["admin", "editor"])
//!     .order_by("created_at", Direction::Desc)
//!     .limit(10)
//!     .get()
//!     .await?;
//! ```

use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::sync::Arc;

use super::backend::{Backend, Row};
use super::cache::QueryCache;
use crate::error::AppError;

/// A single predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// `column = value`
    Eq { column: String, value: String },
    /// `column IN (values...)`
    In { column: String, values: Vec<String> },
    /// Raw disjunction in backend syntax, passed through unchecked
    Or { expression: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// Accumulated, not yet executed query
///
/// The JSON form of this struct is part of the `first()` cache key, so
/// field order and naming matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryState {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

/// Handle on one backend table
#[derive(Clone)]
pub struct Table {
    name: Arc<str>,
    backend: Arc<dyn Backend>,
    cache: Arc<QueryCache>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("name", &self.name).finish()
    }
}

impl Table {
    pub fn new(name: impl Into<Arc<str>>, backend: Arc<dyn Backend>, cache: Arc<QueryCache>) -> Self {
        Self {
            name: name.into(),
            backend,
            cache,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start an empty query
    pub fn query(&self) -> Query {
        Query {
            table: self.clone(),
            state: QueryState::default(),
        }
    }

    pub fn where_eq(&self, column: &str, value: impl Display) -> Query {
        self.query().where_eq(column, value)
    }

    pub fn where_in<I, V>(&self, column: &str, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        self.query().where_in(column, values)
    }

    pub fn where_or(&self, expression: &str) -> Query {
        self.query().where_or(expression)
    }

    pub fn order_by(&self, column: &str, direction: Direction) -> Query {
        self.query().order_by(column, direction)
    }

    pub fn limit(&self, count: usize) -> Query {
        self.query().limit(count)
    }

    /// Every row in the table
    pub async fn get(&self) -> Result<Vec<Row>, AppError> {
        self.query().get().await
    }

    /// Alias of [`Table::get`]
    pub async fn all(&self) -> Result<Vec<Row>, AppError> {
        self.get().await
    }

    /// First row of the unfiltered table (cached)
    pub async fn first(&self) -> Result<Option<Row>, AppError> {
        self.query().first().await
    }

    /// Find a row by primary key
    ///
    /// Checks `{table}:id:{id}` before building any query. A miss falls
    /// back to `where_eq("id", id).first()`; only found rows are stored
    /// under the id key.
    pub async fn find(&self, id: impl Display) -> Result<Option<Row>, AppError> {
        let id = id.to_string();
        let key = format!("{}:id:{}", self.name, id);

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(into_row(cached));
        }

        let row = self.where_eq("id", &id).first().await?;
        if let Some(row) = &row {
            self.cache.set(key, row.clone()).await;
        }
        Ok(row)
    }

    /// Shorthand for `where_eq(column, value).first()`
    pub async fn find_by(&self, column: &str, value: impl Display) -> Result<Option<Row>, AppError> {
        self.where_eq(column, value).first().await
    }

    /// Insert one row and return it
    pub async fn create(&self, payload: &Value) -> Result<Row, AppError> {
        let row = self.backend.insert(&self.name, payload).await?;
        self.invalidate().await;
        tracing::debug!(table = %self.name, "Row created");
        Ok(row)
    }

    /// Update the row identified by `id` and return it
    pub async fn update(&self, id: impl Display, payload: &Value) -> Result<Row, AppError> {
        let id = id.to_string();
        let row = self.backend.update(&self.name, &id, payload).await?;
        self.invalidate().await;
        tracing::debug!(table = %self.name, id = %id, "Row updated");
        Ok(row)
    }

    /// Delete the row identified by `id`
    pub async fn delete(&self, id: impl Display) -> Result<bool, AppError> {
        let id = id.to_string();
        self.backend.delete(&self.name, &id).await?;
        self.invalidate().await;
        tracing::debug!(table = %self.name, id = %id, "Row deleted");
        Ok(true)
    }

    /// Drop every cached read for this table
    async fn invalidate(&self) {
        self.cache.invalidate_prefix(&format!("{}:", self.name)).await;
    }
}

/// Pending query bound to a table
#[derive(Debug, Clone)]
#[must_use = "a query does nothing until a terminal operation runs it"]
pub struct Query {
    table: Table,
    state: QueryState,
}

impl Query {
    /// Add an equality predicate
    pub fn where_eq(mut self, column: &str, value: impl Display) -> Self {
        self.state.filters.push(Filter::Eq {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Add a membership predicate
    pub fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        self.state.filters.push(Filter::In {
            column: column.to_string(),
            values: values.into_iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    /// Add a raw disjunctive expression, e.g. `"status.eq.draft,author.eq.me"`
    pub fn where_or(mut self, expression: &str) -> Self {
        self.state.filters.push(Filter::Or {
            expression: expression.to_string(),
        });
        self
    }

    /// Set ordering; the last call wins
    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.state.order = Some(Order {
            column: column.to_string(),
            direction,
        });
        self
    }

    /// Set a row limit; the last call wins
    pub fn limit(mut self, count: usize) -> Self {
        self.state.limit = Some(count);
        self
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    /// Cache key used by [`Query::first`]
    pub fn cache_key(&self) -> String {
        let serialized = serde_json::to_string(&self.state).unwrap_or_default();
        format!("{}:first:{}", self.table.name, serialized)
    }

    /// Run the query and return every matching row (never cached)
    pub async fn get(self) -> Result<Vec<Row>, AppError> {
        let rows = self
            .table
            .backend
            .select(&self.table.name, &self.state)
            .await?;
        Ok(rows)
    }

    /// Alias of [`Query::get`]
    pub async fn all(self) -> Result<Vec<Row>, AppError> {
        self.get().await
    }

    /// Run the query expecting at most one row
    ///
    /// Served from the cache while fresh. An empty result is not an
    /// error: `None` is returned and cached like any other result.
    pub async fn first(self) -> Result<Option<Row>, AppError> {
        let key = self.cache_key();
        let cache = &self.table.cache;

        if let Some(cached) = cache.get(&key).await {
            return Ok(into_row(cached));
        }

        let row = self
            .table
            .backend
            .select_single(&self.table.name, &self.state)
            .await?;

        cache.set(key, row.clone().unwrap_or(Value::Null)).await;
        Ok(row)
    }
}

fn into_row(value: Value) -> Option<Row> {
    match value {
        Value::Null => None,
        row => Some(row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::backend::{BackendError, MockBackend};
    use serde_json::json;
    use std::time::Duration;

    fn cache() -> Arc<QueryCache> {
        Arc::new(QueryCache::new(Duration::from_secs(10), 1_000))
    }

    fn api_error() -> BackendError {
        BackendError::Api {
            status: 500,
            code: "XX000".to_string(),
            message: "boom".to_string(),
            details: None,
        }
    }

    #[test]
    fn test_chain_accumulates_state_and_last_order_wins() {
        let mut backend = MockBackend::new();
        backend.expect_select().never();
        let table = Table::new("users", Arc::new(backend), cache());

        let query = table
            .where_eq("status", "active")
            .where_in("id", [1, 2, 3])
            .where_or("role.eq.admin,role.eq.owner")
            .order_by("name", Direction::Asc)
            .order_by("created_at", Direction::Desc)
            .limit(20)
            .limit(5);

        let state = query.state();
        assert_eq!(state.filters.len(), 3);
        assert_eq!(
            state.order,
            Some(Order {
                column: "created_at".to_string(),
                direction: Direction::Desc,
            })
        );
        assert_eq!(state.limit, Some(5));
    }

    #[test]
    fn test_queries_from_the_same_table_are_independent() {
        let table = Table::new("users", Arc::new(MockBackend::new()), cache());

        let a = table.where_eq("id", 1);
        let b = table.where_eq("email", "b@example.com");

        assert_eq!(a.state().filters.len(), 1);
        assert_eq!(b.state().filters.len(), 1);
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_is_prefixed_by_table() {
        let table = Table::new("users", Arc::new(MockBackend::new()), cache());
        let key = table.where_eq("id", 5).cache_key();

        assert!(key.starts_with("users:first:"));
        assert!(key.contains("\"column\":\"id\""));
    }

    #[tokio::test]
    async fn test_get_propagates_backend_failure() {
        let mut backend = MockBackend::new();
        backend
            .expect_select()
            .times(1)
            .returning(|_, _| Err(api_error()));
        let table = Table::new("users", Arc::new(backend), cache());

        let result = table.where_eq("id", 1).get().await;
        assert!(matches!(result, Err(AppError::Backend(_))));
    }

    #[tokio::test]
    async fn test_first_failure_is_not_cached() {
        let shared = cache();
        let mut backend = MockBackend::new();
        let mut attempts = 0;
        backend
            .expect_select_single()
            .times(2)
            .returning(move |_, _| {
                attempts += 1;
                if attempts == 1 {
                    Err(api_error())
                } else {
                    Ok(Some(json!({"id": 1})))
                }
            });
        let table = Table::new("users", Arc::new(backend), shared.clone());

        assert!(table.where_eq("id", 1).first().await.is_err());
        assert!(shared.is_empty().await);
        assert_eq!(
            table.where_eq("id", 1).first().await.unwrap(),
            Some(json!({"id": 1}))
        );
    }

    #[tokio::test]
    async fn test_failed_mutation_keeps_cache() {
        let shared = cache();
        shared.set("users:id:1", json!({"id": 1})).await;

        let mut backend = MockBackend::new();
        backend
            .expect_update()
            .times(1)
            .returning(|_, _, _| Err(api_error()));
        backend
            .expect_insert()
            .times(1)
            .returning(|_, _| Err(api_error()));
        backend
            .expect_delete()
            .times(1)
            .returning(|_, _| Err(api_error()));
        let table = Table::new("users", Arc::new(backend), shared.clone());

        assert!(table.update(1, &json!({"name": "B"})).await.is_err());
        assert!(table.create(&json!({"name": "C"})).await.is_err());
        assert!(table.delete(1).await.is_err());
        assert_eq!(shared.get("users:id:1").await, Some(json!({"id": 1})));
    }

    #[tokio::test]
    async fn test_mutations_pass_id_and_payload_through() {
        let mut backend = MockBackend::new();
        backend
            .expect_update()
            .withf(|table, id, payload| {
                table == "users" && id == "5" && payload == &json!({"name": "B"})
            })
            .times(1)
            .returning(|_, _, _| Ok(json!({"id": 5, "name": "B"})));
        backend
            .expect_delete()
            .withf(|table, id| table == "users" && id == "5")
            .times(1)
            .returning(|_, _| Ok(()));
        let table = Table::new("users", Arc::new(backend), cache());

        assert_eq!(
            table.update(5, &json!({"name": "B"})).await.unwrap(),
            json!({"id": 5, "name": "B"})
        );
        assert!(table.delete(5).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_caches_only_found_rows() {
        let shared = cache();
        let mut backend = MockBackend::new();
        backend
            .expect_select_single()
            .times(1)
            .returning(|_, _| Ok(None));
        let table = Table::new("users", Arc::new(backend), shared.clone());

        assert_eq!(table.find(404).await.unwrap(), None);
        assert_eq!(shared.get("users:id:404").await, None);
        // The empty result still sits under the `first` key
        assert_eq!(table.find(404).await.unwrap(), None);
    }
}
