//! Remote data backend
//!
//! The `Backend` trait is the seam between the query builder and the
//! hosted table service. `PostgrestBackend` speaks the PostgREST protocol
//! used by Supabase; it is stateless (no token refresh, no session), so a
//! single handle serves every request for the life of the process.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::query::{Direction, Filter, QueryState};
use crate::config::BackendConfig;
use crate::error::AppError;

/// A single row as returned by the backend
pub type Row = Value;

/// PostgREST error code for "JSON object requested, multiple (or no) rows returned"
const SINGLE_ROW_MISMATCH: &str = "PGRST116";

const OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

/// Failure reported by (or while talking to) the backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network or protocol failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Error answered by the backend itself
    #[error("{message} (status {status}, code {code})")]
    Api {
        status: u16,
        code: String,
        message: String,
        details: Option<String>,
    },

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Single-row read matched zero rows
    pub fn is_no_rows(&self) -> bool {
        match self {
            BackendError::Api { code, details, .. } => {
                code == SINGLE_ROW_MISMATCH
                    && details.as_deref().is_some_and(|d| d.contains(" 0 rows"))
            }
            _ => false,
        }
    }
}

/// Operations the query builder issues against a table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// Select every row matching the query, in order
    async fn select(&self, table: &str, query: &QueryState) -> Result<Vec<Row>, BackendError>;

    /// Select exactly one row; `Ok(None)` when nothing matches
    async fn select_single(
        &self,
        table: &str,
        query: &QueryState,
    ) -> Result<Option<Row>, BackendError>;

    /// Insert one row and return it
    async fn insert(&self, table: &str, payload: &Value) -> Result<Row, BackendError>;

    /// Update the row with the given id and return it
    async fn update(&self, table: &str, id: &str, payload: &Value) -> Result<Row, BackendError>;

    /// Delete the row with the given id
    async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

/// PostgREST connection
pub struct PostgrestBackend {
    client: reqwest::Client,
    /// e.g. "https://abc.supabase.co/rest/v1"
    rest_url: String,
    schema: String,
}

static SHARED: OnceCell<Arc<PostgrestBackend>> = OnceCell::new();

impl PostgrestBackend {
    /// Create a new connection
    ///
    /// # Errors
    /// Returns `AppError::Config` if credentials are missing or
    /// cannot be used as header values.
    pub fn new(config: &BackendConfig) -> Result<Self, AppError> {
        if !config.is_configured() {
            return Err(AppError::Config(
                "backend.url and backend.key are required".to_string(),
            ));
        }

        let key = config.key.trim();
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("apikey"), header_value(key)?);
        headers.insert(
            reqwest::header::AUTHORIZATION,
            header_value(&format!("Bearer {key}"))?,
        );
        headers.insert(
            HeaderName::from_static("x-application-name"),
            header_value(&config.application_name)?,
        );

        let client = reqwest::Client::builder()
            .user_agent(concat!("hearth/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", config.url.trim().trim_end_matches('/')),
            schema: config.schema.clone(),
        })
    }

    /// Process-wide connection
    ///
    /// The first call creates the handle; every later call (including
    /// racing ones) gets the same `Arc`. Later configs are ignored.
    pub fn shared(config: &BackendConfig) -> Result<Arc<Self>, AppError> {
        SHARED
            .get_or_try_init(|| {
                tracing::info!(url = %config.url, schema = %config.schema, "Connecting to backend");
                Self::new(config).map(Arc::new)
            })
            .cloned()
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    async fn execute(
        &self,
        operation: &'static str,
        table: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        use crate::metrics::{BACKEND_REQUEST_DURATION_SECONDS, BACKEND_REQUESTS_TOTAL};

        let started = Instant::now();
        let result = request.send().await;
        BACKEND_REQUEST_DURATION_SECONDS
            .with_label_values(&[operation, table])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                BACKEND_REQUESTS_TOTAL
                    .with_label_values(&[operation, table, "transport_error"])
                    .inc();
                tracing::warn!(%error, operation, table, "Backend request failed");
                return Err(error.into());
            }
        };

        let status = response.status();
        BACKEND_REQUESTS_TOTAL
            .with_label_values(&[operation, table, status.as_str()])
            .inc();

        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<ApiErrorBody> = serde_json::from_str(&text).ok();
        let error = match body {
            Some(body) => BackendError::Api {
                status: status.as_u16(),
                code: body.code.unwrap_or_default(),
                message: body.message.unwrap_or_else(|| status.to_string()),
                details: body.details,
            },
            None => BackendError::Api {
                status: status.as_u16(),
                code: String::new(),
                message: if text.is_empty() { status.to_string() } else { text },
                details: None,
            },
        };

        if !error.is_no_rows() {
            tracing::warn!(%error, operation, table, "Backend answered with an error");
        }
        Err(error)
    }
}

#[async_trait]
impl Backend for PostgrestBackend {
    async fn select(&self, table: &str, query: &QueryState) -> Result<Vec<Row>, BackendError> {
        let request = self
            .client
            .get(self.table_url(table))
            .header("Accept-Profile", &self.schema)
            .query(&query_params(query));

        let response = self.execute("select", table, request).await?;
        response
            .json::<Vec<Row>>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn select_single(
        &self,
        table: &str,
        query: &QueryState,
    ) -> Result<Option<Row>, BackendError> {
        let request = self
            .client
            .get(self.table_url(table))
            .header("Accept-Profile", &self.schema)
            .header(reqwest::header::ACCEPT, OBJECT_MEDIA_TYPE)
            .query(&query_params(query));

        match self.execute("select_single", table, request).await {
            Ok(response) => response
                .json::<Row>()
                .await
                .map(Some)
                .map_err(|e| BackendError::Decode(e.to_string())),
            Err(error) if error.is_no_rows() => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn insert(&self, table: &str, payload: &Value) -> Result<Row, BackendError> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Content-Profile", &self.schema)
            .header("Prefer", "return=representation")
            .header(reqwest::header::ACCEPT, OBJECT_MEDIA_TYPE)
            .query(&[("select", "*")])
            .json(&[payload]);

        let response = self.execute("insert", table, request).await?;
        response
            .json::<Row>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn update(&self, table: &str, id: &str, payload: &Value) -> Result<Row, BackendError> {
        let request = self
            .client
            .patch(self.table_url(table))
            .header("Content-Profile", &self.schema)
            .header("Prefer", "return=representation")
            .header(reqwest::header::ACCEPT, OBJECT_MEDIA_TYPE)
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .json(payload);

        let response = self.execute("update", table, request).await?;
        response
            .json::<Row>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError> {
        let request = self
            .client
            .delete(self.table_url(table))
            .header("Content-Profile", &self.schema)
            .header("Prefer", "return=minimal")
            .query(&[("id", format!("eq.{id}"))]);

        self.execute("delete", table, request).await?;
        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Config(format!("invalid backend header value: {e}")))
}

/// Translate a query into PostgREST URL parameters
pub(crate) fn query_params(query: &QueryState) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];

    for filter in &query.filters {
        match filter {
            Filter::Eq { column, value } => {
                params.push((column.clone(), format!("eq.{value}")));
            }
            Filter::In { column, values } => {
                let list = values
                    .iter()
                    .map(|v| quote_list_value(v))
                    .collect::<Vec<_>>()
                    .join(",");
                params.push((column.clone(), format!("in.({list})")));
            }
            Filter::Or { expression } => {
                params.push(("or".to_string(), format!("({expression})")));
            }
        }
    }

    if let Some(order) = &query.order {
        let direction = match order.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }

    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }

    params
}

/// Reserved characters inside `in.(...)` lists must be double-quoted
fn quote_list_value(value: &str) -> String {
    if value.contains([',', '(', ')']) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}
