//! Common test utilities for E2E tests

#![allow(dead_code)]

use async_trait::async_trait;
use hearth::data::{Backend, BackendError, Filter, QueryState, Row};
use hearth::web::{FileViews, Registrar};
use hearth::{AppState, config};
use serde_json::{Value, json};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Configuration used by every test server
pub fn test_config() -> config::AppConfig {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
        },
        app: config::ApplicationConfig {
            name: "Hearth Test".to_string(),
            version: "9.9.9".to_string(),
            debug: true,
        },
        backend: config::BackendConfig {
            enabled: true,
            url: "https://project.supabase.co".to_string(),
            key: "test-service-key".to_string(),
            schema: "public".to_string(),
            application_name: "hearth-test".to_string(),
            timeout_seconds: 5,
        },
        cache: config::CacheConfig {
            ttl_ms: 10_000,
            max_entries: 1_000,
        },
        session: config::SessionConfig {
            cookie_name: "app_session".to_string(),
        },
        views: config::ViewsConfig {
            root: root.join("views"),
            default_layout: "layouts/app".to_string(),
        },
        static_files: config::StaticFilesConfig {
            root: root.join("public"),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
        metrics: config::MetricsConfig { enabled: false },
    }
}

/// In-memory stand-in for the hosted table service
///
/// Understands `eq` and `in` filters, ordering and limits. `or`
/// expressions are not interpreted and match every row.
#[derive(Default)]
pub struct FakeBackend {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    calls: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the content of `table`
    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        self.tables.lock().unwrap().insert(table.to_string(), rows);
    }

    /// Mutate storage behind the cache's back
    pub fn set_field(&self, table: &str, id: i64, column: &str, value: Value) {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        if let Some(row) = rows.iter_mut().find(|row| row["id"] == json!(id)) {
            row[column] = value;
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every following call fail with a 500
    pub fn fail(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Number of calls of `operation` against `table`
    pub fn calls(&self, operation: &str, table: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, t)| op == operation && t == table)
            .count()
    }

    /// Total number of reads (`select` + `select_single`) against `table`
    pub fn reads(&self, table: &str) -> usize {
        self.calls("select", table) + self.calls("select_single", table)
    }

    fn record(&self, operation: &str, table: &str) -> Result<(), BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((operation.to_string(), table.to_string()));

        if *self.failing.lock().unwrap() {
            return Err(BackendError::Api {
                status: 500,
                code: "XX000".to_string(),
                message: "backend unavailable".to_string(),
                details: None,
            });
        }
        Ok(())
    }

    fn matching(&self, table: &str, query: &QueryState) -> Vec<Row> {
        let mut rows: Vec<Row> = self
            .rows(table)
            .into_iter()
            .filter(|row| query.filters.iter().all(|filter| matches(row, filter)))
            .collect();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| compare(&a[&order.column], &b[&order.column]));
            if order.direction == hearth::data::Direction::Desc {
                rows.reverse();
            }
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { column, value } => row.get(column).is_some_and(|v| as_text(v) == *value),
        Filter::In { column, values } => row
            .get(column)
            .is_some_and(|v| values.contains(&as_text(v))),
        Filter::Or { .. } => true,
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => as_text(a).cmp(&as_text(b)),
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn select(&self, table: &str, query: &QueryState) -> Result<Vec<Row>, BackendError> {
        self.record("select", table)?;
        Ok(self.matching(table, query))
    }

    async fn select_single(
        &self,
        table: &str,
        query: &QueryState,
    ) -> Result<Option<Row>, BackendError> {
        self.record("select_single", table)?;
        let mut rows = self.matching(table, query);
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(BackendError::Api {
                status: 406,
                code: "PGRST116".to_string(),
                message: "JSON object requested, multiple (or no) rows returned".to_string(),
                details: Some(format!("The result contains {n} rows")),
            }),
        }
    }

    async fn insert(&self, table: &str, payload: &Value) -> Result<Row, BackendError> {
        self.record("insert", table)?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();

        let next_id = rows
            .iter()
            .filter_map(|row| row["id"].as_i64())
            .max()
            .unwrap_or(0)
            + 1;
        let mut row = payload.clone();
        if row.get("id").is_none() {
            row["id"] = json!(next_id);
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, id: &str, payload: &Value) -> Result<Row, BackendError> {
        self.record("update", table)?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();

        let row = rows
            .iter_mut()
            .find(|row| as_text(&row["id"]) == id)
            .ok_or_else(|| BackendError::Decode(format!("no row with id {id}")))?;
        if let (Some(target), Some(changes)) = (row.as_object_mut(), payload.as_object()) {
            for (key, value) in changes {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError> {
        self.record("delete", table)?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| as_text(&row["id"]) != id);
        }
        Ok(())
    }
}

/// State wired to a fake backend, without any HTTP server
pub fn test_state(config: config::AppConfig, backend: Arc<FakeBackend>) -> AppState {
    let views = FileViews::new(&config.views, false).unwrap();
    AppState::with_services(
        config,
        backend,
        Arc::new(views),
        Default::default(),
    )
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub backend: Arc<FakeBackend>,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server serving the application routes
    pub async fn new() -> Self {
        Self::start(test_config(), hearth::app::routes).await
    }

    /// Create a test server with the backend feature switched off
    pub async fn with_backend_disabled() -> Self {
        let mut config = test_config();
        config.backend.enabled = false;
        Self::start(config, hearth::app::routes).await
    }

    /// Create a test server with custom routes
    pub async fn start(
        config: config::AppConfig,
        declare: impl FnOnce(&mut Registrar, &config::AppConfig),
    ) -> Self {
        let mut registrar = Registrar::new();
        declare(&mut registrar, &config);
        let (routes, registry) = registrar.finish();

        let backend = FakeBackend::new();
        let views = FileViews::new(&config.views, false).unwrap();
        let state = AppState::with_services(config, backend.clone(), Arc::new(views), registry);

        // Never follow redirects so tests can inspect Location
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = hearth::build_router(state.clone(), routes);

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            backend,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}
