//! Hearth - a small server-rendered web application scaffold
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Web Layer (Axum)                        │
//! │  - Named routes and middleware groups                       │
//! │  - Request dispatch with central error handling             │
//! │  - Views, static files, backend feature gate                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - Chainable table queries                                  │
//! │  - TTL query cache with prefix invalidation                 │
//! │  - PostgREST backend (Supabase)                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `app`: Demo routes and handlers
//! - `web`: Routing, dispatch, views
//! - `data`: Backend connection, query builder, cache
//! - `auth`: Session cookie identity
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod app;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod web;

use std::sync::Arc;

use data::{Backend, PostgrestBackend, QueryCache, Table};
use web::{FileViews, RouteRegistry, ViewEngine};

/// Largest request body accepted by any route
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Application state shared across all handlers
///
/// Cloned for each request; every service behind it is shared.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Remote data backend
    pub backend: Arc<dyn Backend>,

    /// Query cache shared by every table handle
    pub cache: Arc<QueryCache>,

    /// Frozen route-name registry
    pub routes: Arc<RouteRegistry>,

    /// Template renderer
    pub views: Arc<dyn ViewEngine>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect the process-wide PostgREST client
    /// 2. Create the query cache
    /// 3. Register views (reloaded from disk in debug mode)
    ///
    /// # Errors
    /// Returns error if the backend client cannot be built or a view
    /// template does not parse
    pub fn new(config: config::AppConfig, routes: RouteRegistry) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let backend: Arc<dyn Backend> = PostgrestBackend::shared(&config.backend)?;
        tracing::info!(url = %config.backend.url, "Backend client ready");

        let views = FileViews::new(&config.views, config.app.debug)?;

        Ok(Self::with_services(
            config,
            backend,
            Arc::new(views),
            routes,
        ))
    }

    /// Assemble state from already constructed services
    pub fn with_services(
        config: config::AppConfig,
        backend: Arc<dyn Backend>,
        views: Arc<dyn ViewEngine>,
        routes: RouteRegistry,
    ) -> Self {
        let cache = QueryCache::new(config.cache.ttl(), config.cache.max_entries);
        tracing::debug!(
            ttl_ms = config.cache.ttl_ms,
            max_entries = config.cache.max_entries,
            "Query cache initialized"
        );

        Self {
            config: Arc::new(config),
            backend,
            cache: Arc::new(cache),
            routes: Arc::new(routes),
            views,
        }
    }

    /// Table handle bound to the shared backend and cache
    pub fn table(&self, name: &str) -> Table {
        Table::new(name, self.backend.clone(), self.cache.clone())
    }
}

/// Build the Axum router around the declared application routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState, routes: axum::Router<AppState>) -> axum::Router {
    use axum::{Router, handler::HandlerWithoutStateExt, routing::get};
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, services::ServeDir,
        trace::TraceLayer,
    };

    let static_files =
        ServeDir::new(&state.config.static_files.root).not_found_service(not_found.into_service());
    let metrics_enabled = state.config.metrics.enabled;

    let router = Router::new()
        .route("/health", get(health_check))
        .merge(routes)
        .fallback_service(static_files)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if metrics_enabled {
        router.route("/metrics", get(metrics_handler))
    } else {
        router
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found(uri: axum::http::Uri) -> error::AppError {
    error::AppError::NotFound(format!("The path \"{}\" was not found.", uri.path()))
}

async fn metrics_handler() -> axum::response::Response {
    use axum::{
        http::{StatusCode, header},
        response::IntoResponse,
    };

    match metrics::encode_text() {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(error) => {
            tracing::error!(%error, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
