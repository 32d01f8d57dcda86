//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub app: ApplicationConfig,
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    pub views: ViewsConfig,
    pub static_files: StaticFilesConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
}

/// Application metadata injected into every rendered view
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,
    pub version: String,
    /// Debug mode: disables the view cache and logs feature-gate blocks
    #[serde(default)]
    pub debug: bool,
}

/// Remote data backend (PostgREST-compatible, e.g. Supabase)
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Feature toggle for backend-dependent routes (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Project endpoint, e.g. "https://abc.supabase.co"
    #[serde(default)]
    pub url: String,
    /// Service or anon key
    #[serde(default)]
    pub key: String,
    /// Database schema exposed through the profile headers
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Value of the `x-application-name` header
    #[serde(default = "default_application_name")]
    pub application_name: String,
    /// HTTP timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl BackendConfig {
    /// Both endpoint and credential are present
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.key.trim().is_empty()
    }
}

fn default_true() -> bool {
    true
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_application_name() -> String {
    "hearth".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Query cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Entry time-to-live in milliseconds (default: 10000)
    pub ttl_ms: u64,
    /// Maximum number of cached entries (default: 10000)
    pub max_entries: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
}

/// View engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ViewsConfig {
    /// Directory holding `*.html` templates
    pub root: PathBuf,
    /// Layout applied when a view does not pick one
    pub default_layout: String,
}

/// Static file serving
#[derive(Debug, Clone, Deserialize)]
pub struct StaticFilesConfig {
    pub root: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Mount `GET /metrics`
    pub enabled: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (HEARTH__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid or backend credentials are missing
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("app.name", "hearth")?
            .set_default("app.version", "0.0.0")?
            .set_default("app.debug", false)?
            .set_default("backend.enabled", true)?
            .set_default("cache.ttl_ms", 10_000)?
            .set_default("cache.max_entries", 10_000)?
            .set_default("session.cookie_name", "app_session")?
            .set_default("views.root", "views")?
            .set_default("views.default_layout", "layouts/app")?
            .set_default("static_files.root", "public")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("metrics.enabled", false)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("HEARTH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        if !self.backend.is_configured() {
            return Err(crate::error::AppError::Config(
                "backend.url and backend.key are required (HEARTH__BACKEND__URL, HEARTH__BACKEND__KEY)"
                    .to_string(),
            ));
        }

        let endpoint = url::Url::parse(self.backend.url.trim()).map_err(|e| {
            crate::error::AppError::Config(format!("backend.url is not a valid URL: {e}"))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(crate::error::AppError::Config(
                "backend.url must use http or https".to_string(),
            ));
        }

        if self.cache.ttl_ms == 0 {
            return Err(crate::error::AppError::Config(
                "cache.ttl_ms must be greater than 0".to_string(),
            ));
        }

        if self.cache.max_entries == 0 {
            return Err(crate::error::AppError::Config(
                "cache.max_entries must be greater than 0".to_string(),
            ));
        }

        if !self.backend.enabled {
            tracing::warn!("Backend features are disabled; gated routes will answer 403");
        }

        Ok(())
    }
}
