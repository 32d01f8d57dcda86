//! Hearth binary entry point

use hearth::{AppState, config, web::Registrar};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Load configuration from file and environment
/// 3. Declare routes
/// 4. Initialize AppState
/// 5. Build Axum router
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("HEARTH__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let default_filter = std::env::var("HEARTH__LOGGING__LEVEL")
        .map(|level| format!("hearth={level},tower_http=debug"))
        .unwrap_or_else(|_| "hearth=info,tower_http=debug".to_string());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| default_filter.clone().into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| default_filter.clone().into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting Hearth...");

    // 2. Initialize metrics
    hearth::metrics::init_metrics();

    // 3. Load configuration; missing backend credentials are fatal
    let config = match config::AppConfig::load() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "Invalid configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(
        app = %config.app.name,
        version = %config.app.version,
        backend_enabled = config.backend.enabled,
        "Configuration loaded"
    );

    // 4. Declare routes
    let mut registrar = Registrar::new();
    hearth::app::routes(&mut registrar, &config);
    let (routes, registry) = registrar.finish();

    // 5. Initialize application state
    let state = AppState::new(config.clone(), registry)?;

    // 6. Build Axum router
    let app = hearth::build_router(state, routes);

    // 7. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
