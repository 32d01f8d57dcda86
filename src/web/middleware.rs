//! Route middlewares
//!
//! A `Middleware` is a deferred `route_layer` call, so groups can carry a
//! list of heterogeneous layers and apply them to their own routes only.

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{Html, IntoResponse, Response},
    routing::Route,
};
use std::convert::Infallible;
use tower::{Layer, Service};

use crate::AppState;
use crate::config::AppConfig;
use crate::error::AppError;

pub const FEATURE_DISABLED_MESSAGE: &str =
    "Database/Auth features are currently disabled in configuration.";

const FEATURE_DISABLED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>403 Feature Disabled</title></head>
<body>
    <div style="font-family: -apple-system, system-ui, sans-serif; text-align: center; padding: 100px 20px;">
        <h1 style="font-size: 48px; margin-bottom: 10px;">403</h1>
        <h2 style="font-weight: 500;">Feature Disabled</h2>
        <p style="color: #666; max-width: 500px; margin: 0 auto 20px;">
            This section requires the data backend. Set <code>HEARTH__BACKEND__ENABLED=true</code>
            and provide the backend credentials.
        </p>
        <a href="/" style="color: #000; text-decoration: none; font-weight: 600; border-bottom: 2px solid #000;">Return to Home</a>
    </div>
</body>
</html>"#;

type ApplyFn = Box<dyn FnOnce(Router<AppState>) -> Router<AppState> + Send>;

/// Middleware attached to a route group
pub struct Middleware {
    apply: ApplyFn,
}

impl Middleware {
    /// Wrap any tower layer usable as an axum route layer
    pub fn layer<L>(layer: L) -> Self
    where
        L: Layer<Route> + Clone + Send + 'static,
        L::Service: Service<Request> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self {
            apply: Box::new(move |router| router.route_layer(layer)),
        }
    }

    /// Reject requests while the backend feature is switched off
    pub fn backend_feature(config: &AppConfig) -> Self {
        Self::layer(axum::middleware::from_fn_with_state(
            FeatureGate::from(config),
            require_backend,
        ))
    }

    pub(crate) fn apply(self, router: Router<AppState>) -> Router<AppState> {
        (self.apply)(router)
    }
}

/// Snapshot of the settings `require_backend` needs
#[derive(Debug, Clone, Copy)]
pub struct FeatureGate {
    pub enabled: bool,
    pub debug: bool,
}

impl From<&AppConfig> for FeatureGate {
    fn from(config: &AppConfig) -> Self {
        Self {
            enabled: config.backend.enabled,
            debug: config.app.debug,
        }
    }
}

/// Middleware guarding backend-dependent routes
///
/// # Usage
/// ```ignore
/// let gated = Router::new()
///     .route("/posts", get(index))
///     .route_layer(middleware::from_fn_with_state(gate, require_backend));
/// ```
pub async fn require_backend(
    State(gate): State<FeatureGate>,
    request: Request,
    next: Next,
) -> Response {
    if gate.enabled {
        return next.run(request).await;
    }

    if gate.debug {
        tracing::info!(
            path = %request.uri().path(),
            "Access blocked to backend-dependent route"
        );
    }

    if wants_json(request.headers()) {
        return AppError::FeatureDisabled(FEATURE_DISABLED_MESSAGE.to_string()).into_response();
    }

    (StatusCode::FORBIDDEN, Html(FEATURE_DISABLED_PAGE)).into_response()
}

fn wants_json(headers: &HeaderMap) -> bool {
    let is_xhr = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    let accepts_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("json"));
    is_xhr || accepts_json
}
