//! Request dispatch
//!
//! Every route declared through the `Registrar` runs through [`dispatch`]:
//! the handler gets a [`Ctx`] instead of raw extractors, and any `Err` or
//! panic it produces is routed through `AppError::into_response`.

use axum::{
    async_trait,
    extract::{Form, FromRequest, FromRequestParts, Json, Path, Query, Request},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use crate::AppState;
use crate::auth::{Identity, MaybeIdentity};
use crate::data::Table;
use crate::error::AppError;

/// Per-request context handed to route handlers
pub struct Ctx {
    /// Parsed JSON or form body; `Null` when there is none
    pub body: Value,
    /// Route parameters (`/posts/:id` -> `id`)
    pub params: HashMap<String, String>,
    /// Query string parameters
    pub query: HashMap<String, String>,
    /// Identity decoded from the session cookie
    pub user: Option<Identity>,
    state: AppState,
    started: Instant,
}

impl std::fmt::Debug for Ctx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ctx")
            .field("body", &self.body)
            .field("params", &self.params)
            .field("query", &self.query)
            .field("user", &self.user)
            .finish()
    }
}

#[async_trait]
impl FromRequest<AppState> for Ctx {
    type Rejection = AppError;

    async fn from_request(request: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let started = Instant::now();
        let (mut parts, body) = request.into_parts();

        let params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, state)
            .await
            .map(|Path(params)| params)
            .unwrap_or_default();
        let query = Query::<HashMap<String, String>>::from_request_parts(&mut parts, state)
            .await
            .map(|Query(query)| query)
            .unwrap_or_default();
        let MaybeIdentity(user) = MaybeIdentity::from_request_parts(&mut parts, state)
            .await
            .unwrap_or_else(|never| match never {});

        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let request = Request::from_parts(parts, body);

        let body = if content_type.starts_with("application/json") {
            let Json(body) = Json::<Value>::from_request(request, state)
                .await
                .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
            body
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(request, state)
                .await
                .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
            Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect(),
            )
        } else {
            Value::Null
        };

        Ok(Self {
            body,
            params,
            query,
            user,
            state: state.clone(),
            started,
        })
    }
}

impl Ctx {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Route parameter by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Body field by name
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Table handle bound to the shared backend and cache
    pub fn table(&self, name: &str) -> Table {
        self.state.table(name)
    }

    /// Render a view
    ///
    /// `view` uses dots as separators (`"posts.index"` -> `posts/index`);
    /// a string `layout` field in `data` is mapped the same way. Shared
    /// view locals are merged underneath `data`.
    pub async fn render(&self, view: &str, data: Value) -> Result<Response, AppError> {
        let (path, data) = resolve_view(view, data)?;

        let mut merged = self.view_locals();
        merged.extend(data);

        let html = self
            .state
            .views
            .render(&path, &Value::Object(merged))
            .await?;
        Ok(Html(html).into_response())
    }

    /// Redirect to a named route, or to `target` as a literal path
    pub fn redirect(&self, target: &str) -> Response {
        let location = self.state.routes.resolve(target).to_string();
        (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
    }

    fn view_locals(&self) -> Map<String, Value> {
        let config = &self.state.config;
        let user = self
            .user
            .as_ref()
            .map(|identity| json!({ "name": identity.name, "email": identity.email }))
            .unwrap_or(Value::Null);

        let mut locals = Map::new();
        locals.insert("app_name".into(), json!(config.app.name));
        locals.insert("app_version".into(), json!(config.app.version));
        locals.insert("backend_enabled".into(), json!(config.backend.enabled));
        locals.insert("user".into(), user);
        locals.insert(
            "render_time".into(),
            json!(format!("{:.3}", self.started.elapsed().as_secs_f64())),
        );
        locals
    }
}

/// Map a dotted view name to a path and normalize `data.layout`
pub(crate) fn resolve_view(view: &str, data: Value) -> Result<(String, Map<String, Value>), AppError> {
    let mut data = match data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        _ => {
            return Err(AppError::Render(format!(
                "data for view '{view}' must be a JSON object"
            )));
        }
    };

    if let Some(Value::String(layout)) = data.get_mut("layout") {
        *layout = layout.replace('.', "/");
    }

    Ok((view.replace('.', "/"), data))
}

/// Wrap a handler so its failures reach the central error path
///
/// Success values pass through unchanged.
pub fn dispatch<H, Fut, R>(handler: H) -> impl Fn(Ctx) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static
where
    H: Fn(Ctx) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, AppError>> + Send + 'static,
    R: IntoResponse,
{
    move |ctx: Ctx| {
        let handler = handler.clone();
        async move {
            let outcome = AssertUnwindSafe(async move { handler(ctx).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(value)) => value.into_response(),
                Ok(Err(error)) => error.into_response(),
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    AppError::Internal(anyhow::anyhow!("handler panicked: {message}"))
                        .into_response()
                }
            }
        }
        .boxed()
    }
}
