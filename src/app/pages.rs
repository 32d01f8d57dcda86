use axum::response::Response;
use serde_json::json;

use crate::error::AppError;
use crate::web::Ctx;

pub async fn home(ctx: Ctx) -> Result<Response, AppError> {
    ctx.render("pages.home", json!({ "title": "Home" })).await
}
