//! Posts resource

use axum::{Json, response::Response};
use serde_json::{Map, Value, json};

use crate::data::{Direction, Row};
use crate::error::AppError;
use crate::web::Ctx;

const TABLE: &str = "posts";

/// Columns a form may write
const EDITABLE: [&str; 3] = ["title", "body", "author"];

pub async fn index(ctx: Ctx) -> Result<Response, AppError> {
    let posts = ctx
        .table(TABLE)
        .order_by("id", Direction::Desc)
        .all()
        .await?;
    let empty = posts.is_empty();

    ctx.render(
        "posts.index",
        json!({ "title": "Posts", "posts": posts, "empty": empty }),
    )
    .await
}

pub async fn show(ctx: Ctx) -> Result<Response, AppError> {
    let id = required_param(&ctx, "id")?;
    let post = ctx
        .table(TABLE)
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Post {id} not found")))?;

    let title = post
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Post")
        .to_string();
    ctx.render("posts.show", json!({ "title": title, "post": post }))
        .await
}

pub async fn store(ctx: Ctx) -> Result<Response, AppError> {
    let payload = editable_fields(&ctx.body);
    let has_title = payload
        .get("title")
        .and_then(Value::as_str)
        .is_some_and(|title| !title.trim().is_empty());
    if !has_title {
        return Err(AppError::Validation("title is required".to_string()));
    }

    let created = ctx.table(TABLE).create(&Value::Object(payload)).await?;
    let id = created.get("id").cloned().unwrap_or_default();
    tracing::info!(%id, "Post created");

    Ok(ctx.redirect("posts.index"))
}

pub async fn update(ctx: Ctx) -> Result<Response, AppError> {
    let id = required_param(&ctx, "id")?;
    let payload = editable_fields(&ctx.body);
    if payload.is_empty() {
        return Err(AppError::Validation("nothing to update".to_string()));
    }

    ctx.table(TABLE).update(id, &Value::Object(payload)).await?;
    Ok(ctx.redirect("posts.index"))
}

pub async fn destroy(ctx: Ctx) -> Result<Response, AppError> {
    let id = required_param(&ctx, "id")?;
    ctx.table(TABLE).delete(id).await?;
    Ok(ctx.redirect("posts.index"))
}

/// JSON listing; `?author=` narrows to one author
pub async fn api_index(ctx: Ctx) -> Result<Json<Vec<Row>>, AppError> {
    let table = ctx.table(TABLE);
    let rows = match ctx.query.get("author") {
        Some(author) => {
            table
                .where_eq("author", author)
                .order_by("id", Direction::Desc)
                .get()
                .await?
        }
        None => table.order_by("id", Direction::Desc).get().await?,
    };
    Ok(Json(rows))
}

fn required_param<'a>(ctx: &'a Ctx, name: &str) -> Result<&'a str, AppError> {
    ctx.param(name)
        .ok_or_else(|| AppError::Validation(format!("missing route parameter '{name}'")))
}

fn editable_fields(body: &Value) -> Map<String, Value> {
    EDITABLE
        .iter()
        .filter_map(|column| {
            body.get(*column)
                .filter(|value| !value.is_null())
                .map(|value| (column.to_string(), value.clone()))
        })
        .collect()
}
