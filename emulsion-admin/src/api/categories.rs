//! Category tree CRUD
//!
//! Categories form a tree through `parent_id`. Reparenting is validated
//! against cycles; deleting a node re-parents its children to the
//! deleted node's parent.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{HttpError, HttpResult};
use crate::AppState;
use emulsion_common::db::models::Category;
use emulsion_common::slug::{slugify, unique_slug};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list).post(create))
        .route(
            "/categories/:id",
            axum::routing::put(update).delete(remove),
        )
}

/// GET /admin/api/categories
async fn list(State(state): State<AppState>) -> HttpResult<Json<serde_json::Value>> {
    let categories: Vec<Category> =
        sqlx::query_as("SELECT * FROM categories ORDER BY sort_order, name")
            .fetch_all(&state.db)
            .await?;
    Ok(Json(json!({ "ok": true, "categories": categories })))
}

#[derive(Debug, Deserialize)]
struct CategoryPayload {
    name: String,
    slug: Option<String>,
    parent_id: Option<String>,
    #[serde(default)]
    sort_order: i64,
}

async fn fetch_category(state: &AppState, id: &str) -> HttpResult<Category> {
    sqlx::query_as("SELECT * FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| HttpError::NotFound(format!("category {id}")))
}

/// Walk up from `start` and fail if `id` is encountered. Guards against
/// a node being made a descendant of itself.
async fn reject_cycle(state: &AppState, id: &str, start: &str) -> HttpResult<()> {
    let mut current = Some(start.to_string());
    let mut depth = 0;

    while let Some(node) = current {
        if node == id {
            return Err(HttpError::BadRequest(
                "category cannot be its own ancestor".to_string(),
            ));
        }
        depth += 1;
        if depth > 100 {
            return Err(HttpError::Internal("category tree too deep".to_string()));
        }
        current = sqlx::query_scalar("SELECT parent_id FROM categories WHERE id = ?")
            .bind(&node)
            .fetch_optional(&state.db)
            .await?
            .flatten();
    }
    Ok(())
}

/// POST /admin/api/categories
async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CategoryPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(HttpError::BadRequest("name is required".to_string()));
    }
    if let Some(parent) = &payload.parent_id {
        fetch_category(&state, parent).await?;
    }

    let candidate = slugify(payload.slug.as_deref().unwrap_or(name));
    let slug = unique_slug(&state.db, "categories", &candidate, None).await?;

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO categories (id, name, slug, parent_id, sort_order) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(&slug)
    .bind(&payload.parent_id)
    .bind(payload.sort_order)
    .execute(&state.db)
    .await?;

    let category = fetch_category(&state, &id).await?;
    Ok(Json(json!({ "ok": true, "category": category })))
}

/// PUT /admin/api/categories/:id
async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CategoryPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    let existing = fetch_category(&state, &id).await?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(HttpError::BadRequest("name is required".to_string()));
    }

    if let Some(parent) = &payload.parent_id {
        fetch_category(&state, parent).await?;
        reject_cycle(&state, &id, parent).await?;
    }

    let slug = match payload.slug.as_deref() {
        Some(requested) if !requested.trim().is_empty() => {
            let candidate = slugify(requested);
            unique_slug(&state.db, "categories", &candidate, Some(&id)).await?
        }
        _ => existing.slug.clone(),
    };

    sqlx::query(
        "UPDATE categories SET name = ?, slug = ?, parent_id = ?, sort_order = ? WHERE id = ?",
    )
    .bind(name)
    .bind(&slug)
    .bind(&payload.parent_id)
    .bind(payload.sort_order)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let category = fetch_category(&state, &id).await?;
    Ok(Json(json!({ "ok": true, "category": category })))
}

/// DELETE /admin/api/categories/:id
///
/// Children move up to the deleted node's parent; both statements run in
/// one transaction.
async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    let existing = fetch_category(&state, &id).await?;

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE categories SET parent_id = ? WHERE parent_id = ?")
        .bind(&existing.parent_id)
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(json!({ "ok": true })))
}
