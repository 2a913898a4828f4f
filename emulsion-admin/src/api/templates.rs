//! Template layout CRUD
//!
//! A template is a named, JSON-encoded layout configuration. Payloads
//! must parse as JSON and are stored in canonical serialization. The
//! listing degrades to empty when the table is missing (databases from
//! before templates existed).

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{is_missing_table, HttpError, HttpResult};
use crate::AppState;
use emulsion_common::db::models::Template;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/templates", get(list).post(create))
        .route(
            "/templates/:id",
            get(get_one).put(update).delete(remove),
        )
}

/// GET /admin/api/templates
async fn list(State(state): State<AppState>) -> HttpResult<Json<serde_json::Value>> {
    let templates: Vec<Template> =
        match sqlx::query_as("SELECT * FROM templates ORDER BY name")
            .fetch_all(&state.db)
            .await
        {
            Ok(rows) => rows,
            Err(e) if is_missing_table(&e) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

    Ok(Json(json!({ "ok": true, "templates": templates })))
}

#[derive(Debug, Deserialize)]
struct TemplatePayload {
    name: String,
    layout: serde_json::Value,
}

fn canonical_layout(payload: &TemplatePayload) -> HttpResult<String> {
    if payload.name.trim().is_empty() {
        return Err(HttpError::BadRequest("name is required".to_string()));
    }
    if !payload.layout.is_object() && !payload.layout.is_array() {
        return Err(HttpError::BadRequest(
            "layout must be a JSON object or array".to_string(),
        ));
    }
    serde_json::to_string(&payload.layout)
        .map_err(|e| HttpError::Internal(format!("layout serialization failed: {e}")))
}

/// POST /admin/api/templates
async fn create(
    State(state): State<AppState>,
    Json(payload): Json<TemplatePayload>,
) -> HttpResult<Json<serde_json::Value>> {
    let layout = canonical_layout(&payload)?;

    let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM templates WHERE name = ?")
        .bind(payload.name.trim())
        .fetch_one(&state.db)
        .await?;
    if taken > 0 {
        return Err(HttpError::Conflict("template name already exists".to_string()));
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO templates (id, name, layout, updated_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(payload.name.trim())
        .bind(&layout)
        .bind(chrono::Utc::now().timestamp())
        .execute(&state.db)
        .await?;

    let template = fetch(&state, &id).await?;
    Ok(Json(json!({ "ok": true, "template": template })))
}

async fn fetch(state: &AppState, id: &str) -> HttpResult<Template> {
    sqlx::query_as("SELECT * FROM templates WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| HttpError::NotFound(format!("template {id}")))
}

/// GET /admin/api/templates/:id
async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    let template = fetch(&state, &id).await?;
    let layout: serde_json::Value = serde_json::from_str(&template.layout)
        .map_err(|e| HttpError::Internal(format!("stored layout is corrupt: {e}")))?;

    Ok(Json(json!({
        "ok": true,
        "template": { "id": template.id, "name": template.name, "layout": layout, "updated_at": template.updated_at },
    })))
}

/// PUT /admin/api/templates/:id
async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<TemplatePayload>,
) -> HttpResult<Json<serde_json::Value>> {
    fetch(&state, &id).await?;
    let layout = canonical_layout(&payload)?;

    let taken: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM templates WHERE name = ? AND id != ?")
            .bind(payload.name.trim())
            .bind(&id)
            .fetch_one(&state.db)
            .await?;
    if taken > 0 {
        return Err(HttpError::Conflict("template name already exists".to_string()));
    }

    sqlx::query("UPDATE templates SET name = ?, layout = ?, updated_at = ? WHERE id = ?")
        .bind(payload.name.trim())
        .bind(&layout)
        .bind(chrono::Utc::now().timestamp())
        .bind(&id)
        .execute(&state.db)
        .await?;

    let template = fetch(&state, &id).await?;
    Ok(Json(json!({ "ok": true, "template": template })))
}

/// DELETE /admin/api/templates/:id
async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM templates WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(HttpError::NotFound(format!("template {id}")));
    }
    Ok(Json(json!({ "ok": true })))
}
