//! Flat taxonomy CRUD: tags, cameras, lenses, films, developers, labs, locations
//!
//! All seven tables share the (id, name) shape, so one set of handlers
//! serves them, keyed by the `:kind` path segment.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{is_unique_violation, HttpError, HttpResult};
use crate::AppState;
use emulsion_common::db::models::Taxon;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/taxonomy/:kind", get(list).post(create))
        .route("/taxonomy/:kind/:id", axum::routing::put(rename).delete(remove))
}

/// Taxonomy tables addressable through this controller.
fn table_for(kind: &str) -> Option<&'static str> {
    match kind {
        "tags" => Some("tags"),
        "cameras" => Some("cameras"),
        "lenses" => Some("lenses"),
        "films" => Some("films"),
        "developers" => Some("developers"),
        "labs" => Some("labs"),
        "locations" => Some("locations"),
        _ => None,
    }
}

fn resolve(kind: &str) -> HttpResult<&'static str> {
    table_for(kind).ok_or_else(|| HttpError::BadRequest(format!("unknown taxonomy {kind}")))
}

/// GET /admin/api/taxonomy/:kind
async fn list(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    let table = resolve(&kind)?;

    let items: Vec<Taxon> =
        sqlx::query_as(&format!("SELECT id, name FROM {table} ORDER BY name"))
            .fetch_all(&state.db)
            .await?;

    Ok(Json(json!({ "ok": true, "kind": kind, "items": items })))
}

#[derive(Debug, Deserialize)]
struct NamePayload {
    name: String,
}

/// POST /admin/api/taxonomy/:kind
async fn create(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(payload): Json<NamePayload>,
) -> HttpResult<Json<serde_json::Value>> {
    let table = resolve(&kind)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(HttpError::BadRequest("name is required".to_string()));
    }

    // Pre-check so duplicates come back as a friendly conflict
    let taken: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE name = ?"))
        .bind(name)
        .fetch_one(&state.db)
        .await?;
    if taken > 0 {
        return Err(HttpError::Conflict(format!("{kind} name already exists")));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let insert = sqlx::query(&format!("INSERT INTO {table} (id, name) VALUES (?, ?)"))
        .bind(&id)
        .bind(name)
        .execute(&state.db)
        .await;

    // The schema constraint still backstops a lost race
    if let Err(e) = insert {
        if is_unique_violation(&e) {
            return Err(HttpError::Conflict(format!("{kind} name already exists")));
        }
        return Err(e.into());
    }

    Ok(Json(json!({ "ok": true, "item": Taxon { id, name: name.to_string() } })))
}

/// PUT /admin/api/taxonomy/:kind/:id
async fn rename(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    Json(payload): Json<NamePayload>,
) -> HttpResult<Json<serde_json::Value>> {
    let table = resolve(&kind)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(HttpError::BadRequest("name is required".to_string()));
    }

    let taken: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {table} WHERE name = ? AND id != ?"
    ))
    .bind(name)
    .bind(&id)
    .fetch_one(&state.db)
    .await?;
    if taken > 0 {
        return Err(HttpError::Conflict(format!("{kind} name already exists")));
    }

    let result = sqlx::query(&format!("UPDATE {table} SET name = ? WHERE id = ?"))
        .bind(name)
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(HttpError::NotFound(format!("{kind} {id}")));
    }

    Ok(Json(json!({ "ok": true, "item": Taxon { id, name: name.to_string() } })))
}

/// DELETE /admin/api/taxonomy/:kind/:id (pivot rows cascade)
async fn remove(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> HttpResult<Json<serde_json::Value>> {
    let table = resolve(&kind)?;

    let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(HttpError::NotFound(format!("{kind} {id}")));
    }

    Ok(Json(json!({ "ok": true })))
}
