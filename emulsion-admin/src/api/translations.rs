//! Frontend text translations
//!
//! Key/value strings per language, JSON-importable and exportable in the
//! same flat object shape.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{HttpError, HttpResult};
use crate::AppState;
use emulsion_common::db::models::FrontendText;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/translations/:lang", get(list))
        .route("/translations/:lang/import", post(import))
        .route("/translations/:lang/export", get(export))
        .route("/translations/:lang/:key", put(upsert).delete(remove))
}

fn check_lang(lang: &str) -> HttpResult<()> {
    let valid = !lang.is_empty()
        && lang.len() <= 8
        && lang.chars().all(|c| c.is_ascii_lowercase() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(HttpError::BadRequest(format!("invalid language code {lang}")))
    }
}

/// GET /admin/api/translations/:lang
async fn list(
    State(state): State<AppState>,
    Path(lang): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    check_lang(&lang)?;
    let rows: Vec<FrontendText> =
        sqlx::query_as("SELECT lang, key, value FROM frontend_texts WHERE lang = ? ORDER BY key")
            .bind(&lang)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(json!({ "ok": true, "lang": lang, "count": rows.len(), "texts": rows })))
}

#[derive(Debug, Deserialize)]
struct ValuePayload {
    value: String,
}

/// PUT /admin/api/translations/:lang/:key
async fn upsert(
    State(state): State<AppState>,
    Path((lang, key)): Path<(String, String)>,
    Json(payload): Json<ValuePayload>,
) -> HttpResult<Json<serde_json::Value>> {
    check_lang(&lang)?;
    if key.trim().is_empty() {
        return Err(HttpError::BadRequest("key is required".to_string()));
    }

    sqlx::query(
        "INSERT INTO frontend_texts (lang, key, value) VALUES (?, ?, ?)
         ON CONFLICT(lang, key) DO UPDATE SET value = excluded.value",
    )
    .bind(&lang)
    .bind(key.trim())
    .bind(&payload.value)
    .execute(&state.db)
    .await?;

    Ok(Json(json!({ "ok": true })))
}

/// DELETE /admin/api/translations/:lang/:key
async fn remove(
    State(state): State<AppState>,
    Path((lang, key)): Path<(String, String)>,
) -> HttpResult<Json<serde_json::Value>> {
    check_lang(&lang)?;
    let result = sqlx::query("DELETE FROM frontend_texts WHERE lang = ? AND key = ?")
        .bind(&lang)
        .bind(&key)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(HttpError::NotFound(format!("translation {lang}/{key}")));
    }
    Ok(Json(json!({ "ok": true })))
}

/// POST /admin/api/translations/:lang/import
///
/// Accepts a flat JSON object of key -> value and upserts all entries in
/// one transaction.
async fn import(
    State(state): State<AppState>,
    Path(lang): Path<String>,
    Json(payload): Json<BTreeMap<String, String>>,
) -> HttpResult<Json<serde_json::Value>> {
    check_lang(&lang)?;
    if payload.is_empty() {
        return Err(HttpError::BadRequest("no translations given".to_string()));
    }

    let mut tx = state.db.begin().await?;
    for (key, value) in &payload {
        if key.trim().is_empty() {
            return Err(HttpError::BadRequest("empty translation key".to_string()));
        }
        sqlx::query(
            "INSERT INTO frontend_texts (lang, key, value) VALUES (?, ?, ?)
             ON CONFLICT(lang, key) DO UPDATE SET value = excluded.value",
        )
        .bind(&lang)
        .bind(key.trim())
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(Json(json!({ "ok": true, "imported": payload.len() })))
}

/// GET /admin/api/translations/:lang/export, the same shape import accepts
async fn export(
    State(state): State<AppState>,
    Path(lang): Path<String>,
) -> HttpResult<Json<BTreeMap<String, String>>> {
    check_lang(&lang)?;
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT key, value FROM frontend_texts WHERE lang = ? ORDER BY key")
            .bind(&lang)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(rows.into_iter().collect()))
}
