//! Site settings, SEO defaults, typography, saved list filters
//!
//! All four families live in the settings key-value table under their
//! prefixes (`site.`, `seo.`, `type.`, `filter.`).

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{HttpError, HttpResult};
use crate::AppState;
use emulsion_common::db::settings::{delete_setting, set_setting, settings_with_prefix};

/// Prefixes the admin may touch through this controller.
const EDITABLE_PREFIXES: &[&str] = &["site.", "seo.", "type.", "filter.", "update."];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/settings", get(list).put(bulk_update))
        .route("/settings/:key", axum::routing::delete(remove))
}

fn check_key(key: &str) -> HttpResult<()> {
    if EDITABLE_PREFIXES.iter().any(|p| key.starts_with(p)) {
        Ok(())
    } else {
        Err(HttpError::BadRequest(format!(
            "setting key {key} is not editable"
        )))
    }
}

#[derive(Debug, Deserialize)]
struct SettingsQuery {
    /// Restrict the listing to one prefix, e.g. `seo.`
    prefix: Option<String>,
}

/// GET /admin/api/settings[?prefix=seo.]
async fn list(
    State(state): State<AppState>,
    Query(query): Query<SettingsQuery>,
) -> HttpResult<Json<serde_json::Value>> {
    let prefix = query.prefix.as_deref().unwrap_or("");
    let rows = settings_with_prefix(&state.db, prefix).await.map_err(HttpError::from)?;

    let map: BTreeMap<String, String> = rows.into_iter().collect();
    Ok(Json(json!({ "ok": true, "settings": map })))
}

/// PUT /admin/api/settings: bulk upsert of key/value pairs
async fn bulk_update(
    State(state): State<AppState>,
    Json(payload): Json<BTreeMap<String, String>>,
) -> HttpResult<Json<serde_json::Value>> {
    if payload.is_empty() {
        return Err(HttpError::BadRequest("no settings given".to_string()));
    }
    for key in payload.keys() {
        check_key(key)?;
    }

    for (key, value) in &payload {
        set_setting(&state.db, key, value).await.map_err(HttpError::from)?;
    }

    state
        .hooks
        .do_action("settings_updated", &json!({ "keys": payload.keys().collect::<Vec<_>>() }));

    Ok(Json(json!({ "ok": true, "updated": payload.len() })))
}

/// DELETE /admin/api/settings/:key, used for saved filters
async fn remove(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    check_key(&key)?;
    delete_setting(&state.db, &key).await.map_err(HttpError::from)?;
    Ok(Json(json!({ "ok": true })))
}
