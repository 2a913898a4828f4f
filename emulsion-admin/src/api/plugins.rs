//! Plugin management endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::error::{HttpError, HttpResult};
use crate::plugins;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plugins", get(list))
        .route("/plugins/:name/install", post(install))
        .route("/plugins/:name/activate", post(activate))
        .route("/plugins/:name/deactivate", post(deactivate))
        .route("/plugins/:name/uninstall", post(uninstall))
}

/// GET /admin/api/plugins: discovered manifests merged with their
/// persisted lifecycle state
async fn list(State(state): State<AppState>) -> HttpResult<Json<serde_json::Value>> {
    let manifests = plugins::discover(&state.paths.plugins()).map_err(HttpError::from)?;

    let mut items = Vec::with_capacity(manifests.len());
    for manifest in manifests {
        let status = plugins::state_of(&state.db, &manifest.name)
            .await
            .map_err(HttpError::from)?;
        items.push(json!({
            "name": manifest.name,
            "version": manifest.version,
            "description": manifest.description,
            "hooks": manifest.hooks,
            "state": status.map(|s| s.as_str()).unwrap_or("discovered"),
        }));
    }

    Ok(Json(json!({ "ok": true, "plugins": items })))
}

/// POST /admin/api/plugins/:name/install
async fn install(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    let manifest =
        plugins::find_manifest(&state.paths.plugins(), &name).map_err(HttpError::from)?;
    plugins::install(&state.db, &manifest)
        .await
        .map_err(HttpError::from)?;
    Ok(Json(json!({ "ok": true, "state": "installed" })))
}

/// POST /admin/api/plugins/:name/activate
async fn activate(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    let manifest =
        plugins::find_manifest(&state.paths.plugins(), &name).map_err(HttpError::from)?;
    plugins::activate(&state.db, &state.hooks, &manifest)
        .await
        .map_err(HttpError::from)?;
    Ok(Json(json!({ "ok": true, "state": "active" })))
}

/// POST /admin/api/plugins/:name/deactivate
async fn deactivate(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    plugins::deactivate(&state.db, &state.hooks, &name)
        .await
        .map_err(HttpError::from)?;
    Ok(Json(json!({ "ok": true, "state": "installed" })))
}

/// POST /admin/api/plugins/:name/uninstall
async fn uninstall(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    plugins::uninstall(&state.db, &name)
        .await
        .map_err(HttpError::from)?;
    Ok(Json(json!({ "ok": true, "state": "discovered" })))
}
