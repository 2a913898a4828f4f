//! Self-update endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::error::{HttpError, HttpResult};
use crate::updater::{
    self, evaluate_feed, fetch_feed, UpdateCheckOutcome, UpdateLock, UpdaterConfig,
    LOCK_STALE_AFTER_SECS,
};
use crate::AppState;
use emulsion_common::db::models::UpdateLog;
use emulsion_common::db::settings::get_setting;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/updater/status", get(status))
        .route("/updater/check", post(check))
        .route("/updater/apply", post(apply))
}

async fn updater_config(state: &AppState) -> HttpResult<UpdaterConfig> {
    let feed_url: String = get_setting(&state.db, "update.feed_url")
        .await
        .map_err(HttpError::from)?
        .unwrap_or_default();

    let install_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .ok_or_else(|| HttpError::Internal("cannot determine install dir".to_string()))?;

    Ok(UpdaterConfig {
        feed_url,
        install_dir,
    })
}

/// GET /admin/api/updater/status
async fn status(State(state): State<AppState>) -> HttpResult<Json<serde_json::Value>> {
    let last_log: Option<UpdateLog> =
        sqlx::query_as("SELECT * FROM update_logs ORDER BY id DESC LIMIT 1")
            .fetch_optional(&state.db)
            .await?;

    let locked = UpdateLock::is_locked(&state.paths.update_lock(), LOCK_STALE_AFTER_SECS);

    Ok(Json(json!({
        "ok": true,
        "version": updater::current_version().to_string(),
        "updating": locked,
        "last_update": last_log,
    })))
}

/// POST /admin/api/updater/check
async fn check(State(state): State<AppState>) -> HttpResult<Json<serde_json::Value>> {
    let config = updater_config(&state).await?;
    let feed = fetch_feed(&config.feed_url)
        .await
        .map_err(|e| HttpError::BadRequest(e.to_string()))?;

    let outcome = evaluate_feed(&updater::current_version(), &feed)
        .map_err(|e| HttpError::BadRequest(e.to_string()))?;

    let body = match outcome {
        UpdateCheckOutcome::UpToDate => json!({
            "ok": true,
            "outcome": "up_to_date",
            "version": updater::current_version().to_string(),
        }),
        UpdateCheckOutcome::UpdateAvailable { release } => json!({
            "ok": true,
            "outcome": "update_available",
            "release": { "version": release.version, "notes": release.notes },
        }),
        UpdateCheckOutcome::Gated {
            available,
            required,
        } => json!({
            "ok": true,
            "outcome": "gated",
            "available": available,
            "required": required,
        }),
    };
    Ok(Json(body))
}

/// POST /admin/api/updater/apply
async fn apply(State(state): State<AppState>) -> HttpResult<Json<serde_json::Value>> {
    let config = updater_config(&state).await?;
    let feed = fetch_feed(&config.feed_url)
        .await
        .map_err(|e| HttpError::BadRequest(e.to_string()))?;

    let release = match evaluate_feed(&updater::current_version(), &feed)
        .map_err(|e| HttpError::BadRequest(e.to_string()))?
    {
        UpdateCheckOutcome::UpdateAvailable { release } => release,
        UpdateCheckOutcome::UpToDate => {
            return Err(HttpError::Conflict("already up to date".to_string()));
        }
        UpdateCheckOutcome::Gated {
            available,
            required,
        } => {
            return Err(HttpError::Conflict(format!(
                "update to {available} requires version {required} first"
            )));
        }
    };

    let report = updater::apply_update(&state.db, &state.paths, &config, &release)
        .await
        .map_err(|e| match e {
            updater::UpdateError::Locked(holder) => {
                HttpError::Conflict(format!("update already running: {holder}"))
            }
            other => HttpError::Internal(other.to_string()),
        })?;

    state
        .hooks
        .do_action("update_applied", &json!({ "to": report.to_version }));

    Ok(Json(json!({ "ok": true, "report": report })))
}
