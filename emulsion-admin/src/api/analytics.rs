//! Page view counters

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{HttpError, HttpResult};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/analytics/hit", post(record_hit))
        .route("/analytics/summary", get(summary))
}

#[derive(Debug, Deserialize)]
struct HitPayload {
    path: String,
}

/// POST /admin/api/analytics/hit: one view for today's bucket
async fn record_hit(
    State(state): State<AppState>,
    Json(payload): Json<HitPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    if payload.path.trim().is_empty() {
        return Err(HttpError::BadRequest("path is required".to_string()));
    }

    let day = chrono::Utc::now().format("%Y-%m-%d").to_string();
    sqlx::query(
        "INSERT INTO analytics_page_views (day, path, views) VALUES (?, ?, 1)
         ON CONFLICT(day, path) DO UPDATE SET views = views + 1",
    )
    .bind(&day)
    .bind(payload.path.trim())
    .execute(&state.db)
    .await?;

    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct SummaryQuery {
    /// Inclusive YYYY-MM-DD bounds; open when absent
    from: Option<String>,
    to: Option<String>,
}

/// GET /admin/api/analytics/summary: total views per day
async fn summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> HttpResult<Json<serde_json::Value>> {
    let from = query.from.unwrap_or_else(|| "0000-00-00".to_string());
    let to = query.to.unwrap_or_else(|| "9999-99-99".to_string());

    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT day, SUM(views) FROM analytics_page_views
         WHERE day >= ? AND day <= ? GROUP BY day ORDER BY day",
    )
    .bind(&from)
    .bind(&to)
    .fetch_all(&state.db)
    .await?;

    let total: i64 = rows.iter().map(|(_, v)| v).sum();
    Ok(Json(json!({ "ok": true, "days": rows, "total": total })))
}
