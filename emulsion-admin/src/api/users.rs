//! Admin user management

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{HttpError, HttpResult};
use crate::AppState;
use emulsion_common::auth::hash_password;
use emulsion_common::db::models::User;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list).post(create))
        .route("/users/:id", axum::routing::delete(remove))
        .route("/users/:id/password", axum::routing::put(change_password))
}

const MIN_PASSWORD_LEN: usize = 8;

/// GET /admin/api/users
async fn list(State(state): State<AppState>) -> HttpResult<Json<serde_json::Value>> {
    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY username")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(json!({ "ok": true, "users": users })))
}

#[derive(Debug, Deserialize)]
struct CreateUserPayload {
    username: String,
    password: String,
}

/// POST /admin/api/users
async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(HttpError::BadRequest("username is required".to_string()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(HttpError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(username)
        .fetch_one(&state.db)
        .await?;
    if taken > 0 {
        return Err(HttpError::Conflict("username already exists".to_string()));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(&payload.password).map_err(HttpError::from)?;

    sqlx::query("INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(username)
        .bind(&password_hash)
        .bind(chrono::Utc::now().timestamp())
        .execute(&state.db)
        .await?;

    info!("Created admin user {username}");
    Ok(Json(json!({ "ok": true, "user": { "id": id, "username": username } })))
}

#[derive(Debug, Deserialize)]
struct PasswordPayload {
    password: String,
}

/// PUT /admin/api/users/:id/password
async fn change_password(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PasswordPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(HttpError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = hash_password(&payload.password).map_err(HttpError::from)?;
    let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(HttpError::NotFound(format!("user {id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

/// DELETE /admin/api/users/:id. The last user cannot be removed.
async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await?;
    if total <= 1 {
        return Err(HttpError::Conflict(
            "cannot delete the last admin user".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(HttpError::NotFound(format!("user {id}")));
    }

    Ok(Json(json!({ "ok": true })))
}

/// Create the initial admin account when the users table is empty.
/// The generated password is logged once; it must be changed after
/// first login.
pub async fn ensure_admin_user(db: &sqlx::SqlitePool) -> emulsion_common::Result<()> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;
    if total > 0 {
        return Ok(());
    }

    let password = emulsion_common::auth::generate_token()[..16].to_string();
    let password_hash = hash_password(&password)?;

    sqlx::query("INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind("admin")
        .bind(&password_hash)
        .bind(chrono::Utc::now().timestamp())
        .execute(db)
        .await?;

    warn!("Created initial admin user 'admin' with password: {password}");
    warn!("Change this password after the first login");
    Ok(())
}
