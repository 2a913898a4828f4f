//! Login, logout, and session introspection
//!
//! Login is the form-flavored corner of the admin: failures set a flash
//! notice and redirect back to the form; success redirects into the
//! admin. Everything behind the session speaks JSON.

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tracing::info;

use crate::error::{HttpError, HttpResult};
use crate::session;
use crate::AppState;
use emulsion_common::auth::verify_password;
use emulsion_common::db::models::User;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin", get(dashboard))
        .route("/admin/login", get(login_form).post(login))
        .route("/admin/logout", post(logout))
        .route("/admin/me", get(me))
}

const DASHBOARD_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Emulsion Admin</title></head>
<body>
  <h1>Emulsion Admin</h1>
  <!-- flash -->
  <p>The admin UI talks to <code>/admin/api/*</code>.</p>
</body>
</html>
"#;

/// GET /admin: shell page for the admin UI
async fn dashboard(session: Session) -> HttpResult<impl IntoResponse> {
    if session::admin_id(&session).await?.is_none() {
        return Ok(Redirect::to("/admin/login").into_response());
    }

    let page = match session::take_flash(&session).await? {
        Some(flash) => DASHBOARD_PAGE.replace(
            "<!-- flash -->",
            &format!(
                "<p class=\"flash {}\">{}</p>",
                flash.kind,
                html_escape(&flash.message)
            ),
        ),
        None => DASHBOARD_PAGE.to_string(),
    };
    Ok(Html(page).into_response())
}

const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Emulsion Admin</title></head>
<body>
  <h1>Emulsion Admin</h1>
  <!-- flash -->
  <form method="post" action="/admin/login">
    <label>Username <input name="username" autofocus></label>
    <label>Password <input name="password" type="password"></label>
    <button type="submit">Sign in</button>
  </form>
</body>
</html>
"#;

/// GET /admin/login
async fn login_form(session: Session) -> HttpResult<Html<String>> {
    let page = match session::take_flash(&session).await? {
        Some(flash) => LOGIN_PAGE.replace(
            "<!-- flash -->",
            &format!(
                "<p class=\"flash {}\">{}</p>",
                flash.kind,
                html_escape(&flash.message)
            ),
        ),
        None => LOGIN_PAGE.to_string(),
    };
    Ok(Html(page))
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

/// POST /admin/login
async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> HttpResult<impl IntoResponse> {
    if form.username.trim().is_empty() || form.password.is_empty() {
        session::set_flash(&session, "error", "Username and password are required").await?;
        return Ok(Redirect::to("/admin/login"));
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
        .bind(form.username.trim())
        .fetch_optional(&state.db)
        .await?;

    let Some(user) = user else {
        session::set_flash(&session, "error", "Invalid username or password").await?;
        return Ok(Redirect::to("/admin/login"));
    };

    if !verify_password(&form.password, &user.password_hash)? {
        session::set_flash(&session, "error", "Invalid username or password").await?;
        return Ok(Redirect::to("/admin/login"));
    }

    session::log_in(&session, &user.id).await?;
    session::set_flash(&session, "success", "Welcome back").await?;
    info!("Admin login: {}", user.username);

    Ok(Redirect::to("/admin"))
}

/// POST /admin/logout. The CSRF middleware does not cover this route, so
/// the token is verified by hand.
async fn logout(session: Session, headers: axum::http::HeaderMap) -> HttpResult<impl IntoResponse> {
    if session::admin_id(&session).await?.is_none() {
        return Err(HttpError::Unauthorized);
    }

    let presented = headers
        .get(session::CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| HttpError::Forbidden("missing CSRF token".to_string()))?;
    session::verify_csrf(&session, presented).await?;

    session::log_out(&session).await?;
    Ok(Redirect::to("/admin/login"))
}

/// GET /admin/me: current admin plus the CSRF token the UI must
/// echo on mutations. Reachable without the admin middleware so the UI
/// can probe logged-in state.
async fn me(State(state): State<AppState>, session: Session) -> HttpResult<Json<serde_json::Value>> {
    let Some(admin_id) = session::admin_id(&session).await? else {
        return Err(HttpError::Unauthorized);
    };

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&admin_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(HttpError::Unauthorized)?;

    let csrf = match session::csrf_token(&session).await? {
        Some(token) => token,
        None => session::rotate_csrf(&session).await?,
    };

    let flash = session::take_flash(&session).await?;

    Ok(Json(json!({
        "ok": true,
        "user": { "id": user.id, "username": user.username },
        "csrf": csrf,
        "flash": flash,
    })))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_neutralizes_markup() {
        assert_eq!(html_escape("<b>&\"x\""), "&lt;b&gt;&amp;&quot;x&quot;");
    }
}
