//! Session state: admin identity, CSRF token, flash messages
//!
//! The session is the sole authentication mechanism. It carries the
//! logged-in admin id, the CSRF token issued at login, and one-request
//! flash notices.

use axum::{extract::Request, http::Method, middleware::Next, response::Response};
use emulsion_common::auth::constant_time_eq;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::error::HttpError;

const ADMIN_ID_KEY: &str = "admin_id";
const CSRF_KEY: &str = "csrf";
const FLASH_KEY: &str = "flash";

/// Header carrying the CSRF token on mutating requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// One-request-lifetime user-facing notice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flash {
    /// success | error
    pub kind: String,
    pub message: String,
}

pub async fn admin_id(session: &Session) -> Result<Option<String>, HttpError> {
    Ok(session.get::<String>(ADMIN_ID_KEY).await?)
}

/// Log an admin in: store the id and issue a fresh CSRF token.
pub async fn log_in(session: &Session, admin_id: &str) -> Result<String, HttpError> {
    session.insert(ADMIN_ID_KEY, admin_id.to_string()).await?;
    rotate_csrf(session).await
}

pub async fn log_out(session: &Session) -> Result<(), HttpError> {
    session.flush().await?;
    Ok(())
}

pub async fn csrf_token(session: &Session) -> Result<Option<String>, HttpError> {
    Ok(session.get::<String>(CSRF_KEY).await?)
}

/// Replace the session CSRF token with a fresh one.
pub async fn rotate_csrf(session: &Session) -> Result<String, HttpError> {
    let token = emulsion_common::auth::generate_token();
    session.insert(CSRF_KEY, token.clone()).await?;
    Ok(token)
}

/// Verify a presented token against the session, in constant time.
pub async fn verify_csrf(session: &Session, presented: &str) -> Result<(), HttpError> {
    let stored = csrf_token(session)
        .await?
        .ok_or_else(|| HttpError::Forbidden("missing CSRF token".to_string()))?;

    if constant_time_eq(&stored, presented) {
        Ok(())
    } else {
        Err(HttpError::Forbidden("CSRF token mismatch".to_string()))
    }
}

pub async fn set_flash(session: &Session, kind: &str, message: &str) -> Result<(), HttpError> {
    session
        .insert(
            FLASH_KEY,
            Flash {
                kind: kind.to_string(),
                message: message.to_string(),
            },
        )
        .await?;
    Ok(())
}

/// Read and clear the pending flash notice, if any.
pub async fn take_flash(session: &Session) -> Result<Option<Flash>, HttpError> {
    Ok(session.remove::<Flash>(FLASH_KEY).await?)
}

/// Middleware: reject requests without a logged-in admin.
pub async fn require_admin(
    session: Session,
    req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    if admin_id(&session).await?.is_none() {
        return Err(HttpError::Unauthorized);
    }
    Ok(next.run(req).await)
}

/// Middleware: mutating requests must present the session CSRF token.
pub async fn csrf_guard(session: Session, req: Request, next: Next) -> Result<Response, HttpError> {
    let mutating = !matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS);

    if mutating {
        let presented = req
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| HttpError::Forbidden("missing CSRF token".to_string()))?
            .to_string();
        verify_csrf(&session, &presented).await?;
    }

    Ok(next.run(req).await)
}
