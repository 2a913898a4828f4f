//! emulsion-admin library - admin backend for the Emulsion photography CMS
//!
//! Server-rendered-CRUD style admin surface: session login, CSRF-guarded
//! mutations, JSON endpoints for the admin UI, plugin hook registry, and
//! the in-app self-updater.

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use emulsion_common::config::Paths;
use sqlx::SqlitePool;

use crate::hooks::HookRegistry;

pub mod api;
pub mod error;
pub mod hooks;
pub mod media;
pub mod pagination;
pub mod plugins;
pub mod session;
pub mod updater;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Filesystem layout under the root folder
    pub paths: Arc<Paths>,
    /// Action/filter registry populated by active plugins
    pub hooks: Arc<HookRegistry>,
}

impl AppState {
    pub fn new(db: SqlitePool, paths: Paths) -> Self {
        Self {
            db,
            paths: Arc::new(paths),
            hooks: Arc::new(HookRegistry::new()),
        }
    }
}

/// Build the application router.
///
/// `/health` and the login routes are public; everything else requires an
/// authenticated admin session, and mutating requests must carry the
/// session CSRF token.
pub fn build_router(state: AppState) -> Router {
    let admin_api = Router::new()
        .merge(api::albums::router())
        .merge(api::images::router())
        .merge(api::taxonomy::router())
        .merge(api::categories::router())
        .merge(api::settings::router())
        .merge(api::translations::router())
        .merge(api::templates::router())
        .merge(api::custom_fields::router())
        .merge(api::users::router())
        .merge(api::plugins::router())
        .merge(api::updater::router())
        .merge(api::analytics::router())
        .route_layer(middleware::from_fn(session::csrf_guard))
        .route_layer(middleware::from_fn(session::require_admin));

    Router::new()
        .route("/health", get(api::health::health))
        .merge(api::auth::router())
        .nest("/admin/api", admin_api)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(100 * 1024 * 1024))
        .with_state(state)
}
