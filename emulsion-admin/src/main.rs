//! emulsion-admin - admin backend for the Emulsion photography CMS

use anyhow::Result;
use clap::Parser;
use time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing::info;

use emulsion_admin::{api, build_router, plugins, AppState};
use emulsion_common::config::{resolve_root_folder, Paths};
use emulsion_common::db::init_database;

#[derive(Parser, Debug)]
#[command(name = "emulsion-admin", version, about = "Emulsion CMS admin backend")]
struct Args {
    /// Root folder holding database, media, plugins and backups
    #[arg(long)]
    root_folder: Option<String>,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8700")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting Emulsion admin backend v{}",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();

    let root = resolve_root_folder(args.root_folder.as_deref(), "EMULSION_ROOT")?;
    let paths = Paths::new(root);
    paths.ensure_directories()?;
    info!("Root folder: {}", paths.root.display());

    let pool = init_database(&paths.database()).await?;

    // First run: create the initial admin account
    api::users::ensure_admin_user(&pool).await?;

    // Sessions live in their own SQLite table
    let session_store = SqliteStore::new(pool.clone());
    session_store.migrate().await?;
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(Duration::hours(12)));

    let state = AppState::new(pool.clone(), paths.clone());

    // Hooks for plugins that were active when the server last stopped
    plugins::restore_active_hooks(&pool, &state.hooks, &paths.plugins()).await?;

    let app = build_router(state).layer(session_layer);

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!("emulsion-admin listening on http://{}", args.bind);
    info!("Health check: http://{}/health", args.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
