//! In-app self-update pipeline
//!
//! Downloads a release archive, snapshots the database and application
//! files, applies the file diff while preserving data paths, and runs
//! the release's SQL migrations. A lock file guards against concurrent
//! runs; every attempt is recorded in `update_logs`.

mod apply;
mod archive;
mod backup;
mod check;
mod lock;
mod migrate;

use std::path::{Component, Path, PathBuf};

use semver::Version;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

pub use apply::{plan_changes, ApplyPlan, UpdateTransaction};
pub use archive::{sha256_file, unzip_to_dir};
pub use check::{evaluate_feed, fetch_feed, MigrationStep, Release, ReleaseFeed, UpdateCheckOutcome};
pub use lock::UpdateLock;
pub use migrate::run_release_migrations;

use emulsion_common::config::Paths;

/// Lock files older than this are considered crashed and broken.
pub const LOCK_STALE_AFTER_SECS: i64 = 3600;

/// Paths inside the install dir the updater must never touch.
pub const PRESERVED_PATHS: &[&str] = &[
    "media",
    "plugins",
    "backups",
    "emulsion.db",
    "emulsion.db-wal",
    "emulsion.db-shm",
    "config.toml",
    "update.lock",
];

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Zip error: {0}")]
    Zip(String),
    #[error("Checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Another update is already running: {0}")]
    Locked(String),
    #[error("Invalid update: {0}")]
    Invalid(String),
}

/// Updater run configuration.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Release feed URL (settings key `update.feed_url`)
    pub feed_url: String,
    /// Directory holding the application files being replaced
    pub install_dir: PathBuf,
}

/// Outcome summary of a successful update run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UpdateReport {
    pub from_version: String,
    pub to_version: String,
    pub copied_files: usize,
    pub removed_files: usize,
    pub migrations_applied: u32,
    pub backup_dir: String,
}

/// The running application version.
pub fn current_version() -> Version {
    Version::parse(env!("CARGO_PKG_VERSION")).expect("CARGO_PKG_VERSION is valid semver")
}

/// Apply `release` end to end. Holds the advisory lock for the whole
/// run and records the attempt in `update_logs` whichever way it ends.
pub async fn apply_update(
    db: &SqlitePool,
    paths: &Paths,
    config: &UpdaterConfig,
    release: &Release,
) -> Result<UpdateReport, UpdateError> {
    let from_version = current_version().to_string();

    let _lock = UpdateLock::acquire(&paths.update_lock(), LOCK_STALE_AFTER_SECS)?;

    let log_id = log_start(db, &from_version, &release.version).await?;

    match run_pipeline(db, paths, config, release, &from_version).await {
        Ok(report) => {
            log_finish(db, log_id, "succeeded", None).await?;
            info!(
                "Update {} -> {} applied ({} files copied, {} removed, {} migrations)",
                report.from_version,
                report.to_version,
                report.copied_files,
                report.removed_files,
                report.migrations_applied
            );
            Ok(report)
        }
        Err(e) => {
            error!("Update to {} failed: {e}", release.version);
            log_finish(db, log_id, "failed", Some(&e.to_string())).await?;
            Err(e)
        }
    }
}

async fn run_pipeline(
    db: &SqlitePool,
    paths: &Paths,
    config: &UpdaterConfig,
    release: &Release,
    from_version: &str,
) -> Result<UpdateReport, UpdateError> {
    // 1. Download and verify before anything is touched
    let staging = tempfile::tempdir().map_err(UpdateError::Io)?;
    let archive_path = staging.path().join("release.zip");
    archive::download_to_file(&release.url, &archive_path).await?;
    archive::verify_checksum(&archive_path, &release.sha256)?;

    // 2. Snapshot database and application files
    let backup_dir = backup::snapshot_dir(&paths.backups());
    backup::snapshot_database(db, &backup_dir).await?;
    let snapshotted =
        backup::snapshot_app_files(&config.install_dir, &backup_dir, PRESERVED_PATHS)?;
    info!(
        "Snapshot written to {} ({snapshotted} files)",
        backup_dir.display()
    );

    // 3. Unpack (path-sanitized)
    let unpack_dir = staging.path().join("unpacked");
    unzip_to_dir(&archive_path, &unpack_dir)?;

    // 4. Diff against the install dir
    let plan = plan_changes(&config.install_dir, &unpack_dir, PRESERVED_PATHS)?;

    // 5. Staged commit with rollback on failure
    let mut transaction = UpdateTransaction::new();
    for rel in &plan.copy {
        transaction.stage_file(&unpack_dir.join(rel), &config.install_dir.join(rel))?;
    }
    transaction.commit()?;

    let removal_failures = apply::remove_stale(&config.install_dir, &plan.remove);
    for failure in &removal_failures {
        warn!("could not remove stale path {failure}");
    }

    // 6. Release migrations, all-or-nothing
    let migrations_applied = run_release_migrations(db, &release.migrations).await?;

    Ok(UpdateReport {
        from_version: from_version.to_string(),
        to_version: release.version.clone(),
        copied_files: plan.copy.len(),
        removed_files: plan.remove.len() - removal_failures.len(),
        migrations_applied,
        backup_dir: backup_dir.display().to_string(),
    })
}

async fn log_start(
    db: &SqlitePool,
    from_version: &str,
    to_version: &str,
) -> Result<i64, UpdateError> {
    let result = sqlx::query(
        "INSERT INTO update_logs (started_at, from_version, to_version, status)
         VALUES (?, ?, ?, 'running')",
    )
    .bind(chrono::Utc::now().timestamp())
    .bind(from_version)
    .bind(to_version)
    .execute(db)
    .await?;
    Ok(result.last_insert_rowid())
}

async fn log_finish(
    db: &SqlitePool,
    log_id: i64,
    status: &str,
    detail: Option<&str>,
) -> Result<(), UpdateError> {
    sqlx::query("UPDATE update_logs SET finished_at = ?, status = ?, detail = ? WHERE id = ?")
        .bind(chrono::Utc::now().timestamp())
        .bind(status)
        .bind(detail)
        .bind(log_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Reject absolute paths and parent-directory components in archive
/// entry names.
pub(crate) fn sanitize_relative_path(name: &str) -> Result<PathBuf, UpdateError> {
    let mut sanitized = PathBuf::new();
    let mut saw_component = false;
    for component in Path::new(name).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                sanitized.push(part);
                saw_component = true;
            }
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(UpdateError::Invalid(format!("Invalid update path: {name}")));
            }
        }
    }
    if !saw_component {
        return Err(UpdateError::Invalid(format!("Invalid update path: {name}")));
    }
    Ok(sanitized)
}

/// True when a relative path is, or is under, a preserved entry.
pub(crate) fn is_preserved(rel: &Path, preserved: &[&str]) -> bool {
    preserved
        .iter()
        .any(|p| rel == Path::new(p) || rel.starts_with(p))
}
