//! Pre-update snapshots
//!
//! Before any file is replaced, the database is copied with
//! `VACUUM INTO` and the current application files are mirrored into a
//! timestamped backup directory. Migration failures roll back
//! transactionally; the snapshot exists for manual recovery after a
//! partial file apply or a bad release.

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use walkdir::WalkDir;

use super::{is_preserved, UpdateError};

/// Timestamped directory for one update's snapshots.
pub fn snapshot_dir(backups_root: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    backups_root.join(stamp.to_string())
}

/// Write a consistent copy of the live database into the snapshot dir.
pub async fn snapshot_database(db: &SqlitePool, backup_dir: &Path) -> Result<PathBuf, UpdateError> {
    std::fs::create_dir_all(backup_dir)?;
    let dest = backup_dir.join("emulsion.db");

    let dest_str = dest
        .to_str()
        .ok_or_else(|| UpdateError::Invalid("backup path is not valid UTF-8".to_string()))?;
    if dest_str.contains('\'') {
        return Err(UpdateError::Invalid(
            "backup path must not contain quotes".to_string(),
        ));
    }

    // VACUUM INTO produces a compact, consistent copy without blocking
    // readers
    sqlx::query(&format!("VACUUM INTO '{dest_str}'"))
        .execute(db)
        .await?;

    Ok(dest)
}

/// Mirror the install dir (minus preserved paths) into the snapshot dir.
/// Returns the number of files copied.
pub fn snapshot_app_files(
    install_dir: &Path,
    backup_dir: &Path,
    preserved: &[&str],
) -> Result<usize, UpdateError> {
    let files_dir = backup_dir.join("files");
    std::fs::create_dir_all(&files_dir)?;

    let mut copied = 0usize;
    for entry in WalkDir::new(install_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(install_dir)
            .map_err(|_| UpdateError::Invalid("walk escaped install dir".to_string()))?;
        if is_preserved(rel, preserved) {
            continue;
        }

        let dest = files_dir.join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(entry.path(), &dest)?;
        copied += 1;
    }

    Ok(copied)
}
