//! Release-shipped SQL migrations
//!
//! A release carries numbered migration steps. Steps at or below the
//! database's current schema version are skipped; the rest run inside a
//! single transaction together with their schema_version bookkeeping, so
//! a failing statement leaves the schema untouched.

use sqlx::SqlitePool;
use tracing::info;

use super::{check::MigrationStep, UpdateError};
use emulsion_common::db::migrations::get_schema_version;

/// Run pending release migrations. Returns how many steps were applied.
pub async fn run_release_migrations(
    db: &SqlitePool,
    steps: &[MigrationStep],
) -> Result<u32, UpdateError> {
    if steps.is_empty() {
        return Ok(0);
    }

    let current = get_schema_version(db)
        .await
        .map_err(|e| UpdateError::Invalid(format!("cannot read schema version: {e}")))?;

    let mut pending: Vec<&MigrationStep> =
        steps.iter().filter(|s| s.version > current).collect();
    pending.sort_by_key(|s| s.version);

    if pending.is_empty() {
        return Ok(0);
    }

    // Consecutive versions only; a gap means the feed is broken
    let mut expected = current;
    for step in &pending {
        expected += 1;
        if step.version != expected {
            return Err(UpdateError::Invalid(format!(
                "migration versions must be consecutive: expected v{expected}, got v{}",
                step.version
            )));
        }
    }

    let mut tx = db.begin().await?;
    let mut applied = 0u32;

    for step in &pending {
        sqlx::query(&step.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| UpdateError::Invalid(format!("migration v{} failed: {e}", step.version)))?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(step.version)
            .execute(&mut *tx)
            .await?;
        applied += 1;
    }

    tx.commit().await?;
    info!("Applied {applied} release migrations (schema now v{})", expected);
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emulsion_common::db::init::init_memory_database;

    fn step(version: i32, sql: &str) -> MigrationStep {
        MigrationStep {
            version,
            sql: sql.to_string(),
        }
    }

    #[tokio::test]
    async fn applies_pending_steps_in_order() {
        let db = init_memory_database().await.unwrap();
        let current = get_schema_version(&db).await.unwrap();

        let steps = vec![
            step(current + 2, "CREATE TABLE release_b (id INTEGER PRIMARY KEY)"),
            step(current + 1, "CREATE TABLE release_a (id INTEGER PRIMARY KEY)"),
        ];

        let applied = run_release_migrations(&db, &steps).await.unwrap();
        assert_eq!(applied, 2);
        assert_eq!(get_schema_version(&db).await.unwrap(), current + 2);

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='release_a')",
        )
        .fetch_one(&db)
        .await
        .unwrap();
        assert!(exists);
    }

    #[tokio::test]
    async fn already_applied_steps_skip() {
        let db = init_memory_database().await.unwrap();
        let current = get_schema_version(&db).await.unwrap();

        let steps = vec![step(current, "SELECT 1"), step(current - 1, "SELECT 1")];
        let applied = run_release_migrations(&db, &steps).await.unwrap();
        assert_eq!(applied, 0);
    }

    #[tokio::test]
    async fn failure_rolls_back_schema_version() {
        let db = init_memory_database().await.unwrap();
        let current = get_schema_version(&db).await.unwrap();

        let steps = vec![
            step(current + 1, "CREATE TABLE release_ok (id INTEGER PRIMARY KEY)"),
            step(current + 2, "THIS IS NOT SQL"),
        ];

        let err = run_release_migrations(&db, &steps).await.unwrap_err();
        assert!(matches!(err, UpdateError::Invalid(_)));

        // Nothing committed: version unchanged, first table absent
        assert_eq!(get_schema_version(&db).await.unwrap(), current);
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='release_ok')",
        )
        .fetch_one(&db)
        .await
        .unwrap();
        assert!(!exists);
    }

    #[tokio::test]
    async fn version_gap_is_rejected() {
        let db = init_memory_database().await.unwrap();
        let current = get_schema_version(&db).await.unwrap();

        let steps = vec![step(current + 2, "SELECT 1")];
        let err = run_release_migrations(&db, &steps).await.unwrap_err();
        assert!(err.to_string().contains("consecutive"));
    }
}
