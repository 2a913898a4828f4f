//! Database schema migrations
//!
//! Versioned migrations upgrade databases created by older releases in
//! place. The schema in `init.rs` always describes the current state;
//! migrations exist for columns and tables that were added after a
//! database may already have been created.
//!
//! Guidelines:
//! 1. Never modify an existing migration once released
//! 2. Add a new migration function for each schema change
//! 3. Keep migrations idempotent (check before ALTER)

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version. Increment when adding a migration.
const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    if current_version < 3 {
        migrate_v3(pool).await?;
        set_schema_version(pool, 3).await?;
        info!("Migration v3 completed");
    }

    Ok(())
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM pragma_table_info('{table}') WHERE name = ?"
    ))
    .bind(column)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

async fn add_column_idempotent(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    decl: &str,
) -> Result<()> {
    if !table_exists(pool, table).await? {
        return Ok(());
    }
    if column_exists(pool, table, column).await? {
        return Ok(());
    }

    match sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))
        .execute(pool)
        .await
    {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            // Another connection beat us to it
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Migration v1: albums gained the `nsfw` flag after initial release.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    add_column_idempotent(pool, "albums", "nsfw", "INTEGER NOT NULL DEFAULT 0").await
}

/// Migration v2: optional album passwords.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    add_column_idempotent(pool, "albums", "password_hash", "TEXT").await
}

/// Migration v3: schema.org type plus Open Graph image override.
async fn migrate_v3(pool: &SqlitePool) -> Result<()> {
    add_column_idempotent(pool, "albums", "schema_type", "TEXT").await?;
    add_column_idempotent(pool, "albums", "og_image", "TEXT").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn schema_version_defaults_to_zero() {
        let pool = setup_test_db().await;
        assert_eq!(get_schema_version(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_and_get_schema_version() {
        let pool = setup_test_db().await;
        sqlx::query(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
        )
        .execute(&pool)
        .await
        .unwrap();

        set_schema_version(&pool, 2).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn migrate_v1_adds_nsfw_to_old_albums_table() {
        let pool = setup_test_db().await;

        // An albums table from before the nsfw flag existed
        sqlx::query(
            r#"
            CREATE TABLE albums (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        migrate_v1(&pool).await.unwrap();
        assert!(column_exists(&pool, "albums", "nsfw").await.unwrap());

        // Idempotent
        migrate_v1(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn migrations_skip_missing_tables() {
        let pool = setup_test_db().await;
        // No albums table at all: migrations must not fail
        migrate_v1(&pool).await.unwrap();
        migrate_v2(&pool).await.unwrap();
        migrate_v3(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn run_migrations_complete_flow() {
        let pool = setup_test_db().await;
        sqlx::query(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE albums (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        run_migrations(&pool).await.unwrap();

        assert_eq!(
            get_schema_version(&pool).await.unwrap(),
            CURRENT_SCHEMA_VERSION
        );
        assert!(column_exists(&pool, "albums", "password_hash").await.unwrap());
        assert!(column_exists(&pool, "albums", "schema_type").await.unwrap());
    }
}
