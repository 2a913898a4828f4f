//! Database initialization
//!
//! Creates the connection pool, applies pragmas, creates any missing
//! tables, runs versioned migrations, and seeds default settings. Safe to
//! call on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_pragmas(&pool).await?;
    create_all_tables(&pool).await?;

    // Versioned migrations for databases created by older releases
    crate::db::migrations::run_migrations(&pool).await?;

    // Seed defaults for settings keys that are absent
    crate::db::settings::init_default_settings(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema, for tests.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    configure_pragmas(&pool).await?;
    create_all_tables(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;
    crate::db::settings::init_default_settings(&pool).await?;
    Ok(pool)
}

async fn configure_pragmas(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers while one request writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_users_table(pool).await?;

    create_categories_table(pool).await?;
    create_taxonomy_tables(pool).await?;

    create_albums_table(pool).await?;
    create_images_table(pool).await?;
    create_image_variants_table(pool).await?;
    create_pivot_tables(pool).await?;

    create_custom_field_tables(pool).await?;
    create_frontend_texts_table(pool).await?;
    create_templates_table(pool).await?;

    create_plugin_status_table(pool).await?;
    create_analytics_tables(pool).await?;
    create_update_logs_table(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_categories_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            parent_id TEXT REFERENCES categories(id) ON DELETE SET NULL,
            sort_order INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Flat name lookups: tags plus the equipment taxonomies.
async fn create_taxonomy_tables(pool: &SqlitePool) -> Result<()> {
    for table in ["tags", "cameras", "lenses", "films", "developers", "labs", "locations"] {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            )
            "#
        ))
        .execute(pool)
        .await?;
    }
    Ok(())
}

async fn create_albums_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            category_id TEXT REFERENCES categories(id) ON DELETE SET NULL,
            cover_image_id TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            published INTEGER NOT NULL DEFAULT 0,
            nsfw INTEGER NOT NULL DEFAULT 0,
            password_hash TEXT,
            seo_title TEXT,
            seo_description TEXT,
            seo_keywords TEXT,
            og_title TEXT,
            og_description TEXT,
            og_image TEXT,
            schema_type TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_albums_category ON albums(category_id)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            id TEXT PRIMARY KEY,
            album_id TEXT NOT NULL REFERENCES albums(id) ON DELETE CASCADE,
            file_name TEXT NOT NULL,
            original_name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            width INTEGER NOT NULL DEFAULT 0,
            height INTEGER NOT NULL DEFAULT 0,
            title TEXT,
            alt_text TEXT,
            caption TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            shot_at TEXT,
            aperture TEXT,
            shutter_speed TEXT,
            iso INTEGER,
            focal_length TEXT,
            camera_id TEXT REFERENCES cameras(id) ON DELETE SET NULL,
            lens_id TEXT REFERENCES lenses(id) ON DELETE SET NULL,
            film_id TEXT REFERENCES films(id) ON DELETE SET NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_album ON images(album_id)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_image_variants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS image_variants (
            id TEXT PRIMARY KEY,
            image_id TEXT NOT NULL REFERENCES images(id) ON DELETE CASCADE,
            size TEXT NOT NULL,
            format TEXT NOT NULL,
            path TEXT NOT NULL,
            width INTEGER NOT NULL,
            height INTEGER NOT NULL,
            file_size INTEGER NOT NULL,
            UNIQUE(image_id, size, format)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Many-to-many album links: tags, extra categories, and equipment.
async fn create_pivot_tables(pool: &SqlitePool) -> Result<()> {
    let pivots = [
        ("album_tag", "tag_id", "tags"),
        ("album_category", "category_id", "categories"),
        ("album_camera", "camera_id", "cameras"),
        ("album_lens", "lens_id", "lenses"),
        ("album_film", "film_id", "films"),
        ("album_developer", "developer_id", "developers"),
        ("album_lab", "lab_id", "labs"),
        ("album_location", "location_id", "locations"),
    ];

    for (pivot, column, target) in pivots {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {pivot} (
                album_id TEXT NOT NULL REFERENCES albums(id) ON DELETE CASCADE,
                {column} TEXT NOT NULL REFERENCES {target}(id) ON DELETE CASCADE,
                PRIMARY KEY (album_id, {column})
            )
            "#
        ))
        .execute(pool)
        .await?;
    }
    Ok(())
}

async fn create_custom_field_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS custom_field_types (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            field_kind TEXT NOT NULL DEFAULT 'text'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS custom_field_values (
            id TEXT PRIMARY KEY,
            field_type_id TEXT NOT NULL REFERENCES custom_field_types(id) ON DELETE CASCADE,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            value TEXT NOT NULL,
            UNIQUE(field_type_id, entity_type, entity_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_frontend_texts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS frontend_texts (
            lang TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (lang, key)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_templates_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            layout TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_plugin_status_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plugin_status (
            name TEXT PRIMARY KEY,
            version TEXT NOT NULL,
            state TEXT NOT NULL,
            installed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_analytics_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analytics_page_views (
            day TEXT NOT NULL,
            path TEXT NOT NULL,
            views INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (day, path)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_update_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS update_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at INTEGER NOT NULL,
            finished_at INTEGER,
            from_version TEXT NOT NULL,
            to_version TEXT NOT NULL,
            status TEXT NOT NULL,
            detail TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_database_has_full_schema() {
        let pool = init_memory_database().await.unwrap();

        for table in [
            "settings",
            "users",
            "albums",
            "images",
            "image_variants",
            "categories",
            "tags",
            "cameras",
            "lenses",
            "films",
            "developers",
            "labs",
            "locations",
            "album_tag",
            "album_film",
            "custom_field_types",
            "custom_field_values",
            "frontend_texts",
            "templates",
            "plugin_status",
            "analytics_page_views",
            "update_logs",
            "schema_version",
        ] {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert!(exists, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn image_delete_cascades_variants() {
        let pool = init_memory_database().await.unwrap();

        sqlx::query(
            "INSERT INTO albums (id, title, slug, created_at, updated_at)
             VALUES ('al', 'A', 'a', 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO images (id, album_id, file_name, original_name, mime_type, file_size, created_at)
             VALUES ('im', 'al', 'f.jpg', 'f.jpg', 'image/jpeg', 10, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO image_variants (id, image_id, size, format, path, width, height, file_size)
             VALUES ('v', 'im', 'thumb', 'jpeg', 'v.jpg', 10, 10, 5)",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query("DELETE FROM images WHERE id = 'im'")
            .execute(&pool)
            .await
            .unwrap();

        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM image_variants")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(left, 0);
    }
}
