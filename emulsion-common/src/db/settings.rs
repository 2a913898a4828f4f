//! Settings key-value store
//!
//! Site settings, SEO defaults, typography, and saved admin list filters
//! all live in the `settings` table, namespaced by key prefix
//! (`site.*`, `seo.*`, `type.*`, `filter.*`, `update.*`).

use crate::{Error, Result};
use sqlx::SqlitePool;

/// Generic setting getter. Values are stored as text and parsed on read.
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("parse setting {key} failed: {e}")))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (upsert).
pub async fn set_setting<T>(db: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;
    Ok(())
}

/// All settings under a key prefix, in key order.
pub async fn settings_with_prefix(db: &SqlitePool, prefix: &str) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT key, value FROM settings WHERE key LIKE ? || '%' ORDER BY key",
    )
    .bind(prefix)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn delete_setting(db: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(db)
        .await?;
    Ok(())
}

/// Defaults written for keys that are absent. Existing values win.
pub async fn init_default_settings(db: &SqlitePool) -> Result<()> {
    let defaults: &[(&str, &str)] = &[
        ("site.title", "Emulsion"),
        ("site.tagline", ""),
        ("site.language", "en"),
        ("seo.default_title", "Emulsion"),
        ("seo.default_description", ""),
        ("seo.robots", "index,follow"),
        ("type.font_family", "system-ui"),
        ("type.base_size_px", "16"),
        ("type.scale", "1.25"),
        ("update.feed_url", ""),
    ];

    for (key, value) in defaults {
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(db)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query("CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn get_missing_setting_is_none() {
        let pool = setup_test_db().await;
        let value: Option<String> = get_setting(&pool, "site.title").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let pool = setup_test_db().await;
        set_setting(&pool, "type.base_size_px", 18i64).await.unwrap();
        let value: Option<i64> = get_setting(&pool, "type.base_size_px").await.unwrap();
        assert_eq!(value, Some(18));
    }

    #[tokio::test]
    async fn set_is_upsert() {
        let pool = setup_test_db().await;
        set_setting(&pool, "site.title", "One").await.unwrap();
        set_setting(&pool, "site.title", "Two").await.unwrap();

        let value: Option<String> = get_setting(&pool, "site.title").await.unwrap();
        assert_eq!(value, Some("Two".to_string()));

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'site.title'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn defaults_do_not_overwrite() {
        let pool = setup_test_db().await;
        set_setting(&pool, "site.title", "My Portfolio").await.unwrap();

        init_default_settings(&pool).await.unwrap();

        let value: Option<String> = get_setting(&pool, "site.title").await.unwrap();
        assert_eq!(value, Some("My Portfolio".to_string()));

        // Absent keys were seeded
        let lang: Option<String> = get_setting(&pool, "site.language").await.unwrap();
        assert_eq!(lang, Some("en".to_string()));
    }

    #[tokio::test]
    async fn prefix_listing() {
        let pool = setup_test_db().await;
        set_setting(&pool, "seo.default_title", "t").await.unwrap();
        set_setting(&pool, "seo.robots", "noindex").await.unwrap();
        set_setting(&pool, "site.title", "x").await.unwrap();

        let seo = settings_with_prefix(&pool, "seo.").await.unwrap();
        assert_eq!(seo.len(), 2);
        assert_eq!(seo[0].0, "seo.default_title");
    }

    #[tokio::test]
    async fn parse_failure_is_config_error() {
        let pool = setup_test_db().await;
        set_setting(&pool, "type.base_size_px", "not-a-number").await.unwrap();
        let result: Result<Option<i64>> = get_setting(&pool, "type.base_size_px").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
