//! Slug generation and collision handling
//!
//! Slugs are derived from titles and must stay unique per table. On
//! collision a numeric suffix is appended and incremented until a free
//! slug is found (`portfolio`, `portfolio-2`, `portfolio-3`, ...).

use crate::{Error, Result};
use sqlx::SqlitePool;

/// Tables that carry a `slug` column. Interpolating a table name into SQL
/// is only done against this list.
const SLUGGED_TABLES: &[&str] = &["albums", "categories", "tags", "locations"];

/// Lowercase a title into a URL-safe slug.
///
/// Runs of non-alphanumeric characters collapse into a single hyphen;
/// leading and trailing hyphens are trimmed. An empty result falls back
/// to "untitled".
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true;

    for c in title.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Resolve a slug against existing rows, appending a numeric suffix on
/// collision. `exclude_id` skips the row being updated so an unchanged
/// slug does not collide with itself.
pub async fn unique_slug(
    pool: &SqlitePool,
    table: &str,
    candidate: &str,
    exclude_id: Option<&str>,
) -> Result<String> {
    if !SLUGGED_TABLES.contains(&table) {
        return Err(Error::Internal(format!("not a slugged table: {table}")));
    }

    let mut slug = candidate.to_string();
    let mut suffix = 2u32;

    loop {
        let taken: i64 = match exclude_id {
            Some(id) => {
                sqlx::query_scalar(&format!(
                    "SELECT COUNT(*) FROM {table} WHERE slug = ? AND id != ?"
                ))
                .bind(&slug)
                .bind(id)
                .fetch_one(pool)
                .await?
            }
            None => {
                sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE slug = ?"))
                    .bind(&slug)
                    .fetch_one(pool)
                    .await?
            }
        };

        if taken == 0 {
            return Ok(slug);
        }

        slug = format!("{candidate}-{suffix}");
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query("CREATE TABLE albums (id TEXT PRIMARY KEY, slug TEXT NOT NULL UNIQUE)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Kodak Portra 400"), "kodak-portra-400");
        assert_eq!(slugify("  Rollei / Retro 80s  "), "rollei-retro-80s");
        assert_eq!(slugify("Ilford HP5+"), "ilford-hp5");
    }

    #[test]
    fn slugify_unicode_lowercases() {
        assert_eq!(slugify("Über Köln"), "über-köln");
    }

    #[test]
    fn slugify_empty_falls_back() {
        assert_eq!(slugify("!!!"), "untitled");
        assert_eq!(slugify(""), "untitled");
    }

    #[tokio::test]
    async fn unique_slug_no_collision() {
        let pool = setup_test_db().await;
        let slug = unique_slug(&pool, "albums", "street", None).await.unwrap();
        assert_eq!(slug, "street");
    }

    #[tokio::test]
    async fn unique_slug_appends_suffix() {
        let pool = setup_test_db().await;
        sqlx::query("INSERT INTO albums (id, slug) VALUES ('a', 'street'), ('b', 'street-2')")
            .execute(&pool)
            .await
            .unwrap();

        let slug = unique_slug(&pool, "albums", "street", None).await.unwrap();
        assert_eq!(slug, "street-3");
    }

    #[tokio::test]
    async fn unique_slug_excludes_own_row() {
        let pool = setup_test_db().await;
        sqlx::query("INSERT INTO albums (id, slug) VALUES ('a', 'street')")
            .execute(&pool)
            .await
            .unwrap();

        // Updating album 'a' with its own slug is not a collision
        let slug = unique_slug(&pool, "albums", "street", Some("a")).await.unwrap();
        assert_eq!(slug, "street");
    }

    #[tokio::test]
    async fn unique_slug_rejects_unknown_table() {
        let pool = setup_test_db().await;
        assert!(unique_slug(&pool, "users; DROP TABLE albums", "x", None)
            .await
            .is_err());
    }
}
