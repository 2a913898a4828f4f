//! Typed rows for the admin surface
//!
//! Timestamps are stored as unix seconds (INTEGER), ids as TEXT UUIDs.

use serde::{Deserialize, Serialize};

/// A published or draft collection of images with metadata.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub cover_image_id: Option<String>,
    pub sort_order: i64,
    pub published: bool,
    pub nsfw: bool,
    /// Argon2 hash when the album is password-protected
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub seo_keywords: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub schema_type: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub id: String,
    pub album_id: String,
    /// File name on disk under the media directory
    pub file_name: String,
    /// Name the file was uploaded with
    pub original_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub width: i64,
    pub height: i64,
    pub title: Option<String>,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub sort_order: i64,
    pub shot_at: Option<String>,
    pub aperture: Option<String>,
    pub shutter_speed: Option<String>,
    pub iso: Option<i64>,
    pub focal_length: Option<String>,
    pub camera_id: Option<String>,
    pub lens_id: Option<String>,
    pub film_id: Option<String>,
    pub created_at: i64,
}

/// A resized/alternate-format rendition of an original image file.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImageVariant {
    pub id: String,
    pub image_id: String,
    /// Size label: thumb, medium, large
    pub size: String,
    /// Output format: jpeg, webp, ...
    pub format: String,
    /// Path relative to the variants directory
    pub path: String,
    pub width: i64,
    pub height: i64,
    pub file_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<String>,
    pub sort_order: i64,
}

/// A simple named lookup row (tags, cameras, lenses, films, developers,
/// labs, locations all share this shape).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Taxon {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CustomFieldType {
    pub id: String,
    pub name: String,
    /// text | number | date
    pub field_kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CustomFieldValue {
    pub id: String,
    pub field_type_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FrontendText {
    pub lang: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Template {
    pub id: String,
    pub name: String,
    /// JSON-encoded layout configuration
    pub layout: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UpdateLog {
    pub id: i64,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub from_version: String,
    pub to_version: String,
    /// running | succeeded | failed
    pub status: String,
    pub detail: Option<String>,
}
