//! Image upload, variants, inline metadata edits, reordering

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::task;

use crate::error::{HttpError, HttpResult};
use crate::media;
use crate::AppState;
use emulsion_common::db::models::{Image, ImageVariant};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/albums/:id/images", get(list_images).post(upload_image))
        .route("/albums/:id/images/reorder", post(reorder_images))
        .route("/images/:id", put(update_image).delete(delete_image))
        .route(
            "/images/:id/variants",
            get(list_variants).post(regenerate_variants),
        )
}

async fn fetch_image(state: &AppState, id: &str) -> HttpResult<Image> {
    sqlx::query_as("SELECT * FROM images WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| HttpError::NotFound(format!("image {id}")))
}

async fn album_exists(state: &AppState, id: &str) -> HttpResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM albums WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if count == 0 {
        return Err(HttpError::NotFound(format!("album {id}")));
    }
    Ok(())
}

/// GET /admin/api/albums/:id/images
async fn list_images(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    album_exists(&state, &album_id).await?;

    let images: Vec<Image> =
        sqlx::query_as("SELECT * FROM images WHERE album_id = ? ORDER BY sort_order, created_at")
            .bind(&album_id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(json!({ "ok": true, "images": images })))
}

/// POST /admin/api/albums/:id/images (multipart)
///
/// The upload's bytes are sniffed before anything is written; extension
/// and client MIME are ignored. On a DB failure the file written to the
/// media directory is removed again.
async fn upload_image(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
    mut multipart: Multipart,
) -> HttpResult<Json<serde_json::Value>> {
    album_exists(&state, &album_id).await?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::BadRequest(format!("invalid multipart body: {e}")))?
        .ok_or_else(|| HttpError::BadRequest("multipart body is empty".to_string()))?;

    let original_name = field
        .file_name()
        .or(field.name())
        .unwrap_or("upload")
        .to_string();

    let bytes = field
        .bytes()
        .await
        .map_err(|e| HttpError::BadRequest(format!("upload read failed: {e}")))?;

    if bytes.is_empty() {
        return Err(HttpError::BadRequest("uploaded file is empty".to_string()));
    }

    let sniffed = media::sniff_image(&bytes).map_err(HttpError::from)?;

    let id = uuid::Uuid::new_v4().to_string();
    let file_name = format!("{id}.{}", sniffed.extension);
    let album_dir = media::album_dir(&state.paths.media(), &album_id);
    tokio::fs::create_dir_all(&album_dir).await?;

    let file_path = album_dir.join(&file_name);
    tokio::fs::write(&file_path, &bytes).await?;

    let dimensions = {
        let path = file_path.clone();
        task::spawn_blocking(move || media::read_dimensions(&path))
            .await
            .map_err(|e| HttpError::Internal(format!("dimension probe panicked: {e}")))?
    };
    let (width, height) = match dimensions {
        Ok(dims) => dims,
        Err(e) => {
            let _ = tokio::fs::remove_file(&file_path).await;
            return Err(e.into());
        }
    };

    let now = chrono::Utc::now().timestamp();
    let insert = sqlx::query(
        r#"
        INSERT INTO images (
            id, album_id, file_name, original_name, mime_type, file_size,
            width, height, sort_order, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?,
                  (SELECT COALESCE(MAX(sort_order) + 1, 0) FROM images WHERE album_id = ?), ?)
        "#,
    )
    .bind(&id)
    .bind(&album_id)
    .bind(&file_name)
    .bind(&original_name)
    .bind(sniffed.mime)
    .bind(bytes.len() as i64)
    .bind(width)
    .bind(height)
    .bind(&album_id)
    .bind(now)
    .execute(&state.db)
    .await;

    if let Err(e) = insert {
        // Insertion failed: remove the file again
        let _ = tokio::fs::remove_file(&file_path).await;
        return Err(e.into());
    }

    // Variants are generated eagerly on upload
    let variants = generate_and_store_variants(&state, &id, &file_path).await?;

    let image = fetch_image(&state, &id).await?;
    state
        .hooks
        .do_action("image_uploaded", &json!({ "id": id, "album_id": album_id }));

    Ok(Json(json!({ "ok": true, "image": image, "variants": variants })))
}

async fn generate_and_store_variants(
    state: &AppState,
    image_id: &str,
    original: &std::path::Path,
) -> HttpResult<Vec<ImageVariant>> {
    let variants_dir = state.paths.variants();
    let original = original.to_path_buf();
    let id = image_id.to_string();

    let generated = task::spawn_blocking(move || {
        media::generate_variants(&original, &variants_dir, &id)
    })
    .await
    .map_err(|e| HttpError::Internal(format!("variant generation panicked: {e}")))??;

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM image_variants WHERE image_id = ?")
        .bind(image_id)
        .execute(&mut *tx)
        .await?;

    for v in &generated {
        sqlx::query(
            r#"
            INSERT INTO image_variants (id, image_id, size, format, path, width, height, file_size)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(image_id)
        .bind(&v.size)
        .bind(&v.format)
        .bind(&v.path)
        .bind(v.width)
        .bind(v.height)
        .bind(v.file_size)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let variants: Vec<ImageVariant> =
        sqlx::query_as("SELECT * FROM image_variants WHERE image_id = ? ORDER BY size, format")
            .bind(image_id)
            .fetch_all(&state.db)
            .await?;
    Ok(variants)
}

#[derive(Debug, Deserialize)]
struct ImageMetadata {
    title: Option<String>,
    alt_text: Option<String>,
    caption: Option<String>,
    shot_at: Option<String>,
    aperture: Option<String>,
    shutter_speed: Option<String>,
    iso: Option<i64>,
    focal_length: Option<String>,
    camera_id: Option<String>,
    lens_id: Option<String>,
    film_id: Option<String>,
}

async fn equipment_exists(state: &AppState, table: &str, id: &str) -> HttpResult<()> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE id = ?"))
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if count == 0 {
        return Err(HttpError::BadRequest(format!("unknown {table} id {id}")));
    }
    Ok(())
}

/// PUT /admin/api/images/:id (inline metadata edit)
async fn update_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ImageMetadata>,
) -> HttpResult<Json<serde_json::Value>> {
    fetch_image(&state, &id).await?;

    for (table, value) in [
        ("cameras", &payload.camera_id),
        ("lenses", &payload.lens_id),
        ("films", &payload.film_id),
    ] {
        if let Some(equipment_id) = value {
            equipment_exists(&state, table, equipment_id).await?;
        }
    }

    sqlx::query(
        r#"
        UPDATE images SET
            title = ?, alt_text = ?, caption = ?, shot_at = ?,
            aperture = ?, shutter_speed = ?, iso = ?, focal_length = ?,
            camera_id = ?, lens_id = ?, film_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.alt_text)
    .bind(&payload.caption)
    .bind(&payload.shot_at)
    .bind(&payload.aperture)
    .bind(&payload.shutter_speed)
    .bind(payload.iso)
    .bind(&payload.focal_length)
    .bind(&payload.camera_id)
    .bind(&payload.lens_id)
    .bind(&payload.film_id)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let image = fetch_image(&state, &id).await?;
    Ok(Json(json!({ "ok": true, "image": image })))
}

#[derive(Debug, Deserialize)]
struct ReorderPayload {
    ids: Vec<String>,
}

/// POST /admin/api/albums/:id/images/reorder
async fn reorder_images(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
    Json(payload): Json<ReorderPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    album_exists(&state, &album_id).await?;
    if payload.ids.is_empty() {
        return Err(HttpError::BadRequest("ids must not be empty".to_string()));
    }

    let mut tx = state.db.begin().await?;
    for (position, id) in payload.ids.iter().enumerate() {
        let result =
            sqlx::query("UPDATE images SET sort_order = ? WHERE id = ? AND album_id = ?")
                .bind(position as i64)
                .bind(id)
                .bind(&album_id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(HttpError::BadRequest(format!(
                "image {id} is not in album {album_id}"
            )));
        }
    }
    tx.commit().await?;

    Ok(Json(json!({ "ok": true })))
}

/// GET /admin/api/images/:id/variants
async fn list_variants(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    fetch_image(&state, &id).await?;

    let variants: Vec<ImageVariant> =
        sqlx::query_as("SELECT * FROM image_variants WHERE image_id = ? ORDER BY size, format")
            .bind(&id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(json!({ "ok": true, "variants": variants })))
}

/// POST /admin/api/images/:id/variants: regenerate from the original
async fn regenerate_variants(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    let image = fetch_image(&state, &id).await?;

    let original = media::album_dir(&state.paths.media(), &image.album_id).join(&image.file_name);
    if !original.is_file() {
        return Err(HttpError::NotFound(format!(
            "original file for image {id} is missing"
        )));
    }

    let variants = generate_and_store_variants(&state, &id, &original).await?;
    Ok(Json(json!({ "ok": true, "variants": variants })))
}

/// DELETE /admin/api/images/:id
async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    let image = fetch_image(&state, &id).await?;

    let variant_files: Vec<(String,)> =
        sqlx::query_as("SELECT path FROM image_variants WHERE image_id = ?")
            .bind(&id)
            .fetch_all(&state.db)
            .await?;

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM images WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    // Clear a dangling cover reference
    sqlx::query("UPDATE albums SET cover_image_id = NULL WHERE cover_image_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let original = media::album_dir(&state.paths.media(), &image.album_id).join(&image.file_name);
    if let Err(e) = std::fs::remove_file(&original) {
        tracing::warn!("could not remove {}: {e}", original.display());
    }
    for (path,) in variant_files {
        let path = state.paths.variants().join(path);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!("could not remove {}: {e}", path.display());
        }
    }

    state.hooks.do_action("image_deleted", &json!({ "id": id }));

    Ok(Json(json!({ "ok": true })))
}
