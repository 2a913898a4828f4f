//! Album CRUD, pivot syncs, and reordering

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{HttpError, HttpResult};
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::AppState;
use emulsion_common::auth::hash_password;
use emulsion_common::db::models::{Album, Taxon};
use emulsion_common::slug::{slugify, unique_slug};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/albums", get(list_albums).post(create_album))
        .route("/albums/reorder", post(reorder_albums))
        .route(
            "/albums/:id",
            get(get_album).put(update_album).delete(delete_album),
        )
        .route("/albums/:id/publish", put(set_published))
        .route("/albums/:id/nsfw", put(set_nsfw))
        .route(
            "/albums/:id/links/:kind",
            get(get_links).put(sync_links),
        )
}

/// Pivot tables an album can be linked through.
fn link_kind(kind: &str) -> Option<(&'static str, &'static str, &'static str)> {
    // (pivot table, pivot column, target table)
    match kind {
        "tags" => Some(("album_tag", "tag_id", "tags")),
        "categories" => Some(("album_category", "category_id", "categories")),
        "cameras" => Some(("album_camera", "camera_id", "cameras")),
        "lenses" => Some(("album_lens", "lens_id", "lenses")),
        "films" => Some(("album_film", "film_id", "films")),
        "developers" => Some(("album_developer", "developer_id", "developers")),
        "labs" => Some(("album_lab", "lab_id", "labs")),
        "locations" => Some(("album_location", "location_id", "locations")),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct AlbumListQuery {
    #[serde(default = "default_page")]
    page: i64,
    category: Option<String>,
    published: Option<bool>,
}

fn default_page() -> i64 {
    1
}

/// GET /admin/api/albums
async fn list_albums(
    State(state): State<AppState>,
    Query(query): Query<AlbumListQuery>,
) -> HttpResult<Json<serde_json::Value>> {
    let mut filters = Vec::new();
    if query.category.is_some() {
        filters.push("category_id = ?");
    }
    if query.published.is_some() {
        filters.push("published = ?");
    }
    let where_clause = if filters.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", filters.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM albums{where_clause}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(category) = &query.category {
        count_query = count_query.bind(category);
    }
    if let Some(published) = query.published {
        count_query = count_query.bind(published);
    }
    let total: i64 = count_query.fetch_one(&state.db).await?;

    let p = calculate_pagination(total, query.page);

    let list_sql = format!(
        "SELECT * FROM albums{where_clause} ORDER BY sort_order, created_at LIMIT ? OFFSET ?"
    );
    let mut list_query = sqlx::query_as::<_, Album>(&list_sql);
    if let Some(category) = &query.category {
        list_query = list_query.bind(category);
    }
    if let Some(published) = query.published {
        list_query = list_query.bind(published);
    }
    let albums = list_query
        .bind(PAGE_SIZE)
        .bind(p.offset)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "albums": albums,
        "total": total,
        "page": p.page,
        "page_size": PAGE_SIZE,
        "total_pages": p.total_pages,
    })))
}

#[derive(Debug, Deserialize)]
struct AlbumPayload {
    title: String,
    /// Explicit slug override; derived from the title when absent
    slug: Option<String>,
    description: Option<String>,
    category_id: Option<String>,
    cover_image_id: Option<String>,
    #[serde(default)]
    published: bool,
    #[serde(default)]
    nsfw: bool,
    /// None = keep current, Some("") = remove protection, Some(p) = set
    password: Option<String>,
    seo_title: Option<String>,
    seo_description: Option<String>,
    seo_keywords: Option<String>,
    og_title: Option<String>,
    og_description: Option<String>,
    og_image: Option<String>,
    schema_type: Option<String>,
}

fn validate_payload(payload: &AlbumPayload) -> HttpResult<()> {
    if payload.title.trim().is_empty() {
        return Err(HttpError::BadRequest("title is required".to_string()));
    }
    Ok(())
}

async fn category_exists(state: &AppState, id: &str) -> HttpResult<()> {
    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if exists == 0 {
        return Err(HttpError::BadRequest(format!("unknown category {id}")));
    }
    Ok(())
}

/// POST /admin/api/albums
async fn create_album(
    State(state): State<AppState>,
    Json(payload): Json<AlbumPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    validate_payload(&payload)?;
    if let Some(category) = &payload.category_id {
        category_exists(&state, category).await?;
    }

    let candidate = slugify(payload.slug.as_deref().unwrap_or(&payload.title));
    let slug = unique_slug(&state.db, "albums", &candidate, None).await?;

    let password_hash = match payload.password.as_deref() {
        Some("") | None => None,
        Some(password) => Some(hash_password(password)?),
    };

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO albums (
            id, title, slug, description, category_id, cover_image_id,
            sort_order, published, nsfw, password_hash,
            seo_title, seo_description, seo_keywords,
            og_title, og_description, og_image, schema_type,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?,
                  (SELECT COALESCE(MAX(sort_order) + 1, 0) FROM albums), ?, ?, ?,
                  ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(payload.title.trim())
    .bind(&slug)
    .bind(&payload.description)
    .bind(&payload.category_id)
    .bind(&payload.cover_image_id)
    .bind(payload.published)
    .bind(payload.nsfw)
    .bind(&password_hash)
    .bind(&payload.seo_title)
    .bind(&payload.seo_description)
    .bind(&payload.seo_keywords)
    .bind(&payload.og_title)
    .bind(&payload.og_description)
    .bind(&payload.og_image)
    .bind(&payload.schema_type)
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await?;

    let album: Album = sqlx::query_as("SELECT * FROM albums WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    state
        .hooks
        .do_action("album_created", &json!({ "id": id, "slug": slug }));

    Ok(Json(json!({ "ok": true, "album": album })))
}

async fn fetch_album(state: &AppState, id: &str) -> HttpResult<Album> {
    sqlx::query_as("SELECT * FROM albums WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| HttpError::NotFound(format!("album {id}")))
}

/// GET /admin/api/albums/:id
///
/// The serialized album passes through the `album_json` filter so
/// plugins can decorate it.
async fn get_album(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    let album = fetch_album(&state, &id).await?;
    let album_json = serde_json::to_value(&album)
        .map_err(|e| HttpError::Internal(format!("album serialization failed: {e}")))?;
    let album_json = state.hooks.apply_filters("album_json", album_json);
    Ok(Json(json!({ "ok": true, "album": album_json })))
}

/// PUT /admin/api/albums/:id
async fn update_album(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<AlbumPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    let existing = fetch_album(&state, &id).await?;
    validate_payload(&payload)?;
    if let Some(category) = &payload.category_id {
        category_exists(&state, category).await?;
    }

    // Slug changes only when explicitly requested
    let slug = match payload.slug.as_deref() {
        Some(requested) if !requested.trim().is_empty() => {
            let candidate = slugify(requested);
            unique_slug(&state.db, "albums", &candidate, Some(&id)).await?
        }
        _ => existing.slug.clone(),
    };

    let password_hash = match payload.password.as_deref() {
        None => existing.password_hash.clone(),
        Some("") => None,
        Some(password) => Some(hash_password(password)?),
    };

    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        UPDATE albums SET
            title = ?, slug = ?, description = ?, category_id = ?,
            cover_image_id = ?, published = ?, nsfw = ?, password_hash = ?,
            seo_title = ?, seo_description = ?, seo_keywords = ?,
            og_title = ?, og_description = ?, og_image = ?, schema_type = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(payload.title.trim())
    .bind(&slug)
    .bind(&payload.description)
    .bind(&payload.category_id)
    .bind(&payload.cover_image_id)
    .bind(payload.published)
    .bind(payload.nsfw)
    .bind(&password_hash)
    .bind(&payload.seo_title)
    .bind(&payload.seo_description)
    .bind(&payload.seo_keywords)
    .bind(&payload.og_title)
    .bind(&payload.og_description)
    .bind(&payload.og_image)
    .bind(&payload.schema_type)
    .bind(now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let album = fetch_album(&state, &id).await?;
    state
        .hooks
        .do_action("album_updated", &json!({ "id": id, "slug": album.slug }));

    Ok(Json(json!({ "ok": true, "album": album })))
}

/// DELETE /admin/api/albums/:id
///
/// Database rows go first (one transaction, FK cascades take images and
/// variants); files are removed afterwards, best-effort.
async fn delete_album(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    fetch_album(&state, &id).await?;

    let files: Vec<(String,)> =
        sqlx::query_as("SELECT file_name FROM images WHERE album_id = ?")
            .bind(&id)
            .fetch_all(&state.db)
            .await?;
    let variant_files: Vec<(String,)> = sqlx::query_as(
        "SELECT v.path FROM image_variants v
         JOIN images i ON i.id = v.image_id WHERE i.album_id = ?",
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await?;

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM albums WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    // Disk cleanup happens only after the commit; a failure leaves an
    // orphaned file, never inconsistent rows.
    let album_dir = crate::media::album_dir(&state.paths.media(), &id);
    for (file_name,) in files {
        let path = album_dir.join(file_name);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!("could not remove {}: {e}", path.display());
        }
    }
    for (path,) in variant_files {
        let path = state.paths.variants().join(path);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!("could not remove {}: {e}", path.display());
        }
    }
    let _ = std::fs::remove_dir(&album_dir);

    state.hooks.do_action("album_deleted", &json!({ "id": id }));

    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct ReorderPayload {
    ids: Vec<String>,
}

/// POST /admin/api/albums/reorder
///
/// Rewrites sort_order to match the submitted id order, atomically.
async fn reorder_albums(
    State(state): State<AppState>,
    Json(payload): Json<ReorderPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    if payload.ids.is_empty() {
        return Err(HttpError::BadRequest("ids must not be empty".to_string()));
    }

    let mut tx = state.db.begin().await?;
    for (position, id) in payload.ids.iter().enumerate() {
        let result = sqlx::query("UPDATE albums SET sort_order = ? WHERE id = ?")
            .bind(position as i64)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(HttpError::BadRequest(format!("unknown album {id}")));
        }
    }
    tx.commit().await?;

    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct PublishPayload {
    published: bool,
}

/// PUT /admin/api/albums/:id/publish
async fn set_published(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PublishPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    fetch_album(&state, &id).await?;
    sqlx::query("UPDATE albums SET published = ?, updated_at = ? WHERE id = ?")
        .bind(payload.published)
        .bind(chrono::Utc::now().timestamp())
        .bind(&id)
        .execute(&state.db)
        .await?;
    Ok(Json(json!({ "ok": true, "published": payload.published })))
}

#[derive(Debug, Deserialize)]
struct NsfwPayload {
    nsfw: bool,
}

/// PUT /admin/api/albums/:id/nsfw
async fn set_nsfw(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<NsfwPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    fetch_album(&state, &id).await?;
    sqlx::query("UPDATE albums SET nsfw = ?, updated_at = ? WHERE id = ?")
        .bind(payload.nsfw)
        .bind(chrono::Utc::now().timestamp())
        .bind(&id)
        .execute(&state.db)
        .await?;
    Ok(Json(json!({ "ok": true, "nsfw": payload.nsfw })))
}

/// GET /admin/api/albums/:id/links/:kind
async fn get_links(
    State(state): State<AppState>,
    Path((id, kind)): Path<(String, String)>,
) -> HttpResult<Json<serde_json::Value>> {
    let (pivot, column, target) = link_kind(&kind)
        .ok_or_else(|| HttpError::BadRequest(format!("unknown link kind {kind}")))?;
    fetch_album(&state, &id).await?;

    let linked: Vec<Taxon> = sqlx::query_as(&format!(
        "SELECT t.id, t.name FROM {target} t
         JOIN {pivot} p ON p.{column} = t.id
         WHERE p.album_id = ? ORDER BY t.name"
    ))
    .bind(&id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "ok": true, "kind": kind, "items": linked })))
}

#[derive(Debug, Deserialize)]
struct LinksPayload {
    ids: Vec<String>,
}

/// PUT /admin/api/albums/:id/links/:kind
///
/// Delete-then-insert inside one transaction so a failure mid-sync
/// leaves the previous links intact.
async fn sync_links(
    State(state): State<AppState>,
    Path((id, kind)): Path<(String, String)>,
    Json(payload): Json<LinksPayload>,
) -> HttpResult<Json<serde_json::Value>> {
    let (pivot, column, target) = link_kind(&kind)
        .ok_or_else(|| HttpError::BadRequest(format!("unknown link kind {kind}")))?;
    fetch_album(&state, &id).await?;

    let mut tx = state.db.begin().await?;

    sqlx::query(&format!("DELETE FROM {pivot} WHERE album_id = ?"))
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    for linked_id in &payload.ids {
        let exists: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {target} WHERE id = ?"))
                .bind(linked_id)
                .fetch_one(&mut *tx)
                .await?;
        if exists == 0 {
            return Err(HttpError::BadRequest(format!(
                "unknown {kind} id {linked_id}"
            )));
        }

        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {pivot} (album_id, {column}) VALUES (?, ?)"
        ))
        .bind(&id)
        .bind(linked_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(Json(json!({ "ok": true, "count": payload.ids.len() })))
}
