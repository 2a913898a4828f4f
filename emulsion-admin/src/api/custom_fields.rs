//! Custom field types and values
//!
//! User-defined metadata supplementing the fixed equipment taxonomies:
//! a field type declares a name and kind (text | number | date), values
//! attach one entry per (type, entity). Value payloads are validated
//! against the declared kind.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{is_missing_table, HttpError, HttpResult};
use crate::AppState;
use emulsion_common::db::models::{CustomFieldType, CustomFieldValue};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/custom-fields", get(list_types).post(create_type))
        .route("/custom-fields/:id", axum::routing::delete(delete_type))
        .route(
            "/custom-fields/values/:entity_type/:entity_id",
            get(list_values),
        )
        .route(
            "/custom-fields/values/:entity_type/:entity_id/:field_id",
            axum::routing::put(set_value).delete(clear_value),
        )
}

const FIELD_KINDS: &[&str] = &["text", "number", "date"];
const ENTITY_TYPES: &[&str] = &["album"];

fn check_entity_type(entity_type: &str) -> HttpResult<()> {
    if ENTITY_TYPES.contains(&entity_type) {
        Ok(())
    } else {
        Err(HttpError::BadRequest(format!(
            "unknown entity type {entity_type}"
        )))
    }
}

/// GET /admin/api/custom-fields
async fn list_types(State(state): State<AppState>) -> HttpResult<Json<serde_json::Value>> {
    let types: Vec<CustomFieldType> =
        match sqlx::query_as("SELECT * FROM custom_field_types ORDER BY name")
            .fetch_all(&state.db)
            .await
        {
            Ok(rows) => rows,
            Err(e) if is_missing_table(&e) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

    Ok(Json(json!({ "ok": true, "types": types })))
}

#[derive(Debug, Deserialize)]
struct TypePayload {
    name: String,
    #[serde(default = "default_kind")]
    field_kind: String,
}

fn default_kind() -> String {
    "text".to_string()
}

/// POST /admin/api/custom-fields
async fn create_type(
    State(state): State<AppState>,
    Json(payload): Json<TypePayload>,
) -> HttpResult<Json<serde_json::Value>> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(HttpError::BadRequest("name is required".to_string()));
    }
    if !FIELD_KINDS.contains(&payload.field_kind.as_str()) {
        return Err(HttpError::BadRequest(format!(
            "unknown field kind {}",
            payload.field_kind
        )));
    }

    let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM custom_field_types WHERE name = ?")
        .bind(name)
        .fetch_one(&state.db)
        .await?;
    if taken > 0 {
        return Err(HttpError::Conflict("field name already exists".to_string()));
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO custom_field_types (id, name, field_kind) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(&payload.field_kind)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "type": CustomFieldType { id, name: name.to_string(), field_kind: payload.field_kind },
    })))
}

/// DELETE /admin/api/custom-fields/:id (values cascade)
async fn delete_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM custom_field_types WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(HttpError::NotFound(format!("custom field {id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

/// GET /admin/api/custom-fields/values/:entity_type/:entity_id
async fn list_values(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> HttpResult<Json<serde_json::Value>> {
    check_entity_type(&entity_type)?;

    let values: Vec<CustomFieldValue> = match sqlx::query_as(
        "SELECT * FROM custom_field_values WHERE entity_type = ? AND entity_id = ?",
    )
    .bind(&entity_type)
    .bind(&entity_id)
    .fetch_all(&state.db)
    .await
    {
        Ok(rows) => rows,
        Err(e) if is_missing_table(&e) => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    Ok(Json(json!({ "ok": true, "values": values })))
}

#[derive(Debug, Deserialize)]
struct ValuePayload {
    value: String,
}

fn validate_value(kind: &str, value: &str) -> HttpResult<()> {
    match kind {
        "number" => {
            value.parse::<f64>().map_err(|_| {
                HttpError::BadRequest(format!("{value} is not a number"))
            })?;
        }
        "date" => {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
                HttpError::BadRequest(format!("{value} is not a YYYY-MM-DD date"))
            })?;
        }
        _ => {}
    }
    Ok(())
}

/// PUT /admin/api/custom-fields/values/:entity_type/:entity_id/:field_id
async fn set_value(
    State(state): State<AppState>,
    Path((entity_type, entity_id, field_id)): Path<(String, String, String)>,
    Json(payload): Json<ValuePayload>,
) -> HttpResult<Json<serde_json::Value>> {
    check_entity_type(&entity_type)?;

    let field: CustomFieldType =
        sqlx::query_as("SELECT * FROM custom_field_types WHERE id = ?")
            .bind(&field_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| HttpError::NotFound(format!("custom field {field_id}")))?;

    validate_value(&field.field_kind, &payload.value)?;

    sqlx::query(
        "INSERT INTO custom_field_values (id, field_type_id, entity_type, entity_id, value)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(field_type_id, entity_type, entity_id)
         DO UPDATE SET value = excluded.value",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&field_id)
    .bind(&entity_type)
    .bind(&entity_id)
    .bind(&payload.value)
    .execute(&state.db)
    .await?;

    Ok(Json(json!({ "ok": true })))
}

/// DELETE /admin/api/custom-fields/values/:entity_type/:entity_id/:field_id
async fn clear_value(
    State(state): State<AppState>,
    Path((entity_type, entity_id, field_id)): Path<(String, String, String)>,
) -> HttpResult<Json<serde_json::Value>> {
    check_entity_type(&entity_type)?;

    let result = sqlx::query(
        "DELETE FROM custom_field_values
         WHERE field_type_id = ? AND entity_type = ? AND entity_id = ?",
    )
    .bind(&field_id)
    .bind(&entity_type)
    .bind(&entity_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(HttpError::NotFound("no value set".to_string()));
    }
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_validation_by_kind() {
        assert!(validate_value("text", "anything").is_ok());
        assert!(validate_value("number", "3.5").is_ok());
        assert!(validate_value("number", "abc").is_err());
        assert!(validate_value("date", "2024-06-01").is_ok());
        assert!(validate_value("date", "June 1st").is_err());
    }
}
