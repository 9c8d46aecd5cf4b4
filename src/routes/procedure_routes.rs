// src/routes/procedure_routes.rs

use axum::{Json, Router, extract::State, routing::get};
use serde::Deserialize;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, ProcedureRow, ROLE_ADMIN},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/procedures", get(list_procedures).post(create_procedure))
}

pub async fn list_procedures(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<ProcedureRow>>>, ApiError> {
    let rows: Vec<ProcedureRow> = sqlx::query_as::<_, ProcedureRow>(
        r#"
        SELECT procedure_id, name, description, duration_min, is_active,
               created_at, updated_at
        FROM procedure
        WHERE is_active = true
        ORDER BY name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

#[derive(Debug, Deserialize)]
pub struct CreateProcedureRequest {
    pub name: String,
    pub description: Option<String>,
    pub duration_min: Option<i32>,
}

pub async fn create_procedure(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateProcedureRequest>,
) -> Result<Json<ApiOk<ProcedureRow>>, ApiError> {
    if auth.role != ROLE_ADMIN {
        return Err(ApiError::Forbidden("FORBIDDEN", "admin only".into()));
    }

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "name is required".into(),
        ));
    }
    let duration_min = req.duration_min.unwrap_or(30);
    if duration_min <= 0 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "duration_min must be positive".into(),
        ));
    }

    let row: ProcedureRow = sqlx::query_as(
        r#"
        INSERT INTO procedure (name, description, duration_min)
        VALUES ($1, $2, $3)
        RETURNING procedure_id, name, description, duration_min, is_active,
                  created_at, updated_at
        "#,
    )
    .bind(name)
    .bind(req.description.as_deref())
    .bind(duration_min)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: row }))
}
