// src/routes/faq_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, ROLE_ADMIN},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/faq", get(list_faq).post(create_faq))
        .route("/faq/{faq_id}", patch(update_faq))
}

fn ensure_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_ADMIN {
        Ok(())
    } else {
        Err(ApiError::Forbidden("FORBIDDEN", "admin only".into()))
    }
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct FaqRow {
    pub faq_id: Uuid,
    pub question: String,
    pub answer: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn list_faq(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<FaqRow>>>, ApiError> {
    let rows: Vec<FaqRow> = sqlx::query_as(
        r#"
        SELECT faq_id, question, answer, is_active, created_at, updated_at
        FROM faq
        WHERE is_active = true
        ORDER BY created_at ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

#[derive(Debug, Deserialize)]
pub struct CreateFaqRequest {
    pub question: String,
    pub answer: String,
}

pub async fn create_faq(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateFaqRequest>,
) -> Result<Json<ApiOk<FaqRow>>, ApiError> {
    ensure_admin(&auth)?;

    let question = req.question.trim();
    let answer = req.answer.trim();
    if question.is_empty() || answer.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "question and answer are required".into(),
        ));
    }

    let row: FaqRow = sqlx::query_as(
        r#"
        INSERT INTO faq (question, answer)
        VALUES ($1, $2)
        RETURNING faq_id, question, answer, is_active, created_at, updated_at
        "#,
    )
    .bind(question)
    .bind(answer)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: row }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateFaqRequest {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_faq(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(faq_id): Path<Uuid>,
    Json(req): Json<UpdateFaqRequest>,
) -> Result<Json<ApiOk<FaqRow>>, ApiError> {
    ensure_admin(&auth)?;

    let row: Option<FaqRow> = sqlx::query_as(
        r#"
        UPDATE faq
        SET question  = COALESCE($2, question),
            answer    = COALESCE($3, answer),
            is_active = COALESCE($4, is_active),
            updated_at = now()
        WHERE faq_id = $1
        RETURNING faq_id, question, answer, is_active, created_at, updated_at
        "#,
    )
    .bind(faq_id)
    .bind(req.question.as_deref().map(str::trim))
    .bind(req.answer.as_deref().map(str::trim))
    .bind(req.is_active)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    row.map(|r| Json(ApiOk { data: r }))
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "faq entry not found".into()))
}
