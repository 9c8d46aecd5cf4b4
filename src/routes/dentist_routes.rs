// src/routes/dentist_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::hash_password,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, DentistAvailability, OkData, OkResponse, ROLE_ADMIN, ROLE_DENTIST},
};

fn ensure_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_ADMIN {
        Ok(())
    } else {
        Err(ApiError::Forbidden("FORBIDDEN", "admin only".into()))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dentists", get(list_dentists).post(create_dentist))
        .route("/dentists/{dentist_id}/availability", post(set_availability))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DentistDetail {
    pub dentist_id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub registration_number: String,
    pub specialties: Vec<String>,
    pub availability: DentistAvailability,
    pub created_at: DateTime<Utc>,
}

/// Any authenticated user may list dentists; patients need this to
/// pick one when booking.
pub async fn list_dentists(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<DentistDetail>>>, ApiError> {
    let rows: Vec<DentistDetail> = sqlx::query_as(
        r#"
        SELECT
          d.dentist_id,
          d.user_id,
          u.first_name,
          u.last_name,
          d.registration_number,
          d.specialties,
          d.availability,
          d.created_at
        FROM dentist d
        JOIN clinic_user u ON u.user_id = d.user_id
        WHERE u.is_active = true
        ORDER BY u.last_name ASC, u.first_name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

#[derive(Debug, Deserialize)]
pub struct CreateDentistRequest {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub registration_number: String,
    pub specialties: Option<Vec<String>>,
}

pub async fn create_dentist(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateDentistRequest>,
) -> Result<Json<ApiOk<DentistDetail>>, ApiError> {
    ensure_admin(&auth)?;

    let username = req.username.trim();
    let registration_number = req.registration_number.trim();
    if username.len() < 3 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "username must be at least 3 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "password must be at least 8 characters".into(),
        ));
    }
    if registration_number.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "registration_number is required".into(),
        ));
    }

    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::Internal(format!("password hash error: {e}")))?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO clinic_user
            (username, first_name, last_name, phone, email, password_hash, roles)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING user_id
        "#,
    )
    .bind(username)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(req.phone.as_deref().map(str::trim))
    .bind(req.email.as_deref().map(str::trim))
    .bind(&password_hash)
    .bind(ROLE_DENTIST)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Conflict("USERNAME_TAKEN", "username already exists".into())
        }
        _ => ApiError::db(e),
    })?;

    let dentist_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO dentist (user_id, registration_number, specialties)
        VALUES ($1, $2, $3)
        RETURNING dentist_id
        "#,
    )
    .bind(user_id)
    .bind(registration_number)
    .bind(req.specialties.unwrap_or_default())
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    let detail: DentistDetail = sqlx::query_as(
        r#"
        SELECT
          d.dentist_id, d.user_id, u.first_name, u.last_name,
          d.registration_number, d.specialties, d.availability, d.created_at
        FROM dentist d
        JOIN clinic_user u ON u.user_id = d.user_id
        WHERE d.dentist_id = $1
        "#,
    )
    .bind(dentist_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: detail }))
}

#[derive(Debug, Deserialize)]
pub struct SetAvailabilityRequest {
    pub availability: DentistAvailability,
}

/// Dentists set their own status; admin may set anyone's.
pub async fn set_availability(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(dentist_id): Path<Uuid>,
    Json(req): Json<SetAvailabilityRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    if auth.role != ROLE_ADMIN {
        if auth.role != ROLE_DENTIST {
            return Err(ApiError::Forbidden("FORBIDDEN", "Access denied".into()));
        }
        let own: Option<Uuid> =
            sqlx::query_scalar(r#"SELECT dentist_id FROM dentist WHERE user_id = $1"#)
                .bind(auth.user_id)
                .fetch_optional(&state.db)
                .await
                .map_err(ApiError::db)?;
        if own != Some(dentist_id) {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "Dentists can only update their own availability".into(),
            ));
        }
    }

    let res = sqlx::query(
        r#"
        UPDATE dentist
        SET availability = $2
        WHERE dentist_id = $1
        "#,
    )
    .bind(dentist_id)
    .bind(req.availability as i16)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "dentist not found".into()));
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}
