// src/routes/patient_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::QueryBuilder;
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::hash_password,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, ROLE_ADMIN, ROLE_DENTIST, ROLE_PATIENT, ROLE_RECEPTIONIST},
};

fn is_staff(auth: &AuthContext) -> bool {
    matches!(auth.role, ROLE_ADMIN | ROLE_RECEPTIONIST | ROLE_DENTIST)
}

fn ensure_staff(auth: &AuthContext) -> Result<(), ApiError> {
    if is_staff(auth) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only clinic staff can manage patients".into(),
        ))
    }
}

async fn ensure_patient_scope(
    state: &AppState,
    auth: &AuthContext,
    patient_id: Uuid,
) -> Result<(), ApiError> {
    if is_staff(auth) {
        return Ok(());
    }
    if auth.role != ROLE_PATIENT {
        return Err(ApiError::Forbidden("FORBIDDEN", "Access denied".into()));
    }
    let owner: Option<Uuid> =
        sqlx::query_scalar(r#"SELECT user_id FROM patient WHERE patient_id = $1"#)
            .bind(patient_id)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?;
    if owner == Some(auth.user_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Patients can only view their own records".into(),
        ))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", get(search_patients).post(create_patient))
        .route("/patients/{patient_id}", get(get_patient).patch(update_patient))
        .route(
            "/patients/{patient_id}/records",
            get(list_records).post(add_record),
        )
        .route(
            "/patients/{patient_id}/documents",
            get(list_documents).post(add_document),
        )
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PatientDetail {
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_minor: bool,
    pub guardian_patient_id: Option<Uuid>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

const PATIENT_SELECT: &str = r#"
    SELECT
      p.patient_id,
      p.user_id,
      u.first_name,
      u.last_name,
      u.phone,
      u.email,
      p.is_minor,
      p.guardian_patient_id,
      p.insurance_provider,
      p.insurance_number,
      p.created_at
    FROM patient p
    JOIN clinic_user u ON u.user_id = p.user_id
"#;

/* ============================================================
   POST /patients
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreatePatientRequest {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_minor: Option<bool>,
    pub guardian_patient_id: Option<Uuid>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
}

pub async fn create_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreatePatientRequest>,
) -> Result<Json<ApiOk<PatientDetail>>, ApiError> {
    ensure_staff(&auth)?;

    let username = req.username.trim();
    let first_name = req.first_name.trim();
    let last_name = req.last_name.trim();
    if username.len() < 3 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "username must be at least 3 characters".into(),
        ));
    }
    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "first_name and last_name are required".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "password must be at least 8 characters".into(),
        ));
    }

    let is_minor = req.is_minor.unwrap_or(false);
    if is_minor && req.guardian_patient_id.is_none() {
        // Best-effort invariant: registration proceeds, staff follow up.
        warn!(username, "minor patient created without a guardian reference");
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
    .bind(first_name)
    .bind(last_name)
    .bind(req.phone.as_deref().map(str::trim))
    .bind(req.email.as_deref().map(str::trim))
    .bind(&password_hash)
    .bind(ROLE_PATIENT)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Conflict("USERNAME_TAKEN", "username already exists".into())
        }
        _ => ApiError::db(e),
    })?;

    let patient_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO patient
            (user_id, is_minor, guardian_patient_id, insurance_provider, insurance_number)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING patient_id
        "#,
    )
    .bind(user_id)
    .bind(is_minor)
    .bind(req.guardian_patient_id)
    .bind(req.insurance_provider.as_deref())
    .bind(req.insurance_number.as_deref())
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    let sql = format!("{PATIENT_SELECT} WHERE p.patient_id = $1");
    let detail: PatientDetail = sqlx::query_as(&sql)
        .bind(patient_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: detail }))
}

/* ============================================================
   GET /patients (search) and /patients/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PatientSearchQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn search_patients(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<PatientSearchQuery>,
) -> Result<Json<ApiOk<Vec<PatientDetail>>>, ApiError> {
    ensure_staff(&auth)?;

    let limit = q.limit.unwrap_or(50).clamp(1, 200);
    let offset = q.offset.unwrap_or(0).max(0);

    let mut qb: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(PATIENT_SELECT);
    qb.push(" WHERE 1=1 ");

    if let Some(keyword) = q.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let like = format!("%{keyword}%");
        qb.push(" AND (u.first_name ILIKE ");
        qb.push_bind(like.clone());
        qb.push(" OR u.last_name ILIKE ");
        qb.push_bind(like.clone());
        qb.push(" OR u.phone ILIKE ");
        qb.push_bind(like);
        qb.push(") ");
    }

    qb.push(" ORDER BY u.last_name ASC, u.first_name ASC ");
    qb.push(" LIMIT ");
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows: Vec<PatientDetail> = qb
        .build_query_as::<PatientDetail>()
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

pub async fn get_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<PatientDetail>>, ApiError> {
    ensure_patient_scope(&state, &auth, patient_id).await?;

    let sql = format!("{PATIENT_SELECT} WHERE p.patient_id = $1");
    let detail: Option<PatientDetail> = sqlx::query_as(&sql)
        .bind(patient_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?;

    detail
        .map(|d| Json(ApiOk { data: d }))
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "patient not found".into()))
}

/* ============================================================
   PATCH /patients/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdatePatientRequest {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
    pub guardian_patient_id: Option<Uuid>,
}

pub async fn update_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<UpdatePatientRequest>,
) -> Result<Json<ApiOk<PatientDetail>>, ApiError> {
    // Patients may edit their own contact details; staff may edit anyone.
    ensure_patient_scope(&state, &auth, patient_id).await?;

    let user_id: Uuid = sqlx::query_scalar(r#"SELECT user_id FROM patient WHERE patient_id = $1"#)
        .bind(patient_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "patient not found".into()))?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    sqlx::query(
        r#"
        UPDATE clinic_user
        SET phone = COALESCE($2, phone),
            email = COALESCE($3, email),
            updated_at = now()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(req.phone.as_deref().map(str::trim))
    .bind(req.email.as_deref().map(str::trim))
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    sqlx::query(
        r#"
        UPDATE patient
        SET insurance_provider = COALESCE($2, insurance_provider),
            insurance_number   = COALESCE($3, insurance_number),
            guardian_patient_id = COALESCE($4, guardian_patient_id)
        WHERE patient_id = $1
        "#,
    )
    .bind(patient_id)
    .bind(req.insurance_provider.as_deref())
    .bind(req.insurance_number.as_deref())
    .bind(req.guardian_patient_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    let sql = format!("{PATIENT_SELECT} WHERE p.patient_id = $1");
    let detail: PatientDetail = sqlx::query_as(&sql)
        .bind(patient_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: detail }))
}

/* ============================================================
   Clinical records (append-only)
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PatientRecordDto {
    pub record_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub diagnosis: Option<String>,
    pub treatment_plan: Option<String>,
    pub notes: Option<String>,
    pub created_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AddRecordRequest {
    pub appointment_id: Option<Uuid>,
    pub diagnosis: Option<String>,
    pub treatment_plan: Option<String>,
    pub notes: Option<String>,
}

pub async fn add_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<AddRecordRequest>,
) -> Result<Json<ApiOk<PatientRecordDto>>, ApiError> {
    ensure_staff(&auth)?;

    if req.diagnosis.is_none() && req.treatment_plan.is_none() && req.notes.is_none() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "record must carry a diagnosis, treatment plan or notes".into(),
        ));
    }

    let row: PatientRecordDto = sqlx::query_as(
        r#"
        INSERT INTO patient_record
            (patient_id, appointment_id, diagnosis, treatment_plan, notes, created_by_user_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING record_id, patient_id, appointment_id, diagnosis,
                  treatment_plan, notes, created_by_user_id, created_at
        "#,
    )
    .bind(patient_id)
    .bind(req.appointment_id)
    .bind(req.diagnosis.as_deref())
    .bind(req.treatment_plan.as_deref())
    .bind(req.notes.as_deref())
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: row }))
}

pub async fn list_records(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<PatientRecordDto>>>, ApiError> {
    ensure_patient_scope(&state, &auth, patient_id).await?;

    let rows: Vec<PatientRecordDto> = sqlx::query_as(
        r#"
        SELECT record_id, patient_id, appointment_id, diagnosis,
               treatment_plan, notes, created_by_user_id, created_at
        FROM patient_record
        WHERE patient_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(patient_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

/* ============================================================
   Documents (metadata only; file bytes live in external storage)
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PatientDocumentDto {
    pub document_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AddDocumentRequest {
    pub appointment_id: Option<Uuid>,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: Option<String>,
}

pub async fn add_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<AddDocumentRequest>,
) -> Result<Json<ApiOk<PatientDocumentDto>>, ApiError> {
    ensure_staff(&auth)?;

    let file_name = req.file_name.trim();
    let storage_path = req.storage_path.trim();
    if file_name.is_empty() || storage_path.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "file_name and storage_path are required".into(),
        ));
    }

    let row: PatientDocumentDto = sqlx::query_as(
        r#"
        INSERT INTO patient_document
            (patient_id, appointment_id, file_name, storage_path, content_type)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING document_id, patient_id, appointment_id, file_name,
                  storage_path, content_type, created_at
        "#,
    )
    .bind(patient_id)
    .bind(req.appointment_id)
    .bind(file_name)
    .bind(storage_path)
    .bind(req.content_type.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: row }))
}

pub async fn list_documents(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<PatientDocumentDto>>>, ApiError> {
    ensure_patient_scope(&state, &auth, patient_id).await?;

    let rows: Vec<PatientDocumentDto> = sqlx::query_as(
        r#"
        SELECT document_id, patient_id, appointment_id, file_name,
               storage_path, content_type, created_at
        FROM patient_document
        WHERE patient_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(patient_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}
