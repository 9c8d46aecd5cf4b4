// src/routes/payment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    dispatch,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        ApiOk, AppState, BudgetRow, BudgetStatus, OkData, OkResponse, PaymentMethod, PaymentRow,
        PaymentStatus, ROLE_ADMIN, ROLE_DENTIST, ROLE_PATIENT, ROLE_RECEPTIONIST,
    },
    templates,
    templates::TemplateKind,
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
            "Only clinic staff can manage payments".into(),
        ))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", post(create_payment))
        .route("/patients/{patient_id}/payments", get(list_patient_payments))
        .route("/budgets", post(create_budget))
        .route("/patients/{patient_id}/budgets", get(list_patient_budgets))
        .route("/budgets/{budget_id}/approve", post(approve_budget))
}

/* ============================================================
   POST /payments
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub budget_id: Uuid,
    pub patient_id: Uuid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct CreatedPayment {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
}

pub async fn create_payment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<Json<ApiOk<CreatedPayment>>, ApiError> {
    ensure_staff(&auth)?;

    if req.amount_cents <= 0 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "amount_cents must be positive".into(),
        ));
    }

    let budget_patient: Option<Uuid> =
        sqlx::query_scalar(r#"SELECT patient_id FROM budget WHERE budget_id = $1"#)
            .bind(req.budget_id)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?;

    match budget_patient {
        None => return Err(ApiError::NotFound("NOT_FOUND", "budget not found".into())),
        Some(pid) if pid != req.patient_id => {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "budget does not belong to this patient".into(),
            ));
        }
        Some(_) => {}
    }

    // Cash settles on the spot; everything else starts pending.
    let (status, payment_date) = match req.method {
        PaymentMethod::Cash => (PaymentStatus::Completed, Some(Local::now().date_naive())),
        _ => (PaymentStatus::Pending, None),
    };

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let payment_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO payment
            (budget_id, patient_id, amount_cents, method, status, payment_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING payment_id
        "#,
    )
    .bind(req.budget_id)
    .bind(req.patient_id)
    .bind(req.amount_cents)
    .bind(req.method as i16)
    .bind(status as i16)
    .bind(payment_date)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    // Cash payments get a WhatsApp receipt when a phone is on file.
    let queued = if req.method == PaymentMethod::Cash {
        #[derive(sqlx::FromRow)]
        struct ContactRow {
            first_name: String,
            phone: Option<String>,
        }
        let contact: ContactRow = sqlx::query_as(
            r#"
            SELECT u.first_name, u.phone
            FROM patient p
            JOIN clinic_user u ON u.user_id = p.user_id
            WHERE p.patient_id = $1
            "#,
        )
        .bind(req.patient_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(ApiError::db)?;

        match contact
            .phone
            .as_deref()
            .and_then(|p| state.whatsapp.normalize_phone(p))
        {
            Some(phone) => {
                let message = templates::payment_receipt(&contact.first_name, req.amount_cents);
                let notification_id = dispatch::queue_whatsapp(
                    &mut *tx,
                    req.patient_id,
                    None,
                    TemplateKind::PaymentReceipt,
                    &message,
                )
                .await
                .map_err(ApiError::db)?;
                Some((notification_id, phone))
            }
            None => None,
        }
    } else {
        None
    };

    tx.commit().await.map_err(ApiError::db)?;

    if let Some((notification_id, phone)) = queued {
        if let Err(e) = dispatch::deliver(&state.db, &state.whatsapp, notification_id, &phone).await
        {
            warn!(%payment_id, "payment receipt not delivered: {e}");
        }
    }

    Ok(Json(ApiOk {
        data: CreatedPayment { payment_id, status },
    }))
}

/* ============================================================
   GET /patients/{id}/payments
   ============================================================ */

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

pub async fn list_patient_payments(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<PaymentRow>>>, ApiError> {
    ensure_patient_scope(&state, &auth, patient_id).await?;

    let rows: Vec<PaymentRow> = sqlx::query_as(
        r#"
        SELECT payment_id, budget_id, patient_id, amount_cents, method,
               status, payment_date, created_at
        FROM payment
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
   Budgets
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateBudgetRequest {
    pub patient_id: Uuid,
    pub total_cents: i64,
    pub expires_at: Option<chrono::NaiveDate>,
}

pub async fn create_budget(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateBudgetRequest>,
) -> Result<Json<ApiOk<BudgetRow>>, ApiError> {
    ensure_staff(&auth)?;

    if req.total_cents <= 0 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "total_cents must be positive".into(),
        ));
    }

    let row: BudgetRow = sqlx::query_as(
        r#"
        INSERT INTO budget (patient_id, total_cents, status, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING budget_id, patient_id, total_cents, status, expires_at,
                  created_at, updated_at
        "#,
    )
    .bind(req.patient_id)
    .bind(req.total_cents)
    .bind(BudgetStatus::Pending as i16)
    .bind(req.expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: row }))
}

pub async fn list_patient_budgets(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<BudgetRow>>>, ApiError> {
    ensure_patient_scope(&state, &auth, patient_id).await?;

    let rows: Vec<BudgetRow> = sqlx::query_as(
        r#"
        SELECT budget_id, patient_id, total_cents, status, expires_at,
               created_at, updated_at
        FROM budget
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

pub async fn approve_budget(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(budget_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    ensure_staff(&auth)?;

    let res = sqlx::query(
        r#"
        UPDATE budget
        SET status = $2, updated_at = now()
        WHERE budget_id = $1
          AND status = $3
        "#,
    )
    .bind(budget_id)
    .bind(BudgetStatus::Approved as i16)
    .bind(BudgetStatus::Pending as i16)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM budget WHERE budget_id = $1)"#)
                .bind(budget_id)
                .fetch_one(&state.db)
                .await
                .map_err(ApiError::db)?;
        return if exists {
            Err(ApiError::Conflict(
                "INVALID_TRANSITION",
                "Only a pending budget can be approved".into(),
            ))
        } else {
            Err(ApiError::NotFound("NOT_FOUND", "budget not found".into()))
        };
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}
