// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    dispatch,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        ApiOk, AppState, AppointmentStatus, OkData, OkResponse, ROLE_ADMIN, ROLE_DENTIST,
        ROLE_PATIENT, ROLE_RECEPTIONIST,
    },
    scheduling::{self, validate_slot},
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
            "Only clinic staff can perform this action".into(),
        ))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(create_appointment))
        .route("/appointments/slots", get(get_available_slots))
        .route("/appointments/day", get(get_appointments_day))
        .route("/appointments/{appointment_id}", get(get_appointment))
        .route("/appointments/{appointment_id}/confirm", post(confirm_by_patient))
        .route(
            "/appointments/{appointment_id}/confirm_dentist",
            post(confirm_by_dentist),
        )
        .route(
            "/appointments/{appointment_id}/whatsapp_preview",
            get(whatsapp_preview),
        )
        .route("/appointments/{appointment_id}/cancel", post(cancel_appointment))
        .route("/appointments/{appointment_id}/complete", post(mark_completed))
        .route("/appointments/{appointment_id}/no_show", post(mark_no_show))
        .route(
            "/patients/{patient_id}/appointments",
            get(list_patient_appointments),
        )
}

/* ============================================================
   Detail loading (single joined query; names come batched, not
   one foreign key at a time)
   ============================================================ */

#[derive(Debug, sqlx::FromRow)]
struct AppointmentDetailRow {
    appointment_id: Uuid,
    patient_id: Uuid,
    dentist_id: Uuid,
    procedure_id: Uuid,
    appointment_date: NaiveDate,
    appointment_time: NaiveTime,
    location: String,
    status: AppointmentStatus,
    confirmed_by_patient: bool,
    confirmed_at: Option<DateTime<Utc>>,
    confirmed_by_dentist_at: Option<DateTime<Utc>>,
    confirmation_sent: bool,
    whatsapp_sent_at: Option<DateTime<Utc>>,
    patient_user_id: Uuid,
    patient_first: String,
    patient_last: String,
    patient_phone: Option<String>,
    dentist_first: String,
    dentist_last: String,
    procedure_name: String,
}

const DETAIL_SELECT: &str = r#"
    SELECT
      a.appointment_id,
      a.patient_id,
      a.dentist_id,
      a.procedure_id,
      a.appointment_date,
      a.appointment_time,
      a.location,
      a.status,
      a.confirmed_by_patient,
      a.confirmed_at,
      a.confirmed_by_dentist_at,
      a.confirmation_sent,
      a.whatsapp_sent_at,

      p.user_id        AS patient_user_id,
      up.first_name    AS patient_first,
      up.last_name     AS patient_last,
      up.phone         AS patient_phone,

      ud.first_name    AS dentist_first,
      ud.last_name     AS dentist_last,

      pr.name          AS procedure_name

    FROM appointment a
    JOIN patient p      ON p.patient_id = a.patient_id
    JOIN clinic_user up ON up.user_id = p.user_id
    JOIN dentist d      ON d.dentist_id = a.dentist_id
    JOIN clinic_user ud ON ud.user_id = d.user_id
    JOIN procedure pr   ON pr.procedure_id = a.procedure_id
"#;

async fn load_detail(
    state: &AppState,
    appointment_id: Uuid,
) -> Result<AppointmentDetailRow, ApiError> {
    let sql = format!("{DETAIL_SELECT} WHERE a.appointment_id = $1");
    sqlx::query_as::<_, AppointmentDetailRow>(&sql)
        .bind(appointment_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "appointment not found".into()))
}

#[derive(Debug, Serialize)]
pub struct PersonBrief {
    pub id: Uuid,
    pub display: String,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDto {
    pub appointment_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub location: String,
    pub status: AppointmentStatus,
    pub confirmed_by_patient: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmed_by_dentist_at: Option<DateTime<Utc>>,
    pub confirmation_sent: bool,
    pub whatsapp_sent_at: Option<DateTime<Utc>>,
    pub patient: PersonBrief,
    pub dentist: PersonBrief,
    pub procedure: PersonBrief,
}

impl AppointmentDetailRow {
    fn patient_name(&self) -> String {
        format!("{} {}", self.patient_first, self.patient_last)
    }

    fn dentist_name(&self) -> String {
        format!("{} {}", self.dentist_first, self.dentist_last)
    }

    fn into_dto(self) -> AppointmentDto {
        let patient_display = self.patient_name();
        let dentist_display = self.dentist_name();
        AppointmentDto {
            appointment_id: self.appointment_id,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
            location: self.location,
            status: self.status,
            confirmed_by_patient: self.confirmed_by_patient,
            confirmed_at: self.confirmed_at,
            confirmed_by_dentist_at: self.confirmed_by_dentist_at,
            confirmation_sent: self.confirmation_sent,
            whatsapp_sent_at: self.whatsapp_sent_at,
            patient: PersonBrief {
                id: self.patient_id,
                display: patient_display,
            },
            dentist: PersonBrief {
                id: self.dentist_id,
                display: dentist_display,
            },
            procedure: PersonBrief {
                id: self.procedure_id,
                display: self.procedure_name,
            },
        }
    }
}

/* ============================================================
   POST /appointments (create)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub dentist_id: Uuid,
    pub procedure_id: Uuid,
    pub appointment_date: String, // YYYY-MM-DD
    pub appointment_time: String, // HH:MM
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedAppointment {
    pub appointment_id: Uuid,
}

fn parse_date(s: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest("VALIDATION_ERROR", "appointment_date must be YYYY-MM-DD".into())
    })
}

fn parse_time(s: &str) -> Result<NaiveTime, ApiError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| {
            ApiError::BadRequest("VALIDATION_ERROR", "appointment_time must be HH:MM".into())
        })
}

/// Caller must be staff, or the patient booking for themself.
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
    let owner: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT user_id
        FROM patient
        WHERE patient_id = $1
        "#,
    )
    .bind(patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    match owner {
        Some(user_id) if user_id == auth.user_id => Ok(()),
        Some(_) => Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Patients can only act on their own records".into(),
        )),
        None => Err(ApiError::NotFound("NOT_FOUND", "patient not found".into())),
    }
}

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<ApiOk<CreatedAppointment>>, ApiError> {
    ensure_patient_scope(&state, &auth, req.patient_id).await?;

    let date = parse_date(&req.appointment_date)?;
    let time = parse_time(&req.appointment_time)?;
    validate_slot(date, time)?;

    let location = req.location.unwrap_or_default();

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    // The partial unique index over (dentist, date, time, non-cancelled)
    // is the only slot check; a lost race surfaces here as 409.
    let appointment_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO appointment
            (patient_id, dentist_id, procedure_id,
             appointment_date, appointment_time, location,
             status, created_by_user_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING appointment_id
        "#,
    )
    .bind(req.patient_id)
    .bind(req.dentist_id)
    .bind(req.procedure_id)
    .bind(date)
    .bind(time)
    .bind(&location)
    .bind(AppointmentStatus::Pending as i16)
    .bind(auth.user_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => ApiError::Conflict(
            "SLOT_TAKEN",
            "The dentist already has an appointment at this date and time".into(),
        ),
        _ => ApiError::db(e),
    })?;

    #[derive(sqlx::FromRow)]
    struct ContactRow {
        patient_first: String,
        patient_phone: Option<String>,
        dentist_first: String,
        dentist_last: String,
    }

    let contact: ContactRow = sqlx::query_as(
        r#"
        SELECT
          up.first_name AS patient_first,
          up.phone      AS patient_phone,
          ud.first_name AS dentist_first,
          ud.last_name  AS dentist_last
        FROM patient p
        JOIN clinic_user up ON up.user_id = p.user_id
        JOIN dentist d      ON d.dentist_id = $2
        JOIN clinic_user ud ON ud.user_id = d.user_id
        WHERE p.patient_id = $1
        "#,
    )
    .bind(req.patient_id)
    .bind(req.dentist_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    // Booking reminder: queued in the same transaction, delivered
    // after commit. Skipped silently when no phone is on file.
    let queued = match contact
        .patient_phone
        .as_deref()
        .and_then(|p| state.whatsapp.normalize_phone(p))
    {
        Some(phone) => {
            let dentist_name = format!("{} {}", contact.dentist_first, contact.dentist_last);
            let message =
                templates::appointment_reminder(&contact.patient_first, date, time, &dentist_name);
            let notification_id = dispatch::queue_whatsapp(
                &mut *tx,
                req.patient_id,
                Some(appointment_id),
                TemplateKind::AppointmentReminder,
                &message,
            )
            .await
            .map_err(ApiError::db)?;
            Some((notification_id, phone))
        }
        None => None,
    };

    tx.commit().await.map_err(ApiError::db)?;

    if let Some((notification_id, phone)) = queued {
        if let Err(e) = dispatch::deliver(&state.db, &state.whatsapp, notification_id, &phone).await
        {
            warn!(%appointment_id, "booking reminder not delivered: {e}");
        }
    }

    Ok(Json(ApiOk {
        data: CreatedAppointment { appointment_id },
    }))
}

/* ============================================================
   GET /appointments/slots
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: String, // YYYY-MM-DD
    pub dentist_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AvailableSlots {
    pub date: NaiveDate,
    pub dentist_id: Uuid,
    pub slots: Vec<NaiveTime>,
}

/// Free half-hour slots for one dentist on one day; what the booking
/// form offers. Weekends have no slots at all.
pub async fn get_available_slots(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<SlotsQuery>,
) -> Result<Json<ApiOk<AvailableSlots>>, ApiError> {
    let date = parse_date(&q.date)?;

    if !scheduling::is_business_day(date) {
        return Ok(Json(ApiOk {
            data: AvailableSlots {
                date,
                dentist_id: q.dentist_id,
                slots: Vec::new(),
            },
        }));
    }

    let taken: Vec<NaiveTime> = sqlx::query_scalar(
        r#"
        SELECT appointment_time
        FROM appointment
        WHERE dentist_id = $1
          AND appointment_date = $2
          AND status <> $3
        "#,
    )
    .bind(q.dentist_id)
    .bind(date)
    .bind(AppointmentStatus::Cancelled as i16)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let slots = scheduling::slot_times()
        .into_iter()
        .filter(|t| !taken.contains(t))
        .collect();

    Ok(Json(ApiOk {
        data: AvailableSlots {
            date,
            dentist_id: q.dentist_id,
            slots,
        },
    }))
}

/* ============================================================
   GET /appointments/day
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: String, // YYYY-MM-DD
    pub dentist_id: Option<Uuid>,
}

async fn resolve_dentist_id_by_user(state: &AppState, user_id: Uuid) -> Result<Uuid, ApiError> {
    sqlx::query_scalar(
        r#"
        SELECT dentist_id
        FROM dentist
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| {
        ApiError::BadRequest(
            "NO_DENTIST_PROFILE",
            "Dentist account has no dentist profile".into(),
        )
    })
}

pub async fn get_appointments_day(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<DayQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentDto>>>, ApiError> {
    ensure_staff(&auth)?;
    let date = parse_date(&q.date)?;

    // Dentists only see their own day; admin/receptionist pick one.
    let dentist_id = if auth.role == ROLE_DENTIST {
        let own = resolve_dentist_id_by_user(&state, auth.user_id).await?;
        if q.dentist_id.is_some_and(|id| id != own) {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "Dentists can only view their own schedule".into(),
            ));
        }
        own
    } else {
        q.dentist_id.ok_or_else(|| {
            ApiError::BadRequest("VALIDATION_ERROR", "dentist_id is required".into())
        })?
    };

    let sql = format!(
        "{DETAIL_SELECT} WHERE a.dentist_id = $1 AND a.appointment_date = $2 \
         ORDER BY a.appointment_time ASC"
    );
    let rows: Vec<AppointmentDetailRow> = sqlx::query_as(&sql)
        .bind(dentist_id)
        .bind(date)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: rows.into_iter().map(AppointmentDetailRow::into_dto).collect(),
    }))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let detail = load_detail(&state, appointment_id).await?;

    if !is_staff(&auth) && detail.patient_user_id != auth.user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Patients can only view their own appointments".into(),
        ));
    }

    Ok(Json(ApiOk {
        data: detail.into_dto(),
    }))
}

/* ============================================================
   GET /patients/{id}/appointments
   ============================================================ */

pub async fn list_patient_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<AppointmentDto>>>, ApiError> {
    ensure_patient_scope(&state, &auth, patient_id).await?;

    let sql = format!(
        "{DETAIL_SELECT} WHERE a.patient_id = $1 \
         ORDER BY a.appointment_date DESC, a.appointment_time DESC"
    );
    let rows: Vec<AppointmentDetailRow> = sqlx::query_as(&sql)
        .bind(patient_id)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: rows.into_iter().map(AppointmentDetailRow::into_dto).collect(),
    }))
}

/* ============================================================
   POST /appointments/{id}/confirm  (patient side of the handshake)
   ============================================================ */

pub async fn confirm_by_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let detail = load_detail(&state, appointment_id).await?;

    if detail.patient_user_id != auth.user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only the appointment's patient can confirm it".into(),
        ));
    }
    if matches!(
        detail.status,
        AppointmentStatus::Cancelled | AppointmentStatus::Completed | AppointmentStatus::NoShow
    ) {
        return Err(ApiError::Conflict(
            "INVALID_TRANSITION",
            "This appointment can no longer be confirmed".into(),
        ));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    sqlx::query(
        r#"
        UPDATE appointment
        SET confirmed_by_patient = true,
            confirmed_at = now(),
            updated_at = now()
        WHERE appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    // Staff-facing record of the patient's answer.
    dispatch::record_in_app(
        &mut *tx,
        detail.patient_id,
        Some(appointment_id),
        TemplateKind::ConfirmationRequest,
        "Paciente confirmou a consulta",
    )
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

/* ============================================================
   Dentist-side confirmation + WhatsApp
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct WhatsAppPreview {
    pub phone: Option<String>,
    pub message: String,
}

/// Rendered confirmation message without sending it; the front end
/// shows this before the staff member commits to the send.
pub async fn whatsapp_preview(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<WhatsAppPreview>>, ApiError> {
    ensure_staff(&auth)?;
    let detail = load_detail(&state, appointment_id).await?;

    let message = templates::appointment_confirmed(
        detail.appointment_date,
        detail.appointment_time,
        &detail.location,
        &detail.procedure_name,
        &detail.dentist_name(),
    );
    let phone = detail
        .patient_phone
        .as_deref()
        .and_then(|p| state.whatsapp.normalize_phone(p));

    Ok(Json(ApiOk {
        data: WhatsAppPreview { phone, message },
    }))
}

pub async fn confirm_by_dentist(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    ensure_staff(&auth)?;
    let detail = load_detail(&state, appointment_id).await?;

    if detail.status != AppointmentStatus::Pending {
        return Err(ApiError::Conflict(
            "INVALID_TRANSITION",
            "Only a pending appointment can be confirmed".into(),
        ));
    }

    let message = templates::appointment_confirmed(
        detail.appointment_date,
        detail.appointment_time,
        &detail.location,
        &detail.procedure_name,
        &detail.dentist_name(),
    );
    let phone = detail
        .patient_phone
        .as_deref()
        .and_then(|p| state.whatsapp.normalize_phone(p));

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    sqlx::query(
        r#"
        UPDATE appointment
        SET status = $2,
            confirmed_by_dentist_at = now(),
            updated_at = now()
        WHERE appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .bind(AppointmentStatus::Confirmed as i16)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let queued = match &phone {
        Some(_) => Some(
            dispatch::queue_whatsapp(
                &mut *tx,
                detail.patient_id,
                Some(appointment_id),
                TemplateKind::AppointmentConfirmed,
                &message,
            )
            .await
            .map_err(ApiError::db)?,
        ),
        None => None,
    };

    tx.commit().await.map_err(ApiError::db)?;

    // Delivery is best-effort: the confirmation itself is already
    // committed; the outbox row keeps the failure visible.
    if let (Some(notification_id), Some(phone)) = (queued, phone) {
        match dispatch::deliver(&state.db, &state.whatsapp, notification_id, &phone).await {
            Ok(()) => {
                let _ = sqlx::query(
                    r#"
                    UPDATE appointment
                    SET whatsapp_sent_at = now()
                    WHERE appointment_id = $1
                    "#,
                )
                .bind(appointment_id)
                .execute(&state.db)
                .await;
            }
            Err(e) => warn!(%appointment_id, "confirmation message not delivered: {e}"),
        }
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

/* ============================================================
   Cancel / complete / no-show
   ============================================================ */

async fn transition(
    state: &AppState,
    appointment_id: Uuid,
    from: &[AppointmentStatus],
    to: AppointmentStatus,
) -> Result<(), ApiError> {
    let from_codes: Vec<i16> = from.iter().map(|s| *s as i16).collect();
    let res = sqlx::query(
        r#"
        UPDATE appointment
        SET status = $2, updated_at = now()
        WHERE appointment_id = $1
          AND status = ANY($3)
        "#,
    )
    .bind(appointment_id)
    .bind(to as i16)
    .bind(&from_codes)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM appointment WHERE appointment_id = $1)"#,
        )
        .bind(appointment_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;

        return if exists {
            Err(ApiError::Conflict(
                "INVALID_TRANSITION",
                "Appointment is not in a state that allows this transition".into(),
            ))
        } else {
            Err(ApiError::NotFound("NOT_FOUND", "appointment not found".into()))
        };
    }
    Ok(())
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let detail = load_detail(&state, appointment_id).await?;
    if !is_staff(&auth) && detail.patient_user_id != auth.user_id {
        return Err(ApiError::Forbidden("FORBIDDEN", "Access denied".into()));
    }

    // Completed and no-show visits stay as history; cancellation only
    // applies while the appointment is still ahead.
    transition(
        &state,
        appointment_id,
        &[AppointmentStatus::Pending, AppointmentStatus::Confirmed],
        AppointmentStatus::Cancelled,
    )
    .await?;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

pub async fn mark_completed(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    ensure_staff(&auth)?;
    transition(
        &state,
        appointment_id,
        &[AppointmentStatus::Pending, AppointmentStatus::Confirmed],
        AppointmentStatus::Completed,
    )
    .await?;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

pub async fn mark_no_show(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    ensure_staff(&auth)?;
    let detail = load_detail(&state, appointment_id).await?;

    transition(
        &state,
        appointment_id,
        &[AppointmentStatus::Pending, AppointmentStatus::Confirmed],
        AppointmentStatus::NoShow,
    )
    .await?;

    // Invite the patient to rebook.
    if let Some(phone) = detail
        .patient_phone
        .as_deref()
        .and_then(|p| state.whatsapp.normalize_phone(p))
    {
        let message = templates::no_show_notice(&detail.patient_first);
        match dispatch::queue_whatsapp(
            &state.db,
            detail.patient_id,
            Some(appointment_id),
            TemplateKind::NoShowNotice,
            &message,
        )
        .await
        {
            Ok(notification_id) => {
                if let Err(e) =
                    dispatch::deliver(&state.db, &state.whatsapp, notification_id, &phone).await
                {
                    warn!(%appointment_id, "no-show notice not delivered: {e}");
                }
            }
            Err(e) => warn!(%appointment_id, "failed to queue no-show notice: {e}"),
        }
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}
