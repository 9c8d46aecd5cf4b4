// src/routes/notification_routes.rs
//
// Single entry point for outbound patient messaging. The original UI
// had grown two overlapping WhatsApp-send endpoints; everything now
// funnels through the one dispatcher and the notification outbox.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_extra::TypedHeader;
use chrono::{Duration, Local, NaiveDate, NaiveTime};
use headers::{Authorization, authorization::Bearer};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::secrets_match,
    dispatch,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        ApiOk, AppState, AppointmentStatus, NotificationChannel, NotificationRow, ROLE_ADMIN,
        ROLE_DENTIST, ROLE_PATIENT, ROLE_RECEPTIONIST,
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
            "Only clinic staff can send notifications".into(),
        ))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications/send", post(send_notification))
        .route("/notifications/send-reminders", post(send_reminders))
        .route("/patients/{patient_id}/notifications", get(list_notifications))
}

/* ============================================================
   POST /notifications/send
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub kind: TemplateKind,
    #[serde(default)]
    pub channel: Option<NotificationChannel>,
    /// Free-form body; overrides template rendering when present.
    pub message: Option<String>,
    // Template arguments, required depending on `kind`.
    pub instructions: Option<String>,
    pub question: Option<String>,
    pub answer: Option<String>,
    pub amount_cents: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct SendNotificationData {
    pub notification_id: Uuid,
    pub channel: NotificationChannel,
}

#[derive(Debug, sqlx::FromRow)]
struct PatientContactRow {
    patient_id: Uuid,
    first_name: String,
    phone: Option<String>,
}

async fn load_patient_contact(
    state: &AppState,
    patient_id: Uuid,
) -> Result<PatientContactRow, ApiError> {
    sqlx::query_as::<_, PatientContactRow>(
        r#"
        SELECT p.patient_id, u.first_name, u.phone
        FROM patient p
        JOIN clinic_user u ON u.user_id = p.user_id
        WHERE p.patient_id = $1
        "#,
    )
    .bind(patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "patient not found".into()))
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentBriefRow {
    appointment_date: NaiveDate,
    appointment_time: NaiveTime,
    location: String,
    procedure_name: String,
    dentist_first: String,
    dentist_last: String,
}

async fn load_appointment_brief(
    state: &AppState,
    appointment_id: Uuid,
) -> Result<AppointmentBriefRow, ApiError> {
    sqlx::query_as::<_, AppointmentBriefRow>(
        r#"
        SELECT
          a.appointment_date,
          a.appointment_time,
          a.location,
          pr.name       AS procedure_name,
          ud.first_name AS dentist_first,
          ud.last_name  AS dentist_last
        FROM appointment a
        JOIN procedure pr   ON pr.procedure_id = a.procedure_id
        JOIN dentist d      ON d.dentist_id = a.dentist_id
        JOIN clinic_user ud ON ud.user_id = d.user_id
        WHERE a.appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "appointment not found".into()))
}

fn missing(field: &str) -> ApiError {
    ApiError::BadRequest("VALIDATION_ERROR", format!("{field} is required for this kind"))
}

async fn render_message(
    state: &AppState,
    req: &SendNotificationRequest,
    patient_first_name: &str,
) -> Result<String, ApiError> {
    if let Some(custom) = req.message.as_deref().map(str::trim) {
        if !custom.is_empty() {
            return Ok(custom.to_string());
        }
    }

    let message = match req.kind {
        TemplateKind::AppointmentReminder => {
            let id = req.appointment_id.ok_or_else(|| missing("appointment_id"))?;
            let apt = load_appointment_brief(state, id).await?;
            templates::appointment_reminder(
                patient_first_name,
                apt.appointment_date,
                apt.appointment_time,
                &format!("{} {}", apt.dentist_first, apt.dentist_last),
            )
        }
        TemplateKind::ConfirmationRequest => {
            let id = req.appointment_id.ok_or_else(|| missing("appointment_id"))?;
            let apt = load_appointment_brief(state, id).await?;
            templates::confirmation_request(
                patient_first_name,
                apt.appointment_date,
                apt.appointment_time,
            )
        }
        TemplateKind::AppointmentConfirmed => {
            let id = req.appointment_id.ok_or_else(|| missing("appointment_id"))?;
            let apt = load_appointment_brief(state, id).await?;
            templates::appointment_confirmed(
                apt.appointment_date,
                apt.appointment_time,
                &apt.location,
                &apt.procedure_name,
                &format!("{} {}", apt.dentist_first, apt.dentist_last),
            )
        }
        TemplateKind::PaymentReminder => {
            let amount = req.amount_cents.ok_or_else(|| missing("amount_cents"))?;
            let due = req.due_date.ok_or_else(|| missing("due_date"))?;
            templates::payment_reminder(patient_first_name, amount, due)
        }
        TemplateKind::PaymentReceipt => {
            let amount = req.amount_cents.ok_or_else(|| missing("amount_cents"))?;
            templates::payment_receipt(patient_first_name, amount)
        }
        TemplateKind::PostCareInstructions => {
            let instructions = req.instructions.as_deref().ok_or_else(|| missing("instructions"))?;
            templates::post_care_instructions(patient_first_name, instructions)
        }
        TemplateKind::FaqResponse => {
            let question = req.question.as_deref().ok_or_else(|| missing("question"))?;
            let answer = req.answer.as_deref().ok_or_else(|| missing("answer"))?;
            templates::faq_response(patient_first_name, question, answer)
        }
        TemplateKind::NoShowNotice => templates::no_show_notice(patient_first_name),
        TemplateKind::GeneralInfo => return Err(missing("message")),
    };

    Ok(message)
}

pub async fn send_notification(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<SendNotificationRequest>,
) -> Result<Json<ApiOk<SendNotificationData>>, ApiError> {
    ensure_staff(&auth)?;

    let patient = load_patient_contact(&state, req.patient_id).await?;
    let channel = req.channel.unwrap_or(NotificationChannel::Whatsapp);
    let message = render_message(&state, &req, &patient.first_name).await?;

    if channel == NotificationChannel::InApp {
        let notification_id = dispatch::record_in_app(
            &state.db,
            patient.patient_id,
            req.appointment_id,
            req.kind,
            &message,
        )
        .await
        .map_err(ApiError::db)?;

        return Ok(Json(ApiOk {
            data: SendNotificationData {
                notification_id,
                channel,
            },
        }));
    }

    // WhatsApp requires a dialable number; no gateway call otherwise.
    let phone = patient
        .phone
        .as_deref()
        .and_then(|p| state.whatsapp.normalize_phone(p))
        .ok_or_else(|| {
            ApiError::BadRequest(
                "VALIDATION_ERROR",
                "patient has no phone number on file".into(),
            )
        })?;

    let notification_id = dispatch::queue_whatsapp(
        &state.db,
        patient.patient_id,
        req.appointment_id,
        req.kind,
        &message,
    )
    .await
    .map_err(ApiError::db)?;

    dispatch::deliver(&state.db, &state.whatsapp, notification_id, &phone)
        .await
        .map_err(|e| ApiError::Upstream(format!("whatsapp delivery failed: {e}")))?;

    Ok(Json(ApiOk {
        data: SendNotificationData {
            notification_id,
            channel,
        },
    }))
}

/* ============================================================
   POST /notifications/send-reminders  (cron sweep)
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct SendRemindersResponse {
    pub data: SendRemindersData,
}

#[derive(Debug, Serialize)]
pub struct SendRemindersData {
    pub sent_count: u32,
    pub message: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ReminderRow {
    appointment_id: Uuid,
    patient_id: Uuid,
    appointment_date: NaiveDate,
    appointment_time: NaiveTime,
    patient_first: String,
    patient_phone: Option<String>,
}

/// Next-day confirmation sweep. Authenticated by the cron shared
/// secret, not a user session; invoked by an external scheduler.
pub async fn send_reminders(
    State(state): State<AppState>,
    TypedHeader(authz): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<SendRemindersResponse>, ApiError> {
    if !secrets_match(authz.token(), &state.cron_secret) {
        return Err(ApiError::Unauthorized(
            "UNAUTHORIZED",
            "Invalid reminder credential".into(),
        ));
    }

    let tomorrow = Local::now().date_naive() + Duration::days(1);

    let rows: Vec<ReminderRow> = sqlx::query_as(
        r#"
        SELECT
          a.appointment_id,
          a.patient_id,
          a.appointment_date,
          a.appointment_time,
          up.first_name AS patient_first,
          up.phone      AS patient_phone
        FROM appointment a
        JOIN patient p      ON p.patient_id = a.patient_id
        JOIN clinic_user up ON up.user_id = p.user_id
        WHERE a.appointment_date = $1
          AND a.confirmed_by_patient = false
          AND a.status <> $2
        ORDER BY a.appointment_time ASC
        "#,
    )
    .bind(tomorrow)
    .bind(AppointmentStatus::Cancelled as i16)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let mut sent_count: u32 = 0;

    for apt in rows {
        let Some(phone) = apt
            .patient_phone
            .as_deref()
            .and_then(|p| state.whatsapp.normalize_phone(p))
        else {
            continue;
        };

        let message = templates::confirmation_request(
            &apt.patient_first,
            apt.appointment_date,
            apt.appointment_time,
        );

        // One failed appointment must not sink the sweep.
        let notification_id = match dispatch::queue_whatsapp(
            &state.db,
            apt.patient_id,
            Some(apt.appointment_id),
            TemplateKind::ConfirmationRequest,
            &message,
        )
        .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(appointment_id = %apt.appointment_id, "failed to queue reminder: {e}");
                continue;
            }
        };

        match dispatch::deliver(&state.db, &state.whatsapp, notification_id, &phone).await {
            Ok(()) => {
                let res = sqlx::query(
                    r#"
                    UPDATE appointment
                    SET confirmation_sent = true, updated_at = now()
                    WHERE appointment_id = $1
                    "#,
                )
                .bind(apt.appointment_id)
                .execute(&state.db)
                .await;
                if let Err(e) = res {
                    warn!(appointment_id = %apt.appointment_id, "reminder sent but flag not set: {e}");
                }
                sent_count += 1;
            }
            Err(e) => {
                warn!(appointment_id = %apt.appointment_id, "reminder not delivered: {e}");
            }
        }
    }

    info!(sent_count, %tomorrow, "reminder sweep finished");

    Ok(Json(SendRemindersResponse {
        data: SendRemindersData {
            sent_count,
            message: format!("{sent_count} lembretes de confirmação enviados"),
        },
    }))
}

/* ============================================================
   GET /patients/{id}/notifications
   ============================================================ */

pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<NotificationRow>>>, ApiError> {
    if !is_staff(&auth) {
        if auth.role != ROLE_PATIENT {
            return Err(ApiError::Forbidden("FORBIDDEN", "Access denied".into()));
        }
        let owner: Option<Uuid> =
            sqlx::query_scalar(r#"SELECT user_id FROM patient WHERE patient_id = $1"#)
                .bind(patient_id)
                .fetch_optional(&state.db)
                .await
                .map_err(ApiError::db)?;
        if owner != Some(auth.user_id) {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "Patients can only view their own notifications".into(),
            ));
        }
    }

    let rows: Vec<NotificationRow> = sqlx::query_as(
        r#"
        SELECT
          notification_id,
          patient_id,
          appointment_id,
          notification_type,
          message,
          channel,
          status,
          attempts,
          sent_at,
          created_at
        FROM notification
        WHERE patient_id = $1
        ORDER BY created_at DESC
        LIMIT 200
        "#,
    )
    .bind(patient_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}
