use sqlx::PgPool;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::models::{NotificationChannel, NotificationStatus};
use crate::templates::TemplateKind;
use crate::whatsapp::{GatewayError, WhatsAppClient};

const MAX_ATTEMPTS: i16 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Insert a pending WhatsApp notification row. Called inside the same
/// transaction as the state change it describes, so a committed state
/// change always has its outbox record and vice versa. Delivery
/// happens after commit via [`deliver`].
pub async fn queue_whatsapp<'e, E>(
    executor: E,
    patient_id: Uuid,
    appointment_id: Option<Uuid>,
    kind: TemplateKind,
    message: &str,
) -> Result<Uuid, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO notification
            (patient_id, appointment_id, notification_type, message, channel, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING notification_id
        "#,
    )
    .bind(patient_id)
    .bind(appointment_id)
    .bind(kind as i16)
    .bind(message)
    .bind(NotificationChannel::Whatsapp as i16)
    .bind(NotificationStatus::Pending as i16)
    .fetch_one(executor)
    .await
}

/// Record an in-app notification. There is no external delivery step,
/// so the row is written as sent immediately.
pub async fn record_in_app<'e, E>(
    executor: E,
    patient_id: Uuid,
    appointment_id: Option<Uuid>,
    kind: TemplateKind,
    message: &str,
) -> Result<Uuid, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO notification
            (patient_id, appointment_id, notification_type, message, channel, status, sent_at)
        VALUES ($1, $2, $3, $4, $5, $6, now())
        RETURNING notification_id
        "#,
    )
    .bind(patient_id)
    .bind(appointment_id)
    .bind(kind as i16)
    .bind(message)
    .bind(NotificationChannel::InApp as i16)
    .bind(NotificationStatus::Sent as i16)
    .fetch_one(executor)
    .await
}

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    message: String,
    status: i16,
}

/// Deliver one queued notification to the gateway. Idempotent per
/// notification id: an already-sent row is not re-delivered. The row
/// moves to sent only after the gateway acknowledges; after
/// MAX_ATTEMPTS failures it is marked failed.
pub async fn deliver(
    db: &PgPool,
    wa: &WhatsAppClient,
    notification_id: Uuid,
    phone: &str,
) -> Result<(), GatewayError> {
    let row: Option<OutboxRow> = sqlx::query_as(
        r#"
        SELECT message, status
        FROM notification
        WHERE notification_id = $1
        "#,
    )
    .bind(notification_id)
    .fetch_optional(db)
    .await
    .unwrap_or_else(|e| {
        warn!(%notification_id, "outbox lookup failed: {e}");
        None
    });

    let Some(row) = row else {
        return Ok(());
    };
    if row.status == NotificationStatus::Sent as i16 {
        return Ok(());
    }

    let mut attempt: i16 = 0;
    loop {
        attempt += 1;
        match wa.send(phone, &row.message).await {
            Ok(()) => {
                mark(db, notification_id, NotificationStatus::Sent, attempt).await;
                return Ok(());
            }
            Err(e) => {
                warn!(%notification_id, attempt, "whatsapp delivery failed: {e}");
                if attempt >= MAX_ATTEMPTS {
                    mark(db, notification_id, NotificationStatus::Failed, attempt).await;
                    return Err(e);
                }
                tokio::time::sleep(BASE_BACKOFF * 2u32.pow(attempt as u32 - 1)).await;
            }
        }
    }
}

async fn mark(db: &PgPool, notification_id: Uuid, status: NotificationStatus, attempts: i16) {
    let sent = status == NotificationStatus::Sent;
    let res = sqlx::query(
        r#"
        UPDATE notification
        SET status = $2,
            attempts = $3,
            sent_at = CASE WHEN $4 THEN now() ELSE sent_at END
        WHERE notification_id = $1
        "#,
    )
    .bind(notification_id)
    .bind(status as i16)
    .bind(attempts)
    .bind(sent)
    .execute(db)
    .await;

    if let Err(e) = res {
        warn!(%notification_id, "failed to update outbox status: {e}");
    }
}
