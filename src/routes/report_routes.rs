// src/routes/report_routes.rs

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{Local, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, ROLE_ADMIN, ROLE_DENTIST, ROLE_RECEPTIONIST},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/reports/summary", get(summary))
}

fn ensure_staff(auth: &AuthContext) -> Result<(), ApiError> {
    if matches!(auth.role, ROLE_ADMIN | ROLE_RECEPTIONIST | ROLE_DENTIST) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only clinic staff can view reports".into(),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPeriod {
    Month,
    Quarter,
    Year,
}

impl ReportPeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "month" => Some(Self::Month),
            "quarter" => Some(Self::Quarter),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    /// Rolling window ending today: last month, last quarter, last year.
    pub fn window_start(self, today: NaiveDate) -> NaiveDate {
        let months = match self {
            Self::Month => 1,
            Self::Quarter => 3,
            Self::Year => 12,
        };
        today - Months::new(months)
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub period: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub total_appointments: i64,
    pub completed_appointments: i64,
    pub cancelled_appointments: i64,
    pub no_show_appointments: i64,
    pub attendance_rate: f64,
    pub revenue_cents: i64,
    pub avg_revenue_per_completed_cents: i64,
    pub new_patients: i64,
    pub pending_payments: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    total_appointments: i64,
    completed_appointments: i64,
    cancelled_appointments: i64,
    no_show_appointments: i64,
    revenue_cents: i64,
    new_patients: i64,
    pending_payments: i64,
}

/// Percentage of appointments in the window that were completed.
pub fn attendance_rate(completed: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    completed as f64 / total as f64 * 100.0
}

pub fn avg_per_completed(revenue_cents: i64, completed: i64) -> i64 {
    if completed == 0 { 0 } else { revenue_cents / completed }
}

pub async fn summary(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<SummaryQuery>,
) -> Result<Json<ApiOk<ReportSummary>>, ApiError> {
    ensure_staff(&auth)?;

    let period_str = q.period.as_deref().unwrap_or("month");
    let period = ReportPeriod::parse(period_str).ok_or_else(|| {
        ApiError::BadRequest(
            "VALIDATION_ERROR",
            "period must be one of: month, quarter, year".into(),
        )
    })?;

    let today = Local::now().date_naive();
    let start = period.window_start(today);

    // Appointment counts and revenue are windowed; pending payments are a
    // live backlog figure and deliberately ignore the window.
    let row: SummaryRow = sqlx::query_as(
        r#"
        SELECT
          (SELECT count(*) FROM appointment
            WHERE appointment_date BETWEEN $1 AND $2)                     AS total_appointments,
          (SELECT count(*) FROM appointment
            WHERE appointment_date BETWEEN $1 AND $2 AND status = 2)      AS completed_appointments,
          (SELECT count(*) FROM appointment
            WHERE appointment_date BETWEEN $1 AND $2 AND status = 3)      AS cancelled_appointments,
          (SELECT count(*) FROM appointment
            WHERE appointment_date BETWEEN $1 AND $2 AND status = 4)      AS no_show_appointments,
          (SELECT COALESCE(sum(amount_cents), 0)::bigint FROM payment
            WHERE status = 1
              AND payment_date BETWEEN $1 AND $2)                         AS revenue_cents,
          (SELECT count(*) FROM patient
            WHERE created_at::date BETWEEN $1 AND $2)                     AS new_patients,
          (SELECT count(*) FROM payment WHERE status = 0)                 AS pending_payments
        "#,
    )
    .bind(start)
    .bind(today)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    let summary = ReportSummary {
        period: period_str.to_string(),
        window_start: start,
        window_end: today,
        attendance_rate: attendance_rate(row.completed_appointments, row.total_appointments),
        avg_revenue_per_completed_cents: avg_per_completed(
            row.revenue_cents,
            row.completed_appointments,
        ),
        total_appointments: row.total_appointments,
        completed_appointments: row.completed_appointments,
        cancelled_appointments: row.cancelled_appointments,
        no_show_appointments: row.no_show_appointments,
        revenue_cents: row.revenue_cents,
        new_patients: row.new_patients,
        pending_payments: row.pending_payments,
    };

    Ok(Json(ApiOk { data: summary }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_periods() {
        assert_eq!(ReportPeriod::parse("month"), Some(ReportPeriod::Month));
        assert_eq!(ReportPeriod::parse("quarter"), Some(ReportPeriod::Quarter));
        assert_eq!(ReportPeriod::parse("year"), Some(ReportPeriod::Year));
        assert_eq!(ReportPeriod::parse("week"), None);
        assert_eq!(ReportPeriod::parse(""), None);
    }

    #[test]
    fn windows_roll_back_from_today() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 17).unwrap();
        assert_eq!(
            ReportPeriod::Month.window_start(today),
            NaiveDate::from_ymd_opt(2025, 5, 17).unwrap()
        );
        assert_eq!(
            ReportPeriod::Quarter.window_start(today),
            NaiveDate::from_ymd_opt(2025, 3, 17).unwrap()
        );
        assert_eq!(
            ReportPeriod::Year.window_start(today),
            NaiveDate::from_ymd_opt(2024, 6, 17).unwrap()
        );
    }

    #[test]
    fn month_window_clamps_to_shorter_month() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        assert_eq!(
            ReportPeriod::Month.window_start(today),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
    }

    #[test]
    fn attendance_rate_guards_zero_denominator() {
        assert_eq!(attendance_rate(0, 0), 0.0);
        assert_eq!(attendance_rate(3, 4), 75.0);
        assert_eq!(attendance_rate(0, 5), 0.0);
    }

    #[test]
    fn avg_revenue_guards_zero_completed() {
        assert_eq!(avg_per_completed(10_000, 0), 0);
        assert_eq!(avg_per_completed(10_000, 4), 2_500);
    }
}
