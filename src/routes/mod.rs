use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod auth_routes;
pub mod dentist_routes;
pub mod faq_routes;
pub mod home_routes;
pub mod notification_routes;
pub mod patient_routes;
pub mod payment_routes;
pub mod procedure_routes;
pub mod report_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", patient_routes::router())
        .nest("/api/v1", dentist_routes::router())
        .nest("/api/v1", procedure_routes::router())
        .nest("/api/v1", payment_routes::router())
        .nest("/api/v1", notification_routes::router())
        .nest("/api/v1", report_routes::router())
        .nest("/api/v1", faq_routes::router())
        .merge(home_routes::router())
        .with_state(state)
}
