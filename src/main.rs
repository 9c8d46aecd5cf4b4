mod auth;
mod config;
mod middleware;

mod db;
mod dispatch;
mod error;
mod models;
mod routes;
mod scheduling;
mod templates;
mod whatsapp;

use crate::{config::Config, models::AppState, whatsapp::WhatsAppClient};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;

    let whatsapp = WhatsAppClient::new(&cfg);
    let state = AppState {
        db: pool,
        session_ttl_hours: cfg.session_ttl_hours,
        cron_secret: cfg.cron_secret.clone(),
        whatsapp,
    };

    // Browser clients (the clinic's web frontend) need preflight to pass.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
