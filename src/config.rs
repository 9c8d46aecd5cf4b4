use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    /// Shared secret for the reminder sweep (an external cron invokes it).
    pub cron_secret: String,
    /// Outbound WhatsApp webhook. When unset, sends are logged only.
    pub whatsapp_webhook_url: Option<String>,
    pub whatsapp_sender: Option<String>,
    pub default_country_code: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let session_ttl_hours = env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(24);
        let cron_secret = env::var("CRON_SECRET")?;
        let whatsapp_webhook_url = env::var("WHATSAPP_WEBHOOK_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let whatsapp_sender = env::var("WHATSAPP_SENDER")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let default_country_code =
            env::var("DEFAULT_COUNTRY_CODE").unwrap_or_else(|_| "55".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            cron_secret,
            whatsapp_webhook_url,
            whatsapp_sender,
            default_country_code,
        })
    }
}
