use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("whatsapp webhook returned status {0}")]
    Status(u16),
    #[error("whatsapp webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Outbound WhatsApp delivery. Messages are forwarded to an external
/// webhook as `{phone, message}`; when no webhook is configured the
/// send is logged and treated as delivered (local/dev mode).
#[derive(Clone)]
pub struct WhatsAppClient {
    http: Client,
    webhook_url: Option<String>,
    sender: Option<String>,
    country_code: String,
}

impl WhatsAppClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            http: Client::new(),
            webhook_url: cfg.whatsapp_webhook_url.clone(),
            sender: cfg.whatsapp_sender.clone(),
            country_code: cfg.default_country_code.clone(),
        }
    }

    #[cfg(test)]
    fn with_webhook(url: &str, country_code: &str) -> Self {
        Self {
            http: Client::new(),
            webhook_url: Some(url.to_string()),
            sender: None,
            country_code: country_code.to_string(),
        }
    }

    /// Normalize a patient phone number for the gateway: digits only,
    /// prefixed with the country code when not already present.
    /// Returns None when nothing dialable remains.
    pub fn normalize_phone(&self, raw: &str) -> Option<String> {
        normalize_phone(raw, &self.country_code)
    }

    /// Forward one rendered message to the gateway. The `phone` must
    /// already be normalized.
    pub async fn send(&self, phone: &str, message: &str) -> Result<(), GatewayError> {
        let Some(url) = &self.webhook_url else {
            info!(phone, "WHATSAPP_WEBHOOK_URL not set; simulating send");
            return Ok(());
        };

        let mut body = json!({
            "phone": phone,
            "message": message,
        });
        if let Some(sender) = &self.sender {
            body["sender"] = json!(sender);
        }

        let resp = self.http.post(url).json(&body).send().await?;
        if !resp.status().is_success() {
            warn!(phone, status = %resp.status(), "whatsapp webhook rejected message");
            return Err(GatewayError::Status(resp.status().as_u16()));
        }

        info!(phone, "whatsapp message forwarded to gateway");
        Ok(())
    }
}

pub fn normalize_phone(raw: &str, country_code: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if digits.starts_with(country_code) {
        Some(digits)
    } else {
        Some(format!("{country_code}{digits}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_country_code() {
        assert_eq!(
            normalize_phone("11999999999", "55").as_deref(),
            Some("5511999999999")
        );
    }

    #[test]
    fn strips_plus_and_punctuation() {
        assert_eq!(
            normalize_phone("+55 (11) 99999-9999", "55").as_deref(),
            Some("5511999999999")
        );
    }

    #[test]
    fn idempotent_under_second_pass() {
        let once = normalize_phone("11999999999", "55").unwrap();
        let twice = normalize_phone(&once, "55").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input_is_none() {
        assert_eq!(normalize_phone("", "55"), None);
        assert_eq!(normalize_phone("  +  ", "55"), None);
    }

    mod gateway {
        use super::super::*;
        use wiremock::matchers::{body_partial_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        #[tokio::test]
        async fn forwards_message_on_2xx() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/webhook/whatsapp"))
                .and(body_partial_json(serde_json::json!({
                    "phone": "5511999999999",
                    "message": "Olá"
                })))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;

            let client =
                WhatsAppClient::with_webhook(&format!("{}/webhook/whatsapp", server.uri()), "55");
            let result = client.send("5511999999999", "Olá").await;
            assert!(result.is_ok());
        }

        #[tokio::test]
        async fn surfaces_gateway_rejection() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&server)
                .await;

            let client = WhatsAppClient::with_webhook(&server.uri(), "55");
            let err = client.send("5511999999999", "Olá").await.unwrap_err();
            match err {
                GatewayError::Status(code) => assert_eq!(code, 500),
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn simulates_when_no_webhook_configured() {
            let client = WhatsAppClient {
                http: Client::new(),
                webhook_url: None,
                sender: None,
                country_code: "55".to_string(),
            };
            assert!(client.send("5511999999999", "Olá").await.is_ok());
        }
    }
}
