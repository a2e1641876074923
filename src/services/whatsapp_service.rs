use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::utils::validators::normalize_phone;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WhatsApp provider credentials are not configured")]
    NotConfigured,

    #[error("invalid destination phone: {0:?}")]
    InvalidPhone(String),

    #[error("request to WhatsApp provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WhatsApp provider rejected the message: {status} - {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound messaging channel used by the notification dispatcher.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Delivers `text` to a local phone number (digits, no country code).
    async fn send_text(&self, phone: &str, text: &str) -> Result<(), TransportError>;
}

/// Evolution API client for WhatsApp text messages.
pub struct WhatsAppService {
    config: Config,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: String,
    text: &'a str,
}

impl WhatsAppService {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// `(11) 98765-4321` -> `5511987654321`.
    pub fn international_number(&self, phone: &str) -> Result<String, TransportError> {
        let digits = normalize_phone(phone);
        if digits.is_empty() {
            return Err(TransportError::InvalidPhone(phone.to_string()));
        }
        Ok(format!("{}{}", self.config.whatsapp_country_code, digits))
    }
}

#[async_trait]
impl MessagingTransport for WhatsAppService {
    async fn send_text(&self, phone: &str, text: &str) -> Result<(), TransportError> {
        let (api_url, api_key, instance_id) = self
            .config
            .evolution_credentials()
            .ok_or(TransportError::NotConfigured)?;

        let number = self.international_number(phone)?;
        let url = format!(
            "{}/message/sendText/{}",
            api_url.trim_end_matches('/'),
            instance_id
        );

        let response = self
            .client
            .post(&url)
            .header("apikey", api_key)
            .json(&SendTextRequest { number, text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "WhatsApp API error");
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!("WhatsApp message sent to {}", mask_phone(phone));
        Ok(())
    }
}

/// Keeps only the last four digits for logs.
pub fn mask_phone(phone: &str) -> String {
    let digits = normalize_phone(phone);
    if digits.len() <= 4 {
        return "****".to_string();
    }
    format!("****{}", &digits[digits.len() - 4..])
}
