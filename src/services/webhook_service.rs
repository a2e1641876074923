use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldError};
use crate::models::ChargeStatus;
use crate::services::charge_service::{ChargeService, TransitionOutcome, TransitionSource};
use crate::services::whatsapp_service::MessagingTransport;
use crate::store::BillingStore;

/// Payload as posted by the payment provider, before any checks.
#[derive(Debug, Deserialize)]
struct RawPaymentWebhook {
    charge_id: Option<String>,
    status: Option<String>,
    paid_at: Option<String>,
    transaction_id: Option<String>,
}

/// Validated webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// `approved` or `paid`.
    PaymentConfirmed {
        charge_id: Uuid,
        paid_at: Option<DateTime<Utc>>,
        transaction_id: Option<String>,
    },
    /// Any other known status, applied as reported.
    PaymentOther {
        charge_id: Uuid,
        status: ChargeStatus,
        transaction_id: Option<String>,
    },
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> AppResult<Self> {
        let raw: RawPaymentWebhook = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("JSON inválido: {}", e)))?;

        let mut errors = Vec::new();

        let charge_id = match raw.charge_id.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => match Uuid::parse_str(value) {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.push(FieldError::new("charge_id", "charge_id deve ser um UUID válido"));
                    None
                }
            },
            _ => {
                errors.push(FieldError::new("charge_id", "charge_id é obrigatório"));
                None
            }
        };

        let status = match raw.status.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => match parse_provider_status(value) {
                Some(status) => Some(status),
                None => {
                    errors.push(FieldError::new(
                        "status",
                        format!("status desconhecido: {}", value),
                    ));
                    None
                }
            },
            _ => {
                errors.push(FieldError::new("status", "status é obrigatório"));
                None
            }
        };

        let paid_at = match raw.paid_at.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => match parse_paid_at(value) {
                Some(paid_at) => Some(paid_at),
                None => {
                    errors.push(FieldError::new(
                        "paid_at",
                        "paid_at deve estar em RFC 3339 ou YYYY-MM-DD",
                    ));
                    None
                }
            },
            _ => None,
        };

        let transaction_id = raw
            .transaction_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        match (charge_id, status) {
            (Some(charge_id), Some(ChargeStatus::Paid)) if errors.is_empty() => {
                Ok(WebhookEvent::PaymentConfirmed {
                    charge_id,
                    paid_at,
                    transaction_id,
                })
            }
            (Some(charge_id), Some(status)) if errors.is_empty() => Ok(WebhookEvent::PaymentOther {
                charge_id,
                status,
                transaction_id,
            }),
            _ => Err(AppError::InvalidFields(errors)),
        }
    }

    pub fn charge_id(&self) -> Uuid {
        match self {
            WebhookEvent::PaymentConfirmed { charge_id, .. }
            | WebhookEvent::PaymentOther { charge_id, .. } => *charge_id,
        }
    }

    pub fn target_status(&self) -> ChargeStatus {
        match self {
            WebhookEvent::PaymentConfirmed { .. } => ChargeStatus::Paid,
            WebhookEvent::PaymentOther { status, .. } => *status,
        }
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            WebhookEvent::PaymentConfirmed { transaction_id, .. }
            | WebhookEvent::PaymentOther { transaction_id, .. } => transaction_id.as_deref(),
        }
    }
}

/// `approved` is the provider's word for `paid`; everything else must be one
/// of our own status names.
fn parse_provider_status(value: &str) -> Option<ChargeStatus> {
    if value.eq_ignore_ascii_case("approved") {
        return Some(ChargeStatus::Paid);
    }
    value.parse().ok()
}

/// RFC 3339 timestamp, or a bare date taken as midnight UTC.
fn parse_paid_at(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Clone)]
pub struct WebhookService {
    store: Arc<dyn BillingStore>,
    charges: ChargeService,
}

impl WebhookService {
    pub fn new(store: Arc<dyn BillingStore>, transport: Arc<dyn MessagingTransport>) -> Self {
        Self {
            charges: ChargeService::new(store.clone(), transport),
            store,
        }
    }

    /// Applies a provider notification. Payment time defaults to `now` when
    /// the provider did not send one.
    pub async fn handle(
        &self,
        event: &WebhookEvent,
        now: DateTime<Utc>,
    ) -> AppResult<TransitionOutcome> {
        let charge = self
            .store
            .find_charge(event.charge_id())
            .await?
            .ok_or_else(|| AppError::NotFound("Cobrança não encontrada".to_string()))?;

        let occurred_at = match event {
            WebhookEvent::PaymentConfirmed { paid_at, .. } => paid_at.unwrap_or(now),
            WebhookEvent::PaymentOther { .. } => now,
        };

        tracing::info!(
            charge_id = %charge.id,
            status = %event.target_status(),
            transaction_id = event.transaction_id().unwrap_or("-"),
            "Payment webhook received"
        );

        self.charges
            .transition(&charge, event.target_status(), TransitionSource::Webhook, occurred_at)
            .await
    }
}
