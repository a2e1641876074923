use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};
use crate::models::{Charge, DeliveryStatus, NewNotification, Notification, NotificationType};
use crate::services::message_composer::{compose, MessageContext};
use crate::services::whatsapp_service::{mask_phone, MessagingTransport};
use crate::store::BillingStore;

/// Result of one dispatch attempt. `notification` is `None` only when the
/// audit record itself could not be written.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub status: DeliveryStatus,
    pub notification: Option<Notification>,
}

/// Sends messages through the transport and records every attempt.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn BillingStore>,
    transport: Arc<dyn MessagingTransport>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn BillingStore>, transport: Arc<dyn MessagingTransport>) -> Self {
        Self { store, transport }
    }

    /// One delivery attempt. Transport failures become `Failed`, never an error.
    pub async fn dispatch(&self, phone: &str, message: &str) -> DeliveryStatus {
        match self.transport.send_text(phone, message).await {
            Ok(()) => DeliveryStatus::Sent,
            Err(e) => {
                tracing::warn!(phone = %mask_phone(phone), error = %e, "WhatsApp dispatch failed");
                DeliveryStatus::Failed
            }
        }
    }

    /// Dispatches an already composed message and stores the attempt.
    pub async fn send_and_record(
        &self,
        charge: &Charge,
        phone: &str,
        kind: NotificationType,
        message: String,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let status = self.dispatch(phone, &message).await;

        let record = NewNotification {
            user_id: charge.user_id,
            client_id: charge.client_id,
            charge_id: charge.id,
            notification_type: kind,
            status,
            message_content: message,
            sent_at: now,
        };

        let notification = match self.store.insert_notification(&record).await {
            Ok(notification) => Some(notification),
            Err(e) => {
                tracing::error!(
                    charge_id = %charge.id,
                    notification_type = %kind,
                    error = %e,
                    "Failed to record notification"
                );
                None
            }
        };

        DispatchOutcome {
            status,
            notification,
        }
    }

    /// Loads the client and the provider profile, composes `kind` and sends it.
    ///
    /// Errors only when the client or profile lookup fails.
    pub async fn notify_charge(
        &self,
        kind: NotificationType,
        charge: &Charge,
        now: DateTime<Utc>,
    ) -> AppResult<DispatchOutcome> {
        let client = self
            .store
            .find_client(charge.client_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Cliente não encontrado".to_string()))?;
        let profile = self.store.find_profile(charge.user_id).await?;

        let message = compose(kind, &MessageContext::new(charge, &client.name, profile.as_ref()));

        Ok(self
            .send_and_record(charge, &client.phone, kind, message, now)
            .await)
    }
}
