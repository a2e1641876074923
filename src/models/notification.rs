use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Reception,
    Reminder,
    Overdue,
    PaymentConfirmed,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Reception => "reception",
            NotificationType::Reminder => "reminder",
            NotificationType::Overdue => "overdue",
            NotificationType::PaymentConfirmed => "payment_confirmed",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "notification_channel", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Whatsapp,
}

/// Outcome of a single dispatch attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "notification_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_id: Uuid,
    pub charge_id: Uuid,
    pub notification_type: NotificationType,
    pub channel: NotificationChannel,
    pub status: DeliveryStatus,
    pub message_content: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub client_id: Uuid,
    pub charge_id: Uuid,
    pub notification_type: NotificationType,
    pub status: DeliveryStatus,
    pub message_content: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendNotificationRequest {
    pub charge_id: Uuid,
    pub notification_type: NotificationType,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendNotificationResponse {
    pub success: bool,
    pub status: DeliveryStatus,
    pub notification_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationsQuery {
    pub charge_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
