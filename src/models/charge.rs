use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::utils::dates;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Pending,
    Paid,
    Overdue,
    Canceled,
}

impl Default for ChargeStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Pending => "pending",
            ChargeStatus::Paid => "paid",
            ChargeStatus::Overdue => "overdue",
            ChargeStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChargeStatus::Canceled)
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ChargeStatus::Pending),
            "paid" => Ok(ChargeStatus::Paid),
            "overdue" => Ok(ChargeStatus::Overdue),
            "canceled" | "cancelled" => Ok(ChargeStatus::Canceled),
            other => Err(format!("status desconhecido: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "recurrence_interval", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceInterval {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl RecurrenceInterval {
    /// Date one interval after `date`, clamped to the end of the target month.
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        dates::next_occurrence(date, *self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Charge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub status: ChargeStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub payment_link: Option<String>,
    pub is_recurrent: bool,
    pub recurrence_interval: Option<RecurrenceInterval>,
    pub recurrence_day: Option<i32>,
    pub next_charge_date: Option<NaiveDate>,
    pub parent_charge_id: Option<Uuid>,
    pub last_notification_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Charge joined with the contact data of its client, as read by the sweep.
#[derive(Debug, Clone, FromRow)]
pub struct ChargeRecipient {
    #[sqlx(flatten)]
    pub charge: Charge,
    pub client_name: String,
    pub client_phone: String,
}

/// Row to insert into `charges`. Status always starts as `pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCharge {
    pub user_id: Uuid,
    pub client_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub payment_link: Option<String>,
    pub recurrence: Option<Recurrence>,
    pub parent_charge_id: Option<Uuid>,
}

/// Recurrence columns of a charge; absent as a whole for one-off charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recurrence {
    pub interval: RecurrenceInterval,
    pub day: Option<i32>,
    pub next_charge_date: NaiveDate,
}

/// Editable fields of a charge that is not canceled.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeDetails {
    pub client_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub payment_link: Option<String>,
    pub recurrence: Option<Recurrence>,
}

/// Conditional status write: applied only while the row still has `expected`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub charge_id: Uuid,
    pub expected: ChargeStatus,
    pub target: ChargeStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    /// Fills a missing `next_charge_date` on recurring charges.
    pub next_charge_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateChargeRequest {
    pub client_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    #[validate(length(max = 1000, message = "Observações devem ter no máximo 1000 caracteres"))]
    pub notes: Option<String>,
    #[validate(length(max = 2048, message = "Link de pagamento muito longo"))]
    pub payment_link: Option<String>,
    #[serde(default)]
    pub is_recurrent: bool,
    pub recurrence_interval: Option<RecurrenceInterval>,
    #[validate(range(min = 1, max = 31, message = "Dia da recorrência deve estar entre 1 e 31"))]
    pub recurrence_day: Option<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateChargeRequest {
    pub client_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    #[validate(length(max = 1000, message = "Observações devem ter no máximo 1000 caracteres"))]
    pub notes: Option<String>,
    #[validate(length(max = 2048, message = "Link de pagamento muito longo"))]
    pub payment_link: Option<String>,
    #[serde(default)]
    pub is_recurrent: bool,
    pub recurrence_interval: Option<RecurrenceInterval>,
    #[validate(range(min = 1, max = 31, message = "Dia da recorrência deve estar entre 1 e 31"))]
    pub recurrence_day: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateChargeStatusRequest {
    pub status: ChargeStatus,
}

#[derive(Debug, Default, Deserialize, ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChargesQuery {
    pub status: Option<ChargeStatus>,
    pub client_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
