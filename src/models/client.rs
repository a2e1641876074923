use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{Charge, ChargeStatus};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Client {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub total_charged: Decimal,
    pub total_paid: Decimal,
    pub overdue_count: i32,
    pub last_payment_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Cached totals on a client row, always derivable from its charges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ClientAggregates {
    pub total_charged: Decimal,
    pub total_paid: Decimal,
    pub overdue_count: i32,
    pub last_payment_date: Option<NaiveDate>,
}

impl ClientAggregates {
    /// Canceled charges contribute to nothing, including ones paid before cancellation.
    pub fn from_charges<'a, I>(charges: I) -> Self
    where
        I: IntoIterator<Item = &'a Charge>,
    {
        let mut aggregates = Self::default();

        for charge in charges {
            match charge.status {
                ChargeStatus::Canceled => continue,
                ChargeStatus::Paid => {
                    aggregates.total_paid += charge.amount;
                    let paid_on = charge.paid_at.map(|at| at.date_naive());
                    if paid_on > aggregates.last_payment_date {
                        aggregates.last_payment_date = paid_on;
                    }
                }
                ChargeStatus::Overdue => aggregates.overdue_count += 1,
                ChargeStatus::Pending => {}
            }
            aggregates.total_charged += charge.amount;
        }

        aggregates
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub user_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientDetails {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateClientRequest {
    #[validate(length(min = 2, max = 100, message = "Nome deve ter entre 2 e 100 caracteres"))]
    pub name: String,
    pub phone: String,
    #[validate(email(message = "E-mail inválido"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateClientRequest {
    #[validate(length(min = 2, max = 100, message = "Nome deve ter entre 2 e 100 caracteres"))]
    pub name: String,
    pub phone: String,
    #[validate(email(message = "E-mail inválido"))]
    pub email: Option<String>,
}
