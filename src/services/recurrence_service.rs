use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Charge, ChargeStatus, NewCharge, Recurrence};
use crate::store::BillingStore;

/// What happened to the next cycle of a paid charge.
#[derive(Debug, Clone)]
pub enum SuccessorOutcome {
    /// Not a recurring charge, or not paid.
    NotApplicable,
    Created(Charge),
    /// A previous delivery already created it.
    AlreadyExists(Charge),
    /// Payment stands, the next cycle still has to be created.
    Failed(String),
}

impl SuccessorOutcome {
    pub fn charge_id(&self) -> Option<Uuid> {
        match self {
            SuccessorOutcome::Created(charge) | SuccessorOutcome::AlreadyExists(charge) => {
                Some(charge.id)
            }
            SuccessorOutcome::NotApplicable | SuccessorOutcome::Failed(_) => None,
        }
    }
}

/// Builds the next cycle of a recurring charge.
///
/// The successor is due on the parent's `next_charge_date` (or one interval
/// after the parent's due date when that was never filled) and schedules its
/// own next date one more interval ahead.
pub fn plan_successor(parent: &Charge) -> AppResult<Option<NewCharge>> {
    if !parent.is_recurrent {
        return Ok(None);
    }

    let interval = parent.recurrence_interval.ok_or_else(|| {
        AppError::InvalidRecurrenceConfig(format!(
            "cobrança {} é recorrente mas não possui intervalo",
            parent.id
        ))
    })?;

    let out_of_range = || {
        AppError::InvalidRecurrenceConfig(format!(
            "data fora do intervalo suportado para a cobrança {}",
            parent.id
        ))
    };

    let due_date = match parent.next_charge_date {
        Some(date) => date,
        None => interval.advance(parent.due_date).ok_or_else(out_of_range)?,
    };
    let next_charge_date = interval.advance(due_date).ok_or_else(out_of_range)?;

    Ok(Some(NewCharge {
        user_id: parent.user_id,
        client_id: parent.client_id,
        amount: parent.amount,
        due_date,
        notes: parent.notes.clone(),
        payment_link: parent.payment_link.clone(),
        recurrence: Some(Recurrence {
            interval,
            day: parent.recurrence_day,
            next_charge_date,
        }),
        parent_charge_id: Some(parent.id),
    }))
}

#[derive(Clone)]
pub struct RecurrenceService {
    store: Arc<dyn BillingStore>,
}

impl RecurrenceService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Creates the successor of a paid recurring charge at most once.
    ///
    /// Safe to call repeatedly for the same parent: the store refuses a second
    /// successor and the existing one is reported instead.
    pub async fn ensure_successor(&self, parent: &Charge) -> SuccessorOutcome {
        if parent.status != ChargeStatus::Paid {
            return SuccessorOutcome::NotApplicable;
        }

        let new = match plan_successor(parent) {
            Ok(Some(new)) => new,
            Ok(None) => return SuccessorOutcome::NotApplicable,
            Err(e) => {
                tracing::error!(charge_id = %parent.id, error = %e, "Cannot plan next recurrent charge");
                return SuccessorOutcome::Failed(e.to_string());
            }
        };

        match self.store.insert_successor(&new).await {
            Ok(Some(successor)) => {
                tracing::info!(
                    charge_id = %parent.id,
                    successor_id = %successor.id,
                    due_date = %successor.due_date,
                    "Next recurrent charge created"
                );
                SuccessorOutcome::Created(successor)
            }
            Ok(None) => match self.store.find_successor(parent.id).await {
                Ok(Some(existing)) => {
                    tracing::debug!(
                        charge_id = %parent.id,
                        successor_id = %existing.id,
                        "Next recurrent charge already exists"
                    );
                    SuccessorOutcome::AlreadyExists(existing)
                }
                Ok(None) => SuccessorOutcome::Failed(
                    "successor insert was skipped but no successor was found".to_string(),
                ),
                Err(e) => SuccessorOutcome::Failed(e.to_string()),
            },
            Err(e) => {
                tracing::error!(charge_id = %parent.id, error = %e, "Error creating next recurrent charge");
                SuccessorOutcome::Failed(e.to_string())
            }
        }
    }
}
