use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldError};
use crate::models::{
    Charge, ChargeDetails, ChargeStatus, CreateChargeRequest, DeliveryStatus, NewCharge,
    NotificationType, Recurrence, RecurrenceInterval, StatusChange, UpdateChargeRequest,
};
use crate::services::notification_service::NotificationDispatcher;
use crate::services::recurrence_service::{RecurrenceService, SuccessorOutcome};
use crate::services::whatsapp_service::MessagingTransport;
use crate::store::BillingStore;
use crate::utils::dates::today_utc;
use crate::utils::validators::{sanitize_optional, validate_amount};

/// Re-plans after a lost conditional update before giving up with `Conflict`.
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionSource {
    /// Scheduled sweep: only `pending -> overdue`.
    Sweep,
    /// Payment provider: never cancels.
    Webhook,
    /// Provider acting from the dashboard.
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionPlan {
    /// Already at the target.
    Unchanged,
    Apply(StatusChange),
}

/// Decides whether `charge` may move to `target` and what the write looks like.
pub fn plan_transition(
    charge: &Charge,
    target: ChargeStatus,
    source: TransitionSource,
    occurred_at: DateTime<Utc>,
) -> AppResult<TransitionPlan> {
    let from = charge.status;
    let invalid = AppError::InvalidTransition { from, to: target };

    if from.is_terminal() {
        return Err(invalid);
    }
    if from == target {
        return Ok(TransitionPlan::Unchanged);
    }

    let allowed = match source {
        TransitionSource::Sweep => {
            from == ChargeStatus::Pending && target == ChargeStatus::Overdue
        }
        TransitionSource::Webhook => target != ChargeStatus::Canceled,
        TransitionSource::Manual => true,
    };
    if !allowed {
        return Err(invalid);
    }

    let mut next_charge_date = None;
    if target == ChargeStatus::Paid && charge.is_recurrent {
        let interval = charge.recurrence_interval.ok_or_else(|| {
            AppError::InvalidRecurrenceConfig(format!(
                "cobrança {} é recorrente mas não possui intervalo",
                charge.id
            ))
        })?;
        if charge.next_charge_date.is_none() {
            next_charge_date = Some(interval.advance(charge.due_date).ok_or_else(|| {
                AppError::InvalidRecurrenceConfig(format!(
                    "próxima data fora do intervalo suportado para a cobrança {}",
                    charge.id
                ))
            })?);
        }
    }

    let (paid_at, canceled_at) = match target {
        ChargeStatus::Paid => (Some(occurred_at), None),
        ChargeStatus::Canceled => (charge.paid_at, Some(occurred_at)),
        ChargeStatus::Pending | ChargeStatus::Overdue => (None, None),
    };

    Ok(TransitionPlan::Apply(StatusChange {
        charge_id: charge.id,
        expected: from,
        target,
        paid_at,
        canceled_at,
        next_charge_date,
    }))
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub charge: Charge,
    pub previous_status: ChargeStatus,
    pub changed: bool,
    /// Delivery result of the `payment_confirmed` message, when one was attempted.
    pub notification: Option<DeliveryStatus>,
    pub successor: SuccessorOutcome,
}

/// Charge writes validated from user input.
struct ChargeDraft<'a> {
    client_id: Uuid,
    amount: Decimal,
    due_date: NaiveDate,
    notes: Option<&'a str>,
    payment_link: Option<&'a str>,
    is_recurrent: bool,
    recurrence_interval: Option<RecurrenceInterval>,
    recurrence_day: Option<i32>,
}

impl<'a> From<&'a CreateChargeRequest> for ChargeDraft<'a> {
    fn from(req: &'a CreateChargeRequest) -> Self {
        Self {
            client_id: req.client_id,
            amount: req.amount,
            due_date: req.due_date,
            notes: req.notes.as_deref(),
            payment_link: req.payment_link.as_deref(),
            is_recurrent: req.is_recurrent,
            recurrence_interval: req.recurrence_interval,
            recurrence_day: req.recurrence_day,
        }
    }
}

impl<'a> From<&'a UpdateChargeRequest> for ChargeDraft<'a> {
    fn from(req: &'a UpdateChargeRequest) -> Self {
        Self {
            client_id: req.client_id,
            amount: req.amount,
            due_date: req.due_date,
            notes: req.notes.as_deref(),
            payment_link: req.payment_link.as_deref(),
            is_recurrent: req.is_recurrent,
            recurrence_interval: req.recurrence_interval,
            recurrence_day: req.recurrence_day,
        }
    }
}

/// Checks business rules on a draft. `not_before` rejects due dates in the past.
fn build_details(draft: ChargeDraft<'_>, not_before: Option<NaiveDate>) -> AppResult<ChargeDetails> {
    let mut errors = Vec::new();

    if !validate_amount(draft.amount) {
        errors.push(FieldError::new(
            "amount",
            "Valor deve ser maior que zero, até R$ 999.999,99 e com no máximo 2 casas decimais",
        ));
    }
    if let Some(today) = not_before {
        if draft.due_date < today {
            errors.push(FieldError::new(
                "due_date",
                "Data de vencimento não pode estar no passado",
            ));
        }
    }

    let mut recurrence = None;
    if draft.is_recurrent {
        match draft.recurrence_interval {
            Some(interval) => match interval.advance(draft.due_date) {
                Some(next_charge_date) => {
                    recurrence = Some(Recurrence {
                        interval,
                        day: draft
                            .recurrence_day
                            .or(Some(draft.due_date.day() as i32)),
                        next_charge_date,
                    })
                }
                None => errors.push(FieldError::new(
                    "due_date",
                    "Data de vencimento fora do intervalo suportado",
                )),
            },
            None => errors.push(FieldError::new(
                "recurrence_interval",
                "Intervalo é obrigatório para cobranças recorrentes",
            )),
        }
    }

    if !errors.is_empty() {
        return Err(AppError::InvalidFields(errors));
    }

    Ok(ChargeDetails {
        client_id: draft.client_id,
        amount: draft.amount,
        due_date: draft.due_date,
        notes: sanitize_optional(draft.notes),
        payment_link: draft
            .payment_link
            .map(str::trim)
            .filter(|link| !link.is_empty())
            .map(str::to_string),
        recurrence,
    })
}

#[derive(Clone)]
pub struct ChargeService {
    store: Arc<dyn BillingStore>,
    dispatcher: NotificationDispatcher,
    recurrence: RecurrenceService,
}

impl ChargeService {
    pub fn new(store: Arc<dyn BillingStore>, transport: Arc<dyn MessagingTransport>) -> Self {
        Self {
            dispatcher: NotificationDispatcher::new(store.clone(), transport),
            recurrence: RecurrenceService::new(store.clone()),
            store,
        }
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Moves `charge` to `target`, then runs the post-commit side effects.
    ///
    /// When another writer got there first the charge is re-read and the
    /// request re-planned against its fresh status.
    pub async fn transition(
        &self,
        charge: &Charge,
        target: ChargeStatus,
        source: TransitionSource,
        occurred_at: DateTime<Utc>,
    ) -> AppResult<TransitionOutcome> {
        let mut current = charge.clone();

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let change = match plan_transition(&current, target, source, occurred_at)? {
                TransitionPlan::Unchanged => return Ok(self.unchanged(current).await),
                TransitionPlan::Apply(change) => change,
            };

            if let Some(updated) = self.store.apply_status_change(&change).await? {
                tracing::info!(
                    charge_id = %updated.id,
                    from = %change.expected,
                    to = %updated.status,
                    source = ?source,
                    "Charge status changed"
                );
                return Ok(self.after_commit(change.expected, updated, occurred_at).await);
            }

            tracing::debug!(charge_id = %current.id, "Charge changed concurrently, re-reading");
            current = self
                .store
                .find_charge(current.id)
                .await?
                .ok_or_else(|| AppError::NotFound("Cobrança não encontrada".to_string()))?;
        }

        Err(AppError::Conflict(
            "Cobrança alterada concorrentemente, tente novamente".to_string(),
        ))
    }

    async fn unchanged(&self, charge: Charge) -> TransitionOutcome {
        // Replays of a payment repair a successor lost after the commit.
        let successor = if charge.status == ChargeStatus::Paid && charge.is_recurrent {
            self.recurrence.ensure_successor(&charge).await
        } else {
            SuccessorOutcome::NotApplicable
        };

        TransitionOutcome {
            previous_status: charge.status,
            changed: false,
            notification: None,
            successor,
            charge,
        }
    }

    async fn after_commit(
        &self,
        previous_status: ChargeStatus,
        charge: Charge,
        occurred_at: DateTime<Utc>,
    ) -> TransitionOutcome {
        let mut outcome = TransitionOutcome {
            previous_status,
            changed: true,
            notification: None,
            successor: SuccessorOutcome::NotApplicable,
            charge,
        };

        if outcome.charge.status != ChargeStatus::Paid {
            return outcome;
        }

        match self
            .dispatcher
            .notify_charge(NotificationType::PaymentConfirmed, &outcome.charge, occurred_at)
            .await
        {
            Ok(dispatch) => outcome.notification = Some(dispatch.status),
            Err(e) => {
                tracing::error!(charge_id = %outcome.charge.id, error = %e, "Payment confirmation not sent");
            }
        }

        if outcome.charge.is_recurrent {
            outcome.successor = self.recurrence.ensure_successor(&outcome.charge).await;
        }

        outcome
    }

    /// Creates a pending charge for one of the user's clients and sends the
    /// `reception` message. Returns the delivery status when a send was attempted.
    pub async fn create_charge(
        &self,
        user_id: Uuid,
        req: &CreateChargeRequest,
        now: DateTime<Utc>,
    ) -> AppResult<(Charge, Option<DeliveryStatus>)> {
        let details = build_details(ChargeDraft::from(req), Some(today_utc(now)))?;
        self.ensure_client_owned(user_id, details.client_id).await?;

        let charge = self
            .store
            .insert_charge(&NewCharge {
                user_id,
                client_id: details.client_id,
                amount: details.amount,
                due_date: details.due_date,
                notes: details.notes,
                payment_link: details.payment_link,
                recurrence: details.recurrence,
                parent_charge_id: None,
            })
            .await?;

        tracing::info!(charge_id = %charge.id, client_id = %charge.client_id, "Charge created");

        let reception = match self
            .dispatcher
            .notify_charge(NotificationType::Reception, &charge, now)
            .await
        {
            Ok(dispatch) => Some(dispatch.status),
            Err(e) => {
                tracing::error!(charge_id = %charge.id, error = %e, "Reception message not sent");
                None
            }
        };

        Ok((charge, reception))
    }

    pub async fn update_charge(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: &UpdateChargeRequest,
    ) -> AppResult<Charge> {
        let existing = self.find_owned(user_id, id).await?;
        if existing.status.is_terminal() {
            return Err(AppError::BadRequest(
                "Cobrança cancelada não pode ser editada".to_string(),
            ));
        }

        let details = build_details(ChargeDraft::from(req), None)?;
        self.ensure_client_owned(user_id, details.client_id).await?;

        self.store
            .update_charge_details(user_id, id, &details)
            .await?
            .ok_or_else(|| AppError::Conflict("Cobrança foi cancelada".to_string()))
    }

    /// Manual override from the dashboard.
    pub async fn change_status(
        &self,
        user_id: Uuid,
        id: Uuid,
        target: ChargeStatus,
        now: DateTime<Utc>,
    ) -> AppResult<TransitionOutcome> {
        let charge = self.find_owned(user_id, id).await?;
        self.transition(&charge, target, TransitionSource::Manual, now)
            .await
    }

    pub async fn cancel_charge(
        &self,
        user_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<TransitionOutcome> {
        self.change_status(user_id, id, ChargeStatus::Canceled, now)
            .await
    }

    pub async fn find_owned(&self, user_id: Uuid, id: Uuid) -> AppResult<Charge> {
        self.store
            .find_user_charge(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Cobrança não encontrada".to_string()))
    }

    async fn ensure_client_owned(&self, user_id: Uuid, client_id: Uuid) -> AppResult<()> {
        self.store
            .find_user_client(user_id, client_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Cliente não encontrado".to_string()))
    }
}
