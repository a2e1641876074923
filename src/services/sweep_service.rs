use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ChargeRecipient, ChargeStatus, DeliveryStatus, NotificationType, Profile};
use crate::services::charge_service::{ChargeService, TransitionSource};
use crate::services::message_composer::{compose, MessageContext};
use crate::services::whatsapp_service::MessagingTransport;
use crate::store::BillingStore;
use crate::utils::dates::{reminder_due_date, today_utc};

/// Counters for one sweep run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub overdue_updated: u32,
    pub reminders_sent: u32,
    pub overdue_alerts: u32,
    pub notifications_failed: u32,
    pub promotion_errors: u32,
}

/// Periodic pass over all users' charges: overdue promotion, pre-due
/// reminders and overdue alerts. Each charge is handled on its own, so one
/// failure never stops the rest of the run.
#[derive(Clone)]
pub struct SweepService {
    store: Arc<dyn BillingStore>,
    charges: ChargeService,
}

impl SweepService {
    pub fn new(store: Arc<dyn BillingStore>, transport: Arc<dyn MessagingTransport>) -> Self {
        Self {
            charges: ChargeService::new(store.clone(), transport),
            store,
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let today = today_utc(now);
        let mut report = SweepReport::default();

        tracing::info!(%today, "Starting overdue sweep");

        self.promote_overdue(today, now, &mut report).await?;

        let reminder_date = reminder_due_date(today)
            .ok_or_else(|| AppError::Internal(format!("no reminder date after {}", today)))?;
        let reminders = self.store.reminder_candidates(reminder_date).await?;
        let overdue = self.store.overdue_recipients().await?;

        let profiles = self.load_profiles(reminders.iter().chain(overdue.iter())).await;

        for recipient in &reminders {
            match self.store.claim_reminder(recipient.charge.id, now).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(charge_id = %recipient.charge.id, "Reminder already claimed");
                    continue;
                }
                Err(e) => {
                    tracing::error!(charge_id = %recipient.charge.id, error = %e, "Failed to claim reminder");
                    continue;
                }
            }

            let profile = profiles.get(&recipient.charge.user_id);
            match self.deliver(NotificationType::Reminder, recipient, profile, now).await {
                DeliveryStatus::Sent => report.reminders_sent += 1,
                DeliveryStatus::Failed => report.notifications_failed += 1,
            }
        }

        for recipient in &overdue {
            let profile = profiles.get(&recipient.charge.user_id);
            match self.deliver(NotificationType::Overdue, recipient, profile, now).await {
                DeliveryStatus::Sent => report.overdue_alerts += 1,
                DeliveryStatus::Failed => report.notifications_failed += 1,
            }
        }

        tracing::info!(
            overdue_updated = report.overdue_updated,
            reminders_sent = report.reminders_sent,
            overdue_alerts = report.overdue_alerts,
            notifications_failed = report.notifications_failed,
            promotion_errors = report.promotion_errors,
            "Overdue sweep finished"
        );

        Ok(report)
    }

    async fn promote_overdue(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> AppResult<()> {
        for charge in self.store.pending_past_due(today).await? {
            match self
                .charges
                .transition(&charge, ChargeStatus::Overdue, TransitionSource::Sweep, now)
                .await
            {
                Ok(outcome) if outcome.changed => report.overdue_updated += 1,
                Ok(_) => {}
                // Paid or canceled since the read.
                Err(AppError::InvalidTransition { from, .. }) => {
                    tracing::debug!(charge_id = %charge.id, status = %from, "Skipping promotion");
                }
                Err(e) => {
                    tracing::error!(charge_id = %charge.id, error = %e, "Failed to mark charge overdue");
                    report.promotion_errors += 1;
                }
            }
        }
        Ok(())
    }

    /// One batch lookup for every provider involved in this run. Missing
    /// profiles only drop the PIX key and sender name from messages.
    async fn load_profiles<'a, I>(&self, recipients: I) -> HashMap<Uuid, Profile>
    where
        I: Iterator<Item = &'a ChargeRecipient>,
    {
        let mut user_ids: Vec<Uuid> = recipients.map(|r| r.charge.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        if user_ids.is_empty() {
            return HashMap::new();
        }

        match self.store.profiles_for_users(&user_ids).await {
            Ok(profiles) => profiles,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load profiles, sending without PIX keys");
                HashMap::new()
            }
        }
    }

    async fn deliver(
        &self,
        kind: NotificationType,
        recipient: &ChargeRecipient,
        profile: Option<&Profile>,
        now: DateTime<Utc>,
    ) -> DeliveryStatus {
        let message = compose(
            kind,
            &MessageContext::new(&recipient.charge, &recipient.client_name, profile),
        );

        self.charges
            .dispatcher()
            .send_and_record(&recipient.charge, &recipient.client_phone, kind, message, now)
            .await
            .status
    }
}
