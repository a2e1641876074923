//! Persistence seam.
//!
//! Services talk to these traits; `PgStore` is the production implementation.
//! Every status write goes through [`ChargeStore::apply_status_change`], which
//! must only touch the row while it still has the expected status.

pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Charge, ChargeDetails, ChargeRecipient, ChargeStatus, Client, ClientDetails, NewCharge,
    NewClient, NewNotification, Notification, Profile, StatusChange, UpdateProfileRequest,
};

pub use postgres::PgStore;

/// Limit/offset window for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT);
        let offset = page.unwrap_or(0).max(0).saturating_mul(limit);
        Self { limit, offset }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChargeFilter {
    pub status: Option<ChargeStatus>,
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationFilter {
    pub charge_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
}

#[async_trait]
pub trait ChargeStore: Send + Sync {
    async fn find_charge(&self, id: Uuid) -> AppResult<Option<Charge>>;

    async fn find_user_charge(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Charge>>;

    async fn list_user_charges(
        &self,
        user_id: Uuid,
        filter: ChargeFilter,
        page: Page,
    ) -> AppResult<Vec<Charge>>;

    /// Inserts a `pending` charge and refreshes its client's aggregates.
    async fn insert_charge(&self, new: &NewCharge) -> AppResult<Charge>;

    /// Updates editable fields unless the charge is canceled; `None` when no row matched.
    async fn update_charge_details(
        &self,
        user_id: Uuid,
        id: Uuid,
        details: &ChargeDetails,
    ) -> AppResult<Option<Charge>>;

    /// Conditional status write plus aggregate refresh, in one transaction.
    /// `None` when the row no longer has `change.expected`.
    async fn apply_status_change(&self, change: &StatusChange) -> AppResult<Option<Charge>>;

    /// Inserts a successor unless one already exists for the same parent.
    async fn insert_successor(&self, new: &NewCharge) -> AppResult<Option<Charge>>;

    async fn find_successor(&self, parent_id: Uuid) -> AppResult<Option<Charge>>;

    /// Pending charges with `due_date` strictly before `today`.
    async fn pending_past_due(&self, today: NaiveDate) -> AppResult<Vec<Charge>>;

    /// Pending charges due on `due_date` that never received a reminder.
    async fn reminder_candidates(&self, due_date: NaiveDate) -> AppResult<Vec<ChargeRecipient>>;

    async fn overdue_recipients(&self) -> AppResult<Vec<ChargeRecipient>>;

    /// Sets `last_notification_sent_at` if still unset. Returns whether this call claimed it.
    async fn claim_reminder(&self, charge_id: Uuid, at: DateTime<Utc>) -> AppResult<bool>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn find_client(&self, id: Uuid) -> AppResult<Option<Client>>;

    async fn find_user_client(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Client>>;

    async fn list_user_clients(&self, user_id: Uuid, page: Page) -> AppResult<Vec<Client>>;

    async fn insert_client(&self, new: &NewClient) -> AppResult<Client>;

    async fn update_client(
        &self,
        user_id: Uuid,
        id: Uuid,
        details: &ClientDetails,
    ) -> AppResult<Option<Client>>;

    async fn count_client_charges(&self, client_id: Uuid) -> AppResult<i64>;

    async fn delete_client(&self, user_id: Uuid, id: Uuid) -> AppResult<bool>;

    /// Rebuilds the cached totals of a client from its charges.
    async fn recompute_client_aggregates(&self, client_id: Uuid) -> AppResult<Option<Client>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, new: &NewNotification) -> AppResult<Notification>;

    async fn list_user_notifications(
        &self,
        user_id: Uuid,
        filter: NotificationFilter,
        page: Page,
    ) -> AppResult<Vec<Notification>>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>>;

    /// One query for every user in `user_ids`; users without a profile are absent.
    async fn profiles_for_users(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Profile>>;

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        update: &UpdateProfileRequest,
    ) -> AppResult<Profile>;
}

pub trait BillingStore: ChargeStore + ClientStore + NotificationStore + ProfileStore {}

impl<T> BillingStore for T where T: ChargeStore + ClientStore + NotificationStore + ProfileStore {}
