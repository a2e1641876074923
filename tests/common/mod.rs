#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use pingpague_backend::config::Config;
use pingpague_backend::error::{AppError, AppResult};
use pingpague_backend::middleware::AppState;
use pingpague_backend::models::{
    Charge, ChargeDetails, ChargeRecipient, ChargeStatus, Client, ClientAggregates,
    ClientDetails, NewCharge, NewClient, NewNotification, Notification, NotificationChannel,
    Profile, Recurrence, RecurrenceInterval, StatusChange, UpdateProfileRequest,
};
use pingpague_backend::services::{
    ChargeService, MessagingTransport, SweepService, TransportError, WebhookService,
};
use pingpague_backend::store::{
    BillingStore, ChargeFilter, ChargeStore, ClientStore, NotificationFilter, NotificationStore,
    Page, ProfileStore,
};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_SERVICE_KEY: &str = "test-service-key";
pub const TEST_PIX_KEY: &str = "ana@pix.com.br";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Noon UTC on the given day.
pub fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

pub fn amount(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        service_role_key: Some(TEST_SERVICE_KEY.to_string()),
        webhook_secret: None,
        evolution_api_url: None,
        evolution_api_key: None,
        evolution_instance_id: None,
        whatsapp_country_code: "55".to_string(),
        sweep_cron: None,
    }
}

#[derive(Default)]
struct Tables {
    clients: Vec<Client>,
    charges: Vec<Charge>,
    notifications: Vec<Notification>,
    profiles: HashMap<Uuid, Profile>,
}

impl Tables {
    fn refresh_aggregates(&mut self, client_id: Uuid) -> Option<Client> {
        let aggregates =
            ClientAggregates::from_charges(self.charges.iter().filter(|c| c.client_id == client_id));
        let client = self.clients.iter_mut().find(|c| c.id == client_id)?;
        client.total_charged = aggregates.total_charged;
        client.total_paid = aggregates.total_paid;
        client.overdue_count = aggregates.overdue_count;
        client.last_payment_date = aggregates.last_payment_date;
        Some(client.clone())
    }

    fn insert_charge(&mut self, new: &NewCharge) -> Charge {
        let now = Utc::now();
        let charge = Charge {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            client_id: new.client_id,
            amount: new.amount,
            due_date: new.due_date,
            status: ChargeStatus::Pending,
            paid_at: None,
            canceled_at: None,
            notes: new.notes.clone(),
            payment_link: new.payment_link.clone(),
            is_recurrent: new.recurrence.is_some(),
            recurrence_interval: new.recurrence.map(|r| r.interval),
            recurrence_day: new.recurrence.and_then(|r| r.day),
            next_charge_date: new.recurrence.map(|r| r.next_charge_date),
            parent_charge_id: new.parent_charge_id,
            last_notification_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        self.charges.push(charge.clone());
        self.refresh_aggregates(charge.client_id);
        charge
    }

    fn recipient(&self, charge: &Charge) -> Option<ChargeRecipient> {
        let client = self.clients.iter().find(|c| c.id == charge.client_id)?;
        Some(ChargeRecipient {
            charge: charge.clone(),
            client_name: client.name.clone(),
            client_phone: client.phone.clone(),
        })
    }
}

/// In-memory store with the same conditional-write semantics as `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_notification_inserts: AtomicBool,
    failing_charges: Mutex<HashSet<Uuid>>,
    profile_batches: AtomicUsize,
    profile_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_notification_inserts(&self, fail: bool) {
        self.fail_notification_inserts.store(fail, Ordering::SeqCst);
    }

    /// Status writes and reminder claims on this charge return an error.
    pub fn fail_writes_for(&self, charge_id: Uuid) {
        self.failing_charges.lock().unwrap().insert(charge_id);
    }

    fn write_fails(&self, charge_id: Uuid) -> bool {
        self.failing_charges.lock().unwrap().contains(&charge_id)
    }

    /// Calls to `profiles_for_users` so far.
    pub fn profile_batches(&self) -> usize {
        self.profile_batches.load(Ordering::SeqCst)
    }

    /// Calls to `find_profile` so far.
    pub fn profile_lookups(&self) -> usize {
        self.profile_lookups.load(Ordering::SeqCst)
    }

    pub fn charge(&self, id: Uuid) -> Charge {
        let tables = self.tables.lock().unwrap();
        tables.charges.iter().find(|c| c.id == id).cloned().unwrap()
    }

    pub fn charges(&self) -> Vec<Charge> {
        self.tables.lock().unwrap().charges.clone()
    }

    pub fn successors_of(&self, parent_id: Uuid) -> Vec<Charge> {
        self.charges()
            .into_iter()
            .filter(|c| c.parent_charge_id == Some(parent_id))
            .collect()
    }

    pub fn client(&self, id: Uuid) -> Client {
        let tables = self.tables.lock().unwrap();
        tables.clients.iter().find(|c| c.id == id).cloned().unwrap()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.tables.lock().unwrap().notifications.clone()
    }

    pub fn notifications_for(&self, charge_id: Uuid) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.charge_id == charge_id)
            .collect()
    }

    /// Overwrites a stored charge, bypassing every rule. Aggregates follow.
    pub fn put_charge(&self, charge: Charge) {
        let mut tables = self.tables.lock().unwrap();
        let client_id = charge.client_id;
        match tables.charges.iter().position(|c| c.id == charge.id) {
            Some(index) => tables.charges[index] = charge,
            None => tables.charges.push(charge),
        }
        tables.refresh_aggregates(client_id);
    }

    /// Cached totals are left untouched, to simulate drift.
    pub fn put_client(&self, client: Client) {
        let mut tables = self.tables.lock().unwrap();
        match tables.clients.iter().position(|c| c.id == client.id) {
            Some(index) => tables.clients[index] = client,
            None => tables.clients.push(client),
        }
    }
}

fn page_of<T: Clone>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl ChargeStore for MemoryStore {
    async fn find_charge(&self, id: Uuid) -> AppResult<Option<Charge>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.charges.iter().find(|c| c.id == id).cloned())
    }

    async fn find_user_charge(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Charge>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .charges
            .iter()
            .find(|c| c.id == id && c.user_id == user_id)
            .cloned())
    }

    async fn list_user_charges(
        &self,
        user_id: Uuid,
        filter: ChargeFilter,
        page: Page,
    ) -> AppResult<Vec<Charge>> {
        let tables = self.tables.lock().unwrap();
        let mut charges: Vec<Charge> = tables
            .charges
            .iter()
            .filter(|c| c.user_id == user_id)
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| filter.client_id.map_or(true, |id| c.client_id == id))
            .cloned()
            .collect();
        charges.sort_by(|a, b| b.due_date.cmp(&a.due_date));
        Ok(page_of(charges, page))
    }

    async fn insert_charge(&self, new: &NewCharge) -> AppResult<Charge> {
        Ok(self.tables.lock().unwrap().insert_charge(new))
    }

    async fn update_charge_details(
        &self,
        user_id: Uuid,
        id: Uuid,
        details: &ChargeDetails,
    ) -> AppResult<Option<Charge>> {
        let mut tables = self.tables.lock().unwrap();
        let Some(charge) = tables.charges.iter_mut().find(|c| {
            c.id == id && c.user_id == user_id && c.status != ChargeStatus::Canceled
        }) else {
            return Ok(None);
        };

        let previous_client_id = charge.client_id;
        if charge.due_date != details.due_date {
            charge.last_notification_sent_at = None;
        }
        charge.client_id = details.client_id;
        charge.amount = details.amount;
        charge.due_date = details.due_date;
        charge.notes = details.notes.clone();
        charge.payment_link = details.payment_link.clone();
        charge.is_recurrent = details.recurrence.is_some();
        charge.recurrence_interval = details.recurrence.map(|r| r.interval);
        charge.recurrence_day = details.recurrence.and_then(|r| r.day);
        charge.next_charge_date = details.recurrence.map(|r| r.next_charge_date);
        charge.updated_at = Utc::now();
        let updated = charge.clone();

        tables.refresh_aggregates(updated.client_id);
        tables.refresh_aggregates(previous_client_id);
        Ok(Some(updated))
    }

    async fn apply_status_change(&self, change: &StatusChange) -> AppResult<Option<Charge>> {
        if self.write_fails(change.charge_id) {
            return Err(AppError::Internal("charge row locked".to_string()));
        }

        let mut tables = self.tables.lock().unwrap();
        let Some(charge) = tables
            .charges
            .iter_mut()
            .find(|c| c.id == change.charge_id && c.status == change.expected)
        else {
            return Ok(None);
        };

        charge.status = change.target;
        charge.paid_at = change.paid_at;
        charge.canceled_at = change.canceled_at;
        if change.next_charge_date.is_some() {
            charge.next_charge_date = change.next_charge_date;
        }
        charge.updated_at = Utc::now();
        let updated = charge.clone();

        tables.refresh_aggregates(updated.client_id);
        Ok(Some(updated))
    }

    async fn insert_successor(&self, new: &NewCharge) -> AppResult<Option<Charge>> {
        let mut tables = self.tables.lock().unwrap();
        let exists = tables
            .charges
            .iter()
            .any(|c| c.parent_charge_id.is_some() && c.parent_charge_id == new.parent_charge_id);
        if exists {
            return Ok(None);
        }
        Ok(Some(tables.insert_charge(new)))
    }

    async fn find_successor(&self, parent_id: Uuid) -> AppResult<Option<Charge>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .charges
            .iter()
            .find(|c| c.parent_charge_id == Some(parent_id))
            .cloned())
    }

    async fn pending_past_due(&self, today: NaiveDate) -> AppResult<Vec<Charge>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .charges
            .iter()
            .filter(|c| c.status == ChargeStatus::Pending && c.due_date < today)
            .cloned()
            .collect())
    }

    async fn reminder_candidates(&self, due_date: NaiveDate) -> AppResult<Vec<ChargeRecipient>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .charges
            .iter()
            .filter(|c| {
                c.status == ChargeStatus::Pending
                    && c.due_date == due_date
                    && c.last_notification_sent_at.is_none()
            })
            .filter_map(|c| tables.recipient(c))
            .collect())
    }

    async fn overdue_recipients(&self) -> AppResult<Vec<ChargeRecipient>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .charges
            .iter()
            .filter(|c| c.status == ChargeStatus::Overdue)
            .filter_map(|c| tables.recipient(c))
            .collect())
    }

    async fn claim_reminder(&self, charge_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        if self.write_fails(charge_id) {
            return Err(AppError::Internal("charge row locked".to_string()));
        }

        let mut tables = self.tables.lock().unwrap();
        match tables.charges.iter_mut().find(|c| {
            c.id == charge_id
                && c.status == ChargeStatus::Pending
                && c.last_notification_sent_at.is_none()
        }) {
            Some(charge) => {
                charge.last_notification_sent_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn find_client(&self, id: Uuid) -> AppResult<Option<Client>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.clients.iter().find(|c| c.id == id).cloned())
    }

    async fn find_user_client(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Client>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .clients
            .iter()
            .find(|c| c.id == id && c.user_id == user_id)
            .cloned())
    }

    async fn list_user_clients(&self, user_id: Uuid, page: Page) -> AppResult<Vec<Client>> {
        let tables = self.tables.lock().unwrap();
        let mut clients: Vec<Client> = tables
            .clients
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page_of(clients, page))
    }

    async fn insert_client(&self, new: &NewClient) -> AppResult<Client> {
        let client = Client {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            name: new.name.clone(),
            phone: new.phone.clone(),
            email: new.email.clone(),
            total_charged: Decimal::ZERO,
            total_paid: Decimal::ZERO,
            overdue_count: 0,
            last_payment_date: None,
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().clients.push(client.clone());
        Ok(client)
    }

    async fn update_client(
        &self,
        user_id: Uuid,
        id: Uuid,
        details: &ClientDetails,
    ) -> AppResult<Option<Client>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .clients
            .iter_mut()
            .find(|c| c.id == id && c.user_id == user_id)
            .map(|client| {
                client.name = details.name.clone();
                client.phone = details.phone.clone();
                client.email = details.email.clone();
                client.clone()
            }))
    }

    async fn count_client_charges(&self, client_id: Uuid) -> AppResult<i64> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.charges.iter().filter(|c| c.client_id == client_id).count() as i64)
    }

    async fn delete_client(&self, user_id: Uuid, id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        if tables.charges.iter().any(|c| c.client_id == id) {
            return Err(AppError::Conflict("Cliente possui cobranças vinculadas".to_string()));
        }
        let before = tables.clients.len();
        tables.clients.retain(|c| !(c.id == id && c.user_id == user_id));
        Ok(tables.clients.len() < before)
    }

    async fn recompute_client_aggregates(&self, client_id: Uuid) -> AppResult<Option<Client>> {
        Ok(self.tables.lock().unwrap().refresh_aggregates(client_id))
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, new: &NewNotification) -> AppResult<Notification> {
        if self.fail_notification_inserts.load(Ordering::SeqCst) {
            return Err(AppError::Internal("notification table unavailable".to_string()));
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            client_id: new.client_id,
            charge_id: new.charge_id,
            notification_type: new.notification_type,
            channel: NotificationChannel::Whatsapp,
            status: new.status,
            message_content: new.message_content.clone(),
            sent_at: new.sent_at,
        };
        self.tables
            .lock()
            .unwrap()
            .notifications
            .push(notification.clone());
        Ok(notification)
    }

    async fn list_user_notifications(
        &self,
        user_id: Uuid,
        filter: NotificationFilter,
        page: Page,
    ) -> AppResult<Vec<Notification>> {
        let tables = self.tables.lock().unwrap();
        let mut notifications: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .filter(|n| filter.charge_id.map_or(true, |id| n.charge_id == id))
            .filter(|n| filter.client_id.map_or(true, |id| n.client_id == id))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(page_of(notifications, page))
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.lock().unwrap().profiles.get(&user_id).cloned())
    }

    async fn profiles_for_users(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Profile>> {
        self.profile_batches.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.lock().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        update: &UpdateProfileRequest,
    ) -> AppResult<Profile> {
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        let profile = tables.profiles.entry(user_id).or_insert_with(|| Profile {
            id: user_id,
            full_name: None,
            phone: None,
            pix_key: None,
            bank_name: None,
            bank_agency: None,
            bank_account: None,
            bank_account_type: None,
            created_at: now,
            updated_at: now,
        });

        fn merge(field: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                *field = value.clone();
            }
        }
        merge(&mut profile.full_name, &update.full_name);
        merge(&mut profile.phone, &update.phone);
        merge(&mut profile.pix_key, &update.pix_key);
        merge(&mut profile.bank_name, &update.bank_name);
        merge(&mut profile.bank_agency, &update.bank_agency);
        merge(&mut profile.bank_account, &update.bank_account);
        merge(&mut profile.bank_account_type, &update.bank_account_type);
        profile.updated_at = now;

        Ok(profile.clone())
    }
}

/// Transport that records every attempt and can be switched to fail.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `(phone, text)` of every attempt, failed ones included.
    pub fn attempts(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingTransport for RecordingTransport {
    async fn send_text(&self, phone: &str, text: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), text.to_string()));

        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected {
                status: 503,
                body: "instance disconnected".to_string(),
            });
        }
        Ok(())
    }
}

/// One provider with a PIX key and one client, wired to in-memory fakes.
pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub transport: Arc<RecordingTransport>,
    pub user_id: Uuid,
    pub client: Client,
}

impl TestEnv {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let user_id = Uuid::new_v4();

        store
            .upsert_profile(
                user_id,
                &UpdateProfileRequest {
                    full_name: Some("Ana Lima".to_string()),
                    pix_key: Some(TEST_PIX_KEY.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let client = store
            .insert_client(&NewClient {
                user_id,
                name: "Maria Souza".to_string(),
                phone: "11987654321".to_string(),
                email: None,
            })
            .await
            .unwrap();

        Self {
            store,
            transport,
            user_id,
            client,
        }
    }

    fn dyn_store(&self) -> Arc<dyn BillingStore> {
        self.store.clone()
    }

    fn dyn_transport(&self) -> Arc<dyn MessagingTransport> {
        self.transport.clone()
    }

    pub fn charges(&self) -> ChargeService {
        ChargeService::new(self.dyn_store(), self.dyn_transport())
    }

    pub fn sweep(&self) -> SweepService {
        SweepService::new(self.dyn_store(), self.dyn_transport())
    }

    pub fn webhooks(&self) -> WebhookService {
        WebhookService::new(self.dyn_store(), self.dyn_transport())
    }

    pub fn state(&self, config: Config) -> AppState {
        AppState::new(self.dyn_store(), self.dyn_transport(), config)
    }

    /// Stores a pending charge directly, skipping request validation.
    pub async fn insert_charge(&self, cents: i64, due_date: NaiveDate) -> Charge {
        self.store
            .insert_charge(&NewCharge {
                user_id: self.user_id,
                client_id: self.client.id,
                amount: amount(cents),
                due_date,
                notes: None,
                payment_link: None,
                recurrence: None,
                parent_charge_id: None,
            })
            .await
            .unwrap()
    }

    pub async fn insert_recurring_charge(
        &self,
        cents: i64,
        due_date: NaiveDate,
        interval: RecurrenceInterval,
        next_charge_date: NaiveDate,
    ) -> Charge {
        self.store
            .insert_charge(&NewCharge {
                user_id: self.user_id,
                client_id: self.client.id,
                amount: amount(cents),
                due_date,
                notes: Some("Mensalidade".to_string()),
                payment_link: Some("https://pay.example/abc".to_string()),
                recurrence: Some(Recurrence {
                    interval,
                    day: Some(due_date.day() as i32),
                    next_charge_date,
                }),
                parent_charge_id: None,
            })
            .await
            .unwrap()
    }
}
