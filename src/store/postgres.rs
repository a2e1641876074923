use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{
    ChargeFilter, ChargeStore, ClientStore, NotificationFilter, NotificationStore, Page,
    ProfileStore,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    Charge, ChargeDetails, ChargeRecipient, Client, ClientAggregates, ClientDetails, NewCharge,
    NewClient, NewNotification, Notification, Profile, StatusChange, UpdateProfileRequest,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Client rows touched by moving a charge, in ascending id order. Both rows
/// are locked in this order before the charge is rewritten.
fn client_lock_order(previous: Uuid, next: Uuid) -> Vec<Uuid> {
    let mut ids = vec![previous, next];
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Recomputes the cached totals of `client_id` from its charges.
///
/// Locks the client row first so concurrent charge mutations of the same
/// client serialize their recomputation.
async fn refresh_aggregates(conn: &mut PgConnection, client_id: Uuid) -> AppResult<Option<Client>> {
    let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM clients WHERE id = $1 FOR UPDATE")
        .bind(client_id)
        .fetch_optional(&mut *conn)
        .await?;

    if locked.is_none() {
        return Ok(None);
    }

    let charges = sqlx::query_as::<_, Charge>("SELECT * FROM charges WHERE client_id = $1")
        .bind(client_id)
        .fetch_all(&mut *conn)
        .await?;

    let aggregates = ClientAggregates::from_charges(&charges);

    let client = sqlx::query_as::<_, Client>(
        r#"
        UPDATE clients
        SET total_charged = $2,
            total_paid = $3,
            overdue_count = $4,
            last_payment_date = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(client_id)
    .bind(aggregates.total_charged)
    .bind(aggregates.total_paid)
    .bind(aggregates.overdue_count)
    .bind(aggregates.last_payment_date)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(client)
}

const INSERT_CHARGE: &str = r#"
    INSERT INTO charges
        (user_id, client_id, amount, due_date, status, notes, payment_link,
         is_recurrent, recurrence_interval, recurrence_day, next_charge_date, parent_charge_id)
    VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8, $9, $10, $11)
"#;

#[async_trait]
impl ChargeStore for PgStore {
    async fn find_charge(&self, id: Uuid) -> AppResult<Option<Charge>> {
        let charge = sqlx::query_as::<_, Charge>("SELECT * FROM charges WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(charge)
    }

    async fn find_user_charge(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Charge>> {
        let charge =
            sqlx::query_as::<_, Charge>("SELECT * FROM charges WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(charge)
    }

    async fn list_user_charges(
        &self,
        user_id: Uuid,
        filter: ChargeFilter,
        page: Page,
    ) -> AppResult<Vec<Charge>> {
        let charges = sqlx::query_as::<_, Charge>(
            r#"
            SELECT * FROM charges
            WHERE user_id = $1
              AND ($2::payment_status IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR client_id = $3)
            ORDER BY due_date DESC, created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(user_id)
        .bind(filter.status)
        .bind(filter.client_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(charges)
    }

    async fn insert_charge(&self, new: &NewCharge) -> AppResult<Charge> {
        let mut tx = self.pool.begin().await?;

        let charge = sqlx::query_as::<_, Charge>(&format!("{} RETURNING *", INSERT_CHARGE))
            .bind(new.user_id)
            .bind(new.client_id)
            .bind(new.amount)
            .bind(new.due_date)
            .bind(&new.notes)
            .bind(&new.payment_link)
            .bind(new.recurrence.is_some())
            .bind(new.recurrence.map(|r| r.interval))
            .bind(new.recurrence.and_then(|r| r.day))
            .bind(new.recurrence.map(|r| r.next_charge_date))
            .bind(new.parent_charge_id)
            .fetch_one(&mut *tx)
            .await?;

        refresh_aggregates(&mut *tx, charge.client_id).await?;
        tx.commit().await?;

        Ok(charge)
    }

    async fn update_charge_details(
        &self,
        user_id: Uuid,
        id: Uuid,
        details: &ChargeDetails,
    ) -> AppResult<Option<Charge>> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT client_id FROM charges
            WHERE id = $1 AND user_id = $2 AND status <> 'canceled'
            FOR UPDATE
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((previous_client_id,)) = previous else {
            return Ok(None);
        };

        let lock_ids = client_lock_order(previous_client_id, details.client_id);
        sqlx::query("SELECT id FROM clients WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&lock_ids[..])
            .fetch_all(&mut *tx)
            .await?;

        // A moved due date re-arms the pre-due reminder.
        let charge = sqlx::query_as::<_, Charge>(
            r#"
            UPDATE charges
            SET client_id = $3,
                amount = $4,
                last_notification_sent_at = CASE WHEN due_date <> $5 THEN NULL
                                                 ELSE last_notification_sent_at END,
                due_date = $5,
                notes = $6,
                payment_link = $7,
                is_recurrent = $8,
                recurrence_interval = $9,
                recurrence_day = $10,
                next_charge_date = $11,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND status <> 'canceled'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(details.client_id)
        .bind(details.amount)
        .bind(details.due_date)
        .bind(&details.notes)
        .bind(&details.payment_link)
        .bind(details.recurrence.is_some())
        .bind(details.recurrence.map(|r| r.interval))
        .bind(details.recurrence.and_then(|r| r.day))
        .bind(details.recurrence.map(|r| r.next_charge_date))
        .fetch_one(&mut *tx)
        .await?;

        refresh_aggregates(&mut *tx, charge.client_id).await?;
        if previous_client_id != charge.client_id {
            refresh_aggregates(&mut *tx, previous_client_id).await?;
        }
        tx.commit().await?;

        Ok(Some(charge))
    }

    async fn apply_status_change(&self, change: &StatusChange) -> AppResult<Option<Charge>> {
        let mut tx = self.pool.begin().await?;

        let charge = sqlx::query_as::<_, Charge>(
            r#"
            UPDATE charges
            SET status = $3,
                paid_at = $4,
                canceled_at = $5,
                next_charge_date = COALESCE($6, next_charge_date),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(change.charge_id)
        .bind(change.expected)
        .bind(change.target)
        .bind(change.paid_at)
        .bind(change.canceled_at)
        .bind(change.next_charge_date)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(charge) = charge else {
            return Ok(None);
        };

        refresh_aggregates(&mut *tx, charge.client_id).await?;
        tx.commit().await?;

        Ok(Some(charge))
    }

    async fn insert_successor(&self, new: &NewCharge) -> AppResult<Option<Charge>> {
        let mut tx = self.pool.begin().await?;

        let charge = sqlx::query_as::<_, Charge>(&format!(
            "{} ON CONFLICT (parent_charge_id) DO NOTHING RETURNING *",
            INSERT_CHARGE
        ))
        .bind(new.user_id)
        .bind(new.client_id)
        .bind(new.amount)
        .bind(new.due_date)
        .bind(&new.notes)
        .bind(&new.payment_link)
        .bind(new.recurrence.is_some())
        .bind(new.recurrence.map(|r| r.interval))
        .bind(new.recurrence.and_then(|r| r.day))
        .bind(new.recurrence.map(|r| r.next_charge_date))
        .bind(new.parent_charge_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(charge) = charge else {
            return Ok(None);
        };

        refresh_aggregates(&mut *tx, charge.client_id).await?;
        tx.commit().await?;

        Ok(Some(charge))
    }

    async fn find_successor(&self, parent_id: Uuid) -> AppResult<Option<Charge>> {
        let charge =
            sqlx::query_as::<_, Charge>("SELECT * FROM charges WHERE parent_charge_id = $1")
                .bind(parent_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(charge)
    }

    async fn pending_past_due(&self, today: NaiveDate) -> AppResult<Vec<Charge>> {
        let charges = sqlx::query_as::<_, Charge>(
            r#"
            SELECT * FROM charges
            WHERE status = 'pending' AND due_date < $1
            ORDER BY due_date
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(charges)
    }

    async fn reminder_candidates(&self, due_date: NaiveDate) -> AppResult<Vec<ChargeRecipient>> {
        let charges = sqlx::query_as::<_, ChargeRecipient>(
            r#"
            SELECT c.*, cl.name AS client_name, cl.phone AS client_phone
            FROM charges c
            JOIN clients cl ON cl.id = c.client_id
            WHERE c.status = 'pending'
              AND c.due_date = $1
              AND c.last_notification_sent_at IS NULL
            ORDER BY c.created_at
            "#,
        )
        .bind(due_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(charges)
    }

    async fn overdue_recipients(&self) -> AppResult<Vec<ChargeRecipient>> {
        let charges = sqlx::query_as::<_, ChargeRecipient>(
            r#"
            SELECT c.*, cl.name AS client_name, cl.phone AS client_phone
            FROM charges c
            JOIN clients cl ON cl.id = c.client_id
            WHERE c.status = 'overdue'
            ORDER BY c.due_date
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(charges)
    }

    async fn claim_reminder(&self, charge_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE charges
            SET last_notification_sent_at = $2
            WHERE id = $1
              AND status = 'pending'
              AND last_notification_sent_at IS NULL
            "#,
        )
        .bind(charge_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ClientStore for PgStore {
    async fn find_client(&self, id: Uuid) -> AppResult<Option<Client>> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(client)
    }

    async fn find_user_client(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Client>> {
        let client =
            sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(client)
    }

    async fn list_user_clients(&self, user_id: Uuid, page: Page) -> AppResult<Vec<Client>> {
        let clients = sqlx::query_as::<_, Client>(
            r#"
            SELECT * FROM clients
            WHERE user_id = $1
            ORDER BY name
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(clients)
    }

    async fn insert_client(&self, new: &NewClient) -> AppResult<Client> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (user_id, name, phone, email)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(&new.name)
        .bind(&new.phone)
        .bind(&new.email)
        .fetch_one(&self.pool)
        .await?;

        Ok(client)
    }

    async fn update_client(
        &self,
        user_id: Uuid,
        id: Uuid,
        details: &ClientDetails,
    ) -> AppResult<Option<Client>> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients
            SET name = $3, phone = $4, email = $5
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&details.name)
        .bind(&details.phone)
        .bind(&details.email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    async fn count_client_charges(&self, client_id: Uuid) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM charges WHERE client_id = $1")
            .bind(client_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    async fn delete_client(&self, user_id: Uuid, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                // a charge was created between the emptiness check and the delete
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    AppError::Conflict("Cliente possui cobranças vinculadas".to_string())
                }
                other => AppError::Database(other),
            })?;

        Ok(result.rows_affected() == 1)
    }

    async fn recompute_client_aggregates(&self, client_id: Uuid) -> AppResult<Option<Client>> {
        let mut tx = self.pool.begin().await?;
        let client = refresh_aggregates(&mut *tx, client_id).await?;
        tx.commit().await?;

        Ok(client)
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notification(&self, new: &NewNotification) -> AppResult<Notification> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications
                (user_id, client_id, charge_id, notification_type, channel, status, message_content, sent_at)
            VALUES ($1, $2, $3, $4, 'whatsapp', $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(new.client_id)
        .bind(new.charge_id)
        .bind(new.notification_type)
        .bind(new.status)
        .bind(&new.message_content)
        .bind(new.sent_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(notification)
    }

    async fn list_user_notifications(
        &self,
        user_id: Uuid,
        filter: NotificationFilter,
        page: Page,
    ) -> AppResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1
              AND ($2::uuid IS NULL OR charge_id = $2)
              AND ($3::uuid IS NULL OR client_id = $3)
            ORDER BY sent_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(user_id)
        .bind(filter.charge_id)
        .bind(filter.client_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn find_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    async fn profiles_for_users(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Profile>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let profiles = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = ANY($1)")
            .bind(user_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(profiles.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        update: &UpdateProfileRequest,
    ) -> AppResult<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles
                (id, full_name, phone, pix_key, bank_name, bank_agency, bank_account, bank_account_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                full_name = COALESCE(EXCLUDED.full_name, profiles.full_name),
                phone = COALESCE(EXCLUDED.phone, profiles.phone),
                pix_key = COALESCE(EXCLUDED.pix_key, profiles.pix_key),
                bank_name = COALESCE(EXCLUDED.bank_name, profiles.bank_name),
                bank_agency = COALESCE(EXCLUDED.bank_agency, profiles.bank_agency),
                bank_account = COALESCE(EXCLUDED.bank_account, profiles.bank_account),
                bank_account_type = COALESCE(EXCLUDED.bank_account_type, profiles.bank_account_type),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&update.full_name)
        .bind(&update.phone)
        .bind(&update.pix_key)
        .bind(&update.bank_name)
        .bind(&update.bank_agency)
        .bind(&update.bank_account)
        .bind(&update.bank_account_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(profile)
    }
}
