//! SQLite persistence.
//!
//! Queries take a `&mut SqliteConnection` so callers can run several of them
//! inside one transaction (`store.begin()` then `&mut *tx`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PayError;
use crate::models::{
    ApproverSettings, ListRole, NewUser, Payment, PaymentId, PaymentStatus, User, UserId,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(url: &str) -> Result<Self, PayError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        tracing::info!("Database ready at {}", url);

        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection that never expires,
    /// otherwise the data would vanish with it.
    pub async fn open_in_memory() -> Result<Self, PayError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Write transaction. Takes the write lock up front so concurrent writers
    /// queue under `busy_timeout` instead of failing on a read-to-write upgrade.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, PayError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

pub async fn insert_user(conn: &mut SqliteConnection, new: &NewUser) -> Result<User, PayError> {
    let created_at = Utc::now();
    let display_name = new
        .display_name
        .clone()
        .unwrap_or_else(|| new.name.clone());

    let id = sqlx::query(
        "INSERT INTO users(name, display_name, email, created_at) VALUES(?, ?, ?, ?)",
    )
    .bind(&new.name)
    .bind(&display_name)
    .bind(&new.email)
    .bind(created_at)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(User {
        id,
        name: new.name.clone(),
        display_name,
        email: new.email.clone(),
        created_at,
    })
}

pub async fn fetch_user(conn: &mut SqliteConnection, id: UserId) -> Result<Option<User>, PayError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, name, display_name, email, created_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(user)
}

pub async fn fetch_users(
    conn: &mut SqliteConnection,
    ids: &[UserId],
) -> Result<HashMap<UserId, User>, PayError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, name, display_name, email, created_at FROM users WHERE id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let users = qb.build_query_as::<User>().fetch_all(&mut *conn).await?;
    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}

const PAYMENT_COLUMNS: &str = "id, sender_id, sender_name, sender_display_name, receiver_id, \
     external_email, contact_method, amount, hourly_rate, details, payment_method, \
     payment_address, convert_rate, convert_time, expected_amount, status, rejection_reason, \
     approvers, created_at, updated_at, sent_at, paid_at, tx_id";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    sender_id: i64,
    sender_name: String,
    sender_display_name: String,
    receiver_id: i64,
    external_email: Option<String>,
    contact_method: String,
    amount: String,
    hourly_rate: Option<String>,
    details: String,
    payment_method: Option<String>,
    payment_address: Option<String>,
    convert_rate: Option<String>,
    convert_time: Option<DateTime<Utc>>,
    expected_amount: Option<String>,
    status: String,
    rejection_reason: Option<String>,
    approvers: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    tx_id: Option<String>,
}

fn decimal(column: &str, raw: &str) -> Result<Decimal, PayError> {
    Decimal::from_str(raw)
        .map_err(|e| PayError::InternalError(format!("corrupt {} value {:?}: {}", column, raw, e)))
}

fn optional_decimal(column: &str, raw: Option<String>) -> Result<Option<Decimal>, PayError> {
    raw.map(|value| decimal(column, &value)).transpose()
}

impl TryFrom<PaymentRow> for Payment {
    type Error = PayError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            sender_display_name: row.sender_display_name,
            receiver_id: row.receiver_id,
            external_email: row.external_email,
            contact_method: row.contact_method.parse().map_err(PayError::InternalError)?,
            amount: decimal("amount", &row.amount)?,
            hourly_rate: optional_decimal("hourly_rate", row.hourly_rate)?,
            details: serde_json::from_str(&row.details)?,
            payment_method: row.payment_method,
            payment_address: row.payment_address,
            convert_rate: optional_decimal("convert_rate", row.convert_rate)?,
            convert_time: row.convert_time,
            expected_amount: optional_decimal("expected_amount", row.expected_amount)?,
            status: row.status.parse().map_err(PayError::InternalError)?,
            rejection_reason: row.rejection_reason,
            approvers: serde_json::from_str(&row.approvers)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            sent_at: row.sent_at,
            paid_at: row.paid_at,
            tx_id: row.tx_id,
        })
    }
}

fn to_payments(rows: Vec<PaymentRow>) -> Result<Vec<Payment>, PayError> {
    rows.into_iter().map(Payment::try_from).collect()
}

pub async fn insert_payment(
    conn: &mut SqliteConnection,
    payment: &Payment,
) -> Result<PaymentId, PayError> {
    let id = sqlx::query(
        "INSERT INTO payments(sender_id, sender_name, sender_display_name, receiver_id, \
         external_email, contact_method, amount, hourly_rate, details, payment_method, \
         payment_address, convert_rate, convert_time, expected_amount, status, \
         rejection_reason, approvers, created_at, updated_at, sent_at, paid_at, tx_id) \
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(payment.sender_id)
    .bind(&payment.sender_name)
    .bind(&payment.sender_display_name)
    .bind(payment.receiver_id)
    .bind(&payment.external_email)
    .bind(payment.contact_method.as_str())
    .bind(payment.amount.to_string())
    .bind(payment.hourly_rate.map(|d| d.to_string()))
    .bind(serde_json::to_string(&payment.details)?)
    .bind(&payment.payment_method)
    .bind(&payment.payment_address)
    .bind(payment.convert_rate.map(|d| d.to_string()))
    .bind(payment.convert_time)
    .bind(payment.expected_amount.map(|d| d.to_string()))
    .bind(payment.status.as_str())
    .bind(&payment.rejection_reason)
    .bind(serde_json::to_string(&payment.approvers)?)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .bind(payment.sent_at)
    .bind(payment.paid_at)
    .bind(&payment.tx_id)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(id)
}

/// Writes every mutable column of `payment` back to its row.
pub async fn update_payment(conn: &mut SqliteConnection, payment: &Payment) -> Result<(), PayError> {
    let result = sqlx::query(
        "UPDATE payments SET receiver_id = ?, external_email = ?, contact_method = ?, \
         amount = ?, hourly_rate = ?, details = ?, payment_method = ?, payment_address = ?, \
         convert_rate = ?, convert_time = ?, expected_amount = ?, status = ?, \
         rejection_reason = ?, approvers = ?, updated_at = ?, sent_at = ?, paid_at = ?, \
         tx_id = ? WHERE id = ?",
    )
    .bind(payment.receiver_id)
    .bind(&payment.external_email)
    .bind(payment.contact_method.as_str())
    .bind(payment.amount.to_string())
    .bind(payment.hourly_rate.map(|d| d.to_string()))
    .bind(serde_json::to_string(&payment.details)?)
    .bind(&payment.payment_method)
    .bind(&payment.payment_address)
    .bind(payment.convert_rate.map(|d| d.to_string()))
    .bind(payment.convert_time)
    .bind(payment.expected_amount.map(|d| d.to_string()))
    .bind(payment.status.as_str())
    .bind(&payment.rejection_reason)
    .bind(serde_json::to_string(&payment.approvers)?)
    .bind(payment.updated_at)
    .bind(payment.sent_at)
    .bind(payment.paid_at)
    .bind(&payment.tx_id)
    .bind(payment.id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(PayError::NotFound(format!("payment {}", payment.id)));
    }
    Ok(())
}

pub async fn fetch_payment(
    conn: &mut SqliteConnection,
    id: PaymentId,
) -> Result<Option<Payment>, PayError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {} FROM payments WHERE id = ?",
        PAYMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Payment::try_from).transpose()
}

/// Payments to `receiver_id` that are sent but not yet confirmed, paid or
/// rejected.
pub async fn fetch_in_flight_for_receiver(
    conn: &mut SqliteConnection,
    receiver_id: UserId,
) -> Result<Vec<Payment>, PayError> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {} FROM payments WHERE receiver_id = ? AND status = ? ORDER BY id",
        PAYMENT_COLUMNS
    ))
    .bind(receiver_id)
    .bind(PaymentStatus::Sent.as_str())
    .fetch_all(&mut *conn)
    .await?;

    to_payments(rows)
}

/// Listing criteria for one viewer.
#[derive(Debug, Clone)]
pub struct PaymentFilter {
    pub viewer: UserId,
    pub role: Option<ListRole>,
    /// (recipient, sender) pairs the viewer approves for.
    pub approver_pairs: Vec<(UserId, UserId)>,
    pub statuses: Vec<PaymentStatus>,
}

fn push_sender_clause(qb: &mut QueryBuilder<'_, Sqlite>, viewer: UserId) {
    qb.push("sender_id = ").push_bind(viewer);
}

fn push_receiver_clause(qb: &mut QueryBuilder<'_, Sqlite>, viewer: UserId) {
    qb.push("(receiver_id = ")
        .push_bind(viewer)
        .push(" AND status <> ")
        .push_bind(PaymentStatus::Created.as_str())
        .push(")");
}

fn push_approver_clause(qb: &mut QueryBuilder<'_, Sqlite>, pairs: &[(UserId, UserId)]) {
    if pairs.is_empty() {
        qb.push("0 = 1");
        return;
    }
    qb.push("(status <> ")
        .push_bind(PaymentStatus::Created.as_str())
        .push(" AND (");
    for (index, (recipient, sender)) in pairs.iter().enumerate() {
        if index > 0 {
            qb.push(" OR ");
        }
        qb.push("(receiver_id = ")
            .push_bind(*recipient)
            .push(" AND sender_id = ")
            .push_bind(*sender)
            .push(")");
    }
    qb.push("))");
}

fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PaymentFilter) {
    qb.push(" WHERE (");
    match filter.role {
        Some(ListRole::Sender) => push_sender_clause(qb, filter.viewer),
        Some(ListRole::Receiver) => push_receiver_clause(qb, filter.viewer),
        Some(ListRole::Approver) => push_approver_clause(qb, &filter.approver_pairs),
        None => {
            push_sender_clause(qb, filter.viewer);
            qb.push(" OR ");
            push_receiver_clause(qb, filter.viewer);
            qb.push(" OR ");
            push_approver_clause(qb, &filter.approver_pairs);
        }
    }
    qb.push(")");

    if !filter.statuses.is_empty() {
        qb.push(" AND status IN (");
        let mut separated = qb.separated(", ");
        for status in &filter.statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(")");
    }
}

/// One page of payments matching `filter`, newest first, plus the total count.
pub async fn list_payments(
    conn: &mut SqliteConnection,
    filter: &PaymentFilter,
    limit: u32,
    offset: u64,
) -> Result<(Vec<Payment>, u64), PayError> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM payments");
    push_where(&mut count, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM payments", PAYMENT_COLUMNS));
    push_where(&mut qb, filter);
    qb.push(" ORDER BY id DESC LIMIT ")
        .push_bind(i64::from(limit))
        .push(" OFFSET ")
        .push_bind(offset as i64);

    let rows = qb.build_query_as::<PaymentRow>().fetch_all(&mut *conn).await?;
    Ok((to_payments(rows)?, total.max(0) as u64))
}

const SETTINGS_COLUMNS: &str =
    "id, recipient_id, send_user_id, send_user_name, approver_id, approver_name, show_cost";

pub async fn fetch_policy_rows(
    conn: &mut SqliteConnection,
    recipient_id: UserId,
    send_user_id: UserId,
) -> Result<Vec<ApproverSettings>, PayError> {
    let rows = sqlx::query_as::<_, ApproverSettings>(&format!(
        "SELECT {} FROM approver_settings WHERE recipient_id = ? AND send_user_id = ? ORDER BY id",
        SETTINGS_COLUMNS
    ))
    .bind(recipient_id)
    .bind(send_user_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn fetch_recipient_policy(
    conn: &mut SqliteConnection,
    recipient_id: UserId,
) -> Result<Vec<ApproverSettings>, PayError> {
    let rows = sqlx::query_as::<_, ApproverSettings>(&format!(
        "SELECT {} FROM approver_settings WHERE recipient_id = ? ORDER BY id",
        SETTINGS_COLUMNS
    ))
    .bind(recipient_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn fetch_policies_where_approver(
    conn: &mut SqliteConnection,
    approver_id: UserId,
) -> Result<Vec<(UserId, UserId)>, PayError> {
    let pairs = sqlx::query_as::<_, (i64, i64)>(
        "SELECT DISTINCT recipient_id, send_user_id FROM approver_settings \
         WHERE approver_id = ? ORDER BY recipient_id, send_user_id",
    )
    .bind(approver_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(pairs)
}

pub async fn delete_recipient_policy(
    conn: &mut SqliteConnection,
    recipient_id: UserId,
) -> Result<u64, PayError> {
    let result = sqlx::query("DELETE FROM approver_settings WHERE recipient_id = ?")
        .bind(recipient_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn insert_policy_row(
    conn: &mut SqliteConnection,
    row: &ApproverSettings,
) -> Result<i64, PayError> {
    let id = sqlx::query(
        "INSERT INTO approver_settings(recipient_id, send_user_id, send_user_name, \
         approver_id, approver_name, show_cost) VALUES(?, ?, ?, ?, ?, ?)",
    )
    .bind(row.recipient_id)
    .bind(row.send_user_id)
    .bind(&row.send_user_name)
    .bind(row.approver_id)
    .bind(&row.approver_name)
    .bind(row.show_cost)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Approver, ContactMethod};

    fn draft(sender: &User, receiver: &User) -> Payment {
        let now = Utc::now();
        Payment {
            id: 0,
            sender_id: sender.id,
            sender_name: sender.name.clone(),
            sender_display_name: sender.display_name.clone(),
            receiver_id: receiver.id,
            external_email: None,
            contact_method: ContactMethod::Internal,
            amount: "12.50".parse().unwrap(),
            hourly_rate: None,
            details: vec![],
            payment_method: None,
            payment_address: None,
            convert_rate: None,
            convert_time: None,
            expected_amount: None,
            status: PaymentStatus::Sent,
            rejection_reason: None,
            approvers: vec![Approver {
                approver_id: receiver.id,
                approver_name: receiver.name.clone(),
                is_approved: true,
            }],
            created_at: now,
            updated_at: now,
            sent_at: Some(now),
            paid_at: None,
            tx_id: None,
        }
    }

    #[tokio::test]
    async fn payment_row_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        let alice = insert_user(&mut conn, &NewUser::named("alice")).await.unwrap();
        let bob = insert_user(&mut conn, &NewUser::named("bob")).await.unwrap();

        let mut payment = draft(&alice, &bob);
        payment.id = insert_payment(&mut conn, &payment).await.unwrap();

        let loaded = fetch_payment(&mut conn, payment.id).await.unwrap().unwrap();
        assert_eq!(loaded.amount, payment.amount);
        assert_eq!(loaded.approvers, payment.approvers);
        assert_eq!(loaded.status, PaymentStatus::Sent);

        let in_flight = fetch_in_flight_for_receiver(&mut conn, bob.id).await.unwrap();
        assert_eq!(in_flight.len(), 1);
    }

    #[tokio::test]
    async fn update_of_missing_payment_is_not_found() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let alice = insert_user(&mut conn, &NewUser::named("alice")).await.unwrap();
        let bob = insert_user(&mut conn, &NewUser::named("bob")).await.unwrap();

        let mut payment = draft(&alice, &bob);
        payment.id = 404;
        let err = update_payment(&mut conn, &payment).await.unwrap_err();
        assert!(matches!(err, PayError::NotFound(_)));
    }

    #[tokio::test]
    async fn fetch_users_by_ids() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let alice = insert_user(&mut conn, &NewUser::named("alice")).await.unwrap();

        let users = fetch_users(&mut conn, &[alice.id, 999]).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[&alice.id].display_name, "alice");
    }
}
