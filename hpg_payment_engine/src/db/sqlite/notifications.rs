use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{MerchantReference, NewPaymentNotification, NotificationOutcome, PaymentNotification},
};

const NOTIFICATION_COLUMNS: &str = r#"
    id,
    transaction_id,
    merchant_reference,
    event_type,
    payload,
    processed,
    outcome,
    failure_reason,
    received_at,
    processed_at
"#;

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: i64,
    transaction_id: Option<i64>,
    merchant_reference: Option<String>,
    event_type: String,
    payload: String,
    processed: bool,
    outcome: Option<String>,
    failure_reason: Option<String>,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for PaymentNotification {
    type Error = SqliteDatabaseError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let outcome = row
            .outcome
            .map(|label| NotificationOutcome::from_parts(&label, row.failure_reason))
            .transpose()
            .map_err(|e| SqliteDatabaseError::ConversionError(e.to_string()))?;
        Ok(Self {
            id: row.id,
            transaction_id: row.transaction_id,
            merchant_reference: row.merchant_reference.map(MerchantReference::from),
            event_type: row.event_type,
            payload: row.payload,
            processed: row.processed,
            outcome,
            received_at: row.received_at,
            processed_at: row.processed_at,
        })
    }
}

fn convert_rows(rows: Vec<NotificationRow>) -> Result<Vec<PaymentNotification>, SqliteDatabaseError> {
    rows.into_iter().map(PaymentNotification::try_from).collect()
}

pub async fn insert_notification(
    notification: NewPaymentNotification,
    conn: &mut SqliteConnection,
) -> Result<i64, SqliteDatabaseError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
            INSERT INTO payment_notifications (merchant_reference, event_type, payload, received_at)
            VALUES (?, ?, ?, ?)
            RETURNING id;
        "#,
    )
    .bind(notification.merchant_reference)
    .bind(notification.event_type)
    .bind(notification.payload)
    .bind(notification.received_at)
    .fetch_all(conn)
    .await?;
    let id = ids
        .into_iter()
        .next()
        .ok_or_else(|| SqliteDatabaseError::QueryError("Inserting a notification returned no id".into()))?;
    trace!("🗃️ Notification #{id} stored");
    Ok(id)
}

pub async fn fetch_notification(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentNotification>, SqliteDatabaseError> {
    let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM payment_notifications WHERE id = ?");
    let row = sqlx::query_as::<_, NotificationRow>(&sql).bind(id).fetch_optional(conn).await?;
    row.map(PaymentNotification::try_from).transpose()
}

/// Marks the notification processed. Returns `false` if it had already been processed by someone else.
pub async fn mark_processed(
    id: i64,
    transaction_id: Option<i64>,
    outcome: &NotificationOutcome,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE payment_notifications SET
                processed = TRUE,
                transaction_id = ?,
                outcome = ?,
                failure_reason = ?,
                processed_at = ?
            WHERE id = ? AND processed = FALSE;
        "#,
    )
    .bind(transaction_id)
    .bind(outcome.label())
    .bind(outcome.failure_reason())
    .bind(Utc::now())
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn fetch_for_transaction(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentNotification>, SqliteDatabaseError> {
    let sql =
        format!("SELECT {NOTIFICATION_COLUMNS} FROM payment_notifications WHERE transaction_id = ? ORDER BY id ASC");
    let rows = sqlx::query_as::<_, NotificationRow>(&sql).bind(transaction_id).fetch_all(conn).await?;
    convert_rows(rows)
}

pub async fn fetch_unprocessed(conn: &mut SqliteConnection) -> Result<Vec<PaymentNotification>, SqliteDatabaseError> {
    let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM payment_notifications WHERE processed = FALSE ORDER BY id ASC");
    let rows = sqlx::query_as::<_, NotificationRow>(&sql).fetch_all(conn).await?;
    convert_rows(rows)
}
