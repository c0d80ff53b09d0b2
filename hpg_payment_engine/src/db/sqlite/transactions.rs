use chrono::Utc;
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db::{sqlite::SqliteDatabaseError, traits::InsertTransactionResult},
    db_types::{MerchantReference, NewPaymentTransaction, PaymentTransaction, StatusChange},
};

const TRANSACTION_COLUMNS: &str = r#"
    id,
    merchant_reference,
    order_id,
    amount,
    currency,
    payment_method,
    status,
    transaction_index,
    result_code,
    gateway_status,
    error_code,
    error_message,
    success,
    outbound_token,
    inbound_token,
    initiated_at,
    completed_at,
    updated_at
"#;

/// Inserts a new transaction, unless one with the same merchant reference already exists.
///
/// `RETURNING` statements are always drained with `fetch_all`. A statement that is left half-read keeps SQLite's write
/// transaction open, and the new row stays invisible to other connections.
pub async fn idempotent_insert(
    tx: NewPaymentTransaction,
    conn: &mut SqliteConnection,
) -> Result<InsertTransactionResult, SqliteDatabaseError> {
    let reference = tx.merchant_reference.clone();
    let sql = format!(
        r#"
            INSERT INTO payment_transactions (
                merchant_reference,
                order_id,
                amount,
                currency,
                outbound_token,
                initiated_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {TRANSACTION_COLUMNS};
        "#
    );
    let result = sqlx::query_as::<_, PaymentTransaction>(&sql)
        .bind(tx.merchant_reference)
        .bind(tx.order_id)
        .bind(tx.amount.to_canonical_string())
        .bind(tx.currency.to_string())
        .bind(tx.outbound_token)
        .bind(tx.initiated_at)
        .bind(tx.initiated_at)
        .fetch_all(&mut *conn)
        .await;
    match result {
        Ok(rows) => {
            let record = rows.into_iter().next().ok_or_else(|| {
                SqliteDatabaseError::QueryError(format!("Inserting transaction [{reference}] returned no row"))
            })?;
            Ok(InsertTransactionResult::Inserted(record))
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            debug!("🗃️ Merchant reference [{reference}] is already in use");
            let existing = fetch_transaction_by_reference(&reference, conn).await?.ok_or_else(|| {
                SqliteDatabaseError::QueryError(format!(
                    "Unique violation for [{reference}], but no transaction with that reference exists"
                ))
            })?;
            Ok(InsertTransactionResult::AlreadyExists(existing.id))
        },
        Err(e) => Err(SqliteDatabaseError::from(e)),
    }
}

pub async fn fetch_transaction(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, SqliteDatabaseError> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE id = ?");
    let tx = sqlx::query_as::<_, PaymentTransaction>(&sql).bind(id).fetch_optional(conn).await?;
    Ok(tx)
}

pub async fn fetch_transaction_by_reference(
    reference: &MerchantReference,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, SqliteDatabaseError> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE merchant_reference = ?");
    let tx = sqlx::query_as::<_, PaymentTransaction>(&sql).bind(reference.as_str()).fetch_optional(conn).await?;
    Ok(tx)
}

/// Compare-and-swap on the transaction status. Gateway fields that are `None` in the change leave the stored value
/// untouched. Returns `None` if the transaction does not exist or is no longer in `change.from`.
pub(crate) async fn update_status(
    id: i64,
    change: &StatusChange,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, SqliteDatabaseError> {
    let sql = format!(
        r#"
            UPDATE payment_transactions SET
                status = ?,
                success = ?,
                result_code = COALESCE(?, result_code),
                gateway_status = COALESCE(?, gateway_status),
                transaction_index = COALESCE(?, transaction_index),
                error_code = COALESCE(?, error_code),
                error_message = COALESCE(?, error_message),
                payment_method = COALESCE(?, payment_method),
                inbound_token = COALESCE(?, inbound_token),
                completed_at = COALESCE(?, completed_at),
                updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING {TRANSACTION_COLUMNS};
        "#
    );
    let fields = &change.fields;
    trace!("🗃️ Moving transaction #{id} from {} to {}", change.from, change.to);
    let updated = sqlx::query_as::<_, PaymentTransaction>(&sql)
        .bind(change.to)
        .bind(change.success)
        .bind(fields.result_code)
        .bind(fields.gateway_status.as_deref())
        .bind(fields.transaction_index.as_deref())
        .bind(fields.error_code.as_deref())
        .bind(fields.error_message.as_deref())
        .bind(fields.payment_method.as_deref())
        .bind(fields.inbound_token.as_deref())
        .bind(change.completed_at)
        .bind(Utc::now())
        .bind(id)
        .bind(change.from)
        .fetch_all(conn)
        .await?
        .into_iter()
        .next();
    if updated.is_none() {
        debug!("🗃️ Transaction #{id} was not in status {}. Nothing was updated.", change.from);
    }
    Ok(updated)
}
