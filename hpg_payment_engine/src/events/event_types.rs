use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db_types::{PaymentTransaction, TransactionStatus};

/// Published whenever a transaction reaches a terminal status. Receipt and e-mail delivery hang off this event.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSettledEvent {
    pub transaction: PaymentTransaction,
    /// The status the transaction was in immediately before it settled
    pub previous_status: TransactionStatus,
    pub settled_at: DateTime<Utc>,
}

impl TransactionSettledEvent {
    pub fn new(transaction: PaymentTransaction, previous_status: TransactionStatus) -> Self {
        let settled_at = transaction.completed_at.unwrap_or(transaction.updated_at);
        Self { transaction, previous_status, settled_at }
    }

    pub fn status(&self) -> TransactionStatus {
        self.transaction.status
    }
}
