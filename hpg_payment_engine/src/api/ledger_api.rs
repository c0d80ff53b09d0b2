use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    api::errors::LedgerError,
    db::traits::{InsertTransactionResult, TransactionManagement},
    db_types::{
        GatewayResultFields,
        MerchantReference,
        NewPaymentTransaction,
        PaymentTransaction,
        StatusChange,
        TransactionStatus,
    },
    events::{EventProducers, TransactionSettledEvent},
};

/// `TransactionLedger` is the only component that mutates [`PaymentTransaction`] records. It enforces the forward-only
/// status lifecycle and publishes a [`TransactionSettledEvent`] when a transaction reaches a terminal status.
///
/// Transitions are applied with a compare-and-swap on the current status, so two callers racing to settle the same
/// transaction cannot both succeed. The loser receives [`LedgerError::InvalidTransition`] describing the status the
/// winner left behind.
#[derive(Clone)]
pub struct TransactionLedger<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for TransactionLedger<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionLedger")
    }
}

impl<B> TransactionLedger<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> TransactionLedger<B>
where B: TransactionManagement
{
    /// Records a new transaction in `pending` status.
    ///
    /// The merchant reference must be fresh. If it is already in use, nothing is written and
    /// [`LedgerError::DuplicateReference`] is returned; the caller should generate a new reference (and token) and
    /// try again.
    pub async fn create(&self, tx: NewPaymentTransaction) -> Result<PaymentTransaction, LedgerError> {
        if !tx.amount.is_positive() {
            return Err(LedgerError::InvalidAmount(tx.amount));
        }
        let reference = tx.merchant_reference.clone();
        match self.db.insert_transaction(tx).await.map_err(db_error)? {
            InsertTransactionResult::Inserted(tx) => {
                info!(
                    "📒️ Transaction #{} [{reference}] created for order {} ({} {})",
                    tx.id, tx.order_id, tx.amount, tx.currency
                );
                Ok(tx)
            },
            InsertTransactionResult::AlreadyExists(id) => {
                warn!("📒️ Merchant reference [{reference}] already belongs to transaction #{id}");
                Err(LedgerError::DuplicateReference(reference))
            },
        }
    }

    /// Moves the transaction to `new_status`.
    ///
    /// When the transaction settles as `completed` or `failed`, the gateway `fields` are copied onto the record and
    /// `completed_at` is set. For any other target status the fields are ignored.
    pub async fn transition(
        &self,
        id: i64,
        new_status: TransactionStatus,
        fields: GatewayResultFields,
    ) -> Result<PaymentTransaction, LedgerError> {
        let current = self.get(id).await?;
        let from = current.status;
        if !from.can_transition_to(new_status) {
            debug!("📒️ Transaction #{id} cannot move from {from} to {new_status}");
            return Err(LedgerError::InvalidTransition { from, to: new_status });
        }
        let settles = matches!(new_status, TransactionStatus::Completed | TransactionStatus::Failed);
        if !settles && !fields.is_empty() {
            debug!("📒️ Ignoring gateway fields supplied with the {from} -> {new_status} transition of #{id}");
        }
        let change = StatusChange {
            from,
            to: new_status,
            fields: if settles { fields } else { GatewayResultFields::default() },
            success: new_status == TransactionStatus::Completed,
            completed_at: settles.then(Utc::now),
        };
        match self.db.update_transaction_status(id, &change).await.map_err(db_error)? {
            Some(updated) => {
                info!("📒️ Transaction #{id} [{}] moved from {from} to {new_status}", updated.merchant_reference);
                if updated.status.is_terminal() {
                    self.publish_settled(&updated, from).await;
                }
                Ok(updated)
            },
            None => {
                // Someone else changed the status between our read and the write
                let latest = self.get(id).await?;
                debug!(
                    "📒️ Transaction #{id} was moved to {} by a concurrent writer. The {from} -> {new_status} transition \
                     was not applied.",
                    latest.status
                );
                Err(LedgerError::InvalidTransition { from: latest.status, to: new_status })
            },
        }
    }

    pub async fn get(&self, id: i64) -> Result<PaymentTransaction, LedgerError> {
        self.db.fetch_transaction(id).await.map_err(db_error)?.ok_or_else(|| LedgerError::dne(format!("#{id}")))
    }

    pub async fn get_by_reference(&self, reference: &MerchantReference) -> Result<PaymentTransaction, LedgerError> {
        self.db
            .fetch_transaction_by_reference(reference)
            .await
            .map_err(db_error)?
            .ok_or_else(|| LedgerError::dne(format!("[{reference}]")))
    }

    async fn publish_settled(&self, tx: &PaymentTransaction, previous_status: TransactionStatus) {
        for emitter in &self.producers.transaction_settled_producer {
            debug!("📒️ Notifying transaction settled hook subscribers");
            emitter.publish_event(TransactionSettledEvent::new(tx.clone(), previous_status)).await;
        }
    }
}

fn db_error<E: std::error::Error>(e: E) -> LedgerError {
    error!("📒️ Transaction store error: {e}");
    LedgerError::DatabaseError(e.to_string())
}
