use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    api::{
        errors::{SettlementError, WebhookError},
        gateway_objects::GatewayResponse,
        ledger_api::TransactionLedger,
        settlement::{GatewaySettlement, SettlementOutcome},
    },
    db::traits::PaymentGatewayDatabase,
    db_types::{MerchantReference, NewPaymentNotification, NotificationOutcome, PaymentNotification},
    events::EventProducers,
    helpers::TokenCodec,
};

/// `WebhookProcessor` handles asynchronous gateway notifications.
///
/// Notifications are stored first and validated second: [`Self::ingest`] keeps every payload verbatim, whatever it
/// contains, and [`Self::process`] later decides what to do with it. Each notification is processed exactly once. A
/// notification that cannot be trusted is consumed with a recorded reason and is never retried automatically.
pub struct WebhookProcessor<B> {
    db: B,
    settlement: GatewaySettlement<B>,
}

impl<B> Debug for WebhookProcessor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookProcessor")
    }
}

impl<B: Clone> WebhookProcessor<B> {
    pub fn new(db: B, codec: TokenCodec, producers: EventProducers) -> Self {
        let ledger = TransactionLedger::new(db.clone(), producers);
        let settlement = GatewaySettlement::new(ledger, codec);
        Self { db, settlement }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn ledger(&self) -> &TransactionLedger<B> {
        self.settlement.ledger()
    }
}

impl<B> WebhookProcessor<B>
where B: PaymentGatewayDatabase
{
    /// Stores a new, unprocessed notification and returns its id. Nothing in the payload is validated here.
    pub async fn ingest(&self, raw_payload: &str, event_type: &str) -> Result<i64, WebhookError> {
        let mut notification = NewPaymentNotification::new(raw_payload.to_string(), event_type.to_string());
        if let Some(reference) = claimed_reference(raw_payload) {
            notification = notification.with_merchant_reference(reference);
        }
        let claimed = notification.merchant_reference.clone();
        let id = self.db.insert_notification(notification).await.map_err(db_error)?;
        match claimed {
            Some(reference) => info!("🪝️ Notification #{id} ({event_type}) received for [{reference}]"),
            None => info!("🪝️ Notification #{id} ({event_type}) received. It does not name a merchant reference."),
        }
        Ok(id)
    }

    /// Processes the notification, if it has not been processed before, and returns the outcome.
    ///
    /// Calling this more than once for the same notification is harmless: later calls return the recorded outcome and
    /// change nothing. Errors are only returned for infrastructure failures, in which case the notification is left
    /// unprocessed and can be retried.
    pub async fn process(&self, id: i64) -> Result<NotificationOutcome, WebhookError> {
        self.process_at(id, Utc::now()).await
    }

    pub async fn process_at(&self, id: i64, now: DateTime<Utc>) -> Result<NotificationOutcome, WebhookError> {
        let notification = self.fetch(id).await?;
        if notification.processed {
            debug!("🪝️ Notification #{id} was already processed");
            return Ok(recorded_outcome(&notification));
        }
        let (transaction_id, outcome) = self.evaluate(&notification, now).await?;
        let marked = self.db.mark_notification_processed(id, transaction_id, &outcome).await.map_err(db_error)?;
        if marked {
            info!("🪝️ Notification #{id} processed: {outcome}");
            Ok(outcome)
        } else {
            // A concurrent call got there first. Its outcome is the one on record.
            let notification = self.fetch(id).await?;
            let winner = recorded_outcome(&notification);
            debug!("🪝️ Notification #{id} was processed concurrently with outcome {winner}");
            Ok(winner)
        }
    }

    /// Notifications that have been received but not processed, oldest first.
    pub async fn unprocessed_notifications(&self) -> Result<Vec<PaymentNotification>, WebhookError> {
        self.db.fetch_unprocessed_notifications().await.map_err(db_error)
    }

    /// The notifications that were resolved against the given transaction, oldest first.
    pub async fn notifications_for_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Vec<PaymentNotification>, WebhookError> {
        self.db.fetch_notifications_for_transaction(transaction_id).await.map_err(db_error)
    }

    async fn fetch(&self, id: i64) -> Result<PaymentNotification, WebhookError> {
        self.db.fetch_notification(id).await.map_err(db_error)?.ok_or(WebhookError::NotificationNotFound(id))
    }

    async fn evaluate(
        &self,
        notification: &PaymentNotification,
        now: DateTime<Utc>,
    ) -> Result<(Option<i64>, NotificationOutcome), WebhookError> {
        let id = notification.id;
        let response = match GatewayResponse::from_payload(&notification.payload) {
            Ok(r) => r,
            Err(e) => return rejection(id, None, e),
        };
        let attempt = self.settlement.attempt(&response, now).await;
        match attempt.result {
            Ok(SettlementOutcome::Settled(tx)) => Ok((Some(tx.id), NotificationOutcome::Applied(tx.status))),
            Ok(SettlementOutcome::AlreadySettled(tx)) => {
                debug!("🪝️ Notification #{id} is a duplicate for transaction #{} ({})", tx.id, tx.status);
                Ok((Some(tx.id), NotificationOutcome::AlreadySettled))
            },
            Err(e) => rejection(id, attempt.transaction_id, e),
        }
    }
}

fn rejection(
    id: i64,
    transaction_id: Option<i64>,
    e: SettlementError,
) -> Result<(Option<i64>, NotificationOutcome), WebhookError> {
    if e.is_database_error() {
        error!("🪝️ Notification #{id} could not be processed and will remain pending. {e}");
        return Err(WebhookError::DatabaseError(e.to_string()));
    }
    warn!("🪝️ Notification #{id} rejected. {e}");
    Ok((transaction_id, NotificationOutcome::Rejected(e.to_string())))
}

fn recorded_outcome(notification: &PaymentNotification) -> NotificationOutcome {
    notification.outcome.clone().unwrap_or_else(|| NotificationOutcome::Rejected("No outcome was recorded".into()))
}

fn claimed_reference(payload: &str) -> Option<MerchantReference> {
    let value = serde_json::from_str::<serde_json::Value>(payload).ok()?;
    let reference = value.get("MerchantReference")?.as_str()?.trim();
    (!reference.is_empty()).then(|| MerchantReference::from(reference))
}

fn db_error<E: std::error::Error>(e: E) -> WebhookError {
    error!("🪝️ Notification store error: {e}");
    WebhookError::DatabaseError(e.to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reference_is_read_on_a_best_effort_basis() {
        let reference = claimed_reference(r#"{"Result": 0, "MerchantReference": " R1-abc "}"#);
        assert_eq!(reference, Some(MerchantReference::from("R1-abc")));
        assert_eq!(claimed_reference(r#"{"MerchantReference": ""}"#), None);
        assert_eq!(claimed_reference(r#"{"MerchantReference": 42}"#), None);
        assert_eq!(claimed_reference("<xml/>"), None);
    }
}
