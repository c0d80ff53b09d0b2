use crate::db_types::{NewPaymentNotification, NotificationOutcome, PaymentNotification};

/// Storage for inbound [`PaymentNotification`]s.
#[allow(async_fn_in_trait)]
pub trait NotificationManagement {
    type Error: std::error::Error;

    /// Stores a notification verbatim, unprocessed, and returns its id. Always inserts a new record.
    async fn insert_notification(&self, notification: NewPaymentNotification) -> Result<i64, Self::Error>;

    async fn fetch_notification(&self, id: i64) -> Result<Option<PaymentNotification>, Self::Error>;

    /// Marks the notification as processed, recording the outcome and the transaction it was resolved against.
    ///
    /// Only an unprocessed notification can be marked. Returns `false` if the notification had already been processed,
    /// in which case nothing is changed.
    async fn mark_notification_processed(
        &self,
        id: i64,
        transaction_id: Option<i64>,
        outcome: &NotificationOutcome,
    ) -> Result<bool, Self::Error>;

    /// All notifications resolved against the given transaction, oldest first.
    async fn fetch_notifications_for_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Vec<PaymentNotification>, Self::Error>;

    /// All notifications that have not been processed yet, oldest first.
    async fn fetch_unprocessed_notifications(&self) -> Result<Vec<PaymentNotification>, Self::Error>;
}
