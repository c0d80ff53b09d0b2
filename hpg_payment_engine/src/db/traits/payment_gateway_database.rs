use crate::db::traits::{NotificationManagement, TransactionManagement};

/// This trait defines the highest level of behaviour for backends supporting the payment engine: a backend stores both
/// transactions and the notifications that settle them.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + TransactionManagement + NotificationManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), <Self as TransactionManagement>::Error> {
        Ok(())
    }
}
