use crate::{
    db::traits::InsertTransactionResult,
    db_types::{MerchantReference, NewPaymentTransaction, PaymentTransaction, StatusChange},
};

/// Storage for [`PaymentTransaction`] records.
#[allow(async_fn_in_trait)]
pub trait TransactionManagement {
    type Error: std::error::Error;

    /// Stores a new transaction in `pending` status.
    ///
    /// If the merchant reference is already taken, nothing is written and `AlreadyExists` is returned.
    async fn insert_transaction(&self, tx: NewPaymentTransaction) -> Result<InsertTransactionResult, Self::Error>;

    async fn fetch_transaction(&self, id: i64) -> Result<Option<PaymentTransaction>, Self::Error>;

    async fn fetch_transaction_by_reference(
        &self,
        reference: &MerchantReference,
    ) -> Result<Option<PaymentTransaction>, Self::Error>;

    /// Applies `change` to the transaction with the given id if, and only if, its status is still `change.from`.
    ///
    /// This is a compare-and-swap. Returns the updated transaction, or `None` if the transaction was not in the expected
    /// status (typically because a concurrent writer got there first). Implementations must not change any field
    /// other than the status, the gateway result fields, the success flag and the timestamps.
    async fn update_transaction_status(
        &self,
        id: i64,
        change: &StatusChange,
    ) -> Result<Option<PaymentTransaction>, Self::Error>;
}
