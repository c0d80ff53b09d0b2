use crate::db_types::PaymentTransaction;

pub enum InsertTransactionResult {
    Inserted(PaymentTransaction),
    /// A transaction with the same merchant reference already exists. Contains the id of that transaction.
    AlreadyExists(i64),
}
