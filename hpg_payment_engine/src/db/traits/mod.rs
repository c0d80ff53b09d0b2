//! #  Database management and control.
//!
//! This module defines the interface contracts that payment engine storage *backends* must fulfil. The engine never
//! talks to a database directly; the APIs in [`crate::api`] are generic over these traits.
//!
//! * [`PaymentGatewayDatabase`] is the umbrella trait for a complete backend.
//! * [`TransactionManagement`] stores payment transactions and applies status changes atomically.
//! * [`NotificationManagement`] stores inbound gateway notifications and records how they were handled.
mod data_objects;
mod notification_management;
mod payment_gateway_database;
mod transaction_management;

pub use data_objects::InsertTransactionResult;
pub use notification_management::NotificationManagement;
pub use payment_gateway_database::PaymentGatewayDatabase;
pub use transaction_management::TransactionManagement;
