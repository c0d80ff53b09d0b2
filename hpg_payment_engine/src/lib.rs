//! Hospitality Payment Gateway engine
//!
//! This library is the authorization and reconciliation core that sits between the hospitality platform and a
//! third-party card-payment gateway. It turns an order into a signed, time-bound payment request, checks that whatever
//! comes back really came from the gateway and really describes the same payment, and drives each transaction through
//! its status lifecycle exactly once, however many times the gateway repeats itself.
//!
//! The library is divided into these main sections:
//! 1. The token codec ([`helpers::TokenCodec`]). Issues and verifies the HMAC-signed tokens exchanged with the gateway.
//! 2. The public API:
//!    * [`TransactionLedger`] owns the transaction status lifecycle.
//!    * [`ReconciliationValidator`] checks that a verified token belongs to a given transaction.
//!    * [`WebhookProcessor`] ingests and processes asynchronous gateway notifications.
//!    * [`PaymentFlowApi`] handles the synchronous flow, from initiating a payment to handling the redirect response.
//! 3. Storage. The APIs are generic over the traits in [`PaymentGatewayDatabase`] and friends. SQLite is the supported
//!    backend.
//!
//! A [`events::TransactionSettledEvent`] is published whenever a transaction reaches a terminal status. Register a hook
//! with [`events::EventHooks`] to send receipts or update the order.
mod api;
mod db;

pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{
    errors::{
        LedgerError,
        MismatchError,
        MismatchField,
        PaymentFlowError,
        SettlementError,
        TokenError,
        WebhookError,
    },
    gateway_objects::{GatewayResponse, PaymentRequest},
    ledger_api::TransactionLedger,
    payment_flow_api::{PaymentFlowApi, REDIRECT_EVENT},
    reconciliation::ReconciliationValidator,
    settlement::SettlementOutcome,
    webhook_api::WebhookProcessor,
};
#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use db::traits::{InsertTransactionResult, NotificationManagement, PaymentGatewayDatabase, TransactionManagement};
