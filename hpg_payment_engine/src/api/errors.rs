use std::fmt::Display;

use hpg_common::Amount;
use thiserror::Error;

use crate::db_types::{MerchantReference, TransactionStatus};

//--------------------------------------    MismatchError    ---------------------------------------------------------
/// The field that failed reconciliation against a stored transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MismatchField {
    MerchantId,
    ApplicationId,
    Amount,
    MerchantReference,
    Currency,
    /// The inbound token is our own outbound token, echoed back.
    TokenId,
}

impl Display for MismatchField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MismatchField::MerchantId => write!(f, "merchant_id"),
            MismatchField::ApplicationId => write!(f, "application_id"),
            MismatchField::Amount => write!(f, "amount"),
            MismatchField::MerchantReference => write!(f, "merchant_reference"),
            MismatchField::Currency => write!(f, "currency"),
            MismatchField::TokenId => write!(f, "jti"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Reconciliation failed: the {0} field does not match the transaction")]
pub struct MismatchError(pub MismatchField);

impl MismatchError {
    pub fn field(&self) -> MismatchField {
        self.0
    }
}

//--------------------------------------      TokenError     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Could not issue a payment token. {0}")]
    Issuance(String),
    #[error("The payment token has expired")]
    Expired,
    #[error("The payment token is invalid. {0}")]
    Invalid(String),
    #[error(transparent)]
    Mismatch(#[from] MismatchError),
}

//--------------------------------------     LedgerError     ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Merchant reference {0} is already in use")]
    DuplicateReference(MerchantReference),
    #[error("A transaction cannot move from {from} to {to}")]
    InvalidTransition { from: TransactionStatus, to: TransactionStatus },
    #[error("Transaction not found: {0}")]
    NotFound(String),
    #[error("Transaction amounts must be positive, not {0}")]
    InvalidAmount(Amount),
}

impl LedgerError {
    pub fn dne<S: Display>(id: S) -> Self {
        Self::NotFound(id.to_string())
    }

    /// True for a transition attempted against a transaction that is already terminal. Gateways redeliver
    /// notifications for transactions that were resolved elsewhere, so callers usually treat this as a benign duplicate.
    pub fn is_already_settled(&self) -> bool {
        matches!(self, Self::InvalidTransition { from, .. } if from.is_terminal())
    }
}

//--------------------------------------   SettlementError   ---------------------------------------------------------
/// Reasons a gateway response (redirect or webhook) could not settle a transaction.
#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Malformed gateway payload. {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Mismatch(#[from] MismatchError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SettlementError {
    /// Infrastructure failures are worth retrying. Everything else means the message itself cannot be trusted or
    /// applied.
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Ledger(LedgerError::DatabaseError(_)))
    }
}

//--------------------------------------   PaymentFlowError  ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum PaymentFlowError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

//--------------------------------------     WebhookError    ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Notification {0} does not exist")]
    NotificationNotFound(i64),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mismatch_names_the_field() {
        let err = MismatchError(MismatchField::Amount);
        assert_eq!(err.field().to_string(), "amount");
        assert_eq!(err.to_string(), "Reconciliation failed: the amount field does not match the transaction");
    }

    #[test]
    fn already_settled_only_for_terminal_sources() {
        use TransactionStatus::*;
        let settled = LedgerError::InvalidTransition { from: Completed, to: Failed };
        assert!(settled.is_already_settled());
        let ordering = LedgerError::InvalidTransition { from: Processing, to: Pending };
        assert!(!ordering.is_already_settled());
        assert!(!LedgerError::dne("ref-1").is_already_settled());
    }
}
