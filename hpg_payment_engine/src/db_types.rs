use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use hpg_common::{Amount, CurrencyCode};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   MerchantReference   ---------------------------------------------------------
const REFERENCE_PREFIX_LEN: usize = 16;
const REFERENCE_RANDOM_LEN: usize = 16;

/// The correlation key shared with the gateway. Unique per payment attempt and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MerchantReference(pub String);

impl MerchantReference {
    /// Generates a fresh reference for the given order: the order's alphanumeric characters (truncated) followed by
    /// random characters from the thread-local CSPRNG, e.g. `R1042-x8Fq2LmZ0aP4wK7c`.
    pub fn generate(order_id: &OrderId) -> Self {
        let prefix = order_id
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(REFERENCE_PREFIX_LEN)
            .collect::<String>();
        let suffix =
            rand::thread_rng().sample_iter(&Alphanumeric).take(REFERENCE_RANDOM_LEN).map(char::from).collect::<String>();
        if prefix.is_empty() {
            Self(suffix)
        } else {
            Self(format!("{prefix}-{suffix}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MerchantReference {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MerchantReference {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for MerchantReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------   TransactionStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// The transaction has been created and the customer has not yet been handed to the gateway.
    Pending,
    /// The customer is on the gateway's hosted page.
    Processing,
    /// The gateway reported success. Terminal.
    Completed,
    /// The gateway reported a failure. Terminal.
    Failed,
    /// The payment was abandoned before reaching the gateway. Terminal.
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The forward-only state machine.
    ///
    /// | From \ To  | Pending | Processing | Completed | Failed | Cancelled |
    /// |------------|---------|------------|-----------|--------|-----------|
    /// | Pending    |         | ✔          | ✔         | ✔      | ✔         |
    /// | Processing |         |            | ✔         | ✔      |           |
    /// | Completed  |         |            |           |        |           |
    /// | Failed     |         |            |           |        |           |
    /// | Cancelled  |         |            |           |        |           |
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!((*self, next), (Pending, Processing | Completed | Failed | Cancelled) | (Processing, Completed | Failed))
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Processing => write!(f, "processing"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

/// Gateway result codes `0` (success) and `1` (success with warning) are successes. Everything else, notably `-1`, is a
/// failure. Both the redirect and the webhook paths go through this function so that they cannot disagree.
pub fn is_success_code(code: i32) -> bool {
    matches!(code, 0 | 1)
}

/// The terminal status a gateway result code settles a transaction into.
pub fn status_for_result_code(code: i32) -> TransactionStatus {
    if is_success_code(code) {
        TransactionStatus::Completed
    } else {
        TransactionStatus::Failed
    }
}

//--------------------------------------  PaymentTransaction  ---------------------------------------------------------
/// One payment attempt. Only the [`crate::TransactionLedger`] mutates these records, and they are never deleted.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub merchant_reference: MerchantReference,
    pub order_id: OrderId,
    #[sqlx(try_from = "String")]
    pub amount: Amount,
    #[sqlx(try_from = "String")]
    pub currency: CurrencyCode,
    pub payment_method: Option<String>,
    pub status: TransactionStatus,
    /// The gateway's own identifier for the transaction, once known
    pub transaction_index: Option<String>,
    pub result_code: Option<i32>,
    pub gateway_status: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub success: bool,
    /// The signed token sent to the gateway with the authorization request
    pub outbound_token: String,
    /// The signed token the gateway returned, once settled
    pub inbound_token: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

//-------------------------------------- NewPaymentTransaction ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPaymentTransaction {
    pub order_id: OrderId,
    pub merchant_reference: MerchantReference,
    pub amount: Amount,
    pub currency: CurrencyCode,
    pub outbound_token: String,
    pub initiated_at: DateTime<Utc>,
}

impl NewPaymentTransaction {
    pub fn new(
        order_id: OrderId,
        merchant_reference: MerchantReference,
        amount: Amount,
        currency: CurrencyCode,
        outbound_token: String,
    ) -> Self {
        Self { order_id, merchant_reference, amount, currency, outbound_token, initiated_at: Utc::now() }
    }
}

//--------------------------------------  GatewayResultFields  ---------------------------------------------------------
/// The gateway-supplied fields copied onto a transaction when it settles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayResultFields {
    pub result_code: Option<i32>,
    pub gateway_status: Option<String>,
    pub transaction_index: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub payment_method: Option<String>,
    pub inbound_token: Option<String>,
}

impl GatewayResultFields {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A fully resolved status change, ready to be written with a compare-and-swap on the current status.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
    pub fields: GatewayResultFields,
    pub success: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

//--------------------------------------  NotificationOutcome  ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationOutcome {
    /// The notification drove the transaction into the given status.
    Applied(TransactionStatus),
    /// The transaction had already reached a terminal status. Nothing was changed.
    AlreadySettled,
    /// The notification could not be trusted or reconciled. Nothing was changed.
    Rejected(String),
}

impl NotificationOutcome {
    /// The short label stored alongside the notification.
    pub fn label(&self) -> String {
        match self {
            Self::Applied(status) => format!("applied:{status}"),
            Self::AlreadySettled => "already_settled".to_string(),
            Self::Rejected(_) => "rejected".to_string(),
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Rejected(reason) => Some(reason.as_str()),
            _ => None,
        }
    }

    /// Rebuilds an outcome from its stored label and failure reason.
    pub fn from_parts(label: &str, failure_reason: Option<String>) -> Result<Self, ConversionError> {
        match label {
            "already_settled" => Ok(Self::AlreadySettled),
            "rejected" => Ok(Self::Rejected(failure_reason.unwrap_or_default())),
            s => match s.strip_prefix("applied:") {
                Some(status) => status.parse().map(Self::Applied),
                None => Err(ConversionError(format!("Invalid notification outcome: {s}"))),
            },
        }
    }
}

impl Display for NotificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied(status) => write!(f, "applied ({status})"),
            Self::AlreadySettled => write!(f, "already settled"),
            Self::Rejected(reason) => write!(f, "rejected ({reason})"),
        }
    }
}

//--------------------------------------  PaymentNotification  ---------------------------------------------------------
/// An inbound gateway notification, stored verbatim before it is validated.
#[derive(Debug, Clone)]
pub struct PaymentNotification {
    pub id: i64,
    /// The transaction the notification was resolved against, once processed
    pub transaction_id: Option<i64>,
    /// The merchant reference the payload claims to describe, if one could be read at ingestion
    pub merchant_reference: Option<MerchantReference>,
    pub event_type: String,
    pub payload: String,
    pub processed: bool,
    pub outcome: Option<NotificationOutcome>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentNotification {
    pub merchant_reference: Option<MerchantReference>,
    pub event_type: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

impl NewPaymentNotification {
    pub fn new(payload: String, event_type: String) -> Self {
        Self { merchant_reference: None, event_type, payload, received_at: Utc::now() }
    }

    pub fn with_merchant_reference(mut self, reference: MerchantReference) -> Self {
        self.merchant_reference = Some(reference);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use TransactionStatus::*;

    const ALL: [TransactionStatus; 5] = [Pending, Processing, Completed, Failed, Cancelled];

    #[test]
    fn terminal_states_are_final() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be forbidden");
            }
        }
    }

    #[test]
    fn nothing_returns_to_pending() {
        for from in ALL {
            assert!(!from.can_transition_to(Pending));
        }
        assert!(!Processing.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
    }

    #[test]
    fn result_codes() {
        assert!(is_success_code(0));
        assert!(is_success_code(1));
        assert!(!is_success_code(-1));
        assert!(!is_success_code(2));
        assert_eq!(status_for_result_code(1), Completed);
        assert_eq!(status_for_result_code(-1), Failed);
    }

    #[test]
    fn status_strings() {
        for status in ALL {
            assert_eq!(status.to_string().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("Paid".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn merchant_references_are_unique() {
        let oid = OrderId::from("R-1042/b");
        let a = MerchantReference::generate(&oid);
        let b = MerchantReference::generate(&oid);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("R1042b-"));
        assert_eq!(a.as_str().len(), "R1042b-".len() + REFERENCE_RANDOM_LEN);
        let anonymous = MerchantReference::generate(&OrderId::from("///"));
        assert_eq!(anonymous.as_str().len(), REFERENCE_RANDOM_LEN);
    }

    #[test]
    fn outcome_labels() {
        let outcomes = [
            NotificationOutcome::Applied(Completed),
            NotificationOutcome::AlreadySettled,
            NotificationOutcome::Rejected("amount mismatch".into()),
        ];
        for outcome in outcomes {
            let label = outcome.label();
            let reason = outcome.failure_reason().map(String::from);
            assert_eq!(NotificationOutcome::from_parts(&label, reason).unwrap(), outcome);
        }
        assert!(NotificationOutcome::from_parts("applied:paid", None).is_err());
    }
}
