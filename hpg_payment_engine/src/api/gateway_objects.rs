//! Wire objects exchanged with the card-payment gateway.
//!
//! Field names follow the gateway's PascalCase conventions. Amounts always travel as canonical decimal strings.
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    api::errors::SettlementError,
    config::GatewayConfig,
    db_types::{GatewayResultFields, PaymentTransaction},
};

/// The form fields posted to the gateway's hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentRequest {
    #[serde(rename = "MerchantID")]
    pub merchant_id: String,
    #[serde(rename = "ApplicationID")]
    pub application_id: String,
    pub merchant_reference: String,
    pub amount: String,
    pub token: String,
    #[serde(rename = "RedirectSuccessfulURL")]
    pub redirect_successful_url: String,
    #[serde(rename = "RedirectFailedURL")]
    pub redirect_failed_url: String,
    pub currency_code: String,
}

impl PaymentRequest {
    pub fn for_transaction(tx: &PaymentTransaction, config: &GatewayConfig) -> Self {
        Self {
            merchant_id: config.merchant_id.clone(),
            application_id: config.application_id.clone(),
            merchant_reference: tx.merchant_reference.as_str().to_string(),
            amount: tx.amount.to_canonical_string(),
            token: tx.outbound_token.clone(),
            redirect_successful_url: config.redirect_successful_url.clone(),
            redirect_failed_url: config.redirect_failed_url.clone(),
            currency_code: tx.currency.to_string(),
        }
    }
}

/// A gateway response, delivered either with the customer's redirect or as an asynchronous notification.
///
/// Only `Result` is mandatory at the parsing stage. Everything the engine acts on is taken from the signed `Token`;
/// the plain `Amount`, `MerchantReference` and `CurrencyCode` fields are cross-checked against it when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GatewayResponse {
    #[serde(deserialize_with = "result_code")]
    pub result: i32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub merchant_reference: Option<String>,
    #[serde(default)]
    pub transaction_index: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl GatewayResponse {
    pub fn from_payload(payload: &str) -> Result<Self, SettlementError> {
        serde_json::from_str(payload).map_err(|e| SettlementError::MalformedPayload(e.to_string()))
    }

    /// The signed token, if the gateway sent a non-empty one.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn result_fields(&self) -> GatewayResultFields {
        GatewayResultFields {
            result_code: Some(self.result),
            gateway_status: self.status.clone(),
            transaction_index: self.transaction_index.clone(),
            error_code: self.error_code.clone(),
            error_message: self.error_message.clone(),
            payment_method: self.payment_method.clone(),
            inbound_token: self.token().map(String::from),
        }
    }
}

// Some gateway integrations send the result code as a string
fn result_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Int(i32),
        Text(String),
    }
    match Code::deserialize(deserializer)? {
        Code::Int(v) => Ok(v),
        Code::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
