//! The settlement routine shared by the redirect and notification paths, so that the two cannot disagree.
use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;

use crate::{
    api::{
        errors::SettlementError,
        gateway_objects::GatewayResponse,
        ledger_api::TransactionLedger,
        reconciliation::ReconciliationValidator,
    },
    db::traits::TransactionManagement,
    db_types::{status_for_result_code, MerchantReference, NotificationOutcome, PaymentTransaction},
    helpers::{TokenClaims, TokenCodec},
};

#[derive(Debug, Clone, Serialize)]
pub enum SettlementOutcome {
    /// The response moved the transaction into a terminal status.
    Settled(PaymentTransaction),
    /// The transaction had already settled. Nothing was changed.
    AlreadySettled(PaymentTransaction),
}

impl SettlementOutcome {
    pub fn transaction(&self) -> &PaymentTransaction {
        match self {
            Self::Settled(tx) | Self::AlreadySettled(tx) => tx,
        }
    }

    pub fn is_already_settled(&self) -> bool {
        matches!(self, Self::AlreadySettled(_))
    }
}

#[derive(Clone)]
pub(crate) struct GatewaySettlement<B> {
    ledger: TransactionLedger<B>,
    codec: TokenCodec,
    validator: ReconciliationValidator,
}

impl<B> GatewaySettlement<B> {
    pub fn new(ledger: TransactionLedger<B>, codec: TokenCodec) -> Self {
        let validator = ReconciliationValidator::new(codec.config());
        Self { ledger, codec, validator }
    }

    pub fn ledger(&self) -> &TransactionLedger<B> {
        &self.ledger
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }
}

impl<B> GatewaySettlement<B>
where B: TransactionManagement
{
    /// Verifies the response token and loads the transaction named by its (signed) merchant reference.
    pub async fn resolve(
        &self,
        response: &GatewayResponse,
        now: DateTime<Utc>,
    ) -> Result<(PaymentTransaction, TokenClaims), SettlementError> {
        let token = response
            .token()
            .ok_or_else(|| SettlementError::MalformedPayload("The response does not carry a token".into()))?;
        let claims = self.codec.decode_at(token, now)?;
        let reference = MerchantReference::from(claims.mref.as_str());
        let tx = self.ledger.get_by_reference(&reference).await?;
        Ok((tx, claims))
    }

    /// Reconciles the response with `tx` and, if it checks out, settles the transaction according to the result code.
    pub async fn apply(
        &self,
        tx: &PaymentTransaction,
        claims: &TokenClaims,
        response: &GatewayResponse,
    ) -> Result<SettlementOutcome, SettlementError> {
        self.validator.validate(tx, claims)?;
        self.validator.validate_response(tx, response)?;
        let token = response.token().unwrap_or_default();
        let outbound_jti = self.codec.token_id(&tx.outbound_token);
        self.validator.validate_origin(tx, token, claims, outbound_jti.as_deref())?;
        if tx.status.is_terminal() {
            debug!("🧾️ Transaction #{} [{}] is already {}", tx.id, tx.merchant_reference, tx.status);
            return Ok(SettlementOutcome::AlreadySettled(tx.clone()));
        }
        let status = status_for_result_code(response.result);
        match self.ledger.transition(tx.id, status, response.result_fields()).await {
            Ok(updated) => Ok(SettlementOutcome::Settled(updated)),
            Err(e) if e.is_already_settled() => {
                debug!("🧾️ Transaction #{} [{}] settled concurrently. {e}", tx.id, tx.merchant_reference);
                let latest = self.ledger.get(tx.id).await?;
                Ok(SettlementOutcome::AlreadySettled(latest))
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves and applies `response`, keeping track of the transaction it was resolved against, if any.
    pub async fn attempt(&self, response: &GatewayResponse, now: DateTime<Utc>) -> SettlementAttempt {
        let (tx, claims) = match self.resolve(response, now).await {
            Ok(v) => v,
            Err(e) => return SettlementAttempt { transaction_id: None, result: Err(e) },
        };
        let result = self.apply(&tx, &claims, response).await;
        SettlementAttempt { transaction_id: Some(tx.id), result }
    }
}

/// A gateway response that has been run through [`GatewaySettlement::attempt`].
#[derive(Debug)]
pub(crate) struct SettlementAttempt {
    pub transaction_id: Option<i64>,
    pub result: Result<SettlementOutcome, SettlementError>,
}

impl SettlementAttempt {
    /// The outcome to record against the stored response. `None` for database failures, which leave the record
    /// unprocessed so that it can be retried.
    pub fn notification_outcome(&self) -> Option<NotificationOutcome> {
        match &self.result {
            Ok(SettlementOutcome::Settled(tx)) => Some(NotificationOutcome::Applied(tx.status)),
            Ok(SettlementOutcome::AlreadySettled(_)) => Some(NotificationOutcome::AlreadySettled),
            Err(e) if e.is_database_error() => None,
            Err(e) => Some(NotificationOutcome::Rejected(e.to_string())),
        }
    }
}
