use std::fmt::Debug;

use chrono::{DateTime, Utc};
use hpg_common::{Amount, CurrencyCode};
use log::*;

use crate::{
    api::{
        errors::{LedgerError, PaymentFlowError, SettlementError},
        gateway_objects::{GatewayResponse, PaymentRequest},
        ledger_api::TransactionLedger,
        settlement::{GatewaySettlement, SettlementOutcome},
    },
    db::traits::{PaymentGatewayDatabase, TransactionManagement},
    db_types::{
        GatewayResultFields,
        MerchantReference,
        NewPaymentNotification,
        NewPaymentTransaction,
        OrderId,
        PaymentTransaction,
        TransactionStatus,
    },
    events::EventProducers,
    helpers::TokenCodec,
};

/// `PaymentFlowApi` drives a payment through the synchronous path: initiating it, handing the customer to the
/// gateway, and settling it from the response that comes back with the customer's redirect.
///
/// Asynchronous notifications for the same transactions are handled by [`crate::WebhookProcessor`]. Both paths
/// settle transactions with the same routine, so whichever arrives second sees the transaction already settled.
/// Redirect responses are kept alongside the notifications, with event type [`REDIRECT_EVENT`].
pub struct PaymentFlowApi<B> {
    db: B,
    settlement: GatewaySettlement<B>,
}

pub const REDIRECT_EVENT: &str = "redirect";

impl<B> Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B: Clone> PaymentFlowApi<B> {
    pub fn new(db: B, codec: TokenCodec, producers: EventProducers) -> Self {
        let ledger = TransactionLedger::new(db.clone(), producers);
        Self { db, settlement: GatewaySettlement::new(ledger, codec) }
    }
}

impl<B> PaymentFlowApi<B> {
    pub fn ledger(&self) -> &TransactionLedger<B> {
        self.settlement.ledger()
    }

    pub fn codec(&self) -> &TokenCodec {
        self.settlement.codec()
    }
}

impl<B> PaymentFlowApi<B>
where B: TransactionManagement
{
    /// Starts a new payment attempt for an order.
    ///
    /// A fresh merchant reference is generated and signed into the outbound token together with the amount, and the
    /// transaction is recorded as `pending`. Returns the transaction and the form fields to post to the gateway.
    pub async fn initiate_payment(
        &self,
        order_id: OrderId,
        amount: Amount,
        currency: CurrencyCode,
    ) -> Result<(PaymentTransaction, PaymentRequest), PaymentFlowError> {
        let reference = MerchantReference::generate(&order_id);
        let token = self.codec().issue(&amount, &reference, None)?;
        let new_tx = NewPaymentTransaction::new(order_id, reference, amount, currency, token);
        let tx = self.ledger().create(new_tx).await?;
        let request = PaymentRequest::for_transaction(&tx, self.codec().config());
        debug!("🔄️ Payment request for [{}] is ready", tx.merchant_reference);
        Ok((tx, request))
    }

    /// Records that the customer has been handed over to the gateway's hosted page.
    pub async fn mark_processing(&self, reference: &MerchantReference) -> Result<PaymentTransaction, PaymentFlowError> {
        self.move_to(reference, TransactionStatus::Processing).await
    }

    /// Abandons a payment that never reached the gateway.
    pub async fn cancel_payment(&self, reference: &MerchantReference) -> Result<PaymentTransaction, PaymentFlowError> {
        self.move_to(reference, TransactionStatus::Cancelled).await
    }

    async fn move_to(
        &self,
        reference: &MerchantReference,
        status: TransactionStatus,
    ) -> Result<PaymentTransaction, PaymentFlowError> {
        let tx = self.ledger().get_by_reference(reference).await?;
        let tx = self.ledger().transition(tx.id, status, GatewayResultFields::default()).await?;
        Ok(tx)
    }
}

impl<B> PaymentFlowApi<B>
where B: PaymentGatewayDatabase
{
    /// Settles a transaction from the response that came back with the customer's redirect.
    ///
    /// The response is stored before anything in it is checked, and the outcome is recorded against it, so a rejected
    /// response leaves the same audit trail as a rejected notification. If the transaction has already been settled,
    /// e.g. by a notification that arrived first, the response is reconciled but nothing is changed, and
    /// [`SettlementOutcome::AlreadySettled`] is returned.
    pub async fn handle_gateway_response(
        &self,
        response: &GatewayResponse,
    ) -> Result<SettlementOutcome, SettlementError> {
        self.handle_gateway_response_at(response, Utc::now()).await
    }

    pub async fn handle_gateway_response_at(
        &self,
        response: &GatewayResponse,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, SettlementError> {
        let record_id = self.record_response(response).await?;
        let attempt = self.settlement.attempt(response, now).await;
        if let Some(outcome) = attempt.notification_outcome() {
            match self.db.mark_notification_processed(record_id, attempt.transaction_id, &outcome).await {
                Ok(_) => trace!("🔄️ Redirect response #{record_id} recorded: {outcome}"),
                Err(e) => error!("🔄️ Could not record the outcome of redirect response #{record_id} ({outcome}). {e}"),
            }
        }
        let outcome = attempt.result.map_err(|e| {
            warn!("🔄️ Gateway response #{record_id} could not be applied. {e}");
            e
        })?;
        let tx = outcome.transaction();
        match &outcome {
            SettlementOutcome::Settled(_) => info!("🔄️ Transaction [{}] settled as {}", tx.merchant_reference, tx.status),
            SettlementOutcome::AlreadySettled(_) => {
                debug!("🔄️ Transaction [{}] was already {}", tx.merchant_reference, tx.status)
            },
        }
        Ok(outcome)
    }

    async fn record_response(&self, response: &GatewayResponse) -> Result<i64, SettlementError> {
        let payload = serde_json::to_string(response).map_err(|e| SettlementError::MalformedPayload(e.to_string()))?;
        let mut record = NewPaymentNotification::new(payload, REDIRECT_EVENT.to_string());
        if let Some(reference) = response.merchant_reference.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            record = record.with_merchant_reference(MerchantReference::from(reference));
        }
        self.db.insert_notification(record).await.map_err(|e| {
            error!("🔄️ Could not store the redirect response. {e}");
            SettlementError::Ledger(LedgerError::DatabaseError(e.to_string()))
        })
    }
}
