//! Deciding whether a message that *verifies* also *belongs* to a given transaction.
//!
//! A valid signature only shows that the sender holds the shared secret. If one secret serves several integrations, or
//! a token for one transaction is replayed against another, the signature still checks out. The
//! [`ReconciliationValidator`] closes that gap by comparing the claims against the stored transaction.
use std::str::FromStr;

use hpg_common::{Amount, CurrencyCode};
use log::*;

use crate::{
    api::{
        errors::{MismatchError, MismatchField},
        gateway_objects::GatewayResponse,
    },
    config::GatewayConfig,
    db_types::PaymentTransaction,
    helpers::{join_fields, TokenClaims},
};

#[derive(Debug, Clone)]
pub struct ReconciliationValidator {
    merchant_id: String,
    application_id: String,
}

impl ReconciliationValidator {
    pub fn new(config: &GatewayConfig) -> Self {
        Self { merchant_id: config.merchant_id.clone(), application_id: config.application_id.clone() }
    }

    /// Checks the claims of a decoded token against `tx`.
    ///
    /// The checks are, in order: merchant id, application id, amount and merchant reference. Every check is evaluated
    /// and every mismatch is logged, but only the first is returned.
    pub fn validate(&self, tx: &PaymentTransaction, claims: &TokenClaims) -> Result<(), MismatchError> {
        let mut mismatches = Vec::with_capacity(4);
        if claims.cuid != self.merchant_id {
            mismatches.push(MismatchField::MerchantId);
        }
        if claims.auid != self.application_id {
            mismatches.push(MismatchField::ApplicationId);
        }
        mismatches.extend(claims.mismatches(&tx.amount, &tx.merchant_reference));
        report(tx, "token", &mismatches)
    }

    /// Cross-checks the unsigned fields of a gateway response against `tx`. Fields the gateway left out are not
    /// checked; the signed token remains authoritative.
    pub fn validate_response(&self, tx: &PaymentTransaction, response: &GatewayResponse) -> Result<(), MismatchError> {
        let mut mismatches = Vec::with_capacity(3);
        if let Some(amount) = response.amount.as_deref() {
            if Amount::from_str(amount).map(|a| a.to_canonical_string()).ok() != Some(tx.amount.to_canonical_string())
            {
                mismatches.push(MismatchField::Amount);
            }
        }
        if let Some(reference) = response.merchant_reference.as_deref() {
            if reference.trim() != tx.merchant_reference.as_str() {
                mismatches.push(MismatchField::MerchantReference);
            }
        }
        if let Some(currency) = response.currency_code.as_deref() {
            if CurrencyCode::from_str(currency).ok().as_ref() != Some(&tx.currency) {
                mismatches.push(MismatchField::Currency);
            }
        }
        report(tx, "response", &mismatches)
    }

    /// Rejects an inbound token that is the transaction's own outbound token.
    ///
    /// Outbound and inbound tokens share a claim shape and a secret, and the outbound token is handed to the customer's
    /// browser. Sent back as a "response", it would otherwise reconcile perfectly. `outbound_jti` is the `jti` of
    /// `tx.outbound_token`, if it could be decoded.
    pub fn validate_origin(
        &self,
        tx: &PaymentTransaction,
        inbound_token: &str,
        claims: &TokenClaims,
        outbound_jti: Option<&str>,
    ) -> Result<(), MismatchError> {
        let echoed = inbound_token.trim() == tx.outbound_token || outbound_jti == Some(claims.jti.as_str());
        let mismatches = if echoed { vec![MismatchField::TokenId] } else { vec![] };
        report(tx, "token", &mismatches)
    }
}

fn report(tx: &PaymentTransaction, source: &str, mismatches: &[MismatchField]) -> Result<(), MismatchError> {
    match mismatches.first() {
        None => {
            trace!("🧾️ Gateway {source} reconciles with transaction [{}]", tx.merchant_reference);
            Ok(())
        },
        Some(field) => {
            warn!(
                "🧾️ Gateway {source} does not reconcile with transaction #{} [{}]. Mismatched fields: {}",
                tx.id,
                tx.merchant_reference,
                join_fields(mismatches)
            );
            Err(MismatchError(*field))
        },
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::{MerchantReference, OrderId, TransactionStatus};

    fn config() -> GatewayConfig {
        GatewayConfig::new("merchant-42", "app-7", "secret")
    }

    fn transaction() -> PaymentTransaction {
        let now = Utc::now();
        PaymentTransaction {
            id: 1,
            merchant_reference: MerchantReference::from("R1042-abc"),
            order_id: OrderId::from("R1042"),
            amount: "1500.00".parse().unwrap(),
            currency: "NAD".parse().unwrap(),
            payment_method: None,
            status: TransactionStatus::Pending,
            transaction_index: None,
            result_code: None,
            gateway_status: None,
            error_code: None,
            error_message: None,
            success: false,
            outbound_token: "tok".into(),
            inbound_token: None,
            initiated_at: now,
            completed_at: None,
            updated_at: now,
        }
    }

    fn claims() -> TokenClaims {
        TokenClaims {
            iss: "hpg".into(),
            cuid: "merchant-42".into(),
            auid: "app-7".into(),
            amount: "1500.00".into(),
            mref: "R1042-abc".into(),
            jti: "jti".into(),
            iat: 0,
            exp: 0,
            notification_url: None,
        }
    }

    fn response() -> GatewayResponse {
        GatewayResponse {
            result: 0,
            status: None,
            merchant_reference: Some("R1042-abc".into()),
            transaction_index: None,
            error_code: None,
            error_message: None,
            amount: Some("1500".into()),
            currency_code: Some("nad".into()),
            payment_method: None,
            token: None,
        }
    }

    #[test]
    fn matching_claims() {
        let validator = ReconciliationValidator::new(&config());
        assert!(validator.validate(&transaction(), &claims()).is_ok());
    }

    #[test]
    fn first_mismatch_is_reported() {
        let validator = ReconciliationValidator::new(&config());
        let tx = transaction();
        let mut c = claims();
        c.amount = "1500.01".into();
        c.mref = "R1042-xyz".into();
        assert_eq!(validator.validate(&tx, &c).unwrap_err().field(), MismatchField::Amount);
        c.auid = "app-8".into();
        assert_eq!(validator.validate(&tx, &c).unwrap_err().field(), MismatchField::ApplicationId);
        c.cuid = "merchant-43".into();
        assert_eq!(validator.validate(&tx, &c).unwrap_err().field(), MismatchField::MerchantId);
        let mut c = claims();
        c.mref = "R1042-xyz".into();
        assert_eq!(validator.validate(&tx, &c).unwrap_err().field(), MismatchField::MerchantReference);
    }

    #[test]
    fn amounts_compare_as_decimal_strings() {
        let validator = ReconciliationValidator::new(&config());
        let mut c = claims();
        c.amount = "1500".into();
        assert_eq!(validator.validate(&transaction(), &c).unwrap_err().field(), MismatchField::Amount);
        c.amount = "1500.000000001".into();
        assert_eq!(validator.validate(&transaction(), &c).unwrap_err().field(), MismatchField::Amount);
    }

    #[test]
    fn plain_response_fields() {
        let validator = ReconciliationValidator::new(&config());
        let tx = transaction();
        assert!(validator.validate_response(&tx, &response()).is_ok());
        let mut r = response();
        r.currency_code = Some("ZAR".into());
        assert_eq!(validator.validate_response(&tx, &r).unwrap_err().field(), MismatchField::Currency);
        r.amount = Some("15.00".into());
        assert_eq!(validator.validate_response(&tx, &r).unwrap_err().field(), MismatchField::Amount);
        let mut r = response();
        r.merchant_reference = Some("R1042-xyz".into());
        assert_eq!(validator.validate_response(&tx, &r).unwrap_err().field(), MismatchField::MerchantReference);
        let mut r = response();
        r.amount = Some("lots".into());
        assert_eq!(validator.validate_response(&tx, &r).unwrap_err().field(), MismatchField::Amount);
    }

    #[test]
    fn absent_response_fields_are_not_checked() {
        let validator = ReconciliationValidator::new(&config());
        let mut r = response();
        r.amount = None;
        r.merchant_reference = None;
        r.currency_code = None;
        assert!(validator.validate_response(&transaction(), &r).is_ok());
    }

    #[test]
    fn echoed_outbound_token_is_rejected() {
        let validator = ReconciliationValidator::new(&config());
        let tx = transaction();
        let c = claims();
        assert!(validator.validate_origin(&tx, "gateway-token", &c, Some("outbound-jti")).is_ok());
        assert!(validator.validate_origin(&tx, "gateway-token", &c, None).is_ok());
        let err = validator.validate_origin(&tx, "gateway-token", &c, Some("jti")).unwrap_err();
        assert_eq!(err.field(), MismatchField::TokenId);
        let err = validator.validate_origin(&tx, " tok ", &c, None).unwrap_err();
        assert_eq!(err.field(), MismatchField::TokenId);
    }
}
