//! # Payment token format
//!
//! Every authorization request we send to the gateway, and every response the gateway sends back, carries a signed,
//! time-bound token. The token is a compact JWS (`header.claims.signature`) signed with HMAC-SHA256 using the secret
//! shared with the gateway. The amount and merchant reference are *signed*, not encrypted, so an attempt to change the
//! amount in transit shows up as a signature failure.
//!
//! ## Claims
//!
//! ```text
//!   iss              issuer label
//!   cuid             merchant (customer) id assigned by the gateway
//!   auid             application id assigned by the gateway
//!   amount           canonical decimal string, e.g. "1500.00"
//!   mref             merchant reference
//!   jti              16 random bytes from the OS CSPRNG, base64 encoded
//!   iat              issue time, backdated by the configured clock skew
//!   exp              expiry, the configured lifetime after issuance
//!   notificationURL  optional webhook URL
//! ```
//!
//! A token that verifies only proves that whoever made it holds the secret. Whether it belongs to a particular
//! transaction is a separate question, answered by [`crate::ReconciliationValidator`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hpg_common::Amount;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::*;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    api::errors::{MismatchError, MismatchField, TokenError},
    config::GatewayConfig,
    db_types::MerchantReference,
};

pub const JTI_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub cuid: String,
    pub auid: String,
    pub amount: String,
    pub mref: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "notificationURL", default, skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
}

impl TokenClaims {
    /// Every field among `amount` and `mref` that differs from the expected values, in that order.
    pub fn mismatches(&self, amount: &Amount, reference: &MerchantReference) -> Vec<MismatchField> {
        let mut result = Vec::with_capacity(2);
        if self.amount != amount.to_canonical_string() {
            result.push(MismatchField::Amount);
        }
        if self.mref != reference.as_str() {
            result.push(MismatchField::MerchantReference);
        }
        result
    }
}

/// Issues and verifies payment tokens for one gateway integration. Stateless apart from its configuration.
#[derive(Clone)]
pub struct TokenCodec {
    config: GatewayConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenCodec({}/{})", self.config.merchant_id, self.config.application_id)
    }
}

impl TokenCodec {
    pub fn new(config: GatewayConfig) -> Self {
        let secret = config.secret.reveal().as_bytes();
        let encoding_key = EncodingKey::from_secret(secret);
        let decoding_key = DecodingKey::from_secret(secret);
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against our own clock in `decode_at`, with no leeway
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss"]);
        Self { config, encoding_key, decoding_key, validation }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Issues a token for `amount` and `reference`. If `notification_url` is `None`, the configured notification URL
    /// (if any) is announced instead.
    pub fn issue(
        &self,
        amount: &Amount,
        reference: &MerchantReference,
        notification_url: Option<&str>,
    ) -> Result<String, TokenError> {
        self.issue_at(amount, reference, notification_url, Utc::now())
    }

    pub fn issue_at(
        &self,
        amount: &Amount,
        reference: &MerchantReference,
        notification_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        if self.config.secret.is_unset() {
            error!("🔏️ Cannot issue a payment token for [{reference}]. No signing secret has been configured.");
            return Err(TokenError::Issuance("No signing secret has been configured".into()));
        }
        if !amount.is_positive() {
            return Err(TokenError::Issuance(format!("Amount must be positive, not {amount}")));
        }
        let claims = TokenClaims {
            iss: self.config.issuer.clone(),
            cuid: self.config.merchant_id.clone(),
            auid: self.config.application_id.clone(),
            amount: amount.to_canonical_string(),
            mref: reference.as_str().to_string(),
            jti: new_jti(),
            iat: (now - self.config.clock_skew).timestamp(),
            exp: (now + self.config.token_lifetime).timestamp(),
            notification_url: notification_url.map(String::from).or_else(|| self.config.notification_url.clone()),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Issuance(e.to_string()))?;
        trace!("🔏️ Issued token {} for [{reference}] ({amount}), valid until {}", claims.jti, claims.exp);
        Ok(token)
    }

    /// Checks the signature, structure and expiry of a token and returns its claims. Nothing else is checked.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.decode_at(token, Utc::now())
    }

    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        if self.config.secret.is_unset() {
            error!("🔏️ Cannot verify payment tokens. No signing secret has been configured.");
            return Err(TokenError::Invalid("No verification secret has been configured".into()));
        }
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => {
                debug!("🔏️ Rejecting token. {e}");
                TokenError::Invalid(e.to_string())
            },
        })?;
        let claims = data.claims;
        if claims.exp <= now.timestamp() {
            debug!("🔏️ Token {} for [{}] expired at {}", claims.jti, claims.mref, claims.exp);
            return Err(TokenError::Expired);
        }
        if claims.iat > (now + self.config.clock_skew).timestamp() {
            debug!("🔏️ Token {} for [{}] claims to be issued in the future", claims.jti, claims.mref);
            return Err(TokenError::Invalid("Token was issued in the future".into()));
        }
        Ok(claims)
    }

    /// The `jti` of a token signed with our secret, whether or not it has expired. Used to recognise our own outbound
    /// tokens when they come back.
    pub fn token_id(&self, token: &str) -> Option<String> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation).ok().map(|data| data.claims.jti)
    }

    /// Decodes a token and checks that it describes the expected amount and merchant reference.
    ///
    /// This does *not* establish that the token was meant for this merchant and application. Pass the claims through
    /// [`crate::ReconciliationValidator`] before acting on them.
    pub fn verify(
        &self,
        token: &str,
        expected_amount: &Amount,
        expected_reference: &MerchantReference,
    ) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, expected_amount, expected_reference, Utc::now())
    }

    pub fn verify_at(
        &self,
        token: &str,
        expected_amount: &Amount,
        expected_reference: &MerchantReference,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let claims = self.decode_at(token, now)?;
        let mismatches = claims.mismatches(expected_amount, expected_reference);
        match mismatches.first() {
            Some(field) => {
                warn!(
                    "🔏️ Token {} does not describe [{expected_reference}] ({expected_amount}). Mismatched fields: {}",
                    claims.jti,
                    join_fields(&mismatches)
                );
                Err(MismatchError(*field).into())
            },
            None => Ok(claims),
        }
    }
}

pub(crate) fn join_fields(fields: &[MismatchField]) -> String {
    fields.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", ")
}

fn new_jti() -> String {
    let mut bytes = [0u8; JTI_BYTES];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
