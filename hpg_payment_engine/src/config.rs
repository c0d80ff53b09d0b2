//! Gateway integration configuration.
//!
//! Each gateway integration (production, sandbox, a second merchant account, ...) is described by its own
//! [`GatewayConfig`]. Nothing is cached globally: the config is handed to the [`crate::helpers::TokenCodec`] and
//! [`crate::ReconciliationValidator`] constructors, so several integrations can coexist in one process.
//!
//! [`GatewayConfig::from_env_or_default`] reads the following environment variables:
//! * `HPG_MERCHANT_ID` - the merchant (customer) id assigned by the gateway (`cuid` claim).
//! * `HPG_APPLICATION_ID` - the application id assigned by the gateway (`auid` claim).
//! * `HPG_TOKEN_SECRET` - the shared secret used to sign and verify tokens.
//! * `HPG_TOKEN_ISSUER` - the issuer label placed in outbound tokens. Default: `hpg`.
//! * `HPG_TOKEN_CLOCK_SKEW_SECS` - how far `iat` is backdated. Default: 60.
//! * `HPG_TOKEN_LIFETIME_SECS` - how long an issued token stays valid. Default: 600.
//! * `HPG_NOTIFICATION_URL` - optional webhook URL announced to the gateway in outbound tokens.
//! * `HPG_REDIRECT_SUCCESS_URL`, `HPG_REDIRECT_FAILED_URL` - where the gateway sends the customer afterwards.
use std::env;

use chrono::Duration;
use hpg_common::Secret;
use log::*;

pub const DEFAULT_TOKEN_ISSUER: &str = "hpg";
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::seconds(60);
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::seconds(600);

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// The merchant/customer id the gateway assigned to us.
    pub merchant_id: String,
    /// The application id the gateway assigned to this integration.
    pub application_id: String,
    /// The symmetric secret shared with the gateway.
    pub secret: Secret<String>,
    pub issuer: String,
    /// Outbound tokens are backdated by this much to tolerate clock drift between us and the gateway.
    pub clock_skew: Duration,
    /// Tokens expire this long after they were issued.
    pub token_lifetime: Duration,
    pub notification_url: Option<String>,
    pub redirect_successful_url: String,
    pub redirect_failed_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            merchant_id: String::default(),
            application_id: String::default(),
            secret: Secret::default(),
            issuer: DEFAULT_TOKEN_ISSUER.to_string(),
            clock_skew: DEFAULT_CLOCK_SKEW,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            notification_url: None,
            redirect_successful_url: String::default(),
            redirect_failed_url: String::default(),
        }
    }
}

impl GatewayConfig {
    pub fn new(merchant_id: &str, application_id: &str, secret: &str) -> Self {
        Self {
            merchant_id: merchant_id.to_string(),
            application_id: application_id.to_string(),
            secret: Secret::new(secret.to_string()),
            ..Default::default()
        }
    }

    pub fn with_notification_url(mut self, url: &str) -> Self {
        self.notification_url = Some(url.to_string());
        self
    }

    pub fn with_redirect_urls(mut self, successful: &str, failed: &str) -> Self {
        self.redirect_successful_url = successful.to_string();
        self.redirect_failed_url = failed.to_string();
        self
    }

    pub fn with_token_timing(mut self, clock_skew: Duration, token_lifetime: Duration) -> Self {
        self.clock_skew = clock_skew;
        self.token_lifetime = token_lifetime;
        self
    }

    pub fn from_env_or_default() -> Self {
        let merchant_id = env::var("HPG_MERCHANT_ID").ok().unwrap_or_else(|| {
            error!("🪛️ HPG_MERCHANT_ID is not set. Please set it to the merchant id issued by the payment gateway.");
            String::default()
        });
        let application_id = env::var("HPG_APPLICATION_ID").ok().unwrap_or_else(|| {
            error!("🪛️ HPG_APPLICATION_ID is not set. Please set it to the application id issued by the payment gateway.");
            String::default()
        });
        let secret = env::var("HPG_TOKEN_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ HPG_TOKEN_SECRET is not set. Payment tokens cannot be issued until it is set to the secret shared \
                 with the payment gateway."
            );
            String::default()
        });
        let issuer = env::var("HPG_TOKEN_ISSUER").ok().unwrap_or_else(|| {
            info!("🪛️ HPG_TOKEN_ISSUER is not set. Using the default, {DEFAULT_TOKEN_ISSUER}.");
            DEFAULT_TOKEN_ISSUER.to_string()
        });
        let clock_skew = seconds_from_env("HPG_TOKEN_CLOCK_SKEW_SECS", DEFAULT_CLOCK_SKEW);
        let token_lifetime = seconds_from_env("HPG_TOKEN_LIFETIME_SECS", DEFAULT_TOKEN_LIFETIME);
        let notification_url = env::var("HPG_NOTIFICATION_URL").ok().filter(|s| !s.trim().is_empty());
        if notification_url.is_none() {
            info!("🪛️ HPG_NOTIFICATION_URL is not set. Outbound tokens will not announce a webhook URL.");
        }
        let redirect_successful_url = env::var("HPG_REDIRECT_SUCCESS_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ HPG_REDIRECT_SUCCESS_URL is not set. The gateway will not know where to send paying customers.");
            String::default()
        });
        let redirect_failed_url = env::var("HPG_REDIRECT_FAILED_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ HPG_REDIRECT_FAILED_URL is not set. The gateway will not know where to send failed payments.");
            String::default()
        });
        Self {
            merchant_id,
            application_id,
            secret: Secret::new(secret),
            issuer,
            clock_skew,
            token_lifetime,
            notification_url,
            redirect_successful_url,
            redirect_failed_url,
        }
    }
}

fn seconds_from_env(var: &str, default: Duration) -> Duration {
    env::var(var)
        .map_err(|_| info!("🪛️ {var} is not set. Using the default value of {}s.", default.num_seconds()))
        .and_then(|s| {
            s.trim()
                .parse::<i64>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for {var}. {e}"))
                .and_then(|v| {
                    if v < 0 {
                        warn!("🪛️ {var} cannot be negative. Using the default value of {}s.", default.num_seconds());
                        Err(())
                    } else {
                        Ok(Duration::seconds(v))
                    }
                })
        })
        .ok()
        .unwrap_or(default)
}
