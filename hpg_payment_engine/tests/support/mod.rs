#![allow(dead_code)]

use hpg_common::Amount;
use hpg_payment_engine::{
    config::GatewayConfig,
    db_types::PaymentTransaction,
    events::EventProducers,
    helpers::TokenCodec,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    PaymentFlowApi,
    PaymentGatewayDatabase,
    SqliteDatabase,
    WebhookProcessor,
};
use log::*;
use serde_json::json;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const MERCHANT_ID: &str = "merchant-42";
pub const APPLICATION_ID: &str = "app-7";
pub const SECRET: &str = "integration-test-shared-secret";

pub fn gateway_config() -> GatewayConfig {
    GatewayConfig::new(MERCHANT_ID, APPLICATION_ID, SECRET)
        .with_redirect_urls("https://hotel.example/payments/ok", "https://hotel.example/payments/failed")
        .with_notification_url("https://hotel.example/payments/notify")
}

pub struct TestSystem {
    pub db_path: String,
    pub flow: PaymentFlowApi<SqliteDatabase>,
    pub webhooks: WebhookProcessor<SqliteDatabase>,
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let codec = TokenCodec::new(gateway_config());
        let flow = PaymentFlowApi::new(db.clone(), codec.clone(), producers.clone());
        let webhooks = WebhookProcessor::new(db, codec, producers);
        Self { db_path: url, flow, webhooks }
    }

    pub fn codec(&self) -> &TokenCodec {
        self.flow.codec()
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.webhooks.db_mut().close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        drop(self.flow);
        if let Err(e) = Sqlite::drop_database(&self.db_path).await {
            warn!("🚀️ Could not remove test database {}: {e}", self.db_path);
        }
    }
}

/// A notification as the gateway would send it for `tx`, signed with the shared secret.
pub fn gateway_payload(codec: &TokenCodec, tx: &PaymentTransaction, result: i32) -> String {
    gateway_payload_for_amount(codec, tx, result, &tx.amount)
}

/// As [`gateway_payload`], but the gateway claims (and signs) `amount` instead of the transaction amount.
pub fn gateway_payload_for_amount(codec: &TokenCodec, tx: &PaymentTransaction, result: i32, amount: &Amount) -> String {
    let token = codec.issue(amount, &tx.merchant_reference, None).expect("Error issuing gateway token");
    let success = matches!(result, 0 | 1);
    json!({
        "Result": result,
        "Status": if success { "Approved" } else { "Declined" },
        "MerchantReference": tx.merchant_reference.as_str(),
        "TransactionIndex": format!("TI-{:06}", tx.id),
        "ErrorCode": if success { None } else { Some("05") },
        "ErrorMessage": if success { None } else { Some("Do not honour") },
        "Amount": amount.to_canonical_string(),
        "CurrencyCode": tx.currency.as_str(),
        "PaymentMethod": "VISA",
        "Token": token,
    })
    .to_string()
}
