use std::collections::HashMap;

use cucumber::World;
use hpg_payment_engine::{
    config::GatewayConfig,
    db_types::{NotificationOutcome, PaymentTransaction},
    events::EventProducers,
    helpers::TokenCodec,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    PaymentFlowApi,
    SqliteDatabase,
    WebhookProcessor,
};
use log::*;

pub const MERCHANT_ID: &str = "cucumber-merchant";
pub const APPLICATION_ID: &str = "cucumber-app";
const SECRET: &str = "cucumber-shared-secret";

#[derive(Default, Debug, World)]
pub struct PaymentWorld {
    pub system: Option<PaymentSystem>,
    /// Transactions by the order id they were created for
    pub transactions: HashMap<String, PaymentTransaction>,
    /// The last notification payload delivered for each order
    pub payloads: HashMap<String, String>,
    pub last_outcome: Option<NotificationOutcome>,
}

#[derive(Debug)]
pub struct PaymentSystem {
    pub db_path: String,
    pub flow: PaymentFlowApi<SqliteDatabase>,
    pub webhooks: WebhookProcessor<SqliteDatabase>,
}

impl PaymentWorld {
    pub fn system(&self) -> &PaymentSystem {
        self.system.as_ref().expect("Payment system not initialised")
    }

    pub fn transaction(&self, order_id: &str) -> PaymentTransaction {
        self.transactions.get(order_id).cloned().unwrap_or_else(|| panic!("No payment for order {order_id}"))
    }
}

impl PaymentSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        create_database(&url).await;
        run_migrations(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 2).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let config = GatewayConfig::new(MERCHANT_ID, APPLICATION_ID, SECRET)
            .with_redirect_urls("https://lodge.example/ok", "https://lodge.example/failed");
        let codec = TokenCodec::new(config);
        let flow = PaymentFlowApi::new(db.clone(), codec.clone(), EventProducers::default());
        let webhooks = WebhookProcessor::new(db, codec, EventProducers::default());
        Self { db_path: url, flow, webhooks }
    }

    pub fn codec(&self) -> &TokenCodec {
        self.flow.codec()
    }
}
