use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use super::{db_url, new_pool, notifications, transactions, SqliteDatabaseError};
use crate::{
    db::traits::{InsertTransactionResult, NotificationManagement, PaymentGatewayDatabase, TransactionManagement},
    db_types::{
        MerchantReference,
        NewPaymentNotification,
        NewPaymentTransaction,
        NotificationOutcome,
        PaymentNotification,
        PaymentTransaction,
        StatusChange,
    },
};

const DEFAULT_MAX_CONNECTIONS: u32 = 25;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({})", self.url)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), <Self as TransactionManagement>::Error> {
        self.pool.close().await;
        Ok(())
    }
}

impl TransactionManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_transaction(&self, tx: NewPaymentTransaction) -> Result<InsertTransactionResult, Self::Error> {
        let mut db_tx = self.pool.begin().await?;
        let result = transactions::idempotent_insert(tx, &mut db_tx).await?;
        db_tx.commit().await?;
        if let InsertTransactionResult::Inserted(tx) = &result {
            debug!("🗃️ Transaction [{}] for order {} saved with id {}", tx.merchant_reference, tx.order_id, tx.id);
        }
        Ok(result)
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<PaymentTransaction>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction(id, &mut conn).await
    }

    async fn fetch_transaction_by_reference(
        &self,
        reference: &MerchantReference,
    ) -> Result<Option<PaymentTransaction>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction_by_reference(reference, &mut conn).await
    }

    async fn update_transaction_status(
        &self,
        id: i64,
        change: &StatusChange,
    ) -> Result<Option<PaymentTransaction>, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let updated = transactions::update_status(id, change, &mut tx).await?;
        tx.commit().await?;
        if updated.is_some() {
            debug!("🗃️ Transaction #{id} is now {}", change.to);
        }
        Ok(updated)
    }
}

impl NotificationManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_notification(&self, notification: NewPaymentNotification) -> Result<i64, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let id = notifications::insert_notification(notification, &mut tx).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn fetch_notification(&self, id: i64) -> Result<Option<PaymentNotification>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        notifications::fetch_notification(id, &mut conn).await
    }

    async fn mark_notification_processed(
        &self,
        id: i64,
        transaction_id: Option<i64>,
        outcome: &NotificationOutcome,
    ) -> Result<bool, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let marked = notifications::mark_processed(id, transaction_id, outcome, &mut tx).await?;
        tx.commit().await?;
        if marked {
            trace!("🗃️ Notification #{id} marked as processed: {outcome}");
        } else {
            debug!("🗃️ Notification #{id} had already been processed. Outcome {outcome} was not recorded.");
        }
        Ok(marked)
    }

    async fn fetch_notifications_for_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Vec<PaymentNotification>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        notifications::fetch_for_transaction(transaction_id, &mut conn).await
    }

    async fn fetch_unprocessed_notifications(&self) -> Result<Vec<PaymentNotification>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        notifications::fetch_unprocessed(&mut conn).await
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `HPG_DATABASE_URL`.
    pub async fn new() -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn run_migrations(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}
