//! `PgDatabase` is the concrete Postgres implementation of the engine's storage backend.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use gc_common::Sats;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    db::{cards, transactions},
    new_pool, PoolSettings,
};
use crate::{
    db_types::{Card, CardCode, Transaction},
    traits::{GiftCardDatabase, GiftCardDbError},
};

#[derive(Clone)]
pub struct PgDatabase {
    url: String,
    pool: PgPool,
}

impl Debug for PgDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "PgDatabase ({:?})", self.pool)
    }
}

impl PgDatabase {
    pub async fn new_with_url(url: &str, settings: &PoolSettings) -> Result<Self, GiftCardDbError> {
        let pool = new_pool(url, settings).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn new_with_pool(url: &str, pool: PgPool) -> Self {
        Self { url: url.to_string(), pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Cheap connectivity probe for health checks.
    pub async fn ping(&self) -> Result<(), GiftCardDbError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

impl GiftCardDatabase for PgDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_card(&self, card: Card) -> Result<Card, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        cards::insert_card(card, &mut conn).await
    }

    async fn fetch_card_by_code(&self, code: &CardCode) -> Result<Option<Card>, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(cards::fetch_card_by_code(code, &mut conn).await?)
    }

    async fn fetch_card_by_id(&self, id: Uuid) -> Result<Option<Card>, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(cards::fetch_card_by_id(id, &mut conn).await?)
    }

    async fn fetch_cards_for_user(&self, user_id: &str) -> Result<Vec<Card>, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(cards::fetch_cards_for_user(user_id, &mut conn).await?)
    }

    async fn begin_funding(&self, id: Uuid) -> Result<bool, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(cards::begin_funding(id, &mut conn).await?)
    }

    async fn activate_card(&self, id: Uuid, amount: Sats, funded_at: DateTime<Utc>) -> Result<bool, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(cards::activate_card(id, amount, funded_at, &mut conn).await?)
    }

    async fn revert_to_created(&self, id: Uuid) -> Result<bool, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(cards::revert_to_created(id, &mut conn).await?)
    }

    async fn debit_card(&self, id: Uuid, amount: Sats) -> Result<Option<Card>, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(cards::debit_card(id, amount, Utc::now(), &mut conn).await?)
    }

    async fn total_reserved_balance(&self) -> Result<Sats, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(cards::total_reserved_balance(&mut conn).await?)
    }

    async fn insert_transaction(&self, tx: Transaction) -> Result<Transaction, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::insert_transaction(tx, &mut conn).await?)
    }

    async fn record_fund_transaction(&self, tx: Transaction) -> Result<bool, GiftCardDbError> {
        let mut db_tx = self.pool.begin().await?;
        if transactions::fund_transaction_exists(tx.card_id, &mut *db_tx).await? {
            return Ok(false);
        }
        transactions::insert_transaction(tx, &mut *db_tx).await?;
        db_tx.commit().await?;
        Ok(true)
    }

    async fn fetch_transaction(&self, id: Uuid) -> Result<Option<Transaction>, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction(id, &mut conn).await?)
    }

    async fn fetch_transaction_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Transaction>, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction_by_tx_hash(tx_hash, &mut conn).await?)
    }

    async fn fetch_transactions_for_card(&self, card_id: Uuid) -> Result<Vec<Transaction>, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transactions_for_card(card_id, &mut conn).await?)
    }

    async fn settle_lightning_redeem(&self, id: Uuid, preimage: &str) -> Result<bool, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::settle_lightning_redeem(id, preimage, Utc::now(), &mut conn).await?)
    }

    async fn mark_broadcast(&self, id: Uuid, tx_hash: &str) -> Result<bool, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::mark_broadcast(id, tx_hash, Utc::now(), &mut conn).await?)
    }

    async fn mark_transaction_failed(&self, id: Uuid) -> Result<bool, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::mark_transaction_failed(id, &mut conn).await?)
    }

    async fn set_confirmations(&self, id: Uuid, confirmations: i32) -> Result<bool, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::set_confirmations(id, confirmations, &mut conn).await?)
    }

    async fn confirm_transaction(&self, id: Uuid, confirmations: i32) -> Result<bool, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::confirm_transaction(id, confirmations, Utc::now(), &mut conn).await?)
    }

    async fn fetch_stale_pending_lightning(&self, min_age: Duration) -> Result<Vec<Transaction>, GiftCardDbError> {
        let mut conn = self.pool.acquire().await?;
        let cutoff = Utc::now() - min_age;
        Ok(transactions::fetch_stale_pending_lightning(cutoff, &mut conn).await?)
    }
}
