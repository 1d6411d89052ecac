use chrono::{DateTime, Duration, Utc};
use gc_common::Sats;
use thiserror::Error;
use uuid::Uuid;

use crate::db_types::{Card, CardCode, Transaction};

/// The storage behaviour the engine needs from a relational backend.
///
/// Every mutating method is a single guarded statement, so the store's row-level locking provides
/// the required isolation: state transitions carry their precondition in the `WHERE` clause and
/// report via their return value whether the transition actually happened. Callers treat a `false`
/// return as "another worker got there first", not as an error.
#[allow(async_fn_in_trait)]
pub trait GiftCardDatabase {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Inserts a brand-new card. Returns [`GiftCardDbError::CodeExists`] when the redemption code
    /// collides with an existing one, so the caller can regenerate and retry.
    async fn insert_card(&self, card: Card) -> Result<Card, GiftCardDbError>;

    async fn fetch_card_by_code(&self, code: &CardCode) -> Result<Option<Card>, GiftCardDbError>;

    async fn fetch_card_by_id(&self, id: Uuid) -> Result<Option<Card>, GiftCardDbError>;

    /// All cards belonging to a user, newest first.
    async fn fetch_cards_for_user(&self, user_id: &str) -> Result<Vec<Card>, GiftCardDbError>;

    /// The `created → funding` transition. Acts as the funding worker's lease on the card:
    /// returns `false` if the card was not in `created` state.
    async fn begin_funding(&self, id: Uuid) -> Result<bool, GiftCardDbError>;

    /// The `funding → active` transition: sets the satoshi balance and `funded_at`.
    /// Returns `false` if the card was not in `funding` state.
    async fn activate_card(&self, id: Uuid, amount: Sats, funded_at: DateTime<Utc>) -> Result<bool, GiftCardDbError>;

    /// The `funding → created` revert, used when treasury balance is insufficient so the funding
    /// message can be retried later.
    async fn revert_to_created(&self, id: Uuid) -> Result<bool, GiftCardDbError>;

    /// Atomically deducts `amount` from an `active` card's balance, flipping the card to
    /// `redeemed` (with `redeemed_at` stamped) when the balance reaches exactly zero.
    ///
    /// The statement carries the `status = 'active' AND btc_amount_sats >= amount` guard, so a
    /// concurrent spend that would overdraw the card returns `None` instead of going negative.
    async fn debit_card(&self, id: Uuid, amount: Sats) -> Result<Option<Card>, GiftCardDbError>;

    /// Sum of balances over cards in `active` or `funding` state: the treasury amount already
    /// spoken for.
    async fn total_reserved_balance(&self) -> Result<Sats, GiftCardDbError>;

    async fn insert_transaction(&self, tx: Transaction) -> Result<Transaction, GiftCardDbError>;

    /// Inserts the `fund` ledger entry for a card unless one already exists. Returns `false` when
    /// the entry was already present (a replayed funding message), which is not an error.
    async fn record_fund_transaction(&self, tx: Transaction) -> Result<bool, GiftCardDbError>;

    async fn fetch_transaction(&self, id: Uuid) -> Result<Option<Transaction>, GiftCardDbError>;

    async fn fetch_transaction_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Transaction>, GiftCardDbError>;

    /// All ledger entries for a card, oldest first.
    async fn fetch_transactions_for_card(&self, card_id: Uuid) -> Result<Vec<Transaction>, GiftCardDbError>;

    /// Settles a pending Lightning redeem: records the preimage (the proof of settlement) and
    /// flips the row to `confirmed`. No-op on rows that already reached a terminal status.
    async fn settle_lightning_redeem(&self, id: Uuid, preimage: &str) -> Result<bool, GiftCardDbError>;

    /// Records the broadcast of a pending on-chain redeem: sets the tx hash and `broadcast_at`.
    /// The row stays `pending` until the confirmation worker sees enough confirmations.
    async fn mark_broadcast(&self, id: Uuid, tx_hash: &str) -> Result<bool, GiftCardDbError>;

    /// Flips a pending transaction to `failed`. No-op on terminal rows.
    async fn mark_transaction_failed(&self, id: Uuid) -> Result<bool, GiftCardDbError>;

    /// Updates the confirmation counter on a pending on-chain transaction.
    async fn set_confirmations(&self, id: Uuid, confirmations: i32) -> Result<bool, GiftCardDbError>;

    /// Flips a pending transaction to `confirmed` with the final confirmation count.
    async fn confirm_transaction(&self, id: Uuid, confirmations: i32) -> Result<bool, GiftCardDbError>;

    /// Pending Lightning redeems older than `min_age`, for the startup reconciliation sweep.
    async fn fetch_stale_pending_lightning(&self, min_age: Duration) -> Result<Vec<Transaction>, GiftCardDbError>;
}

#[derive(Debug, Clone, Error)]
pub enum GiftCardDbError {
    #[error("A card with this code already exists")]
    CodeExists,
    #[error("We have an internal database engine error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for GiftCardDbError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.constraint() == Some("cards_code_key") {
                return GiftCardDbError::CodeExists;
            }
        }
        GiftCardDbError::Backend(e.to_string())
    }
}
