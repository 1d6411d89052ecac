//! The treasury accounting engine.
//!
//! The treasury is the pool of bitcoin the platform holds in Lightning channels and the on-chain
//! hot wallet. Cards are claims against it; the *available* balance is what is left after those
//! claims, and it must never go negative.

use std::time::Duration;

use gc_common::Sats;
use log::{error, warn};

use super::errors::CardFlowError;
use crate::traits::{GiftCardDatabase, KeyValueCache, NodeClient};

/// Cached `available` value. Absorbs bursts of balance reads without hammering the node
/// (a node round trip costs 50–100 ms).
pub const TREASURY_CACHE_KEY: &str = "treasury:available_sats";
pub const TREASURY_CACHE_TTL: Duration = Duration::from_secs(10);
/// The global reservation lock serialising the read-check-reserve window in the funding workers.
pub const TREASURY_LOCK_KEY: &str = "treasury:lock";
pub const TREASURY_LOCK_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TreasuryApi<B, N, C> {
    db: B,
    node: N,
    cache: C,
}

impl<B, N, C> TreasuryApi<B, N, C>
where
    B: GiftCardDatabase,
    N: NodeClient,
    C: KeyValueCache,
{
    pub fn new(db: B, node: N, cache: C) -> Self {
        Self { db, node, cache }
    }

    /// The available treasury balance, served from the short-TTL cache when possible.
    ///
    /// `available = (channel local + wallet confirmed) − Σ balances of active/funding cards`.
    pub async fn available_balance(&self) -> Result<Sats, CardFlowError> {
        if let Ok(Some(cached)) = self.cache.get_value(TREASURY_CACHE_KEY).await {
            match cached.parse::<i64>() {
                Ok(value) => return Ok(Sats::from(value)),
                // An unparseable cache entry falls through to recomputation.
                Err(_) => warn!("🏦️ Unparseable treasury cache entry {cached:?}, recomputing"),
            }
        }
        let available = self.compute_available().await?;
        if let Err(e) =
            self.cache.set_value(TREASURY_CACHE_KEY, &available.value().to_string(), TREASURY_CACHE_TTL).await
        {
            // Best effort. The cache is an optimisation, not a source of truth.
            warn!("🏦️ Could not cache treasury balance: {e}");
        }
        Ok(available)
    }

    /// Recomputes the available balance from the node and the store, bypassing the cache.
    /// Funding workers call this inside the reservation lock so they never reserve against a
    /// stale figure.
    pub async fn compute_available(&self) -> Result<Sats, CardFlowError> {
        let channel = self.node.channel_balance().await?;
        let wallet = self.node.wallet_balance().await?;
        let total = channel.local_sats + wallet.confirmed_sats;
        let reserved = self.db.total_reserved_balance().await?;
        let available = total - reserved;
        if available.value() < 0 {
            // Unreachable while the invariants hold. Reaching it means the books are corrupt,
            // and that has to surface immediately.
            error!(
                "🏦️ TREASURY OVERSOLD: total={} reserved={} available={}",
                total.value(),
                reserved.value(),
                available.value()
            );
            return Err(CardFlowError::Internal(format!(
                "treasury oversold: available balance is {} sats",
                available.value()
            )));
        }
        Ok(available)
    }

    /// Tries to take the global reservation lock. Returns `false` when another worker holds it;
    /// the caller should report a transient error so its message is retried.
    pub async fn acquire_reservation_lock(&self) -> Result<bool, CardFlowError> {
        let acquired = self.cache.set_if_absent(TREASURY_LOCK_KEY, "locked", TREASURY_LOCK_TTL).await?;
        Ok(acquired)
    }

    pub async fn release_reservation_lock(&self) {
        if let Err(e) = self.cache.delete_value(TREASURY_LOCK_KEY).await {
            warn!("🏦️ Could not release the treasury lock: {e}");
        }
    }

    /// Drops the cached available balance. Called after any operation that moves treasury
    /// balance (successful funding, successful redemption).
    pub async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_value(TREASURY_CACHE_KEY).await {
            warn!("🏦️ Could not invalidate the treasury cache: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use gc_common::Sats;

    use super::*;
    use crate::{
        api::test_mocks::{MockCache, MockDb, MockNode},
        traits::{CacheError, ChannelBalance, WalletBalance},
    };

    fn node_with_balances(local: i64, confirmed: i64) -> MockNode {
        let mut node = MockNode::new();
        node.expect_channel_balance()
            .returning(move || Ok(ChannelBalance { local_sats: Sats::from(local), remote_sats: Sats::from(0) }));
        node.expect_wallet_balance().returning(move || {
            Ok(WalletBalance {
                confirmed_sats: Sats::from(confirmed),
                unconfirmed_sats: Sats::from(0),
                total_sats: Sats::from(confirmed),
            })
        });
        node
    }

    #[tokio::test]
    async fn available_is_treasury_minus_reserved() {
        let mut db = MockDb::new();
        db.expect_total_reserved_balance().returning(|| Ok(Sats::from(300_000)));
        let node = node_with_balances(400_000, 200_000);
        let mut cache = MockCache::new();
        cache.expect_get_value().returning(|_| Ok(None));
        cache.expect_set_value().returning(|_, _, _| Ok(()));

        let treasury = TreasuryApi::new(db, node, cache);
        assert_eq!(treasury.available_balance().await.unwrap(), Sats::from(300_000));
    }

    #[tokio::test]
    async fn cache_hit_skips_the_node() {
        let db = MockDb::new();
        let mut node = MockNode::new();
        node.expect_channel_balance().times(0);
        node.expect_wallet_balance().times(0);
        let mut cache = MockCache::new();
        cache.expect_get_value().returning(|_| Ok(Some("123456".to_string())));

        let treasury = TreasuryApi::new(db, node, cache);
        assert_eq!(treasury.available_balance().await.unwrap(), Sats::from(123_456));
    }

    #[tokio::test]
    async fn unparseable_cache_value_falls_through_to_recompute() {
        let mut db = MockDb::new();
        db.expect_total_reserved_balance().returning(|| Ok(Sats::from(0)));
        let node = node_with_balances(50_000, 0);
        let mut cache = MockCache::new();
        cache.expect_get_value().returning(|_| Ok(Some("not-a-number".to_string())));
        cache.expect_set_value().returning(|_, _, _| Ok(()));

        let treasury = TreasuryApi::new(db, node, cache);
        assert_eq!(treasury.available_balance().await.unwrap(), Sats::from(50_000));
    }

    #[tokio::test]
    async fn cache_write_failure_is_not_fatal() {
        let mut db = MockDb::new();
        db.expect_total_reserved_balance().returning(|| Ok(Sats::from(0)));
        let node = node_with_balances(10_000, 5_000);
        let mut cache = MockCache::new();
        cache.expect_get_value().returning(|_| Ok(None));
        cache.expect_set_value().returning(|_, _, _| Err(CacheError::Transport("down".to_string())));

        let treasury = TreasuryApi::new(db, node, cache);
        assert_eq!(treasury.available_balance().await.unwrap(), Sats::from(15_000));
    }

    #[tokio::test]
    async fn oversold_treasury_is_an_internal_error() {
        let mut db = MockDb::new();
        db.expect_total_reserved_balance().returning(|| Ok(Sats::from(200_000)));
        let node = node_with_balances(100_000, 50_000);
        let cache = MockCache::new();

        let treasury = TreasuryApi::new(db, node, cache);
        assert!(matches!(treasury.compute_available().await, Err(CardFlowError::Internal(_))));
    }

    #[tokio::test]
    async fn reservation_lock_reports_contention() {
        let db = MockDb::new();
        let node = MockNode::new();
        let mut cache = MockCache::new();
        cache.expect_set_if_absent().returning(|_, _, _| Ok(false));

        let treasury = TreasuryApi::new(db, node, cache);
        assert!(!treasury.acquire_reservation_lock().await.unwrap());
    }
}
