//! The funding worker: turns `FundCard` messages into active, spendable cards.
//!
//! Funding is pure accounting. The bitcoin was bought over-the-counter long before and sits in
//! the treasury; this worker prices the card's fiat face value at the current spot rate and
//! reserves that many satoshis against the pool. No transaction is broadcast and no keys exist.

use chrono::Utc;
use gc_common::{Sats, SATS_PER_BTC};
use log::{error, info, warn};

use crate::{
    api::{CardFlowError, TreasuryApi},
    bus::{messages::FundCard, DEAD_LETTER_STREAM},
    db_types::{Card, CardStatus, Transaction},
    traits::{GiftCardDatabase, KeyValueCache, MessageBus, NodeClient, PriceOracle},
};

pub struct FundingHandler<B, N, C, Q, O> {
    db: B,
    treasury: TreasuryApi<B, N, C>,
    oracle: O,
    bus: Q,
}

/// `floor((fiat_cents / 100) / price × 10^8)` — the card's face value at the quoted rate,
/// rounded down to whole satoshis.
pub fn compute_satoshis(fiat_amount_cents: i64, price: f64) -> Sats {
    let fiat = fiat_amount_cents as f64 / 100.0;
    let btc = fiat / price;
    Sats::from((btc * SATS_PER_BTC as f64).floor() as i64)
}

impl<B, N, C, Q, O> FundingHandler<B, N, C, Q, O>
where
    B: GiftCardDatabase,
    N: NodeClient,
    C: KeyValueCache,
    Q: MessageBus,
    O: PriceOracle,
{
    pub fn new(db: B, treasury: TreasuryApi<B, N, C>, oracle: O, bus: Q) -> Self {
        Self { db, treasury, oracle, bus }
    }

    /// Handles one funding message. `Ok` acknowledges; an error leaves the message pending.
    ///
    /// Idempotency: the `created → funding` transition is the lease. A card found in `funding`
    /// is resumed rather than skipped — on redelivery that state means the previous holder died
    /// mid-flight, and both the activation (status-guarded) and the fund ledger entry
    /// (one-per-card) are safe to replay.
    pub async fn process_message(&self, message_id: &str, data: &[u8]) -> Result<(), CardFlowError> {
        let msg = match FundCard::from_bytes(data) {
            Ok(m) => m,
            Err(e) => {
                warn!("⚙️ Dropping invalid funding message {message_id}: {e}");
                self.dead_letter(data).await;
                return Ok(());
            },
        };
        info!(
            "⚙️ Funding message {message_id}: card {} for {} {} cents",
            msg.card_id, msg.fiat_amount_cents, msg.fiat_currency
        );

        let card = self
            .db
            .fetch_card_by_id(msg.card_id)
            .await?
            .ok_or_else(|| CardFlowError::NotFound(format!("card {} does not exist", msg.card_id)))?;

        match card.status {
            CardStatus::Created => {
                if !self.db.begin_funding(card.id).await? {
                    info!("⚙️ Card {} was leased by another worker in the meantime, skipping", card.id);
                    return Ok(());
                }
            },
            CardStatus::Funding => {
                warn!("⚙️ Card {} found mid-funding; resuming a crashed worker's lease", card.id);
            },
            _ => {
                info!("⚙️ Card {} already processed (status {}), skipping", card.id, card.status);
                return Ok(());
            },
        }

        // Price failures are transient: the lease survives and the message is retried.
        let price = self.oracle.btc_spot_price(&msg.fiat_currency).await?;
        let satoshis = compute_satoshis(msg.fiat_amount_cents, price);
        if !satoshis.is_positive() {
            error!(
                "⚙️ Card {} computes to {satoshis} at {price} {}; dropping the message as unfundable",
                card.id, msg.fiat_currency
            );
            if let Err(e) = self.db.revert_to_created(card.id).await {
                error!("⚙️ Could not revert card {}: {e}", card.id);
            }
            self.dead_letter(data).await;
            return Ok(());
        }

        if !self.treasury.acquire_reservation_lock().await? {
            return Err(CardFlowError::Conflict("treasury lock is held by another worker".to_string()));
        }
        let result = self.reserve_and_activate(&card, satoshis).await;
        self.treasury.release_reservation_lock().await;
        result
    }

    /// Runs inside the reservation lock: recompute available (never from cache), check, activate.
    async fn reserve_and_activate(&self, card: &Card, satoshis: Sats) -> Result<(), CardFlowError> {
        let available = self.treasury.compute_available().await?;
        if available < satoshis {
            warn!(
                "⚙️ Treasury insufficient for card {}: need {satoshis}, available {available}. Reverting.",
                card.id
            );
            self.db.revert_to_created(card.id).await?;
            return Err(CardFlowError::PreconditionFailed(format!(
                "insufficient treasury balance: need {}, available {}",
                satoshis.value(),
                available.value()
            )));
        }

        if !self.db.activate_card(card.id, satoshis, Utc::now()).await? {
            // The card left `funding` under us; whoever moved it owns the outcome now.
            info!("⚙️ Card {} was no longer in funding state at activation, skipping", card.id);
            return Ok(());
        }
        info!("⚙️ Card {} funded: {satoshis} reserved against the treasury", card.id);

        let fund_tx = Transaction::new_fund(card.id, satoshis);
        match self.db.record_fund_transaction(fund_tx).await {
            Ok(true) => {},
            Ok(false) => info!("⚙️ Fund transaction for card {} already recorded (replay)", card.id),
            Err(e) => error!("⚙️ Could not record the fund transaction for card {}: {e}", card.id),
        }
        self.treasury.invalidate_cache().await;
        Ok(())
    }

    async fn dead_letter(&self, data: &[u8]) {
        if let Err(e) = self.bus.publish(DEAD_LETTER_STREAM, data).await {
            error!("⚙️ Could not publish to the dead-letter stream: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use mockall::Sequence;
    use uuid::Uuid;

    use super::*;
    use crate::{
        api::test_mocks::{MockBus, MockCache, MockDb, MockNode, MockOracle},
        db_types::CardCode,
        traits::{ChannelBalance, ProviderError, WalletBalance},
    };

    fn card_in(status: CardStatus) -> Card {
        Card {
            id: Uuid::new_v4(),
            user_id: None,
            purchase_email: "buyer@example.com".to_string(),
            owner_email: "buyer@example.com".to_string(),
            code: CardCode::from("GIFT-ABCD-EFGH-JKMN".to_string()),
            btc_amount_sats: Sats::from(0),
            fiat_amount_cents: 10_000,
            fiat_currency: "USD".to_string(),
            purchase_price_cents: 10_500,
            status,
            created_at: Utc::now(),
            funded_at: None,
            redeemed_at: None,
        }
    }

    fn message_for(card: &Card) -> Vec<u8> {
        FundCard { card_id: card.id, fiat_amount_cents: card.fiat_amount_cents, fiat_currency: card.fiat_currency.clone() }
            .to_bytes()
            .unwrap()
    }

    /// A treasury over its own mocks: `available` sats of headroom, lock free, invalidation ok.
    fn treasury_with_available(available: i64) -> TreasuryApi<MockDb, MockNode, MockCache> {
        let mut db = MockDb::new();
        db.expect_total_reserved_balance().returning(|| Ok(Sats::from(0)));
        let mut node = MockNode::new();
        node.expect_channel_balance()
            .returning(move || Ok(ChannelBalance { local_sats: Sats::from(available), remote_sats: Sats::from(0) }));
        node.expect_wallet_balance().returning(|| Ok(WalletBalance::default()));
        let mut cache = MockCache::new();
        cache.expect_set_if_absent().returning(|_, _, _| Ok(true));
        cache.expect_delete_value().returning(|_| Ok(1));
        TreasuryApi::new(db, node, cache)
    }

    fn usd_oracle(price: f64) -> MockOracle {
        let mut oracle = MockOracle::new();
        oracle.expect_btc_spot_price().withf(|c| c == "USD").returning(move |_| Ok(price));
        oracle
    }

    #[test]
    fn satoshi_computation_floors() {
        // $100 at 67 000 USD/BTC.
        assert_eq!(compute_satoshis(10_000, 67_000.0), Sats::from(149_253));
        assert_eq!(compute_satoshis(1, 100_000_000.0), Sats::from(0));
        assert_eq!(compute_satoshis(100, 50_000.0), Sats::from(2_000));
    }

    #[tokio::test]
    async fn malformed_messages_are_dead_lettered_and_acked() {
        let mut bus = MockBus::new();
        bus.expect_publish()
            .withf(|stream, _| stream == DEAD_LETTER_STREAM)
            .times(1)
            .returning(|_, _| Ok("1-0".to_string()));
        let handler =
            FundingHandler::new(MockDb::new(), treasury_with_available(0), MockOracle::new(), bus);
        assert!(handler.process_message("1-0", b"{\"not\": \"a fund card\"}").await.is_ok());
    }

    #[tokio::test]
    async fn created_card_is_priced_reserved_and_activated() {
        let card = card_in(CardStatus::Created);
        let card_id = card.id;
        let payload = message_for(&card);

        let mut db = MockDb::new();
        let mut seq = Sequence::new();
        {
            let card = card.clone();
            db.expect_fetch_card_by_id().returning(move |_| Ok(Some(card.clone())));
        }
        db.expect_begin_funding().times(1).in_sequence(&mut seq).returning(|_| Ok(true));
        db.expect_activate_card()
            .withf(move |id, amount, _| *id == card_id && *amount == Sats::from(149_253))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(true));
        db.expect_record_fund_transaction()
            .withf(move |tx| tx.card_id == card_id && tx.btc_amount_sats == Sats::from(149_253))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));

        let handler =
            FundingHandler::new(db, treasury_with_available(1_000_000), usd_oracle(67_000.0), MockBus::new());
        assert!(handler.process_message("1-0", &payload).await.is_ok());
    }

    #[tokio::test]
    async fn already_active_card_is_skipped_without_pricing() {
        let card = card_in(CardStatus::Active);
        let payload = message_for(&card);
        let mut db = MockDb::new();
        db.expect_fetch_card_by_id().returning(move |_| Ok(Some(card.clone())));
        // No oracle expectations: a price fetch would panic the test.
        let handler =
            FundingHandler::new(db, treasury_with_available(0), MockOracle::new(), MockBus::new());
        assert!(handler.process_message("1-0", &payload).await.is_ok());
    }

    #[tokio::test]
    async fn redeemed_card_is_skipped() {
        let card = card_in(CardStatus::Redeemed);
        let payload = message_for(&card);
        let mut db = MockDb::new();
        db.expect_fetch_card_by_id().returning(move |_| Ok(Some(card.clone())));
        let handler =
            FundingHandler::new(db, treasury_with_available(0), MockOracle::new(), MockBus::new());
        assert!(handler.process_message("1-0", &payload).await.is_ok());
    }

    #[tokio::test]
    async fn mid_funding_card_is_resumed_without_a_new_lease() {
        let card = card_in(CardStatus::Funding);
        let payload = message_for(&card);
        let mut db = MockDb::new();
        db.expect_fetch_card_by_id().returning(move |_| Ok(Some(card.clone())));
        // No begin_funding expectation: the lease is not re-taken.
        db.expect_activate_card().times(1).returning(|_, _, _| Ok(true));
        db.expect_record_fund_transaction().times(1).returning(|_| Ok(false));

        let handler =
            FundingHandler::new(db, treasury_with_available(1_000_000), usd_oracle(67_000.0), MockBus::new());
        assert!(handler.process_message("1-0", &payload).await.is_ok());
    }

    #[tokio::test]
    async fn insufficient_treasury_reverts_the_card_and_retries() {
        // 100k sats treasury, but $100 at 67k needs 149 253 sats.
        let card = card_in(CardStatus::Created);
        let payload = message_for(&card);
        let mut db = MockDb::new();
        db.expect_fetch_card_by_id().returning(move |_| Ok(Some(card.clone())));
        db.expect_begin_funding().returning(|_| Ok(true));
        db.expect_revert_to_created().times(1).returning(|_| Ok(true));
        db.expect_activate_card().times(0);

        let handler =
            FundingHandler::new(db, treasury_with_available(100_000), usd_oracle(67_000.0), MockBus::new());
        let err = handler.process_message("1-0", &payload).await.unwrap_err();
        assert!(matches!(err, CardFlowError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn held_treasury_lock_is_a_retryable_error() {
        let card = card_in(CardStatus::Created);
        let payload = message_for(&card);
        let mut db = MockDb::new();
        db.expect_fetch_card_by_id().returning(move |_| Ok(Some(card.clone())));
        db.expect_begin_funding().returning(|_| Ok(true));

        let mut cache = MockCache::new();
        cache.expect_set_if_absent().returning(|_, _, _| Ok(false));
        let treasury = TreasuryApi::new(MockDb::new(), MockNode::new(), cache);

        let handler = FundingHandler::new(db, treasury, usd_oracle(67_000.0), MockBus::new());
        let err = handler.process_message("1-0", &payload).await.unwrap_err();
        assert!(matches!(err, CardFlowError::Conflict(_)));
    }

    #[tokio::test]
    async fn price_failure_leaves_the_message_pending() {
        let card = card_in(CardStatus::Created);
        let payload = message_for(&card);
        let mut db = MockDb::new();
        db.expect_fetch_card_by_id().returning(move |_| Ok(Some(card.clone())));
        db.expect_begin_funding().returning(|_| Ok(true));
        let mut oracle = MockOracle::new();
        oracle.expect_btc_spot_price().returning(|_| Err(ProviderError::Status(502)));

        let handler =
            FundingHandler::new(db, treasury_with_available(1_000_000), oracle, MockBus::new());
        let err = handler.process_message("1-0", &payload).await.unwrap_err();
        assert!(matches!(err, CardFlowError::Transient(_)));
    }

    #[tokio::test]
    async fn zero_satoshi_results_are_permanent() {
        // One cent against an absurd price floors to zero sats.
        let mut card = card_in(CardStatus::Created);
        card.fiat_amount_cents = 1;
        let payload =
            FundCard { card_id: card.id, fiat_amount_cents: 1, fiat_currency: "USD".to_string() }.to_bytes().unwrap();
        let mut db = MockDb::new();
        db.expect_fetch_card_by_id().returning(move |_| Ok(Some(card.clone())));
        db.expect_begin_funding().returning(|_| Ok(true));
        db.expect_revert_to_created().times(1).returning(|_| Ok(true));
        let mut bus = MockBus::new();
        bus.expect_publish()
            .withf(|stream, _| stream == DEAD_LETTER_STREAM)
            .times(1)
            .returning(|_, _| Ok("1-0".to_string()));

        let handler =
            FundingHandler::new(db, treasury_with_available(1_000_000), usd_oracle(100_000_000.0), bus);
        assert!(handler.process_message("1-0", &payload).await.is_ok());
    }
}
