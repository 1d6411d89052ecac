//! The confirmation worker: tracks on-chain redemptions until they confirm.
//!
//! There is no separate poll timer. A transaction that has not reached its confirmation target
//! simply leaves its message pending, and the bus's reclaim cycle re-delivers it a few minutes
//! later — the ack/reclaim discipline doubles as the polling cadence.

use chrono::{Duration, Utc};
use log::{error, info, warn};

use crate::{
    api::CardFlowError,
    bus::{messages::MonitorTransaction, DEAD_LETTER_STREAM},
    db_types::Transaction,
    traits::{GiftCardDatabase, MessageBus, NodeClient},
};

pub const DEFAULT_CONFIRMATION_TARGET: i32 = 1;
/// A broadcast transaction unseen or unconfirmed for this long is considered lost.
pub const DEFAULT_GIVE_UP_HOURS: i64 = 48;

pub struct ConfirmationHandler<B, N, Q> {
    db: B,
    node: N,
    bus: Q,
    confirmation_target: i32,
    give_up_after: Duration,
}

impl<B, N, Q> ConfirmationHandler<B, N, Q>
where
    B: GiftCardDatabase,
    N: NodeClient,
    Q: MessageBus,
{
    pub fn new(db: B, node: N, bus: Q, confirmation_target: i32) -> Self {
        Self { db, node, bus, confirmation_target, give_up_after: Duration::hours(DEFAULT_GIVE_UP_HOURS) }
    }

    pub fn with_give_up_after(mut self, give_up_after: Duration) -> Self {
        self.give_up_after = give_up_after;
        self
    }

    /// Handles one monitor message. `Ok` acknowledges; an error leaves it pending for the next
    /// reclaim pass.
    pub async fn process_message(&self, message_id: &str, data: &[u8]) -> Result<(), CardFlowError> {
        let msg = match MonitorTransaction::from_bytes(data) {
            Ok(m) => m,
            Err(e) => {
                warn!("🕰️ Dropping invalid monitor message {message_id}: {e}");
                self.dead_letter(data).await;
                return Ok(());
            },
        };

        let Some(tx) = self.db.fetch_transaction_by_tx_hash(&msg.tx_hash).await? else {
            warn!("🕰️ No transaction row for {}; nothing to monitor", msg.tx_hash);
            return Ok(());
        };
        if tx.status.is_terminal() {
            // A replay after the row already settled. Routine under at-least-once delivery.
            return Ok(());
        }

        match self.node.find_on_chain_tx(&msg.tx_hash).await? {
            Some(chain_tx) if chain_tx.confirmations >= self.confirmation_target => {
                self.db.confirm_transaction(tx.id, chain_tx.confirmations).await?;
                info!("🕰️ Transaction {} confirmed at {} confirmations", msg.tx_hash, chain_tx.confirmations);
                Ok(())
            },
            Some(chain_tx) => {
                if chain_tx.confirmations > tx.confirmations {
                    self.db.set_confirmations(tx.id, chain_tx.confirmations).await?;
                }
                if self.past_deadline(&tx) {
                    return self.give_up(&tx, &msg.tx_hash).await;
                }
                Err(CardFlowError::Transient(format!(
                    "transaction {} at {}/{} confirmations",
                    msg.tx_hash, chain_tx.confirmations, self.confirmation_target
                )))
            },
            None => {
                if self.past_deadline(&tx) {
                    return self.give_up(&tx, &msg.tx_hash).await;
                }
                Err(CardFlowError::Transient(format!("transaction {} not yet seen by the node", msg.tx_hash)))
            },
        }
    }

    fn past_deadline(&self, tx: &Transaction) -> bool {
        Utc::now() - tx.created_at > self.give_up_after
    }

    async fn give_up(&self, tx: &Transaction, tx_hash: &str) -> Result<(), CardFlowError> {
        warn!(
            "🕰️ Giving up on transaction {tx_hash} after {}h without confirmation; marking failed",
            self.give_up_after.num_hours()
        );
        self.db.mark_transaction_failed(tx.id).await?;
        Ok(())
    }

    async fn dead_letter(&self, data: &[u8]) {
        if let Err(e) = self.bus.publish(DEAD_LETTER_STREAM, data).await {
            error!("🕰️ Could not publish to the dead-letter stream: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use gc_common::Sats;
    use uuid::Uuid;

    use super::*;
    use crate::{
        api::test_mocks::{MockBus, MockDb, MockNode},
        db_types::{RedemptionMethod, TransactionStatus, TransactionType},
        traits::OnChainTx,
    };

    const TX_HASH: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    fn pending_redeem(age_hours: i64) -> Transaction {
        let created_at = Utc::now() - Duration::hours(age_hours);
        Transaction {
            id: Uuid::new_v4(),
            card_id: Uuid::new_v4(),
            tx_type: TransactionType::Redeem,
            redemption_method: Some(RedemptionMethod::OnChain),
            tx_hash: Some(TX_HASH.to_string()),
            payment_hash: None,
            payment_preimage: None,
            lightning_invoice: None,
            from_address: None,
            to_address: Some("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx".to_string()),
            btc_amount_sats: Sats::from(50_000),
            status: TransactionStatus::Pending,
            confirmations: 0,
            created_at,
            broadcast_at: Some(created_at),
            confirmed_at: None,
        }
    }

    fn message() -> Vec<u8> {
        MonitorTransaction {
            card_id: Uuid::new_v4(),
            tx_hash: TX_HASH.to_string(),
            expected_amount_sats: 50_000,
            destination_addr: "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx".to_string(),
        }
        .to_bytes()
        .unwrap()
    }

    fn chain_tx(confirmations: i32) -> OnChainTx {
        OnChainTx { tx_hash: TX_HASH.to_string(), amount_sats: Sats::from(50_000), confirmations }
    }

    #[tokio::test]
    async fn malformed_messages_are_dead_lettered_and_acked() {
        let mut bus = MockBus::new();
        bus.expect_publish()
            .withf(|stream, _| stream == DEAD_LETTER_STREAM)
            .times(1)
            .returning(|_, _| Ok("1-0".to_string()));
        let handler = ConfirmationHandler::new(MockDb::new(), MockNode::new(), bus, 1);
        assert!(handler.process_message("1-0", b"garbage").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_transaction_rows_are_acked() {
        let mut db = MockDb::new();
        db.expect_fetch_transaction_by_tx_hash().returning(|_| Ok(None));
        let handler = ConfirmationHandler::new(db, MockNode::new(), MockBus::new(), 1);
        assert!(handler.process_message("1-0", &message()).await.is_ok());
    }

    #[tokio::test]
    async fn terminal_rows_are_acked_without_a_node_call() {
        let mut tx = pending_redeem(0);
        tx.status = TransactionStatus::Confirmed;
        let mut db = MockDb::new();
        db.expect_fetch_transaction_by_tx_hash().returning(move |_| Ok(Some(tx.clone())));
        // No node expectations: a lookup would panic the test.
        let handler = ConfirmationHandler::new(db, MockNode::new(), MockBus::new(), 1);
        assert!(handler.process_message("1-0", &message()).await.is_ok());
    }

    #[tokio::test]
    async fn reaching_the_target_confirms_the_row() {
        let tx = pending_redeem(0);
        let tx_id = tx.id;
        let mut db = MockDb::new();
        db.expect_fetch_transaction_by_tx_hash().returning(move |_| Ok(Some(tx.clone())));
        db.expect_confirm_transaction()
            .withf(move |id, confs| *id == tx_id && *confs == 3)
            .times(1)
            .returning(|_, _| Ok(true));
        let mut node = MockNode::new();
        node.expect_find_on_chain_tx().returning(|_| Ok(Some(chain_tx(3))));

        let handler = ConfirmationHandler::new(db, node, MockBus::new(), 1);
        assert!(handler.process_message("1-0", &message()).await.is_ok());
    }

    #[tokio::test]
    async fn below_target_updates_the_counter_and_retries() {
        let tx = pending_redeem(0);
        let mut db = MockDb::new();
        db.expect_fetch_transaction_by_tx_hash().returning(move |_| Ok(Some(tx.clone())));
        db.expect_set_confirmations().withf(|_, confs| *confs == 2).times(1).returning(|_, _| Ok(true));
        let mut node = MockNode::new();
        node.expect_find_on_chain_tx().returning(|_| Ok(Some(chain_tx(2))));

        let handler = ConfirmationHandler::new(db, node, MockBus::new(), 6);
        let err = handler.process_message("1-0", &message()).await.unwrap_err();
        assert!(matches!(err, CardFlowError::Transient(_)));
    }

    #[tokio::test]
    async fn unseen_fresh_transactions_retry() {
        let tx = pending_redeem(0);
        let mut db = MockDb::new();
        db.expect_fetch_transaction_by_tx_hash().returning(move |_| Ok(Some(tx.clone())));
        let mut node = MockNode::new();
        node.expect_find_on_chain_tx().returning(|_| Ok(None));

        let handler = ConfirmationHandler::new(db, node, MockBus::new(), 1);
        assert!(handler.process_message("1-0", &message()).await.is_err());
    }

    #[tokio::test]
    async fn unseen_stale_transactions_are_marked_failed() {
        let tx = pending_redeem(72);
        let tx_id = tx.id;
        let mut db = MockDb::new();
        db.expect_fetch_transaction_by_tx_hash().returning(move |_| Ok(Some(tx.clone())));
        db.expect_mark_transaction_failed().withf(move |id| *id == tx_id).times(1).returning(|_| Ok(true));
        let mut node = MockNode::new();
        node.expect_find_on_chain_tx().returning(|_| Ok(None));

        let handler = ConfirmationHandler::new(db, node, MockBus::new(), 1);
        assert!(handler.process_message("1-0", &message()).await.is_ok());
    }
}
