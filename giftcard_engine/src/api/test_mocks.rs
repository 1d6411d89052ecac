//! Shared mockall doubles for the engine's capability traits.

use std::time::Duration;

use chrono::{DateTime, Utc};
use gc_common::Sats;
use mockall::mock;
use uuid::Uuid;

use crate::{
    db_types::{Card, CardCode, Transaction},
    traits::{
        BusError, CacheError, ChannelBalance, GiftCardDatabase, GiftCardDbError, Invoice, KeyValueCache, MessageBus,
        NodeClient, NodeError, NodeInfo, OnChainSend, OnChainTx, PaymentResult, PriceOracle, ProviderError,
        WalletBalance,
    },
};

mock! {
    pub Db {}
    impl GiftCardDatabase for Db {
        fn url(&self) -> &str;
        async fn insert_card(&self, card: Card) -> Result<Card, GiftCardDbError>;
        async fn fetch_card_by_code(&self, code: &CardCode) -> Result<Option<Card>, GiftCardDbError>;
        async fn fetch_card_by_id(&self, id: Uuid) -> Result<Option<Card>, GiftCardDbError>;
        async fn fetch_cards_for_user(&self, user_id: &str) -> Result<Vec<Card>, GiftCardDbError>;
        async fn begin_funding(&self, id: Uuid) -> Result<bool, GiftCardDbError>;
        async fn activate_card(&self, id: Uuid, amount: Sats, funded_at: DateTime<Utc>) -> Result<bool, GiftCardDbError>;
        async fn revert_to_created(&self, id: Uuid) -> Result<bool, GiftCardDbError>;
        async fn debit_card(&self, id: Uuid, amount: Sats) -> Result<Option<Card>, GiftCardDbError>;
        async fn total_reserved_balance(&self) -> Result<Sats, GiftCardDbError>;
        async fn insert_transaction(&self, tx: Transaction) -> Result<Transaction, GiftCardDbError>;
        async fn record_fund_transaction(&self, tx: Transaction) -> Result<bool, GiftCardDbError>;
        async fn fetch_transaction(&self, id: Uuid) -> Result<Option<Transaction>, GiftCardDbError>;
        async fn fetch_transaction_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Transaction>, GiftCardDbError>;
        async fn fetch_transactions_for_card(&self, card_id: Uuid) -> Result<Vec<Transaction>, GiftCardDbError>;
        async fn settle_lightning_redeem(&self, id: Uuid, preimage: &str) -> Result<bool, GiftCardDbError>;
        async fn mark_broadcast(&self, id: Uuid, tx_hash: &str) -> Result<bool, GiftCardDbError>;
        async fn mark_transaction_failed(&self, id: Uuid) -> Result<bool, GiftCardDbError>;
        async fn set_confirmations(&self, id: Uuid, confirmations: i32) -> Result<bool, GiftCardDbError>;
        async fn confirm_transaction(&self, id: Uuid, confirmations: i32) -> Result<bool, GiftCardDbError>;
        async fn fetch_stale_pending_lightning(&self, min_age: chrono::Duration) -> Result<Vec<Transaction>, GiftCardDbError>;
    }
}

mock! {
    pub Node {}
    impl NodeClient for Node {
        async fn decode_invoice(&self, bolt11: &str) -> Result<Invoice, NodeError>;
        async fn pay_invoice(&self, bolt11: &str, max_fee_sats: Sats) -> Result<PaymentResult, NodeError>;
        async fn send_on_chain(&self, address: &str, amount: Sats, target_conf: i32) -> Result<OnChainSend, NodeError>;
        async fn new_address(&self) -> Result<String, NodeError>;
        async fn wallet_balance(&self) -> Result<WalletBalance, NodeError>;
        async fn channel_balance(&self) -> Result<ChannelBalance, NodeError>;
        async fn node_info(&self) -> Result<NodeInfo, NodeError>;
        async fn find_on_chain_tx(&self, tx_hash: &str) -> Result<Option<OnChainTx>, NodeError>;
        async fn lookup_payment(&self, payment_hash: &str) -> Result<Option<PaymentResult>, NodeError>;
    }
}

mock! {
    pub Cache {}
    impl KeyValueCache for Cache {
        async fn get_value(&self, key: &str) -> Result<Option<String>, CacheError>;
        async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
        async fn delete_value(&self, key: &str) -> Result<u64, CacheError>;
        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError>;
        async fn increment(&self, key: &str) -> Result<i64, CacheError>;
        async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;
    }
}

mock! {
    pub Bus {}
    impl MessageBus for Bus {
        async fn declare(&self, stream: &str, group: &str) -> Result<(), BusError>;
        async fn publish(&self, stream: &str, payload: &[u8]) -> Result<String, BusError>;
    }
}

mock! {
    pub Oracle {}
    impl PriceOracle for Oracle {
        async fn btc_spot_price(&self, fiat_currency: &str) -> Result<f64, ProviderError>;
    }
}
