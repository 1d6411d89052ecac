use gc_common::Sats;
use thiserror::Error;

use crate::traits::data_objects::{
    ChannelBalance, Invoice, NodeInfo, OnChainSend, OnChainTx, PaymentResult, WalletBalance,
};

/// The operations the engine needs from the external Lightning + on-chain node.
///
/// The concrete LND adapter lives in [`node`](crate::node); tests substitute mock implementations.
/// The node owns all keys and does all transaction construction, signing and routing — the engine
/// never originates bitcoin bytes.
#[allow(async_fn_in_trait)]
pub trait NodeClient {
    /// Decodes a BOLT11 invoice without paying it.
    async fn decode_invoice(&self, bolt11: &str) -> Result<Invoice, NodeError>;

    /// Pays a BOLT11 invoice, reading streamed status updates until a terminal state or the
    /// configured payment timeout. Expired and zero-amount invoices are rejected before any
    /// payment attempt.
    async fn pay_invoice(&self, bolt11: &str, max_fee_sats: Sats) -> Result<PaymentResult, NodeError>;

    /// Sends on-chain coins. `target_conf` drives fee estimation (2 ≈ next block, 6 ≈ one hour,
    /// 144 ≈ one day). Amounts below the 546-sat dust limit are rejected.
    async fn send_on_chain(&self, address: &str, amount: Sats, target_conf: i32) -> Result<OnChainSend, NodeError>;

    /// A fresh native-SegWit (bech32) deposit address from the node's wallet.
    async fn new_address(&self) -> Result<String, NodeError>;

    async fn wallet_balance(&self) -> Result<WalletBalance, NodeError>;

    async fn channel_balance(&self) -> Result<ChannelBalance, NodeError>;

    /// Basic node information. Called once at startup as a fail-fast handshake and by the health
    /// probe thereafter.
    async fn node_info(&self) -> Result<NodeInfo, NodeError>;

    /// Looks up an on-chain wallet transaction by hash, if the node has seen it. Used by the
    /// confirmation worker to track confirmation counts.
    async fn find_on_chain_tx(&self, tx_hash: &str) -> Result<Option<OnChainTx>, NodeError>;

    /// Queries the router for the settlement state of a previously attempted payment. Returns
    /// `None` when the node has no record of the hash. Used by startup reconciliation.
    async fn lookup_payment(&self, payment_hash: &str) -> Result<Option<PaymentResult>, NodeError>;
}

#[derive(Debug, Clone, Error)]
pub enum NodeError {
    #[error("Could not connect to the node: {0}")]
    Connect(String),
    #[error("Could not decode invoice: {0}")]
    Decode(String),
    #[error("Lightning payment failed: {0}")]
    Payment(String),
    #[error("Payment timed out after {0} seconds")]
    PaymentTimeout(u64),
    #[error("On-chain send failed: {0}")]
    OnChain(String),
    #[error("Amount {0} is below the dust limit (546 sats)")]
    BelowDustLimit(Sats),
    #[error("Node RPC error: {0}")]
    Rpc(String),
}
