use gc_common::Sats;
use serde::Serialize;

/// A decoded BOLT11 invoice. `is_expired` is computed against the invoice timestamp + expiry at
/// decode time. Zero-amount invoices decode fine but are rejected by the payment path.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub destination: String,
    pub amount_sats: Sats,
    pub payment_hash: String,
    pub expiry_seconds: i64,
    pub description: String,
    pub is_expired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    InFlight,
}

/// The terminal (or last observed) state of a Lightning payment attempt.
#[derive(Debug, Clone)]
pub struct PaymentResult {
    pub payment_hash: String,
    /// Proof of settlement. Present exactly when the outcome is `Succeeded`.
    pub payment_preimage: Option<String>,
    pub fee_sats: Sats,
    pub outcome: PaymentOutcome,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OnChainSend {
    /// Hex-encoded transaction hash (64 chars).
    pub tx_hash: String,
}

/// An on-chain wallet transaction as seen by the node, used to track confirmations.
#[derive(Debug, Clone)]
pub struct OnChainTx {
    pub tx_hash: String,
    pub amount_sats: Sats,
    pub confirmations: i32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WalletBalance {
    pub confirmed_sats: Sats,
    pub unconfirmed_sats: Sats,
    pub total_sats: Sats,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelBalance {
    /// Our side of all channels: what we can send over Lightning right now.
    pub local_sats: Sats,
    /// Their side: receivable capacity.
    pub remote_sats: Sats,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub alias: String,
    pub pubkey: String,
    pub synced_to_chain: bool,
    pub synced_to_graph: bool,
    pub block_height: u32,
    pub num_channels: u32,
}
