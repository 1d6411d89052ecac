use gc_common::Sats;
use log::{info, warn};
use tonic_lnd::{LightningClient, RouterClient};

use super::Network;
use crate::traits::{
    ChannelBalance, Invoice, NodeClient, NodeError, NodeInfo, OnChainSend, OnChainTx, PaymentResult, WalletBalance,
};

/// Connection and behaviour settings for the node, populated from the `GCB_NODE_*` environment.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub grpc_host: String,
    pub grpc_port: u16,
    /// Path to the node's TLS certificate. The macaroon credential requires transport security
    /// and is never sent over a plaintext channel.
    pub tls_cert_path: String,
    /// Path to the macaroon attached (hex-encoded) to every RPC.
    pub macaroon_path: String,
    pub network: Network,
    pub payment_timeout_seconds: u64,
    pub max_payment_fee_sats: Sats,
}

/// The concrete LND-backed node client. Cheap to clone; the underlying gRPC channel is shared and
/// individual RPCs are independent.
#[derive(Clone)]
pub struct LndNode {
    pub(super) lightning: LightningClient,
    pub(super) router: RouterClient,
    pub(super) cfg: NodeConfig,
}

/// Dials the node over TLS with the macaroon credential, then performs a `GetInfo` handshake so a
/// misconfigured or unreachable node fails the process at startup rather than at first payment.
pub async fn connect(cfg: NodeConfig) -> Result<LndNode, NodeError> {
    let address = format!("https://{}:{}", cfg.grpc_host, cfg.grpc_port);
    let mut client = tonic_lnd::connect(address.clone(), &cfg.tls_cert_path, &cfg.macaroon_path)
        .await
        .map_err(|e| NodeError::Connect(format!("could not dial {address}: {e}")))?;
    let lightning = client.lightning().clone();
    let router = client.router().clone();
    let node = LndNode { lightning, router, cfg };

    let node_info = node
        .get_info()
        .await
        .map_err(|e| NodeError::Connect(format!("handshake failed (is the node running? wallet unlocked?): {e}")))?;
    info!(
        "⚡️ Node connected — alias={} pubkey={} height={} synced_chain={} synced_graph={}",
        node_info.alias, node_info.pubkey, node_info.block_height, node_info.synced_to_chain, node_info.synced_to_graph
    );
    if !node_info.synced_to_chain {
        warn!("⚡️ The node is not synced to chain. Payments may fail until sync completes.");
    }
    Ok(node)
}

impl LndNode {
    pub fn config(&self) -> &NodeConfig {
        &self.cfg
    }
}

impl NodeClient for LndNode {
    async fn decode_invoice(&self, bolt11: &str) -> Result<Invoice, NodeError> {
        self.decode_pay_req(bolt11).await
    }

    async fn pay_invoice(&self, bolt11: &str, max_fee_sats: Sats) -> Result<PaymentResult, NodeError> {
        self.send_payment(bolt11, max_fee_sats).await
    }

    async fn send_on_chain(&self, address: &str, amount: Sats, target_conf: i32) -> Result<OnChainSend, NodeError> {
        self.send_coins(address, amount, target_conf).await
    }

    async fn new_address(&self) -> Result<String, NodeError> {
        self.next_deposit_address().await
    }

    async fn wallet_balance(&self) -> Result<WalletBalance, NodeError> {
        self.get_wallet_balance().await
    }

    async fn channel_balance(&self) -> Result<ChannelBalance, NodeError> {
        self.get_channel_balance().await
    }

    async fn node_info(&self) -> Result<NodeInfo, NodeError> {
        self.get_info().await
    }

    async fn find_on_chain_tx(&self, tx_hash: &str) -> Result<Option<OnChainTx>, NodeError> {
        self.lookup_wallet_tx(tx_hash).await
    }

    async fn lookup_payment(&self, payment_hash: &str) -> Result<Option<PaymentResult>, NodeError> {
        self.track_payment(payment_hash).await
    }
}
