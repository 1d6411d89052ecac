use gc_common::Sats;
use log::info;
use tonic_lnd::lnrpc;

use super::{client::LndNode, DUST_LIMIT_SATS};
use crate::traits::{ChannelBalance, NodeError, NodeInfo, OnChainSend, OnChainTx, WalletBalance};

impl LndNode {
    /// Sends coins from the node's on-chain wallet. `target_conf` drives fee estimation:
    /// 2 ≈ next block, 6 ≈ one hour, 144 ≈ one day.
    pub(super) async fn send_coins(
        &self,
        address: &str,
        amount: Sats,
        target_conf: i32,
    ) -> Result<OnChainSend, NodeError> {
        if address.is_empty() {
            return Err(NodeError::OnChain("address must not be empty".to_string()));
        }
        if amount.value() < DUST_LIMIT_SATS {
            return Err(NodeError::BelowDustLimit(amount));
        }
        info!("⚡️ Sending {amount} on-chain to {address} (target_conf={target_conf})");
        let req = lnrpc::SendCoinsRequest {
            addr: address.to_string(),
            amount: amount.value(),
            target_conf,
            ..Default::default()
        };
        let resp = self
            .lightning
            .clone()
            .send_coins(req)
            .await
            .map_err(|e| NodeError::OnChain(e.to_string()))?
            .into_inner();
        Ok(OnChainSend { tx_hash: resp.txid })
    }

    /// A fresh native-SegWit deposit address from the node's HD wallet.
    pub(super) async fn next_deposit_address(&self) -> Result<String, NodeError> {
        let req = lnrpc::NewAddressRequest {
            r#type: lnrpc::AddressType::WitnessPubkeyHash as i32,
            ..Default::default()
        };
        let resp = self
            .lightning
            .clone()
            .new_address(req)
            .await
            .map_err(|e| NodeError::Rpc(e.to_string()))?
            .into_inner();
        Ok(resp.address)
    }

    pub(super) async fn get_wallet_balance(&self) -> Result<WalletBalance, NodeError> {
        let resp = self
            .lightning
            .clone()
            .wallet_balance(lnrpc::WalletBalanceRequest::default())
            .await
            .map_err(|e| NodeError::Rpc(e.to_string()))?
            .into_inner();
        Ok(WalletBalance {
            confirmed_sats: Sats::from(resp.confirmed_balance),
            unconfirmed_sats: Sats::from(resp.unconfirmed_balance),
            total_sats: Sats::from(resp.total_balance),
        })
    }

    /// The aggregate balance over all open channels. Absent balances map to zero.
    pub(super) async fn get_channel_balance(&self) -> Result<ChannelBalance, NodeError> {
        let resp = self
            .lightning
            .clone()
            .channel_balance(lnrpc::ChannelBalanceRequest::default())
            .await
            .map_err(|e| NodeError::Rpc(e.to_string()))?
            .into_inner();
        let local_sats = resp.local_balance.map(|a| a.sat as i64).unwrap_or_default();
        let remote_sats = resp.remote_balance.map(|a| a.sat as i64).unwrap_or_default();
        Ok(ChannelBalance { local_sats: Sats::from(local_sats), remote_sats: Sats::from(remote_sats) })
    }

    pub(super) async fn get_info(&self) -> Result<NodeInfo, NodeError> {
        let resp = self
            .lightning
            .clone()
            .get_info(lnrpc::GetInfoRequest {})
            .await
            .map_err(|e| NodeError::Rpc(e.to_string()))?
            .into_inner();
        Ok(NodeInfo {
            alias: resp.alias,
            pubkey: resp.identity_pubkey,
            synced_to_chain: resp.synced_to_chain,
            synced_to_graph: resp.synced_to_graph,
            block_height: resp.block_height,
            num_channels: resp.num_active_channels,
        })
    }

    /// Looks an on-chain wallet transaction up by hash, if the node has seen it.
    pub(super) async fn lookup_wallet_tx(&self, tx_hash: &str) -> Result<Option<OnChainTx>, NodeError> {
        let resp = self
            .lightning
            .clone()
            .get_transactions(lnrpc::GetTransactionsRequest::default())
            .await
            .map_err(|e| NodeError::Rpc(e.to_string()))?
            .into_inner();
        let found = resp.transactions.into_iter().find(|t| t.tx_hash == tx_hash).map(|t| OnChainTx {
            tx_hash: t.tx_hash,
            amount_sats: Sats::from(t.amount),
            confirmations: t.num_confirmations,
        });
        Ok(found)
    }
}
