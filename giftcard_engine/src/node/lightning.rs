use std::time::Duration;

use chrono::Utc;
use gc_common::Sats;
use log::{debug, info};
use tonic_lnd::{lnrpc, routerrpc};

use super::client::LndNode;
use crate::traits::{Invoice, NodeError, PaymentOutcome, PaymentResult};

impl LndNode {
    /// Decodes a BOLT11 invoice without paying it. `is_expired` is computed here against the
    /// invoice timestamp plus its expiry window.
    pub(super) async fn decode_pay_req(&self, bolt11: &str) -> Result<Invoice, NodeError> {
        let req = lnrpc::PayReqString { pay_req: bolt11.to_string() };
        let resp = self
            .lightning
            .clone()
            .decode_pay_req(req)
            .await
            .map_err(|e| NodeError::Decode(e.to_string()))?
            .into_inner();
        let expires_at = resp.timestamp + resp.expiry;
        let is_expired = Utc::now().timestamp() > expires_at;
        Ok(Invoice {
            destination: resp.destination,
            amount_sats: Sats::from(resp.num_satoshis),
            payment_hash: resp.payment_hash,
            expiry_seconds: resp.expiry,
            description: resp.description,
            is_expired,
        })
    }

    /// Pays a BOLT11 invoice via the router's streaming payment RPC, reading status updates until
    /// a terminal state. The configured payment timeout bounds the whole attempt.
    pub(super) async fn send_payment(&self, bolt11: &str, max_fee_sats: Sats) -> Result<PaymentResult, NodeError> {
        let invoice = self.decode_pay_req(bolt11).await?;
        if invoice.is_expired {
            return Err(NodeError::Payment("invoice is expired".to_string()));
        }
        if invoice.amount_sats.is_zero() {
            return Err(NodeError::Payment("zero-amount invoices are not supported".to_string()));
        }

        let timeout_secs = self.cfg.payment_timeout_seconds;
        info!("⚡️ Paying invoice of {} to {}", invoice.amount_sats, invoice.destination);
        let req = routerrpc::SendPaymentRequest {
            payment_request: bolt11.to_string(),
            timeout_seconds: timeout_secs as i32,
            fee_limit_sat: max_fee_sats.value(),
            ..Default::default()
        };
        let mut stream = self
            .router
            .clone()
            .send_payment_v2(req)
            .await
            .map_err(|e| NodeError::Payment(format!("failed to initiate payment: {e}")))?
            .into_inner();

        let wait_for_terminal = async {
            loop {
                let update = stream
                    .message()
                    .await
                    .map_err(|e| NodeError::Payment(format!("payment stream error: {e}")))?;
                let Some(payment) = update else {
                    return Err(NodeError::Payment("payment stream ended without a terminal status".to_string()));
                };
                match payment.status() {
                    lnrpc::payment::PaymentStatus::Succeeded => {
                        return Ok(PaymentResult {
                            payment_hash: payment.payment_hash,
                            payment_preimage: Some(payment.payment_preimage),
                            fee_sats: Sats::from(payment.fee_sat),
                            outcome: PaymentOutcome::Succeeded,
                            failure_reason: None,
                        });
                    },
                    lnrpc::payment::PaymentStatus::Failed => {
                        let reason = format!("{:?}", payment.failure_reason());
                        return Ok(PaymentResult {
                            payment_hash: payment.payment_hash,
                            payment_preimage: None,
                            fee_sats: Sats::default(),
                            outcome: PaymentOutcome::Failed,
                            failure_reason: Some(reason),
                        });
                    },
                    // Still in flight. Keep reading the stream.
                    _ => {
                        debug!("⚡️ Payment {} still in flight", payment.payment_hash);
                    },
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(timeout_secs), wait_for_terminal)
            .await
            .map_err(|_| NodeError::PaymentTimeout(timeout_secs))?
    }

    /// Queries the router for the state of a past payment attempt. Returns `None` when the node
    /// has no record of the hash.
    pub(super) async fn track_payment(&self, payment_hash: &str) -> Result<Option<PaymentResult>, NodeError> {
        let hash = hex::decode(payment_hash).map_err(|e| NodeError::Rpc(format!("invalid payment hash: {e}")))?;
        let req = routerrpc::TrackPaymentRequest {
            payment_hash: hash,
            no_inflight_updates: true,
            ..Default::default()
        };
        let mut stream = match self.router.clone().track_payment_v2(req).await {
            Ok(resp) => resp.into_inner(),
            Err(e) => return not_found_as_none(e.to_string()).map(|_| None),
        };
        let update = match tokio::time::timeout(Duration::from_secs(10), stream.message()).await {
            Err(_) => return Err(NodeError::Rpc("track payment timed out".to_string())),
            Ok(Err(e)) => return not_found_as_none(e.to_string()).map(|_| None),
            Ok(Ok(update)) => update,
        };
        let Some(payment) = update else {
            return Ok(None);
        };
        let outcome = match payment.status() {
            lnrpc::payment::PaymentStatus::Succeeded => PaymentOutcome::Succeeded,
            lnrpc::payment::PaymentStatus::Failed => PaymentOutcome::Failed,
            _ => PaymentOutcome::InFlight,
        };
        let preimage =
            (outcome == PaymentOutcome::Succeeded && !payment.payment_preimage.is_empty())
                .then(|| payment.payment_preimage.clone());
        let failure_reason =
            (outcome == PaymentOutcome::Failed).then(|| format!("{:?}", payment.failure_reason()));
        Ok(Some(PaymentResult {
            payment_hash: payment.payment_hash,
            payment_preimage: preimage,
            fee_sats: Sats::from(payment.fee_sat),
            outcome,
            failure_reason,
        }))
    }
}

/// LND reports unknown payment hashes as a NotFound RPC error rather than an empty stream.
fn not_found_as_none(message: String) -> Result<(), NodeError> {
    if message.contains("NotFound") || message.contains("payment isn't initiated") {
        Ok(())
    } else {
        Err(NodeError::Rpc(message))
    }
}
