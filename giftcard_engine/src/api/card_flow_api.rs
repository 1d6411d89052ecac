//! `CardFlowApi` is the primary API for issuing and redeeming gift cards.
//!
//! Issuance persists the card and hands pricing off to the funding workers via the stream bus.
//! Redemption is the synchronous hard path: validate, single-flight per card, pay through the
//! node, keep the ledger honest, debit the balance. Transactions are pre-recorded as `pending`
//! before any node call, so a crash between payment and bookkeeping leaves a reconcilable trail
//! instead of silently paid-out bitcoin.

use std::time::Duration;

use chrono::Utc;
use gc_common::Sats;
use log::{error, info, warn};
use uuid::Uuid;

use super::{
    card_objects::{CreateCardRequest, CreateCardResponse, RedeemRequest, RedeemResponse},
    errors::CardFlowError,
    treasury_api::TreasuryApi,
};
use crate::{
    bus::{
        messages::{FundCard, MonitorTransaction},
        FUND_CARD_STREAM, MONITOR_TX_STREAM,
    },
    db_types::{Card, CardCode, CardStatus, RedemptionMethod, Transaction, TransactionStatus, TransactionType},
    helpers::{address, codes},
    node::Network,
    traits::{GiftCardDatabase, GiftCardDbError, KeyValueCache, MessageBus, NodeClient, PaymentOutcome},
};

const CARD_LOCK_PREFIX: &str = "card:lock:";
const CARD_LOCK_TTL: Duration = Duration::from_secs(10);

/// Fee-estimation target for on-chain redemptions, roughly one hour.
const DEFAULT_TARGET_CONF: i32 = 6;
/// Well above the dust limit. Mining fees make smaller sends uneconomical.
const MIN_ONCHAIN_REDEEM_SATS: i64 = 10_000;

/// Code collisions are vanishingly rare; this is a safety rail, not a statistical bound.
const CODE_RETRY_BUDGET: usize = 5;

pub struct CardFlowApi<B, N, C, Q> {
    db: B,
    node: N,
    cache: C,
    bus: Q,
    treasury: TreasuryApi<B, N, C>,
    network: Network,
    max_payment_fee: Sats,
}

impl<B, N, C, Q> CardFlowApi<B, N, C, Q>
where
    B: GiftCardDatabase,
    N: NodeClient,
    C: KeyValueCache,
    Q: MessageBus,
{
    pub fn new(
        db: B,
        node: N,
        cache: C,
        bus: Q,
        treasury: TreasuryApi<B, N, C>,
        network: Network,
        max_payment_fee: Sats,
    ) -> Self {
        Self { db, node, cache, bus, treasury, network, max_payment_fee }
    }

    pub fn treasury(&self) -> &TreasuryApi<B, N, C> {
        &self.treasury
    }

    //--------------------------------------    Issuance     -----------------------------------------------------------

    /// Issues a new card as a balance claim on the treasury. No wallet and no keys are created;
    /// the card is custodial. The satoshi balance stays zero until the funding worker prices the
    /// order and reserves treasury balance.
    pub async fn create_card(&self, req: CreateCardRequest) -> Result<CreateCardResponse, CardFlowError> {
        validate_create_request(&req)?;
        let card = self.insert_with_unique_code(&req).await?;

        // A publish failure does not roll the card back. It stays `created` and a sweeper can
        // re-issue the funding message.
        let msg =
            FundCard { card_id: card.id, fiat_amount_cents: card.fiat_amount_cents, fiat_currency: card.fiat_currency.clone() };
        match msg.to_bytes() {
            Ok(payload) => match self.bus.publish(FUND_CARD_STREAM, &payload).await {
                Ok(id) => info!("🎁️ Card {} issued; funding message {id} published", card.code),
                Err(e) => error!("🎁️ Could not publish the funding message for card {}: {e}", card.id),
            },
            Err(e) => error!("🎁️ Could not serialize the funding message for card {}: {e}", card.id),
        }

        Ok(CreateCardResponse {
            card_id: card.id,
            code: card.code,
            btc_amount_sats: card.btc_amount_sats,
            status: card.status,
            created_at: card.created_at,
        })
    }

    async fn insert_with_unique_code(&self, req: &CreateCardRequest) -> Result<Card, CardFlowError> {
        for attempt in 1..=CODE_RETRY_BUDGET {
            let code = CardCode::from(codes::generate_code());
            let card = Card {
                id: Uuid::new_v4(),
                user_id: req.user_id.clone(),
                purchase_email: req.purchase_email.clone(),
                owner_email: req.purchase_email.clone(),
                code,
                btc_amount_sats: Sats::default(),
                fiat_amount_cents: req.fiat_amount_cents,
                fiat_currency: req.fiat_currency.to_uppercase(),
                purchase_price_cents: req.purchase_price_cents,
                status: CardStatus::Created,
                created_at: Utc::now(),
                funded_at: None,
                redeemed_at: None,
            };
            match self.db.insert_card(card).await {
                Ok(card) => return Ok(card),
                Err(GiftCardDbError::CodeExists) => {
                    warn!("🎁️ Card code collision on attempt {attempt}, regenerating");
                },
                Err(e) => return Err(e.into()),
            }
        }
        Err(CardFlowError::Conflict(format!(
            "could not generate a unique card code after {CODE_RETRY_BUDGET} attempts"
        )))
    }

    //--------------------------------------      Reads      -----------------------------------------------------------

    pub async fn get_by_code(&self, code: &str) -> Result<Card, CardFlowError> {
        let code = CardCode::from(code.to_string());
        self.db
            .fetch_card_by_code(&code)
            .await?
            .ok_or_else(|| CardFlowError::NotFound(format!("No card with code {code}")))
    }

    /// The card's remaining balance. In the custodial model this is simply the stored field.
    pub async fn get_balance(&self, code: &str) -> Result<Sats, CardFlowError> {
        Ok(self.get_by_code(code).await?.btc_amount_sats)
    }

    /// Whether a code refers to a known card, and in which lifecycle state it is.
    pub async fn validate_code(&self, code: &str) -> Result<CardStatus, CardFlowError> {
        Ok(self.get_by_code(code).await?.status)
    }

    pub async fn cards_for_user(&self, user_id: &str) -> Result<Vec<Card>, CardFlowError> {
        Ok(self.db.fetch_cards_for_user(user_id).await?)
    }

    /// The card's ledger, oldest entry first.
    pub async fn card_transactions(&self, code: &str) -> Result<Vec<Transaction>, CardFlowError> {
        let card = self.get_by_code(code).await?;
        Ok(self.db.fetch_transactions_for_card(card.id).await?)
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Transaction, CardFlowError> {
        self.db
            .fetch_transaction(id)
            .await?
            .ok_or_else(|| CardFlowError::NotFound(format!("No transaction with id {id}")))
    }

    /// A fresh deposit address from the node's wallet, for topping up the treasury.
    pub async fn deposit_address(&self) -> Result<String, CardFlowError> {
        Ok(self.node.new_address().await?)
    }

    //--------------------------------------    Redemption   -----------------------------------------------------------

    /// Spends a card, fully or in part, via Lightning or on-chain.
    ///
    /// Concurrent redeems of the same card are single-flighted by a short-TTL lock on the card
    /// code; the atomic balance debit is the backstop should the lock ever be lost mid-flight.
    pub async fn redeem_card(&self, req: RedeemRequest) -> Result<RedeemResponse, CardFlowError> {
        validate_redeem_request(&req)?;

        let lock_key = format!("{CARD_LOCK_PREFIX}{}", req.code);
        let acquired = self.cache.set_if_absent(&lock_key, "locked", CARD_LOCK_TTL).await?;
        if !acquired {
            return Err(CardFlowError::Conflict("card is being processed by another request".to_string()));
        }
        let result = self.redeem_locked(&req).await;
        // Scoped release on every exit path.
        if let Err(e) = self.cache.delete_value(&lock_key).await {
            warn!("🎁️ Could not release card lock {lock_key}: {e}");
        }
        result
    }

    async fn redeem_locked(&self, req: &RedeemRequest) -> Result<RedeemResponse, CardFlowError> {
        let card = self.get_by_code(&req.code).await?;
        if card.status != CardStatus::Active {
            return Err(CardFlowError::PreconditionFailed(format!("card is not active (status: {})", card.status)));
        }
        if req.amount_sats > card.btc_amount_sats {
            return Err(CardFlowError::PreconditionFailed(format!(
                "insufficient funds on card: requested {}, balance {}",
                req.amount_sats, card.btc_amount_sats
            )));
        }

        match req.method {
            RedemptionMethod::Lightning => self.redeem_lightning(&card, req).await,
            RedemptionMethod::OnChain => self.redeem_onchain(&card, req).await,
        }
    }

    async fn redeem_lightning(&self, card: &Card, req: &RedeemRequest) -> Result<RedeemResponse, CardFlowError> {
        let bolt11 = req
            .lightning_invoice
            .as_deref()
            .ok_or_else(|| CardFlowError::InvalidArgument("a lightning invoice is required".to_string()))?;

        let invoice = self.node.decode_invoice(bolt11).await?;
        if invoice.amount_sats.is_zero() {
            return Err(CardFlowError::InvalidArgument("zero-amount invoices are not supported".to_string()));
        }
        if invoice.is_expired {
            return Err(CardFlowError::InvalidArgument("invoice has expired".to_string()));
        }
        if invoice.amount_sats != req.amount_sats {
            return Err(CardFlowError::InvalidArgument(format!(
                "invoice amount ({}) does not match requested amount ({})",
                invoice.amount_sats, req.amount_sats
            )));
        }

        // Pre-record before paying: if we crash after the node settles, the pending row plus the
        // payment hash is enough for reconciliation to recover the outcome.
        let pending = Transaction {
            id: Uuid::new_v4(),
            card_id: card.id,
            tx_type: TransactionType::Redeem,
            redemption_method: Some(RedemptionMethod::Lightning),
            tx_hash: None,
            payment_hash: Some(invoice.payment_hash.clone()),
            payment_preimage: None,
            lightning_invoice: Some(bolt11.to_string()),
            from_address: None,
            to_address: None,
            btc_amount_sats: req.amount_sats,
            status: TransactionStatus::Pending,
            confirmations: 0,
            created_at: Utc::now(),
            broadcast_at: None,
            confirmed_at: None,
        };
        let tx = self.db.insert_transaction(pending).await?;

        let payment = match self.node.pay_invoice(bolt11, self.max_payment_fee).await {
            Ok(p) => p,
            Err(e) => {
                self.mark_failed_logged(tx.id).await;
                return Err(e.into());
            },
        };
        if payment.outcome != PaymentOutcome::Succeeded {
            self.mark_failed_logged(tx.id).await;
            let reason = payment.failure_reason.unwrap_or_else(|| "payment did not succeed".to_string());
            return Err(CardFlowError::Node(crate::traits::NodeError::Payment(reason)));
        }
        let preimage = payment
            .payment_preimage
            .ok_or_else(|| CardFlowError::Internal("payment succeeded without a preimage".to_string()))?;
        if !self.db.settle_lightning_redeem(tx.id, &preimage).await? {
            error!("🎁️ Payment for transaction {} settled but the row could not be updated", tx.id);
        }

        let remaining = self.finish_redeem(card, req.amount_sats, RedemptionMethod::Lightning).await?;
        Ok(RedeemResponse {
            transaction_id: tx.id,
            method: RedemptionMethod::Lightning,
            tx_hash: None,
            payment_hash: Some(invoice.payment_hash),
            btc_amount_sats: req.amount_sats,
            remaining_balance: remaining,
            // Lightning settles instantly; the preimage is the proof.
            status: TransactionStatus::Confirmed,
        })
    }

    async fn redeem_onchain(&self, card: &Card, req: &RedeemRequest) -> Result<RedeemResponse, CardFlowError> {
        let destination = req
            .destination_address
            .as_deref()
            .ok_or_else(|| CardFlowError::InvalidArgument("a destination address is required".to_string()))?;
        address::validate_address(destination, self.network)?;
        if req.amount_sats.value() < MIN_ONCHAIN_REDEEM_SATS {
            return Err(CardFlowError::InvalidArgument(format!(
                "on-chain redemptions have a {MIN_ONCHAIN_REDEEM_SATS} sat minimum"
            )));
        }

        let pending = Transaction {
            id: Uuid::new_v4(),
            card_id: card.id,
            tx_type: TransactionType::Redeem,
            redemption_method: Some(RedemptionMethod::OnChain),
            tx_hash: None,
            payment_hash: None,
            payment_preimage: None,
            lightning_invoice: None,
            from_address: None,
            to_address: Some(destination.to_string()),
            btc_amount_sats: req.amount_sats,
            status: TransactionStatus::Pending,
            confirmations: 0,
            created_at: Utc::now(),
            broadcast_at: None,
            confirmed_at: None,
        };
        let tx = self.db.insert_transaction(pending).await?;

        let sent = match self.node.send_on_chain(destination, req.amount_sats, DEFAULT_TARGET_CONF).await {
            Ok(s) => s,
            Err(e) => {
                self.mark_failed_logged(tx.id).await;
                return Err(e.into());
            },
        };
        if !self.db.mark_broadcast(tx.id, &sent.tx_hash).await? {
            error!("🎁️ Broadcast {} succeeded but transaction {} could not be updated", sent.tx_hash, tx.id);
        }

        let remaining = self.finish_redeem(card, req.amount_sats, RedemptionMethod::OnChain).await?;
        self.publish_monitor_message(card.id, &sent.tx_hash, req.amount_sats, destination).await;

        Ok(RedeemResponse {
            transaction_id: tx.id,
            method: RedemptionMethod::OnChain,
            tx_hash: Some(sent.tx_hash),
            payment_hash: None,
            btc_amount_sats: req.amount_sats,
            remaining_balance: remaining,
            // Confirmed later by the confirmation worker.
            status: TransactionStatus::Pending,
        })
    }

    /// Debits the card and invalidates the treasury cache. Returns the remaining balance.
    async fn finish_redeem(
        &self,
        card: &Card,
        amount: Sats,
        method: RedemptionMethod,
    ) -> Result<Sats, CardFlowError> {
        let updated = self.db.debit_card(card.id, amount).await?.ok_or_else(|| {
            // The payment went out but the guarded debit did not apply. This needs eyes.
            error!("🎁️ Card {} was paid {amount} but the balance debit did not apply", card.id);
            CardFlowError::Internal("card balance debit failed after payment".to_string())
        })?;
        self.treasury.invalidate_cache().await;
        info!(
            "🎁️ Card {} redeemed {amount} via {method}; {} remaining (status: {})",
            card.code, updated.btc_amount_sats, updated.status
        );
        Ok(updated.btc_amount_sats)
    }

    async fn publish_monitor_message(&self, card_id: Uuid, tx_hash: &str, amount: Sats, destination: &str) {
        let msg = MonitorTransaction {
            card_id,
            tx_hash: tx_hash.to_string(),
            expected_amount_sats: amount.value(),
            destination_addr: destination.to_string(),
        };
        match msg.to_bytes() {
            Ok(payload) => match self.bus.publish(MONITOR_TX_STREAM, &payload).await {
                Ok(id) => info!("🎁️ Published monitor message {id} for tx {tx_hash}"),
                Err(e) => error!("🎁️ Could not publish the monitor message for tx {tx_hash}: {e}"),
            },
            Err(e) => error!("🎁️ Could not serialize the monitor message for tx {tx_hash}: {e}"),
        }
    }

    async fn mark_failed_logged(&self, tx_id: Uuid) {
        if let Err(e) = self.db.mark_transaction_failed(tx_id).await {
            error!("🎁️ Could not mark transaction {tx_id} as failed: {e}");
        }
    }

    //--------------------------------------  Reconciliation -----------------------------------------------------------

    /// Startup sweep over pending Lightning redeems older than `min_age`: asks the node for their
    /// settlement state and moves the rows to their terminal status. Balances are deliberately not
    /// touched here — a settled row discovered this way is flagged for operator review instead,
    /// because the crash window makes it ambiguous whether the debit already applied.
    pub async fn reconcile_pending_lightning(&self, min_age: chrono::Duration) -> Result<usize, CardFlowError> {
        let stale = self.db.fetch_stale_pending_lightning(min_age).await?;
        let mut resolved = 0;
        for tx in stale {
            let Some(hash) = tx.payment_hash.as_deref() else {
                continue;
            };
            match self.node.lookup_payment(hash).await {
                Ok(Some(p)) if p.outcome == PaymentOutcome::Succeeded => {
                    if let Some(preimage) = p.payment_preimage.as_deref() {
                        self.db.settle_lightning_redeem(tx.id, preimage).await?;
                        warn!(
                            "🎁️ Reconciled transaction {} as settled; card {} balance needs operator review",
                            tx.id, tx.card_id
                        );
                        resolved += 1;
                    }
                },
                Ok(Some(p)) if p.outcome == PaymentOutcome::Failed => {
                    self.db.mark_transaction_failed(tx.id).await?;
                    resolved += 1;
                },
                Ok(_) => {}, // in flight or unknown to the node: leave pending
                Err(e) => warn!("🎁️ Could not reconcile transaction {}: {e}", tx.id),
            }
        }
        Ok(resolved)
    }
}

fn validate_create_request(req: &CreateCardRequest) -> Result<(), CardFlowError> {
    if req.fiat_amount_cents <= 0 {
        return Err(CardFlowError::InvalidArgument("fiat_amount_cents must be positive".to_string()));
    }
    if req.fiat_currency.len() != 3 {
        return Err(CardFlowError::InvalidArgument("fiat_currency must be a 3-letter ISO-4217 code".to_string()));
    }
    if req.purchase_price_cents <= 0 {
        return Err(CardFlowError::InvalidArgument("purchase_price_cents must be positive".to_string()));
    }
    if req.purchase_email.is_empty() || !req.purchase_email.contains('@') {
        return Err(CardFlowError::InvalidArgument("a valid purchase email is required".to_string()));
    }
    Ok(())
}

fn validate_redeem_request(req: &RedeemRequest) -> Result<(), CardFlowError> {
    match req.method {
        RedemptionMethod::Lightning if req.lightning_invoice.is_none() => {
            return Err(CardFlowError::InvalidArgument("a lightning invoice is required".to_string()));
        },
        RedemptionMethod::OnChain if req.destination_address.is_none() => {
            return Err(CardFlowError::InvalidArgument("a destination address is required".to_string()));
        },
        _ => {},
    }
    if !req.amount_sats.is_positive() {
        return Err(CardFlowError::InvalidArgument("amount must be positive".to_string()));
    }
    Ok(())
}
