use chrono::{DateTime, Utc};
use gc_common::Sats;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db_types::{CardCode, CardStatus, RedemptionMethod, TransactionStatus};

/// Parameters for issuing a new card. The satoshi balance is *not* part of this request: it is
/// computed and set by the funding worker at the moment of pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCardRequest {
    /// Face value in fiat minor units ($100 = 10 000).
    pub fiat_amount_cents: i64,
    /// ISO-4217 currency code, e.g. "USD".
    pub fiat_currency: String,
    /// Total charged to the buyer, including fees.
    pub purchase_price_cents: i64,
    pub user_id: Option<String>,
    pub purchase_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCardResponse {
    pub card_id: Uuid,
    pub code: CardCode,
    pub btc_amount_sats: Sats,
    pub status: CardStatus,
    pub created_at: DateTime<Utc>,
}

/// Parameters for spending a card, fully or in part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
    pub method: RedemptionMethod,
    pub amount_sats: Sats,
    /// Required when `method` is `onchain`.
    pub destination_address: Option<String>,
    /// Required when `method` is `lightning`.
    pub lightning_invoice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub transaction_id: Uuid,
    pub method: RedemptionMethod,
    pub tx_hash: Option<String>,
    pub payment_hash: Option<String>,
    pub btc_amount_sats: Sats,
    /// The card's balance after this spend.
    pub remaining_balance: Sats,
    pub status: TransactionStatus,
}
