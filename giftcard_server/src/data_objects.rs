use gc_common::Sats;
use giftcard_engine::{
    db_types::{CardStatus, RedemptionMethod},
    traits::NodeInfo,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/cards/{code}/redeem`. The card code comes from the path.
#[derive(Debug, Clone, Deserialize)]
pub struct RedeemBody {
    pub method: RedemptionMethod,
    pub amount_sats: Sats,
    pub destination_address: Option<String>,
    pub lightning_invoice: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub code: String,
    pub btc_amount_sats: Sats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponse {
    pub code: String,
    pub status: CardStatus,
    pub spendable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreasuryResponse {
    pub available_sats: Sats,
    pub deposit_address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub database: bool,
    pub cache: bool,
    pub node: Option<NodeInfo>,
}
