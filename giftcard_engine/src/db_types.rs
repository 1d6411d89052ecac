use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use gc_common::Sats;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

//--------------------------------------     CardStatus      ---------------------------------------------------------
/// The lifecycle state of a gift card.
///
/// `Created` and `Funding` are transient; `Redeemed` and `Expired` are terminal. Only `Active`
/// cards are spendable, and only `Active` and `Funding` cards count towards reserved treasury.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(type_name = "card_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    /// The card exists, but no balance has been reserved for it yet.
    Created,
    /// A funding worker holds the lease on this card and is reserving treasury balance.
    Funding,
    /// The card carries a positive balance and can be spent.
    Active,
    /// The balance has been spent down to zero.
    Redeemed,
    /// The card was never funded and has been swept. Unspendable.
    Expired,
}

impl Display for CardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardStatus::Created => write!(f, "created"),
            CardStatus::Funding => write!(f, "funding"),
            CardStatus::Active => write!(f, "active"),
            CardStatus::Redeemed => write!(f, "redeemed"),
            CardStatus::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for CardStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "funding" => Ok(Self::Funding),
            "active" => Ok(Self::Active),
            "redeemed" => Ok(Self::Redeemed),
            "expired" => Ok(Self::Expired),
            s => Err(ConversionError(format!("Invalid card status: {s}"))),
        }
    }
}

//--------------------------------------  TransactionType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(type_name = "transaction_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Treasury balance reserved for a card. Pure accounting; no bitcoin moves.
    Fund,
    /// A card spend, via Lightning or on-chain.
    Redeem,
    /// A treasury-level payment not tied to a redemption.
    Payment,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Fund => write!(f, "fund"),
            TransactionType::Redeem => write!(f, "redeem"),
            TransactionType::Payment => write!(f, "payment"),
        }
    }
}

//-------------------------------------- TransactionStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    /// Terminal transactions are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Failed)
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Confirmed => write!(f, "confirmed"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

//-------------------------------------- RedemptionMethod    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(type_name = "redemption_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RedemptionMethod {
    Lightning,
    OnChain,
}

impl Display for RedemptionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedemptionMethod::Lightning => write!(f, "lightning"),
            RedemptionMethod::OnChain => write!(f, "onchain"),
        }
    }
}

impl FromStr for RedemptionMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lightning" => Ok(Self::Lightning),
            "onchain" => Ok(Self::OnChain),
            s => Err(ConversionError(format!("Invalid redemption method: {s}"))),
        }
    }
}

//--------------------------------------      CardCode       ---------------------------------------------------------
/// The human-presentable redemption code, `GIFT-XXXX-YYYY-ZZZZ`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct CardCode(pub String);

impl FromStr for CardCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for CardCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for CardCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl CardCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        Card         ---------------------------------------------------------
/// A custodial balance claim against the pooled treasury. The platform holds the keys; the card
/// holds a satoshi balance that is reserved at funding and spent down at redemption.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Card {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub purchase_email: String,
    pub owner_email: String,
    pub code: CardCode,
    pub btc_amount_sats: Sats,
    pub fiat_amount_cents: i64,
    pub fiat_currency: String,
    pub purchase_price_cents: i64,
    pub status: CardStatus,
    pub created_at: DateTime<Utc>,
    pub funded_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl Card {
    /// Cards contribute to reserved treasury while they hold, or are about to hold, a balance.
    pub fn is_reserving_treasury(&self) -> bool {
        matches!(self.status, CardStatus::Active | CardStatus::Funding)
    }
}

//--------------------------------------    Transaction      ---------------------------------------------------------
/// An append-only ledger entry for a bitcoin movement (or, for `Fund`, a pure accounting entry)
/// tied to a card. Rows are never mutated once they reach a terminal status.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub card_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub redemption_method: Option<RedemptionMethod>,
    pub tx_hash: Option<String>,
    pub payment_hash: Option<String>,
    pub payment_preimage: Option<String>,
    pub lightning_invoice: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub btc_amount_sats: Sats,
    pub status: TransactionStatus,
    pub confirmations: i32,
    pub created_at: DateTime<Utc>,
    pub broadcast_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// A fresh `fund` ledger entry: confirmed immediately, carrying neither a tx hash nor any
    /// Lightning fields, because funding moves no bitcoin.
    pub fn new_fund(card_id: Uuid, amount: Sats) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            card_id,
            tx_type: TransactionType::Fund,
            redemption_method: None,
            tx_hash: None,
            payment_hash: None,
            payment_preimage: None,
            lightning_invoice: None,
            from_address: None,
            to_address: None,
            btc_amount_sats: amount,
            status: TransactionStatus::Confirmed,
            confirmations: 0,
            created_at: now,
            broadcast_at: None,
            confirmed_at: Some(now),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for s in ["created", "funding", "active", "redeemed", "expired"] {
            assert_eq!(s.parse::<CardStatus>().unwrap().to_string(), s);
        }
        assert!("paid".parse::<CardStatus>().is_err());
    }

    #[test]
    fn redemption_method_parsing_is_case_insensitive() {
        assert_eq!("Lightning".parse::<RedemptionMethod>().unwrap(), RedemptionMethod::Lightning);
        assert_eq!("ONCHAIN".parse::<RedemptionMethod>().unwrap(), RedemptionMethod::OnChain);
        assert!("wire".parse::<RedemptionMethod>().is_err());
    }

    #[test]
    fn fund_transactions_carry_no_movement_fields() {
        let tx = Transaction::new_fund(Uuid::new_v4(), Sats::from(149_253));
        assert_eq!(tx.tx_type, TransactionType::Fund);
        assert_eq!(tx.status, TransactionStatus::Confirmed);
        assert!(tx.tx_hash.is_none());
        assert!(tx.payment_hash.is_none());
        assert!(tx.lightning_invoice.is_none());
        assert!(tx.confirmed_at.is_some());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Confirmed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }
}
