//! The JSON payloads carried on the streams. Both types validate on deserialization: unknown
//! fields are ignored, missing required fields reject.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum MessageError {
    #[error("Could not decode message: {0}")]
    Malformed(String),
    #[error("Invalid message: {0}")]
    Invalid(String),
}

//--------------------------------------      FundCard       ---------------------------------------------------------
/// A request to price and fund a freshly issued card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundCard {
    pub card_id: Uuid,
    pub fiat_amount_cents: i64,
    pub fiat_currency: String,
}

impl FundCard {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Malformed(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, MessageError> {
        let msg: Self = serde_json::from_slice(data).map_err(|e| MessageError::Malformed(e.to_string()))?;
        msg.validate()?;
        Ok(msg)
    }

    fn validate(&self) -> Result<(), MessageError> {
        if self.fiat_amount_cents <= 0 {
            return Err(MessageError::Invalid("fiat_amount_cents must be greater than 0".into()));
        }
        if self.fiat_currency.len() != 3 {
            return Err(MessageError::Invalid(format!(
                "fiat_currency must be 3 characters (got {:?})",
                self.fiat_currency
            )));
        }
        Ok(())
    }
}

//-------------------------------------- MonitorTransaction  ---------------------------------------------------------
/// A request to track an on-chain redemption until it confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorTransaction {
    pub card_id: Uuid,
    pub tx_hash: String,
    pub expected_amount_sats: i64,
    pub destination_addr: String,
}

impl MonitorTransaction {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Malformed(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, MessageError> {
        let msg: Self = serde_json::from_slice(data).map_err(|e| MessageError::Malformed(e.to_string()))?;
        msg.validate()?;
        Ok(msg)
    }

    fn validate(&self) -> Result<(), MessageError> {
        if self.tx_hash.len() != 64 {
            return Err(MessageError::Invalid(format!("tx_hash must be 64 characters (got {})", self.tx_hash.len())));
        }
        if hex::decode(&self.tx_hash).is_err() {
            return Err(MessageError::Invalid("tx_hash must be valid hexadecimal".into()));
        }
        if self.expected_amount_sats <= 0 {
            return Err(MessageError::Invalid("expected_amount_sats must be greater than 0".into()));
        }
        if self.destination_addr.is_empty() {
            return Err(MessageError::Invalid("destination_addr is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use uuid::Uuid;

    use super::*;

    const TX_HASH: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    #[test]
    fn fund_card_round_trip() {
        let msg =
            FundCard { card_id: Uuid::new_v4(), fiat_amount_cents: 10_000, fiat_currency: "USD".to_string() };
        let bytes = msg.to_bytes().unwrap();
        let decoded = FundCard::from_bytes(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn fund_card_rejects_missing_fields() {
        let err = FundCard::from_bytes(br#"{"card_id": "bfa24c53-2691-4cd5-a532-aff2b83c5f29"}"#).unwrap_err();
        assert!(matches!(err, MessageError::Malformed(_)));
    }

    #[test]
    fn fund_card_rejects_bad_values() {
        let card_id = Uuid::new_v4();
        let msg = FundCard { card_id, fiat_amount_cents: 0, fiat_currency: "USD".to_string() };
        assert!(matches!(FundCard::from_bytes(&msg.to_bytes().unwrap()), Err(MessageError::Invalid(_))));
        let msg = FundCard { card_id, fiat_amount_cents: 100, fiat_currency: "US".to_string() };
        assert!(matches!(FundCard::from_bytes(&msg.to_bytes().unwrap()), Err(MessageError::Invalid(_))));
    }

    #[test]
    fn fund_card_ignores_unknown_fields() {
        let json = format!(
            r#"{{"card_id": "{}", "fiat_amount_cents": 5000, "fiat_currency": "EUR", "comment": "ignored"}}"#,
            Uuid::new_v4()
        );
        let decoded = FundCard::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(decoded.fiat_amount_cents, 5_000);
    }

    #[test]
    fn monitor_transaction_round_trip() {
        let msg = MonitorTransaction {
            card_id: Uuid::new_v4(),
            tx_hash: TX_HASH.to_string(),
            expected_amount_sats: 50_000,
            destination_addr: "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx".to_string(),
        };
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(MonitorTransaction::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn monitor_transaction_rejects_bad_hashes() {
        let mut msg = MonitorTransaction {
            card_id: Uuid::new_v4(),
            tx_hash: "abc123".to_string(),
            expected_amount_sats: 50_000,
            destination_addr: "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx".to_string(),
        };
        assert!(matches!(
            MonitorTransaction::from_bytes(&msg.to_bytes().unwrap()),
            Err(MessageError::Invalid(_))
        ));
        // Right length, but not hex.
        msg.tx_hash = "z".repeat(64);
        assert!(matches!(
            MonitorTransaction::from_bytes(&msg.to_bytes().unwrap()),
            Err(MessageError::Invalid(_))
        ));
    }

    #[test]
    fn monitor_transaction_rejects_non_positive_amounts() {
        let msg = MonitorTransaction {
            card_id: Uuid::new_v4(),
            tx_hash: TX_HASH.to_string(),
            expected_amount_sats: 0,
            destination_addr: "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx".to_string(),
        };
        assert!(matches!(
            MonitorTransaction::from_bytes(&msg.to_bytes().unwrap()),
            Err(MessageError::Invalid(_))
        ));
    }
}
