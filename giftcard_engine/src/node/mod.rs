//! The adapter for the external Lightning + on-chain node (LND).
//!
//! The rest of the engine depends on the [`NodeClient`](crate::traits::NodeClient) trait, not on
//! anything in here, so tests substitute mocks and a future move to another node implementation
//! stays contained.

mod client;
mod lightning;
mod onchain;

use std::{fmt::Display, str::FromStr};

use thiserror::Error;

pub use client::{connect, LndNode, NodeConfig};

/// Outputs below this are rejected by the bitcoin network.
pub const DUST_LIMIT_SATS: i64 = 546;

/// Which bitcoin network the node (and therefore every destination address) lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

#[derive(Debug, Clone, Error)]
#[error("Invalid network: {0} (expected mainnet, testnet or regtest)")]
pub struct NetworkParseError(String);

impl FromStr for Network {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            other => Err(NetworkParseError(other.to_string())),
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

impl Network {
    pub fn as_bitcoin(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Network;

    #[test]
    fn network_parsing() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("Testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("REGTEST".parse::<Network>().unwrap(), Network::Regtest);
        assert!("signet".parse::<Network>().is_err());
    }
}
