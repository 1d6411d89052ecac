//! Destination-address validation for on-chain redemptions.

use std::str::FromStr;

use bitcoin::{address::NetworkUnchecked, Address};
use thiserror::Error;

use crate::node::Network;

#[derive(Debug, Clone, Error)]
pub enum AddressError {
    #[error("Invalid bitcoin address: {0}")]
    Malformed(String),
    #[error("Address is not valid for {0}")]
    WrongNetwork(Network),
}

/// Parses the address and checks it belongs to the configured network. A mainnet backend must
/// never pay out to a testnet address, and vice versa.
pub fn validate_address(address: &str, network: Network) -> Result<(), AddressError> {
    let parsed =
        Address::<NetworkUnchecked>::from_str(address).map_err(|e| AddressError::Malformed(e.to_string()))?;
    if parsed.is_valid_for_network(network.as_bitcoin()) {
        Ok(())
    } else {
        Err(AddressError::WrongNetwork(network))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TESTNET_BECH32: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
    const MAINNET_BECH32: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

    #[test]
    fn accepts_addresses_on_their_own_network() {
        assert!(validate_address(TESTNET_BECH32, Network::Testnet).is_ok());
        assert!(validate_address(MAINNET_BECH32, Network::Mainnet).is_ok());
    }

    #[test]
    fn rejects_network_mismatches() {
        assert!(matches!(
            validate_address(TESTNET_BECH32, Network::Mainnet),
            Err(AddressError::WrongNetwork(Network::Mainnet))
        ));
        assert!(matches!(
            validate_address(MAINNET_BECH32, Network::Testnet),
            Err(AddressError::WrongNetwork(Network::Testnet))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(validate_address("not-an-address", Network::Testnet), Err(AddressError::Malformed(_))));
        assert!(matches!(validate_address("", Network::Mainnet), Err(AddressError::Malformed(_))));
    }
}
