use thiserror::Error;

/// A source of BTC↔fiat spot prices. Consulted exactly once per card, at funding time — the
/// system never re-prices a balance after it has been reserved.
#[allow(async_fn_in_trait)]
pub trait PriceOracle {
    /// The current BTC price in the given ISO-4217 fiat currency. Implementations must validate
    /// that the rate is strictly positive.
    async fn btc_spot_price(&self, fiat_currency: &str) -> Result<f64, ProviderError>;
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Unknown price provider: {0} (supported: coinbase, coingecko, bitstamp)")]
    UnknownProvider(String),
    #[error("Price request failed: {0}")]
    Network(String),
    #[error("Price API returned status {0}")]
    Status(u16),
    #[error("Could not parse price response: {0}")]
    Parse(String),
    #[error("Provider returned a non-positive rate: {0}")]
    InvalidRate(f64),
    #[error("Currency {0} not present in provider response")]
    MissingCurrency(String),
}
