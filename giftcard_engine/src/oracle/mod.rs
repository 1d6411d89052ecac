//! BTC↔fiat spot-price adapters.
//!
//! Three HTTP sources are provided — Coinbase, CoinGecko and Bitstamp — behind one tagged
//! [`PriceProvider`] enum, selected by case-insensitive name. Each adapter accepts an injectable
//! base URL and `reqwest` client so tests can point them at stubs, normalises currency case per
//! the provider's convention, and rejects non-positive rates.

use std::{collections::HashMap, time::Duration};

use log::info;
use reqwest::Client;
use serde::Deserialize;

use crate::traits::{PriceOracle, ProviderError};

const COINBASE_BASE_URL: &str = "https://api.coinbase.com";
const COINGECKO_BASE_URL: &str = "https://api.coingecko.com";
const BITSTAMP_BASE_URL: &str = "https://www.bitstamp.net";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Coinbase {
    client: Client,
    base_url: String,
}

#[derive(Debug, Clone)]
pub struct CoinGecko {
    client: Client,
    base_url: String,
}

#[derive(Debug, Clone)]
pub struct Bitstamp {
    client: Client,
    base_url: String,
}

/// The available spot-price sources as tagged variants. Construct via [`PriceProvider::by_name`].
#[derive(Debug, Clone)]
pub enum PriceProvider {
    Coinbase(Coinbase),
    CoinGecko(CoinGecko),
    Bitstamp(Bitstamp),
}

impl PriceProvider {
    /// Creates a provider by name (case-insensitive). `base_url: None` selects the production
    /// endpoint; `client: None` builds a default client with a 10 s timeout.
    pub fn by_name(name: &str, base_url: Option<&str>, client: Option<Client>) -> Result<Self, ProviderError> {
        let client = match client {
            Some(c) => c,
            None => Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .map_err(|e| ProviderError::Network(e.to_string()))?,
        };
        match name.to_lowercase().as_str() {
            "coinbase" => {
                let base_url = base_url.unwrap_or(COINBASE_BASE_URL).to_string();
                Ok(Self::Coinbase(Coinbase { client, base_url }))
            },
            "coingecko" => {
                let base_url = base_url.unwrap_or(COINGECKO_BASE_URL).to_string();
                Ok(Self::CoinGecko(CoinGecko { client, base_url }))
            },
            "bitstamp" => {
                let base_url = base_url.unwrap_or(BITSTAMP_BASE_URL).to_string();
                Ok(Self::Bitstamp(Bitstamp { client, base_url }))
            },
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Coinbase(_) => "coinbase",
            Self::CoinGecko(_) => "coingecko",
            Self::Bitstamp(_) => "bitstamp",
        }
    }
}

impl PriceOracle for PriceProvider {
    async fn btc_spot_price(&self, fiat_currency: &str) -> Result<f64, ProviderError> {
        let rate = match self {
            Self::Coinbase(p) => p.spot_price(fiat_currency).await?,
            Self::CoinGecko(p) => p.spot_price(fiat_currency).await?,
            Self::Bitstamp(p) => p.spot_price(fiat_currency).await?,
        };
        info!("💱️ {} quotes BTC-{} at {rate}", self.name(), fiat_currency.to_uppercase());
        Ok(rate)
    }
}

async fn fetch_text(client: &Client, url: &str) -> Result<String, ProviderError> {
    let response = client.get(url).send().await.map_err(|e| ProviderError::Network(e.to_string()))?;
    if !response.status().is_success() {
        return Err(ProviderError::Status(response.status().as_u16()));
    }
    response.text().await.map_err(|e| ProviderError::Network(e.to_string()))
}

fn ensure_positive(rate: f64) -> Result<f64, ProviderError> {
    if rate > 0.0 && rate.is_finite() {
        Ok(rate)
    } else {
        Err(ProviderError::InvalidRate(rate))
    }
}

//--------------------------------------      Coinbase       ---------------------------------------------------------
#[derive(Deserialize)]
struct CoinbaseResponse {
    data: CoinbaseData,
}

#[derive(Deserialize)]
struct CoinbaseData {
    amount: String,
}

impl Coinbase {
    /// Coinbase uses uppercase currency codes: `/v2/prices/BTC-USD/spot`.
    fn spot_url(&self, fiat_currency: &str) -> String {
        format!("{}/v2/prices/BTC-{}/spot", self.base_url, fiat_currency.to_uppercase())
    }

    async fn spot_price(&self, fiat_currency: &str) -> Result<f64, ProviderError> {
        let body = fetch_text(&self.client, &self.spot_url(fiat_currency)).await?;
        parse_coinbase(&body)
    }
}

fn parse_coinbase(body: &str) -> Result<f64, ProviderError> {
    let response: CoinbaseResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let rate = response.data.amount.parse::<f64>().map_err(|e| ProviderError::Parse(e.to_string()))?;
    ensure_positive(rate)
}

//--------------------------------------      CoinGecko      ---------------------------------------------------------
type CoinGeckoResponse = HashMap<String, HashMap<String, f64>>;

impl CoinGecko {
    /// CoinGecko uses lowercase currency codes: `?ids=bitcoin&vs_currencies=usd`.
    fn spot_url(&self, fiat_currency: &str) -> String {
        format!(
            "{}/api/v3/simple/price?ids=bitcoin&vs_currencies={}",
            self.base_url,
            fiat_currency.to_lowercase()
        )
    }

    async fn spot_price(&self, fiat_currency: &str) -> Result<f64, ProviderError> {
        let body = fetch_text(&self.client, &self.spot_url(fiat_currency)).await?;
        parse_coingecko(&body, &fiat_currency.to_lowercase())
    }
}

fn parse_coingecko(body: &str, fiat_currency: &str) -> Result<f64, ProviderError> {
    let response: CoinGeckoResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let rate = response
        .get("bitcoin")
        .and_then(|btc| btc.get(fiat_currency))
        .copied()
        .ok_or_else(|| ProviderError::MissingCurrency(fiat_currency.to_string()))?;
    ensure_positive(rate)
}

//--------------------------------------      Bitstamp       ---------------------------------------------------------
#[derive(Deserialize)]
struct BitstampResponse {
    last: String,
}

impl Bitstamp {
    /// Bitstamp uses a lowercase concatenated pair: `/api/v2/ticker/btcusd`.
    fn spot_url(&self, fiat_currency: &str) -> String {
        format!("{}/api/v2/ticker/btc{}", self.base_url, fiat_currency.to_lowercase())
    }

    async fn spot_price(&self, fiat_currency: &str) -> Result<f64, ProviderError> {
        let body = fetch_text(&self.client, &self.spot_url(fiat_currency)).await?;
        parse_bitstamp(&body)
    }
}

fn parse_bitstamp(body: &str) -> Result<f64, ProviderError> {
    let response: BitstampResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let rate = response.last.parse::<f64>().map_err(|e| ProviderError::Parse(e.to_string()))?;
    ensure_positive(rate)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn factory_is_case_insensitive() {
        assert!(matches!(PriceProvider::by_name("Coinbase", None, None).unwrap(), PriceProvider::Coinbase(_)));
        assert!(matches!(PriceProvider::by_name("COINGECKO", None, None).unwrap(), PriceProvider::CoinGecko(_)));
        assert!(matches!(PriceProvider::by_name("bitstamp", None, None).unwrap(), PriceProvider::Bitstamp(_)));
        assert!(matches!(
            PriceProvider::by_name("kraken", None, None),
            Err(ProviderError::UnknownProvider(_))
        ));
    }

    #[test]
    fn urls_follow_each_providers_currency_convention() {
        let PriceProvider::Coinbase(cb) = PriceProvider::by_name("coinbase", Some("http://x"), None).unwrap()
        else {
            unreachable!()
        };
        assert_eq!(cb.spot_url("usd"), "http://x/v2/prices/BTC-USD/spot");

        let PriceProvider::CoinGecko(cg) = PriceProvider::by_name("coingecko", Some("http://x"), None).unwrap()
        else {
            unreachable!()
        };
        assert_eq!(cg.spot_url("EUR"), "http://x/api/v3/simple/price?ids=bitcoin&vs_currencies=eur");

        let PriceProvider::Bitstamp(bs) = PriceProvider::by_name("bitstamp", Some("http://x"), None).unwrap()
        else {
            unreachable!()
        };
        assert_eq!(bs.spot_url("GBP"), "http://x/api/v2/ticker/btcgbp");
    }

    #[test]
    fn coinbase_parsing() {
        let body = r#"{"data": {"amount": "67000.00", "base": "BTC", "currency": "USD"}}"#;
        assert_eq!(parse_coinbase(body).unwrap(), 67_000.0);
        assert!(matches!(parse_coinbase(r#"{"data": {"amount": "abc"}}"#), Err(ProviderError::Parse(_))));
        assert!(matches!(
            parse_coinbase(r#"{"data": {"amount": "-1.0"}}"#),
            Err(ProviderError::InvalidRate(_))
        ));
        assert!(matches!(parse_coinbase("not json"), Err(ProviderError::Parse(_))));
    }

    #[test]
    fn coingecko_parsing() {
        let body = r#"{"bitcoin": {"usd": 67000.0, "eur": 62000.5}}"#;
        assert_eq!(parse_coingecko(body, "usd").unwrap(), 67_000.0);
        assert_eq!(parse_coingecko(body, "eur").unwrap(), 62_000.5);
        assert!(matches!(parse_coingecko(body, "zar"), Err(ProviderError::MissingCurrency(_))));
        assert!(matches!(
            parse_coingecko(r#"{"bitcoin": {"usd": 0.0}}"#, "usd"),
            Err(ProviderError::InvalidRate(_))
        ));
    }

    #[test]
    fn bitstamp_parsing() {
        let body = r#"{"last": "67000.55", "ask": "67001.0", "bid": "66999.0"}"#;
        assert_eq!(parse_bitstamp(body).unwrap(), 67_000.55);
        assert!(matches!(parse_bitstamp(r#"{"last": "zero"}"#), Err(ProviderError::Parse(_))));
    }
}
