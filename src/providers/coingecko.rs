//! CoinGecko market data provider implementation

use crate::{
    constants::{COINGECKO_API_URL, COINGECKO_SIMPLE_PRICE_ENDPOINT},
    error::ProviderError,
    http::{build_client, normalize_base_url, send_json},
    provider::ProviderAdapter,
    request::RequestParams,
    types::{Asset, CanonicalPayload, Category, MarketQuote},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// CoinGecko API response for simple price queries
#[derive(Debug, Deserialize)]
struct CoinGeckoResponse {
    #[serde(flatten)]
    prices: HashMap<String, CoinGeckoPriceData>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoPriceData {
    usd: f64,
    #[serde(default)]
    usd_24h_change: Option<f64>,
    #[serde(default)]
    usd_24h_vol: Option<f64>,
}

/// CoinGecko market provider
///
/// Works keyless against the public API; a demo key raises the quota.
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoProvider {
    /// Creates a new CoinGecko provider against the public API
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(COINGECKO_API_URL)
    }

    /// Creates a provider against another deployment (or a test server)
    pub fn with_base_url(base_url: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(None)?,
            base_url: normalize_base_url(base_url),
            api_key: None,
        })
    }

    /// Sends `key` as the CoinGecko demo API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builds the CoinGecko API URL for fetching one asset
    fn build_url(&self, asset: Asset) -> String {
        format!(
            "{}{}?ids={}&vs_currencies=usd&include_24hr_change=true&include_24hr_vol=true",
            self.base_url,
            COINGECKO_SIMPLE_PRICE_ENDPOINT,
            asset.coingecko_id()
        )
    }

    /// Parses the CoinGecko response into a quote
    fn parse_response(
        response: CoinGeckoResponse,
        asset: Asset,
    ) -> Result<MarketQuote, ProviderError> {
        let data = response.prices.get(asset.coingecko_id()).ok_or_else(|| {
            ProviderError::parse(format!("No price returned for {}", asset.symbol()))
        })?;

        Ok(MarketQuote {
            symbol: asset.symbol().to_string(),
            price_usd: data.usd,
            change_24h: data.usd_24h_change,
            volume_24h: data.usd_24h_vol,
        })
    }
}

#[async_trait]
impl ProviderAdapter for CoinGeckoProvider {
    fn provider_name(&self) -> &'static str {
        "coingecko"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::Market]
    }

    fn supports(&self, category: Category, params: &RequestParams) -> bool {
        category == Category::Market && params.asset().is_some()
    }

    async fn fetch(
        &self,
        _category: Category,
        params: &RequestParams,
    ) -> Result<CanonicalPayload, ProviderError> {
        let asset = params
            .asset()
            .ok_or_else(|| ProviderError::unsupported("missing or unknown symbol"))?;

        let url = self.build_url(asset);
        debug!(%url, "Fetching price from CoinGecko");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response: CoinGeckoResponse = send_json(self.provider_name(), request).await?;
        let quote = Self::parse_response(response, asset)?;

        Ok(CanonicalPayload::Market(quote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{"bitcoin":{"usd":64000.5,"usd_24h_change":-1.25,"usd_24h_vol":3.1e10}}"#;
        let response: CoinGeckoResponse = serde_json::from_str(body).unwrap();

        let quote = CoinGeckoProvider::parse_response(response, Asset::BTC).unwrap();
        assert_eq!(quote.symbol, "BTC");
        assert_eq!(quote.price_usd, 64000.5);
        assert_eq!(quote.change_24h, Some(-1.25));
    }

    #[test]
    fn test_parse_response_missing_asset() {
        let response: CoinGeckoResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(matches!(
            CoinGeckoProvider::parse_response(response, Asset::ETH),
            Err(ProviderError::Parse(_))
        ));
    }

    #[test]
    fn test_supports_known_symbols_only() {
        let provider = CoinGeckoProvider::new().unwrap();
        let btc = RequestParams::new().with("symbol", "btc");
        let doge = RequestParams::new().with("symbol", "doge");

        assert!(provider.supports(Category::Market, &btc));
        assert!(!provider.supports(Category::Market, &doge));
        assert!(!provider.supports(Category::News, &btc));
    }
}
