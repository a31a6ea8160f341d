//! CoinMarketCap Fear & Greed provider

use crate::{
    constants::COINMARKETCAP_API_URL,
    error::ProviderError,
    http::{build_client, normalize_base_url, parse_f64, send_json},
    provider::ProviderAdapter,
    request::RequestParams,
    types::{CanonicalPayload, Category, SentimentReading},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CmcResponse {
    data: CmcFearGreed,
}

#[derive(Debug, Deserialize)]
struct CmcFearGreed {
    value: serde_json::Value,
    #[serde(default)]
    update_time: Option<DateTime<Utc>>,
}

/// CoinMarketCap sentiment provider (Pro API key required)
pub struct CoinMarketCapProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CoinMarketCapProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(COINMARKETCAP_API_URL, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(None)?,
            base_url: normalize_base_url(base_url),
            api_key: api_key.into(),
        })
    }

    fn parse_response(response: CmcResponse) -> Result<SentimentReading, ProviderError> {
        let score = parse_f64(&response.data.value).ok_or_else(|| {
            ProviderError::parse(format!("Invalid index value: {}", response.data.value))
        })?;
        Ok(SentimentReading::from_score(score, response.data.update_time))
    }
}

#[async_trait]
impl ProviderAdapter for CoinMarketCapProvider {
    fn provider_name(&self) -> &'static str {
        "coinmarketcap"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::Sentiment]
    }

    async fn fetch(
        &self,
        _category: Category,
        _params: &RequestParams,
    ) -> Result<CanonicalPayload, ProviderError> {
        let url = format!("{}/v3/fear-and-greed/latest", self.base_url);
        debug!(%url, "Fetching CoinMarketCap fear & greed");

        let request = self
            .client
            .get(&url)
            .header("X-CMC_PRO_API_KEY", &self.api_key)
            .header("Accept", "application/json");
        let response: CmcResponse = send_json(self.provider_name(), request).await?;

        Ok(CanonicalPayload::Sentiment(Self::parse_response(response)?))
    }
}
