//! Alternative.me Fear & Greed index provider

use crate::{
    constants::ALTERNATIVE_ME_API_URL,
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
struct FngResponse {
    data: Vec<FngEntry>,
}

#[derive(Debug, Deserialize)]
struct FngEntry {
    value: serde_json::Value,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Keyless sentiment provider backed by the public Fear & Greed index
pub struct AlternativeMeProvider {
    client: Client,
    base_url: String,
}

impl AlternativeMeProvider {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(ALTERNATIVE_ME_API_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(None)?,
            base_url: normalize_base_url(base_url),
        })
    }

    fn parse_response(response: FngResponse) -> Result<SentimentReading, ProviderError> {
        let entry = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::parse("Empty fear & greed data"))?;

        let score = parse_f64(&entry.value)
            .ok_or_else(|| ProviderError::parse(format!("Invalid index value: {}", entry.value)))?;
        // Unix seconds, sent as a string
        let updated_at = entry
            .timestamp
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

        Ok(SentimentReading::from_score(score, updated_at))
    }
}

#[async_trait]
impl ProviderAdapter for AlternativeMeProvider {
    fn provider_name(&self) -> &'static str {
        "alternative_me"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::Sentiment]
    }

    async fn fetch(
        &self,
        _category: Category,
        _params: &RequestParams,
    ) -> Result<CanonicalPayload, ProviderError> {
        let url = format!("{}/fng/?limit=1", self.base_url);
        debug!(%url, "Fetching fear & greed index");

        let response: FngResponse = send_json(self.provider_name(), self.client.get(&url)).await?;
        Ok(CanonicalPayload::Sentiment(Self::parse_response(response)?))
    }
}
