//! Whale Alert large-transaction provider

use crate::{
    constants::{DEFAULT_WHALE_MIN_VALUE_USD, WHALE_ALERT_API_URL},
    error::ProviderError,
    http::{build_client, normalize_base_url, send_json},
    provider::ProviderAdapter,
    request::RequestParams,
    types::{CanonicalPayload, Category, WhaleActivity, WhaleTransaction},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Whale Alert rejects thresholds below this on every plan
const MIN_THRESHOLD_USD: f64 = 500_000.0;

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    result: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    blockchain: String,
    symbol: String,
    hash: String,
    #[serde(default)]
    from: Option<Party>,
    #[serde(default)]
    to: Option<Party>,
    timestamp: i64,
    amount: f64,
    amount_usd: f64,
}

#[derive(Debug, Deserialize)]
struct Party {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    owner: Option<String>,
}

impl Party {
    /// Known owner (exchange name) if labelled, else the raw address
    fn label(self) -> Option<String> {
        self.owner
            .filter(|o| !o.is_empty() && o != "unknown")
            .or(self.address)
    }
}

/// Whale Alert REST provider (API key required)
pub struct WhaleAlertProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WhaleAlertProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(WHALE_ALERT_API_URL, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(None)?,
            base_url: normalize_base_url(base_url),
            api_key: api_key.into(),
        })
    }

    fn parse_response(
        response: TransactionsResponse,
        symbol: Option<String>,
        min_value_usd: f64,
    ) -> Result<WhaleActivity, ProviderError> {
        if response.result != "success" {
            return Err(ProviderError::http(
                response
                    .message
                    .unwrap_or_else(|| format!("result {}", response.result)),
            ));
        }

        let transactions = response
            .transactions
            .into_iter()
            .filter(|tx| tx.amount_usd >= min_value_usd)
            .map(|tx| WhaleTransaction {
                hash: tx.hash,
                blockchain: tx.blockchain,
                symbol: tx.symbol.to_ascii_uppercase(),
                amount: tx.amount,
                amount_usd: tx.amount_usd,
                from: tx.from.and_then(Party::label),
                to: tx.to.and_then(Party::label),
                timestamp: DateTime::<Utc>::from_timestamp(tx.timestamp, 0),
            })
            .collect();

        Ok(WhaleActivity {
            symbol,
            min_value_usd,
            transactions,
        })
    }
}

#[async_trait]
impl ProviderAdapter for WhaleAlertProvider {
    fn provider_name(&self) -> &'static str {
        "whale_alert"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::Whale]
    }

    async fn fetch(
        &self,
        _category: Category,
        params: &RequestParams,
    ) -> Result<CanonicalPayload, ProviderError> {
        let min_value_usd = params
            .min_value_usd()
            .unwrap_or(DEFAULT_WHALE_MIN_VALUE_USD);
        let symbol = params.symbol();

        let url = format!("{}/transactions", self.base_url);
        let mut query = vec![
            ("api_key", self.api_key.clone()),
            (
                "min_value",
                (min_value_usd.max(MIN_THRESHOLD_USD) as u64).to_string(),
            ),
        ];
        if let Some(symbol) = &symbol {
            query.push(("currency", symbol.to_ascii_lowercase()));
        }
        debug!(%url, min_value_usd, "Fetching Whale Alert transactions");

        let request = self.client.get(&url).query(&query);
        let response: TransactionsResponse = send_json(self.provider_name(), request).await?;

        Ok(CanonicalPayload::Whale(Self::parse_response(
            response,
            symbol,
            min_value_usd,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{"result":"success","cursor":"abc","count":2,"transactions":[
            {"blockchain":"bitcoin","symbol":"btc","id":"1","transaction_type":"transfer","hash":"h1",
             "from":{"address":"a1","owner_type":"unknown"},"to":{"address":"a2","owner":"binance","owner_type":"exchange"},
             "timestamp":1700000000,"amount":25.5,"amount_usd":1600000.0,"transaction_count":1},
            {"blockchain":"bitcoin","symbol":"btc","hash":"h2","timestamp":1700000100,"amount":1.0,"amount_usd":60000.0}
        ]}"#;
        let activity = WhaleAlertProvider::parse_response(
            serde_json::from_str(body).unwrap(),
            Some("BTC".to_string()),
            1_000_000.0,
        )
        .unwrap();

        assert_eq!(activity.transactions.len(), 1);
        let tx = &activity.transactions[0];
        assert_eq!(tx.symbol, "BTC");
        assert_eq!(tx.from.as_deref(), Some("a1"));
        assert_eq!(tx.to.as_deref(), Some("binance"));
        assert!(tx.timestamp.is_some());
    }

    #[test]
    fn test_error_result() {
        let body = r#"{"result":"error","message":"invalid api_key"}"#;
        let result =
            WhaleAlertProvider::parse_response(serde_json::from_str(body).unwrap(), None, 0.0);
        assert!(matches!(result, Err(ProviderError::Http { .. })));
    }
}
