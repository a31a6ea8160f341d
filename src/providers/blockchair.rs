//! Blockchair explorer provider
//!
//! Serves two categories from one quota: large transfers (whale) and
//! address dashboards (blockchain) on Bitcoin and Ethereum.

use crate::{
    constants::{BLOCKCHAIR_API_URL, DEFAULT_WHALE_MIN_VALUE_USD},
    error::ProviderError,
    http::{build_client, normalize_base_url, parse_f64, send_json},
    provider::ProviderAdapter,
    request::RequestParams,
    types::{
        CanonicalPayload, Category, Chain, ChainLookup, WhaleActivity, WhaleTransaction,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Transactions returned per whale query
const WHALE_PAGE_SIZE: usize = 10;

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DashboardResponse {
    data: HashMap<String, AddressDashboard>,
}

#[derive(Debug, Deserialize)]
struct AddressDashboard {
    address: AddressSummary,
}

#[derive(Debug, Deserialize)]
struct AddressSummary {
    balance: serde_json::Value,
    #[serde(default)]
    transaction_count: Option<u64>,
}

/// Blockchair REST provider; the API key is optional
pub struct BlockchairProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl BlockchairProvider {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(BLOCKCHAIR_API_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(None)?,
            base_url: normalize_base_url(base_url),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Chain scanned for whale transfers: the symbol's native chain, else Bitcoin
    fn whale_chain(params: &RequestParams) -> Option<Chain> {
        match params.symbol() {
            None => Some(Chain::Bitcoin),
            Some(_) => params
                .asset()
                .and_then(|a| a.blockchair_chain())
                .and_then(|slug| slug.parse().ok()),
        }
    }

    fn lookup_chain(params: &RequestParams) -> Option<Chain> {
        params
            .chain()
            .filter(|c| matches!(c, Chain::Bitcoin | Chain::Ethereum))
    }

    fn with_key(&self, mut query: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(key) = &self.api_key {
            query.push(("key", key.clone()));
        }
        query
    }

    fn parse_transactions(
        response: TransactionsResponse,
        chain: Chain,
        min_value_usd: f64,
    ) -> Result<WhaleActivity, ProviderError> {
        let (amount_field, usd_field) = match chain {
            Chain::Ethereum => ("value", "value_usd"),
            _ => ("output_total", "output_total_usd"),
        };
        let symbol = match chain {
            Chain::Ethereum => "ETH",
            Chain::Solana => "SOL",
            Chain::Bitcoin => "BTC",
        };

        let mut transactions = Vec::with_capacity(response.data.len());
        for tx in response.data {
            let hash = tx
                .get("hash")
                .and_then(|h| h.as_str())
                .ok_or_else(|| ProviderError::parse("Transaction without hash"))?;
            let amount_usd = tx.get(usd_field).and_then(parse_f64).unwrap_or(0.0);
            if amount_usd < min_value_usd {
                continue;
            }

            transactions.push(WhaleTransaction {
                hash: hash.to_string(),
                blockchain: chain.as_str().to_string(),
                symbol: symbol.to_string(),
                amount: chain.to_native(tx.get(amount_field).and_then(parse_f64).unwrap_or(0.0)),
                amount_usd,
                from: tx.get("sender").and_then(|v| v.as_str()).map(str::to_string),
                to: tx
                    .get("recipient")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                timestamp: tx
                    .get("time")
                    .and_then(|v| v.as_str())
                    .and_then(parse_time),
            });
        }

        Ok(WhaleActivity {
            symbol: Some(symbol.to_string()),
            min_value_usd,
            transactions,
        })
    }

    fn parse_dashboard(
        response: DashboardResponse,
        chain: Chain,
        address: &str,
    ) -> Result<ChainLookup, ProviderError> {
        // Keyed by the address as Blockchair normalized it (lower-cased on Ethereum)
        let dashboard = response
            .data
            .into_values()
            .next()
            .ok_or_else(|| ProviderError::parse(format!("No dashboard for {address}")))?;
        let base_units = parse_f64(&dashboard.address.balance)
            .ok_or_else(|| ProviderError::parse("Invalid balance"))?;

        Ok(ChainLookup {
            chain,
            address: address.to_string(),
            balance: chain.to_native(base_units),
            tx_count: dashboard.address.transaction_count,
        })
    }

    async fn fetch_whales(&self, params: &RequestParams) -> Result<WhaleActivity, ProviderError> {
        let chain = Self::whale_chain(params)
            .ok_or_else(|| ProviderError::unsupported("symbol has no Blockchair chain"))?;
        let min_value_usd = params
            .min_value_usd()
            .unwrap_or(DEFAULT_WHALE_MIN_VALUE_USD);
        let usd_field = match chain {
            Chain::Ethereum => "value_usd",
            _ => "output_total_usd",
        };

        let url = format!("{}/{}/transactions", self.base_url, chain.as_str());
        let query = self.with_key(vec![
            ("q", format!("{}({}..)", usd_field, min_value_usd as u64)),
            ("s", "time(desc)".to_string()),
            ("limit", WHALE_PAGE_SIZE.to_string()),
        ]);
        debug!(%url, min_value_usd, "Fetching Blockchair transactions");

        let request = self.client.get(&url).query(&query);
        let response: TransactionsResponse = send_json(self.provider_name(), request).await?;
        Self::parse_transactions(response, chain, min_value_usd)
    }

    async fn fetch_address(&self, params: &RequestParams) -> Result<ChainLookup, ProviderError> {
        let chain = Self::lookup_chain(params)
            .ok_or_else(|| ProviderError::unsupported("chain not indexed by Blockchair"))?;
        let address = params
            .get("address")
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ProviderError::unsupported("missing address"))?;

        let url = format!(
            "{}/{}/dashboards/address/{}",
            self.base_url,
            chain.as_str(),
            address
        );
        debug!(%url, "Fetching Blockchair address dashboard");

        let request = self.client.get(&url).query(&self.with_key(Vec::new()));
        let response: DashboardResponse = send_json(self.provider_name(), request).await?;
        Self::parse_dashboard(response, chain, address)
    }
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|t| t.and_utc())
}

#[async_trait]
impl ProviderAdapter for BlockchairProvider {
    fn provider_name(&self) -> &'static str {
        "blockchair"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::Whale, Category::Blockchain]
    }

    fn supports(&self, category: Category, params: &RequestParams) -> bool {
        match category {
            Category::Whale => Self::whale_chain(params).is_some(),
            Category::Blockchain => {
                Self::lookup_chain(params).is_some()
                    && params.get("address").is_some_and(|a| !a.is_empty())
            }
            _ => false,
        }
    }

    async fn fetch(
        &self,
        category: Category,
        params: &RequestParams,
    ) -> Result<CanonicalPayload, ProviderError> {
        match category {
            Category::Whale => Ok(CanonicalPayload::Whale(self.fetch_whales(params).await?)),
            Category::Blockchain => Ok(CanonicalPayload::Chain(self.fetch_address(params).await?)),
            other => Err(ProviderError::unsupported(format!(
                "blockchair does not serve {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bitcoin_transactions() {
        let body = r#"{"data":[
            {"block_id":840000,"hash":"h1","time":"2024-04-20 00:09:27","output_total":250000000000,"output_total_usd":160000000.5},
            {"block_id":840000,"hash":"h2","time":"2024-04-20 00:09:27","output_total":100000,"output_total_usd":64.0}
        ],"context":{"code":200}}"#;
        let activity = BlockchairProvider::parse_transactions(
            serde_json::from_str(body).unwrap(),
            Chain::Bitcoin,
            1_000_000.0,
        )
        .unwrap();

        assert_eq!(activity.transactions.len(), 1);
        let tx = &activity.transactions[0];
        assert_eq!(tx.amount, 2500.0);
        assert_eq!(tx.symbol, "BTC");
        assert_eq!(tx.timestamp.map(|t| t.timestamp()), Some(1_713_571_767));
    }

    #[test]
    fn test_parse_ethereum_dashboard() {
        let body = r#"{"data":{"0xabc":{"address":{"type":"account","balance":"1500000000000000000","transaction_count":12},"calls":[]}}}"#;
        let lookup = BlockchairProvider::parse_dashboard(
            serde_json::from_str(body).unwrap(),
            Chain::Ethereum,
            "0xABC",
        )
        .unwrap();

        assert_eq!(lookup.balance, 1.5);
        assert_eq!(lookup.tx_count, Some(12));
        assert_eq!(lookup.address, "0xABC");
    }

    #[test]
    fn test_supports() {
        let provider = BlockchairProvider::new().unwrap();

        assert!(provider.supports(Category::Whale, &RequestParams::new()));
        assert!(provider.supports(Category::Whale, &RequestParams::new().with("symbol", "eth")));
        assert!(!provider.supports(Category::Whale, &RequestParams::new().with("symbol", "sol")));

        let sol_lookup = RequestParams::new()
            .with("chain", "solana")
            .with("address", "abc");
        assert!(!provider.supports(Category::Blockchain, &sol_lookup));
        let btc_lookup = RequestParams::new()
            .with("chain", "bitcoin")
            .with("address", "bc1q");
        assert!(provider.supports(Category::Blockchain, &btc_lookup));
    }
}
