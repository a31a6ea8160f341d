//! Etherscan account balance provider

use crate::{
    constants::ETHERSCAN_API_URL,
    error::ProviderError,
    http::{build_client, normalize_base_url, parse_f64, send_json},
    provider::ProviderAdapter,
    request::RequestParams,
    types::{CanonicalPayload, Category, Chain, ChainLookup},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Etherscan wraps every answer in `{status, message, result}`; errors still
/// arrive with HTTP 200 and `status = "0"`.
#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

/// Etherscan explorer provider (API key required)
pub struct EtherscanProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl EtherscanProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(ETHERSCAN_API_URL, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(None)?,
            base_url: normalize_base_url(base_url),
            api_key: api_key.into(),
        })
    }

    fn parse_response(response: EtherscanResponse, address: &str) -> Result<ChainLookup, ProviderError> {
        if response.status != "1" {
            let detail = response
                .result
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| response.result.to_string());
            return Err(ProviderError::http(format!("{}: {}", response.message, detail)));
        }

        let wei = parse_f64(&response.result)
            .ok_or_else(|| ProviderError::parse(format!("Invalid balance: {}", response.result)))?;

        Ok(ChainLookup {
            chain: Chain::Ethereum,
            address: address.to_string(),
            balance: Chain::Ethereum.to_native(wei),
            tx_count: None,
        })
    }
}

/// Looks like a 20-byte hex address
fn is_eth_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[async_trait]
impl ProviderAdapter for EtherscanProvider {
    fn provider_name(&self) -> &'static str {
        "etherscan"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::Blockchain]
    }

    fn supports(&self, category: Category, params: &RequestParams) -> bool {
        category == Category::Blockchain
            && params.chain().unwrap_or(Chain::Ethereum) == Chain::Ethereum
            && params.get("address").is_some_and(is_eth_address)
    }

    async fn fetch(
        &self,
        _category: Category,
        params: &RequestParams,
    ) -> Result<CanonicalPayload, ProviderError> {
        let address = params
            .get("address")
            .filter(|a| is_eth_address(a))
            .ok_or_else(|| ProviderError::unsupported("missing or malformed address"))?;

        debug!(url = %self.base_url, address, "Fetching Etherscan balance");

        let request = self.client.get(&self.base_url).query(&[
            ("module", "account"),
            ("action", "balance"),
            ("address", address),
            ("tag", "latest"),
            ("apikey", self.api_key.as_str()),
        ]);
        let response: EtherscanResponse = send_json(self.provider_name(), request).await?;

        Ok(CanonicalPayload::Chain(Self::parse_response(response, address)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0xde0B295669a9FD93d5F28D9Ec85E40f4cb697BAe";

    #[test]
    fn test_parse_balance() {
        let body = r#"{"status":"1","message":"OK","result":"2500000000000000000"}"#;
        let lookup =
            EtherscanProvider::parse_response(serde_json::from_str(body).unwrap(), ADDRESS).unwrap();
        assert_eq!(lookup.balance, 2.5);
        assert_eq!(lookup.chain, Chain::Ethereum);
    }

    #[test]
    fn test_notok_is_http_error() {
        let body = r#"{"status":"0","message":"NOTOK","result":"Max rate limit reached"}"#;
        let result = EtherscanProvider::parse_response(serde_json::from_str(body).unwrap(), ADDRESS);
        match result {
            Err(ProviderError::Http { message, .. }) => {
                assert_eq!(message, "NOTOK: Max rate limit reached")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_supports_ethereum_addresses_only() {
        let provider = EtherscanProvider::new("key").unwrap();
        let eth = RequestParams::new().with("address", ADDRESS);
        let btc = RequestParams::new()
            .with("chain", "bitcoin")
            .with("address", ADDRESS);
        let junk = RequestParams::new().with("address", "0x123");

        assert!(provider.supports(Category::Blockchain, &eth));
        assert!(!provider.supports(Category::Blockchain, &btc));
        assert!(!provider.supports(Category::Blockchain, &junk));
    }
}
