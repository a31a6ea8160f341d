//! Solana JSON-RPC balance provider

use crate::{
    constants::SOLANA_RPC_URL,
    error::ProviderError,
    http::{build_client, normalize_base_url, send_json},
    provider::ProviderAdapter,
    request::RequestParams,
    types::{CanonicalPayload, Category, Chain, ChainLookup},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<BalanceResult>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct BalanceResult {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Balance lookups against any Solana RPC node
pub struct SolanaRpcProvider {
    client: Client,
    rpc_url: String,
}

impl SolanaRpcProvider {
    /// Creates a provider against the public mainnet endpoint
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(SOLANA_RPC_URL)
    }

    pub fn with_base_url(rpc_url: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(None)?,
            rpc_url: normalize_base_url(rpc_url),
        })
    }

    fn parse_response(response: RpcResponse, address: &str) -> Result<ChainLookup, ProviderError> {
        if let Some(error) = response.error {
            return Err(ProviderError::http(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }
        let lamports = response
            .result
            .ok_or_else(|| ProviderError::parse("RPC response has neither result nor error"))?
            .value;

        Ok(ChainLookup {
            chain: Chain::Solana,
            address: address.to_string(),
            balance: Chain::Solana.to_native(lamports as f64),
            tx_count: None,
        })
    }
}

fn is_valid_pubkey(address: &str) -> bool {
    Pubkey::from_str(address).is_ok()
}

#[async_trait]
impl ProviderAdapter for SolanaRpcProvider {
    fn provider_name(&self) -> &'static str {
        "solana_rpc"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::Blockchain]
    }

    fn supports(&self, category: Category, params: &RequestParams) -> bool {
        category == Category::Blockchain
            && params.chain() == Some(Chain::Solana)
            && params.get("address").is_some_and(is_valid_pubkey)
    }

    async fn fetch(
        &self,
        _category: Category,
        params: &RequestParams,
    ) -> Result<CanonicalPayload, ProviderError> {
        let address = params
            .get("address")
            .filter(|a| is_valid_pubkey(a))
            .ok_or_else(|| ProviderError::unsupported("missing or invalid Solana address"))?;

        debug!(url = %self.rpc_url, address, "Calling getBalance");

        let body = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "getBalance",
            params: [address],
        };
        let request = self.client.post(&self.rpc_url).json(&body);
        let response: RpcResponse = send_json(self.provider_name(), request).await?;

        Ok(CanonicalPayload::Chain(Self::parse_response(response, address)?))
    }
}
