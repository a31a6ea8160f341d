//! Hyperliquid market data provider implementation

use crate::{
    constants::HYPERLIQUID_API_URL,
    error::ProviderError,
    http::{build_client, normalize_base_url, parse_f64, send_json},
    provider::ProviderAdapter,
    request::RequestParams,
    types::{Asset, CanonicalPayload, Category, MarketQuote},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hyperliquid API request for info
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum HyperliquidRequest {
    MetaAndAssetCtxs,
}

/// Hyperliquid API response for metaAndAssetCtxs
///
/// A two-element array: the perp universe, then one context per universe
/// entry in the same order.
#[derive(Debug, Deserialize)]
struct MetaAndAssetCtxs(Meta, Vec<AssetCtx>);

#[derive(Debug, Deserialize)]
struct Meta {
    universe: Vec<UniverseEntry>,
}

#[derive(Debug, Deserialize)]
struct UniverseEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetCtx {
    #[serde(default)]
    mark_px: serde_json::Value,
    #[serde(default)]
    mid_px: serde_json::Value,
    #[serde(default)]
    prev_day_px: serde_json::Value,
    #[serde(default)]
    day_ntl_vlm: serde_json::Value,
}

/// Hyperliquid perp market provider
pub struct HyperliquidProvider {
    client: Client,
    base_url: String,
}

impl HyperliquidProvider {
    /// Creates a new Hyperliquid provider
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(HYPERLIQUID_API_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(None)?,
            base_url: normalize_base_url(base_url),
        })
    }

    /// Parses the Hyperliquid response into a quote
    fn parse_response(
        response: MetaAndAssetCtxs,
        asset: Asset,
    ) -> Result<MarketQuote, ProviderError> {
        let symbol = asset
            .hyperliquid_symbol()
            .ok_or_else(|| ProviderError::unsupported(asset.symbol()))?;

        let MetaAndAssetCtxs(meta, contexts) = response;
        let index = meta
            .universe
            .iter()
            .position(|entry| entry.name == symbol)
            .ok_or_else(|| ProviderError::parse(format!("{symbol} missing from universe")))?;
        let ctx = contexts
            .get(index)
            .ok_or_else(|| ProviderError::parse(format!("No asset context for {symbol}")))?;

        let price_usd = parse_f64(&ctx.mid_px)
            .or_else(|| parse_f64(&ctx.mark_px))
            .ok_or_else(|| ProviderError::parse(format!("No price for {symbol}")))?;
        let change_24h = parse_f64(&ctx.prev_day_px)
            .filter(|prev| *prev > 0.0)
            .map(|prev| (price_usd - prev) / prev * 100.0);

        Ok(MarketQuote {
            symbol: asset.symbol().to_string(),
            price_usd,
            change_24h,
            volume_24h: parse_f64(&ctx.day_ntl_vlm),
        })
    }
}

#[async_trait]
impl ProviderAdapter for HyperliquidProvider {
    fn provider_name(&self) -> &'static str {
        "hyperliquid"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::Market]
    }

    fn supports(&self, category: Category, params: &RequestParams) -> bool {
        category == Category::Market
            && params
                .asset()
                .and_then(|a| a.hyperliquid_symbol())
                .is_some()
    }

    async fn fetch(
        &self,
        _category: Category,
        params: &RequestParams,
    ) -> Result<CanonicalPayload, ProviderError> {
        let asset = params
            .asset()
            .ok_or_else(|| ProviderError::unsupported("missing or unknown symbol"))?;

        let url = format!("{}/info", self.base_url);
        debug!(%url, "Fetching asset contexts from Hyperliquid");

        let request = self
            .client
            .post(&url)
            .json(&HyperliquidRequest::MetaAndAssetCtxs);
        let response: MetaAndAssetCtxs = send_json(self.provider_name(), request).await?;

        Ok(CanonicalPayload::Market(Self::parse_response(
            response, asset,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"[
        {"universe":[{"name":"BTC","szDecimals":5},{"name":"ETH","szDecimals":4}]},
        [
            {"markPx":"64010.0","midPx":"64000.0","prevDayPx":"60000.0","dayNtlVlm":"1500000000.0"},
            {"markPx":"3100.5","midPx":null,"prevDayPx":"3100.5","dayNtlVlm":"800000000.0"}
        ]
    ]"#;

    #[test]
    fn test_request_body() {
        let body = serde_json::to_string(&HyperliquidRequest::MetaAndAssetCtxs).unwrap();
        assert_eq!(body, r#"{"type":"metaAndAssetCtxs"}"#);
    }

    #[test]
    fn test_parse_response_uses_mid_then_mark() {
        let btc = HyperliquidProvider::parse_response(serde_json::from_str(BODY).unwrap(), Asset::BTC)
            .unwrap();
        assert_eq!(btc.price_usd, 64000.0);
        let change = btc.change_24h.unwrap();
        assert!((change - 6.6667).abs() < 0.001);

        let weth = HyperliquidProvider::parse_response(serde_json::from_str(BODY).unwrap(), Asset::WETH)
            .unwrap();
        assert_eq!(weth.symbol, "WETH");
        assert_eq!(weth.price_usd, 3100.5);
        assert_eq!(weth.change_24h, Some(0.0));
    }

    #[test]
    fn test_unlisted_asset() {
        let result =
            HyperliquidProvider::parse_response(serde_json::from_str(BODY).unwrap(), Asset::SOL);
        assert!(matches!(result, Err(ProviderError::Parse(_))));

        let provider = HyperliquidProvider::new().unwrap();
        let usdc = RequestParams::new().with("symbol", "USDC");
        assert!(!provider.supports(Category::Market, &usdc));
    }
}
