//! Types for the market feed orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::circuit_breaker::CircuitStatus;
use crate::constants::{DEFAULT_WHALE_MIN_VALUE_USD, FALLBACK_SOURCE};
use crate::error::ErrorKind;
use crate::request::RequestParams;

/// Logical data need served by an ordered chain of providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Spot prices and 24h statistics
    Market,
    /// Market-wide sentiment indices
    Sentiment,
    /// News headlines
    News,
    /// Large on-chain transfers
    Whale,
    /// Explorer lookups (address balances)
    Blockchain,
}

impl Category {
    /// Get the category identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Market => "market",
            Category::Sentiment => "sentiment",
            Category::News => "news",
            Category::Whale => "whale",
            Category::Blockchain => "blockchain",
        }
    }

    /// Get all categories
    pub fn all() -> &'static [Category] {
        &[
            Category::Market,
            Category::Sentiment,
            Category::News,
            Category::Whale,
            Category::Blockchain,
        ]
    }

    /// Safe default served when every provider in the chain fails
    ///
    /// - Market: zero quote for the requested symbol
    /// - Sentiment: neutral score of 50
    /// - News / Whale: empty lists
    /// - Blockchain: zero balance for the requested address
    pub fn fallback_payload(&self, params: &RequestParams) -> CanonicalPayload {
        match self {
            Category::Market => CanonicalPayload::Market(MarketQuote {
                symbol: params.symbol().unwrap_or_default(),
                price_usd: 0.0,
                change_24h: None,
                volume_24h: None,
            }),
            Category::Sentiment => CanonicalPayload::Sentiment(SentimentReading::neutral()),
            Category::News => CanonicalPayload::News(NewsFeed {
                query: params.news_query().unwrap_or_default(),
                items: Vec::new(),
            }),
            Category::Whale => CanonicalPayload::Whale(WhaleActivity {
                symbol: params.symbol(),
                min_value_usd: params.min_value_usd().unwrap_or(DEFAULT_WHALE_MIN_VALUE_USD),
                transactions: Vec::new(),
            }),
            Category::Blockchain => CanonicalPayload::Chain(ChainLookup {
                chain: params.chain().unwrap_or(Chain::Ethereum),
                address: params.get("address").unwrap_or_default().to_string(),
                balance: 0.0,
                tx_count: None,
            }),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" | "market_data" => Ok(Category::Market),
            "sentiment" => Ok(Category::Sentiment),
            "news" => Ok(Category::News),
            "whale" | "whale_activity" => Ok(Category::Whale),
            "blockchain" | "blockchain_lookup" => Ok(Category::Blockchain),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Immutable identity of a provider within one category chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderIdentity {
    /// Provider name; limiter and breaker state are keyed by it
    pub name: String,
    /// Category this chain entry serves
    pub category: Category,
    /// Lower values are tried first
    pub priority: u32,
}

impl ProviderIdentity {
    pub fn new(name: impl Into<String>, category: Category, priority: u32) -> Self {
        Self {
            name: name.into(),
            category,
            priority,
        }
    }
}

/// Supported cryptocurrency assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    /// Solana
    SOL,
    /// Bitcoin
    BTC,
    /// Ethereum
    ETH,
    /// USD Coin
    USDC,
    /// Tether
    USDT,
    /// Wrapped Bitcoin
    WBTC,
    /// Wrapped Ethereum
    WETH,
}

impl Asset {
    /// Get the asset symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::SOL => "SOL",
            Asset::BTC => "BTC",
            Asset::ETH => "ETH",
            Asset::USDC => "USDC",
            Asset::USDT => "USDT",
            Asset::WBTC => "WBTC",
            Asset::WETH => "WETH",
        }
    }

    /// Get the CoinGecko ID for this asset
    pub fn coingecko_id(&self) -> &'static str {
        match self {
            Asset::SOL => "solana",
            Asset::BTC => "bitcoin",
            Asset::ETH => "ethereum",
            Asset::USDC => "usd-coin",
            Asset::USDT => "tether",
            Asset::WBTC => "wrapped-bitcoin",
            Asset::WETH => "weth",
        }
    }

    /// Get the Hyperliquid perp name for this asset, if listed
    pub fn hyperliquid_symbol(&self) -> Option<&'static str> {
        match self {
            Asset::SOL => Some("SOL"),
            Asset::BTC | Asset::WBTC => Some("BTC"),
            Asset::ETH | Asset::WETH => Some("ETH"),
            Asset::USDC | Asset::USDT => None,
        }
    }

    /// Get the Blockchair chain slug whose native coin is this asset
    pub fn blockchair_chain(&self) -> Option<&'static str> {
        match self {
            Asset::BTC => Some("bitcoin"),
            Asset::ETH => Some("ethereum"),
            _ => None,
        }
    }

    /// Get all supported assets
    pub fn all() -> &'static [Asset] {
        &[
            Asset::SOL,
            Asset::BTC,
            Asset::ETH,
            Asset::USDC,
            Asset::USDT,
            Asset::WBTC,
            Asset::WETH,
        ]
    }
}

impl FromStr for Asset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Asset::all()
            .iter()
            .find(|a| a.symbol() == upper)
            .copied()
            .ok_or_else(|| format!("unknown asset: {s}"))
    }
}

/// Chains supported by explorer lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Bitcoin,
    Ethereum,
    Solana,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "bitcoin",
            Chain::Ethereum => "ethereum",
            Chain::Solana => "solana",
        }
    }

    /// Decimals between the smallest on-chain unit and the native coin
    pub fn decimals(&self) -> i32 {
        match self {
            Chain::Bitcoin => 8,
            Chain::Ethereum => 18,
            Chain::Solana => 9,
        }
    }

    /// Converts an amount in the smallest unit into native coin units
    pub fn to_native(&self, base_units: f64) -> f64 {
        base_units / 10f64.powi(self.decimals())
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bitcoin" | "btc" => Ok(Chain::Bitcoin),
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "solana" | "sol" => Ok(Chain::Solana),
            other => Err(format!("unknown chain: {other}")),
        }
    }
}

/// Spot quote for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub symbol: String,
    pub price_usd: f64,
    /// 24h price change percentage
    pub change_24h: Option<f64>,
    /// 24h traded volume in USD
    pub volume_24h: Option<f64>,
}

/// Fear & greed style classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentClass {
    ExtremeFear,
    Fear,
    Neutral,
    Greed,
    ExtremeGreed,
}

impl SentimentClass {
    /// Classifies a 0-100 score using the usual fear & greed bands
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s < 25.0 => SentimentClass::ExtremeFear,
            s if s < 45.0 => SentimentClass::Fear,
            s if s <= 55.0 => SentimentClass::Neutral,
            s if s <= 75.0 => SentimentClass::Greed,
            _ => SentimentClass::ExtremeGreed,
        }
    }
}

/// Market-wide sentiment index value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    /// Score between 0 (extreme fear) and 100 (extreme greed)
    pub score: f64,
    pub classification: SentimentClass,
    /// When the vendor last updated the index
    pub updated_at: Option<DateTime<Utc>>,
}

impl SentimentReading {
    /// Builds a reading, clamping the score and deriving its class
    pub fn from_score(score: f64, updated_at: Option<DateTime<Utc>>) -> Self {
        let score = score.clamp(0.0, 100.0);
        Self {
            score,
            classification: SentimentClass::from_score(score),
            updated_at,
        }
    }

    pub fn neutral() -> Self {
        Self::from_score(50.0, None)
    }
}

/// One news headline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    /// Publisher name
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}

/// Headlines matching a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsFeed {
    pub query: String,
    pub items: Vec<NewsItem>,
}

/// One large on-chain transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleTransaction {
    pub hash: String,
    pub blockchain: String,
    pub symbol: String,
    /// Amount in native units
    pub amount: f64,
    pub amount_usd: f64,
    pub from: Option<String>,
    pub to: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Recent whale transfers above a USD threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleActivity {
    pub symbol: Option<String>,
    pub min_value_usd: f64,
    pub transactions: Vec<WhaleTransaction>,
}

/// Explorer lookup of an address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainLookup {
    pub chain: Chain,
    pub address: String,
    /// Balance in native coin units
    pub balance: f64,
    pub tx_count: Option<u64>,
}

/// Normalized payload produced by every provider adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CanonicalPayload {
    Market(MarketQuote),
    Sentiment(SentimentReading),
    News(NewsFeed),
    Whale(WhaleActivity),
    Chain(ChainLookup),
}

impl CanonicalPayload {
    /// Category whose shape this payload has
    pub fn category(&self) -> Category {
        match self {
            CanonicalPayload::Market(_) => Category::Market,
            CanonicalPayload::Sentiment(_) => Category::Sentiment,
            CanonicalPayload::News(_) => Category::News,
            CanonicalPayload::Whale(_) => Category::Whale,
            CanonicalPayload::Chain(_) => Category::Blockchain,
        }
    }
}

/// Result returned to callers of the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResult {
    pub category: Category,
    pub payload: CanonicalPayload,
    /// Provider that produced the payload; `None` for fallback defaults
    pub source_provider: Option<String>,
    /// True when the payload is the category default, not real data
    pub is_fallback: bool,
    /// When the payload was produced
    pub as_of: DateTime<Utc>,
}

impl CanonicalResult {
    /// Wraps a payload served by a provider
    pub fn from_provider(payload: CanonicalPayload, provider: &str) -> Self {
        Self {
            category: payload.category(),
            payload,
            source_provider: Some(provider.to_string()),
            is_fallback: false,
            as_of: Utc::now(),
        }
    }

    /// Builds the category default for a failed resolution
    pub fn fallback(category: Category, params: &RequestParams) -> Self {
        Self {
            category,
            payload: category.fallback_payload(params),
            source_provider: None,
            is_fallback: true,
            as_of: Utc::now(),
        }
    }

    pub fn as_market(&self) -> Option<&MarketQuote> {
        match &self.payload {
            CanonicalPayload::Market(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_sentiment(&self) -> Option<&SentimentReading> {
        match &self.payload {
            CanonicalPayload::Sentiment(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_news(&self) -> Option<&NewsFeed> {
        match &self.payload {
            CanonicalPayload::News(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_whale(&self) -> Option<&WhaleActivity> {
        match &self.payload {
            CanonicalPayload::Whale(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_chain(&self) -> Option<&ChainLookup> {
        match &self.payload {
            CanonicalPayload::Chain(c) => Some(c),
            _ => None,
        }
    }
}

/// Feed events for dashboards and audit logs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedEvent {
    /// A request was answered with real data
    Resolved {
        id: Uuid,
        category: Category,
        provider: String,
        from_cache: bool,
        timestamp: DateTime<Utc>,
    },

    /// Every provider failed and the category default was served
    FallbackServed {
        id: Uuid,
        category: Category,
        failures: Vec<(String, ErrorKind)>,
        timestamp: DateTime<Utc>,
    },
}

impl FeedEvent {
    /// Get the event ID
    pub fn id(&self) -> Uuid {
        match self {
            FeedEvent::Resolved { id, .. } => *id,
            FeedEvent::FallbackServed { id, .. } => *id,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::Resolved { .. } => "RESOLVED",
            FeedEvent::FallbackServed { .. } => "FALLBACK_SERVED",
        }
    }
}

impl std::fmt::Display for FeedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedEvent::Resolved {
                category,
                provider,
                from_cache,
                ..
            } => {
                let via = if *from_cache { " (cached)" } else { "" };
                write!(f, "{} resolved by {}{}", category, provider, via)
            }
            FeedEvent::FallbackServed {
                category, failures, ..
            } => {
                write!(
                    f,
                    "{} fell back to {} after {} failures",
                    category,
                    FALLBACK_SOURCE,
                    failures.len()
                )
            }
        }
    }
}

/// Overall system health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every provider circuit is closed
    Healthy,
    /// Some providers are open or probing, each category still has a candidate
    Degraded,
    /// At least one category has no provider that can be tried
    Unhealthy,
}

/// Health of a single provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub name: String,
    pub categories: Vec<Category>,
    pub circuit: CircuitStatus,
    pub consecutive_failures: u32,
    pub tokens_remaining: f64,
    /// Attempts in the metrics window (gate rejections excluded)
    pub requests: u64,
    /// Gate rejections in the metrics window
    pub rejected: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
}

/// Read-only health summary for operational dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub providers: Vec<ProviderHealth>,
    pub cache_entries: usize,
    /// Fallback defaults served since startup
    pub fallbacks_served: u64,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Looks up one provider's health by name
    pub fn provider(&self, name: &str) -> Option<&ProviderHealth> {
        self.providers.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_bands() {
        assert_eq!(SentimentClass::from_score(10.0), SentimentClass::ExtremeFear);
        assert_eq!(SentimentClass::from_score(40.0), SentimentClass::Fear);
        assert_eq!(SentimentClass::from_score(50.0), SentimentClass::Neutral);
        assert_eq!(SentimentClass::from_score(70.0), SentimentClass::Greed);
        assert_eq!(SentimentClass::from_score(90.0), SentimentClass::ExtremeGreed);
        assert_eq!(SentimentReading::from_score(140.0, None).score, 100.0);
    }

    #[test]
    fn test_category_parsing_accepts_aliases() {
        assert_eq!("market_data".parse::<Category>(), Ok(Category::Market));
        assert_eq!(" Whale_Activity ".parse::<Category>(), Ok(Category::Whale));
        assert_eq!(
            "blockchain_lookup".parse::<Category>(),
            Ok(Category::Blockchain)
        );
        assert!("weather".parse::<Category>().is_err());
    }

    #[test]
    fn test_asset_lookup() {
        assert_eq!("btc".parse::<Asset>(), Ok(Asset::BTC));
        assert_eq!(Asset::WETH.hyperliquid_symbol(), Some("ETH"));
        assert_eq!(Asset::USDC.hyperliquid_symbol(), None);
        assert!("doge".parse::<Asset>().is_err());
    }

    #[test]
    fn test_fallback_payloads() {
        let params = RequestParams::new().with("symbol", "btc");
        let market = CanonicalResult::fallback(Category::Market, &params);
        assert!(market.is_fallback);
        assert!(market.source_provider.is_none());
        assert_eq!(market.as_market().map(|q| q.symbol.as_str()), Some("BTC"));

        let sentiment = CanonicalResult::fallback(Category::Sentiment, &params);
        let reading = sentiment.as_sentiment().unwrap();
        assert_eq!(reading.score, 50.0);
        assert_eq!(reading.classification, SentimentClass::Neutral);

        let news = CanonicalResult::fallback(Category::News, &params);
        assert!(news.as_news().unwrap().items.is_empty());

        let lookup = CanonicalResult::fallback(
            Category::Blockchain,
            &RequestParams::new()
                .with("chain", "solana")
                .with("address", "abc"),
        );
        let chain = lookup.as_chain().unwrap();
        assert_eq!(chain.chain, Chain::Solana);
        assert_eq!(chain.address, "abc");
        assert_eq!(chain.balance, 0.0);
    }

    #[test]
    fn test_chain_unit_conversion() {
        assert_eq!(Chain::Bitcoin.to_native(150_000_000.0), 1.5);
        assert_eq!(Chain::Solana.to_native(2_000_000_000.0), 2.0);
    }
}
