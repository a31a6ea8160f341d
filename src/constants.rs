//! Constants for the market feed orchestrator
//!
//! Defaults used when a value is absent from the TOML configuration, plus
//! the public base URLs of every bundled provider.

/// HTTP request timeout per provider call (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default token bucket capacity for providers without explicit limits
pub const DEFAULT_RATE_LIMIT_CAPACITY: f64 = 5.0;

/// Default token refill rate (tokens per second)
pub const DEFAULT_REFILL_PER_SECOND: f64 = 1.0;

/// Consecutive failures before a provider circuit opens
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Seconds an open circuit waits before admitting a trial call
pub const DEFAULT_RECOVERY_TIMEOUT_SECS: u64 = 60;

/// Number of metric records retained by the collector
pub const DEFAULT_METRICS_RETENTION: usize = 1_000;

/// Upper bound on cached responses
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// How often the background sweeper purges expired cache entries (in seconds)
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Cache TTLs per category (in seconds)
pub const MARKET_TTL_SECS: u64 = 30;
pub const SENTIMENT_TTL_SECS: u64 = 300;
pub const NEWS_TTL_SECS: u64 = 120;
pub const WHALE_TTL_SECS: u64 = 60;
pub const BLOCKCHAIN_TTL_SECS: u64 = 30;

/// Capacity of the feed event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Provider name used for aggregated exhaustion metrics
pub const FALLBACK_SOURCE: &str = "fallback";

/// Default whale transaction threshold (USD)
pub const DEFAULT_WHALE_MIN_VALUE_USD: f64 = 500_000.0;

/// Default number of news items requested per call
pub const DEFAULT_NEWS_LIMIT: usize = 20;

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko API endpoint for simple price queries
pub const COINGECKO_SIMPLE_PRICE_ENDPOINT: &str = "/simple/price";

/// Hyperliquid API base URL
pub const HYPERLIQUID_API_URL: &str = "https://api.hyperliquid.xyz";

/// Alternative.me Fear & Greed API base URL
pub const ALTERNATIVE_ME_API_URL: &str = "https://api.alternative.me";

/// CoinMarketCap Pro API base URL
pub const COINMARKETCAP_API_URL: &str = "https://pro-api.coinmarketcap.com";

/// CryptoPanic API base URL
pub const CRYPTOPANIC_API_URL: &str = "https://cryptopanic.com/api/v1";

/// NewsAPI base URL
pub const NEWSAPI_API_URL: &str = "https://newsapi.org/v2";

/// Whale Alert API base URL
pub const WHALE_ALERT_API_URL: &str = "https://api.whale-alert.io/v1";

/// Blockchair API base URL
pub const BLOCKCHAIR_API_URL: &str = "https://api.blockchair.com";

/// Etherscan API base URL
pub const ETHERSCAN_API_URL: &str = "https://api.etherscan.io/api";

/// Solana mainnet JSON-RPC endpoint
pub const SOLANA_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "market-feed-sdk/0.1.0";
