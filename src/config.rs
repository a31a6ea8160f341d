//! Configuration loading and validation
//!
//! [`FeedConfig`] is read from a TOML file. Credentials should come from the
//! environment (a `.env` file is honoured): each provider names the variable
//! holding its key with `api_key_env`, defaulting to the conventional name
//! for the bundled adapter.
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [cache]
//! sweep_interval_secs = 60
//!
//! [cache.ttl_secs]
//! market = 30
//! sentiment = 300
//!
//! [[providers]]
//! name = "coingecko"
//! timeout_secs = 5
//! rate_limit = { capacity = 10.0, refill_per_second = 0.5 }
//! circuit = { failure_threshold = 5, recovery_timeout_secs = 60 }
//! routes = [{ category = "market", priority = 0 }]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use crate::circuit_breaker::CircuitConfig;
use crate::constants::{
    BLOCKCHAIN_TTL_SECS, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_METRICS_RETENTION, DEFAULT_RECOVERY_TIMEOUT_SECS,
    MARKET_TTL_SECS, NEWS_TTL_SECS, REQUEST_TIMEOUT_SECS, SENTIMENT_TTL_SECS, WHALE_TTL_SECS,
};
use crate::error::ConfigError;
use crate::providers::{KeyRequirement, ProviderKind};
use crate::rate_limiter::RateLimitConfig;
use crate::types::Category;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl LoggingConfig {
    /// Installs the global tracing subscriber
    ///
    /// A subscriber installed earlier (by the host application or a previous
    /// call) is left in place.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        let installed = match self.format.as_str() {
            "json" => fmt().json().with_env_filter(filter).try_init(),
            _ => fmt().with_env_filter(filter).try_init(),
        };

        if let Err(e) = installed {
            debug!("Tracing subscriber already installed: {}", e);
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

/// Cache TTL per category, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub market: u64,
    pub sentiment: u64,
    pub news: u64,
    pub whale: u64,
    pub blockchain: u64,
}

impl TtlConfig {
    pub fn secs(&self, category: Category) -> u64 {
        match category {
            Category::Market => self.market,
            Category::Sentiment => self.sentiment,
            Category::News => self.news,
            Category::Whale => self.whale,
            Category::Blockchain => self.blockchain,
        }
    }

    pub fn ttl(&self, category: Category) -> Duration {
        Duration::from_secs(self.secs(category))
    }
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            market: MARKET_TTL_SECS,
            sentiment: SENTIMENT_TTL_SECS,
            news: NEWS_TTL_SECS,
            whale: WHALE_TTL_SECS,
            blockchain: BLOCKCHAIN_TTL_SECS,
        }
    }
}

/// Response cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub sweep_interval_secs: u64,
    pub max_entries: usize,
    pub ttl_secs: TtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            ttl_secs: TtlConfig::default(),
        }
    }
}

/// Metrics window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Records kept in the rolling window
    pub retention: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_METRICS_RETENTION,
        }
    }
}

/// Circuit breaker settings for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout_secs: DEFAULT_RECOVERY_TIMEOUT_SECS,
        }
    }
}

impl From<&CircuitSettings> for CircuitConfig {
    fn from(settings: &CircuitSettings) -> Self {
        CircuitConfig::new(
            settings.failure_threshold,
            Duration::from_secs(settings.recovery_timeout_secs),
        )
    }
}

/// Position of a provider within one category chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub category: Category,
    /// Lower values are tried first
    #[serde(default)]
    pub priority: u32,
}

impl RouteConfig {
    pub fn new(category: Category, priority: u32) -> Self {
        Self { category, priority }
    }
}

/// One `[[providers]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Bundled adapter name
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the adapter's public endpoint
    #[serde(default)]
    pub base_url: Option<String>,
    /// Inline credential; prefer `api_key_env`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Environment variable holding the credential
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub circuit: CircuitSettings,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    REQUEST_TIMEOUT_SECS
}

impl ProviderConfig {
    /// Entry for a bundled adapter with default limits
    pub fn new(kind: ProviderKind, routes: Vec<RouteConfig>) -> Self {
        Self {
            name: kind.name().to_string(),
            enabled: true,
            base_url: None,
            api_key: None,
            api_key_env: None,
            timeout_secs: REQUEST_TIMEOUT_SECS,
            rate_limit: RateLimitConfig::default(),
            circuit: CircuitSettings::default(),
            routes,
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn kind(&self) -> Result<ProviderKind, ConfigError> {
        self.name.parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Credential from the inline value, else the configured or conventional
    /// environment variable. Empty values count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Some(key.trim().to_string());
        }

        let var = match &self.api_key_env {
            Some(var) => Some(var.as_str()),
            None => self.kind().ok().and_then(|k| k.default_api_key_env()),
        }?;

        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Whether the adapter can be built with the credentials available now
    pub fn has_required_key(&self) -> bool {
        match self.kind().map(|k| k.key_requirement()) {
            Ok(KeyRequirement::Required) => self.resolve_api_key().is_some(),
            Ok(_) => true,
            Err(_) => false,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Replaces the bundled provider table when present
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            cache: CacheConfig::default(),
            metrics: MetricsConfig::default(),
            providers: default_providers(),
        }
    }
}

/// Every bundled adapter, routed in its usual fallback order, with limits
/// taken from each vendor's free-tier quota
fn default_providers() -> Vec<ProviderConfig> {
    use Category::*;
    use ProviderKind::*;

    vec![
        ProviderConfig::new(CoinGecko, vec![RouteConfig::new(Market, 0)])
            .with_rate_limit(RateLimitConfig::per_minute(30, 10.0)),
        ProviderConfig::new(Hyperliquid, vec![RouteConfig::new(Market, 1)])
            .with_rate_limit(RateLimitConfig::new(10.0, 5.0)),
        ProviderConfig::new(AlternativeMe, vec![RouteConfig::new(Sentiment, 0)])
            .with_rate_limit(RateLimitConfig::per_minute(60, 5.0)),
        ProviderConfig::new(CoinMarketCap, vec![RouteConfig::new(Sentiment, 1)])
            .with_rate_limit(RateLimitConfig::per_minute(30, 5.0)),
        ProviderConfig::new(CryptoPanic, vec![RouteConfig::new(News, 0)])
            .with_rate_limit(RateLimitConfig::new(5.0, 1.0)),
        ProviderConfig::new(NewsApi, vec![RouteConfig::new(News, 1)])
            .with_rate_limit(RateLimitConfig::new(5.0, 100.0 / 86_400.0)),
        ProviderConfig::new(WhaleAlert, vec![RouteConfig::new(Whale, 0)])
            .with_rate_limit(RateLimitConfig::per_minute(10, 2.0)),
        ProviderConfig::new(
            Blockchair,
            vec![RouteConfig::new(Whale, 1), RouteConfig::new(Blockchain, 2)],
        )
        .with_rate_limit(RateLimitConfig::per_minute(30, 5.0)),
        ProviderConfig::new(Etherscan, vec![RouteConfig::new(Blockchain, 0)])
            .with_rate_limit(RateLimitConfig::new(5.0, 5.0)),
        ProviderConfig::new(SolanaRpc, vec![RouteConfig::new(Blockchain, 1)])
            .with_rate_limit(RateLimitConfig::new(10.0, 10.0)),
    ]
}

impl FeedConfig {
    /// Parse configuration from a TOML string and validate it
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// Variables from a `.env` file in the working directory are loaded
    /// first so that `api_key_env` lookups can see them.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Validate configuration values
    ///
    /// Missing credentials are not an error here; such providers are skipped
    /// when the orchestrator is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::invalid(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::invalid("cache.sweep_interval_secs must be > 0"));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::invalid("cache.max_entries must be > 0"));
        }
        for category in Category::all() {
            if self.cache.ttl_secs.secs(*category) == 0 {
                return Err(ConfigError::invalid(format!(
                    "cache.ttl_secs.{category} must be > 0"
                )));
            }
        }
        if self.metrics.retention == 0 {
            return Err(ConfigError::invalid("metrics.retention must be > 0"));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            let kind = provider.kind()?;
            if !seen.insert(kind) {
                return Err(ConfigError::invalid(format!(
                    "provider {} is listed twice",
                    provider.name
                )));
            }
            validate_provider(provider, kind)?;
        }

        Ok(())
    }
}

fn validate_provider(provider: &ProviderConfig, kind: ProviderKind) -> Result<(), ConfigError> {
    let name = &provider.name;

    if provider.timeout_secs == 0 {
        return Err(ConfigError::invalid(format!("{name}: timeout_secs must be > 0")));
    }

    let limit = &provider.rate_limit;
    if !limit.capacity.is_finite() || limit.capacity < 1.0 {
        return Err(ConfigError::invalid(format!(
            "{name}: rate_limit.capacity must be at least 1"
        )));
    }
    if !limit.refill_per_second.is_finite() || limit.refill_per_second < 0.0 {
        return Err(ConfigError::invalid(format!(
            "{name}: rate_limit.refill_per_second must be >= 0"
        )));
    }

    if provider.circuit.failure_threshold == 0 {
        return Err(ConfigError::invalid(format!(
            "{name}: circuit.failure_threshold must be > 0"
        )));
    }

    if provider.enabled && provider.routes.is_empty() {
        return Err(ConfigError::invalid(format!("{name}: no routes configured")));
    }

    let mut routed = HashSet::new();
    for route in &provider.routes {
        if !kind.categories().contains(&route.category) {
            return Err(ConfigError::UnsupportedRoute {
                provider: name.clone(),
                category: route.category,
            });
        }
        if !routed.insert(route.category) {
            return Err(ConfigError::invalid(format!(
                "{name}: category {} routed twice",
                route.category
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FeedConfig::default();
        config.validate().unwrap();

        for category in Category::all() {
            assert!(config
                .providers
                .iter()
                .any(|p| p.routes.iter().any(|r| r.category == *category)));
        }
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = FeedConfig::parse_toml("").unwrap();
        assert_eq!(config.providers.len(), ProviderKind::all().len());
        assert_eq!(config.cache.ttl_secs.ttl(Category::Sentiment), Duration::from_secs(300));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [logging]
            level = "debug"
            format = "json"

            [cache]
            max_entries = 50

            [cache.ttl_secs]
            market = 10

            [metrics]
            retention = 200

            [[providers]]
            name = "hyperliquid"
            timeout_secs = 3
            rate_limit = { capacity = 2.0, refill_per_second = 0.0 }
            circuit = { failure_threshold = 2, recovery_timeout_secs = 5 }
            routes = [{ category = "market", priority = 0 }]

            [[providers]]
            name = "coingecko"
            enabled = false
            routes = [{ category = "market", priority = 1 }]
        "#;
        let config = FeedConfig::parse_toml(toml).unwrap();

        assert_eq!(config.logging.format, "json");
        assert_eq!(config.cache.max_entries, 50);
        assert_eq!(config.cache.ttl_secs.market, 10);
        assert_eq!(config.cache.ttl_secs.news, NEWS_TTL_SECS);
        assert_eq!(config.metrics.retention, 200);
        assert_eq!(config.providers.len(), 2);

        let hyperliquid = &config.providers[0];
        assert_eq!(hyperliquid.timeout(), Duration::from_secs(3));
        assert_eq!(hyperliquid.rate_limit.refill_per_second, 0.0);
        assert_eq!(CircuitConfig::from(&hyperliquid.circuit).failure_threshold, 2);
        assert!(!config.providers[1].enabled);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let toml = r#"
            [[providers]]
            name = "binance"
            routes = [{ category = "market" }]
        "#;
        assert!(matches!(
            FeedConfig::parse_toml(toml),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_route_to_unserved_category_rejected() {
        let toml = r#"
            [[providers]]
            name = "etherscan"
            api_key = "k"
            routes = [{ category = "news" }]
        "#;
        assert!(matches!(
            FeedConfig::parse_toml(toml),
            Err(ConfigError::UnsupportedRoute { .. })
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_capacity = r#"
            [[providers]]
            name = "hyperliquid"
            rate_limit = { capacity = 0.0, refill_per_second = 1.0 }
            routes = [{ category = "market" }]
        "#;
        assert!(matches!(
            FeedConfig::parse_toml(zero_capacity),
            Err(ConfigError::Invalid(_))
        ));

        let zero_ttl = "[cache.ttl_secs]\nnews = 0\n";
        assert!(matches!(
            FeedConfig::parse_toml(zero_ttl),
            Err(ConfigError::Invalid(_))
        ));

        assert!(matches!(
            FeedConfig::parse_toml("[logging]\nlevel = \"info\"\nformat = \"xml\"\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            FeedConfig::parse_toml("[cache"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_api_key_resolution() {
        let mut provider = ProviderConfig::new(ProviderKind::Etherscan, vec![]);
        provider.api_key_env = Some("MARKET_FEED_TEST_UNSET_VAR".to_string());
        assert_eq!(provider.resolve_api_key(), None);
        assert!(!provider.has_required_key());

        provider.api_key = Some("  inline  ".to_string());
        assert_eq!(provider.resolve_api_key().as_deref(), Some("inline"));
        assert!(provider.has_required_key());

        let keyless = ProviderConfig::new(ProviderKind::SolanaRpc, vec![]);
        assert!(keyless.has_required_key());
    }
}
