//! # Market Feed SDK
//!
//! Resilient access to crypto market data: prices, sentiment, news, whale
//! transfers and on-chain balances, each served by an ordered chain of
//! third-party providers.
//!
//! Every provider call passes through a per-provider rate limiter and circuit
//! breaker and is timed into a metrics collector. Successful results are
//! cached per request fingerprint for a category TTL. When every provider of
//! a category fails, callers get a well-formed default flagged `is_fallback`
//! instead of an error.
//!
//! ## Usage
//!
//! ```no_run
//! use market_feed_sdk::{Category, FeedConfig, Orchestrator, RequestParams};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FeedConfig::load("feed.toml")?;
//! config.logging.init();
//!
//! let orchestrator = Orchestrator::from_config(&config)?;
//! let _sweeper = orchestrator.start_cache_sweeper();
//!
//! let sol = orchestrator
//!     .resolve(Category::Market, &RequestParams::new().with("symbol", "SOL"))
//!     .await;
//! if let Some(quote) = sol.as_market() {
//!     println!("SOL: ${:.2}", quote.price_usd);
//! }
//!
//! let health = orchestrator.health().await;
//! println!("status: {:?}", health.status);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod metrics;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod rate_limiter;
pub mod request;
pub mod types;

// Re-export commonly used types
pub use cache::ResponseCache;
pub use circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitStatus};
pub use config::FeedConfig;
pub use error::{ConfigError, ErrorKind, ProviderError, ResolveError};
pub use metrics::{MetricRecord, MetricsCollector, MetricsSummary};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use provider::{GuardedProvider, ProviderAdapter};
pub use providers::ProviderKind;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use request::{Fingerprint, RequestParams};
pub use types::{
    Asset, CanonicalPayload, CanonicalResult, Category, Chain, FeedEvent, HealthReport,
    HealthStatus, ProviderHealth,
};
