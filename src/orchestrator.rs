//! Per-category resolution with caching and fallback
//!
//! The orchestrator owns the shared limiter, breaker, cache and metrics, and
//! injects them into every [`GuardedProvider`]. Nothing here is global; build
//! one orchestrator per process and share it behind an `Arc`.

use crate::{
    cache::ResponseCache,
    circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitStatus},
    config::{FeedConfig, TtlConfig},
    constants::{
        DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_SWEEP_INTERVAL_SECS, DEFAULT_METRICS_RETENTION,
        EVENT_CHANNEL_CAPACITY, FALLBACK_SOURCE, REQUEST_TIMEOUT_SECS,
    },
    error::{ConfigError, ErrorKind, FailedAttempt, ResolveError},
    metrics::{MetricRecord, MetricsCollector, ServeMethod},
    provider::{GuardedProvider, ProviderAdapter},
    rate_limiter::{RateLimitConfig, RateLimiter},
    request::RequestParams,
    types::{
        CanonicalResult, Category, FeedEvent, HealthReport, HealthStatus, ProviderHealth,
        ProviderIdentity,
    },
};
use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Resolves category requests against ordered provider chains
///
/// # Example
/// ```no_run
/// use market_feed_sdk::{Category, FeedConfig, Orchestrator, RequestParams};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let orchestrator = Orchestrator::from_config(&FeedConfig::default())?;
/// let btc = orchestrator
///     .resolve(Category::Market, &RequestParams::new().with("symbol", "BTC"))
///     .await;
/// if let Some(quote) = btc.as_market() {
///     println!("BTC: ${:.2} (fallback: {})", quote.price_usd, btc.is_fallback);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    chains: HashMap<Category, Vec<GuardedProvider>>,
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsCollector>,
    ttls: TtlConfig,
    sweep_interval: Duration,
    event_tx: broadcast::Sender<FeedEvent>,
}

impl Orchestrator {
    /// Starts an empty builder
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Builds an orchestrator from configuration
    ///
    /// Disabled providers and providers whose required credential is missing
    /// are skipped; the latter with a warning.
    pub fn from_config(config: &FeedConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut builder = Self::builder()
            .ttls(config.cache.ttl_secs.clone())
            .cache_max_entries(config.cache.max_entries)
            .sweep_interval(Duration::from_secs(config.cache.sweep_interval_secs))
            .metrics_retention(config.metrics.retention);

        for provider in &config.providers {
            if !provider.enabled {
                debug!(provider = %provider.name, "Provider disabled");
                continue;
            }

            let kind = provider.kind()?;
            if !provider.has_required_key() {
                warn!(
                    provider = %provider.name,
                    env = provider
                        .api_key_env
                        .as_deref()
                        .or(kind.default_api_key_env())
                        .unwrap_or_default(),
                    "Skipping provider without API key"
                );
                continue;
            }

            let adapter = kind.build(provider.base_url.as_deref(), provider.resolve_api_key())?;
            let name = adapter.provider_name();
            builder = builder
                .timeout(name, provider.timeout())
                .rate_limit(name, provider.rate_limit.clone())
                .circuit(name, CircuitConfig::from(&provider.circuit));
            for route in &provider.routes {
                builder = builder.route(route.category, route.priority, adapter.clone());
            }
        }

        builder.build()
    }

    /// Resolves a request, never failing
    ///
    /// Returns the cached result when fresh, else the first provider success
    /// in priority order, else the category default tagged `is_fallback`.
    pub async fn resolve(&self, category: Category, params: &RequestParams) -> CanonicalResult {
        self.resolve_with(category, params, None).await
    }

    /// Like [`resolve`](Self::resolve) with an outer deadline across the chain
    ///
    /// When the deadline expires the in-flight attempt is cancelled (and
    /// recorded as a failure) and the fallback is returned.
    pub async fn resolve_within(
        &self,
        category: Category,
        params: &RequestParams,
        deadline: Duration,
    ) -> CanonicalResult {
        self.resolve_with(category, params, Some(deadline)).await
    }

    /// Resolves a request, surfacing exhaustion as an error instead of
    /// serving the fallback
    pub async fn resolve_strict(
        &self,
        category: Category,
        params: &RequestParams,
    ) -> Result<CanonicalResult, ResolveError> {
        self.resolve_inner(category, params, None).await
    }

    /// Resolves independent requests concurrently, preserving input order
    pub async fn resolve_many(
        &self,
        requests: &[(Category, RequestParams)],
    ) -> Vec<CanonicalResult> {
        join_all(
            requests
                .iter()
                .map(|(category, params)| self.resolve(*category, params)),
        )
        .await
    }

    async fn resolve_with(
        &self,
        category: Category,
        params: &RequestParams,
        deadline: Option<Duration>,
    ) -> CanonicalResult {
        match self.resolve_inner(category, params, deadline).await {
            Ok(result) => result,
            Err(err) => self.serve_fallback(category, params, err),
        }
    }

    #[instrument(level = "debug", skip_all, fields(%category))]
    async fn resolve_inner(
        &self,
        category: Category,
        params: &RequestParams,
        deadline: Option<Duration>,
    ) -> Result<CanonicalResult, ResolveError> {
        let fingerprint = params.fingerprint(category);

        if let Some(hit) = self.cache.get(&fingerprint).await {
            debug!(%fingerprint, "Cache hit");
            self.metrics.record_served(category, ServeMethod::Cache);
            self.emit(FeedEvent::Resolved {
                id: Uuid::new_v4(),
                category,
                provider: hit.source_provider.clone().unwrap_or_default(),
                from_cache: true,
                timestamp: Utc::now(),
            });
            return Ok(hit);
        }

        let started = Instant::now();
        let chain = match self.chains.get(&category).filter(|c| !c.is_empty()) {
            Some(chain) => chain,
            None => {
                self.record_exhausted(category, started);
                return Err(ResolveError::NoProviders { category });
            }
        };

        let mut attempts = Vec::new();
        let outcome = {
            let run = Self::try_chain(chain, params, &mut attempts);
            match deadline {
                Some(deadline) => tokio::time::timeout(deadline, run)
                    .await
                    .map_err(|_| ResolveError::DeadlineExceeded { category, deadline }),
                None => Ok(run.await),
            }
        };

        match outcome {
            Ok(Some(result)) => {
                self.cache
                    .put(fingerprint, result.clone(), self.ttls.ttl(category))
                    .await;
                self.metrics.record_served(category, ServeMethod::Provider);
                self.emit(FeedEvent::Resolved {
                    id: Uuid::new_v4(),
                    category,
                    provider: result.source_provider.clone().unwrap_or_default(),
                    from_cache: false,
                    timestamp: Utc::now(),
                });
                Ok(result)
            }
            Ok(None) => {
                self.record_exhausted(category, started);
                Err(ResolveError::Exhausted { category, attempts })
            }
            Err(err) => {
                self.record_exhausted(category, started);
                Err(err)
            }
        }
    }

    /// Tries each provider in order until one succeeds
    async fn try_chain(
        chain: &[GuardedProvider],
        params: &RequestParams,
        attempts: &mut Vec<FailedAttempt>,
    ) -> Option<CanonicalResult> {
        for provider in chain {
            match provider.fetch(params).await {
                Ok(payload) => {
                    debug!(provider = provider.name(), "Provider succeeded");
                    return Some(CanonicalResult::from_provider(payload, provider.name()));
                }
                Err(e) => {
                    debug!(provider = provider.name(), error = %e, "Trying next provider");
                    attempts.push(FailedAttempt {
                        provider: provider.name().to_string(),
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }
        None
    }

    fn record_exhausted(&self, category: Category, started: Instant) {
        self.metrics.record(MetricRecord::failure(
            FALLBACK_SOURCE,
            category,
            started.elapsed(),
            ErrorKind::Exhausted,
        ));
    }

    fn serve_fallback(
        &self,
        category: Category,
        params: &RequestParams,
        err: ResolveError,
    ) -> CanonicalResult {
        warn!(%category, error = %err, "Serving fallback default");

        let failures = match &err {
            ResolveError::Exhausted { attempts, .. } => attempts
                .iter()
                .map(|a| (a.provider.clone(), a.kind))
                .collect(),
            _ => Vec::new(),
        };

        self.metrics.record_served(category, ServeMethod::Fallback);
        self.emit(FeedEvent::FallbackServed {
            id: Uuid::new_v4(),
            category,
            failures,
            timestamp: Utc::now(),
        });

        CanonicalResult::fallback(category, params)
    }

    fn emit(&self, event: FeedEvent) {
        // No receivers is fine
        let _ = self.event_tx.send(event);
    }

    /// Subscribes to resolution events
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.event_tx.subscribe()
    }

    /// Drops the cached result for a request
    pub async fn invalidate(&self, category: Category, params: &RequestParams) -> bool {
        self.cache.invalidate(&params.fingerprint(category)).await
    }

    /// Refills a provider's bucket and closes its circuit
    pub fn reset_provider(&self, name: &str) {
        info!(provider = name, "Resetting provider state");
        self.limiter.reset(name);
        self.breaker.reset(name);
    }

    /// Resets every bucket and circuit
    pub fn reset_all(&self) {
        info!("Resetting all provider state");
        self.limiter.reset_all();
        self.breaker.reset_all();
    }

    /// Spawns the periodic cache sweep
    pub fn start_cache_sweeper(&self) -> JoinHandle<()> {
        self.cache.spawn_sweeper(self.sweep_interval)
    }

    /// Providers of a category, in the order they are tried
    pub fn chain(&self, category: Category) -> Vec<&ProviderIdentity> {
        self.chains
            .get(&category)
            .map(|chain| chain.iter().map(GuardedProvider::identity).collect())
            .unwrap_or_default()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Perform a health check over every configured provider
    pub async fn health(&self) -> HealthReport {
        let mut categories_by_provider: BTreeMap<&str, Vec<Category>> = BTreeMap::new();
        for (category, chain) in &self.chains {
            for provider in chain {
                categories_by_provider
                    .entry(provider.name())
                    .or_default()
                    .push(*category);
            }
        }

        let providers: Vec<ProviderHealth> = categories_by_provider
            .into_iter()
            .map(|(name, mut categories)| {
                categories.sort();
                let summary = self.metrics.summary(Some(name), None);
                ProviderHealth {
                    name: name.to_string(),
                    categories,
                    circuit: self.breaker.status(name),
                    consecutive_failures: self.breaker.consecutive_failures(name),
                    tokens_remaining: self.limiter.remaining_tokens(name),
                    requests: summary.count,
                    rejected: summary.rejected,
                    success_rate: summary.success_rate,
                    avg_latency_ms: summary.avg_duration_ms,
                    latency_p50_ms: summary.latency_p50_ms,
                    latency_p99_ms: summary.latency_p99_ms,
                }
            })
            .collect();

        let status = self.overall_status(&providers);
        let fallbacks_served = Category::all()
            .iter()
            .map(|c| self.metrics.served(*c).fallback)
            .sum();

        HealthReport {
            status,
            providers,
            cache_entries: self.cache.len().await,
            fallbacks_served,
            checked_at: Utc::now(),
        }
    }

    /// Unhealthy when some configured category has every circuit open,
    /// degraded when any circuit is not closed
    fn overall_status(&self, providers: &[ProviderHealth]) -> HealthStatus {
        let circuit_of = |name: &str| {
            providers
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.circuit)
                .unwrap_or(CircuitStatus::Closed)
        };

        if self.chains.values().all(|chain| chain.is_empty()) {
            return HealthStatus::Unhealthy;
        }

        let category_down = self.chains.values().any(|chain| {
            !chain.is_empty()
                && chain
                    .iter()
                    .all(|p| circuit_of(p.name()) == CircuitStatus::Open)
        });
        if category_down {
            return HealthStatus::Unhealthy;
        }

        if providers.iter().any(|p| p.circuit != CircuitStatus::Closed) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Explicit wiring for an [`Orchestrator`]
pub struct OrchestratorBuilder {
    routes: Vec<(Category, u32, Arc<dyn ProviderAdapter>)>,
    timeouts: HashMap<String, Duration>,
    rate_limits: HashMap<String, RateLimitConfig>,
    circuits: HashMap<String, CircuitConfig>,
    ttls: TtlConfig,
    cache_max_entries: usize,
    metrics_retention: usize,
    sweep_interval: Duration,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            timeouts: HashMap::new(),
            rate_limits: HashMap::new(),
            circuits: HashMap::new(),
            ttls: TtlConfig::default(),
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            metrics_retention: DEFAULT_METRICS_RETENTION,
            sweep_interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
        }
    }

    /// Adds `adapter` to the chain for `category`; lower priorities go first
    pub fn route(
        mut self,
        category: Category,
        priority: u32,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Self {
        self.routes.push((category, priority, adapter));
        self
    }

    /// Per-call timeout for a provider
    pub fn timeout(mut self, provider: &str, timeout: Duration) -> Self {
        self.timeouts.insert(provider.to_string(), timeout);
        self
    }

    pub fn rate_limit(mut self, provider: &str, config: RateLimitConfig) -> Self {
        self.rate_limits.insert(provider.to_string(), config);
        self
    }

    pub fn circuit(mut self, provider: &str, config: CircuitConfig) -> Self {
        self.circuits.insert(provider.to_string(), config);
        self
    }

    pub fn ttls(mut self, ttls: TtlConfig) -> Self {
        self.ttls = ttls;
        self
    }

    pub fn cache_max_entries(mut self, max_entries: usize) -> Self {
        self.cache_max_entries = max_entries;
        self
    }

    pub fn metrics_retention(mut self, retention: usize) -> Self {
        self.metrics_retention = retention;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Wires the chains
    ///
    /// Fails when an adapter is routed to a category it does not serve.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let limiter = Arc::new(RateLimiter::new());
        let breaker = Arc::new(CircuitBreaker::new());
        let metrics = Arc::new(MetricsCollector::with_retention(self.metrics_retention));

        for (provider, config) in self.rate_limits {
            limiter.configure(&provider, config);
        }
        for (provider, config) in self.circuits {
            breaker.configure(&provider, config);
        }

        let mut chains: HashMap<Category, Vec<GuardedProvider>> = HashMap::new();
        for (category, priority, adapter) in self.routes {
            let name = adapter.provider_name();
            if !adapter.categories().contains(&category) {
                return Err(ConfigError::UnsupportedRoute {
                    provider: name.to_string(),
                    category,
                });
            }

            let timeout = self
                .timeouts
                .get(name)
                .copied()
                .unwrap_or(Duration::from_secs(REQUEST_TIMEOUT_SECS));
            chains.entry(category).or_default().push(GuardedProvider::new(
                ProviderIdentity::new(name, category, priority),
                adapter,
                timeout,
                limiter.clone(),
                breaker.clone(),
                metrics.clone(),
            ));
        }

        for (category, chain) in chains.iter_mut() {
            // Stable: equal priorities keep registration order
            chain.sort_by_key(GuardedProvider::priority);
            info!(
                %category,
                providers = ?chain.iter().map(GuardedProvider::name).collect::<Vec<_>>(),
                "Configured provider chain"
            );
        }

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Orchestrator {
            chains,
            cache: Arc::new(ResponseCache::with_max_entries(self.cache_max_entries)),
            limiter,
            breaker,
            metrics,
            ttls: self.ttls,
            sweep_interval: self.sweep_interval,
            event_tx,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
