//! Provider abstraction for fetching feed data from external APIs

use crate::{
    circuit_breaker::CircuitBreaker,
    error::{counts_against_circuit, ErrorKind, ProviderError},
    metrics::{MetricRecord, MetricsCollector},
    rate_limiter::RateLimiter,
    request::RequestParams,
    types::{CanonicalPayload, Category, ProviderIdentity},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Trait for feed providers
///
/// Implementations call one vendor API and normalize its response into the
/// canonical payload for the requested category. They do not rate limit,
/// retry or cache; [`GuardedProvider`] and the orchestrator own that.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the name of this provider
    fn provider_name(&self) -> &'static str;

    /// Categories this adapter knows how to serve
    fn categories(&self) -> &'static [Category];

    /// Returns false when the request is known to be unservable
    /// (unknown symbol, unsupported chain, missing parameter)
    ///
    /// Checked before any quota is spent.
    fn supports(&self, category: Category, _params: &RequestParams) -> bool {
        self.categories().contains(&category)
    }

    /// Fetches and normalizes data for one request
    ///
    /// # Arguments
    /// * `category` - The category being resolved
    /// * `params` - Normalized request parameters
    ///
    /// # Returns
    /// A payload whose shape matches `category`, or an error if the fetch fails
    async fn fetch(
        &self,
        category: Category,
        params: &RequestParams,
    ) -> Result<CanonicalPayload, ProviderError>;
}

/// One entry of a category chain: an adapter behind the resilience gates
pub struct GuardedProvider {
    identity: ProviderIdentity,
    adapter: Arc<dyn ProviderAdapter>,
    timeout: Duration,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsCollector>,
}

impl GuardedProvider {
    pub fn new(
        identity: ProviderIdentity,
        adapter: Arc<dyn ProviderAdapter>,
        timeout: Duration,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            identity,
            adapter,
            timeout,
            limiter,
            breaker,
            metrics,
        }
    }

    pub fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn priority(&self) -> u32 {
        self.identity.priority
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetches through the gates
    ///
    /// Order: capability check, rate limiter, circuit breaker, then the
    /// network call under the provider timeout. The outcome of a call that
    /// got past the gates is always reported to the breaker and metrics,
    /// including when this future is dropped mid-flight.
    pub async fn fetch(&self, params: &RequestParams) -> Result<CanonicalPayload, ProviderError> {
        let name = self.name();
        let category = self.identity.category;

        if !self.adapter.supports(category, params) {
            debug!(provider = name, %category, "Request not supported by provider");
            return Err(ProviderError::unsupported(format!(
                "{name} cannot serve this {category} request"
            )));
        }

        if !self.limiter.try_acquire(name) {
            self.record_rejection(ErrorKind::RateLimited);
            return Err(ProviderError::RateLimited);
        }

        if !self.breaker.allow(name) {
            self.record_rejection(ErrorKind::CircuitOpen);
            return Err(ProviderError::CircuitOpen);
        }

        let guard = AttemptGuard::start(self);

        let result = match tokio::time::timeout(self.timeout, self.adapter.fetch(category, params))
            .await
        {
            Ok(Ok(payload)) if payload.category() != category => Err(ProviderError::parse(
                format!(
                    "{name} returned a {} payload for a {category} request",
                    payload.category()
                ),
            )),
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        };

        guard.finish(result.as_ref().map(|_| ()).map_err(ProviderError::kind));
        result
    }

    fn record_rejection(&self, kind: ErrorKind) {
        debug!(provider = self.name(), %kind, "Provider call rejected locally");
        self.metrics.record(MetricRecord::failure(
            self.name(),
            self.identity.category,
            Duration::ZERO,
            kind,
        ));
    }
}

impl std::fmt::Debug for GuardedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedProvider")
            .field("identity", &self.identity)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Reports one attempt to the breaker and metrics when dropped
///
/// A guard dropped without `finish` means the surrounding future was
/// cancelled; that is reported as a `Cancelled` failure.
struct AttemptGuard<'a> {
    provider: &'a GuardedProvider,
    started: Instant,
    outcome: Option<Result<(), ErrorKind>>,
}

impl<'a> AttemptGuard<'a> {
    fn start(provider: &'a GuardedProvider) -> Self {
        Self {
            provider,
            started: Instant::now(),
            outcome: None,
        }
    }

    fn finish(mut self, outcome: Result<(), ErrorKind>) {
        self.outcome = Some(outcome);
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let provider = self.provider;
        let name = provider.name();
        let category = provider.identity.category;
        let outcome = self.outcome.take().unwrap_or(Err(ErrorKind::Cancelled));

        let record = match outcome {
            Ok(()) => {
                provider.breaker.record_outcome(name, true);
                MetricRecord::success(name, category, elapsed)
            }
            Err(kind) if !counts_against_circuit(kind) => {
                debug!(provider = name, %category, %kind, "Provider declined request");
                provider.breaker.release_trial(name);
                MetricRecord::failure(name, category, elapsed, kind)
            }
            Err(kind) => {
                warn!(
                    provider = name,
                    %category,
                    %kind,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Provider attempt failed"
                );
                provider.breaker.record_outcome(name, false);
                MetricRecord::failure(name, category, elapsed, kind)
            }
        };

        provider.metrics.record(record);
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{quote, MockProvider};
    use super::*;
    use crate::circuit_breaker::{CircuitConfig, CircuitStatus};
    use crate::rate_limiter::RateLimitConfig;

    struct Harness {
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<MetricsCollector>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                limiter: Arc::new(RateLimiter::new()),
                breaker: Arc::new(CircuitBreaker::new()),
                metrics: Arc::new(MetricsCollector::new()),
            }
        }

        fn guard(&self, adapter: Arc<MockProvider>, timeout: Duration) -> GuardedProvider {
            GuardedProvider::new(
                ProviderIdentity::new(adapter.provider_name(), Category::Market, 0),
                adapter,
                timeout,
                self.limiter.clone(),
                self.breaker.clone(),
                self.metrics.clone(),
            )
        }
    }

    fn params() -> RequestParams {
        RequestParams::new().with("symbol", "BTC")
    }

    #[tokio::test]
    async fn test_success_is_recorded() {
        let harness = Harness::new();
        let adapter = Arc::new(MockProvider::market("mock", 42.0));
        let provider = harness.guard(adapter.clone(), Duration::from_secs(1));

        let payload = provider.fetch(&params()).await.unwrap();
        assert_eq!(payload, quote(42.0));

        let summary = harness.metrics.summary(Some("mock"), None);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.successes, 1);
    }

    #[tokio::test]
    async fn test_rate_limited_call_never_reaches_adapter() {
        let harness = Harness::new();
        harness
            .limiter
            .configure("mock", RateLimitConfig::new(1.0, 0.0));
        let adapter = Arc::new(MockProvider::market("mock", 1.0));
        let provider = harness.guard(adapter.clone(), Duration::from_secs(1));

        assert!(provider.fetch(&params()).await.is_ok());
        assert_eq!(
            provider.fetch(&params()).await,
            Err(ProviderError::RateLimited)
        );
        assert_eq!(adapter.call_count(), 1);

        let summary = harness.metrics.summary(Some("mock"), None);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(harness.breaker.consecutive_failures("mock"), 0);
    }

    #[tokio::test]
    async fn test_open_circuit_rejects() {
        let harness = Harness::new();
        harness
            .breaker
            .configure("mock", CircuitConfig::new(2, Duration::from_secs(60)));
        let adapter = Arc::new(MockProvider::failing(
            "mock",
            ProviderError::http("connection reset"),
        ));
        let provider = harness.guard(adapter.clone(), Duration::from_secs(1));

        for _ in 0..2 {
            assert!(matches!(
                provider.fetch(&params()).await,
                Err(ProviderError::Http { .. })
            ));
        }
        assert_eq!(harness.breaker.status("mock"), CircuitStatus::Open);

        assert_eq!(
            provider.fetch(&params()).await,
            Err(ProviderError::CircuitOpen)
        );
        assert_eq!(adapter.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let harness = Harness::new();
        let adapter = Arc::new(MockProvider::market("slow", 1.0));
        adapter.set_delay(Duration::from_secs(5));
        let provider = harness.guard(adapter, Duration::from_secs(1));

        assert_eq!(provider.fetch(&params()).await, Err(ProviderError::Timeout));
        assert_eq!(harness.breaker.consecutive_failures("slow"), 1);

        let records = harness.metrics.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_kind, Some(ErrorKind::Timeout));
        assert!(records[0].duration_ms >= 1000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_call_is_recorded_as_cancelled() {
        let harness = Harness::new();
        let adapter = Arc::new(MockProvider::market("slow", 1.0));
        adapter.set_delay(Duration::from_secs(5));
        let provider = harness.guard(adapter, Duration::from_secs(10));

        let outcome =
            tokio::time::timeout(Duration::from_secs(1), provider.fetch(&params())).await;
        assert!(outcome.is_err());

        let records = harness.metrics.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_kind, Some(ErrorKind::Cancelled));
        assert_eq!(harness.breaker.consecutive_failures("slow"), 1);
    }

    #[tokio::test]
    async fn test_wrong_payload_shape_is_parse_error() {
        let harness = Harness::new();
        let adapter = Arc::new(MockProvider::new(
            "confused",
            &[Category::Market],
            Ok(CanonicalPayload::Sentiment(
                crate::types::SentimentReading::neutral(),
            )),
        ));
        let provider = harness.guard(adapter, Duration::from_secs(1));

        assert!(matches!(
            provider.fetch(&params()).await,
            Err(ProviderError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_category_spends_nothing() {
        let harness = Harness::new();
        harness
            .limiter
            .configure("news_only", RateLimitConfig::new(1.0, 0.0));
        let adapter = Arc::new(MockProvider::new(
            "news_only",
            &[Category::News],
            Ok(quote(1.0)),
        ));
        let provider = harness.guard(adapter.clone(), Duration::from_secs(1));

        assert!(matches!(
            provider.fetch(&params()).await,
            Err(ProviderError::Unsupported(_))
        ));
        assert_eq!(adapter.call_count(), 0);
        assert!((harness.limiter.remaining_tokens("news_only") - 1.0).abs() < 0.01);
        assert!(harness.metrics.records().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_from_vendor_keeps_circuit_closed() {
        let harness = Harness::new();
        harness
            .breaker
            .configure("mock", CircuitConfig::new(1, Duration::from_secs(60)));
        let adapter = Arc::new(MockProvider::failing(
            "mock",
            ProviderError::unsupported("unknown symbol"),
        ));
        let provider = harness.guard(adapter, Duration::from_secs(1));

        let _ = provider.fetch(&params()).await;
        let _ = provider.fetch(&params()).await;
        assert_eq!(harness.breaker.status("mock"), CircuitStatus::Closed);

        let summary = harness.metrics.summary(Some("mock"), None);
        assert_eq!(summary.declined, 2);
        assert_eq!(summary.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vendor_decline_does_not_close_half_open_circuit() {
        let harness = Harness::new();
        harness
            .breaker
            .configure("mock", CircuitConfig::new(1, Duration::from_secs(10)));
        let adapter = Arc::new(MockProvider::failing("mock", ProviderError::http("down")));
        let provider = harness.guard(adapter.clone(), Duration::from_secs(1));

        let _ = provider.fetch(&params()).await;
        assert_eq!(harness.breaker.status("mock"), CircuitStatus::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        adapter.push(Err(ProviderError::unsupported("unknown symbol")));
        assert!(matches!(
            provider.fetch(&params()).await,
            Err(ProviderError::Unsupported(_))
        ));
        assert_eq!(harness.breaker.status("mock"), CircuitStatus::HalfOpen);
        assert_eq!(harness.breaker.consecutive_failures("mock"), 1);

        // The trial was handed back, so a real answer still decides the circuit.
        adapter.set_default(Ok(quote(1.0)));
        assert!(provider.fetch(&params()).await.is_ok());
        assert_eq!(harness.breaker.status("mock"), CircuitStatus::Closed);
    }
}
