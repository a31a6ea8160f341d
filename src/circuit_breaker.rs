//! Per-provider circuit breaker.
//!
//! Three states per provider, independent of every other provider:
//!
//! - **Closed**: calls are attempted; consecutive failures are counted.
//! - **Open**: calls are rejected without touching the network until the
//!   recovery timeout has elapsed since the circuit opened.
//! - **HalfOpen**: exactly one trial call is admitted. Its outcome closes the
//!   circuit or re-opens it with a fresh `opened_at`.
//!
//! The breaker is in-memory and resets on process restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT_SECS};

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    /// Normal operation - calls are allowed.
    Closed,
    /// Provider is failing - calls are rejected.
    Open,
    /// Probing recovery - one trial call allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration for a provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time an open circuit waits before admitting a trial call.
    pub recovery_timeout: Duration,
}

impl CircuitConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
        }
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: Duration::from_secs(DEFAULT_RECOVERY_TIMEOUT_SECS),
        }
    }
}

/// Internal circuit state for a single provider.
#[derive(Debug)]
struct Circuit {
    status: CircuitStatus,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    config: CircuitConfig,
}

impl Circuit {
    fn new(config: CircuitConfig) -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
            config,
        }
    }

    fn open(&mut self, now: Instant) {
        self.status = CircuitStatus::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }

    fn close(&mut self) {
        self.status = CircuitStatus::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.trial_in_flight = false;
    }
}

/// Point-in-time view of one provider's circuit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub provider: String,
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    /// Seconds since the circuit last opened, if it is not closed.
    pub open_for_secs: Option<f64>,
}

/// Per-provider circuit breaker registry.
#[derive(Default)]
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    configs: Mutex<HashMap<String, CircuitConfig>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the circuits mutex, recovering from poison if necessary.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, CircuitConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure thresholds for a provider, resetting its circuit.
    pub fn configure(&self, provider: &str, config: CircuitConfig) {
        self.lock_configs().insert(provider.to_string(), config);
        self.lock_circuits().remove(provider);
    }

    fn config_for(&self, provider: &str) -> CircuitConfig {
        self.lock_configs()
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }

    /// Check whether a call to the provider may be attempted now.
    ///
    /// Handles the Open -> HalfOpen transition once the recovery timeout has
    /// elapsed, and hands out the single HalfOpen trial.
    pub fn allow(&self, provider: &str) -> bool {
        let config = self.config_for(provider);
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(|| Circuit::new(config));

        match circuit.status {
            CircuitStatus::Closed => true,
            CircuitStatus::HalfOpen => {
                if circuit.trial_in_flight {
                    debug!(provider, "Circuit half-open, trial already in flight");
                    false
                } else {
                    circuit.trial_in_flight = true;
                    true
                }
            }
            CircuitStatus::Open => {
                let recovered = circuit
                    .opened_at
                    .map(|opened| opened.elapsed() >= circuit.config.recovery_timeout)
                    .unwrap_or(true);

                if recovered {
                    info!(provider, "Circuit transitioning from Open to HalfOpen");
                    circuit.status = CircuitStatus::HalfOpen;
                    circuit.trial_in_flight = true;
                    true
                } else {
                    debug!(provider, "Circuit open, rejecting call");
                    false
                }
            }
        }
    }

    /// Record the outcome of an attempted call.
    pub fn record_outcome(&self, provider: &str, success: bool) {
        let config = self.config_for(provider);
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(|| Circuit::new(config));

        match (circuit.status, success) {
            (CircuitStatus::Closed, true) => {
                circuit.consecutive_failures = 0;
            }
            (CircuitStatus::Closed, false) => {
                circuit.consecutive_failures += 1;
                if circuit.consecutive_failures >= circuit.config.failure_threshold {
                    warn!(
                        provider,
                        failures = circuit.consecutive_failures,
                        "Opening circuit"
                    );
                    circuit.open(Instant::now());
                } else {
                    debug!(
                        provider,
                        failures = circuit.consecutive_failures,
                        threshold = circuit.config.failure_threshold,
                        "Recorded provider failure"
                    );
                }
            }
            (CircuitStatus::HalfOpen, true) => {
                info!(provider, "Trial call succeeded, closing circuit");
                circuit.close();
            }
            (CircuitStatus::HalfOpen, false) => {
                warn!(provider, "Trial call failed, reopening circuit");
                circuit.consecutive_failures += 1;
                circuit.open(Instant::now());
            }
            (CircuitStatus::Open, _) => {
                // Straggler from a call admitted before the circuit opened.
                debug!(provider, success, "Outcome recorded while circuit open");
            }
        }
    }

    /// Hand back a HalfOpen trial without judging the provider.
    ///
    /// Used for answers that are neither a success nor a failure, such as a
    /// vendor declining the request. Counters and status are left as is.
    pub fn release_trial(&self, provider: &str) {
        if let Some(circuit) = self.lock_circuits().get_mut(provider) {
            if circuit.status == CircuitStatus::HalfOpen && circuit.trial_in_flight {
                debug!(provider, "Trial call inconclusive, releasing trial");
                circuit.trial_in_flight = false;
            }
        }
    }

    /// Current status for a provider.
    pub fn status(&self, provider: &str) -> CircuitStatus {
        self.lock_circuits()
            .get(provider)
            .map(|c| c.status)
            .unwrap_or(CircuitStatus::Closed)
    }

    /// Consecutive failures recorded for a provider.
    pub fn consecutive_failures(&self, provider: &str) -> u32 {
        self.lock_circuits()
            .get(provider)
            .map(|c| c.consecutive_failures)
            .unwrap_or(0)
    }

    /// Reset a provider's circuit to Closed.
    pub fn reset(&self, provider: &str) {
        if let Some(circuit) = self.lock_circuits().get_mut(provider) {
            info!(provider, "Manually resetting circuit");
            circuit.close();
        }
    }

    /// Reset every circuit.
    pub fn reset_all(&self) {
        self.lock_circuits().clear();
        info!("All circuits reset");
    }

    /// Snapshot of every circuit seen so far.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let circuits = self.lock_circuits();
        let mut snapshots: Vec<_> = circuits
            .iter()
            .map(|(provider, circuit)| CircuitSnapshot {
                provider: provider.clone(),
                status: circuit.status,
                consecutive_failures: circuit.consecutive_failures,
                open_for_secs: circuit.opened_at.map(|at| at.elapsed().as_secs_f64()),
            })
            .collect();
        snapshots.sort_by(|a, b| a.provider.cmp(&b.provider));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        let cb = CircuitBreaker::new();
        cb.configure("p", CircuitConfig::new(threshold, recovery));
        cb
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::new();
        assert!(cb.allow("p"));
        assert_eq!(cb.status("p"), CircuitStatus::Closed);
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let cb = breaker(3, Duration::from_secs(60));

        cb.record_outcome("p", false);
        cb.record_outcome("p", false);
        assert!(cb.allow("p"));
        assert_eq!(cb.status("p"), CircuitStatus::Closed);

        cb.record_outcome("p", false);
        assert_eq!(cb.status("p"), CircuitStatus::Open);
        assert!(!cb.allow("p"));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker(3, Duration::from_secs(60));

        cb.record_outcome("p", false);
        cb.record_outcome("p", false);
        assert_eq!(cb.consecutive_failures("p"), 2);

        cb.record_outcome("p", true);
        assert_eq!(cb.consecutive_failures("p"), 0);

        cb.record_outcome("p", false);
        cb.record_outcome("p", false);
        assert_eq!(cb.status("p"), CircuitStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_until_recovery_timeout() {
        let cb = breaker(1, Duration::from_secs(30));

        cb.record_outcome("p", false);
        assert!(!cb.allow("p"));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!cb.allow("p"));
        assert_eq!(cb.status("p"), CircuitStatus::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.allow("p"));
        assert_eq!(cb.status("p"), CircuitStatus::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_exactly_one_trial() {
        let cb = breaker(1, Duration::from_secs(10));

        cb.record_outcome("p", false);
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(cb.allow("p"));
        assert!(!cb.allow("p"));
        assert!(!cb.allow("p"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_on_success() {
        let cb = breaker(1, Duration::from_secs(10));

        cb.record_outcome("p", false);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.allow("p"));

        cb.record_outcome("p", true);
        assert_eq!(cb.status("p"), CircuitStatus::Closed);
        assert_eq!(cb.consecutive_failures("p"), 0);
        assert!(cb.allow("p"));
        assert!(cb.allow("p"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_trial_leaves_circuit_half_open() {
        let cb = breaker(2, Duration::from_secs(10));

        cb.record_outcome("p", false);
        cb.record_outcome("p", false);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.allow("p"));

        cb.release_trial("p");
        assert_eq!(cb.status("p"), CircuitStatus::HalfOpen);
        assert_eq!(cb.consecutive_failures("p"), 2);

        // The next caller gets the trial instead.
        assert!(cb.allow("p"));
        assert!(!cb.allow("p"));
    }

    #[test]
    fn test_release_trial_ignores_closed_circuit() {
        let cb = breaker(3, Duration::from_secs(10));

        cb.record_outcome("p", false);
        cb.release_trial("p");

        assert_eq!(cb.status("p"), CircuitStatus::Closed);
        assert_eq!(cb.consecutive_failures("p"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_reopens_on_failure_with_fresh_timer() {
        let cb = breaker(1, Duration::from_secs(10));

        cb.record_outcome("p", false);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.allow("p"));

        cb.record_outcome("p", false);
        assert_eq!(cb.status("p"), CircuitStatus::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!cb.allow("p"));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cb.allow("p"));
        assert_eq!(cb.status("p"), CircuitStatus::HalfOpen);
    }

    #[test]
    fn test_manual_reset() {
        let cb = breaker(1, Duration::from_secs(60));

        cb.record_outcome("p", false);
        assert_eq!(cb.status("p"), CircuitStatus::Open);

        cb.reset("p");
        assert_eq!(cb.status("p"), CircuitStatus::Closed);
        assert_eq!(cb.consecutive_failures("p"), 0);
        assert!(cb.allow("p"));
    }

    #[test]
    fn test_provider_isolation() {
        let cb = CircuitBreaker::new();
        cb.configure("a", CircuitConfig::new(1, Duration::from_secs(60)));

        cb.record_outcome("a", false);
        assert!(!cb.allow("a"));

        assert!(cb.allow("b"));
        assert_eq!(cb.status("b"), CircuitStatus::Closed);
    }

    #[test]
    fn test_snapshot() {
        let cb = CircuitBreaker::new();
        cb.configure("b", CircuitConfig::new(1, Duration::from_secs(60)));

        cb.record_outcome("a", false);
        cb.record_outcome("b", false);

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].provider, "a");
        assert_eq!(snapshot[0].status, CircuitStatus::Closed);
        assert_eq!(snapshot[0].consecutive_failures, 1);
        assert_eq!(snapshot[1].status, CircuitStatus::Open);
        assert!(snapshot[1].open_for_secs.is_some());
    }
}
