//! Token bucket rate limiter for data providers.
//!
//! Each provider gets its own bucket, keyed by provider name so that a
//! provider serving several categories spends a single shared quota.
//! Refill is lazy: tokens are credited when a bucket is inspected, never by a
//! background timer. Callers are never queued; a denied call is a signal to
//! try the next provider.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_RATE_LIMIT_CAPACITY, DEFAULT_REFILL_PER_SECOND};

/// Token bucket for a single provider.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Creates a full bucket whose refill clock starts at `now`.
    pub fn starting_at(config: &RateLimitConfig, now: Instant) -> Self {
        let capacity = config.capacity.max(0.0);
        Self {
            tokens: capacity,
            capacity,
            refill_per_second: config.refill_per_second.max(0.0),
            last_refill: now,
        }
    }

    /// Credits tokens for the time elapsed up to `now`.
    ///
    /// A `now` earlier than the last refill credits nothing.
    pub fn refill_at(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Takes one token if available at `now`.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill_at(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Takes one token if available.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Tokens currently in the bucket (without refilling).
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// Rate limit configuration for a provider.
///
/// Derived from the vendor's documented quota: a "5 req/sec" API maps to
/// `capacity = 5, refill_per_second = 5`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum burst size.
    pub capacity: f64,
    /// Tokens credited per second. Zero means the bucket never refills.
    pub refill_per_second: f64,
}

impl RateLimitConfig {
    pub fn new(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
        }
    }

    /// Convenience for quotas documented per minute.
    pub fn per_minute(requests_per_minute: u32, capacity: f64) -> Self {
        Self {
            capacity,
            refill_per_second: requests_per_minute as f64 / 60.0,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_RATE_LIMIT_CAPACITY,
            refill_per_second: DEFAULT_REFILL_PER_SECOND,
        }
    }
}

/// Token bucket rate limiter for multiple providers.
///
/// Buckets are created on first use, from the provider's configured limits
/// or the defaults.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    configs: Mutex<HashMap<String, RateLimitConfig>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the buckets mutex, recovering from poison if necessary.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Lock the configs mutex, recovering from poison if necessary.
    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, RateLimitConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure limits for a provider, replacing any existing bucket.
    pub fn configure(&self, provider: &str, config: RateLimitConfig) {
        let mut configs = self.lock_configs();
        configs.insert(provider.to_string(), config);
        drop(configs);

        self.lock_buckets().remove(provider);
    }

    /// Try to take a token for the provider without waiting.
    pub fn try_acquire(&self, provider: &str) -> bool {
        let config = self.config_for(provider);
        let mut buckets = self.lock_buckets();

        let bucket = buckets
            .entry(provider.to_string())
            .or_insert_with(|| TokenBucket::new(&config));

        let acquired = bucket.try_acquire();
        debug!(
            provider,
            acquired,
            tokens = bucket.tokens(),
            "Rate limiter decision"
        );
        acquired
    }

    /// Remaining tokens for a provider after lazy refill.
    pub fn remaining_tokens(&self, provider: &str) -> f64 {
        let mut buckets = self.lock_buckets();

        match buckets.get_mut(provider) {
            Some(bucket) => {
                bucket.refill_at(Instant::now());
                bucket.tokens()
            }
            None => {
                drop(buckets);
                self.config_for(provider).capacity
            }
        }
    }

    /// Restore a provider's bucket to full capacity.
    pub fn reset(&self, provider: &str) {
        self.lock_buckets().remove(provider);
    }

    /// Restore every bucket to full capacity.
    pub fn reset_all(&self) {
        self.lock_buckets().clear();
    }

    fn config_for(&self, provider: &str) -> RateLimitConfig {
        self.lock_configs()
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }
}
