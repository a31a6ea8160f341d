//! Error types for the market feed orchestrator

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::types::Category;

/// Coarse classification of a provider failure
///
/// Used in metric records and fetch diagnostics, where the full error
/// message is not needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Local token bucket was empty
    RateLimited,
    /// Provider circuit is open
    CircuitOpen,
    /// Call exceeded the provider timeout
    Timeout,
    /// Non-2xx status or transport failure
    Http,
    /// Vendor payload did not match the expected shape
    Parse,
    /// Provider does not serve this request
    Unsupported,
    /// The in-flight call was dropped before completing
    Cancelled,
    /// Every provider in a category chain failed
    Exhausted,
}

impl ErrorKind {
    /// Whether this kind is a local gate rejection rather than an attempt
    pub fn is_rejection(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::CircuitOpen)
    }

    /// Whether the vendor answered but does not serve the request
    pub fn is_decline(&self) -> bool {
        matches!(self, ErrorKind::Unsupported)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Http => "http",
            ErrorKind::Parse => "parse",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// Errors that can occur when fetching data from a provider
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// Local quota for the provider is exhausted
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Provider circuit is open; no network call was made
    #[error("Circuit open")]
    CircuitOpen,

    /// Timeout waiting for response
    #[error("Request timeout")]
    Timeout,

    /// Non-2xx response or connection failure
    #[error("HTTP error{}: {message}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Http {
        status: Option<u16>,
        message: String,
    },

    /// Invalid response from provider
    #[error("Invalid response: {0}")]
    Parse(String),

    /// Request not served by this provider (unknown symbol, chain, ...)
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// Call was cancelled before it completed
    #[error("Request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Creates an Http error without a status code
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            status: None,
            message: message.into(),
        }
    }

    /// Creates a Parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Creates an Unsupported error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Returns the coarse kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::RateLimited => ErrorKind::RateLimited,
            ProviderError::CircuitOpen => ErrorKind::CircuitOpen,
            ProviderError::Timeout => ErrorKind::Timeout,
            ProviderError::Http { .. } => ErrorKind::Http,
            ProviderError::Parse(_) => ErrorKind::Parse,
            ProviderError::Unsupported(_) => ErrorKind::Unsupported,
            ProviderError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Http {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

/// Whether a failure of this kind should count against the provider circuit
///
/// Gate rejections never reach the network and unsupported requests mean the
/// provider answered normally, so neither is evidence of an outage.
pub fn counts_against_circuit(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Timeout | ErrorKind::Http | ErrorKind::Parse | ErrorKind::Cancelled
    )
}

/// One failed provider attempt within a resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub provider: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Errors surfaced by strict resolution
///
/// The default `resolve` path never returns these; it converts them into a
/// fallback result instead.
#[derive(Debug, Error, Clone)]
pub enum ResolveError {
    /// No provider is configured for the category
    #[error("No providers configured for {category}")]
    NoProviders { category: Category },

    /// Every provider in the chain failed
    #[error("All providers failed for {category}: {}", summarize(.attempts))]
    Exhausted {
        category: Category,
        attempts: Vec<FailedAttempt>,
    },

    /// The outer deadline expired before any provider succeeded
    #[error("Deadline of {deadline:?} exceeded for {category}")]
    DeadlineExceeded {
        category: Category,
        deadline: Duration,
    },
}

impl ResolveError {
    /// Category the failed resolution was for
    pub fn category(&self) -> Category {
        match self {
            ResolveError::NoProviders { category }
            | ResolveError::Exhausted { category, .. }
            | ResolveError::DeadlineExceeded { category, .. } => *category,
        }
    }
}

fn summarize(attempts: &[FailedAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.provider, a.kind))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for the expected schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Provider name has no bundled adapter
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Provider routed to a category its adapter cannot serve
    #[error("Provider {provider} does not serve category {category}")]
    UnsupportedRoute { provider: String, category: Category },

    /// HTTP client construction failed
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl ConfigError {
    /// Creates an Invalid error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
