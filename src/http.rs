//! HTTP plumbing shared by the bundled adapters

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::constants::{REQUEST_TIMEOUT_SECS, USER_AGENT};
use crate::error::ProviderError;

/// Longest slice of a vendor body quoted in error messages
const MAX_BODY_IN_ERROR: usize = 256;

/// Builds the client used by one adapter
///
/// The client timeout is a transport backstop; the per-call timeout that
/// counts against the circuit is enforced by `GuardedProvider`.
pub fn build_client(timeout: Option<Duration>) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout.unwrap_or(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .user_agent(USER_AGENT)
        .build()
        .map_err(ProviderError::from)
}

/// Sends a request and decodes a JSON body
///
/// Non-2xx statuses (429 included) become `Http` errors carrying the status;
/// a body that does not match `T` becomes `Parse`.
pub async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::Http {
            status: Some(status.as_u16()),
            message: truncate(&body).to_string(),
        });
    }

    debug!(provider, status = status.as_u16(), bytes = body.len(), "Received response");

    serde_json::from_str(&body).map_err(|e| {
        ProviderError::parse(format!(
            "Failed to parse {} response: {}. Response: {}",
            provider,
            e,
            truncate(&body)
        ))
    })
}

fn truncate(body: &str) -> &str {
    if body.len() <= MAX_BODY_IN_ERROR {
        return body;
    }
    let mut end = MAX_BODY_IN_ERROR;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Trims a trailing slash so endpoint paths can be appended
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Parses a number vendors send as either a JSON number or a string
pub fn parse_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "é".repeat(200);
        let cut = truncate(&body);
        assert!(cut.len() <= MAX_BODY_IN_ERROR);
        assert!(body.starts_with(cut));
    }

    #[test]
    fn test_parse_f64_accepts_strings_and_numbers() {
        assert_eq!(parse_f64(&json!(1.5)), Some(1.5));
        assert_eq!(parse_f64(&json!(" 2.25 ")), Some(2.25));
        assert_eq!(parse_f64(&json!("n/a")), None);
        assert_eq!(parse_f64(&json!(null)), None);
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v3/"),
            "https://api.example.com/v3"
        );
    }
}
