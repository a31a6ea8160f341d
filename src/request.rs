//! Request parameters and cache fingerprints

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::form_urlencoded;

use crate::types::{Asset, Category, Chain};

/// Normalized request parameters
///
/// Keys are trimmed and lower-cased, values trimmed. The map is ordered, so
/// two parameter sets with the same content always fingerprint identically
/// regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParams(BTreeMap<String, String>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a parameter; empty keys are ignored
    pub fn insert(&mut self, key: &str, value: impl AsRef<str>) {
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            return;
        }
        self.0.insert(key, value.as_ref().trim().to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Upper-cased `symbol` parameter
    pub fn symbol(&self) -> Option<String> {
        self.get("symbol")
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_uppercase)
    }

    /// `symbol` resolved to a supported asset
    pub fn asset(&self) -> Option<Asset> {
        self.get("symbol").and_then(|s| s.parse().ok())
    }

    /// `chain` resolved to a supported chain
    pub fn chain(&self) -> Option<Chain> {
        self.get("chain").and_then(|s| s.parse().ok())
    }

    /// News search text: `query`, else the symbol
    pub fn news_query(&self) -> Option<String> {
        self.get("query")
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .or_else(|| self.symbol())
    }

    /// Parsed `limit` parameter
    pub fn limit(&self) -> Option<usize> {
        self.get("limit").and_then(|l| l.parse().ok())
    }

    /// Parsed `min_value_usd` parameter
    pub fn min_value_usd(&self) -> Option<f64> {
        self.get("min_value_usd").and_then(|v| v.parse().ok())
    }

    /// Cache key for this request within a category
    ///
    /// Keys and values are form-encoded, so `&` or `=` inside a value cannot
    /// collide with a different parameter set.
    pub fn fingerprint(&self, category: Category) -> Fingerprint {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish();
        Fingerprint(format!("{}?{}", category.as_str(), query))
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = RequestParams::new();
        for (k, v) in iter {
            params.insert(k.as_ref(), v);
        }
        params
    }
}

/// Normalized cache key: category plus sorted parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
