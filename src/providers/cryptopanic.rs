//! CryptoPanic news provider

use crate::{
    constants::{CRYPTOPANIC_API_URL, DEFAULT_NEWS_LIMIT},
    error::ProviderError,
    http::{build_client, normalize_base_url, send_json},
    provider::ProviderAdapter,
    request::RequestParams,
    types::{CanonicalPayload, Category, NewsFeed, NewsItem},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PostsResponse {
    results: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    source: Option<PostSource>,
}

#[derive(Debug, Deserialize)]
struct PostSource {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    domain: Option<String>,
}

/// CryptoPanic aggregated headlines (auth token required)
pub struct CryptoPanicProvider {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl CryptoPanicProvider {
    pub fn new(auth_token: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(CRYPTOPANIC_API_URL, auth_token)
    }

    pub fn with_base_url(
        base_url: &str,
        auth_token: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(None)?,
            base_url: normalize_base_url(base_url),
            auth_token: auth_token.into(),
        })
    }

    fn parse_response(response: PostsResponse, query: String, limit: usize) -> NewsFeed {
        let items = response
            .results
            .into_iter()
            .take(limit)
            .map(|post| {
                let source = post
                    .source
                    .and_then(|s| s.title.or(s.domain))
                    .unwrap_or_else(|| "cryptopanic".to_string());
                NewsItem {
                    title: post.title,
                    url: post.url.unwrap_or_default(),
                    source,
                    published_at: post.published_at,
                    summary: None,
                }
            })
            .collect();

        NewsFeed { query, items }
    }
}

#[async_trait]
impl ProviderAdapter for CryptoPanicProvider {
    fn provider_name(&self) -> &'static str {
        "cryptopanic"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::News]
    }

    async fn fetch(
        &self,
        _category: Category,
        params: &RequestParams,
    ) -> Result<CanonicalPayload, ProviderError> {
        let url = format!("{}/posts/", self.base_url);
        let mut query = vec![
            ("auth_token", self.auth_token.clone()),
            ("public", "true".to_string()),
        ];
        if let Some(symbol) = params.symbol() {
            query.push(("currencies", symbol));
        }
        debug!(%url, "Fetching CryptoPanic posts");

        let request = self.client.get(&url).query(&query);
        let response: PostsResponse = send_json(self.provider_name(), request).await?;

        Ok(CanonicalPayload::News(Self::parse_response(
            response,
            params.news_query().unwrap_or_default(),
            params.limit().unwrap_or(DEFAULT_NEWS_LIMIT),
        )))
    }
}
