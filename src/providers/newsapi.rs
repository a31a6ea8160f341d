//! NewsAPI headline provider

use crate::{
    constants::{DEFAULT_NEWS_LIMIT, NEWSAPI_API_URL},
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

/// Search used when the request names neither a query nor a symbol
const DEFAULT_QUERY: &str = "cryptocurrency";

/// NewsAPI caps `pageSize` at 100
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    #[serde(default)]
    source: Option<ArticleSource>,
    title: Option<String>,
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    #[serde(default)]
    name: Option<String>,
}

/// NewsAPI `/everything` search (API key required)
pub struct NewsApiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl NewsApiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(NEWSAPI_API_URL, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(None)?,
            base_url: normalize_base_url(base_url),
            api_key: api_key.into(),
        })
    }

    fn parse_response(response: EverythingResponse, query: String) -> Result<NewsFeed, ProviderError> {
        if response.status != "ok" {
            return Err(ProviderError::http(
                response
                    .message
                    .unwrap_or_else(|| format!("status {}", response.status)),
            ));
        }

        // Removed articles come back with null titles
        let items = response
            .articles
            .into_iter()
            .filter_map(|article| {
                Some(NewsItem {
                    title: article.title?,
                    url: article.url?,
                    source: article
                        .source
                        .and_then(|s| s.name)
                        .unwrap_or_else(|| "newsapi".to_string()),
                    published_at: article.published_at,
                    summary: article.description,
                })
            })
            .collect();

        Ok(NewsFeed { query, items })
    }
}

#[async_trait]
impl ProviderAdapter for NewsApiProvider {
    fn provider_name(&self) -> &'static str {
        "newsapi"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::News]
    }

    async fn fetch(
        &self,
        _category: Category,
        params: &RequestParams,
    ) -> Result<CanonicalPayload, ProviderError> {
        let query = params.news_query().unwrap_or_default();
        let search = if query.is_empty() {
            DEFAULT_QUERY.to_string()
        } else {
            query.clone()
        };
        let page_size = params
            .limit()
            .unwrap_or(DEFAULT_NEWS_LIMIT)
            .clamp(1, MAX_PAGE_SIZE);

        let url = format!("{}/everything", self.base_url);
        debug!(%url, %search, "Searching NewsAPI");

        let request = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", search),
                ("pageSize", page_size.to_string()),
                ("sortBy", "publishedAt".to_string()),
                ("language", "en".to_string()),
            ]);
        let response: EverythingResponse = send_json(self.provider_name(), request).await?;

        Ok(CanonicalPayload::News(Self::parse_response(response, query)?))
    }
}
