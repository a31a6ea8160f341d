use market_feed_sdk::{Category, FeedConfig, Orchestrator, RequestParams};
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    // Uses FEED_CONFIG when set, else the built-in provider table.
    let config = match std::env::var("FEED_CONFIG") {
        Ok(path) => FeedConfig::load(path)?,
        Err(_) => FeedConfig::default(),
    };
    config.logging.init();

    let orchestrator = Orchestrator::from_config(&config)?;
    let _sweeper = orchestrator.start_cache_sweeper();

    println!("Resolving one request per category...");
    println!("-------------------------------------------");

    // 2. First pass goes to the providers
    let requests = vec![
        (Category::Market, RequestParams::new().with("symbol", "SOL")),
        (Category::Sentiment, RequestParams::new()),
        (Category::News, RequestParams::new().with("query", "bitcoin").with("limit", "5")),
        (Category::Whale, RequestParams::new().with("symbol", "BTC")),
        (
            Category::Blockchain,
            RequestParams::new()
                .with("chain", "ethereum")
                .with("address", "0xde0B295669a9FD93d5F28D9Ec85E40f4cb697BAe"),
        ),
    ];

    let start = Instant::now();
    let results = orchestrator.resolve_many(&requests).await;
    let network_latency = start.elapsed();

    for result in &results {
        let source = result.source_provider.as_deref().unwrap_or("fallback");
        println!("{:<10} via {:<14} {}", result.category, source, serde_json::to_string(&result.payload)?);
    }
    println!("   Network latency: {:?}", network_latency);
    println!();

    // 3. Second pass is answered from the cache
    let start = Instant::now();
    orchestrator.resolve_many(&requests).await;
    println!("   Cached latency:  {:?}", start.elapsed());
    println!();

    println!("-------------------------------------------");
    let health = orchestrator.health().await;
    println!("Health: {:?} ({} cached entries, {} fallbacks)", health.status, health.cache_entries, health.fallbacks_served);
    for provider in &health.providers {
        println!(
            "- {:<14} circuit={} tokens={:.1} requests={} success={:.0}% p50={:.0}ms",
            provider.name,
            provider.circuit,
            provider.tokens_remaining,
            provider.requests,
            provider.success_rate * 100.0,
            provider.latency_p50_ms
        );
    }

    Ok(())
}
