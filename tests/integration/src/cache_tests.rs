//! Semantic cache behavior through the assembled gateway.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use modelgw_core::{Capability, LatencyClass};
use std::time::Duration;

#[tokio::test]
async fn test_cache_capability_mismatch_never_cross_hits() {
    init_tracing();
    // Identical embeddings for the chat and vision phrasings
    let embedder = MockEmbedder::with_vectors(&[(
        "describe the scene https://example.com/cat.png",
        vec![0.5, 0.5, 0.0],
    )]);
    let gw = TestGateway::builder()
        .catalog(vec![
            catalog_entry("chat-model", "beta", &[Capability::Chat], 1.0, LatencyClass::Fast),
            catalog_entry(
                "vision-model",
                "acme",
                &[Capability::Chat, Capability::Vision],
                5.0,
                LatencyClass::Slow,
            ),
        ])
        .adapter(MockAdapter::ok("beta", "a chat answer"))
        .adapter(MockAdapter::ok("acme", "a vision answer"))
        .embedder(embedder)
        .start();

    // Chat first; a vision request with a perfectly similar embedding must
    // still go to a provider because its required capabilities differ
    let chat = expect_result(
        gw.infer(chat_request("agent-1", "describe the scene https://example.com/cat.png"))
            .await,
    );
    assert!(!chat.cache_hit);

    let vision = expect_result(gw.infer(vision_request("agent-1", "describe the scene")).await);
    assert!(!vision.cache_hit);
    assert_eq!(vision.output, "a vision answer");
    assert_eq!(gw.total_calls(), 2);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_cache_entry_expires_after_ttl() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "answer"))
        .adapter(MockAdapter::ok("acme", "answer"))
        .configure(|c| c.cache.ttl_stable = Duration::from_millis(80))
        .start();

    expect_result(gw.infer(chat_request("agent-1", "a stable fact")).await);
    assert!(expect_result(gw.infer(chat_request("agent-1", "a stable fact")).await).cache_hit);

    tokio::time::sleep(Duration::from_millis(120)).await;

    // TTL runs from creation; the earlier hit refreshed nothing
    let after = expect_result(gw.infer(chat_request("agent-1", "a stable fact")).await);
    assert!(!after.cache_hit);
    assert_eq!(gw.total_calls(), 2);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_cache_volatile_class_uses_short_ttl() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "the price right now"))
        .adapter(MockAdapter::ok("acme", "the price right now"))
        .configure(|c| {
            c.cache.ttl_volatile = Duration::from_millis(60);
            c.cache.ttl_stable = Duration::from_secs(3600);
        })
        .start();

    expect_result(gw.infer(volatile_request("agent-1", "current stock price")).await);

    tokio::time::sleep(Duration::from_millis(100)).await;

    // The volatile entry is gone while a stable one would have survived
    let retry = expect_result(gw.infer(volatile_request("agent-1", "current stock price")).await);
    assert!(!retry.cache_hit);
    assert_eq!(gw.total_calls(), 2);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_cache_hit_statistics_accumulate() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "answer"))
        .adapter(MockAdapter::ok("acme", "answer"))
        .start();

    expect_result(gw.infer(chat_request("agent-1", "question one")).await);
    expect_result(gw.infer(chat_request("agent-1", "question one")).await);
    expect_result(gw.infer(chat_request("agent-1", "question one")).await);
    expect_result(gw.infer(chat_request("agent-1", "question two")).await);

    let stats = gw.cache_stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.stores, 2);
    assert_eq!(stats.entries, 2);
    assert!((stats.hit_rate() - 0.5).abs() < 1e-9);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_cache_below_threshold_similarity_misses() {
    init_tracing();
    let embedder = MockEmbedder::with_vectors(&[
        ("what is rust?", vec![1.0, 0.0, 0.0]),
        ("what is go?", vec![0.5, 0.86, 0.0]), // similarity ~0.5 to rust
    ]);
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "a language"))
        .adapter(MockAdapter::ok("acme", "a language"))
        .embedder(embedder)
        .start();

    expect_result(gw.infer(chat_request("agent-1", "What is Rust?")).await);

    let other = expect_result(gw.infer(chat_request("agent-1", "What is Go?")).await);
    assert!(!other.cache_hit);
    assert_eq!(gw.total_calls(), 2);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_cache_respects_configured_threshold() {
    init_tracing();
    let embedder = MockEmbedder::with_vectors(&[
        ("close enough?", vec![1.0, 0.0, 0.0]),
        ("close enough!", vec![0.95, 0.3122, 0.0]), // similarity ~0.95
    ]);
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "answer"))
        .adapter(MockAdapter::ok("acme", "answer"))
        .embedder(embedder)
        .configure(|c| c.cache.similarity_threshold = 0.99)
        .start();

    // At the default 0.85 threshold this would hit; at 0.99 it must not
    expect_result(gw.infer(chat_request("agent-1", "Close enough?")).await);
    let second = expect_result(gw.infer(chat_request("agent-1", "Close enough!")).await);
    assert!(!second.cache_hit);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_cache_bounded_by_max_entries() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "answer"))
        .adapter(MockAdapter::ok("acme", "answer"))
        .configure(|c| c.cache.max_entries = 4)
        .start();

    for i in 0..10 {
        expect_result(
            gw.infer(chat_request("agent-1", &format!("unique question {i}")))
                .await,
        );
    }

    let stats = gw.cache_stats();
    assert!(stats.entries <= 4);
    assert!(stats.evictions >= 6);

    gw.shutdown().await;
}
