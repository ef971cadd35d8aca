//! End-to-end tests driving the assembled gateway through `infer`.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use modelgw_core::{Capability, GatewayError, LatencyClass, ProviderErrorKind};
use std::time::Duration;

#[tokio::test]
async fn test_e2e_chat_completion() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("acme", "Hello there"))
        .adapter(MockAdapter::ok("beta", "Hello from beta"))
        .start();

    let result = expect_result(gw.infer(chat_request("agent-1", "Say hello")).await);

    // Cheapest candidate (beta) serves the request
    assert_eq!(result.model_id.as_str(), "beta-chat");
    assert_eq!(result.output, "Hello from beta");
    assert!(!result.cache_hit);
    assert!(result.cost > 0.0);
    assert!(result.usage.total() > 0);
    assert_eq!(gw.adapter("beta").calls(), 1);
    assert_eq!(gw.adapter("acme").calls(), 0);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_exact_duplicate_served_from_cache() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "Paris"))
        .adapter(MockAdapter::ok("acme", "Paris"))
        .start();

    let first = expect_result(
        gw.infer(chat_request("agent-1", "What is the capital of France?"))
            .await,
    );
    assert!(!first.cache_hit);

    let second = expect_result(
        gw.infer(chat_request("agent-2", "What is the capital of France?"))
            .await,
    );
    assert!(second.cache_hit);
    assert_eq!(second.output, "Paris");
    assert_eq!(second.cost, 0.0);

    // Only the first request reached a provider
    assert_eq!(gw.total_calls(), 1);
    let stats = gw.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_near_duplicate_served_from_cache() {
    init_tracing();
    // Pin both phrasings (normalized form) to nearby vectors
    let embedder = MockEmbedder::with_vectors(&[
        ("capital of france?", vec![0.9, 0.1, 0.0]),
        ("what is the capital of france?", vec![0.88, 0.12, 0.01]),
    ]);
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "Paris"))
        .adapter(MockAdapter::ok("acme", "Paris"))
        .embedder(embedder)
        .start();

    expect_result(gw.infer(chat_request("agent-1", "Capital of France?")).await);

    let rephrased = expect_result(
        gw.infer(chat_request("agent-1", "What is the  capital of FRANCE?"))
            .await,
    );
    assert!(rephrased.cache_hit);
    assert_eq!(rephrased.output, "Paris");
    assert_eq!(gw.total_calls(), 1);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_failover_to_backup_provider() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::failing("beta", ProviderErrorKind::ServiceUnavailable))
        .adapter(MockAdapter::ok("acme", "from acme"))
        .start();

    // Cheapest (beta) fails transiently; the router fails over to acme
    let result = expect_result(gw.infer(chat_request("agent-1", "hello")).await);
    assert_eq!(result.model_id.as_str(), "acme-chat");
    assert_eq!(gw.adapter("beta").calls(), 1);
    assert_eq!(gw.adapter("acme").calls(), 1);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_permanent_error_surfaces_immediately() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::failing("beta", ProviderErrorKind::ContentPolicy))
        .adapter(MockAdapter::ok("acme", "unused"))
        .start();

    let error = expect_error(gw.infer(chat_request("agent-1", "hello")).await);
    assert!(matches!(error, GatewayError::ProviderPermanent { .. }));
    assert!(!error.is_retryable());

    // No failover on a caller-side problem
    assert_eq!(gw.adapter("acme").calls(), 0);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_embedder_outage_degrades_to_serving_uncached() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "still served"))
        .adapter(MockAdapter::ok("acme", "still served"))
        .embedder(BrokenEmbedder::new())
        .start();

    // Cache is effectively disabled; requests are served regardless
    let first = expect_result(gw.infer(chat_request("agent-1", "hello")).await);
    let second = expect_result(gw.infer(chat_request("agent-1", "hello")).await);
    assert!(!first.cache_hit);
    assert!(!second.cache_hit);
    assert_eq!(gw.total_calls(), 2);
    assert!(gw.cache_stats().embed_failures > 0);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_expired_request_rejected_before_provider() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "unused"))
        .adapter(MockAdapter::ok("acme", "unused"))
        .start();

    let error = expect_error(gw.infer(expired_request("agent-1", "too late")).await);
    assert!(matches!(error, GatewayError::RequestExpired { .. }));
    assert_eq!(gw.total_calls(), 0);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_result_after_deadline_discarded() {
    init_tracing();
    let holding = MockAdapter::holding("beta", "too slow");
    let gw = TestGateway::builder()
        .adapter(std::sync::Arc::clone(&holding))
        .catalog(vec![catalog_entry(
            "beta-chat",
            "beta",
            &[Capability::Chat],
            1.0,
            LatencyClass::Standard,
        )])
        .start();

    // The adapter holds the call until well past the request's deadline;
    // the in-flight call is not cancelled, but its result is discarded.
    let request = deadline_request("agent-1", "hurry", Duration::from_millis(150));
    let (outcome, ()) = tokio::join!(gw.infer(request), async {
        wait_for("adapter invocation", || holding.calls() == 1).await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        holding.release_all();
    });

    let error = expect_error(outcome);
    assert!(matches!(error, GatewayError::RequestExpired { .. }));

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_queue_backpressure() {
    init_tracing();
    let holding = MockAdapter::holding("beta", "held");
    let gw = std::sync::Arc::new(
        TestGateway::builder()
            .adapter(std::sync::Arc::clone(&holding))
            .catalog(vec![catalog_entry(
                "beta-chat",
                "beta",
                &[Capability::Chat],
                1.0,
                LatencyClass::Standard,
            )])
            .configure(|c| {
                c.workers.count = 1;
                c.queue.max_depth = 1;
            })
            .start(),
    );

    // First request occupies the single worker
    let first = tokio::spawn({
        let gw = std::sync::Arc::clone(&gw);
        async move { gw.infer(chat_request("agent-1", "first")).await }
    });
    wait_for("first request in flight", || holding.calls() == 1).await;

    // Second request fills the queue
    let second = tokio::spawn({
        let gw = std::sync::Arc::clone(&gw);
        async move { gw.infer(chat_request("agent-1", "second")).await }
    });
    wait_for("second request queued", || gw.queue_depth() == 1).await;

    // Third request is refused outright
    let error = expect_error(gw.infer(chat_request("agent-1", "third")).await);
    assert!(matches!(error, GatewayError::QueueRejected { .. }));
    assert!(error.is_retryable());

    holding.release_all();
    expect_result(first.await.expect("join"));
    expect_result(second.await.expect("join"));

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_concurrent_requests_complete_independently() {
    init_tracing();
    let gw = std::sync::Arc::new(
        TestGateway::builder()
            .adapter(MockAdapter::ok("beta", "answer"))
            .adapter(MockAdapter::ok("acme", "answer"))
            .configure(|c| c.workers.count = 4)
            .start(),
    );

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let gw = std::sync::Arc::clone(&gw);
            tokio::spawn(async move {
                gw.infer(chat_request(&format!("agent-{}", i % 4), &format!("question {i}")))
                    .await
            })
        })
        .collect();

    let outcomes = futures::future::join_all(handles).await;
    for outcome in outcomes {
        expect_result(outcome.expect("join"));
    }

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_admin_surface_snapshot() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::failing("beta", ProviderErrorKind::Timeout))
        .adapter(MockAdapter::ok("acme", "served"))
        .start();

    expect_result(gw.infer(chat_request("agent-1", "hello")).await);

    let status = gw.status();
    assert_eq!(status.cache.misses, 1);
    assert_eq!(status.queue_depth, 0);
    assert!(!status.rate_limits.is_empty());

    // beta took one transient failure; both circuits are still closed
    let beta = status
        .circuits
        .iter()
        .find(|c| c.provider.as_str() == "beta")
        .expect("beta tracked");
    assert_eq!(beta.consecutive_failures, 1);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_cache_clear_forces_reinvocation() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "answer"))
        .adapter(MockAdapter::ok("acme", "answer"))
        .start();

    expect_result(gw.infer(chat_request("agent-1", "question")).await);
    assert!(expect_result(gw.infer(chat_request("agent-1", "question")).await).cache_hit);
    assert_eq!(gw.total_calls(), 1);

    gw.clear_cache();

    let after = expect_result(gw.infer(chat_request("agent-1", "question")).await);
    assert!(!after.cache_hit);
    assert_eq!(gw.total_calls(), 2);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_registry_reload_changes_routing() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "old"))
        .adapter(MockAdapter::ok("acme", "new"))
        .start();

    let before = expect_result(gw.infer(chat_request("agent-1", "first")).await);
    assert_eq!(before.model_id.as_str(), "beta-chat");

    // Replace the catalog with one that only lists acme
    let replacement = vec![catalog_entry(
        "acme-chat",
        "acme",
        &[Capability::Chat],
        5.0,
        LatencyClass::Fast,
    )];
    let descriptors = replacement
        .into_iter()
        .map(|entry| entry.into_descriptor().expect("valid entry"))
        .collect();
    gw.reload_registry(descriptors).expect("reload");

    let after = expect_result(gw.infer(chat_request("agent-1", "second")).await);
    assert_eq!(after.model_id.as_str(), "acme-chat");

    gw.shutdown().await;
}

#[tokio::test]
async fn test_e2e_capability_unavailable() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "unused"))
        .adapter(MockAdapter::ok("acme", "unused"))
        .start();

    // The two-provider catalog has no vision model
    let error = expect_error(gw.infer(vision_request("agent-1", "describe this")).await);
    assert!(matches!(error, GatewayError::CapabilityUnavailable { .. }));
    assert!(!error.is_retryable());
    assert_eq!(gw.total_calls(), 0);

    gw.shutdown().await;
}
