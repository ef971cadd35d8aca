//! Routing behavior through the assembled gateway: capability filtering,
//! cost ranking, constraint handling, and routing around open circuits.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use chrono::Utc;
use modelgw_core::{
    Capability, ChatMessage, GatewayError, InferenceRequest, LatencyClass, ProviderErrorKind,
    RequestPayload,
};

#[tokio::test]
async fn test_routing_prefers_cheapest_model() {
    init_tracing();
    let gw = TestGateway::builder()
        .catalog(vec![
            catalog_entry("premium", "acme", &[Capability::Chat], 15.0, LatencyClass::Fast),
            catalog_entry("mid", "beta", &[Capability::Chat], 3.0, LatencyClass::Fast),
            catalog_entry("budget", "gamma", &[Capability::Chat], 0.25, LatencyClass::Slow),
        ])
        .adapter(MockAdapter::ok("acme", "premium answer"))
        .adapter(MockAdapter::ok("beta", "mid answer"))
        .adapter(MockAdapter::ok("gamma", "budget answer"))
        .start();

    let result = expect_result(gw.infer(chat_request("agent-1", "hello")).await);
    assert_eq!(result.model_id.as_str(), "budget");

    gw.shutdown().await;
}

#[tokio::test]
async fn test_routing_latency_class_breaks_cost_ties() {
    init_tracing();
    let gw = TestGateway::builder()
        .catalog(vec![
            catalog_entry("slow-tied", "acme", &[Capability::Chat], 1.0, LatencyClass::Slow),
            catalog_entry("fast-tied", "beta", &[Capability::Chat], 1.0, LatencyClass::Fast),
        ])
        .adapter(MockAdapter::ok("acme", "slow"))
        .adapter(MockAdapter::ok("beta", "fast"))
        .start();

    let result = expect_result(gw.infer(chat_request("agent-1", "hello")).await);
    assert_eq!(result.model_id.as_str(), "fast-tied");

    gw.shutdown().await;
}

#[tokio::test]
async fn test_routing_is_deterministic_across_repeats() {
    init_tracing();
    let gw = TestGateway::builder()
        .catalog(vec![
            catalog_entry("twin-a", "acme", &[Capability::Chat], 2.0, LatencyClass::Standard),
            catalog_entry("twin-b", "beta", &[Capability::Chat], 2.0, LatencyClass::Standard),
        ])
        .adapter(MockAdapter::ok("acme", "a"))
        .adapter(MockAdapter::ok("beta", "b"))
        .embedder(BrokenEmbedder::new()) // disable caching so every call routes
        .start();

    // Equal cost and latency class; provider id breaks the tie, every time
    for i in 0..10 {
        let result = expect_result(
            gw.infer(chat_request("agent-1", &format!("question {i}")))
                .await,
        );
        assert_eq!(result.model_id.as_str(), "twin-a");
    }

    gw.shutdown().await;
}

#[tokio::test]
async fn test_routing_capability_filter_selects_matching_model() {
    init_tracing();
    let gw = TestGateway::builder()
        .catalog(vec![
            catalog_entry("chat-only", "acme", &[Capability::Chat], 0.5, LatencyClass::Fast),
            catalog_entry(
                "multimodal",
                "beta",
                &[Capability::Chat, Capability::Vision],
                8.0,
                LatencyClass::Slow,
            ),
            catalog_entry("embedder", "acme", &[Capability::Embeddings], 0.05, LatencyClass::Fast),
        ])
        .adapter(MockAdapter::ok("acme", "from acme"))
        .adapter(MockAdapter::ok("beta", "from beta"))
        .start();

    // Vision request must skip the cheaper chat-only model
    let vision = expect_result(gw.infer(vision_request("agent-1", "what is this?")).await);
    assert_eq!(vision.model_id.as_str(), "multimodal");

    let embed = expect_result(gw.infer(embedding_request("agent-1", "vectorize me")).await);
    assert_eq!(embed.model_id.as_str(), "embedder");

    gw.shutdown().await;
}

#[tokio::test]
async fn test_routing_max_cost_constraint() {
    init_tracing();
    let gw = TestGateway::builder()
        .catalog(vec![
            catalog_entry("pricey", "acme", &[Capability::Chat], 1_000.0, LatencyClass::Fast),
            catalog_entry("cheap", "beta", &[Capability::Chat], 0.001, LatencyClass::Slow),
        ])
        .adapter(MockAdapter::ok("acme", "pricey"))
        .adapter(MockAdapter::ok("beta", "cheap"))
        .start();

    let request = InferenceRequest::builder(
        caller("agent-1"),
        RequestPayload::Chat {
            messages: vec![ChatMessage::user("a question worth a fraction of a cent")],
        },
    )
    .max_cost(0.01)
    .build()
    .expect("valid request");

    let result = expect_result(gw.infer(request).await);
    assert_eq!(result.model_id.as_str(), "cheap");
    assert_eq!(gw.adapter("acme").calls(), 0);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_routing_around_open_circuit() {
    init_tracing();
    let gw = TestGateway::builder()
        .adapter(MockAdapter::failing("beta", ProviderErrorKind::ServiceUnavailable))
        .adapter(MockAdapter::ok("acme", "from acme"))
        .embedder(BrokenEmbedder::new())
        .start();

    // Five requests, each taking one transient failure on beta before
    // failing over, open beta's circuit (failure_threshold = 5)
    for i in 0..5 {
        let result = expect_result(
            gw.infer(chat_request("agent-1", &format!("question {i}")))
                .await,
        );
        assert_eq!(result.model_id.as_str(), "acme-chat");
    }
    assert_eq!(gw.adapter("beta").calls(), 5);

    // A request only beta and acme can serve now routes straight to acme
    // without touching beta
    let result = expect_result(gw.infer(chat_request("agent-1", "after the outage")).await);
    assert_eq!(result.model_id.as_str(), "acme-chat");
    assert_eq!(gw.adapter("beta").calls(), 5);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_routing_all_providers_unavailable_carries_retry_hint() {
    init_tracing();
    let gw = TestGateway::builder()
        .catalog(vec![catalog_entry(
            "only",
            "beta",
            &[Capability::Chat],
            1.0,
            LatencyClass::Standard,
        )])
        .adapter(MockAdapter::failing("beta", ProviderErrorKind::Timeout))
        .embedder(BrokenEmbedder::new())
        .start();

    for i in 0..5 {
        let error = expect_error(
            gw.infer(chat_request("agent-1", &format!("question {i}")))
                .await,
        );
        assert!(matches!(error, GatewayError::ProviderTransient { .. }));
    }

    // Circuit is open; the failure is transient for the system
    let error = expect_error(gw.infer(chat_request("agent-1", "one more")).await);
    match error {
        GatewayError::AllProvidersUnavailable { retry_after, .. } => {
            assert!(retry_after.expect("retry hint") > std::time::Duration::ZERO);
        }
        other => panic!("expected AllProvidersUnavailable, got {other:?}"),
    }
    assert!(error_is_retryable_later(&gw).await);

    gw.shutdown().await;
}

/// After the breaker cooldown elapses the provider becomes eligible again.
async fn error_is_retryable_later(gw: &TestGateway) -> bool {
    // Cooldown in test_config is 100ms
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    gw.circuit_states()
        .iter()
        .all(|c| c.time_until_retry == std::time::Duration::ZERO)
}

#[tokio::test]
async fn test_routing_failover_attempts_are_bounded() {
    init_tracing();
    let gw = TestGateway::builder()
        .catalog(vec![
            catalog_entry("m-a", "prov-a", &[Capability::Chat], 1.0, LatencyClass::Fast),
            catalog_entry("m-b", "prov-b", &[Capability::Chat], 2.0, LatencyClass::Fast),
            catalog_entry("m-c", "prov-c", &[Capability::Chat], 3.0, LatencyClass::Fast),
            catalog_entry("m-d", "prov-d", &[Capability::Chat], 4.0, LatencyClass::Fast),
        ])
        .adapter(MockAdapter::failing("prov-a", ProviderErrorKind::ServiceUnavailable))
        .adapter(MockAdapter::failing("prov-b", ProviderErrorKind::ServiceUnavailable))
        .adapter(MockAdapter::failing("prov-c", ProviderErrorKind::ServiceUnavailable))
        .adapter(MockAdapter::ok("prov-d", "never reached"))
        .start();

    // Default bound: the first candidate plus two failovers
    let error = expect_error(gw.infer(chat_request("agent-1", "hello")).await);
    match error {
        GatewayError::ProviderTransient { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected ProviderTransient, got {other:?}"),
    }
    assert_eq!(gw.adapter("prov-d").calls(), 0);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_routing_disabled_model_excluded() {
    init_tracing();
    let mut disabled = catalog_entry("cheap-off", "beta", &[Capability::Chat], 0.1, LatencyClass::Fast);
    disabled.enabled = false;

    let gw = TestGateway::builder()
        .catalog(vec![
            disabled,
            catalog_entry("live", "acme", &[Capability::Chat], 5.0, LatencyClass::Slow),
        ])
        .adapter(MockAdapter::ok("beta", "unused"))
        .adapter(MockAdapter::ok("acme", "served"))
        .start();

    let result = expect_result(gw.infer(chat_request("agent-1", "hello")).await);
    assert_eq!(result.model_id.as_str(), "live");
    assert_eq!(gw.adapter("beta").calls(), 0);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_routing_context_window_excludes_small_models() {
    init_tracing();
    let mut tiny = catalog_entry("tiny", "beta", &[Capability::Chat], 0.1, LatencyClass::Fast);
    tiny.max_context_tokens = 8;

    let gw = TestGateway::builder()
        .catalog(vec![
            tiny,
            catalog_entry("roomy", "acme", &[Capability::Chat], 5.0, LatencyClass::Slow),
        ])
        .adapter(MockAdapter::ok("beta", "unused"))
        .adapter(MockAdapter::ok("acme", "served"))
        .start();

    let long_text = "a long question repeated over and over ".repeat(20);
    let result = expect_result(gw.infer(chat_request("agent-1", &long_text)).await);
    assert_eq!(result.model_id.as_str(), "roomy");
    assert_eq!(gw.adapter("beta").calls(), 0);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_routing_deadline_bounds_invoke_timeout() {
    init_tracing();
    // A request with a generous deadline still completes normally
    let gw = TestGateway::builder()
        .adapter(MockAdapter::ok("beta", "on time"))
        .adapter(MockAdapter::ok("acme", "on time"))
        .start();

    let request = InferenceRequest::builder(
        caller("agent-1"),
        RequestPayload::Chat {
            messages: vec![ChatMessage::user("quick one")],
        },
    )
    .deadline(Utc::now() + chrono::Duration::seconds(30))
    .build()
    .expect("valid request");

    let result = expect_result(gw.infer(request).await);
    assert_eq!(result.output, "on time");

    gw.shutdown().await;
}
