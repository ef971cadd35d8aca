//! Test helper utilities for integration tests.

use crate::fixtures::{test_config, two_provider_catalog};
use crate::mock_providers::{MockAdapter, MockEmbedder};
use model_gateway::Gateway;
use modelgw_cache::Embedder;
use modelgw_config::{CatalogEntry, GatewayConfig};
use modelgw_core::{GatewayError, GatewayResult, InferenceResult, ProviderAdapter, ProviderId};
use modelgw_routing::AdapterSet;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// An assembled gateway plus handles to its mock collaborators.
pub struct TestGateway {
    /// The gateway under test
    pub gateway: Gateway,
    adapters: Vec<Arc<MockAdapter>>,
}

impl TestGateway {
    /// Start a builder with the two-provider catalog
    pub fn builder() -> TestGatewayBuilder {
        TestGatewayBuilder {
            config: test_config(two_provider_catalog()),
            adapters: Vec::new(),
            embedder: None,
        }
    }

    /// The mock adapter registered for `provider`
    pub fn adapter(&self, provider: &str) -> &Arc<MockAdapter> {
        let id = ProviderId::new(provider).expect("valid provider id");
        self.adapters
            .iter()
            .find(|a| *a.provider_id() == id)
            .expect("adapter registered for provider")
    }

    /// Total invocations across every registered mock adapter
    pub fn total_calls(&self) -> usize {
        self.adapters.iter().map(|a| a.calls()).sum()
    }
}

impl std::ops::Deref for TestGateway {
    type Target = Gateway;

    fn deref(&self) -> &Gateway {
        &self.gateway
    }
}

/// Builder for [`TestGateway`]
pub struct TestGatewayBuilder {
    config: GatewayConfig,
    adapters: Vec<Arc<MockAdapter>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl TestGatewayBuilder {
    /// Replace the catalog
    pub fn catalog(mut self, catalog: Vec<CatalogEntry>) -> Self {
        self.config.catalog = catalog;
        self
    }

    /// Tweak the configuration in place
    pub fn configure(mut self, f: impl FnOnce(&mut GatewayConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Register a mock adapter
    pub fn adapter(mut self, adapter: Arc<MockAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Use a specific embedder instead of the default [`MockEmbedder`]
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Assemble and start the gateway
    pub fn start(self) -> TestGateway {
        let adapter_set = Arc::new(AdapterSet::new());
        for adapter in &self.adapters {
            let registered: Arc<dyn ProviderAdapter> = adapter.clone();
            adapter_set.register(registered);
        }
        let embedder: Arc<dyn Embedder> = match self.embedder {
            Some(embedder) => embedder,
            None => MockEmbedder::new(),
        };

        let gateway =
            Gateway::start(&self.config, adapter_set, embedder).expect("gateway starts");
        TestGateway {
            gateway,
            adapters: self.adapters,
        }
    }
}

/// Poll `condition` until it holds or the timeout elapses.
///
/// Panics on timeout; integration tests prefer a loud failure over a hang.
pub async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !condition() {
        assert!(
            std::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

/// Unwrap a successful inference outcome
pub fn expect_result(outcome: GatewayResult<InferenceResult>) -> InferenceResult {
    match outcome {
        Ok(result) => result,
        Err(e) => panic!("expected a result, got error: {e}"),
    }
}

/// Unwrap an error outcome
pub fn expect_error(outcome: GatewayResult<InferenceResult>) -> GatewayError {
    match outcome {
        Ok(result) => panic!("expected an error, got result from {}", result.model_id),
        Err(e) => e,
    }
}
