//! Registry of provider adapters.

use dashmap::DashMap;
use modelgw_core::{ProviderAdapter, ProviderId};
use std::sync::Arc;

/// Provider adapters keyed by provider id.
///
/// Adapters are external collaborators; the gateway registers one per
/// provider at startup. A provider in the model catalog with no registered
/// adapter is simply skipped during failover.
#[derive(Default)]
pub struct AdapterSet {
    adapters: DashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl AdapterSet {
    /// Create an empty adapter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own provider id, replacing any
    /// previous registration for that provider.
    pub fn register(&self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider_id().clone(), adapter);
    }

    /// Look up the adapter for a provider
    #[must_use]
    pub fn get(&self, provider: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).map(|a| Arc::clone(a.value()))
    }

    /// Number of registered adapters
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapters are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Sorted ids of registered providers
    #[must_use]
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.adapters.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
