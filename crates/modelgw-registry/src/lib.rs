//! # Model Gateway Registry
//!
//! Catalog of known (provider, model) pairs.
//!
//! The catalog is read-heavy: every routed request lists candidates. Reads
//! go through an atomically swappable snapshot; a reload builds the new
//! snapshot fully before the pointer swap, so readers never observe a
//! partial catalog and need no locking.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use arc_swap::ArcSwap;
use modelgw_core::{Capability, CapabilitySet, ModelDescriptor, ModelId, ProviderId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors building a catalog snapshot.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two catalog entries share a model id
    #[error("duplicate model id in catalog: {0}")]
    DuplicateModel(ModelId),
}

/// One immutable catalog generation.
#[derive(Debug)]
pub struct RegistrySnapshot {
    models: Vec<Arc<ModelDescriptor>>,
    by_id: HashMap<ModelId, Arc<ModelDescriptor>>,
}

impl RegistrySnapshot {
    /// Build a snapshot from catalog entries.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateModel`] when two entries share an
    /// id; a snapshot is all-or-nothing.
    pub fn from_descriptors(
        descriptors: Vec<ModelDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut by_id = HashMap::with_capacity(descriptors.len());
        let mut models = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let descriptor = Arc::new(descriptor);
            if by_id
                .insert(descriptor.id.clone(), Arc::clone(&descriptor))
                .is_some()
            {
                return Err(RegistryError::DuplicateModel(descriptor.id.clone()));
            }
            models.push(descriptor);
        }

        Ok(Self { models, by_id })
    }

    /// Number of catalog entries, including disabled ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// The model catalog behind an atomic snapshot pointer.
pub struct ModelRegistry {
    snapshot: ArcSwap<RegistrySnapshot>,
}

impl ModelRegistry {
    /// Create a registry from the initial catalog.
    ///
    /// # Errors
    /// Returns [`RegistryError`] if the catalog is malformed.
    pub fn new(descriptors: Vec<ModelDescriptor>) -> Result<Self, RegistryError> {
        let snapshot = RegistrySnapshot::from_descriptors(descriptors)?;
        if snapshot.is_empty() {
            warn!("Model registry started with an empty catalog");
        }
        Ok(Self {
            snapshot: ArcSwap::from_pointee(snapshot),
        })
    }

    /// Atomically replace the whole catalog.
    ///
    /// The new snapshot is fully built before the swap; a build failure
    /// leaves the current catalog untouched.
    ///
    /// # Errors
    /// Returns [`RegistryError`] if the replacement catalog is malformed.
    pub fn reload(&self, descriptors: Vec<ModelDescriptor>) -> Result<(), RegistryError> {
        let next = RegistrySnapshot::from_descriptors(descriptors)?;
        let count = next.len();
        self.snapshot.store(Arc::new(next));
        info!(models = count, "Model registry reloaded");
        Ok(())
    }

    /// The current snapshot. Cheap; holds no lock.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    /// Enabled models serving a single capability.
    #[must_use]
    pub fn list(&self, capability: Capability) -> Vec<Arc<ModelDescriptor>> {
        self.snapshot
            .load()
            .models
            .iter()
            .filter(|m| m.enabled && m.capabilities.contains(capability))
            .cloned()
            .collect()
    }

    /// Enabled models serving every capability in `required`.
    #[must_use]
    pub fn serving(&self, required: &CapabilitySet) -> Vec<Arc<ModelDescriptor>> {
        self.snapshot
            .load()
            .models
            .iter()
            .filter(|m| m.enabled && m.serves(required))
            .cloned()
            .collect()
    }

    /// Look up a model by id, enabled or not.
    #[must_use]
    pub fn get(&self, id: &ModelId) -> Option<Arc<ModelDescriptor>> {
        self.snapshot.load().by_id.get(id).cloned()
    }

    /// Distinct providers with at least one enabled model.
    #[must_use]
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        let snapshot = self.snapshot.load();
        let mut ids: Vec<ProviderId> = snapshot
            .models
            .iter()
            .filter(|m| m.enabled)
            .map(|m| m.provider.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Catalog size, including disabled entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    /// Whether the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }
}
