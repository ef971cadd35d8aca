//! Model descriptors and the capability model.
//!
//! A [`ModelDescriptor`] identifies one (provider, model) pair together with
//! everything the router needs to rank it: capabilities, cost rates, context
//! window, and latency class. Descriptors are immutable once loaded; the
//! registry replaces them wholesale on reload.

use crate::types::{ModelId, ProviderId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A capability a model can serve.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Chat / text completion
    Chat,
    /// Embedding generation
    Embeddings,
    /// Image understanding
    Vision,
    /// Tool / function calling
    Tools,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Embeddings => write!(f, "embeddings"),
            Self::Vision => write!(f, "vision"),
            Self::Tools => write!(f, "tools"),
        }
    }
}

/// An ordered set of capabilities.
///
/// Ordered so that two sets with the same members always serialize and hash
/// identically; the semantic cache relies on that for its fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Create an empty capability set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set containing a single capability
    #[must_use]
    pub fn single(capability: Capability) -> Self {
        let mut set = BTreeSet::new();
        set.insert(capability);
        Self(set)
    }

    /// Add a capability
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    /// Check whether this set contains a capability
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Check whether this set contains every capability in `required`
    #[must_use]
    pub fn contains_all(&self, required: &Self) -> bool {
        required.0.is_subset(&self.0)
    }

    /// Check if the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the capabilities in order
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for cap in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{cap}")?;
            first = false;
        }
        Ok(())
    }
}

/// Declared latency class of a model.
///
/// Ordering is fastest-first so the router can use it directly as a ranking
/// tiebreaker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LatencyClass {
    /// Sub-second class
    Fast,
    /// Seconds class
    Standard,
    /// Tens-of-seconds class (large context, batch)
    Slow,
}

impl fmt::Display for LatencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Standard => write!(f, "standard"),
            Self::Slow => write!(f, "slow"),
        }
    }
}

/// Cost rates for a model, in USD per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRate {
    /// Cost per 1K input tokens
    pub input_per_1k: f64,
    /// Cost per 1K output tokens
    pub output_per_1k: f64,
}

impl CostRate {
    /// Cost of a request with the given token counts.
    #[must_use]
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        f64::from(input_tokens) / 1000.0 * self.input_per_1k
            + f64::from(output_tokens) / 1000.0 * self.output_per_1k
    }

    /// Estimated cost assuming all tokens are input tokens.
    ///
    /// Used by the router for max-cost filtering before the output size is
    /// known.
    #[must_use]
    pub fn estimate(&self, estimated_tokens: u32) -> f64 {
        f64::from(estimated_tokens) / 1000.0 * self.input_per_1k
    }
}

/// Describes one (provider, model) pair in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model identifier, unique within the catalog
    pub id: ModelId,
    /// Provider serving this model
    pub provider: ProviderId,
    /// Capabilities this model can serve
    pub capabilities: CapabilitySet,
    /// Cost rates
    pub cost: CostRate,
    /// Maximum context window in tokens
    pub max_context_tokens: u32,
    /// Declared latency class
    pub latency_class: LatencyClass,
    /// Whether the model is eligible for routing
    pub enabled: bool,
}

impl ModelDescriptor {
    /// Create a descriptor builder
    #[must_use]
    pub fn builder(id: ModelId, provider: ProviderId) -> ModelDescriptorBuilder {
        ModelDescriptorBuilder {
            id,
            provider,
            capabilities: CapabilitySet::new(),
            cost: CostRate {
                input_per_1k: 0.0,
                output_per_1k: 0.0,
            },
            max_context_tokens: 8192,
            latency_class: LatencyClass::Standard,
            enabled: true,
        }
    }

    /// Check whether this model can serve every required capability.
    #[must_use]
    pub fn serves(&self, required: &CapabilitySet) -> bool {
        self.capabilities.contains_all(required)
    }

    /// Check whether a request of `estimated_tokens` fits the context window.
    #[must_use]
    pub fn fits_context(&self, estimated_tokens: u32) -> bool {
        estimated_tokens <= self.max_context_tokens
    }
}

/// Builder for [`ModelDescriptor`]
#[derive(Debug)]
pub struct ModelDescriptorBuilder {
    id: ModelId,
    provider: ProviderId,
    capabilities: CapabilitySet,
    cost: CostRate,
    max_context_tokens: u32,
    latency_class: LatencyClass,
    enabled: bool,
}

impl ModelDescriptorBuilder {
    /// Add a capability
    #[must_use]
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities = self.capabilities.with(capability);
        self
    }

    /// Set the capability set
    #[must_use]
    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set cost rates
    #[must_use]
    pub fn cost(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.cost = CostRate {
            input_per_1k,
            output_per_1k,
        };
        self
    }

    /// Set the context window
    #[must_use]
    pub fn max_context_tokens(mut self, tokens: u32) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    /// Set the latency class
    #[must_use]
    pub fn latency_class(mut self, class: LatencyClass) -> Self {
        self.latency_class = class;
        self
    }

    /// Set the enabled flag
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Build the descriptor
    #[must_use]
    pub fn build(self) -> ModelDescriptor {
        ModelDescriptor {
            id: self.id,
            provider: self.provider,
            capabilities: self.capabilities,
            cost: self.cost,
            max_context_tokens: self.max_context_tokens,
            latency_class: self.latency_class,
            enabled: self.enabled,
        }
    }
}
