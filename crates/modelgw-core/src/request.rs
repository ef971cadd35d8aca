//! Request types for the gateway.
//!
//! An [`InferenceRequest`] is one unit of work. It is created at the
//! caller-facing boundary and never mutated afterwards; downstream components
//! that need annotations (the queue stamps the enqueue time) decorate a copy.

use crate::descriptor::{Capability, CapabilitySet};
use crate::types::{CallerId, Priority, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction
    System,
    /// User turn
    User,
    /// Assistant turn
    Assistant,
}

/// One message in a chat payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the author
    pub role: MessageRole,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request payload, tagged by kind.
///
/// The gateway treats the payload as opaque except for size and token
/// estimation; the tag exists so capability-based filtering keeps type
/// safety instead of sniffing arbitrary JSON. `Opaque` is the fallback for
/// payloads the gateway does not model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPayload {
    /// Chat conversation
    Chat {
        /// Conversation messages
        messages: Vec<ChatMessage>,
    },
    /// Embedding generation
    Embedding {
        /// Text to embed
        input: String,
    },
    /// Image understanding
    Vision {
        /// Text prompt accompanying the image
        prompt: String,
        /// Image location
        image_url: String,
    },
    /// Unmodeled payload, forwarded verbatim
    Opaque {
        /// Raw bytes
        data: Vec<u8>,
    },
}

impl RequestPayload {
    /// The capability implied by this payload kind, if any.
    #[must_use]
    pub fn implied_capability(&self) -> Option<Capability> {
        match self {
            Self::Chat { .. } => Some(Capability::Chat),
            Self::Embedding { .. } => Some(Capability::Embeddings),
            Self::Vision { .. } => Some(Capability::Vision),
            Self::Opaque { .. } => None,
        }
    }

    /// Whether the payload carries no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Chat { messages } => messages.iter().all(|m| m.content.is_empty()),
            Self::Embedding { input } => input.is_empty(),
            Self::Vision { prompt, image_url } => prompt.is_empty() && image_url.is_empty(),
            Self::Opaque { data } => data.is_empty(),
        }
    }

    /// Rough token estimate for admission and context-window checks.
    ///
    /// Uses the ~4 characters per token heuristic; adapters report exact
    /// usage after the fact.
    #[must_use]
    pub fn estimated_tokens(&self) -> u32 {
        let chars = match self {
            Self::Chat { messages } => messages.iter().map(|m| m.content.len()).sum::<usize>(),
            Self::Embedding { input } => input.len(),
            Self::Vision { prompt, .. } => prompt.len(),
            Self::Opaque { data } => data.len(),
        };
        ((chars / 4) as u32).max(1)
    }

    /// Canonical text rendering used for cache embedding and fingerprinting.
    ///
    /// Lowercased with whitespace collapsed so trivially reworded duplicates
    /// normalize to the same string. Opaque payloads render their length
    /// only; they are effectively uncacheable by similarity.
    #[must_use]
    pub fn normalized_text(&self) -> String {
        let raw = match self {
            Self::Chat { messages } => messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            Self::Embedding { input } => input.clone(),
            Self::Vision { prompt, image_url } => format!("{prompt} {image_url}"),
            Self::Opaque { data } => format!("opaque:{}", data.len()),
        };
        raw.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Cache-volatility classification of a request's content.
///
/// Assigned at the boundary from configuration, never derived by the cache
/// itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityClass {
    /// Time-sensitive content; short cache TTL
    Volatile,
    /// Stable factual content; long cache TTL
    #[default]
    Stable,
}

/// One unit of inference work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Caller-supplied idempotency key
    pub id: RequestId,
    /// Caller submitting the request
    pub caller: CallerId,
    /// Capabilities the serving model must provide
    pub required_capabilities: CapabilitySet,
    /// The payload to run
    pub payload: RequestPayload,
    /// Scheduling priority, higher first
    #[serde(default)]
    pub priority: Priority,
    /// Maximum acceptable cost in USD, if constrained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    /// Maximum acceptable provider latency, if constrained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<Duration>,
    /// Absolute time after which the request is not worth serving
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Cache TTL class, when the boundary classified the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility: Option<VolatilityClass>,
    /// When the queue admitted the request; stamped by the queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl InferenceRequest {
    /// Create a builder
    #[must_use]
    pub fn builder(caller: CallerId, payload: RequestPayload) -> InferenceRequestBuilder {
        InferenceRequestBuilder {
            id: None,
            caller,
            required_capabilities: CapabilitySet::new(),
            payload,
            priority: Priority::default(),
            max_cost: None,
            max_latency: None,
            deadline: None,
            volatility: None,
        }
    }

    /// Rough token estimate for this request
    #[must_use]
    pub fn estimated_tokens(&self) -> u32 {
        self.payload.estimated_tokens()
    }

    /// Whether the deadline has passed at `now`
    #[must_use]
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| d < now)
    }

    /// Copy-on-decorate: a clone with the enqueue time stamped.
    #[must_use]
    pub fn with_enqueue_time(&self, at: DateTime<Utc>) -> Self {
        let mut copy = self.clone();
        copy.enqueued_at = Some(at);
        copy
    }

    /// Validate structural invariants.
    ///
    /// # Errors
    /// Returns a validation error for empty payloads or contradictory
    /// constraints.
    pub fn validate(&self) -> Result<(), crate::error::GatewayError> {
        if self.payload.is_empty() {
            return Err(crate::error::GatewayError::validation(
                "payload cannot be empty",
                Some("payload".to_string()),
            ));
        }
        if let Some(cost) = self.max_cost {
            if cost <= 0.0 || !cost.is_finite() {
                return Err(crate::error::GatewayError::validation(
                    format!("max_cost must be positive and finite, got {cost}"),
                    Some("max_cost".to_string()),
                ));
            }
        }
        if self.max_latency == Some(Duration::ZERO) {
            return Err(crate::error::GatewayError::validation(
                "max_latency must be non-zero",
                Some("max_latency".to_string()),
            ));
        }
        Ok(())
    }
}

/// Builder for [`InferenceRequest`]
#[derive(Debug)]
pub struct InferenceRequestBuilder {
    id: Option<RequestId>,
    caller: CallerId,
    required_capabilities: CapabilitySet,
    payload: RequestPayload,
    priority: Priority,
    max_cost: Option<f64>,
    max_latency: Option<Duration>,
    deadline: Option<DateTime<Utc>>,
    volatility: Option<VolatilityClass>,
}

impl InferenceRequestBuilder {
    /// Set the idempotency key
    #[must_use]
    pub fn id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }

    /// Require a capability
    #[must_use]
    pub fn require(mut self, capability: Capability) -> Self {
        self.required_capabilities = self.required_capabilities.with(capability);
        self
    }

    /// Set the full required capability set
    #[must_use]
    pub fn required_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    /// Set the priority
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the cost ceiling
    #[must_use]
    pub fn max_cost(mut self, max_cost: f64) -> Self {
        self.max_cost = Some(max_cost);
        self
    }

    /// Set the latency ceiling
    #[must_use]
    pub fn max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = Some(max_latency);
        self
    }

    /// Set the absolute deadline
    #[must_use]
    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the volatility class
    #[must_use]
    pub fn volatility(mut self, volatility: VolatilityClass) -> Self {
        self.volatility = Some(volatility);
        self
    }

    /// Build and validate the request.
    ///
    /// If no capability was required explicitly, the payload's implied
    /// capability is used; an `Opaque` payload must state its requirements.
    ///
    /// # Errors
    /// Returns a validation error on structural problems.
    pub fn build(self) -> Result<InferenceRequest, crate::error::GatewayError> {
        let mut required = self.required_capabilities;
        if required.is_empty() {
            match self.payload.implied_capability() {
                Some(cap) => required = CapabilitySet::single(cap),
                None => {
                    return Err(crate::error::GatewayError::validation(
                        "opaque payloads must declare required capabilities",
                        Some("required_capabilities".to_string()),
                    ));
                }
            }
        }

        let request = InferenceRequest {
            id: self.id.unwrap_or_else(RequestId::generate),
            caller: self.caller,
            required_capabilities: required,
            payload: self.payload,
            priority: self.priority,
            max_cost: self.max_cost,
            max_latency: self.max_latency,
            deadline: self.deadline,
            volatility: self.volatility,
            enqueued_at: None,
        };
        request.validate()?;
        Ok(request)
    }
}
