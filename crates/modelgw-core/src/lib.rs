//! # Model Gateway Core
//!
//! Core types, traits, and error handling for the Model Gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Request and result types
//! - Model descriptors and the capability model
//! - The provider adapter contract
//! - Error types and handling
//! - Validated domain types (newtypes)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod descriptor;
pub mod error;
pub mod request;
pub mod result;
pub mod types;

// Re-export commonly used types
pub use adapter::{AdapterResponse, ProviderAdapter, ProviderError, ProviderErrorKind};
pub use descriptor::{Capability, CapabilitySet, CostRate, LatencyClass, ModelDescriptor};
pub use error::{GatewayError, GatewayResult};
pub use request::{ChatMessage, InferenceRequest, MessageRole, RequestPayload, VolatilityClass};
pub use result::{InferenceResult, TokenUsage};
pub use types::{CallerId, ModelId, Priority, ProviderId, RequestId};
