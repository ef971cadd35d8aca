//! # Model Gateway Routing
//!
//! Candidate selection and failover for the Model Gateway.
//!
//! The router turns a request into a ranked list of (provider, model)
//! candidates using the registry, circuit breaker, and rate limiter, then
//! walks that list with a bounded number of failover attempts. Selection is
//! deterministic: given identical registry, breaker, and limiter state, the
//! same request always ranks the same candidates in the same order.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapters;
pub mod router;

// Re-export main types
pub use adapters::AdapterSet;
pub use router::{Router, RouterConfig};
