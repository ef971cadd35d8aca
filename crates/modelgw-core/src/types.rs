//! Validated domain types (newtypes).
//!
//! Identifier types are thin validated wrappers so that a raw `String` can
//! never cross a component boundary by accident.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length accepted for any identifier string.
const MAX_ID_LEN: usize = 128;

fn validate_id(value: &str, what: &str) -> Result<(), crate::error::GatewayError> {
    if value.is_empty() {
        return Err(crate::error::GatewayError::validation(
            format!("{what} cannot be empty"),
            Some(what.to_string()),
        ));
    }
    if value.len() > MAX_ID_LEN {
        return Err(crate::error::GatewayError::validation(
            format!("{what} exceeds {MAX_ID_LEN} characters"),
            Some(what.to_string()),
        ));
    }
    Ok(())
}

/// Unique request identifier, doubling as the caller's idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Create a request ID from a caller-supplied key.
    ///
    /// # Errors
    /// Returns a validation error if the key is empty or too long.
    pub fn new(value: impl Into<String>) -> Result<Self, crate::error::GatewayError> {
        let value = value.into();
        validate_id(&value, "request id")?;
        Ok(Self(value))
    }

    /// Generate a fresh random request ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("req-{}", uuid::Uuid::new_v4()))
    }

    /// Get the inner string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the caller (agent, tenant, or service) submitting a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    /// Create a caller ID.
    ///
    /// # Errors
    /// Returns a validation error if the value is empty or too long.
    pub fn new(value: impl Into<String>) -> Result<Self, crate::error::GatewayError> {
        let value = value.into();
        validate_id(&value, "caller id")?;
        Ok(Self(value))
    }

    /// Get the inner string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one upstream provider (e.g. "anthropic", "openai", "local").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a provider ID.
    ///
    /// # Errors
    /// Returns a validation error if the value is empty or too long.
    pub fn new(value: impl Into<String>) -> Result<Self, crate::error::GatewayError> {
        let value = value.into();
        validate_id(&value, "provider id")?;
        Ok(Self(value))
    }

    /// Get the inner string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one model within a provider's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Create a model ID.
    ///
    /// # Errors
    /// Returns a validation error if the value is empty or too long.
    pub fn new(value: impl Into<String>) -> Result<Self, crate::error::GatewayError> {
        let value = value.into();
        validate_id(&value, "model id")?;
        Ok(Self(value))
    }

    /// Get the inner string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request priority. Higher values are served first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Lowest priority
    pub const LOW: Self = Self(0);
    /// Default priority
    pub const NORMAL: Self = Self(50);
    /// Highest priority
    pub const URGENT: Self = Self(100);
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
