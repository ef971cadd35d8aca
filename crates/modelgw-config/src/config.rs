//! Configuration types and file loading.

use modelgw_core::{
    Capability, CapabilitySet, GatewayError, LatencyClass, ModelDescriptor, ModelId, ProviderId,
    VolatilityClass,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use validator::Validate;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse failure
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parse failure
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parse failure
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// Unrecognized file extension
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// Field-level validation failure
    #[error("config validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// A catalog entry could not be converted into a descriptor
    #[error("invalid catalog entry: {0}")]
    Catalog(#[from] GatewayError),

    /// The file watcher could not be established
    #[error("config watch failed: {0}")]
    Watch(#[from] notify::Error),
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML (`.yaml`, `.yml`)
    Yaml,
    /// TOML (`.toml`)
    Toml,
    /// JSON (`.json`)
    Json,
}

impl ConfigFormat {
    /// Infer the format from a file path's extension.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnsupportedFormat`] for unknown extensions.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// One model in the configured catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CatalogEntry {
    /// Model identifier, unique within the catalog
    #[validate(length(min = 1, max = 128))]
    pub id: String,
    /// Provider serving the model
    #[validate(length(min = 1, max = 128))]
    pub provider: String,
    /// Capabilities the model serves
    pub capabilities: Vec<Capability>,
    /// USD per 1K input tokens
    #[validate(range(min = 0.0))]
    pub cost_input_per_1k: f64,
    /// USD per 1K output tokens
    #[validate(range(min = 0.0))]
    pub cost_output_per_1k: f64,
    /// Context window in tokens
    #[validate(range(min = 1))]
    pub max_context_tokens: u32,
    /// Declared latency class
    #[serde(default = "default_latency_class")]
    pub latency_class: LatencyClass,
    /// Whether the model participates in routing
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_latency_class() -> LatencyClass {
    LatencyClass::Standard
}

fn default_true() -> bool {
    true
}

impl CatalogEntry {
    /// Convert into the core descriptor.
    ///
    /// # Errors
    /// Returns [`ConfigError::Catalog`] when an id fails core validation.
    pub fn into_descriptor(self) -> Result<ModelDescriptor, ConfigError> {
        let descriptor = ModelDescriptor::builder(
            ModelId::new(self.id)?,
            ProviderId::new(self.provider)?,
        )
        .capabilities(self.capabilities.into_iter().collect::<CapabilitySet>())
        .cost(self.cost_input_per_1k, self.cost_output_per_1k)
        .max_context_tokens(self.max_context_tokens)
        .latency_class(self.latency_class)
        .enabled(self.enabled)
        .build();
        Ok(descriptor)
    }
}

/// Per-provider rate-limit override
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateLimitOverride {
    /// Bucket capacity in tokens
    #[validate(range(min = 1.0))]
    pub capacity: f64,
    /// Refill rate in tokens per second
    #[validate(range(min = 0.001))]
    pub refill_per_sec: f64,
}

/// Rate limiter tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RateLimitSection {
    /// Default bucket capacity in tokens
    #[validate(range(min = 1.0))]
    pub capacity: f64,
    /// Default refill rate in tokens per second
    #[validate(range(min = 0.001))]
    pub refill_per_sec: f64,
    /// Idle period before a bucket is evicted
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Per-provider overrides keyed by provider id
    pub provider_overrides: HashMap<String, RateLimitOverride>,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            capacity: 10_000.0,
            refill_per_sec: 1_000.0,
            idle_timeout: Duration::from_secs(600),
            provider_overrides: HashMap::new(),
        }
    }
}

/// Circuit breaker tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CircuitBreakerSection {
    /// Consecutive failures before the circuit opens
    #[validate(range(min = 1))]
    pub failure_threshold: u32,
    /// Base cooldown before a probe is permitted
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
    /// Cooldown growth factor on failed probes
    #[validate(range(min = 1.0))]
    pub cooldown_multiplier: f64,
    /// Cooldown ceiling
    #[serde(with = "humantime_serde")]
    pub max_cooldown: Duration,
    /// Consecutive successes in recovery before the circuit closes
    #[validate(range(min = 1))]
    pub recovery_window: u32,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            cooldown_multiplier: 2.0,
            max_cooldown: Duration::from_secs(300),
            recovery_window: 10,
        }
    }
}

/// Semantic cache tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheSection {
    /// Minimum cosine similarity for a hit
    #[validate(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: f32,
    /// Maximum entries held
    #[validate(range(min = 1))]
    pub max_entries: usize,
    /// TTL for volatile (time-sensitive) content
    #[serde(with = "humantime_serde")]
    pub ttl_volatile: Duration,
    /// TTL for stable factual content
    #[serde(with = "humantime_serde")]
    pub ttl_stable: Duration,
    /// Class assumed when a request carries none
    pub default_volatility: VolatilityClass,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            max_entries: 1024,
            ttl_volatile: Duration::from_secs(60),
            ttl_stable: Duration::from_secs(3600),
            default_volatility: VolatilityClass::Stable,
        }
    }
}

/// Request queue tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QueueSection {
    /// Entries held before admission is refused
    #[validate(range(min = 1))]
    pub max_depth: usize,
    /// Round-robin weights keyed by caller id; unknown callers weigh 1
    pub caller_weights: HashMap<String, u32>,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            max_depth: 1024,
            caller_weights: HashMap::new(),
        }
    }
}

/// Router tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RouterSection {
    /// Additional candidates tried after the first fails transiently
    #[validate(range(max = 8))]
    pub max_failover_candidates: u32,
    /// Invoke timeout when a request carries no latency ceiling
    #[serde(with = "humantime_serde")]
    pub default_invoke_timeout: Duration,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            max_failover_candidates: 2,
            default_invoke_timeout: Duration::from_secs(30),
        }
    }
}

/// Worker pool and sweeper tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WorkerSection {
    /// Concurrent worker tasks pulling from the queue
    #[validate(range(min = 1, max = 1024))]
    pub count: usize,
    /// Interval between background sweeps (cache TTL, idle buckets, queue
    /// deadlines)
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            count: 8,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Logging setup
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level filter (e.g. "info", "modelgw=debug")
    pub level: String,
    /// Emit JSON-formatted logs
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// The model catalog
    #[validate(nested)]
    pub catalog: Vec<CatalogEntry>,
    /// Rate limiter tuning
    #[validate(nested)]
    pub rate_limit: RateLimitSection,
    /// Circuit breaker tuning
    #[validate(nested)]
    pub circuit_breaker: CircuitBreakerSection,
    /// Semantic cache tuning
    #[validate(nested)]
    pub cache: CacheSection,
    /// Request queue tuning
    #[validate(nested)]
    pub queue: QueueSection,
    /// Router tuning
    #[validate(nested)]
    pub router: RouterSection,
    /// Worker pool tuning
    #[validate(nested)]
    pub workers: WorkerSection,
    /// Logging setup
    #[validate(nested)]
    pub logging: LoggingSection,
}

impl GatewayConfig {
    /// Convert the catalog section into core descriptors.
    ///
    /// # Errors
    /// Returns [`ConfigError::Catalog`] for entries that fail id validation.
    pub fn descriptors(&self) -> Result<Vec<ModelDescriptor>, ConfigError> {
        self.catalog
            .iter()
            .cloned()
            .map(CatalogEntry::into_descriptor)
            .collect()
    }

    /// Apply environment overrides for the highest-churn knobs.
    ///
    /// Recognized: `MODELGW_LOG_LEVEL`, `MODELGW_WORKERS`,
    /// `MODELGW_QUEUE_MAX_DEPTH`, `MODELGW_SIMILARITY_THRESHOLD`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("MODELGW_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(count) = env_parse::<usize>("MODELGW_WORKERS") {
            self.workers.count = count;
        }
        if let Some(depth) = env_parse::<usize>("MODELGW_QUEUE_MAX_DEPTH") {
            self.queue.max_depth = depth;
        }
        if let Some(threshold) = env_parse::<f32>("MODELGW_SIMILARITY_THRESHOLD") {
            self.cache.similarity_threshold = threshold;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                debug!(key, raw, "Ignoring unparseable environment override");
                None
            }
        },
        Err(_) => None,
    }
}

/// Parse configuration from a string in the given format.
///
/// # Errors
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_config_str(content: &str, format: ConfigFormat) -> Result<GatewayConfig, ConfigError> {
    let mut config: GatewayConfig = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file, inferring the format from its extension.
///
/// # Errors
/// Returns [`ConfigError`] on read, parse, or validation failure.
pub async fn load_config(path: impl AsRef<Path>) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let content = tokio::fs::read_to_string(path).await?;
    load_config_str(&content, format)
}
