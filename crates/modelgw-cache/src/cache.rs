//! The semantic cache proper.
//!
//! Entries are scanned linearly for the maximum cosine similarity. The
//! index is bounded: expired entries go first, then the lowest-hit-count
//! entries, so a burst of one-off requests cannot push out the entries that
//! actually earn their keep.

use crate::embedder::{cosine_similarity, Embedder, EmbedderError};
use modelgw_core::{CapabilitySet, InferenceRequest, InferenceResult, VolatilityClass};
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Semantic cache configuration
#[derive(Debug, Clone)]
pub struct SemanticCacheConfig {
    /// Minimum cosine similarity for a hit
    pub similarity_threshold: f32,
    /// Maximum number of entries held
    pub max_entries: usize,
    /// TTL applied to volatile (time-sensitive) content
    pub ttl_volatile: Duration,
    /// TTL applied to stable factual content
    pub ttl_stable: Duration,
    /// Class assumed when the request carries none
    pub default_volatility: VolatilityClass,
}

impl Default for SemanticCacheConfig {
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

impl SemanticCacheConfig {
    fn ttl_for(&self, class: VolatilityClass) -> Duration {
        match class {
            VolatilityClass::Volatile => self.ttl_volatile,
            VolatilityClass::Stable => self.ttl_stable,
        }
    }
}

/// Outcome of a cache lookup
#[derive(Debug)]
pub enum Lookup {
    /// A stored entry cleared the similarity threshold
    Hit {
        /// The stored result (not yet re-keyed to the new request)
        result: InferenceResult,
        /// The similarity score that produced the hit
        similarity: f32,
    },
    /// Nothing usable was stored
    Miss,
}

impl Lookup {
    /// Whether this lookup hit
    #[must_use]
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }
}

struct Entry {
    fingerprint: u64,
    capabilities: CapabilitySet,
    embedding: Vec<f32>,
    result: InferenceResult,
    created_at: Instant,
    ttl: Duration,
    hits: AtomicU64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

/// Cache counters, for the admin surface.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    /// Lookups that hit
    pub hits: u64,
    /// Lookups that missed
    pub misses: u64,
    /// Entries stored
    pub stores: u64,
    /// Entries evicted for capacity
    pub evictions: u64,
    /// Entries dropped by TTL expiry
    pub expirations: u64,
    /// Lookups degraded to a miss by an embedding failure
    pub embed_failures: u64,
    /// Entries currently held
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate over all lookups, 0.0 - 1.0
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

fn fingerprint(request: &InferenceRequest) -> u64 {
    let mut hasher = DefaultHasher::new();
    request.payload.normalized_text().hash(&mut hasher);
    request.required_capabilities.hash(&mut hasher);
    hasher.finish()
}

/// Approximate-match response cache keyed by request embedding.
pub struct SemanticCache {
    config: SemanticCacheConfig,
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<Arc<Entry>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    embed_failures: AtomicU64,
}

impl SemanticCache {
    /// Create a semantic cache backed by the given embedder
    #[must_use]
    pub fn new(config: SemanticCacheConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config,
            embedder,
            entries: RwLock::new(Vec::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            embed_failures: AtomicU64::new(0),
        }
    }

    /// Look up the best stored answer for `request`.
    ///
    /// A hit requires maximum cosine similarity at or above the threshold
    /// AND an exactly matching required-capability set; a capability
    /// mismatch voids a similarity match regardless of score. The hit only
    /// increments the entry's hit count; TTL runs from creation.
    pub async fn lookup(&self, request: &InferenceRequest) -> Lookup {
        let text = request.payload.normalized_text();
        let query = match self.embedder.embed(&text).await {
            Ok(vector) => vector,
            Err(e) => {
                self.embed_failures.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Embedding failed, degrading to cache miss");
                return Lookup::Miss;
            }
        };

        self.lookup_with_embedding(request, &query)
    }

    fn lookup_with_embedding(&self, request: &InferenceRequest, query: &[f32]) -> Lookup {
        let now = Instant::now();
        let mut saw_expired = false;
        let mut best: Option<(Arc<Entry>, f32)> = None;

        {
            let entries = self.entries.read();
            for entry in entries.iter() {
                if entry.is_expired(now) {
                    saw_expired = true;
                    continue;
                }
                if entry.capabilities != request.required_capabilities {
                    continue;
                }
                let similarity = cosine_similarity(query, &entry.embedding);
                if best.as_ref().map_or(true, |(_, s)| similarity > *s) {
                    best = Some((Arc::clone(entry), similarity));
                }
            }
        }

        // Checked-on-read expiry
        if saw_expired {
            self.drop_expired(now);
        }

        match best {
            Some((entry, similarity)) if similarity >= self.config.similarity_threshold => {
                entry.hits.fetch_add(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request = %request.id,
                    similarity,
                    "Semantic cache hit"
                );
                Lookup::Hit {
                    result: entry.result.clone(),
                    similarity,
                }
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Lookup::Miss
            }
        }
    }

    /// Store a freshly served result for future approximate hits.
    ///
    /// Embedding failure skips the store; the result has already been
    /// delivered to the caller, so nothing is lost but a future hit.
    pub async fn store(&self, request: &InferenceRequest, result: &InferenceResult) {
        let text = request.payload.normalized_text();
        let embedding = match self.embedder.embed(&text).await {
            Ok(vector) => vector,
            Err(e) => {
                self.embed_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Embedding failed, skipping cache store");
                return;
            }
        };

        let class = request.volatility.unwrap_or(self.config.default_volatility);
        let ttl = self.config.ttl_for(class);
        let entry = Arc::new(Entry {
            fingerprint: fingerprint(request),
            capabilities: request.required_capabilities.clone(),
            embedding,
            result: result.clone(),
            created_at: Instant::now(),
            ttl,
            hits: AtomicU64::new(0),
        });

        let mut entries = self.entries.write();

        // Replace an exact duplicate rather than accumulating copies
        entries.retain(|e| e.fingerprint != entry.fingerprint);
        entries.push(entry);
        self.stores.fetch_add(1, Ordering::Relaxed);

        if entries.len() > self.config.max_entries {
            let now = Instant::now();
            let before = entries.len();
            entries.retain(|e| !e.is_expired(now));
            self.expirations
                .fetch_add((before - entries.len()) as u64, Ordering::Relaxed);

            while entries.len() > self.config.max_entries {
                if let Some(idx) = entries
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, e)| e.hits.load(Ordering::Relaxed))
                    .map(|(i, _)| i)
                {
                    entries.swap_remove(idx);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Drop expired entries. Intended for a periodic sweeper task.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        self.drop_expired(Instant::now())
    }

    fn drop_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| !e.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    /// Remove every entry (admin surface)
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        info!(removed, "Semantic cache cleared");
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            embed_failures: self.embed_failures.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
