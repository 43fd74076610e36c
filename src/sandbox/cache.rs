//! Compiled-sketch caching and the deterministic engine.
//!
//! The cache is owned by one sandbox; there is no process-wide instance, so
//! independent sandboxes never observe each other's state.

use std::sync::Arc;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use wasmtime::Engine;

use crate::error::{Result, SketchError};
use crate::sandbox::structure::CompiledSketch;

/// Compiled sketches kept per sandbox unless configured otherwise.
pub const DEFAULT_CACHE_CAPACITY: u64 = 128;

/// A bounded, thread-safe cache of compiled sketches keyed by the sha256 of
/// their source text.
///
/// A compiled module is a pure function of its source, so repeated renders of
/// the same sketch (replays, verifies, loop previews) skip compilation. Once
/// `capacity` sketches are cached the least recently used one is evicted.
///
/// # Example
///
/// ```rust,ignore
/// use wasm_sketch_sandbox_rs::sandbox::cache::{ModuleCache, SharedEngine};
///
/// let engine = SharedEngine::new(false)?;
/// let cache = ModuleCache::new(16);
///
/// let first = cache.get_or_compile(&engine, source)?;
/// let second = cache.get_or_compile(&engine, source)?;
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
#[derive(Clone)]
pub struct ModuleCache {
    cache: Cache<String, Arc<CompiledSketch>>,
    capacity: u64,
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ModuleCache {
    /// Create an empty cache holding at most `capacity` sketches.
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache, capacity }
    }

    /// Cache key for `source`.
    pub fn key(source: &str) -> String {
        hex::encode(Sha256::digest(source.as_bytes()))
    }

    /// Most sketches kept at once.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get a cached sketch or compile it if not present.
    ///
    /// Compile errors are returned and never cached.
    pub fn get_or_compile(&self, engine: &Engine, source: &str) -> Result<Arc<CompiledSketch>> {
        let key = Self::key(source);
        let result = self
            .cache
            .try_get_with(key, || CompiledSketch::compile(engine, source).map(Arc::new));
        if let Ok(compiled) = &result {
            tracing::debug!(
                entries = self.cache.entry_count(),
                capacity = self.capacity,
                "compiled sketch ready"
            );
            return Ok(Arc::clone(compiled));
        }
        result.map_err(unshare_error)
    }

    /// Check if `source` is cached.
    pub fn contains(&self, source: &str) -> bool {
        self.cache.contains_key(&Self::key(source))
    }

    /// Remove `source` from the cache; returns whether it was present.
    pub fn remove(&self, source: &str) -> bool {
        self.cache.remove(&Self::key(source)).is_some()
    }

    /// Clear all cached sketches.
    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    /// Get the number of cached sketches.
    pub fn len(&self) -> usize {
        // Counts lag behind inserts and evictions until maintenance runs.
        self.cache.run_pending_tasks();
        self.cache.entry_count() as usize
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Recover an owned error from the one shared between callers that raced to
/// compile the same source.
fn unshare_error(error: Arc<SketchError>) -> SketchError {
    Arc::try_unwrap(error).unwrap_or_else(|shared| match shared.as_ref() {
        SketchError::Compile(e) => SketchError::Compile(anyhow::anyhow!("{e:#}")),
        other => SketchError::Compile(anyhow::anyhow!("{other}")),
    })
}

/// A shared engine configured for deterministic execution.
///
/// Wraps an `Arc<Engine>` for thread-safe sharing.
#[derive(Clone)]
pub struct SharedEngine {
    engine: Arc<Engine>,
}

impl std::fmt::Debug for SharedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEngine")
            .field("engine", &"<wasmtime::Engine>")
            .finish()
    }
}

impl SharedEngine {
    /// Create a deterministic engine, optionally with fuel metering.
    pub fn new(enable_fuel: bool) -> Result<Self> {
        let config = Self::deterministic_config(enable_fuel);
        Self::from_config(&config)
    }

    /// Create a new shared engine from an existing engine configuration.
    pub fn from_config(config: &wasmtime::Config) -> Result<Self> {
        let engine = Engine::new(config).map_err(SketchError::RuntimeInit)?;
        Ok(Self {
            engine: Arc::new(engine),
        })
    }

    /// Get a reference to the underlying engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get the Arc<Engine> for sharing.
    pub fn arc(&self) -> Arc<Engine> {
        Arc::clone(&self.engine)
    }

    /// Engine settings that keep execution bit-reproducible across hosts.
    fn deterministic_config(enable_fuel: bool) -> wasmtime::Config {
        let mut config = wasmtime::Config::new();
        config.epoch_interruption(true);
        config.consume_fuel(enable_fuel);
        config.cranelift_nan_canonicalization(true);
        config.wasm_threads(false);
        config.relaxed_simd_deterministic(true);
        config
    }
}

impl std::ops::Deref for SharedEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}
