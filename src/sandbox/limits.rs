//! Resource limiting and per-store state for sketch execution.

use std::time::{Duration, Instant};

use wasmtime::{ResourceLimiter, Store, UpdateDeadline};

use crate::error::SketchError;
use crate::sandbox::context::CapabilityContext;

/// Resource limiter that enforces memory and table size limits.
pub struct SandboxLimiter {
    /// Maximum linear memory in bytes.
    max_memory: u64,
    /// Peak memory allocation (highest ever seen).
    peak_memory: u64,
    /// Maximum table elements.
    max_table_elements: u64,
    /// Whether a limit has been hit.
    limit_exceeded: bool,
}

impl SandboxLimiter {
    /// Create a new resource limiter with the specified memory limit.
    pub fn new(max_memory: u64) -> Self {
        Self {
            max_memory,
            peak_memory: 0,
            max_table_elements: 10_000,
            limit_exceeded: false,
        }
    }

    /// Check if any limit has been exceeded.
    pub fn limit_exceeded(&self) -> bool {
        self.limit_exceeded
    }

    /// Get the peak memory usage.
    pub fn peak_memory(&self) -> u64 {
        self.peak_memory
    }
}

impl ResourceLimiter for SandboxLimiter {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        let desired_bytes = desired as u64;

        if desired_bytes > self.max_memory {
            self.limit_exceeded = true;
            return Ok(false);
        }

        self.peak_memory = self.peak_memory.max(desired_bytes);
        Ok(true)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired as u64 > self.max_table_elements {
            self.limit_exceeded = true;
            return Ok(false);
        }
        Ok(true)
    }
}

/// Store data: the resource limiter plus the execution's capability context.
pub struct StoreData {
    /// The resource limiter.
    pub limiter: SandboxLimiter,
    /// Everything the sketch's imports resolve to.
    pub ctx: CapabilityContext,
}

impl StoreData {
    /// Create new store data with the given memory limit and context.
    pub fn new(max_memory: u64, ctx: CapabilityContext) -> Self {
        Self {
            limiter: SandboxLimiter::new(max_memory),
            ctx,
        }
    }
}

/// Extension trait for configuring a sketch store.
pub trait StoreLimiterExt {
    /// Configure the store with resource limiting enabled.
    fn configure_limiter(&mut self);

    /// Trap with [`SketchError::Timeout`] once `timeout` of wall-clock time
    /// has passed, checked on every epoch tick.
    ///
    /// The deadline is tracked per store, so concurrent executions sharing an
    /// engine (and its epoch counter) do not shorten each other's budget.
    fn configure_deadline(&mut self, timeout: Duration);
}

impl StoreLimiterExt for Store<StoreData> {
    fn configure_limiter(&mut self) {
        self.limiter(|data| &mut data.limiter);
    }

    fn configure_deadline(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        self.set_epoch_deadline(1);
        self.epoch_deadline_callback(move |_store| {
            if Instant::now() >= deadline {
                Err(SketchError::Timeout(timeout).into())
            } else {
                Ok(UpdateDeadline::Continue(1))
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_allows_within_limit() {
        let mut limiter = SandboxLimiter::new(1024 * 1024);

        let result = limiter.memory_growing(0, 512 * 1024, None).unwrap();
        assert!(result);
        assert!(!limiter.limit_exceeded());
        assert_eq!(limiter.peak_memory(), 512 * 1024);
    }

    #[test]
    fn test_limiter_denies_over_limit() {
        let mut limiter = SandboxLimiter::new(1024 * 1024);

        let result = limiter.memory_growing(0, 2 * 1024 * 1024, None).unwrap();
        assert!(!result);
        assert!(limiter.limit_exceeded());
    }

    #[test]
    fn test_limiter_caps_tables() {
        let mut limiter = SandboxLimiter::new(1024);
        assert!(limiter.table_growing(0, 100, None).unwrap());
        assert!(!limiter.table_growing(0, 20_000, None).unwrap());
        assert!(limiter.limit_exceeded());
    }
}
