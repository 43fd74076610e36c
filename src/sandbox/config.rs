//! Sandbox configuration with builder pattern.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SketchError};
use crate::sandbox::cache::DEFAULT_CACHE_CAPACITY;

/// Configuration for the sketch sandbox.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Maximum wall-clock time for one render before timeout.
    pub timeout: Duration,
    /// Maximum linear memory in bytes.
    pub max_memory: u64,
    /// Maximum fuel (instruction count limit).
    pub max_fuel: Option<u64>,
    /// Epoch interruption interval for cooperative timeout.
    pub epoch_tick_interval: Duration,
    /// Loop playback rate in frames per second.
    pub fps: u32,
    /// Shortest loop duration in seconds.
    pub min_duration: f64,
    /// Longest loop duration in seconds.
    pub max_duration: f64,
    /// Largest accepted width or height.
    pub max_dimension: u32,
    /// Compiled sketches kept before the least recently used is evicted.
    pub cache_capacity: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_memory: 64 * 1024 * 1024, // 64MB
            max_fuel: None,
            epoch_tick_interval: Duration::from_millis(10),
            fps: 30,
            min_duration: 1.0,
            max_duration: 4.0,
            max_dimension: 8192,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| SketchError::Config(e.to_string()))?;
        file.into_config()
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Plan the frame count for a loop render that requested `total_frames`.
    ///
    /// The requested duration (`total_frames / fps`) is clamped into
    /// `[min_duration, max_duration]`; the frame count is then
    /// `floor(duration * fps)`.
    pub fn loop_plan(&self, total_frames: u32) -> LoopPlan {
        let fps = self.fps.max(1) as f64;
        let duration = (total_frames as f64 / fps).clamp(self.min_duration, self.max_duration);
        let frames = ((duration * fps).floor() as u32).max(1);
        LoopPlan {
            total_frames: frames,
            duration,
            fps: self.fps.max(1),
        }
    }

    fn validate(self) -> Result<Self> {
        if self.fps == 0 {
            return Err(SketchError::Config("fps must be positive".to_string()));
        }
        if !(self.min_duration > 0.0 && self.min_duration <= self.max_duration) {
            return Err(SketchError::Config(format!(
                "invalid loop duration range {}..{}",
                self.min_duration, self.max_duration
            )));
        }
        if self.max_dimension == 0 {
            return Err(SketchError::Config("max_dimension must be positive".to_string()));
        }
        if self.epoch_tick_interval.is_zero() {
            return Err(SketchError::Config("epoch tick interval must be positive".to_string()));
        }
        if self.cache_capacity == 0 {
            return Err(SketchError::Config("cache_capacity must be positive".to_string()));
        }
        Ok(self)
    }
}

/// Frame timing of one loop render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopPlan {
    /// Frames that will be rendered.
    pub total_frames: u32,
    /// Loop length in seconds.
    pub duration: f64,
    /// Playback rate handed to the encoder.
    pub fps: u32,
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    timeout: Option<Duration>,
    max_memory: Option<u64>,
    max_fuel: Option<u64>,
    epoch_tick_interval: Option<Duration>,
    fps: Option<u32>,
    min_duration: Option<f64>,
    max_duration: Option<f64>,
    max_dimension: Option<u32>,
    cache_capacity: Option<u64>,
}

impl SandboxConfigBuilder {
    /// Set the maximum execution timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the maximum memory limit in bytes.
    pub fn max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    /// Set the maximum fuel (instruction count).
    pub fn max_fuel(mut self, fuel: u64) -> Self {
        self.max_fuel = Some(fuel);
        self
    }

    /// Set the epoch tick interval for timeout checking.
    pub fn epoch_tick_interval(mut self, interval: Duration) -> Self {
        self.epoch_tick_interval = Some(interval);
        self
    }

    /// Set the loop frame rate.
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Set the accepted loop duration range in seconds.
    pub fn duration_range(mut self, min: f64, max: f64) -> Self {
        self.min_duration = Some(min);
        self.max_duration = Some(max);
        self
    }

    /// Set the largest accepted width or height.
    pub fn max_dimension(mut self, max: u32) -> Self {
        self.max_dimension = Some(max);
        self
    }

    /// Set how many compiled sketches the sandbox keeps.
    pub fn cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Build the SandboxConfig.
    pub fn build(self) -> SandboxConfig {
        let default = SandboxConfig::default();
        SandboxConfig {
            timeout: self.timeout.unwrap_or(default.timeout),
            max_memory: self.max_memory.unwrap_or(default.max_memory),
            max_fuel: self.max_fuel.or(default.max_fuel),
            epoch_tick_interval: self.epoch_tick_interval.unwrap_or(default.epoch_tick_interval),
            fps: self.fps.unwrap_or(default.fps),
            min_duration: self.min_duration.unwrap_or(default.min_duration),
            max_duration: self.max_duration.unwrap_or(default.max_duration),
            max_dimension: self.max_dimension.unwrap_or(default.max_dimension),
            cache_capacity: self.cache_capacity.unwrap_or(default.cache_capacity),
        }
    }

    /// Build and check the SandboxConfig for internal consistency.
    pub fn try_build(self) -> Result<SandboxConfig> {
        self.build().validate()
    }
}

/// On-disk TOML shape; durations are spelled in milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    timeout_ms: Option<u64>,
    max_memory: Option<u64>,
    max_fuel: Option<u64>,
    epoch_tick_ms: Option<u64>,
    fps: Option<u32>,
    min_duration: Option<f64>,
    max_duration: Option<f64>,
    max_dimension: Option<u32>,
    cache_capacity: Option<u64>,
}

impl ConfigFile {
    fn into_config(self) -> Result<SandboxConfig> {
        SandboxConfigBuilder {
            timeout: self.timeout_ms.map(Duration::from_millis),
            max_memory: self.max_memory,
            max_fuel: self.max_fuel,
            epoch_tick_interval: self.epoch_tick_ms.map(Duration::from_millis),
            fps: self.fps,
            min_duration: self.min_duration,
            max_duration: self.max_duration,
            max_dimension: self.max_dimension,
            cache_capacity: self.cache_capacity,
        }
        .try_build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_memory, 64 * 1024 * 1024);
        assert_eq!(config.fps, 30);
        assert_eq!(config.max_dimension, 8192);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn test_builder() {
        let config = SandboxConfig::builder()
            .timeout(Duration::from_secs(5))
            .max_memory(32 * 1024 * 1024)
            .max_fuel(1_000_000)
            .fps(10)
            .build();

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_memory, 32 * 1024 * 1024);
        assert_eq!(config.max_fuel, Some(1_000_000));
        assert_eq!(config.fps, 10);
    }

    #[test]
    fn test_try_build_rejects_inverted_duration_range() {
        let err = SandboxConfig::builder().duration_range(5.0, 1.0).try_build().unwrap_err();
        assert!(matches!(err, SketchError::Config(_)));
    }

    #[test]
    fn test_try_build_rejects_zero_cache_capacity() {
        let err = SandboxConfig::builder().cache_capacity(0).try_build().unwrap_err();
        assert!(matches!(err, SketchError::Config(_)));
    }

    #[test]
    fn test_cache_capacity_from_toml() {
        let config = SandboxConfig::from_toml_str("cache_capacity = 8").unwrap();
        assert_eq!(config.cache_capacity, 8);
    }

    #[test]
    fn test_loop_plan_clamps_duration() {
        let config = SandboxConfig::default();

        let plan = config.loop_plan(60);
        assert_eq!(plan.total_frames, 60);
        assert_eq!(plan.duration, 2.0);

        // 5 frames at 30fps is shorter than the 1s minimum.
        assert_eq!(config.loop_plan(5).total_frames, 30);
        // 600 frames at 30fps is longer than the 4s maximum.
        assert_eq!(config.loop_plan(600).total_frames, 120);
    }

    #[test]
    fn test_loop_plan_at_low_frame_rate() {
        let config = SandboxConfig::builder().fps(5).build();
        let plan = config.loop_plan(5);
        assert_eq!(plan.total_frames, 5);
        assert_eq!(plan.duration, 1.0);
    }

    #[test]
    fn test_from_toml() {
        let config = SandboxConfig::from_toml_str(
            r#"
            timeout_ms = 2500
            fps = 12
            max_duration = 6.0
            "#,
        )
        .unwrap();

        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.fps, 12);
        assert_eq!(config.max_duration, 6.0);
        assert_eq!(config.min_duration, 1.0);
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let err = SandboxConfig::from_toml_str("threads = 4").unwrap_err();
        assert!(matches!(err, SketchError::Config(_)));
    }
}
