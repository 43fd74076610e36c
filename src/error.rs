//! Error types for the sketch sandbox.

use thiserror::Error;
use wasmtime::Trap;

use crate::sandbox::capability::ForbiddenCategory;

/// Errors that can occur while validating, running, encoding or verifying a sketch.
///
/// Every variant is terminal for the execution it occurs in; nothing is retried
/// inside the sandbox.
#[derive(Error, Debug)]
pub enum SketchError {
    /// The request or the sketch source was rejected before any sketch code ran.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The sketch referenced a name outside the bound capability set.
    #[error("forbidden capability `{name}` ({category}){}", hint_suffix(.hint))]
    ForbiddenCapability {
        /// The offending import name.
        name: String,
        /// What kind of ambient capability the name reaches for.
        category: ForbiddenCategory,
        /// Replacement the sketch should use instead, when one exists.
        hint: Option<&'static str>,
    },

    /// The sketch attempted to write, delete or define a protocol variable.
    #[error("protocol variables are read-only: rejected access to VAR[{index}]")]
    ProtocolVariable {
        /// The offending index.
        index: i64,
    },

    /// The sketch's own logic trapped or a host call rejected its arguments.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The render was cancelled at a frame boundary.
    #[error("render cancelled before frame {frame}")]
    Cancelled {
        /// The frame that would have been rendered next.
        frame: u32,
    },

    /// The external encoder failed after every frame rendered successfully.
    #[error("encoding failed after {frames_rendered} frames: {message}")]
    Encoding {
        /// Frames that were rendered before encoding started.
        frames_rendered: usize,
        /// The encoder's error message.
        message: String,
    },

    /// A recomputed hash did not match the recorded one.
    #[error("{kind} hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Which hash was compared (`code` or `output`).
        kind: &'static str,
        /// The recorded hash.
        expected: String,
        /// The recomputed hash.
        actual: String,
    },

    /// The execution exceeded the configured wall-clock budget.
    #[error("execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The execution exceeded memory limits.
    #[error("memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),

    /// Execution ran out of fuel (instruction limit).
    #[error("execution ran out of fuel")]
    OutOfFuel,

    /// Failed to initialize the Wasm runtime.
    #[error("failed to initialize runtime: {0}")]
    RuntimeInit(#[source] anyhow::Error),

    /// The sketch source could not be compiled.
    #[error("failed to compile sketch: {0}")]
    Compile(#[source] anyhow::Error),

    /// The remote renderer failed or returned an unusable response.
    #[error("remote render failed: {0}")]
    RemoteRender(String),

    /// I/O error while reading or writing sketch artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot or state (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SketchError {
    /// Classify an error raised while calling into a sketch.
    ///
    /// Errors raised by host capabilities travel through wasmtime as
    /// `anyhow::Error` and come back out unchanged; traps are mapped to the
    /// resource-limit variants or to `Execution`.
    pub fn from_guest(error: anyhow::Error) -> Self {
        let error = match error.downcast::<SketchError>() {
            Ok(sketch_error) => return sketch_error,
            Err(other) => other,
        };

        match error.downcast_ref::<Trap>() {
            Some(Trap::Interrupt) => SketchError::Timeout(std::time::Duration::ZERO),
            Some(Trap::OutOfFuel) => SketchError::OutOfFuel,
            Some(trap) => SketchError::Execution(format!("sketch trapped: {trap}")),
            None => SketchError::Execution(format!("{error:#}")),
        }
    }

    /// Check if this error was raised before any sketch code ran.
    pub fn is_validation(&self) -> bool {
        matches!(self, SketchError::Validation(_))
    }

    /// Check if this error represents a forbidden capability access.
    pub fn is_forbidden_capability(&self) -> bool {
        matches!(self, SketchError::ForbiddenCapability { .. })
    }

    /// Check if this error represents a protocol variable write attempt.
    pub fn is_protocol_variable(&self) -> bool {
        matches!(self, SketchError::ProtocolVariable { .. })
    }

    /// Check if this error represents a cancelled render.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SketchError::Cancelled { .. })
    }

    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SketchError::Timeout(_))
    }

    /// Check if this error represents a memory limit exceeded.
    pub fn is_memory_limit(&self) -> bool {
        matches!(self, SketchError::MemoryLimitExceeded(_))
    }

    /// Check if this error represents an out-of-fuel condition.
    pub fn is_out_of_fuel(&self) -> bool {
        matches!(self, SketchError::OutOfFuel)
    }

    /// Check if this error represents a hash mismatch on the verify path.
    pub fn is_hash_mismatch(&self) -> bool {
        matches!(self, SketchError::HashMismatch { .. })
    }

    /// The offending name of a forbidden capability error.
    pub fn forbidden_name(&self) -> Option<&str> {
        match self {
            SketchError::ForbiddenCapability { name, .. } => Some(name),
            _ => None,
        }
    }
}

fn hint_suffix(hint: &Option<&'static str>) -> String {
    hint.map(|h| format!(": {h}")).unwrap_or_default()
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SketchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_errors_survive_the_guest_boundary() {
        let raised: anyhow::Error = SketchError::ProtocolVariable { index: 3 }.into();
        let classified = SketchError::from_guest(raised);

        assert!(matches!(classified, SketchError::ProtocolVariable { index: 3 }));
    }

    #[test]
    fn test_traps_are_classified() {
        let interrupt = SketchError::from_guest(anyhow::Error::new(Trap::Interrupt));
        assert!(interrupt.is_timeout());

        let fuel = SketchError::from_guest(anyhow::Error::new(Trap::OutOfFuel));
        assert!(fuel.is_out_of_fuel());

        let unreachable = SketchError::from_guest(anyhow::Error::new(Trap::UnreachableCodeReached));
        assert!(matches!(unreachable, SketchError::Execution(_)));
    }

    #[test]
    fn test_plain_errors_become_execution_errors() {
        let classified = SketchError::from_guest(anyhow::anyhow!("boom"));
        match classified {
            SketchError::Execution(message) => assert!(message.contains("boom")),
            other => panic!("Expected Execution, got {other:?}"),
        }
    }

    #[test]
    fn test_forbidden_message_includes_hint() {
        let error = SketchError::ForbiddenCapability {
            name: "random".to_string(),
            category: ForbiddenCategory::Entropy,
            hint: Some("use sketch.random (seeded)"),
        };
        let message = error.to_string();

        assert!(message.contains("`random`"));
        assert!(message.contains("seeded"));
        assert_eq!(error.forbidden_name(), Some("random"));
    }

    #[test]
    fn test_error_helpers() {
        let timeout = SketchError::Timeout(std::time::Duration::from_secs(5));
        assert!(timeout.is_timeout());
        assert!(!timeout.is_memory_limit());
        assert!(!timeout.is_cancelled());

        let cancelled = SketchError::Cancelled { frame: 3 };
        assert!(cancelled.is_cancelled());

        let mismatch = SketchError::HashMismatch {
            kind: "output",
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(mismatch.is_hash_mismatch());
        assert!(mismatch.to_string().contains("expected aa"));
    }
}
