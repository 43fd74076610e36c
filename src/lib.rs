//! # Sketch Sandbox
//!
//! Deterministic, capability-sandboxed execution of generative sketches.
//!
//! A sketch is a WebAssembly module (supplied as WAT) that exports `setup` and,
//! for loop renders, `draw`. It can only reach the host through three import
//! namespaces bound by the sandbox:
//!
//! - **`sketch`**: seeded random and noise, read-only protocol variables
//!   (`VAR0`..`VAR9`), canvas size and time variables
//! - **`math`**: pure math helpers
//! - **`draw`**: the drawing surface
//!
//! Anything else (clocks, timers, entropy, WASI) fails validation before any
//! sketch code runs. Identical source, seed, variables and dimensions always
//! produce bit-identical pixels.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wasm_sketch_sandbox_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let sandbox = SketchSandbox::new(SandboxConfig::default())?;
//!     let request = ExecutionRequest::new_static(SOURCE, 256, 256)
//!         .with_seed(42)
//!         .with_vars([50.0, 25.0]);
//!
//!     let result = execute(&sandbox, &request, ExecuteOptions::default()).await?;
//!     println!("{}", result.output.hash());
//!     Ok(())
//! }
//! ```
//!
//! ## Enforcement
//!
//! 1. **Static import check**: every import is matched against the bound
//!    capability set before instantiation
//! 2. **Read-only variables**: `VAR` globals are immutable and `set_var` always
//!    fails
//! 3. **Resource limits**: memory, fuel and a per-store epoch deadline
//! 4. **Frame-boundary cancellation**: loop renders stop between frames and
//!    discard partial output

pub mod cli;
pub mod encode;
pub mod engine;
pub mod error;
pub mod execute;
pub mod generators;
pub mod prelude;
pub mod protocol;
pub mod remote;
pub mod request;
pub mod runtime;
pub mod sandbox;
pub mod snapshot;
pub mod surface;
pub mod vars;

// Re-export main types at crate root for convenience
pub use encode::{encode_png, FrameEncoder, FrameStreamEncoder, GifFrameEncoder};
pub use engine::{ProgressCallback, RenderPhase, RenderProgress};
pub use error::{Result, SketchError};
pub use execute::{execute, ExecuteOptions, ExecutionResult, OutputFormat, RenderOutput};
pub use protocol::{ProtocolMetadata, RenderMode, PROTOCOL_VERSION, SDK_VERSION};
pub use remote::RemoteRenderer;
pub use request::{validate_source, ExecutionRequest, ValidatedRequest, ValidationReport};
pub use runtime::{DeterministicRuntime, RuntimeOptions, RuntimeState, Seed};
pub use sandbox::cache::{ModuleCache, SharedEngine};
pub use sandbox::config::{LoopPlan, SandboxConfig, SandboxConfigBuilder};
pub use sandbox::executor::SketchSandbox;
pub use snapshot::{replay, verify, verify_matches, Snapshot, SnapshotRenderer};
pub use surface::{RasterFrame, Rgba, Surface};
pub use vars::ProtocolVariables;
