//! Prelude module for convenient imports.

pub use crate::error::{Result, SketchError};
pub use crate::execute::{execute, ExecuteOptions, ExecutionResult, OutputFormat, RenderOutput};
pub use crate::protocol::RenderMode;
pub use crate::request::ExecutionRequest;
pub use crate::sandbox::{config::SandboxConfig, executor::SketchSandbox};
pub use crate::snapshot::Snapshot;
