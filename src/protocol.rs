//! Process-wide protocol identity constants and the metadata attached to every
//! execution result.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::vars::ProtocolVariables;

/// Crate version; part of the runtime identity.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Version of the execution semantics and determinism guarantees.
pub const PROTOCOL_VERSION: &str = "1.2.0";
/// Protocol phase; 3 is the stable phase.
pub const PROTOCOL_PHASE: u32 = 3;
/// Fixed protocol name.
pub const PROTOCOL_NAME: &str = "sketchbox";
/// Fixed engine name.
pub const ENGINE_NAME: &str = "wasm-sketch";

/// Render mode of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Run `setup` once and capture one frame.
    Static,
    /// Run `setup` once, then `draw` once per frame.
    Loop,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderMode::Static => f.write_str("static"),
            RenderMode::Loop => f.write_str("loop"),
        }
    }
}

/// The fixed identity block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolIdentity {
    pub protocol: String,
    pub engine: String,
    pub protocol_version: String,
    pub phase: u32,
    pub deterministic: bool,
}

impl ProtocolIdentity {
    /// The identity of this build.
    pub fn current() -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_string(),
            engine: ENGINE_NAME.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            phase: PROTOCOL_PHASE,
            deterministic: true,
        }
    }
}

/// Identity plus the parameters of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMetadata {
    #[serde(flatten)]
    pub identity: ProtocolIdentity,
    pub seed: i64,
    pub vars: ProtocolVariables,
    pub width: u32,
    pub height: u32,
    pub mode: RenderMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u32>,
}

/// Hash identifying the runtime that produced an output.
pub fn runtime_identity_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{ENGINE_NAME}@{SDK_VERSION}").as_bytes());
    hex::encode(hasher.finalize())
}

/// Human-readable version string.
pub fn version_string() -> String {
    format!("v{SDK_VERSION} (Protocol v{PROTOCOL_VERSION})")
}
