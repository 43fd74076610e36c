//! Portable, independently re-verifiable records of a render.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::encode::encode_png;
use crate::engine::ProgressReporter;
use crate::error::{Result, SketchError};
use crate::protocol::{runtime_identity_hash, PROTOCOL_NAME, PROTOCOL_VERSION};
use crate::request::{ExecutionRequest, ValidatedRequest};
use crate::sandbox::executor::SketchSandbox;
use crate::vars::ProtocolVariables;

/// Hash sketch source after normalising line endings and trailing whitespace.
///
/// CRLF and lone CR become LF, trailing whitespace is stripped from every line,
/// trailing blank lines are dropped and exactly one final newline is appended.
pub fn hash_source(code: &str) -> String {
    let unified = code.replace("\r\n", "\n").replace('\r', "\n");
    let mut normalized = unified
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let kept = normalized.trim_end_matches('\n').len();
    normalized.truncate(kept);
    normalized.push('\n');
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Hash raw output bytes, without normalisation.
pub fn hash_output(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A completed render, reduced to hashes plus the parameters to replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub protocol: String,
    pub protocol_version: String,
    pub runtime_identity_hash: String,
    pub code_hash: String,
    pub seed: i64,
    #[serde(rename = "VAR")]
    pub vars: ProtocolVariables,
    pub width: u32,
    pub height: u32,
    pub output_hash: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Snapshot {
    /// Pair the request's parameters with both hashes.
    pub fn create(
        request: &ValidatedRequest,
        runtime_identity_hash: impl Into<String>,
        output_hash: impl Into<String>,
        include_source: bool,
    ) -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            runtime_identity_hash: runtime_identity_hash.into(),
            code_hash: hash_source(request.source()),
            seed: request.seed(),
            vars: request.vars(),
            width: request.width(),
            height: request.height(),
            output_hash: output_hash.into(),
            created_at: Utc::now(),
            source: include_source.then(|| request.source().to_string()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot, rejecting records written for another protocol.
    pub fn from_json(text: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(text)?;
        if snapshot.protocol != PROTOCOL_NAME {
            return Err(SketchError::Validation(format!(
                "snapshot protocol `{}` is not `{PROTOCOL_NAME}`",
                snapshot.protocol
            )));
        }
        Ok(snapshot)
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Supplied source, falling back to the embedded one.
    pub fn resolve_source<'a>(&'a self, supplied: Option<&'a str>) -> Result<&'a str> {
        supplied.or(self.source.as_deref()).ok_or_else(|| {
            SketchError::Validation(
                "snapshot has no embedded source; supply the sketch code".to_string(),
            )
        })
    }

    /// Fail with a `code` hash mismatch unless `source` matches `code_hash`.
    pub fn check_code(&self, source: &str) -> Result<()> {
        let actual = hash_source(source);
        if actual != self.code_hash {
            return Err(SketchError::HashMismatch {
                kind: "code",
                expected: self.code_hash.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// An encoded image and the identity of the runtime that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub runtime_hash: String,
}

/// Parameters of a snapshot re-render.
#[derive(Debug, Clone, Copy)]
pub struct RenderParams<'a> {
    pub code: &'a str,
    pub seed: i64,
    pub vars: ProtocolVariables,
    pub width: u32,
    pub height: u32,
}

impl<'a> RenderParams<'a> {
    pub fn from_snapshot(snapshot: &'a Snapshot, code: &'a str) -> Self {
        Self {
            code,
            seed: snapshot.seed,
            vars: snapshot.vars,
            width: snapshot.width,
            height: snapshot.height,
        }
    }
}

/// Something that can render a static sketch to PNG bytes.
#[async_trait]
pub trait SnapshotRenderer: Send + Sync {
    async fn render_png(&self, params: RenderParams<'_>) -> Result<RenderedImage>;
}

#[async_trait]
impl SnapshotRenderer for SketchSandbox {
    async fn render_png(&self, params: RenderParams<'_>) -> Result<RenderedImage> {
        let request = ExecutionRequest::new_static(params.code, params.width, params.height)
            .with_seed(params.seed)
            .with_vars(params.vars.as_slice())
            .validate(self.config())?;
        let frame = self.render_static(&request, ProgressReporter::silent()).await?;
        Ok(RenderedImage {
            bytes: encode_png(&frame)?,
            runtime_hash: runtime_identity_hash(),
        })
    }
}

/// Re-render `snapshot` from `source` (or its embedded source).
///
/// The code hash is checked first; a mismatch fails before rendering.
pub async fn replay(
    snapshot: &Snapshot,
    source: Option<&str>,
    renderer: &dyn SnapshotRenderer,
) -> Result<RenderedImage> {
    let code = snapshot.resolve_source(source)?;
    snapshot.check_code(code)?;
    renderer.render_png(RenderParams::from_snapshot(snapshot, code)).await
}

/// Check that `source` reproduces `snapshot`.
///
/// Fails with [`SketchError::HashMismatch`] carrying both hashes on either a
/// code or an output mismatch.
pub async fn verify(
    snapshot: &Snapshot,
    source: Option<&str>,
    renderer: &dyn SnapshotRenderer,
) -> Result<()> {
    let rendered = replay(snapshot, source, renderer).await?;

    if rendered.runtime_hash != snapshot.runtime_identity_hash {
        tracing::warn!(
            recorded = %snapshot.runtime_identity_hash,
            current = %rendered.runtime_hash,
            "verifying against a different runtime"
        );
    }

    let actual = hash_output(&rendered.bytes);
    if actual != snapshot.output_hash {
        return Err(SketchError::HashMismatch {
            kind: "output",
            expected: snapshot.output_hash.clone(),
            actual,
        });
    }
    Ok(())
}

/// [`verify`] as a boolean; errors other than hash mismatches still fail.
pub async fn verify_matches(
    snapshot: &Snapshot,
    source: Option<&str>,
    renderer: &dyn SnapshotRenderer,
) -> Result<bool> {
    match verify(snapshot, source, renderer).await {
        Ok(()) => Ok(true),
        Err(SketchError::HashMismatch { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::config::SandboxConfig;

    #[test]
    fn test_source_hash_ignores_line_endings_and_trailing_space() {
        let base = hash_source("(module)\n  (func)\n");
        assert_eq!(hash_source("(module)\r\n  (func)\r\n"), base);
        assert_eq!(hash_source("(module)   \n  (func)\t\n\n\n"), base);
        assert_eq!(hash_source("(module)\n  (func)"), base);
        assert_ne!(hash_source("(module)\n (func)\n"), base);
        assert_ne!(hash_source("(Module)\n  (func)\n"), base);
    }

    #[test]
    fn test_source_hash_known_value() {
        // sha256("a\n")
        assert_eq!(
            hash_source("a"),
            "87428fc522803d31065e7bce3cf03fe475096631e5e07bbd7a0fde60c4cf25c7"
        );
    }

    #[test]
    fn test_output_hash_is_not_normalized() {
        assert_ne!(hash_output(b"abc"), hash_output(b"abc\n"));
        assert_eq!(hash_output(b""), hex::encode(Sha256::digest(b"")));
    }

    #[test]
    fn test_snapshot_json_field_names() {
        let request = ExecutionRequest::new_static("(module)", 4, 3)
            .with_seed(11)
            .with_vars([1.0, 2.0])
            .validate(&SandboxConfig::default())
            .unwrap();
        let snapshot = Snapshot::create(&request, "runtime", "output", false);
        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();

        for key in [
            "protocol",
            "protocolVersion",
            "runtimeIdentityHash",
            "codeHash",
            "seed",
            "VAR",
            "width",
            "height",
            "outputHash",
            "createdAt",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["VAR"].as_array().unwrap().len(), 10);
        assert!(json.get("source").is_none());

        let parsed = Snapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_foreign_protocol_is_rejected() {
        let request = ExecutionRequest::new_static("(module)", 2, 2)
            .validate(&SandboxConfig::default())
            .unwrap();
        let mut snapshot = Snapshot::create(&request, "runtime", "output", false);
        snapshot.protocol = "other".to_string();

        let err = Snapshot::from_json(&snapshot.to_json().unwrap()).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("other"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign.snapshot.json");
        snapshot.save(&path).unwrap();
        assert!(Snapshot::load(&path).unwrap_err().is_validation());
    }

    #[test]
    fn test_resolve_source_prefers_supplied() {
        let request = ExecutionRequest::new_static("(module)", 1, 1)
            .validate(&SandboxConfig::default())
            .unwrap();
        let embedded = Snapshot::create(&request, "r", "o", true);
        assert_eq!(embedded.resolve_source(None).unwrap(), "(module)");
        assert_eq!(embedded.resolve_source(Some("x")).unwrap(), "x");

        let bare = Snapshot::create(&request, "r", "o", false);
        assert!(bare.resolve_source(None).unwrap_err().is_validation());
    }
}
