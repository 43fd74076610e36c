//! File-level operations behind the `sketchbox` binary.

use std::path::{Path, PathBuf};

use crate::error::{Result, SketchError};
use crate::request::ExecutionRequest;
use crate::sandbox::config::SandboxConfig;
use crate::snapshot::{self, hash_output, RenderParams, Snapshot, SnapshotRenderer};

/// Parse a comma-separated `VAR` list such as `"10, 20.5,30"`.
pub fn parse_vars(text: &str) -> Result<Vec<f64>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|e| SketchError::Validation(format!("invalid VAR value `{}`: {e}", part.trim())))
        })
        .collect()
}

/// `<out>.snapshot.json` next to the image.
pub fn snapshot_path(out: &Path) -> PathBuf {
    let mut name = out.as_os_str().to_owned();
    name.push(".snapshot.json");
    PathBuf::from(name)
}

/// Parameters of `sketchbox run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: String,
    pub seed: i64,
    pub vars: Vec<f64>,
    pub width: u32,
    pub height: u32,
    pub include_code: bool,
}

/// Files written by [`run_to_files`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub image_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub snapshot: Snapshot,
}

/// Render a static sketch, write the PNG to `out` and its snapshot beside it.
///
/// The request is validated locally even when `renderer` is remote.
pub async fn run_to_files(
    renderer: &dyn SnapshotRenderer,
    config: &SandboxConfig,
    options: RunOptions,
    out: &Path,
) -> Result<RunOutcome> {
    let request = ExecutionRequest::new_static(options.source, options.width, options.height)
        .with_seed(options.seed)
        .with_vars(options.vars)
        .validate(config)?;

    let image = renderer
        .render_png(RenderParams {
            code: request.source(),
            seed: request.seed(),
            vars: request.vars(),
            width: request.width(),
            height: request.height(),
        })
        .await?;

    let snapshot = Snapshot::create(
        &request,
        image.runtime_hash,
        hash_output(&image.bytes),
        options.include_code,
    );
    std::fs::write(out, &image.bytes)?;
    let snapshot_path = snapshot_path(out);
    snapshot.save(&snapshot_path)?;
    tracing::info!(image = %out.display(), snapshot = %snapshot_path.display(), "render written");

    Ok(RunOutcome {
        image_path: out.to_path_buf(),
        snapshot_path,
        snapshot,
    })
}

/// Read `--code` if given.
pub fn read_code(path: Option<&Path>) -> Result<Option<String>> {
    path.map(std::fs::read_to_string).transpose().map_err(Into::into)
}

/// Re-render the snapshot at `snapshot_file` and write the PNG to `out`.
pub async fn replay_to_file(
    renderer: &dyn SnapshotRenderer,
    snapshot_file: &Path,
    code: Option<&str>,
    out: &Path,
) -> Result<()> {
    let snapshot = Snapshot::load(snapshot_file)?;
    let image = snapshot::replay(&snapshot, code, renderer).await?;
    std::fs::write(out, &image.bytes)?;
    Ok(())
}

/// Result of verifying one snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    Mismatch {
        kind: &'static str,
        expected: String,
        actual: String,
    },
}

impl VerifyOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerifyOutcome::Verified)
    }
}

impl std::fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyOutcome::Verified => write!(f, "verified"),
            VerifyOutcome::Mismatch {
                kind,
                expected,
                actual,
            } => write!(f, "{kind} hash mismatch\n  expected {expected}\n  actual   {actual}"),
        }
    }
}

/// Verify the snapshot at `snapshot_file`. Hash mismatches are reported as
/// an outcome; every other failure is an error.
pub async fn verify_file(
    renderer: &dyn SnapshotRenderer,
    snapshot_file: &Path,
    code: Option<&str>,
) -> Result<VerifyOutcome> {
    let snapshot = Snapshot::load(snapshot_file)?;
    match snapshot::verify(&snapshot, code, renderer).await {
        Ok(()) => Ok(VerifyOutcome::Verified),
        Err(SketchError::HashMismatch {
            kind,
            expected,
            actual,
        }) => Ok(VerifyOutcome::Mismatch {
            kind,
            expected,
            actual,
        }),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_outcome_names_both_hashes() {
        let outcome = VerifyOutcome::Mismatch {
            kind: "output",
            expected: "aa11".to_string(),
            actual: "bb22".to_string(),
        };
        let text = outcome.to_string();
        assert!(!outcome.is_verified());
        assert!(text.starts_with("output hash mismatch"));
        assert!(text.contains("expected aa11"));
        assert!(text.contains("actual   bb22"));
        assert_eq!(VerifyOutcome::Verified.to_string(), "verified");
    }

    #[test]
    fn test_parse_vars() {
        assert_eq!(parse_vars("10, 20.5,30").unwrap(), vec![10.0, 20.5, 30.0]);
        assert!(parse_vars("").unwrap().is_empty());
        assert!(parse_vars("1,x").unwrap_err().is_validation());
    }

    #[test]
    fn test_snapshot_path_appends_suffix() {
        assert_eq!(
            snapshot_path(Path::new("out/art.png")),
            PathBuf::from("out/art.png.snapshot.json")
        );
    }
}
