//! Execution requests and their validation.
//!
//! Every check here runs before any sketch code executes.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SketchError};
use crate::protocol::{ProtocolIdentity, ProtocolMetadata, RenderMode};
use crate::sandbox::capability::is_wasi_module;
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::executor::{InstanceParams, SketchSandbox};
use crate::vars::ProtocolVariables;

/// Import names that would hand frame control to the sketch.
const LOOP_CONTROL_PRIMITIVES: &[&str] = &["no_loop", "loop", "redraw", "frame_rate"];

static IMPORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\(\s*import\s+"([^"]*)"\s+"([^"]*)""#).expect("import pattern is valid")
});

/// One requested execution, as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub source: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub seed: i64,
    #[serde(default)]
    pub vars: Vec<f64>,
    pub mode: RenderMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u32>,
}

impl ExecutionRequest {
    /// A static render with seed 0 and no variables.
    pub fn new_static(source: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            source: source.into(),
            width,
            height,
            seed: 0,
            vars: Vec::new(),
            mode: RenderMode::Static,
            total_frames: None,
        }
    }

    /// A loop render of `total_frames` frames with seed 0 and no variables.
    pub fn new_loop(source: impl Into<String>, width: u32, height: u32, total_frames: u32) -> Self {
        Self {
            mode: RenderMode::Loop,
            total_frames: Some(total_frames),
            ..Self::new_static(source, width, height)
        }
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_vars(mut self, vars: impl Into<Vec<f64>>) -> Self {
        self.vars = vars.into();
        self
    }

    /// Check shape, ranges and source patterns.
    pub fn validate(&self, config: &SandboxConfig) -> Result<ValidatedRequest> {
        for (label, value) in [("width", self.width), ("height", self.height)] {
            if value == 0 || value > config.max_dimension {
                return Err(SketchError::Validation(format!(
                    "{label} must be between 1 and {}, got {value}",
                    config.max_dimension
                )));
            }
        }

        let vars = ProtocolVariables::normalize(&self.vars)?;

        match (self.mode, self.total_frames) {
            (RenderMode::Loop, None) | (RenderMode::Loop, Some(0)) => {
                return Err(SketchError::Validation(
                    "loop mode requires a positive totalFrames".to_string(),
                ));
            }
            (RenderMode::Static, Some(_)) => {
                return Err(SketchError::Validation(
                    "totalFrames is only accepted in loop mode".to_string(),
                ));
            }
            _ => {}
        }

        if let Some(problem) = scan_source(&self.source, self.mode).into_iter().next() {
            return Err(SketchError::Validation(problem));
        }

        Ok(ValidatedRequest {
            source: self.source.clone(),
            width: self.width,
            height: self.height,
            seed: self.seed,
            vars,
            mode: self.mode,
            total_frames: self.total_frames,
        })
    }
}

/// A request that passed validation. Immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    source: String,
    width: u32,
    height: u32,
    seed: i64,
    vars: ProtocolVariables,
    mode: RenderMode,
    total_frames: Option<u32>,
}

impl ValidatedRequest {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// The normalized ten-element vector.
    pub fn vars(&self) -> ProtocolVariables {
        self.vars
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Requested frame count; `Some` exactly in loop mode.
    pub fn total_frames(&self) -> Option<u32> {
        self.total_frames
    }

    pub(crate) fn instance_params(&self) -> InstanceParams {
        InstanceParams {
            seed: self.seed,
            vars: self.vars,
            width: self.width,
            height: self.height,
        }
    }

    /// Protocol identity plus this request's parameters.
    ///
    /// `total_frames` is the planned frame count, which may differ from the
    /// requested one after duration clamping.
    pub fn metadata(&self, total_frames: Option<u32>) -> ProtocolMetadata {
        ProtocolMetadata {
            identity: ProtocolIdentity::current(),
            seed: self.seed,
            vars: self.vars,
            width: self.width,
            height: self.height,
            mode: self.mode,
            total_frames,
        }
    }
}

/// Outcome of [`validate_source`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Pattern-scan the import declarations of `source`.
fn scan_source(source: &str, mode: RenderMode) -> Vec<String> {
    let mut problems = Vec::new();
    if source.trim().is_empty() {
        problems.push("sketch source is empty".to_string());
        return problems;
    }

    for capture in IMPORT_PATTERN.captures_iter(source) {
        let (module, name) = (&capture[1], &capture[2]);
        if is_wasi_module(module) {
            problems.push(format!("WASI import `{module}.{name}` is not available to sketches"));
        }
        if mode == RenderMode::Loop && LOOP_CONTROL_PRIMITIVES.contains(&name) {
            problems.push(format!(
                "loop-control primitive `{name}` is not allowed: frames are driven by the host"
            ));
        }
    }
    problems
}

/// Collect every problem with `source` for `mode` without running it.
///
/// Runs the pattern scan, then compiles, checks entry points and links
/// against the capability set.
pub fn validate_source(sandbox: &SketchSandbox, source: &str, mode: RenderMode) -> ValidationReport {
    let mut errors = scan_source(source, mode);

    if !source.trim().is_empty() {
        match sandbox.cache().get_or_compile(sandbox.engine(), source) {
            Ok(compiled) => {
                let problems = compiled.structure.problems(mode);
                if problems.is_empty() {
                    if let Err(e) = sandbox.check_linkage(&compiled, mode) {
                        errors.push(e.to_string());
                    }
                } else {
                    errors.extend(problems);
                }
            }
            Err(e) => errors.push(e.to_string()),
        }
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETUP_ONLY: &str = r#"(module (func (export "setup")))"#;

    #[test]
    fn test_valid_static_request() {
        let validated = ExecutionRequest::new_static(SETUP_ONLY, 64, 32)
            .with_seed(7)
            .with_vars([50.0])
            .validate(&SandboxConfig::default())
            .unwrap();

        assert_eq!(validated.vars()[0], 50.0);
        assert_eq!(validated.vars().as_slice().len(), 10);
        assert_eq!(validated.total_frames(), None);
    }

    #[test]
    fn test_dimensions_are_bounded() {
        let config = SandboxConfig::builder().max_dimension(100).build();
        assert!(ExecutionRequest::new_static(SETUP_ONLY, 0, 10).validate(&config).is_err());
        assert!(ExecutionRequest::new_static(SETUP_ONLY, 10, 101).validate(&config).is_err());
        assert!(ExecutionRequest::new_static(SETUP_ONLY, 100, 100).validate(&config).is_ok());
    }

    #[test]
    fn test_total_frames_required_iff_loop() {
        let config = SandboxConfig::default();
        let mut request = ExecutionRequest::new_loop(SETUP_ONLY, 1, 1, 10);
        request.total_frames = None;
        assert!(request.validate(&config).unwrap_err().is_validation());

        let mut request = ExecutionRequest::new_static(SETUP_ONLY, 1, 1);
        request.total_frames = Some(3);
        assert!(request.validate(&config).unwrap_err().is_validation());
    }

    #[test]
    fn test_var_bounds_are_validation_errors() {
        let config = SandboxConfig::default();
        for vars in [vec![-1.0], vec![101.0], vec![1.0; 11]] {
            let err = ExecutionRequest::new_static(SETUP_ONLY, 1, 1)
                .with_vars(vars)
                .validate(&config)
                .unwrap_err();
            assert!(err.is_validation());
        }
    }

    #[test]
    fn test_empty_source_is_rejected() {
        let err = ExecutionRequest::new_static("  \n", 1, 1)
            .validate(&SandboxConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_scan_rejects_wasi_imports() {
        let source = r#"(module (import "wasi_snapshot_preview1" "fd_write" (func)))"#;
        let problems = scan_source(source, RenderMode::Static);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("WASI"));
    }

    #[test]
    fn test_scan_rejects_loop_control_only_in_loop_mode() {
        let source = r#"(module (import "sketch" "no_loop" (func)))"#;
        assert!(scan_source(source, RenderMode::Static).is_empty());
        assert_eq!(scan_source(source, RenderMode::Loop).len(), 1);
    }

    #[test]
    fn test_scan_ignores_loop_instructions() {
        let source = r#"(module (func (export "draw") (loop $l (br_if $l (i32.const 0)))))"#;
        assert!(scan_source(source, RenderMode::Loop).is_empty());
    }

    #[test]
    fn test_request_json_shape() {
        let json = serde_json::json!({
            "source": SETUP_ONLY,
            "width": 4,
            "height": 4,
            "mode": "loop",
            "totalFrames": 8
        });
        let request: ExecutionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.mode, RenderMode::Loop);
        assert_eq!(request.total_frames, Some(8));
        assert_eq!(request.seed, 0);
    }
}
