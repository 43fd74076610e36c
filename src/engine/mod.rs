//! Render-mode state machines.
//!
//! Both engines are synchronous: they drive one [`SketchInstance`] from a
//! single thread and are run on a blocking task by the sandbox.
//!
//! [`SketchInstance`]: crate::sandbox::executor::SketchInstance

pub mod loop_engine;
pub mod static_engine;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

pub use loop_engine::{LoopEngine, LoopState};
pub use static_engine::{StaticEngine, StaticState};

/// Phase reported through a progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderPhase {
    Setup,
    Rendering,
    Encoding,
    Complete,
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RenderPhase::Setup => "setup",
            RenderPhase::Rendering => "rendering",
            RenderPhase::Encoding => "encoding",
            RenderPhase::Complete => "complete",
        };
        f.write_str(label)
    }
}

/// One progress report. Purely observational.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderProgress {
    pub phase: RenderPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u32>,
    pub percent: f64,
    pub message: String,
}

/// Callback receiving progress reports.
pub type ProgressCallback = Arc<dyn Fn(&RenderProgress) + Send + Sync>;

/// Optional progress sink shared by the engines and the encoder step.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self { callback }
    }

    /// A reporter that drops every report.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, progress: RenderProgress) {
        if let Some(callback) = &self.callback {
            callback(&progress);
        }
    }

    pub(crate) fn phase(&self, phase: RenderPhase, percent: f64, message: impl Into<String>) {
        self.emit(RenderProgress {
            phase,
            frame: None,
            total_frames: None,
            percent,
            message: message.into(),
        });
    }

    pub(crate) fn frame(&self, frame: u32, total_frames: u32) {
        self.emit(RenderProgress {
            phase: RenderPhase::Rendering,
            frame: Some(frame),
            total_frames: Some(total_frames),
            percent: (frame + 1) as f64 / total_frames as f64 * 100.0,
            message: format!("rendered frame {}/{}", frame + 1, total_frames),
        });
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
