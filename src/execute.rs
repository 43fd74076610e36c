//! The canonical entry point: validate, render, encode.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::encode::{encode_png, FrameEncoder};
use crate::engine::{ProgressCallback, ProgressReporter, RenderPhase};
use crate::error::{Result, SketchError};
use crate::protocol::{ProtocolMetadata, RenderMode, PROTOCOL_NAME, PROTOCOL_PHASE, PROTOCOL_VERSION};
use crate::request::ExecutionRequest;
use crate::sandbox::executor::SketchSandbox;
use crate::surface::RasterFrame;

/// Output of a static render. The two forms are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Raw RGBA8 pixels, never passed through an encoder (oracle path).
    #[default]
    RawPixels,
    Png,
}

/// Per-execution options.
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    /// Static output form.
    pub output: OutputFormat,
    /// Loop encoder; without one, loop renders return raw frames.
    pub encoder: Option<Arc<dyn FrameEncoder>>,
    /// Cancellation for this execution only.
    pub cancel: CancellationToken,
    pub progress: Option<ProgressCallback>,
}

impl ExecuteOptions {
    pub fn with_output(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn FrameEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl std::fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("output", &self.output)
            .field("encoder", &self.encoder.as_ref().map(|e| e.content_type()))
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// What a render produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    RawPixels(RasterFrame),
    Png(Vec<u8>),
    /// Loop frames in order, unencoded.
    Frames(Vec<RasterFrame>),
    /// Loop frames after the encoder ran.
    Encoded {
        bytes: Vec<u8>,
        content_type: &'static str,
        frame_count: usize,
    },
}

impl RenderOutput {
    /// sha256 hex over the output bytes; frames are hashed in order.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            RenderOutput::RawPixels(frame) => hasher.update(frame.pixels()),
            RenderOutput::Png(bytes) | RenderOutput::Encoded { bytes, .. } => hasher.update(bytes),
            RenderOutput::Frames(frames) => {
                for frame in frames {
                    hasher.update(frame.pixels());
                }
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Number of frames behind this output.
    pub fn frame_count(&self) -> usize {
        match self {
            RenderOutput::RawPixels(_) | RenderOutput::Png(_) => 1,
            RenderOutput::Frames(frames) => frames.len(),
            RenderOutput::Encoded { frame_count, .. } => *frame_count,
        }
    }
}

/// A successful execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub output: RenderOutput,
    pub metadata: ProtocolMetadata,
}

/// Validate `request`, run it under `sandbox` and encode the result.
///
/// Rendering and encoding fail independently: an encoder failure is reported
/// as [`SketchError::Encoding`] after every frame rendered.
pub async fn execute(
    sandbox: &SketchSandbox,
    request: &ExecutionRequest,
    options: ExecuteOptions,
) -> Result<ExecutionResult> {
    let validated = match request.validate(sandbox.config()) {
        Ok(validated) => validated,
        Err(e) => {
            tracing::warn!(error = %e, "rejected sketch request");
            return Err(e);
        }
    };
    let progress = ProgressReporter::new(options.progress.clone());

    tracing::info!(
        protocol = PROTOCOL_NAME,
        version = PROTOCOL_VERSION,
        phase = PROTOCOL_PHASE,
        seed = validated.seed(),
        mode = %validated.mode(),
        width = validated.width(),
        height = validated.height(),
        "executing sketch"
    );

    match validated.mode() {
        RenderMode::Static => {
            let frame = sandbox.render_static(&validated, progress.clone()).await?;
            let output = match options.output {
                OutputFormat::RawPixels => RenderOutput::RawPixels(frame),
                OutputFormat::Png => RenderOutput::Png(encode_png(&frame)?),
            };
            Ok(ExecutionResult {
                output,
                metadata: validated.metadata(None),
            })
        }
        RenderMode::Loop => {
            let plan = sandbox
                .config()
                .loop_plan(validated.total_frames().unwrap_or(1));
            let frames = sandbox
                .render_loop(&validated, options.cancel.clone(), progress.clone())
                .await?;
            let frame_count = frames.len();

            let output = match &options.encoder {
                None => RenderOutput::Frames(frames),
                Some(encoder) => {
                    progress.phase(RenderPhase::Encoding, 100.0, "encoding frames");
                    let bytes = encoder.encode(frames, plan.fps).await.map_err(|e| {
                        SketchError::Encoding {
                            frames_rendered: frame_count,
                            message: format!("{e:#}"),
                        }
                    })?;
                    RenderOutput::Encoded {
                        bytes,
                        content_type: encoder.content_type(),
                        frame_count,
                    }
                }
            };

            progress.phase(RenderPhase::Complete, 100.0, "loop render complete");
            tracing::info!(frames = frame_count, "loop render finished");
            Ok(ExecutionResult {
                output,
                metadata: validated.metadata(Some(plan.total_frames)),
            })
        }
    }
}
