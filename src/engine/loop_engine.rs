//! Frame-loop render: `setup` once, then `draw` once per frame.
//!
//! Between frames only the pixels and the blend mode are reset. The random
//! stream, the noise field and the transform stack carry over, so frame N's
//! randomness continues where frame N-1 stopped.

use tokio_util::sync::CancellationToken;

use super::{ProgressReporter, RenderPhase};
use crate::error::{Result, SketchError};
use crate::sandbox::config::LoopPlan;
use crate::sandbox::context::TimeVariables;
use crate::sandbox::executor::SketchInstance;
use crate::surface::{BlendMode, RasterFrame};

/// States of a loop render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    SetupRan,
    PerFrame(u32),
    /// Terminal for the engine: frames are handed to the encoder step, which
    /// reports completion.
    Encoding,
    Cancelled,
    Error,
}

/// Drives one loop render.
pub struct LoopEngine<'a> {
    plan: LoopPlan,
    state: LoopState,
    cancel: &'a CancellationToken,
    progress: &'a ProgressReporter,
}

impl<'a> LoopEngine<'a> {
    pub fn new(plan: LoopPlan, cancel: &'a CancellationToken, progress: &'a ProgressReporter) -> Self {
        Self {
            plan,
            state: LoopState::Init,
            cancel,
            progress,
        }
    }

    /// Render every frame, returning them in order.
    ///
    /// Cancellation is observed before each frame; a cancelled render drops
    /// every frame it had captured.
    pub fn run(mut self, instance: &mut SketchInstance) -> Result<Vec<RasterFrame>> {
        let result = self.step_all(instance);
        match &result {
            Ok(_) => self.transition(LoopState::Encoding),
            Err(SketchError::Cancelled { .. }) => self.transition(LoopState::Cancelled),
            Err(_) => self.transition(LoopState::Error),
        }
        result
    }

    fn step_all(&mut self, instance: &mut SketchInstance) -> Result<Vec<RasterFrame>> {
        let LoopPlan {
            total_frames,
            duration,
            ..
        } = self.plan;

        instance.set_time(TimeVariables::loop_setup(total_frames));
        self.progress.phase(RenderPhase::Setup, 0.0, "running setup");
        instance.call_setup()?;
        self.transition(LoopState::SetupRan);

        let mut frames = Vec::with_capacity(total_frames as usize);
        for frame in 0..total_frames {
            if self.cancel.is_cancelled() {
                tracing::info!(frame, total_frames, "loop render cancelled");
                return Err(SketchError::Cancelled { frame });
            }
            self.transition(LoopState::PerFrame(frame));

            let ctx = instance.context_mut();
            ctx.surface.clear();
            ctx.surface.set_blend_mode(BlendMode::Normal);
            ctx.time = TimeVariables::loop_frame(frame, total_frames, duration);

            instance.call_draw()?;
            frames.push(instance.capture());
            self.progress.frame(frame, total_frames);
        }

        tracing::debug!(total_frames, peak_memory = instance.peak_memory(), "all frames rendered");
        Ok(frames)
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!(from = ?self.state, to = ?next, "loop render");
        self.state = next;
    }
}
