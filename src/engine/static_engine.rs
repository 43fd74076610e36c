//! Single-shot render: `setup` once, one captured frame, `draw` never runs.

use super::{ProgressReporter, RenderPhase};
use crate::error::Result;
use crate::sandbox::context::TimeVariables;
use crate::sandbox::executor::SketchInstance;
use crate::surface::RasterFrame;

/// States of a static render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticState {
    Init,
    SetupRan,
    Captured,
    Complete,
    Error,
}

/// Drives one static render.
pub struct StaticEngine<'a> {
    state: StaticState,
    progress: &'a ProgressReporter,
}

impl<'a> StaticEngine<'a> {
    pub fn new(progress: &'a ProgressReporter) -> Self {
        Self {
            state: StaticState::Init,
            progress,
        }
    }

    /// Run to completion. Even if the sketch exports `draw`, it is not called.
    pub fn run(mut self, instance: &mut SketchInstance) -> Result<RasterFrame> {
        let result = self.step_all(instance);
        if result.is_err() {
            self.transition(StaticState::Error);
        }
        result
    }

    fn step_all(&mut self, instance: &mut SketchInstance) -> Result<RasterFrame> {
        instance.set_time(TimeVariables::still());
        self.progress.phase(RenderPhase::Setup, 0.0, "running setup");

        instance.call_setup()?;
        self.transition(StaticState::SetupRan);

        let frame = instance.capture();
        self.transition(StaticState::Captured);

        self.transition(StaticState::Complete);
        tracing::debug!(peak_memory = instance.peak_memory(), "static render captured");
        self.progress.phase(RenderPhase::Complete, 100.0, "static render complete");
        Ok(frame)
    }

    fn transition(&mut self, next: StaticState) {
        tracing::debug!(from = ?self.state, to = ?next, "static render");
        self.state = next;
    }
}
