//! Per-execution capability context: the only state a sketch can reach.

use crate::generators::{seed_key, NoiseDetail, NoiseField, Prng};
use crate::surface::Surface;
use crate::vars::ProtocolVariables;

/// Frame timing visible to the sketch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeVariables {
    /// Zero-based frame index.
    pub frame_index: u32,
    /// Loop progress in `[0, 1)`.
    pub t: f64,
    /// `t` scaled by the loop duration, in seconds.
    pub time: f64,
    /// Frames in the loop; 1 for static renders.
    pub total_frames: u32,
}

impl TimeVariables {
    /// The fixed timing of a static render: `(0, 0, 0, 1)`.
    pub fn still() -> Self {
        Self {
            frame_index: 0,
            t: 0.0,
            time: 0.0,
            total_frames: 1,
        }
    }

    /// Timing seen by `setup` in a loop render.
    pub fn loop_setup(total_frames: u32) -> Self {
        Self {
            total_frames,
            ..Self::still()
        }
    }

    /// Timing for one loop frame.
    pub fn loop_frame(frame_index: u32, total_frames: u32, duration: f64) -> Self {
        let t = frame_index as f64 / total_frames as f64;
        Self {
            frame_index,
            t,
            time: t * duration,
            total_frames,
        }
    }
}

/// Everything bound into a sketch's import namespaces for one execution.
///
/// Owned by exactly one store. The generators are created once here and are
/// never reset by the render engines.
pub struct CapabilityContext {
    pub surface: Box<dyn Surface>,
    pub prng: Prng,
    pub noise: NoiseField,
    pub noise_detail: NoiseDetail,
    pub vars: ProtocolVariables,
    pub time: TimeVariables,
}

impl CapabilityContext {
    /// Build a context whose generators are keyed by `seed`.
    pub fn new(seed: i64, vars: ProtocolVariables, surface: Box<dyn Surface>) -> Self {
        let key = seed_key(seed);
        Self {
            surface,
            prng: Prng::new(key),
            noise: NoiseField::new(key),
            noise_detail: NoiseDetail::default(),
            vars,
            time: TimeVariables::still(),
        }
    }

    /// Restart the random stream from `seed`.
    pub fn reseed_random(&mut self, seed: i64) {
        self.prng.reseed(seed_key(seed));
    }

    /// Rebuild the noise field from `seed`.
    pub fn reseed_noise(&mut self, seed: i64) {
        self.noise = NoiseField::new(seed_key(seed));
    }

    /// Layered noise under the current detail settings.
    pub fn noise(&self, x: f64, y: f64, z: f64) -> f64 {
        self.noise
            .layered(x, y, z, self.noise_detail.octaves(), self.noise_detail.falloff())
    }
}

impl std::fmt::Debug for CapabilityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityContext")
            .field("surface", &(self.surface.width(), self.surface.height()))
            .field("vars", &self.vars)
            .field("time", &self.time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Raster;

    #[test]
    fn test_still_timing() {
        let time = TimeVariables::still();
        assert_eq!((time.frame_index, time.t, time.time, time.total_frames), (0, 0.0, 0.0, 1));
    }

    #[test]
    fn test_loop_frame_timing() {
        let time = TimeVariables::loop_frame(3, 12, 2.0);
        assert_eq!(time.t, 0.25);
        assert_eq!(time.time, 0.5);
        assert_eq!(time.total_frames, 12);
    }

    #[test]
    fn test_context_generators_follow_seed() {
        let a = CapabilityContext::new(9, ProtocolVariables::zeros(), Box::new(Raster::new(1, 1)));
        let mut b = CapabilityContext::new(9, ProtocolVariables::zeros(), Box::new(Raster::new(1, 1)));
        let mut reference = Prng::new(9);

        assert_eq!(b.prng.next_u32(), reference.next_u32());
        assert_eq!(a.noise(0.3, 0.2, 0.1), b.noise(0.3, 0.2, 0.1));

        b.reseed_random(9);
        assert_eq!(b.prng, a.prng);
    }
}
