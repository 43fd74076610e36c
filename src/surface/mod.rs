//! The drawing-surface capability a sketch draws through.
//!
//! The sandbox only requires that a surface is deterministic for identical call
//! sequences. [`Raster`] is the built-in software implementation.

pub mod raster;
pub mod transform;

pub use raster::Raster;
pub use transform::Affine;

use serde::{Deserialize, Serialize};

/// Deepest push/pop nesting a sketch may reach.
pub const MAX_STACK_DEPTH: usize = 1024;

/// An 8-bit straight-alpha colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Build a colour from guest-supplied channels in `0..=255`.
    ///
    /// Channels are clamped and rounded; NaN maps to 0.
    pub fn from_channels(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self::new(channel(r), channel(g), channel(b), channel(a))
    }

    /// Pack as `0xRRGGBBAA`.
    pub fn to_packed(self) -> u32 {
        u32::from_be_bytes([self.r, self.g, self.b, self.a])
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

fn channel(v: f64) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.clamp(0.0, 255.0).round() as u8
    }
}

/// Compositing mode for shape drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlendMode {
    /// Source-over; the default "overwrite" mode.
    #[default]
    Normal,
    Add,
    Multiply,
    Screen,
}

impl BlendMode {
    /// Decode the guest's numeric mode (`0..=3`).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(BlendMode::Normal),
            1 => Some(BlendMode::Add),
            2 => Some(BlendMode::Multiply),
            3 => Some(BlendMode::Screen),
            _ => None,
        }
    }
}

/// Drawing operations exposed to sketches through the `draw` import namespace.
///
/// Shape operations are interpreted under the current transform and use the
/// current fill, stroke, stroke weight and blend mode. `set_pixel` and
/// `get_pixel` address device pixels directly and bypass all of that state.
pub trait Surface: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Reset every pixel to transparent.
    fn clear(&mut self);
    /// Composite `color` over the whole surface.
    fn background(&mut self, color: Rgba);

    fn set_fill(&mut self, color: Option<Rgba>);
    fn set_stroke(&mut self, color: Option<Rgba>);
    fn set_stroke_weight(&mut self, weight: f64);
    fn set_blend_mode(&mut self, mode: BlendMode);
    fn blend_mode(&self) -> BlendMode;

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64);
    fn ellipse(&mut self, cx: f64, cy: f64, w: f64, h: f64);
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64);
    fn triangle(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64);
    fn point(&mut self, x: f64, y: f64);

    /// Save transform and style state.
    fn push(&mut self);
    /// Restore the most recently pushed state; a no-op on an empty stack.
    fn pop(&mut self);
    fn translate(&mut self, x: f64, y: f64);
    fn rotate(&mut self, angle: f64);
    fn scale(&mut self, sx: f64, sy: f64);
    fn reset_matrix(&mut self);
    /// Depth of the push/pop stack.
    fn stack_depth(&self) -> usize;

    /// Write one device pixel verbatim; out-of-bounds writes are ignored.
    fn set_pixel(&mut self, x: i64, y: i64, color: Rgba);
    /// Read one device pixel; out-of-bounds reads are transparent.
    fn get_pixel(&self, x: i64, y: i64) -> Rgba;

    /// Row-major RGBA8 buffer of `width * height * 4` bytes.
    fn pixels(&self) -> &[u8];
}

/// One captured frame: a copy of the surface's pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterFrame {
    /// Copy the current contents of `surface`.
    pub fn capture(surface: &dyn Surface) -> Self {
        Self {
            width: surface.width(),
            height: surface.height(),
            pixels: surface.pixels().to_vec(),
        }
    }

    /// Wrap an existing RGBA8 buffer of `width * height * 4` bytes.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGBA8 bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Colour at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        let p = &self.pixels[i..i + 4];
        Some(Rgba::new(p[0], p[1], p[2], p[3]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_conversion_clamps_and_rounds() {
        let c = Rgba::from_channels(-5.0, 127.6, 300.0, f64::NAN);
        assert_eq!(c, Rgba::new(0, 128, 255, 0));
    }

    #[test]
    fn test_packed_layout() {
        assert_eq!(Rgba::new(0x12, 0x34, 0x56, 0x78).to_packed(), 0x1234_5678);
    }

    #[test]
    fn test_blend_codes() {
        assert_eq!(BlendMode::from_code(0), Some(BlendMode::Normal));
        assert_eq!(BlendMode::from_code(3), Some(BlendMode::Screen));
        assert_eq!(BlendMode::from_code(4), None);
        assert_eq!(BlendMode::default(), BlendMode::Normal);
    }

    #[test]
    fn test_frame_pixel_lookup() {
        let mut raster = Raster::new(3, 2);
        raster.set_pixel(2, 1, Rgba::WHITE);
        let frame = RasterFrame::capture(&raster);

        assert_eq!(frame.pixel(2, 1), Some(Rgba::WHITE));
        assert_eq!(frame.pixel(0, 0), Some(Rgba::TRANSPARENT));
        assert_eq!(frame.pixel(3, 0), None);
        assert_eq!(frame.pixels().len(), 3 * 2 * 4);
    }
}
