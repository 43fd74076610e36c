//! Deterministic software raster.
//!
//! Shapes are sampled at pixel centres through the inverse of the current
//! transform, with no anti-aliasing, so identical call sequences always
//! produce identical bytes.

use super::{Affine, BlendMode, Rgba, Surface};

#[derive(Debug, Clone, Copy)]
struct DrawState {
    transform: Affine,
    fill: Option<Rgba>,
    stroke: Option<Rgba>,
    stroke_weight: f64,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            fill: Some(Rgba::WHITE),
            stroke: Some(Rgba::BLACK),
            stroke_weight: 1.0,
        }
    }
}

/// Row-major RGBA8 surface, straight alpha.
#[derive(Debug, Clone)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    state: DrawState,
    stack: Vec<DrawState>,
    blend: BlendMode,
}

impl Raster {
    /// A fully transparent `width` x `height` surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
            state: DrawState::default(),
            stack: Vec::new(),
            blend: BlendMode::Normal,
        }
    }

    /// The current transform.
    pub fn transform(&self) -> Affine {
        self.state.transform
    }

    fn half_weight(&self) -> f64 {
        (self.state.stroke_weight / 2.0).max(0.5)
    }

    fn blend_at(&mut self, x: u32, y: u32, color: Rgba, mode: BlendMode) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let dst = Rgba::new(
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        );
        let out = composite(color, dst, mode);
        self.pixels[i..i + 4].copy_from_slice(&out.to_array());
    }

    /// Visit every device pixel whose centre maps inside `covers` in local
    /// space. `bounds` is the local-space bounding box `(x0, y0, x1, y1)`.
    fn paint<F>(&mut self, bounds: (f64, f64, f64, f64), color: Rgba, covers: F)
    where
        F: Fn(f64, f64) -> bool,
    {
        let transform = self.state.transform;
        let Some(inverse) = transform.invert() else {
            return;
        };
        let Some((x0, y0, x1, y1)) = self.device_bounds(&transform, bounds) else {
            return;
        };

        let mode = self.blend;
        for py in y0..y1 {
            for px in x0..x1 {
                let (lx, ly) = inverse.apply(px as f64 + 0.5, py as f64 + 0.5);
                if covers(lx, ly) {
                    self.blend_at(px, py, color, mode);
                }
            }
        }
    }

    fn device_bounds(
        &self,
        transform: &Affine,
        (x0, y0, x1, y1): (f64, f64, f64, f64),
    ) -> Option<(u32, u32, u32, u32)> {
        let corners = [
            transform.apply(x0, y0),
            transform.apply(x1, y0),
            transform.apply(x0, y1),
            transform.apply(x1, y1),
        ];
        let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
        if ![min_x, max_x, min_y, max_y].iter().all(|v| v.is_finite()) {
            return None;
        }

        let clamp_x = |v: f64| v.clamp(0.0, self.width as f64) as u32;
        let clamp_y = |v: f64| v.clamp(0.0, self.height as f64) as u32;
        let bounds = (
            clamp_x(min_x.floor()),
            clamp_y(min_y.floor()),
            clamp_x(max_x.ceil() + 1.0),
            clamp_y(max_y.ceil() + 1.0),
        );
        (bounds.0 < bounds.2 && bounds.1 < bounds.3).then_some(bounds)
    }
}

impl Surface for Raster {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }

    fn background(&mut self, color: Rgba) {
        for y in 0..self.height {
            for x in 0..self.width {
                self.blend_at(x, y, color, BlendMode::Normal);
            }
        }
    }

    fn set_fill(&mut self, color: Option<Rgba>) {
        self.state.fill = color;
    }

    fn set_stroke(&mut self, color: Option<Rgba>) {
        self.state.stroke = color;
    }

    fn set_stroke_weight(&mut self, weight: f64) {
        self.state.stroke_weight = if weight.is_finite() { weight.max(0.0) } else { 1.0 };
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        let (x0, x1) = if w < 0.0 { (x + w, x) } else { (x, x + w) };
        let (y0, y1) = if h < 0.0 { (y + h, y) } else { (y, y + h) };

        if let Some(fill) = self.state.fill {
            self.paint((x0, y0, x1, y1), fill, |lx, ly| {
                lx >= x0 && lx < x1 && ly >= y0 && ly < y1
            });
        }
        if let Some(stroke) = self.state.stroke {
            let hw = self.half_weight();
            let inside = move |lx: f64, ly: f64, pad: f64| {
                lx >= x0 - pad && lx < x1 + pad && ly >= y0 - pad && ly < y1 + pad
            };
            self.paint((x0 - hw, y0 - hw, x1 + hw, y1 + hw), stroke, |lx, ly| {
                inside(lx, ly, hw) && !inside(lx, ly, -hw)
            });
        }
    }

    fn ellipse(&mut self, cx: f64, cy: f64, w: f64, h: f64) {
        let rx = w.abs() / 2.0;
        let ry = h.abs() / 2.0;
        let within = move |lx: f64, ly: f64, rx: f64, ry: f64| {
            if rx <= 0.0 || ry <= 0.0 {
                return false;
            }
            let dx = (lx - cx) / rx;
            let dy = (ly - cy) / ry;
            dx * dx + dy * dy <= 1.0
        };

        if let Some(fill) = self.state.fill {
            self.paint((cx - rx, cy - ry, cx + rx, cy + ry), fill, |lx, ly| {
                within(lx, ly, rx, ry)
            });
        }
        if let Some(stroke) = self.state.stroke {
            let hw = self.half_weight();
            self.paint(
                (cx - rx - hw, cy - ry - hw, cx + rx + hw, cy + ry + hw),
                stroke,
                |lx, ly| within(lx, ly, rx + hw, ry + hw) && !within(lx, ly, rx - hw, ry - hw),
            );
        }
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        let Some(stroke) = self.state.stroke else {
            return;
        };
        let hw = self.half_weight();
        let bounds = (
            x1.min(x2) - hw,
            y1.min(y2) - hw,
            x1.max(x2) + hw,
            y1.max(y2) + hw,
        );
        self.paint(bounds, stroke, |lx, ly| {
            segment_distance(lx, ly, x1, y1, x2, y2) <= hw
        });
    }

    fn triangle(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) {
        let min_x = x1.min(x2).min(x3);
        let max_x = x1.max(x2).max(x3);
        let min_y = y1.min(y2).min(y3);
        let max_y = y1.max(y2).max(y3);

        if let Some(fill) = self.state.fill {
            self.paint((min_x, min_y, max_x, max_y), fill, |lx, ly| {
                let d1 = edge(lx, ly, x1, y1, x2, y2);
                let d2 = edge(lx, ly, x2, y2, x3, y3);
                let d3 = edge(lx, ly, x3, y3, x1, y1);
                let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
                let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
                !(has_neg && has_pos)
            });
        }
        if let Some(stroke) = self.state.stroke {
            let hw = self.half_weight();
            self.paint(
                (min_x - hw, min_y - hw, max_x + hw, max_y + hw),
                stroke,
                |lx, ly| {
                    segment_distance(lx, ly, x1, y1, x2, y2) <= hw
                        || segment_distance(lx, ly, x2, y2, x3, y3) <= hw
                        || segment_distance(lx, ly, x3, y3, x1, y1) <= hw
                },
            );
        }
    }

    fn point(&mut self, x: f64, y: f64) {
        let Some(stroke) = self.state.stroke else {
            return;
        };
        let hw = self.half_weight();
        self.paint((x - hw, y - hw, x + hw, y + hw), stroke, |lx, ly| {
            let dx = lx - x;
            let dy = ly - y;
            dx * dx + dy * dy <= hw * hw
        });
    }

    fn push(&mut self) {
        self.stack.push(self.state);
    }

    fn pop(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn translate(&mut self, x: f64, y: f64) {
        self.state.transform = self.state.transform.translated(x, y);
    }

    fn rotate(&mut self, angle: f64) {
        self.state.transform = self.state.transform.rotated(angle);
    }

    fn scale(&mut self, sx: f64, sy: f64) {
        self.state.transform = self.state.transform.scaled(sx, sy);
    }

    fn reset_matrix(&mut self) {
        self.state.transform = Affine::IDENTITY;
    }

    fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    fn set_pixel(&mut self, x: i64, y: i64, color: Rgba) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[i..i + 4].copy_from_slice(&color.to_array());
    }

    fn get_pixel(&self, x: i64, y: i64) -> Rgba {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return Rgba::TRANSPARENT;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Rgba::new(
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        )
    }

    fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

fn edge(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    (px - bx) * (ay - by) - (ax - bx) * (py - by)
}

fn segment_distance(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = ax + t * dx - px;
    let cy = ay + t * dy - py;
    (cx * cx + cy * cy).sqrt()
}

/// Composite straight-alpha `src` onto `dst`, working in premultiplied space.
fn composite(src: Rgba, dst: Rgba, mode: BlendMode) -> Rgba {
    let sa = src.a as f64 / 255.0;
    let da = dst.a as f64 / 255.0;
    let premul = |c: u8, a: f64| c as f64 / 255.0 * a;
    let s = [premul(src.r, sa), premul(src.g, sa), premul(src.b, sa)];
    let d = [premul(dst.r, da), premul(dst.g, da), premul(dst.b, da)];

    let (out, out_a) = match mode {
        BlendMode::Normal => (s.map_with(&d, |s, d| s + d * (1.0 - sa)), sa + da * (1.0 - sa)),
        BlendMode::Add => (s.map_with(&d, |s, d| (s + d).min(1.0)), (sa + da).min(1.0)),
        BlendMode::Multiply => (
            s.map_with(&d, |s, d| s * d + s * (1.0 - da) + d * (1.0 - sa)),
            sa + da - sa * da,
        ),
        BlendMode::Screen => (s.map_with(&d, |s, d| s + d - s * d), sa + da - sa * da),
    };

    if out_a <= 0.0 {
        return Rgba::TRANSPARENT;
    }
    let unpremul = |c: f64| ((c / out_a) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba::new(
        unpremul(out[0]),
        unpremul(out[1]),
        unpremul(out[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    )
}

trait ZipMap {
    fn map_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self;
}

impl ZipMap for [f64; 3] {
    fn map_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        [f(self[0], other[0]), f(self[1], other[1]), f(self[2], other[2])]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> Rgba {
        Rgba::new(255, 0, 0, 255)
    }

    #[test]
    fn test_new_raster_is_transparent() {
        let raster = Raster::new(4, 4);
        assert!(raster.pixels().iter().all(|&b| b == 0));
        assert_eq!(raster.pixels().len(), 64);
    }

    #[test]
    fn test_filled_rect_covers_exact_pixels() {
        let mut raster = Raster::new(8, 8);
        raster.set_stroke(None);
        raster.set_fill(Some(red()));
        raster.rect(2.0, 2.0, 3.0, 3.0);

        assert_eq!(raster.get_pixel(2, 2), red());
        assert_eq!(raster.get_pixel(4, 4), red());
        assert_eq!(raster.get_pixel(5, 5), Rgba::TRANSPARENT);
        assert_eq!(raster.get_pixel(1, 2), Rgba::TRANSPARENT);
    }

    #[test]
    fn test_translate_moves_shapes() {
        let mut raster = Raster::new(8, 8);
        raster.set_stroke(None);
        raster.set_fill(Some(red()));
        raster.translate(4.0, 0.0);
        raster.rect(0.0, 0.0, 1.0, 1.0);

        assert_eq!(raster.get_pixel(4, 0), red());
        assert_eq!(raster.get_pixel(0, 0), Rgba::TRANSPARENT);
    }

    #[test]
    fn test_push_pop_restores_transform_and_style() {
        let mut raster = Raster::new(4, 4);
        raster.push();
        raster.translate(10.0, 10.0);
        raster.set_fill(None);
        raster.pop();

        assert_eq!(raster.transform(), Affine::IDENTITY);
        assert_eq!(raster.stack_depth(), 0);

        raster.pop();
        assert_eq!(raster.stack_depth(), 0);
    }

    #[test]
    fn test_set_pixel_is_raw_and_bounds_checked() {
        let mut raster = Raster::new(2, 2);
        raster.set_blend_mode(BlendMode::Add);
        let half = Rgba::new(10, 20, 30, 128);
        raster.set_pixel(1, 1, half);
        raster.set_pixel(-1, 0, red());
        raster.set_pixel(2, 0, red());

        assert_eq!(raster.get_pixel(1, 1), half);
        assert_eq!(raster.get_pixel(5, 5), Rgba::TRANSPARENT);
    }

    #[test]
    fn test_normal_blend_over_opaque() {
        let dst = Rgba::new(0, 0, 255, 255);
        let src = Rgba::new(255, 0, 0, 128);
        let out = composite(src, dst, BlendMode::Normal);
        assert_eq!(out.a, 255);
        assert_eq!(out.r, 128);
        assert_eq!(out.b, 127);
    }

    #[test]
    fn test_add_and_screen_saturate() {
        let grey = Rgba::new(200, 200, 200, 255);
        assert_eq!(composite(grey, grey, BlendMode::Add), Rgba::new(255, 255, 255, 255));
        let screened = composite(grey, grey, BlendMode::Screen);
        assert!(screened.r > 200);
    }

    #[test]
    fn test_multiply_darkens() {
        let grey = Rgba::new(128, 128, 128, 255);
        let out = composite(grey, Rgba::WHITE, BlendMode::Multiply);
        assert_eq!(out, grey);
        let out = composite(grey, grey, BlendMode::Multiply);
        assert_eq!(out.r, 64);
    }

    #[test]
    fn test_line_and_point_use_stroke() {
        let mut raster = Raster::new(10, 3);
        raster.set_stroke(Some(red()));
        raster.line(0.0, 1.5, 10.0, 1.5);
        assert_eq!(raster.get_pixel(5, 1), red());
        assert_eq!(raster.get_pixel(5, 0), Rgba::TRANSPARENT);

        raster.clear();
        raster.set_stroke(None);
        raster.point(5.0, 1.0);
        assert!(raster.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_identical_calls_give_identical_bytes() {
        let draw = || {
            let mut raster = Raster::new(32, 32);
            raster.background(Rgba::new(10, 10, 10, 255));
            raster.translate(16.0, 16.0);
            raster.rotate(0.4);
            raster.set_fill(Some(Rgba::new(200, 100, 50, 180)));
            raster.ellipse(0.0, 0.0, 20.0, 12.0);
            raster.triangle(-10.0, 10.0, 0.0, -10.0, 10.0, 10.0);
            raster.pixels().to_vec()
        };
        assert_eq!(draw(), draw());
    }
}
