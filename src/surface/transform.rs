//! 2D affine transforms for the raster's matrix stack.

/// Row-major affine matrix `[a c e; b d f; 0 0 1]`.
///
/// Maps a local point `(x, y)` to `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// `self * other`: `other` is applied first, in `self`'s local space.
    pub fn then(&self, other: &Affine) -> Affine {
        Affine {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn translated(&self, x: f64, y: f64) -> Affine {
        self.then(&Affine {
            e: x,
            f: y,
            ..Affine::IDENTITY
        })
    }

    pub fn rotated(&self, angle: f64) -> Affine {
        let (sin, cos) = angle.sin_cos();
        self.then(&Affine {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        })
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> Affine {
        self.then(&Affine {
            a: sx,
            d: sy,
            ..Affine::IDENTITY
        })
    }

    /// Map a local point to device space.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Inverse matrix, or `None` when the transform collapses the plane.
    pub fn invert(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }
}

impl Default for Affine {
    fn default() -> Self {
        Affine::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn test_translate_then_scale_applies_in_local_space() {
        let m = Affine::IDENTITY.translated(10.0, 5.0).scaled(2.0, 3.0);
        assert!(close(m.apply(1.0, 1.0), (12.0, 8.0)));
    }

    #[test]
    fn test_rotation_quarter_turn() {
        let m = Affine::IDENTITY.rotated(std::f64::consts::FRAC_PI_2);
        assert!(close(m.apply(1.0, 0.0), (0.0, 1.0)));
    }

    #[test]
    fn test_inverse_round_trips_points() {
        let m = Affine::IDENTITY
            .translated(3.0, -2.0)
            .rotated(0.7)
            .scaled(1.5, 0.5);
        let inv = m.invert().unwrap();
        let (x, y) = m.apply(4.0, 9.0);
        assert!(close(inv.apply(x, y), (4.0, 9.0)));
    }

    #[test]
    fn test_degenerate_scale_has_no_inverse() {
        assert!(Affine::IDENTITY.scaled(0.0, 1.0).invert().is_none());
    }
}
