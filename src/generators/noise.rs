//! Seeded gradient noise and its layered (fractal) variants.

use super::prng::Prng;

/// A gradient-noise field built once from a seeded permutation table.
///
/// Once built, sampling is a pure function of the input coordinates: the field
/// can be evaluated any number of times without drift.
#[derive(Debug, Clone)]
pub struct NoiseField {
    perm: [u8; 512],
}

impl NoiseField {
    /// Build the field for `seed` (Fisher-Yates shuffle driven by [`Prng`]).
    pub fn new(seed: u32) -> Self {
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }

        let mut rng = Prng::new(seed);
        for i in (1..256usize).rev() {
            let j = (rng.next_f64() * (i + 1) as f64).floor() as usize;
            table.swap(i, j);
        }

        let mut perm = [0u8; 512];
        perm[..256].copy_from_slice(&table);
        perm[256..].copy_from_slice(&table);
        Self { perm }
    }

    fn p(&self, index: usize) -> usize {
        self.perm[index] as usize
    }

    /// Single-octave sample in `[0, 1]`.
    pub fn sample(&self, x: f64, y: f64, z: f64) -> f64 {
        let xi = (x.floor() as i64 & 255) as usize;
        let yi = (y.floor() as i64 & 255) as usize;
        let zi = (z.floor() as i64 & 255) as usize;
        let x = x - x.floor();
        let y = y - y.floor();
        let z = z - z.floor();
        let u = fade(x);
        let v = fade(y);
        let w = fade(z);

        let a = self.p(xi) + yi;
        let aa = self.p(a) + zi;
        let ab = self.p(a + 1) + zi;
        let b = self.p(xi + 1) + yi;
        let ba = self.p(b) + zi;
        let bb = self.p(b + 1) + zi;

        let near = lerp(
            lerp(grad(self.p(aa), x, y, z), grad(self.p(ba), x - 1.0, y, z), u),
            lerp(
                grad(self.p(ab), x, y - 1.0, z),
                grad(self.p(bb), x - 1.0, y - 1.0, z),
                u,
            ),
            v,
        );
        let far = lerp(
            lerp(
                grad(self.p(aa + 1), x, y, z - 1.0),
                grad(self.p(ba + 1), x - 1.0, y, z - 1.0),
                u,
            ),
            lerp(
                grad(self.p(ab + 1), x, y - 1.0, z - 1.0),
                grad(self.p(bb + 1), x - 1.0, y - 1.0, z - 1.0),
                u,
            ),
            v,
        );

        (lerp(near, far, w) + 1.0) / 2.0
    }

    /// Sum `octaves` layers at doubling frequency and `falloff`-scaled amplitude,
    /// normalised back into `[0, 1]`.
    pub fn layered(&self, x: f64, y: f64, z: f64, octaves: u32, falloff: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = 1.0;
        let mut amplitude = 1.0;
        let mut max_value = 0.0;

        for _ in 0..octaves {
            total += self.sample(x * frequency, y * frequency, z * frequency) * amplitude;
            max_value += amplitude;
            amplitude *= falloff;
            frequency *= 2.0;
        }

        total / max_value
    }

    /// Ridged variant: folds each octave around its midpoint.
    pub fn ridged(&self, x: f64, y: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = 1.0;
        let mut amplitude = 1.0;
        let mut max_value = 0.0;

        for _ in 0..4 {
            let n = self.sample(x * frequency, y * frequency, 0.0);
            total += (1.0 - (n * 2.0 - 1.0).abs()) * amplitude;
            max_value += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        total / max_value
    }

    /// Curl of the 2D field: the central-difference gradient rotated 90 degrees.
    pub fn curl(&self, x: f64, y: f64) -> (f64, f64) {
        const EPS: f64 = 0.0001;
        let n1 = self.sample(x + EPS, y, 0.0);
        let n2 = self.sample(x - EPS, y, 0.0);
        let n3 = self.sample(x, y + EPS, 0.0);
        let n4 = self.sample(x, y - EPS, 0.0);

        let dx = (n1 - n2) / (2.0 * EPS);
        let dy = (n3 - n4) / (2.0 * EPS);
        (-dy, dx)
    }
}

/// Octave count and falloff used by the sketch-facing `noise` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseDetail {
    octaves: u32,
    falloff: f64,
}

impl NoiseDetail {
    /// Clamp octaves into `1..=8` and falloff into `[0, 1]`.
    pub fn new(octaves: i64, falloff: f64) -> Self {
        let falloff = if falloff.is_nan() { 0.5 } else { falloff.clamp(0.0, 1.0) };
        Self {
            octaves: octaves.clamp(1, 8) as u32,
            falloff,
        }
    }

    /// Current octave count.
    pub fn octaves(&self) -> u32 {
        self.octaves
    }

    /// Current amplitude falloff.
    pub fn falloff(&self) -> f64 {
        self.falloff
    }
}

impl Default for NoiseDetail {
    fn default() -> Self {
        Self {
            octaves: 4,
            falloff: 0.5,
        }
    }
}

fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + t * (b - a)
}

fn grad(hash: usize, x: f64, y: f64, z: f64) -> f64 {
    let h = hash & 15;
    let u = if h < 8 { x } else { y };
    let v = if h < 4 {
        y
    } else if h == 12 || h == 14 {
        x
    } else {
        z
    };
    (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_samples() {
        let field = NoiseField::new(42);
        assert_eq!(field.sample(0.5, 0.5, 0.5), 0.625);
        assert_eq!(field.sample(1.25, 2.5, 0.0), 0.676_757_812_5);
        assert_eq!(field.sample(0.0, 0.0, 0.0), 0.5);
        assert_eq!(field.sample(3.7, 0.2, 9.1), 0.405_947_030_968_371_37);
    }

    #[test]
    fn test_samples_stay_in_range_and_do_not_drift() {
        let field = NoiseField::new(7);
        let first = field.sample(12.3, -4.5, 0.75);
        for i in 0..500 {
            let v = field.sample(i as f64 * 0.173, i as f64 * -0.29, 1.5);
            assert!((0.0..=1.0).contains(&v));
        }
        assert_eq!(field.sample(12.3, -4.5, 0.75), first);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = NoiseField::new(1);
        let b = NoiseField::new(2);
        let differs = (0..32).any(|i| {
            let x = i as f64 * 0.37 + 0.1;
            a.sample(x, x * 0.5, 0.0) != b.sample(x, x * 0.5, 0.0)
        });
        assert!(differs);
    }

    #[test]
    fn test_single_octave_layer_matches_sample() {
        let field = NoiseField::new(5);
        assert_eq!(field.layered(0.3, 0.6, 0.9, 1, 0.5), field.sample(0.3, 0.6, 0.9));
    }

    #[test]
    fn test_detail_clamps() {
        let detail = NoiseDetail::new(20, 3.0);
        assert_eq!(detail.octaves(), 8);
        assert_eq!(detail.falloff(), 1.0);

        let detail = NoiseDetail::new(0, -1.0);
        assert_eq!(detail.octaves(), 1);
        assert_eq!(detail.falloff(), 0.0);
    }

    #[test]
    fn test_ridged_and_curl_are_deterministic() {
        let field = NoiseField::new(11);
        assert_eq!(field.ridged(0.4, 0.8), field.ridged(0.4, 0.8));
        assert_eq!(field.curl(0.4, 0.8), NoiseField::new(11).curl(0.4, 0.8));
    }
}
