use crate::bands::median;
use crate::geometry::bound_line_angle;

/// Measured line angle at a normalized vertical position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleSample {
    /// Normalized vertical position, 0..1
    pub y: f64,
    /// Radians, bounded to ±45°
    pub angle: f64,
}

impl AngleSample {
    pub fn new(y: f64, angle: f64) -> Self {
        Self {
            y: if y.is_finite() { y.clamp(0.0, 1.0) } else { 0.5 },
            angle: bound_line_angle(angle),
        }
    }
}

/// Per-band angles with no gaps
#[derive(Debug, Clone, PartialEq)]
pub struct LocalAngleModel {
    angles: Vec<f64>,
    sampled: bool,
}

impl LocalAngleModel {
    /// Same angle everywhere
    pub fn uniform(angle: f64, band_count: usize) -> Self {
        Self {
            angles: vec![bound_line_angle(angle); band_count.max(1)],
            sampled: false,
        }
    }

    /// Build the profile from samples; `fallback` fills every band when
    /// there are no samples at all.
    pub fn build(samples: &[AngleSample], band_count: usize, fallback: f64) -> Self {
        let band_count = band_count.max(1);
        let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); band_count];
        for sample in samples {
            let index = ((sample.y * band_count as f64) as usize).min(band_count - 1);
            buckets[index].push(sample.angle);
        }

        let filled: Vec<Option<f64>> = buckets.iter().map(|b| median(b)).collect();
        if filled.iter().all(Option::is_none) {
            return Self::uniform(fallback, band_count);
        }

        let angles = smooth(&interpolate_gaps(&filled));
        Self {
            angles,
            sampled: true,
        }
    }

    pub fn band_angles(&self) -> &[f64] {
        &self.angles
    }

    /// Whether the profile came from measured samples
    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Piecewise-linear angle between band centers, clamped at the ends
    pub fn angle_at(&self, y: f64) -> f64 {
        let n = self.angles.len();
        let first = self.angles[0];
        let last = self.angles[n - 1];
        if !y.is_finite() {
            return first;
        }

        let position = y * n as f64 - 0.5;
        if position <= 0.0 {
            return first;
        }
        if position >= (n - 1) as f64 {
            return last;
        }
        let lower = position.floor() as usize;
        let t = position - lower as f64;
        self.angles[lower] + (self.angles[lower + 1] - self.angles[lower]) * t
    }
}

/// Linear interpolation between the nearest filled neighbours; edges take
/// the nearest filled value
fn interpolate_gaps(filled: &[Option<f64>]) -> Vec<f64> {
    (0..filled.len())
        .map(|i| {
            if let Some(angle) = filled[i] {
                return angle;
            }
            let before = (0..i).rev().find_map(|j| filled[j].map(|a| (j, a)));
            let after = (i + 1..filled.len()).find_map(|j| filled[j].map(|a| (j, a)));
            match (before, after) {
                (Some((j0, a0)), Some((j1, a1))) => {
                    a0 + (a1 - a0) * (i - j0) as f64 / (j1 - j0) as f64
                }
                (Some((_, a)), None) | (None, Some((_, a))) => a,
                (None, None) => 0.0,
            }
        })
        .collect()
}

/// One pass of a 0.25/0.5/0.25 kernel with replicated edges
fn smooth(angles: &[f64]) -> Vec<f64> {
    let n = angles.len();
    (0..n)
        .map(|i| {
            let prev = angles[i.saturating_sub(1)];
            let next = angles[(i + 1).min(n - 1)];
            0.25 * prev + 0.5 * angles[i] + 0.25 * next
        })
        .collect()
}
