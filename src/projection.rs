use image::{imageops, GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::binarize::{rebinarize, BACKGROUND, INK};
use crate::config::AngleSearch;

/// Optional wall-clock limit for the angle search
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    pub fn from_millis(timeout_ms: Option<u64>) -> Self {
        timeout_ms.map_or_else(Self::none, |ms| Self::after(Duration::from_millis(ms)))
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

/// Best angle found by a search, with its projection score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionPeak {
    pub angle_degrees: f64,
    pub score: f64,
}

/// `variance / mean` of per-row ink counts; 0 for an empty mask
pub fn projection_score(mask: &GrayImage) -> f64 {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }

    let rows: Vec<f64> = (0..height)
        .map(|y| (0..width).filter(|&x| mask.get_pixel(x, y).0[0] == INK).count() as f64)
        .collect();

    let mean = rows.iter().sum::<f64>() / rows.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = rows.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / rows.len() as f64;
    variance / mean
}

/// Mask padded with background so rotation never pulls ink in from outside
struct PaddedMask {
    image: GrayImage,
    pad_x: u32,
    pad_y: u32,
    width: u32,
    height: u32,
}

impl PaddedMask {
    fn new(mask: &GrayImage, padding: f64) -> Self {
        let (width, height) = mask.dimensions();
        let padding = padding.max(0.0);
        let pad_x = (width as f64 * padding).round() as u32;
        let pad_y = (height as f64 * padding).round() as u32;

        let mut image = GrayImage::from_pixel(
            width + 2 * pad_x,
            height + 2 * pad_y,
            Luma([BACKGROUND]),
        );
        imageops::replace(&mut image, mask, pad_x as i64, pad_y as i64);

        Self {
            image,
            pad_x,
            pad_y,
            width,
            height,
        }
    }

    /// Score after undoing a skew of `angle_degrees` (counter-clockwise positive)
    fn score(&self, angle_degrees: f64) -> f64 {
        let theta = (angle_degrees as f32).to_radians();
        let rotated = rotate_about_center(
            &self.image,
            theta,
            Interpolation::Bilinear,
            Luma([BACKGROUND]),
        );
        let mut cropped =
            imageops::crop_imm(&rotated, self.pad_x, self.pad_y, self.width, self.height)
                .to_image();
        rebinarize(&mut cropped);
        projection_score(&cropped)
    }
}

/// Rotate `mask` by `angle_degrees` (counter-clockwise positive) on a
/// background canvas of the same size
pub fn rotate_mask(mask: &GrayImage, angle_degrees: f64) -> GrayImage {
    let mut rotated = rotate_about_center(
        mask,
        -(angle_degrees as f32).to_radians(),
        Interpolation::Bilinear,
        Luma([BACKGROUND]),
    );
    rebinarize(&mut rotated);
    rotated
}

fn scan(
    padded: &PaddedMask,
    min_degrees: f64,
    max_degrees: f64,
    step: f64,
    deadline: &Deadline,
) -> Option<ProjectionPeak> {
    if step <= 0.0 || min_degrees > max_degrees {
        return None;
    }

    let steps = ((max_degrees - min_degrees) / step + 1e-9).floor() as i64;
    let mut best: Option<ProjectionPeak> = None;

    for k in 0..=steps {
        if deadline.expired() {
            debug!(min_degrees, max_degrees, "angle search aborted by deadline");
            return None;
        }
        let angle_degrees = min_degrees + k as f64 * step;
        let score = padded.score(angle_degrees);
        if best.map_or(true, |b| score > b.score) {
            best = Some(ProjectionPeak {
                angle_degrees,
                score,
            });
        }
    }

    best.filter(|peak| peak.score > 0.0)
}

/// Exhaustive search over `[min, max]` at a single step
pub fn search_angle(
    mask: &GrayImage,
    min_degrees: f64,
    max_degrees: f64,
    step: f64,
    padding: f64,
    deadline: &Deadline,
) -> Option<ProjectionPeak> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let padded = PaddedMask::new(mask, padding);
    scan(&padded, min_degrees, max_degrees, step, deadline)
}

/// Coarse pass over the whole window, then a fine pass around the coarse
/// optimum clamped to the window.
///
/// `None` means no angle produced a non-zero score (no ink) or the deadline
/// expired mid-search.
pub fn estimate_angle(
    mask: &GrayImage,
    search: &AngleSearch,
    deadline: &Deadline,
) -> Option<ProjectionPeak> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let padded = PaddedMask::new(mask, search.padding);

    let coarse = scan(
        &padded,
        search.min_degrees,
        search.max_degrees,
        search.coarse_step,
        deadline,
    )?;

    let lo = (coarse.angle_degrees - search.fine_range).max(search.min_degrees);
    let hi = (coarse.angle_degrees + search.fine_range).min(search.max_degrees);
    if deadline.expired() {
        return None;
    }
    let fine = scan(&padded, lo, hi, search.fine_step, deadline);
    if fine.is_none() && deadline.expired() {
        return None;
    }

    let peak = match fine {
        Some(fine) if fine.score >= coarse.score => fine,
        _ => coarse,
    };
    debug!(
        coarse = coarse.angle_degrees,
        angle = peak.angle_degrees,
        score = peak.score,
        "projection search"
    );
    Some(peak)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Horizontal ink stripes on a background mask
    pub(crate) fn stripe_mask(width: u32, height: u32, period: u32, thickness: u32) -> GrayImage {
        let margin = width / 12;
        GrayImage::from_fn(width, height, |x, y| {
            let in_text = x >= margin && x < width - margin && y >= margin && y < height - margin;
            if in_text && (y - margin) % period < thickness {
                Luma([INK])
            } else {
                Luma([BACKGROUND])
            }
        })
    }

    #[test]
    fn test_projection_score_empty_is_zero() {
        let mask = GrayImage::new(10, 10);
        assert_eq!(projection_score(&mask), 0.0);
        assert_eq!(projection_score(&GrayImage::new(0, 0)), 0.0);
    }

    #[test]
    fn test_level_stripes_outscore_rotated() {
        let mask = stripe_mask(120, 120, 10, 2);
        let level = projection_score(&mask);
        let tilted = projection_score(&rotate_mask(&mask, 5.0));
        assert!(level > tilted);
    }

    #[test]
    fn test_recovers_known_rotation() {
        let mask = rotate_mask(&stripe_mask(300, 300, 10, 3), 3.0);
        let search = AngleSearch::default();
        let peak = estimate_angle(&mask, &search, &Deadline::none()).unwrap();
        assert!(
            (peak.angle_degrees - 3.0).abs() <= 0.15,
            "estimated {}",
            peak.angle_degrees
        );
    }

    #[test]
    fn test_recovers_negative_rotation() {
        let mask = rotate_mask(&stripe_mask(240, 240, 12, 3), -2.5);
        let peak = estimate_angle(&mask, &AngleSearch::default(), &Deadline::none()).unwrap();
        assert!((peak.angle_degrees + 2.5).abs() <= 0.15);
    }

    #[test]
    fn test_empty_mask_has_no_estimate() {
        let mask = GrayImage::new(50, 50);
        assert!(estimate_angle(&mask, &AngleSearch::default(), &Deadline::none()).is_none());
    }

    #[test]
    fn test_expired_deadline_aborts() {
        let mask = stripe_mask(60, 60, 8, 2);
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.expired());
        assert!(estimate_angle(&mask, &AngleSearch::default(), &deadline).is_none());
    }

    #[test]
    fn test_invalid_window_has_no_estimate() {
        let mask = stripe_mask(60, 60, 8, 2);
        assert!(search_angle(&mask, 2.0, -2.0, 0.5, 0.1, &Deadline::none()).is_none());
        assert!(search_angle(&mask, -2.0, 2.0, 0.0, 0.1, &Deadline::none()).is_none());
    }
}
