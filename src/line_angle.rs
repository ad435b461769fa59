use nalgebra::Point2;

use crate::config::LocalModelConfig;
use crate::geometry::{bound_line_angle, ImageSize};

/// A slope with its voting weight
#[derive(Debug, Clone, Copy)]
struct WeightedSlope {
    slope: f64,
    weight: f64,
}

/// Compute weighted median of slopes
fn weighted_median(slopes: &mut [WeightedSlope]) -> Option<f64> {
    let total_weight: f64 = slopes.iter().map(|s| s.weight).sum();
    if slopes.is_empty() || total_weight <= 0.0 {
        return None;
    }

    slopes.sort_by(|a, b| a.slope.total_cmp(&b.slope));

    let half_weight = total_weight / 2.0;
    let mut cumulative = 0.0;
    for s in slopes.iter() {
        cumulative += s.weight;
        if cumulative >= half_weight {
            return Some(s.slope);
        }
    }
    slopes.last().map(|s| s.slope)
}

/// Weighted median of pairwise slopes (Theil–Sen style).
///
/// Only pairs further apart than `min_separation` horizontally vote, each
/// with weight `min(dx, max_weight)` so a few long spans cannot dominate.
pub fn pairwise_slope(points: &[Point2<f64>], min_separation: f64, max_weight: f64) -> Option<f64> {
    let mut slopes = Vec::with_capacity(points.len() * points.len().saturating_sub(1) / 2);
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            let dx = b.x - a.x;
            if dx.abs() <= min_separation {
                continue;
            }
            slopes.push(WeightedSlope {
                slope: (b.y - a.y) / dx,
                weight: dx.abs().min(max_weight),
            });
        }
    }
    weighted_median(&mut slopes)
}

/// Ordinary least-squares slope of y on x
pub fn least_squares_slope(points: &[Point2<f64>]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|p| (p.x - mean_x).powi(2)).sum();
    if sxx <= f64::EPSILON {
        return None;
    }
    let sxy: f64 = points
        .iter()
        .map(|p| (p.x - mean_x) * (p.y - mean_y))
        .sum();
    Some(sxy / sxx)
}

/// Measure a line's angle (radians, bounded to ±45°) from normalized
/// character centers. Slopes are taken in pixel space.
pub fn measure_line_angle(
    centers: &[Point2<f64>],
    size: ImageSize,
    config: &LocalModelConfig,
) -> Option<f64> {
    let points: Vec<Point2<f64>> = centers.iter().map(|&p| size.scale(p)).collect();

    let slope = if points.len() >= config.min_pair_points {
        pairwise_slope(&points, config.min_pair_separation, config.max_pair_weight)
            .or_else(|| least_squares_slope(&points))
    } else {
        least_squares_slope(&points)
    }?;

    Some(bound_line_angle(slope.atan()))
}
