use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Pixel dimensions of the image a set of normalized coordinates refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scale a normalized point into pixel units, keeping the y-up orientation
    pub fn scale(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(p.x * self.width as f64, p.y * self.height as f64)
    }
}

/// Fold a line angle (radians) into (-π/2, π/2] and bound it to ±45°.
///
/// A text line has no direction, so θ and θ ± π describe the same line.
pub fn bound_line_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let mut folded = angle % PI;
    if folded > FRAC_PI_2 {
        folded -= PI;
    } else if folded <= -FRAC_PI_2 {
        folded += PI;
    }
    folded.clamp(-FRAC_PI_4, FRAC_PI_4)
}

/// Angle of the segment a→b in radians, measured in pixel space
pub fn segment_angle(a: Point2<f64>, b: Point2<f64>, size: ImageSize) -> f64 {
    let a = size.scale(a);
    let b = size.scale(b);
    (b.y - a.y).atan2(b.x - a.x)
}

/// Axis-aligned rectangle in normalized, y-up coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_points(points: &[Point2<f64>]) -> Self {
        let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        Self::new(min_x, min_y, max_x, max_y)
    }

    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point2<f64> {
        Point2::new(
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }

    pub fn iou(&self, other: &Self) -> f64 {
        let inter = Rect::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        );
        let inter_area = inter.area();
        let union = self.area() + other.area() - inter_area;
        if union <= 0.0 {
            0.0
        } else {
            inter_area / union
        }
    }

    /// Shared vertical extent relative to the shorter of the two rectangles
    pub fn vertical_overlap_ratio(&self, other: &Self) -> f64 {
        let overlap = (self.max_y.min(other.max_y) - self.min_y.max(other.min_y)).max(0.0);
        let shorter = self.height().min(other.height());
        if shorter <= 0.0 {
            0.0
        } else {
            (overlap / shorter).min(1.0)
        }
    }

    pub fn center_distance(&self, other: &Self) -> f64 {
        (self.center() - other.center()).norm()
    }
}

/// Text-line quadrilateral.
///
/// Corner order is bottom-left, bottom-right, top-right, top-left, so the
/// first two corners form the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad(pub [Point2<f64>; 4]);

impl Quad {
    pub fn new(corners: [Point2<f64>; 4]) -> Self {
        Self(corners)
    }

    pub fn from_rect(rect: &Rect) -> Self {
        Self([
            Point2::new(rect.min_x, rect.min_y),
            Point2::new(rect.max_x, rect.min_y),
            Point2::new(rect.max_x, rect.max_y),
            Point2::new(rect.min_x, rect.max_y),
        ])
    }

    pub fn corners(&self) -> &[Point2<f64>; 4] {
        &self.0
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_points(&self.0)
    }

    pub fn centroid(&self) -> Point2<f64> {
        let sum = self
            .0
            .iter()
            .fold(nalgebra::Vector2::<f64>::zeros(), |acc, p| acc + p.coords);
        Point2::from(sum / 4.0)
    }

    /// Angle of the bottom-left → bottom-right edge, radians, pixel space
    pub fn baseline_angle(&self, size: ImageSize) -> f64 {
        segment_angle(self.0[0], self.0[1], size)
    }

    /// True when both horizontal edges are level and both vertical edges upright
    pub fn is_axis_aligned(&self, size: ImageSize, tolerance: f64) -> bool {
        let [bl, br, tr, tl] = self.0;
        let level = |a, b| {
            let angle = segment_angle(a, b, size);
            angle.sin().abs() <= tolerance.sin()
        };
        let upright = |a, b| {
            let angle = segment_angle(a, b, size);
            angle.cos().abs() <= tolerance.sin()
        };
        level(bl, br) && level(tl, tr) && upright(bl, tl) && upright(br, tr)
    }

    pub fn map(&self, f: impl Fn(Point2<f64>) -> Point2<f64>) -> Self {
        Self(self.0.map(f))
    }
}
