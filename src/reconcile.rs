use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assignment::min_cost_assignment;
use crate::config::{LocalModelConfig, ReconcileConfig};
use crate::geometry::{bound_line_angle, ImageSize, Quad, Rect};
use crate::line_angle::measure_line_angle;
use crate::local_model::{AngleSample, LocalAngleModel};
use crate::transform::align_quad;

/// Recognizer output for one line, normalized coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedLine {
    pub text: String,
    pub quad: Quad,
    /// Centers of recognized characters or sub-strings, if reported
    #[serde(default)]
    pub char_centers: Vec<Point2<f64>>,
}

/// Geometry detector output for one text row, normalized coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedRow {
    pub quad: Quad,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Row angle in radians; derived from the quad baseline when absent
    #[serde(default)]
    pub angle: Option<f64>,
}

fn default_confidence() -> f64 {
    1.0
}

/// A recognized line prepared for matching
#[derive(Debug, Clone)]
pub struct TextCandidate {
    pub text: String,
    pub quad: Quad,
    pub bounds: Rect,
    pub center_y: f64,
    /// Robust angle from character centers, radians
    pub measured_angle: Option<f64>,
    /// Bounded baseline angle of the recognizer quad, radians
    pub quad_angle: f64,
    pub axis_aligned: bool,
}

impl TextCandidate {
    pub fn from_line(
        line: &RecognizedLine,
        size: ImageSize,
        local: &LocalModelConfig,
        reconcile: &ReconcileConfig,
    ) -> Self {
        let bounds = line.quad.bounds();
        Self {
            text: line.text.clone(),
            quad: line.quad,
            bounds,
            center_y: bounds.center().y,
            measured_angle: measure_line_angle(&line.char_centers, size, local),
            quad_angle: bound_line_angle(line.quad.baseline_angle(size)),
            axis_aligned: line
                .quad
                .is_axis_aligned(size, reconcile.axis_aligned_tolerance_degrees.to_radians()),
        }
    }

    /// Best local evidence for this line's angle.
    ///
    /// An axis-aligned recognizer quad says nothing about the text direction,
    /// so only a rotated quad stands in when no character centers were measured.
    pub fn line_angle(&self) -> Option<f64> {
        self.measured_angle
            .or((!self.axis_aligned).then_some(self.quad_angle))
    }
}

/// A detected row prepared for matching
#[derive(Debug, Clone)]
pub struct GeometryBlock {
    pub quad: Quad,
    pub bounds: Rect,
    pub center_y: f64,
    /// Radians, bounded to ±45°
    pub angle: f64,
    pub confidence: f64,
}

impl GeometryBlock {
    pub fn from_row(row: &DetectedRow, size: ImageSize) -> Self {
        let bounds = row.quad.bounds();
        let angle = row.angle.unwrap_or_else(|| row.quad.baseline_angle(size));
        Self {
            quad: row.quad,
            bounds,
            center_y: bounds.center().y,
            angle: bound_line_angle(angle),
            confidence: row.confidence,
        }
    }
}

/// Final overlay placement, normalized original-image space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub text: String,
    pub quad: Quad,
}

/// Result of matching candidates to blocks
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Block index per candidate
    pub assignment: Vec<Option<usize>>,
    /// Angle each candidate should end up with, radians
    pub target_angles: Vec<f64>,
    pub matched: usize,
}

impl Reconciliation {
    pub fn fallback(&self) -> usize {
        self.assignment.len() - self.matched
    }
}

/// Local angle profile built from the candidates' line angles
pub fn local_model_for(
    candidates: &[TextCandidate],
    band_count: usize,
    fallback: f64,
) -> LocalAngleModel {
    let samples: Vec<AngleSample> = candidates
        .iter()
        .filter_map(|c| c.line_angle().map(|a| AngleSample::new(c.center_y, a)))
        .collect();
    LocalAngleModel::build(&samples, band_count, fallback)
}

/// Matching cost of a candidate/block pair: `1 - score` when the pair passes
/// any acceptance gate, otherwise 1.
pub fn match_cost(candidate: &TextCandidate, block: &GeometryBlock, config: &ReconcileConfig) -> f64 {
    let iou = candidate.bounds.iou(&block.bounds);
    let vertical = candidate.bounds.vertical_overlap_ratio(&block.bounds);
    let distance = candidate.bounds.center_distance(&block.bounds);

    let accepted = iou >= config.min_iou
        || vertical >= config.min_vertical_overlap
        || distance <= config.max_center_distance;
    if !accepted {
        return 1.0;
    }

    let score = config.iou_weight * iou
        + config.vertical_overlap_weight * vertical
        + config.center_weight * (1.0 - distance.min(1.0));
    (1.0 - score).clamp(0.0, 1.0)
}

/// Square cost matrix padded with dummy rows (free) and dummy columns
/// (`unmatched_cost`)
pub fn cost_matrix(
    candidates: &[TextCandidate],
    blocks: &[GeometryBlock],
    config: &ReconcileConfig,
) -> Vec<Vec<f64>> {
    let (n, m) = (candidates.len(), blocks.len());
    let size = n.max(m);
    (0..size)
        .map(|i| {
            (0..size)
                .map(|j| match (candidates.get(i), blocks.get(j)) {
                    (Some(c), Some(b)) => match_cost(c, b, config),
                    (None, _) => 0.0,
                    (Some(_), None) => config.unmatched_cost,
                })
                .collect()
        })
        .collect()
}

/// Match candidates to blocks and pick each candidate's target angle
pub fn reconcile(
    candidates: &[TextCandidate],
    blocks: &[GeometryBlock],
    model: &LocalAngleModel,
    config: &ReconcileConfig,
) -> Reconciliation {
    if candidates.is_empty() {
        return Reconciliation::default();
    }

    let assignment: Vec<Option<usize>> = if blocks.is_empty() {
        vec![None; candidates.len()]
    } else {
        let costs = cost_matrix(candidates, blocks, config);
        min_cost_assignment(&costs)
            .into_iter()
            .take(candidates.len())
            .enumerate()
            .map(|(i, j)| j.filter(|&j| j < blocks.len() && costs[i][j] <= config.unmatched_cost))
            .collect()
    };

    let target_angles: Vec<f64> = candidates
        .iter()
        .zip(&assignment)
        .map(|(candidate, matched)| match matched {
            Some(j) => blocks[*j].angle,
            None => model.angle_at(candidate.center_y),
        })
        .collect();

    let matched = assignment.iter().filter(|a| a.is_some()).count();
    debug!(
        candidates = candidates.len(),
        blocks = blocks.len(),
        matched,
        "reconciled candidates with geometry"
    );

    Reconciliation {
        assignment,
        target_angles,
        matched,
    }
}

/// Rotate every candidate quad to its target angle
pub fn place(
    candidates: &[TextCandidate],
    reconciliation: &Reconciliation,
    size: ImageSize,
    config: &ReconcileConfig,
) -> Vec<Placement> {
    let min_delta = config.min_rotation_delta_degrees.to_radians();
    candidates
        .iter()
        .zip(&reconciliation.target_angles)
        .map(|(candidate, &target)| {
            let current = candidate.quad.baseline_angle(size);
            Placement {
                text: candidate.text.clone(),
                quad: align_quad(&candidate.quad, current, target, min_delta, size),
            }
        })
        .collect()
}
