use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AlignError, Result};

/// Top-level settings for aligning a document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Recognition languages, passed through to the recognizer
    pub languages: Vec<String>,
    /// Pixels per page unit used when the page was rasterized
    pub render_scale: f64,
    /// Per-page budget for the angle search; expiry yields angle 0
    pub page_timeout_ms: Option<u64>,
    pub recognition: RecognitionConfig,
    pub skew: SkewConfig,
    pub local: LocalModelConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            languages: vec!["eng".to_string()],
            render_scale: 2.0,
            page_timeout_ms: None,
            recognition: RecognitionConfig::default(),
            skew: SkewConfig::default(),
            local: LocalModelConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl AlignConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AlignError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(AlignError::InvalidConfig(msg.to_string()));

        if !(self.render_scale > 0.0) {
            return invalid("render_scale must be positive");
        }
        self.skew.search.validate()?;
        if self.skew.band_count == 0 || self.local.band_count == 0 {
            return invalid("band_count must be at least 1");
        }
        if self.skew.band_stride == 0 {
            return invalid("band_stride must be at least 1");
        }
        if self.skew.min_deskew_degrees > self.skew.max_deskew_degrees {
            return invalid("min_deskew_degrees exceeds max_deskew_degrees");
        }
        if self.recognition.max_attempts == 0 {
            return invalid("recognition.max_attempts must be at least 1");
        }
        if !(self.recognition.downscale_factor > 0.0 && self.recognition.downscale_factor < 1.0) {
            return invalid("recognition.downscale_factor must be in (0, 1)");
        }
        if !(self.reconcile.unmatched_cost > 0.0 && self.reconcile.unmatched_cost <= 1.0) {
            return invalid("reconcile.unmatched_cost must be in (0, 1]");
        }
        Ok(())
    }
}

/// Angle window for the projection search, in degrees
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AngleSearch {
    pub min_degrees: f64,
    pub max_degrees: f64,
    pub coarse_step: f64,
    pub fine_step: f64,
    /// Half-width of the fine pass around the coarse optimum
    pub fine_range: f64,
    /// Background padding added on each side, as a fraction of each axis
    pub padding: f64,
}

impl Default for AngleSearch {
    fn default() -> Self {
        Self {
            min_degrees: -8.0,
            max_degrees: 8.0,
            coarse_step: 0.5,
            fine_step: 0.1,
            fine_range: 1.0,
            padding: 0.1,
        }
    }
}

impl AngleSearch {
    pub fn validate(&self) -> Result<()> {
        if self.min_degrees > self.max_degrees {
            return Err(AlignError::InvalidConfig(
                "search.min_degrees exceeds search.max_degrees".to_string(),
            ));
        }
        if !(self.coarse_step > 0.0 && self.fine_step > 0.0) {
            return Err(AlignError::InvalidConfig(
                "search steps must be positive".to_string(),
            ));
        }
        if self.fine_step > self.coarse_step {
            return Err(AlignError::InvalidConfig(
                "search.fine_step must not exceed search.coarse_step".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.padding) {
            return Err(AlignError::InvalidConfig(
                "search.padding must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Global skew estimation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkewConfig {
    /// Longest side of the working image; larger pages are downscaled
    pub working_max_dimension: u32,
    /// Fixed ink threshold, 0 for Otsu
    pub ink_threshold: u8,
    /// Threshold used when Otsu finds no split
    pub default_threshold: u8,
    /// Pages with less ink are treated as unrotated
    pub min_ink_pixels: usize,
    pub search: AngleSearch,
    pub band_count: usize,
    /// Sampling stride when estimating band ink density
    pub band_stride: u32,
    /// Bands with fewer (estimated) ink pixels are empty
    pub min_ink_samples: usize,
    pub outlier_max_deviation_degrees: f64,
    pub min_non_empty_bands: usize,
    pub band_median_enabled: bool,
    /// Projection angles at or below this are suspected of being insensitive
    pub near_zero_degrees: f64,
    /// Band-median angles at or above this override a near-zero projection
    pub min_significant_degrees: f64,
    pub min_deskew_degrees: f64,
    pub max_deskew_degrees: f64,
    pub min_baseline_samples: usize,
    /// Baseline angle sets flatter than this are rejected
    pub min_baseline_std_degrees: f64,
}

impl Default for SkewConfig {
    fn default() -> Self {
        Self {
            working_max_dimension: 1600,
            ink_threshold: 0,
            default_threshold: crate::binarize::DEFAULT_THRESHOLD,
            min_ink_pixels: 200,
            search: AngleSearch::default(),
            band_count: 8,
            band_stride: 2,
            min_ink_samples: 150,
            outlier_max_deviation_degrees: 1.5,
            min_non_empty_bands: 3,
            band_median_enabled: true,
            near_zero_degrees: 0.15,
            min_significant_degrees: 0.3,
            min_deskew_degrees: 0.1,
            max_deskew_degrees: 10.0,
            min_baseline_samples: 5,
            min_baseline_std_degrees: 0.01,
        }
    }
}

/// Per-line angle measurement and local angle profile settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalModelConfig {
    pub band_count: usize,
    /// Character centers closer than this horizontally (pixels) are not paired
    pub min_pair_separation: f64,
    /// Cap on the weight of one pair (pixels of horizontal separation)
    pub max_pair_weight: f64,
    /// Fewer centers than this use a least-squares fit instead of pairs
    pub min_pair_points: usize,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            band_count: 8,
            min_pair_separation: 4.0,
            max_pair_weight: 200.0,
            min_pair_points: 4,
        }
    }
}

/// Candidate/geometry matching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub iou_weight: f64,
    pub vertical_overlap_weight: f64,
    pub center_weight: f64,
    pub min_iou: f64,
    pub min_vertical_overlap: f64,
    pub max_center_distance: f64,
    /// Cost of leaving a candidate unmatched
    pub unmatched_cost: f64,
    /// Quads are only rotated when the correction reaches this size
    pub min_rotation_delta_degrees: f64,
    /// Edges within this of horizontal/vertical count as axis-aligned
    pub axis_aligned_tolerance_degrees: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            iou_weight: 0.45,
            vertical_overlap_weight: 0.35,
            center_weight: 0.20,
            min_iou: 0.01,
            min_vertical_overlap: 0.20,
            max_center_distance: 0.18,
            unmatched_cost: 0.72,
            min_rotation_delta_degrees: 0.2,
            axis_aligned_tolerance_degrees: 0.05,
        }
    }
}

/// Retry policy for the external recognizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub max_attempts: usize,
    /// Each retry scales the previous candidate image by this factor
    pub downscale_factor: f64,
    /// No retry is attempted once the longest side would drop below this
    pub min_dimension: u32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            downscale_factor: 0.75,
            min_dimension: 256,
        }
    }
}
