use image::{imageops, DynamicImage, GrayImage};
use tracing::{debug, info};

use crate::bands::{band_median_estimate, median, sample_bands, BandSample};
use crate::binarize::{count_ink, ink_mask, resolve_threshold};
use crate::config::SkewConfig;
use crate::debug::DebugSink;
use crate::projection::{estimate_angle, Deadline};

/// Outcome of an angle estimation stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AngleEstimate {
    /// Not enough signal; callers use the neutral angle
    Indeterminate,
    /// Angle in degrees, counter-clockwise positive
    Estimated(f64),
}

impl AngleEstimate {
    pub fn degrees(&self) -> Option<f64> {
        match self {
            AngleEstimate::Indeterminate => None,
            AngleEstimate::Estimated(angle) => Some(*angle),
        }
    }

    pub fn degrees_or_zero(&self) -> f64 {
        self.degrees().unwrap_or(0.0)
    }
}

/// Which stage produced the page angle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkewSource {
    Projection,
    BandMedian,
    Baseline,
    None,
}

/// Decision record for one page
#[derive(Debug, Clone)]
pub struct SkewReport {
    /// Final angle after clamping
    pub estimate: AngleEstimate,
    /// Angle before clamping, if any stage produced one
    pub raw_degrees: Option<f64>,
    pub source: SkewSource,
    pub threshold: u8,
    pub ink_pixels: usize,
    pub projection: Option<f64>,
    pub band_median: Option<f64>,
    pub bands: Vec<BandSample>,
    pub timed_out: bool,
}

impl SkewReport {
    fn empty(threshold: u8, ink_pixels: usize) -> Self {
        Self {
            estimate: AngleEstimate::Indeterminate,
            raw_degrees: None,
            source: SkewSource::None,
            threshold,
            ink_pixels,
            projection: None,
            band_median: None,
            bands: Vec::new(),
            timed_out: false,
        }
    }

    /// An aborted search keeps none of its intermediate results
    fn timed_out(threshold: u8, ink_pixels: usize) -> Self {
        Self {
            timed_out: true,
            ..Self::empty(threshold, ink_pixels)
        }
    }
}

/// Downscale so the longest side is at most `max_dimension`
pub fn working_image(gray: &GrayImage, max_dimension: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let longest = width.max(height);
    if max_dimension == 0 || longest <= max_dimension {
        return gray.clone();
    }
    let scale = max_dimension as f64 / longest as f64;
    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    imageops::resize(gray, new_width, new_height, imageops::FilterType::Triangle)
}

/// Page angle from external per-line baseline angles (degrees).
///
/// Requires `min_samples` angles and a spread of at least `min_std_degrees`;
/// a perfectly flat set usually means the lines were reported axis-aligned.
pub fn baseline_angle_fallback(
    baseline_degrees: &[f64],
    min_samples: usize,
    min_std_degrees: f64,
) -> AngleEstimate {
    if baseline_degrees.is_empty() || baseline_degrees.len() < min_samples {
        return AngleEstimate::Indeterminate;
    }
    let n = baseline_degrees.len() as f64;
    let mean = baseline_degrees.iter().sum::<f64>() / n;
    let std = (baseline_degrees
        .iter()
        .map(|a| (a - mean).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    if std < min_std_degrees {
        return AngleEstimate::Indeterminate;
    }
    median(baseline_degrees).map_or(AngleEstimate::Indeterminate, AngleEstimate::Estimated)
}

/// Apply the deskew limits: tiny angles are left alone and implausible
/// ones rejected, both resolving to 0.
pub fn clamp_deskew(angle_degrees: f64, min_degrees: f64, max_degrees: f64) -> f64 {
    let magnitude = angle_degrees.abs();
    if !angle_degrees.is_finite() || magnitude < min_degrees || magnitude > max_degrees {
        0.0
    } else {
        angle_degrees
    }
}

/// Estimate the skew of a page image.
///
/// `baseline_fallback` is consulted only when the projection search yields
/// nothing. An expired `deadline` makes the page indeterminate.
pub fn estimate_skew(
    image: &DynamicImage,
    config: &SkewConfig,
    baseline_fallback: AngleEstimate,
    deadline: &Deadline,
    sink: Option<(&dyn DebugSink, usize)>,
) -> SkewReport {
    let gray = working_image(&image.to_luma8(), config.working_max_dimension);
    let threshold = resolve_threshold(&gray, config.ink_threshold, config.default_threshold);
    let mask = ink_mask(&gray, threshold);
    drop(gray);

    let ink_pixels = count_ink(&mask);
    debug!(
        threshold,
        ink_pixels,
        width = mask.width(),
        height = mask.height(),
        "binarized page"
    );
    if let Some((sink, page)) = sink {
        sink.ink_mask(page, &mask);
    }

    if ink_pixels < config.min_ink_pixels {
        info!(ink_pixels, "too little ink for skew estimation, treating page as unrotated");
        return SkewReport::empty(threshold, ink_pixels);
    }

    let mut report = SkewReport::empty(threshold, ink_pixels);
    let projection = estimate_angle(&mask, &config.search, deadline).map(|p| p.angle_degrees);
    report.projection = projection;

    if deadline.expired() {
        info!("skew estimation timed out, using 0°");
        return SkewReport::timed_out(threshold, ink_pixels);
    }

    let (raw, source) = match projection {
        Some(proj) if proj.abs() <= config.near_zero_degrees && config.band_median_enabled => {
            report.bands = sample_bands(&mask, config, deadline);
            if let Some((sink, page)) = sink {
                for sample in &report.bands {
                    let band = imageops::crop_imm(
                        &mask,
                        0,
                        sample.band.y0,
                        mask.width(),
                        sample.band.height(),
                    )
                    .to_image();
                    sink.band_mask(page, &sample.band, &band);
                }
            }
            report.band_median = band_median_estimate(&report.bands, config);
            match report.band_median {
                Some(bm) if bm.abs() >= config.min_significant_degrees => {
                    debug!(projection = proj, band_median = bm, "band median overrides projection");
                    (Some(bm), SkewSource::BandMedian)
                }
                _ => (Some(proj), SkewSource::Projection),
            }
        }
        Some(proj) => (Some(proj), SkewSource::Projection),
        None => match baseline_fallback {
            AngleEstimate::Estimated(angle) => (Some(angle), SkewSource::Baseline),
            AngleEstimate::Indeterminate => (None, SkewSource::None),
        },
    };

    if deadline.expired() {
        info!("skew estimation timed out, using 0°");
        return SkewReport::timed_out(threshold, ink_pixels);
    }

    report.raw_degrees = raw;
    report.source = source;
    report.estimate = match raw {
        Some(angle) => AngleEstimate::Estimated(clamp_deskew(
            angle,
            config.min_deskew_degrees,
            config.max_deskew_degrees,
        )),
        None => AngleEstimate::Indeterminate,
    };

    info!(
        source = ?report.source,
        raw = ?report.raw_degrees,
        angle = report.estimate.degrees_or_zero(),
        "skew estimated"
    );
    report
}
