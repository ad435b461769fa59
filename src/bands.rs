use image::{imageops, GrayImage};
use tracing::debug;

use crate::binarize::INK;
use crate::config::SkewConfig;
use crate::projection::{estimate_angle, Deadline};

/// Horizontal slice `[y0, y1)` of a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub index: usize,
    pub y0: u32,
    pub y1: u32,
}

impl Band {
    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// Split `height` rows into `count` equal bands; the last absorbs the remainder
pub fn partition(height: u32, count: usize) -> Vec<Band> {
    let count = count.max(1);
    let base = height / count as u32;
    (0..count)
        .map(|index| {
            let y0 = base * index as u32;
            let y1 = if index + 1 == count {
                height
            } else {
                y0 + base
            };
            Band { index, y0, y1 }
        })
        .collect()
}

/// Angle sampled for one band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSample {
    pub band: Band,
    /// Full-resolution ink pixel estimate from strided sampling
    pub ink_estimate: usize,
    /// Angle measured on this band, `None` for empty bands
    pub measured: Option<f64>,
    /// Measured angle, or the carried-forward one for empty bands
    pub angle: f64,
}

/// Estimate the ink pixel count of a band by sampling every `stride`-th
/// pixel in both directions
pub fn estimate_band_ink(mask: &GrayImage, band: &Band, stride: u32) -> usize {
    let stride = stride.max(1);
    let width = mask.width();
    let mut hits = 0usize;
    for y in (band.y0..band.y1).step_by(stride as usize) {
        for x in (0..width).step_by(stride as usize) {
            if mask.get_pixel(x, y).0[0] == INK {
                hits += 1;
            }
        }
    }
    hits * (stride as usize * stride as usize)
}

/// Fill empty entries with the previous measured angle (0 before the first)
pub fn carry_forward(measured: &[Option<f64>]) -> Vec<f64> {
    let mut last = 0.0;
    measured
        .iter()
        .map(|m| {
            if let Some(angle) = m {
                last = *angle;
            }
            last
        })
        .collect()
}

/// Sample one skew angle per band, top to bottom.
///
/// Always returns exactly `config.band_count` samples.
pub fn sample_bands(mask: &GrayImage, config: &SkewConfig, deadline: &Deadline) -> Vec<BandSample> {
    let bands = partition(mask.height(), config.band_count);

    let measured: Vec<(Band, usize, Option<f64>)> = bands
        .into_iter()
        .map(|band| {
            let ink_estimate = estimate_band_ink(mask, &band, config.band_stride);
            if ink_estimate < config.min_ink_samples || band.height() == 0 {
                return (band, ink_estimate, None);
            }
            let sub = imageops::crop_imm(mask, 0, band.y0, mask.width(), band.height()).to_image();
            let angle = estimate_angle(&sub, &config.search, deadline).map(|p| p.angle_degrees);
            (band, ink_estimate, angle)
        })
        .collect();

    let angles = carry_forward(&measured.iter().map(|m| m.2).collect::<Vec<_>>());

    measured
        .into_iter()
        .zip(angles)
        .map(|((band, ink_estimate, measured), angle)| {
            debug!(
                band = band.index,
                ink = ink_estimate,
                measured = ?measured,
                angle,
                "band sample"
            );
            BandSample {
                band,
                ink_estimate,
                measured,
                angle,
            }
        })
        .collect()
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Median of the measured band angles after dropping outliers.
///
/// `None` unless at least `min_bands` angles exist both before and after
/// removing entries further than `max_deviation` from the raw median.
pub fn band_median(angles: &[f64], max_deviation: f64, min_bands: usize) -> Option<f64> {
    if angles.len() < min_bands {
        return None;
    }
    let center = median(angles)?;
    let kept: Vec<f64> = angles
        .iter()
        .copied()
        .filter(|a| (a - center).abs() <= max_deviation)
        .collect();
    if kept.len() < min_bands {
        return None;
    }
    median(&kept)
}

/// Band-median estimate over the non-empty bands of a sample set
pub fn band_median_estimate(samples: &[BandSample], config: &SkewConfig) -> Option<f64> {
    let measured: Vec<f64> = samples.iter().filter_map(|s| s.measured).collect();
    band_median(
        &measured,
        config.outlier_max_deviation_degrees,
        config.min_non_empty_bands,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_partition_last_band_absorbs_remainder() {
        let bands = partition(103, 4);
        assert_eq!(bands.len(), 4);
        assert_eq!(bands[0], Band { index: 0, y0: 0, y1: 25 });
        assert_eq!(bands[3], Band { index: 3, y0: 75, y1: 103 });
        assert_eq!(partition(10, 0).len(), 1);
    }

    #[test]
    fn test_carry_forward() {
        let angles = carry_forward(&[None, None, Some(7.0), None]);
        assert_eq!(angles, vec![0.0, 0.0, 7.0, 7.0]);
    }

    #[test]
    fn test_band_ink_estimate_scales_by_stride() {
        let mask = GrayImage::from_pixel(40, 40, Luma([INK]));
        let band = Band { index: 0, y0: 0, y1: 20 };
        assert_eq!(estimate_band_ink(&mask, &band, 1), 800);
        assert_eq!(estimate_band_ink(&mask, &band, 2), 800);
        assert_eq!(estimate_band_ink(&GrayImage::new(40, 40), &band, 2), 0);
    }

    #[test]
    fn test_empty_mask_yields_band_count_zero_angles() {
        let config = SkewConfig::default();
        let samples = sample_bands(&GrayImage::new(64, 64), &config, &Deadline::none());
        assert_eq!(samples.len(), config.band_count);
        assert!(samples.iter().all(|s| s.measured.is_none() && s.angle == 0.0));
        assert_eq!(band_median_estimate(&samples, &config), None);
    }

    #[test]
    fn test_band_median_rejects_outlier() {
        let estimate = band_median(&[5.0, 5.0, 5.0, 5.0, 40.0], 2.0, 3);
        assert_eq!(estimate, Some(5.0));
    }

    #[test]
    fn test_band_median_needs_enough_bands() {
        assert_eq!(band_median(&[1.0, 1.2], 2.0, 3), None);
        // enough before filtering, too few after
        assert_eq!(band_median(&[0.0, 10.0, 20.0], 2.0, 3), None);
    }

    #[test]
    fn test_median_even_count() {
        assert_eq!(median(&[1.0, 4.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
