use image::{GrayImage, Luma};

/// Value of an ink pixel in a mask
pub const INK: u8 = 255;

/// Value of a background pixel in a mask
pub const BACKGROUND: u8 = 0;

/// Threshold used when Otsu cannot split the histogram
pub const DEFAULT_THRESHOLD: u8 = 128;

/// Build a 256-bin intensity histogram
pub fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut bins = [0u64; 256];
    for pixel in gray.pixels() {
        bins[pixel.0[0] as usize] += 1;
    }
    bins
}

/// Otsu threshold over a histogram.
///
/// Returns the first intensity of the light class, so `value < threshold`
/// selects the dark class. Ties keep the first maximum. A histogram that
/// never splits into two non-empty classes yields `None`.
pub fn otsu_threshold(bins: &[u64; 256]) -> Option<u8> {
    let total: u64 = bins.iter().sum();
    if total == 0 {
        return None;
    }

    let total_sum: f64 = bins
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut weight_dark = 0u64;
    let mut sum_dark = 0.0f64;
    let mut best: Option<(usize, f64)> = None;

    for (level, &count) in bins.iter().enumerate() {
        weight_dark += count;
        sum_dark += level as f64 * count as f64;
        if weight_dark == 0 {
            continue;
        }
        let weight_light = total - weight_dark;
        if weight_light == 0 {
            break;
        }

        let mean_dark = sum_dark / weight_dark as f64;
        let mean_light = (total_sum - sum_dark) / weight_light as f64;
        let variance =
            weight_dark as f64 * weight_light as f64 * (mean_dark - mean_light).powi(2);

        if best.map_or(true, |(_, max)| variance > max) {
            best = Some((level, variance));
        }
    }

    // level 255 never qualifies (the light class would be empty)
    best.map(|(level, _)| (level + 1) as u8)
}

/// Resolve the threshold for an image: a configured non-zero value wins,
/// otherwise Otsu with `fallback` for degenerate histograms.
pub fn resolve_threshold(gray: &GrayImage, configured: u8, fallback: u8) -> u8 {
    if configured != 0 {
        return configured;
    }
    otsu_threshold(&histogram(gray)).unwrap_or(fallback)
}

/// Produce the ink mask for a grayscale image
pub fn ink_mask(gray: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = gray.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if gray.get_pixel(x, y).0[0] < threshold {
            Luma([INK])
        } else {
            Luma([BACKGROUND])
        }
    })
}

/// Restore strict 0/255 values after resampling introduced gray levels
pub fn rebinarize(mask: &mut GrayImage) {
    for pixel in mask.pixels_mut() {
        pixel.0[0] = if pixel.0[0] >= DEFAULT_THRESHOLD {
            INK
        } else {
            BACKGROUND
        };
    }
}

pub fn count_ink(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p.0[0] == INK).count()
}
