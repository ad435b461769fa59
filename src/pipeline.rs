use image::imageops::FilterType;
use image::DynamicImage;
use rayon::prelude::*;
use std::borrow::Cow;
use tracing::{info, warn};

use crate::config::AlignConfig;
use crate::debug::DebugSink;
use crate::error::{AlignError, Result};
use crate::geometry::ImageSize;
use crate::projection::Deadline;
use crate::reconcile::{
    local_model_for, place, reconcile, DetectedRow, GeometryBlock, Placement, RecognizedLine,
    TextCandidate,
};
use crate::skew::{baseline_angle_fallback, estimate_skew, SkewReport};

/// Renders a page of the source document
pub trait Rasterizer: Sync {
    fn render(&self, page: usize) -> Result<DynamicImage>;
}

/// Recognizes text lines on a page image
pub trait TextRecognizer: Sync {
    fn recognize(&self, page: usize, image: &DynamicImage) -> Result<Vec<RecognizedLine>>;
}

/// Detects text-row geometry independently of recognition
pub trait TextGeometryDetector: Sync {
    fn detect(&self, page: usize, image: &DynamicImage) -> Vec<DetectedRow>;
}

/// Everything produced for one page
#[derive(Debug, Clone)]
pub struct PageAlignment {
    pub page: usize,
    pub size: ImageSize,
    pub skew: SkewReport,
    pub placements: Vec<Placement>,
    pub matched: usize,
    pub fallback: usize,
}

/// Shrink an image by `factor`, or `None` once it would fall below
/// `min_dimension` on its longest side
pub fn downscale(image: &DynamicImage, factor: f64, min_dimension: u32) -> Option<DynamicImage> {
    let width = ((image.width() as f64 * factor).round() as u32).max(1);
    let height = ((image.height() as f64 * factor).round() as u32).max(1);
    if width.max(height) < min_dimension {
        return None;
    }
    Some(image.resize_exact(width, height, FilterType::Triangle))
}

pub struct PageAligner<'a> {
    rasterizer: &'a dyn Rasterizer,
    recognizer: &'a dyn TextRecognizer,
    detector: &'a dyn TextGeometryDetector,
    config: &'a AlignConfig,
    debug_sink: Option<&'a dyn DebugSink>,
}

impl<'a> PageAligner<'a> {
    pub fn new(
        rasterizer: &'a dyn Rasterizer,
        recognizer: &'a dyn TextRecognizer,
        detector: &'a dyn TextGeometryDetector,
        config: &'a AlignConfig,
    ) -> Self {
        Self {
            rasterizer,
            recognizer,
            detector,
            config,
            debug_sink: None,
        }
    }

    #[must_use]
    pub fn with_debug_sink(mut self, sink: Option<&'a dyn DebugSink>) -> Self {
        self.debug_sink = sink;
        self
    }

    /// Recognize with progressively downscaled retries
    fn recognize_with_retry(&self, page: usize, image: &DynamicImage) -> Result<Vec<RecognizedLine>> {
        let policy = &self.config.recognition;
        let mut candidate = Cow::Borrowed(image);
        let mut attempts = 0;
        let mut last_error = String::new();

        while attempts < policy.max_attempts {
            attempts += 1;
            match self.recognizer.recognize(page, &candidate) {
                Ok(lines) => return Ok(lines),
                Err(e) => {
                    warn!(
                        page,
                        attempt = attempts,
                        width = candidate.width(),
                        height = candidate.height(),
                        "text recognition failed: {}",
                        e
                    );
                    last_error = e.to_string();
                }
            }
            if attempts == policy.max_attempts {
                break;
            }
            match downscale(&candidate, policy.downscale_factor, policy.min_dimension) {
                Some(smaller) => candidate = Cow::Owned(smaller),
                None => break,
            }
        }

        Err(AlignError::Recognition {
            page,
            attempts,
            message: last_error,
        })
    }

    /// Run one page through the whole pipeline
    pub fn process_page(&self, page: usize) -> Result<PageAlignment> {
        let image = self.rasterizer.render(page)?;
        let size = ImageSize::new(image.width(), image.height());

        let blocks: Vec<GeometryBlock> = self
            .detector
            .detect(page, &image)
            .iter()
            .map(|row| GeometryBlock::from_row(row, size))
            .collect();
        let baseline_degrees: Vec<f64> = blocks.iter().map(|b| b.angle.to_degrees()).collect();
        let baseline = baseline_angle_fallback(
            &baseline_degrees,
            self.config.skew.min_baseline_samples,
            self.config.skew.min_baseline_std_degrees,
        );

        let deadline = Deadline::from_millis(self.config.page_timeout_ms);
        let skew = estimate_skew(
            &image,
            &self.config.skew,
            baseline,
            &deadline,
            self.debug_sink.map(|sink| (sink, page)),
        );

        let lines = self.recognize_with_retry(page, &image)?;
        drop(image);

        let candidates: Vec<TextCandidate> = lines
            .iter()
            .map(|line| {
                TextCandidate::from_line(line, size, &self.config.local, &self.config.reconcile)
            })
            .collect();

        let model = local_model_for(
            &candidates,
            self.config.local.band_count,
            skew.estimate.degrees_or_zero().to_radians(),
        );
        let reconciliation = reconcile(&candidates, &blocks, &model, &self.config.reconcile);
        let placements = place(&candidates, &reconciliation, size, &self.config.reconcile);

        info!(
            page,
            skew = skew.estimate.degrees_or_zero(),
            lines = candidates.len(),
            rows = blocks.len(),
            matched = reconciliation.matched,
            fallback = reconciliation.fallback(),
            "page aligned"
        );

        Ok(PageAlignment {
            page,
            size,
            skew,
            placements,
            matched: reconciliation.matched,
            fallback: reconciliation.fallback(),
        })
    }

    /// Process pages in parallel, returning results in page order
    pub fn align_pages(&self, page_count: usize) -> Vec<Result<PageAlignment>> {
        (0..page_count)
            .into_par_iter()
            .map(|page| self.process_page(page))
            .collect()
    }

    /// Process pages in parallel and hand each result to `emit` in page
    /// order, on the calling thread
    pub fn align_document(&self, page_count: usize, mut emit: impl FnMut(usize, Result<PageAlignment>)) {
        for (page, result) in self.align_pages(page_count).into_iter().enumerate() {
            emit(page, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Quad, Rect};
    use image::{GrayImage, Luma};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct BlankPages {
        size: u32,
    }

    impl Rasterizer for BlankPages {
        fn render(&self, page: usize) -> Result<DynamicImage> {
            if page == 2 {
                return Err(AlignError::Rasterization {
                    page,
                    message: "corrupt page".to_string(),
                });
            }
            Ok(DynamicImage::ImageLuma8(GrayImage::from_pixel(
                self.size,
                self.size,
                Luma([255]),
            )))
        }
    }

    /// Fails until the image is small enough, recording every size it saw
    struct PickyRecognizer {
        max_width: u32,
        calls: AtomicUsize,
        widths: Mutex<Vec<u32>>,
    }

    impl TextRecognizer for PickyRecognizer {
        fn recognize(&self, page: usize, image: &DynamicImage) -> Result<Vec<RecognizedLine>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.widths.lock().unwrap().push(image.width());
            if image.width() > self.max_width {
                return Err(AlignError::Recognition {
                    page,
                    attempts: 1,
                    message: "image too large".to_string(),
                });
            }
            Ok(vec![RecognizedLine {
                text: format!("page {}", page),
                quad: Quad::from_rect(&Rect::new(0.1, 0.5, 0.9, 0.55)),
                char_centers: Vec::new(),
            }])
        }
    }

    struct NoRows;

    impl TextGeometryDetector for NoRows {
        fn detect(&self, _page: usize, _image: &DynamicImage) -> Vec<DetectedRow> {
            Vec::new()
        }
    }

    fn recognizer(max_width: u32) -> PickyRecognizer {
        PickyRecognizer {
            max_width,
            calls: AtomicUsize::new(0),
            widths: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_downscale_respects_minimum() {
        let image = DynamicImage::ImageLuma8(GrayImage::new(400, 200));
        let smaller = downscale(&image, 0.5, 100).unwrap();
        assert_eq!((smaller.width(), smaller.height()), (200, 100));
        assert!(downscale(&image, 0.2, 100).is_none());
    }

    #[test]
    fn test_recognition_retries_on_smaller_images() {
        let config = AlignConfig::default();
        let pages = BlankPages { size: 1000 };
        let recognizer = recognizer(600);
        let aligner = PageAligner::new(&pages, &recognizer, &NoRows, &config);

        let result = aligner.process_page(0).unwrap();
        assert_eq!(result.placements.len(), 1);
        assert_eq!(result.fallback, 1);
        assert_eq!(*recognizer.widths.lock().unwrap(), vec![1000, 750, 563]);
    }

    #[test]
    fn test_recognition_exhaustion_is_fatal() {
        let config = AlignConfig::default();
        let pages = BlankPages { size: 1000 };
        let recognizer = recognizer(10);
        let aligner = PageAligner::new(&pages, &recognizer, &NoRows, &config);

        match aligner.process_page(0) {
            Err(AlignError::Recognition { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected recognition failure, got {:?}", other),
        }
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_pages_are_emitted_in_order() {
        let config = AlignConfig::default();
        let pages = BlankPages { size: 120 };
        let recognizer = recognizer(10_000);
        let aligner = PageAligner::new(&pages, &recognizer, &NoRows, &config);

        let mut seen = Vec::new();
        aligner.align_document(5, |page, result| {
            match &result {
                Ok(alignment) => {
                    assert_eq!(alignment.page, page);
                    assert_eq!(alignment.placements[0].text, format!("page {}", page));
                }
                Err(e) => assert!(matches!(e, AlignError::Rasterization { page: 2, .. })),
            }
            seen.push(page);
        });
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
