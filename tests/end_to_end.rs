use image::{DynamicImage, GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use nalgebra::Point2;

use page_align::transform::{rotation_about, transform_point};
use page_align::{
    AlignConfig, AlignError, DetectedRow, PageAligner, Quad, Rasterizer, RecognizedLine,
    SkewSource, TextGeometryDetector, TextRecognizer,
};

const WIDTH: u32 = 480;
const HEIGHT: u32 = 480;
const LINES: usize = 12;

/// Unrotated text-line boxes in pixel coordinates (x0, top, x1, bottom)
fn line_boxes() -> Vec<(f64, f64, f64, f64)> {
    (0..LINES)
        .map(|k| {
            let top = 60.0 + 30.0 * k as f64;
            (50.0, top, 400.0, top + 8.0)
        })
        .collect()
}

/// Rotate a top-left-origin pixel point about the page center by
/// `angle_degrees` counter-clockwise and normalize it
fn rotated_normalized(x: f64, y: f64, angle_degrees: f64) -> Point2<f64> {
    let (w, h) = (WIDTH as f64, HEIGHT as f64);
    let matrix = rotation_about(Point2::new(w / 2.0, h / 2.0), angle_degrees.to_radians());
    let r = transform_point(&matrix, Point2::new(x, h - y));
    Point2::new(r.x / w, r.y / h)
}

/// Word blocks along each line, rotated counter-clockwise by `angle_degrees`
fn render_page(angle_degrees: f64) -> DynamicImage {
    let mut gray = GrayImage::from_pixel(WIDTH, HEIGHT, Luma([255]));
    for (x0, top, _, _) in line_boxes() {
        for word in 0..9 {
            let x = x0 as i32 + word * 40;
            draw_filled_rect_mut(
                &mut gray,
                imageproc::rect::Rect::at(x, top as i32).of_size(30, 8),
                Luma([0]),
            );
        }
    }
    let rotated = rotate_about_center(
        &gray,
        -(angle_degrees as f32).to_radians(),
        Interpolation::Bilinear,
        Luma([255]),
    );
    DynamicImage::ImageLuma8(rotated)
}

/// True line quads after rotation
fn line_quads(angle_degrees: f64) -> Vec<Quad> {
    line_boxes()
        .into_iter()
        .map(|(x0, top, x1, bottom)| {
            Quad::new([
                rotated_normalized(x0, bottom, angle_degrees),
                rotated_normalized(x1, bottom, angle_degrees),
                rotated_normalized(x1, top, angle_degrees),
                rotated_normalized(x0, top, angle_degrees),
            ])
        })
        .collect()
}

/// Synthetic document: one rotated page per angle, with a recognizer that
/// reports axis-aligned quads and a detector that reports the true rows
struct SyntheticDocument {
    angles: Vec<f64>,
    with_rows: bool,
}

impl Rasterizer for SyntheticDocument {
    fn render(&self, page: usize) -> page_align::Result<DynamicImage> {
        let angle = self.angles.get(page).ok_or(AlignError::Rasterization {
            page,
            message: "no such page".to_string(),
        })?;
        Ok(render_page(*angle))
    }
}

impl TextRecognizer for SyntheticDocument {
    fn recognize(&self, page: usize, _image: &DynamicImage) -> page_align::Result<Vec<RecognizedLine>> {
        let angle = self.angles[page];
        Ok(line_boxes()
            .into_iter()
            .zip(line_quads(angle))
            .enumerate()
            .map(|(k, ((x0, top, _, bottom), quad))| {
                let mid = (top + bottom) / 2.0;
                RecognizedLine {
                    text: format!("line {}", k),
                    quad: Quad::from_rect(&quad.bounds()),
                    char_centers: (0..9)
                        .map(|word| rotated_normalized(x0 + 15.0 + 40.0 * word as f64, mid, angle))
                        .collect(),
                }
            })
            .collect())
    }
}

impl TextGeometryDetector for SyntheticDocument {
    fn detect(&self, page: usize, _image: &DynamicImage) -> Vec<DetectedRow> {
        if !self.with_rows {
            return Vec::new();
        }
        line_quads(self.angles[page])
            .into_iter()
            .map(|quad| DetectedRow {
                quad,
                confidence: 0.9,
                angle: None,
            })
            .collect()
    }
}

fn baseline_degrees(quad: &Quad) -> f64 {
    quad.baseline_angle(page_align::ImageSize::new(WIDTH, HEIGHT))
        .to_degrees()
}

#[test]
fn test_rotated_page_end_to_end() {
    let document = SyntheticDocument {
        angles: vec![-4.0],
        with_rows: true,
    };
    let config = AlignConfig::default();
    let aligner = PageAligner::new(&document, &document, &document, &config);

    let alignment = aligner.process_page(0).unwrap();

    assert_eq!(alignment.skew.source, SkewSource::Projection);
    let skew = alignment.skew.estimate.degrees().unwrap();
    assert!((skew + 4.0).abs() <= 0.2, "estimated skew {}", skew);

    assert_eq!(alignment.placements.len(), LINES);
    assert!(
        alignment.matched as f64 >= 0.9 * LINES as f64,
        "matched {} of {}",
        alignment.matched,
        LINES
    );

    for (k, placement) in alignment.placements.iter().enumerate() {
        assert_eq!(placement.text, format!("line {}", k));
        let angle = baseline_degrees(&placement.quad);
        assert!((angle + 4.0).abs() < 1e-6, "line {} placed at {}°", k, angle);
    }
}

#[test]
fn test_unmatched_lines_follow_local_model() {
    let document = SyntheticDocument {
        angles: vec![-4.0],
        with_rows: false,
    };
    let config = AlignConfig::default();
    let aligner = PageAligner::new(&document, &document, &document, &config);

    let alignment = aligner.process_page(0).unwrap();
    assert_eq!(alignment.matched, 0);
    assert_eq!(alignment.fallback, LINES);

    for placement in &alignment.placements {
        let angle = baseline_degrees(&placement.quad);
        assert!((angle + 4.0).abs() < 1e-6, "placed at {}°", angle);
    }
}

#[test]
fn test_document_pages_keep_order() {
    let document = SyntheticDocument {
        angles: vec![-4.0, 2.5],
        with_rows: true,
    };
    let config = AlignConfig::default();
    let aligner = PageAligner::new(&document, &document, &document, &config);

    let results = aligner.align_pages(3);
    assert_eq!(results.len(), 3);

    let first = results[0].as_ref().unwrap();
    let second = results[1].as_ref().unwrap();
    assert_eq!((first.page, second.page), (0, 1));
    assert!((first.skew.estimate.degrees_or_zero() + 4.0).abs() <= 0.2);
    assert!((second.skew.estimate.degrees_or_zero() - 2.5).abs() <= 0.2);
    assert!(matches!(
        results[2],
        Err(AlignError::Rasterization { page: 2, .. })
    ));
}
