use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{AlignError, Result};
use crate::pipeline::{Rasterizer, TextGeometryDetector, TextRecognizer};
use crate::reconcile::{DetectedRow, RecognizedLine};

/// Contents of an OCR sidecar file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSidecar {
    pub lines: Vec<RecognizedLine>,
    pub rows: Vec<DetectedRow>,
}

/// Sidecar path for a page image: `scan.png` → `scan.ocr.json`
pub fn sidecar_path(page: &Path) -> PathBuf {
    let stem = page.file_stem().unwrap_or_default().to_string_lossy();
    let parent = page.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}.ocr.json", stem))
}

/// Page images on disk, one file per page
#[derive(Debug, Clone)]
pub struct ImageFiles {
    pages: Vec<PathBuf>,
}

impl ImageFiles {
    pub fn new(pages: Vec<PathBuf>) -> Self {
        Self { pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn path(&self, page: usize) -> Option<&Path> {
        self.pages.get(page).map(PathBuf::as_path)
    }

    fn load_sidecar(&self, page: usize) -> Result<OcrSidecar> {
        let Some(path) = self.path(page).map(sidecar_path) else {
            return Ok(OcrSidecar::default());
        };
        if !path.exists() {
            debug!(page, "no OCR sidecar at {:?}", path);
            return Ok(OcrSidecar::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| AlignError::Recognition {
            page,
            attempts: 1,
            message: format!("{}: {}", path.display(), e),
        })
    }
}

impl Rasterizer for ImageFiles {
    fn render(&self, page: usize) -> Result<DynamicImage> {
        let path = self.path(page).ok_or_else(|| AlignError::Rasterization {
            page,
            message: "page index out of range".to_string(),
        })?;
        let rasterization = |e: &dyn std::fmt::Display| AlignError::Rasterization {
            page,
            message: format!("{}: {}", path.display(), e),
        };
        ImageReader::open(path)
            .map_err(|e| rasterization(&e))?
            .decode()
            .map_err(|e| rasterization(&e))
    }
}

impl TextRecognizer for ImageFiles {
    fn recognize(&self, page: usize, _image: &DynamicImage) -> Result<Vec<RecognizedLine>> {
        Ok(self.load_sidecar(page)?.lines)
    }
}

impl TextGeometryDetector for ImageFiles {
    fn detect(&self, page: usize, _image: &DynamicImage) -> Vec<DetectedRow> {
        // a broken sidecar surfaces through recognition
        self.load_sidecar(page).map(|s| s.rows).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/scans/p001.png")),
            PathBuf::from("/scans/p001.ocr.json")
        );
    }

    #[test]
    fn test_reads_image_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("p1.png");
        GrayImage::from_pixel(16, 8, Luma([255])).save(&page).unwrap();
        std::fs::write(
            sidecar_path(&page),
            r#"{
                "lines": [{"text": "hello", "quad": [[0.1,0.5],[0.4,0.5],[0.4,0.6],[0.1,0.6]],
                           "char_centers": [[0.15,0.55],[0.3,0.55]]}],
                "rows": [{"quad": [[0.1,0.5],[0.4,0.5],[0.4,0.6],[0.1,0.6]], "confidence": 0.8}]
            }"#,
        )
        .unwrap();

        let files = ImageFiles::new(vec![page]);
        let image = files.render(0).unwrap();
        assert_eq!((image.width(), image.height()), (16, 8));

        let lines = files.recognize(0, &image).unwrap();
        assert_eq!(lines[0].text, "hello");
        assert_eq!(lines[0].char_centers.len(), 2);

        let rows = files.detect(0, &image);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].angle, None);
    }

    #[test]
    fn test_missing_sidecar_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("blank.png");
        GrayImage::new(4, 4).save(&page).unwrap();

        let files = ImageFiles::new(vec![page]);
        let image = files.render(0).unwrap();
        assert!(files.recognize(0, &image).unwrap().is_empty());
        assert!(files.detect(0, &image).is_empty());
    }

    #[test]
    fn test_missing_page_is_rasterization_error() {
        let files = ImageFiles::new(vec![PathBuf::from("/nonexistent/page.png")]);
        assert!(matches!(
            files.render(0),
            Err(AlignError::Rasterization { page: 0, .. })
        ));
        assert!(matches!(
            files.render(5),
            Err(AlignError::Rasterization { page: 5, .. })
        ));
    }

    #[test]
    fn test_malformed_sidecar_fails_recognition() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("bad.png");
        GrayImage::new(4, 4).save(&page).unwrap();
        std::fs::write(sidecar_path(&page), "{ not json").unwrap();

        let files = ImageFiles::new(vec![page]);
        let image = files.render(0).unwrap();
        assert!(matches!(
            files.recognize(0, &image),
            Err(AlignError::Recognition { .. })
        ));
        assert!(files.detect(0, &image).is_empty());
    }
}
