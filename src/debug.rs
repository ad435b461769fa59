use image::GrayImage;
use std::path::PathBuf;
use tracing::warn;

use crate::bands::Band;

/// Receives intermediate masks while a page is processed.
///
/// Both methods default to doing nothing; a sink must never influence the
/// result of the page.
pub trait DebugSink: Sync {
    fn ink_mask(&self, _page: usize, _mask: &GrayImage) {}

    fn band_mask(&self, _page: usize, _band: &Band, _mask: &GrayImage) {}
}

/// Writes masks as PNG files into a directory
#[derive(Debug, Clone)]
pub struct PngDebugSink {
    dir: PathBuf,
}

impl PngDebugSink {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn save(&self, name: String, mask: &GrayImage) {
        let path = self.dir.join(name);
        if let Err(e) = mask.save(&path) {
            warn!("Failed to write debug image {:?}: {}", path, e);
        }
    }
}

impl DebugSink for PngDebugSink {
    fn ink_mask(&self, page: usize, mask: &GrayImage) {
        self.save(format!("page{:04}_mask.png", page), mask);
    }

    fn band_mask(&self, page: usize, band: &Band, mask: &GrayImage) {
        self.save(format!("page{:04}_band{:02}.png", page, band.index), mask);
    }
}
