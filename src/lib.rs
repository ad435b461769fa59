pub mod assignment;
pub mod bands;
pub mod binarize;
pub mod cli;
pub mod config;
pub mod debug;
pub mod error;
pub mod geometry;
pub mod line_angle;
pub mod local_model;
pub mod pipeline;
pub mod projection;
pub mod reconcile;
pub mod sidecar;
pub mod skew;
pub mod transform;

pub use assignment::min_cost_assignment;
pub use cli::Cli;
pub use config::AlignConfig;
pub use debug::{DebugSink, PngDebugSink};
pub use error::{AlignError, Result};
pub use geometry::{ImageSize, Quad, Rect};
pub use local_model::{AngleSample, LocalAngleModel};
pub use pipeline::{PageAligner, PageAlignment, Rasterizer, TextGeometryDetector, TextRecognizer};
pub use projection::Deadline;
pub use reconcile::{DetectedRow, GeometryBlock, Placement, RecognizedLine, TextCandidate};
pub use sidecar::ImageFiles;
pub use skew::{estimate_skew, AngleEstimate, SkewReport, SkewSource};
pub use transform::PageMapping;
