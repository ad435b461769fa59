use nalgebra::{Matrix3, Point2, Vector3};
use tracing::warn;

use crate::geometry::{ImageSize, Quad};

/// Transform a point using the affine matrix
pub fn transform_point(matrix: &Matrix3<f64>, p: Point2<f64>) -> Point2<f64> {
    let v = matrix * Vector3::new(p.x, p.y, 1.0);
    Point2::new(v.x / v.z, v.y / v.z)
}

/// Counter-clockwise rotation by `angle` radians about `center`, in a y-up
/// frame
pub fn rotation_about(center: Point2<f64>, angle: f64) -> Matrix3<f64> {
    let (sin, cos) = angle.sin_cos();
    let (cx, cy) = (center.x, center.y);

    // Translate to origin, rotate, translate back
    let translate_to_origin = Matrix3::new(
        1.0, 0.0, -cx,
        0.0, 1.0, -cy,
        0.0, 0.0, 1.0,
    );
    let rotate = Matrix3::new(
        cos, -sin, 0.0,
        sin, cos, 0.0,
        0.0, 0.0, 1.0,
    );
    let translate_back = Matrix3::new(
        1.0, 0.0, cx,
        0.0, 1.0, cy,
        0.0, 0.0, 1.0,
    );

    translate_back * rotate * translate_to_origin
}

/// Mapping between the spaces of one rendered page.
///
/// Normalized coordinates run 0..1 from the bottom-left corner, pixels from
/// the top-left with y down, and page units from the bottom-left in document
/// units, related to pixels by `page_to_image`.
#[derive(Debug, Clone)]
pub struct PageMapping {
    pub size: ImageSize,
    pub page_to_image: Matrix3<f64>,
    image_to_page: Matrix3<f64>,
}

impl PageMapping {
    pub fn new(size: ImageSize, page_to_image: Matrix3<f64>) -> Self {
        let image_to_page = page_to_image.try_inverse().unwrap_or_else(|| {
            warn!("page-to-image transform is singular, using identity");
            Matrix3::identity()
        });
        Self {
            size,
            page_to_image,
            image_to_page,
        }
    }

    /// Page rendered at `scale` pixels per page unit, y flipped
    pub fn from_render_scale(size: ImageSize, scale: f64) -> Self {
        let page_to_image = Matrix3::new(
            scale, 0.0, 0.0,
            0.0, -scale, size.height as f64,
            0.0, 0.0, 1.0,
        );
        Self::new(size, page_to_image)
    }

    pub fn normalized_to_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(
            p.x * self.size.width as f64,
            (1.0 - p.y) * self.size.height as f64,
        )
    }

    pub fn pixel_to_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        let (w, h) = (self.size.width as f64, self.size.height as f64);
        if w <= 0.0 || h <= 0.0 {
            return Point2::origin();
        }
        Point2::new(p.x / w, 1.0 - p.y / h)
    }

    pub fn pixel_to_page(&self, p: Point2<f64>) -> Point2<f64> {
        transform_point(&self.image_to_page, p)
    }

    pub fn page_to_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        transform_point(&self.page_to_image, p)
    }

    pub fn clamp_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(
            p.x.clamp(0.0, self.size.width as f64),
            p.y.clamp(0.0, self.size.height as f64),
        )
    }

    /// Normalized quad → page space, clamped to the image first
    pub fn quad_to_page(&self, quad: &Quad) -> Quad {
        quad.map(|p| self.pixel_to_page(self.clamp_pixel(self.normalized_to_pixel(p))))
    }

    /// Page-space quad → normalized, clamped to the image
    pub fn quad_from_page(&self, quad: &Quad) -> Quad {
        quad.map(|p| self.pixel_to_normalized(self.clamp_pixel(self.page_to_pixel(p))))
    }
}

/// Rotate a normalized quad about its centroid by `delta` radians
/// (counter-clockwise), working in pixel units so the page aspect ratio is
/// respected. The result is clamped into the image and re-normalized.
pub fn rotate_quad(quad: &Quad, delta: f64, size: ImageSize) -> Quad {
    let (w, h) = (size.width as f64, size.height as f64);
    if w <= 0.0 || h <= 0.0 {
        return *quad;
    }
    let pixels = quad.map(|p| size.scale(p));
    let matrix = rotation_about(pixels.centroid(), delta);
    pixels.map(|p| {
        let r = transform_point(&matrix, p);
        Point2::new(r.x.clamp(0.0, w) / w, r.y.clamp(0.0, h) / h)
    })
}

/// Rotate a quad toward `target` only when the correction is at least
/// `min_delta` radians; otherwise it is only clamped into the unit square
pub fn align_quad(quad: &Quad, current: f64, target: f64, min_delta: f64, size: ImageSize) -> Quad {
    let delta = target - current;
    if delta.abs() >= min_delta {
        rotate_quad(quad, delta, size)
    } else {
        quad.map(|p| Point2::new(p.x.clamp(0.0, 1.0), p.y.clamp(0.0, 1.0)))
    }
}

/// Map a pixel point of the original image into an image that was deskewed
/// by rotating its content by `-angle_degrees` about the center
pub fn deskew_point(p: Point2<f64>, angle_degrees: f64, size: ImageSize) -> Point2<f64> {
    rotate_pixel_about_center(p, -angle_degrees.to_radians(), size)
}

/// Inverse of [`deskew_point`]: map a point found in the deskewed working
/// image back to original image space, clamped into the image
pub fn restore_point(p: Point2<f64>, angle_degrees: f64, size: ImageSize) -> Point2<f64> {
    let restored = rotate_pixel_about_center(p, angle_degrees.to_radians(), size);
    Point2::new(
        restored.x.clamp(0.0, size.width as f64),
        restored.y.clamp(0.0, size.height as f64),
    )
}

fn rotate_pixel_about_center(p: Point2<f64>, angle: f64, size: ImageSize) -> Point2<f64> {
    let h = size.height as f64;
    let center = Point2::new(size.width as f64 / 2.0, h / 2.0);
    // pixel rows grow downward; rotate in the y-up frame
    let up = Point2::new(p.x, h - p.y);
    let r = transform_point(&rotation_about(center, angle), up);
    Point2::new(r.x, h - r.y)
}
