use glam::DMat3;

use crate::linalg::mat3_from_rows;

/// Ratio between the focal length and the longest image side used to seed
/// every camera before reconstruction.
pub const FOCAL_LENGTH_RATIO: f64 = 1.2;

/// Pinhole camera with a single focal length and a principal point.
///
/// Parameters are stored in the `[f, cx, cy]` order expected by the
/// reconstruction engine for its `SIMPLE_PINHOLE` model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplePinhole {
    /// Focal length in pixels.
    pub focal: f64,
    /// Principal point x in pixels.
    pub cx: f64,
    /// Principal point y in pixels.
    pub cy: f64,
}

impl SimplePinhole {
    /// Initial guess for an image of the given size:
    /// `f = 1.2 * max(width, height)`, principal point at the image center.
    pub fn from_image_size(width: u32, height: u32) -> Self {
        Self {
            focal: FOCAL_LENGTH_RATIO * width.max(height) as f64,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }

    /// Parameters as `[f, cx, cy]`.
    pub fn params(&self) -> [f64; 3] {
        [self.focal, self.cx, self.cy]
    }

    /// Intrinsic matrix `K`.
    pub fn matrix(&self) -> DMat3 {
        intrinsics_matrix(self.focal, self.focal, self.cx, self.cy)
    }
}

/// Intrinsic matrix from separate focal lengths and a principal point.
pub fn intrinsics_matrix(fx: f64, fy: f64, cx: f64, cy: f64) -> DMat3 {
    mat3_from_rows(&[[fx, 0.0, cx], [0.0, fy, cy], [0.0, 0.0, 1.0]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn test_heuristic_landscape() {
        let cam = SimplePinhole::from_image_size(4000, 3000);
        assert_eq!(cam.params(), [4800.0, 2000.0, 1500.0]);
    }

    #[test]
    fn test_heuristic_portrait() {
        let cam = SimplePinhole::from_image_size(3, 5);
        assert_eq!(cam.params(), [6.0, 1.5, 2.5]);
        let k = cam.matrix();
        assert_eq!(k.row(0), DVec3::new(6.0, 0.0, 1.5));
        assert_eq!(k.row(1), DVec3::new(0.0, 6.0, 2.5));
        assert_eq!(k.row(2), DVec3::Z);
    }
}
