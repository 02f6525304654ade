use std::collections::BTreeMap;
use std::path::PathBuf;

use automodeler_geometry::{camera::intrinsics_matrix, DMat3};

use crate::error::ColmapError;

/// Represents a COLMAP camera model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraModelId {
    /// f, cx, cy
    SimplePinhole = 0,
    /// fx, fy, cx, cy
    Pinhole = 1,
    /// f, cx, cy, k
    SimpleRadial = 2,
    /// f, cx, cy, k1, k2
    Radial = 3,
    /// fx, fy, cx, cy, k1, k2, p1, p2
    OpenCV = 4,
    /// OpenCV fisheye camera model
    OpenCVFisheye = 5,
    /// Full OpenCV camera model
    FullOpenCV = 6,
    /// Field of view camera model
    Fov = 7,
    /// Simple radial fisheye camera model
    SimpleRadialFisheye = 8,
    /// Radial fisheye camera model
    RadialFisheye = 9,
    /// Thin prism fisheye camera model
    ThinPrismFisheye = 10,
}

const MODELS: [(CameraModelId, &str); 11] = [
    (CameraModelId::SimplePinhole, "SIMPLE_PINHOLE"),
    (CameraModelId::Pinhole, "PINHOLE"),
    (CameraModelId::SimpleRadial, "SIMPLE_RADIAL"),
    (CameraModelId::Radial, "RADIAL"),
    (CameraModelId::OpenCV, "OPENCV"),
    (CameraModelId::OpenCVFisheye, "OPENCV_FISHEYE"),
    (CameraModelId::FullOpenCV, "FULL_OPENCV"),
    (CameraModelId::Fov, "FOV"),
    (CameraModelId::SimpleRadialFisheye, "SIMPLE_RADIAL_FISHEYE"),
    (CameraModelId::RadialFisheye, "RADIAL_FISHEYE"),
    (CameraModelId::ThinPrismFisheye, "THIN_PRISM_FISHEYE"),
];

impl CameraModelId {
    /// Parse a model given by name (`SIMPLE_PINHOLE`) or numeric id (`0`).
    pub fn parse(token: &str) -> Result<Self, ColmapError> {
        MODELS
            .iter()
            .find(|(id, name)| *name == token || token.parse::<i64>() == Ok(*id as i64))
            .map(|(id, _)| *id)
            .ok_or_else(|| ColmapError::ParseError(format!("Invalid camera model id: {token}")))
    }

    /// Name of the model as written by COLMAP.
    pub fn name(&self) -> &'static str {
        MODELS[*self as usize].1
    }

    /// Number of parameters of the models whose intrinsics can be recovered.
    pub fn num_params(&self) -> Option<usize> {
        match self {
            CameraModelId::SimplePinhole => Some(3),
            CameraModelId::Pinhole => Some(4),
            CameraModelId::SimpleRadial => Some(4),
            CameraModelId::Radial => Some(5),
            CameraModelId::OpenCV => Some(8),
            _ => None,
        }
    }

    /// Focal lengths and principal point `(fx, fy, cx, cy)`.
    ///
    /// Distortion terms are ignored. Returns `Ok(None)` for models not supported.
    pub fn focal_and_center(&self, params: &[f64]) -> Result<Option<[f64; 4]>, ColmapError> {
        let Some(expected) = self.num_params() else {
            return Ok(None);
        };
        if params.len() != expected {
            return Err(ColmapError::InvalidNumCameraParams {
                model: self.name(),
                expected,
                actual: params.len(),
            });
        }
        let intrinsics = match self {
            CameraModelId::Pinhole | CameraModelId::OpenCV => {
                [params[0], params[1], params[2], params[3]]
            }
            _ => [params[0], params[0], params[1], params[2]],
        };
        Ok(Some(intrinsics))
    }
}

/// Represents a camera in the COLMAP system.
#[derive(Debug, Clone, PartialEq)]
pub struct ColmapCamera {
    /// Camera id
    pub camera_id: u32,
    /// Camera model id
    pub model_id: CameraModelId,
    /// Image width
    pub width: u32,
    /// Image height
    pub height: u32,
    /// Camera parameters
    pub params: Vec<f64>,
}

impl ColmapCamera {
    /// Intrinsics matrix, `Ok(None)` if the camera model is not supported.
    pub fn intrinsics(&self) -> Result<Option<DMat3>, ColmapError> {
        Ok(self
            .model_id
            .focal_and_center(&self.params)?
            .map(|[fx, fy, cx, cy]| intrinsics_matrix(fx, fy, cx, cy)))
    }
}

/// Represents an image in the COLMAP system.
#[derive(Debug, Clone, PartialEq)]
pub struct ColmapImage {
    /// Image name
    pub name: String,
    /// Image id
    pub image_id: u32,
    /// Camera id
    pub camera_id: u32,
    /// Rotation of the camera from world transform
    pub rotation: [f64; 4], // qw, qx, qy, qz
    /// Translation of the camera from world transform
    pub translation: [f64; 3], // x, y, z
    /// Points2d
    pub points2d: Vec<(f64, f64, i64)>,
}

/// Represents a 3D point in the COLMAP system.
#[derive(Debug, Clone, PartialEq)]
pub struct ColmapPoint3d {
    /// Point3d id
    pub point3d_id: u64,
    /// x, y, z coordinates
    pub xyz: [f64; 3],
    /// rgb color
    pub rgb: [u8; 3],
    /// Error
    pub error: f64,
    /// Track
    pub track: Vec<(u32, u32)>,
}

/// One reconstructed model, as found in a `sparse/<n>` directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseModel {
    /// Directory the model was read from.
    pub path: PathBuf,
    /// Cameras keyed by camera id.
    pub cameras: BTreeMap<u32, ColmapCamera>,
    /// Registered images.
    pub images: Vec<ColmapImage>,
    /// Triangulated points, empty if the listing was absent.
    pub points3d: Vec<ColmapPoint3d>,
}

impl SparseModel {
    /// Number of registered images.
    pub fn num_registered(&self) -> usize {
        self.images.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model() -> Result<(), ColmapError> {
        assert_eq!(CameraModelId::parse("SIMPLE_PINHOLE")?, CameraModelId::SimplePinhole);
        assert_eq!(CameraModelId::parse("0")?, CameraModelId::SimplePinhole);
        assert_eq!(CameraModelId::parse("4")?, CameraModelId::OpenCV);
        assert_eq!(CameraModelId::parse("FOV")?.name(), "FOV");
        assert!(CameraModelId::parse("PINHOLE_SINGLE_F").is_err());
        assert!(CameraModelId::parse("11").is_err());
        Ok(())
    }

    #[test]
    fn test_focal_and_center() -> Result<(), ColmapError> {
        let simple = CameraModelId::SimpleRadial.focal_and_center(&[100.0, 32.0, 24.0, 0.1])?;
        assert_eq!(simple, Some([100.0, 100.0, 32.0, 24.0]));
        let opencv = CameraModelId::OpenCV
            .focal_and_center(&[100.0, 110.0, 32.0, 24.0, 0.0, 0.0, 0.0, 0.0])?;
        assert_eq!(opencv, Some([100.0, 110.0, 32.0, 24.0]));
        assert_eq!(CameraModelId::Fov.focal_and_center(&[1.0])?, None);
        assert!(matches!(
            CameraModelId::Pinhole.focal_and_center(&[1.0, 2.0, 3.0]),
            Err(ColmapError::InvalidNumCameraParams { expected: 4, actual: 3, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_camera_intrinsics() -> Result<(), ColmapError> {
        let camera = ColmapCamera {
            camera_id: 1,
            model_id: CameraModelId::SimplePinhole,
            width: 640,
            height: 480,
            params: vec![768.0, 320.0, 240.0],
        };
        let k = camera.intrinsics()?.unwrap();
        assert_eq!(k, intrinsics_matrix(768.0, 768.0, 320.0, 240.0));
        assert_eq!(k.row(0).to_array(), [768.0, 0.0, 320.0]);
        Ok(())
    }
}
