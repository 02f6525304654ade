//! Rigid transforms with their direction encoded in the type.
//!
//! The reconstruction engine reports poses as camera-from-world (`R_cw`, `t_cw`);
//! the rest of the system stores world-from-camera (`R_wc`, `t_wc`). Both
//! conversions go through [`invert_rigid`] so they are exact inverses of each other.

use glam::{DMat3, DVec3};

use crate::linalg;

/// Invert a rigid transform `x' = R x + t`, returning `(R^T, -R^T t)`.
pub fn invert_rigid(rotation: &DMat3, translation: &DVec3) -> (DMat3, DVec3) {
    let r_inv = rotation.transpose();
    (r_inv, -(r_inv * *translation))
}

/// Pose mapping world coordinates into camera coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CamFromWorld {
    /// Rotation `R_cw`.
    pub rotation: DMat3,
    /// Translation `t_cw`.
    pub translation: DVec3,
}

/// Pose mapping camera coordinates into world coordinates.
///
/// The translation is the camera center expressed in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldFromCam {
    /// Rotation `R_wc`.
    pub rotation: DMat3,
    /// Translation `t_wc`.
    pub translation: DVec3,
}

impl CamFromWorld {
    /// Create a pose from its rotation and translation.
    pub fn from_parts(rotation: DMat3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Create a pose from the engine's `[w, x, y, z]` quaternion and `[tx, ty, tz]`.
    ///
    /// Returns `None` when the quaternion has zero norm.
    pub fn from_quaternion(qvec: &[f64; 4], translation: [f64; 3]) -> Option<Self> {
        linalg::rotation_from_quaternion(qvec).map(|rotation| Self {
            rotation,
            translation: DVec3::from_array(translation),
        })
    }

    /// `R_wc = R_cw^T`, `t_wc = -R_wc t_cw`.
    pub fn inverse(&self) -> WorldFromCam {
        let (rotation, translation) = invert_rigid(&self.rotation, &self.translation);
        WorldFromCam {
            rotation,
            translation,
        }
    }

    /// Map a world point into the camera frame.
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }
}

impl WorldFromCam {
    /// Create a pose from its rotation and translation.
    pub fn from_parts(rotation: DMat3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// `R_cw = R_wc^T`, `t_cw = -R_cw t_wc`.
    pub fn inverse(&self) -> CamFromWorld {
        let (rotation, translation) = invert_rigid(&self.rotation, &self.translation);
        CamFromWorld {
            rotation,
            translation,
        }
    }

    /// Camera center in world coordinates.
    pub fn center(&self) -> DVec3 {
        self.translation
    }
}

impl Default for WorldFromCam {
    fn default() -> Self {
        Self::from_parts(DMat3::IDENTITY, DVec3::ZERO)
    }
}
