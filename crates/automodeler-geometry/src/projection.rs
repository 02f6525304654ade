use glam::DMat3;

use crate::pose::{CamFromWorld, WorldFromCam};
use crate::Mat34;

/// Homogeneous coordinates with a smaller magnitude are treated as points at infinity.
pub const HOMOGENEOUS_EPS: f64 = 1e-12;

/// Camera-from-world projection `P = K [R_cw | t_cw]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionMatrix(pub Mat34);

impl ProjectionMatrix {
    /// Build `P` from intrinsics and a camera-from-world pose.
    pub fn from_cam_from_world(k: &DMat3, pose: &CamFromWorld) -> Self {
        let kr = *k * pose.rotation;
        let kt = *k * pose.translation;
        let mut p = [[0.0; 4]; 3];
        for (i, row) in p.iter_mut().enumerate() {
            row[..3].copy_from_slice(&kr.row(i).to_array());
            row[3] = kt[i];
        }
        Self(p)
    }

    /// Build `P` from intrinsics and a stored world-from-camera pose.
    pub fn from_world_from_cam(k: &DMat3, pose: &WorldFromCam) -> Self {
        Self::from_cam_from_world(k, &pose.inverse())
    }

    /// Row `i` of the matrix.
    pub fn row(&self, i: usize) -> &[f64; 4] {
        &self.0[i]
    }

    /// Project a world point to pixel coordinates.
    ///
    /// Returns `None` if the point projects to infinity.
    pub fn project(&self, point: &[f64; 3]) -> Option<[f64; 2]> {
        let xh = [point[0], point[1], point[2], 1.0];
        let dot = |row: &[f64; 4]| row.iter().zip(xh.iter()).map(|(a, b)| a * b).sum::<f64>();
        let (u, v, w) = (dot(&self.0[0]), dot(&self.0[1]), dot(&self.0[2]));
        if w.abs() < HOMOGENEOUS_EPS {
            return None;
        }
        Some([u / w, v / w])
    }
}
