//! Conversions between the engine's array layouts and `glam` types.

use glam::{DMat3, DQuat};

/// Quaternions with a smaller norm are rejected.
pub const MIN_QUATERNION_NORM: f64 = 1e-12;

/// Rotation matrix from a quaternion given as `[w, x, y, z]`.
///
/// The quaternion is normalized first. Returns `None` for a (near) zero or
/// non-finite quaternion.
pub fn rotation_from_quaternion(q: &[f64; 4]) -> Option<DMat3> {
    let quat = DQuat::from_xyzw(q[1], q[2], q[3], q[0]);
    if !quat.is_finite() || quat.length() < MIN_QUATERNION_NORM {
        return None;
    }
    Some(DMat3::from_quat(quat.normalize()))
}

/// Matrix from row-major storage.
pub fn mat3_from_rows(rows: &[[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols_array_2d(rows).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::DVec3;

    #[test]
    fn test_identity_quaternion() {
        let r = rotation_from_quaternion(&[1.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(r, DMat3::IDENTITY);
    }

    #[test]
    fn test_zero_quaternion() {
        assert!(rotation_from_quaternion(&[0.0, 0.0, 0.0, 0.0]).is_none());
        assert!(rotation_from_quaternion(&[f64::NAN, 0.0, 0.0, 1.0]).is_none());
    }

    #[test]
    fn test_quarter_turn_about_z() {
        let half = std::f64::consts::FRAC_PI_4;
        let r = rotation_from_quaternion(&[half.cos(), 0.0, 0.0, half.sin()]).unwrap();
        let v = r * DVec3::X;
        assert_relative_eq!(v.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(v.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(v.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unnormalized_quaternion_is_orthonormal() {
        let r = rotation_from_quaternion(&[2.0, 0.4, -1.2, 0.8]).unwrap();
        let rtr = r.transpose() * r;
        for (got, want) in rtr.to_cols_array().iter().zip(DMat3::IDENTITY.to_cols_array()) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rows_are_rows() {
        let m = mat3_from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        assert_eq!(m.row(0), DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(m.col(0), DVec3::new(1.0, 4.0, 7.0));
        assert_eq!(m * DVec3::Z, DVec3::new(3.0, 6.0, 9.0));
    }
}
