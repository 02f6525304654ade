use crate::projection::{ProjectionMatrix, HOMOGENEOUS_EPS};

/// Minimum number of linear equations (two per observation) needed to triangulate.
pub const MIN_DLT_ROWS: usize = 4;

/// Triangulate a 3D point from N views with the direct linear transform.
///
/// Each observation `(x, y)` seen through `P` contributes the rows `x * P2 - P0`
/// and `y * P2 - P1`. The solution is the right singular vector associated to the
/// smallest singular value, dehomogenized by its last coordinate.
///
/// Returns `None` when fewer than two observations are given (the point is
/// undetermined) or when the solution lies at infinity.
///
/// # Arguments
///
/// * `views` - Projection matrix and pixel observation for every view.
pub fn triangulate_dlt(views: &[(&ProjectionMatrix, [f64; 2])]) -> Option<[f64; 3]> {
    let num_rows = 2 * views.len();
    if num_rows < MIN_DLT_ROWS {
        return None;
    }

    let mut rows = Vec::with_capacity(num_rows);
    for (p, obs) in views {
        rows.push(dlt_row(obs[0], p.row(2), p.row(0)));
        rows.push(dlt_row(obs[1], p.row(2), p.row(1)));
    }

    let a = faer::Mat::<f64>::from_fn(num_rows, 4, |i, j| rows[i][j]);

    // singular values are sorted in nonincreasing order, the null space is the last column
    let svd = a.svd();
    let v = svd.v();
    let w = v.read(3, 3);
    if !w.is_finite() || w.abs() < HOMOGENEOUS_EPS {
        return None;
    }

    Some([v.read(0, 3) / w, v.read(1, 3) / w, v.read(2, 3) / w])
}

fn dlt_row(x: f64, p3: &[f64; 4], p1: &[f64; 4]) -> [f64; 4] {
    let mut row = [0.0; 4];
    for (j, val) in row.iter_mut().enumerate() {
        *val = x * p3[j] - p1[j];
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimplePinhole;
    use crate::pose::CamFromWorld;
    use approx::assert_relative_eq;

    fn stereo_pair() -> (ProjectionMatrix, ProjectionMatrix) {
        let k = SimplePinhole::from_image_size(1024, 768).matrix();
        let left = CamFromWorld::from_quaternion(&[1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0]).unwrap();
        let right =
            CamFromWorld::from_quaternion(&[0.98, 0.0, -0.17, 0.0], [-1.5, 0.1, 0.2]).unwrap();
        (
            ProjectionMatrix::from_cam_from_world(&k, &left),
            ProjectionMatrix::from_cam_from_world(&k, &right),
        )
    }

    #[test]
    fn test_two_view_noiseless() {
        let (p1, p2) = stereo_pair();
        for point in [[0.3, -0.2, 6.0], [-1.0, 0.5, 4.0], [0.0, 0.0, 10.0]] {
            let x1 = p1.project(&point).unwrap();
            let x2 = p2.project(&point).unwrap();
            let est = triangulate_dlt(&[(&p1, x1), (&p2, x2)]).unwrap();
            for i in 0..3 {
                assert_relative_eq!(est[i], point[i], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_three_views() {
        let (p1, p2) = stereo_pair();
        let k = SimplePinhole::from_image_size(1024, 768).matrix();
        let third =
            CamFromWorld::from_quaternion(&[0.97, 0.1, 0.2, 0.0], [1.0, -0.5, 0.5]).unwrap();
        let p3 = ProjectionMatrix::from_cam_from_world(&k, &third);
        let point = [0.4, 0.1, 7.5];
        let views = [
            (&p1, p1.project(&point).unwrap()),
            (&p2, p2.project(&point).unwrap()),
            (&p3, p3.project(&point).unwrap()),
        ];
        let est = triangulate_dlt(&views).unwrap();
        for i in 0..3 {
            assert_relative_eq!(est[i], point[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_single_view_undetermined() {
        let (p1, _) = stereo_pair();
        assert!(triangulate_dlt(&[(&p1, [512.0, 384.0])]).is_none());
        assert!(triangulate_dlt(&[]).is_none());
    }
}
