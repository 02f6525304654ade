//! Reprojection scoring of point-sets against recovered cameras.
//!
//! A point-set with no scorable observation gets `f64::INFINITY` as its error,
//! and so does an image no point-set projects into. Callers must treat the
//! sentinel as "unknown/bad", never as zero.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::projection::ProjectionMatrix;
use crate::triangulation::triangulate_dlt;

/// Triangulation and reprojection result for one point-set.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSetResidual {
    /// Triangulated point, `None` if undetermined.
    pub point: Option<[f64; 3]>,
    /// Mean reprojection error in pixels, `f64::INFINITY` if nothing could be scored.
    pub error: f64,
    /// Per-observation pixel error keyed by image index.
    pub observation_errors: BTreeMap<usize, f64>,
}

impl PointSetResidual {
    fn undetermined() -> Self {
        Self {
            point: None,
            error: f64::INFINITY,
            observation_errors: BTreeMap::new(),
        }
    }
}

/// Reprojection errors of a whole calibration run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprojectionReport<K: Ord> {
    /// Result for every point-set, keyed like the input observations.
    pub point_sets: BTreeMap<K, PointSetResidual>,
    /// Mean error for every image that has a projection matrix.
    pub per_image: BTreeMap<usize, f64>,
}

impl<K: Ord> ReprojectionReport<K> {
    /// Mean of the finite per point-set errors, `None` if there is none.
    pub fn mean_point_set_error(&self) -> Option<f64> {
        finite_mean(self.point_sets.values().map(|r| r.error))
    }

    /// Mean of the finite per image errors, `None` if there is none.
    pub fn mean_image_error(&self) -> Option<f64> {
        finite_mean(self.per_image.values().copied())
    }
}

fn finite_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Triangulate one point-set and score its observations.
///
/// Observations in images without a projection matrix are ignored.
pub fn score_point_set(
    projections: &BTreeMap<usize, ProjectionMatrix>,
    observations: &BTreeMap<usize, [f64; 2]>,
) -> PointSetResidual {
    let views = observations
        .iter()
        .filter_map(|(idx, obs)| projections.get(idx).map(|p| (p, *obs)))
        .collect::<Vec<_>>();

    let Some(point) = triangulate_dlt(&views) else {
        return PointSetResidual::undetermined();
    };

    let observation_errors = observations
        .iter()
        .filter_map(|(&idx, obs)| {
            let uv = projections.get(&idx)?.project(&point)?;
            Some((idx, (uv[0] - obs[0]).hypot(uv[1] - obs[1])))
        })
        .collect::<BTreeMap<_, _>>();

    let error = if observation_errors.is_empty() {
        f64::INFINITY
    } else {
        observation_errors.values().sum::<f64>() / observation_errors.len() as f64
    };

    PointSetResidual {
        point: Some(point),
        error,
        observation_errors,
    }
}

/// Score every point-set and aggregate the errors per image.
///
/// # Arguments
///
/// * `projections` - Projection matrix of every registered image, keyed by image index.
/// * `observations` - Pixel observations of every point-set, keyed by image index.
pub fn reprojection_report<K>(
    projections: &BTreeMap<usize, ProjectionMatrix>,
    observations: &BTreeMap<K, BTreeMap<usize, [f64; 2]>>,
) -> ReprojectionReport<K>
where
    K: Ord + Clone + Send + Sync,
{
    let point_sets = observations
        .par_iter()
        .map(|(key, obs)| (key.clone(), score_point_set(projections, obs)))
        .collect::<BTreeMap<_, _>>();

    let mut totals = projections
        .keys()
        .map(|&idx| (idx, (0.0, 0usize)))
        .collect::<BTreeMap<_, _>>();

    for residual in point_sets.values() {
        for (idx, err) in residual.observation_errors.iter() {
            if let Some((sum, count)) = totals.get_mut(idx) {
                *sum += err;
                *count += 1;
            }
        }
    }

    let per_image = totals
        .into_iter()
        .map(|(idx, (sum, count))| {
            let err = if count > 0 {
                sum / count as f64
            } else {
                f64::INFINITY
            };
            (idx, err)
        })
        .collect();

    ReprojectionReport {
        point_sets,
        per_image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimplePinhole;
    use crate::pose::CamFromWorld;
    use approx::assert_abs_diff_eq;

    fn projections() -> BTreeMap<usize, ProjectionMatrix> {
        let k = SimplePinhole::from_image_size(800, 600).matrix();
        let poses = [
            CamFromWorld::from_quaternion(&[1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0]).unwrap(),
            CamFromWorld::from_quaternion(&[0.99, 0.0, -0.12, 0.0], [-1.0, 0.0, 0.1]).unwrap(),
            CamFromWorld::from_quaternion(&[0.99, 0.05, 0.1, 0.0], [0.8, 0.3, 0.0]).unwrap(),
        ];
        poses
            .iter()
            .enumerate()
            .map(|(i, pose)| (i, ProjectionMatrix::from_cam_from_world(&k, pose)))
            .collect()
    }

    fn observe(
        projections: &BTreeMap<usize, ProjectionMatrix>,
        point: &[f64; 3],
        images: &[usize],
    ) -> BTreeMap<usize, [f64; 2]> {
        images
            .iter()
            .map(|&i| (i, projections[&i].project(point).unwrap()))
            .collect()
    }

    #[test]
    fn test_exact_observations_have_zero_error() {
        let projections = projections();
        let mut observations = BTreeMap::new();
        observations.insert(0u32, observe(&projections, &[0.1, 0.2, 5.0], &[0, 1, 2]));
        observations.insert(1u32, observe(&projections, &[-0.5, 0.0, 8.0], &[0, 2]));

        let report = reprojection_report(&projections, &observations);
        for residual in report.point_sets.values() {
            assert!(residual.point.is_some());
            assert_abs_diff_eq!(residual.error, 0.0, epsilon = 1e-6);
        }
        for err in report.per_image.values() {
            assert_abs_diff_eq!(*err, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_undetermined_point_set_is_infinite() {
        let projections = projections();
        let mut observations = BTreeMap::new();
        observations.insert(3u32, observe(&projections, &[0.0, 0.0, 5.0], &[1]));

        let report = reprojection_report(&projections, &observations);
        let residual = &report.point_sets[&3];
        assert!(residual.point.is_none());
        assert_eq!(residual.error, f64::INFINITY);

        // no other point-set scores any image, so every image is unknown
        assert_eq!(report.per_image.len(), 3);
        assert!(report.per_image.values().all(|e| *e == f64::INFINITY));
        assert!(report.mean_point_set_error().is_none());
    }

    #[test]
    fn test_unregistered_images_are_ignored() {
        let projections = projections();
        let mut obs = observe(&projections, &[0.3, -0.1, 6.0], &[0, 1]);
        // image 7 has no projection matrix
        obs.insert(7, [1e6, -1e6]);
        let mut observations = BTreeMap::new();
        observations.insert("a", obs);

        let report = reprojection_report(&projections, &observations);
        let residual = &report.point_sets["a"];
        assert_abs_diff_eq!(residual.error, 0.0, epsilon = 1e-6);
        assert!(!residual.observation_errors.contains_key(&7));
        assert!(!report.per_image.contains_key(&7));
        assert_eq!(report.per_image[&2], f64::INFINITY);
    }

    #[test]
    fn test_per_image_average() {
        let projections = projections();
        let point = [0.2, 0.1, 6.0];
        let mut obs = observe(&projections, &point, &[0, 1, 2]);
        obs.get_mut(&0).unwrap()[0] += 2.0;

        let mut observations = BTreeMap::new();
        observations.insert(0u32, obs);
        observations.insert(1u32, observe(&projections, &[-0.2, 0.4, 9.0], &[0, 1]));

        let report = reprojection_report(&projections, &observations);
        let r0 = &report.point_sets[&0];
        let r1 = &report.point_sets[&1];
        let expected_image0 = (r0.observation_errors[&0] + r1.observation_errors[&0]) / 2.0;
        assert_abs_diff_eq!(report.per_image[&0], expected_image0, epsilon = 1e-12);
        assert_abs_diff_eq!(report.per_image[&2], r0.observation_errors[&2], epsilon = 1e-12);
        assert!(r0.error > 0.0);
    }
}
