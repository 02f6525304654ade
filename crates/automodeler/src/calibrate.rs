use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use automodeler_colmap::{
    best_model, build_store, map_to_images, ReconstructionEngine, RegisteredCamera, StoreIndex,
    Workspace,
};
use automodeler_geometry::{
    projection::ProjectionMatrix,
    reprojection::{reprojection_report, ReprojectionReport},
};
use automodeler_scene::{pixel_observations, ImageEntry, Observations, PointSetId, Scene};

use crate::config::CalibrationConfig;
use crate::error::CalibrationError;

/// Minimum number of images of a calibration.
pub const MIN_IMAGES: usize = 2;

/// Minimum number of point-sets of a calibration.
pub const MIN_POINT_SETS: usize = 3;

/// Directory created under [`CalibrationConfig::workdir`] for each run.
pub const WORKDIR_NAME: &str = "colmap_work";

/// Cameras recovered by a calibration run.
#[derive(Debug, Clone)]
pub struct Calibration {
    /// Recovered cameras keyed by image index.
    pub cameras: BTreeMap<usize, RegisteredCamera>,
    /// Whether each image, in image index order, was registered.
    pub registered: Vec<bool>,
    /// Number of 3D points of the selected model.
    pub num_points3d: usize,
    /// Ids and keypoint indices used in the store.
    pub store: StoreIndex,
    /// Directory of the selected model, gone once a temporary working directory is dropped.
    pub model_path: PathBuf,
}

/// Figures of a calibration, for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSummary {
    /// Number of registered images.
    pub num_cameras: usize,
    /// Number of input images.
    pub num_images: usize,
    /// Number of 3D points the engine triangulated.
    pub num_points3d: usize,
    /// Mean of the finite per point-set errors.
    pub mean_point_set_error: Option<f64>,
    /// Mean of the finite per image errors.
    pub mean_image_error: Option<f64>,
}

impl fmt::Display for CalibrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_err = |e: Option<f64>| e.map_or("n/a".to_string(), |e| format!("{e:.3} px"));
        write!(
            f,
            "{}/{} cameras, {} engine points, mean error {} per point-set, {} per image",
            self.num_cameras,
            self.num_images,
            self.num_points3d,
            fmt_err(self.mean_point_set_error),
            fmt_err(self.mean_image_error)
        )
    }
}

impl Calibration {
    /// Projection matrix of every registered image.
    pub fn projections(&self) -> BTreeMap<usize, ProjectionMatrix> {
        self.cameras
            .iter()
            .map(|(&idx, camera)| {
                let k = &camera.intrinsics;
                (idx, ProjectionMatrix::from_world_from_cam(k, &camera.world_from_cam))
            })
            .collect()
    }

    /// Triangulate every point-set and score it against the recovered cameras.
    pub fn reprojection(
        &self,
        images: &[ImageEntry],
        observations: &Observations,
    ) -> ReprojectionReport<PointSetId> {
        reprojection_report(&self.projections(), &pixel_observations(images, observations))
    }

    /// Figures of this calibration and its reprojection report.
    pub fn summary(&self, report: &ReprojectionReport<PointSetId>) -> CalibrationSummary {
        CalibrationSummary {
            num_cameras: self.cameras.len(),
            num_images: self.registered.len(),
            num_points3d: self.num_points3d,
            mean_point_set_error: report.mean_point_set_error(),
            mean_image_error: report.mean_image_error(),
        }
    }
}

/// Store the per point-set errors of a report into the scene.
pub fn store_errors(scene: &mut Scene, report: &ReprojectionReport<PointSetId>) {
    let errors = report
        .point_sets
        .iter()
        .map(|(&id, residual)| (id, residual.error))
        .collect::<BTreeMap<_, _>>();
    scene.set_errors(&errors);
}

fn check_preconditions(
    images: &[ImageEntry],
    observations: &Observations,
) -> Result<(), CalibrationError> {
    if images.len() < MIN_IMAGES {
        return Err(CalibrationError::Precondition(format!(
            "need at least {MIN_IMAGES} images, got {}",
            images.len()
        )));
    }
    let num_point_sets = observations.values().filter(|obs| !obs.is_empty()).count();
    if num_point_sets < MIN_POINT_SETS {
        return Err(CalibrationError::Precondition(format!(
            "need at least {MIN_POINT_SETS} point-sets, got {num_point_sets}"
        )));
    }
    if let Some(image) = images.iter().find(|i| i.width == 0 || i.height == 0) {
        return Err(CalibrationError::Precondition(format!(
            "image {} has an empty size",
            image.path.display()
        )));
    }
    Ok(())
}

/// Recover the camera of every image from the point-set observations.
///
/// Builds the correspondence store in a fresh working directory, runs the
/// engine, selects the model registering the most images and maps its cameras
/// back to image indices.
///
/// # Arguments
///
/// * `images` - Images in image index order.
/// * `observations` - Normalized observations keyed by point-set id.
/// * `engine` - The reconstruction engine.
/// * `config` - Run settings.
pub fn calibrate<E: ReconstructionEngine + ?Sized>(
    images: &[ImageEntry],
    observations: &Observations,
    engine: &E,
    config: &CalibrationConfig,
) -> Result<Calibration, CalibrationError> {
    check_preconditions(images, observations)?;

    // holds the temporary directory until the run is over
    let tempdir;
    let root = match &config.workdir {
        Some(dir) => dir.join(WORKDIR_NAME),
        None => {
            tempdir = tempfile::Builder::new()
                .prefix("automodeler-")
                .keep(config.keep_workdir)
                .tempdir()?;
            tempdir.path().to_path_buf()
        }
    };

    run(&root, images, observations, engine, config)
}

fn run<E: ReconstructionEngine + ?Sized>(
    root: &Path,
    images: &[ImageEntry],
    observations: &Observations,
    engine: &E,
    config: &CalibrationConfig,
) -> Result<Calibration, CalibrationError> {
    let workspace = Workspace::prepare(root, images)?;
    let store = build_store(
        workspace.database_path(),
        images,
        observations,
        config.params_encoding,
    )?;

    log::info!("running the reconstruction in {}", root.display());
    engine.run_reconstruction(&workspace, &config.mapper)?;

    let models = engine.read_models(&workspace)?;
    let model = best_model(&models).ok_or_else(|| {
        CalibrationError::CalibrationFailed("the engine produced no model".to_string())
    })?;
    log::info!(
        "selected {} registering {} of {} images",
        model.path.display(),
        model.num_registered(),
        images.len()
    );

    let min_registered = config.min_registered_images.max(MIN_IMAGES);
    if model.num_registered() < min_registered {
        return Err(CalibrationError::CalibrationFailed(format!(
            "only {} images registered, need {min_registered}",
            model.num_registered()
        )));
    }

    let cameras = map_to_images(model, images)?;
    if cameras.len() < min_registered {
        return Err(CalibrationError::CalibrationFailed(format!(
            "only {} registered images could be mapped back, need {min_registered}",
            cameras.len()
        )));
    }

    let registered = (0..images.len()).map(|i| cameras.contains_key(&i)).collect();

    Ok(Calibration {
        cameras,
        registered,
        num_points3d: model.points3d.len(),
        store,
        model_path: model.path.clone(),
    })
}
