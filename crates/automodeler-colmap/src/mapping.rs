//! Selection of the reconstructed model and mapping of its images back to the
//! caller's image indices.

use std::collections::BTreeMap;

use automodeler_geometry::{pose::CamFromWorld, pose::WorldFromCam, DMat3};
use automodeler_scene::ImageEntry;

use crate::error::ColmapError;
use crate::types::SparseModel;

/// A camera recovered for one of the caller's images.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredCamera {
    /// Image id in the store.
    pub image_id: u32,
    /// Intrinsics matrix.
    pub intrinsics: DMat3,
    /// Pose of the camera in the world.
    pub world_from_cam: WorldFromCam,
}

/// The model registering the most images, the first one on ties.
pub fn best_model(models: &[SparseModel]) -> Option<&SparseModel> {
    models.iter().fold(None, |best: Option<&SparseModel>, model| match best {
        Some(b) if b.num_registered() >= model.num_registered() => Some(b),
        _ => Some(model),
    })
}

/// Match the images of a model to the caller's images by file name.
///
/// Images of the model matching no caller image, or whose camera model carries
/// no usable intrinsics, are skipped with a warning. When two caller images
/// share a file name the first one wins.
///
/// # Returns
///
/// The recovered cameras keyed by image index.
pub fn map_to_images(
    model: &SparseModel,
    images: &[ImageEntry],
) -> Result<BTreeMap<usize, RegisteredCamera>, ColmapError> {
    let mut registered = BTreeMap::new();

    for image in model.images.iter() {
        let Some(index) = images
            .iter()
            .position(|entry| entry.file_name() == Some(image.name.as_str()))
        else {
            log::warn!("reconstructed image {} matches no input image", image.name);
            continue;
        };

        let camera = model.cameras.get(&image.camera_id).ok_or_else(|| {
            ColmapError::ParseError(format!(
                "Image {} references unknown camera {}",
                image.name, image.camera_id
            ))
        })?;

        let Some(intrinsics) = camera.intrinsics()? else {
            log::warn!(
                "image {} uses unsupported camera model {}, skipping",
                image.name,
                camera.model_id.name()
            );
            continue;
        };

        let cam_from_world = CamFromWorld::from_quaternion(&image.rotation, image.translation)
            .ok_or_else(|| {
                ColmapError::ParseError(format!("Image {} has a zero quaternion", image.name))
            })?;

        registered.insert(
            index,
            RegisteredCamera {
                image_id: image.image_id,
                intrinsics,
                world_from_cam: cam_from_world.inverse(),
            },
        );
    }

    log::debug!(
        "mapped {} of {} reconstructed images",
        registered.len(),
        model.images.len()
    );
    Ok(registered)
}
