#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Scene archive save, load and verification.
pub mod archive;

/// Error types for the scene module.
pub mod error;

/// Images, point-sets and their editing rules.
pub mod scene;

pub use crate::archive::{load_scene, save_scene, verify_manifest, LoadedScene, Manifest};
pub use crate::error::SceneError;
pub use crate::scene::{
    pixel_observations, ImageEntry, NormalizedPoint, Observations, PointSet, PointSetId, Scene,
};
