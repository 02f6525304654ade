#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The pipeline turns manually marked point-sets into the correspondence store
//! of an external structure-from-motion engine, runs the engine, and scores the
//! recovered cameras by triangulating every point-set again.
//!
//! ```no_run
//! use automodeler::{calibrate, CalibrationConfig};
//! use automodeler::colmap::ColmapCli;
//! use automodeler::scene::{load_scene, ImageEntry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut loaded = load_scene("room.zip")?;
//! let paths = loaded.materialize_images("room-images")?;
//! let images = paths
//!     .iter()
//!     .map(ImageEntry::probe)
//!     .collect::<Result<Vec<_>, _>>()?;
//!
//! let observations = loaded.scene.normalized_observations();
//! let calibration = calibrate(
//!     &images,
//!     &observations,
//!     &ColmapCli::default(),
//!     &CalibrationConfig::default(),
//! )?;
//! let report = calibration.reprojection(&images, &observations);
//! automodeler::store_errors(&mut loaded.scene, &report);
//! println!("{}", calibration.summary(&report));
//! # Ok(())
//! # }
//! ```

mod calibrate;
mod config;
mod error;

pub use crate::calibrate::{
    calibrate, store_errors, Calibration, CalibrationSummary, MIN_IMAGES, MIN_POINT_SETS,
    WORKDIR_NAME,
};
pub use crate::config::CalibrationConfig;
pub use crate::error::CalibrationError;

#[doc(inline)]
pub use automodeler_colmap as colmap;

#[doc(inline)]
pub use automodeler_geometry as geometry;

#[doc(inline)]
pub use automodeler_scene as scene;
