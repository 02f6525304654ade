#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # AutoModeler geometry
//!
//! Everything in this crate is pure: no I/O, no hidden state, no randomness.
//! Failures are reported as `None` or as the `f64::INFINITY` error sentinel,
//! never as panics.
//!
//! ## Example: triangulate and score one point
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use automodeler_geometry::{
//!     camera::SimplePinhole,
//!     pose::WorldFromCam,
//!     projection::ProjectionMatrix,
//!     reprojection::reprojection_report,
//!     DMat3, DVec3,
//! };
//!
//! let k = SimplePinhole::from_image_size(640, 480).matrix();
//! let left = WorldFromCam::from_parts(DMat3::IDENTITY, DVec3::ZERO);
//! let right = WorldFromCam::from_parts(DMat3::IDENTITY, DVec3::X);
//!
//! let mut projections = BTreeMap::new();
//! projections.insert(0, ProjectionMatrix::from_world_from_cam(&k, &left));
//! projections.insert(1, ProjectionMatrix::from_world_from_cam(&k, &right));
//!
//! let point = [0.2, -0.1, 5.0];
//! let mut observations = BTreeMap::new();
//! observations.insert(
//!     7u32,
//!     projections
//!         .iter()
//!         .filter_map(|(&idx, p)| p.project(&point).map(|uv| (idx, uv)))
//!         .collect::<BTreeMap<_, _>>(),
//! );
//!
//! let report = reprojection_report(&projections, &observations);
//! assert!(report.point_sets[&7].error < 1e-6);
//! ```

/// Single-focal pinhole camera heuristic.
pub mod camera;

/// Conversions between array layouts and `glam` types.
pub mod linalg;

/// Rigid pose conventions and conversions.
pub mod pose;

/// Projection matrices built from intrinsics and poses.
pub mod projection;

/// Per point-set and per image reprojection scoring.
pub mod reprojection;

/// Direct linear transform triangulation.
pub mod triangulation;

pub use glam::{DMat3, DVec3};

/// A 3x4 matrix stored row-major.
pub type Mat34 = [[f64; 4]; 3];
