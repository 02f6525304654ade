#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Correspondence store builder.
pub mod database;

/// Reconstruction engine abstraction and the COLMAP command line engine.
pub mod engine;

/// Error types for the COLMAP module.
pub mod error;

/// Best model selection and mapping back to image indices.
pub mod mapping;

/// Text model reader.
pub mod text;

/// COLMAP model types.
pub mod types;

/// Working directory layout.
pub mod workspace;

pub use crate::database::{build_store, pair_id, ParamsEncoding, StoreIndex};
pub use crate::engine::{ColmapCli, MapperOptions, ReconstructionEngine};
pub use crate::error::ColmapError;
pub use crate::mapping::{best_model, map_to_images, RegisteredCamera};
pub use crate::text::read_model;
pub use crate::types::{CameraModelId, ColmapCamera, ColmapImage, ColmapPoint3d, SparseModel};
pub use crate::workspace::Workspace;
