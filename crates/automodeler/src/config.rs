use std::path::PathBuf;

use automodeler_colmap::{MapperOptions, ParamsEncoding};
use serde::{Deserialize, Serialize};

/// Settings of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Incremental mapper settings.
    pub mapper: MapperOptions,
    /// Numeric width of the camera parameters in the store.
    pub params_encoding: ParamsEncoding,
    /// Fewer registered images than this is a failure.
    pub min_registered_images: usize,
    /// Parent of the working directory. Each run wipes and recreates only its
    /// `colmap_work` child. A fresh temporary directory when unset.
    pub workdir: Option<PathBuf>,
    /// Keep the temporary working directory after the run.
    pub keep_workdir: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            mapper: MapperOptions::default(),
            params_encoding: ParamsEncoding::default(),
            min_registered_images: 2,
            workdir: None,
            keep_workdir: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json() -> Result<(), serde_json::Error> {
        let config: CalibrationConfig = serde_json::from_str(
            r#"{"params_encoding": "f32", "mapper": {"abs_pose_max_error": 12.0}}"#,
        )?;
        assert_eq!(config.params_encoding, ParamsEncoding::F32);
        assert_eq!(config.mapper.abs_pose_max_error, 12.0);
        assert_eq!(config.mapper.min_num_matches, 3);
        assert_eq!(config.min_registered_images, 2);
        assert!(config.workdir.is_none());
        Ok(())
    }
}
