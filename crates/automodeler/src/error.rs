use automodeler_colmap::ColmapError;
use automodeler_scene::SceneError;

/// Reasons a calibration run fails.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    /// The inputs cannot be calibrated.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A file or directory could not be created, copied or read.
    #[error("I/O error: {0}")]
    Io(String),

    /// The correspondence store rejected a write.
    #[error("Store error: {0}")]
    Schema(String),

    /// The reconstruction engine could not run to completion.
    #[error("Reconstruction engine error: {0}")]
    EngineInvocation(String),

    /// The engine output could not be read.
    #[error("Invalid engine output: {0}")]
    Parse(String),

    /// The engine ran but the cameras could not be recovered.
    #[error("Calibration failed: {0}")]
    CalibrationFailed(String),
}

impl From<std::io::Error> for CalibrationError {
    fn from(e: std::io::Error) -> Self {
        CalibrationError::Io(e.to_string())
    }
}

impl From<ColmapError> for CalibrationError {
    fn from(e: ColmapError) -> Self {
        let reason = e.to_string();
        match e {
            ColmapError::Io(_) => CalibrationError::Io(reason),
            ColmapError::Database(_)
            | ColmapError::DuplicateImageName(_)
            | ColmapError::InvalidImagePath(_)
            | ColmapError::MalformedBlob { .. } => CalibrationError::Schema(reason),
            ColmapError::UnknownImageIndex { .. } | ColmapError::UnmanagedDirectory(_) => {
                CalibrationError::Precondition(reason)
            }
            ColmapError::Spawn { .. }
            | ColmapError::EngineFailed { .. }
            | ColmapError::Timeout { .. }
            | ColmapError::Cancelled(_) => CalibrationError::EngineInvocation(reason),
            ColmapError::InvalidNumCameraParams { .. } | ColmapError::ParseError(_) => {
                CalibrationError::Parse(reason)
            }
        }
    }
}

impl From<SceneError> for CalibrationError {
    fn from(e: SceneError) -> Self {
        let reason = e.to_string();
        match e {
            SceneError::Io(_) | SceneError::ImageProbe(_) | SceneError::MissingImage(_) => {
                CalibrationError::Io(reason)
            }
            _ => CalibrationError::Precondition(reason),
        }
    }
}
