use std::path::PathBuf;

/// Error types for the COLMAP module.
#[derive(Debug, thiserror::Error)]
pub enum ColmapError {
    /// Error reading or writing a file.
    #[error("Failed to manipulate the file. {0}")]
    Io(#[from] std::io::Error),

    /// The store rejected a statement.
    #[error("Database error. {0}")]
    Database(#[from] rusqlite::Error),

    /// Two images would be stored under the same name.
    #[error("Two images share the name {0}")]
    DuplicateImageName(String),

    /// An existing directory not laid out by a previous run would be wiped.
    #[error("Refusing to wipe {0}: not an empty or previous working directory")]
    UnmanagedDirectory(PathBuf),

    /// An image path has no usable file name.
    #[error("Image path has no file name: {0}")]
    InvalidImagePath(PathBuf),

    /// An observation references an image that is not in the image list.
    #[error("Point-set {point_set} observes image {index}, only {len} images are given")]
    UnknownImageIndex {
        /// Offending point-set id.
        point_set: u32,
        /// Image index of the observation.
        index: usize,
        /// Number of images.
        len: usize,
    },

    /// A blob does not have the size implied by its shape.
    #[error("Malformed {table} blob: expected {expected} bytes, got {actual}")]
    MalformedBlob {
        /// Table the blob belongs to.
        table: &'static str,
        /// Size implied by rows and cols.
        expected: usize,
        /// Actual size.
        actual: usize,
    },

    /// The engine executable could not be started.
    #[error("Failed to start {executable}. {source}")]
    Spawn {
        /// Executable path.
        executable: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The engine exited with a failure status.
    #[error("{command} failed with {status}\n{log_tail}")]
    EngineFailed {
        /// Sub-command that failed.
        command: String,
        /// Exit status description.
        status: String,
        /// Last lines of the engine log.
        log_tail: String,
    },

    /// The engine did not finish in time and was killed.
    #[error("{command} timed out after {seconds:.1}s")]
    Timeout {
        /// Sub-command that was killed.
        command: String,
        /// Configured timeout in seconds.
        seconds: f64,
    },

    /// The run was cancelled and the engine was killed.
    #[error("{0} was cancelled")]
    Cancelled(String),

    /// Invalid number of camera parameters for the camera model.
    #[error("Camera model {model} expects {expected} parameters, got {actual}")]
    InvalidNumCameraParams {
        /// Camera model name.
        model: &'static str,
        /// Number of parameters of the model.
        expected: usize,
        /// Number of parameters found.
        actual: usize,
    },

    /// Malformed model listing.
    #[error("Parse error {0}")]
    ParseError(String),
}
