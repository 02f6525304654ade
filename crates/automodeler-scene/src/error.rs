use std::path::PathBuf;

/// An error type for the scene module.
#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    /// Error to read or write a file.
    #[error("Failed to manipulate the file. {0}")]
    Io(#[from] std::io::Error),

    /// The archive container is malformed.
    #[error("Invalid scene archive. {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The scene document is not valid JSON or misses fields.
    #[error("Invalid scene document. {0}")]
    Document(#[from] serde_json::Error),

    /// Error to read the dimensions of an image.
    #[error("Failed to read the image dimensions. {0}")]
    ImageProbe(#[from] image::ImageError),

    /// The archive misses a required entry.
    #[error("Scene archive has no {0} entry")]
    MissingEntry(&'static str),

    /// The scene document was written by an unknown format version.
    #[error("Unsupported scene format version: {0}")]
    UnsupportedVersion(u32),

    /// A locator violates the scene invariants.
    #[error("Invalid locator {name}: {reason}")]
    InvalidLocator {
        /// Name of the offending locator.
        name: String,
        /// Human readable reason.
        reason: String,
    },

    /// An image index does not exist in the scene.
    #[error("Image index {index} out of range, the scene has {len} images")]
    ImageIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of images in the scene.
        len: usize,
    },

    /// A normalized coordinate is outside of `0..=1` or not finite.
    #[error("Normalized coordinate ({x}, {y}) is outside of the image")]
    InvalidPosition {
        /// Normalized x.
        x: f64,
        /// Normalized y.
        y: f64,
    },

    /// Two images of the scene share the same file name.
    #[error("Two images share the file name {0}")]
    DuplicateImageName(String),

    /// The image file is missing and no copy is embedded in the archive.
    #[error("Image does not exist and is not embedded: {0}")]
    MissingImage(PathBuf),
}
