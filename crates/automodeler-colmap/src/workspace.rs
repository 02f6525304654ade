use std::fs;
use std::path::{Path, PathBuf};

use automodeler_scene::ImageEntry;

use crate::error::ColmapError;

/// Name of the correspondence store inside the working directory.
pub const DATABASE_NAME: &str = "database.db";

/// File marking a directory laid out by [`Workspace::prepare`].
pub const MARKER_NAME: &str = ".automodeler-workspace";

/// Number of log lines kept in invocation errors.
pub const LOG_TAIL_LINES: usize = 20;

/// Working directory of one reconstruction run.
///
/// ```text
/// <root>/database.db
/// <root>/images/<file name>
/// <root>/sparse/<n>/
/// <root>/logs/<command>.log
/// <root>/.automodeler-workspace
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Wipe `root` and lay a fresh working directory out, copying the images in.
    ///
    /// Only an empty directory or one laid out by a previous call is wiped;
    /// any other existing directory is refused with
    /// [`ColmapError::UnmanagedDirectory`] and left untouched.
    pub fn prepare(root: impl AsRef<Path>, images: &[ImageEntry]) -> Result<Self, ColmapError> {
        let workspace = Self::open(root);
        if workspace.root.exists() {
            if !workspace.is_managed()? {
                return Err(ColmapError::UnmanagedDirectory(workspace.root.clone()));
            }
            log::debug!("wiping working directory {}", workspace.root.display());
            fs::remove_dir_all(&workspace.root)?;
        }
        for dir in [workspace.image_dir(), workspace.sparse_dir(), workspace.log_dir()] {
            fs::create_dir_all(dir)?;
        }
        fs::write(workspace.root.join(MARKER_NAME), b"")?;

        for image in images {
            let name = image
                .file_name()
                .ok_or_else(|| ColmapError::InvalidImagePath(image.path.clone()))?;
            let target = workspace.image_dir().join(name);
            if target.exists() {
                return Err(ColmapError::DuplicateImageName(name.to_string()));
            }
            fs::copy(&image.path, &target)?;
        }

        log::debug!(
            "prepared {} with {} images",
            workspace.root.display(),
            images.len()
        );
        Ok(workspace)
    }

    /// Use an existing working directory as is.
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn is_managed(&self) -> Result<bool, ColmapError> {
        if !self.root.is_dir() {
            return Ok(false);
        }
        if self.root.join(MARKER_NAME).is_file() {
            return Ok(true);
        }
        Ok(fs::read_dir(&self.root)?.next().is_none())
    }

    /// Root of the working directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the correspondence store.
    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_NAME)
    }

    /// Directory holding the image copies.
    pub fn image_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    /// Directory the mapper writes its models into.
    pub fn sparse_dir(&self) -> PathBuf {
        self.root.join("sparse")
    }

    /// Directory of the engine logs.
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Log file of one engine command.
    pub fn log_path(&self, command: &str) -> PathBuf {
        self.log_dir().join(format!("{command}.log"))
    }

    /// Model directories under `sparse/`, in numeric order.
    pub fn model_dirs(&self) -> Result<Vec<PathBuf>, ColmapError> {
        let sparse = self.sparse_dir();
        if !sparse.is_dir() {
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        for entry in fs::read_dir(&sparse)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let index = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(index) = index {
                dirs.push((index, path));
            }
        }
        dirs.sort();
        Ok(dirs.into_iter().map(|(_, path)| path).collect())
    }
}

/// Last `max_lines` lines of a log file, empty if it cannot be read.
pub fn log_tail(path: impl AsRef<Path>, max_lines: usize) -> String {
    let Ok(content) = fs::read_to_string(path) else {
        return String::new();
    };
    let lines = content.lines().collect::<Vec<_>>();
    lines[lines.len().saturating_sub(max_lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_wipes_and_copies() -> Result<(), ColmapError> {
        let tmp = tempfile::tempdir()?;
        let source = tmp.path().join("a.jpg");
        fs::write(&source, b"jpeg")?;

        let root = tmp.path().join("work");
        let images = [ImageEntry::new(&source, 4, 4)];
        Workspace::prepare(&root, &images)?;
        assert!(root.join(MARKER_NAME).is_file());
        fs::create_dir_all(root.join("sparse/0"))?;
        fs::write(root.join("stale.txt"), b"old")?;

        let workspace = Workspace::prepare(&root, &images)?;
        assert!(!root.join("stale.txt").exists());
        assert!(workspace.model_dirs()?.is_empty());
        assert_eq!(fs::read(workspace.image_dir().join("a.jpg"))?, b"jpeg");
        assert!(workspace.log_dir().is_dir());
        Ok(())
    }

    #[test]
    fn test_prepare_keeps_unmanaged_directory() -> Result<(), ColmapError> {
        let tmp = tempfile::tempdir()?;
        let project = tmp.path().join("project");
        fs::create_dir_all(&project)?;
        fs::write(project.join("img0.jpg"), b"jpeg")?;
        fs::write(project.join("scene.zip"), b"zip")?;
        let images = [ImageEntry::new(project.join("img0.jpg"), 4, 4)];

        assert!(matches!(
            Workspace::prepare(&project, &images),
            Err(ColmapError::UnmanagedDirectory(_))
        ));
        assert_eq!(fs::read(project.join("img0.jpg"))?, b"jpeg");
        assert_eq!(fs::read(project.join("scene.zip"))?, b"zip");
        assert!(!project.join("images").exists());

        // an existing empty directory is fine
        let empty = tmp.path().join("empty");
        fs::create_dir_all(&empty)?;
        Workspace::prepare(&empty, &images)?;
        assert!(empty.join(MARKER_NAME).is_file());
        Ok(())
    }

    #[test]
    fn test_prepare_rejects_same_file_name() -> Result<(), ColmapError> {
        let tmp = tempfile::tempdir()?;
        fs::create_dir_all(tmp.path().join("x"))?;
        fs::create_dir_all(tmp.path().join("y"))?;
        fs::write(tmp.path().join("x/img.png"), b"1")?;
        fs::write(tmp.path().join("y/img.png"), b"2")?;
        let images = [
            ImageEntry::new(tmp.path().join("x/img.png"), 1, 1),
            ImageEntry::new(tmp.path().join("y/img.png"), 1, 1),
        ];
        assert!(matches!(
            Workspace::prepare(tmp.path().join("work"), &images),
            Err(ColmapError::DuplicateImageName(_))
        ));
        Ok(())
    }

    #[test]
    fn test_model_dirs_numeric_order() -> Result<(), ColmapError> {
        let tmp = tempfile::tempdir()?;
        let workspace = Workspace::open(tmp.path());
        for name in ["10", "2", "0", "notes"] {
            fs::create_dir_all(workspace.sparse_dir().join(name))?;
        }
        fs::write(workspace.sparse_dir().join("1"), b"file")?;
        let names = workspace
            .model_dirs()?
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["0", "2", "10"]);
        Ok(())
    }

    #[test]
    fn test_log_tail() -> Result<(), ColmapError> {
        let tmp = tempfile::tempdir()?;
        let log = tmp.path().join("mapper.log");
        fs::write(&log, "a\nb\nc\nd\n")?;
        assert_eq!(log_tail(&log, 2), "c\nd");
        assert_eq!(log_tail(&log, 10), "a\nb\nc\nd");
        assert_eq!(log_tail(tmp.path().join("none.log"), 2), "");
        Ok(())
    }
}
