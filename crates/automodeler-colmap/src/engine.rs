use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::ColmapError;
use crate::text::read_model;
use crate::types::SparseModel;
use crate::workspace::{log_tail, Workspace, LOG_TAIL_LINES};

/// Interval between two checks of a running engine process.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Incremental mapper settings, relaxed for a handful of manual correspondences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperOptions {
    /// Minimum number of matches for an image pair to be used.
    pub min_num_matches: u32,
    /// Minimum triangulation angle of the initial pair, in degrees.
    pub init_min_tri_angle: f64,
    /// Minimum number of inliers of the initial pair.
    pub init_min_num_inliers: u32,
    /// Minimum number of inliers to register a new image.
    pub abs_pose_min_num_inliers: u32,
    /// Maximum reprojection error when registering a new image, in pixels.
    pub abs_pose_max_error: f64,
    /// Minimum triangulation angle kept when filtering points, in degrees.
    pub filter_min_tri_angle: f64,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            min_num_matches: 3,
            init_min_tri_angle: 1.0,
            init_min_num_inliers: 3,
            abs_pose_min_num_inliers: 3,
            abs_pose_max_error: 24.0,
            filter_min_tri_angle: 0.0,
        }
    }
}

impl MapperOptions {
    /// The options as `--Mapper.*` command line flags.
    pub fn to_args(&self) -> Vec<String> {
        [
            ("min_num_matches", self.min_num_matches.to_string()),
            ("init_min_tri_angle", self.init_min_tri_angle.to_string()),
            ("init_min_num_inliers", self.init_min_num_inliers.to_string()),
            ("abs_pose_min_num_inliers", self.abs_pose_min_num_inliers.to_string()),
            ("abs_pose_max_error", self.abs_pose_max_error.to_string()),
            ("filter_min_tri_angle", self.filter_min_tri_angle.to_string()),
        ]
        .into_iter()
        .flat_map(|(name, value)| [format!("--Mapper.{name}"), value])
        .collect()
    }
}

/// The external structure-from-motion system.
pub trait ReconstructionEngine {
    /// Run the mapper on a prepared working directory.
    ///
    /// On success every model the engine produced is readable under
    /// [`Workspace::model_dirs`]; producing no model at all is not an error here.
    fn run_reconstruction(
        &self,
        workspace: &Workspace,
        options: &MapperOptions,
    ) -> Result<(), ColmapError>;

    /// Read one model directory.
    fn read_model(&self, model_dir: &Path) -> Result<SparseModel, ColmapError> {
        read_model(model_dir)
    }

    /// Read every model of the working directory, in directory order.
    fn read_models(&self, workspace: &Workspace) -> Result<Vec<SparseModel>, ColmapError> {
        workspace
            .model_dirs()?
            .iter()
            .map(|dir| self.read_model(dir))
            .collect()
    }
}

/// The `colmap` command line program.
#[derive(Debug, Clone)]
pub struct ColmapCli {
    executable: PathBuf,
    timeout: Option<Duration>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Default for ColmapCli {
    fn default() -> Self {
        Self::new("colmap")
    }
}

impl ColmapCli {
    /// Create an engine running the given executable.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: None,
            cancel: None,
        }
    }

    /// Kill every command running longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Kill the running command as soon as `cancel` is set.
    pub fn with_cancel_token(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Path of the executable.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|cancel| cancel.load(Ordering::SeqCst))
    }

    /// Run one sub-command, its output going to `log_name` in the log directory.
    pub fn run_command(
        &self,
        workspace: &Workspace,
        command: &str,
        log_name: &str,
        args: &[OsString],
    ) -> Result<(), ColmapError> {
        if self.is_cancelled() {
            return Err(ColmapError::Cancelled(command.to_string()));
        }

        let log_path = workspace.log_path(log_name);
        let stdout = File::create(&log_path)?;
        let stderr = stdout.try_clone()?;

        log::debug!("running {} {command}", self.executable.display());
        let mut child = Command::new(&self.executable)
            .arg(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| ColmapError::Spawn {
                executable: self.executable.clone(),
                source,
            })?;

        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    log::debug!("{command} finished in {:?}", start.elapsed());
                    return Ok(());
                }
                return Err(ColmapError::EngineFailed {
                    command: command.to_string(),
                    status: status.to_string(),
                    log_tail: log_tail(&log_path, LOG_TAIL_LINES),
                });
            }

            if self.is_cancelled() {
                child.kill()?;
                child.wait()?;
                return Err(ColmapError::Cancelled(command.to_string()));
            }

            if let Some(timeout) = self.timeout {
                if start.elapsed() >= timeout {
                    child.kill()?;
                    child.wait()?;
                    return Err(ColmapError::Timeout {
                        command: command.to_string(),
                        seconds: timeout.as_secs_f64(),
                    });
                }
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ReconstructionEngine for ColmapCli {
    fn run_reconstruction(
        &self,
        workspace: &Workspace,
        options: &MapperOptions,
    ) -> Result<(), ColmapError> {
        let mut args: Vec<OsString> = vec![
            "--database_path".into(),
            workspace.database_path().into(),
            "--image_path".into(),
            workspace.image_dir().into(),
            "--output_path".into(),
            workspace.sparse_dir().into(),
        ];
        args.extend(options.to_args().into_iter().map(OsString::from));
        self.run_command(workspace, "mapper", "mapper", &args)?;

        let model_dirs = workspace.model_dirs()?;
        log::info!("mapper produced {} models", model_dirs.len());

        // the text listings are written next to the binary ones
        for (i, dir) in model_dirs.iter().enumerate() {
            let args: Vec<OsString> = vec![
                "--input_path".into(),
                dir.into(),
                "--output_path".into(),
                dir.into(),
                "--output_type".into(),
                "TXT".into(),
            ];
            let log_name = format!("model_converter_{i}");
            self.run_command(workspace, "model_converter", &log_name, &args)?;
        }
        Ok(())
    }
}
