use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SceneError;

/// Identifier of a point-set, canonical key of every per-point result.
pub type PointSetId = u32;

/// Normalized observations of every point-set, keyed by point-set id then image index.
pub type Observations = BTreeMap<PointSetId, BTreeMap<usize, NormalizedPoint>>;

/// Observation normalized by the image size, both coordinates in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    /// Horizontal position, 0 is the left border.
    pub x: f64,
    /// Vertical position, 0 is the top border.
    pub y: f64,
}

impl NormalizedPoint {
    /// Create a normalized point, rejecting coordinates outside of the image.
    pub fn new(x: f64, y: f64) -> Result<Self, SceneError> {
        let point = Self { x, y };
        if !point.is_valid() {
            return Err(SceneError::InvalidPosition { x, y });
        }
        Ok(point)
    }

    /// Whether both coordinates are finite and inside `0..=1`.
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }

    /// Pixel coordinates in an image of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> [f64; 2] {
        [self.x * width as f64, self.y * height as f64]
    }
}

/// An image taking part in a calibration, with its pixel size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// Path to the source file.
    pub path: PathBuf,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImageEntry {
    /// Create an entry with known dimensions.
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
        }
    }

    /// Read the dimensions from the image file header.
    pub fn probe(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let (width, height) = image::image_dimensions(path)?;
        Ok(Self::new(path, width, height))
    }

    /// Read the dimensions from an in-memory encoded image.
    pub fn probe_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self, SceneError> {
        let (width, height) = image::ImageReader::new(std::io::Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()?;
        Ok(Self::new(path, width, height))
    }

    /// Base name of the file, the identity shared with the reconstruction engine.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// A named correspondence: the observations of one physical point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    /// Identifier, equal to the position of the point-set in its scene.
    pub id: PointSetId,
    /// Display name.
    pub name: String,
    /// Observations keyed by image index.
    pub observations: BTreeMap<usize, NormalizedPoint>,
    /// Last reprojection error in pixels, `f64::INFINITY` when unknown.
    pub error: f64,
}

/// Images and point-sets of a scene.
///
/// Point-set ids always equal their position, so removing a point-set renumbers
/// the ones after it. Every point-set keeps at least one observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    images: Vec<PathBuf>,
    point_sets: Vec<PointSet>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scene from already validated parts.
    pub(crate) fn from_parts(images: Vec<PathBuf>, point_sets: Vec<PointSet>) -> Self {
        let mut scene = Self { images, point_sets };
        scene.renumber();
        scene
    }

    /// Image paths in image index order.
    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    /// Point-sets in id order.
    pub fn point_sets(&self) -> &[PointSet] {
        &self.point_sets
    }

    /// Look a point-set up by id.
    pub fn point_set(&self, id: PointSetId) -> Option<&PointSet> {
        self.point_sets.get(id as usize)
    }

    /// Look a point-set up by name.
    pub fn point_set_by_name(&self, name: &str) -> Option<&PointSet> {
        self.point_sets.iter().find(|p| p.name == name)
    }

    /// Append an image and return its index.
    pub fn add_image(&mut self, path: impl Into<PathBuf>) -> usize {
        self.images.push(path.into());
        self.images.len() - 1
    }

    /// Remove an image, shifting the indices of the following images.
    ///
    /// Point-sets left without observations are removed.
    pub fn remove_image(&mut self, index: usize) -> Result<PathBuf, SceneError> {
        self.check_image_index(index)?;
        let path = self.images.remove(index);
        for point_set in self.point_sets.iter_mut() {
            point_set.observations = std::mem::take(&mut point_set.observations)
                .into_iter()
                .filter(|(i, _)| *i != index)
                .map(|(i, p)| if i > index { (i - 1, p) } else { (i, p) })
                .collect();
        }
        self.point_sets.retain(|p| !p.observations.is_empty());
        self.renumber();
        Ok(path)
    }

    /// Smallest free name of the form `locN`, starting at `loc1`.
    pub fn next_locator_name(&self) -> String {
        (1..)
            .map(|i| format!("loc{i}"))
            .find(|name| self.point_set_by_name(name).is_none())
            .unwrap_or_default()
    }

    /// Place (or move) the observation of the point-set `name` in an image.
    ///
    /// The point-set is created when it does not exist yet.
    pub fn place_observation(
        &mut self,
        name: &str,
        image_index: usize,
        point: NormalizedPoint,
    ) -> Result<PointSetId, SceneError> {
        self.check_image_index(image_index)?;
        if !point.is_valid() {
            return Err(SceneError::InvalidPosition {
                x: point.x,
                y: point.y,
            });
        }

        let id = match self.point_sets.iter().position(|p| p.name == name) {
            Some(pos) => pos,
            None => {
                self.point_sets.push(PointSet {
                    id: self.point_sets.len() as PointSetId,
                    name: name.to_string(),
                    observations: BTreeMap::new(),
                    error: f64::INFINITY,
                });
                self.point_sets.len() - 1
            }
        };
        self.point_sets[id].observations.insert(image_index, point);
        Ok(id as PointSetId)
    }

    /// Remove one observation. The point-set disappears with its last observation.
    ///
    /// Returns whether an observation was removed.
    pub fn remove_observation(&mut self, id: PointSetId, image_index: usize) -> bool {
        let Some(point_set) = self.point_sets.get_mut(id as usize) else {
            return false;
        };
        let removed = point_set.observations.remove(&image_index).is_some();
        if point_set.observations.is_empty() {
            self.point_sets.remove(id as usize);
            self.renumber();
        }
        removed
    }

    /// Remove a whole point-set, renumbering the following ones.
    pub fn remove_point_set(&mut self, id: PointSetId) -> Option<PointSet> {
        if id as usize >= self.point_sets.len() {
            return None;
        }
        let removed = self.point_sets.remove(id as usize);
        self.renumber();
        Some(removed)
    }

    /// Normalized observations of every point-set keyed by id.
    pub fn normalized_observations(&self) -> Observations {
        self.point_sets
            .iter()
            .map(|p| (p.id, p.observations.clone()))
            .collect()
    }

    /// Store reprojection errors into the point-sets. Missing ids become unknown.
    pub fn set_errors(&mut self, errors: &BTreeMap<PointSetId, f64>) {
        for point_set in self.point_sets.iter_mut() {
            point_set.error = errors.get(&point_set.id).copied().unwrap_or(f64::INFINITY);
        }
    }

    fn check_image_index(&self, index: usize) -> Result<(), SceneError> {
        if index >= self.images.len() {
            return Err(SceneError::ImageIndexOutOfRange {
                index,
                len: self.images.len(),
            });
        }
        Ok(())
    }

    fn renumber(&mut self) {
        for (i, point_set) in self.point_sets.iter_mut().enumerate() {
            point_set.id = i as PointSetId;
        }
    }
}

/// Pixel observations of every point-set, converted with the size of each image.
///
/// Observations in images without an entry are dropped.
pub fn pixel_observations(
    images: &[ImageEntry],
    observations: &Observations,
) -> BTreeMap<PointSetId, BTreeMap<usize, [f64; 2]>> {
    observations
        .iter()
        .map(|(&id, obs)| {
            let pixels = obs
                .iter()
                .filter_map(|(&idx, p)| {
                    let image = images.get(idx)?;
                    Some((idx, p.to_pixels(image.width, image.height)))
                })
                .collect();
            (id, pixels)
        })
        .collect()
}
