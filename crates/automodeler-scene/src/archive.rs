//! Scene archives.
//!
//! An archive is a zip container with three kinds of entries:
//!
//! * `scene.json`: the format version, the image paths and the locators.
//! * `images/<file name>`: a copy of every source image.
//! * `meta/hashmap.json`: MD5 hex digest of every stored entry, merged across saves.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::error::SceneError;
use crate::scene::{NormalizedPoint, PointSet, Scene};

/// Version written into every `scene.json`.
pub const FORMAT_VERSION: u32 = 1;

const SCENE_ENTRY: &str = "scene.json";
const MANIFEST_ENTRY: &str = "meta/hashmap.json";
const IMAGES_PREFIX: &str = "images/";

/// Entry name to MD5 hex digest.
pub type Manifest = BTreeMap<String, String>;

#[derive(Debug, Serialize, Deserialize)]
struct SceneDocument {
    format_version: u32,
    images: Vec<PathBuf>,
    #[serde(default)]
    locators: Vec<LocatorDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LocatorDocument {
    name: String,
    positions: BTreeMap<usize, NormalizedPoint>,
    #[serde(with = "error_sentinel", default = "unknown_error")]
    error: f64,
}

fn unknown_error() -> f64 {
    f64::INFINITY
}

/// JSON has no infinity: unknown errors are written as `null`.
mod error_sentinel {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

/// A scene read back from an archive.
#[derive(Debug, Clone)]
pub struct LoadedScene {
    /// The images and locators.
    pub scene: Scene,
    /// Embedded image bytes keyed by file name.
    pub embedded_images: BTreeMap<String, Vec<u8>>,
    /// Digests stored in the archive.
    pub manifest: Manifest,
}

impl LoadedScene {
    /// Resolve every image of the scene to a readable file.
    ///
    /// Images whose original path still exists are used in place; the others are
    /// written into `dir` from their embedded copy. Returns the paths in image
    /// index order.
    pub fn materialize_images(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, SceneError> {
        let dir = dir.as_ref();
        let mut resolved = Vec::with_capacity(self.scene.images().len());
        for path in self.scene.images() {
            if path.is_file() {
                resolved.push(path.clone());
                continue;
            }
            let embedded =
                file_name(path).and_then(|name| Some((name, self.embedded_images.get(name)?)));
            let Some((name, bytes)) = embedded else {
                return Err(SceneError::MissingImage(path.clone()));
            };
            std::fs::create_dir_all(dir)?;
            let target = dir.join(name);
            std::fs::write(&target, bytes)?;
            log::debug!("materialized {} into {}", path.display(), target.display());
            resolved.push(target);
        }
        Ok(resolved)
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn digest(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

/// Upper bound of the buffer reserved from an entry's declared size.
const MAX_PREALLOCATION: usize = 64 << 20;

/// Buffer for an entry whose header claims `size` bytes.
fn entry_buffer(size: u64) -> Vec<u8> {
    let capacity = usize::try_from(size).map_or(MAX_PREALLOCATION, |s| s.min(MAX_PREALLOCATION));
    Vec::with_capacity(capacity)
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, SceneError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut bytes = entry_buffer(entry.size());
    entry.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

fn read_embedded_images<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<BTreeMap<String, Vec<u8>>, SceneError> {
    let mut images = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.name().strip_prefix(IMAGES_PREFIX) else {
            continue;
        };
        let name = name.to_string();
        let mut bytes = entry_buffer(entry.size());
        entry.read_to_end(&mut bytes)?;
        images.insert(name, bytes);
    }
    Ok(images)
}

fn read_manifest<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Manifest, SceneError> {
    match read_entry(archive, MANIFEST_ENTRY)? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(Manifest::new()),
    }
}

fn scene_from_document(document: SceneDocument) -> Result<Scene, SceneError> {
    if document.format_version != FORMAT_VERSION {
        return Err(SceneError::UnsupportedVersion(document.format_version));
    }

    let num_images = document.images.len();
    let mut point_sets = Vec::with_capacity(document.locators.len());
    for (id, locator) in document.locators.into_iter().enumerate() {
        if locator.positions.is_empty() {
            return Err(SceneError::InvalidLocator {
                name: locator.name,
                reason: "no observation".to_string(),
            });
        }
        if point_sets.iter().any(|p: &PointSet| p.name == locator.name) {
            return Err(SceneError::InvalidLocator {
                name: locator.name,
                reason: "duplicated name".to_string(),
            });
        }
        for (&index, point) in locator.positions.iter() {
            if index >= num_images {
                return Err(SceneError::ImageIndexOutOfRange {
                    index,
                    len: num_images,
                });
            }
            if !point.is_valid() {
                return Err(SceneError::InvalidPosition {
                    x: point.x,
                    y: point.y,
                });
            }
        }
        point_sets.push(PointSet {
            id: id as u32,
            name: locator.name,
            observations: locator.positions,
            error: locator.error,
        });
    }

    Ok(Scene::from_parts(document.images, point_sets))
}

fn document_from_scene(scene: &Scene) -> SceneDocument {
    SceneDocument {
        format_version: FORMAT_VERSION,
        images: scene.images().to_vec(),
        locators: scene
            .point_sets()
            .iter()
            .map(|p| LocatorDocument {
                name: p.name.clone(),
                positions: p.observations.clone(),
                error: p.error,
            })
            .collect(),
    }
}

/// Read a scene archive and validate its content.
pub fn load_scene(path: impl AsRef<Path>) -> Result<LoadedScene, SceneError> {
    let path = path.as_ref();
    let mut archive = ZipArchive::new(File::open(path)?)?;

    let document =
        read_entry(&mut archive, SCENE_ENTRY)?.ok_or(SceneError::MissingEntry(SCENE_ENTRY))?;
    let scene = scene_from_document(serde_json::from_slice(&document)?)?;
    let embedded_images = read_embedded_images(&mut archive)?;
    let manifest = read_manifest(&mut archive)?;

    log::debug!(
        "loaded {}: {} images, {} locators, {} embedded images",
        path.display(),
        scene.images().len(),
        scene.point_sets().len(),
        embedded_images.len()
    );

    Ok(LoadedScene {
        scene,
        embedded_images,
        manifest,
    })
}

/// Write a scene archive, replacing `path` atomically.
///
/// Every image is embedded by file name. An image whose source file is gone is
/// carried over from the archive being replaced. Digests of entries written by a
/// previous save and not rewritten now are kept in the manifest.
///
/// Returns the manifest written into the archive.
pub fn save_scene(path: impl AsRef<Path>, scene: &Scene) -> Result<Manifest, SceneError> {
    let path = path.as_ref();

    let mut names = BTreeMap::new();
    for image in scene.images() {
        let Some(name) = file_name(image) else {
            return Err(SceneError::MissingImage(image.clone()));
        };
        if names.insert(name.to_string(), image.clone()).is_some() {
            return Err(SceneError::DuplicateImageName(name.to_string()));
        }
    }

    let (mut manifest, mut previous_images) = if path.is_file() {
        let mut previous = ZipArchive::new(File::open(path)?)?;
        (read_manifest(&mut previous)?, read_embedded_images(&mut previous)?)
    } else {
        (Manifest::new(), BTreeMap::new())
    };

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut writer = ZipWriter::new(tempfile::NamedTempFile::new_in(parent)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let document = serde_json::to_vec_pretty(&document_from_scene(scene))?;
    writer.start_file(SCENE_ENTRY, options)?;
    writer.write_all(&document)?;
    manifest.insert(SCENE_ENTRY.to_string(), digest(&document));

    for (name, source) in names.iter() {
        let bytes = if source.is_file() {
            std::fs::read(source)?
        } else if let Some(bytes) = previous_images.remove(name) {
            log::debug!("{} is missing, keeping the embedded copy", source.display());
            bytes
        } else {
            log::warn!("{} is missing and was never embedded, skipping", source.display());
            continue;
        };
        let entry = format!("{IMAGES_PREFIX}{name}");
        writer.start_file(entry.as_str(), options)?;
        writer.write_all(&bytes)?;
        manifest.insert(entry, digest(&bytes));
    }

    writer.start_file(MANIFEST_ENTRY, options)?;
    writer.write_all(&serde_json::to_vec_pretty(&manifest)?)?;

    let file = writer.finish()?;
    file.persist(path).map_err(|e| e.error)?;

    log::debug!("saved {} with {} manifest entries", path.display(), manifest.len());
    Ok(manifest)
}

/// Recompute the digest of every archive entry listed in the manifest.
///
/// Returns the names of the entries whose content no longer matches. Manifest
/// entries absent from the archive are not reported.
pub fn verify_manifest(path: impl AsRef<Path>) -> Result<Vec<String>, SceneError> {
    let mut archive = ZipArchive::new(File::open(path.as_ref())?)?;
    let manifest = read_manifest(&mut archive)?;

    let mut mismatches = Vec::new();
    for (name, expected) in manifest.iter() {
        if let Some(bytes) = read_entry(&mut archive, name)? {
            if digest(&bytes) != *expected {
                mismatches.push(name.clone());
            }
        }
    }
    Ok(mismatches)
}
