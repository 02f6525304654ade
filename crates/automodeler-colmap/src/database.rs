//! The correspondence store read by the COLMAP mapper.
//!
//! Manual correspondences take the place of detected features: every point-set
//! observed in an image becomes one keypoint of that image, and every pair of
//! images sharing point-sets gets one match per shared point-set. The matches
//! are also written as calibrated two-view geometries, so the mapper uses them
//! as verified inliers without running geometric verification.

use std::collections::BTreeMap;
use std::path::Path;

use automodeler_geometry::camera::SimplePinhole;
use automodeler_scene::{ImageEntry, Observations, PointSetId};
use rusqlite::{params, Connection, Transaction};
use serde::{Deserialize, Serialize};

use crate::error::ColmapError;
use crate::types::CameraModelId;

/// Upper bound on image ids, the multiplier of the pair id.
pub const MAX_NUM_IMAGES: u64 = 2_147_483_647;

/// Number of columns of a keypoint row: x, y, scale, orientation.
pub const KEYPOINT_COLS: usize = 4;

/// Length of the (zero) descriptor of a keypoint.
pub const DESCRIPTOR_DIM: usize = 128;

/// `TwoViewGeometry::CALIBRATED` in the store.
pub const TWO_VIEW_CALIBRATED: i64 = 2;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cameras (
    camera_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    model INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    params BLOB,
    prior_focal_length INTEGER NOT NULL);
CREATE TABLE IF NOT EXISTS images (
    image_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    name TEXT NOT NULL UNIQUE,
    camera_id INTEGER NOT NULL,
    CONSTRAINT image_id_check CHECK(image_id >= 0 and image_id < 2147483647),
    FOREIGN KEY(camera_id) REFERENCES cameras(camera_id));
CREATE UNIQUE INDEX IF NOT EXISTS index_name ON images(name);
CREATE TABLE IF NOT EXISTS keypoints (
    image_id INTEGER PRIMARY KEY NOT NULL,
    rows INTEGER NOT NULL,
    cols INTEGER NOT NULL,
    data BLOB,
    FOREIGN KEY(image_id) REFERENCES images(image_id) ON DELETE CASCADE);
CREATE TABLE IF NOT EXISTS descriptors (
    image_id INTEGER PRIMARY KEY NOT NULL,
    rows INTEGER NOT NULL,
    cols INTEGER NOT NULL,
    data BLOB,
    FOREIGN KEY(image_id) REFERENCES images(image_id) ON DELETE CASCADE);
CREATE TABLE IF NOT EXISTS matches (
    pair_id INTEGER PRIMARY KEY NOT NULL,
    rows INTEGER NOT NULL,
    cols INTEGER NOT NULL,
    data BLOB);
CREATE TABLE IF NOT EXISTS two_view_geometries (
    pair_id INTEGER PRIMARY KEY NOT NULL,
    rows INTEGER NOT NULL,
    cols INTEGER NOT NULL,
    data BLOB,
    config INTEGER NOT NULL,
    F BLOB,
    E BLOB,
    H BLOB,
    qvec BLOB,
    tvec BLOB);
";

/// Numeric width of the camera parameters blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamsEncoding {
    /// Little-endian `f64`, what current COLMAP releases read.
    #[default]
    F64,
    /// Little-endian `f32`.
    F32,
}

impl ParamsEncoding {
    /// Size in bytes of one encoded parameter.
    pub fn width(&self) -> usize {
        match self {
            ParamsEncoding::F64 => 8,
            ParamsEncoding::F32 => 4,
        }
    }

    /// Encode the parameters as a blob.
    pub fn encode(&self, params: &[f64]) -> Vec<u8> {
        match self {
            ParamsEncoding::F64 => params.iter().flat_map(|p| p.to_le_bytes()).collect(),
            ParamsEncoding::F32 => params
                .iter()
                .flat_map(|p| (*p as f32).to_le_bytes())
                .collect(),
        }
    }
}

/// Symmetric identifier of an image pair.
pub fn pair_id(image_id1: u32, image_id2: u32) -> u64 {
    let (lo, hi) = if image_id1 > image_id2 {
        (image_id2, image_id1)
    } else {
        (image_id1, image_id2)
    };
    lo as u64 * MAX_NUM_IMAGES + hi as u64
}

/// Image ids of a pair id, smallest first.
pub fn image_ids_from_pair_id(pair_id: u64) -> (u32, u32) {
    let hi = pair_id % MAX_NUM_IMAGES;
    let lo = (pair_id - hi) / MAX_NUM_IMAGES;
    (lo as u32, hi as u32)
}

/// Lookup tables produced by [`build_store`], all indexed by image index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreIndex {
    /// Camera id of every image.
    pub camera_ids: Vec<u32>,
    /// Image id of every image.
    pub image_ids: Vec<u32>,
    /// Local keypoint index of every point-set observed in the image.
    pub keypoints: Vec<BTreeMap<PointSetId, u32>>,
    /// Keypoint matches of every image pair `(i, j)` with `i < j`.
    pub matches: BTreeMap<(usize, usize), Vec<[u32; 2]>>,
}

/// Assign the local keypoint indices: dense, in ascending point-set id order.
pub fn keypoint_index(
    num_images: usize,
    observations: &Observations,
) -> Vec<BTreeMap<PointSetId, u32>> {
    let mut keypoints = vec![BTreeMap::new(); num_images];
    for (&id, obs) in observations.iter() {
        for &image_index in obs.keys() {
            if let Some(map) = keypoints.get_mut(image_index) {
                let next = map.len() as u32;
                map.insert(id, next);
            }
        }
    }
    keypoints
}

/// Matches of every image pair sharing at least one point-set.
pub fn pair_matches(
    keypoints: &[BTreeMap<PointSetId, u32>],
) -> BTreeMap<(usize, usize), Vec<[u32; 2]>> {
    let mut matches = BTreeMap::new();
    for i in 0..keypoints.len() {
        for j in (i + 1)..keypoints.len() {
            let shared = keypoints[i]
                .iter()
                .filter_map(|(id, &kp_i)| keypoints[j].get(id).map(|&kp_j| [kp_i, kp_j]))
                .collect::<Vec<_>>();
            if !shared.is_empty() {
                matches.insert((i, j), shared);
            }
        }
    }
    matches
}

fn check_blob(
    table: &'static str,
    rows: usize,
    cols: usize,
    elem_size: usize,
    blob: &[u8],
) -> Result<(), ColmapError> {
    let expected = rows * cols * elem_size;
    if blob.len() != expected {
        return Err(ColmapError::MalformedBlob {
            table,
            expected,
            actual: blob.len(),
        });
    }
    Ok(())
}

fn u32_blob(values: impl IntoIterator<Item = u32>) -> Vec<u8> {
    values.into_iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn f32_blob(values: impl IntoIterator<Item = f32>) -> Vec<u8> {
    values.into_iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Build the correspondence store at `path`, replacing any previous store.
///
/// Camera and image ids are `image index + 1`. Observations are converted from
/// normalized to pixel coordinates with the size of their image. Images without
/// any observation get no keypoint rows.
///
/// # Arguments
///
/// * `path` - Destination of the store.
/// * `images` - Images in image index order.
/// * `observations` - Normalized observations keyed by point-set id.
/// * `encoding` - Numeric width of the camera parameters.
pub fn build_store(
    path: impl AsRef<Path>,
    images: &[ImageEntry],
    observations: &Observations,
    encoding: ParamsEncoding,
) -> Result<StoreIndex, ColmapError> {
    let path = path.as_ref();

    let mut names = Vec::with_capacity(images.len());
    for image in images {
        let name = image
            .file_name()
            .ok_or_else(|| ColmapError::InvalidImagePath(image.path.clone()))?;
        if names.contains(&name) {
            return Err(ColmapError::DuplicateImageName(name.to_string()));
        }
        names.push(name);
    }

    for (&point_set, obs) in observations.iter() {
        if let Some(&index) = obs.keys().find(|&&i| i >= images.len()) {
            return Err(ColmapError::UnknownImageIndex {
                point_set,
                index,
                len: images.len(),
            });
        }
    }

    let keypoints = keypoint_index(images.len(), observations);
    let matches = pair_matches(&keypoints);
    let ids = (1..=images.len() as u32).collect::<Vec<_>>();

    if path.exists() {
        log::debug!("removing previous store {}", path.display());
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;

    for (index, image) in images.iter().enumerate() {
        let camera = SimplePinhole::from_image_size(image.width, image.height);
        let blob = encoding.encode(&camera.params());
        check_blob("cameras", 3, 1, encoding.width(), &blob)?;
        tx.execute(
            "INSERT INTO cameras(camera_id, model, width, height, params, prior_focal_length)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                ids[index],
                CameraModelId::SimplePinhole as i64,
                image.width,
                image.height,
                blob
            ],
        )?;
        tx.execute(
            "INSERT INTO images(image_id, name, camera_id) VALUES (?1, ?2, ?3)",
            params![ids[index], names[index], ids[index]],
        )?;
    }

    for (index, image) in images.iter().enumerate() {
        write_features(&tx, ids[index], index, image, &keypoints[index], observations)?;
    }

    for (&(i, j), rows) in matches.iter() {
        write_matches(&tx, ids[i], ids[j], rows)?;
    }

    tx.commit()?;

    log::info!(
        "built store {} with {} images and {} image pairs",
        path.display(),
        images.len(),
        matches.len()
    );

    Ok(StoreIndex {
        camera_ids: ids.clone(),
        image_ids: ids,
        keypoints,
        matches,
    })
}

fn write_features(
    tx: &Transaction,
    image_id: u32,
    index: usize,
    image: &ImageEntry,
    keypoints: &BTreeMap<PointSetId, u32>,
    observations: &Observations,
) -> Result<(), ColmapError> {
    if keypoints.is_empty() {
        return Ok(());
    }

    // point-set ids ascend, so does the local index
    let rows = keypoints
        .keys()
        .filter_map(|id| observations.get(id)?.get(&index))
        .flat_map(|p| {
            let [x, y] = p.to_pixels(image.width, image.height);
            [x as f32, y as f32, 1.0, 0.0]
        });
    let data = f32_blob(rows);
    check_blob("keypoints", keypoints.len(), KEYPOINT_COLS, 4, &data)?;
    tx.execute(
        "INSERT INTO keypoints(image_id, rows, cols, data) VALUES (?1, ?2, ?3, ?4)",
        params![image_id, keypoints.len() as i64, KEYPOINT_COLS as i64, data],
    )?;

    let descriptors = vec![0u8; keypoints.len() * DESCRIPTOR_DIM];
    tx.execute(
        "INSERT INTO descriptors(image_id, rows, cols, data) VALUES (?1, ?2, ?3, ?4)",
        params![image_id, keypoints.len() as i64, DESCRIPTOR_DIM as i64, descriptors],
    )?;

    log::debug!("image {image_id}: {} keypoints", keypoints.len());
    Ok(())
}

fn write_matches(
    tx: &Transaction,
    image_id1: u32,
    image_id2: u32,
    rows: &[[u32; 2]],
) -> Result<(), ColmapError> {
    // the first column belongs to the smallest image id
    let swapped = image_id1 > image_id2;
    let data = u32_blob(rows.iter().flat_map(|&[a, b]| if swapped { [b, a] } else { [a, b] }));
    check_blob("matches", rows.len(), 2, 4, &data)?;

    let pair = pair_id(image_id1, image_id2) as i64;
    tx.execute(
        "INSERT INTO matches(pair_id, rows, cols, data) VALUES (?1, ?2, 2, ?3)",
        params![pair, rows.len() as i64, data],
    )?;
    tx.execute(
        "INSERT INTO two_view_geometries(pair_id, rows, cols, data, config)
         VALUES (?1, ?2, 2, ?3, ?4)",
        params![pair, rows.len() as i64, data, TWO_VIEW_CALIBRATED],
    )?;

    log::debug!("pair ({image_id1}, {image_id2}): {} matches", rows.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use automodeler_scene::NormalizedPoint;

    #[test]
    fn test_pair_id_symmetric() {
        assert_eq!(pair_id(1, 2), pair_id(2, 1));
        assert_eq!(pair_id(1, 2), MAX_NUM_IMAGES + 2);
        assert_eq!(image_ids_from_pair_id(pair_id(7, 3)), (3, 7));
    }

    #[test]
    fn test_pair_id_injective() {
        let mut seen = std::collections::HashSet::new();
        for a in [0u32, 1, 2, 3, 100, 65_535, 2_147_483_646] {
            for b in [0u32, 1, 2, 3, 100, 65_535, 2_147_483_646] {
                if a <= b {
                    assert!(seen.insert(pair_id(a, b)));
                    assert_eq!(image_ids_from_pair_id(pair_id(a, b)), (a, b));
                }
            }
        }
    }

    #[test]
    fn test_params_encoding() {
        let blob = ParamsEncoding::F64.encode(&[1.5, 2.0, 3.0]);
        assert_eq!(blob.len(), 24);
        assert_eq!(&blob[..8], &1.5f64.to_le_bytes());
        let blob = ParamsEncoding::F32.encode(&[1.5, 2.0, 3.0]);
        assert_eq!(blob.len(), 12);
        assert_eq!(&blob[8..], &3.0f32.to_le_bytes());
    }

    #[test]
    fn test_keypoint_index_and_matches() {
        let p = NormalizedPoint { x: 0.5, y: 0.5 };
        let observations = Observations::from([
            (0, BTreeMap::from([(0, p), (1, p)])),
            (2, BTreeMap::from([(1, p), (2, p)])),
            (5, BTreeMap::from([(0, p), (1, p), (2, p)])),
        ]);
        let keypoints = keypoint_index(3, &observations);
        assert_eq!(keypoints[0], BTreeMap::from([(0, 0), (5, 1)]));
        assert_eq!(keypoints[1], BTreeMap::from([(0, 0), (2, 1), (5, 2)]));
        assert_eq!(keypoints[2], BTreeMap::from([(2, 0), (5, 1)]));

        let matches = pair_matches(&keypoints);
        assert_eq!(matches[&(0, 1)], vec![[0, 0], [1, 2]]);
        assert_eq!(matches[&(0, 2)], vec![[1, 1]]);
        assert_eq!(matches[&(1, 2)], vec![[1, 0], [2, 1]]);
    }

    #[test]
    fn test_check_blob() {
        assert!(check_blob("matches", 2, 2, 4, &[0; 16]).is_ok());
        assert!(matches!(
            check_blob("matches", 2, 2, 4, &[0; 12]),
            Err(ColmapError::MalformedBlob { expected: 16, actual: 12, .. })
        ));
    }
}
