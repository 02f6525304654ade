use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::error::ColmapError;
use crate::types::{CameraModelId, ColmapCamera, ColmapImage, ColmapPoint3d, SparseModel};

/// Cameras listing of a text model.
pub const CAMERAS_TXT: &str = "cameras.txt";

/// Images listing of a text model.
pub const IMAGES_TXT: &str = "images.txt";

/// Points listing of a text model.
pub const POINTS3D_TXT: &str = "points3D.txt";

/// Non-empty lines that are not `#` comments.
fn content_lines(reader: impl BufRead) -> impl Iterator<Item = std::io::Result<String>> {
    reader.lines().filter(|line| match line {
        Ok(line) => {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        }
        Err(_) => true,
    })
}

/// Read the cameras.txt file and return a vector of ColmapCamera structs.
///
/// # Arguments
///
/// * `path` - The path to the cameras.txt file.
pub fn read_cameras_txt(path: impl AsRef<Path>) -> Result<Vec<ColmapCamera>, ColmapError> {
    parse_cameras(BufReader::new(File::open(path)?))
}

/// Parse a cameras listing.
pub fn parse_cameras(reader: impl BufRead) -> Result<Vec<ColmapCamera>, ColmapError> {
    content_lines(reader)
        .map(|line| parse_camera_line(&line?))
        .collect()
}

/// Read the points3D.txt file and return a vector of ColmapPoint3d structs.
///
/// # Arguments
///
/// * `path` - The path to the points3D.txt file.
pub fn read_points3d_txt(path: impl AsRef<Path>) -> Result<Vec<ColmapPoint3d>, ColmapError> {
    parse_points3d(BufReader::new(File::open(path)?))
}

/// Parse a points listing.
pub fn parse_points3d(reader: impl BufRead) -> Result<Vec<ColmapPoint3d>, ColmapError> {
    content_lines(reader)
        .map(|line| parse_point3d_line(&line?))
        .collect()
}

/// Read the images.txt file and return a vector of ColmapImage structs.
///
/// # Arguments
///
/// * `path` - The path to the images.txt file.
pub fn read_images_txt(path: impl AsRef<Path>) -> Result<Vec<ColmapImage>, ColmapError> {
    parse_images(BufReader::new(File::open(path)?))
}

/// Parse an images listing.
///
/// COLMAP writes two lines per image, the second one holding the 2D points and
/// being empty when the image has none. Listings with the image lines alone are
/// accepted too.
pub fn parse_images(reader: impl BufRead) -> Result<Vec<ColmapImage>, ColmapError> {
    let mut images: Vec<ColmapImage> = Vec::new();
    let mut expect_points = false;

    for line in content_lines(reader) {
        let line = line?;
        let parts = line.split_whitespace().collect::<Vec<_>>();

        if expect_points && is_points2d_line(&parts) {
            if let Some(image) = images.last_mut() {
                image.points2d = parse_points2d(&parts)?;
            }
            expect_points = false;
            continue;
        }

        images.push(parse_image_line(&parts)?);
        expect_points = true;
    }

    Ok(images)
}

/// Read a whole text model directory. `points3D.txt` is optional.
pub fn read_model(dir: impl AsRef<Path>) -> Result<SparseModel, ColmapError> {
    let dir = dir.as_ref();
    let cameras = read_cameras_txt(dir.join(CAMERAS_TXT))?
        .into_iter()
        .map(|camera| (camera.camera_id, camera))
        .collect::<BTreeMap<_, _>>();
    let images = read_images_txt(dir.join(IMAGES_TXT))?;

    let points_path = dir.join(POINTS3D_TXT);
    let points3d = if points_path.is_file() {
        read_points3d_txt(points_path)?
    } else {
        Vec::new()
    };

    log::debug!(
        "read model {}: {} cameras, {} images, {} points",
        dir.display(),
        cameras.len(),
        images.len(),
        points3d.len()
    );

    Ok(SparseModel {
        path: dir.to_path_buf(),
        cameras,
        images,
        points3d,
    })
}

/// Utility functions for parsing COLMAP text files
fn parse_part<T: std::str::FromStr>(s: &str) -> Result<T, ColmapError>
where
    T::Err: std::fmt::Display,
{
    s.parse::<T>()
        .map_err(|e| ColmapError::ParseError(format!("{}: {}", s, e)))
}

fn parse_array<T, const N: usize>(parts: &[&str], what: &str) -> Result<[T; N], ColmapError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    parts
        .iter()
        .map(|s| parse_part(s))
        .collect::<Result<Vec<T>, _>>()?
        .try_into()
        .map_err(|_| ColmapError::ParseError(format!("Invalid number of {what}")))
}

fn check_num_parts(parts: &[&str], min: usize) -> Result<(), ColmapError> {
    if parts.len() < min {
        return Err(ColmapError::ParseError(format!(
            "Invalid number of parts: {}",
            parts.len()
        )));
    }
    Ok(())
}

/// Parse a camera line and return a ColmapCamera struct.
/// NOTE: The number of parameters depends on the camera model.
///       CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[0], PARAMS[1], ...
fn parse_camera_line(line: &str) -> Result<ColmapCamera, ColmapError> {
    let parts = line.split_whitespace().collect::<Vec<_>>();
    check_num_parts(&parts, 5)?;

    Ok(ColmapCamera {
        camera_id: parse_part(parts[0])?,
        model_id: CameraModelId::parse(parts[1])?,
        width: parse_part(parts[2])?,
        height: parse_part(parts[3])?,
        params: parts[4..]
            .iter()
            .map(|s| parse_part(s))
            .collect::<Result<Vec<_>, _>>()?,
    })
}

/// Parse a point3d line and return a ColmapPoint3d struct.
///       POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)
fn parse_point3d_line(line: &str) -> Result<ColmapPoint3d, ColmapError> {
    let parts = line.split_whitespace().collect::<Vec<_>>();
    check_num_parts(&parts, 8)?;

    Ok(ColmapPoint3d {
        point3d_id: parse_part(parts[0])?,
        xyz: parse_array(&parts[1..4], "xyz coordinates")?,
        rgb: parse_array(&parts[4..7], "rgb coordinates")?,
        error: parse_part(parts[7])?,
        track: parts[8..]
            .chunks_exact(2)
            .map(|chunk| -> Result<(u32, u32), ColmapError> {
                Ok((parse_part(chunk[0])?, parse_part(chunk[1])?))
            })
            .collect::<Result<Vec<_>, _>>()?,
    })
}

/// Parse an image line and return a ColmapImage struct without its 2D points.
///       IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME
fn parse_image_line(parts: &[&str]) -> Result<ColmapImage, ColmapError> {
    check_num_parts(parts, 10)?;

    Ok(ColmapImage {
        image_id: parse_part(parts[0])?,
        rotation: parse_array(&parts[1..5], "rotation coordinates")?,
        translation: parse_array(&parts[5..8], "translation coordinates")?,
        camera_id: parse_part(parts[8])?,
        // names may contain spaces
        name: parts[9..].join(" "),
        points2d: Vec::new(),
    })
}

/// POINTS2D[] as (X, Y, POINT3D_ID)
fn is_points2d_line(parts: &[&str]) -> bool {
    parts.len() % 3 == 0 && parts.iter().all(|s| s.parse::<f64>().is_ok())
}

fn parse_points2d(parts: &[&str]) -> Result<Vec<(f64, f64, i64)>, ColmapError> {
    parts
        .chunks_exact(3)
        .map(|chunk| -> Result<(f64, f64, i64), ColmapError> {
            Ok((
                parse_part(chunk[0])?,
                parse_part(chunk[1])?,
                parse_part(chunk[2])?,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMERAS: &str = "\
# Camera list with one line of data per camera:
#   CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[]
# Number of cameras: 2

1 SIMPLE_PINHOLE 640 480 768 320 240
2 1 800 600 900 910 400 300
";

    const IMAGES_TWO_LINES: &str = "\
# Image list with two lines of data per image:
#   IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME
#   POINTS2D[] as (X, Y, POINT3D_ID)
# Number of images: 2, mean observations per image: 1.5
1 1 0 0 0 0 0 0 1 front view.jpg
100.5 200.25 7 10 20 -1
2 0.9 0.1 0.2 0.3 1.5 -2 3 2 side.jpg

";

    #[test]
    fn test_parse_cameras() -> Result<(), ColmapError> {
        let cameras = parse_cameras(CAMERAS.as_bytes())?;
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].model_id, CameraModelId::SimplePinhole);
        assert_eq!(cameras[0].params, vec![768.0, 320.0, 240.0]);
        assert_eq!(cameras[1].model_id, CameraModelId::Pinhole);
        assert_eq!((cameras[1].width, cameras[1].height), (800, 600));
        Ok(())
    }

    #[test]
    fn test_parse_images_two_lines() -> Result<(), ColmapError> {
        let images = parse_images(IMAGES_TWO_LINES.as_bytes())?;
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].name, "front view.jpg");
        assert_eq!(images[0].points2d, vec![(100.5, 200.25, 7), (10.0, 20.0, -1)]);
        assert_eq!(images[1].image_id, 2);
        assert_eq!(images[1].rotation, [0.9, 0.1, 0.2, 0.3]);
        assert_eq!(images[1].translation, [1.5, -2.0, 3.0]);
        assert!(images[1].points2d.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_images_one_line() -> Result<(), ColmapError> {
        let listing = "1 1 0 0 0 0 0 0 1 a.jpg\n2 1 0 0 0 1 0 0 2 b.jpg\n3 1 0 0 0 2 0 0 3 c.jpg\n";
        let images = parse_images(listing.as_bytes())?;
        let names = images.iter().map(|i| i.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_cameras("1 SIMPLE_PINHOLE 640 480".as_bytes()).is_err());
        assert!(parse_cameras("1 NOT_A_MODEL 640 480 1 2 3".as_bytes()).is_err());
        assert!(parse_images("1 1 0 0 0 0 0 0 a.jpg".as_bytes()).is_err());
        assert!(parse_images("x 1 0 0 0 0 0 0 1 a.jpg".as_bytes()).is_err());
        assert!(parse_points3d("1 0 0 0 255 255".as_bytes()).is_err());
    }

    #[test]
    fn test_parse_points3d() -> Result<(), ColmapError> {
        let listing = "# 3D point list\n1 0.5 -1 4 255 128 0 0.25 1 0 2 0\n2 1 1 1 0 0 0 0.1\n";
        let points = parse_points3d(listing.as_bytes())?;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].xyz, [0.5, -1.0, 4.0]);
        assert_eq!(points[0].rgb, [255, 128, 0]);
        assert_eq!(points[0].track, vec![(1, 0), (2, 0)]);
        assert!(points[1].track.is_empty());
        Ok(())
    }
}
