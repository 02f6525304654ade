use argh::FromArgs;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use automodeler::{
    calibrate,
    colmap::ColmapCli,
    scene::{load_scene, save_scene, verify_manifest, ImageEntry},
    store_errors, CalibrationConfig,
};

#[derive(FromArgs)]
/// Calibrate the cameras of a scene archive with COLMAP
struct Args {
    /// path to the scene archive
    #[argh(option, short = 's')]
    scene: PathBuf,

    /// path to a JSON calibration config
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// path to the colmap executable
    #[argh(option, default = "PathBuf::from(\"colmap\")")]
    colmap: PathBuf,

    /// kill the engine after this many seconds
    #[argh(option, short = 't')]
    timeout: Option<u64>,

    /// directory receiving the colmap_work directory, kept after the run
    #[argh(option, short = 'w')]
    workdir: Option<PathBuf>,

    /// write the reprojection errors back into the scene archive
    #[argh(switch)]
    save: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => serde_json::from_slice::<CalibrationConfig>(&std::fs::read(path)?)?,
        None => CalibrationConfig::default(),
    };
    if args.workdir.is_some() {
        config.workdir = args.workdir.clone();
    }

    let mismatches = verify_manifest(&args.scene)?;
    if !mismatches.is_empty() {
        log::warn!("entries changed since the last save: {mismatches:?}");
    }

    let mut loaded = load_scene(&args.scene)?;

    // images missing on this machine are restored next to the archive
    let restore_dir = args.scene.with_extension("images");
    let paths = loaded.materialize_images(&restore_dir)?;
    let images = paths
        .iter()
        .map(ImageEntry::probe)
        .collect::<Result<Vec<_>, _>>()?;

    // stop the engine on Ctrl-C
    let cancel_token = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let cancel_token = cancel_token.clone();
        move || {
            println!("Received Ctrl-C signal. Sending cancel signal !!");
            cancel_token.store(true, Ordering::SeqCst);
        }
    })?;

    let mut engine = ColmapCli::new(&args.colmap).with_cancel_token(cancel_token);
    if let Some(seconds) = args.timeout {
        engine = engine.with_timeout(Duration::from_secs(seconds));
    }

    let observations = loaded.scene.normalized_observations();
    let calibration = calibrate(&images, &observations, &engine, &config)?;
    let report = calibration.reprojection(&images, &observations);

    println!("{}", calibration.summary(&report));
    for (index, image) in images.iter().enumerate() {
        let status = match report.per_image.get(&index) {
            Some(error) if error.is_finite() => format!("{error:.3} px"),
            Some(_) => "registered, no scored point".to_string(),
            None => "not registered".to_string(),
        };
        println!("  {}: {status}", image.path.display());
    }
    for point_set in loaded.scene.point_sets() {
        let error = report.point_sets.get(&point_set.id).map(|r| r.error);
        match error {
            Some(error) if error.is_finite() => println!("  {}: {error:.3} px", point_set.name),
            _ => println!("  {}: undetermined", point_set.name),
        }
    }

    if args.save {
        store_errors(&mut loaded.scene, &report);
        save_scene(&args.scene, &loaded.scene)?;
        log::info!("saved the errors into {}", args.scene.display());
    }

    Ok(())
}
