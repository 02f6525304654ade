#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use automodeler_colmap::{
    best_model, ColmapCli, ColmapError, MapperOptions, ReconstructionEngine, Workspace,
};

// scripts are written and spawned one test at a time
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-colmap");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn failing_engine_reports_log_tail() -> Result<(), ColmapError> {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let tmp = tempfile::tempdir()?;
    let script = write_script(tmp.path(), "echo \"no good initial pair\" >&2\nexit 3");
    let workspace = Workspace::prepare(tmp.path().join("work"), &[])?;

    let result = ColmapCli::new(script).run_reconstruction(&workspace, &MapperOptions::default());
    match result {
        Err(ColmapError::EngineFailed {
            command, log_tail, ..
        }) => {
            assert_eq!(command, "mapper");
            assert!(log_tail.contains("no good initial pair"));
        }
        other => panic!("unexpected result {other:?}"),
    }
    Ok(())
}

#[test]
fn slow_engine_times_out() -> Result<(), ColmapError> {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let tmp = tempfile::tempdir()?;
    let script = write_script(tmp.path(), "sleep 10");
    let workspace = Workspace::prepare(tmp.path().join("work"), &[])?;

    let engine = ColmapCli::new(script).with_timeout(Duration::from_millis(200));
    let start = std::time::Instant::now();
    let result = engine.run_reconstruction(&workspace, &MapperOptions::default());
    assert!(matches!(result, Err(ColmapError::Timeout { .. })));
    assert!(start.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[test]
fn mapper_then_model_converter() -> Result<(), ColmapError> {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let tmp = tempfile::tempdir()?;
    let calls = tmp.path().join("calls.txt");
    // mapper writes two models, model_converter leaves the listings in place
    let body = format!(
        r#"echo "$@" >> {calls}
if [ "$1" = "mapper" ]; then
  for m in 0 1; do
    mkdir -p "$7/$m"
    echo "1 SIMPLE_PINHOLE 640 480 768 320 240" > "$7/$m/cameras.txt"
    echo "2 SIMPLE_PINHOLE 640 480 768 320 240" >> "$7/$m/cameras.txt"
    echo "1 1 0 0 0 0 0 0 1 a.jpg" > "$7/$m/images.txt"
  done
  echo "2 1 0 0 0 1 0 0 2 b.jpg" >> "$7/1/images.txt"
fi"#,
        calls = calls.display()
    );
    let script = write_script(tmp.path(), &body);
    let workspace = Workspace::prepare(tmp.path().join("work"), &[])?;

    let engine = ColmapCli::new(script);
    engine.run_reconstruction(&workspace, &MapperOptions::default())?;

    let calls = std::fs::read_to_string(calls)?;
    let lines = calls.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("mapper --database_path"));
    assert!(lines[0].contains("--Mapper.abs_pose_max_error 24"));
    assert!(lines[1].starts_with("model_converter --input_path"));
    assert!(lines[1].ends_with("--output_type TXT"));

    let models = engine.read_models(&workspace)?;
    assert_eq!(models.len(), 2);
    let best = best_model(&models).unwrap();
    assert_eq!(best.num_registered(), 2);
    assert!(best.path.ends_with("1"));
    assert!(best.points3d.is_empty());
    Ok(())
}
