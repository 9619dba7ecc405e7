//! Tests that run the `knee` binary.

use std::path::Path;
use std::process::Command;

const FEMUR_DECK: &str = "\
*NODE
1, -12.5, 0.0, 0.0
2, -5.0, 0.0, 0.0
3, -5.0, 30.0, 0.0
4, -12.5, 30.0, 0.0
5, -12.5, 0.0, 20.0
6, -5.0, 0.0, 20.0
7, -5.0, 30.0, 20.0
8, -12.5, 30.0, 20.0
9, 5.0, 0.0, 0.0
10, 12.5, 0.0, 0.0
11, 12.5, 30.0, 0.0
12, 5.0, 30.0, 0.0
13, 5.0, 0.0, 20.0
14, 12.5, 0.0, 20.0
15, 12.5, 30.0, 20.0
16, 5.0, 30.0, 20.0
*ELEMENT, TYPE=C3D8R, ELSET=FEMUR
1, 1, 2, 3, 4, 5, 6, 7, 8
2, 9, 10, 11, 12, 13, 14, 15, 16
";

fn knee(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_knee"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run knee")
}

fn write_femur(dir: &Path) -> String {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("BONE2-FEMUR.inp");
    std::fs::write(&path, FEMUR_DECK).unwrap();
    path.display().to_string()
}

#[test]
fn test_inspect_json() {
    let dir = tempfile::tempdir().unwrap();
    let femur = write_femur(dir.path());

    let out = knee(&["--format", "json", "inspect", &femur]);
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["region"], "femur");
    assert_eq!(json["points"], 16);
    assert_eq!(json["cells"], 2);
    assert_eq!(json["surface_faces"], 24);
}

#[test]
fn test_gap_json() {
    let dir = tempfile::tempdir().unwrap();
    let femur = write_femur(dir.path());

    let out = knee(&["gap", &femur, "--format", "json"]);
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let distance = json["distance"].as_f64().unwrap();
    assert!((distance - 10.0).abs() < 1e-6);
    assert_eq!(json["query"], "first_point");
}

#[test]
fn test_features_writes_default_output() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("data");
    write_femur(&root.join("raw/set_1/P001"));
    let table = dir.path().join("clinical.csv");
    std::fs::write(&table, "Code,Age\nP001,63\nP002,70\n").unwrap();

    let out = knee(&[
        "-q",
        "features",
        "--table",
        table.to_str().unwrap(),
        "--data-root",
        root.to_str().unwrap(),
        "--preview",
    ]);
    assert!(out.status.success());

    let written = std::fs::read_to_string(root.join("processed/set_1/out.csv")).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Code,Age,tib_med_curv,tib_lat_curv,tib_med_ishealthy,tib_lat_ishealthy,\
         femur_gap_dist,femur_left_gap_p,femur_right_gap_p"
    );
    assert!(lines.next().unwrap().starts_with("P001,63,,,,,"));
    assert_eq!(lines.next().unwrap(), "P002,70,,,,,,,");
}

#[test]
fn test_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = knee(&["gap", dir.path().join("nope.inp").to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Error"));
}
