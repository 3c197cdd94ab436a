//! End-to-end CLI tests on synthetic recording CSVs.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

/// 300 s two-channel recording at 20 Hz with a bleaching trend and a
/// shared slow oscillation (motion proxy).
fn write_recording_csv(path: &Path) {
    let sample_rate = 20.0;
    let n = 6000;
    let mut content = String::from("signal,signal_ts,isos,isos_ts\n");
    for i in 0..n {
        let t = i as f64 / sample_rate;
        let signal = 30.0 * (-t / 2000.0).exp() + 2.0 * (0.5 * t).sin();
        let isos = 12.0 * (-t / 1800.0).exp() + 0.5 * (0.5 * t).sin();
        content.push_str(&format!("{},{},{},{}\n", signal, t, isos, t));
    }
    fs::write(path, content).unwrap();
}

fn write_events_csv(path: &Path) {
    fs::write(
        path,
        "ts,notes,index\n60.0,lever,1\n150.0,lever,1\n220.0,reward,2\n",
    )
    .unwrap();
}

fn fipho() -> Command {
    Command::cargo_bin("fipho").unwrap()
}

#[test]
fn test_run_exports_output_tree() {
    let tmp = tempfile::tempdir().unwrap();
    let recording = tmp.path().join("m42.csv");
    let events = tmp.path().join("events.csv");
    let out = tmp.path().join("out");
    write_recording_csv(&recording);
    write_events_csv(&events);

    fipho()
        .args([
            "run",
            "--recording-a",
            recording.to_str().unwrap(),
            "--events-a",
            events.to_str().unwrap(),
            "--subject-a",
            "m42",
            "--treatment",
            "saline",
            "--output-dir",
            out.to_str().unwrap(),
            "--quiet",
        ])
        .assert()
        .success();

    let subject_dir = out.join("saline").join("m42");
    for file in [
        "data/raw_data.csv",
        "data/filtered_data.csv",
        "data/detrended_data.csv",
        "data/motion_corrected_data.csv",
        "data/normalised_data.csv",
        "timestamps.csv",
        "info.csv",
        "fit.json",
    ] {
        assert!(subject_dir.join(file).exists(), "missing {}", file);
    }

    // Downstream contract: exact column names on the normalized export.
    let normalised = fs::read_to_string(subject_dir.join("data/normalised_data.csv")).unwrap();
    assert!(normalised.starts_with("time,dF_F,zscore"));

    let fit: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(subject_dir.join("fit.json")).unwrap()).unwrap();
    assert!(fit["signal_params"]["tau_slow"].as_f64().unwrap() >= 600.0);
    assert!(fit["r_squared"].as_f64().unwrap() <= 1.0);
}

#[test]
fn test_run_requires_a_recording() {
    let tmp = tempfile::tempdir().unwrap();
    fipho()
        .args(["run", "--output-dir", tmp.path().to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--recording-a"));
}

#[test]
fn test_run_surfaces_side_and_subject_on_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let recording = tmp.path().join("short.csv");
    // Far too short for the zero-phase filter.
    fs::write(
        &recording,
        "signal,signal_ts,isos,isos_ts\n1,0.0,1,0.0\n2,0.01,2,0.01\n3,0.02,3,0.02\n",
    )
    .unwrap();

    fipho()
        .args([
            "run",
            "--recording-a",
            recording.to_str().unwrap(),
            "--subject-a",
            "m7",
            "--output-dir",
            tmp.path().join("out").to_str().unwrap(),
            "--quiet",
        ])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("side A").and(predicate::str::contains("m7")));
}

#[test]
fn test_validate_good_recording() {
    let tmp = tempfile::tempdir().unwrap();
    let recording = tmp.path().join("rec.csv");
    write_recording_csv(&recording);

    fipho()
        .args(["validate", "--file", recording.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Valid: true"));

    fipho()
        .args(["validate", "--file", recording.to_str().unwrap(), "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\": true"));
}

#[test]
fn test_validate_missing_column() {
    let tmp = tempfile::tempdir().unwrap();
    let recording = tmp.path().join("bad.csv");
    fs::write(&recording, "signal,signal_ts\n1.0,0.0\n").unwrap();

    fipho()
        .args(["validate", "--file", recording.to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("isos"));
}

#[test]
fn test_align_exports_event_windows() {
    let tmp = tempfile::tempdir().unwrap();
    let recording = tmp.path().join("m42.csv");
    let events = tmp.path().join("events.csv");
    let out = tmp.path().join("out");
    write_recording_csv(&recording);
    write_events_csv(&events);

    fipho()
        .args([
            "run",
            "--recording-a",
            recording.to_str().unwrap(),
            "--events-a",
            events.to_str().unwrap(),
            "--subject-a",
            "m42",
            "--treatment",
            "saline",
            "--output-dir",
            out.to_str().unwrap(),
            "--quiet",
        ])
        .assert()
        .success();

    let subject_dir = out.join("saline").join("m42");
    fipho()
        .args([
            "align",
            "--subject-dir",
            subject_dir.to_str().unwrap(),
            "--quiet",
        ])
        .assert()
        .success();

    let lever = fs::read_to_string(subject_dir.join("timestamped_data/lever.csv")).unwrap();
    let header = lever.lines().next().unwrap();
    assert_eq!(
        header,
        "time,lever_0_dF_F,lever_0_zscore,lever_1_dF_F,lever_1_zscore"
    );
    assert!(subject_dir.join("timestamped_data/reward.csv").exists());

    // Window times are re-zeroed to event onset: first row near -20 s.
    let first_row = lever.lines().nth(1).unwrap();
    let first_time: f64 = first_row.split(',').next().unwrap().parse().unwrap();
    assert!(first_time >= -20.0 && first_time < 0.0, "t0 {}", first_time);
}

#[test]
fn test_batch_manifest_dry_run_and_run() {
    let tmp = tempfile::tempdir().unwrap();
    let recording = tmp.path().join("m42.csv");
    write_recording_csv(&recording);

    let manifest = tmp.path().join("sessions.json");
    fs::write(
        &manifest,
        r#"{
  "sessions": [
    {
      "treatment": "saline",
      "side_a": { "recording": "m42.csv", "subject_id": "m42", "region": "NAc", "sensor": "GRAB-DA" }
    }
  ]
}"#,
    )
    .unwrap();

    fipho()
        .args([
            "batch",
            "--manifest",
            manifest.to_str().unwrap(),
            "--output-dir",
            tmp.path().join("out").to_str().unwrap(),
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("saline: m42"));

    fipho()
        .args([
            "batch",
            "--manifest",
            manifest.to_str().unwrap(),
            "--output-dir",
            tmp.path().join("out").to_str().unwrap(),
            "--quiet",
        ])
        .assert()
        .success();

    assert!(tmp
        .path()
        .join("out/saline/m42/data/normalised_data.csv")
        .exists());
}

#[test]
fn test_batch_continue_on_error_reports_partial_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let good = tmp.path().join("good.csv");
    write_recording_csv(&good);
    let manifest = tmp.path().join("sessions.json");
    fs::write(
        &manifest,
        r#"{
  "sessions": [
    { "treatment": "a", "side_a": { "recording": "missing.csv" } },
    { "treatment": "b", "side_a": { "recording": "good.csv", "subject_id": "m1" } }
  ]
}"#,
    )
    .unwrap();

    fipho()
        .args([
            "batch",
            "--manifest",
            manifest.to_str().unwrap(),
            "--output-dir",
            tmp.path().join("out").to_str().unwrap(),
            "--continue-on-error",
            "--quiet",
        ])
        .assert()
        .code(4);

    assert!(tmp.path().join("out/b/m1/data/raw_data.csv").exists());
}
