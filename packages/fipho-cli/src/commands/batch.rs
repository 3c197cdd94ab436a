use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Deserialize;

use fipho_rs::types::{SideId, SubjectInfo};
use fipho_rs::{process_session, Pipeline, SessionRecording, SideRecording};

use crate::cli::BatchArgs;
use crate::exit_codes;
use crate::readers;
use crate::writers;

/// JSON session manifest: the treatments, subjects and file paths of a
/// whole experiment.
#[derive(Debug, Deserialize)]
struct Manifest {
    sessions: Vec<ManifestSession>,
}

#[derive(Debug, Deserialize)]
struct ManifestSession {
    treatment: String,
    #[serde(default)]
    side_a: Option<ManifestSide>,
    #[serde(default)]
    side_b: Option<ManifestSide>,
}

#[derive(Debug, Deserialize)]
struct ManifestSide {
    /// Recording CSV path, relative to the manifest file
    recording: String,
    /// Events CSV path, relative to the manifest file
    #[serde(default)]
    events: Option<String>,
    #[serde(default)]
    subject_id: Option<String>,
    #[serde(default = "default_label")]
    region: String,
    #[serde(default = "default_label")]
    sensor: String,
    #[serde(default)]
    sr_signal: Option<f64>,
    #[serde(default)]
    sr_isos: Option<f64>,
}

fn default_label() -> String {
    "unknown".to_string()
}

fn read_manifest(path: &str) -> Result<(Manifest, PathBuf), String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read manifest '{}': {}", path, e))?;
    let manifest: Manifest = serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse manifest '{}': {}", path, e))?;
    let base = Path::new(path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((manifest, base))
}

fn resolve(base: &Path, path: &str) -> String {
    let p = Path::new(path);
    if p.is_absolute() {
        path.to_string()
    } else {
        base.join(p).to_string_lossy().to_string()
    }
}

fn load_manifest_side(
    base: &Path,
    side: &ManifestSide,
    id: SideId,
) -> Result<SideRecording, String> {
    let recording_path = resolve(base, &side.recording);
    let columns = readers::read_recording_csv(&recording_path)?;
    let recording = readers::build_recording(&columns, side.sr_signal, side.sr_isos)?;
    let events = match &side.events {
        Some(events_path) => readers::read_events_csv(resolve(base, events_path))?,
        None => Vec::new(),
    };
    let subject_id = side
        .subject_id
        .clone()
        .unwrap_or_else(|| readers::subject_from_path(&recording_path));

    Ok(SideRecording {
        info: SubjectInfo {
            subject_id,
            brain_region: side.region.clone(),
            sensor: side.sensor.clone(),
            side: id,
            sampling_rate: recording.signal.sampling_rate,
        },
        recording,
        events,
    })
}

pub fn execute(args: BatchArgs) -> i32 {
    let (manifest, base) = match read_manifest(&args.manifest) {
        Ok(m) => m,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if manifest.sessions.is_empty() {
        eprintln!("Error: manifest lists no sessions");
        return exit_codes::INPUT_ERROR;
    }

    if args.dry_run {
        for session in &manifest.sessions {
            let subjects: Vec<String> = [session.side_a.as_ref(), session.side_b.as_ref()]
                .iter()
                .flatten()
                .map(|s| {
                    s.subject_id
                        .clone()
                        .unwrap_or_else(|| readers::subject_from_path(&s.recording))
                })
                .collect();
            println!("{}: {}", session.treatment, subjects.join(", "));
        }
        if !args.quiet {
            eprintln!("Found {} session(s)", manifest.sessions.len());
        }
        return exit_codes::SUCCESS;
    }

    let config = args.pipeline.to_config();
    if let Err(e) = Pipeline::new(config.clone()) {
        eprintln!("Error: {}", e);
        return exit_codes::INPUT_ERROR;
    }

    let output_root = Path::new(&args.output_dir);
    if let Err(e) = std::fs::create_dir_all(output_root) {
        eprintln!(
            "Error: failed to create output directory '{}': {}",
            args.output_dir, e
        );
        return exit_codes::EXECUTION_ERROR;
    }

    let total = manifest.sessions.len();
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let start_time = Instant::now();

    'sessions: for (i, entry) in manifest.sessions.iter().enumerate() {
        if !args.quiet {
            eprintln!("[{}/{}] {}...", i + 1, total, entry.treatment);
        }

        let mut sides = [None, None];
        for (slot, (manifest_side, id)) in [
            (entry.side_a.as_ref(), SideId::A),
            (entry.side_b.as_ref(), SideId::B),
        ]
        .into_iter()
        .enumerate()
        {
            if let Some(manifest_side) = manifest_side {
                match load_manifest_side(&base, manifest_side, id) {
                    Ok(side) => sides[slot] = Some(side),
                    Err(msg) => {
                        eprintln!("  Error loading side {}: {}", id, msg);
                        failed += 1;
                        if !args.continue_on_error {
                            break 'sessions;
                        }
                    }
                }
            }
        }
        let [side_a, side_b] = sides;
        if side_a.is_none() && side_b.is_none() {
            continue;
        }

        let session = SessionRecording {
            treatment: entry.treatment.clone(),
            side_a,
            side_b,
        };
        let outcome = process_session(&config, &session);

        for (result, input) in [
            (outcome.side_a.as_ref(), session.side_a.as_ref()),
            (outcome.side_b.as_ref(), session.side_b.as_ref()),
        ] {
            let (Some(result), Some(input)) = (result, input) else {
                continue;
            };
            match result {
                Ok(side_output) => {
                    match writers::write_side_outputs(
                        output_root,
                        &session.treatment,
                        side_output,
                        &input.recording,
                    ) {
                        Ok(_) => {
                            if !args.quiet {
                                eprintln!(
                                    "  side {} (subject {}) exported",
                                    side_output.info.side, side_output.info.subject_id
                                );
                            }
                            succeeded += 1;
                        }
                        Err(msg) => {
                            eprintln!("  Error writing outputs: {}", msg);
                            failed += 1;
                            if !args.continue_on_error {
                                break 'sessions;
                            }
                        }
                    }
                }
                Err(err) => {
                    eprintln!("  Error: {}", err);
                    failed += 1;
                    if !args.continue_on_error {
                        break 'sessions;
                    }
                }
            }
        }
    }

    let elapsed = start_time.elapsed();
    if !args.quiet {
        eprintln!(
            "Batch complete: {} side(s) succeeded, {} failed, {:.1}s",
            succeeded,
            failed,
            elapsed.as_secs_f64()
        );
    }

    if failed == 0 {
        exit_codes::SUCCESS
    } else if succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}
