use std::path::Path;

use fipho_rs::types::{SideId, SubjectInfo};
use fipho_rs::{process_session, Pipeline, SessionRecording, SideRecording, SideResult};

use crate::cli::RunArgs;
use crate::exit_codes;
use crate::readers;
use crate::writers;

fn load_side(
    recording_path: Option<&str>,
    events_path: Option<&str>,
    subject: Option<&str>,
    side: SideId,
    args: &RunArgs,
) -> Result<Option<SideRecording>, String> {
    let Some(path) = recording_path else {
        return Ok(None);
    };
    let columns = readers::read_recording_csv(path)?;
    let recording = readers::build_recording(&columns, args.sr_signal, args.sr_isos)?;
    let events = match events_path {
        Some(events_path) => readers::read_events_csv(events_path)?,
        None => Vec::new(),
    };
    let subject_id = subject
        .map(str::to_string)
        .unwrap_or_else(|| readers::subject_from_path(path));

    Ok(Some(SideRecording {
        info: SubjectInfo {
            subject_id,
            brain_region: args.region.clone(),
            sensor: args.sensor.clone(),
            side,
            sampling_rate: recording.signal.sampling_rate,
        },
        recording,
        events,
    }))
}

fn handle_side(
    result: Option<&SideResult>,
    side: Option<&SideRecording>,
    output_root: &Path,
    treatment: &str,
    quiet: bool,
    succeeded: &mut usize,
    failed: &mut usize,
) {
    let (Some(result), Some(side)) = (result, side) else {
        return;
    };
    match result {
        Ok(side_output) => {
            match writers::write_side_outputs(output_root, treatment, side_output, &side.recording)
            {
                Ok(subject_dir) => {
                    if !quiet {
                        eprintln!(
                            "  side {} (subject {}): r^2 {:.3}, written to {}",
                            side_output.info.side,
                            side_output.info.subject_id,
                            side_output.output.motion_corrected.regression.r_squared(),
                            subject_dir.display()
                        );
                    }
                    *succeeded += 1;
                }
                Err(msg) => {
                    eprintln!("  Error writing outputs: {}", msg);
                    *failed += 1;
                }
            }
        }
        Err(err) => {
            eprintln!("  Error: {}", err);
            *failed += 1;
        }
    }
}

pub fn execute(args: RunArgs) -> i32 {
    if args.recording_a.is_none() && args.recording_b.is_none() {
        eprintln!("Error: at least one of --recording-a or --recording-b is required");
        return exit_codes::INPUT_ERROR;
    }

    let config = args.pipeline.to_config();
    if let Err(e) = Pipeline::new(config.clone()) {
        eprintln!("Error: {}", e);
        return exit_codes::INPUT_ERROR;
    }

    let side_a = match load_side(
        args.recording_a.as_deref(),
        args.events_a.as_deref(),
        args.subject_a.as_deref(),
        SideId::A,
        &args,
    ) {
        Ok(side) => side,
        Err(msg) => {
            eprintln!("Error: side A: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let side_b = match load_side(
        args.recording_b.as_deref(),
        args.events_b.as_deref(),
        args.subject_b.as_deref(),
        SideId::B,
        &args,
    ) {
        Ok(side) => side,
        Err(msg) => {
            eprintln!("Error: side B: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let session = SessionRecording {
        treatment: args.treatment.clone(),
        side_a,
        side_b,
    };

    if !args.quiet {
        eprintln!("Processing treatment '{}'...", session.treatment);
        for side in session.side_a.iter().chain(session.side_b.iter()) {
            eprintln!(
                "  side {} (subject {}): signal {} samples @ {:.2} Hz",
                side.info.side,
                side.info.subject_id,
                side.recording.signal.len(),
                side.recording.signal.sampling_rate
            );
        }
    }

    let outcome = process_session(&config, &session);

    let output_root = Path::new(&args.output_dir);
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    handle_side(
        outcome.side_a.as_ref(),
        session.side_a.as_ref(),
        output_root,
        &session.treatment,
        args.quiet,
        &mut succeeded,
        &mut failed,
    );
    handle_side(
        outcome.side_b.as_ref(),
        session.side_b.as_ref(),
        output_root,
        &session.treatment,
        args.quiet,
        &mut succeeded,
        &mut failed,
    );

    if failed == 0 {
        exit_codes::SUCCESS
    } else if succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}
