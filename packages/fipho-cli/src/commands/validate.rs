use serde::Serialize;

use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::readers;

#[derive(Debug, Serialize)]
struct ValidationReport {
    file: String,
    signal_samples: usize,
    isosbestic_samples: usize,
    signal_rate_hz: Option<f64>,
    isosbestic_rate_hz: Option<f64>,
    signal_monotonic: bool,
    isosbestic_monotonic: bool,
    valid: bool,
}

fn monotonic(timestamps: &[f64]) -> bool {
    timestamps.windows(2).all(|w| w[1] >= w[0])
}

pub fn execute(args: ValidateArgs) -> i32 {
    let columns = match readers::read_recording_csv(&args.file) {
        Ok(columns) => columns,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let signal_rate = readers::infer_sampling_rate(&columns.signal_ts).ok();
    let isos_rate = readers::infer_sampling_rate(&columns.isos_ts).ok();
    let report = ValidationReport {
        file: args.file.clone(),
        signal_samples: columns.signal.len(),
        isosbestic_samples: columns.isos.len(),
        signal_rate_hz: signal_rate,
        isosbestic_rate_hz: isos_rate,
        signal_monotonic: monotonic(&columns.signal_ts),
        isosbestic_monotonic: monotonic(&columns.isos_ts),
        valid: signal_rate.is_some()
            && isos_rate.is_some()
            && monotonic(&columns.signal_ts)
            && monotonic(&columns.isos_ts)
            && columns.signal.len() == columns.signal_ts.len()
            && columns.isos.len() == columns.isos_ts.len(),
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing report: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else {
        println!("File: {}", report.file);
        println!(
            "Signal: {} samples, rate {}",
            report.signal_samples,
            report
                .signal_rate_hz
                .map(|r| format!("{:.3} Hz", r))
                .unwrap_or_else(|| "unknown".to_string())
        );
        println!(
            "Isosbestic: {} samples, rate {}",
            report.isosbestic_samples,
            report
                .isosbestic_rate_hz
                .map(|r| format!("{:.3} Hz", r))
                .unwrap_or_else(|| "unknown".to_string())
        );
        println!(
            "Timestamps monotonic: signal {}, isosbestic {}",
            report.signal_monotonic, report.isosbestic_monotonic
        );
        println!("Valid: {}", report.valid);
    }

    if report.valid {
        exit_codes::SUCCESS
    } else {
        exit_codes::INPUT_ERROR
    }
}
