use std::path::Path;

use crate::align;
use crate::cli::AlignArgs;
use crate::exit_codes;
use crate::readers;

fn safe_file_name(label: &str) -> String {
    label
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

pub fn execute(args: AlignArgs) -> i32 {
    if args.downsample == 0 {
        eprintln!("Error: --downsample must be at least 1");
        return exit_codes::INPUT_ERROR;
    }
    if args.pre < 0.0 || args.post < 0.0 {
        eprintln!("Error: --pre and --post must be non-negative");
        return exit_codes::INPUT_ERROR;
    }

    let subject_dir = Path::new(&args.subject_dir);
    let data_path = subject_dir.join("data").join("normalised_data.csv");
    let events_path = subject_dir.join("timestamps.csv");

    let rows = match align::read_normalized_csv(&data_path) {
        Ok(rows) => rows,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let events = match readers::read_events_csv(&events_path) {
        Ok(events) => events,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    if events.is_empty() {
        eprintln!("Error: '{}' lists no events", events_path.display());
        return exit_codes::INPUT_ERROR;
    }

    let shortened = align::downsample_mean(&rows, args.downsample);
    if !args.quiet {
        eprintln!(
            "Downsampled {} rows to {} (factor {})",
            rows.len(),
            shortened.len(),
            args.downsample
        );
    }

    let out_dir = subject_dir.join("timestamped_data");
    if let Err(e) = std::fs::create_dir_all(&out_dir) {
        eprintln!("Error: failed to create '{}': {}", out_dir.display(), e);
        return exit_codes::EXECUTION_ERROR;
    }

    for (name, onsets) in align::group_events(&events) {
        let windows: Vec<align::EventWindow> = onsets
            .iter()
            .map(|&onset| align::window_around(&shortened, onset, args.pre, args.post))
            .collect();

        let path = out_dir.join(format!("{}.csv", safe_file_name(&name)));
        if let Err(msg) = align::write_event_csv(&path, &name, &windows) {
            eprintln!("Error: {}", msg);
            return exit_codes::EXECUTION_ERROR;
        }
        if !args.quiet {
            eprintln!(
                "  {}: {} occurrence(s) -> {}",
                name,
                windows.len(),
                path.display()
            );
        }
    }

    exit_codes::SUCCESS
}
