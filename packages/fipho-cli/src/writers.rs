//! Per-subject output tree.
//!
//! Mirrors the layout downstream tooling expects:
//!
//! ```text
//! <out>/<treatment>/<subject>/
//!   info.csv
//!   timestamps.csv
//!   fit.json
//!   data/
//!     raw_data.csv
//!     filtered_data.csv
//!     detrended_data.csv
//!     motion_corrected_data.csv
//!     normalised_data.csv
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

use fipho_rs::types::{EventStamp, RawRecording, SubjectInfo};
use fipho_rs::SideOutput;

/// Write named float columns as CSV; columns may have different lengths
/// and shorter ones are padded with empty cells.
fn write_columns(path: &Path, headers: &[&str], columns: &[&[f64]]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| format!("failed to create '{}': {}", path.display(), e))?;
    writer
        .write_record(headers)
        .map_err(|e| format!("failed to write '{}': {}", path.display(), e))?;

    let rows = columns.iter().map(|c| c.len()).max().unwrap_or(0);
    for row in 0..rows {
        let record: Vec<String> = columns
            .iter()
            .map(|column| {
                column
                    .get(row)
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| format!("failed to write '{}': {}", path.display(), e))?;
    }
    writer
        .flush()
        .map_err(|e| format!("failed to flush '{}': {}", path.display(), e))?;
    Ok(())
}

fn write_info_csv(path: &Path, info: &SubjectInfo) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| format!("failed to create '{}': {}", path.display(), e))?;
    writer
        .write_record(["subject_id", "brain_region", "sensor", "side", "sampling_rate"])
        .and_then(|_| {
            writer.write_record([
                info.subject_id.clone(),
                info.brain_region.clone(),
                info.sensor.clone(),
                info.side.to_string(),
                info.sampling_rate.to_string(),
            ])
        })
        .map_err(|e| format!("failed to write '{}': {}", path.display(), e))?;
    writer
        .flush()
        .map_err(|e| format!("failed to flush '{}': {}", path.display(), e))
}

fn write_timestamps_csv(path: &Path, events: &[EventStamp]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| format!("failed to create '{}': {}", path.display(), e))?;
    writer
        .write_record(["ts", "notes", "index"])
        .map_err(|e| format!("failed to write '{}': {}", path.display(), e))?;
    for event in events {
        writer
            .write_record([
                event.ts.to_string(),
                event.label.clone(),
                event.index.to_string(),
            ])
            .map_err(|e| format!("failed to write '{}': {}", path.display(), e))?;
    }
    writer
        .flush()
        .map_err(|e| format!("failed to flush '{}': {}", path.display(), e))
}

/// Fit and regression diagnostics persisted alongside the data exports.
#[derive(Serialize)]
struct FitReport<'a> {
    id: &'a str,
    created_at: &'a str,
    signal_params: &'a fipho_rs::types::ExpFitParams,
    isosbestic_params: &'a fipho_rs::types::ExpFitParams,
    regression: &'a fipho_rs::types::RegressionStats,
    r_squared: f64,
}

/// Write every stage output for one successfully processed side and
/// return the subject directory.
pub fn write_side_outputs(
    root: &Path,
    treatment: &str,
    side: &SideOutput,
    raw: &RawRecording,
) -> Result<PathBuf, String> {
    let subject_dir = root.join(treatment).join(&side.info.subject_id);
    let data_dir = subject_dir.join("data");
    std::fs::create_dir_all(&data_dir)
        .map_err(|e| format!("failed to create '{}': {}", data_dir.display(), e))?;

    write_columns(
        &data_dir.join("raw_data.csv"),
        &["signal", "signal_ts", "isos", "isos_ts"],
        &[
            &raw.signal.values,
            &raw.signal.timestamps,
            &raw.isosbestic.values,
            &raw.isosbestic.timestamps,
        ],
    )?;

    let output = &side.output;
    write_columns(
        &data_dir.join("filtered_data.csv"),
        &["filtered_signal", "signal_ts", "filtered_isos", "isos_ts"],
        &[
            &output.filtered.signal.values,
            &output.filtered.signal.timestamps,
            &output.filtered.isosbestic.values,
            &output.filtered.isosbestic.timestamps,
        ],
    )?;

    write_columns(
        &data_dir.join("detrended_data.csv"),
        &["detrended_signal", "signal_ts", "detrended_isos", "isos_ts"],
        &[
            &output.detrended.signal.values,
            &output.detrended.signal.timestamps,
            &output.detrended.isosbestic.values,
            &output.detrended.isosbestic.timestamps,
        ],
    )?;

    write_columns(
        &data_dir.join("motion_corrected_data.csv"),
        &["signal_corrected", "signal_ts"],
        &[
            &output.motion_corrected.values,
            &output.motion_corrected.timestamps,
        ],
    )?;

    write_columns(
        &data_dir.join("normalised_data.csv"),
        &["time", "dF_F", "zscore"],
        &[
            &output.normalized.time,
            &output.normalized.df_f,
            &output.normalized.zscore,
        ],
    )?;

    write_timestamps_csv(&subject_dir.join("timestamps.csv"), &side.events)?;
    write_info_csv(&subject_dir.join("info.csv"), &side.info)?;

    let report = FitReport {
        id: &output.id,
        created_at: &output.created_at,
        signal_params: &output.detrended.signal_params,
        isosbestic_params: &output.detrended.isosbestic_params,
        regression: &output.motion_corrected.regression,
        r_squared: output.motion_corrected.regression.r_squared(),
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| format!("failed to serialize fit report: {}", e))?;
    let fit_path = subject_dir.join("fit.json");
    std::fs::write(&fit_path, json)
        .map_err(|e| format!("failed to write '{}': {}", fit_path.display(), e))?;

    Ok(subject_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_columns_pads_ragged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_columns(&path, &["a", "b"], &[&[1.0, 2.0, 3.0], &[10.0]]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "a,b");
        assert_eq!(lines[1], "1,10");
        assert_eq!(lines[2], "2,");
        assert_eq!(lines[3], "3,");
    }

    #[test]
    fn test_write_timestamps_roundtrip_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timestamps.csv");
        let events = vec![
            EventStamp {
                ts: 12.5,
                label: "lever".to_string(),
                index: 1,
            },
            EventStamp {
                ts: 40.0,
                label: "reward".to_string(),
                index: 2,
            },
        ];
        write_timestamps_csv(&path, &events).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("ts,notes,index"));
        assert!(content.contains("12.5,lever,1"));
    }
}
