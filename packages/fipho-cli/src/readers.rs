//! CSV ingestion for the collaborator input contract.
//!
//! A recording CSV carries four columns (`signal`, `signal_ts`, `isos`,
//! `isos_ts`); the two channels may have different lengths, so shorter
//! columns simply run out of filled cells. An events CSV carries
//! `ts`, `notes`, `index`.

use std::path::Path;

use fipho_rs::types::{ChannelTrace, EventStamp, RawRecording};

/// Raw recording columns as read from disk, before trace validation.
#[derive(Debug, Clone)]
pub struct RecordingColumns {
    pub signal: Vec<f64>,
    pub signal_ts: Vec<f64>,
    pub isos: Vec<f64>,
    pub isos_ts: Vec<f64>,
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, String> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| format!("missing required column '{}'", name))
}

/// Read a recording CSV. Empty cells are treated as column end (the two
/// channels may have different native lengths); non-numeric cells are an
/// error.
pub fn read_recording_csv<P: AsRef<Path>>(path: P) -> Result<RecordingColumns, String> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| format!("failed to open '{}': {}", path.display(), e))?;

    let headers = reader
        .headers()
        .map_err(|e| format!("failed to read header of '{}': {}", path.display(), e))?
        .clone();

    let signal_idx = column_index(&headers, "signal")?;
    let signal_ts_idx = column_index(&headers, "signal_ts")?;
    let isos_idx = column_index(&headers, "isos")?;
    let isos_ts_idx = column_index(&headers, "isos_ts")?;

    let mut columns = RecordingColumns {
        signal: Vec::new(),
        signal_ts: Vec::new(),
        isos: Vec::new(),
        isos_ts: Vec::new(),
    };

    for (row, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| format!("failed to read '{}' row {}: {}", path.display(), row + 2, e))?;
        let push = |idx: usize, out: &mut Vec<f64>| -> Result<(), String> {
            if let Some(field) = record.get(idx) {
                let field = field.trim();
                if !field.is_empty() {
                    let value = field.parse::<f64>().map_err(|_| {
                        format!(
                            "'{}' row {}: '{}' is not a number",
                            path.display(),
                            row + 2,
                            field
                        )
                    })?;
                    out.push(value);
                }
            }
            Ok(())
        };
        push(signal_idx, &mut columns.signal)?;
        push(signal_ts_idx, &mut columns.signal_ts)?;
        push(isos_idx, &mut columns.isos)?;
        push(isos_ts_idx, &mut columns.isos_ts)?;
    }

    if columns.signal.is_empty() {
        return Err(format!("'{}' contains no signal samples", path.display()));
    }
    Ok(columns)
}

/// Read behavioral event markers (`ts`, `notes`, `index`). The `index`
/// column is optional and defaults to the first-seen order of labels.
pub fn read_events_csv<P: AsRef<Path>>(path: P) -> Result<Vec<EventStamp>, String> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| format!("failed to open '{}': {}", path.display(), e))?;

    let headers = reader
        .headers()
        .map_err(|e| format!("failed to read header of '{}': {}", path.display(), e))?
        .clone();

    let ts_idx = column_index(&headers, "ts")?;
    let notes_idx = column_index(&headers, "notes")?;
    let index_idx = column_index(&headers, "index").ok();

    let mut events = Vec::new();
    let mut seen_labels: Vec<String> = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| format!("failed to read '{}' row {}: {}", path.display(), row + 2, e))?;
        let ts_field = record
            .get(ts_idx)
            .map(str::trim)
            .filter(|f| !f.is_empty());
        let Some(ts_field) = ts_field else {
            continue;
        };
        let ts = ts_field
            .parse::<f64>()
            .map_err(|_| format!("'{}' row {}: bad timestamp '{}'", path.display(), row + 2, ts_field))?;
        let label = record
            .get(notes_idx)
            .map(|f| f.trim().to_string())
            .unwrap_or_default();

        let index = match index_idx.and_then(|i| record.get(i)).map(str::trim) {
            Some(f) if !f.is_empty() => f
                .parse::<f64>()
                .map_err(|_| format!("'{}' row {}: bad index '{}'", path.display(), row + 2, f))?
                as u32,
            _ => match seen_labels.iter().position(|l| *l == label) {
                Some(pos) => pos as u32 + 1,
                None => {
                    seen_labels.push(label.clone());
                    seen_labels.len() as u32
                }
            },
        };

        events.push(EventStamp { ts, label, index });
    }

    Ok(events)
}

/// Infer a sampling rate as the reciprocal of the median inter-sample
/// interval.
pub fn infer_sampling_rate(timestamps: &[f64]) -> Result<f64, String> {
    if timestamps.len() < 2 {
        return Err("cannot infer sampling rate from fewer than two timestamps".to_string());
    }
    let mut deltas: Vec<f64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
    deltas.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = deltas[deltas.len() / 2];
    if !(median > 0.0) {
        return Err(format!(
            "median inter-sample interval is {}; timestamps are not usable",
            median
        ));
    }
    Ok(1.0 / median)
}

/// Assemble validated channel traces from recording columns, inferring
/// per-channel sampling rates unless overridden.
pub fn build_recording(
    columns: &RecordingColumns,
    sr_signal: Option<f64>,
    sr_isos: Option<f64>,
) -> Result<RawRecording, String> {
    let signal_rate = match sr_signal {
        Some(rate) => rate,
        None => infer_sampling_rate(&columns.signal_ts)?,
    };
    let isos_rate = match sr_isos {
        Some(rate) => rate,
        None => infer_sampling_rate(&columns.isos_ts)?,
    };

    let signal = ChannelTrace::new(columns.signal.clone(), columns.signal_ts.clone(), signal_rate)
        .map_err(|e| format!("signal channel: {}", e))?;
    let isosbestic = ChannelTrace::new(columns.isos.clone(), columns.isos_ts.clone(), isos_rate)
        .map_err(|e| format!("isosbestic channel: {}", e))?;

    Ok(RawRecording { signal, isosbestic })
}

/// File stem fallback for a subject identifier.
pub fn subject_from_path(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("subject")
        .to_string()
}
