//! Event-aligned windowing of normalized traces.
//!
//! Takes a processed subject's `normalised_data.csv`, downsamples it by
//! block means, slices a fixed window around each behavioral event
//! (default 20 s before to 60 s after onset) re-zeroed to event time,
//! and concatenates the per-occurrence columns per event type so
//! repetitions of the same event can be compared side by side.

use std::path::Path;

use fipho_rs::types::EventStamp;

/// Rows of a normalised_data.csv (`time`, `dF_F`, `zscore`).
#[derive(Debug, Clone)]
pub struct NormalizedRows {
    pub time: Vec<f64>,
    pub df_f: Vec<f64>,
    pub zscore: Vec<f64>,
}

impl NormalizedRows {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// One event occurrence's window, time re-zeroed to the event onset.
#[derive(Debug, Clone)]
pub struct EventWindow {
    pub time: Vec<f64>,
    pub df_f: Vec<f64>,
    pub zscore: Vec<f64>,
}

pub fn read_normalized_csv<P: AsRef<Path>>(path: P) -> Result<NormalizedRows, String> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| format!("failed to open '{}': {}", path.display(), e))?;
    let headers = reader
        .headers()
        .map_err(|e| format!("failed to read header of '{}': {}", path.display(), e))?
        .clone();

    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("'{}' is missing column '{}'", path.display(), name))
    };
    let time_idx = find("time")?;
    let df_f_idx = find("dF_F")?;
    let zscore_idx = find("zscore")?;

    let mut rows = NormalizedRows {
        time: Vec::new(),
        df_f: Vec::new(),
        zscore: Vec::new(),
    };
    for (row, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| format!("failed to read '{}' row {}: {}", path.display(), row + 2, e))?;
        let parse = |idx: usize| -> Result<f64, String> {
            record
                .get(idx)
                .unwrap_or("")
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("'{}' row {}: bad number", path.display(), row + 2))
        };
        rows.time.push(parse(time_idx)?);
        rows.df_f.push(parse(df_f_idx)?);
        rows.zscore.push(parse(zscore_idx)?);
    }
    if rows.is_empty() {
        return Err(format!("'{}' contains no data rows", path.display()));
    }
    Ok(rows)
}

/// Block-mean downsample by `factor`; a partial trailing block is
/// averaged over the samples it has.
pub fn downsample_mean(rows: &NormalizedRows, factor: usize) -> NormalizedRows {
    if factor <= 1 {
        return rows.clone();
    }
    let mut out = NormalizedRows {
        time: Vec::with_capacity(rows.len() / factor + 1),
        df_f: Vec::with_capacity(rows.len() / factor + 1),
        zscore: Vec::with_capacity(rows.len() / factor + 1),
    };
    let mut start = 0;
    while start < rows.len() {
        let end = (start + factor).min(rows.len());
        let n = (end - start) as f64;
        out.time.push(rows.time[start..end].iter().sum::<f64>() / n);
        out.df_f.push(rows.df_f[start..end].iter().sum::<f64>() / n);
        out.zscore
            .push(rows.zscore[start..end].iter().sum::<f64>() / n);
        start = end;
    }
    out
}

/// Slice the rows whose time falls strictly inside `(onset - pre,
/// onset + post)`, re-zeroed to the event onset.
pub fn window_around(rows: &NormalizedRows, onset: f64, pre: f64, post: f64) -> EventWindow {
    let mut window = EventWindow {
        time: Vec::new(),
        df_f: Vec::new(),
        zscore: Vec::new(),
    };
    for i in 0..rows.len() {
        let t = rows.time[i];
        if t > onset - pre && t < onset + post {
            window.time.push(t - onset);
            window.df_f.push(rows.df_f[i]);
            window.zscore.push(rows.zscore[i]);
        }
    }
    window
}

/// Group event onsets by label in first-seen order.
pub fn group_events(events: &[EventStamp]) -> Vec<(String, Vec<f64>)> {
    let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
    for event in events {
        match groups.iter_mut().find(|(label, _)| *label == event.label) {
            Some((_, onsets)) => onsets.push(event.ts),
            None => groups.push((event.label.clone(), vec![event.ts])),
        }
    }
    groups
}

/// Write one event type's windows: a shared re-zeroed time column from
/// the first occurrence, then `dF_F`/`zscore` columns per occurrence.
/// Occurrences near the recording edges can be shorter; missing cells
/// stay empty.
pub fn write_event_csv(path: &Path, name: &str, windows: &[EventWindow]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| format!("failed to create '{}': {}", path.display(), e))?;

    let mut header = vec!["time".to_string()];
    for k in 0..windows.len() {
        header.push(format!("{}_{}_dF_F", name, k));
        header.push(format!("{}_{}_zscore", name, k));
    }
    writer
        .write_record(&header)
        .map_err(|e| format!("failed to write '{}': {}", path.display(), e))?;

    let rows = windows.iter().map(|w| w.time.len()).max().unwrap_or(0);
    let time_column = windows.first().map(|w| w.time.as_slice()).unwrap_or(&[]);
    for row in 0..rows {
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        record.push(
            time_column
                .get(row)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        );
        for window in windows {
            record.push(window.df_f.get(row).map(|v| v.to_string()).unwrap_or_default());
            record.push(
                window
                    .zscore
                    .get(row)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        writer
            .write_record(&record)
            .map_err(|e| format!("failed to write '{}': {}", path.display(), e))?;
    }
    writer
        .flush()
        .map_err(|e| format!("failed to flush '{}': {}", path.display(), e))
}
