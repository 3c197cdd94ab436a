use serde::{Deserialize, Serialize};

use crate::error::{PhotometryError, Result};

/// Recording side of a two-setup session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideId {
    A,
    B,
}

impl std::fmt::Display for SideId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SideId::A => write!(f, "A"),
            SideId::B => write!(f, "B"),
        }
    }
}

/// Identifying metadata for one recording side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectInfo {
    pub subject_id: String,
    pub brain_region: String,
    pub sensor: String,
    pub side: SideId,
    pub sampling_rate: f64,
}

/// Behavioral event marker (annotation only, not part of the numeric contract)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStamp {
    pub ts: f64,
    pub label: String,
    pub index: u32,
}

/// One channel of a recording: samples plus a parallel timestamp vector
/// in seconds. Signal and isosbestic channels may have different native
/// sampling rates and lengths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelTrace {
    pub values: Vec<f64>,
    pub timestamps: Vec<f64>,
    pub sampling_rate: f64,
}

impl ChannelTrace {
    /// Build a trace, validating the invariants every stage relies on:
    /// non-empty, values/timestamps the same length, a positive sampling
    /// rate, and monotonically non-decreasing timestamps.
    pub fn new(values: Vec<f64>, timestamps: Vec<f64>, sampling_rate: f64) -> Result<Self> {
        if values.is_empty() {
            return Err(PhotometryError::InvalidParameter(
                "channel trace is empty".to_string(),
            ));
        }
        if values.len() != timestamps.len() {
            return Err(PhotometryError::InvalidParameter(format!(
                "trace has {} values but {} timestamps",
                values.len(),
                timestamps.len()
            )));
        }
        if !(sampling_rate > 0.0) {
            return Err(PhotometryError::InvalidParameter(format!(
                "sampling rate must be positive, got {}",
                sampling_rate
            )));
        }
        if timestamps.windows(2).any(|w| w[1] < w[0]) {
            return Err(PhotometryError::InvalidParameter(
                "timestamps must be monotonically non-decreasing".to_string(),
            ));
        }
        Ok(Self {
            values,
            timestamps,
            sampling_rate,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Raw two-channel input for one recording side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecording {
    pub signal: ChannelTrace,
    pub isosbestic: ChannelTrace,
}

/// Output of the filter stage; each channel keeps its own timestamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteredPair {
    pub signal: ChannelTrace,
    pub isosbestic: ChannelTrace,
}

/// Fitted double-exponential bleaching parameters.
///
/// `tau_fast` is always derived as `tau_slow * tau_multiplier`, never
/// stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExpFitParams {
    /// Amplitude of the constant offset
    pub offset: f64,
    /// Amplitude of the fast bleaching component
    pub amp_fast: f64,
    /// Amplitude of the slow bleaching component
    pub amp_slow: f64,
    /// Time constant of the slow component in seconds
    pub tau_slow: f64,
    /// Time constant of the fast component relative to the slow one
    pub tau_multiplier: f64,
}

/// Output of the detrend stage: detrended traces plus the fitted curves
/// and parameters. The signal curve doubles as the F0 baseline for dF/F.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetrendedPair {
    pub signal: ChannelTrace,
    pub isosbestic: ChannelTrace,
    pub signal_fit: Vec<f64>,
    pub isosbestic_fit: Vec<f64>,
    pub signal_params: ExpFitParams,
    pub isosbestic_params: ExpFitParams,
}

/// Ordinary least-squares regression diagnostics from the motion stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegressionStats {
    pub slope: f64,
    pub intercept: f64,
    pub r_value: f64,
}

impl RegressionStats {
    /// Coefficient of determination; a data-quality signal, never enforced.
    pub fn r_squared(&self) -> f64 {
        self.r_value * self.r_value
    }
}

/// Motion-corrected signal with the signal's timestamp vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionCorrected {
    pub values: Vec<f64>,
    pub timestamps: Vec<f64>,
    pub regression: RegressionStats,
}

impl MotionCorrected {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Terminal artifact of the pipeline: column-aligned `time`, `dF_F`,
/// `zscore`, one row per motion-corrected sample. Column names and
/// seconds-based time are a compatibility contract with the downstream
/// event-alignment exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedOutput {
    pub time: Vec<f64>,
    #[serde(rename = "dF_F")]
    pub df_f: Vec<f64>,
    pub zscore: Vec<f64>,
}

impl NormalizedOutput {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}
