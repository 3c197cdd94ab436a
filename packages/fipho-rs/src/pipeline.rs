//! Preprocessing Pipeline
//!
//! Composes the four conditioning stages into one strictly forward pass:
//!
//! 1. Zero-phase low-pass filter (signal and isosbestic independently)
//! 2. Double-exponential photobleaching detrend
//! 3. Isosbestic-regression motion correction
//! 4. Normalization (dF/F and z-score)
//!
//! Every stage output is retained on the result so an orchestration layer
//! can persist or plot intermediates without re-running stages.

use serde::{Deserialize, Serialize};

use crate::detrend::detrend_pair;
use crate::error::{PhotometryError, Result};
use crate::filter::filter_pair;
use crate::motion;
use crate::normalize::normalize;
use crate::types::{DetrendedPair, FilteredPair, MotionCorrected, NormalizedOutput, RawRecording};

/// Configuration for the preprocessing pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Low-pass cutoff frequency in Hz
    #[serde(default = "default_lowpass_cutoff")]
    pub lowpass_cutoff_hz: f64,

    /// Butterworth filter order
    #[serde(default = "default_filter_order")]
    pub filter_order: usize,

    /// Evaluation budget for each double-exponential fit
    #[serde(default = "default_max_fit_evaluations")]
    pub max_fit_evaluations: usize,

    /// Baseline magnitudes at or below this yield NaN in dF/F
    #[serde(default = "default_baseline_epsilon")]
    pub baseline_epsilon: f64,
}

fn default_lowpass_cutoff() -> f64 {
    10.0
}
fn default_filter_order() -> usize {
    2
}
fn default_max_fit_evaluations() -> usize {
    1000
}
fn default_baseline_epsilon() -> f64 {
    1e-12
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lowpass_cutoff_hz: default_lowpass_cutoff(),
            filter_order: default_filter_order(),
            max_fit_evaluations: default_max_fit_evaluations(),
            baseline_epsilon: default_baseline_epsilon(),
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if !(self.lowpass_cutoff_hz > 0.0) {
            return Err(PhotometryError::InvalidParameter(format!(
                "lowpass cutoff must be positive, got {}",
                self.lowpass_cutoff_hz
            )));
        }
        if self.filter_order == 0 {
            return Err(PhotometryError::InvalidParameter(
                "filter order must be at least 1".to_string(),
            ));
        }
        if self.max_fit_evaluations == 0 {
            return Err(PhotometryError::InvalidParameter(
                "fit evaluation budget must be at least 1".to_string(),
            ));
        }
        if self.baseline_epsilon < 0.0 {
            return Err(PhotometryError::InvalidParameter(
                "baseline epsilon must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete pipeline result for one recording side, with every named
/// intermediate retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub id: String,
    pub created_at: String,
    pub filtered: FilteredPair,
    pub detrended: DetrendedPair,
    pub motion_corrected: MotionCorrected,
    pub normalized: NormalizedOutput,
}

/// Stage composition for one recording side
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run all four stages on one recording side.
    ///
    /// If the detrended channels differ in length (distinct native
    /// sampling rates), the isosbestic is linearly interpolated onto the
    /// signal's timestamps before motion correction; the motion stage
    /// itself remains strict about alignment.
    pub fn process(&self, recording: &RawRecording) -> Result<PipelineOutput> {
        log::info!(
            "filtering: signal {} samples @ {} Hz, isosbestic {} samples @ {} Hz",
            recording.signal.len(),
            recording.signal.sampling_rate,
            recording.isosbestic.len(),
            recording.isosbestic.sampling_rate
        );
        let filtered = filter_pair(
            recording,
            self.config.lowpass_cutoff_hz,
            self.config.filter_order,
        )?;

        let detrended = detrend_pair(&filtered, self.config.max_fit_evaluations)?;
        log::info!(
            "detrended: signal tau_slow {:.1}s, isosbestic tau_slow {:.1}s",
            detrended.signal_params.tau_slow,
            detrended.isosbestic_params.tau_slow
        );

        let isosbestic_aligned: Vec<f64> = if detrended.isosbestic.len() == detrended.signal.len()
        {
            detrended.isosbestic.values.clone()
        } else {
            log::info!(
                "resampling isosbestic ({} samples) onto signal time base ({} samples)",
                detrended.isosbestic.len(),
                detrended.signal.len()
            );
            resample_linear(
                &detrended.isosbestic.timestamps,
                &detrended.isosbestic.values,
                &detrended.signal.timestamps,
            )
        };

        let motion_corrected = motion::correct(&detrended.signal, &isosbestic_aligned)?;
        log::info!(
            "motion correction r^2 = {:.4}",
            motion_corrected.regression.r_squared()
        );

        let normalized = normalize(
            &motion_corrected,
            &detrended.signal_fit,
            self.config.baseline_epsilon,
        )?;

        Ok(PipelineOutput {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            filtered,
            detrended,
            motion_corrected,
            normalized,
        })
    }
}

/// Linear interpolation of (`x_src`, `y_src`) at `x_dst`, clamped to the
/// source endpoints. Both abscissa vectors must be non-decreasing, which
/// `ChannelTrace` already guarantees.
fn resample_linear(x_src: &[f64], y_src: &[f64], x_dst: &[f64]) -> Vec<f64> {
    let n = x_src.len();
    let mut out = Vec::with_capacity(x_dst.len());
    let mut j = 0usize;
    for &x in x_dst {
        if x <= x_src[0] {
            out.push(y_src[0]);
            continue;
        }
        if x >= x_src[n - 1] {
            out.push(y_src[n - 1]);
            continue;
        }
        while j + 1 < n && x_src[j + 1] < x {
            j += 1;
        }
        let (x0, x1) = (x_src[j], x_src[j + 1]);
        let (y0, y1) = (y_src[j], y_src[j + 1]);
        if x1 > x0 {
            out.push(y0 + (y1 - y0) * (x - x0) / (x1 - x0));
        } else {
            out.push(y0);
        }
    }
    out
}
