//! Motion Correction Stage
//!
//! The isosbestic excitation is not activity-dependent, so fluctuations
//! it shares with the signal channel are assumed to be motion artifact.
//! An ordinary least-squares regression of the detrended isosbestic
//! (independent) against the detrended signal (dependent) yields a
//! per-sample motion estimate that is subtracted from the signal.

use crate::error::{PhotometryError, Result};
use crate::types::{ChannelTrace, MotionCorrected, RegressionStats};

/// Ordinary least-squares fit of y = intercept + slope * x.
///
/// `r_value` is the Pearson correlation coefficient; its square is the
/// coefficient of determination reported as a data-quality diagnostic.
fn linear_regression(x: &[f64], y: &[f64]) -> RegressionStats {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    let mut ss_xy = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
        ss_xy += dx * dy;
    }

    if ss_xx < 1e-12 {
        // Flat reference channel carries no motion information.
        return RegressionStats {
            slope: 0.0,
            intercept: mean_y,
            r_value: 0.0,
        };
    }

    let slope = ss_xy / ss_xx;
    let intercept = mean_y - slope * mean_x;
    let r_value = if ss_yy < 1e-12 {
        0.0
    } else {
        ss_xy / (ss_xx * ss_yy).sqrt()
    };

    RegressionStats {
        slope,
        intercept,
        r_value,
    }
}

/// Motion stage: regress the isosbestic against the signal, predict the
/// motion component per sample and subtract it.
///
/// The two traces must be element-wise aligned; a length mismatch fails
/// before any regression arithmetic runs.
pub fn correct(signal: &ChannelTrace, isosbestic: &[f64]) -> Result<MotionCorrected> {
    if signal.len() != isosbestic.len() {
        return Err(PhotometryError::LengthMismatch {
            signal: signal.len(),
            isosbestic: isosbestic.len(),
        });
    }
    if signal.is_empty() {
        return Err(PhotometryError::InvalidParameter(
            "motion correction requires a non-empty trace".to_string(),
        ));
    }

    let regression = linear_regression(isosbestic, &signal.values);
    log::debug!(
        "motion regression: slope {:.4}, intercept {:.4}, r^2 {:.4}",
        regression.slope,
        regression.intercept,
        regression.r_squared()
    );

    let values: Vec<f64> = signal
        .values
        .iter()
        .zip(isosbestic)
        .map(|(&sig, &iso)| sig - (regression.intercept + regression.slope * iso))
        .collect();

    Ok(MotionCorrected {
        values,
        timestamps: signal.timestamps.clone(),
        regression,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(values: Vec<f64>) -> ChannelTrace {
        let timestamps: Vec<f64> = (0..values.len()).map(|i| i as f64 * 0.01).collect();
        ChannelTrace::new(values, timestamps, 100.0).unwrap()
    }

    #[test]
    fn test_scaled_copy_recovers_scale() {
        // isosbestic = 0.5 * signal, so signal = 2.0 * isosbestic.
        let signal_values: Vec<f64> = (0..500)
            .map(|i| (i as f64 * 0.05).sin() * 3.0 + (i as f64 * 0.013).cos())
            .collect();
        let isosbestic: Vec<f64> = signal_values.iter().map(|v| v * 0.5).collect();
        let corrected = correct(&trace(signal_values), &isosbestic).unwrap();

        assert!((corrected.regression.slope - 2.0).abs() < 1e-9);
        assert!((corrected.regression.r_squared() - 1.0).abs() < 1e-9);
        let max_abs = corrected.values.iter().fold(0.0_f64, |a, v| a.max(v.abs()));
        assert!(max_abs < 1e-9, "residual motion {}", max_abs);
    }

    #[test]
    fn test_length_mismatch_rejected_before_regression() {
        let signal = trace(vec![1.0, 2.0, 3.0]);
        match correct(&signal, &[1.0, 2.0]) {
            Err(PhotometryError::LengthMismatch {
                signal: 3,
                isosbestic: 2,
            }) => {}
            other => panic!("expected LengthMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_flat_isosbestic_leaves_centered_signal() {
        let signal_values = vec![1.0, 2.0, 3.0, 4.0];
        let corrected = correct(&trace(signal_values), &[5.0; 4]).unwrap();
        assert_eq!(corrected.regression.slope, 0.0);
        let mean: f64 = corrected.values.iter().sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
    }

    #[test]
    fn test_r_squared_reported_for_noisy_proxy() {
        let signal_values: Vec<f64> = (0..400).map(|i| (i as f64 * 0.1).sin()).collect();
        let isosbestic: Vec<f64> = signal_values
            .iter()
            .enumerate()
            .map(|(i, v)| 0.3 * v + 0.05 * ((i * 7919) % 13) as f64)
            .collect();
        let corrected = correct(&trace(signal_values), &isosbestic).unwrap();
        let r2 = corrected.regression.r_squared();
        assert!(r2 > 0.0 && r2 <= 1.0, "r^2 out of range: {}", r2);
    }
}
