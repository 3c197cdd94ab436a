//! Normalization Stage
//!
//! Produces the two standard normalizations from the motion-corrected
//! trace: percent change relative to the bleaching-curve baseline (dF/F)
//! and a population z-score over the whole trace.

use crate::error::{PhotometryError, Result};
use crate::types::{MotionCorrected, NormalizedOutput};

/// Variance below this is treated as zero; a constant trace must fail
/// rather than emit huge z-scores from float round-off.
const DEGENERACY_EPS: f64 = 1e-12;

/// Normalize stage.
///
/// `baseline` is the fitted bleaching curve of the signal channel (the
/// F0 divisor). Samples whose baseline magnitude is at or below
/// `baseline_epsilon` yield `NaN` in dF/F; they are propagated, never an
/// error. A zero-variance corrected trace fails with
/// `DegenerateVariance`.
pub fn normalize(
    corrected: &MotionCorrected,
    baseline: &[f64],
    baseline_epsilon: f64,
) -> Result<NormalizedOutput> {
    if corrected.len() != baseline.len() {
        return Err(PhotometryError::LengthMismatch {
            signal: corrected.len(),
            isosbestic: baseline.len(),
        });
    }
    if corrected.is_empty() {
        return Err(PhotometryError::InvalidParameter(
            "normalization requires a non-empty trace".to_string(),
        ));
    }

    let df_f: Vec<f64> = corrected
        .values
        .iter()
        .zip(baseline)
        .map(|(&v, &f0)| {
            if f0.abs() <= baseline_epsilon {
                f64::NAN
            } else {
                100.0 * v / f0
            }
        })
        .collect();

    let n = corrected.len() as f64;
    let mean = corrected.values.iter().sum::<f64>() / n;
    let variance = corrected
        .values
        .iter()
        .map(|&v| (v - mean) * (v - mean))
        .sum::<f64>()
        / n;
    let std = variance.sqrt();
    if std <= DEGENERACY_EPS {
        return Err(PhotometryError::DegenerateVariance);
    }

    let zscore: Vec<f64> = corrected.values.iter().map(|&v| (v - mean) / std).collect();

    Ok(NormalizedOutput {
        time: corrected.timestamps.clone(),
        df_f,
        zscore,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegressionStats;

    fn corrected(values: Vec<f64>) -> MotionCorrected {
        let timestamps: Vec<f64> = (0..values.len()).map(|i| i as f64 * 0.01).collect();
        MotionCorrected {
            values,
            timestamps,
            regression: RegressionStats {
                slope: 0.0,
                intercept: 0.0,
                r_value: 0.0,
            },
        }
    }

    #[test]
    fn test_zscore_mean_zero_unit_variance() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.37).sin() * 4.0 + 1.5).collect();
        let baseline = vec![10.0; 1000];
        let out = normalize(&corrected(values), &baseline, 1e-12).unwrap();

        let n = out.zscore.len() as f64;
        let mean = out.zscore.iter().sum::<f64>() / n;
        let var = out.zscore.iter().map(|z| (z - mean) * (z - mean)).sum::<f64>() / n;
        assert!(mean.abs() < 1e-9, "zscore mean {}", mean);
        assert!((var - 1.0).abs() < 1e-9, "zscore variance {}", var);
    }

    #[test]
    fn test_df_f_scale_invariance() {
        let values: Vec<f64> = (0..200).map(|i| (i as f64 * 0.2).cos()).collect();
        let baseline: Vec<f64> = (0..200).map(|i| 20.0 - i as f64 * 0.01).collect();

        let a = normalize(&corrected(values.clone()), &baseline, 1e-12).unwrap();
        let scaled_values: Vec<f64> = values.iter().map(|v| v * 7.0).collect();
        let scaled_baseline: Vec<f64> = baseline.iter().map(|v| v * 7.0).collect();
        let b = normalize(&corrected(scaled_values), &scaled_baseline, 1e-12).unwrap();

        for (x, y) in a.df_f.iter().zip(&b.df_f) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_trace_is_degenerate() {
        let out = normalize(&corrected(vec![2.5; 100]), &vec![10.0; 100], 1e-12);
        match out {
            Err(PhotometryError::DegenerateVariance) => {}
            other => panic!("expected DegenerateVariance, got {:?}", other),
        }
    }

    #[test]
    fn test_near_zero_baseline_yields_nan_not_error() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        let baseline = vec![10.0, 0.0, 10.0, 1e-15];
        let out = normalize(&corrected(values), &baseline, 1e-12).unwrap();
        assert!(out.df_f[0].is_finite());
        assert!(out.df_f[1].is_nan());
        assert!(out.df_f[2].is_finite());
        assert!(out.df_f[3].is_nan());
    }

    #[test]
    fn test_length_mismatch() {
        let out = normalize(&corrected(vec![1.0, 2.0]), &[1.0], 1e-12);
        assert!(matches!(out, Err(PhotometryError::LengthMismatch { .. })));
    }

    #[test]
    fn test_output_keyed_by_signal_timestamps() {
        let mc = corrected(vec![1.0, 2.0, 3.0]);
        let ts = mc.timestamps.clone();
        let out = normalize(&mc, &[5.0, 5.0, 5.0], 1e-12).unwrap();
        assert_eq!(out.time, ts);
    }
}
