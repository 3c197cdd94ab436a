//! Zero-Phase Low-Pass Filtering
//!
//! Implements IIR Butterworth low-pass filters using second-order sections
//! (biquads) for numerical stability, applied forward-backward so the
//! output has no group delay. Downstream timestamp alignment relies on the
//! zero-phase property.

use std::f64::consts::PI;

use crate::error::{PhotometryError, Result};
use crate::types::{ChannelTrace, FilteredPair, RawRecording};

/// Second-order section (biquad) coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

/// State for a single biquad section (Direct Form II Transposed)
#[derive(Debug, Clone, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

/// Single biquad filter section
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }

    /// Process a single sample using Direct Form II Transposed
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.coeffs.b0 * input + self.state.z1;
        self.state.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.state.z2;
        self.state.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.state = BiquadState::default();
    }

    /// Set the internal state to the steady-state response for a constant
    /// input `x0`, and return the section's steady-state output. Priming
    /// each section this way suppresses the start-up transient of the
    /// forward-backward pass.
    fn prime(&mut self, x0: f64) -> f64 {
        let c = self.coeffs;
        let dc_gain = (c.b0 + c.b1 + c.b2) / (1.0 + c.a1 + c.a2);
        self.state.z1 = (dc_gain - c.b0) * x0;
        self.state.z2 = (c.b2 - c.a2 * dc_gain) * x0;
        dc_gain * x0
    }
}

/// Cascaded second-order sections filter
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<BiquadFilter>,
    order: usize,
}

impl SosFilter {
    fn new(sections: Vec<BiquadCoeffs>, order: usize) -> Self {
        Self {
            sections: sections.into_iter().map(BiquadFilter::new).collect(),
            order,
        }
    }

    /// Filter order the cascade was designed for.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of edge samples a zero-phase pass needs on each side.
    pub fn pad_len(&self) -> usize {
        3 * (self.order + 1)
    }

    /// Process a single sample through all sections
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let mut output = input;
        for section in &mut self.sections {
            output = section.process(output);
        }
        output
    }

    /// Reset all section states
    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    fn prime(&mut self, x0: f64) {
        let mut level = x0;
        for section in &mut self.sections {
            level = section.prime(level);
        }
    }

    /// Single forward pass with steady-state initial conditions.
    fn forward(&mut self, signal: &[f64]) -> Vec<f64> {
        self.reset();
        if let Some(&first) = signal.first() {
            self.prime(first);
        }
        signal.iter().map(|&s| self.process(s)).collect()
    }

    /// Apply the filter forward and backward (zero phase).
    ///
    /// The trace is extended on both ends with an odd reflection of
    /// `pad_len()` samples so edge transients fall outside the returned
    /// window; each pass starts from the steady-state response to its
    /// first padded sample.
    pub fn zero_phase(&self, signal: &[f64]) -> Result<Vec<f64>> {
        let pad = self.pad_len();
        let n = signal.len();
        if n <= pad {
            return Err(PhotometryError::InsufficientSamples {
                required: pad + 1,
                actual: n,
            });
        }

        // Odd reflection about the first and last samples.
        let mut extended = Vec::with_capacity(n + 2 * pad);
        for i in (1..=pad).rev() {
            extended.push(2.0 * signal[0] - signal[i]);
        }
        extended.extend_from_slice(signal);
        for i in 1..=pad {
            extended.push(2.0 * signal[n - 1] - signal[n - 1 - i]);
        }

        let mut filter = self.clone();
        let mut forward = filter.forward(&extended);
        forward.reverse();
        let mut backward = filter.forward(&forward);
        backward.reverse();

        Ok(backward[pad..pad + n].to_vec())
    }
}

/// Design a Butterworth low-pass filter for the given sampling rate.
///
/// Analog prototype poles are mapped through the bilinear transform with
/// frequency prewarping; odd orders get a trailing first-order section.
pub fn butterworth_lowpass(cutoff_hz: f64, sample_rate: f64, order: usize) -> Result<SosFilter> {
    if order == 0 {
        return Err(PhotometryError::InvalidParameter(
            "filter order must be at least 1".to_string(),
        ));
    }
    if !(cutoff_hz > 0.0) {
        return Err(PhotometryError::InvalidParameter(format!(
            "cutoff frequency must be positive, got {} Hz",
            cutoff_hz
        )));
    }
    let nyquist = sample_rate / 2.0;
    if cutoff_hz >= nyquist {
        return Err(PhotometryError::InvalidParameter(format!(
            "cutoff frequency ({} Hz) must be less than Nyquist ({} Hz)",
            cutoff_hz, nyquist
        )));
    }

    // Prewarp for the bilinear transform.
    let wn = (PI * cutoff_hz / sample_rate).tan();
    let num_sections = (order + 1) / 2;
    let mut sections = Vec::with_capacity(num_sections);

    for k in 0..num_sections {
        if order % 2 == 1 && k == num_sections - 1 {
            // First-order section: H(s) = wn / (s + wn)
            let k_coeff = wn / (1.0 + wn);
            sections.push(BiquadCoeffs {
                b0: k_coeff,
                b1: k_coeff,
                b2: 0.0,
                a1: (wn - 1.0) / (wn + 1.0),
                a2: 0.0,
            });
        } else {
            // Conjugate pole pair at angle theta from the negative real
            // axis: s^2 + 2*sin(theta)*wn*s + wn^2.
            let theta = PI * (2.0 * k as f64 + 1.0) / (2.0 * order as f64);
            let alpha = 2.0 * theta.sin();

            let wn2 = wn * wn;
            let denom = 1.0 + alpha * wn + wn2;

            sections.push(BiquadCoeffs {
                b0: wn2 / denom,
                b1: 2.0 * wn2 / denom,
                b2: wn2 / denom,
                a1: 2.0 * (wn2 - 1.0) / denom,
                a2: (1.0 - alpha * wn + wn2) / denom,
            });
        }
    }

    Ok(SosFilter::new(sections, order))
}

/// Zero-phase low-pass one channel, deriving coefficients from that
/// channel's own sampling rate. Timestamps pass through untouched.
pub fn zero_phase_lowpass(
    trace: &ChannelTrace,
    cutoff_hz: f64,
    order: usize,
) -> Result<ChannelTrace> {
    let filter = butterworth_lowpass(cutoff_hz, trace.sampling_rate, order)?;
    let filtered = filter.zero_phase(&trace.values)?;
    ChannelTrace::new(filtered, trace.timestamps.clone(), trace.sampling_rate)
}

/// Filter stage: low-pass both channels of a recording. Signal and
/// isosbestic may have distinct rates and thus distinct coefficients.
pub fn filter_pair(recording: &RawRecording, cutoff_hz: f64, order: usize) -> Result<FilteredPair> {
    let signal = zero_phase_lowpass(&recording.signal, cutoff_hz, order)?;
    let isosbestic = zero_phase_lowpass(&recording.isosbestic, cutoff_hz, order)?;
    Ok(FilteredPair { signal, isosbestic })
}
