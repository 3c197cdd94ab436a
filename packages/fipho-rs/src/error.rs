use thiserror::Error;

use crate::types::SideId;

#[derive(Error, Debug)]
pub enum PhotometryError {
    #[error("trace too short for zero-phase filtering: need more than {required} samples, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },

    #[error("double-exponential fit did not converge: {0}")]
    FitDivergence(String),

    #[error("channel length mismatch: signal has {signal} samples, isosbestic has {isosbestic}")]
    LengthMismatch { signal: usize, isosbestic: usize },

    #[error("motion-corrected trace has zero variance; z-score is undefined")]
    DegenerateVariance,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, PhotometryError>;

/// Failure of one recording side, wrapped with the identity an operator
/// needs to tell a bad recording apart from a pipeline defect.
#[derive(Error, Debug)]
#[error("side {side} (subject {subject_id}): {source}")]
pub struct SideError {
    pub side: SideId,
    pub subject_id: String,
    #[source]
    pub source: PhotometryError,
}
