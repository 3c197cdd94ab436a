pub mod detrend;
pub mod error;
pub mod filter;
pub mod motion;
pub mod normalize;
pub mod pipeline;
pub mod session;
pub mod types;

pub use error::{PhotometryError, Result, SideError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput};
pub use session::{
    process_session, SessionOutcome, SessionRecording, SideOutput, SideRecording, SideResult,
};
pub use types::*;
