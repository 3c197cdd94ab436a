//! Two-Side Session Processing
//!
//! One acquisition session drives up to two independent recording sides
//! (setup A and setup B). The sides share no state and are processed in
//! parallel; a typed failure on one side never suppresses the other
//! side's output, and every failure carries the side and subject
//! identity an operator needs for diagnosis.

use serde::{Deserialize, Serialize};

use crate::error::SideError;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineOutput};
use crate::types::{EventStamp, RawRecording, SideId, SubjectInfo};

/// Input for one recording side: identity, the raw two-channel recording,
/// and behavioral event markers (annotation only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideRecording {
    pub info: SubjectInfo,
    pub recording: RawRecording,
    pub events: Vec<EventStamp>,
}

/// One session; an absent side is explicitly absent, not a placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecording {
    pub treatment: String,
    pub side_a: Option<SideRecording>,
    pub side_b: Option<SideRecording>,
}

/// Successful output for one side
#[derive(Debug, Clone)]
pub struct SideOutput {
    pub info: SubjectInfo,
    pub events: Vec<EventStamp>,
    pub output: PipelineOutput,
}

pub type SideResult = std::result::Result<SideOutput, SideError>;

/// Per-side results for one session; `None` where the side was absent.
#[derive(Debug)]
pub struct SessionOutcome {
    pub side_a: Option<SideResult>,
    pub side_b: Option<SideResult>,
}

impl SessionOutcome {
    /// Iterate over the sides that were present.
    pub fn sides(&self) -> impl Iterator<Item = &SideResult> {
        self.side_a.iter().chain(self.side_b.iter())
    }
}

fn process_side(config: &PipelineConfig, side: &SideRecording, id: SideId) -> SideResult {
    let pipeline = Pipeline::new(config.clone()).map_err(|source| SideError {
        side: id,
        subject_id: side.info.subject_id.clone(),
        source,
    })?;
    match pipeline.process(&side.recording) {
        Ok(output) => Ok(SideOutput {
            info: side.info.clone(),
            events: side.events.clone(),
            output,
        }),
        Err(source) => {
            let err = SideError {
                side: id,
                subject_id: side.info.subject_id.clone(),
                source,
            };
            log::error!("{}", err);
            Err(err)
        }
    }
}

/// Process both present sides of a session through independent pipelines,
/// in parallel.
pub fn process_session(config: &PipelineConfig, session: &SessionRecording) -> SessionOutcome {
    let (side_a, side_b) = rayon::join(
        || {
            session
                .side_a
                .as_ref()
                .map(|side| process_side(config, side, SideId::A))
        },
        || {
            session
                .side_b
                .as_ref()
                .map(|side| process_side(config, side, SideId::B))
        },
    );
    SessionOutcome { side_a, side_b }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelTrace;

    fn synthetic_side(subject: &str, side: SideId) -> SideRecording {
        let n = 4000;
        let sample_rate = 20.0;
        let timestamps: Vec<f64> = (0..n).map(|i| i as f64 / sample_rate).collect();
        let signal: Vec<f64> = timestamps
            .iter()
            .map(|&t| 40.0 * (-t / 2000.0).exp() + 2.0 * (0.4 * t).sin())
            .collect();
        let isosbestic: Vec<f64> = timestamps
            .iter()
            .map(|&t| 15.0 * (-t / 1500.0).exp() + 0.5 * (0.4 * t).sin())
            .collect();
        SideRecording {
            info: SubjectInfo {
                subject_id: subject.to_string(),
                brain_region: "NAc".to_string(),
                sensor: "GRAB-DA".to_string(),
                side,
                sampling_rate: sample_rate,
            },
            recording: RawRecording {
                signal: ChannelTrace::new(signal, timestamps.clone(), sample_rate).unwrap(),
                isosbestic: ChannelTrace::new(isosbestic, timestamps, sample_rate).unwrap(),
            },
            events: vec![],
        }
    }

    #[test]
    fn test_absent_side_stays_absent() {
        let session = SessionRecording {
            treatment: "saline".to_string(),
            side_a: Some(synthetic_side("m101", SideId::A)),
            side_b: None,
        };
        let outcome = process_session(&PipelineConfig::default(), &session);
        assert!(outcome.side_a.is_some());
        assert!(outcome.side_b.is_none());
        assert_eq!(outcome.sides().count(), 1);
    }

    #[test]
    fn test_one_bad_side_does_not_suppress_the_other() {
        let mut bad = synthetic_side("m102", SideId::B);
        // Too short for the zero-phase filter.
        bad.recording.signal =
            ChannelTrace::new(vec![1.0; 5], (0..5).map(|i| i as f64 / 100.0).collect(), 100.0)
                .unwrap();

        let session = SessionRecording {
            treatment: "drug".to_string(),
            side_a: Some(synthetic_side("m101", SideId::A)),
            side_b: Some(bad),
        };
        let outcome = process_session(&PipelineConfig::default(), &session);

        assert!(outcome.side_a.unwrap().is_ok());
        let err = outcome.side_b.unwrap().unwrap_err();
        assert_eq!(err.side, SideId::B);
        assert_eq!(err.subject_id, "m102");
        let msg = err.to_string();
        assert!(msg.contains("side B"), "message was: {}", msg);
        assert!(msg.contains("m102"), "message was: {}", msg);
    }
}
