use super::domain::{BandId, BandKey, SampleId};

/// Rejected input. The record the input targeted is left untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("score {value} for sample {sample_id} slot {slot} is outside 0..=100")]
    ScoreOutOfRange {
        sample_id: SampleId,
        slot: usize,
        value: f64,
    },
    #[error("slot {slot} does not exist; samples carry {slots} judge slots")]
    SlotOutOfRange { slot: usize, slots: usize },
    #[error("sample {0} is already registered")]
    DuplicateSample(SampleId),
}

/// An operation referenced something the engine does not hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFoundError {
    #[error("sample {0} not found")]
    Sample(SampleId),
    #[error("medal band {0} not found")]
    Band(BandId),
    #[error("draft band {0} not found")]
    Draft(BandKey),
}

/// Synchronous failure of an engine operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
}
