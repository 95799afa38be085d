//! Judge score aggregation, medal classification and batch persistence.
//!
//! Data flows one way: a score edit updates the [`ScoreRecordStore`], the
//! [`RecalculationCoordinator`] re-derives aggregate and medal against the
//! [`MedalBandRegistry`], and the resulting dirty set is written by the
//! [`BatchPersistenceGateway`]. Band edits walk every scored record instead.

pub mod aggregate;
pub mod bands;
pub mod classifier;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod recalc;
pub mod report;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use bands::{BandUpsert, MalformedBandWarning, MedalBandRegistry, RegisteredBand};
pub use classifier::classify;
pub use domain::{
    BandId, BandKey, BandRef, JudgeScores, MedalBand, SampleId, SampleRow, ScoreRecord,
    JUDGE_SLOTS, MAX_SCORE, MIN_SCORE,
};
pub use error::{NotFoundError, ScoringError, ValidationError};
pub use gateway::{
    BandStore, BandSyncReport, BatchPersistenceGateway, CommitReport, FailedCommit,
    PersistenceError, PersistenceErrorKind, SampleStore,
};
pub use recalc::{BandsRecalculation, RecalculationCoordinator, ScoreRecalculation};
pub use report::{MedalTally, StandingsEntry};
pub use router::scoring_router;
pub use service::{BandEdit, ScoreUpdate, ScoringService};
pub use store::{DirtyBatch, DirtySet, ScoreChange, ScoreRecordStore};
