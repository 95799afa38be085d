use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use super::domain::{
    same_value, JudgeScores, SampleId, SampleRow, ScoreRecord, JUDGE_SLOTS, MAX_SCORE, MIN_SCORE,
};
use super::error::{NotFoundError, ScoringError, ValidationError};

/// Samples whose raw or derived values changed since their last confirmed
/// commit, each tagged with the revision of its latest local mutation.
///
/// Ids are added by mutations and removed only by [`DirtySet::confirm`] for the
/// exact revision that was committed, so an edit landing while an older
/// snapshot is being written keeps the row dirty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    entries: BTreeMap<SampleId, u64>,
}

impl DirtySet {
    pub fn contains(&self, sample_id: &SampleId) -> bool {
        self.entries.contains_key(sample_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &SampleId> {
        self.entries.keys()
    }

    pub(crate) fn mark(&mut self, sample_id: &SampleId, revision: u64) {
        self.entries.insert(sample_id.clone(), revision);
    }

    /// Clears `sample_id` if `revision` is still its latest dirty revision.
    pub(crate) fn confirm(&mut self, sample_id: &SampleId, revision: u64) -> bool {
        match self.entries.get(sample_id) {
            Some(current) if *current == revision => {
                self.entries.remove(sample_id);
                true
            }
            _ => false,
        }
    }
}

/// Snapshot of one dirty row handed to the persistence gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRow {
    pub row: SampleRow,
    pub revision: u64,
}

/// Rows captured for a single `commit_dirty` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirtyBatch {
    pub rows: Vec<PendingRow>,
}

impl DirtyBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn revision_of(&self, sample_id: &SampleId) -> Option<u64> {
        self.rows
            .iter()
            .find(|pending| &pending.row.sample_id == sample_id)
            .map(|pending| pending.revision)
    }
}

/// Outcome of a single `set_score` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreChange {
    pub sample_id: SampleId,
    pub slot: usize,
    pub previous: Option<f64>,
    pub value: Option<f64>,
    pub previous_aggregate: Option<f64>,
    pub aggregate: Option<f64>,
}

impl ScoreChange {
    pub fn score_changed(&self) -> bool {
        !same_value(self.previous, self.value)
    }

    pub fn aggregate_changed(&self) -> bool {
        !same_value(self.previous_aggregate, self.aggregate)
    }
}

/// Per-sample judge scores, their derived aggregate and medal, and the dirty
/// set feeding the persistence gateway.
#[derive(Debug, Default)]
pub struct ScoreRecordStore {
    records: BTreeMap<SampleId, ScoreRecord>,
    dirty: DirtySet,
    revision: u64,
}

impl ScoreRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sample entering the tasting workflow with every slot empty.
    /// New samples are not dirty: there is nothing to write yet.
    pub fn open_sample(&mut self, sample_id: SampleId) -> Result<&ScoreRecord, ScoringError> {
        if self.records.contains_key(&sample_id) {
            return Err(ValidationError::DuplicateSample(sample_id).into());
        }

        let revision = self.next_revision();
        let record = ScoreRecord::new(sample_id.clone(), JudgeScores::empty(), revision);
        Ok(self.records.entry(sample_id).or_insert(record))
    }

    /// Loads a row from the sample store. Derived fields are recomputed from the
    /// scores; when the stored aggregate disagrees the row is marked dirty so
    /// the store converges on the next commit. The stored medal is kept for the
    /// coordinator to confirm or replace.
    pub fn hydrate(&mut self, row: SampleRow) -> Result<&ScoreRecord, ScoringError> {
        let SampleRow {
            sample_id,
            scores,
            aggregate,
            medal,
            ..
        } = row;

        self.check_row(&sample_id, &scores)?;

        let revision = self.next_revision();
        let mut record = ScoreRecord::new(
            sample_id.clone(),
            JudgeScores::from_validated(scores),
            revision,
        );

        let stale_aggregate = !same_value(record.aggregate(), aggregate);
        let stale_medal = record.aggregate().is_none() && medal.is_some();
        if record.aggregate().is_some() {
            record.assign_medal(medal);
        }

        if stale_aggregate || stale_medal {
            debug!(sample_id = %sample_id, "stored derived values disagree with scores");
            self.dirty.mark(&sample_id, revision);
        }

        Ok(self.records.entry(sample_id).or_insert(record))
    }

    /// Hydrates a batch of stored rows. Every row is checked before any is
    /// loaded, so an invalid or repeated row leaves the store untouched.
    pub fn hydrate_all(&mut self, rows: Vec<SampleRow>) -> Result<usize, ScoringError> {
        let mut seen = BTreeSet::new();
        for row in &rows {
            self.check_row(&row.sample_id, &row.scores)?;
            if !seen.insert(&row.sample_id) {
                return Err(ValidationError::DuplicateSample(row.sample_id.clone()).into());
            }
        }

        let count = rows.len();
        for row in rows {
            self.hydrate(row)?;
        }
        Ok(count)
    }

    fn check_row(
        &self,
        sample_id: &SampleId,
        scores: &[Option<f64>; JUDGE_SLOTS],
    ) -> Result<(), ScoringError> {
        if self.records.contains_key(sample_id) {
            return Err(ValidationError::DuplicateSample(sample_id.clone()).into());
        }
        for (slot, value) in scores.iter().enumerate() {
            validate_score(sample_id, slot, *value)?;
        }
        Ok(())
    }

    /// Writes one judge slot, re-derives the aggregate and marks the record
    /// dirty. Out-of-range values are rejected without touching the record.
    pub fn set_score(
        &mut self,
        sample_id: &SampleId,
        slot: usize,
        value: Option<f64>,
    ) -> Result<ScoreChange, ScoringError> {
        validate_score(sample_id, slot, value)?;

        let revision = self.next_revision();
        let record = self
            .records
            .get_mut(sample_id)
            .ok_or_else(|| NotFoundError::Sample(sample_id.clone()))?;

        let previous_aggregate = record.aggregate();
        let previous = record.assign_slot(slot, value);
        let change = ScoreChange {
            sample_id: sample_id.clone(),
            slot,
            previous,
            value,
            previous_aggregate,
            aggregate: record.aggregate(),
        };

        if change.score_changed() {
            record.touch(revision);
            self.dirty.mark(sample_id, revision);
            debug!(
                sample_id = %sample_id,
                slot,
                aggregate = ?change.aggregate,
                "judge score recorded"
            );
        }

        Ok(change)
    }

    /// Current derived mean, `None` when no judge has scored.
    pub fn aggregate(&self, sample_id: &SampleId) -> Result<Option<f64>, ScoringError> {
        Ok(self.record(sample_id)?.aggregate())
    }

    pub fn record(&self, sample_id: &SampleId) -> Result<&ScoreRecord, ScoringError> {
        self.records
            .get(sample_id)
            .ok_or_else(|| NotFoundError::Sample(sample_id.clone()).into())
    }

    pub fn get(&self, sample_id: &SampleId) -> Option<&ScoreRecord> {
        self.records.get(sample_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &ScoreRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    pub fn is_dirty(&self, sample_id: &SampleId) -> bool {
        self.dirty.contains(sample_id)
    }

    /// Ids of every record that currently has an aggregate.
    pub fn scored_ids(&self) -> Vec<SampleId> {
        self.records
            .values()
            .filter(|record| record.aggregate().is_some())
            .map(|record| record.sample_id().clone())
            .collect()
    }

    /// Re-derives the aggregate from the stored scores. Marks the record dirty
    /// when the value moved. Returns the aggregate before and after.
    pub(crate) fn refresh_aggregate(
        &mut self,
        sample_id: &SampleId,
    ) -> Result<(Option<f64>, Option<f64>), ScoringError> {
        let revision = self.next_revision();
        let record = self
            .records
            .get_mut(sample_id)
            .ok_or_else(|| NotFoundError::Sample(sample_id.clone()))?;

        let before = record.aggregate();
        if record.recompute_aggregate() {
            record.touch(revision);
            self.dirty.mark(sample_id, revision);
        }
        Ok((before, record.aggregate()))
    }

    /// Stores a classifier result, marking the record dirty when it differs.
    pub(crate) fn apply_medal(
        &mut self,
        sample_id: &SampleId,
        medal: Option<String>,
    ) -> Result<bool, ScoringError> {
        let revision = self.next_revision();
        let record = self
            .records
            .get_mut(sample_id)
            .ok_or_else(|| NotFoundError::Sample(sample_id.clone()))?;

        let changed = record.assign_medal(medal);
        if changed {
            record.touch(revision);
            self.dirty.mark(sample_id, revision);
        }
        Ok(changed)
    }

    /// Captures every dirty record as a row for the persistence gateway.
    pub fn dirty_batch(&self) -> DirtyBatch {
        let rows = self
            .dirty
            .entries
            .iter()
            .filter_map(|(sample_id, revision)| {
                self.records.get(sample_id).map(|record| PendingRow {
                    row: record.to_row(),
                    revision: *revision,
                })
            })
            .collect();
        DirtyBatch { rows }
    }

    /// Clears the dirty mark of each confirmed sample whose revision still
    /// matches the snapshot. Returns how many ids were cleared.
    pub fn acknowledge<'a>(
        &mut self,
        batch: &DirtyBatch,
        succeeded: impl IntoIterator<Item = &'a SampleId>,
    ) -> usize {
        let mut cleared = 0;
        for sample_id in succeeded {
            let Some(revision) = batch.revision_of(sample_id) else {
                continue;
            };
            if self.dirty.confirm(sample_id, revision) {
                cleared += 1;
            } else {
                debug!(
                    sample_id = %sample_id,
                    "sample edited while its commit was in flight; keeping it dirty"
                );
            }
        }
        cleared
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

/// Slot bounds and the closed [0, 100] score domain. Absent values are always
/// accepted.
pub fn validate_score(
    sample_id: &SampleId,
    slot: usize,
    value: Option<f64>,
) -> Result<(), ValidationError> {
    if slot >= JUDGE_SLOTS {
        return Err(ValidationError::SlotOutOfRange {
            slot,
            slots: JUDGE_SLOTS,
        });
    }

    match value {
        Some(score) if !(MIN_SCORE..=MAX_SCORE).contains(&score) => {
            Err(ValidationError::ScoreOutOfRange {
                sample_id: sample_id.clone(),
                slot,
                value: score,
            })
        }
        _ => Ok(()),
    }
}
