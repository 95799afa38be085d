use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::aggregate;

/// Number of judge slots carried by every sample.
pub const JUDGE_SLOTS: usize = 5;
/// Lowest score a judge may record.
pub const MIN_SCORE: f64 = 0.0;
/// Highest score a judge may record.
pub const MAX_SCORE: f64 = 100.0;

/// Stable identifier of a contest sample, owned by the sample store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(pub String);

impl SampleId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned to a medal band once the band store has saved it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandId(pub String);

impl BandId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for BandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry-local handle for a band. Keys grow with insertion, so they double
/// as the tie-breaker between bands sharing the same `order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandKey(pub u64);

impl fmt::Display for BandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "draft-{}", self.0)
    }
}

/// Addresses a band either by its persisted id or, for unsaved drafts, by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum BandRef {
    Persisted(BandId),
    Draft(BandKey),
}

/// Judge scores in slot order; `None` means the judge has not scored yet.
///
/// Values are range-checked before they get here, so the type only exposes
/// read access outside the crate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct JudgeScores([Option<f64>; JUDGE_SLOTS]);

impl JudgeScores {
    pub const fn empty() -> Self {
        Self([None; JUDGE_SLOTS])
    }

    pub(crate) const fn from_validated(slots: [Option<f64>; JUDGE_SLOTS]) -> Self {
        Self(slots)
    }

    pub fn get(&self, slot: usize) -> Option<f64> {
        self.0.get(slot).copied().flatten()
    }

    pub fn slots(&self) -> &[Option<f64>; JUDGE_SLOTS] {
        &self.0
    }

    pub fn present(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().filter_map(|slot| *slot)
    }

    pub fn count(&self) -> usize {
        self.present().count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub(crate) fn set(&mut self, slot: usize, value: Option<f64>) -> Option<f64> {
        std::mem::replace(&mut self.0[slot], value)
    }
}

/// One sample in the tasting workflow together with its derived values.
///
/// `aggregate` is only ever written by [`ScoreRecord::recompute_aggregate`],
/// which derives it from `scores`; `medal` is written by the recalculation
/// coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    sample_id: SampleId,
    scores: JudgeScores,
    aggregate: Option<f64>,
    medal: Option<String>,
    #[serde(skip)]
    revision: u64,
}

impl ScoreRecord {
    pub(crate) fn new(sample_id: SampleId, scores: JudgeScores, revision: u64) -> Self {
        let mut record = Self {
            sample_id,
            scores,
            aggregate: None,
            medal: None,
            revision,
        };
        record.recompute_aggregate();
        record
    }

    pub fn sample_id(&self) -> &SampleId {
        &self.sample_id
    }

    pub fn scores(&self) -> &JudgeScores {
        &self.scores
    }

    pub fn aggregate(&self) -> Option<f64> {
        self.aggregate
    }

    pub fn medal(&self) -> Option<&str> {
        self.medal.as_deref()
    }

    /// Whether the sample counts as tasted (`catada`) in the backing store.
    pub fn is_tasted(&self) -> bool {
        self.aggregate.is_some()
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn touch(&mut self, revision: u64) {
        self.revision = revision;
    }

    /// Writes one slot and re-derives the aggregate. Returns the previous value.
    pub(crate) fn assign_slot(&mut self, slot: usize, value: Option<f64>) -> Option<f64> {
        let previous = self.scores.set(slot, value);
        self.recompute_aggregate();
        previous
    }

    /// Re-derives the aggregate from the scores, returning `true` when it moved.
    pub(crate) fn recompute_aggregate(&mut self) -> bool {
        let next = aggregate::mean_of_present(&self.scores);
        let changed = !same_value(self.aggregate, next);
        self.aggregate = next;
        changed
    }

    pub(crate) fn assign_medal(&mut self, medal: Option<String>) -> bool {
        if self.medal == medal {
            return false;
        }
        self.medal = medal;
        true
    }

    pub fn to_row(&self) -> SampleRow {
        SampleRow {
            sample_id: self.sample_id.clone(),
            scores: *self.scores.slots(),
            aggregate: self.aggregate,
            medal: self.medal.clone(),
            tasted: self.is_tasted().then_some(true),
        }
    }
}

/// Row shape exchanged with the sample store: five nullable score columns, a
/// nullable aggregate, a nullable medal and the `catada` flag.
///
/// `tasted` is `Some(true)` whenever an aggregate exists and `None` otherwise,
/// in which case the store leaves its column untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub sample_id: SampleId,
    #[serde(default)]
    pub scores: [Option<f64>; JUDGE_SLOTS],
    #[serde(default)]
    pub aggregate: Option<f64>,
    #[serde(default)]
    pub medal: Option<String>,
    #[serde(default)]
    pub tasted: Option<bool>,
}

impl SampleRow {
    pub fn unscored(sample_id: SampleId) -> Self {
        Self {
            sample_id,
            scores: [None; JUDGE_SLOTS],
            aggregate: None,
            medal: None,
            tasted: None,
        }
    }
}

/// A configured scoring interval. Bounds are inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedalBand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BandId>,
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub order: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Display color reference; carried through to the store untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn default_active() -> bool {
    true
}

impl MedalBand {
    pub fn new(label: impl Into<String>, min: f64, max: f64, order: i32) -> Self {
        Self {
            id: None,
            label: label.into(),
            min,
            max,
            order,
            active: true,
            color: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(BandId::new(id));
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn contains(&self, aggregate: f64) -> bool {
        self.min <= aggregate && aggregate <= self.max
    }

    /// `min > max` or a NaN bound: such a band can never match.
    pub fn is_malformed(&self) -> bool {
        !matches!(
            self.min.partial_cmp(&self.max),
            Some(Ordering::Less | Ordering::Equal)
        )
    }
}

pub(crate) fn same_value(left: Option<f64>, right: Option<f64>) -> bool {
    match (left, right) {
        (Some(a), Some(b)) => a.to_bits() == b.to_bits(),
        (None, None) => true,
        _ => false,
    }
}
