//! Read-only views for export and reporting.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::SampleId;
use super::store::ScoreRecordStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandingsEntry {
    pub rank: usize,
    pub sample_id: SampleId,
    pub aggregate: f64,
    pub judges: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medal: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MedalTally {
    pub medals: BTreeMap<String, usize>,
    /// Scored samples that fall in no active band.
    pub unclassified: usize,
    /// Samples without any judge score.
    pub untasted: usize,
}

impl MedalTally {
    pub fn awarded(&self) -> usize {
        self.medals.values().sum()
    }
}

/// Scored samples by descending aggregate. Equal aggregates share a rank and
/// are listed by sample id.
pub fn standings(store: &ScoreRecordStore) -> Vec<StandingsEntry> {
    let mut scored: Vec<_> = store
        .records()
        .filter_map(|record| record.aggregate().map(|aggregate| (record, aggregate)))
        .collect();

    scored.sort_by(|(left, left_score), (right, right_score)| {
        right_score
            .partial_cmp(left_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.sample_id().cmp(right.sample_id()))
    });

    let mut entries: Vec<StandingsEntry> = Vec::with_capacity(scored.len());
    for (index, (record, aggregate)) in scored.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(previous) if previous.aggregate == aggregate => previous.rank,
            _ => index + 1,
        };
        entries.push(StandingsEntry {
            rank,
            sample_id: record.sample_id().clone(),
            aggregate,
            judges: record.scores().count(),
            medal: record.medal().map(str::to_owned),
        });
    }
    entries
}

pub fn medal_tally(store: &ScoreRecordStore) -> MedalTally {
    let mut tally = MedalTally::default();
    for record in store.records() {
        match (record.aggregate(), record.medal()) {
            (None, _) => tally.untasted += 1,
            (Some(_), Some(medal)) => *tally.medals.entry(medal.to_owned()).or_default() += 1,
            (Some(_), None) => tally.unclassified += 1,
        }
    }
    tally
}
