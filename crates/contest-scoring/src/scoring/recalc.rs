use serde::Serialize;
use tracing::{debug, info};

use super::classifier;
use super::domain::{same_value, MedalBand, SampleId};
use super::error::ScoringError;
use super::store::ScoreRecordStore;

/// A record whose medal changed during recalculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reclassification {
    pub sample_id: SampleId,
    pub previous: Option<String>,
    pub medal: Option<String>,
}

/// Outcome of re-running classification after the bands changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BandsRecalculation {
    /// Records with an aggregate; each one was classified again.
    pub examined: usize,
    pub reclassified: Vec<Reclassification>,
}

/// Outcome of recalculating a single record after a score edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecalculation {
    pub sample_id: SampleId,
    pub aggregate: Option<f64>,
    pub medal: Option<String>,
    pub aggregate_changed: bool,
    pub medal_changed: bool,
}

/// Re-derives aggregates and medals in response to the two triggering events:
/// a score edit and a band registry edit. Stateless; the store tracks what
/// became dirty.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecalculationCoordinator;

impl RecalculationCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Classifies every scored record against `bands`, marking records whose
    /// medal changed. All scored records are visited, including no-ops.
    pub fn on_bands_changed(
        &self,
        bands: &[MedalBand],
        store: &mut ScoreRecordStore,
    ) -> BandsRecalculation {
        let mut outcome = BandsRecalculation::default();

        for sample_id in store.scored_ids() {
            outcome.examined += 1;
            let Some(record) = store.get(&sample_id) else {
                continue;
            };
            let previous = record.medal().map(str::to_owned);
            let medal = classifier::classify(record.aggregate(), bands).map(str::to_owned);
            if previous == medal {
                continue;
            }

            match store.apply_medal(&sample_id, medal.clone()) {
                Ok(true) => outcome.reclassified.push(Reclassification {
                    sample_id,
                    previous,
                    medal,
                }),
                Ok(false) => {}
                Err(err) => debug!(%err, "record vanished during recalculation"),
            }
        }

        info!(
            examined = outcome.examined,
            reclassified = outcome.reclassified.len(),
            "medal bands recalculated"
        );
        outcome
    }

    /// Recomputes the aggregate and then the medal of one record.
    pub fn on_score_changed(
        &self,
        sample_id: &SampleId,
        bands: &[MedalBand],
        store: &mut ScoreRecordStore,
    ) -> Result<ScoreRecalculation, ScoringError> {
        let (before, aggregate) = store.refresh_aggregate(sample_id)?;
        let medal = classifier::classify(aggregate, bands).map(str::to_owned);
        let medal_changed = store.apply_medal(sample_id, medal.clone())?;

        debug!(
            sample_id = %sample_id,
            ?aggregate,
            ?medal,
            medal_changed,
            "sample recalculated"
        );

        Ok(ScoreRecalculation {
            sample_id: sample_id.clone(),
            aggregate,
            medal,
            aggregate_changed: !same_value(before, aggregate),
            medal_changed,
        })
    }
}
