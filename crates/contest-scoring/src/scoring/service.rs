use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::info;

use super::bands::{BandUpsert, MalformedBandWarning, MedalBandRegistry, RegisteredBand};
use super::domain::{BandKey, BandRef, MedalBand, SampleId, SampleRow, ScoreRecord};
use super::error::ScoringError;
use super::gateway::{
    sync_bands, BandStore, BandSyncReport, BatchPersistenceGateway, CommitReport,
    PersistenceError, SampleStore,
};
use super::recalc::{BandsRecalculation, RecalculationCoordinator, ScoreRecalculation};
use super::report::{self, MedalTally, StandingsEntry};
use super::store::{ScoreChange, ScoreRecordStore};
use crate::config::ScoringConfig;

/// Result of a score edit: the raw change plus the recalculated medal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreUpdate {
    pub change: ScoreChange,
    pub recalculation: ScoreRecalculation,
    pub dirty: bool,
}

/// Result of a band registry edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upsert: Option<BandUpsert>,
    pub recalculation: BandsRecalculation,
}

/// Service composing the score store, band registry, recalculation
/// coordinator and persistence gateways.
///
/// Records and registry share one lock. It is never held across an `.await`,
/// so commits run while edits keep arriving.
pub struct ScoringService<S, B> {
    state: Mutex<ScoringState>,
    coordinator: RecalculationCoordinator,
    gateway: BatchPersistenceGateway<S>,
    band_store: Arc<B>,
    concurrency: Option<NonZeroUsize>,
}

#[derive(Debug, Default)]
struct ScoringState {
    records: ScoreRecordStore,
    registry: MedalBandRegistry,
}

impl ScoringState {
    fn recalculate_all(&mut self, coordinator: &RecalculationCoordinator) -> BandsRecalculation {
        let bands = self.registry.active_bands_ordered();
        coordinator.on_bands_changed(&bands, &mut self.records)
    }
}

impl<S, B> ScoringService<S, B>
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    pub fn new(samples: Arc<S>, band_store: Arc<B>, config: &ScoringConfig) -> Self {
        Self {
            state: Mutex::new(ScoringState::default()),
            coordinator: RecalculationCoordinator::new(),
            gateway: BatchPersistenceGateway::new(samples, config.commit_concurrency),
            band_store,
            concurrency: config.commit_concurrency,
        }
    }

    fn state(&self) -> MutexGuard<'_, ScoringState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the registry with the bands held by the band store and
    /// reclassifies every scored sample.
    pub async fn load_bands(&self) -> Result<BandsRecalculation, PersistenceError> {
        let bands = self.band_store.list().await?;
        let count = bands.len();

        let mut state = self.state();
        state.registry = MedalBandRegistry::from_persisted(bands);
        let outcome = state.recalculate_all(&self.coordinator);
        info!(bands = count, "medal bands loaded");
        Ok(outcome)
    }

    /// Hydrates samples from stored rows and classifies them with the current
    /// bands. An invalid row rejects the whole batch and loads nothing.
    pub fn load_samples(
        &self,
        rows: impl IntoIterator<Item = SampleRow>,
    ) -> Result<BandsRecalculation, ScoringError> {
        let mut state = self.state();
        state.records.hydrate_all(rows.into_iter().collect())?;
        Ok(state.recalculate_all(&self.coordinator))
    }

    pub fn open_sample(&self, sample_id: SampleId) -> Result<ScoreRecord, ScoringError> {
        let mut state = self.state();
        state.records.open_sample(sample_id).cloned()
    }

    /// Records one judge score, then recomputes aggregate and medal.
    pub fn set_score(
        &self,
        sample_id: &SampleId,
        slot: usize,
        value: Option<f64>,
    ) -> Result<ScoreUpdate, ScoringError> {
        let mut state = self.state();
        let change = state.records.set_score(sample_id, slot, value)?;
        let bands = state.registry.active_bands_ordered();
        let mut recalculation = self
            .coordinator
            .on_score_changed(sample_id, &bands, &mut state.records)?;
        // The store already re-derived the aggregate while writing the slot.
        recalculation.aggregate_changed |= change.aggregate_changed();
        let dirty = state.records.is_dirty(sample_id);

        Ok(ScoreUpdate {
            change,
            recalculation,
            dirty,
        })
    }

    pub fn upsert_band(&self, band: MedalBand) -> Result<BandEdit, ScoringError> {
        let mut state = self.state();
        let upsert = state.registry.upsert_band(band)?;
        let recalculation = state.recalculate_all(&self.coordinator);
        Ok(BandEdit {
            upsert: Some(upsert),
            recalculation,
        })
    }

    pub fn replace_draft(&self, key: BandKey, band: MedalBand) -> Result<BandEdit, ScoringError> {
        let mut state = self.state();
        let upsert = state.registry.replace_draft(key, band)?;
        let recalculation = state.recalculate_all(&self.coordinator);
        Ok(BandEdit {
            upsert: Some(upsert),
            recalculation,
        })
    }

    pub fn remove_band(&self, reference: &BandRef) -> Result<BandEdit, ScoringError> {
        let mut state = self.state();
        state.registry.remove_band(reference)?;
        let recalculation = state.recalculate_all(&self.coordinator);
        Ok(BandEdit {
            upsert: None,
            recalculation,
        })
    }

    /// Persists every dirty sample. Succeeded rows are cleared unless they were
    /// edited while the commit was running; failed rows stay dirty.
    pub async fn commit_dirty(&self) -> CommitReport {
        let batch = self.state().records.dirty_batch();
        let report = self.gateway.commit_dirty(&batch).await;

        let mut state = self.state();
        state.records.acknowledge(&batch, &report.succeeded);
        report
    }

    /// Saves unsaved bands and deletes removed ones in the band store.
    pub async fn sync_bands(&self) -> BandSyncReport {
        let plan = self.state().registry.sync_plan();
        let report = sync_bands(self.band_store.as_ref(), plan, self.concurrency).await;

        let mut state = self.state();
        for saved in &report.saved {
            state
                .registry
                .confirm_saved(saved.key, saved.revision, saved.id.clone());
        }
        for id in &report.deleted {
            state.registry.confirm_deleted(id);
        }
        report
    }

    pub fn record(&self, sample_id: &SampleId) -> Result<ScoreRecord, ScoringError> {
        self.state().records.record(sample_id).cloned()
    }

    pub fn records(&self) -> Vec<ScoreRecord> {
        self.state().records.records().cloned().collect()
    }

    pub fn aggregate(&self, sample_id: &SampleId) -> Result<Option<f64>, ScoringError> {
        self.state().records.aggregate(sample_id)
    }

    pub fn dirty_ids(&self) -> Vec<SampleId> {
        self.state().records.dirty().ids().cloned().collect()
    }

    pub fn bands(&self) -> Vec<RegisteredBand> {
        self.state().registry.bands().to_vec()
    }

    pub fn active_bands(&self) -> Vec<MedalBand> {
        self.state().registry.active_bands_ordered()
    }

    pub fn malformed_bands(&self) -> Vec<MalformedBandWarning> {
        self.state().registry.malformed_bands()
    }

    pub fn standings(&self) -> Vec<StandingsEntry> {
        report::standings(&self.state().records)
    }

    pub fn medal_tally(&self) -> MedalTally {
        report::medal_tally(&self.state().records)
    }
}
