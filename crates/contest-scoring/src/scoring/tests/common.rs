use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;
use tokio::sync::Notify;

use crate::config::ScoringConfig;
use crate::scoring::domain::{BandId, MedalBand, SampleId, SampleRow};
use crate::scoring::gateway::{BandStore, PersistenceError, SampleStore};
use crate::scoring::service::ScoringService;
use crate::scoring::store::ScoreRecordStore;

pub(super) fn sample(id: &str) -> SampleId {
    SampleId::new(id)
}

pub(super) fn contest_bands() -> Vec<MedalBand> {
    vec![
        MedalBand::new("Gran Oro", 94.0, 100.0, 1).with_id("band-gran-oro"),
        MedalBand::new("Oro", 90.0, 93.99, 2).with_id("band-oro"),
        MedalBand::new("Plata", 85.0, 89.99, 3).with_id("band-plata"),
    ]
}

pub(super) fn scored_store(samples: &[(&str, &[f64])]) -> ScoreRecordStore {
    let mut store = ScoreRecordStore::new();
    for (id, scores) in samples {
        let sample_id = sample(id);
        store.open_sample(sample_id.clone()).expect("sample opens");
        for (slot, score) in scores.iter().enumerate() {
            store
                .set_score(&sample_id, slot, Some(*score))
                .expect("score accepted");
        }
    }
    store
}

pub(super) type MemoryService = ScoringService<MemorySampleStore, MemoryBandStore>;

pub(super) async fn build_service() -> (
    Arc<MemoryService>,
    Arc<MemorySampleStore>,
    Arc<MemoryBandStore>,
) {
    let samples = Arc::new(MemorySampleStore::default());
    let bands = Arc::new(MemoryBandStore::with_bands(contest_bands()));
    let service = Arc::new(ScoringService::new(
        samples.clone(),
        bands.clone(),
        &ScoringConfig::default(),
    ));
    service.load_bands().await.expect("bands load");
    (service, samples, bands)
}

#[derive(Default)]
pub(super) struct MemorySampleStore {
    rows: Mutex<BTreeMap<SampleId, SampleRow>>,
    writes: AtomicU64,
    failing: Mutex<HashSet<SampleId>>,
}

impl MemorySampleStore {
    pub(super) fn fail_for(&self, sample_id: &SampleId) {
        self.failing
            .lock()
            .expect("failing mutex poisoned")
            .insert(sample_id.clone());
    }

    pub(super) fn recover(&self, sample_id: &SampleId) {
        self.failing
            .lock()
            .expect("failing mutex poisoned")
            .remove(sample_id);
    }

    pub(super) fn row(&self, sample_id: &SampleId) -> Option<SampleRow> {
        self.rows
            .lock()
            .expect("rows mutex poisoned")
            .get(sample_id)
            .cloned()
    }

    pub(super) fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SampleStore for MemorySampleStore {
    fn persist(&self, row: SampleRow) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        async move {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failing
                .lock()
                .expect("failing mutex poisoned")
                .contains(&row.sample_id);
            if failing {
                return Err(PersistenceError::Unavailable(format!(
                    "write for {} timed out",
                    row.sample_id
                )));
            }
            self.rows
                .lock()
                .expect("rows mutex poisoned")
                .insert(row.sample_id.clone(), row);
            Ok(())
        }
    }
}

/// Holds every write until the test releases it.
#[derive(Default)]
pub(super) struct GatedSampleStore {
    pub(super) entered: Notify,
    pub(super) release: Notify,
    pub(super) rows: Mutex<Vec<SampleRow>>,
}

impl SampleStore for GatedSampleStore {
    fn persist(&self, row: SampleRow) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        async move {
            self.entered.notify_one();
            self.release.notified().await;
            self.rows.lock().expect("rows mutex poisoned").push(row);
            Ok(())
        }
    }
}

#[derive(Default)]
pub(super) struct MemoryBandStore {
    bands: Mutex<Vec<MedalBand>>,
    sequence: AtomicU64,
    reject_labels: Mutex<HashSet<String>>,
}

impl MemoryBandStore {
    pub(super) fn with_bands(bands: Vec<MedalBand>) -> Self {
        Self {
            bands: Mutex::new(bands),
            ..Self::default()
        }
    }

    pub(super) fn reject_label(&self, label: &str) {
        self.reject_labels
            .lock()
            .expect("reject mutex poisoned")
            .insert(label.to_string());
    }

    pub(super) fn stored(&self) -> Vec<MedalBand> {
        self.bands.lock().expect("bands mutex poisoned").clone()
    }
}

impl BandStore for MemoryBandStore {
    fn list(&self) -> impl Future<Output = Result<Vec<MedalBand>, PersistenceError>> + Send {
        async move { Ok(self.stored()) }
    }

    fn save(
        &self,
        mut band: MedalBand,
    ) -> impl Future<Output = Result<BandId, PersistenceError>> + Send {
        async move {
            let rejected = self
                .reject_labels
                .lock()
                .expect("reject mutex poisoned")
                .contains(&band.label);
            if rejected {
                return Err(PersistenceError::Rejected(format!(
                    "label '{}' refused",
                    band.label
                )));
            }

            let mut bands = self.bands.lock().expect("bands mutex poisoned");
            let id = band.id.clone().unwrap_or_else(|| {
                let next = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                BandId::new(format!("band-{next}"))
            });
            band.id = Some(id.clone());
            match bands.iter_mut().find(|stored| stored.id == band.id) {
                Some(stored) => *stored = band,
                None => bands.push(band),
            }
            Ok(id)
        }
    }

    fn delete(&self, id: BandId) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        async move {
            let mut bands = self.bands.lock().expect("bands mutex poisoned");
            let before = bands.len();
            bands.retain(|stored| stored.id.as_ref() != Some(&id));
            if bands.len() == before {
                return Err(PersistenceError::Conflict(format!("band {id} already gone")));
            }
            Ok(())
        }
    }
}

/// Holds every band save until the test releases it; lists and deletes pass
/// straight through.
pub(super) struct GatedBandStore {
    pub(super) entered: Notify,
    pub(super) release: Notify,
    pub(super) inner: MemoryBandStore,
}

impl GatedBandStore {
    pub(super) fn with_bands(bands: Vec<MedalBand>) -> Self {
        Self {
            entered: Notify::new(),
            release: Notify::new(),
            inner: MemoryBandStore::with_bands(bands),
        }
    }
}

impl BandStore for GatedBandStore {
    fn list(&self) -> impl Future<Output = Result<Vec<MedalBand>, PersistenceError>> + Send {
        self.inner.list()
    }

    fn save(
        &self,
        band: MedalBand,
    ) -> impl Future<Output = Result<BandId, PersistenceError>> + Send {
        async move {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.save(band).await
        }
    }

    fn delete(&self, id: BandId) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        self.inner.delete(id)
    }
}

/// Band store for sample-only tests.
#[derive(Default)]
pub(super) struct NoBands;

impl BandStore for NoBands {
    fn list(&self) -> impl Future<Output = Result<Vec<MedalBand>, PersistenceError>> + Send {
        async { Ok(contest_bands()) }
    }

    fn save(
        &self,
        _band: MedalBand,
    ) -> impl Future<Output = Result<BandId, PersistenceError>> + Send {
        async { Err(PersistenceError::Unavailable("read only".to_string())) }
    }

    fn delete(&self, _id: BandId) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        async { Err(PersistenceError::Unavailable("read only".to_string())) }
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
