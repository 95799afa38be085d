use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use contest_scoring::config::ScoringConfig;
use contest_scoring::scoring::{
    BandId, BandStore, MedalBand, PersistenceError, PersistenceErrorKind, SampleId, SampleRow,
    SampleStore, ScoringService,
};

#[derive(Default)]
struct TableStore {
    rows: Mutex<HashMap<SampleId, SampleRow>>,
    locked: Mutex<Vec<SampleId>>,
}

impl SampleStore for TableStore {
    fn persist(&self, row: SampleRow) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        async move {
            if self.locked.lock().expect("lock").contains(&row.sample_id) {
                return Err(PersistenceError::Conflict(format!(
                    "row {} locked by another session",
                    row.sample_id
                )));
            }
            self.rows
                .lock()
                .expect("lock")
                .insert(row.sample_id.clone(), row);
            Ok(())
        }
    }
}

struct FixedBands(Vec<MedalBand>);

impl BandStore for FixedBands {
    fn list(&self) -> impl Future<Output = Result<Vec<MedalBand>, PersistenceError>> + Send {
        let bands = self.0.clone();
        async move { Ok(bands) }
    }

    fn save(
        &self,
        band: MedalBand,
    ) -> impl Future<Output = Result<BandId, PersistenceError>> + Send {
        async move { Ok(band.id.unwrap_or_else(|| BandId::new(format!("saved-{}", band.label)))) }
    }

    fn delete(&self, _id: BandId) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        async { Ok(()) }
    }
}

async fn service(
    concurrency: Option<usize>,
) -> (Arc<ScoringService<TableStore, FixedBands>>, Arc<TableStore>) {
    let samples = Arc::new(TableStore::default());
    let bands = Arc::new(FixedBands(vec![
        MedalBand::new("Oro", 90.0, 100.0, 0).with_id("b-oro"),
        MedalBand::new("Plata", 80.0, 89.99, 1).with_id("b-plata"),
    ]));
    let config = ScoringConfig {
        commit_concurrency: concurrency.and_then(NonZeroUsize::new),
    };
    let service = Arc::new(ScoringService::new(samples.clone(), bands, &config));
    service.load_bands().await.expect("bands load");
    (service, samples)
}

#[tokio::test]
async fn failed_rows_stay_dirty_and_succeed_on_retry() {
    let (service, samples) = service(Some(2)).await;
    for (id, value) in [("t-1", 92.0), ("t-2", 84.0), ("t-3", 70.0)] {
        let sample_id = SampleId::new(id);
        service.open_sample(sample_id.clone()).expect("opens");
        service
            .set_score(&sample_id, 0, Some(value))
            .expect("score accepted");
    }
    samples.locked.lock().expect("lock").push(SampleId::new("t-2"));

    let report = service.commit_dirty().await;
    assert_eq!(report.attempted(), 3);
    assert_eq!(
        report.succeeded,
        vec![SampleId::new("t-1"), SampleId::new("t-3")]
    );
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].error_kind, PersistenceErrorKind::Conflict);
    assert_eq!(service.dirty_ids(), vec![SampleId::new("t-2")]);

    let stored = samples
        .rows
        .lock()
        .expect("lock")
        .get(&SampleId::new("t-1"))
        .cloned()
        .expect("row written");
    assert_eq!(stored.aggregate, Some(92.0));
    assert_eq!(stored.medal.as_deref(), Some("Oro"));

    samples.locked.lock().expect("lock").clear();
    let retry = service.commit_dirty().await;
    assert!(retry.is_complete_success());
    assert_eq!(retry.succeeded, vec![SampleId::new("t-2")]);
    assert!(service.dirty_ids().is_empty());
}

#[tokio::test]
async fn empty_dirty_set_commits_nothing() {
    let (service, samples) = service(None).await;
    service.open_sample(SampleId::new("t-9")).expect("opens");

    let report = service.commit_dirty().await;

    assert_eq!(report.attempted(), 0);
    assert!(report.is_complete_success());
    assert!(samples.rows.lock().expect("lock").is_empty());
}
