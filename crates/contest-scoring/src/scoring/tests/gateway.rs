use std::num::NonZeroUsize;
use std::sync::Arc;

use super::common::*;
use crate::scoring::bands::MedalBandRegistry;
use crate::scoring::domain::{BandId, BandRef, MedalBand};
use crate::scoring::gateway::{sync_bands, BatchPersistenceGateway, PersistenceErrorKind};

#[tokio::test]
async fn one_failing_row_does_not_stop_the_batch() {
    let store = Arc::new(MemorySampleStore::default());
    store.fail_for(&sample("s-3"));
    let gateway = BatchPersistenceGateway::new(store.clone(), None);

    let mut records = scored_store(&[
        ("s-1", &[80.0]),
        ("s-2", &[81.0]),
        ("s-3", &[82.0]),
        ("s-4", &[83.0]),
    ]);
    let batch = records.dirty_batch();

    let report = gateway.commit_dirty(&batch).await;
    assert_eq!(report.attempted(), 4);
    assert_eq!(
        report.succeeded,
        vec![sample("s-1"), sample("s-2"), sample("s-4")]
    );
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].sample_id, sample("s-3"));
    assert_eq!(report.failed[0].error_kind, PersistenceErrorKind::Unavailable);
    assert_eq!(store.writes(), 4);

    records.acknowledge(&batch, &report.succeeded);
    let dirty: Vec<_> = records.dirty().ids().cloned().collect();
    assert_eq!(dirty, vec![sample("s-3")]);
}

#[tokio::test]
async fn bounded_concurrency_still_attempts_every_row() {
    let store = Arc::new(MemorySampleStore::default());
    let gateway = BatchPersistenceGateway::new(store.clone(), NonZeroUsize::new(2));
    let records = scored_store(&[
        ("s-1", &[70.0]),
        ("s-2", &[71.0]),
        ("s-3", &[72.0]),
        ("s-4", &[73.0]),
        ("s-5", &[74.0]),
    ]);

    let report = gateway.commit_dirty(&records.dirty_batch()).await;
    assert!(report.is_complete_success());
    assert_eq!(report.succeeded.len(), 5);
    assert_eq!(
        store.row(&sample("s-5")).and_then(|row| row.aggregate),
        Some(74.0)
    );
    assert!(report.finished_at >= report.started_at);
}

#[tokio::test]
async fn empty_batch_reports_nothing() {
    let store = Arc::new(MemorySampleStore::default());
    let gateway = BatchPersistenceGateway::new(store.clone(), None);
    let records = scored_store(&[]);

    let report = gateway.commit_dirty(&records.dirty_batch()).await;
    assert_eq!(report.attempted(), 0);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn band_sync_isolates_failures() {
    let store = MemoryBandStore::with_bands(contest_bands());
    store.reject_label("Bronce");

    let mut registry = MedalBandRegistry::from_persisted(store.stored());
    registry
        .upsert_band(MedalBand::new("Mención", 80.0, 84.99, 4))
        .expect("draft");
    registry
        .upsert_band(MedalBand::new("Bronce", 75.0, 79.99, 5))
        .expect("draft");
    registry
        .remove_band(&BandRef::Persisted(BandId::new("band-plata")))
        .expect("removed");

    let report = sync_bands(&store, registry.sync_plan(), None).await;

    assert_eq!(report.saved.len(), 1);
    assert_eq!(report.deleted, vec![BandId::new("band-plata")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].error_kind, PersistenceErrorKind::Rejected);

    let labels: Vec<_> = store
        .stored()
        .into_iter()
        .map(|band| band.label)
        .collect();
    assert!(labels.contains(&"Mención".to_string()));
    assert!(!labels.contains(&"Plata".to_string()));
    assert!(!labels.contains(&"Bronce".to_string()));
}

#[tokio::test]
async fn deleting_missing_band_is_reported() {
    let store = MemoryBandStore::default();
    let mut registry = MedalBandRegistry::from_persisted(vec![
        MedalBand::new("Oro", 90.0, 100.0, 1).with_id("b-1"),
    ]);
    registry
        .remove_band(&BandRef::Persisted(BandId::new("b-1")))
        .expect("removed locally");

    let report = sync_bands(&store, registry.sync_plan(), NonZeroUsize::new(1)).await;
    assert!(report.deleted.is_empty());
    assert_eq!(report.failed[0].id, Some(BandId::new("b-1")));
    assert_eq!(report.failed[0].error_kind, PersistenceErrorKind::Conflict);
}

#[tokio::test]
async fn commit_runs_on_a_spawned_task() {
    let store = Arc::new(MemorySampleStore::default());
    let gateway = Arc::new(BatchPersistenceGateway::new(
        store.clone(),
        NonZeroUsize::new(2),
    ));
    let records = scored_store(&[("s-1", &[88.0]), ("s-2", &[92.0])]);
    let batch = records.dirty_batch();

    let report = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.commit_dirty(&batch).await }
    })
    .await
    .expect("commit task");

    assert_eq!(report.succeeded, vec![sample("s-1"), sample("s-2")]);
    assert!(store.row(&sample("s-2")).is_some());
}
