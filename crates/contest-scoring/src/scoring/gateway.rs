use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::bands::BandSyncPlan;
use super::domain::{BandId, BandKey, MedalBand, SampleId, SampleRow};
use super::store::DirtyBatch;

/// Backing store for sample rows.
pub trait SampleStore: Send + Sync {
    /// Writes scores, aggregate, medal and the tasted flag of one sample.
    fn persist(&self, row: SampleRow) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Backing store for medal band rows.
pub trait BandStore: Send + Sync {
    fn list(&self) -> impl Future<Output = Result<Vec<MedalBand>, PersistenceError>> + Send;

    /// Inserts (no id) or updates a band and returns its id.
    fn save(&self, band: MedalBand)
        -> impl Future<Output = Result<BandId, PersistenceError>> + Send;

    fn delete(&self, id: BandId) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Failure of a single row write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("row rejected by store: {0}")]
    Rejected(String),
    #[error("row conflicts with stored data: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    pub fn kind(&self) -> PersistenceErrorKind {
        match self {
            PersistenceError::Rejected(_) => PersistenceErrorKind::Rejected,
            PersistenceError::Conflict(_) => PersistenceErrorKind::Conflict,
            PersistenceError::Unavailable(_) => PersistenceErrorKind::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceErrorKind {
    Rejected,
    Conflict,
    Unavailable,
}

/// A sample that could not be written; it stays dirty for the next attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedCommit {
    pub sample_id: SampleId,
    pub error_kind: PersistenceErrorKind,
    pub message: String,
}

/// Per-row outcome of a `commit_dirty` call. Every row of the batch appears in
/// exactly one of the two lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReport {
    pub succeeded: Vec<SampleId>,
    pub failed: Vec<FailedCommit>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CommitReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A band write that failed; the band stays unsaved or queued for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBandWrite {
    pub key: Option<BandKey>,
    pub id: Option<BandId>,
    pub error_kind: PersistenceErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedBand {
    pub key: BandKey,
    pub id: BandId,
    #[serde(skip)]
    pub revision: u64,
}

/// Per-row outcome of a band synchronisation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandSyncReport {
    pub saved: Vec<SavedBand>,
    pub deleted: Vec<BandId>,
    pub failed: Vec<FailedBandWrite>,
}

/// Commits dirty sample rows with independent per-row outcomes.
///
/// Rows are written concurrently, all at once or at most `concurrency` at a
/// time. A failing row never stops the others and never aborts the batch.
pub struct BatchPersistenceGateway<S> {
    store: Arc<S>,
    concurrency: Option<NonZeroUsize>,
}

impl<S> BatchPersistenceGateway<S>
where
    S: SampleStore,
{
    pub fn new(store: Arc<S>, concurrency: Option<NonZeroUsize>) -> Self {
        Self { store, concurrency }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn commit_dirty(&self, batch: &DirtyBatch) -> CommitReport {
        let started_at = Utc::now();
        let rows: Vec<SampleRow> = batch.rows.iter().map(|pending| pending.row.clone()).collect();
        let writes = rows.into_iter().map(|row| {
            let store = Arc::clone(&self.store);
            async move {
                let sample_id = row.sample_id.clone();
                (sample_id, store.persist(row).await)
            }
        });

        let outcomes = run_bounded(writes, self.concurrency).await;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (sample_id, outcome) in outcomes {
            match outcome {
                Ok(()) => succeeded.push(sample_id),
                Err(err) => {
                    warn!(sample_id = %sample_id, %err, "sample commit failed");
                    failed.push(FailedCommit {
                        sample_id,
                        error_kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }
        succeeded.sort();
        failed.sort_by(|left, right| left.sample_id.cmp(&right.sample_id));

        info!(
            attempted = batch.len(),
            succeeded = succeeded.len(),
            failed = failed.len(),
            "dirty samples committed"
        );

        CommitReport {
            succeeded,
            failed,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Saves unsaved bands and deletes removed ones, concurrently and independently.
pub async fn sync_bands<B>(
    store: &B,
    plan: BandSyncPlan,
    concurrency: Option<NonZeroUsize>,
) -> BandSyncReport
where
    B: BandStore,
{
    let BandSyncPlan { saves, deletions } = plan;

    let save_writes = saves.into_iter().map(|pending| async move {
        let outcome = store.save(pending.band.clone()).await;
        (pending, outcome)
    });
    let delete_writes = deletions.into_iter().map(|id| async move {
        let outcome = store.delete(id.clone()).await;
        (id, outcome)
    });

    let (save_outcomes, delete_outcomes) = futures::join!(
        run_bounded(save_writes, concurrency),
        run_bounded(delete_writes, concurrency)
    );

    let mut report = BandSyncReport {
        saved: Vec::new(),
        deleted: Vec::new(),
        failed: Vec::new(),
    };

    for (pending, outcome) in save_outcomes {
        match outcome {
            Ok(id) => report.saved.push(SavedBand {
                key: pending.key,
                id,
                revision: pending.revision,
            }),
            Err(err) => {
                warn!(label = %pending.band.label, %err, "medal band save failed");
                report.failed.push(FailedBandWrite {
                    key: Some(pending.key),
                    id: pending.band.id,
                    error_kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }

    for (id, outcome) in delete_outcomes {
        match outcome {
            Ok(()) => report.deleted.push(id),
            Err(err) => {
                warn!(band_id = %id, %err, "medal band delete failed");
                report.failed.push(FailedBandWrite {
                    key: None,
                    id: Some(id),
                    error_kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }

    report.saved.sort_by_key(|saved| saved.key);
    report.deleted.sort();
    info!(
        saved = report.saved.len(),
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "medal bands synchronised"
    );
    report
}

async fn run_bounded<I, F, T>(writes: I, concurrency: Option<NonZeroUsize>) -> Vec<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T>,
{
    match concurrency {
        Some(limit) => {
            stream::iter(writes)
                .buffer_unordered(limit.get())
                .collect()
                .await
        }
        None => join_all(writes).await,
    }
}
