use contest_scoring::scoring::{
    BandId, BandStore, MedalBand, PersistenceError, SampleId, SampleRow, SampleStore, MAX_SCORE,
    MIN_SCORE,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, PersistenceError> {
    mutex
        .lock()
        .map_err(|_| PersistenceError::Unavailable("in-memory table poisoned".to_string()))
}

/// Sample table kept in process memory; stands in for the contest database.
#[derive(Default, Clone)]
pub(crate) struct InMemorySampleStore {
    rows: Arc<Mutex<BTreeMap<SampleId, SampleRow>>>,
}

impl InMemorySampleStore {
    pub(crate) fn rows(&self) -> Vec<SampleRow> {
        lock(&self.rows)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl SampleStore for InMemorySampleStore {
    fn persist(
        &self,
        row: SampleRow,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        let outcome = lock(&self.rows).map(|mut rows| {
            rows.insert(row.sample_id.clone(), row);
        });
        async move { outcome }
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryBandStore {
    bands: Arc<Mutex<Vec<MedalBand>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryBandStore {
    pub(crate) fn with_bands(bands: Vec<MedalBand>) -> Self {
        Self {
            bands: Arc::new(Mutex::new(bands)),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl BandStore for InMemoryBandStore {
    fn list(&self) -> impl Future<Output = Result<Vec<MedalBand>, PersistenceError>> + Send {
        let outcome = lock(&self.bands).map(|bands| bands.clone());
        async move { outcome }
    }

    fn save(
        &self,
        mut band: MedalBand,
    ) -> impl Future<Output = Result<BandId, PersistenceError>> + Send {
        let outcome = lock(&self.bands).map(|mut bands| {
            let id = band.id.clone().unwrap_or_else(|| {
                let next = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                BandId::new(format!("band-{next}"))
            });
            band.id = Some(id.clone());
            match bands.iter_mut().find(|stored| stored.id == band.id) {
                Some(stored) => *stored = band,
                None => bands.push(band),
            }
            id
        });
        async move { outcome }
    }

    fn delete(&self, id: BandId) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        let outcome = lock(&self.bands).and_then(|mut bands| {
            let before = bands.len();
            bands.retain(|stored| stored.id.as_ref() != Some(&id));
            if bands.len() == before {
                Err(PersistenceError::Conflict(format!("band {id} not stored")))
            } else {
                Ok(())
            }
        });
        async move { outcome }
    }
}

/// Medal table used when no band store is configured.
pub(crate) fn default_medal_bands() -> Vec<MedalBand> {
    vec![
        MedalBand::new("Gran Oro", 94.0, 100.0, 1)
            .with_id("gran-oro")
            .with_color("#b8860b"),
        MedalBand::new("Oro", 90.0, 93.99, 2)
            .with_id("oro")
            .with_color("#ffd700"),
        MedalBand::new("Plata", 85.0, 89.99, 3)
            .with_id("plata")
            .with_color("#c0c0c0"),
    ]
}

pub(crate) fn parse_score(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|err| format!("failed to parse '{raw}' as a score ({err})"))?;
    if !(MIN_SCORE..=MAX_SCORE).contains(&value) {
        return Err(format!("score {value} outside {MIN_SCORE}..={MAX_SCORE}"));
    }
    Ok(value)
}

/// Parses `label:min:max:order`. The label may itself contain colons.
pub(crate) fn parse_band(raw: &str) -> Result<MedalBand, String> {
    let mut parts = raw.trim().rsplitn(4, ':');
    let (Some(order), Some(max), Some(min), Some(label)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected label:min:max:order, got '{raw}'"));
    };
    if label.is_empty() {
        return Err(format!("band '{raw}' has an empty label"));
    }

    let bound = |value: &str| {
        value
            .parse::<f64>()
            .map_err(|err| format!("failed to parse band bound '{value}' ({err})"))
    };
    let order = order
        .parse::<i32>()
        .map_err(|err| format!("failed to parse band order '{order}' ({err})"))?;

    Ok(MedalBand::new(label, bound(min)?, bound(max)?, order))
}
