use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;

use super::domain::{BandId, BandKey, BandRef, MedalBand, SampleId, JUDGE_SLOTS};
use super::error::ScoringError;
use super::gateway::{BandStore, SampleStore};
use super::service::ScoringService;

#[derive(Debug, Deserialize)]
pub(crate) struct OpenSampleRequest {
    pub(crate) sample_id: SampleId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScoreRequest {
    #[serde(default)]
    pub(crate) value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BandRequest {
    #[serde(flatten)]
    pub(crate) band: MedalBand,
    /// Edits an unsaved draft instead of inserting a new band.
    #[serde(default)]
    pub(crate) draft_key: Option<BandKey>,
}

/// Router builder exposing the scoring service as JSON endpoints.
pub fn scoring_router<S, B>(service: Arc<ScoringService<S, B>>) -> Router
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/samples",
            get(list_samples_handler::<S, B>).post(open_sample_handler::<S, B>),
        )
        .route("/api/v1/samples/:sample_id", get(sample_handler::<S, B>))
        .route(
            "/api/v1/samples/:sample_id/scores/:slot",
            put(set_score_handler::<S, B>),
        )
        .route(
            "/api/v1/bands",
            get(list_bands_handler::<S, B>).post(upsert_band_handler::<S, B>),
        )
        .route("/api/v1/bands/:band_id", delete(remove_band_handler::<S, B>))
        .route(
            "/api/v1/drafts/:draft_key",
            delete(remove_draft_handler::<S, B>),
        )
        .route("/api/v1/scoring/commit", post(commit_handler::<S, B>))
        .route("/api/v1/scoring/sync-bands", post(sync_bands_handler::<S, B>))
        .route("/api/v1/standings", get(standings_handler::<S, B>))
        .route("/api/v1/medals/tally", get(tally_handler::<S, B>))
        .with_state(service)
}

fn scoring_error_response(error: ScoringError) -> Response {
    AppError::from(error).into_response()
}

pub(crate) async fn list_samples_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    (StatusCode::OK, axum::Json(service.records())).into_response()
}

pub(crate) async fn open_sample_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
    axum::Json(request): axum::Json<OpenSampleRequest>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    match service.open_sample(request.sample_id) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record)).into_response(),
        Err(ScoringError::Validation(error)) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        Err(other) => scoring_error_response(other),
    }
}

pub(crate) async fn sample_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
    Path(sample_id): Path<String>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    match service.record(&SampleId(sample_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => scoring_error_response(error),
    }
}

pub(crate) async fn set_score_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
    Path((sample_id, slot)): Path<(String, usize)>,
    axum::Json(request): axum::Json<ScoreRequest>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    let Some(index) = slot.checked_sub(1) else {
        let payload = json!({
            "error": format!("judge slots are numbered 1 to {JUDGE_SLOTS}"),
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    };

    match service.set_score(&SampleId(sample_id), index, request.value) {
        Ok(update) => (StatusCode::OK, axum::Json(update)).into_response(),
        Err(error) => scoring_error_response(error),
    }
}

pub(crate) async fn list_bands_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    let payload = json!({
        "bands": service.bands(),
        "malformed": service.malformed_bands(),
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn upsert_band_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
    axum::Json(request): axum::Json<BandRequest>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    let outcome = match request.draft_key {
        Some(key) => service.replace_draft(key, request.band),
        None => service.upsert_band(request.band),
    };

    match outcome {
        Ok(edit) => (StatusCode::OK, axum::Json(edit)).into_response(),
        Err(error) => scoring_error_response(error),
    }
}

pub(crate) async fn remove_band_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
    Path(band_id): Path<String>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    match service.remove_band(&BandRef::Persisted(BandId(band_id))) {
        Ok(edit) => (StatusCode::OK, axum::Json(edit)).into_response(),
        Err(error) => scoring_error_response(error),
    }
}

pub(crate) async fn remove_draft_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
    Path(draft_key): Path<u64>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    match service.remove_band(&BandRef::Draft(BandKey(draft_key))) {
        Ok(edit) => (StatusCode::OK, axum::Json(edit)).into_response(),
        Err(error) => scoring_error_response(error),
    }
}

pub(crate) async fn commit_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    let report = service.commit_dirty().await;
    let status = if report.is_complete_success() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    (status, axum::Json(report)).into_response()
}

pub(crate) async fn sync_bands_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    let report = service.sync_bands().await;
    let status = if report.failed.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    (status, axum::Json(report)).into_response()
}

pub(crate) async fn standings_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    (StatusCode::OK, axum::Json(service.standings())).into_response()
}

pub(crate) async fn tally_handler<S, B>(
    State(service): State<Arc<ScoringService<S, B>>>,
) -> Response
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    (StatusCode::OK, axum::Json(service.medal_tally())).into_response()
}
