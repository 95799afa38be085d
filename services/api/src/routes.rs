use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use contest_scoring::scoring::{scoring_router, BandStore, SampleStore, ScoringService};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_scoring_routes<S, B>(service: Arc<ScoringService<S, B>>) -> axum::Router
where
    S: SampleStore + 'static,
    B: BandStore + 'static,
{
    scoring_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{default_medal_bands, InMemoryBandStore, InMemorySampleStore};
    use axum::body::Body;
    use axum::http::Request;
    use contest_scoring::config::ScoringConfig;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    async fn app(ready: bool) -> (axum::Router, Arc<AtomicBool>) {
        let service = Arc::new(ScoringService::new(
            Arc::new(InMemorySampleStore::default()),
            Arc::new(InMemoryBandStore::with_bands(default_medal_bands())),
            &ScoringConfig::default(),
        ));
        service.load_bands().await.expect("bands load");

        let readiness = Arc::new(AtomicBool::new(ready));
        let state = AppState {
            readiness: readiness.clone(),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        (with_scoring_routes(service).layer(Extension(state)), readiness)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json payload")
    }

    #[tokio::test]
    async fn readiness_tracks_flag() {
        let (router, readiness) = app(false).await;
        let request = || {
            Request::get("/ready")
                .body(Body::empty())
                .expect("request builds")
        };

        let pending = router.clone().oneshot(request()).await.expect("route executes");
        assert_eq!(pending.status(), StatusCode::SERVICE_UNAVAILABLE);

        readiness.store(true, Ordering::Release);
        let ready = router.oneshot(request()).await.expect("route executes");
        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(json_body(ready).await["status"], "ready");
    }

    #[tokio::test]
    async fn scoring_routes_are_mounted_beside_health() {
        let (router, _) = app(true).await;

        let health = router
            .clone()
            .oneshot(
                Request::get("/health")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("route executes");
        assert_eq!(health.status(), StatusCode::OK);

        let bands = router
            .oneshot(
                Request::get("/api/v1/bands")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("route executes");
        assert_eq!(bands.status(), StatusCode::OK);
        let payload = json_body(bands).await;
        assert_eq!(payload["bands"].as_array().map(Vec::len), Some(3));
        assert_eq!(payload["bands"][0]["band"]["label"], "Gran Oro");
    }

    #[tokio::test]
    async fn metrics_are_plain_text() {
        let (router, _) = app(true).await;

        let response = router
            .oneshot(
                Request::get("/metrics")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }
}
