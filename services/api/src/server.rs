use crate::cli::ServeArgs;
use crate::infra::{default_medal_bands, AppState, InMemoryBandStore, InMemorySampleStore};
use crate::routes::with_scoring_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use contest_scoring::config::AppConfig;
use contest_scoring::error::AppError;
use contest_scoring::scoring::ScoringService;
use contest_scoring::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let samples = Arc::new(InMemorySampleStore::default());
    let bands = Arc::new(InMemoryBandStore::with_bands(default_medal_bands()));
    let scoring_service = Arc::new(ScoringService::new(samples, bands, &config.scoring));
    let loaded = scoring_service.load_bands().await?;
    info!(
        bands = scoring_service.bands().len(),
        examined = loaded.examined,
        "medal bands loaded"
    );

    let app = with_scoring_routes(scoring_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "contest scoring engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
