use std::future::ready;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::IntoResponse,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::sync::watch;

use crate::driver::PipelineState;

const BUCKETS: &[f64] = &[
    1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0,
];

const SECONDS_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

pub async fn index() -> &'static str {
    "telemetry transfer"
}

/// Install the global prometheus recorder. Can only succeed once per process.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets(BUCKETS)?
        .set_buckets_for_metric(Matcher::Suffix("_seconds".to_string()), SECONDS_BUCKETS)?
        .install_recorder()
}

/// Liveness follows the pipeline state: the process is alive while it is consuming or draining.
async fn liveness(State(state): State<watch::Receiver<PipelineState>>) -> impl IntoResponse {
    let current = *state.borrow();
    match current {
        PipelineState::Running | PipelineState::Draining => (StatusCode::OK, "ok"),
        PipelineState::Idle => (StatusCode::SERVICE_UNAVAILABLE, "starting"),
        PipelineState::Stopped | PipelineState::Failed => {
            (StatusCode::SERVICE_UNAVAILABLE, "stopped")
        }
    }
}

/// Health and metrics routes for the pipeline behind `state`.
///
/// `recorder` is optional so that tests can build the router without installing a global
/// recorder.
pub fn router(state: watch::Receiver<PipelineState>, recorder: Option<PrometheusHandle>) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(liveness))
        .with_state(state);

    match recorder {
        Some(handle) => router
            .route("/metrics", get(move || ready(handle.render())))
            .layer(axum::middleware::from_fn(track_metrics)),
        None => router,
    }
}

pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}

pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };
    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();
    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}
