//! Operational endpoints: liveness with a store round trip, and Prometheus scrape.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use checkout::Notifier;
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::Store;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}

/// GET /health: 200 while the store answers, 503 otherwise.
pub async fn health<S: Store + Clone + 'static, N: Notifier>(
    State(state): State<Arc<AppState<S, N>>>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.store.ping().await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                store: "up",
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    store: "down",
                }),
            )
        }
    }
}

/// GET /metrics: Prometheus text exposition.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
