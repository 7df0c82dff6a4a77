//! # Health & Observability Endpoints
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /healthz` | Liveness: the process is serving HTTP |
//! | `GET /readyz` | Readiness: the backing store answers within 2 seconds |
//! | `GET /metrics` | Prometheus scraping endpoint |

use super::{AppState, Readiness};
use crate::AdStore;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;
use std::time::Duration;

pub async fn handler_healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Returns 503 while the store is unreachable so load balancers stop routing
/// traffic here.
pub async fn handler_readyz<S: AdStore + Readiness>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let check = tokio::time::timeout(Duration::from_secs(2), state.engine.store().ready()).await;

    match check {
        Ok(Ok(())) => (StatusCode::OK, "ok"),
        Ok(Err(_)) => (StatusCode::SERVICE_UNAVAILABLE, "store unreachable"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "store timeout"),
    }
}

pub async fn handler_metrics<S: AdStore>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [(
            "content-type",
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
}
