//! # Server: HTTP Adapter
//!
//! Thin axum layer over [`AdEngine`], the ledger read-backs and the
//! simulated clock. Handlers are generic over the store so the same router
//! runs on PostgreSQL in production and on [`crate::memory::MemoryStore`] in
//! tests and `serve --in-memory`.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET /ads?client_id=` | select an ad and record the impression |
//! | `POST /ads/{campaign_id}/click` | record a click |
//! | `GET /stats/campaigns/{id}[/daily]` | campaign totals |
//! | `GET /stats/advertisers/{id}[/daily]` | advertiser totals |
//! | `POST /clients/bulk`, `GET /clients/{id}` | client directory |
//! | `POST /advertisers/{id}/campaigns`, `GET /campaigns/{id}` | campaign directory |
//! | `POST /ml-scores` | relevance scores |
//! | `GET /time/now`, `POST /time/advance` | simulated day |
//! | `GET /healthz`, `/readyz`, `/metrics` | health checks and scraping |

mod routes_ads;
mod routes_directory;
mod routes_health;
mod routes_stats;
mod routes_time;

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Instrument};

use crate::clock::DayClock;
use crate::config::ServerConfig;
use crate::error::{Error, ErrorKind};
use crate::prom_metrics;
use crate::{AdEngine, AdStore, Clock};

/// Backing-store check for `/readyz`.
pub trait Readiness: Send + Sync {
    fn ready(&self) -> impl Future<Output = Result<()>> + Send;
}

pub struct AppState<S> {
    pub engine: AdEngine<S>,
    pub clock: Arc<DayClock>,
    pub metrics: prom_metrics::Metrics,
}

impl<S: AdStore> AppState<S> {
    pub fn new(engine: AdEngine<S>, clock: Arc<DayClock>) -> Arc<Self> {
        let metrics = prom_metrics::Metrics::new();
        metrics.current_day.set(i64::from(clock.today()));
        metrics.adaptive_threshold.set(engine.scorer().threshold());
        Arc::new(AppState {
            engine,
            clock,
            metrics,
        })
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            Error::Internal(e) => {
                error!(error = %format!("{:#}", e), "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Records request latency, propagates or generates `x-request-id`, and runs
/// the request inside a `request` span.
async fn metrics_middleware<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    state
        .metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(start.elapsed().as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Collapse UUID segments so histogram labels stay bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if uuid::Uuid::parse_str(seg).is_ok() {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router<S: AdStore + Readiness>(state: Arc<AppState<S>>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/ads", get(routes_ads::handler_select_ad::<S>))
        .route(
            "/ads/{campaign_id}/click",
            post(routes_ads::handler_record_click::<S>),
        )
        .route(
            "/stats/campaigns/{id}",
            get(routes_stats::handler_campaign_totals::<S>),
        )
        .route(
            "/stats/campaigns/{id}/daily",
            get(routes_stats::handler_campaign_daily::<S>),
        )
        .route(
            "/stats/advertisers/{id}",
            get(routes_stats::handler_advertiser_totals::<S>),
        )
        .route(
            "/stats/advertisers/{id}/daily",
            get(routes_stats::handler_advertiser_daily::<S>),
        )
        .route(
            "/clients/bulk",
            post(routes_directory::handler_clients_bulk::<S>),
        )
        .route(
            "/clients/{client_id}",
            get(routes_directory::handler_client_get::<S>),
        )
        .route(
            "/advertisers/{advertiser_id}/campaigns",
            post(routes_directory::handler_campaign_create::<S>),
        )
        .route(
            "/campaigns/{campaign_id}",
            get(routes_directory::handler_campaign_get::<S>),
        )
        .route(
            "/ml-scores",
            post(routes_directory::handler_relevance_upsert::<S>),
        )
        .route("/time/now", get(routes_time::handler_now::<S>))
        .route("/time/advance", post(routes_time::handler_advance::<S>))
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz::<S>))
        .route("/metrics", get(routes_health::handler_metrics::<S>))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware::<S>,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        // Dropping a handler here cannot cut a ledger write short: the engine
        // runs those on their own tasks.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout() * 4,
        ))
        .with_state(state)
}

pub async fn run<S: AdStore + Readiness>(state: Arc<AppState<S>>, config: &ServerConfig) -> Result<()> {
    let app = build_router(state, config);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port = config.port, "adserve listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("adserve shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_keeps_static_routes() {
        assert_eq!(normalize_path("/ads"), "/ads");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }

    #[test]
    fn normalize_path_collapses_uuids() {
        assert_eq!(
            normalize_path("/stats/campaigns/67e55044-10b1-426f-9247-bb680e5fe0c8/daily"),
            "/stats/campaigns/:id/daily"
        );
        assert_eq!(
            normalize_path("/ads/67e55044-10b1-426f-9247-bb680e5fe0c8/click"),
            "/ads/:id/click"
        );
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        use crate::error::Missing;
        assert_eq!(
            Error::NotFound(Missing::Ad).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(Error::AlreadyClicked.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(Error::NoImpression.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(
            Error::Internal(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
