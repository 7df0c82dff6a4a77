//! Simulated clock administration.

use super::AppState;
use crate::clock::AdvanceError;
use crate::{AdStore, Clock};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Deserialize, Serialize)]
pub struct AdvanceBody {
    pub current_date: i32,
}

/// `GET /time/now`: the current simulated day.
pub async fn handler_now<S: AdStore>(State(state): State<Arc<AppState<S>>>) -> Json<AdvanceBody> {
    Json(AdvanceBody {
        current_date: state.clock.today(),
    })
}

/// `POST /time/advance`: 200 with the new day, 400 unless it is strictly
/// later than the current one.
pub async fn handler_advance<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<AdvanceBody>,
) -> Response {
    match state.clock.advance(body.current_date).await {
        Ok(day) => {
            state.metrics.current_day.set(i64::from(day));
            Json(AdvanceBody { current_date: day }).into_response()
        }
        Err(e @ AdvanceError::NotForward { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(AdvanceError::Storage(e)) => {
            state
                .metrics
                .current_day
                .set(i64::from(body.current_date));
            error!(error = %format!("{:#}", e), "failed to persist current day");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}
