//! Ad selection and click endpoints.

use super::AppState;
use crate::error::{Error, Missing};
use crate::model::Ad;
use crate::AdStore;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct SelectAdQuery {
    pub client_id: Uuid,
}

#[derive(Deserialize)]
pub struct ClickBody {
    pub client_id: Uuid,
}

/// `GET /ads?client_id=`: pick an ad for the client and record the impression.
pub async fn handler_select_ad<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<SelectAdQuery>,
) -> Result<Json<Ad>, Error> {
    let result = state.engine.select_ad(query.client_id).await;
    state
        .metrics
        .adaptive_threshold
        .set(state.engine.scorer().threshold());

    match result {
        Ok(ad) => {
            state.metrics.ads_served.inc();
            Ok(Json(ad))
        }
        Err(e) => {
            if matches!(e, Error::NotFound(Missing::Ad)) {
                state.metrics.ads_not_found.inc();
            }
            Err(e)
        }
    }
}

/// `POST /ads/{campaign_id}/click`: 204 on success, 409 when the ad was
/// never shown to the client or was already clicked.
pub async fn handler_record_click<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(campaign_id): Path<Uuid>,
    Json(body): Json<ClickBody>,
) -> Result<StatusCode, Error> {
    match state.engine.record_click(campaign_id, body.client_id).await {
        Ok(()) => {
            state.metrics.clicks_recorded.inc();
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            match e {
                Error::NoImpression => state.metrics.record_click_conflict("no_impression"),
                Error::AlreadyClicked => state.metrics.record_click_conflict("already_clicked"),
                _ => {}
            }
            Err(e)
        }
    }
}
