//! Spend and conversion read-backs per campaign and per advertiser.
//!
//! Unknown ids are not an error: they simply have no events and report
//! zero totals and an empty daily list.

use super::AppState;
use crate::error::Error;
use crate::ledger::{DailyTotals, EventLedger, StatsScope, Totals};
use crate::AdStore;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

async fn totals<S: AdStore>(state: &AppState<S>, scope: StatsScope) -> Result<Json<Totals>, Error> {
    Ok(Json(state.engine.store().totals(scope).await?))
}

async fn daily<S: AdStore>(
    state: &AppState<S>,
    scope: StatsScope,
) -> Result<Json<Vec<DailyTotals>>, Error> {
    Ok(Json(state.engine.store().daily_totals(scope).await?))
}

pub async fn handler_campaign_totals<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Totals>, Error> {
    totals(&state, StatsScope::Campaign(id)).await
}

pub async fn handler_campaign_daily<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DailyTotals>>, Error> {
    daily(&state, StatsScope::Campaign(id)).await
}

pub async fn handler_advertiser_totals<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Totals>, Error> {
    totals(&state, StatsScope::Advertiser(id)).await
}

pub async fn handler_advertiser_daily<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DailyTotals>>, Error> {
    daily(&state, StatsScope::Advertiser(id)).await
}
