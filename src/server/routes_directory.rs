//! Directory ingestion: clients, campaigns and relevance scores.
//!
//! Thin writers over the collaborator traits so a fresh store (notably
//! `serve --in-memory`) can be populated over HTTP. No validation beyond
//! what deserialization enforces.

use super::AppState;
use crate::error::{Error, Missing};
use crate::model::{Campaign, Client, Targeting};
use crate::{AdStore, CampaignDirectory, ClientDirectory, RelevanceDirectory};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// `POST /clients/bulk`: upsert every client in the body.
pub async fn handler_clients_bulk<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(clients): Json<Vec<Client>>,
) -> Result<(StatusCode, Json<Vec<Client>>), Error> {
    for client in &clients {
        state.engine.store().upsert_client(client).await?;
    }
    info!(count = clients.len(), "upserted clients");
    Ok((StatusCode::CREATED, Json(clients)))
}

pub async fn handler_client_get<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Client>, Error> {
    state
        .engine
        .store()
        .get_client(client_id)
        .await?
        .map(Json)
        .ok_or(Error::NotFound(Missing::Client))
}

/// Campaign settings as posted by an advertiser; ids are assigned here.
#[derive(Debug, Deserialize)]
pub struct CampaignBody {
    pub impressions_limit: i64,
    pub clicks_limit: i64,
    pub cost_per_impression: f64,
    pub cost_per_click: f64,
    pub ad_title: String,
    pub ad_text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub start_date: i32,
    pub end_date: i32,
    #[serde(default = "moderated_by_default")]
    pub moderated: bool,
    #[serde(default)]
    pub targeting: Targeting,
}

fn moderated_by_default() -> bool {
    true
}

/// `POST /advertisers/{advertiser_id}/campaigns`: 201 with the stored campaign.
pub async fn handler_campaign_create<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(advertiser_id): Path<Uuid>,
    Json(body): Json<CampaignBody>,
) -> Result<(StatusCode, Json<Campaign>), Error> {
    let campaign = Campaign {
        campaign_id: Uuid::new_v4(),
        advertiser_id,
        impressions_limit: body.impressions_limit,
        clicks_limit: body.clicks_limit,
        cost_per_impression: body.cost_per_impression,
        cost_per_click: body.cost_per_click,
        ad_title: body.ad_title,
        ad_text: body.ad_text,
        image_url: body.image_url,
        start_date: body.start_date,
        end_date: body.end_date,
        moderated: body.moderated,
        targeting: body.targeting,
    };
    state.engine.store().upsert_campaign(&campaign).await?;
    info!(
        campaign_id = %campaign.campaign_id,
        advertiser_id = %advertiser_id,
        "created campaign"
    );
    Ok((StatusCode::CREATED, Json(campaign)))
}

pub async fn handler_campaign_get<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, Error> {
    state
        .engine
        .store()
        .get_campaign(campaign_id)
        .await?
        .map(Json)
        .ok_or(Error::NotFound(Missing::Campaign))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RelevanceBody {
    pub client_id: Uuid,
    pub advertiser_id: Uuid,
    pub score: i64,
}

/// `POST /ml-scores`: set the relevance of an advertiser for a client.
pub async fn handler_relevance_upsert<S: AdStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<RelevanceBody>,
) -> Result<Json<RelevanceBody>, Error> {
    state
        .engine
        .store()
        .upsert_relevance(body.client_id, body.advertiser_id, body.score)
        .await?;
    Ok(Json(body))
}
