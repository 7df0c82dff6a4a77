//! # Engine: Ad Selection Pipeline
//!
//! `select_ad` runs one request through the pipeline:
//!
//! 1. **Client**: look up the requesting client (unknown ⇒ `NotFound`).
//! 2. **Eligibility**: campaigns running today, moderated, targeting match.
//! 3. **Signals**: relevance scores and per-client campaign stats, fetched
//!    concurrently.
//! 4. **Scoring**: clicked campaigns are dropped; every other candidate is
//!    scored and kept if it clears the adaptive threshold.
//! 5. **Rotation**: the fairness selector picks from the least-viewed group.
//! 6. **Ledger**: the impression is recorded and the creative returned.
//!
//! Steps 1-5 are bounded by the request deadline and may be abandoned. The
//! impression write in step 6 is issued after the deadline check on its own
//! task: dropping the caller (HTTP timeout, client disconnect) does not abort
//! it mid-statement. The same holds for click writes. Nothing is retried here.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Missing, Result};
use crate::ledger::{ClickEvent, ClickOutcome, EventLedger, ImpressionEvent};
use crate::model::{Ad, Campaign};
use crate::scoring::{AdSignals, Scorer};
use crate::selector::{self, Candidate};
use crate::{AdStore, CampaignDirectory, ClientDirectory, Clock, RelevanceDirectory};

/// Run a ledger write on a separate task so cancelling the caller leaves the
/// write to finish or fail on its own.
async fn detached<T, F>(write: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(write).await.context("ledger write task panicked")?
}

/// Winner of the read phase, ready to be recorded.
struct Pick {
    campaign: Campaign,
    score: f64,
    view_count: u64,
    income: f64,
}

pub struct AdEngine<S> {
    store: Arc<S>,
    scorer: Arc<Scorer>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
}

impl<S> Clone for AdEngine<S> {
    fn clone(&self) -> Self {
        AdEngine {
            store: Arc::clone(&self.store),
            scorer: Arc::clone(&self.scorer),
            clock: Arc::clone(&self.clock),
            request_timeout: self.request_timeout,
        }
    }
}

impl<S: AdStore> AdEngine<S> {
    pub fn new(
        store: Arc<S>,
        scorer: Arc<Scorer>,
        clock: Arc<dyn Clock>,
        request_timeout: Duration,
    ) -> Self {
        AdEngine {
            store,
            scorer,
            clock,
            request_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn today(&self) -> i32 {
        self.clock.today()
    }

    /// Select an ad for `client_id` using the configured request timeout.
    pub async fn select_ad(&self, client_id: Uuid) -> Result<Ad> {
        self.select_ad_until(client_id, Instant::now() + self.request_timeout)
            .await
    }

    /// Select an ad, abandoning the read phase at `deadline`.
    pub async fn select_ad_until(&self, client_id: Uuid, deadline: Instant) -> Result<Ad> {
        let today = self.clock.today();
        let pick = timeout_at(deadline, self.pick(client_id, today))
            .await
            .map_err(|_| Error::Internal(anyhow!("ad selection deadline exceeded")))??;

        let impression = ImpressionEvent {
            campaign_id: pick.campaign.campaign_id,
            advertiser_id: pick.campaign.advertiser_id,
            client_id,
            income: pick.income,
            day: today,
        };
        let store = Arc::clone(&self.store);
        detached(async move { store.record_impression(&impression).await })
            .await
            .context("failed to record impression")?;

        info!(
            client_id = %client_id,
            campaign_id = %pick.campaign.campaign_id,
            score = pick.score,
            view_count = pick.view_count,
            income = pick.income,
            day = today,
            "selected campaign"
        );
        Ok(Ad::from(&pick.campaign))
    }

    async fn pick(&self, client_id: Uuid, today: i32) -> Result<Pick> {
        let client = self
            .store
            .get_client(client_id)
            .await
            .context("failed to get client")?
            .ok_or(Error::NotFound(Missing::Client))?;

        let campaigns = self
            .store
            .find_eligible(&client, today)
            .await
            .context("failed to get eligible campaigns")?;
        debug!(client_id = %client_id, count = campaigns.len(), "found eligible campaigns");
        if campaigns.is_empty() {
            return Err(Error::NotFound(Missing::Ad));
        }

        let campaign_ids: Vec<Uuid> = campaigns.iter().map(|c| c.campaign_id).collect();
        let mut advertiser_ids: Vec<Uuid> = campaigns.iter().map(|c| c.advertiser_id).collect();
        advertiser_ids.sort_unstable();
        advertiser_ids.dedup();

        let (relevance, stats) = tokio::try_join!(
            async {
                self.store
                    .bulk_relevance(client_id, &advertiser_ids)
                    .await
                    .context("failed to get relevance scores")
            },
            async {
                self.store
                    .user_campaign_stats(&campaign_ids, client_id)
                    .await
                    .context("failed to get campaign stats")
            },
        )?;

        let mut candidates: HashMap<Uuid, Candidate> = HashMap::new();
        let mut passing: Vec<Uuid> = Vec::new();
        for campaign in campaigns {
            let Some(stats) = stats.get(&campaign.campaign_id) else {
                warn!(campaign_id = %campaign.campaign_id, "no stats for campaign, skipping");
                continue;
            };
            if stats.clicked_by_client {
                continue;
            }

            // CPM is only earned on the first exposure to this client
            let impression_income = if stats.viewed_by_client {
                0.0
            } else {
                campaign.cost_per_impression
            };

            let score = self.scorer.score(&AdSignals {
                relevance: relevance.get(&campaign.advertiser_id).copied().unwrap_or(0),
                impressions: stats.impressions as i64,
                impressions_target: campaign.impressions_limit,
                cost_per_impression: impression_income,
                clicks: stats.clicks as i64,
                clicks_target: campaign.clicks_limit,
                cost_per_click: campaign.cost_per_click,
            });
            let threshold = self.scorer.threshold();
            debug!(campaign_id = %campaign.campaign_id, score, threshold, "scored campaign");

            if score >= threshold {
                passing.push(campaign.campaign_id);
                candidates.insert(
                    campaign.campaign_id,
                    Candidate {
                        campaign,
                        score,
                        impression_income,
                    },
                );
            }
        }

        if passing.is_empty() {
            debug!(client_id = %client_id, "no campaign passed the threshold");
            return Err(Error::NotFound(Missing::Ad));
        }

        let groups = self
            .store
            .campaigns_grouped_by_client_views(&passing, client_id)
            .await
            .context("failed to group campaigns by views")?;

        let Some(selection) = selector::select(&candidates, &groups) else {
            warn!(
                client_id = %client_id,
                candidates = passing.len(),
                groups = groups.len(),
                "no suitable campaign found"
            );
            return Err(Error::NotFound(Missing::Ad));
        };

        Ok(Pick {
            campaign: selection.candidate.campaign.clone(),
            score: selection.candidate.score,
            view_count: selection.view_count,
            income: selection.candidate.impression_income,
        })
    }

    /// Record a click by `client_id` on `campaign_id`, charged at the
    /// campaign's cost per click on the current day.
    pub async fn record_click(&self, campaign_id: Uuid, client_id: Uuid) -> Result<()> {
        let deadline = Instant::now() + self.request_timeout;
        let campaign = timeout_at(deadline, self.store.get_campaign(campaign_id))
            .await
            .map_err(|_| Error::Internal(anyhow!("click lookup deadline exceeded")))?
            .context("failed to get campaign")?
            .ok_or(Error::NotFound(Missing::Campaign))?;

        let event = ClickEvent {
            campaign_id,
            advertiser_id: campaign.advertiser_id,
            client_id,
            income: campaign.cost_per_click,
            day: self.clock.today(),
        };
        let store = Arc::clone(&self.store);
        let outcome = detached(async move { store.record_click(&event).await })
            .await
            .context("failed to record click")?;

        match outcome {
            ClickOutcome::Recorded => {
                info!(campaign_id = %campaign_id, client_id = %client_id, day = event.day, "recorded click");
                Ok(())
            }
            ClickOutcome::NoImpression => Err(Error::NoImpression),
            ClickOutcome::AlreadyClicked => Err(Error::AlreadyClicked),
        }
    }
}
