//! Event ledger on `ad_impressions` and `ad_clicks`.
//!
//! Impressions are upserted on their `(day, campaign_id, client_id)` key.
//! Clicks rely on the `(campaign_id, client_id)` primary key: a concurrent
//! duplicate loses the insert and is reported as
//! [`ClickOutcome::AlreadyClicked`].

use std::collections::{BTreeMap, HashMap};

use super::Database;
use anyhow::Result;
use uuid::Uuid;

use crate::ledger::{
    group_by_views, ClickEvent, ClickOutcome, DailyTotals, EventLedger, ImpressionEvent,
    StatsScope, Totals, UserCampaignStats, ViewsGroup,
};

/// Filter column for an aggregate scope. Only these two names ever reach SQL.
fn scope_filter(scope: StatsScope) -> (&'static str, Uuid) {
    match scope {
        StatsScope::Campaign(id) => ("campaign_id", id),
        StatsScope::Advertiser(id) => ("advertiser_id", id),
    }
}

impl Database {
    pub async fn record_impression(&self, event: &ImpressionEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO ad_impressions (day, campaign_id, client_id, advertiser_id, income, view_count)
             VALUES ($1, $2, $3, $4, $5, 1)
             ON CONFLICT (day, campaign_id, client_id) DO UPDATE SET
               view_count = ad_impressions.view_count + 1,
               income = ad_impressions.income + EXCLUDED.income",
        )
        .bind(event.day)
        .bind(event.campaign_id)
        .bind(event.client_id)
        .bind(event.advertiser_id)
        .bind(event.income)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_click(&self, event: &ClickEvent) -> Result<ClickOutcome> {
        let shown: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM ad_impressions WHERE campaign_id = $1 AND client_id = $2)",
        )
        .bind(event.campaign_id)
        .bind(event.client_id)
        .fetch_one(&self.pool)
        .await?;
        if !shown {
            return Ok(ClickOutcome::NoImpression);
        }

        let inserted = sqlx::query(
            "INSERT INTO ad_clicks (campaign_id, client_id, advertiser_id, income, day)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (campaign_id, client_id) DO NOTHING",
        )
        .bind(event.campaign_id)
        .bind(event.client_id)
        .bind(event.advertiser_id)
        .bind(event.income)
        .bind(event.day)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(if inserted == 0 {
            ClickOutcome::AlreadyClicked
        } else {
            ClickOutcome::Recorded
        })
    }

    pub async fn user_campaign_stats(
        &self,
        campaign_ids: &[Uuid],
        client_id: Uuid,
    ) -> Result<HashMap<Uuid, UserCampaignStats>> {
        let mut stats: HashMap<Uuid, UserCampaignStats> = campaign_ids
            .iter()
            .map(|id| (*id, UserCampaignStats::empty(*id)))
            .collect();
        if campaign_ids.is_empty() {
            return Ok(stats);
        }

        let impressions: Vec<(Uuid, i64, bool)> = sqlx::query_as(
            "SELECT campaign_id, COUNT(*), BOOL_OR(client_id = $2)
             FROM ad_impressions WHERE campaign_id = ANY($1)
             GROUP BY campaign_id",
        )
        .bind(campaign_ids)
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        for (id, count, viewed) in impressions {
            if let Some(entry) = stats.get_mut(&id) {
                entry.impressions = count.max(0) as u64;
                entry.viewed_by_client = viewed;
            }
        }

        let clicks: Vec<(Uuid, i64, bool)> = sqlx::query_as(
            "SELECT campaign_id, COUNT(*), BOOL_OR(client_id = $2)
             FROM ad_clicks WHERE campaign_id = ANY($1)
             GROUP BY campaign_id",
        )
        .bind(campaign_ids)
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        for (id, count, clicked) in clicks {
            if let Some(entry) = stats.get_mut(&id) {
                entry.clicks = count.max(0) as u64;
                entry.clicked_by_client = clicked;
            }
        }

        Ok(stats)
    }

    pub async fn campaigns_grouped_by_client_views(
        &self,
        campaign_ids: &[Uuid],
        client_id: Uuid,
    ) -> Result<Vec<ViewsGroup>> {
        if campaign_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT campaign_id, SUM(view_count)::BIGINT
             FROM ad_impressions
             WHERE client_id = $1 AND campaign_id = ANY($2)
             GROUP BY campaign_id",
        )
        .bind(client_id)
        .bind(campaign_ids)
        .fetch_all(&self.pool)
        .await?;
        let views: HashMap<Uuid, u64> = rows
            .into_iter()
            .map(|(id, count)| (id, count.max(0) as u64))
            .collect();
        Ok(group_by_views(campaign_ids, &views))
    }

    pub async fn totals(&self, scope: StatsScope) -> Result<Totals> {
        let (column, id) = scope_filter(scope);
        let (impressions, spent_impressions): (i64, f64) = sqlx::query_as(&format!(
            "SELECT COUNT(*), COALESCE(SUM(income), 0)::DOUBLE PRECISION
             FROM ad_impressions WHERE {column} = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        let (clicks, spent_clicks): (i64, f64) = sqlx::query_as(&format!(
            "SELECT COUNT(*), COALESCE(SUM(income), 0)::DOUBLE PRECISION
             FROM ad_clicks WHERE {column} = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Totals::new(
            impressions.max(0) as u64,
            clicks.max(0) as u64,
            spent_impressions,
            spent_clicks,
        ))
    }

    pub async fn daily_totals(&self, scope: StatsScope) -> Result<Vec<DailyTotals>> {
        let (column, id) = scope_filter(scope);
        let per_day = |table: &str| {
            format!(
                "SELECT day, COUNT(*), COALESCE(SUM(income), 0)::DOUBLE PRECISION
                 FROM {table} WHERE {column} = $1
                 GROUP BY day ORDER BY day"
            )
        };

        let impressions: Vec<(i32, i64, f64)> = sqlx::query_as(&per_day("ad_impressions"))
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        let clicks: Vec<(i32, i64, f64)> = sqlx::query_as(&per_day("ad_clicks"))
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        let clicks_by_day: BTreeMap<i32, (i64, f64)> = clicks
            .into_iter()
            .map(|(day, count, spent)| (day, (count, spent)))
            .collect();

        Ok(impressions
            .into_iter()
            .map(|(date, count, spent_impressions)| {
                let (clicks, spent_clicks) = clicks_by_day.get(&date).copied().unwrap_or((0, 0.0));
                DailyTotals {
                    date,
                    totals: Totals::new(
                        count.max(0) as u64,
                        clicks.max(0) as u64,
                        spent_impressions,
                        spent_clicks,
                    ),
                }
            })
            .collect())
    }
}

impl EventLedger for Database {
    async fn record_impression(&self, event: &ImpressionEvent) -> Result<()> {
        Database::record_impression(self, event).await
    }

    async fn record_click(&self, event: &ClickEvent) -> Result<ClickOutcome> {
        Database::record_click(self, event).await
    }

    async fn user_campaign_stats(
        &self,
        campaign_ids: &[Uuid],
        client_id: Uuid,
    ) -> Result<HashMap<Uuid, UserCampaignStats>> {
        Database::user_campaign_stats(self, campaign_ids, client_id).await
    }

    async fn campaigns_grouped_by_client_views(
        &self,
        campaign_ids: &[Uuid],
        client_id: Uuid,
    ) -> Result<Vec<ViewsGroup>> {
        Database::campaigns_grouped_by_client_views(self, campaign_ids, client_id).await
    }

    async fn totals(&self, scope: StatsScope) -> Result<Totals> {
        Database::totals(self, scope).await
    }

    async fn daily_totals(&self, scope: StatsScope) -> Result<Vec<DailyTotals>> {
        Database::daily_totals(self, scope).await
    }
}
