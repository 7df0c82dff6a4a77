//! In-process store implementing every collaborator trait.
//!
//! Backs `adserve serve --in-memory` and the test suites. All state sits
//! behind one `RwLock`, so the click existence checks and the insert happen
//! atomically here, unlike the PostgreSQL ledger.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use uuid::Uuid;

use crate::ledger::{
    group_by_views, ClickEvent, ClickOutcome, DailyTotals, EventLedger, ImpressionEvent,
    StatsScope, Totals, UserCampaignStats, ViewsGroup,
};
use crate::model::{Campaign, Client};
use crate::server::Readiness;
use crate::targeting::filter_eligible;
use crate::{CampaignDirectory, ClientDirectory, RelevanceDirectory};

#[derive(Debug, Clone, Copy)]
struct ImpressionRow {
    advertiser_id: Uuid,
    income: f64,
    view_count: u64,
}

#[derive(Debug, Clone, Copy)]
struct ClickRow {
    advertiser_id: Uuid,
    income: f64,
    day: i32,
}

#[derive(Default)]
struct State {
    clients: HashMap<Uuid, Client>,
    /// Insertion order doubles as directory order.
    campaigns: Vec<Campaign>,
    relevance: HashMap<(Uuid, Uuid), i64>,
    /// Keyed by `(day, campaign_id, client_id)`.
    impressions: BTreeMap<(i32, Uuid, Uuid), ImpressionRow>,
    /// `(campaign_id, client_id)` pairs with at least one impression on any day.
    shown: HashSet<(Uuid, Uuid)>,
    /// Keyed by `(campaign_id, client_id)`.
    clicks: HashMap<(Uuid, Uuid), ClickRow>,
}

impl State {
    fn in_scope(scope: StatsScope, campaign_id: Uuid, advertiser_id: Uuid) -> bool {
        match scope {
            StatsScope::Campaign(id) => id == campaign_id,
            StatsScope::Advertiser(id) => id == advertiser_id,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn upsert_client(&self, client: Client) {
        self.write().clients.insert(client.client_id, client);
    }

    /// Insert a campaign, replacing one with the same id in place.
    pub fn upsert_campaign(&self, campaign: Campaign) {
        let mut state = self.write();
        match state
            .campaigns
            .iter_mut()
            .find(|c| c.campaign_id == campaign.campaign_id)
        {
            Some(existing) => *existing = campaign,
            None => state.campaigns.push(campaign),
        }
    }

    pub fn set_relevance(&self, client_id: Uuid, advertiser_id: Uuid, score: i64) {
        self.write()
            .relevance
            .insert((client_id, advertiser_id), score);
    }

    /// View count of one `(day, campaign, client)` impression row.
    pub fn view_count(&self, day: i32, campaign_id: Uuid, client_id: Uuid) -> Option<u64> {
        self.read()
            .impressions
            .get(&(day, campaign_id, client_id))
            .map(|row| row.view_count)
    }
}

impl ClientDirectory for MemoryStore {
    async fn get_client(&self, id: Uuid) -> Result<Option<Client>> {
        Ok(self.read().clients.get(&id).cloned())
    }

    async fn upsert_client(&self, client: &Client) -> Result<()> {
        MemoryStore::upsert_client(self, client.clone());
        Ok(())
    }
}

impl CampaignDirectory for MemoryStore {
    async fn find_eligible(&self, client: &Client, today: i32) -> Result<Vec<Campaign>> {
        Ok(filter_eligible(&self.read().campaigns, client, today))
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
        Ok(self
            .read()
            .campaigns
            .iter()
            .find(|c| c.campaign_id == id)
            .cloned())
    }

    async fn upsert_campaign(&self, campaign: &Campaign) -> Result<()> {
        MemoryStore::upsert_campaign(self, campaign.clone());
        Ok(())
    }
}

impl RelevanceDirectory for MemoryStore {
    async fn bulk_relevance(
        &self,
        client_id: Uuid,
        advertiser_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, i64>> {
        let state = self.read();
        Ok(advertiser_ids
            .iter()
            .filter_map(|adv| {
                state
                    .relevance
                    .get(&(client_id, *adv))
                    .map(|score| (*adv, *score))
            })
            .collect())
    }

    async fn upsert_relevance(&self, client_id: Uuid, advertiser_id: Uuid, score: i64) -> Result<()> {
        self.set_relevance(client_id, advertiser_id, score);
        Ok(())
    }
}

impl EventLedger for MemoryStore {
    async fn record_impression(&self, event: &ImpressionEvent) -> Result<()> {
        let mut state = self.write();
        state
            .impressions
            .entry((event.day, event.campaign_id, event.client_id))
            .and_modify(|row| {
                row.view_count += 1;
                row.income += event.income;
            })
            .or_insert(ImpressionRow {
                advertiser_id: event.advertiser_id,
                income: event.income,
                view_count: 1,
            });
        state.shown.insert((event.campaign_id, event.client_id));
        Ok(())
    }

    async fn record_click(&self, event: &ClickEvent) -> Result<ClickOutcome> {
        let mut state = self.write();
        let key = (event.campaign_id, event.client_id);
        if !state.shown.contains(&key) {
            return Ok(ClickOutcome::NoImpression);
        }
        if state.clicks.contains_key(&key) {
            return Ok(ClickOutcome::AlreadyClicked);
        }
        state.clicks.insert(
            key,
            ClickRow {
                advertiser_id: event.advertiser_id,
                income: event.income,
                day: event.day,
            },
        );
        Ok(ClickOutcome::Recorded)
    }

    async fn user_campaign_stats(
        &self,
        campaign_ids: &[Uuid],
        client_id: Uuid,
    ) -> Result<HashMap<Uuid, UserCampaignStats>> {
        let state = self.read();
        let mut stats: HashMap<Uuid, UserCampaignStats> = campaign_ids
            .iter()
            .map(|id| (*id, UserCampaignStats::empty(*id)))
            .collect();

        for (_, campaign, client) in state.impressions.keys() {
            if let Some(entry) = stats.get_mut(campaign) {
                entry.impressions += 1;
                entry.viewed_by_client |= *client == client_id;
            }
        }
        for (campaign, client) in state.clicks.keys() {
            if let Some(entry) = stats.get_mut(campaign) {
                entry.clicks += 1;
                entry.clicked_by_client |= *client == client_id;
            }
        }
        Ok(stats)
    }

    async fn campaigns_grouped_by_client_views(
        &self,
        campaign_ids: &[Uuid],
        client_id: Uuid,
    ) -> Result<Vec<ViewsGroup>> {
        let state = self.read();
        let mut views: HashMap<Uuid, u64> = HashMap::new();
        for ((_, campaign, client), row) in &state.impressions {
            if *client == client_id && campaign_ids.contains(campaign) {
                *views.entry(*campaign).or_default() += row.view_count;
            }
        }
        Ok(group_by_views(campaign_ids, &views))
    }

    async fn totals(&self, scope: StatsScope) -> Result<Totals> {
        let state = self.read();
        let (mut impressions, mut spent_impressions) = (0u64, 0.0);
        for ((_, campaign, _), row) in &state.impressions {
            if State::in_scope(scope, *campaign, row.advertiser_id) {
                impressions += 1;
                spent_impressions += row.income;
            }
        }
        let (mut clicks, mut spent_clicks) = (0u64, 0.0);
        for ((campaign, _), row) in &state.clicks {
            if State::in_scope(scope, *campaign, row.advertiser_id) {
                clicks += 1;
                spent_clicks += row.income;
            }
        }
        Ok(Totals::new(impressions, clicks, spent_impressions, spent_clicks))
    }

    async fn daily_totals(&self, scope: StatsScope) -> Result<Vec<DailyTotals>> {
        let state = self.read();
        // day -> (impressions, clicks, spent_impressions, spent_clicks)
        let mut days: BTreeMap<i32, (u64, u64, f64, f64)> = BTreeMap::new();
        for ((day, campaign, _), row) in &state.impressions {
            if State::in_scope(scope, *campaign, row.advertiser_id) {
                let entry = days.entry(*day).or_default();
                entry.0 += 1;
                entry.2 += row.income;
            }
        }
        for ((campaign, _), row) in &state.clicks {
            if !State::in_scope(scope, *campaign, row.advertiser_id) {
                continue;
            }
            // clicks on days without impressions are not reported
            if let Some(entry) = days.get_mut(&row.day) {
                entry.1 += 1;
                entry.3 += row.income;
            }
        }
        Ok(days
            .into_iter()
            .map(|(date, (imp, clk, spent_imp, spent_clk))| DailyTotals {
                date,
                totals: Totals::new(imp, clk, spent_imp, spent_clk),
            })
            .collect())
    }
}

impl Readiness for MemoryStore {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impression(campaign_id: Uuid, client_id: Uuid, day: i32, income: f64) -> ImpressionEvent {
        ImpressionEvent {
            campaign_id,
            advertiser_id: Uuid::nil(),
            client_id,
            income,
            day,
        }
    }

    fn click(campaign_id: Uuid, client_id: Uuid, day: i32) -> ClickEvent {
        ClickEvent {
            campaign_id,
            advertiser_id: Uuid::nil(),
            client_id,
            income: 3.0,
            day,
        }
    }

    #[tokio::test]
    async fn repeated_impression_increments_one_row() {
        let store = MemoryStore::new();
        let (campaign, client) = (Uuid::new_v4(), Uuid::new_v4());
        store.record_impression(&impression(campaign, client, 1, 2.0)).await.unwrap();
        store.record_impression(&impression(campaign, client, 1, 0.0)).await.unwrap();
        store.record_impression(&impression(campaign, client, 1, 0.0)).await.unwrap();

        assert_eq!(store.view_count(1, campaign, client), Some(3));
        let stats = store.user_campaign_stats(&[campaign], client).await.unwrap();
        assert_eq!(stats[&campaign].impressions, 1);
        let totals = store.totals(StatsScope::Campaign(campaign)).await.unwrap();
        assert_eq!(totals.spent_impressions, 2.0);
    }

    #[tokio::test]
    async fn click_requires_impression_and_is_unique() {
        let store = MemoryStore::new();
        let (campaign, client) = (Uuid::new_v4(), Uuid::new_v4());

        let outcome = store.record_click(&click(campaign, client, 1)).await.unwrap();
        assert_eq!(outcome, ClickOutcome::NoImpression);

        store.record_impression(&impression(campaign, client, 1, 1.0)).await.unwrap();
        let outcome = store.record_click(&click(campaign, client, 2)).await.unwrap();
        assert_eq!(outcome, ClickOutcome::Recorded);
        let outcome = store.record_click(&click(campaign, client, 3)).await.unwrap();
        assert_eq!(outcome, ClickOutcome::AlreadyClicked);
    }

    #[tokio::test]
    async fn click_needs_impression_for_the_same_pair() {
        let store = MemoryStore::new();
        let (campaign, other_campaign) = (Uuid::new_v4(), Uuid::new_v4());
        let (client, other_client) = (Uuid::new_v4(), Uuid::new_v4());
        store.record_impression(&impression(campaign, other_client, 1, 1.0)).await.unwrap();
        store.record_impression(&impression(other_campaign, client, 1, 1.0)).await.unwrap();

        let outcome = store.record_click(&click(campaign, client, 1)).await.unwrap();
        assert_eq!(outcome, ClickOutcome::NoImpression);

        // an impression on an earlier day is enough
        store.record_impression(&impression(campaign, client, 0, 1.0)).await.unwrap();
        let outcome = store.record_click(&click(campaign, client, 4)).await.unwrap();
        assert_eq!(outcome, ClickOutcome::Recorded);
    }

    #[tokio::test]
    async fn stats_are_zeroed_for_unknown_campaigns() {
        let store = MemoryStore::new();
        let ids = [Uuid::new_v4(), Uuid::new_v4()];
        let stats = store.user_campaign_stats(&ids, Uuid::new_v4()).await.unwrap();
        assert_eq!(stats.len(), 2);
        for id in ids {
            assert_eq!(stats[&id], UserCampaignStats::empty(id));
        }
    }

    #[tokio::test]
    async fn stats_separate_client_flags_from_totals() {
        let store = MemoryStore::new();
        let campaign = Uuid::new_v4();
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        store.record_impression(&impression(campaign, other, 1, 1.0)).await.unwrap();
        store.record_click(&click(campaign, other, 1)).await.unwrap();

        let stats = store.user_campaign_stats(&[campaign], me).await.unwrap();
        let s = stats[&campaign];
        assert_eq!((s.impressions, s.clicks), (1, 1));
        assert!(!s.viewed_by_client);
        assert!(!s.clicked_by_client);

        let stats = store.user_campaign_stats(&[campaign], other).await.unwrap();
        assert!(stats[&campaign].viewed_by_client);
        assert!(stats[&campaign].clicked_by_client);
    }

    #[tokio::test]
    async fn view_groups_sum_across_days() {
        let store = MemoryStore::new();
        let client = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.record_impression(&impression(b, client, 1, 1.0)).await.unwrap();
        store.record_impression(&impression(b, client, 2, 1.0)).await.unwrap();

        let groups = store
            .campaigns_grouped_by_client_views(&[a, b], client)
            .await
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!((groups[0].view_count, groups[0].campaign_ids.clone()), (0, vec![a]));
        assert_eq!((groups[1].view_count, groups[1].campaign_ids.clone()), (2, vec![b]));
    }

    #[tokio::test]
    async fn daily_totals_group_by_day() {
        let store = MemoryStore::new();
        let campaign = Uuid::new_v4();
        let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
        store.record_impression(&impression(campaign, c1, 1, 1.5)).await.unwrap();
        store.record_impression(&impression(campaign, c2, 1, 1.5)).await.unwrap();
        store.record_impression(&impression(campaign, c1, 3, 0.0)).await.unwrap();
        store.record_click(&click(campaign, c2, 3)).await.unwrap();

        let daily = store.daily_totals(StatsScope::Campaign(campaign)).await.unwrap();
        let days: Vec<i32> = daily.iter().map(|d| d.date).collect();
        assert_eq!(days, vec![1, 3]);
        assert_eq!(daily[0].totals.impressions_count, 2);
        assert_eq!(daily[0].totals.spent_impressions, 3.0);
        assert_eq!(daily[1].totals.clicks_count, 1);
        assert_eq!(daily[1].totals.conversion, 100.0);

        let by_advertiser = store.totals(StatsScope::Advertiser(Uuid::nil())).await.unwrap();
        assert_eq!(by_advertiser.impressions_count, 3);
        assert_eq!(by_advertiser.spent_total, 6.0);
    }
}
