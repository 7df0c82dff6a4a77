//! # Event Ledger: Impressions and Clicks
//!
//! Append-only record of billable events and the read-backs the selection
//! pipeline needs.
//!
//! ## Write invariants
//!
//! - An impression is keyed by `(day, campaign, client)`. Repeating it on the
//!   same day increments `view_count` on the existing row; it never adds a
//!   second logical row.
//! - A click requires a prior impression for `(campaign, client)` on any day,
//!   and at most one click per `(campaign, client)` ever exists. Violations
//!   come back as [`ClickOutcome`] values, not errors.
//!
//! ## Reads
//!
//! - [`EventLedger::user_campaign_stats`]: totals plus "seen/clicked by this
//!   client" flags, with a zeroed entry for every requested campaign.
//! - [`EventLedger::campaigns_grouped_by_client_views`]: fairness groups,
//!   built by [`group_by_views`].
//! - Aggregate spend/conversion totals per campaign or advertiser, overall
//!   and per day.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use anyhow::Result;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImpressionEvent {
    pub campaign_id: Uuid,
    pub advertiser_id: Uuid,
    pub client_id: Uuid,
    pub income: f64,
    pub day: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClickEvent {
    pub campaign_id: Uuid,
    pub advertiser_id: Uuid,
    pub client_id: Uuid,
    pub income: f64,
    pub day: i32,
}

/// Result of a click write that reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Recorded,
    /// No impression exists for the (campaign, client) pair.
    NoImpression,
    /// A click for the pair already exists.
    AlreadyClicked,
}

/// Per-campaign counters as seen by one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserCampaignStats {
    pub campaign_id: Uuid,
    pub impressions: u64,
    pub clicks: u64,
    pub viewed_by_client: bool,
    pub clicked_by_client: bool,
}

impl UserCampaignStats {
    pub fn empty(campaign_id: Uuid) -> Self {
        UserCampaignStats {
            campaign_id,
            ..Default::default()
        }
    }
}

/// Campaigns the client has viewed exactly `view_count` times in total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewsGroup {
    pub view_count: u64,
    pub campaign_ids: Vec<Uuid>,
}

/// Spend and conversion aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub impressions_count: u64,
    pub clicks_count: u64,
    /// Clicks per impression in percent; 0 without impressions.
    pub conversion: f64,
    pub spent_impressions: f64,
    pub spent_clicks: f64,
    pub spent_total: f64,
}

impl Totals {
    pub fn new(impressions: u64, clicks: u64, spent_impressions: f64, spent_clicks: f64) -> Self {
        let conversion = if impressions > 0 {
            clicks as f64 / impressions as f64 * 100.0
        } else {
            0.0
        };
        Totals {
            impressions_count: impressions,
            clicks_count: clicks,
            conversion,
            spent_impressions,
            spent_clicks,
            spent_total: spent_impressions + spent_clicks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyTotals {
    pub date: i32,
    #[serde(flatten)]
    pub totals: Totals,
}

/// Which events an aggregate covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsScope {
    Campaign(Uuid),
    Advertiser(Uuid),
}

pub trait EventLedger: Send + Sync {
    /// Upsert the `(day, campaign, client)` impression, incrementing its view
    /// count when it already exists.
    fn record_impression(
        &self,
        event: &ImpressionEvent,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Insert a click unless the pair was never shown or was already clicked.
    fn record_click(&self, event: &ClickEvent) -> impl Future<Output = Result<ClickOutcome>> + Send;

    /// Stats for every id in `campaign_ids`, zeroed where no events exist.
    fn user_campaign_stats(
        &self,
        campaign_ids: &[Uuid],
        client_id: Uuid,
    ) -> impl Future<Output = Result<HashMap<Uuid, UserCampaignStats>>> + Send;

    /// Campaigns grouped by the client's total view count, ascending, with
    /// never-viewed campaigns first.
    fn campaigns_grouped_by_client_views(
        &self,
        campaign_ids: &[Uuid],
        client_id: Uuid,
    ) -> impl Future<Output = Result<Vec<ViewsGroup>>> + Send;

    fn totals(&self, scope: StatsScope) -> impl Future<Output = Result<Totals>> + Send;

    /// Per-day totals for days with at least one impression, ascending.
    fn daily_totals(&self, scope: StatsScope) -> impl Future<Output = Result<Vec<DailyTotals>>> + Send;
}

/// Build fairness groups from per-campaign view totals.
///
/// Campaigns missing from `views` (or with zero views) go into a leading
/// zero-view group, which is only emitted when non-empty. The remaining
/// groups follow in ascending view count. Within a group, campaigns keep the
/// order of `campaign_ids`.
pub fn group_by_views(campaign_ids: &[Uuid], views: &HashMap<Uuid, u64>) -> Vec<ViewsGroup> {
    let mut unseen = Vec::new();
    let mut by_count: BTreeMap<u64, Vec<Uuid>> = BTreeMap::new();

    for id in campaign_ids {
        match views.get(id).copied() {
            Some(count) if count > 0 => by_count.entry(count).or_default().push(*id),
            _ => unseen.push(*id),
        }
    }

    let mut groups = Vec::with_capacity(by_count.len() + 1);
    if !unseen.is_empty() {
        groups.push(ViewsGroup {
            view_count: 0,
            campaign_ids: unseen,
        });
    }
    groups.extend(by_count.into_iter().map(|(view_count, campaign_ids)| ViewsGroup {
        view_count,
        campaign_ids,
    }));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_campaigns_form_leading_group() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let views = HashMap::from([(b, 2)]);
        let groups = group_by_views(&[a, b, c], &views);
        assert_eq!(
            groups,
            vec![
                ViewsGroup {
                    view_count: 0,
                    campaign_ids: vec![a, c]
                },
                ViewsGroup {
                    view_count: 2,
                    campaign_ids: vec![b]
                },
            ]
        );
    }

    #[test]
    fn groups_ascend_by_view_count() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let views = HashMap::from([(ids[0], 7), (ids[1], 1), (ids[2], 3), (ids[3], 1)]);
        let groups = group_by_views(&ids, &views);
        let counts: Vec<u64> = groups.iter().map(|g| g.view_count).collect();
        assert_eq!(counts, vec![1, 3, 7]);
        assert_eq!(groups[0].campaign_ids, vec![ids[1], ids[3]]);
    }

    #[test]
    fn no_zero_group_when_everything_was_seen() {
        let a = Uuid::new_v4();
        let groups = group_by_views(&[a], &HashMap::from([(a, 4)]));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].view_count, 4);
    }

    #[test]
    fn empty_request_gives_no_groups() {
        assert!(group_by_views(&[], &HashMap::new()).is_empty());
    }

    #[test]
    fn conversion_is_percent_of_impressions() {
        let t = Totals::new(200, 5, 10.0, 2.5);
        assert_eq!(t.conversion, 2.5);
        assert_eq!(t.spent_total, 12.5);
        assert_eq!(Totals::new(0, 0, 0.0, 0.0).conversion, 0.0);
    }

    #[test]
    fn daily_totals_flatten_into_one_object() {
        let daily = DailyTotals {
            date: 3,
            totals: Totals::new(1, 0, 1.0, 0.0),
        };
        let json = serde_json::to_value(daily).unwrap();
        assert_eq!(json["date"], 3);
        assert_eq!(json["impressions_count"], 1);
    }
}
