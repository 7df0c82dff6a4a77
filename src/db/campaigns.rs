//! Campaign directory.
//!
//! [`Database::find_eligible`] pushes the eligibility rules of
//! [`crate::targeting`] into SQL: NULL targeting columns and `'ALL'` gender
//! are wildcards. Rows come back in creation order so candidate order is
//! stable between requests.

use super::Database;
use anyhow::{Context, Result};
use uuid::Uuid;

use crate::model::{Campaign, Client, TargetGender, Targeting};
use crate::CampaignDirectory;

const CAMPAIGN_COLUMNS: &str = "campaign_id, advertiser_id, impressions_limit, clicks_limit,
    cost_per_impression, cost_per_click, ad_title, ad_text, image_url,
    start_date, end_date, moderated,
    target_gender, target_age_from, target_age_to, target_location";

#[derive(Debug, sqlx::FromRow)]
pub struct CampaignRow {
    pub campaign_id: Uuid,
    pub advertiser_id: Uuid,
    pub impressions_limit: i64,
    pub clicks_limit: i64,
    pub cost_per_impression: f64,
    pub cost_per_click: f64,
    pub ad_title: String,
    pub ad_text: String,
    pub image_url: Option<String>,
    pub start_date: i32,
    pub end_date: i32,
    pub moderated: bool,
    pub target_gender: Option<String>,
    pub target_age_from: Option<i32>,
    pub target_age_to: Option<i32>,
    pub target_location: Option<String>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = anyhow::Error;

    fn try_from(row: CampaignRow) -> Result<Self> {
        let gender = row
            .target_gender
            .as_deref()
            .map(str::parse::<TargetGender>)
            .transpose()
            .with_context(|| format!("campaign {}", row.campaign_id))?;
        Ok(Campaign {
            campaign_id: row.campaign_id,
            advertiser_id: row.advertiser_id,
            impressions_limit: row.impressions_limit,
            clicks_limit: row.clicks_limit,
            cost_per_impression: row.cost_per_impression,
            cost_per_click: row.cost_per_click,
            ad_title: row.ad_title,
            ad_text: row.ad_text,
            image_url: row.image_url,
            start_date: row.start_date,
            end_date: row.end_date,
            moderated: row.moderated,
            targeting: Targeting {
                gender,
                age_from: row.target_age_from,
                age_to: row.target_age_to,
                location: row.target_location,
            },
        })
    }
}

impl Database {
    pub async fn find_eligible(&self, client: &Client, today: i32) -> Result<Vec<Campaign>> {
        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
             WHERE moderated
               AND start_date <= $1 AND end_date >= $1
               AND (target_gender IS NULL OR target_gender = 'ALL' OR target_gender = $2)
               AND (target_age_from IS NULL OR target_age_from <= $3)
               AND (target_age_to IS NULL OR target_age_to >= $3)
               AND (target_location IS NULL OR target_location = $4)
             ORDER BY created_at, campaign_id"
        );
        let rows = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(today)
            .bind(client.gender.as_str())
            .bind(client.age)
            .bind(&client.location)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Campaign::try_from).collect()
    }

    pub async fn get_campaign(&self, campaign_id: Uuid) -> Result<Option<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE campaign_id = $1");
        let row = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Campaign::try_from).transpose()
    }

    pub async fn upsert_campaign(&self, campaign: &Campaign) -> Result<()> {
        let t = &campaign.targeting;
        sqlx::query(
            "INSERT INTO campaigns (campaign_id, advertiser_id, impressions_limit, clicks_limit,
                                    cost_per_impression, cost_per_click, ad_title, ad_text, image_url,
                                    start_date, end_date, moderated,
                                    target_gender, target_age_from, target_age_to, target_location)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
             ON CONFLICT (campaign_id) DO UPDATE SET
               advertiser_id = EXCLUDED.advertiser_id,
               impressions_limit = EXCLUDED.impressions_limit,
               clicks_limit = EXCLUDED.clicks_limit,
               cost_per_impression = EXCLUDED.cost_per_impression,
               cost_per_click = EXCLUDED.cost_per_click,
               ad_title = EXCLUDED.ad_title,
               ad_text = EXCLUDED.ad_text,
               image_url = EXCLUDED.image_url,
               start_date = EXCLUDED.start_date,
               end_date = EXCLUDED.end_date,
               moderated = EXCLUDED.moderated,
               target_gender = EXCLUDED.target_gender,
               target_age_from = EXCLUDED.target_age_from,
               target_age_to = EXCLUDED.target_age_to,
               target_location = EXCLUDED.target_location",
        )
        .bind(campaign.campaign_id)
        .bind(campaign.advertiser_id)
        .bind(campaign.impressions_limit)
        .bind(campaign.clicks_limit)
        .bind(campaign.cost_per_impression)
        .bind(campaign.cost_per_click)
        .bind(&campaign.ad_title)
        .bind(&campaign.ad_text)
        .bind(campaign.image_url.as_deref())
        .bind(campaign.start_date)
        .bind(campaign.end_date)
        .bind(campaign.moderated)
        .bind(t.gender.map(|g| g.as_str()))
        .bind(t.age_from)
        .bind(t.age_to)
        .bind(t.location.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl CampaignDirectory for Database {
    async fn find_eligible(&self, client: &Client, today: i32) -> Result<Vec<Campaign>> {
        Database::find_eligible(self, client, today).await
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
        Database::get_campaign(self, id).await
    }

    async fn upsert_campaign(&self, campaign: &Campaign) -> Result<()> {
        Database::upsert_campaign(self, campaign).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(target_gender: Option<&str>) -> CampaignRow {
        CampaignRow {
            campaign_id: Uuid::new_v4(),
            advertiser_id: Uuid::new_v4(),
            impressions_limit: 10,
            clicks_limit: 2,
            cost_per_impression: 1.0,
            cost_per_click: 3.0,
            ad_title: "t".into(),
            ad_text: "x".into(),
            image_url: None,
            start_date: 1,
            end_date: 4,
            moderated: true,
            target_gender: target_gender.map(String::from),
            target_age_from: Some(18),
            target_age_to: None,
            target_location: Some("Moscow".into()),
        }
    }

    #[test]
    fn row_maps_targeting_columns() {
        let campaign = Campaign::try_from(row(Some("ALL"))).unwrap();
        assert_eq!(campaign.targeting.gender, Some(TargetGender::All));
        assert_eq!(campaign.targeting.age_from, Some(18));
        assert_eq!(campaign.targeting.age_to, None);
        assert_eq!(campaign.targeting.location.as_deref(), Some("Moscow"));
    }

    #[test]
    fn null_gender_is_a_wildcard() {
        let campaign = Campaign::try_from(row(None)).unwrap();
        assert_eq!(campaign.targeting.gender, None);
    }

    #[test]
    fn unknown_gender_is_rejected() {
        let err = Campaign::try_from(row(Some("OTHER"))).unwrap_err();
        assert!(format!("{:#}", err).contains("OTHER"));
    }
}
