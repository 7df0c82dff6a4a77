//! Domain types shared by the directories, the engine and the ledger.
//!
//! Gender values travel as upper-case strings (`MALE`, `FEMALE`, `ALL`) both
//! on the wire and in PostgreSQL `TEXT` columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMALE",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "MALE" => Ok(Gender::Male),
            "FEMALE" => Ok(Gender::Female),
            other => anyhow::bail!("unknown gender '{}'", other),
        }
    }
}

/// Gender selector of a campaign's targeting. `All` and an unset selector
/// both match every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetGender {
    Male,
    Female,
    All,
}

impl TargetGender {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetGender::Male => "MALE",
            TargetGender::Female => "FEMALE",
            TargetGender::All => "ALL",
        }
    }
}

impl FromStr for TargetGender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "MALE" => Ok(TargetGender::Male),
            "FEMALE" => Ok(TargetGender::Female),
            "ALL" => Ok(TargetGender::All),
            other => anyhow::bail!("unknown targeting gender '{}'", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: Uuid,
    pub age: i32,
    pub location: String,
    pub gender: Gender,
}

/// Audience restriction of a campaign. `None` on any attribute is a
/// wildcard for that attribute, not a default value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Targeting {
    pub gender: Option<TargetGender>,
    pub age_from: Option<i32>,
    pub age_to: Option<i32>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
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
    #[serde(default)]
    pub targeting: Targeting,
}

/// The creative handed back to the client for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ad {
    pub ad_id: Uuid,
    pub ad_title: String,
    pub ad_text: String,
    pub image_url: Option<String>,
    pub advertiser_id: Uuid,
}

impl From<&Campaign> for Ad {
    fn from(c: &Campaign) -> Self {
        Ad {
            ad_id: c.campaign_id,
            ad_title: c.ad_title.clone(),
            ad_text: c.ad_text.clone(),
            image_url: c.image_url.clone(),
            advertiser_id: c.advertiser_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_parses_upper_case_only() {
        assert_eq!("MALE".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!("FEMALE".parse::<Gender>().unwrap(), Gender::Female);
        assert!("male".parse::<Gender>().is_err());
        assert!("ALL".parse::<Gender>().is_err());
    }

    #[test]
    fn target_gender_accepts_all() {
        assert_eq!("ALL".parse::<TargetGender>().unwrap(), TargetGender::All);
        assert_eq!(TargetGender::All.as_str(), "ALL");
    }

    #[test]
    fn gender_serializes_upper_case() {
        let json = serde_json::to_string(&Gender::Female).unwrap();
        assert_eq!(json, "\"FEMALE\"");
    }

    #[test]
    fn ad_copies_creative_fields() {
        let campaign = Campaign {
            campaign_id: Uuid::new_v4(),
            advertiser_id: Uuid::new_v4(),
            impressions_limit: 10,
            clicks_limit: 1,
            cost_per_impression: 1.0,
            cost_per_click: 2.0,
            ad_title: "Title".into(),
            ad_text: "Text".into(),
            image_url: None,
            start_date: 0,
            end_date: 1,
            moderated: true,
            targeting: Targeting::default(),
        };
        let ad = Ad::from(&campaign);
        assert_eq!(ad.ad_id, campaign.campaign_id);
        assert_eq!(ad.advertiser_id, campaign.advertiser_id);
        assert_eq!(ad.ad_title, "Title");
        assert!(ad.image_url.is_none());
    }
}
