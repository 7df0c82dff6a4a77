//! Eligibility filter: which campaigns may be shown to a client today.
//!
//! A campaign is eligible when it is running (`start_date <= today <=
//! end_date`), has passed moderation, and every targeting attribute is either
//! unset or matches the client. The PostgreSQL directory expresses the same
//! rules as a `WHERE` clause (see `db::campaigns`); [`MemoryStore`] uses
//! [`filter_eligible`] directly.
//!
//! [`MemoryStore`]: crate::memory::MemoryStore

use crate::model::{Campaign, Client, TargetGender, Targeting};

impl Targeting {
    /// AND across attributes; within an attribute, unset matches everything.
    pub fn matches(&self, client: &Client) -> bool {
        let gender_ok = match self.gender {
            None | Some(TargetGender::All) => true,
            Some(g) => g.as_str() == client.gender.as_str(),
        };
        let age_from_ok = self.age_from.map_or(true, |from| client.age >= from);
        let age_to_ok = self.age_to.map_or(true, |to| client.age <= to);
        let location_ok = self
            .location
            .as_deref()
            .map_or(true, |loc| loc == client.location);

        gender_ok && age_from_ok && age_to_ok && location_ok
    }
}

impl Campaign {
    pub fn is_running(&self, today: i32) -> bool {
        self.start_date <= today && today <= self.end_date
    }

    pub fn is_eligible_for(&self, client: &Client, today: i32) -> bool {
        self.moderated && self.is_running(today) && self.targeting.matches(client)
    }
}

/// Campaigns eligible for `client` on `today`, in input order.
pub fn filter_eligible<'a, I>(campaigns: I, client: &Client, today: i32) -> Vec<Campaign>
where
    I: IntoIterator<Item = &'a Campaign>,
{
    campaigns
        .into_iter()
        .filter(|c| c.is_eligible_for(client, today))
        .cloned()
        .collect()
}
