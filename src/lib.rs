pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod model;
pub mod prom_metrics;
pub mod scoring;
pub mod selector;
pub mod server;
pub mod targeting;
pub mod threshold;

use std::collections::HashMap;
use std::future::Future;

use anyhow::Result;
use uuid::Uuid;

pub use engine::AdEngine;
pub use error::{Error, ErrorKind, Missing};
pub use ledger::EventLedger;
pub use model::{Ad, Campaign, Client, Gender, TargetGender, Targeting};

/// Client profiles by id. The engine only reads them; the HTTP ingestion
/// routes write them.
pub trait ClientDirectory: Send + Sync {
    fn get_client(&self, id: Uuid) -> impl Future<Output = Result<Option<Client>>> + Send;

    /// Insert or replace the profile with the same id.
    fn upsert_client(&self, client: &Client) -> impl Future<Output = Result<()>> + Send;
}

/// Campaign source for ad selection and click accounting.
pub trait CampaignDirectory: Send + Sync {
    /// All campaigns that are active on `today`, moderated and whose targeting
    /// matches `client` (see [`targeting`] for the rules).
    fn find_eligible(
        &self,
        client: &Client,
        today: i32,
    ) -> impl Future<Output = Result<Vec<Campaign>>> + Send;

    fn get_campaign(&self, id: Uuid) -> impl Future<Output = Result<Option<Campaign>>> + Send;

    fn upsert_campaign(&self, campaign: &Campaign) -> impl Future<Output = Result<()>> + Send;
}

/// Per-(client, advertiser) relevance signal produced by an external model.
pub trait RelevanceDirectory: Send + Sync {
    /// Scores for the requested advertisers. Advertisers without a stored
    /// score are simply absent from the map and count as 0.
    fn bulk_relevance(
        &self,
        client_id: Uuid,
        advertiser_ids: &[Uuid],
    ) -> impl Future<Output = Result<HashMap<Uuid, i64>>> + Send;

    fn upsert_relevance(
        &self,
        client_id: Uuid,
        advertiser_id: Uuid,
        score: i64,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Simulated day counter. Advancing it is an administrative action.
pub trait Clock: Send + Sync {
    fn today(&self) -> i32;
}

/// Everything the selection pipeline reads from and writes to.
pub trait AdStore:
    ClientDirectory + CampaignDirectory + RelevanceDirectory + EventLedger + 'static
{
}

impl<T> AdStore for T where
    T: ClientDirectory + CampaignDirectory + RelevanceDirectory + EventLedger + 'static
{
}
