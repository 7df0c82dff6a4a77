//! # Database: PostgreSQL Storage Layer
//!
//! Implements every collaborator trait of the ad engine on one `sqlx::PgPool`.
//!
//! ## Schema
//!
//! See `migrations/001_create_schema.sql`, applied by `adserve migrate`:
//!
//! - `clients`: client profiles (written by the client directory service)
//! - `campaigns`: campaign settings with inline `target_*` columns
//! - `relevance_scores`: model score per (client, advertiser)
//! - `ad_impressions`: one row per (day, campaign, client), `view_count` upserted
//! - `ad_clicks`: one row per (campaign, client), primary key enforced
//!
//! ## Module Structure
//!
//! - [`clients`]: client lookup and upsert
//! - [`campaigns`]: eligibility query, lookup and upsert
//! - [`relevance`]: bulk relevance lookup and upsert
//! - [`ledger`]: impression/click writes and aggregate read-backs

mod campaigns;
mod clients;
mod ledger;
mod relevance;

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::server::Readiness;

pub use campaigns::CampaignRow;
pub use clients::ClientRow;

/// Schema applied by [`Database::migrate`].
pub const SCHEMA: &str = include_str!("../../migrations/001_create_schema.sql");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// The URL is parsed by hand so percent-encoded user names and passwords
    /// reach the server decoded.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let url = url::Url::parse(database_url).context("invalid DATABASE_URL")?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .context("failed to connect to PostgreSQL")?;
        Ok(Database { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Execute `SELECT 1` to verify connectivity. Backs `/readyz`.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Create missing tables and indexes. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("failed to apply schema")?;
        Ok(())
    }
}

impl Readiness for Database {
    async fn ready(&self) -> Result<()> {
        self.health_check().await
    }
}
