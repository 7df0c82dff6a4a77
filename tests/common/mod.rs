//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use adserve::clock::DayClock;
use adserve::config::ServerConfig;
use adserve::db::Database;
use adserve::memory::MemoryStore;
use adserve::scoring::{Scorer, ScoringWeights};
use adserve::server::{self, AppState};
use adserve::{AdEngine, Campaign, Client, Gender, TargetGender, Targeting};
use uuid::Uuid;

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// Connect to the test database, apply the schema and empty every table.
pub async fn setup_test_db() -> Database {
    let db = Database::connect(&test_db_url(), 2)
        .await
        .expect("Failed to connect to test database");
    db.migrate().await.expect("Failed to apply schema");
    truncate_all_tables(db.pool()).await;
    db
}

/// Truncate all tables to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql(
        "TRUNCATE TABLE ad_clicks, ad_impressions, relevance_scores, campaigns, clients",
    )
    .execute(pool)
    .await
    .unwrap();
}

pub fn engine<S: adserve::AdStore>(store: Arc<S>, clock: Arc<DayClock>) -> AdEngine<S> {
    AdEngine::new(
        store,
        Arc::new(Scorer::new(ScoringWeights::default()).unwrap()),
        clock,
        Duration::from_secs(5),
    )
}

/// Router over a fresh in-memory store. The state is returned for seeding.
pub fn build_memory_app(day: i32) -> (axum::Router, Arc<AppState<MemoryStore>>) {
    let clock = Arc::new(DayClock::new(day));
    let engine = engine(Arc::new(MemoryStore::new()), clock.clone());
    let state = AppState::new(engine, clock);
    let router = server::build_router(state.clone(), &ServerConfig::default());
    (router, state)
}

pub fn client(age: i32, location: &str, gender: Gender) -> Client {
    Client {
        client_id: Uuid::new_v4(),
        age,
        location: location.to_string(),
        gender,
    }
}

/// Moderated campaign running on days 0..=100 that targets everyone.
pub fn campaign(advertiser_id: Uuid) -> Campaign {
    Campaign {
        campaign_id: Uuid::new_v4(),
        advertiser_id,
        impressions_limit: 100,
        clicks_limit: 10,
        cost_per_impression: 2.0,
        cost_per_click: 5.0,
        ad_title: "Spring sale".into(),
        ad_text: "Everything half price".into(),
        image_url: Some("https://cdn.example.com/sale.png".into()),
        start_date: 0,
        end_date: 100,
        moderated: true,
        targeting: Targeting {
            gender: Some(TargetGender::All),
            ..Default::default()
        },
    }
}
