//! Database integration tests.
//!
//! All tests require TEST_DATABASE_URL to be set.
//! Run with: TEST_DATABASE_URL=postgres://... cargo test --test db_integration
//!
//! Tests should be run single-threaded to avoid conflicts:
//!   cargo test --test db_integration -- --test-threads=1

mod common;

use std::sync::Arc;

use adserve::clock::DayClock;
use adserve::db::Database;
use adserve::ledger::{ClickEvent, ClickOutcome, ImpressionEvent, StatsScope};
use adserve::{Error, Gender, Missing, TargetGender};
use uuid::Uuid;

/// Skip the test if TEST_DATABASE_URL is not set.
macro_rules! require_db {
    () => {
        if !common::has_test_db() {
            eprintln!("Skipping: TEST_DATABASE_URL not set");
            return;
        }
    };
}

async fn setup() -> Database {
    common::setup_test_db().await
}

fn impression(campaign_id: Uuid, advertiser_id: Uuid, client_id: Uuid, day: i32, income: f64) -> ImpressionEvent {
    ImpressionEvent {
        campaign_id,
        advertiser_id,
        client_id,
        income,
        day,
    }
}

#[tokio::test]
async fn connect_and_health_check() {
    require_db!();
    let db = setup().await;
    db.health_check().await.unwrap();
}

#[tokio::test]
async fn migrate_is_idempotent() {
    require_db!();
    let db = setup().await;
    db.migrate().await.unwrap();
}

// --- Directories ---

#[tokio::test]
async fn client_upsert_and_lookup() {
    require_db!();
    let db = setup().await;
    let mut client = common::client(21, "Moscow", Gender::Male);
    db.upsert_client(&client).await.unwrap();
    assert_eq!(db.get_client(client.client_id).await.unwrap(), Some(client.clone()));

    client.age = 22;
    db.upsert_client(&client).await.unwrap();
    assert_eq!(db.get_client(client.client_id).await.unwrap().unwrap().age, 22);
    assert!(db.get_client(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn find_eligible_applies_targeting_in_sql() {
    require_db!();
    let db = setup().await;
    let client = common::client(30, "Moscow", Gender::Female);

    let open = common::campaign(Uuid::new_v4());
    let mut wildcard = common::campaign(Uuid::new_v4());
    wildcard.targeting = Default::default();
    let mut men_only = common::campaign(Uuid::new_v4());
    men_only.targeting.gender = Some(TargetGender::Male);
    let mut age_band = common::campaign(Uuid::new_v4());
    age_band.targeting.age_from = Some(18);
    age_band.targeting.age_to = Some(29);
    let mut not_moderated = common::campaign(Uuid::new_v4());
    not_moderated.moderated = false;
    let mut future = common::campaign(Uuid::new_v4());
    future.start_date = 10;

    for c in [&open, &wildcard, &men_only, &age_band, &not_moderated, &future] {
        db.upsert_campaign(c).await.unwrap();
    }

    let eligible = db.find_eligible(&client, 5).await.unwrap();
    let mut ids: Vec<Uuid> = eligible.iter().map(|c| c.campaign_id).collect();
    ids.sort();
    let mut expected = vec![open.campaign_id, wildcard.campaign_id];
    expected.sort();
    assert_eq!(ids, expected);
    assert!(eligible.contains(&open));

    assert_eq!(db.get_campaign(men_only.campaign_id).await.unwrap(), Some(men_only));
}

#[tokio::test]
async fn bulk_relevance_omits_missing_pairs() {
    require_db!();
    let db = setup().await;
    let (client, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    db.upsert_relevance(client, a, 750).await.unwrap();

    let scores = db.bulk_relevance(client, &[a, b]).await.unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[&a], 750);
}

// --- Ledger ---

#[tokio::test]
async fn impression_upsert_increments_view_count() {
    require_db!();
    let db = setup().await;
    let (campaign, advertiser, client) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    db.record_impression(&impression(campaign, advertiser, client, 1, 2.0)).await.unwrap();
    db.record_impression(&impression(campaign, advertiser, client, 1, 0.0)).await.unwrap();
    db.record_impression(&impression(campaign, advertiser, client, 2, 0.0)).await.unwrap();

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ad_impressions WHERE campaign_id = $1")
        .bind(campaign)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(rows, 2);

    let groups = db
        .campaigns_grouped_by_client_views(&[campaign], client)
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].view_count, 3);

    let totals = db.totals(StatsScope::Campaign(campaign)).await.unwrap();
    assert_eq!(totals.impressions_count, 2);
    assert_eq!(totals.spent_impressions, 2.0);
}

#[tokio::test]
async fn click_requires_impression_and_is_unique() {
    require_db!();
    let db = setup().await;
    let (campaign, advertiser, client) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let click = ClickEvent {
        campaign_id: campaign,
        advertiser_id: advertiser,
        client_id: client,
        income: 4.0,
        day: 3,
    };

    assert_eq!(db.record_click(&click).await.unwrap(), ClickOutcome::NoImpression);
    db.record_impression(&impression(campaign, advertiser, client, 1, 1.0)).await.unwrap();
    assert_eq!(db.record_click(&click).await.unwrap(), ClickOutcome::Recorded);
    assert_eq!(db.record_click(&click).await.unwrap(), ClickOutcome::AlreadyClicked);

    let stats = db.user_campaign_stats(&[campaign], client).await.unwrap();
    let s = stats[&campaign];
    assert_eq!((s.impressions, s.clicks), (1, 1));
    assert!(s.viewed_by_client && s.clicked_by_client);
}

#[tokio::test]
async fn concurrent_duplicate_clicks_record_once() {
    require_db!();
    let db = setup().await;
    let (campaign, advertiser, client) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    db.record_impression(&impression(campaign, advertiser, client, 1, 1.0)).await.unwrap();
    let click = ClickEvent {
        campaign_id: campaign,
        advertiser_id: advertiser,
        client_id: client,
        income: 4.0,
        day: 1,
    };

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move { db.record_click(&click).await.unwrap() })
        })
        .collect();
    let mut recorded = 0;
    for h in handles {
        if h.await.unwrap() == ClickOutcome::Recorded {
            recorded += 1;
        }
    }
    assert_eq!(recorded, 1);
}

#[tokio::test]
async fn daily_totals_attach_clicks_to_impression_days() {
    require_db!();
    let db = setup().await;
    let advertiser = Uuid::new_v4();
    let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
    let client = Uuid::new_v4();
    db.record_impression(&impression(c1, advertiser, client, 1, 1.5)).await.unwrap();
    db.record_impression(&impression(c2, advertiser, client, 2, 2.5)).await.unwrap();
    db.record_click(&ClickEvent {
        campaign_id: c2,
        advertiser_id: advertiser,
        client_id: client,
        income: 3.0,
        day: 2,
    })
    .await
    .unwrap();

    let daily = db.daily_totals(StatsScope::Advertiser(advertiser)).await.unwrap();
    assert_eq!(daily.iter().map(|d| d.date).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(daily[1].totals.clicks_count, 1);
    assert_eq!(daily[1].totals.spent_total, 5.5);
}

// --- Engine on PostgreSQL ---

#[tokio::test]
async fn engine_end_to_end_on_postgres() {
    require_db!();
    let db = Arc::new(setup().await);
    let client = common::client(21, "Moscow", Gender::Male);
    let campaign = common::campaign(Uuid::new_v4());
    db.upsert_client(&client).await.unwrap();
    db.upsert_campaign(&campaign).await.unwrap();

    let engine = common::engine(db.clone(), Arc::new(DayClock::new(5)));
    let ad = engine.select_ad(client.client_id).await.unwrap();
    assert_eq!(ad.ad_id, campaign.campaign_id);

    engine.record_click(campaign.campaign_id, client.client_id).await.unwrap();
    let err = engine
        .record_click(campaign.campaign_id, client.client_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyClicked));

    let err = engine
        .record_click(Uuid::new_v4(), client.client_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(Missing::Campaign)));
}
