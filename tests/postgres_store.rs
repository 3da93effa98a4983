//! PostgreSQL store against a live database.
//!
//! Runs only when `TEST_DATABASE_URL` points at a scratch database; the
//! embedded migrations are applied on connect.

#![allow(clippy::panic)]

use std::time::Duration;

use tokio_test::assert_ok;

use swim_heat_gateway::domain::{EventId, Heat, HeatStatus};
use swim_heat_gateway::error::GatewayError;
use swim_heat_gateway::persistence::{HeatStore, NewHeat, PostgresStore};

async fn store_with_event() -> Option<(PostgresStore, EventId)> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return None;
    };
    let store = assert_ok!(PostgresStore::connect(&url, 4, 0, Duration::from_secs(5)).await);
    let pool = assert_ok!(sqlx::PgPool::connect(&url).await);
    let event_id = EventId::new();
    assert_ok!(
        sqlx::query(
            "INSERT INTO meet_events (id, title, lane_count, stroke, general_distance) \
             VALUES ($1, 'Medley relay', 4, 'individual_medley', 100)",
        )
        .bind(event_id.as_uuid())
        .execute(&pool)
        .await
    );
    Some((store, event_id))
}

#[tokio::test]
async fn racing_heat_creation_reports_a_conflict() {
    let Some((store, event_id)) = store_with_event().await else {
        return;
    };
    // Two controllers with their own provisional lane ids.
    let ours = NewHeat::empty(1, &Heat::provisional(1, 1..=4).lanes);
    let theirs = NewHeat::empty(1, &Heat::provisional(1, 1..=4).lanes);

    let (a, b) = tokio::join!(
        store.create_heat(event_id, ours),
        store.create_heat(event_id, theirs)
    );
    let (created, lost) = match (a, b) {
        (Ok(created), Err(lost)) | (Err(lost), Ok(created)) => (created, lost),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert_eq!(created.version, 1);
    assert!(matches!(
        lost,
        GatewayError::ConcurrentModification {
            heat: 1,
            expected: 0,
            actual: 1,
        }
    ));
}

#[tokio::test]
async fn reset_epoch_survives_a_reload() {
    let Some((store, event_id)) = store_with_event().await else {
        return;
    };
    let layout = Heat::provisional(1, 1..=4);
    let heat = assert_ok!(store.create_heat(event_id, NewHeat::empty(1, &layout.lanes)).await);

    let v = assert_ok!(store.update_status(event_id, heat.id, 1, HeatStatus::Running).await);
    let v = assert_ok!(
        store
            .update_status(event_id, heat.id, v, HeatStatus::AssigningSwimmers)
            .await
    );
    assert_ok!(store.update_status(event_id, heat.id, v, HeatStatus::Running).await);

    let meet = assert_ok!(store.load_meet(event_id).await);
    let Some(stored) = meet.heats.first() else {
        panic!("heat missing");
    };
    assert_eq!((stored.status, stored.epoch), (HeatStatus::Running, 1));
}
