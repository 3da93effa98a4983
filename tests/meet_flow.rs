//! End-to-end heat flow over the service layer: in-memory store, in-process
//! event bus and simulated timing stations.

#![allow(clippy::panic)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio_test::{assert_err, assert_ok};

use swim_heat_gateway::domain::{
    Advance, BroadcastChannel, Distance, Event, EventBus, EventId, HeatStatus, HeatTag, LaneId,
    Medal, MeetRegistry, MeetSignal, RaceTime, Rejection, Stroke, SubmitOutcome, Subscription,
    Swimmer, SwimmerId, TimingStation,
};
use swim_heat_gateway::error::{GatewayError, StateConflict};
use swim_heat_gateway::persistence::{HeatStore, InMemoryStore, MeetDirectory};
use swim_heat_gateway::service::MeetService;

struct Meet {
    service: MeetService,
    signals: Subscription,
    event_id: EventId,
    a: SwimmerId,
    b: SwimmerId,
    c: SwimmerId,
    d: SwimmerId,
}

fn resolution_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap_or_default()
}

fn swimmer(name: &str, year: i32) -> Swimmer {
    Swimmer {
        id: SwimmerId::new(),
        name: name.to_string(),
        birth_date: NaiveDate::from_ymd_opt(year, 5, 10).unwrap_or_default(),
    }
}

fn event() -> Event {
    Event {
        id: EventId::new(),
        title: "Freestyle".to_string(),
        lane_count: 4,
        stroke: Stroke::Freestyle,
        general_distance: Distance::meters(200),
        category_distance_overrides: BTreeMap::from([(
            "pre_minima".to_string(),
            Distance::meters(100),
        )]),
        eligible_categories: BTreeSet::new(),
    }
}

fn service_over(store: &Arc<InMemoryStore>) -> MeetService {
    let heat_store: Arc<dyn HeatStore> = Arc::<InMemoryStore>::clone(store);
    let directory: Arc<dyn MeetDirectory> = Arc::<InMemoryStore>::clone(store);
    let channel: Arc<dyn BroadcastChannel> = Arc::new(EventBus::new(64));
    MeetService::new(Arc::new(MeetRegistry::new()), heat_store, directory, channel)
        .with_resolution_date(resolution_date())
}

/// A and C are pre_minima (100m); B and D are minima_1 (200m).
async fn meet() -> (Meet, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let event = event();
    let event_id = event.id;
    let swimmers = vec![
        swimmer("A", 2019),
        swimmer("B", 2017),
        swimmer("C", 2019),
        swimmer("D", 2017),
    ];
    let ids: Vec<SwimmerId> = swimmers.iter().map(|s| s.id).collect();
    store.insert_event(event, swimmers).await;

    let service = service_over(&store);
    let signals = service.channel().subscribe(event_id);
    let [a, b, c, d] = ids.as_slice() else {
        panic!("four swimmers");
    };
    (
        Meet {
            service,
            signals,
            event_id,
            a: *a,
            b: *b,
            c: *c,
            d: *d,
        },
        store,
    )
}

async fn lane(meet: &Meet, number: u8) -> LaneId {
    let snapshot = assert_ok!(meet.service.snapshot(meet.event_id).await);
    let active = snapshot
        .heats
        .iter()
        .find(|h| h.number() == snapshot.active_heat);
    let Some(lane) = active.and_then(|h| h.lanes.iter().find(|l| l.number == number)) else {
        panic!("lane {number} missing from the active heat");
    };
    lane.id
}

/// Delivers every pending signal to the stations.
async fn deliver(
    signals: &mut Subscription,
    stations: &mut [&mut TimingStation],
) -> Vec<MeetSignal> {
    let mut seen = Vec::new();
    while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_millis(50), signals.recv()).await
    {
        for station in stations.iter_mut() {
            station.observe(&msg.signal);
        }
        seen.push(msg.signal);
    }
    seen
}

async fn assign_and_start(meet: &Meet, pairs: &[(u8, SwimmerId)]) -> HeatTag {
    for (number, swimmer) in pairs {
        let lane_id = lane(meet, *number).await;
        assert_ok!(meet.service.stage(meet.event_id, lane_id, Some(*swimmer)).await);
    }
    assert_ok!(meet.service.save_assignments(meet.event_id).await);
    assert_ok!(meet.service.start(meet.event_id).await)
}

#[tokio::test]
async fn eligible_pool_follows_selected_distance() {
    let (m, _) = meet().await;
    let short = assert_ok!(
        m.service
            .eligible_pool(m.event_id, Some(Distance::meters(100)))
            .await
    );
    let long = assert_ok!(
        m.service
            .eligible_pool(m.event_id, Some(Distance::meters(200)))
            .await
    );
    let ids = |pool: &[Swimmer]| pool.iter().map(|s| s.id).collect::<BTreeSet<_>>();
    assert_eq!(ids(&short), BTreeSet::from([m.a, m.c]));
    assert_eq!(ids(&long), BTreeSet::from([m.b, m.d]));
}

#[tokio::test]
async fn full_event_with_stations_and_reset() {
    let (mut m, store) = meet().await;
    let mut s1 = TimingStation::new(m.event_id, 1);
    let mut s2 = TimingStation::new(m.event_id, 2);

    // Heat 1: B and D over 200m.
    let l1 = lane(&m, 1).await;
    assert_ok!(m.service.stage(m.event_id, l1, Some(m.b)).await);
    let staged_only = m.service.start(m.event_id).await;
    assert!(matches!(
        staged_only,
        Err(GatewayError::StateConflict(StateConflict::NoSwimmersAssigned { heat: 1 }))
    ));
    let tag = assign_and_start(&m, &[(2, m.d)]).await;
    assert_eq!(tag, HeatTag::new(1, 0));

    let seen = deliver(&mut m.signals, &mut [&mut s1, &mut s2]).await;
    let types: Vec<&str> = seen.iter().map(MeetSignal::signal_type).collect();
    assert_eq!(types, vec!["swimmers-assigned", "heat-start"]);
    assert_eq!(s1.swimmer(), Some(m.b));
    assert!(s2.is_running());

    let Some(t1) = s1.submit(RaceTime::from_millis(32_450)) else {
        panic!("station 1 should submit while running");
    };
    let Some(t2) = s2.submit(RaceTime::from_millis(31_980)) else {
        panic!("station 2 should submit while running");
    };
    assert_eq!(assert_ok!(m.service.ingest(m.event_id, t1).await), SubmitOutcome::Recorded);
    assert_eq!(assert_ok!(m.service.ingest(m.event_id, t2).await), SubmitOutcome::Recorded);

    let completion = assert_ok!(m.service.complete(m.event_id).await);
    let podium: Vec<(u8, Option<Medal>)> = completion
        .standings
        .iter()
        .map(|s| (s.lane_number, s.medal))
        .collect();
    assert_eq!(podium, vec![(2, Some(Medal::Gold)), (1, Some(Medal::Silver))]);

    // Heat 2 is spawned for the 100m swimmers; B has already swum.
    let advance = assert_ok!(m.service.advance(m.event_id).await);
    assert!(matches!(
        advance,
        Advance::Moved {
            heat_number: 2,
            spawned: true,
            ..
        }
    ));
    let l1 = lane(&m, 1).await;
    assert!(matches!(
        m.service.stage(m.event_id, l1, Some(m.b)).await,
        Err(GatewayError::Rejected(Rejection::AlreadyCompeted { heat: 1 }))
    ));

    assert_ok!(m.service.select_distance(m.event_id, Distance::meters(100)).await);
    let tag = assign_and_start(&m, &[(1, m.a), (2, m.c)]).await;
    assert_eq!(tag, HeatTag::new(2, 0));
    deliver(&mut m.signals, &mut [&mut s1, &mut s2]).await;

    // Station 1 finishes before the false start is called.
    let Some(early) = s1.submit(RaceTime::from_millis(70_000)) else {
        panic!("station 1 should submit heat 2");
    };
    let reset = assert_ok!(m.service.reset(m.event_id).await);
    assert_eq!(reset, HeatTag::new(2, 1));
    let late = assert_ok!(m.service.ingest(m.event_id, early).await);
    assert!(matches!(late, SubmitOutcome::Stale { .. }));
    let heat = assert_ok!(m.service.heat(m.event_id, 2).await);
    assert!(heat.lanes.iter().all(|l| l.final_time.is_none()));
    assert_eq!(heat.status, HeatStatus::AssigningSwimmers);

    assert_eq!(assert_ok!(m.service.start(m.event_id).await), HeatTag::new(2, 1));
    deliver(&mut m.signals, &mut [&mut s1, &mut s2]).await;
    assert_eq!(s1.current(), Some(HeatTag::new(2, 1)));

    // One lane still missing: nothing moves.
    let Some(t1) = s1.submit(RaceTime::from_millis(61_000)) else {
        panic!("station 1 should submit the rerun");
    };
    assert_ok!(m.service.ingest(m.event_id, t1).await);
    let pending = m.service.complete(m.event_id).await;
    let l2 = lane(&m, 2).await;
    assert!(matches!(
        pending,
        Err(GatewayError::StateConflict(StateConflict::TimesPending { heat: 2, ref lanes }))
            if lanes == &vec![l2]
    ));
    let snapshot = assert_ok!(m.service.snapshot(m.event_id).await);
    assert_eq!(snapshot.collecting, Some(HeatTag::new(2, 1)));

    let Some(t2) = s2.submit(RaceTime::from_millis(64_500)) else {
        panic!("station 2 should submit the rerun");
    };
    assert_ok!(m.service.ingest(m.event_id, t2).await);
    assert_ok!(m.service.complete(m.event_id).await);
    assert!(matches!(
        assert_ok!(m.service.advance(m.event_id).await),
        Advance::ReadyToFinish
    ));

    let absent = assert_ok!(m.service.finish(m.event_id, None).await);
    assert!(absent.is_empty());
    assert!(matches!(
        m.service.finish(m.event_id, None).await,
        Err(GatewayError::StateConflict(StateConflict::EventFinished))
    ));
    let seen = deliver(&mut m.signals, &mut [&mut s1, &mut s2]).await;
    assert_eq!(seen.last().map(MeetSignal::signal_type), Some("event-finished"));

    // A fresh controller rebuilds the same picture from the store.
    let reloaded = service_over(&store);
    let snapshot = assert_ok!(reloaded.snapshot(m.event_id).await);
    assert!(snapshot.finished);
    assert_eq!(snapshot.heats.len(), 2);
    assert!(snapshot.heats.iter().all(|h| h.status == HeatStatus::Completed));
    let ranking = assert_ok!(reloaded.ranking(m.event_id, 1).await);
    assert_eq!(ranking.first().and_then(|s| s.swimmer_id), Some(m.d));
}

#[tokio::test]
async fn second_controller_conflicts_then_retries() {
    let (first, store) = meet().await;
    let second = service_over(&store);
    let event_id = first.event_id;

    // Both controllers load heat 1 while it is still provisional.
    assert_ok!(second.snapshot(event_id).await);
    let l1 = lane(&first, 1).await;
    let l3 = {
        let snapshot = assert_ok!(second.snapshot(event_id).await);
        let heat = snapshot.heats.first().map(|h| h.lanes.clone()).unwrap_or_default();
        let Some(lane) = heat.iter().find(|l| l.number == 3) else {
            panic!("lane 3 missing");
        };
        lane.id
    };

    assert_ok!(first.service.stage(event_id, l1, Some(first.b)).await);
    assert_ok!(first.service.save_assignments(event_id).await);

    assert_ok!(second.stage(event_id, l3, Some(first.d)).await);
    let conflict = second.save_assignments(event_id).await;
    assert!(matches!(
        conflict,
        Err(GatewayError::ConcurrentModification { heat: 1, .. })
    ));

    // The conflict pulled in the stored heat; the staged lane survived.
    let heat = assert_ok!(second.save_assignments(event_id).await);
    let occupied: BTreeSet<u8> = heat
        .lanes
        .iter()
        .filter(|l| l.swimmer.is_some())
        .map(|l| l.number)
        .collect();
    assert_eq!(occupied, BTreeSet::from([1, 3]));
}

#[tokio::test]
async fn restarted_controller_keeps_the_reset_epoch() {
    let (m, store) = meet().await;
    assert_eq!(assign_and_start(&m, &[(1, m.b)]).await, HeatTag::new(1, 0));
    let l1 = lane(&m, 1).await;
    assert_eq!(assert_ok!(m.service.reset(m.event_id).await), HeatTag::new(1, 1));
    let again = assert_ok!(m.service.start(m.event_id).await);
    assert_eq!(again, HeatTag::new(1, 1));

    // A fresh controller over the same store resumes the second attempt.
    let restarted = service_over(&store);
    let snapshot = assert_ok!(restarted.snapshot(m.event_id).await);
    assert_eq!(snapshot.collecting, Some(again));

    let late = assert_ok!(
        restarted
            .submit_time(m.event_id, HeatTag::new(1, 0), l1, RaceTime::from_millis(29_000))
            .await
    );
    assert!(matches!(late, SubmitOutcome::Stale { .. }));
    let current = assert_ok!(
        restarted
            .submit_time(m.event_id, again, l1, RaceTime::from_millis(33_410))
            .await
    );
    assert_eq!(current, SubmitOutcome::Recorded);

    let completion = assert_ok!(restarted.complete(m.event_id).await);
    let times: Vec<Option<RaceTime>> = completion.standings.iter().map(|s| s.final_time).collect();
    assert_eq!(times, vec![Some(RaceTime::from_millis(33_410))]);
}

#[tokio::test]
async fn finish_marks_listed_swimmers_absent() {
    let (m, _) = meet().await;
    let running = assign_and_start(&m, &[(1, m.b)]).await;
    assert_eq!(running, HeatTag::new(1, 0));
    let blocked = m.service.finish(m.event_id, Some(vec![m.a])).await;
    assert!(matches!(
        blocked,
        Err(GatewayError::StateConflict(StateConflict::HeatRunning { heat: 1 }))
    ));

    assert_ok!(m.service.reset(m.event_id).await);
    let absent = assert_ok!(m.service.finish(m.event_id, Some(vec![m.a, m.c])).await);
    assert_eq!(absent, vec![m.a, m.c]);
    let snapshot = assert_ok!(m.service.snapshot(m.event_id).await);
    assert!(!snapshot.unpaired.contains(&m.a));
    assert_err!(m.service.select_distance(m.event_id, Distance::meters(100)).await);
}
