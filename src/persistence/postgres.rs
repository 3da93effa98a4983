//! PostgreSQL implementation of the heat store and meet directory.
//!
//! Versioned writes run in a transaction that first bumps
//! `heats.version` guarded by the expected value; when no row matches,
//! the current version is read back and reported as a concurrent
//! modification.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{
    HeatRecord, LaneAssignment, LaneRecord, LaneResult, MeetRecord, NewHeat,
};
use super::{HeatStore, MeetDirectory};
use crate::domain::{
    Distance, Event, EventId, HeatId, HeatStatus, LaneId, RaceTime, Stroke, Swimmer, SwimmerId,
};
use crate::error::GatewayError;

fn db_err(e: sqlx::Error) -> GatewayError {
    GatewayError::PersistenceError(e.to_string())
}

fn corrupt(what: impl std::fmt::Display) -> GatewayError {
    GatewayError::PersistenceError(format!("corrupt row: {what}"))
}

fn to_version(raw: i64) -> Result<u64, GatewayError> {
    u64::try_from(raw).map_err(|_| corrupt(format!("negative version {raw}")))
}

fn from_version(version: u64) -> Result<i64, GatewayError> {
    i64::try_from(version).map_err(|_| GatewayError::InvalidRequest(format!("version {version} out of range")))
}

/// PostgreSQL-backed [`HeatStore`] and [`MeetDirectory`] using
/// `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and runs the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] when the database is
    /// unreachable or a migration fails.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| GatewayError::PersistenceError(format!("migration failed: {e}")))?;
        tracing::info!(max_connections, "connected to postgres");
        Ok(Self::new(pool))
    }

    /// Bumps the heat's version if it still equals `expected`, returning
    /// the heat number and new version.
    async fn bump_version(
        tx: &mut Transaction<'_, Postgres>,
        event_id: EventId,
        heat_id: HeatId,
        expected: u64,
    ) -> Result<(u32, u64), GatewayError> {
        let row = sqlx::query_as::<_, (i32, i64)>(
            "UPDATE heats SET version = version + 1, updated_at = now() \
             WHERE id = $1 AND event_id = $2 AND version = $3 \
             RETURNING number, version",
        )
        .bind(heat_id.as_uuid())
        .bind(event_id.as_uuid())
        .bind(from_version(expected)?)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;

        if let Some((number, version)) = row {
            let number = u32::try_from(number).map_err(|_| corrupt("heat number"))?;
            return Ok((number, to_version(version)?));
        }

        let current = sqlx::query_as::<_, (i32, i64)>(
            "SELECT number, version FROM heats WHERE id = $1 AND event_id = $2",
        )
        .bind(heat_id.as_uuid())
        .bind(event_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;

        match current {
            Some((number, actual)) => Err(GatewayError::ConcurrentModification {
                heat: u32::try_from(number).map_err(|_| corrupt("heat number"))?,
                expected,
                actual: to_version(actual)?,
            }),
            None => Err(GatewayError::PersistenceError(format!(
                "heat {heat_id} not stored"
            ))),
        }
    }

    async fn load_lanes(&self, heat_id: Uuid) -> Result<Vec<LaneRecord>, GatewayError> {
        let rows = sqlx::query_as::<_, (Uuid, i16, Option<Uuid>, Option<String>, Option<i32>)>(
            "SELECT id, number, swimmer_id, coach, final_time_ms FROM lanes \
             WHERE heat_id = $1 ORDER BY number",
        )
        .bind(heat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|(id, number, swimmer_id, coach, final_time_ms)| {
                let final_time = final_time_ms
                    .map(|ms| u32::try_from(ms).map(RaceTime::from_millis))
                    .transpose()
                    .map_err(|_| corrupt("final time"))?;
                Ok(LaneRecord {
                    id: LaneId::from_uuid(id),
                    number: u8::try_from(number).map_err(|_| corrupt("lane number"))?,
                    swimmer_id: swimmer_id.map(SwimmerId::from_uuid),
                    coach,
                    final_time,
                })
            })
            .collect()
    }
}

#[async_trait]
impl HeatStore for PostgresStore {
    async fn load_meet(&self, event_id: EventId) -> Result<MeetRecord, GatewayError> {
        let finished = sqlx::query_scalar::<_, bool>("SELECT finished FROM meet_events WHERE id = $1")
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(GatewayError::EventNotFound(event_id))?;

        let absent = sqlx::query_scalar::<_, Uuid>(
            "SELECT swimmer_id FROM event_swimmers WHERE event_id = $1 AND absent",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(SwimmerId::from_uuid)
        .collect::<BTreeSet<_>>();

        let rows = sqlx::query_as::<_, (Uuid, i32, String, i64, i32)>(
            "SELECT id, number, status, version, epoch FROM heats \
             WHERE event_id = $1 ORDER BY number",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut heats = Vec::with_capacity(rows.len());
        for (id, number, status, version, epoch) in rows {
            heats.push(HeatRecord {
                id: HeatId::from_uuid(id),
                number: u32::try_from(number).map_err(|_| corrupt("heat number"))?,
                status: HeatStatus::from_code(&status)
                    .ok_or_else(|| corrupt(format!("heat status {status}")))?,
                version: to_version(version)?,
                epoch: u32::try_from(epoch).map_err(|_| corrupt("heat epoch"))?,
                lanes: self.load_lanes(id).await?,
            });
        }

        Ok(MeetRecord {
            heats,
            finished,
            absent,
        })
    }

    async fn create_heat(
        &self,
        event_id: EventId,
        heat: NewHeat,
    ) -> Result<HeatRecord, GatewayError> {
        let number = i32::try_from(heat.number)
            .map_err(|_| GatewayError::InvalidRequest("heat number out of range".to_string()))?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // A concurrent insert of the same number blocks here until the
        // other transaction ends, then yields no row.
        let id = HeatId::new();
        let inserted = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO heats (id, event_id, number, status, version, epoch) \
             VALUES ($1, $2, $3, $4, 1, 0) \
             ON CONFLICT (event_id, number) DO NOTHING RETURNING id",
        )
        .bind(id.as_uuid())
        .bind(event_id.as_uuid())
        .bind(number)
        .bind(HeatStatus::AssigningSwimmers.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if inserted.is_none() {
            let actual = sqlx::query_scalar::<_, i64>(
                "SELECT version FROM heats WHERE event_id = $1 AND number = $2",
            )
            .bind(event_id.as_uuid())
            .bind(number)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .map_or(Ok(0), to_version)?;
            return Err(GatewayError::ConcurrentModification {
                heat: heat.number,
                expected: 0,
                actual,
            });
        }

        for lane in &heat.lanes {
            sqlx::query(
                "INSERT INTO lanes (id, heat_id, number, swimmer_id, coach, final_time_ms) \
                 VALUES ($1, $2, $3, $4, $5, NULL)",
            )
            .bind(lane.id.as_uuid())
            .bind(id.as_uuid())
            .bind(i16::from(lane.number))
            .bind(lane.swimmer_id.map(|s| *s.as_uuid()))
            .bind(lane.coach.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        tracing::debug!(%event_id, heat = heat.number, "heat created");
        Ok(HeatRecord {
            id,
            number: heat.number,
            status: HeatStatus::AssigningSwimmers,
            version: 1,
            epoch: 0,
            lanes: heat
                .lanes
                .into_iter()
                .map(|l| LaneRecord {
                    final_time: None,
                    ..l
                })
                .collect(),
        })
    }

    async fn save_assignments(
        &self,
        event_id: EventId,
        heat_id: HeatId,
        expected_version: u64,
        assignments: &[LaneAssignment],
    ) -> Result<u64, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let (_, version) = Self::bump_version(&mut tx, event_id, heat_id, expected_version).await?;
        for assignment in assignments {
            sqlx::query("UPDATE lanes SET swimmer_id = $1 WHERE id = $2 AND heat_id = $3")
                .bind(assignment.swimmer_id.map(|s| *s.as_uuid()))
                .bind(assignment.lane_id.as_uuid())
                .bind(heat_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(version)
    }

    async fn update_status(
        &self,
        event_id: EventId,
        heat_id: HeatId,
        expected_version: u64,
        status: HeatStatus,
    ) -> Result<u64, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let (_, version) = Self::bump_version(&mut tx, event_id, heat_id, expected_version).await?;
        // Right-hand sides see the old status, so only a reset bumps.
        sqlx::query(
            "UPDATE heats SET \
               epoch = CASE WHEN $3 AND status = $4 THEN epoch + 1 ELSE epoch END, \
               status = $1 \
             WHERE id = $2",
        )
        .bind(status.as_str())
        .bind(heat_id.as_uuid())
        .bind(status == HeatStatus::AssigningSwimmers)
        .bind(HeatStatus::Running.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        sqlx::query("UPDATE lanes SET final_time_ms = NULL WHERE heat_id = $1")
            .bind(heat_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(version)
    }

    async fn record_results(
        &self,
        event_id: EventId,
        heat_id: HeatId,
        expected_version: u64,
        results: &[LaneResult],
    ) -> Result<u64, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let (_, version) = Self::bump_version(&mut tx, event_id, heat_id, expected_version).await?;
        sqlx::query("UPDATE lanes SET final_time_ms = NULL WHERE heat_id = $1")
            .bind(heat_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for result in results {
            let millis = i32::try_from(result.final_time.as_millis())
                .map_err(|_| GatewayError::InvalidRequest("final time out of range".to_string()))?;
            sqlx::query("UPDATE lanes SET final_time_ms = $1 WHERE id = $2 AND heat_id = $3")
                .bind(millis)
                .bind(result.lane_id.as_uuid())
                .bind(heat_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        sqlx::query("UPDATE heats SET status = $1 WHERE id = $2")
            .bind(HeatStatus::Completed.as_str())
            .bind(heat_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(version)
    }

    async fn finish_event(
        &self,
        event_id: EventId,
        absent: &[SwimmerId],
    ) -> Result<(), GatewayError> {
        let ids: Vec<Uuid> = absent.iter().map(|s| *s.as_uuid()).collect();
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("UPDATE meet_events SET finished = TRUE, finished_at = now() WHERE id = $1")
            .bind(event_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query(
            "UPDATE event_swimmers SET absent = TRUE WHERE event_id = $1 AND swimmer_id = ANY($2)",
        )
        .bind(event_id.as_uuid())
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl MeetDirectory for PostgresStore {
    async fn event(&self, event_id: EventId) -> Result<Event, GatewayError> {
        let row = sqlx::query_as::<_, (String, i16, String, i32, serde_json::Value, serde_json::Value)>(
            "SELECT title, lane_count, stroke, general_distance, \
                    category_distance_overrides, eligible_categories \
             FROM meet_events WHERE id = $1",
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(GatewayError::EventNotFound(event_id))?;

        let (title, lane_count, stroke, general_distance, overrides, eligible) = row;
        let category_distance_overrides: BTreeMap<String, Distance> =
            serde_json::from_value(overrides).map_err(corrupt)?;
        let eligible_categories: BTreeSet<String> =
            serde_json::from_value(eligible).map_err(corrupt)?;

        Ok(Event {
            id: event_id,
            title,
            lane_count: u8::try_from(lane_count).map_err(|_| corrupt("lane count"))?,
            stroke: Stroke::from_code(&stroke).ok_or_else(|| corrupt(format!("stroke {stroke}")))?,
            general_distance: Distance::meters(
                u32::try_from(general_distance).map_err(|_| corrupt("distance"))?,
            ),
            category_distance_overrides,
            eligible_categories,
        })
    }

    async fn swimmers(&self, event_id: EventId) -> Result<Vec<Swimmer>, GatewayError> {
        let rows = sqlx::query_as::<_, (Uuid, String, NaiveDate)>(
            "SELECT s.id, s.name, s.birth_date FROM swimmers s \
             JOIN event_swimmers es ON es.swimmer_id = s.id \
             WHERE es.event_id = $1 ORDER BY s.name",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(id, name, birth_date)| Swimmer {
                id: SwimmerId::from_uuid(id),
                name,
                birth_date,
            })
            .collect())
    }
}
