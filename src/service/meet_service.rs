//! Meet service: orchestrates heat operations, persistence and signals.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::domain::{
    Advance, BroadcastChannel, Completion, Distance, Event, EventId, Heat, HeatStateMachine,
    HeatStatus, HeatTag, LaneId, MachineHandle, MeetRegistry, MeetSignal, RaceTime, Standing,
    SubmitOutcome, Swimmer, SwimmerId, rank,
};
use crate::error::GatewayError;
use crate::persistence::{HeatStore, LaneAssignment, LaneResult, MeetDirectory, NewHeat};

/// Read-only view of one event's controller.
#[derive(Debug, Clone)]
pub struct MeetSnapshot {
    /// Event configuration.
    pub event: Event,
    /// Swimmers entered in the event.
    pub swimmers: Vec<Swimmer>,
    /// Heats ordered by number, with live times on the running heat.
    pub heats: Vec<Heat>,
    /// Active heat number.
    pub active_heat: u32,
    /// Distance assignments are validated against.
    pub distance: Distance,
    /// Attempt currently collecting times.
    pub collecting: Option<HeatTag>,
    /// Whether the event has finished.
    pub finished: bool,
    /// Swimmers marked absent at finish.
    pub absent: Vec<SwimmerId>,
    /// Entitled swimmers not yet resolved nor placed.
    pub unpaired: Vec<SwimmerId>,
}

/// Orchestration layer for all heat operations.
///
/// Owns references to the [`MeetRegistry`] for controller state, the
/// [`HeatStore`] and [`MeetDirectory`] for durable data, and a
/// [`BroadcastChannel`] for signals. Every mutation follows the pattern:
/// lock the event → check on the state machine → versioned store write →
/// apply on the state machine → publish the signal. A failed write leaves
/// the controller untouched, staged assignments included.
#[derive(Debug, Clone)]
pub struct MeetService {
    registry: Arc<MeetRegistry>,
    store: Arc<dyn HeatStore>,
    directory: Arc<dyn MeetDirectory>,
    channel: Arc<dyn BroadcastChannel>,
    resolve_on: Option<NaiveDate>,
}

impl MeetService {
    /// Creates a new `MeetService`.
    #[must_use]
    pub fn new(
        registry: Arc<MeetRegistry>,
        store: Arc<dyn HeatStore>,
        directory: Arc<dyn MeetDirectory>,
        channel: Arc<dyn BroadcastChannel>,
    ) -> Self {
        Self {
            registry,
            store,
            directory,
            channel,
            resolve_on: None,
        }
    }

    /// Resolves categories on a fixed date instead of today.
    #[must_use]
    pub const fn with_resolution_date(mut self, on: NaiveDate) -> Self {
        self.resolve_on = Some(on);
        self
    }

    /// Returns the broadcast channel signals are published on.
    #[must_use]
    pub fn channel(&self) -> &Arc<dyn BroadcastChannel> {
        &self.channel
    }

    /// Returns the registry of loaded controllers.
    #[must_use]
    pub fn registry(&self) -> &Arc<MeetRegistry> {
        &self.registry
    }

    fn publish(&self, event_id: EventId, signal: MeetSignal) {
        let signal_type = signal.signal_type();
        match self.channel.publish(event_id, signal) {
            Ok(receivers) => {
                tracing::debug!(%event_id, signal = signal_type, receivers, "signal published");
            }
            Err(e) => {
                let err = GatewayError::from(e);
                tracing::warn!(
                    %event_id,
                    signal = signal_type,
                    code = err.error_code(),
                    error = %err,
                    "signal not published"
                );
            }
        }
    }

    async fn machine(&self, event_id: EventId) -> Result<MachineHandle, GatewayError> {
        if let Some(handle) = self.registry.get(event_id).await {
            return Ok(handle);
        }
        self.load(event_id).await
    }

    /// Builds the controller of `event_id` from the directory and the
    /// store. When another task loaded the event meanwhile, its controller
    /// is kept and returned; a live controller is never replaced.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::EventNotFound`] for unknown events, or a
    /// persistence error.
    pub async fn load(&self, event_id: EventId) -> Result<MachineHandle, GatewayError> {
        let event = self.directory.event(event_id).await?;
        let swimmers = self.directory.swimmers(event_id).await?;
        let meet = self.store.load_meet(event_id).await?;
        let on = self.resolve_on.unwrap_or_else(|| Utc::now().date_naive());

        let heats = meet.heats.into_iter().map(Heat::from).collect();
        let mut machine = HeatStateMachine::new(event, swimmers, heats, on);
        if meet.finished {
            machine.restore_finished(meet.absent);
        }
        tracing::info!(
            %event_id,
            heats = machine.heats().len(),
            active = machine.active_number(),
            finished = machine.is_finished(),
            "event loaded"
        );

        Ok(self.registry.insert(event_id, machine).await)
    }

    /// Re-reads heats from the store into `machine`.
    async fn refresh(
        &self,
        event_id: EventId,
        machine: &mut HeatStateMachine,
    ) -> Result<(), GatewayError> {
        let meet = self.store.load_meet(event_id).await?;
        machine.refresh(meet.heats.into_iter().map(Heat::from).collect());
        Ok(())
    }

    /// After a version conflict the stored versions are pulled in so the
    /// caller can retry; the conflict itself is returned.
    async fn after_conflict(
        &self,
        event_id: EventId,
        machine: &mut HeatStateMachine,
        err: GatewayError,
    ) -> GatewayError {
        if let GatewayError::ConcurrentModification {
            heat,
            expected,
            actual,
        } = &err
        {
            tracing::warn!(%event_id, heat, expected, actual, "concurrent modification");
            if let Err(e) = self.refresh(event_id, machine).await {
                tracing::warn!(%event_id, error = %e, "refresh after conflict failed");
            }
        }
        err
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Returns a snapshot of the event's controller.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::EventNotFound`] for unknown events.
    pub async fn snapshot(&self, event_id: EventId) -> Result<MeetSnapshot, GatewayError> {
        let handle = self.machine(event_id).await?;
        let machine = handle.lock().await;
        Ok(MeetSnapshot {
            event: machine.event().clone(),
            swimmers: machine.swimmers().to_vec(),
            heats: machine
                .heats()
                .iter()
                .filter_map(|h| machine.heat_view(h.number()))
                .collect(),
            active_heat: machine.active_number(),
            distance: machine.distance(),
            collecting: machine.collecting(),
            finished: machine.is_finished(),
            absent: machine.absent().iter().copied().collect(),
            unpaired: machine.unpaired_swimmers().iter().map(|s| s.id).collect(),
        })
    }

    /// Swimmers entered in the event, and the date their categories are
    /// resolved on.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::EventNotFound`] for unknown events.
    pub async fn swimmers(
        &self,
        event_id: EventId,
    ) -> Result<(Event, Vec<Swimmer>, NaiveDate), GatewayError> {
        let handle = self.machine(event_id).await?;
        let machine = handle.lock().await;
        Ok((
            machine.event().clone(),
            machine.swimmers().to_vec(),
            machine.resolved_on(),
        ))
    }

    /// Returns one heat for review. Reviewing never reopens timing.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HeatNotFound`] for unknown heat numbers.
    pub async fn heat(&self, event_id: EventId, number: u32) -> Result<Heat, GatewayError> {
        let handle = self.machine(event_id).await?;
        let machine = handle.lock().await;
        machine
            .heat_view(number)
            .ok_or(GatewayError::HeatNotFound(number))
    }

    /// Standings of a heat: final once completed, live while running.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HeatNotFound`] for unknown heat numbers.
    pub async fn ranking(
        &self,
        event_id: EventId,
        number: u32,
    ) -> Result<Vec<Standing>, GatewayError> {
        let heat = self.heat(event_id, number).await?;
        Ok(heat.standings.clone().unwrap_or_else(|| rank(&heat)))
    }

    /// Unpaired swimmers eligible for `distance`, or for the selected
    /// distance when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::EventNotFound`] for unknown events.
    pub async fn eligible_pool(
        &self,
        event_id: EventId,
        distance: Option<Distance>,
    ) -> Result<Vec<Swimmer>, GatewayError> {
        let handle = self.machine(event_id).await?;
        let machine = handle.lock().await;
        let distance = distance.unwrap_or_else(|| machine.distance());
        Ok(machine.eligible_pool(distance).into_iter().cloned().collect())
    }

    // ── Assignment ──────────────────────────────────────────────────────

    /// Selects the distance later assignments are validated against.
    ///
    /// # Errors
    ///
    /// See [`HeatStateMachine::select_distance`].
    pub async fn select_distance(
        &self,
        event_id: EventId,
        distance: Distance,
    ) -> Result<(), GatewayError> {
        let handle = self.machine(event_id).await?;
        handle.lock().await.select_distance(distance)?;
        tracing::info!(%event_id, %distance, "distance selected");
        Ok(())
    }

    /// Stages a lane change on the active heat: `Some` assigns a swimmer,
    /// `None` empties the lane. Returns the active heat.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Rejected`] when the assignment is not allowed.
    pub async fn stage(
        &self,
        event_id: EventId,
        lane_id: LaneId,
        swimmer_id: Option<SwimmerId>,
    ) -> Result<Heat, GatewayError> {
        let handle = self.machine(event_id).await?;
        let mut machine = handle.lock().await;
        match swimmer_id {
            Some(swimmer_id) => {
                if let Err(e) = machine.assign_swimmer(lane_id, swimmer_id) {
                    tracing::info!(%event_id, %lane_id, %swimmer_id, error = %e, "assignment refused");
                    return Err(e);
                }
            }
            None => machine.unassign(lane_id)?,
        }
        machine.active_heat().cloned()
    }

    /// Persists the active heat's staged changes, creating the heat in the
    /// store first if it is provisional. Emits `swimmers-assigned`.
    ///
    /// # Errors
    ///
    /// On a persistence error or version conflict the staged changes stay
    /// in memory for a retry.
    pub async fn save_assignments(&self, event_id: EventId) -> Result<Heat, GatewayError> {
        let handle = self.machine(event_id).await?;
        let mut machine = handle.lock().await;
        let pending = machine.pending_save()?;
        let number = pending.key.number();

        if pending.changes.is_empty() {
            return machine.active_heat().cloned();
        }

        let (heat_id, version) = match (pending.key.id(), pending.version) {
            (Some(id), Some(version)) => (id, version),
            _ => {
                let created = match self
                    .store
                    .create_heat(event_id, NewHeat::empty(number, &pending.layout))
                    .await
                {
                    Ok(created) => created,
                    Err(e) => return Err(self.after_conflict(event_id, &mut machine, e).await),
                };
                machine.mark_persisted(number, created.id, created.version)?;
                tracing::info!(%event_id, heat = number, heat_id = %created.id, "heat persisted");
                (created.id, created.version)
            }
        };

        let assignments: Vec<LaneAssignment> = pending
            .changes
            .iter()
            .map(|(lane_id, swimmer_id)| LaneAssignment {
                lane_id: *lane_id,
                swimmer_id: *swimmer_id,
            })
            .collect();
        let new_version = match self
            .store
            .save_assignments(event_id, heat_id, version, &assignments)
            .await
        {
            Ok(v) => v,
            Err(e) => return Err(self.after_conflict(event_id, &mut machine, e).await),
        };

        let signal = machine.apply_saved(number, new_version, &pending.changes)?;
        tracing::info!(
            %event_id,
            heat = number,
            lanes = pending.changes.len(),
            version = new_version,
            "assignments saved"
        );
        let heat = machine.active_heat().cloned()?;
        drop(machine);
        self.publish(event_id, signal);
        Ok(heat)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Starts the active heat after refreshing from the store and
    /// re-validating its saved assignments. Emits `heat-start`.
    ///
    /// # Errors
    ///
    /// `StateConflict` or `Rejected` when the heat may not start.
    pub async fn start(&self, event_id: EventId) -> Result<HeatTag, GatewayError> {
        let handle = self.machine(event_id).await?;
        let mut machine = handle.lock().await;
        self.refresh(event_id, &mut machine).await?;
        let (heat_id, version) = machine.check_start()?;

        let new_version = match self
            .store
            .update_status(event_id, heat_id, version, HeatStatus::Running)
            .await
        {
            Ok(v) => v,
            Err(e) => return Err(self.after_conflict(event_id, &mut machine, e).await),
        };
        let signal = machine.start(new_version)?;
        let tag = signal
            .tag()
            .ok_or_else(|| GatewayError::Internal("heat-start without tag".to_string()))?;
        drop(machine);

        tracing::info!(%event_id, heat = tag.heat_number, epoch = tag.epoch, "heat started");
        self.publish(event_id, signal);
        Ok(tag)
    }

    /// Folds a station submission into the running heat and relays it to
    /// observers when it changed anything.
    ///
    /// Stale submissions are logged and reported as
    /// [`SubmitOutcome::Stale`], never as an error.
    ///
    /// # Errors
    ///
    /// For current submissions, fails if the lane is unknown or empty.
    pub async fn submit_time(
        &self,
        event_id: EventId,
        tag: HeatTag,
        lane_id: LaneId,
        time: RaceTime,
    ) -> Result<SubmitOutcome, GatewayError> {
        let handle = self.machine(event_id).await?;
        let mut machine = handle.lock().await;
        let outcome = machine.submit_time(tag, lane_id, time)?;
        let lane_number = machine
            .active_heat()
            .ok()
            .and_then(|h| h.lane(lane_id))
            .map_or(0, |l| l.number);
        drop(machine);

        match outcome {
            SubmitOutcome::Stale { active } => {
                tracing::info!(
                    %event_id,
                    heat = tag.heat_number,
                    epoch = tag.epoch,
                    %lane_id,
                    active = ?active,
                    "stale submission dropped"
                );
            }
            SubmitOutcome::Unchanged => {
                tracing::debug!(%event_id, %lane_id, "duplicate submission");
            }
            SubmitOutcome::Recorded | SubmitOutcome::Replaced { .. } => {
                tracing::info!(
                    %event_id,
                    heat = tag.heat_number,
                    epoch = tag.epoch,
                    %lane_id,
                    time = %time,
                    "time recorded"
                );
                self.publish(
                    event_id,
                    MeetSignal::LaneTimeSubmitted {
                        heat_number: tag.heat_number,
                        epoch: tag.epoch,
                        lane_id,
                        lane_number,
                        final_time: time,
                        timestamp: Utc::now(),
                    },
                );
            }
        }
        Ok(outcome)
    }

    /// Accepts a signal received from a station. Only
    /// `lane-time-submitted` is acted on.
    ///
    /// # Errors
    ///
    /// As [`Self::submit_time`]; other signal types are
    /// [`GatewayError::InvalidRequest`].
    pub async fn ingest(
        &self,
        event_id: EventId,
        signal: MeetSignal,
    ) -> Result<SubmitOutcome, GatewayError> {
        match signal {
            MeetSignal::LaneTimeSubmitted {
                heat_number,
                epoch,
                lane_id,
                final_time,
                ..
            } => {
                self.submit_time(event_id, HeatTag::new(heat_number, epoch), lane_id, final_time)
                    .await
            }
            other => Err(GatewayError::InvalidRequest(format!(
                "stations may not send {}",
                other.signal_type()
            ))),
        }
    }

    /// Completes the running heat: writes every lane time and the
    /// completed status in one versioned write, then ranks the heat.
    ///
    /// # Errors
    ///
    /// `StateConflict::TimesPending` lists lanes still without a time.
    pub async fn complete(&self, event_id: EventId) -> Result<Completion, GatewayError> {
        let handle = self.machine(event_id).await?;
        let mut machine = handle.lock().await;
        let (heat_id, version, times) = machine.check_complete()?;
        let results: Vec<LaneResult> = times
            .into_iter()
            .map(|(lane_id, final_time)| LaneResult {
                lane_id,
                final_time,
            })
            .collect();

        let new_version = match self
            .store
            .record_results(event_id, heat_id, version, &results)
            .await
        {
            Ok(v) => v,
            Err(e) => return Err(self.after_conflict(event_id, &mut machine, e).await),
        };
        let completion = machine.complete(new_version)?;
        tracing::info!(
            %event_id,
            heat = completion.heat_number,
            next = ?completion.next,
            "heat completed"
        );
        Ok(completion)
    }

    /// Resets the running heat: times are discarded and the epoch bumped.
    /// Emits `heat-reset` with the new epoch.
    ///
    /// # Errors
    ///
    /// `StateConflict::WrongStatus` unless the heat is running.
    pub async fn reset(&self, event_id: EventId) -> Result<HeatTag, GatewayError> {
        let handle = self.machine(event_id).await?;
        let mut machine = handle.lock().await;
        let (heat_id, version) = machine.check_reset()?;
        let new_version = match self
            .store
            .update_status(event_id, heat_id, version, HeatStatus::AssigningSwimmers)
            .await
        {
            Ok(v) => v,
            Err(e) => return Err(self.after_conflict(event_id, &mut machine, e).await),
        };
        let signal = machine.reset(new_version)?;
        let tag = signal
            .tag()
            .ok_or_else(|| GatewayError::Internal("heat-reset without tag".to_string()))?;
        drop(machine);

        tracing::info!(%event_id, heat = tag.heat_number, epoch = tag.epoch, "heat reset");
        self.publish(event_id, signal);
        Ok(tag)
    }

    /// Moves on from the completed active heat. Emits `heat-changed` when
    /// the controller moved.
    ///
    /// # Errors
    ///
    /// `StateConflict::WrongStatus` unless the active heat is completed.
    pub async fn advance(&self, event_id: EventId) -> Result<Advance, GatewayError> {
        let handle = self.machine(event_id).await?;
        let advance = handle.lock().await.advance()?;
        if let Advance::Moved {
            heat_number,
            spawned,
            signal,
        } = &advance
        {
            tracing::info!(%event_id, heat = heat_number, spawned, "moved to heat");
            self.publish(event_id, signal.clone());
        } else {
            tracing::info!(%event_id, "no heat left; event ready to finish");
        }
        Ok(advance)
    }

    /// Finishes the event. Without `absent`, every unpaired swimmer is
    /// marked absent. Emits `event-finished` and returns the absent ids.
    ///
    /// # Errors
    ///
    /// `StateConflict::HeatRunning` while a heat runs.
    pub async fn finish(
        &self,
        event_id: EventId,
        absent: Option<Vec<SwimmerId>>,
    ) -> Result<Vec<SwimmerId>, GatewayError> {
        let handle = self.machine(event_id).await?;
        let mut machine = handle.lock().await;
        let absent = machine.check_finish(absent.as_deref())?;
        self.store.finish_event(event_id, &absent).await?;
        let signal = machine.finish(absent.clone())?;
        drop(machine);

        tracing::info!(%event_id, absent = absent.len(), "event finished");
        self.publish(event_id, signal);
        Ok(absent)
    }
}
