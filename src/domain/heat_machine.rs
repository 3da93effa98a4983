//! Per-event heat state machine.
//!
//! [`HeatStateMachine`] is the single authority over heat lifecycle and
//! lane assignment for one event:
//!
//! ```text
//! AssigningSwimmers ──start──▶ Running ──complete──▶ Completed
//!         ▲                       │
//!         └────────reset──────────┘   (epoch += 1, times discarded)
//! ```
//!
//! It never talks to the store or the broadcast channel itself. Methods
//! that need a durable write come in pairs: a `check_*` method validates
//! and returns what must be written, and the mutating method applies the
//! transition once the write succeeded. Transitions return the signal to
//! publish.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, Utc};

use super::category::{self, Category};
use super::heat::{Heat, HeatKey, HeatStatus, Lane, StagedChange};
use super::ranking::{self, Standing};
use super::signal::AssignedLane;
use super::time_collector::{HeatTag, SubmitOutcome, TimeCollector};
use super::validator::{LaneAssignmentValidator, Rejection};
use super::{Distance, Event, HeatId, LaneId, MeetSignal, RaceTime, Swimmer, SwimmerId};
use crate::error::{GatewayError, StateConflict};

/// What should happen after the active heat completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceDecision {
    /// A later heat already exists.
    NextHeat(u32),
    /// Swimmers remain unpaired; a provisional heat with this number will
    /// be created.
    SpawnHeat(u32),
    /// Nobody is left to swim; the event can be finished.
    ReadyToFinish,
}

/// Result of [`HeatStateMachine::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The controller moved to another heat.
    Moved {
        /// New active heat.
        heat_number: u32,
        /// Whether the heat was created by this call.
        spawned: bool,
        /// `heat-changed` signal to publish.
        signal: MeetSignal,
    },
    /// No further heat; the event is eligible for finishing.
    ReadyToFinish,
}

/// Result of [`HeatStateMachine::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Completed heat.
    pub heat_number: u32,
    /// Final standings.
    pub standings: Vec<Standing>,
    /// What advancing would do.
    pub next: AdvanceDecision,
}

/// Work needed to persist the active heat's staged lane changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    /// Identity of the heat; provisional heats must be created first.
    pub key: HeatKey,
    /// Stored version, when persisted.
    pub version: Option<u64>,
    /// Full lane layout (for heat creation).
    pub layout: Vec<Lane>,
    /// Lanes with staged changes, and the swimmer each will hold.
    pub changes: Vec<(LaneId, Option<SwimmerId>)>,
}

/// Controller state for one event.
#[derive(Debug)]
pub struct HeatStateMachine {
    event: Event,
    swimmers: Vec<Swimmer>,
    on: NaiveDate,
    heats: Vec<Heat>,
    active: u32,
    distance: Distance,
    collector: TimeCollector,
    absent: BTreeSet<SwimmerId>,
    finished: bool,
}

impl HeatStateMachine {
    /// Builds the machine from the event, its swimmer directory and the
    /// heats found in the store. Categories are resolved as of `on`.
    ///
    /// Without stored heats a provisional heat 1 with one empty lane per
    /// pool lane is created. The active heat is the first one that is not
    /// completed.
    #[must_use]
    pub fn new(event: Event, swimmers: Vec<Swimmer>, mut heats: Vec<Heat>, on: NaiveDate) -> Self {
        heats.sort_by_key(Heat::number);
        if heats.is_empty() {
            heats.push(Heat::provisional(1, 1..=event.lane_count));
        }
        let distance = event.general_distance;
        let mut machine = Self {
            event,
            swimmers,
            on,
            heats,
            active: 1,
            distance,
            collector: TimeCollector::new(),
            absent: BTreeSet::new(),
            finished: false,
        };
        machine.settle_after_load();
        machine
    }

    /// Marks the event finished, as recorded in the store.
    pub fn restore_finished(&mut self, absent: impl IntoIterator<Item = SwimmerId>) {
        self.absent.extend(absent);
        self.finished = true;
    }

    fn settle_after_load(&mut self) {
        for heat in &mut self.heats {
            if heat.status == HeatStatus::Completed && heat.standings.is_none() {
                heat.standings = Some(ranking::rank(heat));
            }
        }
        self.active = self
            .heats
            .iter()
            .find(|h| h.status != HeatStatus::Completed)
            .or_else(|| self.heats.last())
            .map_or(1, Heat::number);
        // A heat left running by an earlier controller keeps collecting.
        if let Some(heat) = self.heat(self.active)
            && heat.status == HeatStatus::Running
        {
            let tag = HeatTag::new(heat.number(), heat.epoch);
            if self.collector.active() != Some(tag) {
                self.collector.open(tag);
            }
        }
    }

    // ── Read access ─────────────────────────────────────────────────────

    /// Event configuration.
    #[must_use]
    pub const fn event(&self) -> &Event {
        &self.event
    }

    /// Swimmer directory of the event.
    #[must_use]
    pub fn swimmers(&self) -> &[Swimmer] {
        &self.swimmers
    }

    /// Date categories are resolved on.
    #[must_use]
    pub const fn resolved_on(&self) -> NaiveDate {
        self.on
    }

    /// All heats, ordered by number.
    #[must_use]
    pub fn heats(&self) -> &[Heat] {
        &self.heats
    }

    /// Heat by number, for review. Reading a completed heat never reopens
    /// it.
    #[must_use]
    pub fn heat(&self, number: u32) -> Option<&Heat> {
        self.heats.iter().find(|h| h.number() == number)
    }

    /// Heat by number with the running attempt's collected times filled
    /// into its lanes.
    #[must_use]
    pub fn heat_view(&self, number: u32) -> Option<Heat> {
        let mut heat = self.heat(number)?.clone();
        if self
            .collector
            .active()
            .is_some_and(|tag| tag.heat_number == number)
        {
            for lane in &mut heat.lanes {
                lane.final_time = self.collector.time(lane.id);
            }
        }
        Some(heat)
    }

    /// Sequence number of the active heat.
    #[must_use]
    pub const fn active_number(&self) -> u32 {
        self.active
    }

    /// The active heat.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HeatNotFound`] if the active pointer is
    /// dangling, which indicates a bug.
    pub fn active_heat(&self) -> Result<&Heat, GatewayError> {
        self.heat(self.active)
            .ok_or(GatewayError::HeatNotFound(self.active))
    }

    fn active_heat_mut(&mut self) -> Result<&mut Heat, GatewayError> {
        let active = self.active;
        self.heats
            .iter_mut()
            .find(|h| h.number() == active)
            .ok_or(GatewayError::HeatNotFound(active))
    }

    /// Distance assignments are validated against.
    #[must_use]
    pub const fn distance(&self) -> Distance {
        self.distance
    }

    /// Tag of the attempt currently collecting times.
    #[must_use]
    pub const fn collecting(&self) -> Option<HeatTag> {
        self.collector.active()
    }

    /// Times collected so far for the running heat.
    #[must_use]
    pub fn collected_time(&self, lane_id: LaneId) -> Option<RaceTime> {
        self.collector.time(lane_id)
    }

    /// Whether the event has finished.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Swimmers marked absent when the event finished.
    #[must_use]
    pub const fn absent(&self) -> &BTreeSet<SwimmerId> {
        &self.absent
    }

    /// Looks up a swimmer of the event.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SwimmerNotFound`] for unknown ids.
    pub fn swimmer(&self, id: SwimmerId) -> Result<&Swimmer, GatewayError> {
        self.swimmers
            .iter()
            .find(|s| s.id == id)
            .ok_or(GatewayError::SwimmerNotFound(*id.as_uuid()))
    }

    fn ensure_open(&self) -> Result<(), GatewayError> {
        if self.finished {
            return Err(StateConflict::EventFinished.into());
        }
        Ok(())
    }

    fn ensure_status(heat: &Heat, expected: HeatStatus) -> Result<(), GatewayError> {
        if heat.status != expected {
            return Err(StateConflict::WrongStatus {
                heat: heat.number(),
                expected,
                actual: heat.status,
            }
            .into());
        }
        Ok(())
    }

    fn validator(&self) -> LaneAssignmentValidator<'_> {
        LaneAssignmentValidator::new(
            &self.event,
            &self.heats,
            self.distance,
            &self.swimmers,
            self.on,
        )
    }

    // ── Eligibility ─────────────────────────────────────────────────────

    /// Whether `swimmer` is done with this event: timed in a completed
    /// heat, or marked absent.
    #[must_use]
    pub fn is_resolved(&self, swimmer: SwimmerId) -> bool {
        self.absent.contains(&swimmer)
            || self
                .heats
                .iter()
                .filter(|h| h.status == HeatStatus::Completed)
                .any(|h| h.timed(swimmer))
    }

    fn is_placed(&self, swimmer: SwimmerId) -> bool {
        self.heats
            .iter()
            .filter(|h| h.status != HeatStatus::Completed)
            .any(|h| h.holds(swimmer))
    }

    fn event_categories(&self) -> BTreeSet<Category> {
        self.event
            .distances()
            .into_iter()
            .flat_map(|d| category::eligible_categories_for(&self.event, d, &self.swimmers, self.on))
            .collect()
    }

    /// Swimmers entitled to swim who are neither resolved nor placed in a
    /// pending heat, across every distance of the event.
    #[must_use]
    pub fn unpaired_swimmers(&self) -> Vec<&Swimmer> {
        let categories = self.event_categories();
        self.swimmers
            .iter()
            .filter(|s| categories.contains(&category::category_of(s, self.on)))
            .filter(|s| !self.is_resolved(s.id) && !self.is_placed(s.id))
            .collect()
    }

    /// Unpaired swimmers whose category swims `distance`.
    #[must_use]
    pub fn eligible_pool(&self, distance: Distance) -> Vec<&Swimmer> {
        let categories =
            category::eligible_categories_for(&self.event, distance, &self.swimmers, self.on);
        self.unpaired_swimmers()
            .into_iter()
            .filter(|s| categories.contains(&category::category_of(s, self.on)))
            .collect()
    }

    // ── Assignment ──────────────────────────────────────────────────────

    /// Chooses the distance later assignments are validated against.
    ///
    /// # Errors
    ///
    /// Fails when the event finished, the active heat is not assigning
    /// swimmers, or nobody swims `distance` in this event.
    pub fn select_distance(&mut self, distance: Distance) -> Result<(), GatewayError> {
        self.ensure_open()?;
        Self::ensure_status(self.active_heat()?, HeatStatus::AssigningSwimmers)?;
        if !self.event.distances().contains(&distance) {
            return Err(GatewayError::InvalidRequest(format!(
                "{distance} is not swum in this event"
            )));
        }
        self.distance = distance;
        Ok(())
    }

    /// Validates and stages placing `swimmer_id` in `lane_id` of the active
    /// heat. The change must be saved before the heat can start.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Rejected`] when the validator refuses; not-found and
    /// state errors otherwise.
    pub fn assign_swimmer(
        &mut self,
        lane_id: LaneId,
        swimmer_id: SwimmerId,
    ) -> Result<(), GatewayError> {
        self.ensure_open()?;
        let heat = self.active_heat()?;
        Self::ensure_status(heat, HeatStatus::AssigningSwimmers)?;
        if heat.lane(lane_id).is_none() {
            return Err(GatewayError::LaneNotFound(lane_id));
        }
        let swimmer = self.swimmer(swimmer_id)?;
        self.validator()
            .validate(heat, lane_id, swimmer)
            .into_result()?;

        let lane = self
            .active_heat_mut()?
            .lane_mut(lane_id)
            .ok_or(GatewayError::LaneNotFound(lane_id))?;
        lane.staged = if lane.swimmer == Some(swimmer_id) {
            None
        } else {
            Some(StagedChange::Assign(swimmer_id))
        };
        Ok(())
    }

    /// Stages emptying `lane_id` of the active heat.
    ///
    /// # Errors
    ///
    /// Fails when the lane is unknown or the heat is not assigning.
    pub fn unassign(&mut self, lane_id: LaneId) -> Result<(), GatewayError> {
        self.ensure_open()?;
        let heat = self.active_heat_mut()?;
        Self::ensure_status(heat, HeatStatus::AssigningSwimmers)?;
        let lane = heat
            .lane_mut(lane_id)
            .ok_or(GatewayError::LaneNotFound(lane_id))?;
        lane.staged = lane.swimmer.map(|_| StagedChange::Clear);
        Ok(())
    }

    /// Describes the writes needed to persist the active heat's staged
    /// changes.
    ///
    /// # Errors
    ///
    /// Fails when the event finished or the heat is not assigning.
    pub fn pending_save(&self) -> Result<PendingSave, GatewayError> {
        self.ensure_open()?;
        let heat = self.active_heat()?;
        Self::ensure_status(heat, HeatStatus::AssigningSwimmers)?;
        Ok(PendingSave {
            key: heat.key,
            version: heat.version,
            layout: heat.lanes.clone(),
            changes: heat.staged_lanes().map(|l| (l.id, l.occupant())).collect(),
        })
    }

    /// Records that heat `number` now exists in the store.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HeatNotFound`] for unknown heats.
    pub fn mark_persisted(
        &mut self,
        number: u32,
        id: HeatId,
        version: u64,
    ) -> Result<(), GatewayError> {
        let heat = self
            .heats
            .iter_mut()
            .find(|h| h.number() == number)
            .ok_or(GatewayError::HeatNotFound(number))?;
        heat.key = HeatKey::Persisted { id, number };
        heat.version = Some(version);
        Ok(())
    }

    /// Applies a successful assignment write: the saved lanes take their
    /// new swimmers and lose their staged marks. Returns the
    /// `swimmers-assigned` signal.
    ///
    /// # Errors
    ///
    /// Fails if the heat is unknown or not persisted.
    pub fn apply_saved(
        &mut self,
        number: u32,
        version: u64,
        saved: &[(LaneId, Option<SwimmerId>)],
    ) -> Result<MeetSignal, GatewayError> {
        let heat = self
            .heats
            .iter_mut()
            .find(|h| h.number() == number)
            .ok_or(GatewayError::HeatNotFound(number))?;
        let heat_id = heat
            .key
            .id()
            .ok_or_else(|| GatewayError::Internal(format!("heat {number} is not persisted")))?;
        for (lane_id, swimmer) in saved {
            if let Some(lane) = heat.lane_mut(*lane_id) {
                lane.swimmer = *swimmer;
                lane.staged = None;
            }
        }
        heat.version = Some(version);
        let epoch = heat.epoch;
        let lanes: Vec<(LaneId, u8, SwimmerId)> = heat
            .assigned_lanes()
            .filter_map(|l| l.swimmer.map(|s| (l.id, l.number, s)))
            .collect();

        let assignments = lanes
            .into_iter()
            .map(|(lane_id, lane_number, swimmer_id)| AssignedLane {
                lane_id,
                lane_number,
                swimmer_id,
                swimmer_name: self
                    .swimmer(swimmer_id)
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(MeetSignal::SwimmersAssigned {
            heat_number: number,
            heat_id,
            epoch,
            assignments,
            timestamp: Utc::now(),
        })
    }

    /// Merges heats freshly loaded from the store, so that checks see
    /// assignments made by other controller sessions. Staged changes and
    /// collected times are kept; the epoch never moves backwards.
    pub fn refresh(&mut self, stored: Vec<Heat>) {
        for fresh in stored {
            let number = fresh.number();
            match self.heats.iter_mut().find(|h| h.number() == number) {
                Some(local) => {
                    let newer = match (local.version, fresh.version) {
                        (Some(mine), Some(theirs)) => theirs > mine,
                        (None, Some(_)) => true,
                        _ => false,
                    };
                    if !newer {
                        continue;
                    }
                    let staged: BTreeMap<u8, StagedChange> = local
                        .lanes
                        .iter()
                        .filter_map(|l| l.staged.map(|s| (l.number, s)))
                        .collect();
                    local.key = fresh.key;
                    local.version = fresh.version;
                    local.status = fresh.status;
                    local.epoch = local.epoch.max(fresh.epoch);
                    local.lanes = fresh.lanes;
                    for lane in &mut local.lanes {
                        lane.staged = staged.get(&lane.number).copied();
                    }
                    if local.status == HeatStatus::Completed {
                        local.standings = Some(ranking::rank(local));
                    }
                }
                None => self.heats.push(fresh),
            }
        }
        self.heats.sort_by_key(Heat::number);
        if self
            .heat(self.active)
            .is_some_and(|h| h.status == HeatStatus::Completed)
            && self.collector.active().is_none()
        {
            tracing::warn!(
                heat = self.active,
                "active heat was completed by another session"
            );
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Checks that the active heat may start and returns its store id and
    /// version.
    ///
    /// Saved assignments are re-validated so that conflicting assignments
    /// made in another session (seen through [`Self::refresh`]) are caught.
    ///
    /// # Errors
    ///
    /// `StateConflict` (`WrongStatus`, `PreviousHeatIncomplete`,
    /// `NoSwimmersAssigned`, `UnsavedAssignments`) or `Rejected`.
    pub fn check_start(&self) -> Result<(HeatId, u64), GatewayError> {
        self.ensure_open()?;
        let heat = self.active_heat()?;
        Self::ensure_status(heat, HeatStatus::AssigningSwimmers)?;

        let number = heat.number();
        if let Some(previous) = number.checked_sub(1).and_then(|n| self.heat(n))
            && previous.status != HeatStatus::Completed
        {
            return Err(StateConflict::PreviousHeatIncomplete {
                heat: number,
                previous: previous.number(),
            }
            .into());
        }

        if heat.assigned_lanes().next().is_none() {
            return Err(StateConflict::NoSwimmersAssigned { heat: number }.into());
        }
        let unsaved: Vec<LaneId> = heat.staged_lanes().map(|l| l.id).collect();
        if !unsaved.is_empty() {
            return Err(StateConflict::UnsavedAssignments {
                heat: number,
                lanes: unsaved,
            }
            .into());
        }

        // Distance was checked when the lane was staged and the selection
        // may have moved on since; only cross-heat conflicts are re-checked.
        let validator = self.validator();
        for lane in heat.assigned_lanes() {
            let Some(swimmer_id) = lane.swimmer else {
                continue;
            };
            let swimmer = self.swimmer(swimmer_id)?;
            match validator.validate(heat, lane.id, swimmer).into_result() {
                Ok(()) | Err(Rejection::NotEligibleForDistance { .. }) => {}
                Err(rejection) => return Err(rejection.into()),
            }
        }

        let (Some(id), Some(version)) = (heat.key.id(), heat.version) else {
            return Err(GatewayError::Internal(format!(
                "heat {number} has saved swimmers but no store identity"
            )));
        };
        Ok((id, version))
    }

    /// Starts the active heat: clears any old times and opens collection
    /// for its current epoch. Returns the `heat-start` signal.
    ///
    /// # Errors
    ///
    /// Same as [`Self::check_start`].
    pub fn start(&mut self, version: u64) -> Result<MeetSignal, GatewayError> {
        self.check_start()?;
        let heat = self.active_heat_mut()?;
        heat.status = HeatStatus::Running;
        heat.version = Some(version);
        heat.standings = None;
        for lane in &mut heat.lanes {
            lane.final_time = None;
        }
        let tag = HeatTag::new(heat.number(), heat.epoch);
        self.collector.open(tag);
        Ok(MeetSignal::HeatStart {
            heat_number: tag.heat_number,
            epoch: tag.epoch,
            timestamp: Utc::now(),
        })
    }

    /// Folds a station submission into the running heat.
    ///
    /// Submissions whose tag does not match the running attempt come back
    /// as [`SubmitOutcome::Stale`] and change nothing.
    ///
    /// # Errors
    ///
    /// For a current submission, fails if the lane is not in the heat or
    /// holds no swimmer.
    pub fn submit_time(
        &mut self,
        tag: HeatTag,
        lane_id: LaneId,
        time: RaceTime,
    ) -> Result<SubmitOutcome, GatewayError> {
        if self.collector.active() != Some(tag) {
            return Ok(SubmitOutcome::Stale {
                active: self.collector.active(),
            });
        }
        let heat = self.active_heat()?;
        let lane = heat
            .lane(lane_id)
            .ok_or(GatewayError::LaneNotFound(lane_id))?;
        if lane.swimmer.is_none() {
            return Err(GatewayError::InvalidRequest(format!(
                "lane {} of heat {} has no swimmer",
                lane.number,
                heat.number()
            )));
        }
        Ok(self.collector.submit(tag, lane_id, time))
    }

    /// Lanes of the running heat still waiting for a time.
    ///
    /// # Errors
    ///
    /// Fails if the active heat is not running.
    pub fn missing_times(&self) -> Result<Vec<LaneId>, GatewayError> {
        let heat = self.active_heat()?;
        Self::ensure_status(heat, HeatStatus::Running)?;
        Ok(self.collector.missing(heat))
    }

    /// Checks that the running heat may complete and returns the store id,
    /// version and lane times to write.
    ///
    /// # Errors
    ///
    /// `StateConflict::TimesPending` with the missing lanes, or
    /// `WrongStatus` when the heat is not running.
    pub fn check_complete(&self) -> Result<(HeatId, u64, Vec<(LaneId, RaceTime)>), GatewayError> {
        self.ensure_open()?;
        let heat = self.active_heat()?;
        Self::ensure_status(heat, HeatStatus::Running)?;
        if !self.collector.is_complete(heat) {
            return Err(StateConflict::TimesPending {
                heat: heat.number(),
                lanes: self.collector.missing(heat),
            }
            .into());
        }
        let results = heat
            .assigned_lanes()
            .filter_map(|l| self.collector.time(l.id).map(|t| (l.id, t)))
            .collect();
        let (Some(id), Some(version)) = (heat.key.id(), heat.version) else {
            return Err(GatewayError::Internal(format!(
                "running heat {} has no store identity",
                heat.number()
            )));
        };
        Ok((id, version, results))
    }

    /// Completes the running heat, records its times and standings, and
    /// evaluates what advancing would do.
    ///
    /// # Errors
    ///
    /// Same as [`Self::check_complete`].
    pub fn complete(&mut self, version: u64) -> Result<Completion, GatewayError> {
        self.check_complete()?;
        let times = self.collector.close();
        let heat = self.active_heat_mut()?;
        for lane in &mut heat.lanes {
            lane.final_time = times.get(&lane.id).copied();
        }
        heat.status = HeatStatus::Completed;
        heat.version = Some(version);
        let standings = ranking::rank(heat);
        heat.standings = Some(standings.clone());
        let heat_number = heat.number();
        Ok(Completion {
            heat_number,
            standings,
            next: self.advance_decision(),
        })
    }

    /// Checks that the running heat may be reset and returns its store id
    /// and version.
    ///
    /// # Errors
    ///
    /// `WrongStatus` unless the active heat is running.
    pub fn check_reset(&self) -> Result<(HeatId, u64), GatewayError> {
        self.ensure_open()?;
        let heat = self.active_heat()?;
        Self::ensure_status(heat, HeatStatus::Running)?;
        match (heat.key.id(), heat.version) {
            (Some(id), Some(version)) => Ok((id, version)),
            _ => Err(GatewayError::Internal(format!(
                "running heat {} has no store identity",
                heat.number()
            ))),
        }
    }

    /// Returns the running heat to assignment, keeping lane assignments,
    /// discarding collected times and bumping the epoch. Returns the
    /// `heat-reset` signal carrying the new epoch.
    ///
    /// # Errors
    ///
    /// Same as [`Self::check_reset`].
    pub fn reset(&mut self, version: u64) -> Result<MeetSignal, GatewayError> {
        self.check_reset()?;
        self.collector.close();
        let heat = self.active_heat_mut()?;
        for lane in &mut heat.lanes {
            lane.final_time = None;
        }
        heat.epoch = heat.epoch.saturating_add(1);
        heat.status = HeatStatus::AssigningSwimmers;
        heat.version = Some(version);
        Ok(MeetSignal::HeatReset {
            heat_number: heat.number(),
            epoch: heat.epoch,
            timestamp: Utc::now(),
        })
    }

    /// What [`Self::advance`] would do from the current state.
    #[must_use]
    pub fn advance_decision(&self) -> AdvanceDecision {
        let next = self.active.saturating_add(1);
        if self.heat(next).is_some() {
            AdvanceDecision::NextHeat(next)
        } else if self.unpaired_swimmers().is_empty() {
            AdvanceDecision::ReadyToFinish
        } else {
            AdvanceDecision::SpawnHeat(next)
        }
    }

    /// Moves on from a completed heat: to the existing next heat, or to a
    /// new provisional heat with the lane layout of heat 1 when swimmers
    /// remain unpaired.
    ///
    /// # Errors
    ///
    /// `WrongStatus` unless the active heat is completed.
    pub fn advance(&mut self) -> Result<Advance, GatewayError> {
        self.ensure_open()?;
        Self::ensure_status(self.active_heat()?, HeatStatus::Completed)?;
        let (heat_number, spawned) = match self.advance_decision() {
            AdvanceDecision::ReadyToFinish => return Ok(Advance::ReadyToFinish),
            AdvanceDecision::NextHeat(n) => (n, false),
            AdvanceDecision::SpawnHeat(n) => {
                let layout: Vec<u8> = self
                    .heats
                    .first()
                    .map(|h| h.lanes.iter().map(|l| l.number).collect())
                    .unwrap_or_else(|| (1..=self.event.lane_count).collect());
                self.heats.push(Heat::provisional(n, layout));
                (n, true)
            }
        };
        self.active = heat_number;
        let epoch = self.active_heat()?.epoch;
        let total_heats = u32::try_from(self.heats.len()).unwrap_or(u32::MAX);
        Ok(Advance::Moved {
            heat_number,
            spawned,
            signal: MeetSignal::HeatChanged {
                heat_number,
                total_heats,
                epoch,
                timestamp: Utc::now(),
            },
        })
    }

    /// Checks that the event may finish and resolves the swimmers to mark
    /// absent: `requested` when given, the unpaired swimmers otherwise.
    ///
    /// # Errors
    ///
    /// `HeatRunning` while a heat runs; `SwimmerNotFound` for unknown ids.
    pub fn check_finish(
        &self,
        requested: Option<&[SwimmerId]>,
    ) -> Result<Vec<SwimmerId>, GatewayError> {
        self.ensure_open()?;
        if let Some(running) = self.heats.iter().find(|h| h.status == HeatStatus::Running) {
            return Err(StateConflict::HeatRunning {
                heat: running.number(),
            }
            .into());
        }
        match requested {
            Some(ids) => {
                for id in ids {
                    self.swimmer(*id)?;
                }
                Ok(ids.to_vec())
            }
            None => Ok(self.unpaired_swimmers().iter().map(|s| s.id).collect()),
        }
    }

    /// Finishes the event, marking `absent` swimmers. Returns the
    /// `event-finished` signal.
    ///
    /// # Errors
    ///
    /// Same as [`Self::check_finish`].
    pub fn finish(&mut self, absent: Vec<SwimmerId>) -> Result<MeetSignal, GatewayError> {
        self.check_finish(Some(&absent))?;
        self.absent.extend(absent.iter().copied());
        self.finished = true;
        Ok(MeetSignal::EventFinished {
            absent_swimmer_ids: absent,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::{EventId, Stroke};

    struct Meet {
        machine: HeatStateMachine,
        a: SwimmerId,
        b: SwimmerId,
        c: SwimmerId,
        d: SwimmerId,
    }

    fn born(year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, 4, 1).unwrap_or_default()
    }

    fn swimmer(name: &str, year: i32) -> Swimmer {
        Swimmer {
            id: SwimmerId::new(),
            name: name.to_string(),
            birth_date: born(year),
        }
    }

    /// A and C are pre_minima (100m), B and D are minima_1 (200m).
    fn meet() -> Meet {
        let event = Event {
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
        };
        let swimmers = vec![
            swimmer("A", 2019),
            swimmer("B", 2017),
            swimmer("C", 2019),
            swimmer("D", 2017),
        ];
        let ids: Vec<SwimmerId> = swimmers.iter().map(|s| s.id).collect();
        let machine = HeatStateMachine::new(event, swimmers, Vec::new(), born(2026));
        let [a, b, c, d] = ids.as_slice() else {
            panic!("four swimmers");
        };
        Meet {
            machine,
            a: *a,
            b: *b,
            c: *c,
            d: *d,
        }
    }

    fn lane(m: &HeatStateMachine, number: u8) -> LaneId {
        m.active_heat()
            .ok()
            .and_then(|h| h.lanes.iter().find(|l| l.number == number))
            .map(|l| l.id)
            .unwrap_or_default()
    }

    /// Simulates the store round-trip of a save.
    fn save(m: &mut HeatStateMachine) {
        let Ok(pending) = m.pending_save() else {
            panic!("nothing to save");
        };
        let number = pending.key.number();
        let version = pending.version.unwrap_or(0) + 1;
        if pending.key.id().is_none() {
            let _ = m.mark_persisted(number, HeatId::new(), version);
        }
        if m.apply_saved(number, version, &pending.changes).is_err() {
            panic!("apply_saved failed");
        }
    }

    fn version(m: &HeatStateMachine) -> u64 {
        m.active_heat().ok().and_then(|h| h.version).unwrap_or(0) + 1
    }

    fn start(m: &mut HeatStateMachine) -> MeetSignal {
        let v = version(m);
        match m.start(v) {
            Ok(signal) => signal,
            Err(e) => panic!("start failed: {e}"),
        }
    }

    fn tag(m: &HeatStateMachine) -> HeatTag {
        m.collecting().unwrap_or(HeatTag::new(0, 0))
    }

    fn run_first_heat(m: &mut Meet) -> Completion {
        let (l1, l2) = (lane(&m.machine, 1), lane(&m.machine, 2));
        assert!(m.machine.select_distance(Distance::meters(200)).is_ok());
        assert!(m.machine.assign_swimmer(l1, m.b).is_ok());
        assert!(m.machine.assign_swimmer(l2, m.d).is_ok());
        save(&mut m.machine);
        start(&mut m.machine);
        let t = tag(&m.machine);
        let _ = m.machine.submit_time(t, l1, RaceTime::from_millis(32_450));
        let _ = m.machine.submit_time(t, l2, RaceTime::from_millis(31_980));
        let v = version(&m.machine);
        match m.machine.complete(v) {
            Ok(c) => c,
            Err(e) => panic!("complete failed: {e}"),
        }
    }

    #[test]
    fn new_machine_has_provisional_first_heat() {
        let m = meet();
        let Ok(heat) = m.machine.active_heat() else {
            panic!("no active heat");
        };
        assert_eq!(heat.key, HeatKey::Provisional { number: 1 });
        assert_eq!(heat.lanes.len(), 4);
        assert_eq!(m.machine.distance(), Distance::meters(200));
    }

    #[test]
    fn eligible_pool_splits_by_distance() {
        let m = meet();
        let ids = |pool: Vec<&Swimmer>| pool.iter().map(|s| s.id).collect::<BTreeSet<_>>();
        assert_eq!(
            ids(m.machine.eligible_pool(Distance::meters(100))),
            BTreeSet::from([m.a, m.c])
        );
        assert_eq!(
            ids(m.machine.eligible_pool(Distance::meters(200))),
            BTreeSet::from([m.b, m.d])
        );
    }

    #[test]
    fn start_needs_saved_swimmers() {
        let mut m = meet();
        let l1 = lane(&m.machine, 1);
        assert!(matches!(
            m.machine.start(1),
            Err(GatewayError::StateConflict(
                StateConflict::NoSwimmersAssigned { heat: 1 }
            ))
        ));

        assert!(m.machine.assign_swimmer(l1, m.b).is_ok());
        // Staged only: still nothing persisted.
        assert!(matches!(
            m.machine.check_start(),
            Err(GatewayError::StateConflict(
                StateConflict::NoSwimmersAssigned { .. }
            ))
        ));

        save(&mut m.machine);
        let l2 = lane(&m.machine, 2);
        assert!(m.machine.assign_swimmer(l2, m.d).is_ok());
        let Err(GatewayError::StateConflict(StateConflict::UnsavedAssignments { lanes, .. })) =
            m.machine.check_start()
        else {
            panic!("expected unsaved assignments");
        };
        assert_eq!(lanes, vec![l2]);
    }

    #[test]
    fn wrong_distance_assignment_is_rejected_without_state_change() {
        let mut m = meet();
        let l1 = lane(&m.machine, 1);
        let result = m.machine.assign_swimmer(l1, m.a);
        assert!(matches!(
            result,
            Err(GatewayError::Rejected(Rejection::NotEligibleForDistance { .. }))
        ));
        assert!(m
            .machine
            .active_heat()
            .map(|h| h.staged_lanes().next().is_none())
            .unwrap_or(false));
    }

    #[test]
    fn scenario_b_ranks_lane_two_first() {
        let mut m = meet();
        let completion = run_first_heat(&mut m);
        assert_eq!(completion.heat_number, 1);
        let first = completion.standings.first();
        assert_eq!(first.map(|s| s.lane_number), Some(2));
        assert_eq!(first.and_then(|s| s.swimmer_id), Some(m.d));
        assert_eq!(first.and_then(|s| s.medal), Some(ranking::Medal::Gold));
        let second = completion.standings.get(1);
        assert_eq!(second.map(|s| s.lane_number), Some(1));
        assert_eq!(second.and_then(|s| s.medal), Some(ranking::Medal::Silver));
        // A and C are still waiting for the 100m heat.
        assert_eq!(completion.next, AdvanceDecision::SpawnHeat(2));
    }

    #[test]
    fn scenario_c_competed_swimmer_cannot_be_assigned_again() {
        let mut m = meet();
        run_first_heat(&mut m);
        let Ok(Advance::Moved {
            heat_number,
            spawned,
            ..
        }) = m.machine.advance()
        else {
            panic!("expected to move to heat 2");
        };
        assert_eq!((heat_number, spawned), (2, true));
        let l1 = lane(&m.machine, 1);
        assert!(matches!(
            m.machine.assign_swimmer(l1, m.b),
            Err(GatewayError::Rejected(Rejection::AlreadyCompeted { heat: 1 }))
        ));
    }

    #[test]
    fn scenario_d_reset_discards_times_and_bumps_epoch() {
        let mut m = meet();
        let (l1, l2) = (lane(&m.machine, 1), lane(&m.machine, 2));
        let _ = m.machine.assign_swimmer(l1, m.b);
        let _ = m.machine.assign_swimmer(l2, m.d);
        save(&mut m.machine);
        start(&mut m.machine);
        let before = tag(&m.machine);
        let _ = m.machine.submit_time(before, l1, RaceTime::from_millis(32_450));

        let v = version(&m.machine);
        let Ok(MeetSignal::HeatReset { epoch, .. }) = m.machine.reset(v) else {
            panic!("reset failed");
        };
        assert_eq!(epoch, 1);
        assert_eq!(m.machine.collected_time(l1), None);
        let Ok(heat) = m.machine.active_heat() else {
            panic!("no heat");
        };
        assert_eq!(heat.status, HeatStatus::AssigningSwimmers);
        assert!(heat.lanes.iter().all(|l| l.final_time.is_none()));
        assert_eq!(heat.assigned_lanes().count(), 2);

        start(&mut m.machine);
        let late = m.machine.submit_time(before, l2, RaceTime::from_millis(1));
        assert!(matches!(late, Ok(SubmitOutcome::Stale { .. })));
        assert_eq!(m.machine.collected_time(l2), None);
        assert_eq!(tag(&m.machine), HeatTag::new(1, 1));
    }

    #[test]
    fn scenario_e_complete_with_missing_time_keeps_running() {
        let mut m = meet();
        let (l1, l2) = (lane(&m.machine, 1), lane(&m.machine, 2));
        let _ = m.machine.assign_swimmer(l1, m.b);
        let _ = m.machine.assign_swimmer(l2, m.d);
        save(&mut m.machine);
        start(&mut m.machine);
        let t = tag(&m.machine);
        let _ = m.machine.submit_time(t, l1, RaceTime::from_millis(32_450));

        let Err(GatewayError::StateConflict(StateConflict::TimesPending { lanes, .. })) =
            m.machine.complete(9)
        else {
            panic!("expected times pending");
        };
        assert_eq!(lanes, vec![l2]);
        assert_eq!(
            m.machine.active_heat().map(|h| h.status).ok(),
            Some(HeatStatus::Running)
        );
    }

    #[test]
    fn next_heat_cannot_start_before_previous_completes() {
        let mut m = meet();
        let l1 = lane(&m.machine, 1);
        let _ = m.machine.assign_swimmer(l1, m.b);
        save(&mut m.machine);
        // Heat 2 exists in the store while heat 1 is still open.
        let mut second = Heat::provisional(2, 1..=4);
        second.key = HeatKey::Persisted {
            id: HeatId::new(),
            number: 2,
        };
        second.version = Some(1);
        if let Some(lane) = second.lanes.first_mut() {
            lane.swimmer = Some(m.d);
        }
        m.machine.refresh(vec![second]);
        m.machine.active = 2;
        assert!(matches!(
            m.machine.check_start(),
            Err(GatewayError::StateConflict(
                StateConflict::PreviousHeatIncomplete {
                    heat: 2,
                    previous: 1
                }
            ))
        ));
    }

    #[test]
    fn refresh_catches_assignment_from_another_session() {
        let mut m = meet();
        let l1 = lane(&m.machine, 1);
        let _ = m.machine.assign_swimmer(l1, m.b);
        save(&mut m.machine);

        // Another session put B in lane 3 as well.
        let Ok(mut stored) = m.machine.active_heat().cloned() else {
            panic!("no heat");
        };
        stored.version = stored.version.map(|v| v + 1);
        if let Some(lane) = stored.lanes.iter_mut().find(|l| l.number == 3) {
            lane.swimmer = Some(m.b);
        }
        m.machine.refresh(vec![stored]);
        assert!(matches!(
            m.machine.check_start(),
            Err(GatewayError::Rejected(
                Rejection::AlreadyAssignedThisHeat { .. }
            ))
        ));
    }

    #[test]
    fn advance_then_finish() {
        let mut m = meet();
        run_first_heat(&mut m);
        assert!(m.machine.advance().is_ok());
        let (l1, l2) = (lane(&m.machine, 1), lane(&m.machine, 2));
        assert!(m.machine.select_distance(Distance::meters(100)).is_ok());
        let _ = m.machine.assign_swimmer(l1, m.a);
        save(&mut m.machine);
        start(&mut m.machine);
        let t = tag(&m.machine);
        let _ = m.machine.submit_time(t, l1, RaceTime::from_millis(50_000));
        let v = version(&m.machine);
        let Ok(completion) = m.machine.complete(v) else {
            panic!("complete failed");
        };
        // C never swam.
        assert_eq!(completion.next, AdvanceDecision::SpawnHeat(3));
        assert!(matches!(
            m.machine.assign_swimmer(l2, m.c),
            Err(GatewayError::StateConflict(StateConflict::WrongStatus { .. }))
        ));

        let Ok(absent) = m.machine.check_finish(None) else {
            panic!("finish refused");
        };
        assert_eq!(absent, vec![m.c]);
        let Ok(MeetSignal::EventFinished {
            absent_swimmer_ids, ..
        }) = m.machine.finish(absent)
        else {
            panic!("finish failed");
        };
        assert_eq!(absent_swimmer_ids, vec![m.c]);
        assert!(m.machine.is_finished());
        assert!(m.machine.unpaired_swimmers().is_empty());
        assert!(matches!(
            m.machine.advance(),
            Err(GatewayError::StateConflict(StateConflict::EventFinished))
        ));
    }

    #[test]
    fn finish_refused_while_running() {
        let mut m = meet();
        let l1 = lane(&m.machine, 1);
        let _ = m.machine.assign_swimmer(l1, m.b);
        save(&mut m.machine);
        start(&mut m.machine);
        assert!(matches!(
            m.machine.check_finish(None),
            Err(GatewayError::StateConflict(StateConflict::HeatRunning { heat: 1 }))
        ));
    }

    #[test]
    fn unassign_stages_clear() {
        let mut m = meet();
        let l1 = lane(&m.machine, 1);
        let _ = m.machine.assign_swimmer(l1, m.b);
        // Unassigning a lane that was never saved just drops the staged change.
        assert!(m.machine.unassign(l1).is_ok());
        assert!(m
            .machine
            .pending_save()
            .map(|p| p.changes.is_empty())
            .unwrap_or(false));

        let _ = m.machine.assign_swimmer(l1, m.b);
        save(&mut m.machine);
        assert!(m.machine.unassign(l1).is_ok());
        let Ok(pending) = m.machine.pending_save() else {
            panic!("pending save");
        };
        assert_eq!(pending.changes, vec![(l1, None)]);
    }
}
