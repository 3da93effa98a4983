//! Request and response bodies of the event endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::heat_dto::{HeatView, StandingView, SwimmerNames};
use crate::domain::{
    Advance, AdvanceDecision, Completion, Distance, EventId, HeatTag, LaneId, RaceTime, Stroke,
    SubmitOutcome, SwimmerId,
};
use crate::service::MeetSnapshot;

/// Controller snapshot for `GET /events/{id}`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshotResponse {
    /// Event identifier.
    pub event_id: EventId,
    /// Display title.
    pub title: String,
    /// Stroke.
    pub stroke: Stroke,
    /// Lanes in the pool.
    pub lane_count: u8,
    /// Every distance swum in the event, general distance first.
    pub distances: Vec<Distance>,
    /// Distance assignments are validated against.
    pub selected_distance: Distance,
    /// Active heat number.
    pub active_heat: u32,
    /// Attempt currently collecting times.
    pub collecting: Option<HeatTag>,
    /// Whether the event has finished.
    pub finished: bool,
    /// Heats by number.
    pub heats: Vec<HeatView>,
    /// Entitled swimmers not yet placed nor resolved.
    pub unpaired_swimmer_ids: Vec<SwimmerId>,
    /// Swimmers marked absent.
    pub absent_swimmer_ids: Vec<SwimmerId>,
}

impl From<MeetSnapshot> for EventSnapshotResponse {
    fn from(snapshot: MeetSnapshot) -> Self {
        let names = SwimmerNames::new(&snapshot.swimmers);
        Self {
            event_id: snapshot.event.id,
            title: snapshot.event.title.clone(),
            stroke: snapshot.event.stroke,
            lane_count: snapshot.event.lane_count,
            distances: snapshot.event.distances(),
            selected_distance: snapshot.distance,
            active_heat: snapshot.active_heat,
            collecting: snapshot.collecting,
            finished: snapshot.finished,
            heats: snapshot
                .heats
                .iter()
                .map(|h| HeatView::new(h, &names))
                .collect(),
            unpaired_swimmer_ids: snapshot.unpaired.clone(),
            absent_swimmer_ids: snapshot.absent.clone(),
        }
    }
}

/// Query of `GET /events/{id}/eligible`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EligibleQuery {
    /// Distance in metres; defaults to the selected distance.
    pub distance: Option<u32>,
}

/// Body of `POST /events/{id}/distance`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectDistanceRequest {
    /// Distance in metres.
    pub distance: Distance,
}

/// Body of `POST /events/{id}/assignments`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageAssignmentRequest {
    /// Lane of the active heat.
    pub lane_id: LaneId,
    /// Swimmer to place, or `null` to empty the lane.
    #[serde(default)]
    pub swimmer_id: Option<SwimmerId>,
}

/// Body of `POST /events/{id}/times`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTimeRequest {
    /// Heat the station believes is running.
    pub heat_number: u32,
    /// Epoch the station believes is current.
    pub epoch: u32,
    /// Lane identifier.
    pub lane_id: LaneId,
    /// Milliseconds, or text such as `"32.45"` / `"1:02.37"`.
    pub final_time: RaceTime,
}

/// Result of a time submission.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTimeResponse {
    /// `recorded`, `replaced`, `unchanged` or `stale`.
    pub outcome: String,
    /// For stale submissions, the attempt actually collecting times.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<HeatTag>,
}

impl From<SubmitOutcome> for SubmitTimeResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        let (outcome, active) = match outcome {
            SubmitOutcome::Recorded => ("recorded", None),
            SubmitOutcome::Replaced { .. } => ("replaced", None),
            SubmitOutcome::Unchanged => ("unchanged", None),
            SubmitOutcome::Stale { active } => ("stale", active),
        };
        Self {
            outcome: outcome.to_string(),
            active,
        }
    }
}

/// What advancing from a completed heat will do.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NextStep {
    /// `next_heat`, `spawn_heat` or `ready_to_finish`.
    pub kind: String,
    /// Heat the controller would move to.
    pub heat_number: Option<u32>,
}

impl From<AdvanceDecision> for NextStep {
    fn from(decision: AdvanceDecision) -> Self {
        let (kind, heat_number) = match decision {
            AdvanceDecision::NextHeat(n) => ("next_heat", Some(n)),
            AdvanceDecision::SpawnHeat(n) => ("spawn_heat", Some(n)),
            AdvanceDecision::ReadyToFinish => ("ready_to_finish", None),
        };
        Self {
            kind: kind.to_string(),
            heat_number,
        }
    }
}

/// Response of `POST /events/{id}/complete`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    /// Completed heat.
    pub heat_number: u32,
    /// Final standings.
    pub standings: Vec<StandingView>,
    /// What advancing will do.
    pub next: NextStep,
}

impl CompletionResponse {
    /// Builds the response, naming swimmers from `names`.
    #[must_use]
    pub fn new(completion: &Completion, names: &SwimmerNames<'_>) -> Self {
        Self {
            heat_number: completion.heat_number,
            standings: StandingView::list(&completion.standings, names),
            next: NextStep::from(completion.next),
        }
    }
}

/// Response of `POST /events/{id}/advance`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResponse {
    /// Whether the controller moved to another heat.
    pub moved: bool,
    /// New active heat.
    pub heat_number: Option<u32>,
    /// Whether the heat was created by this call.
    pub spawned: bool,
    /// Nobody is left to swim.
    pub ready_to_finish: bool,
}

impl From<&Advance> for AdvanceResponse {
    fn from(advance: &Advance) -> Self {
        match advance {
            Advance::Moved {
                heat_number,
                spawned,
                ..
            } => Self {
                moved: true,
                heat_number: Some(*heat_number),
                spawned: *spawned,
                ready_to_finish: false,
            },
            Advance::ReadyToFinish => Self {
                moved: false,
                heat_number: None,
                spawned: false,
                ready_to_finish: true,
            },
        }
    }
}

/// Body of `POST /events/{id}/finish`.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinishRequest {
    /// Swimmers to mark absent; defaults to every unpaired swimmer.
    #[serde(default)]
    pub absent_swimmer_ids: Option<Vec<SwimmerId>>,
}

/// Response of `POST /events/{id}/finish`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinishResponse {
    /// Swimmers marked absent.
    pub absent_swimmer_ids: Vec<SwimmerId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_outcome_reports_active_attempt() {
        let response = SubmitTimeResponse::from(SubmitOutcome::Stale {
            active: Some(HeatTag::new(1, 1)),
        });
        assert_eq!(response.outcome, "stale");
        assert_eq!(response.active, Some(HeatTag::new(1, 1)));
    }

    #[test]
    fn stage_request_accepts_null_swimmer() {
        let lane = LaneId::new();
        let body = serde_json::json!({ "laneId": lane, "swimmerId": null });
        let parsed: Result<StageAssignmentRequest, _> = serde_json::from_value(body);
        assert!(parsed.is_ok_and(|r| r.lane_id == lane && r.swimmer_id.is_none()));
    }

    #[test]
    fn next_step_kinds() {
        assert_eq!(NextStep::from(AdvanceDecision::SpawnHeat(3)).kind, "spawn_heat");
        assert_eq!(NextStep::from(AdvanceDecision::ReadyToFinish).heat_number, None);
    }
}
