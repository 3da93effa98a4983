//! Heat lifecycle handlers: start, times, complete, reset, advance, finish.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{
    AdvanceResponse, CompletionResponse, FinishRequest, FinishResponse, SubmitTimeRequest,
    SubmitTimeResponse, SwimmerNames,
};
use crate::app_state::AppState;
use crate::domain::{EventId, HeatTag};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /events/{id}/start` — Start the active heat.
///
/// # Errors
///
/// Returns a state conflict listing what blocks the start, or
/// [`GatewayError::Rejected`] when a saved assignment became invalid.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/start",
    tag = "Heats",
    summary = "Start the active heat",
    description = "Refreshes assignments from the store, re-validates them and moves the heat to running. Broadcasts `heat-start` with the heat's epoch.",
    params(("id" = EventId, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Running attempt", body = HeatTag),
        (status = 409, description = "No swimmers, unsaved assignments, previous heat open or wrong status", body = ErrorResponse),
        (status = 422, description = "A saved assignment conflicts", body = ErrorResponse),
    )
)]
pub async fn start_heat(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
) -> Result<impl IntoResponse, GatewayError> {
    let tag = state.meet_service.start(id).await?;
    Ok(Json(tag))
}

/// `POST /events/{id}/times` — Submit a lane time.
///
/// # Errors
///
/// Returns [`GatewayError::LaneNotFound`] or
/// [`GatewayError::InvalidRequest`] for a current submission naming an
/// unknown or empty lane. Stale submissions succeed with outcome `stale`.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/times",
    tag = "Heats",
    summary = "Submit a lane time",
    description = "Timing-station submission tagged with the heat number and epoch it was made for. Submissions for any other attempt are dropped and reported as `stale`.",
    params(("id" = EventId, Path, description = "Event identifier")),
    request_body = SubmitTimeRequest,
    responses(
        (status = 200, description = "Submission outcome", body = SubmitTimeResponse),
        (status = 400, description = "Lane holds no swimmer", body = ErrorResponse),
        (status = 404, description = "Lane not in the running heat", body = ErrorResponse),
    )
)]
pub async fn submit_time(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
    Json(req): Json<SubmitTimeRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let outcome = state
        .meet_service
        .submit_time(
            id,
            HeatTag::new(req.heat_number, req.epoch),
            req.lane_id,
            req.final_time,
        )
        .await?;
    Ok(Json(SubmitTimeResponse::from(outcome)))
}

/// `POST /events/{id}/complete` — Complete the running heat.
///
/// # Errors
///
/// Returns `StateConflict::TimesPending` with the lanes still missing a
/// time.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/complete",
    tag = "Heats",
    summary = "Complete the running heat",
    description = "Records every lane time and the completed status in one write, then returns the standings and what advancing will do.",
    params(("id" = EventId, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Standings", body = CompletionResponse),
        (status = 409, description = "Times pending or wrong status", body = ErrorResponse),
    )
)]
pub async fn complete_heat(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
) -> Result<impl IntoResponse, GatewayError> {
    let completion = state.meet_service.complete(id).await?;
    let (_, swimmers, _) = state.meet_service.swimmers(id).await?;
    Ok(Json(CompletionResponse::new(
        &completion,
        &SwimmerNames::new(&swimmers),
    )))
}

/// `POST /events/{id}/reset` — Reset the running heat.
///
/// # Errors
///
/// Returns `StateConflict::WrongStatus` unless the heat is running.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/reset",
    tag = "Heats",
    summary = "Reset the running heat",
    description = "Discards collected times, keeps lane assignments and bumps the epoch. Broadcasts `heat-reset` with the new epoch.",
    params(("id" = EventId, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "New attempt tag", body = HeatTag),
        (status = 409, description = "Heat is not running", body = ErrorResponse),
    )
)]
pub async fn reset_heat(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
) -> Result<impl IntoResponse, GatewayError> {
    let tag = state.meet_service.reset(id).await?;
    Ok(Json(tag))
}

/// `POST /events/{id}/advance` — Move on from the completed heat.
///
/// # Errors
///
/// Returns `StateConflict::WrongStatus` unless the active heat is
/// completed.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/advance",
    tag = "Heats",
    summary = "Advance to the next heat",
    description = "Moves to the next heat, creating a provisional one when swimmers remain unpaired. Broadcasts `heat-changed`.",
    params(("id" = EventId, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Where the controller went", body = AdvanceResponse),
        (status = 409, description = "Active heat is not completed", body = ErrorResponse),
    )
)]
pub async fn advance_heat(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
) -> Result<impl IntoResponse, GatewayError> {
    let advance = state.meet_service.advance(id).await?;
    Ok(Json(AdvanceResponse::from(&advance)))
}

/// `POST /events/{id}/finish` — Finish the event.
///
/// # Errors
///
/// Returns `StateConflict::HeatRunning` while a heat runs, and
/// [`GatewayError::InvalidRequest`] for a malformed body.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/finish",
    tag = "Heats",
    summary = "Finish the event",
    description = "Marks the given swimmers (or every unpaired swimmer when the body is empty) absent and closes the event. Broadcasts `event-finished`.",
    params(("id" = EventId, Path, description = "Event identifier")),
    request_body(content = FinishRequest, description = "Optional absent list; may be omitted"),
    responses(
        (status = 200, description = "Swimmers marked absent", body = FinishResponse),
        (status = 409, description = "A heat is running or the event already finished", body = ErrorResponse),
    )
)]
pub async fn finish_event(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let req: FinishRequest = if body.iter().all(u8::is_ascii_whitespace) {
        FinishRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| GatewayError::InvalidRequest(format!("invalid finish body: {e}")))?
    };
    let absent = state
        .meet_service
        .finish(id, req.absent_swimmer_ids)
        .await?;
    Ok(Json(FinishResponse {
        absent_swimmer_ids: absent,
    }))
}

/// Heat lifecycle routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events/{id}/start", post(start_heat))
        .route("/events/{id}/times", post(submit_time))
        .route("/events/{id}/complete", post(complete_heat))
        .route("/events/{id}/reset", post(reset_heat))
        .route("/events/{id}/advance", post(advance_heat))
        .route("/events/{id}/finish", post(finish_event))
}
