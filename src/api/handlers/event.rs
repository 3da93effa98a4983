//! Event handlers: snapshot, heat review, eligibility and lane assignment.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    EligibleQuery, EventSnapshotResponse, HeatView, SelectDistanceRequest,
    StageAssignmentRequest, StandingView, SwimmerNames, SwimmerView,
};
use crate::app_state::AppState;
use crate::domain::{Distance, EventId};
use crate::error::{ErrorResponse, GatewayError};

/// `GET /events/{id}` — Controller snapshot.
///
/// # Errors
///
/// Returns [`GatewayError::EventNotFound`] for unknown events.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}",
    tag = "Events",
    summary = "Get controller snapshot",
    description = "Returns every heat of the event with lanes, live times on the running heat, the active heat and the selected distance.",
    params(("id" = EventId, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Controller snapshot", body = EventSnapshotResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
) -> Result<impl IntoResponse, GatewayError> {
    let snapshot = state.meet_service.snapshot(id).await?;
    Ok(Json(EventSnapshotResponse::from(snapshot)))
}

/// `GET /events/{id}/heats/{number}` — Review one heat.
///
/// # Errors
///
/// Returns [`GatewayError::HeatNotFound`] for unknown heats.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}/heats/{number}",
    tag = "Events",
    summary = "Get a heat",
    description = "Returns one heat, completed heats included. Reviewing a heat never reopens timing.",
    params(
        ("id" = EventId, Path, description = "Event identifier"),
        ("number" = u32, Path, description = "Heat sequence number"),
    ),
    responses(
        (status = 200, description = "Heat", body = HeatView),
        (status = 404, description = "Event or heat not found", body = ErrorResponse),
    )
)]
pub async fn get_heat(
    State(state): State<AppState>,
    Path((id, number)): Path<(EventId, u32)>,
) -> Result<impl IntoResponse, GatewayError> {
    let heat = state.meet_service.heat(id, number).await?;
    let (_, swimmers, _) = state.meet_service.swimmers(id).await?;
    Ok(Json(HeatView::new(&heat, &SwimmerNames::new(&swimmers))))
}

/// `GET /events/{id}/heats/{number}/ranking` — Heat standings.
///
/// # Errors
///
/// Returns [`GatewayError::HeatNotFound`] for unknown heats.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}/heats/{number}/ranking",
    tag = "Events",
    summary = "Get heat standings",
    description = "Final standings of a completed heat, or live standings from the times collected so far.",
    params(
        ("id" = EventId, Path, description = "Event identifier"),
        ("number" = u32, Path, description = "Heat sequence number"),
    ),
    responses(
        (status = 200, description = "Standings", body = Vec<StandingView>),
        (status = 404, description = "Event or heat not found", body = ErrorResponse),
    )
)]
pub async fn get_ranking(
    State(state): State<AppState>,
    Path((id, number)): Path<(EventId, u32)>,
) -> Result<impl IntoResponse, GatewayError> {
    let standings = state.meet_service.ranking(id, number).await?;
    let (_, swimmers, _) = state.meet_service.swimmers(id).await?;
    Ok(Json(StandingView::list(
        &standings,
        &SwimmerNames::new(&swimmers),
    )))
}

/// `GET /events/{id}/eligible` — Unpaired swimmers for a distance.
///
/// # Errors
///
/// Returns [`GatewayError::EventNotFound`] for unknown events.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}/eligible",
    tag = "Events",
    summary = "List eligible swimmers",
    description = "Swimmers whose category swims the distance and who have neither swum nor been placed in a pending heat.",
    params(("id" = EventId, Path, description = "Event identifier"), EligibleQuery),
    responses(
        (status = 200, description = "Eligible swimmers", body = Vec<SwimmerView>),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn get_eligible(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
    Query(query): Query<EligibleQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let pool = state
        .meet_service
        .eligible_pool(id, query.distance.map(Distance::meters))
        .await?;
    let (event, _, on) = state.meet_service.swimmers(id).await?;
    let views: Vec<SwimmerView> = pool
        .iter()
        .map(|s| SwimmerView::new(s, &event, on))
        .collect();
    Ok(Json(views))
}

/// `POST /events/{id}/distance` — Select the distance to assign for.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for distances not swum in the
/// event, or a state conflict outside assignment.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/distance",
    tag = "Events",
    summary = "Select distance",
    description = "Chooses the distance subsequent lane assignments are validated against.",
    params(("id" = EventId, Path, description = "Event identifier")),
    request_body = SelectDistanceRequest,
    responses(
        (status = 200, description = "Distance selected", body = EventSnapshotResponse),
        (status = 400, description = "Distance not swum in this event", body = ErrorResponse),
        (status = 409, description = "Heat is not assigning swimmers", body = ErrorResponse),
    )
)]
pub async fn select_distance(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
    Json(req): Json<SelectDistanceRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    state.meet_service.select_distance(id, req.distance).await?;
    let snapshot = state.meet_service.snapshot(id).await?;
    Ok(Json(EventSnapshotResponse::from(snapshot)))
}

/// `POST /events/{id}/assignments` — Stage a lane change.
///
/// # Errors
///
/// Returns [`GatewayError::Rejected`] when the swimmer may not be placed.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/assignments",
    tag = "Events",
    summary = "Stage a lane assignment",
    description = "Validates and stages placing a swimmer in a lane of the active heat, or emptying it when `swimmerId` is null. Staged changes must be saved before the heat can start.",
    params(("id" = EventId, Path, description = "Event identifier")),
    request_body = StageAssignmentRequest,
    responses(
        (status = 200, description = "Active heat with the staged change", body = HeatView),
        (status = 404, description = "Lane or swimmer not found", body = ErrorResponse),
        (status = 409, description = "Heat is not assigning swimmers", body = ErrorResponse),
        (status = 422, description = "Assignment rejected", body = ErrorResponse),
    )
)]
pub async fn stage_assignment(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
    Json(req): Json<StageAssignmentRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let heat = state
        .meet_service
        .stage(id, req.lane_id, req.swimmer_id)
        .await?;
    let (_, swimmers, _) = state.meet_service.swimmers(id).await?;
    Ok(Json(HeatView::new(&heat, &SwimmerNames::new(&swimmers))))
}

/// `POST /events/{id}/assignments/save` — Persist staged changes.
///
/// # Errors
///
/// Returns a persistence error or [`GatewayError::ConcurrentModification`];
/// staged changes are kept for a retry.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/assignments/save",
    tag = "Events",
    summary = "Save lane assignments",
    description = "Persists the active heat's staged changes, creating the heat in the store if needed, and broadcasts `swimmers-assigned`.",
    params(("id" = EventId, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Saved heat", body = HeatView),
        (status = 409, description = "Concurrent modification or wrong state", body = ErrorResponse),
        (status = 500, description = "Store failure; staged changes kept", body = ErrorResponse),
    )
)]
pub async fn save_assignments(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
) -> Result<impl IntoResponse, GatewayError> {
    let heat = state.meet_service.save_assignments(id).await?;
    let (_, swimmers, _) = state.meet_service.swimmers(id).await?;
    Ok(Json(HeatView::new(&heat, &SwimmerNames::new(&swimmers))))
}

/// Event read and assignment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events/{id}", get(get_event))
        .route("/events/{id}/heats/{number}", get(get_heat))
        .route("/events/{id}/heats/{number}/ranking", get(get_ranking))
        .route("/events/{id}/eligible", get(get_eligible))
        .route("/events/{id}/distance", post(select_distance))
        .route("/events/{id}/assignments", post(stage_assignment))
        .route("/events/{id}/assignments/save", post(save_assignments))
}
