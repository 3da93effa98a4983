//! REST API layer: route handlers, DTOs, and router composition.
//!
//! All event endpoints are mounted under `/api/v1`; `/health` sits at the
//! root. With the `swagger-ui` feature the OpenAPI document is served at
//! `/api-docs/openapi.json` and browsable at `/swagger-ui`.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "swim-heat-gateway",
        description = "Live heat and lane coordination for swim meets."
    ),
    paths(
        handlers::system::health_handler,
        handlers::event::get_event,
        handlers::event::get_heat,
        handlers::event::get_ranking,
        handlers::event::get_eligible,
        handlers::event::select_distance,
        handlers::event::stage_assignment,
        handlers::event::save_assignments,
        handlers::heat::start_heat,
        handlers::heat::submit_time,
        handlers::heat::complete_heat,
        handlers::heat::reset_heat,
        handlers::heat::advance_heat,
        handlers::heat::finish_event,
    ),
    tags(
        (name = "Events", description = "Event snapshot, heat review and lane assignment"),
        (name = "Heats", description = "Heat lifecycle and timing"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
