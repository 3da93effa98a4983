//! Application assembly: router, middleware and the gateway wiring shared
//! by the binary and the integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use chrono::NaiveDate;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::domain::{BroadcastChannel, EventBus, MeetRegistry};
use crate::persistence::{HeatStore, MeetDirectory};
use crate::service::MeetService;
use crate::ws::handler::ws_handler;

/// Builds the full application: REST routes, `/ws`, tracing, CORS and a
/// request timeout.
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wires a [`MeetService`] over `store` with a fresh registry and an
/// in-process [`EventBus`] of `bus_capacity`. Categories resolve on
/// `resolution_date`, or on the current date when `None`.
pub fn build_state<S>(
    store: Arc<S>,
    bus_capacity: usize,
    resolution_date: Option<NaiveDate>,
) -> AppState
where
    S: HeatStore + MeetDirectory + 'static,
{
    let channel: Arc<dyn BroadcastChannel> = Arc::new(EventBus::new(bus_capacity));
    let heat_store: Arc<dyn HeatStore> = Arc::<S>::clone(&store);
    let directory: Arc<dyn MeetDirectory> = store;
    let mut service = MeetService::new(
        Arc::new(MeetRegistry::new()),
        heat_store,
        directory,
        channel,
    );
    if let Some(on) = resolution_date {
        service = service.with_resolution_date(on);
    }
    AppState::new(Arc::new(service))
}
