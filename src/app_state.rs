//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::BroadcastChannel;
use crate::service::MeetService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Meet service for all heat operations.
    pub meet_service: Arc<MeetService>,
    /// Broadcast channel for WebSocket subscriptions.
    pub channel: Arc<dyn BroadcastChannel>,
}

impl AppState {
    /// Builds the state around `meet_service`, sharing its channel.
    #[must_use]
    pub fn new(meet_service: Arc<MeetService>) -> Self {
        let channel = Arc::clone(meet_service.channel());
        Self {
            meet_service,
            channel,
        }
    }
}
