//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type. Each variant maps to a
//! numeric code, an HTTP status and a structured JSON error response whose
//! `details` carry the specific offending items (missing lanes, the
//! rejected assignment, the conflicting version).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::validator::Rejection;
use crate::domain::{EventId, HeatStatus, LaneId, TransportError};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2104,
///     "message": "times pending for heat 1",
///     "details": { "conflict": "times_pending", "heat": 1, "lanes": ["..."] }
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional machine-readable details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Operation attempted in a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "conflict", rename_all = "snake_case")]
pub enum StateConflict {
    /// The heat is not in the status the operation needs.
    #[error("heat {heat} is {actual}, expected {expected}")]
    WrongStatus {
        /// Heat sequence number.
        heat: u32,
        /// Status the operation needs.
        expected: HeatStatus,
        /// Current status.
        actual: HeatStatus,
    },
    /// No lane holds a saved swimmer.
    #[error("no swimmers assigned to heat {heat}")]
    NoSwimmersAssigned {
        /// Heat sequence number.
        heat: u32,
    },
    /// Some lane changes were never saved.
    #[error("heat {heat} has unsaved assignments")]
    UnsavedAssignments {
        /// Heat sequence number.
        heat: u32,
        /// Lanes with unsaved changes.
        lanes: Vec<LaneId>,
    },
    /// Some assigned lanes have no time yet.
    #[error("times pending for heat {heat}")]
    TimesPending {
        /// Heat sequence number.
        heat: u32,
        /// Lanes still waiting for a time.
        lanes: Vec<LaneId>,
    },
    /// The previous heat has not completed.
    #[error("heat {previous} must complete before heat {heat} can start")]
    PreviousHeatIncomplete {
        /// Heat that was asked to start.
        heat: u32,
        /// Heat that is still open.
        previous: u32,
    },
    /// A heat is running.
    #[error("heat {heat} is running")]
    HeatRunning {
        /// Running heat.
        heat: u32,
    },
    /// The event has finished; nothing may change.
    #[error("event has finished")]
    EventFinished,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category                 | HTTP Status                  |
/// |-----------|--------------------------|------------------------------|
/// | 1000–1999 | Validation               | 400 / 422                    |
/// | 2000–2999 | State / Not Found        | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server / Transport       | 500 / 502                    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Event with the given ID was not found.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// Heat with the given sequence number was not found.
    #[error("heat {0} not found")]
    HeatNotFound(u32),

    /// Lane is not part of the heat being operated on.
    #[error("lane not found: {0}")]
    LaneNotFound(LaneId),

    /// Swimmer is not in the event's directory.
    #[error("swimmer not found: {0}")]
    SwimmerNotFound(uuid::Uuid),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Lane assignment refused.
    #[error("assignment rejected: {0}")]
    Rejected(#[from] Rejection),

    /// Operation not allowed in the current state.
    #[error("state conflict: {0}")]
    StateConflict(#[from] StateConflict),

    /// Stored record changed since it was read.
    #[error("heat {heat} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification {
        /// Heat sequence number.
        heat: u32,
        /// Version the write was based on.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Broadcast transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Rejected(Rejection::AlreadyAssignedThisHeat { .. }) => 1101,
            Self::Rejected(Rejection::AlreadyCompeted { .. }) => 1102,
            Self::Rejected(Rejection::NotEligibleForDistance { .. }) => 1103,
            Self::EventNotFound(_) => 2001,
            Self::HeatNotFound(_) => 2002,
            Self::LaneNotFound(_) => 2003,
            Self::SwimmerNotFound(_) => 2004,
            Self::StateConflict(StateConflict::WrongStatus { .. }) => 2101,
            Self::StateConflict(StateConflict::NoSwimmersAssigned { .. }) => 2102,
            Self::StateConflict(StateConflict::UnsavedAssignments { .. }) => 2103,
            Self::StateConflict(StateConflict::TimesPending { .. }) => 2104,
            Self::StateConflict(StateConflict::PreviousHeatIncomplete { .. }) => 2105,
            Self::StateConflict(StateConflict::HeatRunning { .. }) => 2106,
            Self::StateConflict(StateConflict::EventFinished) => 2107,
            Self::ConcurrentModification { .. } => 2201,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::Transport(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::EventNotFound(_)
            | Self::HeatNotFound(_)
            | Self::LaneNotFound(_)
            | Self::SwimmerNotFound(_) => StatusCode::NOT_FOUND,
            Self::StateConflict(_) | Self::ConcurrentModification { .. } => StatusCode::CONFLICT,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Machine-readable details for the error body.
    #[must_use]
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Rejected(rejection) => serde_json::to_value(rejection).ok(),
            Self::StateConflict(conflict) => serde_json::to_value(conflict).ok(),
            Self::ConcurrentModification {
                heat,
                expected,
                actual,
            } => Some(serde_json::json!({
                "heat": heat,
                "expectedVersion": expected,
                "actualVersion": actual,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_pending_lists_lanes() {
        let lane = LaneId::new();
        let err = GatewayError::from(StateConflict::TimesPending {
            heat: 1,
            lanes: vec![lane],
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), 2104);
        let details = err.details().unwrap_or_default();
        assert_eq!(
            details.get("conflict").and_then(|v| v.as_str()),
            Some("times_pending")
        );
        assert_eq!(
            details
                .get("lanes")
                .and_then(|v| v.as_array())
                .map(Vec::len),
            Some(1)
        );
    }

    #[test]
    fn rejection_is_unprocessable() {
        let err = GatewayError::from(Rejection::AlreadyCompeted { heat: 1 });
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let details = err.details().unwrap_or_default();
        assert_eq!(
            details.get("reason").and_then(|v| v.as_str()),
            Some("already_competed")
        );
    }

    #[test]
    fn concurrent_modification_is_conflict() {
        let err = GatewayError::ConcurrentModification {
            heat: 2,
            expected: 3,
            actual: 4,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("expected version 3"));
    }
}
