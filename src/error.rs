//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{EventId, SeatId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2101,
///     "message": "capacity exceeded for seat ...: requested 2, available 1",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see ranges on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category             | HTTP Status                      |
/// |-----------|----------------------|----------------------------------|
/// | 1000–1999 | Validation / auth    | 400 / 401                        |
/// | 2000–2999 | Not found / conflict | 404 / 409 / 422                  |
/// | 3000–3999 | Server / upstream    | 500 / 502 / 503                  |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed (missing or malformed fields).
    #[error("invalid request: {0}")]
    Validation(String),

    /// No authenticated user on the request.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Webhook signature verification failed.
    #[error("webhook signature rejected: {0}")]
    Signature(String),

    /// Event with the given ID was not found.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// Seat is not on the event's seat map.
    #[error("seat not found: {0}")]
    SeatNotFound(SeatId),

    /// The user already holds a live reservation for this event.
    #[error("a reservation for event {event_id} is already in progress")]
    ReservationConflict {
        /// Event with the live hold.
        event_id: EventId,
    },

    /// Requested quantity exceeds availability.
    #[error("capacity exceeded for seat {seat_id}: requested {requested}, available {available}")]
    CapacityExceeded {
        /// Seat.
        seat_id: SeatId,
        /// Units requested.
        requested: u32,
        /// Units available at check time.
        available: u32,
    },

    /// Payment provider call failed or timed out.
    #[error("payment provider error: {0}")]
    Provider(String),

    /// Durable store operation failed or timed out.
    #[error("store error: {0}")]
    Store(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::Signature(_) => 1002,
            Self::Unauthorized(_) => 1003,
            Self::EventNotFound(_) => 2001,
            Self::SeatNotFound(_) => 2002,
            Self::ReservationConflict { .. } => 2100,
            Self::CapacityExceeded { .. } => 2101,
            Self::Internal(_) => 3000,
            Self::Store(_) => 3001,
            Self::Provider(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Signature(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::EventNotFound(_) | Self::SeatNotFound(_) => StatusCode::NOT_FOUND,
            Self::ReservationConflict { .. } => StatusCode::CONFLICT,
            Self::CapacityExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` when retrying the same call later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::Store(_))
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
