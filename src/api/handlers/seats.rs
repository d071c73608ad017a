//! Seat map handlers: availability and replacement.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::api::dto::{
    AvailableSeatsResponse, ReplaceSeatMapRequest, SeatAvailabilityDto, SeatDto, SeatMapResponse,
};
use crate::api::extractors::AuthenticatedUser;
use crate::app_state::AppState;
use crate::domain::EventId;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /api/events/{id}/available-seats`: Per-seat availability.
///
/// # Errors
///
/// Returns [`GatewayError::EventNotFound`] for an unknown event.
#[utoipa::path(
    get,
    path = "/api/events/{id}/available-seats",
    tag = "Seats",
    summary = "Seat availability",
    description = "Capacity minus active tickets minus live holds, per seat.",
    params(("id" = EventId, Path, description = "Event id")),
    responses(
        (status = 200, description = "Availability", body = AvailableSeatsResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn available_seats(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<impl IntoResponse, GatewayError> {
    let seats = state.reservations.availability(event_id).await?;
    Ok((
        StatusCode::OK,
        Json(AvailableSeatsResponse {
            event_id,
            seats: seats.into_iter().map(SeatAvailabilityDto::from).collect(),
        }),
    ))
}

/// `PUT /api/events/{id}/seats`: Replace an event's seat map.
///
/// # Errors
///
/// Returns [`GatewayError::Validation`] for an invalid map or one still
/// in use, and [`GatewayError::EventNotFound`] for an unknown event.
#[utoipa::path(
    put,
    path = "/api/events/{id}/seats",
    tag = "Seats",
    summary = "Replace seat map",
    description = "Replaces every seat of the event. Refused while live holds or active tickets exist.",
    request_body = ReplaceSeatMapRequest,
    params(
        ("id" = EventId, Path, description = "Event id"),
        ("X-User-Id" = String, Header, description = "Authenticated user id"),
    ),
    responses(
        (status = 200, description = "Seat map stored", body = SeatMapResponse),
        (status = 400, description = "Invalid or in-use seat map", body = ErrorResponse),
        (status = 401, description = "Missing user id", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn replace_seat_map(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(event_id): Path<EventId>,
    Json(req): Json<ReplaceSeatMapRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let seats = req
        .seats
        .into_iter()
        .map(|dto| dto.into_seat(event_id))
        .collect();
    let stored = state
        .reservations
        .replace_seat_map(event_id, seats)
        .await?;
    tracing::info!(%event_id, %user_id, "seat map replaced via api");

    let total_capacity = stored.iter().map(|s| u64::from(s.capacity)).sum();
    Ok((
        StatusCode::OK,
        Json(SeatMapResponse {
            event_id,
            seats: stored.into_iter().map(SeatDto::from).collect(),
            total_capacity,
        }),
    ))
}

/// Seat routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events/{id}/available-seats", get(available_seats))
        .route("/events/{id}/seats", put(replace_seat_map))
}
