//! Ticket handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{TicketDto, TicketListResponse};
use crate::api::extractors::AuthenticatedUser;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /api/profile/tickets`: The caller's tickets.
///
/// # Errors
///
/// Returns [`GatewayError::Store`] when the ledger is unavailable.
#[utoipa::path(
    get,
    path = "/api/profile/tickets",
    tag = "Tickets",
    summary = "List my tickets",
    params(("X-User-Id" = String, Header, description = "Authenticated user id")),
    responses(
        (status = 200, description = "Tickets, newest first", body = TicketListResponse),
        (status = 401, description = "Missing user id", body = ErrorResponse),
    )
)]
pub async fn my_tickets(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, GatewayError> {
    let tickets = state.checkout.issuer().tickets_for_user(user_id).await?;
    Ok((
        StatusCode::OK,
        Json(TicketListResponse {
            tickets: tickets.into_iter().map(TicketDto::from).collect(),
        }),
    ))
}

/// Ticket routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/profile/tickets", get(my_tickets))
}
