//! Checkout handlers: session creation and the provider webhook.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{CreatePaymentRequest, CreatePaymentResponse, WebhookAck};
use crate::api::extractors::AuthenticatedUser;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::provider::signature::SIGNATURE_HEADER;

/// `POST /api/payment/create`: Hold seats and open a checkout session.
///
/// # Errors
///
/// Returns [`GatewayError`] when the hold cannot be placed or the
/// provider rejects the session.
#[utoipa::path(
    post,
    path = "/api/payment/create",
    tag = "Payment",
    summary = "Create a checkout session",
    description = "Places a time-limited hold on the requested seats for the caller and returns the hosted checkout URL.",
    request_body = CreatePaymentRequest,
    params(("X-User-Id" = String, Header, description = "Authenticated user id")),
    responses(
        (status = 200, description = "Checkout session created", body = CreatePaymentResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Missing user id", body = ErrorResponse),
        (status = 404, description = "Unknown event or seat", body = ErrorResponse),
        (status = 409, description = "Caller already holds seats for this event", body = ErrorResponse),
        (status = 422, description = "Not enough seats available", body = ErrorResponse),
        (status = 502, description = "Payment provider failure", body = ErrorResponse),
    )
)]
pub async fn create_payment(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let session = state
        .checkout
        .create_checkout(req.event_id, user_id, &req.seats)
        .await?;
    Ok((
        StatusCode::OK,
        Json(CreatePaymentResponse {
            url: session.url,
            session_id: session.id,
        }),
    ))
}

/// `POST /api/payment/webhook`: Provider event delivery.
///
/// The body is taken raw; the signature covers the exact bytes.
///
/// # Errors
///
/// Returns [`GatewayError::Signature`] for a missing or invalid
/// signature, [`GatewayError::Validation`] for an unusable payload and a
/// 5xx error when tickets could not be issued.
#[utoipa::path(
    post,
    path = "/api/payment/webhook",
    tag = "Payment",
    summary = "Payment provider webhook",
    description = "Verifies the provider signature and applies the event. Unknown event types are acknowledged and ignored.",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Bad signature or payload", body = ErrorResponse),
        (status = 503, description = "Tickets could not be issued; retry", body = ErrorResponse),
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = state.checkout.handle_webhook(&body, signature).await?;
    tracing::debug!(?outcome, "webhook handled");
    Ok((StatusCode::OK, Json(WebhookAck { received: true })))
}

/// Payment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payment/create", post(create_payment))
        .route("/payment/webhook", post(payment_webhook))
}
