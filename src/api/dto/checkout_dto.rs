//! Checkout and webhook DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{EventId, SeatRequest};

/// Request body for `POST /api/payment/create`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Event to buy seats for.
    pub event_id: EventId,
    /// Seats and quantities.
    pub seats: Vec<SeatRequest>,
}

/// Response body for `POST /api/payment/create`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    /// Hosted checkout URL to redirect the buyer to.
    pub url: String,
    /// Provider session id.
    pub session_id: String,
}

/// Acknowledgement returned for every accepted webhook delivery.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookAck {
    /// Always `true`.
    pub received: bool,
}
