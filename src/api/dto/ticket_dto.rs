//! Ticket DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{EventId, SeatId, Ticket, TicketId};

/// A ticket as shown to its owner.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TicketDto {
    /// Ticket id.
    pub id: TicketId,
    /// Event.
    pub event_id: EventId,
    /// Seat, if the event has a seat map.
    pub seat_id: Option<SeatId>,
    /// Price paid in PLN minor units.
    pub price_paid_pln: i64,
    /// Price paid in EUR minor units.
    pub price_paid_eur: i64,
    /// Scannable code.
    pub qr_code: String,
    /// `active`, `refunded` or `void`.
    pub status: String,
    /// Purchase instant.
    pub purchased_at: DateTime<Utc>,
}

impl From<Ticket> for TicketDto {
    fn from(t: Ticket) -> Self {
        Self {
            id: t.id,
            event_id: t.event_id,
            seat_id: t.seat_id,
            price_paid_pln: t.price_paid.pln_minor,
            price_paid_eur: t.price_paid.eur_minor,
            qr_code: t.qr_code,
            status: t.status.as_str().to_string(),
            purchased_at: t.purchased_at,
        }
    }
}

/// Response body for `GET /api/profile/tickets`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TicketListResponse {
    /// The caller's tickets, newest first.
    pub tickets: Vec<TicketDto>,
}
