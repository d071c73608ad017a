//! Database row shapes and their conversion into domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Event, EventId, Reservation, ReservationId, Seat, SeatId, SeatPrice, Ticket, TicketId,
    TicketStatus, UserId,
};
use crate::error::GatewayError;

/// A stored row from the `ledger_events` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredLedgerEvent {
    /// Auto-increment row ID.
    pub id: i64,
    /// Event the entry concerns; `None` for sweeps.
    pub event_id: Option<Uuid>,
    /// Event type discriminator (e.g. `"hold_created"`).
    pub event_type: String,
    /// JSONB payload with event-specific data.
    pub payload: serde_json::Value,
    /// Server-side creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// `events` row: id, name, is_active, has_seat_map.
pub(crate) type EventRow = (Uuid, String, bool, bool);

/// `event_seats` row.
pub(crate) type SeatRow = (
    Uuid,
    Uuid,
    String,
    Option<String>,
    i32,
    i64,
    i64,
    Option<f64>,
    Option<f64>,
    Option<String>,
);

/// `reservations` row.
pub(crate) type ReservationRow = (
    Uuid,
    Uuid,
    Uuid,
    Vec<Uuid>,
    DateTime<Utc>,
    Option<String>,
    DateTime<Utc>,
);

/// `tickets` row.
pub(crate) type TicketRow = (
    Uuid,
    Uuid,
    Uuid,
    Option<Uuid>,
    i64,
    i64,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
);

pub(crate) fn event_from_row((id, name, is_active, has_seat_map): EventRow) -> Event {
    Event {
        id: EventId::from_uuid(id),
        name,
        is_active,
        has_seat_map,
    }
}

pub(crate) fn seat_from_row(row: SeatRow) -> Result<Seat, GatewayError> {
    let (id, event_id, name, seat_type, capacity, pln, eur, position_x, position_y, icon_url) = row;
    let capacity = u32::try_from(capacity)
        .map_err(|_| GatewayError::Store(format!("seat {id} has negative capacity")))?;
    Ok(Seat {
        id: SeatId::from_uuid(id),
        event_id: EventId::from_uuid(event_id),
        name,
        seat_type,
        capacity,
        price: SeatPrice {
            pln_minor: pln,
            eur_minor: eur,
        },
        position_x,
        position_y,
        icon_url,
    })
}

pub(crate) fn reservation_from_row(row: ReservationRow) -> Reservation {
    let (id, event_id, user_id, seat_ids, expires_at, checkout_session_id, created_at) = row;
    Reservation {
        id: ReservationId::from_uuid(id),
        event_id: EventId::from_uuid(event_id),
        user_id: UserId::from_uuid(user_id),
        seat_units: seat_ids.into_iter().map(SeatId::from_uuid).collect(),
        expires_at,
        checkout_session_id,
        created_at,
    }
}

pub(crate) fn ticket_from_row(row: TicketRow) -> Ticket {
    let (id, event_id, user_id, seat_id, pln, eur, qr_code, status, checkout_ref, key, purchased_at) =
        row;
    Ticket {
        id: TicketId::from_uuid(id),
        event_id: EventId::from_uuid(event_id),
        user_id: UserId::from_uuid(user_id),
        seat_id: seat_id.map(SeatId::from_uuid),
        price_paid: SeatPrice {
            pln_minor: pln,
            eur_minor: eur,
        },
        qr_code,
        status: TicketStatus::from_db(&status),
        checkout_ref,
        idempotency_key: key,
        purchased_at,
    }
}
