//! Availability derivation.
//!
//! Availability is never stored. It is always recomputed as
//! `max(0, capacity - active tickets - live hold units)` from an
//! [`InventorySnapshot`] read out of the ledger.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::seat::{Seat, SeatRequest};
use super::ticket::{Ticket, TicketStatus};
use super::{Event, Reservation, SeatId};
use crate::error::GatewayError;

/// The three authoritative sources for one event, read at one instant.
#[derive(Debug, Clone)]
pub struct InventorySnapshot {
    /// The event.
    pub event: Event,
    /// Every seat of the event.
    pub seats: Vec<Seat>,
    /// Active ticket count per seat.
    pub sold: HashMap<SeatId, u32>,
    /// Unexpired hold units per seat.
    pub held: HashMap<SeatId, u32>,
}

impl InventorySnapshot {
    /// Builds a snapshot from raw ledger rows, dropping expired holds and
    /// non-active tickets.
    #[must_use]
    pub fn from_ledger<'a>(
        event: Event,
        seats: Vec<Seat>,
        holds: impl IntoIterator<Item = &'a Reservation>,
        tickets: impl IntoIterator<Item = &'a Ticket>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut held: HashMap<SeatId, u32> = HashMap::new();
        for hold in holds
            .into_iter()
            .filter(|h| h.event_id == event.id && h.is_live(now))
        {
            for seat_id in &hold.seat_units {
                *held.entry(*seat_id).or_insert(0) += 1;
            }
        }

        let mut sold: HashMap<SeatId, u32> = HashMap::new();
        for ticket in tickets
            .into_iter()
            .filter(|t| t.event_id == event.id && t.status == TicketStatus::Active)
        {
            if let Some(seat_id) = ticket.seat_id {
                *sold.entry(seat_id).or_insert(0) += 1;
            }
        }

        Self {
            event,
            seats,
            sold,
            held,
        }
    }

    /// Looks up a seat by id.
    #[must_use]
    pub fn seat(&self, seat_id: SeatId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.id == seat_id)
    }
}

/// Derived availability of one seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatAvailability {
    /// Seat.
    pub seat_id: SeatId,
    /// Display name.
    pub name: String,
    /// Total units.
    pub capacity: u32,
    /// Active tickets.
    pub sold: u32,
    /// Live hold units.
    pub held: u32,
    /// Units that can still be reserved.
    pub available: u32,
}

/// Computes per-seat availability, in seat-map order.
#[must_use]
pub fn derive(snapshot: &InventorySnapshot) -> Vec<SeatAvailability> {
    snapshot
        .seats
        .iter()
        .map(|seat| {
            let sold = snapshot.sold.get(&seat.id).copied().unwrap_or(0);
            let held = snapshot.held.get(&seat.id).copied().unwrap_or(0);
            SeatAvailability {
                seat_id: seat.id,
                name: seat.name.clone(),
                capacity: seat.capacity,
                sold,
                held,
                available: seat.capacity.saturating_sub(sold).saturating_sub(held),
            }
        })
        .collect()
}

/// Checks that every request fits into current availability.
///
/// # Errors
///
/// Returns [`GatewayError::SeatNotFound`] when a seat is not on the
/// event's seat map and [`GatewayError::CapacityExceeded`] when a
/// quantity is larger than what is available.
pub fn ensure_available(
    availability: &[SeatAvailability],
    requests: &[SeatRequest],
) -> Result<(), GatewayError> {
    for req in requests {
        let seat = availability
            .iter()
            .find(|a| a.seat_id == req.seat_id)
            .ok_or(GatewayError::SeatNotFound(req.seat_id))?;
        if req.quantity > seat.available {
            return Err(GatewayError::CapacityExceeded {
                seat_id: req.seat_id,
                requested: req.quantity,
                available: seat.available,
            });
        }
    }
    Ok(())
}
