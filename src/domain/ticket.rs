//! Issued tickets and their scannable codes.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use super::seat::{Seat, SeatPrice, SeatRequest};
use super::{EventId, SeatId, TicketId, UserId};

/// Length of the random part of a ticket code.
const TICKET_CODE_LEN: usize = 24;

/// Ticket lifecycle status. Only `Active` tickets occupy capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Valid ticket.
    Active,
    /// Refunded; no longer occupies a seat-unit.
    Refunded,
    /// Voided by an operator.
    Void,
}

impl TicketStatus {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Refunded => "refunded",
            Self::Void => "void",
        }
    }

    /// Parses the database representation; unknown values map to `Void`.
    #[must_use]
    pub fn from_db(value: &str) -> Self {
        match value {
            "active" => Self::Active,
            "refunded" => Self::Refunded,
            _ => Self::Void,
        }
    }
}

/// A permanent record of one sold seat-unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket identifier.
    pub id: TicketId,
    /// Event.
    pub event_id: EventId,
    /// Owner.
    pub user_id: UserId,
    /// Seat; `None` for general admission.
    pub seat_id: Option<SeatId>,
    /// Price paid, snapshotted from the seat at issuance.
    pub price_paid: SeatPrice,
    /// Random scannable code.
    pub qr_code: String,
    /// Status.
    pub status: TicketStatus,
    /// Checkout that paid for this ticket.
    pub checkout_ref: String,
    /// Stable per-unit key; a second insert with the same key is a no-op.
    pub idempotency_key: String,
    /// Purchase instant.
    pub purchased_at: DateTime<Utc>,
}

impl Ticket {
    /// Builds the ticket for unit `unit_index` of `seat` within `batch`,
    /// pricing it from the seat snapshot.
    #[must_use]
    pub fn issue(batch: &IssuanceBatch, seat: &Seat, unit_index: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: TicketId::new(),
            event_id: batch.event_id,
            user_id: batch.user_id,
            seat_id: Some(seat.id),
            price_paid: seat.price,
            qr_code: generate_ticket_code(),
            status: TicketStatus::Active,
            checkout_ref: batch.checkout_ref.clone(),
            idempotency_key: idempotency_key(&batch.checkout_ref, seat.id, unit_index),
            purchased_at: now,
        }
    }
}

/// Generates a fresh, unpredictable ticket code (`TKT-` + 24 alphanumerics).
#[must_use]
pub fn generate_ticket_code() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TICKET_CODE_LEN)
        .map(char::from)
        .collect();
    format!("TKT-{suffix}")
}

/// Deterministic key for unit `unit_index` of `seat_id` within one checkout.
#[must_use]
pub fn idempotency_key(checkout_ref: &str, seat_id: SeatId, unit_index: u32) -> String {
    format!("{checkout_ref}:{seat_id}:{unit_index}")
}

/// A confirmed payment to turn into tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceBatch {
    /// Event.
    pub event_id: EventId,
    /// Buyer.
    pub user_id: UserId,
    /// Provider checkout reference (session id).
    pub checkout_ref: String,
    /// Purchased seats.
    pub items: Vec<SeatRequest>,
}

/// Outcome of processing an [`IssuanceBatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssuanceReport {
    /// Tickets created by this call.
    pub issued: Vec<Ticket>,
    /// Units that already had a ticket from an earlier delivery.
    pub already_issued: u32,
    /// Purchased seats no longer present on the seat map.
    pub missing_seats: Vec<SeatId>,
}

impl IssuanceReport {
    /// Number of tickets created by this call.
    #[must_use]
    pub fn issued_count(&self) -> u32 {
        u32::try_from(self.issued.len()).unwrap_or(u32::MAX)
    }
}

impl fmt::Display for IssuanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "issued={} already_issued={} missing_seats={}",
            self.issued.len(),
            self.already_issued,
            self.missing_seats.len()
        )
    }
}
