//! Domain events reflecting ledger mutations.
//!
//! Every hold and ticket mutation emits a [`LedgerEvent`] through the
//! [`super::EventBus`]. Events are appended to the audit log when it is
//! enabled; this is where consuming and releasing a hold, mechanically
//! the same delete, keep their different meaning.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::checkout::CheckoutState;
use super::{EventId, ReservationId, UserId};

/// Why a hold was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// The payment definitively failed.
    PaymentFailed,
    /// The provider session expired.
    SessionExpired,
    /// Creating the provider session failed after the hold was placed.
    CheckoutAborted,
}

/// Domain event emitted after every ledger mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A hold was placed.
    HoldCreated {
        /// Ledger row.
        reservation_id: ReservationId,
        /// Event.
        event_id: EventId,
        /// Holder.
        user_id: UserId,
        /// Number of units claimed.
        units: u32,
        /// Expiry instant.
        expires_at: DateTime<Utc>,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A hold was consumed after a successful payment.
    HoldConsumed {
        /// Event.
        event_id: EventId,
        /// Holder.
        user_id: UserId,
        /// Rows deleted (0 when the hold was already gone).
        removed: u32,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A hold was released without a sale.
    HoldReleased {
        /// Event.
        event_id: EventId,
        /// Holder.
        user_id: UserId,
        /// Trigger.
        reason: ReleaseReason,
        /// Rows deleted (0 when the hold was already gone).
        removed: u32,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The periodic sweep purged expired holds.
    HoldsSwept {
        /// Rows deleted.
        removed: u32,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Tickets were issued for a confirmed payment.
    TicketsIssued {
        /// Event.
        event_id: EventId,
        /// Buyer.
        user_id: UserId,
        /// Provider checkout reference.
        checkout_ref: String,
        /// Newly created tickets.
        issued: u32,
        /// Units already covered by an earlier delivery.
        already_issued: u32,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A checkout moved between states.
    CheckoutTransition {
        /// Event.
        event_id: EventId,
        /// Buyer.
        user_id: UserId,
        /// Provider event type that caused the transition.
        provider_event: String,
        /// State before.
        from: CheckoutState,
        /// State after.
        to: CheckoutState,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An event's seat map was replaced.
    SeatMapReplaced {
        /// Event.
        event_id: EventId,
        /// Number of seats on the new map.
        seats: u32,
        /// Sum of seat capacities.
        total_capacity: u64,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Returns the event id this ledger event concerns, if any.
    #[must_use]
    pub const fn event_id(&self) -> Option<EventId> {
        match self {
            Self::HoldCreated { event_id, .. }
            | Self::HoldConsumed { event_id, .. }
            | Self::HoldReleased { event_id, .. }
            | Self::TicketsIssued { event_id, .. }
            | Self::CheckoutTransition { event_id, .. }
            | Self::SeatMapReplaced { event_id, .. } => Some(*event_id),
            Self::HoldsSwept { .. } => None,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::HoldCreated { .. } => "hold_created",
            Self::HoldConsumed { .. } => "hold_consumed",
            Self::HoldReleased { .. } => "hold_released",
            Self::HoldsSwept { .. } => "holds_swept",
            Self::TicketsIssued { .. } => "tickets_issued",
            Self::CheckoutTransition { .. } => "checkout_transition",
            Self::SeatMapReplaced { .. } => "seat_map_replaced",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_event_serializes_reason() {
        let event = LedgerEvent::HoldReleased {
            event_id: EventId::new(),
            user_id: UserId::new(),
            reason: ReleaseReason::SessionExpired,
            removed: 1,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"hold_released\""));
        assert!(json.contains("session_expired"));
    }

    #[test]
    fn sweep_has_no_event_id() {
        let event = LedgerEvent::HoldsSwept {
            removed: 3,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_id(), None);
        assert_eq!(event.event_type_str(), "holds_swept");
    }
}
