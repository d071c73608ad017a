//! Reservation ledger rows (holds).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::seat::{SeatRequest, collapse_units, expand_units};
use super::{EventId, ReservationId, SeatId, UserId};

/// Default time-to-live of a hold.
pub const DEFAULT_HOLD_TTL: Duration = Duration::minutes(10);

/// A time-boxed claim on seat-units for one (event, user) pair.
///
/// `seat_units` holds one entry per reserved unit. The hold is live while
/// `expires_at > now`; expired holds count as gone even before the sweep
/// deletes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Ledger row identifier.
    pub id: ReservationId,
    /// Reserved event.
    pub event_id: EventId,
    /// Holder.
    pub user_id: UserId,
    /// Unit-level claims, one entry per unit.
    pub seat_units: Vec<SeatId>,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Provider checkout session bound to this hold, once created.
    pub checkout_session_id: Option<String>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Builds a new hold expanding `requests` into unit claims.
    #[must_use]
    pub fn new(
        event_id: EventId,
        user_id: UserId,
        requests: &[SeatRequest],
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            event_id,
            user_id,
            seat_units: expand_units(requests),
            expires_at: now + ttl,
            checkout_session_id: None,
            created_at: now,
        }
    }

    /// Returns `true` while the hold has not yet expired.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Number of units reserved on `seat_id`.
    #[must_use]
    pub fn units_on(&self, seat_id: SeatId) -> u32 {
        let count = self.seat_units.iter().filter(|s| **s == seat_id).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Per-seat quantities of this hold.
    #[must_use]
    pub fn requests(&self) -> Vec<SeatRequest> {
        collapse_units(&self.seat_units)
    }

    /// Returns `true` if this hold matches the given key.
    ///
    /// When the key names a checkout session, only a hold bound to that
    /// session matches, so a late webhook for an abandoned session cannot
    /// remove a newer hold of the same user.
    #[must_use]
    pub fn matches(&self, key: &HoldKey) -> bool {
        self.event_id == key.event_id
            && self.user_id == key.user_id
            && key
                .checkout_session_id
                .as_deref()
                .is_none_or(|sid| self.checkout_session_id.as_deref() == Some(sid))
    }
}

/// Addresses the hold(s) of one (event, user) pair, optionally narrowed
/// to a single checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldKey {
    /// Event.
    pub event_id: EventId,
    /// Holder.
    pub user_id: UserId,
    /// Checkout session the hold must be bound to, if any.
    pub checkout_session_id: Option<String>,
}

impl HoldKey {
    /// Key matching every hold of the pair.
    #[must_use]
    pub const fn pair(event_id: EventId, user_id: UserId) -> Self {
        Self {
            event_id,
            user_id,
            checkout_session_id: None,
        }
    }

    /// Narrows the key to one checkout session.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.checkout_session_id = Some(session_id.into());
        self
    }
}
