//! Persistence layer: the reservation ledger.
//!
//! [`InventoryStore`] is the only way services touch holds, tickets and
//! seat maps. Each mutating method is atomic with respect to the other
//! methods on the same event: hold creation and issuance re-check the
//! ledger under the event's lock, so concurrent callers cannot oversell.
//!
//! Two implementations exist: [`postgres::PostgresStore`] (row locks on
//! the `events` table) and [`memory::MemoryStore`] (one mutex over the
//! whole ledger, used in tests and when persistence is disabled).

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    EventId, HoldKey, InventorySnapshot, IssuanceBatch, IssuanceReport, LedgerEvent, Reservation,
    ReservationId, Seat, Ticket, UserId,
};
use crate::error::GatewayError;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Durable storage for the reservation ledger.
///
/// All instants are passed in by the caller so that expiry is evaluated
/// against one injected clock.
#[async_trait]
pub trait InventoryStore: Debug + Send + Sync {
    /// Reads the event, its seats, active ticket counts and live hold
    /// counts in one consistent view.
    ///
    /// # Errors
    ///
    /// [`GatewayError::EventNotFound`] for an unknown event,
    /// [`GatewayError::Store`] on storage failure.
    async fn inventory_snapshot(
        &self,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<InventorySnapshot, GatewayError>;

    /// Atomically inserts `hold` after re-checking, under the event's
    /// lock, that the holder has no live hold for the event and that every
    /// requested unit is still available.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ReservationConflict`],
    /// [`GatewayError::CapacityExceeded`], [`GatewayError::SeatNotFound`],
    /// [`GatewayError::EventNotFound`] or [`GatewayError::Store`].
    async fn create_hold(
        &self,
        hold: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError>;

    /// Binds a provider checkout session to an existing hold and keeps
    /// the hold live until `expires_at`, the instant the session stops
    /// accepting payment. An expiry earlier than the hold's own is ignored.
    ///
    /// Returns `false` when the hold no longer exists.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Store`] on storage failure.
    async fn attach_checkout_session(
        &self,
        reservation_id: ReservationId,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, GatewayError>;

    /// Deletes one hold by id. Returns `false` when it did not exist.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Store`] on storage failure.
    async fn delete_hold(&self, reservation_id: ReservationId) -> Result<bool, GatewayError>;

    /// Deletes every hold matching `key` and returns the deleted rows.
    /// Deleting nothing is not an error.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Store`] on storage failure.
    async fn delete_holds(&self, key: &HoldKey) -> Result<Vec<Reservation>, GatewayError>;

    /// Deletes every hold whose expiry is before `now` and returns the
    /// deleted rows.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Store`] on storage failure.
    async fn delete_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, GatewayError>;

    /// Inserts one ticket per purchased unit, skipping units whose
    /// idempotency key already exists. Seats are snapshotted once.
    ///
    /// # Errors
    ///
    /// [`GatewayError::EventNotFound`] or [`GatewayError::Store`].
    async fn issue_tickets(
        &self,
        batch: &IssuanceBatch,
        now: DateTime<Utc>,
    ) -> Result<IssuanceReport, GatewayError>;

    /// Replaces the event's seat map. Refused while the event has live
    /// holds or active tickets.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Validation`] when the map is in use,
    /// [`GatewayError::EventNotFound`] or [`GatewayError::Store`].
    async fn replace_seat_map(
        &self,
        event_id: EventId,
        seats: Vec<Seat>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Seat>, GatewayError>;

    /// Lists a user's tickets, newest first.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Store`] on storage failure.
    async fn tickets_for_user(&self, user_id: UserId) -> Result<Vec<Ticket>, GatewayError>;

    /// Appends a ledger event to the audit log, returning its row id.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Store`] on storage failure.
    async fn append_ledger_event(&self, event: &LedgerEvent) -> Result<i64, GatewayError>;
}

/// Error returned when a seat map cannot be replaced.
pub(crate) fn seat_map_in_use(event_id: EventId) -> GatewayError {
    GatewayError::Validation(format!(
        "seat map of event {event_id} has live holds or sold tickets"
    ))
}
