//! Hold lifecycle: create, consume, release and sweep.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::availability::{self, SeatAvailability};
use crate::domain::seat::normalize_requests;
use crate::domain::{
    Clock, EventBus, EventId, HoldKey, InventorySnapshot, LedgerEvent, ReleaseReason, Reservation,
    ReservationId, Seat, SeatRequest, UserId,
};
use crate::error::GatewayError;
use crate::persistence::InventoryStore;

use super::with_timeout;

/// A freshly created hold together with the snapshot it was validated
/// against.
#[derive(Debug, Clone)]
pub struct PlacedHold {
    /// The stored hold.
    pub reservation: Reservation,
    /// Inventory as read before the hold was placed.
    pub snapshot: InventorySnapshot,
}

/// Orchestrates the reservation ledger.
///
/// Holds the store, the clock used for every expiry decision and the
/// [`EventBus`] used to announce ledger mutations.
#[derive(Debug, Clone)]
pub struct ReservationService {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    hold_ttl: chrono::Duration,
    store_timeout: Duration,
}

impl ReservationService {
    /// Creates a new `ReservationService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn InventoryStore>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        hold_ttl: chrono::Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            event_bus,
            hold_ttl,
            store_timeout,
        }
    }

    /// Returns the clock used for expiry decisions.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.store
    }

    /// Returns the configured upper bound for a store call.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Returns the event bus ledger events are published on.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Reads the current inventory of an event.
    ///
    /// # Errors
    ///
    /// [`GatewayError::EventNotFound`] or a retryable
    /// [`GatewayError::Store`].
    pub async fn snapshot(&self, event_id: EventId) -> Result<InventorySnapshot, GatewayError> {
        let now = self.clock.now();
        with_timeout(
            self.store_timeout,
            "inventory_snapshot",
            self.store.inventory_snapshot(event_id, now),
        )
        .await
    }

    /// Per-seat availability of an event, in seat-map order.
    ///
    /// # Errors
    ///
    /// [`GatewayError::EventNotFound`] or a retryable
    /// [`GatewayError::Store`].
    pub async fn availability(
        &self,
        event_id: EventId,
    ) -> Result<Vec<SeatAvailability>, GatewayError> {
        let snapshot = self.snapshot(event_id).await?;
        Ok(availability::derive(&snapshot))
    }

    /// Places a hold for `user_id` on the requested seats.
    ///
    /// Requests are validated and merged first, then checked against a
    /// fresh snapshot so obviously unavailable seats fail fast. The store
    /// repeats the check under the event lock before inserting.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Validation`] for an empty request, a zero quantity
    /// or an event that is not on sale; [`GatewayError::EventNotFound`],
    /// [`GatewayError::SeatNotFound`], [`GatewayError::CapacityExceeded`],
    /// [`GatewayError::ReservationConflict`] or [`GatewayError::Store`].
    pub async fn create_hold(
        &self,
        event_id: EventId,
        user_id: UserId,
        requests: &[SeatRequest],
    ) -> Result<PlacedHold, GatewayError> {
        let requests = normalize_requests(requests)?;
        let snapshot = self.snapshot(event_id).await?;
        if !snapshot.event.is_active {
            return Err(GatewayError::Validation(format!(
                "event {event_id} is not on sale"
            )));
        }
        availability::ensure_available(&availability::derive(&snapshot), &requests)?;

        let now = self.clock.now();
        let reservation = Reservation::new(event_id, user_id, &requests, self.hold_ttl, now);
        let inserted = with_timeout(
            self.store_timeout,
            "create_hold",
            self.store.create_hold(&reservation, now),
        )
        .await;
        if let Err(e) = inserted {
            if matches!(e, GatewayError::Store(_)) {
                self.discard(&reservation).await;
            }
            return Err(e);
        }

        let units = u32::try_from(reservation.seat_units.len()).unwrap_or(u32::MAX);
        let _ = self.event_bus.publish(LedgerEvent::HoldCreated {
            reservation_id: reservation.id,
            event_id,
            user_id,
            units,
            expires_at: reservation.expires_at,
            timestamp: now,
        });

        tracing::info!(
            %event_id,
            %user_id,
            reservation_id = %reservation.id,
            units,
            expires_at = %reservation.expires_at,
            "hold created"
        );
        Ok(PlacedHold {
            reservation,
            snapshot,
        })
    }

    /// Removes a hold whose insert may or may not have committed, so the
    /// buyer's retry is not refused as a conflicting hold.
    async fn discard(&self, reservation: &Reservation) {
        match with_timeout(
            self.store_timeout,
            "delete_hold",
            self.store.delete_hold(reservation.id),
        )
        .await
        {
            Ok(removed) => tracing::warn!(
                event_id = %reservation.event_id,
                reservation_id = %reservation.id,
                removed,
                "hold insert failed; discarded any partial write"
            ),
            Err(e) => tracing::error!(
                event_id = %reservation.event_id,
                reservation_id = %reservation.id,
                error = %e,
                "failed to discard hold after insert failure; it will lapse at expiry"
            ),
        }
    }

    /// Binds a provider session to a hold and keeps the hold live until
    /// the session stops accepting payment at `expires_at`.
    ///
    /// # Errors
    ///
    /// A retryable [`GatewayError::Store`].
    pub async fn attach_session(
        &self,
        reservation_id: ReservationId,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, GatewayError> {
        with_timeout(
            self.store_timeout,
            "attach_checkout_session",
            self.store
                .attach_checkout_session(reservation_id, session_id, expires_at),
        )
        .await
    }

    /// Consumes the hold(s) matching `key` after a successful payment.
    ///
    /// Best-effort: a missing hold is success and store failures are
    /// logged, never returned. Returns the number of holds removed.
    pub async fn consume(&self, key: &HoldKey) -> u32 {
        let removed = count(&self.delete(key, "consume").await);
        let _ = self.event_bus.publish(LedgerEvent::HoldConsumed {
            event_id: key.event_id,
            user_id: key.user_id,
            removed,
            timestamp: self.clock.now(),
        });
        tracing::info!(
            event_id = %key.event_id,
            user_id = %key.user_id,
            removed,
            "hold consumed"
        );
        removed
    }

    /// Releases the hold(s) matching `key` without a sale and returns the
    /// removed rows.
    ///
    /// Same mechanics and guarantees as [`Self::consume`].
    pub async fn release(&self, key: &HoldKey, reason: ReleaseReason) -> Vec<Reservation> {
        let released = self.delete(key, "release").await;
        let removed = count(&released);
        let _ = self.event_bus.publish(LedgerEvent::HoldReleased {
            event_id: key.event_id,
            user_id: key.user_id,
            reason,
            removed,
            timestamp: self.clock.now(),
        });
        tracing::info!(
            event_id = %key.event_id,
            user_id = %key.user_id,
            ?reason,
            removed,
            "hold released"
        );
        released
    }

    async fn delete(&self, key: &HoldKey, op: &'static str) -> Vec<Reservation> {
        match with_timeout(self.store_timeout, op, self.store.delete_holds(key)).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    event_id = %key.event_id,
                    user_id = %key.user_id,
                    error = %e,
                    "failed to {op} hold; it will lapse at expiry"
                );
                Vec::new()
            }
        }
    }

    /// Replaces the seat map of an event.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Validation`] for an empty map, a blank seat name,
    /// a negative price, a duplicated seat id, or a map that still has
    /// live holds or active tickets; [`GatewayError::EventNotFound`] or
    /// [`GatewayError::Store`].
    pub async fn replace_seat_map(
        &self,
        event_id: EventId,
        seats: Vec<Seat>,
    ) -> Result<Vec<Seat>, GatewayError> {
        validate_seat_map(&seats)?;
        let seats: Vec<Seat> = seats
            .into_iter()
            .map(|seat| Seat { event_id, ..seat })
            .collect();

        let now = self.clock.now();
        let stored = with_timeout(
            self.store_timeout,
            "replace_seat_map",
            self.store.replace_seat_map(event_id, seats, now),
        )
        .await?;

        let total_capacity: u64 = stored.iter().map(|s| u64::from(s.capacity)).sum();
        let count = u32::try_from(stored.len()).unwrap_or(u32::MAX);
        let _ = self.event_bus.publish(LedgerEvent::SeatMapReplaced {
            event_id,
            seats: count,
            total_capacity,
            timestamp: now,
        });
        tracing::info!(%event_id, seats = count, total_capacity, "seat map replaced");
        Ok(stored)
    }

    /// Deletes every hold that expired before now and returns the deleted
    /// rows.
    ///
    /// # Errors
    ///
    /// A retryable [`GatewayError::Store`].
    pub async fn sweep(&self) -> Result<Vec<Reservation>, GatewayError> {
        let now = self.clock.now();
        let swept = with_timeout(
            self.store_timeout,
            "delete_expired_holds",
            self.store.delete_expired_holds(now),
        )
        .await?;

        let removed = count(&swept);
        let _ = self.event_bus.publish(LedgerEvent::HoldsSwept {
            removed,
            timestamp: now,
        });
        Ok(swept)
    }
}

fn count(holds: &[Reservation]) -> u32 {
    u32::try_from(holds.len()).unwrap_or(u32::MAX)
}

fn validate_seat_map(seats: &[Seat]) -> Result<(), GatewayError> {
    if seats.is_empty() {
        return Err(GatewayError::Validation("seat map has no seats".to_string()));
    }
    let mut ids = HashSet::new();
    for seat in seats {
        if seat.name.trim().is_empty() {
            return Err(GatewayError::Validation(format!("seat {} has no name", seat.id)));
        }
        if seat.price.pln_minor < 0 || seat.price.eur_minor < 0 {
            return Err(GatewayError::Validation(format!(
                "seat {} has a negative price",
                seat.id
            )));
        }
        if !ids.insert(seat.id) {
            return Err(GatewayError::Validation(format!("seat {} appears twice", seat.id)));
        }
    }
    Ok(())
}
