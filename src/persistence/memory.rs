//! In-memory ledger used in tests and when persistence is disabled.
//!
//! The whole ledger sits behind a single [`tokio::sync::Mutex`], so every
//! trait method observes and mutates a consistent state. That gives the
//! same per-event atomicity the PostgreSQL store gets from row locks.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::models::StoredLedgerEvent;
use super::{InventoryStore, seat_map_in_use};
use crate::domain::availability::{self, InventorySnapshot};
use crate::domain::{
    Event, EventId, HoldKey, IssuanceBatch, IssuanceReport, LedgerEvent, Reservation,
    ReservationId, Seat, Ticket, TicketStatus, UserId,
};
use crate::error::GatewayError;

#[derive(Debug, Default)]
struct Ledger {
    events: HashMap<EventId, Event>,
    seats: HashMap<EventId, Vec<Seat>>,
    holds: Vec<Reservation>,
    tickets: Vec<Ticket>,
    issued_keys: HashSet<String>,
    audit: Vec<StoredLedgerEvent>,
}

impl Ledger {
    fn event(&self, event_id: EventId) -> Result<&Event, GatewayError> {
        self.events
            .get(&event_id)
            .ok_or(GatewayError::EventNotFound(event_id))
    }

    fn snapshot(&self, event_id: EventId, now: DateTime<Utc>) -> Result<InventorySnapshot, GatewayError> {
        let event = self.event(event_id)?.clone();
        let seats = self.seats.get(&event_id).cloned().unwrap_or_default();
        Ok(InventorySnapshot::from_ledger(
            event,
            seats,
            &self.holds,
            &self.tickets,
            now,
        ))
    }

    fn drain_holds(&mut self, mut pred: impl FnMut(&Reservation) -> bool) -> Vec<Reservation> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.holds).into_iter().partition(|h| pred(h));
        self.holds = kept;
        removed
    }
}

/// Ledger kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ledger: Mutex<Ledger>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an event together with its seat map, replacing any
    /// previous entry.
    pub async fn insert_event(&self, event: Event, seats: Vec<Seat>) {
        let mut ledger = self.ledger.lock().await;
        ledger.seats.insert(event.id, seats);
        ledger.events.insert(event.id, event);
    }

    /// Returns every hold currently stored, expired or not.
    pub async fn holds(&self) -> Vec<Reservation> {
        self.ledger.lock().await.holds.clone()
    }

    /// Returns the audit log in append order.
    pub async fn audit_log(&self) -> Vec<StoredLedgerEvent> {
        self.ledger.lock().await.audit.clone()
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn inventory_snapshot(
        &self,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<InventorySnapshot, GatewayError> {
        self.ledger.lock().await.snapshot(event_id, now)
    }

    async fn create_hold(&self, hold: &Reservation, now: DateTime<Utc>) -> Result<(), GatewayError> {
        let mut ledger = self.ledger.lock().await;
        let snapshot = ledger.snapshot(hold.event_id, now)?;

        let pair = HoldKey::pair(hold.event_id, hold.user_id);
        if ledger.holds.iter().any(|h| h.matches(&pair) && h.is_live(now)) {
            return Err(GatewayError::ReservationConflict {
                event_id: hold.event_id,
            });
        }

        availability::ensure_available(&availability::derive(&snapshot), &hold.requests())?;
        ledger.holds.push(hold.clone());
        Ok(())
    }

    async fn attach_checkout_session(
        &self,
        reservation_id: ReservationId,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, GatewayError> {
        let mut ledger = self.ledger.lock().await;
        let Some(hold) = ledger.holds.iter_mut().find(|h| h.id == reservation_id) else {
            return Ok(false);
        };
        hold.checkout_session_id = Some(session_id.to_string());
        hold.expires_at = hold.expires_at.max(expires_at);
        Ok(true)
    }

    async fn delete_hold(&self, reservation_id: ReservationId) -> Result<bool, GatewayError> {
        let removed = self
            .ledger
            .lock()
            .await
            .drain_holds(|h| h.id == reservation_id);
        Ok(!removed.is_empty())
    }

    async fn delete_holds(&self, key: &HoldKey) -> Result<Vec<Reservation>, GatewayError> {
        Ok(self.ledger.lock().await.drain_holds(|h| h.matches(key)))
    }

    async fn delete_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, GatewayError> {
        Ok(self.ledger.lock().await.drain_holds(|h| h.expires_at < now))
    }

    async fn issue_tickets(
        &self,
        batch: &IssuanceBatch,
        now: DateTime<Utc>,
    ) -> Result<IssuanceReport, GatewayError> {
        let mut ledger = self.ledger.lock().await;
        ledger.event(batch.event_id)?;
        let seats = ledger.seats.get(&batch.event_id).cloned().unwrap_or_default();

        let mut report = IssuanceReport::default();
        for item in &batch.items {
            let Some(seat) = seats.iter().find(|s| s.id == item.seat_id) else {
                report.missing_seats.push(item.seat_id);
                continue;
            };
            for unit in 0..item.quantity {
                let ticket = Ticket::issue(batch, seat, unit, now);
                if ledger.issued_keys.insert(ticket.idempotency_key.clone()) {
                    ledger.tickets.push(ticket.clone());
                    report.issued.push(ticket);
                } else {
                    report.already_issued += 1;
                }
            }
        }
        Ok(report)
    }

    async fn replace_seat_map(
        &self,
        event_id: EventId,
        seats: Vec<Seat>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Seat>, GatewayError> {
        let mut ledger = self.ledger.lock().await;
        ledger.event(event_id)?;

        let held = ledger
            .holds
            .iter()
            .any(|h| h.event_id == event_id && h.is_live(now));
        let sold = ledger
            .tickets
            .iter()
            .any(|t| t.event_id == event_id && t.status == TicketStatus::Active);
        if held || sold {
            return Err(seat_map_in_use(event_id));
        }

        ledger.seats.insert(event_id, seats.clone());
        Ok(seats)
    }

    async fn tickets_for_user(&self, user_id: UserId) -> Result<Vec<Ticket>, GatewayError> {
        let ledger = self.ledger.lock().await;
        let mut tickets: Vec<Ticket> = ledger
            .tickets
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        Ok(tickets)
    }

    async fn append_ledger_event(&self, event: &LedgerEvent) -> Result<i64, GatewayError> {
        let payload = serde_json::to_value(event)
            .map_err(|e| GatewayError::Internal(format!("encode ledger event: {e}")))?;
        let mut ledger = self.ledger.lock().await;
        let id = i64::try_from(ledger.audit.len()).unwrap_or(i64::MAX).saturating_add(1);
        ledger.audit.push(StoredLedgerEvent {
            id,
            event_id: event.event_id().map(|e| *e.as_uuid()),
            event_type: event.event_type_str().to_string(),
            payload,
            created_at: Utc::now(),
        });
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::reservation::DEFAULT_HOLD_TTL;
    use crate::domain::{SeatPrice, SeatRequest};
    use chrono::Duration;

    async fn seeded(capacity: u32) -> (MemoryStore, Event, Seat) {
        let store = MemoryStore::new();
        let event = Event::new(EventId::new(), "Gala");
        let seat = Seat::new(event.id, "A1", capacity, SeatPrice::default());
        store.insert_event(event.clone(), vec![seat.clone()]).await;
        (store, event, seat)
    }

    fn hold(event: &Event, seat: &Seat, qty: u32, now: DateTime<Utc>) -> Reservation {
        Reservation::new(
            event.id,
            UserId::new(),
            &[SeatRequest::new(seat.id, qty)],
            DEFAULT_HOLD_TTL,
            now,
        )
    }

    #[tokio::test]
    async fn snapshot_of_unknown_event_is_not_found() {
        let store = MemoryStore::new();
        let result = store.inventory_snapshot(EventId::new(), Utc::now()).await;
        assert!(matches!(result, Err(GatewayError::EventNotFound(_))));
    }

    #[tokio::test]
    async fn create_hold_rejects_second_live_hold_of_pair() {
        let (store, event, seat) = seeded(5).await;
        let now = Utc::now();
        let first = hold(&event, &seat, 1, now);
        let Ok(()) = store.create_hold(&first, now).await else {
            panic!("first hold succeeds");
        };

        let mut second = hold(&event, &seat, 1, now);
        second.user_id = first.user_id;
        let result = store.create_hold(&second, now).await;
        assert!(matches!(result, Err(GatewayError::ReservationConflict { .. })));
    }

    #[tokio::test]
    async fn expired_hold_does_not_block_new_hold() {
        let (store, event, seat) = seeded(1).await;
        let start = Utc::now();
        let first = hold(&event, &seat, 1, start);
        let Ok(()) = store.create_hold(&first, start).await else {
            panic!("first hold succeeds");
        };

        let later = start + DEFAULT_HOLD_TTL + Duration::seconds(1);
        let mut again = hold(&event, &seat, 1, later);
        again.user_id = first.user_id;
        assert!(store.create_hold(&again, later).await.is_ok());
    }

    #[tokio::test]
    async fn attached_session_keeps_hold_live_until_session_expiry() {
        let (store, event, seat) = seeded(1).await;
        let start = Utc::now();
        let held = hold(&event, &seat, 1, start);
        let Ok(()) = store.create_hold(&held, start).await else {
            panic!("hold succeeds");
        };
        let session_end = start + Duration::minutes(31);
        let Ok(true) = store.attach_checkout_session(held.id, "cs_1", session_end).await else {
            panic!("session attached");
        };

        let after_ttl = start + DEFAULT_HOLD_TTL + Duration::seconds(1);
        let other = hold(&event, &seat, 1, after_ttl);
        assert!(matches!(
            store.create_hold(&other, after_ttl).await,
            Err(GatewayError::CapacityExceeded { .. })
        ));
        let Ok(swept) = store.delete_expired_holds(after_ttl).await else {
            panic!("sweep succeeds");
        };
        assert!(swept.is_empty());
    }

    #[tokio::test]
    async fn attach_never_shortens_hold() {
        let (store, event, seat) = seeded(1).await;
        let start = Utc::now();
        let held = hold(&event, &seat, 1, start);
        let Ok(()) = store.create_hold(&held, start).await else {
            panic!("hold succeeds");
        };
        let Ok(true) = store.attach_checkout_session(held.id, "cs_1", start).await else {
            panic!("session attached");
        };
        assert_eq!(
            store.holds().await.first().map(|h| h.expires_at),
            Some(held.expires_at)
        );
    }

    #[tokio::test]
    async fn delete_hold_removes_only_that_hold() {
        let (store, event, seat) = seeded(5).await;
        let now = Utc::now();
        let first = hold(&event, &seat, 1, now);
        let second = hold(&event, &seat, 1, now);
        for h in [&first, &second] {
            let Ok(()) = store.create_hold(h, now).await else {
                panic!("hold succeeds");
            };
        }
        assert!(matches!(store.delete_hold(first.id).await, Ok(true)));
        assert!(matches!(store.delete_hold(first.id).await, Ok(false)));
        assert_eq!(store.holds().await.first().map(|h| h.id), Some(second.id));
    }

    #[tokio::test]
    async fn issue_is_idempotent_per_checkout() {
        let (store, event, seat) = seeded(3).await;
        let batch = IssuanceBatch {
            event_id: event.id,
            user_id: UserId::new(),
            checkout_ref: "cs_1".to_string(),
            items: vec![SeatRequest::new(seat.id, 2)],
        };
        let now = Utc::now();
        let Ok(first) = store.issue_tickets(&batch, now).await else {
            panic!("issuance succeeds");
        };
        let Ok(second) = store.issue_tickets(&batch, now).await else {
            panic!("redelivery succeeds");
        };
        assert_eq!(first.issued_count(), 2);
        assert_eq!(second.issued_count(), 0);
        assert_eq!(second.already_issued, 2);
        let Ok(tickets) = store.tickets_for_user(batch.user_id).await else {
            panic!("tickets listed");
        };
        assert_eq!(tickets.len(), 2);
    }

    #[tokio::test]
    async fn issue_reports_seats_missing_from_map() {
        let (store, event, _) = seeded(1).await;
        let ghost = crate::domain::SeatId::new();
        let batch = IssuanceBatch {
            event_id: event.id,
            user_id: UserId::new(),
            checkout_ref: "cs_2".to_string(),
            items: vec![SeatRequest::new(ghost, 1)],
        };
        let Ok(report) = store.issue_tickets(&batch, Utc::now()).await else {
            panic!("issuance succeeds");
        };
        assert_eq!(report.missing_seats, vec![ghost]);
    }

    #[tokio::test]
    async fn sweep_deletes_only_expired() {
        let (store, event, seat) = seeded(5).await;
        let start = Utc::now();
        let old = hold(&event, &seat, 1, start - Duration::minutes(20));
        let fresh = hold(&event, &seat, 1, start);
        for h in [&old, &fresh] {
            let Ok(()) = store.create_hold(h, h.created_at).await else {
                panic!("hold succeeds");
            };
        }

        let Ok(swept) = store.delete_expired_holds(start).await else {
            panic!("sweep succeeds");
        };
        assert_eq!(swept.len(), 1);
        assert_eq!(swept.first().map(|h| h.id), Some(old.id));
        assert_eq!(store.holds().await.len(), 1);
    }

    #[tokio::test]
    async fn seat_map_replacement_refused_while_held() {
        let (store, event, seat) = seeded(2).await;
        let now = Utc::now();
        let Ok(()) = store.create_hold(&hold(&event, &seat, 1, now), now).await else {
            panic!("hold succeeds");
        };
        let replacement = vec![Seat::new(event.id, "B1", 4, SeatPrice::default())];
        let result = store.replace_seat_map(event.id, replacement, now).await;
        assert!(matches!(result, Err(GatewayError::Validation(_))));
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let event = LedgerEvent::HoldsSwept {
            removed: 0,
            timestamp: Utc::now(),
        };
        let (Ok(a), Ok(b)) = (
            store.append_ledger_event(&event).await,
            store.append_ledger_event(&event).await,
        ) else {
            panic!("append succeeds");
        };
        assert!(b > a);
        assert_eq!(store.audit_log().await.len(), 2);
    }
}
