//! PostgreSQL implementation of the reservation ledger.
//!
//! Every mutation that depends on availability runs in one transaction
//! that starts with `SELECT ... FOR UPDATE` on the event row. Concurrent
//! hold creations and issuance batches for the same event therefore
//! serialize, while different events proceed in parallel.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::models::{
    EventRow, ReservationRow, SeatRow, TicketRow, event_from_row, reservation_from_row,
    seat_from_row, ticket_from_row,
};
use super::{InventoryStore, seat_map_in_use};
use crate::domain::availability::{self, InventorySnapshot};
use crate::domain::{
    Event, EventId, HoldKey, IssuanceBatch, IssuanceReport, LedgerEvent, Reservation,
    ReservationId, Seat, SeatId, Ticket, UserId,
};
use crate::error::GatewayError;

const RESERVATION_COLUMNS: &str =
    "id, event_id, user_id, seat_ids, expires_at, checkout_session_id, created_at";

const TICKET_COLUMNS: &str = "id, event_id, user_id, seat_id, price_paid_pln_minor, \
     price_paid_eur_minor, qr_code, status, checkout_ref, idempotency_key, purchased_at";

/// PostgreSQL-backed ledger using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn load_event(
    conn: &mut PgConnection,
    event_id: EventId,
    lock: bool,
) -> Result<Event, GatewayError> {
    let sql = if lock {
        "SELECT id, name, is_active, has_seat_map FROM events WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, name, is_active, has_seat_map FROM events WHERE id = $1"
    };
    let row = sqlx::query_as::<_, EventRow>(sql)
        .bind(event_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(event_from_row)
        .ok_or(GatewayError::EventNotFound(event_id))
}

async fn load_seats(conn: &mut PgConnection, event_id: EventId) -> Result<Vec<Seat>, GatewayError> {
    let rows = sqlx::query_as::<_, SeatRow>(
        "SELECT id, event_id, name, seat_type, capacity, price_pln_minor, price_eur_minor, \
         position_x, position_y, icon_url FROM event_seats WHERE event_id = $1 ORDER BY name, id",
    )
    .bind(event_id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(seat_from_row).collect()
}

fn count_map(rows: Vec<(Uuid, i64)>) -> HashMap<SeatId, u32> {
    rows.into_iter()
        .map(|(seat, n)| (SeatId::from_uuid(seat), u32::try_from(n).unwrap_or(u32::MAX)))
        .collect()
}

/// Reads seats, active ticket counts and live hold counts for `event`.
async fn load_snapshot(
    conn: &mut PgConnection,
    event: Event,
    now: DateTime<Utc>,
) -> Result<InventorySnapshot, GatewayError> {
    let seats = load_seats(conn, event.id).await?;

    let sold = sqlx::query_as::<_, (Uuid, i64)>(
        "SELECT seat_id, COUNT(*) FROM tickets \
         WHERE event_id = $1 AND status = 'active' AND seat_id IS NOT NULL GROUP BY seat_id",
    )
    .bind(event.id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    let held = sqlx::query_as::<_, (Uuid, i64)>(
        "SELECT unit.seat_id, COUNT(*) FROM reservations r \
         CROSS JOIN LATERAL unnest(r.seat_ids) AS unit(seat_id) \
         WHERE r.event_id = $1 AND r.expires_at > $2 GROUP BY unit.seat_id",
    )
    .bind(event.id.as_uuid())
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;

    Ok(InventorySnapshot {
        event,
        seats,
        sold: count_map(sold),
        held: count_map(held),
    })
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn inventory_snapshot(
        &self,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<InventorySnapshot, GatewayError> {
        let mut tx = self.pool.begin().await?;
        let event = load_event(&mut tx, event_id, false).await?;
        let snapshot = load_snapshot(&mut tx, event, now).await?;
        tx.commit().await?;
        Ok(snapshot)
    }

    async fn create_hold(&self, hold: &Reservation, now: DateTime<Utc>) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await?;
        let event = load_event(&mut tx, hold.event_id, true).await?;

        let live: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reservations \
             WHERE event_id = $1 AND user_id = $2 AND expires_at > $3)",
        )
        .bind(hold.event_id.as_uuid())
        .bind(hold.user_id.as_uuid())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        if live {
            return Err(GatewayError::ReservationConflict {
                event_id: hold.event_id,
            });
        }

        let snapshot = load_snapshot(&mut tx, event, now).await?;
        availability::ensure_available(&availability::derive(&snapshot), &hold.requests())?;

        let seat_ids: Vec<Uuid> = hold.seat_units.iter().map(|s| *s.as_uuid()).collect();
        sqlx::query(
            "INSERT INTO reservations \
             (id, event_id, user_id, seat_ids, expires_at, checkout_session_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(hold.id.as_uuid())
        .bind(hold.event_id.as_uuid())
        .bind(hold.user_id.as_uuid())
        .bind(&seat_ids)
        .bind(hold.expires_at)
        .bind(&hold.checkout_session_id)
        .bind(hold.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn attach_checkout_session(
        &self,
        reservation_id: ReservationId,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, GatewayError> {
        let result = sqlx::query(
            "UPDATE reservations SET checkout_session_id = $2, \
             expires_at = GREATEST(expires_at, $3) WHERE id = $1",
        )
        .bind(reservation_id.as_uuid())
        .bind(session_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_hold(&self, reservation_id: ReservationId) -> Result<bool, GatewayError> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(reservation_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_holds(&self, key: &HoldKey) -> Result<Vec<Reservation>, GatewayError> {
        let sql = format!(
            "DELETE FROM reservations WHERE event_id = $1 AND user_id = $2 \
             AND ($3::text IS NULL OR checkout_session_id = $3) RETURNING {RESERVATION_COLUMNS}"
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(key.event_id.as_uuid())
            .bind(key.user_id.as_uuid())
            .bind(&key.checkout_session_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(reservation_from_row).collect())
    }

    async fn delete_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, GatewayError> {
        let sql = format!("DELETE FROM reservations WHERE expires_at < $1 RETURNING {RESERVATION_COLUMNS}");
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(reservation_from_row).collect())
    }

    async fn issue_tickets(
        &self,
        batch: &IssuanceBatch,
        now: DateTime<Utc>,
    ) -> Result<IssuanceReport, GatewayError> {
        let mut tx = self.pool.begin().await?;
        load_event(&mut tx, batch.event_id, true).await?;
        let seats = load_seats(&mut tx, batch.event_id).await?;

        let mut report = IssuanceReport::default();
        for item in &batch.items {
            let Some(seat) = seats.iter().find(|s| s.id == item.seat_id) else {
                report.missing_seats.push(item.seat_id);
                continue;
            };
            for unit in 0..item.quantity {
                let ticket = Ticket::issue(batch, seat, unit, now);
                let inserted = sqlx::query(
                    "INSERT INTO tickets (id, event_id, user_id, seat_id, price_paid_pln_minor, \
                     price_paid_eur_minor, qr_code, status, checkout_ref, idempotency_key, purchased_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                     ON CONFLICT (idempotency_key) DO NOTHING",
                )
                .bind(ticket.id.as_uuid())
                .bind(ticket.event_id.as_uuid())
                .bind(ticket.user_id.as_uuid())
                .bind(ticket.seat_id.map(|s| *s.as_uuid()))
                .bind(ticket.price_paid.pln_minor)
                .bind(ticket.price_paid.eur_minor)
                .bind(&ticket.qr_code)
                .bind(ticket.status.as_str())
                .bind(&ticket.checkout_ref)
                .bind(&ticket.idempotency_key)
                .bind(ticket.purchased_at)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if inserted == 1 {
                    report.issued.push(ticket);
                } else {
                    report.already_issued += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(report)
    }

    async fn replace_seat_map(
        &self,
        event_id: EventId,
        seats: Vec<Seat>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Seat>, GatewayError> {
        let mut tx = self.pool.begin().await?;
        load_event(&mut tx, event_id, true).await?;

        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reservations WHERE event_id = $1 AND expires_at > $2) \
             OR EXISTS (SELECT 1 FROM tickets WHERE event_id = $1 AND status = 'active')",
        )
        .bind(event_id.as_uuid())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        if in_use {
            return Err(seat_map_in_use(event_id));
        }

        sqlx::query("DELETE FROM event_seats WHERE event_id = $1")
            .bind(event_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for seat in &seats {
            let capacity = i32::try_from(seat.capacity).map_err(|_| {
                GatewayError::Validation(format!("capacity of seat {} is too large", seat.id))
            })?;
            sqlx::query(
                "INSERT INTO event_seats (id, event_id, name, seat_type, capacity, \
                 price_pln_minor, price_eur_minor, position_x, position_y, icon_url) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(seat.id.as_uuid())
            .bind(event_id.as_uuid())
            .bind(&seat.name)
            .bind(&seat.seat_type)
            .bind(capacity)
            .bind(seat.price.pln_minor)
            .bind(seat.price.eur_minor)
            .bind(seat.position_x)
            .bind(seat.position_y)
            .bind(&seat.icon_url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(seats)
    }

    async fn tickets_for_user(&self, user_id: UserId) -> Result<Vec<Ticket>, GatewayError> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE user_id = $1 ORDER BY purchased_at DESC"
        );
        let rows = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ticket_from_row).collect())
    }

    async fn append_ledger_event(&self, event: &LedgerEvent) -> Result<i64, GatewayError> {
        let payload = serde_json::to_value(event)
            .map_err(|e| GatewayError::Internal(format!("encode ledger event: {e}")))?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO ledger_events (event_id, event_type, payload) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(event.event_id().map(|e| *e.as_uuid()))
        .bind(event.event_type_str())
        .bind(&payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}
