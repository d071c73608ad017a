//! Ticket issuance for confirmed payments.

use std::sync::Arc;

use crate::domain::{HoldKey, IssuanceBatch, IssuanceReport, LedgerEvent, Ticket, UserId};
use crate::error::GatewayError;

use super::reservation_service::ReservationService;
use super::with_timeout;

/// Converts a confirmed payment into one ticket per purchased seat-unit
/// and then consumes the hold that backed it.
///
/// Safe under at-least-once delivery: units already issued for the same
/// checkout are skipped by the store.
#[derive(Debug, Clone)]
pub struct TicketIssuer {
    reservations: Arc<ReservationService>,
}

impl TicketIssuer {
    /// Creates an issuer on top of the reservation service's store.
    #[must_use]
    pub fn new(reservations: Arc<ReservationService>) -> Self {
        Self { reservations }
    }

    /// Lists a user's tickets, newest first.
    ///
    /// # Errors
    ///
    /// A retryable [`GatewayError::Store`].
    pub async fn tickets_for_user(&self, user_id: UserId) -> Result<Vec<Ticket>, GatewayError> {
        let svc = &self.reservations;
        with_timeout(
            svc.store_timeout(),
            "tickets_for_user",
            svc.store().tickets_for_user(user_id),
        )
        .await
    }

    /// Issues the tickets of `batch`.
    ///
    /// A payment confirmed after its hold expired is still honored; the
    /// hold is consumed only if it still exists.
    ///
    /// # Errors
    ///
    /// Returns the store error when issuance fails, so that the provider
    /// redelivers the webhook.
    pub async fn issue(&self, batch: &IssuanceBatch) -> Result<IssuanceReport, GatewayError> {
        let svc = &self.reservations;
        let now = svc.clock().now();
        let report = with_timeout(
            svc.store_timeout(),
            "issue_tickets",
            svc.store().issue_tickets(batch, now),
        )
        .await?;

        if !report.missing_seats.is_empty() {
            tracing::warn!(
                event_id = %batch.event_id,
                checkout_ref = %batch.checkout_ref,
                missing = ?report.missing_seats,
                "paid seats are no longer on the seat map"
            );
        }

        let _ = svc.event_bus().publish(LedgerEvent::TicketsIssued {
            event_id: batch.event_id,
            user_id: batch.user_id,
            checkout_ref: batch.checkout_ref.clone(),
            issued: report.issued_count(),
            already_issued: report.already_issued,
            timestamp: now,
        });
        tracing::info!(
            event_id = %batch.event_id,
            user_id = %batch.user_id,
            checkout_ref = %batch.checkout_ref,
            %report,
            "tickets issued"
        );

        let key = HoldKey::pair(batch.event_id, batch.user_id).with_session(&batch.checkout_ref);
        if svc.consume(&key).await == 0 && report.issued_count() > 0 {
            tracing::warn!(
                event_id = %batch.event_id,
                checkout_ref = %batch.checkout_ref,
                "payment confirmed after its hold was gone"
            );
        }
        Ok(report)
    }
}
