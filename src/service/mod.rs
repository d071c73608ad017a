//! Service layer: business logic orchestration.
//!
//! [`ReservationService`] owns the hold lifecycle, [`TicketIssuer`] turns
//! confirmed payments into tickets, and [`CheckoutService`] ties both to
//! the payment provider. Every mutation emits a
//! [`crate::domain::LedgerEvent`] through the [`crate::domain::EventBus`].
//! [`sweeper`] and [`audit_log`] are the background tasks.

use std::future::Future;
use std::time::Duration;

use crate::error::GatewayError;

pub mod audit_log;
pub mod checkout_service;
pub mod issuance;
pub mod reservation_service;
pub mod sweeper;

pub use audit_log::spawn_audit_writer;
pub use checkout_service::{CheckoutService, WebhookOutcome};
pub use issuance::TicketIssuer;
pub use reservation_service::{PlacedHold, ReservationService};
pub use sweeper::{SweepReport, Sweeper};

/// Runs a store call, turning an elapsed `limit` into a retryable
/// [`GatewayError::Store`].
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    op: &'static str,
    fut: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        GatewayError::Store(format!("{op} timed out after {} ms", limit.as_millis()))
    })?
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_call_is_a_retryable_store_error() {
        let result: Result<(), GatewayError> = with_timeout(
            Duration::from_millis(5),
            "slow_call",
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        let Err(err) = result else {
            panic!("call cannot finish before the timeout");
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("slow_call"));
    }
}
