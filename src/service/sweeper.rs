//! Periodic purge of expired holds.
//!
//! Holds that never receive a webhook are already invisible to
//! availability once expired; the sweep deletes their rows and expires
//! the provider sessions bound to them so they can no longer be paid.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::reservation_service::ReservationService;
use crate::provider::PaymentProvider;

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Holds deleted.
    pub removed: u32,
    /// Provider sessions successfully expired.
    pub sessions_expired: u32,
    /// Provider sessions that could not be expired.
    pub sessions_failed: u32,
}

/// Background sweeper.
#[derive(Debug, Clone)]
pub struct Sweeper {
    reservations: Arc<ReservationService>,
    provider: Arc<dyn PaymentProvider>,
    interval: Duration,
}

impl Sweeper {
    /// Creates a sweeper running every `interval`.
    #[must_use]
    pub fn new(
        reservations: Arc<ReservationService>,
        provider: Arc<dyn PaymentProvider>,
        interval: Duration,
    ) -> Self {
        Self {
            reservations,
            provider,
            interval,
        }
    }

    /// Runs one pass. Store failures are logged and reported as an empty
    /// pass; the next tick retries.
    pub async fn run_once(&self) -> SweepReport {
        let swept = match self.reservations.sweep().await {
            Ok(swept) => swept,
            Err(e) => {
                tracing::error!(error = %e, "hold sweep failed");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            removed: u32::try_from(swept.len()).unwrap_or(u32::MAX),
            ..SweepReport::default()
        };
        for hold in &swept {
            let Some(session_id) = hold.checkout_session_id.as_deref() else {
                continue;
            };
            match self.provider.expire_session(session_id).await {
                Ok(()) => report.sessions_expired += 1,
                Err(e) => {
                    report.sessions_failed += 1;
                    tracing::warn!(
                        reservation_id = %hold.id,
                        session_id,
                        error = %e,
                        "failed to expire provider session"
                    );
                }
            }
        }

        if report.removed > 0 {
            tracing::info!(
                removed = report.removed,
                sessions_expired = report.sessions_expired,
                sessions_failed = report.sessions_failed,
                "expired holds swept"
            );
        }
        report
    }

    /// Sweeps on every tick until `shutdown_rx` flips to `true`.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "hold sweeper started");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
        tracing::info!("hold sweeper stopped");
    }
}
