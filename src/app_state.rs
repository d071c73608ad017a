//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::{CheckoutService, ReservationService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Hold lifecycle and availability.
    pub reservations: Arc<ReservationService>,
    /// Checkout creation, webhook dispatch and ticket issuance.
    pub checkout: Arc<CheckoutService>,
    /// Ledger event bus.
    pub event_bus: EventBus,
}
