//! Checkout provider boundary.
//!
//! The reservation core talks to the hosted checkout through
//! [`PaymentProvider`]: it opens a session for a hold and, when the hold
//! is swept, asks the provider to expire that session. Webhooks flow back
//! through [`signature::verify`] and [`webhook::parse_event`].

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Serialize;

use crate::domain::{Event, Seat};
use crate::error::GatewayError;

pub mod mock;
pub mod signature;
pub mod stripe;
pub mod webhook;

pub use mock::MockProvider;
pub use stripe::StripeProvider;

/// Errors produced by provider clients.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure, including client timeouts.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("api error: status {status}, body: {body}")]
    Api {
        /// Response status.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Response(String),
}

impl From<ProviderError> for GatewayError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err.to_string())
    }
}

/// One priced line of a checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    /// Display name.
    pub name: String,
    /// Unit price in minor units, fee included.
    pub unit_amount: i64,
    /// Lower-case ISO currency.
    pub currency: String,
    /// Number of units.
    pub quantity: u32,
}

impl LineItem {
    /// Prices `quantity` units of `seat`, adding a service fee of
    /// `fee_bps` basis points (rounded half up to the minor unit).
    #[must_use]
    pub fn for_seat(event: &Event, seat: &Seat, quantity: u32, currency: &str, fee_bps: u32) -> Self {
        let base = if currency.eq_ignore_ascii_case("eur") {
            seat.price.eur_minor
        } else {
            seat.price.pln_minor
        };
        let gross = (i128::from(base) * (10_000 + i128::from(fee_bps)) + 5_000) / 10_000;
        Self {
            name: format!("{} - {}", event.name, seat.name),
            unit_amount: i64::try_from(gross).unwrap_or(i64::MAX),
            currency: currency.to_lowercase(),
            quantity,
        }
    }
}

/// Everything the provider needs to open a hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    /// Priced lines.
    pub line_items: Vec<LineItem>,
    /// Key/value pairs echoed back on every webhook.
    pub metadata: Vec<(String, String)>,
    /// Redirect after payment.
    pub success_url: String,
    /// Redirect after cancellation.
    pub cancel_url: String,
    /// Provider-side session expiry.
    pub expires_at: DateTime<Utc>,
    /// Our reference for the session (the hold id).
    pub client_reference_id: String,
}

/// An open hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Provider session id.
    pub id: String,
    /// URL to redirect the buyer to.
    pub url: String,
}

/// Hosted checkout provider.
#[async_trait]
pub trait PaymentProvider: Debug + Send + Sync {
    /// Opens a checkout session.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] on transport failure or a non-2xx
    /// response.
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError>;

    /// Expires an open session so it can no longer be paid.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] on transport failure or when the
    /// provider refuses (e.g. the session already completed).
    async fn expire_session(&self, session_id: &str) -> Result<(), ProviderError>;
}
