//! Checkout state machine and provider-event classification.
//!
//! A checkout starts `Pending` when its hold is created. Provider webhooks
//! are classified into a [`ProviderEventClass`]; only the success, failure
//! and expiry classes move the checkout to a terminal state. Retryable
//! card declines, still-pending payments and unknown event types never
//! touch the hold.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::seat::{SeatRequest, normalize_requests};
use super::{EventId, UserId};
use crate::error::GatewayError;

/// Metadata key carrying the event id.
pub const META_EVENT_ID: &str = "eventId";
/// Metadata key carrying the user id.
pub const META_USER_ID: &str = "userId";
/// Metadata key carrying the JSON-encoded seat list.
pub const META_SEATS: &str = "seats";

/// Decline codes after which the customer cannot succeed by retrying
/// within the same session.
const DEFINITIVE_DECLINE_CODES: &[&str] = &[
    "fraudulent",
    "lost_card",
    "stolen_card",
    "pickup_card",
    "restricted_card",
    "security_violation",
    "revocation_of_authorization",
    "revocation_of_all_authorizations",
    "stop_payment_order",
    "account_closed",
];

/// A signature-verified provider webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderEvent {
    /// Provider event id (e.g. `evt_...`).
    pub id: String,
    /// Provider event type (e.g. `checkout.session.completed`).
    pub kind: String,
    /// Id of the object the event is about (session or payment intent).
    pub object_id: String,
    /// Session payment status, when the object is a checkout session.
    pub payment_status: Option<String>,
    /// Decline / failure code, when the payment failed.
    pub failure_code: Option<String>,
    /// Metadata echoed back from session creation.
    pub metadata: HashMap<String, String>,
}

impl ProviderEvent {
    /// Returns the checkout session id when the event is about a session.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.kind
            .starts_with("checkout.session.")
            .then_some(self.object_id.as_str())
    }
}

/// Classification bucket of a provider event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderEventClass {
    /// Payment collected: issue tickets and consume the hold.
    Success,
    /// Payment definitively failed: release the hold.
    DefinitiveFailure,
    /// Session expired: release the hold.
    Expiry,
    /// Card declined but the customer may retry within the hold's TTL.
    RetryableDecline {
        /// Provider decline code, if any.
        code: Option<String>,
    },
    /// Session completed but an asynchronous payment is still in flight.
    AwaitingPayment,
    /// Not a checkout event this service acts on.
    Unhandled,
}

/// Maps a provider event to its bucket.
#[must_use]
pub fn classify(event: &ProviderEvent) -> ProviderEventClass {
    match event.kind.as_str() {
        "checkout.session.completed" => match event.payment_status.as_deref() {
            Some("unpaid") => ProviderEventClass::AwaitingPayment,
            _ => ProviderEventClass::Success,
        },
        "checkout.session.async_payment_succeeded" => ProviderEventClass::Success,
        "checkout.session.async_payment_failed" => ProviderEventClass::DefinitiveFailure,
        "checkout.session.expired" => ProviderEventClass::Expiry,
        "payment_intent.payment_failed" => match event.failure_code.as_deref() {
            Some(code) if DEFINITIVE_DECLINE_CODES.contains(&code) => {
                ProviderEventClass::DefinitiveFailure
            }
            code => ProviderEventClass::RetryableDecline {
                code: code.map(str::to_string),
            },
        },
        _ => ProviderEventClass::Unhandled,
    }
}

/// Checkout lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    /// Hold exists, provider session open.
    Pending,
    /// Tickets issued, hold consumed.
    Succeeded,
    /// Hold released after a failed payment.
    Failed,
    /// Hold released after the session or hold expired.
    Expired,
}

impl CheckoutState {
    /// Returns `true` for absorbing states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// State after observing an event of class `class`.
    ///
    /// Terminal states never change; non-transitioning classes leave a
    /// pending checkout pending.
    #[must_use]
    pub fn next(self, class: &ProviderEventClass) -> Self {
        if self.is_terminal() {
            return self;
        }
        match class {
            ProviderEventClass::Success => Self::Succeeded,
            ProviderEventClass::DefinitiveFailure => Self::Failed,
            ProviderEventClass::Expiry => Self::Expired,
            ProviderEventClass::RetryableDecline { .. }
            | ProviderEventClass::AwaitingPayment
            | ProviderEventClass::Unhandled => self,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

/// Metadata attached to a checkout session at creation and echoed back on
/// every webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    /// Event.
    pub event_id: EventId,
    /// Buyer.
    pub user_id: UserId,
    /// Purchased seats.
    pub seats: Vec<SeatRequest>,
}

impl CheckoutMetadata {
    /// Encodes the metadata as provider key/value pairs.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the seat list cannot be
    /// serialized.
    pub fn to_pairs(&self) -> Result<Vec<(String, String)>, GatewayError> {
        let seats = serde_json::to_string(&self.seats)
            .map_err(|e| GatewayError::Internal(format!("encode seats metadata: {e}")))?;
        Ok(vec![
            (META_EVENT_ID.to_string(), self.event_id.to_string()),
            (META_USER_ID.to_string(), self.user_id.to_string()),
            (META_SEATS.to_string(), seats),
        ])
    }

    /// Decodes metadata echoed back by the provider.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] when a key is missing or
    /// malformed.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, GatewayError> {
        let field = |key: &str| {
            map.get(key)
                .ok_or_else(|| GatewayError::Validation(format!("missing metadata {key}")))
        };
        let event_id = field(META_EVENT_ID)?
            .parse::<EventId>()
            .map_err(|e| GatewayError::Validation(format!("invalid metadata eventId: {e}")))?;
        let user_id = field(META_USER_ID)?
            .parse::<UserId>()
            .map_err(|e| GatewayError::Validation(format!("invalid metadata userId: {e}")))?;
        let seats: Vec<SeatRequest> = serde_json::from_str(field(META_SEATS)?)
            .map_err(|e| GatewayError::Validation(format!("invalid metadata seats: {e}")))?;
        Ok(Self {
            event_id,
            user_id,
            seats: normalize_requests(&seats)?,
        })
    }
}
