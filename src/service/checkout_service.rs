//! Checkout orchestration: opening provider sessions for new holds and
//! dispatching verified provider webhooks.

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;

use crate::config::PaymentConfig;
use crate::domain::checkout::classify;
use crate::domain::{
    CheckoutMetadata, CheckoutState, EventId, HoldKey, IssuanceBatch, LedgerEvent, ProviderEvent,
    ProviderEventClass, ReleaseReason, Reservation, SeatRequest, UserId,
};
use crate::error::GatewayError;
use crate::provider::{
    CheckoutSession, CheckoutSessionRequest, LineItem, PaymentProvider, signature, webhook,
};

use super::issuance::TicketIssuer;
use super::reservation_service::ReservationService;

/// Shortest session lifetime the provider accepts, plus a minute of slack.
const MIN_PROVIDER_SESSION_TTL: Duration = Duration::minutes(31);

/// What a webhook delivery led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Tickets were issued (or had already been issued).
    Issued {
        /// Tickets created by this delivery.
        issued: u32,
        /// Units already covered by an earlier delivery.
        already_issued: u32,
    },
    /// The hold was released.
    Released {
        /// Holds removed.
        removed: u32,
    },
    /// A checkout event that leaves the hold untouched.
    NoTransition,
    /// Not an event this service acts on, or one that cannot be
    /// attributed to a hold.
    Ignored,
}

/// Ties the hold lifecycle to the payment provider.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    reservations: Arc<ReservationService>,
    issuer: TicketIssuer,
    provider: Arc<dyn PaymentProvider>,
    payment: PaymentConfig,
}

impl CheckoutService {
    /// Creates a new `CheckoutService`.
    #[must_use]
    pub fn new(
        reservations: Arc<ReservationService>,
        provider: Arc<dyn PaymentProvider>,
        payment: PaymentConfig,
    ) -> Self {
        Self {
            issuer: TicketIssuer::new(Arc::clone(&reservations)),
            reservations,
            provider,
            payment,
        }
    }

    /// Returns the ticket issuer.
    #[must_use]
    pub const fn issuer(&self) -> &TicketIssuer {
        &self.issuer
    }

    /// Places a hold for the buyer and opens a provider checkout for it.
    ///
    /// If the provider call fails the hold is released again so the seats
    /// do not stay blocked until expiry.
    ///
    /// # Errors
    ///
    /// Everything [`ReservationService::create_hold`] returns, plus
    /// [`GatewayError::Provider`] when the session cannot be opened.
    pub async fn create_checkout(
        &self,
        event_id: EventId,
        user_id: UserId,
        seats: &[SeatRequest],
    ) -> Result<CheckoutSession, GatewayError> {
        let placed = self.reservations.create_hold(event_id, user_id, seats).await?;
        let hold = &placed.reservation;
        let key = HoldKey::pair(event_id, user_id);

        let requests = hold.requests();
        let request = match self.session_request(&placed.snapshot, &requests, hold) {
            Ok(request) => request,
            Err(e) => {
                self.reservations
                    .release(&key, ReleaseReason::CheckoutAborted)
                    .await;
                return Err(e);
            }
        };

        let session = match self.provider.create_session(&request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(%event_id, %user_id, error = %e, "checkout session creation failed");
                self.reservations
                    .release(&key, ReleaseReason::CheckoutAborted)
                    .await;
                return Err(e.into());
            }
        };

        match self
            .reservations
            .attach_session(hold.id, &session.id, request.expires_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                %event_id,
                session_id = %session.id,
                "hold vanished before its session was attached"
            ),
            Err(e) => tracing::warn!(
                %event_id,
                session_id = %session.id,
                error = %e,
                "failed to attach session to hold"
            ),
        }

        tracing::info!(
            %event_id,
            %user_id,
            reservation_id = %hold.id,
            session_id = %session.id,
            "checkout session created"
        );
        Ok(session)
    }

    fn session_request(
        &self,
        snapshot: &crate::domain::InventorySnapshot,
        requests: &[SeatRequest],
        hold: &Reservation,
    ) -> Result<CheckoutSessionRequest, GatewayError> {
        let line_items = requests
            .iter()
            .map(|req| {
                snapshot
                    .seat(req.seat_id)
                    .map(|seat| {
                        LineItem::for_seat(
                            &snapshot.event,
                            seat,
                            req.quantity,
                            &self.payment.currency,
                            self.payment.fee_bps,
                        )
                    })
                    .ok_or(GatewayError::SeatNotFound(req.seat_id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let metadata = CheckoutMetadata {
            event_id: hold.event_id,
            user_id: hold.user_id,
            seats: requests.to_vec(),
        }
        .to_pairs()?;

        let frontend = self.payment.frontend_url.trim_end_matches('/');
        let provider_floor = self.reservations.clock().now() + MIN_PROVIDER_SESSION_TTL;
        Ok(CheckoutSessionRequest {
            line_items,
            metadata,
            success_url: format!("{frontend}/payment/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{frontend}/events/{}", hold.event_id),
            expires_at: hold.expires_at.max(provider_floor),
            client_reference_id: hold.id.to_string(),
        })
    }

    /// Verifies, decodes and dispatches one webhook delivery.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Signature`] when the signature is missing or
    /// invalid, [`GatewayError::Validation`] for an unparseable body or a
    /// success event without usable metadata, and a retryable
    /// [`GatewayError::Store`] when tickets could not be written. A paid
    /// checkout naming an unknown event is logged and ignored.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookOutcome, GatewayError> {
        let header = signature_header
            .ok_or_else(|| GatewayError::Signature("missing signature header".to_string()))?;
        let now = self.reservations.clock().now().timestamp();
        signature::verify(
            payload,
            header,
            &self.payment.webhook_secret,
            now,
            self.payment.webhook_tolerance_secs,
        )
        .map_err(|e| GatewayError::Signature(e.to_string()))?;

        let event = webhook::parse_event(payload)?;
        self.dispatch(&event).await
    }

    /// Applies an already verified provider event.
    ///
    /// # Errors
    ///
    /// See [`Self::handle_webhook`].
    pub async fn dispatch(&self, event: &ProviderEvent) -> Result<WebhookOutcome, GatewayError> {
        let class = classify(event);
        match &class {
            ProviderEventClass::Success => {
                let meta = CheckoutMetadata::from_map(&event.metadata)?;
                let batch = IssuanceBatch {
                    event_id: meta.event_id,
                    user_id: meta.user_id,
                    checkout_ref: event.object_id.clone(),
                    items: meta.seats.clone(),
                };
                let report = match self.issuer.issue(&batch).await {
                    Ok(report) => report,
                    Err(GatewayError::EventNotFound(event_id)) => {
                        tracing::error!(
                            provider_event = %event.id,
                            session_id = %event.object_id,
                            %event_id,
                            "paid checkout names an unknown event; no tickets issued"
                        );
                        return Ok(WebhookOutcome::Ignored);
                    }
                    Err(e) => return Err(e),
                };
                self.transition(&meta, event, &class);
                Ok(WebhookOutcome::Issued {
                    issued: report.issued_count(),
                    already_issued: report.already_issued,
                })
            }
            ProviderEventClass::DefinitiveFailure | ProviderEventClass::Expiry => {
                let meta = match CheckoutMetadata::from_map(&event.metadata) {
                    Ok(meta) => meta,
                    Err(e) => {
                        tracing::warn!(
                            provider_event = %event.id,
                            kind = %event.kind,
                            error = %e,
                            "cannot attribute release event to a hold"
                        );
                        return Ok(WebhookOutcome::Ignored);
                    }
                };
                let mut key = HoldKey::pair(meta.event_id, meta.user_id);
                if let Some(session_id) = event.session_id() {
                    key = key.with_session(session_id);
                }
                let reason = if class == ProviderEventClass::Expiry {
                    ReleaseReason::SessionExpired
                } else {
                    ReleaseReason::PaymentFailed
                };
                let released = self.reservations.release(&key, reason).await;
                self.close_sessions(&released, event.session_id()).await;
                self.transition(&meta, event, &class);
                Ok(WebhookOutcome::Released {
                    removed: u32::try_from(released.len()).unwrap_or(u32::MAX),
                })
            }
            ProviderEventClass::RetryableDecline { code } => {
                tracing::info!(
                    provider_event = %event.id,
                    code = code.as_deref().unwrap_or("none"),
                    "retryable decline; hold kept"
                );
                Ok(WebhookOutcome::NoTransition)
            }
            ProviderEventClass::AwaitingPayment => {
                tracing::info!(
                    provider_event = %event.id,
                    session_id = %event.object_id,
                    "session completed, payment still pending"
                );
                Ok(WebhookOutcome::NoTransition)
            }
            ProviderEventClass::Unhandled => {
                tracing::debug!(provider_event = %event.id, kind = %event.kind, "ignoring provider event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Expires the provider sessions still bound to released holds so they
    /// can no longer be paid. `closed` is the session the provider already
    /// finished, if the event names one.
    async fn close_sessions(&self, released: &[Reservation], closed: Option<&str>) {
        let open = released
            .iter()
            .filter_map(|hold| hold.checkout_session_id.as_deref())
            .filter(|session_id| Some(*session_id) != closed);
        for session_id in open {
            match self.provider.expire_session(session_id).await {
                Ok(()) => tracing::info!(%session_id, "checkout session expired after release"),
                Err(e) => tracing::warn!(
                    %session_id,
                    error = %e,
                    "failed to expire checkout session after release"
                ),
            }
        }
    }

    fn transition(&self, meta: &CheckoutMetadata, event: &ProviderEvent, class: &ProviderEventClass) {
        let from = CheckoutState::Pending;
        let to = from.next(class);
        if to == from {
            return;
        }
        let _ = self.reservations.event_bus().publish(LedgerEvent::CheckoutTransition {
            event_id: meta.event_id,
            user_id: meta.user_id,
            provider_event: event.kind.clone(),
            from,
            to,
            timestamp: self.reservations.clock().now(),
        });
        tracing::info!(
            event_id = %meta.event_id,
            user_id = %meta.user_id,
            from = from.as_str(),
            to = to.as_str(),
            "checkout transition"
        );
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::reservation::DEFAULT_HOLD_TTL;
    use crate::domain::{Event, EventBus, ManualClock, Seat, SeatPrice};
    use crate::persistence::{InventoryStore, MemoryStore};
    use crate::provider::MockProvider;
    use chrono::Utc;
    use std::collections::HashMap;

    struct Fixture {
        checkout: CheckoutService,
        provider: Arc<MockProvider>,
        store: Arc<MemoryStore>,
        event: Event,
        seat: Seat,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let event = Event::new(EventId::new(), "Gala");
        let seat = Seat::new(
            event.id,
            "A1",
            2,
            SeatPrice {
                pln_minor: 10_000,
                eur_minor: 2_400,
            },
        );
        store.insert_event(event.clone(), vec![seat.clone()]).await;
        let reservations = Arc::new(ReservationService::new(
            Arc::clone(&store) as Arc<dyn InventoryStore>,
            Arc::new(ManualClock::new(Utc::now())),
            EventBus::new(64),
            DEFAULT_HOLD_TTL,
            std::time::Duration::from_secs(1),
        ));
        let provider = Arc::new(MockProvider::new());
        let checkout = CheckoutService::new(
            reservations,
            Arc::clone(&provider) as Arc<dyn PaymentProvider>,
            PaymentConfig {
                webhook_secret: "whsec_test".to_string(),
                ..PaymentConfig::default()
            },
        );
        Fixture {
            checkout,
            provider,
            store,
            event,
            seat,
        }
    }

    fn provider_event(kind: &str, object_id: &str, meta: &CheckoutMetadata) -> ProviderEvent {
        let Ok(pairs) = meta.to_pairs() else {
            panic!("metadata encodes");
        };
        ProviderEvent {
            id: "evt_1".to_string(),
            kind: kind.to_string(),
            object_id: object_id.to_string(),
            payment_status: Some("paid".to_string()),
            failure_code: None,
            metadata: pairs.into_iter().collect::<HashMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn checkout_opens_session_bound_to_hold() {
        let f = fixture().await;
        let user = UserId::new();
        let Ok(session) = f
            .checkout
            .create_checkout(f.event.id, user, &[SeatRequest::new(f.seat.id, 2)])
            .await
        else {
            panic!("checkout succeeds");
        };

        let holds = f.store.holds().await;
        assert_eq!(holds.len(), 1);
        assert_eq!(
            holds.first().and_then(|h| h.checkout_session_id.clone()),
            Some(session.id.clone())
        );

        let created = f.provider.created_sessions();
        let Some((_, request)) = created.first() else {
            panic!("session recorded");
        };
        assert_eq!(request.line_items.first().map(|l| l.unit_amount), Some(10_200));
        assert!(request.expires_at >= Utc::now() + Duration::minutes(30));
    }

    #[tokio::test]
    async fn provider_failure_releases_hold() {
        let f = fixture().await;
        f.provider.set_failing(true);
        let result = f
            .checkout
            .create_checkout(f.event.id, UserId::new(), &[SeatRequest::new(f.seat.id, 1)])
            .await;
        assert!(matches!(result, Err(GatewayError::Provider(_))));
        assert!(f.store.holds().await.is_empty());
    }

    #[tokio::test]
    async fn expiry_of_old_session_keeps_newer_hold() {
        let f = fixture().await;
        let user = UserId::new();
        let Ok(_) = f
            .checkout
            .create_checkout(f.event.id, user, &[SeatRequest::new(f.seat.id, 1)])
            .await
        else {
            panic!("checkout succeeds");
        };
        let meta = CheckoutMetadata {
            event_id: f.event.id,
            user_id: user,
            seats: vec![SeatRequest::new(f.seat.id, 1)],
        };
        let stale = provider_event("checkout.session.expired", "cs_stale", &meta);
        let Ok(outcome) = f.checkout.dispatch(&stale).await else {
            panic!("dispatch succeeds");
        };
        assert_eq!(outcome, WebhookOutcome::Released { removed: 0 });
        assert_eq!(f.store.holds().await.len(), 1);
    }

    async fn checkout_for(f: &Fixture, user: UserId) -> (CheckoutSession, CheckoutMetadata) {
        let seats = vec![SeatRequest::new(f.seat.id, 1)];
        let Ok(session) = f.checkout.create_checkout(f.event.id, user, &seats).await else {
            panic!("checkout succeeds");
        };
        let meta = CheckoutMetadata {
            event_id: f.event.id,
            user_id: user,
            seats,
        };
        (session, meta)
    }

    fn payment_failed(code: &str, meta: &CheckoutMetadata) -> ProviderEvent {
        ProviderEvent {
            payment_status: None,
            failure_code: Some(code.to_string()),
            ..provider_event("payment_intent.payment_failed", "pi_1", meta)
        }
    }

    #[tokio::test]
    async fn retryable_decline_keeps_hold() {
        let f = fixture().await;
        let (session, meta) = checkout_for(&f, UserId::new()).await;

        let Ok(outcome) = f
            .checkout
            .dispatch(&payment_failed("insufficient_funds", &meta))
            .await
        else {
            panic!("dispatch succeeds");
        };
        assert_eq!(outcome, WebhookOutcome::NoTransition);
        let holds = f.store.holds().await;
        assert_eq!(holds.len(), 1);
        assert_eq!(
            holds.first().and_then(|h| h.checkout_session_id.clone()),
            Some(session.id)
        );
        assert!(f.provider.expired_sessions().is_empty());
    }

    #[tokio::test]
    async fn definitive_decline_releases_hold_and_closes_session() {
        let f = fixture().await;
        let (session, meta) = checkout_for(&f, UserId::new()).await;

        let Ok(outcome) = f
            .checkout
            .dispatch(&payment_failed("stolen_card", &meta))
            .await
        else {
            panic!("dispatch succeeds");
        };
        assert_eq!(outcome, WebhookOutcome::Released { removed: 1 });
        assert!(f.store.holds().await.is_empty());
        assert_eq!(f.provider.expired_sessions(), vec![session.id]);
    }

    #[tokio::test]
    async fn async_payment_failure_releases_its_hold() {
        let f = fixture().await;
        let (session, meta) = checkout_for(&f, UserId::new()).await;
        let failed = ProviderEvent {
            payment_status: Some("unpaid".to_string()),
            ..provider_event("checkout.session.async_payment_failed", &session.id, &meta)
        };

        let Ok(outcome) = f.checkout.dispatch(&failed).await else {
            panic!("dispatch succeeds");
        };
        assert_eq!(outcome, WebhookOutcome::Released { removed: 1 });
        assert!(f.store.holds().await.is_empty());
        assert!(f.provider.expired_sessions().is_empty());
    }

    #[tokio::test]
    async fn paid_checkout_for_unknown_event_is_ignored() {
        let f = fixture().await;
        let meta = CheckoutMetadata {
            event_id: EventId::new(),
            user_id: UserId::new(),
            seats: vec![SeatRequest::new(f.seat.id, 1)],
        };
        let paid = provider_event("checkout.session.completed", "cs_gone", &meta);
        let Ok(outcome) = f.checkout.dispatch(&paid).await else {
            panic!("dispatch succeeds");
        };
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn attached_session_outlives_default_hold_ttl() {
        let f = fixture().await;
        let (session, _) = checkout_for(&f, UserId::new()).await;
        let holds = f.store.holds().await;
        let Some(hold) = holds.first() else {
            panic!("hold stored");
        };
        assert_eq!(hold.checkout_session_id.as_deref(), Some(session.id.as_str()));
        assert!(hold.expires_at >= hold.created_at + MIN_PROVIDER_SESSION_TTL);
    }

    #[tokio::test]
    async fn success_without_metadata_is_rejected() {
        let f = fixture().await;
        let event = ProviderEvent {
            id: "evt_2".to_string(),
            kind: "checkout.session.completed".to_string(),
            object_id: "cs_1".to_string(),
            payment_status: Some("paid".to_string()),
            ..ProviderEvent::default()
        };
        assert!(matches!(
            f.checkout.dispatch(&event).await,
            Err(GatewayError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn release_without_metadata_is_ignored() {
        let f = fixture().await;
        let event = ProviderEvent {
            id: "evt_3".to_string(),
            kind: "checkout.session.expired".to_string(),
            object_id: "cs_1".to_string(),
            ..ProviderEvent::default()
        };
        let Ok(outcome) = f.checkout.dispatch(&event).await else {
            panic!("dispatch succeeds");
        };
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let f = fixture().await;
        assert!(matches!(
            f.checkout.handle_webhook(b"{}", None).await,
            Err(GatewayError::Signature(_))
        ));
    }
}
