//! End-to-end checkout flows through the HTTP router, backed by the
//! in-memory store, the recording mock provider and a manual clock.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{Value, json};
use tower::ServiceExt;

use seat_gateway::api::{self, extractors::USER_ID_HEADER};
use seat_gateway::app_state::AppState;
use seat_gateway::config::PaymentConfig;
use seat_gateway::domain::reservation::DEFAULT_HOLD_TTL;
use seat_gateway::domain::{
    Clock, Event, EventBus, EventId, ManualClock, Seat, SeatId, SeatPrice, SeatRequest, UserId,
};
use seat_gateway::persistence::{InventoryStore, MemoryStore};
use seat_gateway::provider::signature::{SIGNATURE_HEADER, sign};
use seat_gateway::provider::{MockProvider, PaymentProvider};
use seat_gateway::service::{CheckoutService, ReservationService, Sweeper};

const WEBHOOK_SECRET: &str = "whsec_integration";

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    provider: Arc<MockProvider>,
    clock: ManualClock,
    sweeper: Sweeper,
    event: Event,
}

async fn harness(seats: Vec<(&str, u32)>) -> (Harness, Vec<Seat>) {
    let store = Arc::new(MemoryStore::new());
    let event = Event::new(EventId::new(), "Spring Gala");
    let seats: Vec<Seat> = seats
        .into_iter()
        .map(|(name, capacity)| {
            Seat::new(
                event.id,
                name,
                capacity,
                SeatPrice {
                    pln_minor: 15_000,
                    eur_minor: 3_500,
                },
            )
        })
        .collect();
    store.insert_event(event.clone(), seats.clone()).await;

    let clock = ManualClock::new(Utc::now());
    let provider = Arc::new(MockProvider::new());
    let event_bus = EventBus::new(256);
    let reservations = Arc::new(ReservationService::new(
        Arc::clone(&store) as Arc<dyn InventoryStore>,
        Arc::new(clock.clone()) as Arc<dyn Clock>,
        event_bus.clone(),
        DEFAULT_HOLD_TTL,
        Duration::from_secs(2),
    ));
    let checkout = Arc::new(CheckoutService::new(
        Arc::clone(&reservations),
        Arc::clone(&provider) as Arc<dyn PaymentProvider>,
        PaymentConfig {
            webhook_secret: WEBHOOK_SECRET.to_string(),
            ..PaymentConfig::default()
        },
    ));
    let sweeper = Sweeper::new(
        Arc::clone(&reservations),
        Arc::clone(&provider) as Arc<dyn PaymentProvider>,
        Duration::from_secs(300),
    );
    let app = api::build_router().with_state(AppState {
        reservations,
        checkout,
        event_bus,
    });

    (
        Harness {
            app,
            store,
            provider,
            clock,
            sweeper,
            event,
        },
        seats,
    )
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let Ok(response) = app.clone().oneshot(request).await else {
        panic!("router is infallible");
    };
    let status = response.status();
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("body readable");
    };
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn create_payment(
    h: &Harness,
    user: UserId,
    seat_id: SeatId,
    quantity: u32,
) -> (StatusCode, Value) {
    let body = json!({
        "eventId": h.event.id,
        "seats": [{ "seatId": seat_id, "quantity": quantity }],
    });
    let Ok(request) = Request::post("/api/payment/create")
        .header("content-type", "application/json")
        .header(USER_ID_HEADER, user.to_string())
        .body(Body::from(body.to_string()))
    else {
        panic!("request builds");
    };
    send(&h.app, request).await
}

async fn available(h: &Harness, seat_id: SeatId) -> u64 {
    let Ok(request) = Request::get(format!("/api/events/{}/available-seats", h.event.id))
        .body(Body::empty())
    else {
        panic!("request builds");
    };
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    let Some(seats) = body["seats"].as_array() else {
        panic!("seats array");
    };
    seats
        .iter()
        .find(|s| s["seatId"] == json!(seat_id))
        .and_then(|s| s["available"].as_u64())
        .unwrap_or_else(|| panic!("seat {seat_id} listed"))
}

fn completed_event(h: &Harness, session_id: &str, user: UserId, items: &[SeatRequest]) -> Value {
    let Ok(seats) = serde_json::to_string(items) else {
        panic!("seats encode");
    };
    json!({
        "id": format!("evt_{session_id}"),
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "payment_status": "paid",
            "metadata": {
                "eventId": h.event.id.to_string(),
                "userId": user.to_string(),
                "seats": seats,
            },
        }},
    })
}

async fn deliver(h: &Harness, payload: &Value, secret: &str) -> (StatusCode, Value) {
    let body = payload.to_string();
    let header = sign(body.as_bytes(), secret, h.clock.now().timestamp());
    let Ok(request) = Request::post("/api/payment/webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, header)
        .body(Body::from(body))
    else {
        panic!("request builds");
    };
    send(&h.app, request).await
}

async fn ticket_count(h: &Harness, user: UserId) -> usize {
    let Ok(request) = Request::get("/api/profile/tickets")
        .header(USER_ID_HEADER, user.to_string())
        .body(Body::empty())
    else {
        panic!("request builds");
    };
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    body["tickets"].as_array().map_or(0, Vec::len)
}

#[tokio::test]
async fn last_seat_goes_to_the_first_holder() {
    let (h, seats) = harness(vec![("A1", 1)]).await;
    let a1 = seats[0].id;
    let (u1, u2) = (UserId::new(), UserId::new());

    let (status, body) = create_payment(&h, u1, a1, 1).await;
    assert_eq!(status, StatusCode::OK);
    let Some(session_id) = body["sessionId"].as_str().map(str::to_string) else {
        panic!("session id returned");
    };
    assert!(body["url"].as_str().is_some_and(|u| !u.is_empty()));

    let (status, body) = create_payment(&h, u2, a1, 1).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], json!(2101));

    let paid = completed_event(&h, &session_id, u1, &[SeatRequest::new(a1, 1)]);
    let (status, body) = deliver(&h, &paid, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));

    let (status, _) = create_payment(&h, u2, a1, 1).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(available(&h, a1).await, 0);
    assert_eq!(ticket_count(&h, u1).await, 1);
    assert!(h.store.holds().await.is_empty());
}

#[tokio::test]
async fn unpaid_hold_expires_and_is_swept() {
    let (h, seats) = harness(vec![("A1", 1)]).await;
    let a1 = seats[0].id;

    let (status, body) = create_payment(&h, UserId::new(), a1, 1).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["sessionId"].as_str().map(str::to_string);
    assert_eq!(available(&h, a1).await, 0);

    h.clock.advance(DEFAULT_HOLD_TTL + chrono::Duration::seconds(1));
    assert_eq!(available(&h, a1).await, 0);
    assert_eq!(h.sweeper.run_once().await.removed, 0);

    h.clock.advance(chrono::Duration::minutes(22));
    assert_eq!(available(&h, a1).await, 1);
    assert_eq!(h.store.holds().await.len(), 1);

    let report = h.sweeper.run_once().await;
    assert_eq!(report.removed, 1);
    assert_eq!(report.sessions_expired, 1);
    assert!(h.store.holds().await.is_empty());
    assert_eq!(h.provider.expired_sessions().first().cloned(), session_id);

    let (status, _) = create_payment(&h, UserId::new(), a1, 1).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn late_payment_within_session_lifetime_cannot_oversell() {
    let (h, seats) = harness(vec![("A1", 1)]).await;
    let a1 = seats[0].id;
    let first = UserId::new();

    let (status, body) = create_payment(&h, first, a1, 1).await;
    assert_eq!(status, StatusCode::OK);
    let Some(session_id) = body["sessionId"].as_str().map(str::to_string) else {
        panic!("session id returned");
    };

    h.clock.advance(DEFAULT_HOLD_TTL + chrono::Duration::seconds(1));
    let (status, _) = create_payment(&h, UserId::new(), a1, 1).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let paid = completed_event(&h, &session_id, first, &[SeatRequest::new(a1, 1)]);
    let (status, _) = deliver(&h, &paid, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket_count(&h, first).await, 1);
    assert_eq!(available(&h, a1).await, 0);
    assert!(h.store.holds().await.is_empty());
}

#[tokio::test]
async fn definitive_decline_frees_seat_and_closes_session() {
    let (h, seats) = harness(vec![("A1", 1)]).await;
    let a1 = seats[0].id;
    let user = UserId::new();

    let (status, body) = create_payment(&h, user, a1, 1).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["sessionId"].as_str().map(str::to_string);

    let Ok(items) = serde_json::to_string(&[SeatRequest::new(a1, 1)]) else {
        panic!("seats encode");
    };
    let declined = json!({
        "id": "evt_declined",
        "type": "payment_intent.payment_failed",
        "data": { "object": {
            "id": "pi_1",
            "metadata": {
                "eventId": h.event.id.to_string(),
                "userId": user.to_string(),
                "seats": items,
            },
            "last_payment_error": { "code": "card_declined", "decline_code": "stolen_card" },
        }},
    });
    let (status, _) = deliver(&h, &declined, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(available(&h, a1).await, 1);
    assert!(h.store.holds().await.is_empty());
    assert_eq!(h.provider.expired_sessions().first().cloned(), session_id);
}

#[tokio::test]
async fn paid_checkout_for_unknown_event_is_acknowledged() {
    let (h, seats) = harness(vec![("A1", 1)]).await;
    let user = UserId::new();
    let mut paid = completed_event(&h, "cs_orphan", user, &[SeatRequest::new(seats[0].id, 1)]);
    paid["data"]["object"]["metadata"]["eventId"] = json!(EventId::new().to_string());

    let (status, body) = deliver(&h, &paid, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
    assert_eq!(ticket_count(&h, user).await, 0);
}

#[tokio::test]
async fn redelivered_completion_issues_tickets_once() {
    let (h, seats) = harness(vec![("B3", 4)]).await;
    let b3 = seats[0].id;
    let user = UserId::new();

    let (status, body) = create_payment(&h, user, b3, 2).await;
    assert_eq!(status, StatusCode::OK);
    let Some(session_id) = body["sessionId"].as_str().map(str::to_string) else {
        panic!("session id returned");
    };

    let paid = completed_event(&h, &session_id, user, &[SeatRequest::new(b3, 2)]);
    for _ in 0..2 {
        let (status, _) = deliver(&h, &paid, WEBHOOK_SECRET).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(ticket_count(&h, user).await, 2);
    assert_eq!(available(&h, b3).await, 2);
}

#[tokio::test]
async fn second_live_hold_for_same_event_conflicts() {
    let (h, seats) = harness(vec![("A1", 3), ("A2", 3)]).await;
    let user = UserId::new();

    let (status, _) = create_payment(&h, user, seats[0].id, 1).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = create_payment(&h, user, seats[1].id, 1).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], json!(2100));
    assert_eq!(h.store.holds().await.len(), 1);
}

#[tokio::test]
async fn concurrent_buyers_never_oversell() {
    let (h, seats) = harness(vec![("GA", 3)]).await;
    let seat_id = seats[0].id;
    let h = Arc::new(h);

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..10 {
        let h = Arc::clone(&h);
        tasks.spawn(async move { create_payment(&h, UserId::new(), seat_id, 1).await.0 });
    }

    let mut accepted = 0;
    let mut rejected = 0;
    while let Some(joined) = tasks.join_next().await {
        let Ok(status) = joined else {
            panic!("task completes");
        };
        match status {
            StatusCode::OK => accepted += 1,
            StatusCode::UNPROCESSABLE_ENTITY => rejected += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(accepted, 3);
    assert_eq!(rejected, 7);
    assert_eq!(available(&h, seat_id).await, 0);
}

#[tokio::test]
async fn webhook_with_wrong_secret_is_rejected() {
    let (h, seats) = harness(vec![("A1", 1)]).await;
    let user = UserId::new();
    let paid = completed_event(&h, "cs_forged", user, &[SeatRequest::new(seats[0].id, 1)]);

    let (status, body) = deliver(&h, &paid, "whsec_forged").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!(1002));
    assert_eq!(ticket_count(&h, user).await, 0);
}

#[tokio::test]
async fn unknown_event_type_is_acknowledged() {
    let (h, _) = harness(vec![("A1", 1)]).await;
    let payload = json!({
        "id": "evt_misc",
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } },
    });
    let (status, body) = deliver(&h, &payload, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
}

#[tokio::test]
async fn missing_user_header_is_unauthorized() {
    let (h, seats) = harness(vec![("A1", 1)]).await;
    let body = json!({
        "eventId": h.event.id,
        "seats": [{ "seatId": seats[0].id, "quantity": 1 }],
    });
    let Ok(request) = Request::post("/api/payment/create")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
    else {
        panic!("request builds");
    };
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!(1003));
    assert!(h.store.holds().await.is_empty());
}

#[tokio::test]
async fn seat_map_replacement_refused_while_held() {
    let (h, seats) = harness(vec![("A1", 2)]).await;
    let user = UserId::new();
    let (status, _) = create_payment(&h, user, seats[0].id, 1).await;
    assert_eq!(status, StatusCode::OK);

    let map = json!({ "seats": [{ "name": "Balcony", "capacity": 10, "pricePln": 9000 }] });
    let Ok(request) = Request::put(format!("/api/events/{}/seats", h.event.id))
        .header("content-type", "application/json")
        .header(USER_ID_HEADER, user.to_string())
        .body(Body::from(map.to_string()))
    else {
        panic!("request builds");
    };
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
