//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api`; `/health` sits at the root.

pub mod dto;
pub mod extractors;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "seat-gateway", description = "Seat reservation, checkout and ticket issuance"),
    paths(
        handlers::payment::create_payment,
        handlers::payment::payment_webhook,
        handlers::seats::available_seats,
        handlers::seats::replace_seat_map,
        handlers::tickets::my_tickets,
        handlers::system::health_handler,
    ),
    components(schemas(
        dto::CreatePaymentRequest,
        dto::CreatePaymentResponse,
        dto::WebhookAck,
        dto::AvailableSeatsResponse,
        dto::SeatAvailabilityDto,
        dto::SeatDto,
        dto::ReplaceSeatMapRequest,
        dto::SeatMapResponse,
        dto::TicketDto,
        dto::TicketListResponse,
        handlers::system::HealthResponse,
        crate::domain::SeatRequest,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "Payment", description = "Checkout sessions and provider webhooks"),
        (name = "Seats", description = "Seat maps and availability"),
        (name = "Tickets", description = "Issued tickets"),
        (name = "System", description = "Health"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
///
/// With the `swagger-ui` feature the OpenAPI document is served at
/// `/api-docs/openapi.json` and browsable under `/swagger-ui`.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
