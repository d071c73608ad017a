//! seat-gateway server entry point.
//!
//! Wires the store, payment provider and services together, starts the
//! background sweeper and audit writer, and serves the REST API until
//! Ctrl-C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::http::{HeaderValue, StatusCode};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use seat_gateway::api;
use seat_gateway::app_state::AppState;
use seat_gateway::config::GatewayConfig;
use seat_gateway::domain::{Clock, EventBus, SystemClock};
use seat_gateway::persistence::{InventoryStore, MemoryStore, PostgresStore};
use seat_gateway::provider::{MockProvider, PaymentProvider, StripeProvider};
use seat_gateway::service::{CheckoutService, ReservationService, Sweeper, spawn_audit_writer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    init_tracing(config.log_json);
    tracing::info!(addr = %config.listen_addr, "starting seat-gateway");

    let store = build_store(&config).await?;
    let provider = build_provider(&config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let event_bus = EventBus::new(config.event_bus_capacity);

    let reservations = Arc::new(ReservationService::new(
        Arc::clone(&store),
        clock,
        event_bus.clone(),
        config.hold_ttl(),
        config.store_timeout(),
    ));
    let checkout = Arc::new(CheckoutService::new(
        Arc::clone(&reservations),
        Arc::clone(&provider),
        config.payment.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = Vec::new();
    if config.event_log_enabled {
        background.push(spawn_audit_writer(
            Arc::clone(&store),
            &event_bus,
            shutdown_rx.clone(),
        ));
    }
    let sweeper = Sweeper::new(
        Arc::clone(&reservations),
        Arc::clone(&provider),
        config.sweep_interval(),
    );
    background.push(tokio::spawn(sweeper.run(shutdown_rx)));

    let app_state = AppState {
        reservations,
        checkout,
        event_bus,
    };

    let app = Router::new()
        .merge(api::build_router())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.allowed_origins))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in background {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "background task ended abnormally");
        }
    }
    tracing::info!("seat-gateway stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn build_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn InventoryStore>> {
    if !config.persistence_enabled {
        tracing::warn!("persistence disabled; using the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await
        .context("connecting to PostgreSQL")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("running migrations")?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "PostgreSQL store ready"
    );
    Ok(Arc::new(PostgresStore::new(pool)))
}

fn build_provider(config: &GatewayConfig) -> anyhow::Result<Arc<dyn PaymentProvider>> {
    if config.payment.secret_key.is_empty() {
        tracing::warn!("STRIPE_SECRET_KEY not set; checkout sessions are mocked");
        return Ok(Arc::new(MockProvider::new()));
    }
    let provider = StripeProvider::new(
        &config.payment,
        Duration::from_secs(config.provider_timeout_secs),
    )
    .context("building payment provider client")?;
    Ok(Arc::new(provider))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl-C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
